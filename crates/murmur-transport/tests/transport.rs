//! Integration tests for the TCP and WebSocket transports.
//!
//! These tests spin up a real listener on `127.0.0.1:0` and a real client
//! to verify that frames survive the trip in both directions, that a clean
//! close surfaces as `Ok(None)`, and that `recv` can be raced against a
//! timeout without losing data.

use std::time::Duration;

use bytes::Bytes;
use murmur_transport::{
    Connection, FrameReader, FrameWriter, TcpConnection, TcpTransport,
    Transport,
};
use tokio::io::AsyncWriteExt;

/// Binds a TCP transport on an OS-assigned port and returns it with the
/// address clients should dial.
async fn bind_tcp() -> (TcpTransport, String) {
    let transport = TcpTransport::bind("127.0.0.1:0")
        .await
        .expect("should bind");
    let addr = transport.local_addr().expect("local addr").to_string();
    (transport, addr)
}

#[tokio::test]
async fn test_tcp_accept_and_send_receive() {
    let (mut transport, addr) = bind_tcp().await;

    let server_handle = tokio::spawn(async move {
        transport.accept().await.expect("should accept")
    });
    let client = TcpConnection::connect(&addr).await.expect("connect");
    let server_conn = server_handle.await.expect("task should complete");

    assert!(server_conn.peer_addr().is_some());
    assert_eq!(client.peer_addr().map(|a| a.to_string()), Some(addr));

    let (mut server_rx, mut server_tx) = server_conn.split();
    let (mut client_rx, mut client_tx) = client.split();

    // --- Server sends, client receives ---
    server_tx
        .send(Bytes::from_static(b"hello from server"))
        .await
        .expect("send should succeed");
    let frame = client_rx.recv().await.expect("recv").expect("frame");
    assert_eq!(frame.as_ref(), b"hello from server");

    // --- Client sends, server receives ---
    client_tx
        .send(Bytes::from_static(b"hello from client"))
        .await
        .expect("send should succeed");
    let frame = server_rx.recv().await.expect("recv").expect("frame");
    assert_eq!(frame.as_ref(), b"hello from client");
}

#[tokio::test]
async fn test_tcp_frames_keep_their_boundaries() {
    let (mut transport, addr) = bind_tcp().await;
    let server_handle =
        tokio::spawn(async move { transport.accept().await.unwrap() });
    let client = TcpConnection::connect(&addr).await.unwrap();
    let (mut server_rx, _server_tx) = server_handle.await.unwrap().split();
    let (_client_rx, mut client_tx) = client.split();

    for frame in [&b"a"[..], b"", b"three"] {
        client_tx.send(Bytes::copy_from_slice(frame)).await.unwrap();
    }

    assert_eq!(server_rx.recv().await.unwrap().unwrap().as_ref(), b"a");
    assert_eq!(server_rx.recv().await.unwrap().unwrap().as_ref(), b"");
    assert_eq!(server_rx.recv().await.unwrap().unwrap().as_ref(), b"three");
}

#[tokio::test]
async fn test_tcp_recv_returns_none_on_peer_close() {
    let (mut transport, addr) = bind_tcp().await;
    let server_handle =
        tokio::spawn(async move { transport.accept().await.unwrap() });
    let client = TcpConnection::connect(&addr).await.unwrap();
    let (mut server_rx, _server_tx) = server_handle.await.unwrap().split();

    let (_client_rx, mut client_tx) = client.split();
    client_tx.close().await.expect("close should succeed");

    let result = server_rx.recv().await.expect("recv should not error");
    assert!(result.is_none(), "should return None on client close");
}

#[tokio::test]
async fn test_tcp_recv_survives_timeout_mid_frame() {
    // A frame split across two writes, with a read timeout firing in
    // between, must still arrive intact on the next recv.
    let (mut transport, addr) = bind_tcp().await;
    let server_handle =
        tokio::spawn(async move { transport.accept().await.unwrap() });
    let mut raw = tokio::net::TcpStream::connect(&addr).await.unwrap();
    let (mut server_rx, _server_tx) = server_handle.await.unwrap().split();

    // Length prefix (5) plus the first two payload bytes.
    raw.write_all(&[0, 0, 0, 5, b'h', b'e']).await.unwrap();
    raw.flush().await.unwrap();

    let early =
        tokio::time::timeout(Duration::from_millis(50), server_rx.recv())
            .await;
    assert!(early.is_err(), "incomplete frame should not be returned");

    raw.write_all(b"llo").await.unwrap();
    let frame = server_rx.recv().await.unwrap().unwrap();
    assert_eq!(frame.as_ref(), b"hello");
}

#[tokio::test]
async fn test_tcp_rejects_oversized_frame() {
    let mut transport = TcpTransport::bind_with("127.0.0.1:0", 16)
        .await
        .unwrap();
    let addr = transport.local_addr().unwrap().to_string();
    let server_handle =
        tokio::spawn(async move { transport.accept().await.unwrap() });
    let client = TcpConnection::connect(&addr).await.unwrap();
    let (mut server_rx, _server_tx) = server_handle.await.unwrap().split();
    let (_client_rx, mut client_tx) = client.split();

    client_tx.send(Bytes::from(vec![7u8; 64])).await.unwrap();

    let result = server_rx.recv().await;
    assert!(result.is_err(), "oversized frame should be an error");
}

#[tokio::test]
async fn test_tcp_connect_to_closed_port_fails() {
    // Bind then drop to get a port nobody is listening on.
    let (transport, addr) = bind_tcp().await;
    drop(transport);

    let result = TcpConnection::connect(&addr).await;
    assert!(matches!(
        result,
        Err(murmur_transport::TransportError::Connect(_))
    ));
}

#[tokio::test]
async fn test_tcp_bind_unresolvable_address_fails() {
    let result = TcpTransport::bind("not an address").await;
    assert!(matches!(
        result,
        Err(murmur_transport::TransportError::Bind(_))
    ));
}

#[cfg(feature = "websocket")]
mod websocket {
    use std::time::Duration;

    use bytes::Bytes;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;
    use murmur_transport::{
        Connection, FrameReader, FrameWriter, Transport, WebSocketConnection,
        WebSocketTransport,
    };

    #[tokio::test]
    async fn test_websocket_accept_and_send_receive() {
        let mut transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().unwrap();

        let server_handle = tokio::spawn(async move {
            transport.accept().await.expect("should accept")
        });
        let client = WebSocketConnection::connect(&format!("ws://{addr}"))
            .await
            .expect("client should connect");
        let server_conn = server_handle.await.expect("task should complete");

        let (mut server_rx, mut server_tx) = server_conn.split();
        let (mut client_rx, mut client_tx) = client.split();

        server_tx
            .send(Bytes::from_static(b"hello from server"))
            .await
            .expect("send should succeed");
        let frame = client_rx.recv().await.unwrap().unwrap();
        assert_eq!(frame.as_ref(), b"hello from server");

        client_tx
            .send(Bytes::from_static(b"hello from client"))
            .await
            .unwrap();
        let frame = server_rx.recv().await.unwrap().unwrap();
        assert_eq!(frame.as_ref(), b"hello from client");
    }

    #[tokio::test]
    async fn test_websocket_recv_returns_none_on_client_close() {
        let mut transport =
            WebSocketTransport::bind("127.0.0.1:0").await.unwrap();
        let addr = transport.local_addr().unwrap();

        let server_handle =
            tokio::spawn(async move { transport.accept().await.unwrap() });
        let client = WebSocketConnection::connect(&format!("ws://{addr}"))
            .await
            .unwrap();
        let (mut server_rx, _server_tx) = server_handle.await.unwrap().split();

        let (_client_rx, mut client_tx) = client.split();
        client_tx.close().await.unwrap();

        let result = server_rx.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on client close");
    }

    #[tokio::test]
    async fn test_websocket_silent_socket_does_not_hold_up_accept() {
        let mut transport =
            WebSocketTransport::bind("127.0.0.1:0").await.unwrap();
        let addr = transport.local_addr().unwrap();
        let accepting = tokio::spawn(async move {
            let conn = transport.accept().await.unwrap();
            (transport, conn)
        });

        // Connects at the TCP level and never starts the upgrade.
        let _silent = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let client = tokio::time::timeout(
            Duration::from_secs(3),
            WebSocketConnection::connect(&format!("ws://{addr}")),
        )
        .await
        .expect("second client should not wait on the silent one")
        .unwrap();
        let (_transport, server_conn) =
            tokio::time::timeout(Duration::from_secs(3), accepting)
                .await
                .expect("accept should return the upgraded connection")
                .unwrap();

        assert_eq!(server_conn.peer_addr(), client.local_addr());
    }

    #[tokio::test]
    async fn test_websocket_handshake_deadline_drops_silent_socket() {
        let mut transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .unwrap()
            .with_handshake_timeout(Duration::from_millis(100));
        let addr = transport.local_addr().unwrap();
        let accepting =
            tokio::spawn(async move { transport.accept().await.map(|_| ()) });

        let mut silent = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 16];
        let read = tokio::time::timeout(Duration::from_secs(2), silent.read(&mut buf))
            .await
            .expect("server should give up on the handshake");
        assert!(matches!(read, Ok(0) | Err(_)), "expected EOF, got {read:?}");

        accepting.abort();
    }

    #[tokio::test]
    async fn test_websocket_rebind_after_server_closed_first() {
        let mut transport =
            WebSocketTransport::bind("127.0.0.1:0").await.unwrap();
        let addr = transport.local_addr().unwrap();

        let url = format!("ws://{addr}");
        let client = WebSocketConnection::connect(&url);
        let (client, server_conn) = tokio::join!(client, transport.accept());
        let (client, server_conn) = (client.unwrap(), server_conn.unwrap());

        // The server end closes first and so holds the TIME_WAIT state.
        drop(server_conn);
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(client);
        drop(transport);
        tokio::time::sleep(Duration::from_millis(50)).await;

        WebSocketTransport::bind(&addr.to_string())
            .await
            .expect("address reuse should allow an immediate rebind");
    }
}
