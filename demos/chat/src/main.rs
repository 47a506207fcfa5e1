//! `chat`: run a chat server, or join one from the terminal.
//!
//! ```text
//! chat server --port 10301
//! chat client --addr 127.0.0.1:10301 --name ada
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use murmur::ServerConfig;
use murmur::ServerBuilder;
use murmur_chat::{ChatClient, ChatServer, PORT};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chat", version, about = "A tiny chat room over Murmur")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Host a chat room.
    Server {
        /// Port to listen on.
        #[arg(short, long, default_value_t = PORT)]
        port: u16,

        /// Seconds of silence before a client is pinged.
        #[arg(long, default_value_t = 5)]
        read_timeout: u64,
    },
    /// Join a chat room; type lines to send them, Ctrl-D to leave.
    Client {
        /// Server address.
        #[arg(short, long, default_value_t = format!("127.0.0.1:{PORT}"))]
        addr: String,

        /// Display name (random if omitted).
        #[arg(short, long)]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    match Cli::parse().command {
        Command::Server { port, read_timeout } => run_server(port, read_timeout).await,
        Command::Client { addr, name } => run_client(&addr, name).await,
    }
}

async fn run_server(port: u16, read_timeout: u64) -> Result<()> {
    let builder = ServerBuilder::new()
        .bind(format!("0.0.0.0:{port}"))
        .config(ServerConfig {
            read_timeout: Duration::from_secs(read_timeout),
            ..ServerConfig::default()
        });
    let server = ChatServer::start_with(builder)
        .await
        .with_context(|| format!("could not start chat server on port {port}"))?;
    println!("chat server on {}, Ctrl-C to stop", server.local_addr());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    println!("shutting down after {} lines", server.log().len());
    server.close(true).await;
    Ok(())
}

async fn run_client(addr: &str, name: Option<String>) -> Result<()> {
    let client = match name {
        Some(name) => ChatClient::connect_as(addr, name).await,
        None => ChatClient::connect(addr).await,
    }
    .with_context(|| format!("could not reach chat server at {addr}"))?;
    println!("joined {addr} as {}", client.name());

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut refresh = tokio::time::interval(Duration::from_millis(100));

    loop {
        tokio::select! {
            line = stdin.next_line() => match line.context("failed to read stdin")? {
                Some(line) => client.send_message(line),
                None => break,
            },
            _ = refresh.tick() => {
                for line in client.get_messages() {
                    println!("{line}");
                }
                if !client.is_connected() {
                    println!("connection closed");
                    break;
                }
            }
        }
    }

    client.disconnect();
    // Give the goodbye a moment to reach the server.
    tokio::time::sleep(Duration::from_millis(100)).await;
    client.close().await;
    Ok(())
}
