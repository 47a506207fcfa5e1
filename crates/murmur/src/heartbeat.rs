//! Liveness tracking for one server-side connection.
//!
//! The read loop waits at most one read timeout for each frame. Every
//! expired window is reported here, and the answer decides what happens:
//!
//! ```text
//!            traffic                       timeout
//!   ┌──────────────────────┐   ┌─────────────────────────────┐
//!   ▼                      │   │                             ▼
//! [Alive] ── timeout ──→ [Probed] (Ping sent) ── timeout ──→ Expire
//!   ▲                      │
//!   └────── traffic ───────┘
//! ```
//!
//! Any frame counts as traffic, not only a Pong: a client that is busy
//! talking is evidently alive.

/// What the read loop should do after a silent read window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// First silent window: ask the client if it is still there.
    SendPing,
    /// Second silent window in a row: the client is gone.
    Expire,
}

/// The two-strike liveness state machine.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    confirmed_alive: bool,
}

impl Heartbeat {
    /// A fresh connection counts as alive.
    pub fn new() -> Self {
        Self {
            confirmed_alive: true,
        }
    }

    /// Records that a frame arrived.
    pub fn on_traffic(&mut self) {
        self.confirmed_alive = true;
    }

    /// Records a read window that passed without a frame.
    pub fn on_timeout(&mut self) -> HeartbeatAction {
        if self.confirmed_alive {
            self.confirmed_alive = false;
            HeartbeatAction::SendPing
        } else {
            HeartbeatAction::Expire
        }
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_timeout_pings() {
        let mut hb = Heartbeat::new();
        assert_eq!(hb.on_timeout(), HeartbeatAction::SendPing);
    }

    #[test]
    fn test_second_consecutive_timeout_expires() {
        let mut hb = Heartbeat::new();
        hb.on_timeout();
        assert_eq!(hb.on_timeout(), HeartbeatAction::Expire);
    }

    #[test]
    fn test_traffic_between_timeouts_resets() {
        let mut hb = Heartbeat::new();
        for _ in 0..10 {
            assert_eq!(hb.on_timeout(), HeartbeatAction::SendPing);
            hb.on_traffic();
        }
    }
}
