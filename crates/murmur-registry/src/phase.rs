//! Server lifecycle state machine.

use std::fmt;

/// The lifecycle phase of a server.
///
/// Transitions are strictly ordered, no skipping:
///
/// ```text
/// Starting → Running → Closing → Closed
/// ```
///
/// Accepting or refusing new sessions is NOT a phase: that's the separate
/// `accepting` gate on the [`Registry`](crate::Registry). A `Running`
/// server keeps draining its listen queue even while the gate is shut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerPhase {
    /// Listener bound, accept loop not yet spawned.
    #[default]
    Starting,
    /// Accept loop running.
    Running,
    /// `close` in progress: no new peers, existing ones being retired.
    Closing,
    /// Fully quiesced.
    Closed,
}

impl ServerPhase {
    /// Returns the phase that follows this one, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Starting => Some(Self::Running),
            Self::Running => Some(Self::Closing),
            Self::Closing => Some(Self::Closed),
            Self::Closed => None,
        }
    }

    /// Returns `true` if transitioning to `target` is valid.
    pub fn can_transition_to(self, target: Self) -> bool {
        self.next() == Some(target)
    }

    /// Returns `true` while the server still admits new peers.
    pub fn admits_peers(self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }
}

impl fmt::Display for ServerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "Starting"),
            Self::Running => write!(f, "Running"),
            Self::Closing => write!(f, "Closing"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}
