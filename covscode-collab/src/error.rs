//! Session-level errors.

use crate::config::ConfigError;
use crate::host::HostError;
use crate::session::SessionPhase;
use crate::signal::SignalError;
use crate::transport::TransportError;

/// Errors surfaced by [`RepoSession`](crate::session::RepoSession).
///
/// Only the connect handshake and the join snapshot propagate; inbound
/// dispatch logs and notifies instead of returning errors.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// The requested transition is not allowed from this phase
    InvalidPhase(SessionPhase),
    Transport(TransportError),
    /// Site id or snapshot never arrived, or the server refused the join
    Handshake(SignalError),
    Host(HostError),
    Config(ConfigError),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPhase(phase) => write!(f, "Session error: not allowed while {phase:?}"),
            Self::Transport(e) => write!(f, "Session transport error: {e}"),
            Self::Handshake(e) => write!(f, "Session handshake error: {e}"),
            Self::Host(e) => write!(f, "Session host error: {e}"),
            Self::Config(e) => write!(f, "Session config error: {e}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<TransportError> for SessionError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<SignalError> for SessionError {
    fn from(e: SignalError) -> Self {
        Self::Handshake(e)
    }
}

impl From<HostError> for SessionError {
    fn from(e: HostError) -> Self {
        Self::Host(e)
    }
}

impl From<ConfigError> for SessionError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_detail() {
        let err = SessionError::from(SignalError::TimedOut);
        assert_eq!(err.to_string(), "Session handshake error: Signal timed out");

        let err = SessionError::InvalidPhase(SessionPhase::Closing);
        assert_eq!(err.to_string(), "Session error: not allowed while Closing");
    }

    #[test]
    fn test_from_host_error() {
        let err: SessionError = HostError::Archive("bad zip".into()).into();
        assert!(matches!(err, SessionError::Host(HostError::Archive(_))));
    }
}
