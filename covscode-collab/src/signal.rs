//! One-shot signal for handshake waits.
//!
//! ```text
//! let (signal, waiter) = signal::<String>();
//!   signal  ── stored where the message will arrive (dispatcher side)
//!   waiter  ── awaited by the caller driving the handshake
//! ```
//!
//! Exactly one resolution: `resolve` and `fail` consume the signal.
//! A pair is created fresh per connect attempt; dropping the signal
//! unresolved wakes the waiter with [`SignalError::Abandoned`].

use std::time::Duration;
use tokio::sync::oneshot;

/// Create a connected signal/waiter pair.
pub fn signal<T>() -> (Signal<T>, SignalWaiter<T>) {
    let (tx, rx) = oneshot::channel();
    (Signal { tx }, SignalWaiter { rx })
}

/// Resolving half.
#[derive(Debug)]
pub struct Signal<T> {
    tx: oneshot::Sender<Result<T, SignalError>>,
}

impl<T> Signal<T> {
    /// Deliver the value. Returns false if the waiter is gone.
    pub fn resolve(self, value: T) -> bool {
        self.tx.send(Ok(value)).is_ok()
    }

    /// Wake the waiter with a failure. Returns false if the waiter is gone.
    pub fn fail(self, reason: impl Into<String>) -> bool {
        self.tx.send(Err(SignalError::Failed(reason.into()))).is_ok()
    }

    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Waiting half.
#[derive(Debug)]
pub struct SignalWaiter<T> {
    rx: oneshot::Receiver<Result<T, SignalError>>,
}

impl<T> SignalWaiter<T> {
    pub async fn wait(self) -> Result<T, SignalError> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(SignalError::Abandoned),
        }
    }

    pub async fn wait_timeout(self, limit: Duration) -> Result<T, SignalError> {
        match tokio::time::timeout(limit, self.wait()).await {
            Ok(result) => result,
            Err(_) => Err(SignalError::TimedOut),
        }
    }
}

/// Signal errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalError {
    /// The resolving half was dropped without a value
    Abandoned,
    TimedOut,
    Failed(String),
}

impl std::fmt::Display for SignalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Abandoned => write!(f, "Signal abandoned before resolution"),
            Self::TimedOut => write!(f, "Signal timed out"),
            Self::Failed(reason) => write!(f, "Signal failed: {reason}"),
        }
    }
}

impl std::error::Error for SignalError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_signal_resolves() {
        let (signal, waiter) = signal::<String>();
        tokio::spawn(async move {
            signal.resolve("site-1".to_string());
        });
        assert_eq!(waiter.wait().await.unwrap(), "site-1");
    }

    #[tokio::test]
    async fn test_signal_fail() {
        let (signal, waiter) = signal::<()>();
        assert!(signal.fail("connection closed"));
        assert_eq!(waiter.wait().await, Err(SignalError::Failed("connection closed".into())));
    }

    #[tokio::test]
    async fn test_signal_dropped_is_abandoned() {
        let (signal, waiter) = signal::<u32>();
        drop(signal);
        assert_eq!(waiter.wait().await, Err(SignalError::Abandoned));
    }

    #[tokio::test]
    async fn test_signal_timeout() {
        let (_signal, waiter) = signal::<u32>();
        let result = waiter.wait_timeout(Duration::from_millis(20)).await;
        assert_eq!(result, Err(SignalError::TimedOut));
    }

    #[tokio::test]
    async fn test_resolve_after_waiter_dropped() {
        let (signal, waiter) = signal::<u32>();
        drop(waiter);
        assert!(signal.is_abandoned());
        assert!(!signal.resolve(7));
    }
}
