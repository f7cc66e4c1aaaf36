//! Cooperative cancellation for in-flight oracle calls.

use tokio::sync::watch;

/// Owner side: cancels every token created from it.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

/// Observer side, cloned into whatever is doing the work.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    rx: Option<watch::Receiver<bool>>,
}

/// Create a connected handle/token pair.
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx: Some(rx) })
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: Some(self.tx.subscribe()),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl CancelToken {
    /// A token that is never cancelled.
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Resolves once cancellation is requested. If the handle is dropped
    /// without cancelling, this never resolves.
    pub async fn cancelled(&self) {
        let Some(rx) = &self.rx else {
            return std::future::pending().await;
        };
        let mut rx = rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_wakes_waiter() {
        let (handle, token) = cancel_pair();
        let waiter = tokio::spawn({
            let token = token.clone();
            async move { token.cancelled().await }
        });
        assert!(!token.is_cancelled());
        handle.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert!(token.is_cancelled());
        assert!(handle.token().is_cancelled());
    }

    #[tokio::test]
    async fn test_never_token_stays_pending() {
        let token = CancelToken::never();
        assert!(!token.is_cancelled());
        let outcome = tokio::time::timeout(Duration::from_millis(20), token.cancelled()).await;
        assert!(outcome.is_err());
    }

    #[tokio::test]
    async fn test_dropped_handle_never_cancels() {
        let (handle, token) = cancel_pair();
        drop(handle);
        let outcome = tokio::time::timeout(Duration::from_millis(20), token.cancelled()).await;
        assert!(outcome.is_err());
        assert!(!token.is_cancelled());
    }
}
