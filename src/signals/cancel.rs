/*!
 * Cancellation Tokens
 * Level-triggered cancellation shared between the CLI, the queue and the pipeline
 */

use tokio::sync::watch;

/// Owner side: flips the flag once
#[derive(Debug)]
pub struct CancelSource {
    tx: watch::Sender<bool>,
}

impl CancelSource {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: Some(self.tx.subscribe()),
        }
    }

    /// Request cancellation. Returns `false` if it was already requested.
    pub fn cancel(&self) -> bool {
        self.tx.send_if_modified(|flag| {
            if *flag {
                false
            } else {
                *flag = true;
                true
            }
        })
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: Option<watch::Receiver<bool>>,
}

impl CancelToken {
    /// A token that is never cancelled
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Resolve once cancellation is requested. Pends forever if the source
    /// is dropped without cancelling.
    pub async fn cancelled(&self) {
        let Some(rx) = &self.rx else {
            return std::future::pending().await;
        };
        let mut rx = rx.clone();
        if rx.wait_for(|flag| *flag).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
