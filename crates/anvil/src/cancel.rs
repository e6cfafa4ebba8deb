//! Cooperative cancellation of a running deployment.
//!
//! A [`CancelHandle`] flips a `watch` flag; every network stage races its
//! work against [`Cancellation::cancelled`] and drops the in-flight request
//! when the flag is set.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

use crate::error::{DeployError, Stage};

/// Trigger side. Dropping every handle does not cancel.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
        tracing::debug!("cancellation requested");
    }
}

/// Observer side, handed to the pipeline.
#[derive(Debug, Clone)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

pub fn cancellation() -> (CancelHandle, Cancellation) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx: Arc::new(tx) }, Cancellation { rx })
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::never()
    }
}

impl Cancellation {
    /// A cancellation that never fires.
    pub fn never() -> Self {
        let (_, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested; pends forever if every
    /// handle is gone first.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    pub fn check(&self, stage: Stage) -> Result<(), DeployError> {
        if self.is_cancelled() {
            Err(DeployError::Cancelled { stage })
        } else {
            Ok(())
        }
    }

    /// Drive `work` to completion unless cancellation fires first, in which
    /// case `work` is dropped.
    pub async fn run<F: Future>(&self, stage: Stage, work: F) -> Result<F::Output, DeployError> {
        tokio::select! {
            biased;
            () = self.cancelled() => {
                tracing::warn!(%stage, "stage aborted");
                Err(DeployError::Cancelled { stage })
            }
            output = work => Ok(output),
        }
    }
}
