// ============================================================
// Layer 6 — Run Cancellation
// ============================================================
// A shared flag set once by Ctrl-C and polled by workers at stage
// boundaries. Questions not yet started are answered with a
// "cancelled" record; records already written stay flushed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};

#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Route SIGINT to this flag. Can only be installed once per process.
    pub fn install_ctrlc_handler(&self) -> Result<()> {
        let flag = self.clone();
        ctrlc::set_handler(move || {
            if !flag.is_cancelled() {
                tracing::warn!("Interrupt received: finishing in-flight questions, skipping the rest");
            }
            flag.cancel();
        })
        .context("Failed to install Ctrl-C handler")
    }
}
