//! Cooperative cancellation for long-running scans (`walk`, fragmentation
//! and block-range analyses). The core is synchronous; there is no other
//! way to interrupt a scan in progress.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{HfsError, Result};

#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Returns `Err(HfsError::Cancelled)` if cancellation has been
    /// requested, `Ok(())` otherwise. Intended to be polled between
    /// node reads, not between records within a node.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(HfsError::Cancelled)
        } else {
            Ok(())
        }
    }
}
