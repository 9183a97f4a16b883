//! Cooperative cancellation shared by every stage of one task.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{PipelineError, Result};

/// Cloneable cancellation flag.
///
/// Setting the flag never interrupts a stage; stages poll it at safe points
/// and return [`PipelineError::Canceled`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    requested: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        // Release pairs with the Acquire load so stages see prior writes
        self.requested.store(true, Ordering::Release);
    }

    pub fn is_canceled(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Returns `Err(Canceled)` once cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_canceled() {
            Err(PipelineError::Canceled)
        } else {
            Ok(())
        }
    }
}
