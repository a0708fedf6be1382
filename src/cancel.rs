//! Cooperative cancellation, checked between titration points and PSO iterations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{KineticsError, Result};

/// Shared flag that long runs poll at their natural checkpoints.
///
/// Cloning shares the same flag, so a handle kept by a caller (or a signal
/// handler) can stop a run that owns another clone.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Return `Err(Cancelled)` once cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(KineticsError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Checkpoint helper for call sites that take an optional token.
pub(crate) fn checkpoint(token: Option<&CancellationToken>) -> Result<()> {
    match token {
        Some(token) => token.check(),
        None => Ok(()),
    }
}
