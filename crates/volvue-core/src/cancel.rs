//! Cooperative cancellation
//!
//! Every load holds a token; supersession or an explicit abort flips it
//! and the loader observes the flag between chunks. Stores are expected
//! to check the same token inside long fetches.

use crate::{Result, VolvueError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Bail out with `Cancelled` when the token has been flipped
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(VolvueError::Cancelled)
        } else {
            Ok(())
        }
    }
}
