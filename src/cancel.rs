use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::Error;

/// Cooperative cancellation handle shared between the caller and every
/// blocking operation in the crate. Cloning is cheap; all clones observe
/// the same flag.
///
/// Cancellation is polled at loop boundaries and inside waiter waits, so
/// one caller withdrawing never tears down work other callers are still
/// waiting on.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    fired: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the token. Idempotent.
    pub fn cancel(&self) {
        self.fired.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// # Errors
    ///
    /// Returns `Error::Cancelled` once the token has fired.
    pub(crate) fn ensure_live(&self) -> Result<(), Error> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
        assert!(other.ensure_live().is_err());
    }
}
