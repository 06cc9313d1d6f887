//! One-way readiness flags shared between background waiters and reconcilers

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Flag that starts unset and is set once a dependency becomes usable
///
/// Clones share the same underlying flag.
#[derive(Clone, Debug, Default)]
pub struct ReadyFlag(Arc<AtomicBool>);

impl ReadyFlag {
    /// Create an unset flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag
    pub fn mark_as_ready(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether the flag has been set
    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let flag = ReadyFlag::new();
        let waiter = flag.clone();
        assert!(!flag.is_ready());

        waiter.mark_as_ready();
        assert!(flag.is_ready());
    }
}
