// src/cancel.rs

//! Cancellation and deadline signalling for resolve calls
//!
//! A [`Cancellation`] is cheap to clone and checked at fetch and
//! computation boundaries. Child signals observe their parent, so a
//! fan-out driver can stop every worker at once.

use crate::error::{Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
    parent: Option<Arc<Cancellation>>,
}

impl Cancellation {
    /// A signal that only fires when [`cancel`](Self::cancel) is called
    pub fn new() -> Self {
        Self::default()
    }

    /// A signal that also fires once `timeout` has elapsed
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            ..Self::default()
        }
    }

    /// Derive a signal that fires with this one or on its own
    pub fn child(&self) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: self.deadline,
            parent: Some(Arc::new(self.clone())),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.flag.load(Ordering::SeqCst) {
            return true;
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return true;
        }
        self.parent.as_ref().is_some_and(|p| p.is_cancelled())
    }

    /// Return `Error::Cancelled` if the signal has fired
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_propagates_to_clones_and_children() {
        let root = Cancellation::new();
        let clone = root.clone();
        let child = root.child();
        assert!(root.check().is_ok());

        root.cancel();
        assert!(clone.is_cancelled());
        assert!(child.is_cancelled());
        assert!(matches!(child.check(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_child_cancel_does_not_reach_parent() {
        let root = Cancellation::new();
        let child = root.child();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!root.is_cancelled());
    }

    #[test]
    fn test_deadline() {
        let expired = Cancellation::with_timeout(Duration::ZERO);
        assert!(expired.is_cancelled());

        let later = Cancellation::with_timeout(Duration::from_secs(3600));
        assert!(!later.is_cancelled());
    }
}
