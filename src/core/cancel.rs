use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation token. Cancellation propagates downward only:
/// cancelling a parent cancels every descendant, cancelling a child leaves
/// the parent untouched.
#[derive(Clone)]
pub struct CancelToken {
    // Ancestor flags first, own flag last.
    flags: Vec<Arc<AtomicBool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken {
            flags: vec![Arc::new(AtomicBool::new(false))],
        }
    }

    /// A token scoped below this one.
    pub fn child(&self) -> Self {
        let mut flags = self.flags.clone();
        flags.push(Arc::new(AtomicBool::new(false)));
        CancelToken { flags }
    }

    pub fn cancel(&self) {
        if let Some(flag) = self.flags.last() {
            flag.store(true, Ordering::SeqCst);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.flags.iter().any(|f| f.load(Ordering::SeqCst))
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_propagates_down() {
        let root = CancelToken::new();
        let child = root.child();
        let grandchild = child.child();

        root.cancel();
        assert!(root.is_cancelled());
        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
    }

    #[test]
    fn test_child_cancel_does_not_reach_parent() {
        let root = CancelToken::new();
        let child = root.child();

        child.cancel();
        assert!(child.is_cancelled());
        assert!(!root.is_cancelled());
    }

    #[test]
    fn test_siblings_independent() {
        let root = CancelToken::new();
        let a = root.child();
        let b = root.child();

        a.cancel();
        assert!(a.is_cancelled());
        assert!(!b.is_cancelled());
    }
}
