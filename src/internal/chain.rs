//! Per-thread resolution chain for cycle detection and edge capture.
//!
//! Every in-flight resolution pushes its key onto a thread-local stack.
//! Re-entry on a key already in the stack is the cycle predicate; the key at
//! the top of the stack is the parent for dependency-edge capture. Chains
//! are strictly per-thread, so concurrent resolutions never observe each
//! other's stacks.

use std::cell::RefCell;

use crate::error::{Error, Result};
use crate::key::Key;

const MAX_DEPTH: usize = 1024;

thread_local! {
    static CHAIN: RefCell<Vec<Key>> = const { RefCell::new(Vec::new()) };
}

/// The key currently being resolved on this thread, if any.
///
/// This is the parent of whatever lookup happens next; the resolver records
/// the `(parent, child)` edge before entering the child's frame.
pub(crate) fn parent() -> Option<Key> {
    CHAIN.with(|chain| chain.borrow().last().copied())
}

/// Depth of the open chain on this thread.
pub(crate) fn depth() -> usize {
    CHAIN.with(|chain| chain.borrow().len())
}

/// Renders the open chain as `a -> b -> c`.
pub(crate) fn render() -> String {
    CHAIN.with(|chain| {
        chain
            .borrow()
            .iter()
            .map(|k| k.display_name())
            .collect::<Vec<_>>()
            .join(" -> ")
    })
}

/// Opens a resolution frame for `key`.
///
/// The cycle test runs against the stack BEFORE the frame is pushed, and
/// therefore before the caller acquires any wrapper lock; a factory that
/// re-enters its own key fails here instead of deadlocking on the wrapper's
/// once-guard. The returned guard pops the frame on drop.
pub(crate) fn enter(key: Key) -> Result<ChainGuard> {
    CHAIN.with(|chain| {
        let mut chain = chain.borrow_mut();

        if chain.iter().any(|k| *k == key) {
            let mut path: Vec<&Key> = chain.iter().collect();
            path.push(&key);
            return Err(Error::cycle(path));
        }
        if chain.len() >= MAX_DEPTH {
            return Err(Error::InvalidProvider {
                key: key.display_name().to_string(),
                reason: format!("resolution chain exceeded {MAX_DEPTH} frames"),
            });
        }

        chain.push(key);
        Ok(ChainGuard { key })
    })
}

/// Guard owning one frame of the thread's resolution chain.
#[derive(Debug)]
pub(crate) struct ChainGuard {
    key: Key,
}

impl Drop for ChainGuard {
    fn drop(&mut self) {
        CHAIN.with(|chain| {
            let popped = chain.borrow_mut().pop();
            debug_assert_eq!(popped, Some(self.key));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::key_of;

    #[test]
    fn re_entry_reports_the_full_chain() {
        let a = key_of::<u8>();
        let b = key_of::<u16>();

        let _ga = enter(a).unwrap();
        let _gb = enter(b).unwrap();
        let err = enter(a).unwrap_err();
        match err {
            Error::Cycle { chain } => {
                assert_eq!(chain, vec!["u8", "u16", "u8"]);
            }
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[test]
    fn guard_pops_on_drop() {
        let a = key_of::<u32>();
        {
            let _g = enter(a).unwrap();
            assert_eq!(depth(), 1);
            assert_eq!(parent(), Some(a));
        }
        assert_eq!(depth(), 0);
        assert_eq!(parent(), None);
        // The key is resolvable again once the frame is gone.
        let _g = enter(a).unwrap();
    }

    #[test]
    fn chains_are_per_thread() {
        let a = key_of::<u64>();
        let _g = enter(a).unwrap();

        std::thread::spawn(move || {
            assert_eq!(depth(), 0);
            let _g = enter(a).unwrap();
            assert_eq!(depth(), 1);
        })
        .join()
        .unwrap();
    }
}
