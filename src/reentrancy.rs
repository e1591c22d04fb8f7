//! Debug-only reentrancy guard for heap pauses.
//!
//! A pause holds the heap lock. Taking a second pause on a thread that
//! already holds one would deadlock, so in debug builds entering twice
//! without dropping the guard panics instead. In release builds this
//! compiles to a zero-cost no-op.

#[cfg(debug_assertions)]
use core::cell::Cell;
use core::marker::PhantomData;

#[cfg(debug_assertions)]
thread_local! {
    static DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Per-thread reentrancy tracker. Guard entry points with
/// `let _g = DebugReentrancy::enter();`.
#[derive(Debug)]
pub(crate) struct DebugReentrancy;

impl DebugReentrancy {
    /// Enter a guarded section. In debug builds, panics if this thread is
    /// already inside one.
    #[inline]
    pub(crate) fn enter() -> ReentrancyGuard {
        #[cfg(debug_assertions)]
        DEPTH.with(|depth| {
            let d = depth.get();
            assert!(d == 0, "reentrancy detected: heap pause taken twice on one thread");
            depth.set(d + 1);
        });
        ReentrancyGuard {
            _nosend: PhantomData,
        }
    }

    #[cfg(all(test, debug_assertions))]
    pub(crate) fn depth() -> u32 {
        DEPTH.with(Cell::get)
    }
}

/// RAII guard returned by `DebugReentrancy::enter`. Bound to the thread
/// that created it.
pub(crate) struct ReentrancyGuard {
    _nosend: PhantomData<*mut ()>,
}

impl Drop for ReentrancyGuard {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        DEPTH.with(|depth| {
            let d = depth.get();
            debug_assert!(d > 0);
            depth.set(d - 1);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::DebugReentrancy;

    #[test]
    fn enter_and_exit_is_ok() {
        let _g = DebugReentrancy::enter();
        drop(_g);
        let _again = DebugReentrancy::enter();
    }

    #[cfg(debug_assertions)]
    #[test]
    fn reentrancy_panics_in_debug() {
        let res = std::panic::catch_unwind(|| {
            let _g1 = DebugReentrancy::enter();
            // Re-entering should panic in debug builds
            let _g2 = DebugReentrancy::enter();
        });
        assert!(res.is_err(), "expected reentrancy to panic in debug builds");
        assert_eq!(DebugReentrancy::depth(), 0, "outer guard unwound cleanly");
    }

    #[cfg(debug_assertions)]
    #[test]
    fn depth_is_per_thread() {
        let _g = DebugReentrancy::enter();
        std::thread::spawn(|| {
            let _other = DebugReentrancy::enter();
        })
        .join()
        .expect("other thread has its own depth");
    }

    #[cfg(not(debug_assertions))]
    #[test]
    fn reentrancy_noop_in_release() {
        let _g1 = DebugReentrancy::enter();
        let _g2 = DebugReentrancy::enter();
        let (_g1, _g2) = (_g1, _g2);
    }
}
