//! Cooperative cancellation for long-running traversals (spec.md §5): fold,
//! the commit tree walk, and similar operations poll a `Cancel` at bounded
//! intervals rather than being preempted.

/// Polled by long-running traversals; `true` means stop at the next
/// opportunity and return [`crate::Error::Cancelled`].
pub trait Cancel {
    fn is_cancelled(&self) -> bool;
}

/// The default: never cancels. Used wherever a caller doesn't wire up a
/// real cancellation source.
pub struct NeverCancel;

impl Cancel for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

impl Cancel for std::sync::atomic::AtomicBool {
    fn is_cancelled(&self) -> bool {
        self.load(std::sync::atomic::Ordering::Relaxed)
    }
}
