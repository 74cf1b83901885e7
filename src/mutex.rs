//! Provides the timed mutual exclusion the bus arbiter is built on.

use std::time::Duration;

/// Any type that can implement `BusMutex` can be used to guard the bus interface shared by all
/// expander banks.
///
/// Unlike a plain lock, acquisition is bounded: a caller gives up after `timeout` and decides for
/// itself whether to retry (writes) or fall back to something it already has (cached reads).
/// `parking_lot::Mutex` implements it, and [`DefaultMutex<T>`] points at it.
pub trait BusMutex<T> {
    /// Construct a new instance of this mutex containing the value `v`.
    fn new(v: T) -> Self;

    /// Try to lock the mutex for up to `timeout`. If it is obtained, call the closure `f` as a
    /// critical section, passing a mutable reference to the owned value, and return what `f`
    /// returns. If the timeout elapses first `f` is not called and `None` is returned.
    fn try_lock_for<R, F: FnOnce(&mut T) -> R>(&self, timeout: Duration, f: F) -> Option<R>;

    /// Give the scheduler a chance to run something else between two failed attempts.
    fn relax(&self) {
        std::thread::yield_now()
    }
}

pub type DefaultMutex<T> = parking_lot::Mutex<T>;

impl<T> BusMutex<T> for parking_lot::Mutex<T> {
    fn new(v: T) -> Self {
        parking_lot::Mutex::new(v)
    }
    fn try_lock_for<R, F: FnOnce(&mut T) -> R>(&self, timeout: Duration, f: F) -> Option<R> {
        let mut v = parking_lot::Mutex::try_lock_for(self, timeout)?;
        Some(f(&mut v))
    }
}
