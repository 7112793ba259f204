//! Parallel-For Abstraction
//!
//! The pipeline fans out work through [`for_loop`] and the map-style
//! [`map_collect`]; with the `parallel` feature these dispatch to Rayon,
//! otherwise they run serially on the calling thread. There are no
//! suspension points; the only wait is the implicit barrier at the end of
//! each call.
//!
//! [`SpinLock`] serializes the rare cross-worker mutations (the broad-phase
//! cell set during entry updates). Workers hold it for a handful of list
//! operations, so spinning beats parking.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Run `body(i)` for every `i in 0..count`, possibly in parallel.
pub fn for_loop<F>(count: usize, body: F)
where
    F: Fn(usize) + Sync + Send,
{
    #[cfg(feature = "parallel")]
    {
        (0..count).into_par_iter().for_each(|i| body(i));
    }

    #[cfg(not(feature = "parallel"))]
    {
        for i in 0..count {
            body(i);
        }
    }
}

/// Map `body(i)` over `0..count` and collect the results in index order.
///
/// Each worker produces into its own output slot, so results merge without
/// locks at the barrier.
pub fn map_collect<T, F>(count: usize, body: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    #[cfg(feature = "parallel")]
    {
        (0..count).into_par_iter().map(|i| body(i)).collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        (0..count).map(body).collect()
    }
}

/// A minimal test-and-set spin lock.
///
/// Guards short critical sections (a few list operations) where parking a
/// thread would cost more than spinning. Not reentrant.
pub struct SpinLock<T> {
    locked: AtomicBool,
    value: UnsafeCell<T>,
}

// The lock provides the necessary synchronization for &mut access.
unsafe impl<T: Send> Send for SpinLock<T> {}
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    /// Create a new unlocked spin lock.
    pub const fn new(value: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            value: UnsafeCell::new(value),
        }
    }

    /// Acquire the lock, spinning until it is available.
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }
        SpinLockGuard { lock: self }
    }

    /// Access the value without locking. Requires exclusive ownership, so no
    /// other thread can hold the lock.
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    /// Consume the lock and return the inner value.
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

/// RAII guard returned by [`SpinLock::lock`].
pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // Safety: the guard holds the lock.
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        // Safety: the guard holds the lock exclusively.
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::AtomicUsize;

    #[test]
    fn test_for_loop_covers_range() {
        let hits = AtomicUsize::new(0);
        for_loop(100, |_| {
            hits.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(hits.load(Ordering::Relaxed), 100);
    }

    #[test]
    fn test_map_collect_index_order() {
        let out = map_collect(50, |i| i * 2);
        for (i, v) in out.iter().enumerate() {
            assert_eq!(*v, i * 2);
        }
    }

    #[test]
    fn test_spin_lock_serializes() {
        let lock = SpinLock::new(0u64);
        for_loop(64, |_| {
            let mut guard = lock.lock();
            *guard += 1;
        });
        assert_eq!(*lock.lock(), 64);
    }

    #[test]
    fn test_spin_lock_get_mut() {
        let mut lock = SpinLock::new(5);
        *lock.get_mut() = 10;
        assert_eq!(lock.into_inner(), 10);
    }
}
