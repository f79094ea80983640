//! Spin-then-block mutual exclusion.
//!
//! [`RawAdaptiveLock`] spins on an atomic flag for a bounded number of
//! iterations and only then parks the thread on a condition variable. Most
//! critical sections in the pool are a queue push or pop, so the spin phase
//! usually wins and no context switch happens. When the holder keeps the lock
//! longer than the spin window, waiters go to sleep instead of burning CPU.
//!
//! The lock is not reentrant: locking it twice from the same thread deadlocks.

use crossbeam::utils::CachePadded;
use parking_lot::{Condvar, Mutex};
use std::{
    cell::UnsafeCell,
    fmt,
    hint,
    marker::PhantomData,
    ops::{Deref, DerefMut},
    sync::atomic::{self, AtomicBool, AtomicUsize, Ordering},
};

/// Spin iterations attempted before a locker falls back to blocking.
pub const DEFAULT_SPIN_LIMIT: usize = 2048;

/// The bare lock: an atomic "held" flag plus a mutex/condvar pair that is
/// only touched on the slow path.
///
/// Whichever thread flips `held` from `false` to `true` owns the lock until it
/// stores `false` again; the blocking primitives never decide ownership.
pub struct RawAdaptiveLock {
    held: CachePadded<AtomicBool>,
    sleepers: AtomicUsize,
    gate: Mutex<()>,
    released: Condvar,
    spin_limit: usize,
}

impl RawAdaptiveLock {
    pub fn new() -> Self {
        Self::with_spin_limit(DEFAULT_SPIN_LIMIT)
    }

    /// A `spin_limit` of zero sends every contended `lock` straight to the
    /// blocking path.
    pub fn with_spin_limit(spin_limit: usize) -> Self {
        Self {
            held: CachePadded::new(AtomicBool::new(false)),
            sleepers: AtomicUsize::new(0),
            gate: Mutex::new(()),
            released: Condvar::new(),
            spin_limit,
        }
    }

    pub fn spin_limit(&self) -> usize {
        self.spin_limit
    }

    /// Attempts to take the lock without waiting.
    ///
    /// The relaxed pre-check keeps a `while !try_lock() {}` loop from hammering
    /// the cache line with writes while someone else holds the lock.
    #[inline]
    pub fn try_lock(&self) -> bool {
        !self.held.load(Ordering::Relaxed) && self.acquire()
    }

    pub fn lock(&self) {
        if self.spin() {
            return;
        }
        self.lock_slow();
    }

    /// Releases the lock and wakes at most one sleeping locker.
    ///
    /// # Safety
    ///
    /// The calling thread must currently own the lock, i.e. a preceding
    /// `lock` or successful `try_lock` has not been matched by an `unlock` yet.
    #[inline]
    pub unsafe fn unlock(&self) {
        self.held.store(false, Ordering::Release);

        // Pairs with the fence in `lock_slow`: either we see the sleeper, or
        // the sleeper's exchange sees the store above.
        atomic::fence(Ordering::SeqCst);
        if self.sleepers.load(Ordering::Relaxed) > 0 {
            // The sleeper holds `gate` from its failed exchange until it is
            // parked, so taking it here means the notify cannot be missed.
            drop(self.gate.lock());
            self.released.notify_one();
        }
    }

    pub fn is_locked(&self) -> bool {
        self.held.load(Ordering::Relaxed)
    }

    #[inline]
    fn acquire(&self) -> bool {
        !self.held.swap(true, Ordering::Acquire)
    }

    fn spin(&self) -> bool {
        for _ in 0..self.spin_limit {
            if self.try_lock() {
                return true;
            }
            hint::spin_loop();
        }
        false
    }

    #[cold]
    fn lock_slow(&self) {
        let mut gate = self.gate.lock();
        self.sleepers.fetch_add(1, Ordering::Relaxed);
        atomic::fence(Ordering::SeqCst);

        // Spurious wakeups simply retry the exchange.
        while !self.acquire() {
            self.released.wait(&mut gate);
        }

        self.sleepers.fetch_sub(1, Ordering::Relaxed);
    }
}

impl Default for RawAdaptiveLock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RawAdaptiveLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawAdaptiveLock")
            .field("held", &self.is_locked())
            .field("sleepers", &self.sleepers.load(Ordering::Relaxed))
            .field("spin_limit", &self.spin_limit)
            .finish()
    }
}

/// An adaptive lock that owns the data it protects.
pub struct AdaptiveLock<T: ?Sized> {
    raw: RawAdaptiveLock,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for AdaptiveLock<T> {}
unsafe impl<T: ?Sized + Send> Sync for AdaptiveLock<T> {}

impl<T> AdaptiveLock<T> {
    pub fn new(value: T) -> Self {
        Self::with_spin_limit(value, DEFAULT_SPIN_LIMIT)
    }

    pub fn with_spin_limit(value: T, spin_limit: usize) -> Self {
        Self {
            raw: RawAdaptiveLock::with_spin_limit(spin_limit),
            data: UnsafeCell::new(value),
        }
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> AdaptiveLock<T> {
    pub fn lock(&self) -> AdaptiveLockGuard<'_, T> {
        self.raw.lock();
        AdaptiveLockGuard::new(self)
    }

    pub fn try_lock(&self) -> Option<AdaptiveLockGuard<'_, T>> {
        if self.raw.try_lock() {
            Some(AdaptiveLockGuard::new(self))
        } else {
            None
        }
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    pub fn is_locked(&self) -> bool {
        self.raw.is_locked()
    }

    pub fn raw(&self) -> &RawAdaptiveLock {
        &self.raw
    }
}

impl<T: Default> Default for AdaptiveLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for AdaptiveLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_lock() {
            Some(guard) => f.debug_struct("AdaptiveLock").field("data", &&*guard).finish(),
            None => f.debug_struct("AdaptiveLock").field("data", &"<locked>").finish(),
        }
    }
}

/// RAII guard; the lock is released when it goes out of scope.
#[must_use = "if unused the AdaptiveLock will immediately unlock"]
pub struct AdaptiveLockGuard<'a, T: ?Sized> {
    lock: &'a AdaptiveLock<T>,
    _not_send: PhantomData<*const ()>,
}

unsafe impl<T: ?Sized + Sync> Sync for AdaptiveLockGuard<'_, T> {}

impl<'a, T: ?Sized> AdaptiveLockGuard<'a, T> {
    fn new(lock: &'a AdaptiveLock<T>) -> Self {
        Self {
            lock,
            _not_send: PhantomData,
        }
    }

    /// Releases the lock while `f` runs and re-acquires it afterwards, even if
    /// `f` unwinds.
    pub fn unlocked<F, U>(this: &mut Self, f: F) -> U
    where
        F: FnOnce() -> U,
    {
        struct Relock<'b>(&'b RawAdaptiveLock);

        impl Drop for Relock<'_> {
            fn drop(&mut self) {
                self.0.lock();
            }
        }

        // SAFETY: the guard proves this thread owns the lock.
        unsafe { this.lock.raw.unlock() };
        let _relock = Relock(&this.lock.raw);
        f()
    }
}

impl<T: ?Sized> Deref for AdaptiveLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard holds the lock.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for AdaptiveLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard holds the lock.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for AdaptiveLockGuard<'_, T> {
    fn drop(&mut self) {
        // SAFETY: the guard holds the lock.
        unsafe { self.lock.raw.unlock() };
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for AdaptiveLockGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread, time::Duration};

    #[test]
    fn test_try_lock_twice_fails() {
        let raw = RawAdaptiveLock::new();

        assert!(raw.try_lock());
        assert!(!raw.try_lock());
        assert!(raw.is_locked());

        unsafe { raw.unlock() };
        assert!(!raw.is_locked());
        assert!(raw.try_lock());
        unsafe { raw.unlock() };
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let lock = AdaptiveLock::new(5);
        {
            let mut guard = lock.lock();
            *guard += 1;
            assert!(lock.try_lock().is_none());
        }
        assert!(!lock.is_locked());
        assert_eq!(*lock.lock(), 6);
    }

    #[test]
    fn test_mutual_exclusion() {
        const THREADS: usize = 8;
        const ITERS: usize = 10_000;

        let lock = Arc::new(AdaptiveLock::new(0usize));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let lock = lock.clone();
                thread::spawn(move || {
                    for _ in 0..ITERS {
                        *lock.lock() += 1;
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*lock.lock(), THREADS * ITERS);
    }

    #[test]
    fn test_blocking_path_without_spinning() {
        const THREADS: usize = 4;
        const ITERS: usize = 2_000;

        let lock = Arc::new(AdaptiveLock::with_spin_limit(0usize, 0));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let lock = lock.clone();
                thread::spawn(move || {
                    for _ in 0..ITERS {
                        let mut guard = lock.lock();
                        *guard += 1;
                        if *guard % 500 == 0 {
                            thread::yield_now();
                        }
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*lock.lock(), THREADS * ITERS);
    }

    #[test]
    fn test_long_hold_wakes_sleeper() {
        let lock = Arc::new(AdaptiveLock::with_spin_limit(Vec::new(), 16));
        let guard = lock.lock();

        let waiter = {
            let lock = lock.clone();
            thread::spawn(move || lock.lock().push("waiter"))
        };

        thread::sleep(Duration::from_millis(50));
        drop(guard);

        waiter.join().unwrap();
        assert_eq!(*lock.lock(), vec!["waiter"]);
    }

    #[test]
    fn test_unlocked_reacquires() {
        let lock = AdaptiveLock::new(1);
        let mut guard = lock.lock();

        let seen = AdaptiveLockGuard::unlocked(&mut guard, || {
            let mut other = lock.try_lock().expect("lock must be free inside unlocked");
            *other = 2;
            *other
        });

        assert_eq!(seen, 2);
        assert_eq!(*guard, 2);
        assert!(lock.try_lock().is_none());
    }
}
