//! Condition variable for threads that sleep while holding an [`AdaptiveLock`].
//!
//! `parking_lot::Condvar` only pairs with `parking_lot::Mutex`, so the pool
//! cannot wait on it with its queue lock directly. `WorkSignal` bridges the
//! two: a waiter takes the internal gate *before* releasing the adaptive lock,
//! and a notifier takes the same gate before signalling, so a notification
//! sent after the waiter checked its predicate always finds it parked.
//!
//! Lock order is adaptive lock, then gate. The gate is released before the
//! adaptive lock is re-acquired, and notifiers must not hold the adaptive lock.
//!
//! [`AdaptiveLock`]: crate::lock::AdaptiveLock

use crate::lock::AdaptiveLockGuard;
use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
pub struct WorkSignal {
    gate: Mutex<()>,
    cond: Condvar,
}

impl WorkSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Releases `guard`'s lock, sleeps until notified, then re-acquires it.
    ///
    /// Wakeups may be spurious; callers re-check their condition.
    pub fn wait<T: ?Sized>(&self, guard: &mut AdaptiveLockGuard<'_, T>) {
        let mut gate = self.gate.lock();
        AdaptiveLockGuard::unlocked(guard, move || {
            self.cond.wait(&mut gate);
            drop(gate);
        });
    }

    /// Sleeps for as long as `condition` returns `true`.
    pub fn wait_while<T, F>(&self, guard: &mut AdaptiveLockGuard<'_, T>, mut condition: F)
    where
        T: ?Sized,
        F: FnMut(&mut T) -> bool,
    {
        while condition(&mut **guard) {
            self.wait(guard);
        }
    }

    pub fn notify_one(&self) -> bool {
        drop(self.gate.lock());
        self.cond.notify_one()
    }

    pub fn notify_all(&self) -> usize {
        drop(self.gate.lock());
        self.cond.notify_all()
    }
}
