// Named shared/exclusive locks, one per file, plus the registry that hands them out.
//
// Locks are not re-entrant and there is no atomic upgrade: going from shared to
// exclusive means dropping the shared guard and acquiring a new exclusive one,
// after which the caller must re-check whatever it saw under the shared guard.
// Acquiring a lock the current thread already holds would deadlock, so it panics.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Shared,
    Exclusive,
}

thread_local! {
    static HELD: RefCell<Vec<(usize, Access)>> = const { RefCell::new(Vec::new()) };
}

pub struct RangeLock<T> {
    name: String,
    inner: RwLock<T>,
}

impl<T> RangeLock<T> {
    pub fn new(name: impl Into<String>, value: T) -> Self {
        Self {
            name: name.into(),
            inner: RwLock::new(value),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Block until shared access is granted. Released when the guard drops.
    pub fn shared(&self) -> SharedGuard<'_, T> {
        self.check_not_held(Access::Shared);
        let guard = self.inner.read();
        self.mark(Access::Shared);
        SharedGuard { lock: self, guard }
    }

    /// Block until exclusive access is granted. Released when the guard drops.
    pub fn exclusive(&self) -> ExclusiveGuard<'_, T> {
        self.check_not_held(Access::Exclusive);
        let guard = self.inner.write();
        self.mark(Access::Exclusive);
        ExclusiveGuard { lock: self, guard }
    }

    fn key(&self) -> usize {
        (self as *const Self).cast::<()>() as usize
    }

    fn check_not_held(&self, wanted: Access) {
        let key = self.key();
        let held = HELD.with(|h| {
            h.borrow()
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, access)| *access)
        });
        if let Some(held) = held {
            panic!(
                "lock misuse on `{}`: {:?} acquire while this thread holds {:?} access",
                self.name, wanted, held
            );
        }
    }

    fn mark(&self, access: Access) {
        let key = self.key();
        HELD.with(|h| h.borrow_mut().push((key, access)));
    }

    fn unmark(&self) {
        let key = self.key();
        HELD.with(|h| {
            let mut held = h.borrow_mut();
            match held.iter().rposition(|(k, _)| *k == key) {
                Some(pos) => {
                    held.swap_remove(pos);
                }
                None => panic!("lock misuse on `{}`: release without acquire", self.name),
            }
        });
    }
}

pub struct SharedGuard<'a, T> {
    lock: &'a RangeLock<T>,
    guard: RwLockReadGuard<'a, T>,
}

impl<T> SharedGuard<'_, T> {
    /// Release shared access. Equivalent to dropping the guard.
    pub fn release(self) {}
}

impl<T> Deref for SharedGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> Drop for SharedGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.unmark();
    }
}

pub struct ExclusiveGuard<'a, T> {
    lock: &'a RangeLock<T>,
    guard: RwLockWriteGuard<'a, T>,
}

impl<T> ExclusiveGuard<'_, T> {
    /// Release exclusive access. Equivalent to dropping the guard.
    pub fn release(self) {}
}

impl<T> Deref for ExclusiveGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for ExclusiveGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for ExclusiveGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.unmark();
    }
}

/// Process-wide name → lock map. Entries are created on first use and never removed.
pub struct LockRegistry<T> {
    locks: RwLock<HashMap<String, Arc<RangeLock<T>>>>,
}

impl<T: Default> LockRegistry<T> {
    pub fn new() -> Self {
        Self {
            locks: RwLock::new(HashMap::new()),
        }
    }

    /// Look up the lock for `name`, creating it if this is the first request.
    pub fn get_or_create(&self, name: &str) -> Arc<RangeLock<T>> {
        if let Some(lock) = self.locks.read().get(name) {
            return Arc::clone(lock);
        }
        let mut locks = self.locks.write();
        // Another thread may have created it between the two map locks.
        Arc::clone(
            locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(RangeLock::new(name, T::default()))),
        )
    }

    pub fn get(&self, name: &str) -> Option<Arc<RangeLock<T>>> {
        self.locks.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.locks.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.locks.read().len()
    }
}

impl<T: Default> Default for LockRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
