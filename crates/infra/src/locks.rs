//! Per-user serialization.
//!
//! Operations for one learner run one at a time; different learners never
//! contend beyond the short registry lookup. A learner's entry lives only while
//! someone holds or waits for it.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use learnstreak_core::UserId;

#[derive(Debug, Default)]
struct Slot {
    held: Mutex<bool>,
    released: Condvar,
}

#[derive(Debug, Default)]
pub struct UserLocks {
    slots: Mutex<HashMap<UserId, Arc<Slot>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `user_id` is free and hold it until the guard drops. Callers
    /// keep the guard for the whole read-modify-write.
    pub fn lock(&self, user_id: UserId) -> UserGuard<'_> {
        let slot = self.registry().entry(user_id).or_default().clone();
        {
            let mut held = slot.held.lock().unwrap_or_else(PoisonError::into_inner);
            while *held {
                held = slot.released.wait(held).unwrap_or_else(PoisonError::into_inner);
            }
            *held = true;
        }
        UserGuard { locks: self, user_id, slot }
    }

    /// Learners currently held or waited on.
    #[cfg(test)]
    pub(crate) fn tracked(&self) -> usize {
        self.registry().len()
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<UserId, Arc<Slot>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive hold on one learner. Releasing the last hold drops the entry.
#[derive(Debug)]
pub struct UserGuard<'a> {
    locks: &'a UserLocks,
    user_id: UserId,
    slot: Arc<Slot>,
}

impl Drop for UserGuard<'_> {
    fn drop(&mut self) {
        // Clones are only taken under the registry lock, so the count is stable here.
        let mut slots = self.locks.registry();
        *self.slot.held.lock().unwrap_or_else(PoisonError::into_inner) = false;
        self.slot.released.notify_one();
        if Arc::strong_count(&self.slot) == 2 {
            slots.remove(&self.user_id);
        }
    }
}
