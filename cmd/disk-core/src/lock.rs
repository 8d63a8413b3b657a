use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Chunk-index-keyed async locks, serializing read-modify-write cycles on the
/// same chunk. Entries exist only while some task holds or waits on them.
#[derive(Debug, Default)]
pub struct ChunkLockTable {
    slots: Mutex<HashMap<u64, Slot>>,
}

#[derive(Debug, Default)]
struct Slot {
    mutex: Arc<AsyncMutex<()>>,
    /// Holders plus waiters.
    users: usize,
}

/// One holder's or waiter's claim on a slot; dropping it releases the slot
/// once nobody else is registered.
struct Registration<'a> {
    table: &'a ChunkLockTable,
    index: u64,
}

pub struct ChunkGuard<'a> {
    // Released before the registration so the slot is idle when pruned.
    _guard: OwnedMutexGuard<()>,
    registration: Registration<'a>,
}

impl ChunkLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, index: u64) -> ChunkGuard<'_> {
        let mutex = {
            let mut slots = self.slots();
            let slot = slots.entry(index).or_default();
            slot.users += 1;
            slot.mutex.clone()
        };
        // Registered before the first await, so a cancelled waiter still
        // gives its claim back.
        let registration = Registration { table: self, index };
        tracing::trace!("Waiting for lock on chunk {}", index);
        let guard = mutex.lock_owned().await;
        ChunkGuard {
            _guard: guard,
            registration,
        }
    }

    pub fn is_locked(&self, index: u64) -> bool {
        self.slots()
            .get(&index)
            .map_or(false, |slot| slot.mutex.try_lock().is_err())
    }

    /// Number of chunks with a holder or waiter.
    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<u64, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ChunkGuard<'_> {
    pub fn index(&self) -> u64 {
        self.registration.index
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        let mut slots = self.table.slots();
        if let Some(slot) = slots.get_mut(&self.index) {
            slot.users -= 1;
            if slot.users == 0 {
                slots.remove(&self.index);
            }
        }
    }
}
