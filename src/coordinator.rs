use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Synchronization state for one key. `refs` counts the holder plus every
/// waiter and is guarded by the coordinator's map lock, not by the entry's own
/// mutex.
struct KeyEntry {
    lock: Arc<AsyncMutex<()>>,
    refs: usize,
}

type EntryMap = Arc<Mutex<HashMap<String, KeyEntry>>>;

fn lock_entries(entries: &EntryMap) -> MutexGuard<'_, HashMap<String, KeyEntry>> {
    // Refcount updates are single operations, so a poisoned map is still
    // structurally consistent.
    entries.lock().unwrap_or_else(|e| e.into_inner())
}

/// Hands out exclusive per-key critical sections.
///
/// The map lock is held only for O(1) structural updates and never across an
/// await, so unrelated keys share no serialization point beyond it. Entries
/// are created on first contact and reclaimed once nobody references them,
/// keeping memory bounded under key churn.
#[derive(Clone, Default)]
pub struct KeyCoordinator {
    entries: EntryMap,
}

impl KeyCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers interest in `key`, creating its entry on first contact.
    ///
    /// The returned claim reports whether another caller already holds or
    /// waits on the key, and must be awaited to enter the critical section.
    /// Dropping the claim at any point — before acquisition, on cancellation,
    /// or after the permit is released — gives the reference back.
    pub fn enter(&self, key: &str) -> KeyClaim {
        let mut entries = lock_entries(&self.entries);
        let entry = entries.entry(key.to_string()).or_insert_with(|| KeyEntry {
            lock: Arc::new(AsyncMutex::new(())),
            refs: 0,
        });
        let contended = entry.refs > 0;
        entry.refs += 1;
        let lock = Arc::clone(&entry.lock);
        drop(entries);

        KeyClaim {
            lock,
            contended,
            slot: KeySlot {
                entries: Arc::clone(&self.entries),
                key: key.to_string(),
            },
        }
    }

    /// Number of keys currently tracked. Entries disappear as soon as the last
    /// claim on them is dropped.
    pub fn tracked_keys(&self) -> usize {
        lock_entries(&self.entries).len()
    }
}

/// Refcount ticket for one key. Dropping it releases the caller's claim and
/// reclaims the map entry once nobody references it.
struct KeySlot {
    entries: EntryMap,
    key: String,
}

impl Drop for KeySlot {
    fn drop(&mut self) {
        let mut entries = lock_entries(&self.entries);
        if let Some(entry) = entries.get_mut(&self.key) {
            entry.refs -= 1;
            if entry.refs == 0 {
                entries.remove(&self.key);
            }
        }
    }
}

/// A registered but not yet exclusive claim on a key.
pub struct KeyClaim {
    lock: Arc<AsyncMutex<()>>,
    contended: bool,
    slot: KeySlot,
}

impl KeyClaim {
    /// True when another caller already holds or waits on this key.
    pub fn contended(&self) -> bool {
        self.contended
    }

    /// Awaits the key's mutex and enters the critical section. Cancelling the
    /// returned future still releases the refcount.
    pub async fn acquire(self) -> KeyPermit {
        let KeyClaim { lock, slot, .. } = self;
        let guard = lock.lock_owned().await;
        KeyPermit {
            _guard: guard,
            _slot: slot,
        }
    }
}

/// Exclusive critical-section handle for one key.
///
/// Release is unconditional: dropping the permit frees the mutex first and the
/// refcount ticket second, whatever path control takes out of the section.
pub struct KeyPermit {
    _guard: OwnedMutexGuard<()>,
    _slot: KeySlot,
}
