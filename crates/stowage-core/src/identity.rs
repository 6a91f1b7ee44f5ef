//! Identity map from live domain objects to persisted row ids
//!
//! Keys are the allocation addresses of [`Object`]s and each entry holds a
//! `Weak` reference, so the map never keeps an object alive. An entry whose
//! object has been dropped is dead: lookups treat it as unknown and the next
//! prune removes it. While an entry exists its weak reference pins the
//! allocation, so an address cannot be handed to a new object until the dead
//! entry is gone.

use std::any::TypeId;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;

use crate::model::{address_of, type_of, Object, Persistable};

const PRUNE_EVERY: usize = 256;

struct Entry {
    object: Weak<dyn Persistable>,
    type_id: TypeId,
    id: i64,
}

impl Entry {
    fn is_live(&self) -> bool {
        self.object.strong_count() > 0
    }

    fn refers_to(&self, address: usize) -> bool {
        self.is_live() && self.object.as_ptr() as *const () as usize == address
    }
}

/// Concurrent, non-owning map of object identity to row id
///
/// Cloning yields another handle to the same map.
#[derive(Clone, Default)]
pub struct IdentityMap {
    entries: Arc<DashMap<usize, Entry>>,
    writes: Arc<AtomicUsize>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or replace) the row id of an object
    pub fn put(&self, object: &Object, id: i64) {
        self.entries.insert(
            address_of(object),
            Entry {
                object: Arc::downgrade(object),
                type_id: type_of(object),
                id,
            },
        );
        if self.writes.fetch_add(1, Ordering::Relaxed) % PRUNE_EVERY == PRUNE_EVERY - 1 {
            self.prune();
        }
    }

    /// Row id of an object, or `None` when its identity is unknown
    pub fn get(&self, object: &Object) -> Option<i64> {
        let address = address_of(object);
        let id = self
            .entries
            .get(&address)
            .and_then(|entry| entry.refers_to(address).then_some(entry.id));
        if id.is_none() {
            // drop a stale entry left behind by a dead object at this address
            self.entries
                .remove_if(&address, |_, entry| !entry.refers_to(address));
        }
        id
    }

    /// Remove every entry of exactly `type_id` carrying row id `id`
    ///
    /// Matches by (type, id) rather than by object, since the instance that
    /// triggers a delete need not be the one that was mapped.
    pub fn remove_matching(&self, type_id: TypeId, id: i64) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.is_live() && !(entry.type_id == type_id && entry.id == id));
        before.saturating_sub(self.entries.len())
    }

    /// Drop entries whose objects are no longer referenced anywhere
    pub fn prune(&self) {
        self.entries.retain(|_, entry| entry.is_live());
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.prune();
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for IdentityMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityMap")
            .field("entries", &self.entries.len())
            .finish()
    }
}
