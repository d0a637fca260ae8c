use std::hash::Hash;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::store::Faults;

/// A uniqueness constraint: each key maps to at most one owning record id.
pub struct UniqueIndex<K: Eq + Hash> {
    name: &'static str,
    keys: DashMap<K, Uuid>,
    faults: Arc<Faults>,
}

impl<K: Eq + Hash + Clone> UniqueIndex<K> {
    pub(crate) fn new(name: &'static str, faults: Arc<Faults>) -> Self {
        Self {
            name,
            keys: DashMap::new(),
            faults,
        }
    }

    /// Claims `key` for `owner`. Returns the current holder when the key is taken by
    /// someone else; re-claiming by the same owner succeeds.
    pub fn claim(&self, key: K, owner: Uuid) -> Result<Result<(), Uuid>, AppError> {
        self.faults.check(self.name)?;

        match self.keys.entry(key) {
            Entry::Occupied(existing) if *existing.get() != owner => Ok(Err(*existing.get())),
            Entry::Occupied(_) => Ok(Ok(())),
            Entry::Vacant(slot) => {
                slot.insert(owner);
                Ok(Ok(()))
            }
        }
    }

    /// Releases `key` only if `owner` still holds it.
    pub fn release(&self, key: &K, owner: Uuid) -> bool {
        self.keys
            .remove_if(key, |_, holder| *holder == owner)
            .is_some()
    }

    pub fn holder(&self, key: &K) -> Option<Uuid> {
        self.keys.get(key).map(|entry| *entry.value())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
