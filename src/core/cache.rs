//! Named, shared property stores.

use super::store::PropertyStore;
use crate::error::Result;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// A registry of stores keyed by name.
///
/// Lets separate parts of an application share one store without a global:
/// create a `StoreCache`, hand out clones of an `Arc` to it, and look stores
/// up by name.
///
/// # Examples
///
/// ```rust
/// use hotprops::prelude::*;
///
/// # fn example() -> Result<()> {
/// let cache = StoreCache::new();
/// let first = cache.get_or_create("app", || {
///     PropertyStore::builder().with_default("mode", "dev").build()
/// })?;
/// let second = cache.get_or_create("app", || unreachable!())?;
///
/// first.set("mode", "prod")?;
/// assert_eq!(second.get("mode").as_deref(), Some("prod"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct StoreCache {
    slots: RwLock<HashMap<String, Arc<Slot>>>,
}

/// One cached name; `init` serializes factories for that name only.
#[derive(Debug, Default)]
struct Slot {
    store: OnceLock<PropertyStore>,
    init: Mutex<()>,
}

impl StoreCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the store named `name`, creating it with `create` if absent.
    ///
    /// `create` runs at most once per name, even under concurrent calls, and
    /// runs without holding the cache-wide lock: it may read or create other
    /// stores in the same cache. Calling `get_or_create` for the same name
    /// from inside `create` deadlocks.
    ///
    /// # Errors
    ///
    /// Propagates the error from `create`; nothing is cached in that case.
    pub fn get_or_create<F>(&self, name: &str, create: F) -> Result<PropertyStore>
    where
        F: FnOnce() -> Result<PropertyStore>,
    {
        let slot = self.slot(name);
        if let Some(store) = slot.store.get() {
            return Ok(store.clone());
        }

        let _init = slot.init.lock();
        if let Some(store) = slot.store.get() {
            return Ok(store.clone());
        }
        let store = create()?;
        Ok(slot.store.get_or_init(|| store).clone())
    }

    fn slot(&self, name: &str) -> Arc<Slot> {
        if let Some(slot) = self.slots.read().get(name) {
            return Arc::clone(slot);
        }
        Arc::clone(self.slots.write().entry(name.to_string()).or_default())
    }

    /// The store named `name`, if cached.
    pub fn get(&self, name: &str) -> Option<PropertyStore> {
        self.slots.read().get(name)?.store.get().cloned()
    }

    /// Cache `store` under `name`, returning the store it replaced.
    pub fn insert(&self, name: impl Into<String>, store: PropertyStore) -> Option<PropertyStore> {
        let slot = Slot::default();
        let _ = slot.store.set(store);
        self.slots
            .write()
            .insert(name.into(), Arc::new(slot))
            .and_then(|old| old.store.get().cloned())
    }

    /// Drop the store named `name` from the cache.
    pub fn remove(&self, name: &str) -> Option<PropertyStore> {
        self.slots
            .write()
            .remove(name)
            .and_then(|old| old.store.get().cloned())
    }

    /// Drop every cached store.
    pub fn clear(&self) {
        self.slots.write().clear();
    }

    /// Number of cached stores.
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .values()
            .filter(|slot| slot.store.get().is_some())
            .count()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
