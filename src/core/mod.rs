//! Core property store types.

mod builder;
mod cache;
mod loader;
mod store;

use std::collections::BTreeMap;

/// The property map type: keys in sorted order.
pub type PropertyMap = BTreeMap<String, String>;

pub use builder::PropertyStoreBuilder;
pub use cache::StoreCache;
pub use loader::LoadPolicy;
pub use store::PropertyStore;
