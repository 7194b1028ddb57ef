//! # hotprops
//!
//! A thread-safe key/value property store with vetoable, transactional
//! change notification and hot reload.
//!
//! ## Overview
//!
//! `hotprops` combines:
//! - Lock-free snapshot reads using `arc-swap`
//! - Two-phase change notification where listeners may veto one change or a whole batch
//! - Layered loading from defaults, files (properties, YAML, TOML, JSON), the environment and in-memory imports
//! - `${name}` variable expansion and printf-style formatting of values
//! - Polling hot reload, either inline on reads or on a Tokio timer
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hotprops::prelude::*;
//!
//! # fn example() -> hotprops::error::Result<()> {
//! let store = PropertyStore::builder()
//!     .with_source("file:config/app.properties")
//!     .with_default("server.port", "8080")
//!     .build()?;
//!
//! store.add_property_change_listener(|event: &PropertyChangeEvent| {
//!     println!("{} changed to {:?}", event.key(), event.new_value());
//! });
//!
//! let port = store.get_or("server.port", "80");
//! println!("Server port: {}", port);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `yaml`, `toml`, `json` (default): structured file loaders
//! - `async-reload`: background hot reload on a Tokio runtime
//! - `metrics`: OpenTelemetry metrics for reloads and changes

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod core;
pub mod error;
pub mod interpolate;
pub mod notify;
pub mod sources;

#[cfg(feature = "metrics")]
pub mod metrics;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::core::{LoadPolicy, PropertyMap, PropertyStore, PropertyStoreBuilder, StoreCache};
    pub use crate::error::{ConfigError, ListenerError, Result};
    pub use crate::interpolate::FormatArg;
    pub use crate::notify::{
        HotReload, HotReloadMode, ListenerId, PropertyChangeEvent, PropertyChangeListener,
        ReloadEvent, ReloadListener,
    };
}
