//! Change notification and hot reload.
//!
//! Provides vetoable property-change and reload listeners, plus the polling
//! logic that decides when configured sources need reloading.

mod events;
mod hot_reload;
mod listener;

pub use events::{PropertyChangeEvent, ReloadEvent};
pub use hot_reload::{HotReload, HotReloadMode, WatchableResource};
pub use listener::{ListenerId, PropertyChangeListener, ReloadListener};

pub(crate) use hot_reload::HotReloadLogic;
#[cfg(feature = "async-reload")]
pub(crate) use hot_reload::spawn_reload_timer;
pub(crate) use listener::{ChangeEntry, ListenerRegistry};
