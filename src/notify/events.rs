//! Change and reload events.

use crate::core::PropertyMap;
use std::sync::Arc;

/// A single pending or applied property change.
///
/// `None` on either side means the key is absent: an event with no old value
/// is an addition, one with no new value is a removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyChangeEvent {
    source: Arc<str>,
    key: String,
    old_value: Option<String>,
    new_value: Option<String>,
}

impl PropertyChangeEvent {
    /// Create a change event.
    pub fn new(
        source: Arc<str>,
        key: impl Into<String>,
        old_value: Option<String>,
        new_value: Option<String>,
    ) -> Self {
        Self {
            source,
            key: key.into(),
            old_value,
            new_value,
        }
    }

    /// Name of the store that produced the event.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The changed key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Value before the change.
    pub fn old_value(&self) -> Option<&str> {
        self.old_value.as_deref()
    }

    /// Value after the change.
    pub fn new_value(&self) -> Option<&str> {
        self.new_value.as_deref()
    }
}

/// Describes a whole reload: every surviving change plus both snapshots.
#[derive(Debug, Clone)]
pub struct ReloadEvent {
    source: Arc<str>,
    events: Vec<PropertyChangeEvent>,
    old_properties: Arc<PropertyMap>,
    new_properties: Arc<PropertyMap>,
}

impl ReloadEvent {
    pub(crate) fn new(
        source: Arc<str>,
        events: Vec<PropertyChangeEvent>,
        old_properties: Arc<PropertyMap>,
        new_properties: Arc<PropertyMap>,
    ) -> Self {
        Self {
            source,
            events,
            old_properties,
            new_properties,
        }
    }

    /// Name of the store being reloaded.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Per-key changes, in key order. Vetoed keys are not included.
    pub fn events(&self) -> &[PropertyChangeEvent] {
        &self.events
    }

    /// Properties before the reload.
    pub fn old_properties(&self) -> &PropertyMap {
        &self.old_properties
    }

    /// Properties once the reload is applied.
    pub fn new_properties(&self) -> &PropertyMap {
        &self.new_properties
    }
}
