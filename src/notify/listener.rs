//! Listener traits and the registry that dispatches to them.

use super::events::{PropertyChangeEvent, ReloadEvent};
use crate::error::ListenerError;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Observer of property changes.
///
/// `before_change` runs before a change is applied and may veto it;
/// `property_changed` runs after it is applied and cannot.
///
/// Closures taking `&PropertyChangeEvent` implement this trait with a no-op
/// `before_change`.
///
/// # Examples
///
/// ```rust
/// use hotprops::error::ListenerError;
/// use hotprops::notify::{PropertyChangeEvent, PropertyChangeListener};
///
/// /// Refuses to let `port` leave the unprivileged range.
/// struct PortGuard;
///
/// impl PropertyChangeListener for PortGuard {
///     fn before_change(&self, event: &PropertyChangeEvent) -> Result<(), ListenerError> {
///         match event.new_value().map(str::parse::<u16>) {
///             Some(Ok(port)) if port >= 1024 => Ok(()),
///             _ => Err(ListenerError::RollbackOperation),
///         }
///     }
///
///     fn property_changed(&self, _event: &PropertyChangeEvent) {}
/// }
/// ```
pub trait PropertyChangeListener: Send + Sync {
    /// Called before a change is applied.
    ///
    /// # Errors
    ///
    /// Return [`ListenerError::RollbackOperation`] to veto this change only,
    /// [`ListenerError::RollbackBatch`] to veto the whole enclosing operation,
    /// or [`ListenerError::Failed`] to abort with an error.
    fn before_change(&self, _event: &PropertyChangeEvent) -> Result<(), ListenerError> {
        Ok(())
    }

    /// Called after a change has been applied.
    fn property_changed(&self, event: &PropertyChangeEvent);
}

impl<F> PropertyChangeListener for F
where
    F: Fn(&PropertyChangeEvent) + Send + Sync,
{
    fn property_changed(&self, event: &PropertyChangeEvent) {
        self(event)
    }
}

/// Observer of whole reloads.
///
/// Closures taking `&ReloadEvent` implement this trait with a no-op
/// `before_reload`.
pub trait ReloadListener: Send + Sync {
    /// Called once the reload diff is known, before anything is applied.
    ///
    /// # Errors
    ///
    /// Either rollback signal vetoes the entire reload;
    /// [`ListenerError::Failed`] aborts it with an error.
    fn before_reload(&self, _event: &ReloadEvent) -> Result<(), ListenerError> {
        Ok(())
    }

    /// Called after the reloaded properties are in place.
    fn reload_performed(&self, event: &ReloadEvent);
}

impl<F> ReloadListener for F
where
    F: Fn(&ReloadEvent) + Send + Sync,
{
    fn reload_performed(&self, event: &ReloadEvent) {
        self(event)
    }
}

/// Identifies a registered listener for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Clone)]
pub(crate) struct ChangeEntry {
    id: ListenerId,
    key: Option<String>,
    listener: Arc<dyn PropertyChangeListener>,
}

impl ChangeEntry {
    fn applies_to(&self, event: &PropertyChangeEvent) -> bool {
        self.key.as_deref().is_none_or(|key| key == event.key())
    }

    pub(crate) fn before_change(&self, event: &PropertyChangeEvent) -> Result<(), ListenerError> {
        if self.applies_to(event) {
            self.listener.before_change(event)
        } else {
            Ok(())
        }
    }

    pub(crate) fn property_changed(&self, event: &PropertyChangeEvent) {
        if self.applies_to(event) {
            self.listener.property_changed(event);
        }
    }
}

#[derive(Clone)]
pub(crate) struct ReloadEntry {
    id: ListenerId,
    listener: Arc<dyn ReloadListener>,
}

impl ReloadEntry {
    pub(crate) fn before_reload(&self, event: &ReloadEvent) -> Result<(), ListenerError> {
        self.listener.before_reload(event)
    }

    pub(crate) fn reload_performed(&self, event: &ReloadEvent) {
        self.listener.reload_performed(event);
    }
}

/// Registered listeners, in registration order.
///
/// Dispatch works on a cloned snapshot, so listeners may register or remove
/// listeners from inside a callback; such edits apply to the next operation.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    change: RwLock<Vec<ChangeEntry>>,
    reload: RwLock<Vec<ReloadEntry>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    fn next_id(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn add_change(
        &self,
        key: Option<String>,
        listener: Arc<dyn PropertyChangeListener>,
    ) -> ListenerId {
        let id = self.next_id();
        self.change.write().push(ChangeEntry { id, key, listener });
        id
    }

    pub(crate) fn remove_change(&self, id: ListenerId) -> bool {
        let mut entries = self.change.write();
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        entries.len() != before
    }

    pub(crate) fn add_reload(&self, listener: Arc<dyn ReloadListener>) -> ListenerId {
        let id = self.next_id();
        self.reload.write().push(ReloadEntry { id, listener });
        id
    }

    pub(crate) fn remove_reload(&self, id: ListenerId) -> bool {
        let mut entries = self.reload.write();
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        entries.len() != before
    }

    pub(crate) fn change_listeners(&self) -> Vec<ChangeEntry> {
        self.change.read().clone()
    }

    pub(crate) fn reload_listeners(&self) -> Vec<ReloadEntry> {
        self.reload.read().clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.change.read().len() + self.reload.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn event(key: &str) -> PropertyChangeEvent {
        PropertyChangeEvent::new(Arc::from("test"), key, None, Some("v".to_string()))
    }

    #[test]
    fn test_closure_listener() {
        let registry = ListenerRegistry::default();
        let counter = Arc::new(AtomicUsize::new(0));

        let counter_clone = Arc::clone(&counter);
        registry.add_change(
            None,
            Arc::new(move |_: &PropertyChangeEvent| {
                counter_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        for entry in registry.change_listeners() {
            assert!(entry.before_change(&event("a")).is_ok());
            entry.property_changed(&event("a"));
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_key_filter() {
        let registry = ListenerRegistry::default();
        let counter = Arc::new(AtomicUsize::new(0));

        let counter_clone = Arc::clone(&counter);
        registry.add_change(
            Some("wanted".to_string()),
            Arc::new(move |_: &PropertyChangeEvent| {
                counter_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        for entry in registry.change_listeners() {
            entry.property_changed(&event("other"));
            entry.property_changed(&event("wanted"));
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_by_id() {
        let registry = ListenerRegistry::default();
        let first = registry.add_change(None, Arc::new(|_: &PropertyChangeEvent| {}));
        let second = registry.add_reload(Arc::new(|_: &ReloadEvent| {}));
        assert_ne!(first, second);
        assert_eq!(registry.len(), 2);

        assert!(registry.remove_change(first));
        assert!(!registry.remove_change(first));
        assert!(!registry.remove_change(second));
        assert!(registry.remove_reload(second));
        assert_eq!(registry.len(), 0);
    }
}
