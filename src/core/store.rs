//! The transactional property store.

use super::PropertyMap;
use super::loader::SourceLoader;
use crate::error::{ConfigError, ListenerError, Result};
use crate::interpolate::{FormatArg, Substitutor, format_args_printf};
use crate::notify::{
    ChangeEntry, HotReloadLogic, HotReloadMode, ListenerId, ListenerRegistry, PropertyChangeEvent,
    PropertyChangeListener, ReloadEvent, ReloadListener,
};
use crate::sources::{Loader, write_properties};
use arc_swap::ArcSwap;
use parking_lot::ReentrantMutex;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

#[cfg(feature = "metrics")]
use crate::metrics::StoreMetrics;

/// Everything the builder hands over to a new store.
pub(crate) struct StoreParts {
    pub(crate) name: String,
    pub(crate) initial: PropertyMap,
    pub(crate) loader: Option<SourceLoader>,
    pub(crate) hot_reload: Option<HotReloadLogic>,
    pub(crate) expand_variables: bool,
    #[cfg(feature = "metrics")]
    pub(crate) metrics: Option<StoreMetrics>,
}

struct StoreInner {
    name: Arc<str>,
    /// Published snapshot; replaced wholesale, never mutated in place.
    current: ArcSwap<PropertyMap>,
    /// Held by every mutating call for its whole duration, callbacks included.
    write_lock: ReentrantMutex<()>,
    /// True while a reload is running.
    loading: AtomicBool,
    listeners: ListenerRegistry,
    loader: Option<SourceLoader>,
    hot_reload: Option<HotReloadLogic>,
    expand_variables: bool,
    #[cfg(feature = "async-reload")]
    reload_task: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
    #[cfg(feature = "metrics")]
    metrics: Option<StoreMetrics>,
}

#[cfg(feature = "async-reload")]
impl Drop for StoreInner {
    fn drop(&mut self) {
        if let Some(task) = self.reload_task.get_mut().take() {
            task.abort();
        }
    }
}

/// Resets the loading flag when a reload ends, however it ends.
struct LoadingGuard<'a>(&'a AtomicBool);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Result of running `before_change` over a set of candidate changes.
enum Batch {
    /// Changes that no listener vetoed, in key order.
    Accepted(Vec<PropertyChangeEvent>),
    /// A listener vetoed the whole operation.
    RolledBack,
}

enum ReloadOutcome {
    Applied(usize),
    RolledBack,
}

/// A key/value property store with vetoable, transactional updates.
///
/// Reads load an immutable snapshot without locking and always observe a
/// complete map. Every mutation holds a reentrant write lock for its whole
/// duration, including listener callbacks: a listener may read or mutate the
/// store from the same thread, while other threads' mutations wait.
///
/// Each mutation runs in two phases. First `before_change` is called on
/// every listener for each candidate change; a listener may veto one change
/// ([`ListenerError::RollbackOperation`]) or the whole operation
/// ([`ListenerError::RollbackBatch`]). Then the surviving changes are
/// published at once and `property_changed` is called for each of them.
///
/// A listener returning [`ListenerError::Failed`] aborts the operation with
/// [`ConfigError::Listener`] before anything is applied. The first listener
/// to veto or fail ends dispatch for that change; later listeners are not
/// asked.
///
/// # Examples
///
/// ```rust
/// use hotprops::prelude::*;
///
/// # fn example() -> Result<()> {
/// let store = PropertyStore::builder()
///     .with_default("host", "localhost")
///     .with_default("url", "http://${host}:8080")
///     .build()?;
///
/// assert_eq!(store.get("url").as_deref(), Some("http://${host}:8080"));
/// assert_eq!(store.resolve("url").as_deref(), Some("http://localhost:8080"));
///
/// store.set("host", "example.org")?;
/// assert_eq!(store.resolve("url").as_deref(), Some("http://example.org:8080"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PropertyStore {
    inner: Arc<StoreInner>,
}

impl PropertyStore {
    /// Create a store holding `initial`, without sources or hot reload.
    ///
    /// [`reload`](Self::reload) fails on such a store. For most use cases,
    /// prefer [`PropertyStore::builder()`].
    pub fn new(initial: PropertyMap) -> Self {
        Self::assemble(StoreParts {
            name: super::builder::DEFAULT_NAME.to_string(),
            initial,
            loader: None,
            hot_reload: None,
            expand_variables: true,
            #[cfg(feature = "metrics")]
            metrics: None,
        })
    }

    fn assemble(parts: StoreParts) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                name: Arc::from(parts.name),
                current: ArcSwap::from_pointee(parts.initial),
                write_lock: ReentrantMutex::new(()),
                loading: AtomicBool::new(false),
                listeners: ListenerRegistry::default(),
                loader: parts.loader,
                hot_reload: parts.hot_reload,
                expand_variables: parts.expand_variables,
                #[cfg(feature = "async-reload")]
                reload_task: parking_lot::Mutex::new(None),
                #[cfg(feature = "metrics")]
                metrics: parts.metrics,
            }),
        }
    }

    /// Create a store and start asynchronous hot reload if configured.
    pub(crate) fn from_parts(parts: StoreParts) -> Result<Self> {
        let asynchronous = parts
            .hot_reload
            .as_ref()
            .map(|logic| logic.settings())
            .filter(|settings| settings.mode() == HotReloadMode::Async);
        let store = Self::assemble(parts);

        if let Some(settings) = asynchronous {
            store.start_async_reload(settings.interval())?;
        }
        Ok(store)
    }

    #[cfg(feature = "async-reload")]
    fn start_async_reload(&self, interval: std::time::Duration) -> Result<()> {
        let weak = Arc::downgrade(&self.inner);
        let task = crate::notify::spawn_reload_timer(interval, move || {
            let Some(inner) = weak.upgrade() else {
                return false;
            };
            let store = PropertyStore { inner };
            if let Err(e) = store.check_and_reload() {
                warn!(store = %store.inner.name, error = %e, "background reload failed");
            }
            true
        })?;
        *self.inner.reload_task.lock() = Some(task);
        Ok(())
    }

    #[cfg(not(feature = "async-reload"))]
    fn start_async_reload(&self, _interval: std::time::Duration) -> Result<()> {
        Err(ConfigError::FeatureNotEnabled("async-reload"))
    }

    /// Name used as the `source` of emitted events.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Configured sources, in declaration order.
    pub fn source_names(&self) -> Vec<String> {
        self.inner
            .loader
            .as_ref()
            .map(SourceLoader::source_names)
            .unwrap_or_default()
    }

    /// Get the raw value of `key`.
    ///
    /// With synchronous hot reload this first checks the sources for changes.
    pub fn get(&self, key: &str) -> Option<String> {
        self.check_sync_reload();
        self.inner.current.load().get(key).cloned()
    }

    /// Get the raw value of `key`, or `default` when absent.
    pub fn get_or(&self, key: &str, default: impl Into<String>) -> String {
        self.get(key).unwrap_or_else(|| default.into())
    }

    /// Get the value of `key` with `${...}` tokens expanded against the store.
    ///
    /// Returns the raw value when variable expansion is disabled.
    pub fn resolve(&self, key: &str) -> Option<String> {
        let snapshot = self.snapshot();
        let raw = snapshot.get(key)?;
        if self.inner.expand_variables {
            Some(Substitutor::new(&*snapshot).replace(raw))
        } else {
            Some(raw.clone())
        }
    }

    /// Resolve `key` and format it with positional `args`.
    ///
    /// Values holding a `${...}` token are expanded and `args` ignored; other
    /// values are used as printf templates. With no `args` this is
    /// [`resolve`](Self::resolve).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FormatError`] if the value is not a valid
    /// template for `args`.
    pub fn resolve_with(&self, key: &str, args: &[FormatArg]) -> Result<Option<String>> {
        if args.is_empty() {
            return Ok(self.resolve(key));
        }

        let snapshot = self.snapshot();
        let Some(raw) = snapshot.get(key) else {
            return Ok(None);
        };
        let formatted = if self.inner.expand_variables {
            Substitutor::new(&*snapshot).replace_args(raw, args)?
        } else {
            format_args_printf(raw, args)?
        };
        Ok(Some(formatted))
    }

    /// The current properties as an immutable snapshot.
    pub fn snapshot(&self) -> Arc<PropertyMap> {
        self.check_sync_reload();
        self.inner.current.load_full()
    }

    /// Whether `key` is set.
    pub fn contains_key(&self, key: &str) -> bool {
        self.snapshot().contains_key(key)
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.snapshot().keys().cloned().collect()
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Whether the store holds no properties.
    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Set `key` to `value`, returning the previous value.
    ///
    /// Setting a key to its current value is a no-op that notifies no one.
    /// A vetoed change leaves the store untouched; the previous value is
    /// returned either way.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Listener`] if a listener fails.
    pub fn set(&self, key: &str, value: impl Into<String>) -> Result<Option<String>> {
        self.update(key, Some(value.into()))
    }

    /// Remove `key`, returning the previous value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Listener`] if a listener fails.
    pub fn remove(&self, key: &str) -> Result<Option<String>> {
        self.update(key, None)
    }

    /// Set `key` to `value`, or remove it when `value` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Listener`] if a listener fails.
    pub fn update(&self, key: &str, value: Option<String>) -> Result<Option<String>> {
        let _guard = self.inner.write_lock.lock();
        let old = self.inner.current.load_full();
        let previous = old.get(key).cloned();

        let key = key.to_string();
        let mut target = PropertyMap::new();
        if let Some(value) = value {
            target.insert(key.clone(), value);
        }

        self.commit_batch("set", std::iter::once(&key), &old, &target)?;
        Ok(previous)
    }

    /// Remove every property.
    ///
    /// Keys whose removal is vetoed individually are kept; a batch veto keeps
    /// everything.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Listener`] if a listener fails.
    pub fn clear(&self) -> Result<()> {
        let _guard = self.inner.write_lock.lock();
        let old = self.inner.current.load_full();
        self.commit_batch("clear", old.keys(), &old, &PropertyMap::new())
    }

    /// Merge `properties` into the store.
    ///
    /// Keys absent from `properties` are left alone. Veto semantics match
    /// [`clear`](Self::clear).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Listener`] if a listener fails.
    pub fn load(&self, properties: PropertyMap) -> Result<()> {
        let _guard = self.inner.write_lock.lock();
        let old = self.inner.current.load_full();
        self.commit_batch("load", properties.keys(), &old, &properties)
    }

    /// Parse `input` with `loader` and merge the result, as [`load`](Self::load).
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails or a listener fails.
    pub fn load_from(&self, input: &mut dyn Read, loader: &dyn Loader) -> Result<()> {
        let mut parsed = PropertyMap::new();
        loader.load(&mut parsed, input)?;
        self.load(parsed)
    }

    /// Recompute the properties from defaults, sources and imports.
    ///
    /// Per-key vetoes exclude single keys. A batch veto from a change
    /// listener, or any veto from a reload listener's `before_reload`, keeps
    /// the old properties entirely. Calling `reload` while a reload is
    /// running (for example from a listener) returns immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the store has no sources configured, a source
    /// cannot be read, or a listener fails.
    pub fn reload(&self) -> Result<()> {
        let loader = self
            .inner
            .loader
            .as_ref()
            .ok_or_else(|| ConfigError::Other("No loader available for reload".to_string()))?;

        let _guard = self.inner.write_lock.lock();
        if self.inner.loading.swap(true, Ordering::AcqRel) {
            debug!(store = %self.inner.name, "reload already in progress, ignoring nested call");
            return Ok(());
        }
        let _loading = LoadingGuard(&self.inner.loading);

        #[cfg(feature = "metrics")]
        let timer = self.inner.metrics.as_ref().map(StoreMetrics::start_reload);

        let outcome = self.perform_reload(loader);

        #[cfg(feature = "metrics")]
        if let (Some(metrics), Some(timer)) = (&self.inner.metrics, timer) {
            match &outcome {
                Ok(ReloadOutcome::Applied(_)) => metrics.record_reload_success(timer),
                Ok(ReloadOutcome::RolledBack) => metrics.record_reload_rollback(timer),
                Err(_) => metrics.record_reload_failure(timer),
            }
        }

        match outcome? {
            ReloadOutcome::Applied(0) => {
                debug!(store = %self.inner.name, "reload found no changes");
            }
            ReloadOutcome::Applied(changes) => {
                info!(store = %self.inner.name, changes, "properties reloaded");
            }
            ReloadOutcome::RolledBack => {
                debug!(store = %self.inner.name, "reload rolled back by listener");
            }
        }
        Ok(())
    }

    fn perform_reload(&self, loader: &SourceLoader) -> Result<ReloadOutcome> {
        let loaded = loader.load()?;
        let old = self.inner.current.load_full();
        let listeners = self.inner.listeners.change_listeners();

        let keys: BTreeSet<&String> = old.keys().chain(loaded.keys()).collect();
        let events = match self.prepare_batch(&listeners, keys, &old, &loaded)? {
            Batch::Accepted(events) => events,
            Batch::RolledBack => return Ok(ReloadOutcome::RolledBack),
        };

        let mut next = (*old).clone();
        apply_events(&mut next, &events);
        let event = ReloadEvent::new(Arc::clone(&self.inner.name), events, old, Arc::new(next));

        let reload_listeners = self.inner.listeners.reload_listeners();
        for listener in &reload_listeners {
            match listener.before_reload(&event) {
                Ok(()) => {}
                Err(e) if e.is_rollback() => return Ok(ReloadOutcome::RolledBack),
                Err(e) => return Err(e.into()),
            }
        }

        self.apply(event.events());
        fire_property_changed(&listeners, event.events());
        for listener in &reload_listeners {
            listener.reload_performed(&event);
        }

        Ok(ReloadOutcome::Applied(event.events().len()))
    }

    /// Reload if hot reload is configured, its interval elapsed, no reload
    /// is running and a watched source changed.
    ///
    /// Returns whether a reload was performed.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`reload`](Self::reload).
    pub fn check_and_reload(&self) -> Result<bool> {
        let Some(hot_reload) = &self.inner.hot_reload else {
            return Ok(false);
        };
        if self.inner.loading.load(Ordering::Acquire) || !hot_reload.needs_reload() {
            return Ok(false);
        }
        self.reload()?;
        Ok(true)
    }

    fn check_sync_reload(&self) {
        let sync = self
            .inner
            .hot_reload
            .as_ref()
            .is_some_and(|logic| logic.settings().mode() == HotReloadMode::Sync);

        if sync {
            if let Err(e) = self.check_and_reload() {
                warn!(store = %self.inner.name, error = %e, "hot reload failed, keeping previous properties");
            }
        }
    }

    /// Register a listener for changes to any key.
    pub fn add_property_change_listener<L>(&self, listener: L) -> ListenerId
    where
        L: PropertyChangeListener + 'static,
    {
        let id = self.inner.listeners.add_change(None, Arc::new(listener));
        self.record_listener_count();
        id
    }

    /// Register a listener for changes to `key` only.
    pub fn add_property_change_listener_for<L>(&self, key: impl Into<String>, listener: L) -> ListenerId
    where
        L: PropertyChangeListener + 'static,
    {
        let id = self
            .inner
            .listeners
            .add_change(Some(key.into()), Arc::new(listener));
        self.record_listener_count();
        id
    }

    /// Remove a property change listener. Returns whether it was registered.
    pub fn remove_property_change_listener(&self, id: ListenerId) -> bool {
        let removed = self.inner.listeners.remove_change(id);
        self.record_listener_count();
        removed
    }

    /// Register a reload listener.
    pub fn add_reload_listener<L>(&self, listener: L) -> ListenerId
    where
        L: ReloadListener + 'static,
    {
        let id = self.inner.listeners.add_reload(Arc::new(listener));
        self.record_listener_count();
        id
    }

    /// Remove a reload listener. Returns whether it was registered.
    pub fn remove_reload_listener(&self, id: ListenerId) -> bool {
        let removed = self.inner.listeners.remove_reload(id);
        self.record_listener_count();
        removed
    }

    /// Deserialize the current properties into `T`.
    ///
    /// Dotted keys become nested fields (`server.port` fills
    /// `server: { port }`) and values are expanded first unless expansion is
    /// disabled. String values convert to numbers and booleans as needed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DeserializationError`] if the properties do not
    /// fit `T`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hotprops::prelude::*;
    /// use serde::Deserialize;
    ///
    /// #[derive(Debug, Deserialize)]
    /// struct Server {
    ///     host: String,
    ///     port: u16,
    /// }
    ///
    /// #[derive(Debug, Deserialize)]
    /// struct AppConfig {
    ///     server: Server,
    /// }
    ///
    /// # fn example() -> Result<()> {
    /// let store = PropertyStore::builder()
    ///     .with_default("server.host", "localhost")
    ///     .with_default("server.port", "8080")
    ///     .build()?;
    ///
    /// let config: AppConfig = store.bind()?;
    /// assert_eq!(config.server.port, 8080);
    /// # Ok(())
    /// # }
    /// ```
    pub fn bind<T: DeserializeOwned>(&self) -> Result<T> {
        let snapshot = self.snapshot();
        let values: PropertyMap = if self.inner.expand_variables {
            let substitutor = Substitutor::new(&*snapshot);
            snapshot
                .iter()
                .map(|(key, raw)| (key.clone(), substitutor.replace(raw)))
                .collect()
        } else {
            (*snapshot).clone()
        };

        let origin = self.inner.name.to_string();
        KeyTree::from_properties(values)
            .into_value(Some(&origin))
            .try_deserialize::<T>()
            .map_err(|e| ConfigError::DeserializationError(e.to_string()))
    }

    /// Write the current properties to `writer` in properties format.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn store_to<W: Write + ?Sized>(&self, writer: &mut W, comment: Option<&str>) -> Result<()> {
        write_properties(&self.snapshot(), comment, writer)
    }

    /// Run `before_change` for every key that differs between `old` and `new`.
    fn prepare_batch<'k>(
        &self,
        listeners: &[ChangeEntry],
        keys: impl IntoIterator<Item = &'k String>,
        old: &PropertyMap,
        new: &PropertyMap,
    ) -> Result<Batch> {
        let mut accepted = Vec::new();

        for key in keys {
            let old_value = old.get(key);
            let new_value = new.get(key);
            if old_value == new_value {
                continue;
            }

            let event = PropertyChangeEvent::new(
                Arc::clone(&self.inner.name),
                key.clone(),
                old_value.cloned(),
                new_value.cloned(),
            );

            match listeners.iter().try_for_each(|l| l.before_change(&event)) {
                Ok(()) => accepted.push(event),
                Err(ListenerError::RollbackOperation) => {
                    debug!(store = %self.inner.name, key = %key, "change vetoed by listener");
                    self.record_vetoed();
                }
                Err(ListenerError::RollbackBatch) => return Ok(Batch::RolledBack),
                Err(e) => return Err(e.into()),
            }
        }

        Ok(Batch::Accepted(accepted))
    }

    fn commit_batch<'k>(
        &self,
        operation: &'static str,
        keys: impl IntoIterator<Item = &'k String>,
        old: &PropertyMap,
        new: &PropertyMap,
    ) -> Result<()> {
        let listeners = self.inner.listeners.change_listeners();

        match self.prepare_batch(&listeners, keys, old, new)? {
            Batch::RolledBack => {
                debug!(store = %self.inner.name, operation, "batch rolled back by listener");
            }
            Batch::Accepted(events) if events.is_empty() => {}
            Batch::Accepted(events) => {
                self.apply(&events);
                fire_property_changed(&listeners, &events);
            }
        }
        Ok(())
    }

    /// Publish `events` on top of the latest snapshot.
    ///
    /// Starts from the latest snapshot rather than the one the events were
    /// computed from, so same-thread mutations made by listeners survive.
    fn apply(&self, events: &[PropertyChangeEvent]) {
        let mut next = (*self.inner.current.load_full()).clone();
        apply_events(&mut next, events);
        self.inner.current.store(Arc::new(next));
        self.record_applied(events.len());
    }

    fn record_vetoed(&self) {
        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.inner.metrics {
            metrics.record_change_vetoed();
        }
    }

    #[allow(unused_variables)]
    fn record_applied(&self, count: usize) {
        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.inner.metrics {
            metrics.record_changes_applied(count);
        }
    }

    fn record_listener_count(&self) {
        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.inner.metrics {
            metrics.update_listener_count(self.inner.listeners.len());
        }
    }
}

impl fmt::Debug for PropertyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyStore")
            .field("name", &self.inner.name)
            .field("properties", &self.inner.current.load().len())
            .field("hot_reload", &self.inner.hot_reload.as_ref().map(|l| l.settings()))
            .finish()
    }
}

fn apply_events(map: &mut PropertyMap, events: &[PropertyChangeEvent]) {
    for event in events {
        match event.new_value() {
            Some(value) => {
                map.insert(event.key().to_string(), value.to_string());
            }
            None => {
                map.remove(event.key());
            }
        }
    }
}

fn fire_property_changed(listeners: &[ChangeEntry], events: &[PropertyChangeEvent]) {
    for event in events {
        for listener in listeners {
            listener.property_changed(event);
        }
    }
}

/// Dotted keys nested into a tree for typed binding. Key case is kept.
///
/// When a key is both a value and a prefix (`a` and `a.b`), the nested
/// keys win.
enum KeyTree {
    Leaf(String),
    Branch(BTreeMap<String, KeyTree>),
}

impl KeyTree {
    fn from_properties(values: PropertyMap) -> Self {
        let mut root = KeyTree::Branch(BTreeMap::new());
        for (key, value) in values {
            let path: Vec<&str> = key.split('.').collect();
            root.insert(&path, value);
        }
        root
    }

    fn insert(&mut self, path: &[&str], value: String) {
        let [head, rest @ ..] = path else {
            return;
        };
        if let KeyTree::Leaf(_) = self {
            *self = KeyTree::Branch(BTreeMap::new());
        }
        let KeyTree::Branch(children) = self else {
            return;
        };

        if rest.is_empty() {
            children
                .entry(head.to_string())
                .or_insert(KeyTree::Leaf(value));
        } else {
            children
                .entry(head.to_string())
                .or_insert_with(|| KeyTree::Branch(BTreeMap::new()))
                .insert(rest, value);
        }
    }

    fn into_value(self, origin: Option<&String>) -> config::Value {
        match self {
            KeyTree::Leaf(text) => config::Value::new(origin, text),
            KeyTree::Branch(children) => {
                let table: config::Map<String, config::Value> = children
                    .into_iter()
                    .map(|(key, child)| (key, child.into_value(origin)))
                    .collect();
                config::Value::new(origin, config::ValueKind::Table(table))
            }
        }
    }
}
