//! Builder for constructing PropertyStore instances.

use super::loader::{LoadPolicy, SourceLoader};
use super::store::{PropertyStore, StoreParts};
use super::PropertyMap;
use crate::error::{ConfigError, Result};
use crate::notify::{HotReload, HotReloadLogic, HotReloadMode};
use crate::sources::{Loader, LoaderRegistry, SourceUri};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

#[cfg(feature = "metrics")]
use crate::metrics::StoreMetrics;
#[cfg(feature = "metrics")]
use opentelemetry::metrics::Meter;

pub(crate) const DEFAULT_NAME: &str = "hotprops";

/// Builder for constructing a [`PropertyStore`].
///
/// Properties are layered, lowest precedence first: defaults, sources
/// (combined per [`LoadPolicy`]), then imports in reverse order so the
/// first import wins.
///
/// # Examples
///
/// ```rust,no_run
/// use hotprops::prelude::*;
/// use std::time::Duration;
///
/// # fn example() -> Result<()> {
/// let store = PropertyStore::builder()
///     .with_name("app")
///     .with_source("file:${HOME}/.app.properties")
///     .with_source("file:/etc/app.properties")
///     .with_default("server.port", "8080")
///     .with_hot_reload(HotReload::new(Duration::from_secs(10)))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct PropertyStoreBuilder {
    name: String,
    sources: Vec<SourceUri>,
    defaults: PropertyMap,
    imports: Vec<PropertyMap>,
    policy: LoadPolicy,
    loaders: LoaderRegistry,
    hot_reload: Option<HotReload>,
    expand_variables: bool,
    #[cfg(feature = "metrics")]
    meter: Option<Meter>,
}

impl PropertyStoreBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            sources: Vec::new(),
            defaults: PropertyMap::new(),
            imports: Vec::new(),
            policy: LoadPolicy::default(),
            loaders: LoaderRegistry::default(),
            hot_reload: None,
            expand_variables: true,
            #[cfg(feature = "metrics")]
            meter: None,
        }
    }

    /// Name reported as the source of change events.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add a source reference such as `file:/etc/app.properties`,
    /// `config/app.yaml` or `system:env`.
    ///
    /// `${VAR}` tokens are expanded from the environment when the builder
    /// parses the reference. Sources are consulted in the order added.
    pub fn with_source(mut self, uri: &str) -> Self {
        self.sources.push(SourceUri::parse(uri));
        self
    }

    /// Add a file source by path.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.push(SourceUri::File(path.into()));
        self
    }

    /// Set a default value, used when no source or import provides `key`.
    pub fn with_default(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaults.insert(key.into(), value.into());
        self
    }

    /// Add several defaults at once.
    pub fn with_defaults(mut self, defaults: impl IntoIterator<Item = (String, String)>) -> Self {
        self.defaults.extend(defaults);
        self
    }

    /// Add an in-memory map that overrides sources and defaults.
    ///
    /// Imports added earlier take precedence over later ones.
    pub fn with_import(mut self, import: PropertyMap) -> Self {
        self.imports.push(import);
        self
    }

    /// How sources are combined. Defaults to [`LoadPolicy::First`].
    pub fn with_load_policy(mut self, policy: LoadPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Register a custom loader, consulted before the built-in ones.
    pub fn with_loader<L: Loader + 'static>(mut self, loader: L) -> Self {
        self.loaders.register_first(Arc::new(loader));
        self
    }

    /// Enable hot reload of the configured sources.
    pub fn with_hot_reload(mut self, settings: HotReload) -> Self {
        self.hot_reload = Some(settings);
        self
    }

    /// Toggle `${...}` expansion in [`PropertyStore::resolve`] and
    /// [`PropertyStore::bind`]. Enabled by default.
    pub fn with_variable_expansion(mut self, enabled: bool) -> Self {
        self.expand_variables = enabled;
        self
    }

    /// Record OpenTelemetry metrics for this store.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, meter: Meter) -> Self {
        self.meter = Some(meter);
        self
    }

    /// Build the store and perform the initial load.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A source exists but cannot be read or parsed
    /// - Asynchronous hot reload is requested without the `async-reload`
    ///   feature or outside a Tokio runtime
    pub fn build(self) -> Result<PropertyStore> {
        if let Some(settings) = &self.hot_reload {
            if settings.mode() == HotReloadMode::Async && !cfg!(feature = "async-reload") {
                return Err(ConfigError::FeatureNotEnabled("async-reload"));
            }
        }

        let loader = SourceLoader::new(
            self.defaults,
            self.sources,
            self.imports,
            self.policy,
            self.loaders,
        );
        let initial = loader.load()?;
        debug!(store = %self.name, properties = initial.len(), "initial properties loaded");

        let hot_reload = self
            .hot_reload
            .map(|settings| HotReloadLogic::new(settings, loader.watchables()));

        PropertyStore::from_parts(StoreParts {
            name: self.name,
            initial,
            loader: Some(loader),
            hot_reload,
            expand_variables: self.expand_variables,
            #[cfg(feature = "metrics")]
            metrics: self.meter.map(StoreMetrics::new),
        })
    }
}

impl Default for PropertyStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyStore {
    /// Create a new builder for constructing a property store.
    pub fn builder() -> PropertyStoreBuilder {
        PropertyStoreBuilder::new()
    }
}
