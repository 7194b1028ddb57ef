//! Loader trait and the ordered loader registry.

use crate::core::PropertyMap;
use crate::error::Result;
use std::io::Read;
use std::sync::Arc;

/// Parses a byte stream into flat key/value pairs.
///
/// Implement this trait to support additional source formats. Loaders are
/// tried in registration order and the first one whose [`accept`](Loader::accept)
/// returns `true` reads the source.
///
/// # Examples
///
/// ```rust
/// use hotprops::core::PropertyMap;
/// use hotprops::error::Result;
/// use hotprops::sources::Loader;
/// use std::io::Read;
///
/// /// One `key value` pair per line.
/// struct SpaceSeparated;
///
/// impl Loader for SpaceSeparated {
///     fn accept(&self, uri: &str) -> bool {
///         uri.ends_with(".kv")
///     }
///
///     fn load(&self, map: &mut PropertyMap, input: &mut dyn Read) -> Result<()> {
///         let mut text = String::new();
///         input.read_to_string(&mut text)?;
///         for line in text.lines() {
///             if let Some((k, v)) = line.split_once(' ') {
///                 map.insert(k.to_string(), v.to_string());
///             }
///         }
///         Ok(())
///     }
///
///     fn name(&self) -> String {
///         "kv".to_string()
///     }
/// }
/// ```
pub trait Loader: Send + Sync {
    /// Whether this loader understands the source at `uri`.
    fn accept(&self, uri: &str) -> bool;

    /// Parse `input` and insert its pairs into `map`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be read or is malformed.
    fn load(&self, map: &mut PropertyMap, input: &mut dyn Read) -> Result<()>;

    /// Get a human-readable name for this loader (for logging/debugging).
    fn name(&self) -> String;
}

/// Ordered set of loaders; the first accepting loader wins.
#[derive(Clone)]
pub struct LoaderRegistry {
    loaders: Vec<Arc<dyn Loader>>,
}

impl LoaderRegistry {
    /// Create a registry with no loaders.
    pub fn empty() -> Self {
        Self {
            loaders: Vec::new(),
        }
    }

    /// Register a loader ahead of every loader already present.
    pub fn register_first(&mut self, loader: Arc<dyn Loader>) {
        self.loaders.insert(0, loader);
    }

    /// Register a loader behind every loader already present.
    pub fn register_last(&mut self, loader: Arc<dyn Loader>) {
        self.loaders.push(loader);
    }

    /// Find the loader responsible for `uri`.
    pub fn find(&self, uri: &str) -> Option<&Arc<dyn Loader>> {
        self.loaders.iter().find(|loader| loader.accept(uri))
    }

    /// Names of the registered loaders, in lookup order.
    pub fn names(&self) -> Vec<String> {
        self.loaders.iter().map(|loader| loader.name()).collect()
    }
}

impl Default for LoaderRegistry {
    /// Structured formats enabled at compile time, then `.properties` for
    /// everything else.
    fn default() -> Self {
        let mut registry = Self::empty();
        for loader in super::StructuredLoader::enabled() {
            registry.register_last(Arc::new(loader));
        }
        registry.register_last(Arc::new(super::PropertiesLoader));
        registry
    }
}
