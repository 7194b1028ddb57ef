//! Recomputes the full property map from defaults, sources and imports.

use super::PropertyMap;
use crate::error::{ConfigError, Result};
use crate::notify::WatchableResource;
use crate::sources::{LoaderRegistry, SourceUri, load_environment};
use std::fs::File;
use std::io::{BufReader, ErrorKind};
use tracing::debug;

/// How configured sources are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadPolicy {
    /// Use only the first source that is available.
    #[default]
    First,
    /// Use every available source; earlier-declared sources win on conflicts.
    Merge,
}

/// Loads and layers every configured property source.
///
/// Precedence, lowest first: defaults, sources (per [`LoadPolicy`]),
/// imports in reverse declaration order.
pub(crate) struct SourceLoader {
    defaults: PropertyMap,
    sources: Vec<SourceUri>,
    imports: Vec<PropertyMap>,
    policy: LoadPolicy,
    loaders: LoaderRegistry,
}

impl SourceLoader {
    pub(crate) fn new(
        defaults: PropertyMap,
        sources: Vec<SourceUri>,
        imports: Vec<PropertyMap>,
        policy: LoadPolicy,
        loaders: LoaderRegistry,
    ) -> Self {
        Self {
            defaults,
            sources,
            imports,
            policy,
            loaders,
        }
    }

    /// Compute the full property map from scratch.
    ///
    /// # Errors
    ///
    /// Returns an error if an available source cannot be read or parsed.
    /// Missing files and unresolvable references are skipped.
    pub(crate) fn load(&self) -> Result<PropertyMap> {
        let mut properties = self.defaults.clone();
        properties.extend(self.load_sources()?);

        for import in self.imports.iter().rev() {
            properties.extend(import.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        Ok(properties)
    }

    fn load_sources(&self) -> Result<PropertyMap> {
        let mut loaded = PropertyMap::new();

        match self.policy {
            LoadPolicy::First => {
                for source in &self.sources {
                    if self.load_source(source, &mut loaded)? {
                        break;
                    }
                }
            }
            LoadPolicy::Merge => {
                // Later loads overwrite, so walking backwards lets earlier sources win.
                for source in self.sources.iter().rev() {
                    self.load_source(source, &mut loaded)?;
                }
            }
        }

        Ok(loaded)
    }

    /// Load one source into `map`. `Ok(false)` means it was not available.
    fn load_source(&self, source: &SourceUri, map: &mut PropertyMap) -> Result<bool> {
        let path = match source {
            SourceUri::Environment => {
                load_environment(map);
                return Ok(true);
            }
            SourceUri::Unresolvable(raw) => {
                debug!(source = %raw, "skipping unresolvable property source");
                return Ok(false);
            }
            SourceUri::File(path) => path,
        };

        let uri = path.to_string_lossy();
        let loader = self.loaders.find(&uri).ok_or_else(|| {
            ConfigError::LoadError(format!("No loader accepts source '{}'", source))
        })?;

        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(%source, "property source not found, skipping");
                return Ok(false);
            }
            Err(e) => {
                return Err(ConfigError::LoadError(format!(
                    "Failed to open source '{}': {}",
                    source, e
                )));
            }
        };

        loader
            .load(map, &mut BufReader::new(file))
            .map_err(|e| ConfigError::LoadError(format!("Failed to load source '{}': {}", source, e)))?;

        debug!(%source, loader = %loader.name(), "loaded property source");
        Ok(true)
    }

    /// One watchable resource per resolvable source.
    pub(crate) fn watchables(&self) -> Vec<WatchableResource> {
        self.sources
            .iter()
            .filter_map(WatchableResource::for_source)
            .collect()
    }

    /// Get the configured sources in declaration order.
    pub(crate) fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(ToString::to_string).collect()
    }
}
