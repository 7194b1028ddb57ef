//! Polling hot reload.

use crate::sources::SourceUri;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

/// How reload checks are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HotReloadMode {
    /// Check inline before every property read.
    #[default]
    Sync,
    /// Check on a background Tokio timer (feature `async-reload`).
    Async,
}

/// Hot reload settings.
///
/// # Examples
///
/// ```rust
/// use hotprops::notify::{HotReload, HotReloadMode};
/// use std::time::Duration;
///
/// let settings = HotReload::new(Duration::from_secs(5)).with_mode(HotReloadMode::Sync);
/// assert_eq!(settings.interval(), Duration::from_secs(5));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotReload {
    interval: Duration,
    mode: HotReloadMode,
}

impl HotReload {
    /// Poll sources at most once per `interval`, synchronously.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            mode: HotReloadMode::Sync,
        }
    }

    /// Set the delivery mode.
    pub fn with_mode(mut self, mode: HotReloadMode) -> Self {
        self.mode = mode;
        self
    }

    /// Minimum time between two checks.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Delivery mode.
    pub fn mode(&self) -> HotReloadMode {
        self.mode
    }
}

impl Default for HotReload {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

/// Something whose change can be detected.
#[derive(Debug)]
pub enum WatchableResource {
    /// A file, compared by modification time.
    File {
        /// Watched path.
        path: PathBuf,
        /// Modification time seen at the last check; `None` if missing.
        last_modified: Mutex<Option<SystemTime>>,
    },
    /// A source without change detection; reported as changed every time.
    AlwaysChanged,
}

impl WatchableResource {
    /// Watch `path`, remembering its current modification time.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let last_modified = Mutex::new(modified(&path));
        Self::File {
            path,
            last_modified,
        }
    }

    /// The resource watched for a configured source, if any.
    pub fn for_source(source: &SourceUri) -> Option<Self> {
        match source {
            SourceUri::File(path) => Some(Self::file(path.clone())),
            SourceUri::Environment => Some(Self::AlwaysChanged),
            SourceUri::Unresolvable(_) => None,
        }
    }

    /// Whether the resource changed since the previous call.
    ///
    /// A file appearing or disappearing counts as a change.
    pub fn is_changed(&self) -> bool {
        match self {
            Self::File {
                path,
                last_modified,
            } => {
                let current = modified(path);
                let mut last = last_modified.lock();
                if *last == current {
                    false
                } else {
                    *last = current;
                    true
                }
            }
            Self::AlwaysChanged => true,
        }
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Rate-limited change detection over a fixed set of resources.
#[derive(Debug)]
pub(crate) struct HotReloadLogic {
    settings: HotReload,
    resources: Vec<WatchableResource>,
    last_check: Mutex<Instant>,
}

impl HotReloadLogic {
    pub(crate) fn new(settings: HotReload, resources: Vec<WatchableResource>) -> Self {
        Self {
            settings,
            resources,
            last_check: Mutex::new(Instant::now()),
        }
    }

    pub(crate) fn settings(&self) -> HotReload {
        self.settings
    }

    /// True when the interval elapsed and at least one resource changed.
    ///
    /// Every resource is polled so each one records its latest timestamp.
    pub(crate) fn needs_reload(&self) -> bool {
        {
            let mut last = self.last_check.lock();
            if last.elapsed() < self.settings.interval {
                return false;
            }
            *last = Instant::now();
        }

        self.resources
            .iter()
            .fold(false, |changed, resource| resource.is_changed() || changed)
    }
}

/// Run `tick` on the blocking pool once per `interval` until it returns `false`.
///
/// # Errors
///
/// Returns [`ConfigError::WatchError`](crate::error::ConfigError::WatchError)
/// when called outside a Tokio runtime.
#[cfg(feature = "async-reload")]
pub(crate) fn spawn_reload_timer<F>(
    interval: Duration,
    tick: F,
) -> crate::error::Result<tokio::task::JoinHandle<()>>
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    use std::sync::Arc;
    use tokio::time::MissedTickBehavior;

    let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
        crate::error::ConfigError::WatchError(format!(
            "asynchronous hot reload requires a Tokio runtime: {}",
            e
        ))
    })?;
    let tick = Arc::new(tick);

    Ok(runtime.spawn(async move {
        // tokio intervals must be non-zero
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let tick = Arc::clone(&tick);
            match tokio::task::spawn_blocking(move || tick()).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "hot reload check panicked, stopping timer");
                    break;
                }
            }
        }
    }))
}
