//! Built-in metrics for property store operations.
//!
//! Provides OpenTelemetry metrics tracking:
//! - Reload attempts, successes, failures and rollbacks
//! - Reload duration
//! - Applied and vetoed property changes
//! - Registered listeners
//!
//! # Examples
//!
//! ```rust,no_run
//! use hotprops::prelude::*;
//! use opentelemetry::global;
//!
//! # fn example() -> Result<()> {
//! let meter = global::meter("my-app");
//!
//! let store = PropertyStore::builder()
//!     .with_source("file:config/app.properties")
//!     .with_metrics(meter)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

mod store_metrics;

pub use store_metrics::StoreMetrics;
