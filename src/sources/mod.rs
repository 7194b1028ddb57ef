//! Property source formats and source references.

mod env;
mod loader;
mod properties;
mod structured;
mod uri;

pub use env::load_environment;
pub use loader::{Loader, LoaderRegistry};
pub use properties::{PropertiesLoader, parse_properties, write_properties};
pub use structured::StructuredLoader;
pub use uri::SourceUri;
