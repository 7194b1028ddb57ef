//! Source references and their resolution to readable locations.

use crate::interpolate::{EnvLookup, Substitutor};
use std::fmt;
use std::path::PathBuf;

/// A configured property source.
///
/// Parsed from a string reference after expanding `${VAR}` tokens against
/// the process environment:
///
/// - `env:` or `system:env` → the process environment
/// - `file:<path>` or `file://<path>` → a file
/// - a bare path → a file
/// - any other `scheme:` → [`SourceUri::Unresolvable`], skipped at load time
///
/// # Examples
///
/// ```rust
/// use hotprops::sources::SourceUri;
/// use std::path::PathBuf;
///
/// assert_eq!(SourceUri::parse("file:/etc/app.properties"),
///            SourceUri::File(PathBuf::from("/etc/app.properties")));
/// assert_eq!(SourceUri::parse("system:env"), SourceUri::Environment);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceUri {
    /// A file on the local filesystem.
    File(PathBuf),
    /// The process environment.
    Environment,
    /// A reference that cannot be translated into a readable location.
    Unresolvable(String),
}

impl SourceUri {
    /// Expand environment variables in `raw` and classify the result.
    pub fn parse(raw: &str) -> Self {
        let expanded = Substitutor::new(EnvLookup).replace(raw.trim());

        if expanded.is_empty() {
            return Self::Unresolvable(raw.to_string());
        }
        if expanded == "env:" || expanded == "system:env" {
            return Self::Environment;
        }
        if let Some(path) = expanded.strip_prefix("file:") {
            let path = path.strip_prefix("//").unwrap_or(path);
            return if path.is_empty() {
                Self::Unresolvable(raw.to_string())
            } else {
                Self::File(PathBuf::from(path))
            };
        }
        if has_foreign_scheme(&expanded) {
            return Self::Unresolvable(raw.to_string());
        }
        Self::File(PathBuf::from(expanded))
    }
}

impl fmt::Display for SourceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "file:{}", path.display()),
            Self::Environment => f.write_str("system:env"),
            Self::Unresolvable(raw) => f.write_str(raw),
        }
    }
}

/// `scheme:` prefix of two or more letters; single letters are drive names.
fn has_foreign_scheme(text: &str) -> bool {
    match text.split_once(':') {
        Some((scheme, _)) => {
            scheme.len() > 1
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
                && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        }
        None => false,
    }
}
