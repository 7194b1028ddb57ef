//! YAML, TOML and JSON sources flattened to dotted keys.

use super::Loader;
use crate::core::PropertyMap;
use crate::error::{ConfigError, Result};
use std::io::Read;

/// Loader for structured documents.
///
/// Nested tables become dotted keys (`server.port`). Key case is kept as
/// written. Arrays of scalars are joined with `,`; arrays containing tables
/// are indexed (`servers.0.host`). Null values are skipped.
///
/// # Examples
///
/// ```rust
/// use hotprops::core::PropertyMap;
/// use hotprops::sources::{Loader, StructuredLoader};
///
/// # #[cfg(feature = "yaml")]
/// # fn example() -> hotprops::error::Result<()> {
/// let loader = StructuredLoader::yaml();
/// assert!(loader.accept("config/app.yml"));
///
/// let mut map = PropertyMap::new();
/// loader.load(&mut map, &mut "server:\n  port: 8080\n".as_bytes())?;
/// assert_eq!(map["server.port"], "8080");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct StructuredLoader {
    format: Format,
    extensions: &'static [&'static str],
}

#[derive(Debug, Clone, Copy)]
enum Format {
    #[cfg(feature = "yaml")]
    Yaml,
    #[cfg(feature = "toml")]
    Toml,
    #[cfg(feature = "json")]
    Json,
}

impl StructuredLoader {
    /// YAML documents (`.yaml`, `.yml`).
    #[cfg(feature = "yaml")]
    pub fn yaml() -> Self {
        Self {
            format: Format::Yaml,
            extensions: &["yaml", "yml"],
        }
    }

    /// TOML documents (`.toml`).
    #[cfg(feature = "toml")]
    pub fn toml() -> Self {
        Self {
            format: Format::Toml,
            extensions: &["toml"],
        }
    }

    /// JSON documents (`.json`).
    #[cfg(feature = "json")]
    pub fn json() -> Self {
        Self {
            format: Format::Json,
            extensions: &["json"],
        }
    }

    /// One loader per format enabled at compile time.
    pub fn enabled() -> Vec<Self> {
        #[allow(unused_mut)]
        let mut loaders = Vec::new();
        #[cfg(feature = "yaml")]
        loaders.push(Self::yaml());
        #[cfg(feature = "toml")]
        loaders.push(Self::toml());
        #[cfg(feature = "json")]
        loaders.push(Self::json());
        loaders
    }

    fn parse(&self, text: &str) -> Result<Node> {
        let parse_error = |e: &dyn std::fmt::Display| {
            ConfigError::ParseError(format!("{}: {}", self.name(), e))
        };

        match self.format {
            #[cfg(feature = "yaml")]
            Format::Yaml => serde_yaml::from_str::<serde_yaml::Value>(text)
                .map(Node::from_yaml)
                .map_err(|e| parse_error(&e)),
            #[cfg(feature = "toml")]
            Format::Toml => toml::from_str::<toml::Table>(text)
                .map(|table| Node::from_toml(toml::Value::Table(table)))
                .map_err(|e| parse_error(&e)),
            #[cfg(feature = "json")]
            Format::Json => serde_json::from_str::<serde_json::Value>(text)
                .map(Node::from_json)
                .map_err(|e| parse_error(&e)),
        }
    }
}

impl Loader for StructuredLoader {
    fn accept(&self, uri: &str) -> bool {
        uri.rsplit_once('.')
            .map(|(_, ext)| {
                self.extensions
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            })
            .unwrap_or(false)
    }

    fn load(&self, map: &mut PropertyMap, input: &mut dyn Read) -> Result<()> {
        let mut text = String::new();
        input.read_to_string(&mut text)?;

        match self.parse(&text)? {
            Node::Null => Ok(()),
            Node::Table(entries) => {
                for (key, value) in entries {
                    flatten(&key, value, map);
                }
                Ok(())
            }
            _ => Err(ConfigError::ParseError(format!(
                "{}: top level must be a table",
                self.name()
            ))),
        }
    }

    fn name(&self) -> String {
        self.extensions.first().copied().unwrap_or("structured").to_string()
    }
}

/// A parsed document, independent of its source format.
#[allow(dead_code)]
enum Node {
    Null,
    Scalar(String),
    List(Vec<Node>),
    Table(Vec<(String, Node)>),
}

impl Node {
    #[cfg(feature = "yaml")]
    fn from_yaml(value: serde_yaml::Value) -> Self {
        use serde_yaml::Value;

        match value {
            Value::Null => Node::Null,
            Value::Bool(b) => Node::Scalar(b.to_string()),
            Value::Number(n) => Node::Scalar(n.to_string()),
            Value::String(s) => Node::Scalar(s),
            Value::Sequence(items) => Node::List(items.into_iter().map(Self::from_yaml).collect()),
            Value::Mapping(mapping) => Node::Table(
                mapping
                    .into_iter()
                    .filter_map(|(key, value)| match Self::from_yaml(key) {
                        Node::Scalar(key) => Some((key, Self::from_yaml(value))),
                        _ => None,
                    })
                    .collect(),
            ),
            Value::Tagged(tagged) => Self::from_yaml(tagged.value),
        }
    }

    #[cfg(feature = "toml")]
    fn from_toml(value: toml::Value) -> Self {
        use toml::Value;

        match value {
            Value::String(s) => Node::Scalar(s),
            Value::Integer(n) => Node::Scalar(n.to_string()),
            Value::Float(x) => Node::Scalar(x.to_string()),
            Value::Boolean(b) => Node::Scalar(b.to_string()),
            Value::Datetime(dt) => Node::Scalar(dt.to_string()),
            Value::Array(items) => Node::List(items.into_iter().map(Self::from_toml).collect()),
            Value::Table(table) => Node::Table(
                table
                    .into_iter()
                    .map(|(key, value)| (key, Self::from_toml(value)))
                    .collect(),
            ),
        }
    }

    #[cfg(feature = "json")]
    fn from_json(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => Node::Null,
            Value::Bool(b) => Node::Scalar(b.to_string()),
            Value::Number(n) => Node::Scalar(n.to_string()),
            Value::String(s) => Node::Scalar(s),
            Value::Array(items) => Node::List(items.into_iter().map(Self::from_json).collect()),
            Value::Object(object) => Node::Table(
                object
                    .into_iter()
                    .map(|(key, value)| (key, Self::from_json(value)))
                    .collect(),
            ),
        }
    }
}

fn flatten(prefix: &str, node: Node, map: &mut PropertyMap) {
    match node {
        Node::Null => {}
        Node::Scalar(text) => {
            map.insert(prefix.to_string(), text);
        }
        Node::Table(entries) => {
            for (key, child) in entries {
                flatten(&format!("{}.{}", prefix, key), child, map);
            }
        }
        Node::List(items) => {
            if items.iter().all(|item| matches!(item, Node::Scalar(_))) {
                let joined: Vec<String> = items
                    .into_iter()
                    .filter_map(|item| match item {
                        Node::Scalar(text) => Some(text),
                        _ => None,
                    })
                    .collect();
                map.insert(prefix.to_string(), joined.join(","));
            } else {
                for (index, item) in items.into_iter().enumerate() {
                    flatten(&format!("{}.{}", prefix, index), item, map);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_by_extension() {
        for loader in StructuredLoader::enabled() {
            assert!(!loader.accept("app.properties"));
            assert!(!loader.accept("no_extension"));
        }
    }

    #[cfg(feature = "yaml")]
    #[test]
    fn test_yaml_flattening() {
        let loader = StructuredLoader::yaml();
        assert!(loader.accept("config/APP.YML"));

        let mut map = PropertyMap::new();
        let yaml = r#"
server:
  host: localhost
  port: 8080
  tags: [a, b, c]
  proxy: ~
database:
  url: "postgres://${server.host}/db"
replicas:
  - host: r1
  - host: r2
"#;
        loader.load(&mut map, &mut yaml.as_bytes()).unwrap();

        assert_eq!(map["server.host"], "localhost");
        assert_eq!(map["server.port"], "8080");
        assert_eq!(map["server.tags"], "a,b,c");
        assert_eq!(map["database.url"], "postgres://${server.host}/db");
        assert_eq!(map["replicas.0.host"], "r1");
        assert_eq!(map["replicas.1.host"], "r2");
        assert!(!map.contains_key("server.proxy"));
    }

    #[cfg(feature = "yaml")]
    #[test]
    fn test_yaml_keeps_key_case() {
        let mut map = PropertyMap::new();
        StructuredLoader::yaml()
            .load(&mut map, &mut "serverPort: 1\nDB:\n  URL: x\n".as_bytes())
            .unwrap();

        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["DB.URL", "serverPort"]);
    }

    #[cfg(feature = "yaml")]
    #[test]
    fn test_empty_yaml_document() {
        let mut map = PropertyMap::new();
        StructuredLoader::yaml()
            .load(&mut map, &mut "".as_bytes())
            .unwrap();
        assert!(map.is_empty());
    }

    #[cfg(feature = "toml")]
    #[test]
    fn test_toml_flattening() {
        let loader = StructuredLoader::toml();
        let mut map = PropertyMap::new();
        let toml = "[cache]\nenabled = true\nttl = 30\nmaxEntries = 10\n";
        loader.load(&mut map, &mut toml.as_bytes()).unwrap();

        assert_eq!(map["cache.enabled"], "true");
        assert_eq!(map["cache.ttl"], "30");
        assert_eq!(map["cache.maxEntries"], "10");
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_json_keeps_key_case() {
        let mut map = PropertyMap::new();
        StructuredLoader::json()
            .load(
                &mut map,
                &mut r#"{"Server": {"listenPort": 7070, "tls": null}}"#.as_bytes(),
            )
            .unwrap();
        assert_eq!(map["Server.listenPort"], "7070");
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_json_parse_error() {
        let loader = StructuredLoader::json();
        let mut map = PropertyMap::new();
        let err = loader.load(&mut map, &mut "{ not json".as_bytes()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));

        let err = loader.load(&mut map, &mut "[1, 2]".as_bytes()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }
}
