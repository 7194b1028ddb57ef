//! `${name}` variable substitution.

use super::format::{FormatArg, format_args_printf};
use crate::error::Result;
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

/// Non-greedy: the first `}` after a `${` closes the token.
static VARIABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{(.+?)\}").expect("variable pattern is valid"));

/// Source of values for `${name}` lookups.
pub trait VariableLookup {
    /// Look up the raw (unexpanded) value of `name`.
    fn lookup(&self, name: &str) -> Option<Cow<'_, str>>;
}

impl VariableLookup for BTreeMap<String, String> {
    fn lookup(&self, name: &str) -> Option<Cow<'_, str>> {
        self.get(name).map(|v| Cow::Borrowed(v.as_str()))
    }
}

impl VariableLookup for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Option<Cow<'_, str>> {
        self.get(name).map(|v| Cow::Borrowed(v.as_str()))
    }
}

impl<L: VariableLookup + ?Sized> VariableLookup for &L {
    fn lookup(&self, name: &str) -> Option<Cow<'_, str>> {
        (**self).lookup(name)
    }
}

/// Looks names up in the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvLookup;

impl VariableLookup for EnvLookup {
    fn lookup(&self, name: &str) -> Option<Cow<'_, str>> {
        std::env::var(name).ok().map(Cow::Owned)
    }
}

/// Expands `${name}` tokens against a [`VariableLookup`].
///
/// Values are expanded recursively, so `a=${b}`, `b=${c}`, `c=x` resolves
/// `${a}` to `x`. Unknown names expand to the empty string.
///
/// Cyclic definitions (`a=${b}`, `b=${a}`) are not detected and recurse
/// until the stack overflows. Callers must not feed cyclic maps.
///
/// # Examples
///
/// ```rust
/// use hotprops::interpolate::Substitutor;
/// use std::collections::BTreeMap;
///
/// let mut values = BTreeMap::new();
/// values.insert("host".to_string(), "localhost".to_string());
/// values.insert("url".to_string(), "http://${host}:8080".to_string());
///
/// let sub = Substitutor::new(&values);
/// assert_eq!(sub.replace("${url}/api"), "http://localhost:8080/api");
/// ```
#[derive(Debug, Clone)]
pub struct Substitutor<L> {
    values: L,
}

impl<L: VariableLookup> Substitutor<L> {
    /// Create a substitutor over the given values.
    pub fn new(values: L) -> Self {
        Self { values }
    }

    /// Expand every `${name}` token in `template`.
    pub fn replace(&self, template: &str) -> String {
        // Closure replacers insert their output verbatim, so `\1` or `$1`
        // inside a value is never read as a group reference.
        VARIABLE
            .replace_all(template, |caps: &Captures<'_>| {
                match self.values.lookup(&caps[1]) {
                    Some(value) => self.replace(&value),
                    None => String::new(),
                }
            })
            .into_owned()
    }

    /// Like [`replace`](Self::replace), propagating absence.
    pub fn replace_opt(&self, template: Option<&str>) -> Option<String> {
        template.map(|t| self.replace(t))
    }

    /// Expand `source` either as a variable template or as a printf template.
    ///
    /// When `source` holds at least one `${...}` token it is expanded exactly
    /// like [`replace`](Self::replace) and `args` are ignored, leaving any `%`
    /// directives verbatim. Otherwise `args` are formatted positionally.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FormatError`](crate::error::ConfigError::FormatError)
    /// if the printf template is malformed or does not match `args`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hotprops::interpolate::{FormatArg, Substitutor};
    /// use std::collections::BTreeMap;
    ///
    /// let values: BTreeMap<String, String> = BTreeMap::new();
    /// let sub = Substitutor::new(&values);
    /// let out = sub.replace_args("Hello %s", &[FormatArg::from("World")]).unwrap();
    /// assert_eq!(out, "Hello World");
    /// ```
    pub fn replace_args(&self, source: &str, args: &[FormatArg]) -> Result<String> {
        if VARIABLE.is_match(source) {
            Ok(self.replace(source))
        } else {
            format_args_printf(source, args)
        }
    }
}

/// Whether `template` contains at least one `${...}` token.
pub fn has_variables(template: &str) -> bool {
    VARIABLE.is_match(template)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_recursive_resolution() {
        let values = map(&[("a", "${b}"), ("b", "${c}"), ("c", "X")]);
        assert_eq!(Substitutor::new(&values).replace("${a}"), "X");
    }

    #[test]
    fn test_unknown_key_is_empty() {
        let values = map(&[]);
        assert_eq!(Substitutor::new(&values).replace("pre${missing}post"), "prepost");
    }

    #[test]
    fn test_first_brace_closes_token() {
        let values = map(&[("a", "1"), ("a}b", "2")]);
        assert_eq!(Substitutor::new(&values).replace("${a}b}"), "1b}");
    }

    #[test]
    fn test_backslashes_and_dollars_are_literal() {
        let values = map(&[("path", r"C:\temp\1"), ("price", "$1.00")]);
        let sub = Substitutor::new(&values);
        assert_eq!(sub.replace("dir=${path}"), r"dir=C:\temp\1");
        assert_eq!(sub.replace("cost ${price}"), "cost $1.00");
    }

    #[test]
    fn test_multiple_tokens() {
        let values = map(&[("user", "ann"), ("host", "example.org")]);
        assert_eq!(
            Substitutor::new(&values).replace("${user}@${host}"),
            "ann@example.org"
        );
    }

    #[test]
    fn test_replace_opt_propagates_absence() {
        let values = map(&[("x", "1")]);
        let sub = Substitutor::new(&values);
        assert_eq!(sub.replace_opt(None), None);
        assert_eq!(sub.replace_opt(Some("${x}")), Some("1".to_string()));
    }

    #[test]
    fn test_format_vs_variable_exclusivity() {
        let values = map(&[("x", "World")]);
        let sub = Substitutor::new(&values);

        assert_eq!(
            sub.replace_args("Hello %s", &["World".into()]).unwrap(),
            "Hello World"
        );
        assert_eq!(sub.replace_args("Hello ${x}", &[]).unwrap(), "Hello World");

        let values = map(&[("x", "Y")]);
        let sub = Substitutor::new(&values);
        assert_eq!(
            sub.replace_args("Hello %s ${x}", &["W".into()]).unwrap(),
            "Hello %s Y"
        );
    }

    #[test]
    fn test_env_lookup() {
        let sub = Substitutor::new(EnvLookup);
        assert_eq!(sub.replace("${HOTPROPS_SURELY_UNSET_VARIABLE}"), "");
    }

    proptest! {
        #[test]
        fn prop_literal_text_is_unchanged(s in "[^$]*") {
            let values = map(&[("a", "1")]);
            prop_assert_eq!(Substitutor::new(&values).replace(&s), s);
        }

        #[test]
        fn prop_unterminated_tokens_are_unchanged(s in "[a-z ]*\\$\\{[a-z]*") {
            let values = map(&[("a", "1")]);
            prop_assert_eq!(Substitutor::new(&values).replace(&s), s);
        }
    }
}
