//! Process environment as a property source.

use crate::core::PropertyMap;

/// Copy every environment variable into `map`, keys unchanged.
///
/// Variables whose name or value is not valid Unicode are skipped.
pub fn load_environment(map: &mut PropertyMap) {
    map.extend(std::env::vars_os().filter_map(|(key, value)| {
        Some((key.into_string().ok()?, value.into_string().ok()?))
    }));
}

#[cfg(test)]
#[allow(unsafe_code)] // For env var manipulation in tests
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_load_environment() {
        unsafe {
            env::set_var("HOTPROPS_ENV_SOURCE_TEST", "from-env");
        }

        let mut map = PropertyMap::new();
        load_environment(&mut map);
        assert_eq!(
            map.get("HOTPROPS_ENV_SOURCE_TEST").map(String::as_str),
            Some("from-env")
        );

        unsafe {
            env::remove_var("HOTPROPS_ENV_SOURCE_TEST");
        }
    }
}
