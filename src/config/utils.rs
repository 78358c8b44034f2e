//! Parsing helpers shared by the env and YAML loaders.

use std::str::FromStr;

use super::ConfigError;

/// Reads a variable, treating empty values as unset.
pub(super) fn env_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Parses a variable into `T`, reporting the key on failure.
pub(super) fn parse_env<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_var(key) {
        Some(raw) => raw.parse::<T>().map(Some).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_parse_env_values() {
        unsafe {
            std::env::set_var("AURAQ_TEST_NUMBER", " 42 ");
            std::env::set_var("AURAQ_TEST_EMPTY", "");
            std::env::set_var("AURAQ_TEST_BAD", "forty-two");
        }

        assert_eq!(parse_env::<u16>("AURAQ_TEST_NUMBER").unwrap(), Some(42));
        assert_eq!(parse_env::<u16>("AURAQ_TEST_EMPTY").unwrap(), None);
        assert_eq!(parse_env::<u16>("AURAQ_TEST_MISSING").unwrap(), None);
        assert!(matches!(
            parse_env::<u16>("AURAQ_TEST_BAD"),
            Err(ConfigError::InvalidValue { .. })
        ));

        unsafe {
            std::env::remove_var("AURAQ_TEST_NUMBER");
            std::env::remove_var("AURAQ_TEST_EMPTY");
            std::env::remove_var("AURAQ_TEST_BAD");
        }
    }
}
