use std::str::FromStr;

use crate::error::ConfigError;

/// Read a variable through `lookup`, treating empty values as unset.
pub(crate) fn optional_env<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|v| !v.trim().is_empty())
}

/// Parse a variable, falling back to `default` when it is unset.
pub(crate) fn parse_optional_env<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_env(lookup, key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Parse a boolean flag. Accepts `true`/`false`/`1`/`0`.
pub(crate) fn parse_bool_env<F>(lookup: &F, key: &str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match optional_env(lookup, key).as_deref().map(str::trim) {
        None => Ok(default),
        Some("1") | Some("true") => Ok(true),
        Some("0") | Some("false") => Ok(false),
        Some(other) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("must be 'true' or 'false', got '{other}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(key: &str) -> Option<String> {
        match key {
            "PORT" => Some("8080".to_string()),
            "BAD_PORT" => Some("eighty".to_string()),
            "EMPTY" => Some("  ".to_string()),
            "FLAG" => Some("1".to_string()),
            "BAD_FLAG" => Some("yes".to_string()),
            _ => None,
        }
    }

    #[test]
    fn empty_values_are_unset() {
        assert_eq!(optional_env(&lookup, "EMPTY"), None);
        assert_eq!(optional_env(&lookup, "PORT").as_deref(), Some("8080"));
    }

    #[test]
    fn parse_falls_back_to_default() {
        assert_eq!(parse_optional_env(&lookup, "PORT", 1u16).unwrap(), 8080);
        assert_eq!(parse_optional_env(&lookup, "MISSING", 7u16).unwrap(), 7);
    }

    #[test]
    fn parse_reports_key_on_failure() {
        let err = parse_optional_env(&lookup, "BAD_PORT", 1u16).unwrap_err();
        assert!(err.to_string().contains("BAD_PORT"));
    }

    #[test]
    fn bool_flags() {
        assert!(parse_bool_env(&lookup, "FLAG", false).unwrap());
        assert!(!parse_bool_env(&lookup, "MISSING", false).unwrap());
        assert!(parse_bool_env(&lookup, "BAD_FLAG", false).is_err());
    }
}
