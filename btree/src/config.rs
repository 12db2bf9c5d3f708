//! Configuration for the `btreecheck` binary.
//!
//! # Environment Variables
//!
//! - `BTREE_FILE`: Path to the tree file to check (required)
//! - `BTREE_ZERO_UNUSED`: Zero free nodes after a clean check (default: `false`)
//! - `BTREE_CHECK_KEY_ORDER`: Compare keys within and across nodes (default: `false`)

use std::path::PathBuf;

/// Checker configuration.
///
/// # Pre-conditions
///
/// When constructed via `from_env()`:
/// - `BTREE_FILE` must be set and non-empty
/// - Flag variables, when set, must be one of `true`/`false`/`1`/`0`/`yes`/`no`
///
/// # Post-conditions
///
/// - `tree_file` is never empty
/// - Unset flags are `false`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckConfig {
    /// Tree file whose node 0 is the header node.
    pub tree_file: PathBuf,
    /// Run `zero_unused_nodes` when the check finds no problems.
    pub zero_unused: bool,
    /// Also compare keys within and across nodes.
    pub check_key_order: bool,
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable is missing.
    MissingEnvVar(String),
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingEnvVar(name) => {
                write!(f, "missing required environment variable: {name}")
            }
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl CheckConfig {
    pub const TREE_FILE_VAR: &'static str = "BTREE_FILE";
    pub const ZERO_UNUSED_VAR: &'static str = "BTREE_ZERO_UNUSED";
    pub const CHECK_KEY_ORDER_VAR: &'static str = "BTREE_CHECK_KEY_ORDER";

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let tree_file = lookup(Self::TREE_FILE_VAR)
            .ok_or_else(|| ConfigError::MissingEnvVar(Self::TREE_FILE_VAR.to_string()))?;
        if tree_file.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: Self::TREE_FILE_VAR.to_string(),
                message: "must not be empty".to_string(),
            });
        }

        Ok(Self {
            tree_file: PathBuf::from(tree_file),
            zero_unused: parse_flag(Self::ZERO_UNUSED_VAR, lookup(Self::ZERO_UNUSED_VAR))?,
            check_key_order: parse_flag(
                Self::CHECK_KEY_ORDER_VAR,
                lookup(Self::CHECK_KEY_ORDER_VAR),
            )?,
        })
    }
}

/// Unset means `false`.
fn parse_flag(name: &str, value: Option<String>) -> Result<bool, ConfigError> {
    let Some(value) = value else {
        return Ok(false);
    };
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("'{value}' is not a boolean (use true or false)"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_in(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = CheckConfig::from_lookup(lookup_in(&[("BTREE_FILE", "/tmp/catalog")])).unwrap();
        assert_eq!(config.tree_file, PathBuf::from("/tmp/catalog"));
        assert!(!config.zero_unused);
        assert!(!config.check_key_order);
    }

    #[test]
    fn test_flags() {
        let config = CheckConfig::from_lookup(lookup_in(&[
            ("BTREE_FILE", "tree.bin"),
            ("BTREE_ZERO_UNUSED", "TRUE"),
            ("BTREE_CHECK_KEY_ORDER", "1"),
        ]))
        .unwrap();
        assert!(config.zero_unused);
        assert!(config.check_key_order);
    }

    #[test]
    fn test_missing_file() {
        assert_eq!(
            CheckConfig::from_lookup(lookup_in(&[])),
            Err(ConfigError::MissingEnvVar("BTREE_FILE".to_string()))
        );
    }

    #[test]
    fn test_invalid_flag() {
        let err = CheckConfig::from_lookup(lookup_in(&[
            ("BTREE_FILE", "tree.bin"),
            ("BTREE_ZERO_UNUSED", "maybe"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref name, .. } if name == "BTREE_ZERO_UNUSED"));
    }

    #[test]
    fn test_config_error_display_missing() {
        let error = ConfigError::MissingEnvVar("TEST_VAR".to_string());
        assert_eq!(
            error.to_string(),
            "missing required environment variable: TEST_VAR"
        );
    }

    #[test]
    fn test_config_error_display_invalid() {
        let error = ConfigError::InvalidValue {
            name: "TEST_VAR".to_string(),
            message: "bad value".to_string(),
        };
        assert_eq!(error.to_string(), "invalid value for TEST_VAR: bad value");
    }
}
