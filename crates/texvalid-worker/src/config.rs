//! Worker configuration parsed from environment variables.
//!
//! Every setting can be overridden with a `TEXVALID_` variable; the CLI applies
//! its own flags on top.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use texvalid_syntax::lexer::DEFAULT_MAX_TOKENS;
use texvalid_syntax::ParseOptions;
use thiserror::Error;

/// Quiet period after the last edit before a document is linted.
pub const DEFAULT_DEBOUNCE_MS: u64 = 250;
/// Delay before suppressions are re-evaluated after the cursor moves.
pub const DEFAULT_CURSOR_DEBOUNCE_MS: u64 = 100;
/// Most diagnostics an editor is asked to display at once.
pub const DEFAULT_MAX_DIAGNOSTICS: usize = 100;

pub const DEBOUNCE_VAR: &str = "TEXVALID_DEBOUNCE_MS";
pub const CURSOR_DEBOUNCE_VAR: &str = "TEXVALID_CURSOR_DEBOUNCE_MS";
pub const MAX_TOKENS_VAR: &str = "TEXVALID_MAX_TOKENS";
pub const MAX_DIAGNOSTICS_VAR: &str = "TEXVALID_MAX_DIAGNOSTICS";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}, expected a non-negative integer")]
    InvalidNumber { key: &'static str, value: String },

    #[error("{key} must be greater than zero")]
    Zero { key: &'static str },
}

/// Settings shared by the worker thread and the editor client.
///
/// # Environment Variables
///
/// - `TEXVALID_DEBOUNCE_MS`: quiet period before linting (default 250)
/// - `TEXVALID_CURSOR_DEBOUNCE_MS`: suppression refresh delay (default 100)
/// - `TEXVALID_MAX_TOKENS`: parser token cap (default 100000)
/// - `TEXVALID_MAX_DIAGNOSTICS`: displayed diagnostic cap (default 100)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub debounce: Duration,
    pub cursor_debounce: Duration,
    pub max_tokens: usize,
    pub max_diagnostics: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            cursor_debounce: Duration::from_millis(DEFAULT_CURSOR_DEBOUNCE_MS),
            max_tokens: DEFAULT_MAX_TOKENS,
            max_diagnostics: DEFAULT_MAX_DIAGNOSTICS,
        }
    }
}

impl WorkerConfig {
    /// Loads configuration from the process environment, falling back to
    /// defaults for unset variables.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a variable is set to something other than
    /// a non-negative integer, or if a cap is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`WorkerConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let debounce =
            read(&lookup, DEBOUNCE_VAR)?.map_or(defaults.debounce, Duration::from_millis);
        let cursor_debounce = read(&lookup, CURSOR_DEBOUNCE_VAR)?
            .map_or(defaults.cursor_debounce, Duration::from_millis);
        let max_tokens = read_nonzero(&lookup, MAX_TOKENS_VAR)?.unwrap_or(defaults.max_tokens);
        let max_diagnostics =
            read_nonzero(&lookup, MAX_DIAGNOSTICS_VAR)?.unwrap_or(defaults.max_diagnostics);

        Ok(Self {
            debounce,
            cursor_debounce,
            max_tokens,
            max_diagnostics,
        })
    }

    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            max_tokens: self.max_tokens,
        }
    }
}

fn read<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { key, value }),
        None => Ok(None),
    }
}

fn read_nonzero(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<usize>, ConfigError> {
    match read::<usize>(lookup, key)? {
        Some(0) => Err(ConfigError::Zero { key }),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, WorkerConfig::default());
        assert_eq!(config.debounce, Duration::from_millis(250));
        assert_eq!(config.cursor_debounce, Duration::from_millis(100));
        assert_eq!(config.max_tokens, 100_000);
        assert_eq!(config.max_diagnostics, 100);
    }

    #[test]
    fn test_overrides() {
        let config = WorkerConfig::from_lookup(lookup(&[
            (DEBOUNCE_VAR, "50"),
            (CURSOR_DEBOUNCE_VAR, " 0 "),
            (MAX_TOKENS_VAR, "2000"),
            (MAX_DIAGNOSTICS_VAR, "5"),
        ]))
        .unwrap();
        assert_eq!(config.debounce, Duration::from_millis(50));
        assert_eq!(config.cursor_debounce, Duration::ZERO);
        assert_eq!(config.parse_options().max_tokens, 2000);
        assert_eq!(config.max_diagnostics, 5);
    }

    #[test]
    fn test_invalid_number() {
        let err = WorkerConfig::from_lookup(lookup(&[(DEBOUNCE_VAR, "soon")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidNumber {
                key: DEBOUNCE_VAR,
                value: "soon".to_string()
            }
        );
        assert_eq!(
            err.to_string(),
            "invalid value 'soon' for TEXVALID_DEBOUNCE_MS, expected a non-negative integer"
        );
    }

    #[test]
    fn test_zero_cap_rejected() {
        let err = WorkerConfig::from_lookup(lookup(&[(MAX_TOKENS_VAR, "0")])).unwrap_err();
        assert_eq!(err, ConfigError::Zero { key: MAX_TOKENS_VAR });
    }
}
