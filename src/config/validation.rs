//! Configuration errors and value helpers.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use regex::{Captures, Regex};
use thiserror::Error;

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("failed to read config file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid YAML for [`AppConfig`](super::AppConfig).
    #[error("failed to parse YAML config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A value is out of range or malformed.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// `${NAME}` or `${NAME:-fallback}`.
static ENV_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("env var pattern is valid")
});

/// Parse a humantime duration such as `30s`, `10m` or `1h30m`.
///
/// # Examples
///
/// ```
/// use quantitea::config::parse_duration;
///
/// assert_eq!(parse_duration("10m").unwrap().as_secs(), 600);
/// assert_eq!(parse_duration("1d").unwrap().as_secs(), 86_400);
/// assert!(parse_duration("").is_err());
/// ```
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    match s.trim() {
        "" => Err("duration string is empty".to_string()),
        s => humantime::parse_duration(s).map_err(|e| e.to_string()),
    }
}

/// Substitute `${NAME}` and `${NAME:-fallback}` from the process environment.
///
/// Unset variables without a fallback expand to the empty string.
pub fn expand_env_vars(input: &str) -> String {
    ENV_VAR
        .replace_all(input, |caps: &Captures| {
            std::env::var(&caps[1])
                .unwrap_or_else(|_| caps.get(2).map_or("", |m| m.as_str()).to_string())
        })
        .into_owned()
}

pub(super) fn check_bind_address(bind: &str) -> Result<(), ConfigError> {
    bind.parse::<IpAddr>()
        .map(|_| ())
        .map_err(|_| ConfigError::Invalid(format!("invalid server bind address: '{bind}'")))
}

pub(super) fn check_positive(field: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid(format!("{field} must be positive")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration(" 5s ").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("1h 30m").unwrap(), Duration::from_secs(5400));
        assert!(parse_duration("   ").is_err());
        assert!(parse_duration("5").is_err());
        assert!(parse_duration("midnight").is_err());
    }

    #[test]
    fn test_expand_env_vars_passthrough() {
        assert_eq!(expand_env_vars("data/kettle.db"), "data/kettle.db");
        assert_eq!(expand_env_vars("$HOME/kettle.db"), "$HOME/kettle.db");
    }

    #[test]
    fn test_expand_env_vars_fallback() {
        assert_eq!(
            expand_env_vars("${QUANTITEA_UNSET_DIR_4821:-/srv/data}/kettle.db"),
            "/srv/data/kettle.db"
        );
        assert_eq!(expand_env_vars("${QUANTITEA_UNSET_DIR_4821}/kettle.db"), "/kettle.db");
    }

    #[test]
    fn test_expand_env_vars_from_env() {
        // SAFETY: the variable name is unique to this test.
        unsafe {
            std::env::set_var("QUANTITEA_TEST_DATA_DIR", "/mnt/usb");
        }
        assert_eq!(
            expand_env_vars("${QUANTITEA_TEST_DATA_DIR:-/tmp}/kettle.db"),
            "/mnt/usb/kettle.db"
        );
        // SAFETY: as above.
        unsafe {
            std::env::remove_var("QUANTITEA_TEST_DATA_DIR");
        }
    }

    #[test]
    fn test_check_bind_address() {
        assert!(check_bind_address("127.0.0.1").is_ok());
        assert!(check_bind_address("::").is_ok());
        let err = check_bind_address("localhost").unwrap_err();
        assert!(err.to_string().contains("invalid server bind address"));
    }

    #[test]
    fn test_check_positive() {
        assert!(check_positive("server port", 8005).is_ok());
        assert!(matches!(
            check_positive("server port", 0),
            Err(ConfigError::Invalid(msg)) if msg == "server port must be positive"
        ));
    }
}
