//! Environment loader.
//!
//! All lookups go through a closure so tests can feed a fixed map instead of
//! mutating the process environment.

use std::path::PathBuf;

use tracing::debug;

use crate::defaults::{
    FETCH_RETRIES, FETCH_TIMEOUT, LOG_LEVEL, STAGING_DIR_NAME, STATE_DIR_NAME, SWAP_BACKOFF,
    SWAP_RETRIES,
};
use crate::error::{ConfigError, ConfigResult};
use crate::model::{
    FetchSettings, LecternConfig, LoggingSettings, RestartSettings, SwapSettings, is_within,
};
use crate::validate::{
    parse_bool, parse_cache_targets, parse_command, parse_millis, parse_path, parse_secs,
    parse_u32, parse_url_template,
};

/// Library root variable.
pub const ENV_LIBRARY_ROOT: &str = "LECTERN_LIBRARY_ROOT";
/// State directory variable.
pub const ENV_STATE_DIR: &str = "LECTERN_STATE_DIR";
/// Staging directory variable.
pub const ENV_TEMP_DIR: &str = "LECTERN_TEMP_DIR";
/// Fetch URL template variable.
pub const ENV_FETCH_URL: &str = "LECTERN_FETCH_URL";
/// Fetch user variable.
pub const ENV_FETCH_USER: &str = "LECTERN_FETCH_USER";
/// Fetch password variable.
pub const ENV_FETCH_PASS: &str = "LECTERN_FETCH_PASS";
/// Fetch timeout variable.
pub const ENV_FETCH_TIMEOUT: &str = "LECTERN_FETCH_TIMEOUT_SECS";
/// Fetch retries variable.
pub const ENV_FETCH_RETRIES: &str = "LECTERN_FETCH_RETRIES";
/// Swap retries variable.
pub const ENV_SWAP_RETRIES: &str = "LECTERN_SWAP_RETRIES";
/// Swap backoff variable.
pub const ENV_SWAP_BACKOFF: &str = "LECTERN_SWAP_BACKOFF_MS";
/// Cache target list variable.
pub const ENV_CACHE_TARGETS: &str = "LECTERN_CACHE_TARGETS";
/// Restart command variable.
pub const ENV_RESTART_COMMAND: &str = "LECTERN_RESTART_COMMAND";
/// Supervisor flag variable.
pub const ENV_SUPERVISED: &str = "LECTERN_SUPERVISED";
/// Self re-exec flag variable.
pub const ENV_SELF_EXEC: &str = "LECTERN_SELF_EXEC";
/// Log level variable.
pub const ENV_LOG_LEVEL: &str = "LECTERN_LOG_LEVEL";
/// Log format variable.
pub const ENV_LOG_FORMAT: &str = "LECTERN_LOG_FORMAT";

impl LecternConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error when a required variable is missing or any value is invalid.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary lookup function.
    ///
    /// # Errors
    ///
    /// Returns an error when a required variable is missing or any value is invalid.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let library_root = get(ENV_LIBRARY_ROOT)
            .ok_or(ConfigError::Missing {
                field: ENV_LIBRARY_ROOT,
            })
            .and_then(|value| parse_path(ENV_LIBRARY_ROOT, &value))?;

        let state_dir = match get(ENV_STATE_DIR) {
            Some(value) => parse_path(ENV_STATE_DIR, &value)?,
            None => library_root.join(STATE_DIR_NAME),
        };

        let temp_dir = match get(ENV_TEMP_DIR) {
            Some(value) => parse_path(ENV_TEMP_DIR, &value)?,
            None => std::env::temp_dir().join(STAGING_DIR_NAME),
        };
        if is_within(&library_root, &temp_dir) {
            return Err(ConfigError::invalid(
                ENV_TEMP_DIR,
                "inside_library_root",
                &temp_dir.display().to_string(),
            ));
        }

        let fetch = FetchSettings {
            url_template: get(ENV_FETCH_URL)
                .map(|value| parse_url_template(ENV_FETCH_URL, &value))
                .transpose()?,
            username: get(ENV_FETCH_USER),
            password: get(ENV_FETCH_PASS),
            timeout: get(ENV_FETCH_TIMEOUT)
                .map(|value| parse_secs(ENV_FETCH_TIMEOUT, &value))
                .transpose()?
                .unwrap_or(FETCH_TIMEOUT),
            retries: get(ENV_FETCH_RETRIES)
                .map(|value| parse_u32(ENV_FETCH_RETRIES, &value))
                .transpose()?
                .unwrap_or(FETCH_RETRIES),
        };

        let swap = SwapSettings {
            retries: get(ENV_SWAP_RETRIES)
                .map(|value| parse_u32(ENV_SWAP_RETRIES, &value))
                .transpose()?
                .unwrap_or(SWAP_RETRIES),
            backoff: get(ENV_SWAP_BACKOFF)
                .map(|value| parse_millis(ENV_SWAP_BACKOFF, &value))
                .transpose()?
                .unwrap_or(SWAP_BACKOFF),
        };

        let cache_targets = get(ENV_CACHE_TARGETS)
            .map(|value| parse_cache_targets(ENV_CACHE_TARGETS, &value))
            .transpose()?
            .unwrap_or_default();

        let restart = RestartSettings {
            supervised: get(ENV_SUPERVISED)
                .map(|value| parse_bool(ENV_SUPERVISED, &value))
                .transpose()?
                .unwrap_or(false),
            command: get(ENV_RESTART_COMMAND)
                .map(|value| parse_command(ENV_RESTART_COMMAND, &value))
                .transpose()?,
            self_exec: get(ENV_SELF_EXEC)
                .map(|value| parse_bool(ENV_SELF_EXEC, &value))
                .transpose()?
                .unwrap_or(true),
        };

        let logging = LoggingSettings {
            level: get(ENV_LOG_LEVEL).unwrap_or_else(|| LOG_LEVEL.to_string()),
            format: get(ENV_LOG_FORMAT),
        };

        debug!(
            library_root = %library_root.display(),
            state_dir = %state_dir.display(),
            cache_targets = cache_targets.len(),
            fetch_configured = fetch.url_template.is_some(),
            "loaded configuration"
        );

        Ok(Self {
            library_root,
            state_dir,
            temp_dir,
            fetch,
            swap,
            cache_targets,
            restart,
            logging,
        })
    }

    /// Configuration rooted at `library_root` with every optional value at its default.
    #[must_use]
    pub fn for_library(library_root: impl Into<PathBuf>, temp_dir: impl Into<PathBuf>) -> Self {
        let library_root = library_root.into();
        Self {
            state_dir: library_root.join(STATE_DIR_NAME),
            library_root,
            temp_dir: temp_dir.into(),
            fetch: FetchSettings {
                url_template: None,
                username: None,
                password: None,
                timeout: FETCH_TIMEOUT,
                retries: FETCH_RETRIES,
            },
            swap: SwapSettings {
                retries: SWAP_RETRIES,
                backoff: SWAP_BACKOFF,
            },
            cache_targets: Vec::new(),
            restart: RestartSettings {
                supervised: false,
                command: None,
                self_exec: false,
            },
            logging: LoggingSettings {
                level: LOG_LEVEL.to_string(),
                format: None,
            },
        }
    }
}
