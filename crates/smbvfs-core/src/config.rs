//! Provider arguments and protocol client configuration.
//!
//! A provider is configured from a string-keyed argument map (see the `*_KEY`
//! constants). Values override the client defaults; a process-wide port
//! override, when present, wins over everything else.

use std::collections::BTreeMap;
use std::num::ParseIntError;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

/// String-keyed provider arguments.
pub type ProviderArguments = BTreeMap<String, String>;

/// Scheme used when none (or an empty one) is given.
pub const DEFAULT_SCHEME: &str = "smb";

/// Lock wait bound in milliseconds.
pub const LOCK_TIMEOUT_KEY: &str = "lock-timeout";
/// Name resolution order handed to the client.
pub const RESOLVE_ORDER_KEY: &str = "resolveOrder";
/// `true`/`false`: disable DFS referral resolution.
pub const DFS_DISABLED_KEY: &str = "smb.client.dfs.disabled";
/// TCP port of the SMB server.
pub const PORT_KEY: &str = "port";

/// Environment variable holding the process-wide port override.
pub const PORT_OVERRIDE_ENV: &str = "SMBVFS_CLIENT_PORT";

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(20_000);
pub const DEFAULT_RESOLVE_ORDER: &str = "DNS";
pub const DEFAULT_DFS_DISABLED: bool = true;

/// Errors from interpreting provider arguments.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for '{key}': expected true or false, got '{value}'")]
    InvalidBool { key: &'static str, value: String },

    #[error("invalid port '{value}': {source}")]
    InvalidPort {
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("scheme '{scheme}' can't be used in a path pattern: {source}")]
    InvalidScheme {
        scheme: String,
        #[source]
        source: regex::Error,
    },
}

/// Settings handed to the protocol client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub resolve_order: String,
    pub dfs_disabled: bool,
    /// `None` means the client's default port.
    pub port: Option<u16>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            resolve_order: DEFAULT_RESOLVE_ORDER.to_string(),
            dfs_disabled: DEFAULT_DFS_DISABLED,
            port: None,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `arguments`.
    pub fn from_arguments(arguments: &ProviderArguments) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(order) = arguments.get(RESOLVE_ORDER_KEY) {
            config.resolve_order.clone_from(order);
        }
        if let Some(value) = arguments.get(DFS_DISABLED_KEY) {
            config.dfs_disabled = parse_bool(DFS_DISABLED_KEY, value)?;
        }
        if let Some(value) = arguments.get(PORT_KEY) {
            config.port = Some(parse_port(value)?);
        }
        Ok(config)
    }

    /// Apply the process-wide port override, which takes final precedence.
    pub fn with_port_override(mut self, port_override: Option<&str>) -> Result<Self, ConfigError> {
        if let Some(value) = port_override {
            self.port = Some(parse_port(value)?);
        }
        Ok(self)
    }
}

/// Lock timeout from `arguments`.
///
/// A missing or unparsable value keeps [`DEFAULT_LOCK_TIMEOUT`].
pub fn lock_timeout(arguments: &ProviderArguments) -> Duration {
    let Some(value) = arguments.get(LOCK_TIMEOUT_KEY) else {
        return DEFAULT_LOCK_TIMEOUT;
    };
    match value.trim().parse::<u64>() {
        Ok(millis) => Duration::from_millis(millis),
        Err(e) => {
            warn!(
                value = %value,
                error = %e,
                default_ms = DEFAULT_LOCK_TIMEOUT.as_millis(),
                "Ignoring invalid lock-timeout"
            );
            DEFAULT_LOCK_TIMEOUT
        }
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim() {
        v if v.eq_ignore_ascii_case("true") => Ok(true),
        v if v.eq_ignore_ascii_case("false") => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key,
            value: value.to_string(),
        }),
    }
}

fn parse_port(value: &str) -> Result<u16, ConfigError> {
    value
        .trim()
        .parse::<u16>()
        .map_err(|source| ConfigError::InvalidPort {
            value: value.to_string(),
            source,
        })
}
