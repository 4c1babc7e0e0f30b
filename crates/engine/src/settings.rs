//! Process-level configuration for proxy sessions.
//!
//! Settings are read once and handed to each proxy explicitly. The
//! environment is snapshotted at load time so every lookup within a session
//! sees the same values.

use std::collections::BTreeMap;
use std::env;

use tracing::debug;

/// Environment variable that, when set to `1` or `true`, hides `$env` from expressions.
pub const BLOCK_ENV_ACCESS_ENV: &str = "FLOWSCOPE_BLOCK_ENV_ACCESS";

/// Configuration shared by proxies built in one process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxySettings {
    /// When true, `$env` lookups always yield `undefined`.
    pub block_env_access: bool,
    /// Environment variables visible through `$env`, sorted by name.
    pub environment: BTreeMap<String, String>,
}

impl ProxySettings {
    /// Loads settings from the process environment.
    pub fn from_env() -> Self {
        let block_env_access = env::var(BLOCK_ENV_ACCESS_ENV)
            .map(|value| is_truthy(&value))
            .unwrap_or(false);
        let environment = if block_env_access {
            BTreeMap::new()
        } else {
            env::vars().collect()
        };
        debug!(block_env_access, variables = environment.len(), "loaded proxy settings");
        Self {
            block_env_access,
            environment,
        }
    }

    /// Settings with an explicit environment, typically for tests and snapshots.
    pub fn with_environment<I, K, V>(variables: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            block_env_access: false,
            environment: variables
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    /// Returns the variable unless environment access is blocked.
    pub fn env_var(&self, name: &str) -> Option<&str> {
        if self.block_env_access {
            return None;
        }
        self.environment.get(name).map(String::as_str)
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}
