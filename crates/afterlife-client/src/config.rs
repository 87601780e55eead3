//! Client configuration and local preferences.
//!
//! Resolution order: built-in defaults, then `AFTERLIFE_*` environment
//! variables, then the user's gateway override from the preferences file.
//! The result is a plain value handed to the clients.

use crate::query::{DEFAULT_MAX_PAGES, DEFAULT_PAGE_SIZE};
use crate::retry::{RetryPolicy, DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_RETRY_DELAY};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const QUERY_ENDPOINTS_ENV: &str = "AFTERLIFE_QUERY_ENDPOINTS";
pub const GATEWAYS_ENV: &str = "AFTERLIFE_GATEWAYS";
pub const RETRY_DELAY_ENV: &str = "AFTERLIFE_RETRY_DELAY_MS";
pub const ATTEMPT_TIMEOUT_ENV: &str = "AFTERLIFE_ATTEMPT_TIMEOUT_MS";
pub const HOME_ENV: &str = "AFTERLIFE_HOME";

pub const DEFAULT_QUERY_ENDPOINTS: [&str; 2] = [
    "https://arweave.net/graphql",
    "https://arweave-search.goldsky.com/graphql",
];
pub const DEFAULT_GATEWAYS: [&str; 2] = ["https://arweave.net", "https://ar-io.dev"];

const PREFERENCES_FILE: &str = "preferences.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key}: invalid URL '{value}': {reason}")]
    InvalidUrl {
        key: String,
        value: String,
        reason: String,
    },
    #[error("{key}: expected a non-negative integer, got '{value}'")]
    InvalidNumber { key: String, value: String },
    #[error("{0}: list is empty")]
    NoEndpoints(&'static str),
    #[error("preferences I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("preferences JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// ClientConfig
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// GraphQL endpoints, tried in order.
    pub query_endpoints: Vec<String>,
    /// Content gateways, tried in order.
    pub gateways: Vec<String>,
    pub retry_delay_ms: u64,
    pub attempt_timeout_ms: u64,
    pub page_size: usize,
    pub max_pages: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            query_endpoints: DEFAULT_QUERY_ENDPOINTS.iter().map(|s| s.to_string()).collect(),
            gateways: DEFAULT_GATEWAYS.iter().map(|s| s.to_string()).collect(),
            retry_delay_ms: DEFAULT_RETRY_DELAY.as_millis() as u64,
            attempt_timeout_ms: DEFAULT_ATTEMPT_TIMEOUT.as_millis() as u64,
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(list) = get(QUERY_ENDPOINTS_ENV) {
            config.query_endpoints = split_list(&list);
        }
        if let Some(list) = get(GATEWAYS_ENV) {
            config.gateways = split_list(&list);
        }
        if let Some(ms) = get(RETRY_DELAY_ENV) {
            config.retry_delay_ms = parse_ms(RETRY_DELAY_ENV, &ms)?;
        }
        if let Some(ms) = get(ATTEMPT_TIMEOUT_ENV) {
            config.attempt_timeout_ms = parse_ms(ATTEMPT_TIMEOUT_ENV, &ms)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.query_endpoints.is_empty() {
            return Err(ConfigError::NoEndpoints(QUERY_ENDPOINTS_ENV));
        }
        if self.gateways.is_empty() {
            return Err(ConfigError::NoEndpoints(GATEWAYS_ENV));
        }
        for endpoint in &self.query_endpoints {
            check_url(QUERY_ENDPOINTS_ENV, endpoint)?;
        }
        for gateway in &self.gateways {
            check_url(GATEWAYS_ENV, gateway)?;
        }
        Ok(())
    }

    /// Put a preferred gateway first, and its `/graphql` first among the
    /// query endpoints. Entries already present are moved, not duplicated.
    pub fn with_gateway_override(mut self, gateway: &str) -> Self {
        let gateway = gateway.trim().trim_end_matches('/').to_string();
        if gateway.is_empty() {
            return self;
        }
        let graphql = format!("{gateway}/graphql");
        prepend_unique(&mut self.gateways, gateway);
        prepend_unique(&mut self.query_endpoints, graphql);
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.retry_delay_ms),
            Duration::from_millis(self.attempt_timeout_ms),
        )
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.trim_end_matches('/').to_string())
        .collect()
}

fn parse_ms(key: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

fn check_url(key: &str, value: &str) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        key: key.to_string(),
        value: value.to_string(),
        reason,
    };
    let parsed = url::Url::parse(value).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(format!("unsupported scheme '{other}'"))),
    }
}

fn prepend_unique(list: &mut Vec<String>, value: String) {
    let normalized = value.trim_end_matches('/');
    list.retain(|v| v.trim_end_matches('/') != normalized);
    list.insert(0, value);
}

// ============================================================================
// Preferences
// ============================================================================

/// Persisted user choices. Currently only the alternate gateway.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_override: Option<String>,
}

impl Preferences {
    /// `$AFTERLIFE_HOME/preferences.json`, else `~/.afterlife/preferences.json`.
    pub fn default_path() -> Option<PathBuf> {
        if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Some(PathBuf::from(home).join(PREFERENCES_FILE));
        }
        std::env::var_os("HOME")
            .filter(|v| !v.is_empty())
            .map(|home| PathBuf::from(home).join(".afterlife").join(PREFERENCES_FILE))
    }

    /// A missing file reads as empty preferences.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn set_gateway(&mut self, gateway: &str) -> Result<(), ConfigError> {
        let gateway = gateway.trim().trim_end_matches('/');
        check_url("gateway", gateway)?;
        self.gateway_override = Some(gateway.to_string());
        Ok(())
    }

    pub fn clear_gateway(&mut self) {
        self.gateway_override = None;
    }

    pub fn apply(&self, config: ClientConfig) -> ClientConfig {
        match &self.gateway_override {
            Some(gateway) => config.with_gateway_override(gateway),
            None => config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = ClientConfig::default();
        config.validate().unwrap();
        assert_eq!(config.query_endpoints.len(), 2);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = ClientConfig::from_lookup(lookup(&[
            (QUERY_ENDPOINTS_ENV, "https://q1.example/graphql, https://q2.example/graphql/"),
            (GATEWAYS_ENV, "https://gw.example"),
            (RETRY_DELAY_ENV, "5"),
        ]))
        .unwrap();
        assert_eq!(
            config.query_endpoints,
            vec!["https://q1.example/graphql", "https://q2.example/graphql"]
        );
        assert_eq!(config.gateways, vec!["https://gw.example"]);
        assert_eq!(config.retry_delay_ms, 5);
        assert_eq!(config.attempt_timeout_ms, 12_000);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[(GATEWAYS_ENV, "not a url")])),
            Err(ConfigError::InvalidUrl { .. })
        ));
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[(GATEWAYS_ENV, "ftp://gw.example")])),
            Err(ConfigError::InvalidUrl { .. })
        ));
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[(RETRY_DELAY_ENV, "-1")])),
            Err(ConfigError::InvalidNumber { .. })
        ));
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[(GATEWAYS_ENV, " , ")])),
            Err(ConfigError::NoEndpoints(_))
        ));
    }

    #[test]
    fn gateway_override_goes_first_without_duplicates() {
        let config = ClientConfig::default().with_gateway_override("https://ar-io.dev/");
        assert_eq!(config.gateways, vec!["https://ar-io.dev", "https://arweave.net"]);
        assert_eq!(config.query_endpoints[0], "https://ar-io.dev/graphql");
        assert_eq!(config.query_endpoints.len(), 3);

        let again = config.clone().with_gateway_override("https://ar-io.dev");
        assert_eq!(again, config);
    }

    #[test]
    fn preferences_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(PREFERENCES_FILE);

        assert_eq!(Preferences::load(&path).unwrap(), Preferences::default());

        let mut prefs = Preferences::default();
        prefs.set_gateway("https://my-gateway.example/").unwrap();
        prefs.save(&path).unwrap();

        let loaded = Preferences::load(&path).unwrap();
        assert_eq!(loaded.gateway_override.as_deref(), Some("https://my-gateway.example"));
        let config = loaded.apply(ClientConfig::default());
        assert_eq!(config.gateways[0], "https://my-gateway.example");

        let mut cleared = loaded;
        cleared.clear_gateway();
        assert_eq!(cleared.apply(ClientConfig::default()), ClientConfig::default());
        assert!(prefs.set_gateway("nope").is_err());
    }
}
