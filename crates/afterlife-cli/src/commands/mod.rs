//! Subcommand implementations.

pub mod config;
pub mod publish;
pub mod resolve;
pub mod verify;

use afterlife_client::{
    ClientConfig, DocumentFetchClient, HttpTransport, LedgerQueryClient, MemoryLedger, Preferences,
};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Extra headroom for the HTTP client over the per-attempt timeout, so the
/// retry policy's timeout is the one that fires.
const TRANSPORT_SLACK: Duration = Duration::from_secs(1);

/// Resolved configuration plus the clients built from it.
pub struct Backend {
    pub config: ClientConfig,
    pub query: LedgerQueryClient,
    pub fetch: DocumentFetchClient,
    /// Set when running against a ledger file.
    pub local: Option<LocalLedger>,
}

pub struct LocalLedger {
    pub ledger: Arc<MemoryLedger>,
    pub path: PathBuf,
}

impl Backend {
    pub fn open(ledger_file: Option<&Path>) -> Result<Self> {
        let config = resolve_config()?;

        match ledger_file {
            Some(path) => {
                let ledger = Arc::new(
                    MemoryLedger::load(path)
                        .with_context(|| format!("failed to load ledger file {}", path.display()))?,
                );
                tracing::debug!(path = %path.display(), records = ledger.len(), "using ledger file");
                Ok(Self {
                    query: LedgerQueryClient::from_config(ledger.clone(), &config),
                    fetch: DocumentFetchClient::from_config(ledger.clone(), &config),
                    config,
                    local: Some(LocalLedger {
                        ledger,
                        path: path.to_path_buf(),
                    }),
                })
            }
            None => {
                let transport = Arc::new(
                    HttpTransport::new(config.attempt_timeout() + TRANSPORT_SLACK)
                        .context("failed to build HTTP client")?,
                );
                Ok(Self {
                    query: LedgerQueryClient::from_config(transport.clone(), &config),
                    fetch: DocumentFetchClient::from_config(transport, &config),
                    config,
                    local: None,
                })
            }
        }
    }

    /// Write the ledger file back, if there is one.
    pub fn persist(&self) -> Result<()> {
        if let Some(local) = &self.local {
            local
                .ledger
                .save(&local.path)
                .with_context(|| format!("failed to write ledger file {}", local.path.display()))?;
        }
        Ok(())
    }
}

/// Environment, then the stored gateway preference.
pub fn resolve_config() -> Result<ClientConfig> {
    let config = ClientConfig::from_env().context("invalid AFTERLIFE_* environment")?;
    let prefs = match Preferences::default_path() {
        Some(path) => Preferences::load(&path)
            .with_context(|| format!("failed to read preferences {}", path.display()))?,
        None => Preferences::default(),
    };
    Ok(prefs.apply(config))
}
