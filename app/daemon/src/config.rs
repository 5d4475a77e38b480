//! Daemon configuration loaded from a JSON file.
//!
//! Key names are the config file contract and stay PascalCase on the wire:
//!
//! ```json
//! {
//!     "Listen": { "TcpInfo": "127.0.0.1:5916", "Socket": "" },
//!     "Postgres": "user=courier dbname=courier",
//!     "Gcm": { "ApiKey": "...", "MaxTcpConns": 5, "MaxRetryTime": 8 },
//!     "Dispatchers": 10
//! }
//! ```
//!
//! Exactly one of `Listen.TcpInfo` and `Listen.Socket` must be set. Note
//! that any client able to connect can issue `HALT`; deployments that care
//! should prefer a Unix socket guarded by filesystem permissions.

use anyhow::{Context, Result, bail};
use backend::GcmConfig;
use serde::Deserialize;
use std::path::Path;

/// Worker pool size used when `Dispatchers` is 0 or absent.
pub const DEFAULT_DISPATCHERS: u8 = 10;

/// Top-level daemon configuration.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Config {
    /// Listen endpoint: TCP address or Unix socket path, mutually exclusive.
    pub listen: ListenConfig,
    /// Postgres connection string. Required.
    pub postgres: String,
    /// Android gateway settings; absent disables the connector.
    #[serde(default)]
    pub gcm: Option<GcmConfig>,
    /// Worker pool size; 0 selects the default of 10.
    #[serde(default)]
    pub dispatchers: u8,
}

/// Listen endpoint configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ListenConfig {
    /// TCP address in `host:port` form, or empty.
    pub tcp_info: String,
    /// Absolute path for a Unix stream socket, or empty. The path must not
    /// already exist.
    pub socket: String,
}

impl Config {
    /// Read and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        tracing::info!("parsing JSON config file {}", path.display());
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        Self::from_json(&contents)
    }

    /// Parse and validate a configuration document.
    pub fn from_json(contents: &str) -> Result<Self> {
        let mut config: Self =
            serde_json::from_str(contents).context("malformed configuration")?;
        config.validate()?;
        if config.dispatchers == 0 {
            config.dispatchers = DEFAULT_DISPATCHERS;
        }
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let tcp = !self.listen.tcp_info.is_empty();
        let socket = !self.listen.socket.is_empty();
        if tcp == socket {
            bail!("exactly one of Listen.TcpInfo and Listen.Socket must be set");
        }

        if socket {
            let path = Path::new(&self.listen.socket);
            if !path.is_absolute() {
                bail!("socket path {} is not absolute", self.listen.socket);
            }
            if path.exists() {
                bail!(
                    "cannot create a socket on already existing file {}",
                    self.listen.socket
                );
            }
        }

        if self.postgres.is_empty() {
            bail!("no Postgres connection string configured");
        }

        if let Some(gcm) = &self.gcm {
            if gcm.api_key.is_empty() {
                bail!("Gcm section is set but ApiKey is empty");
            }
        }

        Ok(())
    }
}
