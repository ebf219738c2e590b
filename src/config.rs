use std::{str::FromStr, time::Duration};

use alloy::primitives::Address;
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::types::{ContractCategory, SUPPORTED_CHAIN_IDS, WatchedContract};

const ENV_PREFIX: &str = "TICKET_SYNC";

/// Configuration for the sync service.
/// Deserialized from an optional TOML file, then overridden by
/// `TICKET_SYNC_*` environment variables (`__` separates nested keys).
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct Settings {
    pub core: Core,
    #[serde(default)]
    pub rpc: Rpc,
    #[serde(default)]
    pub sync: SyncOptions,
    #[serde(default)]
    pub contracts: Contracts,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct Core {
    pub database_url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct Rpc {
    #[serde(default = "default_rpc_url")]
    pub url: String,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_block_span")]
    pub max_block_span: u64,
}

impl Default for Rpc {
    fn default() -> Self {
        Self {
            url: default_rpc_url(),
            chain_id: default_chain_id(),
            timeout_secs: default_timeout_secs(),
            max_block_span: default_max_block_span(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct SyncOptions {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

/// Deployed contract addresses. Unset or empty entries are skipped by the
/// orchestrator.
#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct Contracts {
    pub event_manager: Option<String>,
    pub ticket_manager: Option<String>,
    pub marketplace: Option<String>,
    pub token_swap: Option<String>,
}

fn default_max_connections() -> u32 {
    10
}

fn default_rpc_url() -> String {
    "http://localhost:8545".to_string()
}

fn default_chain_id() -> u64 {
    31337
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_max_block_span() -> u64 {
    2000
}

fn default_interval_secs() -> u64 {
    30
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("chain id {0} is not supported")]
    UnsupportedChain(u64),
    #[error("invalid {name} contract address {value:?}")]
    InvalidAddress { name: &'static str, value: String },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

impl Settings {
    /// Loads settings from `path` (optional) layered under the environment.
    pub fn load(path: &str) -> Result<Self, SettingsError> {
        let config = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(env_source())
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_str(toml_str: &str) -> Result<Self, SettingsError> {
        let config = Config::builder()
            .add_source(File::from_str(toml_str, FileFormat::Toml))
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if !SUPPORTED_CHAIN_IDS.contains(&self.rpc.chain_id) {
            return Err(SettingsError::UnsupportedChain(self.rpc.chain_id));
        }
        if self.sync.interval_secs == 0 {
            return Err(SettingsError::Zero("sync.interval_secs"));
        }
        if self.rpc.max_block_span == 0 {
            return Err(SettingsError::Zero("rpc.max_block_span"));
        }
        if self.rpc.timeout_secs == 0 {
            return Err(SettingsError::Zero("rpc.timeout_secs"));
        }
        self.watched_contracts().map(|_| ())
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync.interval_secs)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc.timeout_secs)
    }

    /// Contracts in the order they are scanned within a pass: registry first,
    /// so events exist before tickets and orders reference them.
    pub fn watched_contracts(&self) -> Result<Vec<WatchedContract>, SettingsError> {
        let entries = [
            (
                ContractCategory::Registry,
                "event_manager",
                &self.contracts.event_manager,
            ),
            (
                ContractCategory::Issuance,
                "ticket_manager",
                &self.contracts.ticket_manager,
            ),
            (
                ContractCategory::Marketplace,
                "marketplace",
                &self.contracts.marketplace,
            ),
            (
                ContractCategory::TokenSwap,
                "token_swap",
                &self.contracts.token_swap,
            ),
        ];

        entries
            .into_iter()
            .map(|(category, name, value)| {
                let address = match value.as_deref().map(str::trim) {
                    None | Some("") => None,
                    Some(raw) => Some(Address::from_str(raw).map_err(|_| {
                        SettingsError::InvalidAddress {
                            name,
                            value: raw.to_string(),
                        }
                    })?),
                };
                Ok(WatchedContract::new(category, address))
            })
            .collect()
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
