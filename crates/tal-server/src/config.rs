use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tal_crypto::{DigestAlgorithm, EntryHasher};
use tal_ledger::AnomalyThresholds;
use tal_types::Amount;
use thiserror::Error;

/// Simulation intervals an operator may choose, in milliseconds.
pub const ALLOWED_INTERVALS_MS: [u64; 3] = [3000, 5000, 10000];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse configuration: {0}")]
    Parse(String),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Top-level configuration, loaded from TOML.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TalConfig {
    pub ledger: LedgerConfig,
    pub notify: AnomalyThresholds,
    pub simulation: SimulationConfig,
    pub server: ServerConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub digest: DigestAlgorithm,
    pub journal_path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            digest: DigestAlgorithm::default(),
            journal_path: PathBuf::from("tal.journal"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub interval_ms: u64,
    pub agents: Vec<String>,
    /// Emit a fee entry after every `fee_every`-th sale; 0 disables fees.
    pub fee_every: u32,
    /// Chance, in percent, that a simulated sale is flagged as a discrepancy.
    pub discrepancy_percent: u8,
    pub seed: Option<u64>,
}

impl SimulationConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5000,
            agents: vec![
                "UA-AG-001".into(),
                "UA-AG-002".into(),
                "UA-AG-003".into(),
                "UA-AG-004".into(),
            ],
            fee_every: 4,
            discrepancy_percent: 10,
            seed: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Reject new ledger entries over HTTP while reads keep working.
    pub maintenance_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8088)),
            maintenance_mode: false,
        }
    }
}

impl TalConfig {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file; using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !ALLOWED_INTERVALS_MS.contains(&self.simulation.interval_ms) {
            return Err(ConfigError::Invalid {
                field: "simulation.interval_ms",
                reason: format!(
                    "{} is not one of {ALLOWED_INTERVALS_MS:?}",
                    self.simulation.interval_ms
                ),
            });
        }
        if self.simulation.agents.is_empty() {
            return Err(ConfigError::Invalid {
                field: "simulation.agents",
                reason: "at least one agent is required".into(),
            });
        }
        if let Some(i) = self.simulation.agents.iter().position(|a| a.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                field: "simulation.agents",
                reason: format!("agent #{i} is blank"),
            });
        }
        if self.simulation.discrepancy_percent > 100 {
            return Err(ConfigError::Invalid {
                field: "simulation.discrepancy_percent",
                reason: format!("{} exceeds 100", self.simulation.discrepancy_percent),
            });
        }
        if self.notify.high_risk_cutoff > tal_types::FraudScore::MAX {
            return Err(ConfigError::Invalid {
                field: "notify.high_risk_cutoff",
                reason: format!("{} exceeds 100", self.notify.high_risk_cutoff),
            });
        }
        if self.ledger.journal_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                field: "ledger.journal_path",
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }

    pub fn hasher(&self) -> EntryHasher {
        EntryHasher::new(self.ledger.digest)
    }

    pub fn transaction_threshold(&self) -> Amount {
        self.notify.transaction_threshold
    }
}
