//! Server configuration.
//!
//! Loaded once at startup into an immutable structure and passed explicitly
//! to every component; there is no ambient global. Only configuration errors
//! are fatal to the process.

use permchain_ledger::LedgerConfig;
use permchain_miner::MinerConfig;
use permchain_p2p::P2pConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unknown node id: {0}")]
    UnknownNode(String),
}

/// Network-wide limits.
#[derive(Debug, Clone, Deserialize)]
pub struct CommonSection {
    #[serde(default = "defaults::max_block_size")]
    pub max_block_size: usize,
    #[serde(default = "defaults::default_balance")]
    pub default_balance: u64,
    #[serde(default = "defaults::pow_difficulty_bits")]
    pub pow_difficulty_bits: u32,
}

/// Miner tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct MinerSection {
    #[serde(default = "defaults::variant")]
    pub variant: String,
    #[serde(default = "defaults::workers")]
    pub workers: usize,
    #[serde(default = "defaults::scan_budget")]
    pub scan_budget: usize,
}

/// Peer-push tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct P2pSection {
    #[serde(default = "defaults::push_parallel")]
    pub push_parallel: usize,
    #[serde(default = "defaults::push_timeout_ms")]
    pub push_timeout_ms: u64,
    #[serde(default = "defaults::push_trials")]
    pub push_trials: u32,
    #[serde(default = "defaults::push_retry_interval_ms")]
    pub push_retry_interval_ms: u64,
}

/// One node in the network roster.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NodeEntry {
    pub id: String,
    pub addr: String,
}

/// The config file as written on disk.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    #[serde(default = "defaults::common")]
    pub common: CommonSection,
    #[serde(default = "defaults::miner")]
    pub miner: MinerSection,
    #[serde(default = "defaults::p2p")]
    pub p2p: P2pSection,
    pub nodes: Vec<NodeEntry>,
}

mod defaults {
    use super::{CommonSection, MinerSection, P2pSection};

    pub fn max_block_size() -> usize {
        50
    }
    pub fn default_balance() -> u64 {
        1000
    }
    pub fn pow_difficulty_bits() -> u32 {
        16
    }
    pub fn variant() -> String {
        "honest".to_string()
    }
    pub fn workers() -> usize {
        1
    }
    pub fn scan_budget() -> usize {
        100
    }
    pub fn push_parallel() -> usize {
        4
    }
    pub fn push_timeout_ms() -> u64 {
        500
    }
    pub fn push_trials() -> u32 {
        3
    }
    pub fn push_retry_interval_ms() -> u64 {
        3000
    }

    pub fn common() -> CommonSection {
        CommonSection {
            max_block_size: max_block_size(),
            default_balance: default_balance(),
            pow_difficulty_bits: pow_difficulty_bits(),
        }
    }
    pub fn miner() -> MinerSection {
        MinerSection {
            variant: variant(),
            workers: workers(),
            scan_budget: scan_budget(),
        }
    }
    pub fn p2p() -> P2pSection {
        P2pSection {
            push_parallel: push_parallel(),
            push_timeout_ms: push_timeout_ms(),
            push_trials: push_trials(),
            push_retry_interval_ms: push_retry_interval_ms(),
        }
    }
}

/// Resolved configuration for this node: the file contents plus the
/// self/peer split.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub common: CommonSection,
    pub miner: MinerSection,
    pub p2p: P2pSection,
    pub self_node: NodeEntry,
    pub peers: Vec<NodeEntry>,
}

impl ServerConfig {
    /// Load and resolve the config file for the node named `self_id`.
    pub fn load(path: &Path, self_id: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let file: ConfigFile = serde_json::from_str(&raw)?;
        Self::resolve(file, self_id)
    }

    /// Split the roster around `self_id`.
    pub fn resolve(file: ConfigFile, self_id: &str) -> Result<Self, ConfigError> {
        let self_node = file
            .nodes
            .iter()
            .find(|n| n.id == self_id)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownNode(self_id.to_string()))?;
        let peers = file
            .nodes
            .into_iter()
            .filter(|n| n.id != self_id)
            .collect();

        Ok(Self {
            common: file.common,
            miner: file.miner,
            p2p: file.p2p,
            self_node,
            peers,
        })
    }

    pub fn peer_addrs(&self) -> Vec<String> {
        self.peers.iter().map(|p| p.addr.clone()).collect()
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.p2p.push_timeout_ms)
    }

    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            default_balance: self.common.default_balance,
            pow_difficulty_bits: self.common.pow_difficulty_bits,
        }
    }

    pub fn miner_config(&self) -> MinerConfig {
        MinerConfig {
            miner_id: self.self_node.id.clone(),
            workers: self.miner.workers,
            scan_budget: self.miner.scan_budget,
            max_block_txs: self.common.max_block_size,
            pow_difficulty_bits: self.common.pow_difficulty_bits,
        }
    }

    pub fn p2p_config(&self) -> P2pConfig {
        P2pConfig {
            push_parallel: self.p2p.push_parallel,
            push_timeout: self.push_timeout(),
            push_trials: self.p2p.push_trials,
            push_retry_interval: Duration::from_millis(self.p2p.push_retry_interval_ms),
        }
    }

    /// Log the resolved configuration at startup.
    pub fn log_summary(&self) {
        info!(
            id = %self.self_node.id,
            addr = %self.self_node.addr,
            peers = self.peers.len(),
            "node configuration"
        );
        info!(
            max_block_size = self.common.max_block_size,
            default_balance = self.common.default_balance,
            pow_difficulty_bits = self.common.pow_difficulty_bits,
            "common configuration"
        );
        info!(
            variant = %self.miner.variant,
            workers = self.miner.workers,
            scan_budget = self.miner.scan_budget,
            "miner configuration"
        );
        info!(
            push_parallel = self.p2p.push_parallel,
            push_timeout_ms = self.p2p.push_timeout_ms,
            push_trials = self.p2p.push_trials,
            push_retry_interval_ms = self.p2p.push_retry_interval_ms,
            "p2p configuration"
        );
    }
}
