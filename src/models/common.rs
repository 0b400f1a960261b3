use serde::{Deserialize, Serialize};

use crate::utils::retry::RetryConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_address")]
    pub address: String,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_metrics_address(),
            port: default_metrics_port(),
        }
    }
}

// Capacities of every bounded queue in the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub blocks: usize,
    pub pending_txs: usize,
    pub removed_logs: usize,
    pub head_events: usize,
    pub new_tx_events: usize,
    pub removed_log_events: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            blocks: 256,
            pending_txs: 256,
            removed_logs: 256,
            head_events: 10,
            new_tx_events: 10,
            removed_log_events: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    pub timeout_secs: u64,
    pub reexec: u64,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            reexec: 128,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    #[default]
    Noop,
    DocumentStore,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub kind: SinkKind,
    pub batch_size: usize,
    pub endpoints: Vec<String>,
    pub document_store_path: String,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: SinkKind::Noop,
            batch_size: 100,
            endpoints: Vec::new(),
            document_store_path: "data/transfers.jsonl".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    #[serde(default = "default_chain_name")]
    pub chain_name: String,
    pub rpc_url: String,
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: String,
    #[serde(default)]
    pub start_block: Option<u64>,
    #[serde(default = "default_block_workers")]
    pub block_workers: usize,
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,
    #[serde(default)]
    pub queues: QueueConfig,
    #[serde(default)]
    pub trace: TraceConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl IndexerConfig {
    // Minimal config pointing at a node, everything else defaulted
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            chain_name: default_chain_name(),
            rpc_url: rpc_url.into(),
            checkpoint_path: default_checkpoint_path(),
            start_block: None,
            block_workers: default_block_workers(),
            report_interval_secs: default_report_interval_secs(),
            queues: QueueConfig::default(),
            trace: TraceConfig::default(),
            sink: SinkConfig::default(),
            retry: RetryConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

fn default_chain_name() -> String {
    "ethereum".to_string()
}

fn default_checkpoint_path() -> String {
    "data/checkpoint".to_string()
}

fn default_block_workers() -> usize {
    4
}

fn default_report_interval_secs() -> u64 {
    60
}

fn default_metrics_address() -> String {
    "0.0.0.0".to_string()
}

fn default_metrics_port() -> u16 {
    9100
}
