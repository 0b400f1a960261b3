use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ChainError {
    #[error("RPC error: {0}")]
    Rpc(String),
    #[error("Subscription to {feed} failed: {message}")]
    Subscription { feed: &'static str, message: String },
    #[error("Block {0} not found")]
    BlockNotFound(u64),
    #[error("Invalid state dump: {0}")]
    InvalidStateDump(String),
}

#[derive(Error, Debug, Clone)]
pub enum TraceError {
    #[error("Trace execution timeout")]
    Timeout,
    #[error("Malformed trace payload: {0}")]
    Malformed(String),
    #[error("Trace RPC error: {0}")]
    Rpc(String),
}

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Checkpoint database error: {0}")]
    Database(#[from] rocksdb::Error),
    #[error("Invalid value for checkpoint key '{key}': expected 8 bytes, got {len}")]
    InvalidValue { key: &'static str, len: usize },
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to serialize records: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Document store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),
    #[error("Live feed '{0}' failed, stopping live ingestion")]
    FeedFailed(&'static str),
}
