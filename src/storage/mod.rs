pub mod checkpoint;
pub mod document;
pub mod http;

use tracing::info;

use crate::models::common::{SinkConfig, SinkKind};
use crate::models::datasets::transfers::TransferRecord;
use crate::models::errors::SinkError;
use crate::storage::document::DocumentStore;
use crate::storage::http::HttpFanout;

/// Destination of flattened records. One `submit` call carries one block's worth of records.
pub enum Sink {
    NoOp,
    DocumentStore(DocumentStore),
    HttpFanout(HttpFanout),
}

impl Sink {
    pub async fn from_config(config: &SinkConfig) -> Result<Self, SinkError> {
        let sink = match config.kind {
            SinkKind::Noop => Sink::NoOp,
            SinkKind::DocumentStore => {
                let store = DocumentStore::open(&config.document_store_path).await?;
                info!("Appending records to {}", store.path().display());
                Sink::DocumentStore(store)
            }
            SinkKind::Http => {
                Sink::HttpFanout(HttpFanout::new(config.endpoints.clone(), config.batch_size)?)
            }
        };
        info!("Using {} sink", sink.name());
        Ok(sink)
    }

    /// Deliver `records`, returning how many were accepted.
    pub async fn submit(&self, records: &[TransferRecord]) -> Result<usize, SinkError> {
        match self {
            Sink::NoOp => Ok(records.len()),
            Sink::DocumentStore(store) => store.append(records).await,
            Sink::HttpFanout(fanout) => Ok(fanout.post(records).await),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Sink::NoOp => "noop",
            Sink::DocumentStore(_) => "document_store",
            Sink::HttpFanout(_) => "http",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_sink_accepts_everything() {
        let sink = Sink::from_config(&SinkConfig::default()).await.unwrap();

        assert_eq!(sink.name(), "noop");
        assert_eq!(sink.submit(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_document_store_from_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = SinkConfig {
            kind: SinkKind::DocumentStore,
            document_store_path: dir
                .path()
                .join("nested/out.jsonl")
                .to_string_lossy()
                .to_string(),
            ..SinkConfig::default()
        };

        let sink = Sink::from_config(&config).await.unwrap();
        assert_eq!(sink.name(), "document_store");
        assert!(dir.path().join("nested/out.jsonl").exists());
    }
}
