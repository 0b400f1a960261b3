use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use anyhow::{Context, Result};
use axum::{Router, http::StatusCode, routing::get};
use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Gauge, Histogram, MeterProvider};
use opentelemetry_sdk::metrics::{MetricError, SdkMeterProvider};
use prometheus::{Encoder, TextEncoder};
use std::net::SocketAddr;

pub struct Metrics {
    registry: Arc<prometheus::Registry>,
    _provider: SdkMeterProvider,
    pub chain_name: String,

    // Block processing metrics
    pub blocks_processed: Counter<u64>,
    pub records_emitted: Counter<u64>,
    pub latest_processed_block: Gauge<u64>,
    pub latest_block_processing_time: Gauge<f64>,
    pub checkpoint_block: Gauge<u64>,

    // Chain metrics
    pub chain_tip_block: Gauge<u64>,

    // RPC metrics
    pub rpc_requests: Counter<u64>,
    pub rpc_errors: Counter<u64>,
    pub rpc_latency: Histogram<f64>,
    pub trace_timeouts: Counter<u64>,

    // Sink metrics
    pub sink_errors: Counter<u64>,

    // Bounded queue metrics
    pub queue_depth: Gauge<u64>,
}

impl Metrics {
    pub fn new(chain_name: String) -> Result<Self, MetricError> {
        // Create a new prometheus registry
        let registry = prometheus::Registry::new();

        // Configure OpenTelemetry to use this registry
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()?;

        // Set up a meter to create instruments
        let provider = SdkMeterProvider::builder().with_reader(exporter).build();
        let meter = provider.meter("transfer_indexer_metrics");

        let blocks_processed = meter
            .u64_counter("indexer_blocks_processed")
            .with_description("Total number of blocks processed")
            .build();

        let records_emitted = meter
            .u64_counter("indexer_records_emitted")
            .with_description("Transfer records accepted by the sink")
            .build();

        let latest_processed_block = meter
            .u64_gauge("indexer_latest_processed_block_number")
            .with_description("Latest block number processed")
            .build();

        let latest_block_processing_time = meter
            .f64_gauge("indexer_latest_block_processing")
            .with_description("Time spent processing the latest block")
            .with_unit("s")
            .build();

        let checkpoint_block = meter
            .u64_gauge("indexer_checkpoint_block_number")
            .with_description("Highest contiguous block persisted as checkpoint")
            .build();

        let chain_tip_block = meter
            .u64_gauge("indexer_chain_tip_block_number")
            .with_description("Latest block number on chain")
            .build();

        let rpc_requests = meter
            .u64_counter("indexer_rpc_requests")
            .with_description("Number of RPC requests made")
            .build();

        let rpc_errors = meter
            .u64_counter("indexer_rpc_errors")
            .with_description("Number of RPC errors encountered")
            .build();

        let rpc_latency = meter
            .f64_histogram("indexer_rpc_latency")
            .with_description("RPC request latency")
            .with_boundaries(vec![
                0.025, 0.05, 0.075, 0.1, 0.15, 0.2, 0.3, 0.5, 1.0, 5.0, 10.0,
            ])
            .with_unit("s")
            .build();

        let trace_timeouts = meter
            .u64_counter("indexer_trace_timeouts")
            .with_description("Transactions whose trace timed out")
            .build();

        let sink_errors = meter
            .u64_counter("indexer_sink_errors")
            .with_description("Batches the sink failed to accept")
            .build();

        let queue_depth = meter
            .u64_gauge("indexer_queue_depth")
            .with_description("Items waiting in each bounded queue")
            .build();

        Ok(Self {
            registry: Arc::new(registry),
            _provider: provider,
            chain_name,
            blocks_processed,
            records_emitted,
            latest_processed_block,
            latest_block_processing_time,
            checkpoint_block,
            chain_tip_block,
            rpc_requests,
            rpc_errors,
            rpc_latency,
            trace_timeouts,
            sink_errors,
            queue_depth,
        })
    }

    fn chain_label(&self) -> KeyValue {
        KeyValue::new("chain", self.chain_name.clone())
    }

    pub fn record_rpc(&self, method: &'static str, latency: Duration, ok: bool) {
        let labels = [self.chain_label(), KeyValue::new("method", method)];
        self.rpc_requests.add(1, &labels);
        self.rpc_latency.record(latency.as_secs_f64(), &labels);
        if !ok {
            self.rpc_errors.add(1, &labels);
        }
    }

    pub fn record_block(&self, block_number: u64, records: usize, elapsed: Duration) {
        let labels = [self.chain_label()];
        self.blocks_processed.add(1, &labels);
        self.records_emitted.add(records as u64, &labels);
        self.latest_processed_block.record(block_number, &labels);
        self.latest_block_processing_time
            .record(elapsed.as_secs_f64(), &labels);
    }

    pub fn record_pending(&self, records: usize) {
        self.records_emitted.add(
            records as u64,
            &[self.chain_label(), KeyValue::new("source", "pending")],
        );
    }

    pub fn record_checkpoint(&self, block_number: u64) {
        self.checkpoint_block.record(block_number, &[self.chain_label()]);
    }

    pub fn record_chain_tip(&self, block_number: u64) {
        self.chain_tip_block.record(block_number, &[self.chain_label()]);
    }

    pub fn record_trace_timeout(&self) {
        self.trace_timeouts.add(1, &[self.chain_label()]);
    }

    pub fn record_sink_error(&self, sink: &'static str) {
        self.sink_errors
            .add(1, &[self.chain_label(), KeyValue::new("sink", sink)]);
    }

    pub fn record_queue_depth(&self, queue: &'static str, depth: usize) {
        self.queue_depth.record(
            depth as u64,
            &[self.chain_label(), KeyValue::new("queue", queue)],
        );
    }

    pub async fn start_metrics_server(&self, addr: &str, port: u16) -> Result<()> {
        let addr = format!("{addr}:{port}")
            .parse::<SocketAddr>()
            .context("invalid metrics address")?;
        let registry = self.registry.clone();

        let app = Router::new().route("/metrics", get(move || metrics_handler(registry.clone())));

        // Determine the access URL based on the binding address. Only used for logging.
        let access_url = if addr.ip().is_unspecified() {
            format!("http://localhost:{port}/metrics")
        } else {
            format!("http://{}:{port}/metrics", addr.ip())
        };

        info!(
            "Starting metrics server - binding to {} (accessible at {})",
            addr, access_url
        );

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .context("failed to bind metrics server")?;

        // Spawn the server in a separate task
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Metrics server stopped: {}", e);
            }
        });

        Ok(())
    }
}

async fn metrics_handler(registry: Arc<prometheus::Registry>) -> Result<String, StatusCode> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = vec![];
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_are_exported() {
        let metrics = Metrics::new("test_chain".to_string()).unwrap();
        metrics.record_block(7, 3, Duration::from_millis(20));
        metrics.record_queue_depth("blocks", 5);
        metrics.record_rpc("eth_getBlockByNumber", Duration::from_millis(5), false);

        let body = metrics_handler(metrics.registry.clone()).await.unwrap();

        assert!(body.contains("indexer_blocks_processed"));
        assert!(body.contains("indexer_queue_depth"));
        assert!(body.contains("indexer_rpc_errors"));
        assert!(body.contains("test_chain"));
    }
}
