use futures::future::join_all;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error};

use crate::models::datasets::transfers::TransferRecord;
use crate::models::errors::SinkError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// Body every subscriber endpoint answers with
#[derive(Debug, Deserialize)]
pub struct EndpointResponse {
    #[serde(default)]
    pub result: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: i64,
}

/// Posts record chunks to every subscriber endpoint. Delivery is best effort: failures are
/// logged per endpoint and never retried.
pub struct HttpFanout {
    client: Client,
    endpoints: Vec<String>,
    batch_size: usize,
}

impl HttpFanout {
    pub fn new(endpoints: Vec<String>, batch_size: usize) -> Result<Self, SinkError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoints,
            batch_size: batch_size.max(1),
        })
    }

    /// Returns the number of records submitted, regardless of endpoint outcomes.
    pub async fn post(&self, records: &[TransferRecord]) -> usize {
        for chunk in records.chunks(self.batch_size) {
            join_all(
                self.endpoints
                    .iter()
                    .map(|endpoint| self.post_chunk(endpoint, chunk)),
            )
            .await;
        }
        records.len()
    }

    async fn post_chunk(
        &self,
        endpoint: &str,
        chunk: &[TransferRecord],
    ) -> Option<EndpointResponse> {
        let response = match self.client.post(endpoint).json(chunk).send().await {
            Ok(response) => response,
            Err(e) => {
                error!(
                    "Request to {} with {} records failed: {}",
                    endpoint,
                    chunk.len(),
                    e
                );
                return None;
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                error!("Failed to read response from {}: {}", endpoint, e);
                return None;
            }
        };

        if !status.is_success() {
            error!(
                "Endpoint {} rejected {} records with {}: {}",
                endpoint,
                chunk.len(),
                status,
                body
            );
            return None;
        }

        match serde_json::from_str::<EndpointResponse>(&body) {
            Ok(decoded) => {
                debug!(
                    "Endpoint {} answered result={} data={} message={:?}",
                    endpoint, decoded.result, decoded.data, decoded.message
                );
                Some(decoded)
            }
            Err(e) => {
                error!("Undecodable response from {}: {} (body {:?})", endpoint, e, body);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, Bytes, FixedBytes, U256};
    use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
    use serde_json::{Value, json};
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use crate::models::datasets::transfers::{
        InternalIndex, LOG_INDEX_NONE, TokenType, TransferStatus,
    };

    #[derive(Clone, Default)]
    struct Received {
        requests: Arc<AtomicUsize>,
        records: Arc<AtomicUsize>,
    }

    async fn accept(
        State(received): State<Received>,
        Json(body): Json<Vec<Value>>,
    ) -> Json<Value> {
        received.requests.fetch_add(1, Ordering::SeqCst);
        received.records.fetch_add(body.len(), Ordering::SeqCst);
        Json(json!({"result": 1, "message": "ok", "data": body.len()}))
    }

    async fn reject() -> (StatusCode, &'static str) {
        (StatusCode::INTERNAL_SERVER_ERROR, "boom")
    }

    fn accepting(received: &Received) -> Router {
        Router::new()
            .route("/transfers", post(accept))
            .with_state(received.clone())
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/transfers", address)
    }

    fn records(count: usize) -> Vec<TransferRecord> {
        (0..count)
            .map(|i| TransferRecord {
                timestamp: 0,
                block_number: 1,
                block_hash: None,
                transaction_hash: FixedBytes::repeat_byte(0x01),
                transaction_index: i as u64,
                log_index: LOG_INDEX_NONE,
                internal_index: InternalIndex::root(),
                from: Address::ZERO,
                to: None,
                value: U256::from(i),
                token_value: U256::ZERO,
                token_type: TokenType::Native,
                contract_address: None,
                gas: U256::ZERO,
                gas_price: U256::ZERO,
                used_gas: U256::ZERO,
                op_code: String::new(),
                status: TransferStatus::Pending,
                err: String::new(),
                nonce: 0,
                input: Bytes::new(),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_fanout_reaches_every_endpoint_in_chunks() {
        let first = Received::default();
        let second = Received::default();
        let endpoints = vec![
            serve(accepting(&first)).await,
            serve(accepting(&second)).await,
        ];
        let fanout = HttpFanout::new(endpoints, 2).unwrap();

        assert_eq!(fanout.post(&records(5)).await, 5);

        for received in [&first, &second] {
            assert_eq!(received.requests.load(Ordering::SeqCst), 3);
            assert_eq!(received.records.load(Ordering::SeqCst), 5);
        }
    }

    #[tokio::test]
    async fn test_failing_endpoint_does_not_block_others() {
        let healthy = Received::default();
        let endpoints = vec![
            serve(Router::new().route("/transfers", post(reject))).await,
            "http://127.0.0.1:1/transfers".to_string(),
            serve(accepting(&healthy)).await,
        ];
        let fanout = HttpFanout::new(endpoints, 10).unwrap();

        assert_eq!(fanout.post(&records(3)).await, 3);
        assert_eq!(healthy.records.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_response_decoding() {
        let endpoint = serve(accepting(&Received::default())).await;
        let fanout = HttpFanout::new(vec![endpoint.clone()], 10).unwrap();

        let response = fanout.post_chunk(&endpoint, &records(4)).await.unwrap();
        assert_eq!(response.result, 1);
        assert_eq!(response.data, 4);
        assert_eq!(response.message, "ok");
    }
}
