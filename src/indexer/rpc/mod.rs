pub mod blocks;
pub mod receipts;
pub mod traces;

use alloy_eips::BlockNumberOrTag;
use alloy_primitives::{Address, FixedBytes};
use alloy_provider::{DynProvider, Provider, ProviderBuilder, WsConnect};
use alloy_rpc_types_eth::Filter;
use alloy_transport::TransportResult;
use async_trait::async_trait;
use futures::{Stream, StreamExt, future};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::indexer::rpc::{
    blocks::{BlockParser, HeaderParser, TransactionParser},
    receipts::{LogParser, ReceiptParser},
    traces::{TraceParser, classify_trace_error},
};
use crate::indexer::transformations::logs::TRANSFER_EVENT_SIGNATURE;
use crate::metrics::Metrics;
use crate::models::datasets::blocks::{GenesisAccount, HeadEvent, RpcBlockData, RpcStateDump};
use crate::models::datasets::logs::RpcLogData;
use crate::models::datasets::traces::CallTree;
use crate::models::datasets::transactions::{RpcReceiptData, RpcTransactionData};
use crate::models::errors::{ChainError, TraceError};
use crate::utils::retry::{RetryConfig, retry};

/// Live feed of node events. An `Err` item or the end of the stream means the feed is gone.
pub type FeedStream<T> = Pin<Box<dyn Stream<Item = Result<T, ChainError>> + Send>>;

#[derive(Debug, Clone, Copy)]
pub struct TraceOptions {
    pub timeout: Duration,
    pub reexec: u64,
}

/// Everything the indexer needs from a node.
#[async_trait]
pub trait ChainNode: Send + Sync {
    async fn current_block_number(&self) -> Result<u64, ChainError>;

    async fn block_by_number(&self, number: u64) -> Result<RpcBlockData, ChainError>;

    async fn block_by_hash(
        &self,
        hash: FixedBytes<32>,
    ) -> Result<Option<RpcBlockData>, ChainError>;

    /// Receipts of a transaction; empty while it is not mined.
    async fn receipts(&self, tx_hash: FixedBytes<32>) -> Result<Vec<RpcReceiptData>, ChainError>;

    async fn trace_transaction(
        &self,
        tx_hash: FixedBytes<32>,
        options: &TraceOptions,
    ) -> Result<CallTree, TraceError>;

    async fn dump_state(
        &self,
        block: &RpcBlockData,
    ) -> Result<BTreeMap<Address, GenesisAccount>, ChainError>;

    async fn transaction_by_hash(
        &self,
        tx_hash: FixedBytes<32>,
    ) -> Result<Option<RpcTransactionData>, ChainError>;

    async fn subscribe_heads(&self) -> Result<FeedStream<HeadEvent>, ChainError>;

    async fn subscribe_pending_transactions(
        &self,
    ) -> Result<FeedStream<FixedBytes<32>>, ChainError>;

    /// Transfer logs dropped by reorganizations.
    async fn subscribe_removed_logs(&self) -> Result<FeedStream<RpcLogData>, ChainError>;
}

/// `ChainNode` over a WebSocket JSON-RPC connection.
pub struct AlloyNode {
    provider: DynProvider,
    retry_config: RetryConfig,
    metrics: Option<Arc<Metrics>>,
}

impl AlloyNode {
    pub async fn connect(
        rpc_url: &str,
        retry_config: RetryConfig,
        metrics: Option<Arc<Metrics>>,
    ) -> Result<Self, ChainError> {
        let provider = ProviderBuilder::new()
            .connect_ws(WsConnect::new(rpc_url))
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?
            .erased();
        info!("Connected to node at {}", rpc_url);

        Ok(Self {
            provider,
            retry_config,
            metrics,
        })
    }

    fn observe<T>(&self, method: &'static str, start: Instant, result: &TransportResult<T>) {
        if let Some(metrics) = &self.metrics {
            metrics.record_rpc(method, start.elapsed(), result.is_ok());
        }
    }

    // Plain reads are idempotent, so they go through the retry helper
    async fn read<T, F, Fut>(&self, method: &'static str, operation: F) -> Result<T, ChainError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = TransportResult<T>>,
    {
        retry(
            || async {
                let start = Instant::now();
                let result = operation().await;
                self.observe(method, start, &result);
                result.map_err(|e| {
                    warn!("{} failed. Error details:\n{:#?}", method, e);
                    ChainError::Rpc(e.to_string())
                })
            },
            &self.retry_config,
            method,
        )
        .await
    }
}

#[async_trait]
impl ChainNode for AlloyNode {
    async fn current_block_number(&self) -> Result<u64, ChainError> {
        self.read("eth_blockNumber", || self.provider.get_block_number())
            .await
    }

    async fn block_by_number(&self, number: u64) -> Result<RpcBlockData, ChainError> {
        let block = self
            .read("eth_getBlockByNumber", || async {
                self.provider
                    .get_block_by_number(BlockNumberOrTag::Number(number))
                    .full()
                    .await
            })
            .await?;

        block
            .map(|block| block.parse_block())
            .ok_or(ChainError::BlockNotFound(number))
    }

    async fn block_by_hash(
        &self,
        hash: FixedBytes<32>,
    ) -> Result<Option<RpcBlockData>, ChainError> {
        let block = self
            .read("eth_getBlockByHash", || async {
                self.provider.get_block_by_hash(hash).full().await
            })
            .await?;

        Ok(block.map(|block| block.parse_block()))
    }

    async fn receipts(&self, tx_hash: FixedBytes<32>) -> Result<Vec<RpcReceiptData>, ChainError> {
        let receipt = self
            .read("eth_getTransactionReceipt", || {
                self.provider.get_transaction_receipt(tx_hash)
            })
            .await?;

        Ok(receipt
            .map(|receipt| receipt.parse_receipt())
            .into_iter()
            .collect())
    }

    async fn trace_transaction(
        &self,
        tx_hash: FixedBytes<32>,
        options: &TraceOptions,
    ) -> Result<CallTree, TraceError> {
        let tracer_config = json!({
            "tracer": "callTracer",
            "timeout": format!("{}s", options.timeout.as_secs()),
            "reexec": options.reexec,
        });

        let start = Instant::now();
        let result = self
            .provider
            .raw_request::<_, Value>("debug_traceTransaction".into(), (tx_hash, tracer_config))
            .await;
        self.observe("debug_traceTransaction", start, &result);

        match result {
            Ok(payload) => payload.parse_call_tree(),
            Err(e) => {
                let error = classify_trace_error(&e.to_string());
                debug!("Trace of {} failed: {}", tx_hash, error);
                Err(error)
            }
        }
    }

    async fn dump_state(
        &self,
        block: &RpcBlockData,
    ) -> Result<BTreeMap<Address, GenesisAccount>, ChainError> {
        let block_number = format!("{:#x}", block.number);
        let dump = self
            .read("debug_dumpBlock", || async {
                self.provider
                    .raw_request::<_, Value>("debug_dumpBlock".into(), (block_number.clone(),))
                    .await
            })
            .await?;

        let dump: RpcStateDump =
            serde_json::from_value(dump).map_err(|e| ChainError::InvalidStateDump(e.to_string()))?;
        Ok(dump.accounts)
    }

    async fn transaction_by_hash(
        &self,
        tx_hash: FixedBytes<32>,
    ) -> Result<Option<RpcTransactionData>, ChainError> {
        let transaction = self
            .read("eth_getTransactionByHash", || {
                self.provider.get_transaction_by_hash(tx_hash)
            })
            .await?;

        Ok(transaction.map(|tx| tx.parse_transaction()))
    }

    async fn subscribe_heads(&self) -> Result<FeedStream<HeadEvent>, ChainError> {
        let subscription = self
            .provider
            .subscribe_blocks()
            .await
            .map_err(|e| ChainError::Subscription {
                feed: "newHeads",
                message: e.to_string(),
            })?;

        Ok(Box::pin(
            subscription
                .into_stream()
                .map(|header| Ok(header.parse_head())),
        ))
    }

    async fn subscribe_pending_transactions(
        &self,
    ) -> Result<FeedStream<FixedBytes<32>>, ChainError> {
        let subscription = self
            .provider
            .subscribe_pending_transactions()
            .await
            .map_err(|e| ChainError::Subscription {
                feed: "newPendingTransactions",
                message: e.to_string(),
            })?;

        Ok(Box::pin(subscription.into_stream().map(Ok)))
    }

    async fn subscribe_removed_logs(&self) -> Result<FeedStream<RpcLogData>, ChainError> {
        let filter = Filter::new().event_signature(TRANSFER_EVENT_SIGNATURE);
        let subscription =
            self.provider
                .subscribe_logs(&filter)
                .await
                .map_err(|e| ChainError::Subscription {
                    feed: "logs",
                    message: e.to_string(),
                })?;

        Ok(Box::pin(
            subscription
                .into_stream()
                .filter(|log| future::ready(log.removed))
                .map(|log| Ok(log.parse_log())),
        ))
    }
}
