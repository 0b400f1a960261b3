use alloy_primitives::FixedBytes;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::indexer::rpc::{ChainNode, TraceOptions};
use crate::indexer::transformations::{
    Inclusion, blocks::GenesisTransformer, flatten_transaction, logs::LogTransformer,
};
use crate::metrics::Metrics;
use crate::models::datasets::blocks::BlockContext;
use crate::models::datasets::logs::RpcLogData;
use crate::models::datasets::traces::TraceOutcome;
use crate::models::datasets::transactions::{RpcReceiptData, RpcTransactionData};
use crate::models::datasets::transfers::TransferRecord;
use crate::models::errors::{ChainError, TraceError};
use crate::utils::unix_now;

// Client-side allowance on top of the node's own trace timeout
const TRACE_GRACE: Duration = Duration::from_secs(2);

/// Turns node data into transfer records. Holds no per-block state, so one instance is
/// shared by every worker.
pub struct BlockProcessor {
    node: Arc<dyn ChainNode>,
    trace_options: TraceOptions,
    metrics: Option<Arc<Metrics>>,
}

impl BlockProcessor {
    pub fn new(
        node: Arc<dyn ChainNode>,
        trace_options: TraceOptions,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        Self {
            node,
            trace_options,
            metrics,
        }
    }

    /// All records of one block. Only a failed block or state-dump fetch is an error;
    /// per-transaction failures degrade that transaction's records.
    pub async fn process_block(&self, block_number: u64) -> Result<ProcessedBlock, ChainError> {
        let block = self.node.block_by_number(block_number).await?;
        let context = block.context();

        let mut records = Vec::new();
        if block.number == 0 {
            let accounts = self.node.dump_state(&block).await?;
            records.extend(accounts.transform_genesis(&context));
        }

        let per_transaction = join_all(
            block
                .transactions
                .iter()
                .enumerate()
                .map(|(position, tx)| self.process_transaction(context, position, tx)),
        )
        .await;
        records.extend(per_transaction.into_iter().flatten());

        debug!(
            "Block {} flattened into {} records from {} transactions",
            block_number,
            records.len(),
            block.transactions.len()
        );

        Ok(ProcessedBlock {
            block_number,
            records,
        })
    }

    async fn process_transaction(
        &self,
        block: BlockContext,
        position: usize,
        tx: &RpcTransactionData,
    ) -> Vec<TransferRecord> {
        let index = tx.index.unwrap_or(position as u64);
        let (receipts, trace) =
            tokio::join!(self.fetch_receipts(tx.hash), self.fetch_trace(tx.hash));

        flatten_transaction(Inclusion::Mined { block, index }, tx, &receipts, &trace)
    }

    async fn fetch_receipts(&self, tx_hash: FixedBytes<32>) -> Vec<RpcReceiptData> {
        match self.node.receipts(tx_hash).await {
            Ok(receipts) => receipts,
            Err(e) => {
                warn!("Failed to get receipts for {}: {}", tx_hash, e);
                Vec::new()
            }
        }
    }

    async fn fetch_trace(&self, tx_hash: FixedBytes<32>) -> TraceOutcome {
        let guard = self.trace_options.timeout + TRACE_GRACE;
        let result = tokio::time::timeout(
            guard,
            self.node.trace_transaction(tx_hash, &self.trace_options),
        )
        .await;

        match result {
            Ok(Ok(tree)) if tree.is_empty() => {
                warn!("Trace of {} has no frames", tx_hash);
                TraceOutcome::Unavailable
            }
            Ok(Ok(tree)) => {
                debug!("Trace of {} has {} frames", tx_hash, tree.len());
                TraceOutcome::Tree(tree)
            }
            Ok(Err(TraceError::Timeout)) | Err(_) => {
                warn!("Trace of {} timed out", tx_hash);
                if let Some(metrics) = &self.metrics {
                    metrics.record_trace_timeout();
                }
                TraceOutcome::TimedOut
            }
            Ok(Err(e)) => {
                warn!("Trace of {} unavailable: {}", tx_hash, e);
                TraceOutcome::Unavailable
            }
        }
    }

    /// Records of a transaction seen in the mempool; empty when the node no longer knows it.
    pub async fn process_pending(
        &self,
        tx_hash: FixedBytes<32>,
    ) -> Result<Vec<TransferRecord>, ChainError> {
        let Some(tx) = self.node.transaction_by_hash(tx_hash).await? else {
            debug!("Pending transaction {} disappeared before lookup", tx_hash);
            return Ok(Vec::new());
        };

        Ok(flatten_transaction(
            Inclusion::Pending {
                seen_at: unix_now(),
            },
            &tx,
            &[],
            &TraceOutcome::NotRequested,
        ))
    }

    pub async fn process_removed_log(&self, log: &RpcLogData) -> Option<TransferRecord> {
        let timestamp = match log.block_hash {
            Some(hash) => match self.node.block_by_hash(hash).await {
                Ok(block) => block.map(|b| b.timestamp).unwrap_or_default(),
                Err(e) => {
                    warn!("Failed to look up block {} of removed log: {}", hash, e);
                    0
                }
            },
            None => 0,
        };

        log.removed_transfer_record(timestamp)
    }
}

pub struct ProcessedBlock {
    pub block_number: u64,
    pub records: Vec<TransferRecord>,
}
