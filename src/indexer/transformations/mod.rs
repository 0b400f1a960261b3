pub mod blocks;
pub mod logs;
pub mod traces;
pub mod transactions;

use alloy_primitives::FixedBytes;

use crate::indexer::transformations::{
    logs::LogTransformer, traces::TraceTransformer, transactions::TransactionTransformer,
};
use crate::models::datasets::blocks::BlockContext;
use crate::models::datasets::traces::TraceOutcome;
use crate::models::datasets::transactions::{RpcReceiptData, RpcTransactionData};
use crate::models::datasets::transfers::TransferRecord;

/// Where a transaction was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inclusion {
    Mined { block: BlockContext, index: u64 },
    // Unix seconds at which the pending hash was seen
    Pending { seen_at: u64 },
}

impl Inclusion {
    pub fn timestamp(&self) -> u64 {
        match self {
            Inclusion::Mined { block, .. } => block.timestamp,
            Inclusion::Pending { seen_at } => *seen_at,
        }
    }

    pub fn block_number(&self) -> u64 {
        match self {
            Inclusion::Mined { block, .. } => block.number,
            Inclusion::Pending { .. } => 0,
        }
    }

    pub fn block_hash(&self) -> Option<FixedBytes<32>> {
        match self {
            Inclusion::Mined { block, .. } => Some(block.hash),
            Inclusion::Pending { .. } => None,
        }
    }

    pub fn transaction_index(&self) -> u64 {
        match self {
            Inclusion::Mined { index, .. } => *index,
            Inclusion::Pending { .. } => 0,
        }
    }
}

/// Flatten one transaction into transfer records.
///
/// Order: Transfer-log records (receipt order, then log order), the top-level record,
/// then internal calls depth-first. A timed-out trace yields only the top-level record.
/// Never fails; missing or malformed inputs shrink the output instead.
pub fn flatten_transaction(
    inclusion: Inclusion,
    tx: &RpcTransactionData,
    receipts: &[RpcReceiptData],
    trace: &TraceOutcome,
) -> Vec<TransferRecord> {
    let top_level = tx.top_level_record(inclusion, receipts, trace);

    if matches!(trace, TraceOutcome::TimedOut) {
        return vec![top_level];
    }

    let mut records: Vec<TransferRecord> = receipts
        .iter()
        .flat_map(|receipt| {
            receipt
                .logs
                .iter()
                .filter_map(move |log| log.transfer_record(tx, receipt, inclusion))
        })
        .collect();

    let calls = match trace {
        TraceOutcome::Tree(tree) => tree.transform_calls(&top_level),
        _ => Vec::new(),
    };

    records.push(top_level);
    records.extend(calls);
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, Bytes, U256, address};
    use std::collections::HashSet;

    use crate::indexer::transformations::logs::TRANSFER_EVENT_SIGNATURE;
    use crate::indexer::transformations::transactions::TRACE_TIMEOUT_ERR;
    use crate::models::datasets::logs::RpcLogData;
    use crate::models::datasets::traces::{CallFrame, CallTreeBuilder};
    use crate::models::datasets::transfers::{InternalIndex, TransferStatus};

    fn block() -> BlockContext {
        BlockContext {
            number: 100,
            hash: FixedBytes::repeat_byte(0x10),
            timestamp: 1_600_000_000,
        }
    }

    fn tx(value: u64) -> RpcTransactionData {
        RpcTransactionData {
            hash: FixedBytes::repeat_byte(0xab),
            from: address!("0x1111111111111111111111111111111111111111"),
            to: Some(address!("0x2222222222222222222222222222222222222222")),
            value: U256::from(value),
            gas: 100_000,
            gas_price: 2,
            nonce: 4,
            input: Bytes::new(),
            index: Some(0),
        }
    }

    fn call(value: u64) -> CallFrame {
        CallFrame {
            op_code: "CALL".to_string(),
            from: address!("0x2222222222222222222222222222222222222222"),
            to: Some(address!("0x3333333333333333333333333333333333333333")),
            value: U256::from(value),
            gas: U256::from(50_000u64),
            gas_used: U256::from(21_000u64),
            input: Bytes::new(),
            error: None,
            children: Vec::new(),
        }
    }

    fn receipt(status: bool, logs: Vec<RpcLogData>) -> RpcReceiptData {
        RpcReceiptData {
            status,
            gas_used: 60_000,
            cumulative_gas_used: 60_000,
            contract_address: None,
            logs,
        }
    }

    fn transfer_log(index: u64) -> RpcLogData {
        RpcLogData {
            address: address!("0x4444444444444444444444444444444444444444"),
            topics: vec![
                TRANSFER_EVENT_SIGNATURE,
                Address::repeat_byte(0x05).into_word(),
                Address::repeat_byte(0x06).into_word(),
            ],
            data: Bytes::from(U256::from(11u64).to_be_bytes::<32>().to_vec()),
            block_hash: Some(block().hash),
            block_number: Some(block().number),
            transaction_hash: Some(FixedBytes::repeat_byte(0xab)),
            transaction_index: Some(0),
            log_index: Some(index),
            removed: false,
        }
    }

    fn value_tree() -> TraceOutcome {
        let mut builder = CallTreeBuilder::default();
        let root = builder.push(None, call(5));
        builder.push(Some(root), call(0));
        builder.push(Some(root), call(3));
        TraceOutcome::Tree(builder.build())
    }

    fn mined() -> Inclusion {
        Inclusion::Mined {
            block: block(),
            index: 0,
        }
    }

    #[test]
    fn test_failed_receipt_scenario() {
        let records = flatten_transaction(
            mined(),
            &tx(5),
            &[receipt(false, Vec::new())],
            &value_tree(),
        );

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].internal_index, InternalIndex::root());
        assert_eq!(records[0].status, TransferStatus::Failed);
        assert_eq!(records[0].value, U256::from(5u64));
        assert_eq!(records[1].internal_index.as_str(), "0_1");
        assert_eq!(records[1].value, U256::from(3u64));
        assert_eq!(records[1].status, TransferStatus::Failed);
    }

    #[test]
    fn test_output_order() {
        let records = flatten_transaction(
            mined(),
            &tx(5),
            &[receipt(true, vec![transfer_log(0), transfer_log(1)])],
            &value_tree(),
        );

        let shape: Vec<_> = records
            .iter()
            .map(|r| (r.log_index, r.internal_index.as_str().to_string()))
            .collect();
        assert_eq!(
            shape,
            vec![
                (0, "0".to_string()),
                (1, "0".to_string()),
                (-1, "0".to_string()),
                (-1, "0_1".to_string()),
            ]
        );
    }

    #[test]
    fn test_timed_out_trace_keeps_only_top_level() {
        let records = flatten_transaction(
            mined(),
            &tx(5),
            &[receipt(true, vec![transfer_log(0)])],
            &TraceOutcome::TimedOut,
        );

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, TransferStatus::Timeout);
        assert_eq!(records[0].err, TRACE_TIMEOUT_ERR);
    }

    #[test]
    fn test_unavailable_trace_keeps_receipt_records() {
        let records = flatten_transaction(
            mined(),
            &tx(5),
            &[receipt(true, vec![transfer_log(0)])],
            &TraceOutcome::Unavailable,
        );

        assert_eq!(records.len(), 2);
        assert_eq!(records[1].op_code, "");
    }

    #[test]
    fn test_flattening_is_idempotent() {
        let receipts = [receipt(true, vec![transfer_log(0)])];
        let first = flatten_transaction(mined(), &tx(5), &receipts, &value_tree());
        let second = flatten_transaction(mined(), &tx(5), &receipts, &value_tree());

        assert_eq!(first, second);

        let keys: HashSet<_> = first
            .iter()
            .map(|r| (r.log_index, r.internal_index.clone()))
            .collect();
        assert_eq!(keys.len(), first.len());
    }

    #[test]
    fn test_pending_transaction() {
        let records = flatten_transaction(
            Inclusion::Pending { seen_at: 99 },
            &tx(1),
            &[],
            &TraceOutcome::NotRequested,
        );

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, TransferStatus::Pending);
        assert_eq!(records[0].timestamp, 99);
    }
}
