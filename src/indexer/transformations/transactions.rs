use alloy_primitives::{Address, U256};
use tracing::warn;

use crate::indexer::transformations::Inclusion;
use crate::models::datasets::traces::TraceOutcome;
use crate::models::datasets::transactions::{RpcReceiptData, RpcTransactionData};
use crate::models::datasets::transfers::{
    InternalIndex, LOG_INDEX_NONE, TokenType, TransferRecord, TransferStatus,
};

// transfer(address,uint256)
pub const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

// Selector + one 32-byte word, i.e. 74 hex characters including the 0x prefix
const TOKEN_CALL_MIN_LEN: usize = 36;
const TOKEN_AMOUNT_END: usize = 68;

pub const REVERTED_ERR: &str = "execution reverted";
pub const TRACE_TIMEOUT_ERR: &str = "trace execution timeout";

pub trait TransactionTransformer {
    fn top_level_record(
        &self,
        inclusion: Inclusion,
        receipts: &[RpcReceiptData],
        trace: &TraceOutcome,
    ) -> TransferRecord;
}

impl TransactionTransformer for RpcTransactionData {
    fn top_level_record(
        &self,
        inclusion: Inclusion,
        receipts: &[RpcReceiptData],
        trace: &TraceOutcome,
    ) -> TransferRecord {
        let first_receipt = receipts.first();

        let (status, err) = match (inclusion, trace) {
            (Inclusion::Pending { .. }, _) => (TransferStatus::Pending, ""),
            (_, TraceOutcome::TimedOut) => (TransferStatus::Timeout, TRACE_TIMEOUT_ERR),
            _ if receipts.iter().any(|receipt| !receipt.status) => {
                (TransferStatus::Failed, REVERTED_ERR)
            }
            _ => (TransferStatus::Success, ""),
        };

        let op_code = match trace {
            TraceOutcome::Tree(tree) => tree
                .root()
                .map(|frame| frame.op_code.clone())
                .unwrap_or_default(),
            _ => String::new(),
        };

        // Creations report the new contract through the receipt
        let contract_address = if self.to.is_none() {
            first_receipt.and_then(|receipt| receipt.contract_address)
        } else {
            None
        };

        let mut record = TransferRecord {
            timestamp: inclusion.timestamp(),
            block_number: inclusion.block_number(),
            block_hash: inclusion.block_hash(),
            transaction_hash: self.hash,
            transaction_index: inclusion.transaction_index(),
            log_index: LOG_INDEX_NONE,
            internal_index: InternalIndex::root(),
            from: self.from,
            to: self.to,
            value: self.value,
            token_value: U256::ZERO,
            token_type: TokenType::Native,
            contract_address,
            gas: U256::from(self.gas),
            gas_price: U256::from(self.gas_price),
            used_gas: first_receipt
                .map(|receipt| U256::from(receipt.gas_used))
                .unwrap_or(U256::from(self.gas)),
            op_code,
            status,
            err: err.to_string(),
            nonce: self.nonce,
            input: self.input.clone(),
        };

        if let (Some(token_contract), Some((recipient, amount))) =
            (self.to, decode_token_transfer(&self.input))
        {
            if let Some(receipt_contract) = first_receipt.and_then(|r| r.contract_address) {
                if receipt_contract != token_contract {
                    warn!(
                        "Transaction {} sent to {} but receipt names contract {}",
                        self.hash, token_contract, receipt_contract
                    );
                }
            }
            record.contract_address = Some(token_contract);
            record.to = Some(recipient);
            record.token_value = amount;
            record.token_type = TokenType::Token;
        }

        record
    }
}

/// Decode `transfer(address,uint256)` call data into `(recipient, amount)`.
///
/// Only the selector and the length are checked; a short amount word decodes the bytes
/// that are present.
pub fn decode_token_transfer(input: &[u8]) -> Option<(Address, U256)> {
    if input.len() < TOKEN_CALL_MIN_LEN || input[..4] != TRANSFER_SELECTOR {
        return None;
    }

    let recipient = Address::from_slice(&input[16..TOKEN_CALL_MIN_LEN]);
    let amount_bytes = &input[TOKEN_CALL_MIN_LEN..input.len().min(TOKEN_AMOUNT_END)];
    let amount = U256::try_from_be_slice(amount_bytes).unwrap_or_default();

    Some((recipient, amount))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Bytes, FixedBytes, address};

    use crate::models::datasets::blocks::BlockContext;

    fn mined() -> Inclusion {
        Inclusion::Mined {
            block: BlockContext {
                number: 42,
                hash: FixedBytes::repeat_byte(0x42),
                timestamp: 1_700_000_000,
            },
            index: 3,
        }
    }

    fn transaction(to: Option<Address>, input: Bytes) -> RpcTransactionData {
        RpcTransactionData {
            hash: FixedBytes::repeat_byte(0xaa),
            from: address!("0x1111111111111111111111111111111111111111"),
            to,
            value: U256::from(7u64),
            gas: 21_000,
            gas_price: 1_000_000_000,
            nonce: 9,
            input,
            index: Some(3),
        }
    }

    fn receipt(status: bool, contract_address: Option<Address>) -> RpcReceiptData {
        RpcReceiptData {
            status,
            gas_used: 20_000,
            cumulative_gas_used: 50_000,
            contract_address,
            logs: Vec::new(),
        }
    }

    fn token_call(recipient: Address, amount: U256) -> Bytes {
        let mut data = TRANSFER_SELECTOR.to_vec();
        data.extend_from_slice(&[0u8; 12]);
        data.extend_from_slice(recipient.as_slice());
        data.extend_from_slice(&amount.to_be_bytes::<32>());
        Bytes::from(data)
    }

    #[test]
    fn test_token_transfer_round_trip() {
        let token = address!("0x2222222222222222222222222222222222222222");
        let recipient = address!("0x75186ece18d7051afb9c1aee85170c0deda23d82");
        let amount = U256::from(0x364db9fbe6a7902000u128);
        let tx = transaction(Some(token), token_call(recipient, amount));

        let record =
            tx.top_level_record(mined(), &[receipt(true, None)], &TraceOutcome::Unavailable);

        assert_eq!(record.to, Some(recipient));
        assert_eq!(record.token_value, amount);
        assert_eq!(record.token_type, TokenType::Token);
        assert_eq!(record.contract_address, Some(token));
        assert_eq!(record.value, U256::from(7u64));
    }

    #[test]
    fn test_receipt_contract_mismatch_does_not_override() {
        let token = address!("0x2222222222222222222222222222222222222222");
        let other = address!("0x3333333333333333333333333333333333333333");
        let tx = transaction(Some(token), token_call(other, U256::from(1u64)));

        let record = tx.top_level_record(
            mined(),
            &[receipt(true, Some(other))],
            &TraceOutcome::Unavailable,
        );

        assert_eq!(record.contract_address, Some(token));
    }

    #[test]
    fn test_short_call_data_is_not_a_token_transfer() {
        let mut data = TRANSFER_SELECTOR.to_vec();
        data.extend_from_slice(&[0u8; 20]);
        assert_eq!(decode_token_transfer(&data), None);
        assert_eq!(decode_token_transfer(&[0xde, 0xad, 0xbe, 0xef]), None);
    }

    #[test]
    fn test_top_level_fields() {
        let to = address!("0x4444444444444444444444444444444444444444");
        let tx = transaction(Some(to), Bytes::new());

        let record =
            tx.top_level_record(mined(), &[receipt(true, None)], &TraceOutcome::Unavailable);

        assert_eq!(record.block_number, 42);
        assert_eq!(record.transaction_index, 3);
        assert_eq!(record.internal_index, InternalIndex::root());
        assert_eq!(record.log_index, LOG_INDEX_NONE);
        assert_eq!(record.status, TransferStatus::Success);
        assert!(record.err.is_empty());
        assert_eq!(record.used_gas, U256::from(20_000u64));
        assert_eq!(record.gas, U256::from(21_000u64));
        assert_eq!(record.token_type, TokenType::Native);
        assert_eq!(record.contract_address, None);
    }

    #[test]
    fn test_status_selection() {
        let tx = transaction(None, Bytes::new());
        let created = address!("0x5555555555555555555555555555555555555555");

        let failed = tx.top_level_record(
            mined(),
            &[receipt(false, Some(created))],
            &TraceOutcome::Unavailable,
        );
        assert_eq!(failed.status, TransferStatus::Failed);
        assert_eq!(failed.err, REVERTED_ERR);
        assert_eq!(failed.contract_address, Some(created));

        let timed_out =
            tx.top_level_record(mined(), &[receipt(true, None)], &TraceOutcome::TimedOut);
        assert_eq!(timed_out.status, TransferStatus::Timeout);

        let pending = tx.top_level_record(
            Inclusion::Pending { seen_at: 5 },
            &[],
            &TraceOutcome::NotRequested,
        );
        assert_eq!(pending.status, TransferStatus::Pending);
        assert_eq!(pending.block_hash, None);
        assert_eq!(pending.block_number, 0);
        assert_eq!(pending.timestamp, 5);
        assert_eq!(pending.used_gas, U256::from(21_000u64));
    }
}
