use alloy_primitives::{Address, FixedBytes, U256, b256};

use crate::indexer::transformations::Inclusion;
use crate::indexer::transformations::transactions::REVERTED_ERR;
use crate::models::datasets::logs::RpcLogData;
use crate::models::datasets::transactions::{RpcReceiptData, RpcTransactionData};
use crate::models::datasets::transfers::{
    InternalIndex, LOG_INDEX_NONE, TokenType, TransferRecord, TransferStatus,
};

/// keccak256("Transfer(address,address,uint256)")
pub const TRANSFER_EVENT_SIGNATURE: FixedBytes<32> =
    b256!("0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef");

pub const REMOVED_LOG_ERR: &str = "log removed by chain reorganization";

pub trait LogTransformer {
    /// ERC-20 Transfer event of a mined transaction, `None` for any other log.
    fn transfer_record(
        &self,
        tx: &RpcTransactionData,
        receipt: &RpcReceiptData,
        inclusion: Inclusion,
    ) -> Option<TransferRecord>;

    /// Transfer event that the node reported as removed by a reorganization.
    fn removed_transfer_record(&self, timestamp: u64) -> Option<TransferRecord>;
}

impl RpcLogData {
    // Indexed `from`/`to` make it exactly three topics; anything else shares the
    // signature but not the layout
    pub fn is_token_transfer(&self) -> bool {
        self.topics.len() == 3 && self.topics[0] == TRANSFER_EVENT_SIGNATURE
    }

    fn token_amount(&self) -> U256 {
        let end = self.data.len().min(32);
        U256::try_from_be_slice(&self.data[..end]).unwrap_or_default()
    }
}

impl LogTransformer for RpcLogData {
    fn transfer_record(
        &self,
        tx: &RpcTransactionData,
        receipt: &RpcReceiptData,
        inclusion: Inclusion,
    ) -> Option<TransferRecord> {
        if !self.is_token_transfer() {
            return None;
        }

        let (status, err) = if receipt.status {
            (TransferStatus::Success, String::new())
        } else {
            (TransferStatus::Failed, REVERTED_ERR.to_string())
        };

        Some(TransferRecord {
            timestamp: inclusion.timestamp(),
            block_number: self.block_number.unwrap_or(inclusion.block_number()),
            block_hash: self.block_hash.or(inclusion.block_hash()),
            transaction_hash: tx.hash,
            transaction_index: self
                .transaction_index
                .unwrap_or(inclusion.transaction_index()),
            log_index: self.log_index.map_or(LOG_INDEX_NONE, |i| i as i64),
            internal_index: InternalIndex::root(),
            from: Address::from_word(self.topics[1]),
            to: Some(Address::from_word(self.topics[2])),
            value: U256::ZERO,
            token_value: self.token_amount(),
            token_type: TokenType::Token,
            contract_address: Some(self.address),
            gas: U256::from(receipt.cumulative_gas_used),
            gas_price: U256::from(tx.gas_price),
            used_gas: U256::from(receipt.gas_used),
            op_code: String::new(),
            status,
            err,
            nonce: tx.nonce,
            input: tx.input.clone(),
        })
    }

    fn removed_transfer_record(&self, timestamp: u64) -> Option<TransferRecord> {
        if !self.is_token_transfer() {
            return None;
        }

        Some(TransferRecord {
            timestamp,
            block_number: self.block_number.unwrap_or_default(),
            block_hash: self.block_hash,
            transaction_hash: self.transaction_hash.unwrap_or_default(),
            transaction_index: self.transaction_index.unwrap_or_default(),
            log_index: self.log_index.map_or(LOG_INDEX_NONE, |i| i as i64),
            internal_index: InternalIndex::root(),
            from: Address::from_word(self.topics[1]),
            to: Some(Address::from_word(self.topics[2])),
            value: U256::ZERO,
            token_value: self.token_amount(),
            token_type: TokenType::Token,
            contract_address: Some(self.address),
            gas: U256::ZERO,
            gas_price: U256::ZERO,
            used_gas: U256::ZERO,
            op_code: String::new(),
            status: TransferStatus::Failed,
            err: REMOVED_LOG_ERR.to_string(),
            nonce: 0,
            input: Default::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Bytes, address};

    use crate::models::datasets::blocks::BlockContext;

    fn transfer_log(from: Address, to: Address, amount: U256) -> RpcLogData {
        RpcLogData {
            address: address!("0x9999999999999999999999999999999999999999"),
            topics: vec![
                TRANSFER_EVENT_SIGNATURE,
                from.into_word(),
                to.into_word(),
            ],
            data: Bytes::from(amount.to_be_bytes::<32>().to_vec()),
            block_hash: Some(FixedBytes::repeat_byte(0x01)),
            block_number: Some(10),
            transaction_hash: Some(FixedBytes::repeat_byte(0xaa)),
            transaction_index: Some(2),
            log_index: Some(5),
            removed: false,
        }
    }

    fn tx() -> RpcTransactionData {
        RpcTransactionData {
            hash: FixedBytes::repeat_byte(0xaa),
            from: Address::ZERO,
            to: Some(address!("0x9999999999999999999999999999999999999999")),
            value: U256::ZERO,
            gas: 60_000,
            gas_price: 3,
            nonce: 1,
            input: Bytes::new(),
            index: Some(2),
        }
    }

    fn receipt() -> RpcReceiptData {
        RpcReceiptData {
            status: true,
            gas_used: 40_000,
            cumulative_gas_used: 90_000,
            contract_address: None,
            logs: Vec::new(),
        }
    }

    fn inclusion() -> Inclusion {
        Inclusion::Mined {
            block: BlockContext {
                number: 10,
                hash: FixedBytes::repeat_byte(0x01),
                timestamp: 1_000,
            },
            index: 2,
        }
    }

    #[test]
    fn test_transfer_log_record() {
        let from = address!("0x1111111111111111111111111111111111111111");
        let to = address!("0x2222222222222222222222222222222222222222");
        let log = transfer_log(from, to, U256::from(500u64));

        let record = log
            .transfer_record(&tx(), &receipt(), inclusion())
            .expect("transfer log");

        assert_eq!(record.from, from);
        assert_eq!(record.to, Some(to));
        assert_eq!(record.token_value, U256::from(500u64));
        assert_eq!(record.log_index, 5);
        assert_eq!(record.gas, U256::from(90_000u64));
        assert_eq!(record.used_gas, U256::from(40_000u64));
        assert_eq!(record.contract_address, Some(log.address));
        assert_eq!(record.status, TransferStatus::Success);
    }

    #[test]
    fn test_non_transfer_logs_are_skipped() {
        let mut approval = transfer_log(Address::ZERO, Address::ZERO, U256::from(1u64));
        approval.topics[0] = FixedBytes::repeat_byte(0x8c);
        assert!(approval.transfer_record(&tx(), &receipt(), inclusion()).is_none());

        // ERC-721 Transfer carries the token id as a fourth topic
        let mut nft = transfer_log(Address::ZERO, Address::ZERO, U256::ZERO);
        nft.topics.push(FixedBytes::repeat_byte(0x07));
        assert!(nft.transfer_record(&tx(), &receipt(), inclusion()).is_none());
    }

    #[test]
    fn test_removed_log_record() {
        let mut log = transfer_log(
            address!("0x1111111111111111111111111111111111111111"),
            address!("0x2222222222222222222222222222222222222222"),
            U256::from(9u64),
        );
        log.removed = true;

        let record = log.removed_transfer_record(77).expect("transfer log");

        assert_eq!(record.status, TransferStatus::Failed);
        assert_eq!(record.err, REMOVED_LOG_ERR);
        assert_eq!(record.timestamp, 77);
        assert_eq!(record.block_number, 10);
        assert_eq!(record.token_value, U256::from(9u64));
    }

    #[test]
    fn test_reverted_receipt_and_missing_log_index() {
        let mut log = transfer_log(Address::ZERO, Address::ZERO, U256::from(3u64));
        log.log_index = None;
        let failed = RpcReceiptData {
            status: false,
            ..receipt()
        };

        let record = log
            .transfer_record(&tx(), &failed, inclusion())
            .expect("transfer log");
        assert_eq!(record.status, TransferStatus::Failed);
        assert_eq!(record.err, REVERTED_ERR);
        assert_eq!(record.log_index, LOG_INDEX_NONE);

        let removed = log.removed_transfer_record(1).expect("transfer log");
        assert_eq!(removed.log_index, LOG_INDEX_NONE);
    }
}
