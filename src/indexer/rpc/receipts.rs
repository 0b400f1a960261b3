use alloy_network::ReceiptResponse;
use alloy_rpc_types_eth::{Log, TransactionReceipt};

use crate::models::datasets::logs::RpcLogData;
use crate::models::datasets::transactions::RpcReceiptData;

pub trait ReceiptParser {
    fn parse_receipt(&self) -> RpcReceiptData;
}

pub trait LogParser {
    fn parse_log(&self) -> RpcLogData;
}

impl ReceiptParser for TransactionReceipt {
    fn parse_receipt(&self) -> RpcReceiptData {
        RpcReceiptData {
            // Pre-Byzantium receipts carry a state root instead of a status; treat as success
            status: self.status(),
            gas_used: self.gas_used(),
            cumulative_gas_used: self.cumulative_gas_used(),
            contract_address: ReceiptResponse::contract_address(self),
            logs: self.inner.logs().iter().map(LogParser::parse_log).collect(),
        }
    }
}

impl LogParser for Log {
    fn parse_log(&self) -> RpcLogData {
        RpcLogData {
            address: self.address(),
            topics: self.topics().to_vec(),
            data: self.data().data.clone(),
            block_hash: self.block_hash,
            block_number: self.block_number,
            transaction_hash: self.transaction_hash,
            transaction_index: self.transaction_index,
            log_index: self.log_index,
            removed: self.removed,
        }
    }
}
