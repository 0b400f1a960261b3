use alloy_consensus::Transaction as ConsensusTransaction;
use alloy_network::TransactionResponse;
use alloy_rpc_types_eth::{Block, Header, Transaction};

use crate::models::datasets::blocks::{HeadEvent, RpcBlockData};
use crate::models::datasets::transactions::RpcTransactionData;

pub trait BlockParser {
    fn parse_block(&self) -> RpcBlockData;
}

pub trait HeaderParser {
    fn parse_head(&self) -> HeadEvent;
}

pub trait TransactionParser {
    fn parse_transaction(&self) -> RpcTransactionData;
}

impl BlockParser for Block {
    fn parse_block(&self) -> RpcBlockData {
        RpcBlockData {
            number: self.header.number,
            hash: self.header.hash,
            timestamp: self.header.timestamp,
            // Hash-only blocks carry no bodies; callers request full transactions
            transactions: self
                .transactions
                .txns()
                .map(TransactionParser::parse_transaction)
                .collect(),
        }
    }
}

impl HeaderParser for Header {
    fn parse_head(&self) -> HeadEvent {
        HeadEvent {
            number: self.number,
            hash: self.hash,
        }
    }
}

impl TransactionParser for Transaction {
    fn parse_transaction(&self) -> RpcTransactionData {
        // Mined transactions report what was actually paid, pending ones only the bid
        let gas_price = self
            .effective_gas_price
            .or(ConsensusTransaction::gas_price(self))
            .unwrap_or(ConsensusTransaction::max_fee_per_gas(self));

        RpcTransactionData {
            hash: TransactionResponse::tx_hash(self),
            from: TransactionResponse::from(self),
            to: ConsensusTransaction::to(self),
            value: ConsensusTransaction::value(self),
            gas: ConsensusTransaction::gas_limit(self),
            gas_price,
            nonce: ConsensusTransaction::nonce(self),
            input: ConsensusTransaction::input(self).clone(),
            index: self.transaction_index,
        }
    }
}
