use alloy_primitives::{Address, FixedBytes, U256};
use std::collections::BTreeMap;
use tracing::error;

use crate::models::datasets::blocks::{BlockContext, GenesisAccount};
use crate::models::datasets::transfers::{
    InternalIndex, LOG_INDEX_NONE, TokenType, TransferRecord, TransferStatus,
};

pub trait GenesisTransformer {
    fn transform_genesis(&self, block: &BlockContext) -> Vec<TransferRecord>;
}

impl GenesisTransformer for BTreeMap<Address, GenesisAccount> {
    fn transform_genesis(&self, block: &BlockContext) -> Vec<TransferRecord> {
        self.iter()
            .enumerate()
            .map(|(position, (address, account))| {
                let value = account.balance.parse::<U256>().unwrap_or_else(|e| {
                    error!(
                        "Unparseable genesis balance {:?} for {}: {}",
                        account.balance, address, e
                    );
                    U256::ZERO
                });

                TransferRecord {
                    timestamp: block.timestamp,
                    block_number: block.number,
                    block_hash: Some(block.hash),
                    transaction_hash: FixedBytes::ZERO,
                    transaction_index: position as u64,
                    log_index: LOG_INDEX_NONE,
                    internal_index: InternalIndex::root(),
                    from: Address::ZERO,
                    to: Some(*address),
                    value,
                    token_value: U256::ZERO,
                    token_type: TokenType::Native,
                    contract_address: None,
                    gas: U256::ZERO,
                    gas_price: U256::ZERO,
                    used_gas: U256::ZERO,
                    op_code: String::new(),
                    status: TransferStatus::Success,
                    err: String::new(),
                    nonce: account.nonce,
                    input: Default::default(),
                }
            })
            .collect()
    }
}
