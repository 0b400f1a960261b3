use alloy_primitives::{Address, FixedBytes, U256};
use serde::Deserialize;

use crate::models::datasets::transactions::RpcTransactionData;

////////////////////////////////////// RPC Data ////////////////////////////////////////
///////////////////////////////// eth_getBlockByNumber /////////////////////////////////
#[derive(Debug, Clone)]
pub struct RpcBlockData {
    pub number: u64,
    pub hash: FixedBytes<32>,
    pub timestamp: u64,
    pub transactions: Vec<RpcTransactionData>,
}

impl RpcBlockData {
    pub fn context(&self) -> BlockContext {
        BlockContext {
            number: self.number,
            hash: self.hash,
            timestamp: self.timestamp,
        }
    }
}

// The part of a block every exported record carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockContext {
    pub number: u64,
    pub hash: FixedBytes<32>,
    pub timestamp: u64,
}

////////////////////////////////// eth_subscribe newHeads //////////////////////////////
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadEvent {
    pub number: u64,
    pub hash: FixedBytes<32>,
}

////////////////////////////////////// debug_dumpBlock /////////////////////////////////
// Balances come back as decimal strings and are parsed during export so a single bad
// entry does not reject the whole dump
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GenesisAccount {
    pub balance: String,
    #[serde(default)]
    pub nonce: u64,
}

impl GenesisAccount {
    pub fn new(balance: U256, nonce: u64) -> Self {
        Self {
            balance: balance.to_string(),
            nonce,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcStateDump {
    #[serde(default)]
    pub accounts: std::collections::BTreeMap<Address, GenesisAccount>,
}
