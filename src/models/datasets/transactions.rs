use alloy_primitives::{Address, Bytes, FixedBytes, U256};

use crate::models::datasets::logs::RpcLogData;

////////////////////////////////////// RPC Data ////////////////////////////////////////
///////////////////////////////// eth_getBlockByNumber /////////////////////////////////
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcTransactionData {
    pub hash: FixedBytes<32>,
    // Sender as recovered by the node
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub gas: u64,
    pub gas_price: u128,
    pub nonce: u64,
    pub input: Bytes,
    pub index: Option<u64>,
}

/////////////////////////////// eth_getTransactionReceipt //////////////////////////////
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcReceiptData {
    pub status: bool,
    pub gas_used: u64,
    pub cumulative_gas_used: u64,
    pub contract_address: Option<Address>,
    pub logs: Vec<RpcLogData>,
}
