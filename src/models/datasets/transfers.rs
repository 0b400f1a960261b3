use alloy_primitives::{Address, Bytes, FixedBytes, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// `log_index` of records that were not derived from an event log.
pub const LOG_INDEX_NONE: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenType {
    Native,
    Token,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    Success,
    Failed,
    Pending,
    Timeout,
}

/// Position of a record in its transaction's call tree.
///
/// `"0"` is the top-level call; every nested level appends `_<n>`, where `n` is the
/// call's position among its siblings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InternalIndex(String);

impl InternalIndex {
    pub fn root() -> Self {
        Self("0".to_string())
    }

    pub fn child(&self, position: usize) -> Self {
        Self(format!("{}_{}", self.0, position))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[cfg(test)]
    pub fn depth(&self) -> usize {
        self.0.matches('_').count()
    }

    #[cfg(test)]
    pub fn parent(&self) -> Option<Self> {
        self.0
            .rsplit_once('_')
            .map(|(parent, _)| Self(parent.to_string()))
    }
}

impl Default for InternalIndex {
    fn default() -> Self {
        Self::root()
    }
}

impl fmt::Display for InternalIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/////////////////////////////////// Transformed Data ///////////////////////////////////
// Final output format, one row per monetary movement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub timestamp: u64,
    pub block_number: u64,
    pub block_hash: Option<FixedBytes<32>>,
    pub transaction_hash: FixedBytes<32>,
    pub transaction_index: u64,
    pub log_index: i64,
    pub internal_index: InternalIndex,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub token_value: U256,
    pub token_type: TokenType,
    pub contract_address: Option<Address>,
    pub gas: U256,
    pub gas_price: U256,
    pub used_gas: U256,
    pub op_code: String,
    pub status: TransferStatus,
    pub err: String,
    pub nonce: u64,
    pub input: Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_index_paths() {
        let root = InternalIndex::root();
        let grandchild = root.child(1).child(2);

        assert_eq!(root.as_str(), "0");
        assert_eq!(grandchild.as_str(), "0_1_2");
        assert_eq!(grandchild.depth(), 2);
        assert_eq!(grandchild.parent(), Some(root.child(1)));
        assert_eq!(root.parent(), None);
    }

    #[test]
    fn test_enums_serialize_upper_case() {
        assert_eq!(
            serde_json::to_string(&TransferStatus::Timeout).unwrap(),
            "\"TIMEOUT\""
        );
        assert_eq!(serde_json::to_string(&TokenType::Token).unwrap(), "\"TOKEN\"");
        assert_eq!(
            serde_json::to_string(&InternalIndex::root().child(3)).unwrap(),
            "\"0_3\""
        );
    }
}
