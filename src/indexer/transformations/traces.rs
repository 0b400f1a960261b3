use alloy_primitives::U256;

use crate::models::datasets::traces::CallTree;
use crate::models::datasets::transfers::{
    InternalIndex, LOG_INDEX_NONE, TokenType, TransferRecord, TransferStatus,
};

pub trait TraceTransformer {
    /// Internal calls below the root, depth-first in sibling order.
    fn transform_calls(&self, top_level: &TransferRecord) -> Vec<TransferRecord>;
}

struct PendingFrame {
    index: usize,
    path: InternalIndex,
    status: TransferStatus,
}

impl TraceTransformer for CallTree {
    fn transform_calls(&self, top_level: &TransferRecord) -> Vec<TransferRecord> {
        let Some(root) = self.root() else {
            return Vec::new();
        };

        let mut records = Vec::new();
        let mut stack = Vec::new();
        push_children(
            &mut stack,
            &root.children,
            &top_level.internal_index,
            top_level.status,
        );

        while let Some(pending) = stack.pop() {
            let Some(frame) = self.frame(pending.index) else {
                continue;
            };

            // Status flows down the tree; error text belongs only to the frame that failed
            let (status, err) = match frame.error.as_deref() {
                Some(error) if !error.is_empty() => (TransferStatus::Failed, error.to_string()),
                _ => (pending.status, String::new()),
            };

            if !frame.value.is_zero() {
                let created = matches!(frame.op_code.as_str(), "CREATE" | "CREATE2");
                records.push(TransferRecord {
                    timestamp: top_level.timestamp,
                    block_number: top_level.block_number,
                    block_hash: top_level.block_hash,
                    transaction_hash: top_level.transaction_hash,
                    transaction_index: top_level.transaction_index,
                    log_index: LOG_INDEX_NONE,
                    internal_index: pending.path.clone(),
                    from: frame.from,
                    to: frame.to,
                    value: frame.value,
                    token_value: U256::ZERO,
                    token_type: TokenType::Native,
                    contract_address: if created { frame.to } else { None },
                    gas: frame.gas,
                    gas_price: top_level.gas_price,
                    used_gas: frame.gas_used,
                    op_code: frame.op_code.clone(),
                    status,
                    err,
                    nonce: top_level.nonce,
                    input: frame.input.clone(),
                });
            }

            push_children(&mut stack, &frame.children, &pending.path, status);
        }

        records
    }
}

// Reverse push so the first sibling is popped first
fn push_children(
    stack: &mut Vec<PendingFrame>,
    children: &[usize],
    parent: &InternalIndex,
    status: TransferStatus,
) {
    for (position, &index) in children.iter().enumerate().rev() {
        stack.push(PendingFrame {
            index,
            path: parent.child(position),
            status,
        });
    }
}
