use alloy_rpc_types_trace::geth::CallFrame as GethCallFrame;
use serde_json::Value;

use crate::models::datasets::traces::{CallFrame, CallTree, CallTreeBuilder};
use crate::models::errors::TraceError;

pub trait TraceParser {
    fn parse_call_tree(self) -> Result<CallTree, TraceError>;
}

impl TraceParser for Value {
    fn parse_call_tree(self) -> Result<CallTree, TraceError> {
        if self.is_null() {
            return Err(TraceError::Malformed("empty trace result".to_string()));
        }

        let root: GethCallFrame =
            serde_json::from_value(self).map_err(|e| TraceError::Malformed(e.to_string()))?;
        root.parse_call_tree()
    }
}

impl TraceParser for GethCallFrame {
    fn parse_call_tree(self) -> Result<CallTree, TraceError> {
        let mut builder = CallTreeBuilder::default();
        let mut stack = vec![(self, None)];

        // Siblings are pushed in reverse so each parent links its children in call order
        while let Some((mut frame, parent)) = stack.pop() {
            let calls = std::mem::take(&mut frame.calls);
            let index = builder.push(parent, frame.into_call_frame());
            stack.extend(calls.into_iter().rev().map(|call| (call, Some(index))));
        }

        Ok(builder.build())
    }
}

trait IntoCallFrame {
    fn into_call_frame(self) -> CallFrame;
}

impl IntoCallFrame for GethCallFrame {
    fn into_call_frame(self) -> CallFrame {
        CallFrame {
            op_code: self.typ,
            from: self.from,
            to: self.to,
            value: self.value.unwrap_or_default(),
            gas: self.gas,
            gas_used: self.gas_used,
            input: self.input,
            error: self.error,
            children: Vec::new(),
        }
    }
}

/// Map a failed `debug_traceTransaction` call onto the trace error it represents.
pub fn classify_trace_error(message: &str) -> TraceError {
    if message.contains("execution timeout") {
        TraceError::Timeout
    } else {
        TraceError::Rpc(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;
    use serde_json::json;

    fn call(typ: &str, value: &str, calls: Vec<Value>) -> Value {
        json!({
            "type": typ,
            "from": "0x1111111111111111111111111111111111111111",
            "to": "0x2222222222222222222222222222222222222222",
            "value": value,
            "gas": "0x5208",
            "gasUsed": "0x5208",
            "input": "0x",
            "calls": calls,
        })
    }

    #[test]
    fn test_parse_nested_call_tree() {
        let payload = call(
            "CALL",
            "0x5",
            vec![
                call("STATICCALL", "0x0", vec![]),
                call("CALL", "0x3", vec![call("CREATE", "0x1", vec![])]),
            ],
        );

        let tree = payload.parse_call_tree().unwrap();

        assert_eq!(tree.len(), 4);
        let root = tree.root().unwrap();
        assert_eq!(root.op_code, "CALL");
        assert_eq!(root.value, U256::from(5u64));
        assert_eq!(root.children.len(), 2);

        let first = tree.frame(root.children[0]).unwrap();
        let second = tree.frame(root.children[1]).unwrap();
        assert_eq!(first.op_code, "STATICCALL");
        assert_eq!(second.value, U256::from(3u64));
        assert_eq!(
            tree.frame(second.children[0]).unwrap().op_code,
            "CREATE".to_string()
        );
    }

    #[test]
    fn test_frame_error_is_kept() {
        let mut payload = call("CALL", "0x1", vec![]);
        payload["error"] = json!("execution reverted");

        let tree = payload.parse_call_tree().unwrap();
        assert_eq!(
            tree.root().unwrap().error.as_deref(),
            Some("execution reverted")
        );
    }

    #[test]
    fn test_malformed_payloads() {
        assert!(matches!(
            Value::Null.parse_call_tree(),
            Err(TraceError::Malformed(_))
        ));
        assert!(matches!(
            json!({"type": "CALL", "from": 7}).parse_call_tree(),
            Err(TraceError::Malformed(_))
        ));
    }

    #[test]
    fn test_classify_trace_error() {
        assert!(matches!(
            classify_trace_error(
                "server returned an error response: error code -32000: execution timeout"
            ),
            TraceError::Timeout
        ));
        assert!(matches!(
            classify_trace_error("transaction not found"),
            TraceError::Rpc(_)
        ));
    }
}
