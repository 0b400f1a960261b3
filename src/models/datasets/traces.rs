use alloy_primitives::{Address, Bytes, U256};

////////////////////////////////////// RPC Data ////////////////////////////////////////
// One call of a callTracer result. Children are arena indices in sibling order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFrame {
    pub op_code: String,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub gas: U256,
    pub gas_used: U256,
    pub input: Bytes,
    pub error: Option<String>,
    pub children: Vec<usize>,
}

/// Immutable call tree of a single transaction, root frame at index 0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallTree {
    frames: Vec<CallFrame>,
}

impl CallTree {
    pub fn root(&self) -> Option<&CallFrame> {
        self.frames.first()
    }

    pub fn frame(&self, index: usize) -> Option<&CallFrame> {
        self.frames.get(index)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

// Frames are pushed parent-first; `push` returns the new frame's index and links it under `parent`
#[derive(Debug, Default)]
pub struct CallTreeBuilder {
    frames: Vec<CallFrame>,
}

impl CallTreeBuilder {
    pub fn push(&mut self, parent: Option<usize>, mut frame: CallFrame) -> usize {
        frame.children.clear();
        let index = self.frames.len();
        self.frames.push(frame);
        if let Some(parent) = parent.and_then(|p| self.frames.get_mut(p)) {
            parent.children.push(index);
        }
        index
    }

    pub fn build(self) -> CallTree {
        CallTree {
            frames: self.frames,
        }
    }
}

// What the trace step produced for one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceOutcome {
    Tree(CallTree),
    Unavailable,
    TimedOut,
    NotRequested,
}
