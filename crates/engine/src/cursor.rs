use flowscope_types::WorkflowExecuteMode;
use serde::{Deserialize, Serialize};

/// Position every relative reference is resolved from.
///
/// A proxy copies the cursor at construction and never changes it; resolving
/// from another position requires a new proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionCursor {
    /// Node whose parameters are being evaluated.
    #[serde(rename = "node")]
    pub node_name: String,
    #[serde(default)]
    pub run_index: usize,
    /// Index into the node's input items (`$itemIndex`).
    #[serde(default)]
    pub item_index: usize,
    #[serde(default)]
    pub mode: WorkflowExecuteMode,
}

impl ExecutionCursor {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            run_index: 0,
            item_index: 0,
            mode: WorkflowExecuteMode::default(),
        }
    }

    pub fn with_run_index(mut self, run_index: usize) -> Self {
        self.run_index = run_index;
        self
    }

    pub fn with_item_index(mut self, item_index: usize) -> Self {
        self.item_index = item_index;
        self
    }

    pub fn with_mode(mut self, mode: WorkflowExecuteMode) -> Self {
        self.mode = mode;
        self
    }
}
