//! Shared type definitions for the flowscope crates.
//!
//! The workflow graph, node type registry, and recorded run data live here so
//! the engine and the CLI agree on one serde shape. Field names follow the
//! camelCase layout of exported workflow documents.

pub mod node_types;
pub mod run_data;
pub mod workflow;

pub use node_types::{NodePropertyDescription, NodeTypeDefaults, NodeTypeDescription, NodeTypeRegistry, NodeTypeVersion};
pub use run_data::{
    ExecuteData, ExecutionItem, PairedItem, PairedItems, ResultData, RunExecutionData, SourceData, TaskData, TaskDataConnections,
    TaskDataConnectionsSource, WorkflowExecuteMode,
};
pub use workflow::{Connection, Connections, Node, NodeConnections, Workflow, WorkflowDefinition, WorkflowError};

/// Represents the type of suggestion item.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemKind {
    /// A root accessor such as `$json` or `$input`
    Accessor,
    /// A callable member such as `first()` or `all()`
    Method,
    /// A workflow node name usable inside `$('...')` or `$node["..."]`
    Node,
    /// A key of a resolved JSON object
    Field,
}

/// Represents a single autocompletion entry.
#[derive(Clone, Debug, PartialEq)]
pub struct SuggestionItem {
    /// The text to display in the suggestion list
    pub display: String,
    /// The text to insert when the suggestion is selected
    pub insert_text: String,
    /// The type of suggestion (accessor, method, node, field)
    pub kind: ItemKind,
    /// Optional detail shown next to the label (e.g., accessor description)
    pub meta: Option<String>,
    /// Score for ranking suggestions (higher is better)
    pub score: i64,
}
