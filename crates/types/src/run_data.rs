//! Recorded run data of a single workflow execution.
//!
//! Everything here is a read-only snapshot: the engine only ever borrows it.
//! Item lineage is stored as integer backlinks ([`PairedItem`]) into the
//! previous node's output array. Items produced by merging several inputs
//! carry one backlink per merged input ([`PairedItems::Multiple`]).

use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::workflow::Node;

/// Output of one task keyed by port name (`main`), then branch, then item.
pub type TaskDataConnections = IndexMap<String, Vec<Vec<ExecutionItem>>>;

/// How the workflow execution was started.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowExecuteMode {
    Cli,
    Error,
    Integrated,
    Internal,
    /// Started by hand from the editor (test runs).
    #[default]
    Manual,
    Retry,
    Trigger,
    Webhook,
    Evaluation,
}

impl WorkflowExecuteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cli => "cli",
            Self::Error => "error",
            Self::Integrated => "integrated",
            Self::Internal => "internal",
            Self::Manual => "manual",
            Self::Retry => "retry",
            Self::Trigger => "trigger",
            Self::Webhook => "webhook",
            Self::Evaluation => "evaluation",
        }
    }
}

impl fmt::Display for WorkflowExecuteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkflowExecuteMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(JsonValue::String(s.to_ascii_lowercase())).map_err(|_| format!("unknown execution mode: {s}"))
    }
}

/// Backlink from an output item to the input item it was derived from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "PairedItemRepr")]
pub struct PairedItem {
    /// Index of the source item in the previous node's output branch.
    pub item: usize,
    /// Input slot the source item arrived on; `None` means slot 0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<usize>,
}

impl PairedItem {
    pub fn new(item: usize) -> Self {
        Self { item, input: None }
    }

    pub fn input_index(&self) -> usize {
        self.input.unwrap_or(0)
    }
}

/// Accepts both `{ "item": 3 }` and the bare shorthand `3`.
#[derive(Deserialize)]
#[serde(untagged)]
enum PairedItemRepr {
    Index(usize),
    Full {
        item: usize,
        #[serde(default)]
        input: Option<usize>,
    },
}

impl From<PairedItemRepr> for PairedItem {
    fn from(repr: PairedItemRepr) -> Self {
        match repr {
            PairedItemRepr::Index(item) => Self::new(item),
            PairedItemRepr::Full { item, input } => Self { item, input },
        }
    }
}

/// Recorded lineage of one item: a single backlink, or several for merged items.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum PairedItems {
    Multiple(Vec<PairedItem>),
    Single(PairedItem),
}

impl PairedItems {
    pub fn as_slice(&self) -> &[PairedItem] {
        match self {
            Self::Single(paired) => std::slice::from_ref(paired),
            Self::Multiple(paired) => paired,
        }
    }
}

impl From<PairedItem> for PairedItems {
    fn from(paired: PairedItem) -> Self {
        Self::Single(paired)
    }
}

/// One result item flowing between nodes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionItem {
    /// Structured payload exposed to expressions as `$json`.
    #[serde(default)]
    pub json: JsonMap<String, JsonValue>,
    /// Opaque binary attachment descriptors exposed as `$binary`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paired_item: Option<PairedItems>,
}

impl ExecutionItem {
    pub fn new(json: JsonMap<String, JsonValue>) -> Self {
        Self {
            json,
            binary: None,
            paired_item: None,
        }
    }

    /// Builds an item from a JSON value; non-object values yield `None`.
    pub fn from_value(value: JsonValue) -> Option<Self> {
        match value {
            JsonValue::Object(json) => Some(Self::new(json)),
            _ => None,
        }
    }

    /// The item as a JSON object (`json`, plus `binary` when present).
    pub fn to_value(&self) -> JsonValue {
        let mut object = JsonMap::new();
        object.insert("json".into(), JsonValue::Object(self.json.clone()));
        if let Some(binary) = &self.binary {
            object.insert("binary".into(), binary.clone());
        }
        JsonValue::Object(object)
    }
}

/// Provenance of a task's input: which node, output, and run produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SourceData {
    pub previous_node: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_node_output: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_node_run: Option<usize>,
}

impl SourceData {
    pub fn new(previous_node: impl Into<String>) -> Self {
        Self {
            previous_node: previous_node.into(),
            previous_node_output: None,
            previous_node_run: None,
        }
    }

    pub fn output_index(&self) -> usize {
        self.previous_node_output.unwrap_or(0)
    }

    /// Run of the previous node, defaulting to `current_run` when unrecorded.
    pub fn run_index(&self, current_run: usize) -> usize {
        self.previous_node_run.unwrap_or(current_run)
    }
}

/// One execution attempt of a node.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskData {
    /// Start of the attempt in milliseconds since the Unix epoch.
    #[serde(default)]
    pub start_time: i64,
    /// Elapsed time in milliseconds.
    #[serde(default)]
    pub execution_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<TaskDataConnections>,
    /// Upstream provenance per input slot.
    #[serde(default)]
    pub source: Vec<Option<SourceData>>,
}

impl TaskData {
    /// Items of the given port and branch, if recorded.
    pub fn output(&self, port: &str, branch: usize) -> Option<&[ExecutionItem]> {
        self.data
            .as_ref()?
            .get(port)?
            .get(branch)
            .map(Vec::as_slice)
    }

    /// Provenance of the given input slot.
    pub fn source_for_input(&self, input: usize) -> Option<&SourceData> {
        self.source.get(input).and_then(Option::as_ref)
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.start_time)
    }
}

/// Result section of a run: per-node task lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResultData {
    /// Tasks keyed by node name; index = run index.
    #[serde(default)]
    pub run_data: IndexMap<String, Vec<TaskData>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_node_executed: Option<String>,
}

/// Snapshot of everything recorded during one workflow execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunExecutionData {
    #[serde(default)]
    pub result_data: ResultData,
}

impl RunExecutionData {
    /// All recorded tasks of a node (empty when the node never ran).
    pub fn tasks(&self, node_name: &str) -> &[TaskData] {
        self.result_data
            .run_data
            .get(node_name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn task(&self, node_name: &str, run_index: usize) -> Option<&TaskData> {
        self.tasks(node_name).get(run_index)
    }

    pub fn has_run(&self, node_name: &str) -> bool {
        !self.tasks(node_name).is_empty()
    }

    /// Total number of recorded tasks across all nodes.
    pub fn task_count(&self) -> usize {
        self.result_data.run_data.values().map(Vec::len).sum()
    }
}

/// Input provenance of the task being evaluated, per connection type.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskDataConnectionsSource {
    #[serde(default)]
    pub main: Vec<Option<SourceData>>,
}

/// Describes how the current node was invoked: its input data and where it came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecuteData {
    #[serde(default)]
    pub data: TaskDataConnections,
    pub node: Node,
    #[serde(default)]
    pub source: Option<TaskDataConnectionsSource>,
}

impl ExecuteData {
    /// First recorded `main` source, if any.
    pub fn main_source(&self) -> Option<&SourceData> {
        self.source.as_ref()?.main.iter().flatten().next()
    }

    /// True when the invocation recorded no upstream source at all.
    pub fn is_root(&self) -> bool {
        self.main_source().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn paired_item_accepts_bare_index() {
        let item: ExecutionItem = serde_json::from_value(json!({ "json": {}, "pairedItem": 3 })).expect("item");
        assert_eq!(item.paired_item, Some(PairedItem::new(3).into()));

        let item: ExecutionItem =
            serde_json::from_value(json!({ "json": {}, "pairedItem": { "item": 1, "input": 2 } })).expect("item");
        assert_eq!(item.paired_item, Some(PairedItem { item: 1, input: Some(2) }.into()));
    }

    #[test]
    fn merged_items_keep_every_backlink() {
        let item: ExecutionItem = serde_json::from_value(json!({
            "json": { "merged": true },
            "pairedItem": [{ "item": 0 }, { "item": 1, "input": 1 }]
        }))
        .expect("merged item");

        let backlinks = item.paired_item.as_ref().map(PairedItems::as_slice).unwrap_or_default();
        assert_eq!(backlinks, [PairedItem::new(0), PairedItem { item: 1, input: Some(1) }]);
        assert_eq!(serde_json::to_value(&item).expect("serialize")["pairedItem"][1], json!({ "item": 1, "input": 1 }));
    }

    #[test]
    fn task_output_reads_port_and_branch() {
        let task: TaskData = serde_json::from_value(json!({
            "startTime": 1,
            "executionTime": 1,
            "data": { "main": [[{ "json": { "a": 1 } }], [{ "json": { "b": 2 } }]] },
            "source": [null, { "previousNode": "Start" }]
        }))
        .expect("task");

        assert_eq!(task.output("main", 1).map(|items| items[0].json["b"].clone()), Some(json!(2)));
        assert!(task.output("main", 2).is_none());
        assert!(task.output("error", 0).is_none());
        assert!(task.source_for_input(0).is_none());
        assert_eq!(task.source_for_input(1).map(|source| source.previous_node.as_str()), Some("Start"));
    }

    #[test]
    fn execute_mode_parses_case_insensitively() {
        assert_eq!("Manual".parse::<WorkflowExecuteMode>(), Ok(WorkflowExecuteMode::Manual));
        assert_eq!("webhook".parse::<WorkflowExecuteMode>(), Ok(WorkflowExecuteMode::Webhook));
        assert!("nightly".parse::<WorkflowExecuteMode>().is_err());
    }

    #[test]
    fn started_at_converts_epoch_millis() {
        let task = TaskData {
            start_time: 1_700_000_000_000,
            ..TaskData::default()
        };
        assert_eq!(task.started_at().map(|time| time.timestamp()), Some(1_700_000_000));
    }
}
