//! Snapshot documents: everything a proxy session needs, in one file.

use flowscope_types::{
    ExecuteData, ExecutionItem, RunExecutionData, SourceData, TaskDataConnections, TaskDataConnectionsSource, Workflow,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value};
use tracing::debug;

use crate::cursor::ExecutionCursor;
use crate::error::ProxyError;
use crate::proxy::{MAIN_PORT, ProxyParams, WorkflowDataProxy};
use crate::settings::ProxySettings;

/// A workflow, its recorded run data, and the cursor to resolve from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProxySnapshot {
    pub workflow: Workflow,
    #[serde(default)]
    pub run_execution_data: RunExecutionData,
    pub cursor: ExecutionCursor,
    /// Invocation of the active node; derived from run data when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execute_data: Option<ExecuteData>,
    /// Input items of the active node; defaults to the first `main` branch of the execute data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_input_data: Option<Vec<ExecutionItem>>,
    #[serde(default)]
    pub context: JsonMap<String, Value>,
    #[serde(default)]
    pub additional_keys: JsonMap<String, Value>,
}

impl ProxySnapshot {
    /// Replaces the cursor, dropping any explicit invocation data recorded for the old one.
    pub fn with_cursor(mut self, cursor: ExecutionCursor) -> Self {
        if cursor.node_name != self.cursor.node_name || cursor.run_index != self.cursor.run_index {
            self.execute_data = None;
            self.connection_input_data = None;
        }
        self.cursor = cursor;
        self
    }

    /// Fills in derived invocation data so proxies can borrow from the result.
    pub fn prepare(self) -> Result<PreparedSnapshot, ProxyError> {
        let Self {
            workflow,
            run_execution_data,
            cursor,
            execute_data,
            connection_input_data,
            context,
            additional_keys,
        } = self;

        if !workflow.contains_node(&cursor.node_name) {
            return Err(ProxyError::unknown_node(&cursor.node_name));
        }

        let execute_data = match execute_data {
            Some(execute_data) => Some(execute_data),
            None => derive_execute_data(&workflow, &run_execution_data, &cursor),
        };
        let connection_input = match connection_input_data {
            Some(items) => items,
            None => execute_data
                .as_ref()
                .and_then(|execute_data| execute_data.data.get(MAIN_PORT))
                .and_then(|branches| branches.first())
                .cloned()
                .unwrap_or_default(),
        };

        debug!(
            node = %cursor.node_name,
            run_index = cursor.run_index,
            input_items = connection_input.len(),
            upstream = execute_data
                .as_ref()
                .and_then(ExecuteData::main_source)
                .map(|source| source.previous_node.as_str()),
            "prepared snapshot"
        );

        Ok(PreparedSnapshot {
            workflow,
            run_data: run_execution_data,
            cursor,
            execute_data,
            connection_input,
            context,
            additional_keys,
        })
    }
}

/// Rebuilds the invocation of the cursor's node from its recorded task, or
/// from the first executed direct parent when the node has not run.
fn derive_execute_data(workflow: &Workflow, run_data: &RunExecutionData, cursor: &ExecutionCursor) -> Option<ExecuteData> {
    let node = workflow.node(&cursor.node_name)?.clone();

    let source = match run_data.task(&cursor.node_name, cursor.run_index) {
        Some(task) => task.source_for_input(0).cloned(),
        None => workflow
            .direct_parent_names(&cursor.node_name)
            .into_iter()
            .find(|parent| run_data.has_run(parent))
            .map(|parent| SourceData {
                previous_node_run: run_data.tasks(parent).len().checked_sub(1),
                ..SourceData::new(parent)
            }),
    };

    let mut data = TaskDataConnections::new();
    if let Some(source) = &source {
        let items = run_data
            .task(&source.previous_node, source.run_index(cursor.run_index))
            .and_then(|task| task.output(MAIN_PORT, source.output_index()))
            .map(<[ExecutionItem]>::to_vec)
            .unwrap_or_default();
        data.insert(MAIN_PORT.to_string(), vec![items]);
    }

    Some(ExecuteData {
        data,
        node,
        source: source.map(|source| TaskDataConnectionsSource {
            main: vec![Some(source)],
        }),
    })
}

/// A snapshot with its invocation data resolved; hands out proxy sessions.
#[derive(Debug, Clone)]
pub struct PreparedSnapshot {
    workflow: Workflow,
    run_data: RunExecutionData,
    cursor: ExecutionCursor,
    execute_data: Option<ExecuteData>,
    connection_input: Vec<ExecutionItem>,
    context: JsonMap<String, Value>,
    additional_keys: JsonMap<String, Value>,
}

impl PreparedSnapshot {
    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn run_data(&self) -> &RunExecutionData {
        &self.run_data
    }

    pub fn cursor(&self) -> &ExecutionCursor {
        &self.cursor
    }

    pub fn execute_data(&self) -> Option<&ExecuteData> {
        self.execute_data.as_ref()
    }

    pub fn connection_input(&self) -> &[ExecutionItem] {
        &self.connection_input
    }

    /// Builds a proxy anchored at the snapshot cursor.
    pub fn session(&self, settings: ProxySettings) -> Result<WorkflowDataProxy<'_>, ProxyError> {
        WorkflowDataProxy::new(ProxyParams {
            workflow: &self.workflow,
            run_data: &self.run_data,
            run_index: self.cursor.run_index,
            item_index: self.cursor.item_index,
            active_node: &self.cursor.node_name,
            connection_input: &self.connection_input,
            context: self.context.clone(),
            mode: self.cursor.mode,
            additional_keys: self.additional_keys.clone(),
            execute_data: self.execute_data.as_ref(),
            settings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixture_snapshot;
    use serde_json::json;

    fn fixture_document() -> ProxySnapshot {
        serde_json::from_str(include_str!("../tests/data/autocomplete_snapshot.json")).expect("fixture snapshot")
    }

    #[test]
    fn explicit_execute_data_supplies_connection_input() {
        let prepared = fixture_snapshot();
        assert_eq!(prepared.connection_input().len(), 5);
        assert_eq!(prepared.connection_input()[0].json["obj"], json!({ "a": "hello" }));
    }

    #[test]
    fn execute_data_is_derived_from_the_recorded_task() {
        let mut snapshot = fixture_document();
        snapshot.execute_data = None;
        let prepared = snapshot.prepare().expect("prepared");

        let source = prepared.execute_data().and_then(ExecuteData::main_source).expect("source");
        assert_eq!(source.previous_node, "Rename");
        assert_eq!(prepared.connection_input()[0].json["data"], json!(105));
        assert!(prepared.connection_input()[0].json.get("obj").is_none());
    }

    #[test]
    fn unexecuted_node_takes_input_from_its_executed_parent() {
        let snapshot = fixture_document().with_cursor(ExecutionCursor::new("Rename").with_run_index(1));
        let prepared = snapshot.prepare().expect("prepared");

        let source = prepared.execute_data().and_then(ExecuteData::main_source).expect("source");
        assert_eq!(source.previous_node, "Function");
        assert_eq!(prepared.connection_input().len(), 5);
        assert_eq!(prepared.connection_input()[4].json["initialName"], json!(950));
    }

    #[test]
    fn root_node_has_no_input() {
        let prepared = fixture_document()
            .with_cursor(ExecutionCursor::new("Start"))
            .prepare()
            .expect("prepared");
        let proxy = prepared.session(ProxySettings::default()).expect("proxy");

        assert!(prepared.execute_data().is_some_and(ExecuteData::is_root));
        assert!(matches!(proxy.current_item(), Err(ProxyError::NoInputData { .. })));
    }

    #[test]
    fn unknown_cursor_node_is_rejected() {
        let result = fixture_document().with_cursor(ExecutionCursor::new("Ghost")).prepare();
        assert!(matches!(result, Err(ProxyError::UnknownNode { ref node }) if node == "Ghost"));
    }

    #[test]
    fn keeping_the_cursor_node_keeps_explicit_input() {
        let snapshot = fixture_document().with_cursor(ExecutionCursor::new("End").with_item_index(3));
        assert!(snapshot.execute_data.is_some());

        let prepared = snapshot.prepare().expect("prepared");
        let proxy = prepared.session(ProxySettings::default()).expect("proxy");
        assert_eq!(proxy.current_item().map(|item| item.json["data"].clone()), Ok(json!(275)));
    }
}
