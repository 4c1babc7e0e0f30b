//! # Execution Data Proxy
//!
//! A read-only, cursor-relative view over a workflow definition and the run
//! data recorded for one execution. Expressions embedded in node parameters
//! use it to reach sibling data ("the current item", "all items of node N",
//! "the item of node N paired with the current item") without knowing how the
//! run data is laid out.
//!
//! Every accessor is a pure function of the cursor and the borrowed snapshot.
//! Failures are reported as [`ProxyError`] variants; context lookups are the
//! exception and return [`ContextValue::Undefined`] instead.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let proxy = WorkflowDataProxy::new(ProxyParams::new(&workflow, &run_data, "End", &input))?;
//! let item = proxy.current_item()?;
//! let function_items = proxy.node_output("Function", OutputQuery::default().with_run(0))?;
//! let origin = proxy.paired_item("Function", 0)?;
//! ```

use flowscope_types::{ExecuteData, ExecutionItem, RunExecutionData, Workflow, WorkflowExecuteMode};
use serde_json::{Map as JsonMap, Value, json};
use tracing::debug;

use crate::accessor::DataProxy;
use crate::context::{ContextValue, lookup_layers};
use crate::cursor::ExecutionCursor;
use crate::error::ProxyError;
use crate::lineage;
use crate::settings::ProxySettings;

/// Port name used when a query does not name one.
pub const MAIN_PORT: &str = "main";

/// Construction inputs for [`WorkflowDataProxy`].
#[derive(Debug, Clone)]
pub struct ProxyParams<'a> {
    pub workflow: &'a Workflow,
    pub run_data: &'a RunExecutionData,
    pub run_index: usize,
    pub item_index: usize,
    /// Node whose parameters are being resolved.
    pub active_node: &'a str,
    /// Resolved input items feeding the active node.
    pub connection_input: &'a [ExecutionItem],
    /// Free-form key/value context consulted by context lookups.
    pub context: JsonMap<String, Value>,
    pub mode: WorkflowExecuteMode,
    /// Secondary context (`$execution`, `$vars`, ...), consulted after `context`.
    pub additional_keys: JsonMap<String, Value>,
    /// How the active node was invoked, including its upstream source.
    pub execute_data: Option<&'a ExecuteData>,
    pub settings: ProxySettings,
}

impl<'a> ProxyParams<'a> {
    /// Parameters at run 0, item 0, manual mode, with empty context.
    pub fn new(
        workflow: &'a Workflow,
        run_data: &'a RunExecutionData,
        active_node: &'a str,
        connection_input: &'a [ExecutionItem],
    ) -> Self {
        Self {
            workflow,
            run_data,
            run_index: 0,
            item_index: 0,
            active_node,
            connection_input,
            context: JsonMap::new(),
            mode: WorkflowExecuteMode::Manual,
            additional_keys: JsonMap::new(),
            execute_data: None,
            settings: ProxySettings::default(),
        }
    }
}

/// Selects one recorded output of a node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputQuery {
    /// Port name; `main` when unset.
    pub port: Option<String>,
    /// Branch (output index) within the port; 0 when unset.
    pub branch: Option<usize>,
    /// Run index; the node's latest run when unset.
    pub run: Option<usize>,
}

impl OutputQuery {
    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    pub fn with_branch(mut self, branch: usize) -> Self {
        self.branch = Some(branch);
        self
    }

    pub fn with_run(mut self, run: usize) -> Self {
        self.run = Some(run);
        self
    }
}

/// Read-only resolution session anchored at one [`ExecutionCursor`].
#[derive(Debug, Clone)]
pub struct WorkflowDataProxy<'a> {
    pub(crate) workflow: &'a Workflow,
    pub(crate) run_data: &'a RunExecutionData,
    pub(crate) cursor: ExecutionCursor,
    pub(crate) connection_input: &'a [ExecutionItem],
    pub(crate) context: JsonMap<String, Value>,
    pub(crate) additional_keys: JsonMap<String, Value>,
    pub(crate) execute_data: Option<&'a ExecuteData>,
    pub(crate) settings: ProxySettings,
}

impl<'a> WorkflowDataProxy<'a> {
    /// Builds a proxy; fails when the active node is not part of the workflow.
    pub fn new(params: ProxyParams<'a>) -> Result<Self, ProxyError> {
        let ProxyParams {
            workflow,
            run_data,
            run_index,
            item_index,
            active_node,
            connection_input,
            context,
            mode,
            additional_keys,
            execute_data,
            settings,
        } = params;

        if !workflow.contains_node(active_node) {
            return Err(ProxyError::unknown_node(active_node));
        }

        debug!(
            workflow = workflow.name(),
            node = active_node,
            run_index,
            item_index,
            %mode,
            input_items = connection_input.len(),
            "built workflow data proxy"
        );

        Ok(Self {
            workflow,
            run_data,
            cursor: ExecutionCursor {
                node_name: active_node.to_string(),
                run_index,
                item_index,
                mode,
            },
            connection_input,
            context,
            additional_keys,
            execute_data,
            settings,
        })
    }

    pub fn cursor(&self) -> &ExecutionCursor {
        &self.cursor
    }

    pub fn workflow(&self) -> &'a Workflow {
        self.workflow
    }

    pub fn run_data(&self) -> &'a RunExecutionData {
        self.run_data
    }

    pub fn settings(&self) -> &ProxySettings {
        &self.settings
    }

    /// The composite accessor exposing everything under `$`-prefixed names.
    pub fn data_proxy(&self) -> DataProxy<'_, 'a> {
        DataProxy::new(self)
    }

    /// Input items of the active node.
    ///
    /// Fails with [`ProxyError::NoInputData`] when the node received nothing or
    /// its invocation recorded no upstream source (a graph root).
    pub fn input_items(&self) -> Result<&'a [ExecutionItem], ProxyError> {
        let is_root = self.execute_data.is_some_and(ExecuteData::is_root);
        if is_root || self.connection_input.is_empty() {
            return Err(ProxyError::NoInputData {
                node: self.cursor.node_name.clone(),
            });
        }
        Ok(self.connection_input)
    }

    /// The input item at `index`.
    pub fn input_item(&self, index: usize) -> Result<&'a ExecutionItem, ProxyError> {
        let items = self.input_items()?;
        items
            .get(index)
            .ok_or_else(|| ProxyError::out_of_range(&self.cursor.node_name, index, items.len()))
    }

    /// The input item at the cursor's item index (`$json` source).
    pub fn current_item(&self) -> Result<&'a ExecutionItem, ProxyError> {
        self.input_item(self.cursor.item_index)
    }

    /// Latest recorded run index of a node, if it ran at all.
    pub fn latest_run_index(&self, node_name: &str) -> Option<usize> {
        self.run_data.tasks(node_name).len().checked_sub(1)
    }

    /// Recorded output items of a node, in their original order.
    pub fn node_output(&self, node_name: &str, query: OutputQuery) -> Result<&'a [ExecutionItem], ProxyError> {
        if !self.workflow.contains_node(node_name) {
            return Err(ProxyError::unknown_node(node_name));
        }
        let run_data = self.run_data;
        let run_index = match query.run {
            Some(run) => run,
            None => self
                .latest_run_index(node_name)
                .ok_or_else(|| ProxyError::no_run_data(node_name, self.cursor.run_index))?,
        };
        let task = run_data
            .task(node_name, run_index)
            .ok_or_else(|| ProxyError::no_run_data(node_name, run_index))?;
        let port = query.port.as_deref().unwrap_or(MAIN_PORT);
        let branches = task
            .data
            .as_ref()
            .and_then(|data| data.get(port))
            .ok_or_else(|| ProxyError::no_run_data(node_name, run_index))?;
        let branch = query.branch.unwrap_or(0);
        branches
            .get(branch)
            .map(Vec::as_slice)
            .ok_or_else(|| ProxyError::out_of_range(node_name, branch, branches.len()))
    }

    /// A single recorded output item of a node.
    pub fn node_item(&self, node_name: &str, query: OutputQuery, index: usize) -> Result<&'a ExecutionItem, ProxyError> {
        let items = self.node_output(node_name, query)?;
        items
            .get(index)
            .ok_or_else(|| ProxyError::out_of_range(node_name, index, items.len()))
    }

    /// Follows item lineage from input item `item_index` back to `target_node`.
    pub fn paired_item(&self, target_node: &str, item_index: usize) -> Result<&'a ExecutionItem, ProxyError> {
        lineage::trace_paired_item(self, target_node, item_index)
    }

    /// Context lookup with precedence: `overrides`, constructor context,
    /// additional keys, then the environment snapshot. Never fails.
    pub fn context_value(&self, key: &str, overrides: Option<&JsonMap<String, Value>>) -> ContextValue {
        let layers = [overrides, Some(&self.context), Some(&self.additional_keys)];
        if let Some(value) = lookup_layers(key, &layers) {
            return ContextValue::Defined(value);
        }
        self.env_value(key)
    }

    /// `$env.<name>`; undefined when missing or blocked.
    pub fn env_value(&self, name: &str) -> ContextValue {
        self.settings
            .env_var(name)
            .map(|value| Value::String(value.to_string()))
            .into()
    }

    /// Static parameters of a node overlaid on its type defaults.
    pub fn node_parameters(&self, node_name: &str) -> Result<JsonMap<String, Value>, ProxyError> {
        self.workflow
            .node_parameters(node_name)
            .ok_or_else(|| ProxyError::unknown_node(node_name))
    }

    /// `$prevNode`: the node, output, and run that fed the active node.
    pub fn previous_node(&self) -> ContextValue {
        let Some(source) = self.execute_data.and_then(ExecuteData::main_source) else {
            return ContextValue::Undefined;
        };
        ContextValue::Defined(json!({
            "name": source.previous_node,
            "outputIndex": source.output_index(),
            "runIndex": source.run_index(self.cursor.run_index),
        }))
    }

    /// `$workflow`: identity and activation flag.
    pub fn workflow_info(&self) -> Value {
        json!({
            "id": self.workflow.id(),
            "name": self.workflow.name(),
            "active": self.workflow.active(),
        })
    }

    /// `$execution`: any `$execution` entries from the additional keys plus the mode.
    pub fn execution_info(&self) -> Value {
        let mut execution = match self.additional_keys.get("$execution") {
            Some(Value::Object(fields)) => fields.clone(),
            _ => JsonMap::new(),
        };
        execution.insert("mode".into(), Value::String(self.cursor.mode.to_string()));
        Value::Object(execution)
    }

    /// `$vars`, supplied through the additional keys.
    pub fn variables(&self) -> ContextValue {
        self.additional_keys.get("$vars").cloned().into()
    }
}
