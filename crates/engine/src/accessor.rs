//! Composite accessor object.
//!
//! [`DataProxy`] gathers every proxy accessor under the stable `$`-prefixed
//! names expression authors type (`$json`, `$input`, `$('Node')`, ...). It is
//! both the typed entry point for an expression evaluator and the member
//! catalogue the completion engine enumerates.

use flowscope_types::ExecutionItem;
use serde_json::{Map as JsonMap, Value};

use crate::context::ContextValue;
use crate::error::ProxyError;
use crate::proxy::{OutputQuery, WorkflowDataProxy};

/// How a member is used in a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    /// Read as a value: `$json`, `.params`.
    Property,
    /// Yields another accessor: `$input`, `$node`.
    Accessor,
    /// Must be called: `$('Node')`, `.first()`.
    Method,
}

/// A named member of the proxy or of one of its accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyMember {
    pub name: &'static str,
    pub kind: MemberKind,
    pub description: &'static str,
}

const fn member(name: &'static str, kind: MemberKind, description: &'static str) -> ProxyMember {
    ProxyMember { name, kind, description }
}

/// Root members in the order editors list them.
pub const ROOT_MEMBERS: &[ProxyMember] = &[
    member("$json", MemberKind::Property, "JSON payload of the current input item"),
    member("$binary", MemberKind::Property, "Binary data of the current input item"),
    member("$input", MemberKind::Accessor, "Input items of the current node"),
    member("$", MemberKind::Method, "Data of another node: $('Node name')"),
    member("$node", MemberKind::Accessor, "Legacy node lookup: $node[\"Node name\"]"),
    member("$items", MemberKind::Method, "Output items of a node: $items(name, output, run)"),
    member("$parameter", MemberKind::Property, "Parameters of the current node"),
    member("$env", MemberKind::Property, "Environment variables"),
    member("$vars", MemberKind::Property, "Workflow variables"),
    member("$workflow", MemberKind::Property, "Workflow id, name, and active flag"),
    member("$execution", MemberKind::Property, "Execution mode and metadata"),
    member("$prevNode", MemberKind::Property, "Node, output, and run that fed the current node"),
    member("$runIndex", MemberKind::Property, "Index of the current run"),
    member("$itemIndex", MemberKind::Property, "Index of the current input item"),
    member("$mode", MemberKind::Property, "Execution mode"),
];

pub const INPUT_MEMBERS: &[ProxyMember] = &[
    member("item", MemberKind::Property, "The current input item"),
    member("first", MemberKind::Method, "First input item"),
    member("last", MemberKind::Method, "Last input item"),
    member("all", MemberKind::Method, "All input items"),
    member("params", MemberKind::Property, "Parameters of the current node"),
];

pub const NODE_MEMBERS: &[ProxyMember] = &[
    member("item", MemberKind::Property, "Item paired with the current input item"),
    member("first", MemberKind::Method, "First output item: first(output?, run?)"),
    member("last", MemberKind::Method, "Last output item: last(output?, run?)"),
    member("all", MemberKind::Method, "All output items: all(output?, run?)"),
    member("json", MemberKind::Property, "JSON of the output item at the current index"),
    member("binary", MemberKind::Property, "Binary data of the output item at the current index"),
    member("parameter", MemberKind::Property, "Parameters of the node"),
    member("params", MemberKind::Property, "Parameters of the node"),
    member("runIndex", MemberKind::Property, "Latest run index of the node"),
    member("isExecuted", MemberKind::Property, "Whether the node has run"),
];

/// An intermediate reference that still needs a member selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessorKind {
    /// `$input`
    Input,
    /// `$node`, indexed by node name.
    NodeTable,
    /// `$('Name')` or `$node["Name"]`
    Node(String),
}

impl AccessorKind {
    /// Members selectable on this accessor; the node table lists node names instead.
    pub fn members(&self) -> &'static [ProxyMember] {
        match self {
            Self::Input => INPUT_MEMBERS,
            Self::Node(_) => NODE_MEMBERS,
            Self::NodeTable => &[],
        }
    }

    fn label(&self) -> String {
        match self {
            Self::Input => "$input".to_string(),
            Self::NodeTable => "$node".to_string(),
            Self::Node(name) => format!("$('{name}')"),
        }
    }
}

/// Outcome of resolving a (possibly partial) reference.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Value(ContextValue),
    Accessor(AccessorKind),
}

impl From<ContextValue> for Resolution {
    fn from(value: ContextValue) -> Self {
        Self::Value(value)
    }
}

impl From<Value> for Resolution {
    fn from(value: Value) -> Self {
        Self::Value(ContextValue::Defined(value))
    }
}

fn items_to_value(items: &[ExecutionItem]) -> Value {
    Value::Array(items.iter().map(ExecutionItem::to_value).collect())
}

/// Composite accessor over a [`WorkflowDataProxy`].
#[derive(Debug, Clone, Copy)]
pub struct DataProxy<'p, 'a> {
    proxy: &'p WorkflowDataProxy<'a>,
}

impl<'p, 'a> DataProxy<'p, 'a> {
    pub(crate) fn new(proxy: &'p WorkflowDataProxy<'a>) -> Self {
        Self { proxy }
    }

    /// Root member catalogue.
    pub fn members() -> &'static [ProxyMember] {
        ROOT_MEMBERS
    }

    /// `$json`
    pub fn json(&self) -> Result<&'a JsonMap<String, Value>, ProxyError> {
        Ok(&self.proxy.current_item()?.json)
    }

    /// `$binary`
    pub fn binary(&self) -> Result<ContextValue, ProxyError> {
        Ok(self.proxy.current_item()?.binary.clone().into())
    }

    /// `$input`
    pub fn input(&self) -> InputAccessor<'p, 'a> {
        InputAccessor { proxy: self.proxy }
    }

    /// `$('name')` / `$node["name"]`
    pub fn node(&self, name: &str) -> Result<NodeAccessor<'p, 'a>, ProxyError> {
        if !self.proxy.workflow.contains_node(name) {
            return Err(ProxyError::unknown_node(name));
        }
        Ok(NodeAccessor {
            proxy: self.proxy,
            name: name.to_string(),
        })
    }

    /// `$items(name?, output?, run?)`; without a name, the current input items.
    pub fn items(&self, node: Option<&str>, branch: Option<usize>, run: Option<usize>) -> Result<&'a [ExecutionItem], ProxyError> {
        let Some(node) = node else {
            return self.proxy.input_items();
        };
        let query = OutputQuery {
            port: None,
            branch,
            run,
        };
        self.proxy.node_output(node, query)
    }

    /// `$parameter`
    pub fn parameter(&self) -> Result<JsonMap<String, Value>, ProxyError> {
        self.proxy.node_parameters(&self.proxy.cursor.node_name)
    }

    /// `$env.<name>`
    pub fn env(&self, name: &str) -> ContextValue {
        self.proxy.env_value(name)
    }

    /// Resolves a non-method root member, or a bare context key.
    pub fn get(&self, name: &str) -> Result<Resolution, ProxyError> {
        let proxy = self.proxy;
        let resolution = match name {
            "$json" => Value::Object(self.json()?.clone()).into(),
            "$binary" => self.binary()?.into(),
            "$input" => Resolution::Accessor(AccessorKind::Input),
            "$node" => Resolution::Accessor(AccessorKind::NodeTable),
            "$parameter" => Value::Object(self.parameter()?).into(),
            "$env" => self.env_object().into(),
            "$vars" => proxy.variables().into(),
            "$workflow" => proxy.workflow_info().into(),
            "$execution" => proxy.execution_info().into(),
            "$prevNode" => proxy.previous_node().into(),
            "$runIndex" => Value::from(proxy.cursor.run_index).into(),
            "$itemIndex" => Value::from(proxy.cursor.item_index).into(),
            "$mode" => Value::String(proxy.cursor.mode.to_string()).into(),
            "$" | "$items" => {
                return Err(ProxyError::invalid_reference(name, format!("'{name}' must be called")));
            }
            other if other.starts_with('$') => {
                return Err(ProxyError::invalid_reference(name, format!("unknown accessor '{other}'")));
            }
            key => proxy.context_value(key, None).into(),
        };
        Ok(resolution)
    }

    /// Resolves a called root member: `$('name')` or `$items(...)`.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Resolution, ProxyError> {
        match name {
            "$" => {
                let node = string_arg(name, args, 0)?
                    .ok_or_else(|| ProxyError::invalid_reference(name, "expected a node name: $('Node name')"))?;
                Ok(Resolution::Accessor(AccessorKind::Node(self.node(node)?.name)))
            }
            "$items" => {
                let node = string_arg(name, args, 0)?;
                let branch = index_arg(name, args, 1)?;
                let run = index_arg(name, args, 2)?;
                Ok(items_to_value(self.items(node, branch, run)?).into())
            }
            other => Err(ProxyError::invalid_reference(other, format!("'{other}' is not callable"))),
        }
    }

    /// Selects `name` on an accessor; `args` is `Some` when the member was called.
    pub fn member(&self, accessor: &AccessorKind, name: &str, args: Option<&[Value]>) -> Result<Resolution, ProxyError> {
        let node_name = match accessor {
            AccessorKind::NodeTable if args.is_some() => {
                return Err(ProxyError::invalid_reference(name, "node names are not callable"));
            }
            AccessorKind::NodeTable => return Ok(Resolution::Accessor(AccessorKind::Node(self.node(name)?.name))),
            AccessorKind::Input => None,
            AccessorKind::Node(node_name) => Some(node_name),
        };

        let Some(declared) = accessor.members().iter().find(|member| member.name == name) else {
            return Err(ProxyError::invalid_reference(
                name,
                format!("{} has no member '{name}'", accessor.label()),
            ));
        };
        match (declared.kind, args) {
            (MemberKind::Method, None) => {
                return Err(ProxyError::invalid_reference(name, format!("'{name}' is a method; call it as {name}()")));
            }
            (MemberKind::Property | MemberKind::Accessor, Some(_)) => {
                return Err(ProxyError::invalid_reference(name, format!("'{name}' is not callable")));
            }
            _ => {}
        }
        let args = args.unwrap_or_default();

        match node_name {
            None => {
                let input = self.input();
                let resolution = match name {
                    "item" => input.item()?.to_value().into(),
                    "first" => input.first()?.to_value().into(),
                    "last" => input.last()?.to_value().into(),
                    "all" => items_to_value(input.all()?).into(),
                    _ => Value::Object(input.params()?).into(),
                };
                Ok(resolution)
            }
            Some(node_name) => {
                let node = self.node(node_name)?;
                let query = || -> Result<OutputQuery, ProxyError> {
                    Ok(OutputQuery {
                        port: None,
                        branch: index_arg(name, args, 0)?,
                        run: index_arg(name, args, 1)?,
                    })
                };
                let resolution = match name {
                    "item" => node.item()?.to_value().into(),
                    "first" => node.first(query()?)?.to_value().into(),
                    "last" => node.last(query()?)?.to_value().into(),
                    "all" => items_to_value(node.all(query()?)?).into(),
                    "json" => Value::Object(node.json()?.clone()).into(),
                    "binary" => node.binary()?.into(),
                    "runIndex" => Value::from(node.run_index()?).into(),
                    "isExecuted" => Value::Bool(node.is_executed()).into(),
                    _ => Value::Object(node.parameter()?).into(),
                };
                Ok(resolution)
            }
        }
    }

    fn env_object(&self) -> ContextValue {
        let settings = &self.proxy.settings;
        if settings.block_env_access {
            return ContextValue::Undefined;
        }
        let variables = settings
            .environment
            .iter()
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect::<JsonMap<_, _>>();
        ContextValue::Defined(Value::Object(variables))
    }
}

fn string_arg<'v>(member: &str, args: &'v [Value], position: usize) -> Result<Option<&'v str>, ProxyError> {
    match args.get(position) {
        None => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.as_str())),
        Some(other) => Err(ProxyError::invalid_reference(
            member,
            format!("argument {} must be a string, got {other}", position + 1),
        )),
    }
}

fn index_arg(member: &str, args: &[Value], position: usize) -> Result<Option<usize>, ProxyError> {
    match args.get(position) {
        None => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(|index| usize::try_from(index).ok())
            .map(Some)
            .ok_or_else(|| {
                ProxyError::invalid_reference(
                    member,
                    format!("argument {} must be a non-negative integer, got {value}", position + 1),
                )
            }),
    }
}

/// `$input`
#[derive(Debug, Clone, Copy)]
pub struct InputAccessor<'p, 'a> {
    proxy: &'p WorkflowDataProxy<'a>,
}

impl<'a> InputAccessor<'_, 'a> {
    pub fn item(&self) -> Result<&'a ExecutionItem, ProxyError> {
        self.proxy.current_item()
    }

    pub fn first(&self) -> Result<&'a ExecutionItem, ProxyError> {
        self.proxy.input_item(0)
    }

    pub fn last(&self) -> Result<&'a ExecutionItem, ProxyError> {
        let items = self.proxy.input_items()?;
        self.proxy.input_item(items.len().saturating_sub(1))
    }

    pub fn all(&self) -> Result<&'a [ExecutionItem], ProxyError> {
        self.proxy.input_items()
    }

    pub fn params(&self) -> Result<JsonMap<String, Value>, ProxyError> {
        self.proxy.node_parameters(&self.proxy.cursor.node_name)
    }
}

/// `$('name')` / `$node["name"]`
#[derive(Debug, Clone)]
pub struct NodeAccessor<'p, 'a> {
    proxy: &'p WorkflowDataProxy<'a>,
    name: String,
}

impl<'a> NodeAccessor<'_, 'a> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Item paired with the current input item.
    pub fn item(&self) -> Result<&'a ExecutionItem, ProxyError> {
        self.proxy.paired_item(&self.name, self.proxy.cursor.item_index)
    }

    pub fn first(&self, query: OutputQuery) -> Result<&'a ExecutionItem, ProxyError> {
        self.proxy.node_item(&self.name, query, 0)
    }

    pub fn last(&self, query: OutputQuery) -> Result<&'a ExecutionItem, ProxyError> {
        let items = self.proxy.node_output(&self.name, query)?;
        items
            .last()
            .ok_or_else(|| ProxyError::out_of_range(&self.name, 0, 0))
    }

    pub fn all(&self, query: OutputQuery) -> Result<&'a [ExecutionItem], ProxyError> {
        self.proxy.node_output(&self.name, query)
    }

    /// JSON of the latest-run output item at the cursor's item index.
    pub fn json(&self) -> Result<&'a JsonMap<String, Value>, ProxyError> {
        let item = self
            .proxy
            .node_item(&self.name, OutputQuery::default(), self.proxy.cursor.item_index)?;
        Ok(&item.json)
    }

    pub fn binary(&self) -> Result<ContextValue, ProxyError> {
        let item = self
            .proxy
            .node_item(&self.name, OutputQuery::default(), self.proxy.cursor.item_index)?;
        Ok(item.binary.clone().into())
    }

    pub fn parameter(&self) -> Result<JsonMap<String, Value>, ProxyError> {
        self.proxy.node_parameters(&self.name)
    }

    pub fn run_index(&self) -> Result<usize, ProxyError> {
        self.proxy
            .latest_run_index(&self.name)
            .ok_or_else(|| ProxyError::no_run_data(&self.name, self.proxy.cursor.run_index))
    }

    pub fn is_executed(&self) -> bool {
        self.proxy.run_data.has_run(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixture_snapshot;
    use serde_json::json;

    #[test]
    fn root_members_have_unique_names() {
        let mut names = DataProxy::members().iter().map(|member| member.name).collect::<Vec<_>>();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
        assert!(names.contains(&"$json"));
        assert!(names.contains(&"$items"));
    }

    #[test]
    fn typed_accessors_match_fixture() {
        let prepared = fixture_snapshot();
        let proxy = prepared.session(Default::default()).expect("proxy");
        let data = proxy.data_proxy();

        let json = data.json().expect("$json");
        assert_eq!(json["obj"], json!({ "a": "hello" }));

        let function = data.node("Function").expect("node accessor");
        assert!(function.is_executed());
        assert_eq!(function.run_index(), Ok(0));
        assert_eq!(function.all(OutputQuery::default()).map(<[ExecutionItem]>::len), Ok(5));
        assert_eq!(function.last(OutputQuery::default()).map(|item| item.json["initialName"].clone()), Ok(json!(950)));
        assert_eq!(function.json().map(|json| json["initialName"].clone()), Ok(json!(105)));

        assert_eq!(data.input().last().map(|item| item.json["data"].clone()), Ok(json!(950)));
        assert_eq!(data.items(Some("Rename"), None, Some(0)).map(<[ExecutionItem]>::len), Ok(5));
        assert!(matches!(data.node("Missing"), Err(ProxyError::UnknownNode { .. })));
    }

    #[test]
    fn parameters_include_type_defaults() {
        let prepared = fixture_snapshot();
        let proxy = prepared.session(Default::default()).expect("proxy");
        let data = proxy.data_proxy();

        let end = data.parameter().expect("$parameter");
        assert_eq!(end["value1"], json!("default-value1"));

        let rename = data.node("Rename").and_then(|node| node.parameter()).expect("Rename params");
        assert_eq!(rename["value1"], json!("data"));
        assert_eq!(rename["value2"], json!("initialName"));
    }

    #[test]
    fn methods_must_be_called_and_properties_must_not() {
        let prepared = fixture_snapshot();
        let proxy = prepared.session(Default::default()).expect("proxy");
        let data = proxy.data_proxy();

        assert!(matches!(
            data.member(&AccessorKind::Input, "first", None),
            Err(ProxyError::InvalidReference { .. })
        ));
        assert!(matches!(
            data.member(&AccessorKind::Input, "item", Some(&[])),
            Err(ProxyError::InvalidReference { .. })
        ));
        assert!(matches!(data.get("$items"), Err(ProxyError::InvalidReference { .. })));
        assert!(matches!(data.get("$nope"), Err(ProxyError::InvalidReference { .. })));
    }

    #[test]
    fn bare_keys_fall_back_to_context_lookup() {
        let prepared = fixture_snapshot();
        let proxy = prepared.session(Default::default()).expect("proxy");
        assert_eq!(proxy.data_proxy().get("anything"), Ok(Resolution::Value(ContextValue::Undefined)));
    }
}
