//! Workflow graph definitions.
//!
//! A [`Workflow`] is only obtainable through validation: node names are
//! unique, the connection table references existing nodes only, and every
//! node's type is known to the supplied [`NodeTypeRegistry`]. Nodes keep
//! authoring order (via `IndexMap`) so listings and completions are stable.

pub mod validation;

use std::collections::{HashSet, VecDeque};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use thiserror::Error;
use uuid::Uuid;

use crate::node_types::NodeTypeRegistry;

/// Outputs of one source node: connection type -> output index -> consumers.
pub type NodeConnections = IndexMap<String, Vec<Vec<Connection>>>;

/// Connection table keyed by source node name.
pub type Connections = IndexMap<String, NodeConnections>;

/// A unit of work in the workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Stable identifier, independent of the display name.
    #[serde(default)]
    pub id: String,
    /// Name unique within the workflow; used by every reference.
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default = "default_type_version")]
    pub type_version: f64,
    /// Static parameters; values may be literals or expressions.
    #[serde(default)]
    pub parameters: JsonMap<String, JsonValue>,
    /// Canvas position; display only.
    #[serde(default)]
    pub position: [f64; 2],
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,
}

fn default_type_version() -> f64 {
    1.0
}

impl Node {
    /// Creates a node with a freshly generated v4 UUID identifier.
    pub fn new(name: impl Into<String>, node_type: impl Into<String>, type_version: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            node_type: node_type.into(),
            type_version,
            parameters: JsonMap::new(),
            position: [0.0, 0.0],
            disabled: false,
        }
    }
}

/// Directed edge from a source output to a destination input slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Connection {
    /// Destination node name.
    pub node: String,
    /// Connection type, normally `main`.
    #[serde(rename = "type", default = "default_connection_type")]
    pub connection_type: String,
    /// Destination input slot.
    #[serde(default)]
    pub index: usize,
}

fn default_connection_type() -> String {
    "main".to_string()
}

impl Connection {
    pub fn main(node: impl Into<String>, index: usize) -> Self {
        Self {
            node: node.into(),
            connection_type: default_connection_type(),
            index,
        }
    }
}

/// Raw, unvalidated workflow document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub connections: Connections,
    #[serde(default)]
    pub active: bool,
    /// Registry used to validate node types and supply parameter defaults.
    #[serde(default)]
    pub node_types: NodeTypeRegistry,
}

/// Reasons a workflow definition is rejected.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("Duplicate node name: {name}")]
    DuplicateNode { name: String },

    #[error("Connection from '{source_node}' references unknown node '{node}'")]
    UnknownConnectionNode { node: String, source_node: String },

    #[error("Node '{node}' has unknown type '{node_type}'")]
    UnknownNodeType { node: String, node_type: String },

    #[error("Node '{node}' uses unsupported version {version} of type '{node_type}'")]
    UnsupportedTypeVersion { node: String, node_type: String, version: f64 },
}

/// Validated, immutable workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "WorkflowDefinition", into = "WorkflowDefinition")]
pub struct Workflow {
    id: String,
    name: String,
    nodes: IndexMap<String, Node>,
    connections: Connections,
    active: bool,
    node_types: NodeTypeRegistry,
}

impl Workflow {
    /// Validates `definition` and builds the workflow.
    pub fn new(definition: WorkflowDefinition) -> Result<Self, WorkflowError> {
        let WorkflowDefinition {
            id,
            name,
            nodes,
            connections,
            active,
            node_types,
        } = definition;

        let mut nodes_by_name = IndexMap::with_capacity(nodes.len());
        for node in nodes {
            if nodes_by_name.contains_key(&node.name) {
                return Err(WorkflowError::DuplicateNode { name: node.name });
            }
            nodes_by_name.insert(node.name.clone(), node);
        }

        validation::validate_connections(&nodes_by_name, &connections)?;
        validation::validate_node_types(&nodes_by_name, &node_types)?;

        Ok(Self {
            id,
            name,
            nodes: nodes_by_name,
            connections,
            active,
            node_types,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn connections(&self) -> &Connections {
        &self.connections
    }

    pub fn node_types(&self) -> &NodeTypeRegistry {
        &self.node_types
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    pub fn contains_node(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Nodes in authoring order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Nodes feeding directly into `name`, in connection-table order.
    pub fn direct_parent_names(&self, name: &str) -> Vec<&str> {
        self.connections
            .iter()
            .filter(|(_, outputs)| {
                outputs
                    .values()
                    .flatten()
                    .flatten()
                    .any(|connection| connection.node == name)
            })
            .map(|(source, _)| source.as_str())
            .collect()
    }

    /// Every upstream node of `name`, nearest first, each listed once.
    pub fn parent_node_names(&self, name: &str) -> Vec<&str> {
        let mut visited: HashSet<&str> = HashSet::from([name]);
        let mut queue: VecDeque<&str> = VecDeque::from([name]);
        let mut parents = Vec::new();

        while let Some(current) = queue.pop_front() {
            for parent in self.direct_parent_names(current) {
                if visited.insert(parent) {
                    parents.push(parent);
                    queue.push_back(parent);
                }
            }
        }
        parents
    }

    /// Nodes consuming any output of `name`, each listed once.
    pub fn child_node_names(&self, name: &str) -> Vec<&str> {
        let Some(outputs) = self.connections.get(name) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        outputs
            .values()
            .flatten()
            .flatten()
            .map(|connection| connection.node.as_str())
            .filter(|child| seen.insert(*child))
            .collect()
    }

    /// Static parameters of a node overlaid on its type defaults.
    pub fn node_parameters(&self, name: &str) -> Option<JsonMap<String, JsonValue>> {
        let node = self.node(name)?;
        let mut parameters = self.node_types.default_parameters(&node.node_type);
        for (key, value) in &node.parameters {
            parameters.insert(key.clone(), value.clone());
        }
        Some(parameters)
    }
}

impl TryFrom<WorkflowDefinition> for Workflow {
    type Error = WorkflowError;

    fn try_from(definition: WorkflowDefinition) -> Result<Self, Self::Error> {
        Self::new(definition)
    }
}

impl From<Workflow> for WorkflowDefinition {
    fn from(workflow: Workflow) -> Self {
        Self {
            id: workflow.id,
            name: workflow.name,
            nodes: workflow.nodes.into_values().collect(),
            connections: workflow.connections,
            active: workflow.active,
            node_types: workflow.node_types,
        }
    }
}
