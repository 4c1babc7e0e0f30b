use flowscope_types::{
    Connection, NodePropertyDescription, NodeTypeDescription, NodeTypeRegistry, Node, Workflow, WorkflowDefinition,
};
use indexmap::IndexMap;
use serde_json::json;

use crate::snapshot::{PreparedSnapshot, ProxySnapshot};

pub(crate) const SET_NODE_TYPE: &str = "n8n-nodes-base.set";

/// Start -> Function -> Rename -> End, cursor on End.
pub(crate) fn fixture_snapshot() -> PreparedSnapshot {
    let snapshot: ProxySnapshot =
        serde_json::from_str(include_str!("../tests/data/autocomplete_snapshot.json")).expect("fixture snapshot");
    snapshot.prepare().expect("prepare fixture")
}

pub(crate) fn set_registry() -> NodeTypeRegistry {
    let property = |name: &str| NodePropertyDescription {
        display_name: name.to_string(),
        name: name.to_string(),
        property_type: "string".to_string(),
        default: json!(format!("default-{name}")),
    };
    NodeTypeRegistry::new().with_type(NodeTypeDescription {
        display_name: "Set".to_string(),
        name: SET_NODE_TYPE.to_string(),
        group: vec!["input".to_string()],
        version: Default::default(),
        description: "Sets a value".to_string(),
        defaults: Default::default(),
        inputs: vec!["main".to_string()],
        outputs: vec!["main".to_string()],
        properties: vec![property("value1"), property("value2")],
    })
}

/// A linear chain of Set nodes connected in the given order.
pub(crate) fn set_workflow(names: &[&str]) -> Workflow {
    let nodes = names
        .iter()
        .map(|name| Node::new(*name, SET_NODE_TYPE, 1.0))
        .collect::<Vec<_>>();
    let connections = names
        .windows(2)
        .map(|pair| {
            let outputs = IndexMap::from([("main".to_string(), vec![vec![Connection::main(pair[1], 0)]])]);
            (pair[0].to_string(), outputs)
        })
        .collect();

    Workflow::new(WorkflowDefinition {
        id: "test".to_string(),
        name: "test workflow".to_string(),
        nodes,
        connections,
        active: false,
        node_types: set_registry(),
    })
    .expect("valid workflow")
}
