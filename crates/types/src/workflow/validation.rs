//! Structural checks applied when a workflow definition is accepted.

use indexmap::IndexMap;

use super::{Connections, Node, WorkflowError};
use crate::node_types::NodeTypeRegistry;

/// Ensure every node named in the connection table exists.
///
/// Both the source key and each destination must be present in `nodes`.
pub fn validate_connections(nodes: &IndexMap<String, Node>, connections: &Connections) -> Result<(), WorkflowError> {
    for (source_node, outputs) in connections {
        if !nodes.contains_key(source_node) {
            return Err(WorkflowError::UnknownConnectionNode {
                node: source_node.clone(),
                source_node: source_node.clone(),
            });
        }
        let dangling = outputs
            .values()
            .flatten()
            .flatten()
            .find(|connection| !nodes.contains_key(&connection.node));
        if let Some(connection) = dangling {
            return Err(WorkflowError::UnknownConnectionNode {
                node: connection.node.clone(),
                source_node: source_node.clone(),
            });
        }
    }
    Ok(())
}

/// Ensure every node's type is registered and accepts the node's version.
pub fn validate_node_types(nodes: &IndexMap<String, Node>, registry: &NodeTypeRegistry) -> Result<(), WorkflowError> {
    for node in nodes.values() {
        let Some(description) = registry.get(&node.node_type) else {
            return Err(WorkflowError::UnknownNodeType {
                node: node.name.clone(),
                node_type: node.node_type.clone(),
            });
        };
        if !description.version.supports(node.type_version) {
            return Err(WorkflowError::UnsupportedTypeVersion {
                node: node.name.clone(),
                node_type: node.node_type.clone(),
                version: node.type_version,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_types::{NodeTypeDescription, NodeTypeVersion};
    use crate::workflow::Connection;
    use indexmap::indexmap;

    fn node(name: &str, version: f64) -> (String, Node) {
        (name.to_string(), Node::new(name, "n8n-nodes-base.set", version))
    }

    fn registry() -> NodeTypeRegistry {
        NodeTypeRegistry::new().with_type(NodeTypeDescription {
            display_name: "Set".into(),
            name: "n8n-nodes-base.set".into(),
            group: vec!["input".into()],
            version: NodeTypeVersion::Single(1.0),
            description: "Sets a value".into(),
            defaults: Default::default(),
            inputs: vec!["main".into()],
            outputs: vec!["main".into()],
            properties: Vec::new(),
        })
    }

    #[test]
    fn unknown_source_node_is_reported() {
        let nodes: IndexMap<String, Node> = [node("End", 1.0)].into_iter().collect();
        let connections: Connections = indexmap! {
            "Start".to_string() => indexmap! { "main".to_string() => vec![vec![Connection::main("End", 0)]] }
        };

        let error = validate_connections(&nodes, &connections).expect_err("unknown source");
        assert_eq!(
            error,
            WorkflowError::UnknownConnectionNode {
                node: "Start".into(),
                source_node: "Start".into()
            }
        );
    }

    #[test]
    fn version_mismatch_is_reported() {
        let nodes: IndexMap<String, Node> = [node("Start", 1.0), node("Rename", 2.0)].into_iter().collect();

        let error = validate_node_types(&nodes, &registry()).expect_err("version 2 unsupported");
        assert!(matches!(error, WorkflowError::UnsupportedTypeVersion { ref node, .. } if node == "Rename"));
        assert!(validate_node_types(&nodes, &NodeTypeRegistry::new()).is_err());
    }
}
