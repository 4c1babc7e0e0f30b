//! Node type registry.
//!
//! The registry is an immutable lookup table built before any workflow is
//! validated. It is passed explicitly to [`Workflow`](crate::Workflow)
//! construction rather than living in process-wide state, so independent
//! sessions never observe each other's registrations.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use thiserror::Error;

/// Version(s) a node type implementation understands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum NodeTypeVersion {
    /// A single supported version (for example, `1`).
    Single(f64),
    /// Several supported versions (for example, `[1, 1.1, 2]`).
    Multiple(Vec<f64>),
}

impl NodeTypeVersion {
    /// Returns true when `version` is one of the declared versions.
    pub fn supports(&self, version: f64) -> bool {
        match self {
            Self::Single(declared) => *declared == version,
            Self::Multiple(declared) => declared.contains(&version),
        }
    }
}

impl Default for NodeTypeVersion {
    fn default() -> Self {
        Self::Single(1.0)
    }
}

/// Defaults applied to freshly created nodes of a type.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeTypeDefaults {
    /// Default node name.
    #[serde(default)]
    pub name: String,
    /// Display colour used by editors.
    #[serde(default)]
    pub color: Option<String>,
}

/// A single declared parameter of a node type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodePropertyDescription {
    /// Label shown to authors.
    #[serde(default)]
    pub display_name: String,
    /// Parameter key inside `Node::parameters`.
    pub name: String,
    /// Declared value type (`string`, `number`, `boolean`, ...).
    #[serde(rename = "type", default)]
    pub property_type: String,
    /// Value used when a node does not set the parameter.
    #[serde(default)]
    pub default: JsonValue,
}

/// Static description of a node type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeTypeDescription {
    #[serde(default)]
    pub display_name: String,
    /// Canonical type name referenced by `Node::node_type`.
    ///
    /// May be omitted inside a registry, which then fills it from the entry key.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub group: Vec<String>,
    #[serde(default)]
    pub version: NodeTypeVersion,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub defaults: NodeTypeDefaults,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Declared parameters, in authoring order.
    #[serde(default)]
    pub properties: Vec<NodePropertyDescription>,
}

/// A registry entry keyed by a type name that its description contradicts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("node type registered as '{key}' describes '{name}'")]
pub struct NodeTypeKeyMismatch {
    pub key: String,
    pub name: String,
}

/// One registry entry as stored: either the loaded-type envelope
/// `{ "sourcePath": ..., "type": { "description": {...} } }` or a bare description.
#[derive(Deserialize)]
#[serde(untagged)]
enum NodeTypeEntry {
    Loaded {
        #[serde(rename = "type")]
        loaded: LoadedNodeType,
    },
    Description(NodeTypeDescription),
}

#[derive(Deserialize)]
struct LoadedNodeType {
    description: NodeTypeDescription,
}

impl NodeTypeEntry {
    fn into_description(self) -> NodeTypeDescription {
        match self {
            Self::Loaded { loaded } => loaded.description,
            Self::Description(description) => description,
        }
    }
}

/// Immutable table of known node types keyed by type name.
///
/// Entries are always keyed by [`NodeTypeDescription::name`]; a stored key
/// that disagrees with its description is rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(
    try_from = "IndexMap<String, NodeTypeEntry>",
    into = "IndexMap<String, NodeTypeDescription>"
)]
pub struct NodeTypeRegistry {
    types: IndexMap<String, NodeTypeDescription>,
}

impl TryFrom<IndexMap<String, NodeTypeEntry>> for NodeTypeRegistry {
    type Error = NodeTypeKeyMismatch;

    fn try_from(entries: IndexMap<String, NodeTypeEntry>) -> Result<Self, Self::Error> {
        let mut registry = Self::new();
        for (key, entry) in entries {
            let mut description = entry.into_description();
            if description.name.is_empty() {
                description.name.clone_from(&key);
            } else if description.name != key {
                return Err(NodeTypeKeyMismatch {
                    key,
                    name: description.name,
                });
            }
            registry = registry.with_type(description);
        }
        Ok(registry)
    }
}

impl From<NodeTypeRegistry> for IndexMap<String, NodeTypeDescription> {
    fn from(registry: NodeTypeRegistry) -> Self {
        registry.types
    }
}

impl NodeTypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the registry extended with `description`, replacing any entry with the same name.
    pub fn with_type(mut self, description: NodeTypeDescription) -> Self {
        self.types.insert(description.name.clone(), description);
        self
    }

    pub fn get(&self, type_name: &str) -> Option<&NodeTypeDescription> {
        self.types.get(type_name)
    }

    /// Returns true when the type is registered and accepts `version`.
    pub fn supports(&self, type_name: &str, version: f64) -> bool {
        self.get(type_name)
            .is_some_and(|description| description.version.supports(version))
    }

    /// Default parameter values declared by the type, in declaration order.
    ///
    /// Unknown types yield an empty map.
    pub fn default_parameters(&self, type_name: &str) -> JsonMap<String, JsonValue> {
        let Some(description) = self.get(type_name) else {
            return JsonMap::new();
        };
        description
            .properties
            .iter()
            .map(|property| (property.name.clone(), property.default.clone()))
            .collect()
    }
}

impl FromIterator<NodeTypeDescription> for NodeTypeRegistry {
    fn from_iter<I: IntoIterator<Item = NodeTypeDescription>>(iter: I) -> Self {
        let types = iter
            .into_iter()
            .map(|description| (description.name.clone(), description))
            .collect();
        Self { types }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn set_type() -> NodeTypeDescription {
        serde_json::from_value(json!({
            "displayName": "Set",
            "name": "n8n-nodes-base.set",
            "group": ["input"],
            "version": 1,
            "description": "Sets a value",
            "defaults": { "name": "Set", "color": "#0000FF" },
            "inputs": ["main"],
            "outputs": ["main"],
            "properties": [
                { "displayName": "Value1", "name": "value1", "type": "string", "default": "default-value1" },
                { "displayName": "Value2", "name": "value2", "type": "string", "default": "default-value2" }
            ]
        }))
        .expect("valid node type description")
    }

    #[test]
    fn default_parameters_follow_declaration_order() {
        let registry = NodeTypeRegistry::new().with_type(set_type());
        let defaults = registry.default_parameters("n8n-nodes-base.set");
        let keys = defaults.keys().cloned().collect::<Vec<_>>();
        assert_eq!(keys, vec!["value1".to_string(), "value2".to_string()]);
        assert_eq!(defaults["value1"], json!("default-value1"));
    }

    #[test]
    fn unknown_type_has_no_defaults() {
        let registry = NodeTypeRegistry::new().with_type(set_type());
        assert!(registry.default_parameters("n8n-nodes-base.noOp").is_empty());
    }

    #[test]
    fn supports_checks_declared_versions() {
        let mut description = set_type();
        assert!(NodeTypeRegistry::new().with_type(description.clone()).supports("n8n-nodes-base.set", 1.0));

        description.version = NodeTypeVersion::Multiple(vec![1.0, 2.0]);
        let registry = NodeTypeRegistry::new().with_type(description);
        assert!(registry.supports("n8n-nodes-base.set", 2.0));
        assert!(!registry.supports("n8n-nodes-base.set", 3.0));
        assert!(!registry.supports("n8n-nodes-base.if", 1.0));
    }

    #[test]
    fn registry_accepts_loaded_type_envelopes() {
        let registry: NodeTypeRegistry = serde_json::from_value(json!({
            "n8n-nodes-base.set": {
                "sourcePath": "",
                "type": {
                    "description": {
                        "displayName": "Set",
                        "name": "n8n-nodes-base.set",
                        "group": ["input"],
                        "version": 1,
                        "description": "Sets a value",
                        "defaults": { "name": "Set", "color": "#0000FF" },
                        "inputs": ["main"],
                        "outputs": ["main"],
                        "properties": [
                            { "displayName": "Value1", "name": "value1", "type": "string", "default": "default-value1" }
                        ]
                    }
                }
            },
            "n8n-nodes-base.noOp": { "displayName": "No Operation" }
        }))
        .expect("registry");

        assert_eq!(registry.get("n8n-nodes-base.set"), Some(&set_type_with_one_property()));
        assert_eq!(
            registry.get("n8n-nodes-base.noOp").map(|description| description.name.as_str()),
            Some("n8n-nodes-base.noOp")
        );
        assert!(registry.supports("n8n-nodes-base.noOp", 1.0));
    }

    #[test]
    fn registry_rejects_keys_that_contradict_the_description() {
        let error = serde_json::from_value::<NodeTypeRegistry>(json!({
            "n8n-nodes-base.if": { "type": { "description": { "name": "n8n-nodes-base.set" } } }
        }))
        .expect_err("mismatched key");
        assert!(error.to_string().contains("registered as 'n8n-nodes-base.if'"));
    }

    fn set_type_with_one_property() -> NodeTypeDescription {
        let mut description = set_type();
        description.properties.truncate(1);
        description
    }
}
