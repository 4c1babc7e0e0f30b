//! Context and environment lookups.
//!
//! These lookups are the one resolution path that never fails: a missing key
//! yields [`ContextValue::Undefined`], which expression authors can keep
//! composing with (`$env.MISSING.length` is still `undefined`).

use std::fmt;

use serde_json::{Map as JsonMap, Value};

/// A resolved value or the explicit absent-value marker.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ContextValue {
    Defined(Value),
    #[default]
    Undefined,
}

impl ContextValue {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Defined(value) => Some(value),
            Self::Undefined => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Defined(value) => Some(value),
            Self::Undefined => None,
        }
    }

    /// Object member access; anything but an object holding `key` is undefined.
    ///
    /// Arrays accept numeric keys, so `items.0` and `items[0]` agree.
    pub fn get(&self, key: &str) -> ContextValue {
        match self.as_value() {
            Some(Value::Object(map)) => map.get(key).cloned().into(),
            Some(Value::Array(_)) => key.parse::<usize>().map_or(Self::Undefined, |index| self.index(index)),
            _ => Self::Undefined,
        }
    }

    pub fn index(&self, index: usize) -> ContextValue {
        match self.as_value() {
            Some(Value::Array(items)) => items.get(index).cloned().into(),
            _ => Self::Undefined,
        }
    }
}

impl From<Value> for ContextValue {
    fn from(value: Value) -> Self {
        Self::Defined(value)
    }
}

impl From<Option<Value>> for ContextValue {
    fn from(value: Option<Value>) -> Self {
        value.map_or(Self::Undefined, Self::Defined)
    }
}

impl fmt::Display for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Defined(Value::String(text)) => f.write_str(text),
            Self::Defined(value) => write!(f, "{value}"),
            Self::Undefined => f.write_str("undefined"),
        }
    }
}

/// Looks `key` up in `layers`, first match wins.
pub(crate) fn lookup_layers(key: &str, layers: &[Option<&JsonMap<String, Value>>]) -> Option<Value> {
    layers
        .iter()
        .flatten()
        .find_map(|layer| layer.get(key))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn member_access_on_missing_paths_stays_undefined() {
        let value = ContextValue::from(json!({ "user": { "name": "Ada" }, "tags": ["a", "b"] }));

        assert_eq!(value.get("user").get("name"), ContextValue::from(json!("Ada")));
        assert_eq!(value.get("tags").get("1"), ContextValue::from(json!("b")));
        assert!(value.get("user").get("email").get("domain").is_undefined());
        assert!(ContextValue::Undefined.get("anything").is_undefined());
        assert!(value.get("tags").index(9).is_undefined());
    }

    #[test]
    fn null_is_defined() {
        let value = ContextValue::from(json!({ "empty": null }));
        assert_eq!(value.get("empty"), ContextValue::Defined(Value::Null));
    }

    #[test]
    fn display_renders_undefined_marker() {
        assert_eq!(ContextValue::Undefined.to_string(), "undefined");
        assert_eq!(ContextValue::from(json!("text")).to_string(), "text");
        assert_eq!(ContextValue::from(json!({ "a": 1 })).to_string(), r#"{"a":1}"#);
    }

    #[test]
    fn lookup_layers_prefers_earlier_layers() {
        let overrides = json!({ "region": "eu" });
        let base = json!({ "region": "us", "tier": "free" });
        let layers = [None, overrides.as_object(), base.as_object()];

        assert_eq!(lookup_layers("region", &layers), Some(json!("eu")));
        assert_eq!(lookup_layers("tier", &layers), Some(json!("free")));
        assert_eq!(lookup_layers("missing", &layers), None);
    }
}
