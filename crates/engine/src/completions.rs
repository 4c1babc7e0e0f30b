//! Autocompletion for reference paths.
//!
//! [`complete`] looks at the text before the caret, finds the reference being
//! typed, and proposes what may follow. Each suggestion's `insert_text`
//! replaces the word being typed: the text after the last `.`, after an
//! opening quote, or the whole `$`-word.
//!
//! The reference being typed starts at the last `$` outside a quoted string,
//! so node names such as `Pay $5` do not split it.

use flowscope_types::{ItemKind, SuggestionItem};
use serde_json::Value;
use tracing::debug;

use crate::accessor::{AccessorKind, DataProxy, MemberKind, ProxyMember, Resolution};
use crate::context::ContextValue;
use crate::proxy::WorkflowDataProxy;
use crate::reference::resolve_reference;

const PREFIX_MATCH: i64 = 10_000;
const SUBSEQUENCE_MATCH: i64 = 5_000;
const UPSTREAM_NODE: i64 = 1_000;

/// Ranked suggestions for `partial`, the text before the caret.
///
/// Anything that fails to resolve yields no suggestions.
pub fn complete(proxy: &WorkflowDataProxy<'_>, partial: &str) -> Vec<SuggestionItem> {
    let Some(start) = reference_start(partial) else {
        return Vec::new();
    };
    let fragment = &partial[start..];

    let mut suggestions = if let Some(selector) = node_name_context(fragment) {
        let NodeSelector {
            needle,
            quote,
            quote_typed,
            closer,
        } = selector;
        let opening = if quote_typed { String::new() } else { quote.to_string() };
        node_suggestions(proxy, needle, |name| Some(format!("{opening}{name}{quote}{closer}")))
    } else if !fragment.contains(['.', '[', '(']) {
        member_suggestions(DataProxy::members(), fragment, true)
    } else if let Some((base, needle)) = fragment.rsplit_once('.') {
        if !needle.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Vec::new();
        }
        match resolve_reference(proxy, base) {
            // `$node.Name` only reaches names that are plain identifiers.
            Ok(Resolution::Accessor(AccessorKind::NodeTable)) => {
                node_suggestions(proxy, needle, |name| is_identifier(name).then(|| name.to_string()))
            }
            Ok(Resolution::Accessor(kind)) => member_suggestions(kind.members(), needle, false),
            Ok(Resolution::Value(ContextValue::Defined(Value::Object(fields)))) => fields
                .iter()
                .filter_map(|(key, value)| {
                    suggestion(key, key.clone(), ItemKind::Field, Some(json_type(value).to_string()), needle)
                })
                .collect(),
            Ok(_) => Vec::new(),
            Err(error) => {
                debug!(%error, base, "no completions for unresolved base");
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };

    suggestions.sort_by(|left, right| right.score.cmp(&left.score).then_with(|| left.display.cmp(&right.display)));
    suggestions
}

/// A node-name selector being typed: `$('Na`, `$("Na`, `$(`, `$node["Na`.
#[derive(Debug, Clone, Copy)]
struct NodeSelector<'f> {
    needle: &'f str,
    quote: char,
    /// False for a bare `$(`; the suggestion then supplies the opening quote.
    quote_typed: bool,
    closer: &'static str,
}

fn node_name_context(fragment: &str) -> Option<NodeSelector<'_>> {
    let (rest, closer) = if let Some(rest) = fragment.strip_prefix("$(") {
        (rest, ")")
    } else if let Some(rest) = fragment.strip_prefix("$node[") {
        (rest, "]")
    } else {
        return None;
    };
    let mut chars = rest.chars();
    match chars.next() {
        None => Some(NodeSelector {
            needle: "",
            quote: '\'',
            quote_typed: false,
            closer,
        }),
        Some(quote @ ('\'' | '"')) => {
            let needle = chars.as_str();
            (!needle.contains(quote)).then_some(NodeSelector {
                needle,
                quote,
                quote_typed: true,
                closer,
            })
        }
        Some(_) => None,
    }
}

/// Byte offset of the last `$` outside quotes, or of the last `$` when every one is quoted.
fn reference_start(partial: &str) -> Option<usize> {
    let mut quote = None;
    let mut start = None;
    for (offset, c) in partial.char_indices() {
        match quote {
            Some(open) if c == open => quote = None,
            Some(_) => {}
            None if matches!(c, '\'' | '"') => quote = Some(c),
            None if c == '$' => start = Some(offset),
            None => {}
        }
    }
    start.or_else(|| partial.rfind('$'))
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_')
}

/// Other nodes of the workflow; `insert` renders a name, or skips it with `None`.
fn node_suggestions(proxy: &WorkflowDataProxy<'_>, needle: &str, insert: impl Fn(&str) -> Option<String>) -> Vec<SuggestionItem> {
    let workflow = proxy.workflow();
    let active = proxy.cursor().node_name.as_str();
    let upstream = workflow.parent_node_names(active);

    workflow
        .nodes()
        .filter(|node| node.name != active)
        .filter_map(|node| {
            let insert_text = insert(&node.name)?;
            let mut item = suggestion(&node.name, insert_text, ItemKind::Node, Some(node.node_type.clone()), needle)?;
            if upstream.contains(&node.name.as_str()) {
                item.score += UPSTREAM_NODE;
            }
            Some(item)
        })
        .collect()
}

fn member_suggestions(members: &[ProxyMember], needle: &str, root: bool) -> Vec<SuggestionItem> {
    members
        .iter()
        .filter_map(|member| {
            let (kind, insert_text) = match member.kind {
                MemberKind::Method if root => (ItemKind::Method, format!("{}(", member.name)),
                MemberKind::Method => (ItemKind::Method, format!("{}()", member.name)),
                MemberKind::Accessor => (ItemKind::Accessor, member.name.to_string()),
                MemberKind::Property if root => (ItemKind::Accessor, member.name.to_string()),
                MemberKind::Property => (ItemKind::Field, member.name.to_string()),
            };
            suggestion(member.name, insert_text, kind, Some(member.description.to_string()), needle)
        })
        .collect()
}

fn suggestion(label: &str, insert_text: String, kind: ItemKind, meta: Option<String>, needle: &str) -> Option<SuggestionItem> {
    let score = match_score(label, needle)?;
    let display = match kind {
        ItemKind::Method => format!("{label}()"),
        _ => label.to_string(),
    };
    Some(SuggestionItem {
        display,
        insert_text,
        kind,
        meta,
        score,
    })
}

/// Case-insensitive: prefix matches outrank subsequence matches, shorter labels win within a tier.
fn match_score(label: &str, needle: &str) -> Option<i64> {
    let label_lower = label.to_lowercase();
    let needle_lower = needle.to_lowercase();
    let length_penalty = i64::try_from(label.chars().count()).unwrap_or(i64::MAX).min(999);

    if label_lower.starts_with(&needle_lower) {
        return Some(PREFIX_MATCH - length_penalty);
    }
    let mut remaining = label_lower.chars();
    let is_subsequence = needle_lower.chars().all(|wanted| remaining.any(|c| c == wanted));
    is_subsequence.then_some(SUBSEQUENCE_MATCH - length_penalty)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::ProxyParams;
    use crate::settings::ProxySettings;
    use crate::test_support::{fixture_snapshot, set_workflow};
    use flowscope_types::RunExecutionData;

    fn displays(suggestions: &[SuggestionItem]) -> Vec<&str> {
        suggestions.iter().map(|item| item.display.as_str()).collect()
    }

    #[test]
    fn root_members_follow_a_dollar() {
        let prepared = fixture_snapshot();
        let proxy = prepared.session(ProxySettings::default()).expect("proxy");

        assert_eq!(complete(&proxy, "$").len(), DataProxy::members().len());

        let suggestions = complete(&proxy, "{{ $js");
        assert_eq!(suggestions[0].display, "$json");
        assert_eq!(suggestions[0].insert_text, "$json");
        assert_eq!(suggestions[0].kind, ItemKind::Accessor);

        let items = complete(&proxy, "$ite");
        assert_eq!(items[0].display, "$items()");
        assert_eq!(items[0].insert_text, "$items(");
    }

    #[test]
    fn node_names_exclude_the_active_node() {
        let prepared = fixture_snapshot();
        let proxy = prepared.session(ProxySettings::default()).expect("proxy");

        let suggestions = complete(&proxy, "{{ $('");
        assert_eq!(displays(&suggestions), ["Start", "Rename", "Function"]);
        assert_eq!(suggestions[0].insert_text, "Start')");
        assert_eq!(suggestions[0].kind, ItemKind::Node);

        let bare = complete(&proxy, "$(");
        assert_eq!(bare[0].insert_text, "'Start')");

        let legacy = complete(&proxy, r#"$node["Fu"#);
        assert_eq!(displays(&legacy), ["Function"]);
        assert_eq!(legacy[0].insert_text, r#"Function"]"#);
    }

    #[test]
    fn upstream_nodes_rank_first() {
        let workflow = set_workflow(&["Start", "Middle", "End"]);
        let run_data = RunExecutionData::default();
        let proxy = WorkflowDataProxy::new(ProxyParams::new(&workflow, &run_data, "Middle", &[])).expect("proxy");

        assert_eq!(displays(&complete(&proxy, "$('")), ["Start", "End"]);
    }

    #[test]
    fn accessor_members_follow_a_dot() {
        let prepared = fixture_snapshot();
        let proxy = prepared.session(ProxySettings::default()).expect("proxy");

        let input = complete(&proxy, "$input.");
        assert_eq!(input[0].display, "all()");
        assert_eq!(input[0].insert_text, "all()");
        assert!(displays(&input).contains(&"item"));
        assert_eq!(displays(&complete(&proxy, "$input.f")), ["first()"]);

        let node = complete(&proxy, "$('Function').");
        assert!(displays(&node).contains(&"isExecuted"));
    }

    #[test]
    fn object_keys_follow_a_resolved_path() {
        let prepared = fixture_snapshot();
        let proxy = prepared.session(ProxySettings::default()).expect("proxy");

        let json = complete(&proxy, "$json.");
        assert_eq!(displays(&json), ["arr", "num", "obj", "str", "data"]);
        assert_eq!(json[0].meta.as_deref(), Some("array"));

        assert_eq!(displays(&complete(&proxy, "$json.nm")), ["num"]);
        assert_eq!(displays(&complete(&proxy, "$json.obj.")), ["a"]);
        assert_eq!(displays(&complete(&proxy, "$('Function').item.json.")), ["str", "initialName"]);
    }

    #[test]
    fn failures_produce_no_suggestions() {
        let prepared = fixture_snapshot();
        let proxy = prepared.session(ProxySettings::default()).expect("proxy");

        assert!(complete(&proxy, "$('Nope').").is_empty());
        assert!(complete(&proxy, "plain text").is_empty());
        assert!(complete(&proxy, "$json.num.").is_empty());
        assert!(complete(&proxy, "$('Function').first(").is_empty());
    }

    #[test]
    fn node_table_offers_names_after_a_dot() {
        let workflow = set_workflow(&["Start", "Fetch Page", "Rename", "End"]);
        let run_data = RunExecutionData::default();
        let proxy = WorkflowDataProxy::new(ProxyParams::new(&workflow, &run_data, "End", &[])).expect("proxy");

        let suggestions = complete(&proxy, "{{ $node.");
        assert_eq!(displays(&suggestions), ["Start", "Rename"]);
        assert_eq!(suggestions[0].insert_text, "Start");
        assert_eq!(suggestions[0].kind, ItemKind::Node);
        assert_eq!(displays(&complete(&proxy, "$node.Ren")), ["Rename"]);
    }

    #[test]
    fn dollar_signs_inside_quoted_names_do_not_restart_the_reference() {
        let workflow = set_workflow(&["Start", "Pay $5", "End"]);
        let run_data = RunExecutionData::default();
        let proxy = WorkflowDataProxy::new(ProxyParams::new(&workflow, &run_data, "End", &[])).expect("proxy");

        let suggestions = complete(&proxy, "$('Pay $");
        assert_eq!(displays(&suggestions), ["Pay $5"]);
        assert_eq!(suggestions[0].insert_text, "Pay $5')");

        assert!(displays(&complete(&proxy, "$('Pay $5').")).contains(&"isExecuted"));
        assert_eq!(complete(&proxy, "$('Pay $5').is")[0].display, "isExecuted");
    }
}
