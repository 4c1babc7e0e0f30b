//! Resolution failures surfaced by the data proxy.

use thiserror::Error;

/// Distinguishable reasons a proxy accessor could not resolve.
///
/// Every variant names the node involved so callers can render a message the
/// expression author can act on. Context lookups never produce these; they
/// return [`ContextValue::Undefined`](crate::ContextValue::Undefined) instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProxyError {
    #[error("Referenced node '{node}' does not exist in the workflow")]
    UnknownNode { node: String },

    #[error("Node '{node}' has no recorded output for run {run_index}; execute the node first")]
    NoRunData { node: String, run_index: usize },

    #[error("Index {index} is out of range for '{node}' ({len} available)")]
    OutOfRange { node: String, index: usize, len: usize },

    #[error("Node '{node}' has no input data; connect it to an upstream node")]
    NoInputData { node: String },

    #[error("Cannot pair item {item_index} of '{node}' with node '{target}': {reason}")]
    NoPairedItem {
        node: String,
        target: String,
        item_index: usize,
        reason: String,
    },

    #[error("Invalid reference '{reference}': {message}")]
    InvalidReference { reference: String, message: String },
}

impl ProxyError {
    pub(crate) fn unknown_node(node: &str) -> Self {
        Self::UnknownNode { node: node.to_string() }
    }

    pub(crate) fn no_run_data(node: &str, run_index: usize) -> Self {
        Self::NoRunData {
            node: node.to_string(),
            run_index,
        }
    }

    pub(crate) fn out_of_range(node: &str, index: usize, len: usize) -> Self {
        Self::OutOfRange {
            node: node.to_string(),
            index,
            len,
        }
    }

    pub(crate) fn invalid_reference(reference: &str, message: impl Into<String>) -> Self {
        Self::InvalidReference {
            reference: reference.to_string(),
            message: message.into(),
        }
    }
}
