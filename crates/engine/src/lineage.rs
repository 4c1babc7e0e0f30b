//! Pairing-chain walk.
//!
//! Each recorded item carries `pairedItem` backlinks into the output of the
//! node that fed it, and each task records which node that was (`source`).
//! Starting at the active node's upstream source, the walk follows exactly
//! one backlink per hop until it reaches the target node or the chain breaks.
//! It never searches, so an item merged from several inputs ends the walk.

use flowscope_types::{ExecuteData, ExecutionItem, PairedItems};
use tracing::trace;

use crate::error::ProxyError;
use crate::proxy::{MAIN_PORT, WorkflowDataProxy};

/// Position of the walk: one item of one branch of one task.
#[derive(Debug, Clone, Copy)]
struct Hop<'a> {
    node: &'a str,
    run: usize,
    branch: usize,
    item: usize,
}

pub(crate) fn trace_paired_item<'a>(
    proxy: &WorkflowDataProxy<'a>,
    target: &str,
    item_index: usize,
) -> Result<&'a ExecutionItem, ProxyError> {
    let run_data = proxy.run_data;
    let cursor = &proxy.cursor;

    if !proxy.workflow.contains_node(target) {
        return Err(ProxyError::unknown_node(target));
    }
    if !run_data.has_run(target) {
        return Err(ProxyError::no_run_data(target, cursor.run_index));
    }

    let broken = |reason: String| ProxyError::NoPairedItem {
        node: cursor.node_name.clone(),
        target: target.to_string(),
        item_index,
        reason,
    };

    if target == cursor.node_name {
        return run_data
            .task(target, cursor.run_index)
            .and_then(|task| task.output(MAIN_PORT, 0))
            .and_then(|items| items.get(item_index))
            .ok_or_else(|| broken(format!("'{target}' recorded no output item {item_index} in run {}", cursor.run_index)));
    }

    let Some(source) = proxy.execute_data.and_then(ExecuteData::main_source) else {
        return Err(broken(format!("'{}' has no upstream source", cursor.node_name)));
    };
    let mut hop = Hop {
        node: source.previous_node.as_str(),
        run: source.run_index(cursor.run_index),
        branch: source.output_index(),
        item: item_index,
    };

    // A well-formed chain visits each task at most once.
    let max_hops = run_data.task_count();
    for _ in 0..max_hops {
        trace!(node = hop.node, run = hop.run, branch = hop.branch, item = hop.item, "following paired item");

        let task = run_data
            .task(hop.node, hop.run)
            .ok_or_else(|| broken(format!("'{}' has no recorded run {}", hop.node, hop.run)))?;
        let items = task
            .output(MAIN_PORT, hop.branch)
            .ok_or_else(|| broken(format!("'{}' recorded no output {} in run {}", hop.node, hop.branch, hop.run)))?;
        let item = items
            .get(hop.item)
            .ok_or_else(|| broken(format!("'{}' has no output item {} ({} recorded)", hop.node, hop.item, items.len())))?;

        if hop.node == target {
            return Ok(item);
        }

        let backlink = match item.paired_item.as_ref().map(PairedItems::as_slice) {
            None | Some([]) => None,
            Some([paired]) => Some(*paired),
            Some(_) => return Err(broken(format!("item {} of '{}' merges several inputs", hop.item, hop.node))),
        };

        let input = backlink.map_or(0, |paired| paired.input_index());
        let previous = task
            .source_for_input(input)
            .ok_or_else(|| broken(format!("'{}' has no recorded source for input {input}", hop.node)))?;
        let previous_run = previous.run_index(hop.run);

        let previous_item = match backlink {
            Some(paired) => paired.item,
            // Without a backlink the only unambiguous origin is a single-item output.
            None => {
                let previous_len = run_data
                    .task(&previous.previous_node, previous_run)
                    .and_then(|previous_task| previous_task.output(MAIN_PORT, previous.output_index()))
                    .map_or(0, <[ExecutionItem]>::len);
                if previous_len != 1 {
                    return Err(broken(format!("item {} of '{}' carries no pairing information", hop.item, hop.node)));
                }
                0
            }
        };

        hop = Hop {
            node: previous.previous_node.as_str(),
            run: previous_run,
            branch: previous.output_index(),
            item: previous_item,
        };
    }

    Err(broken("pairing chain does not terminate".to_string()))
}
