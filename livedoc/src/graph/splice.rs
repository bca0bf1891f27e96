use tracing::debug;

use crate::directive::Mode;
use crate::error::{GraphError, GraphResult};
use crate::graph::{Graph, resolve};
use crate::node::NodeKey;

/// Keys of the first and last nodes committed by a splice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spliced {
    pub first: NodeKey,
    pub last: NodeKey,
}

/// Commit `source` into `dest` at the node named by `anchor` (an id, a key,
/// or a `/` path).
pub fn splice(
    dest: &mut Graph,
    source: Graph,
    anchor: &str,
    nested: bool,
    mode: Mode,
) -> GraphResult<Spliced> {
    let key = resolve(dest, anchor)?;
    splice_at(dest, source, &key, nested, mode)
}

/// Commit `source` into `dest` relative to the node `anchor`.
///
/// With `nested`, the anchor stands for its whole branch: Replace swaps out
/// the anchor and every following strictly deeper node, Append lands after
/// the branch's last non-directive node. Prepend always lands right before
/// the anchor.
pub fn splice_at(
    dest: &mut Graph,
    source: Graph,
    anchor: &NodeKey,
    nested: bool,
    mode: Mode,
) -> GraphResult<Spliced> {
    let (Some(first), Some(last)) = (source.head_key().cloned(), source.tail_key().cloned()) else {
        return Err(GraphError::EmptySource(anchor.to_string()));
    };
    let Some(anchor_node) = dest.get(anchor) else {
        return Err(GraphError::BlockNotFound(anchor.to_string()));
    };
    let anchor_level = anchor_node.level;
    let inserted: Vec<NodeKey> = source.iter().map(|n| n.key.clone()).collect();

    debug!(%anchor, %mode, nested, nodes = inserted.len(), "splice");

    match (mode, nested) {
        (Mode::Replace, true) => {
            let branch = dest.branch_keys(anchor)?;
            if branch.is_empty() {
                return Err(GraphError::EmptyDestination(anchor.to_string()));
            }
            dest.replace_run_with_graph(&branch, source)?;
        }
        (Mode::Replace, false) => dest.replace_with_graph(anchor, source)?,
        (Mode::Prepend, _) => dest.prepend_with_graph(anchor, source)?,
        (Mode::Append, true) => {
            let mut last_content = anchor.clone();
            for node in dest.iter_after(anchor).take_while(|n| n.level > anchor_level) {
                if !node.is_directive() {
                    last_content = node.key.clone();
                }
            }
            dest.append_with_graph(&last_content, source)?;
        }
        (Mode::Append, false) => dest.append_with_graph(anchor, source)?,
    }

    if let Some(missing) = inserted.iter().find(|k| !dest.contains(k)) {
        return Err(GraphError::InvariantViolation(format!(
            "spliced node '{}' missing from destination",
            missing
        )));
    }
    dest.check_invariants()?;
    if dest.is_empty() || dest.head_key().is_none() || dest.tail_key().is_none() {
        return Err(GraphError::InvariantViolation(
            "resulting graph is missing head, tail, or nodes".into(),
        ));
    }

    Ok(Spliced { first, last })
}
