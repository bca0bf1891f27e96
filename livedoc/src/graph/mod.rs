pub mod extract;
pub mod path;
pub mod splice;

use std::collections::HashMap;

use crate::error::{GraphError, GraphResult};
use crate::node::{Node, NodeKey};

pub use extract::{extract, extract_path};
pub use path::{lookup, resolve};
pub use splice::{Spliced, splice, splice_at};

#[derive(Debug, Clone)]
struct Entry {
    node: Node,
    prev: Option<NodeKey>,
    next: Option<NodeKey>,
}

/// A document graph: an arena of nodes keyed by [`NodeKey`], threaded into
/// one sequence through `prev`/`next` keys.
///
/// Invariants after every public operation:
/// - the sequence from `head` visits exactly the arena entries, once each;
/// - `head.prev` and `tail.next` are unset;
/// - `a.next == b` implies `b.prev == a`.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    entries: HashMap<NodeKey, Entry>,
    head: Option<NodeKey>,
    tail: Option<NodeKey>,
}

impl Graph {
    pub fn new() -> Self {
        Graph::default()
    }

    pub fn from_nodes(nodes: impl IntoIterator<Item = Node>) -> Self {
        let mut graph = Graph::new();
        for node in nodes {
            graph.push(node);
        }
        graph
    }

    /// Append a node at the tail. A node whose key is already present is
    /// re-keyed so the arena stays consistent.
    pub fn push(&mut self, mut node: Node) {
        if self.entries.contains_key(&node.key) {
            node.key = NodeKey::fresh();
        }
        let key = node.key.clone();
        let prev = self.tail.replace(key.clone());
        match &prev {
            Some(p) => {
                if let Some(entry) = self.entries.get_mut(p) {
                    entry.next = Some(key.clone());
                }
            }
            None => self.head = Some(key.clone()),
        }
        self.entries.insert(key, Entry { node, prev, next: None });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn first(&self) -> Option<&Node> {
        self.head.as_ref().and_then(|k| self.get(k))
    }

    pub fn last(&self) -> Option<&Node> {
        self.tail.as_ref().and_then(|k| self.get(k))
    }

    pub fn head_key(&self) -> Option<&NodeKey> {
        self.head.as_ref()
    }

    pub fn tail_key(&self) -> Option<&NodeKey> {
        self.tail.as_ref()
    }

    pub fn get(&self, key: &NodeKey) -> Option<&Node> {
        self.entries.get(key).map(|e| &e.node)
    }

    /// Key lookup from a raw string, as used by path segments.
    pub fn get_by_key(&self, key: &str) -> Option<&Node> {
        self.entries.get(key).map(|e| &e.node)
    }

    pub fn contains(&self, key: &NodeKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn next_key(&self, key: &NodeKey) -> Option<&NodeKey> {
        self.entries.get(key).and_then(|e| e.next.as_ref())
    }

    pub fn prev_key(&self, key: &NodeKey) -> Option<&NodeKey> {
        self.entries.get(key).and_then(|e| e.prev.as_ref())
    }

    /// Nodes in sequence order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            graph: self,
            cursor: self.head.as_ref(),
        }
    }

    /// Nodes following `key` in sequence order (exclusive).
    pub fn iter_after(&self, key: &NodeKey) -> Iter<'_> {
        Iter {
            graph: self,
            cursor: self.next_key(key),
        }
    }

    /// First node in sequence order matching `predicate`.
    pub fn find(&self, predicate: impl Fn(&Node) -> bool) -> Option<&Node> {
        self.iter().find(|n| predicate(n))
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Node> {
        self.find(|n| n.id.as_deref() == Some(id))
    }

    /// Consume the graph, yielding its nodes in sequence order.
    pub fn into_nodes(mut self) -> Vec<Node> {
        let mut out = Vec::with_capacity(self.entries.len());
        let mut cursor = self.head.take();
        while let Some(key) = cursor {
            match self.entries.remove(&key) {
                Some(entry) => {
                    cursor = entry.next;
                    out.push(entry.node);
                }
                None => break,
            }
        }
        out
    }

    /// `key` plus the contiguous run of following nodes with a strictly
    /// greater level.
    pub fn branch_keys(&self, key: &NodeKey) -> GraphResult<Vec<NodeKey>> {
        let anchor = self
            .get(key)
            .ok_or_else(|| GraphError::KeyNotFound(key.clone()))?;
        let mut keys = vec![key.clone()];
        keys.extend(
            self.iter_after(key)
                .take_while(|n| n.level > anchor.level)
                .map(|n| n.key.clone()),
        );
        Ok(keys)
    }

    pub fn replace_one(&mut self, target: &NodeKey, node: Node) -> GraphResult<()> {
        self.replace_with_graph(target, Graph::from_nodes([node]))
    }

    /// Replace the node at `target` with every node of `other`.
    pub fn replace_with_graph(&mut self, target: &NodeKey, other: Graph) -> GraphResult<()> {
        let (prev, next) = self.neighbours(target)?;
        self.check_insertable(&other, std::slice::from_ref(target))?;
        self.entries.remove(target);
        self.link_run(prev, next, other);
        Ok(())
    }

    /// Insert every node of `other` immediately before `target`.
    pub fn prepend_with_graph(&mut self, target: &NodeKey, other: Graph) -> GraphResult<()> {
        let (prev, _) = self.neighbours(target)?;
        self.check_insertable(&other, &[])?;
        self.link_run(prev, Some(target.clone()), other);
        Ok(())
    }

    /// Insert every node of `other` immediately after `target`.
    pub fn append_with_graph(&mut self, target: &NodeKey, other: Graph) -> GraphResult<()> {
        let (_, next) = self.neighbours(target)?;
        self.check_insertable(&other, &[])?;
        self.link_run(Some(target.clone()), next, other);
        Ok(())
    }

    /// Replace the contiguous run `keys` (in sequence order) with `other`.
    pub(crate) fn replace_run_with_graph(&mut self, keys: &[NodeKey], other: Graph) -> GraphResult<()> {
        let (Some(first), Some(last)) = (keys.first(), keys.last()) else {
            return Err(GraphError::EmptyDestination(String::new()));
        };
        let (prev, _) = self.neighbours(first)?;
        let (_, next) = self.neighbours(last)?;
        self.check_insertable(&other, keys)?;
        for key in keys {
            self.entries.remove(key);
        }
        self.link_run(prev, next, other);
        Ok(())
    }

    /// Walk the sequence and verify every structural invariant.
    pub fn check_invariants(&self) -> GraphResult<()> {
        let violation = |msg: String| Err(GraphError::InvariantViolation(msg));
        let Some(head) = &self.head else {
            if self.tail.is_some() || !self.entries.is_empty() {
                return violation("graph has entries or a tail but no head".into());
            }
            return Ok(());
        };
        if self.prev_key(head).is_some() {
            return violation(format!("head '{}' has a predecessor", head));
        }

        let mut seen = 0usize;
        let mut prev: Option<&NodeKey> = None;
        let mut cursor = Some(head);
        while let Some(key) = cursor {
            let Some(entry) = self.entries.get(key) else {
                return violation(format!("sequence reaches '{}' which is not in the map", key));
            };
            if entry.node.key != *key {
                return violation(format!("entry '{}' holds node keyed '{}'", key, entry.node.key));
            }
            if entry.prev.as_ref() != prev {
                return violation(format!("'{}' does not link back to its predecessor", key));
            }
            seen += 1;
            if seen > self.entries.len() {
                return violation("sequence contains a cycle".into());
            }
            prev = Some(key);
            cursor = entry.next.as_ref();
        }

        if prev != self.tail.as_ref() {
            return violation("tail is not the last node of the sequence".into());
        }
        if seen != self.entries.len() {
            return violation(format!(
                "map holds {} nodes but the sequence visits {}",
                self.entries.len(),
                seen
            ));
        }
        Ok(())
    }

    fn neighbours(&self, key: &NodeKey) -> GraphResult<(Option<NodeKey>, Option<NodeKey>)> {
        self.entries
            .get(key)
            .map(|e| (e.prev.clone(), e.next.clone()))
            .ok_or_else(|| GraphError::KeyNotFound(key.clone()))
    }

    /// `other` must be non-empty and share no key with this graph, apart
    /// from keys about to be removed.
    fn check_insertable(&self, other: &Graph, removing: &[NodeKey]) -> GraphResult<()> {
        if other.is_empty() {
            return Err(GraphError::EmptySource(String::new()));
        }
        if let Some(clash) = other
            .entries
            .keys()
            .find(|k| self.entries.contains_key(*k) && !removing.contains(k))
        {
            return Err(GraphError::InvariantViolation(format!(
                "key '{}' would appear twice",
                clash
            )));
        }
        Ok(())
    }

    /// Thread `other`'s sequence between `prev` and `next`, which must be
    /// adjacent (or ends of the graph) once any replaced nodes are gone.
    fn link_run(&mut self, prev: Option<NodeKey>, next: Option<NodeKey>, mut other: Graph) {
        let (Some(first), Some(last)) = (other.head.take(), other.tail.take()) else {
            return;
        };
        self.entries.extend(other.entries.drain());

        if let Some(entry) = self.entries.get_mut(&first) {
            entry.prev = prev.clone();
        }
        if let Some(entry) = self.entries.get_mut(&last) {
            entry.next = next.clone();
        }
        match prev.and_then(|p| self.entries.get_mut(&p)) {
            Some(entry) => entry.next = Some(first),
            None => self.head = Some(first),
        }
        match next.and_then(|n| self.entries.get_mut(&n)) {
            Some(entry) => entry.prev = Some(last),
            None => self.tail = Some(last),
        }
    }
}

impl Extend<Node> for Graph {
    fn extend<I: IntoIterator<Item = Node>>(&mut self, nodes: I) {
        for node in nodes {
            self.push(node);
        }
    }
}

pub struct Iter<'a> {
    graph: &'a Graph,
    cursor: Option<&'a NodeKey>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.cursor?;
        let entry = self.graph.entries.get(key)?;
        self.cursor = entry.next.as_ref();
        Some(&entry.node)
    }
}
