//! Topological traversal over an arbitrary DAG.
//!
//! [`traverse_topologically`] walks a graph described only by parent and
//! child lookup functions. A node is yielded after every one of its parents
//! that is reachable from the start node has been visited. Nodes rejected by
//! the predicate are still visited (so their children are released), they are
//! just not yielded.
//!
//! The traversal is lazy: lookups happen on the first call to `next()` and
//! the predicate and result functions run one node at a time. If either
//! returns an error, that error is yielded and the iterator ends.
//!
//! Cycles are not detected. A node on a cycle never has all of its parents
//! visited, so it is never yielded; the traversal still terminates.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::marker::PhantomData;

/// Lazy topological traversal. Created by [`traverse_topologically`].
pub struct TopologicalTraversal<K, T, E, P, C, F, R> {
    start: K,
    get_parents: P,
    get_children: C,
    predicate: F,
    get_result: R,
    prepared: bool,
    finished: bool,
    children: HashMap<K, Vec<K>>,
    remaining: HashMap<K, usize>,
    visited: HashSet<K>,
    stack: Vec<K>,
    _output: PhantomData<fn() -> Result<T, E>>,
}

/// Traverse the DAG rooted at `start` in topological order.
///
/// # Arguments
///
/// * `start` - The node to start from
/// * `get_parents` - Parent lookup
/// * `get_children` - Child lookup, in tie-breaking order
/// * `predicate` - Whether a visited node is yielded
/// * `get_result` - Maps a yielded node to the output value
///
/// Siblings that become ready together are visited in child order.
pub fn traverse_topologically<K, T, E, P, C, F, R>(
    start: K,
    get_parents: P,
    get_children: C,
    predicate: F,
    get_result: R,
) -> TopologicalTraversal<K, T, E, P, C, F, R>
where
    K: Clone + Eq + Hash,
    P: FnMut(&K) -> Vec<K>,
    C: FnMut(&K) -> Vec<K>,
    F: FnMut(&K) -> Result<bool, E>,
    R: FnMut(&K) -> Result<T, E>,
{
    TopologicalTraversal {
        start,
        get_parents,
        get_children,
        predicate,
        get_result,
        prepared: false,
        finished: false,
        children: HashMap::new(),
        remaining: HashMap::new(),
        visited: HashSet::new(),
        stack: Vec::new(),
        _output: PhantomData,
    }
}

impl<K, T, E, P, C, F, R> TopologicalTraversal<K, T, E, P, C, F, R>
where
    K: Clone + Eq + Hash,
    P: FnMut(&K) -> Vec<K>,
    C: FnMut(&K) -> Vec<K>,
{
    /// Find the nodes reachable from the start and count, for each, the
    /// parents it has to wait for.
    fn prepare(&mut self) {
        let mut pending = vec![self.start.clone()];
        while let Some(node) = pending.pop() {
            if self.children.contains_key(&node) {
                continue;
            }
            let children = (self.get_children)(&node);
            pending.extend(
                children
                    .iter()
                    .filter(|c| !self.children.contains_key(*c))
                    .cloned(),
            );
            self.children.insert(node, children);
        }

        for node in self.children.keys() {
            let waiting = (self.get_parents)(node)
                .iter()
                .filter(|p| self.children.contains_key(*p))
                .count();
            self.remaining.insert(node.clone(), waiting);
        }

        self.remaining.insert(self.start.clone(), 0);
        self.stack.push(self.start.clone());
        self.prepared = true;
    }

    /// Mark `node` visited and push the children it was the last blocker for.
    fn release_children(&mut self, node: &K) {
        let children = self.children.remove(node).unwrap_or_default();
        let mut ready = Vec::new();
        for child in children {
            if let Some(waiting) = self.remaining.get_mut(&child) {
                if *waiting > 0 {
                    *waiting -= 1;
                    if *waiting == 0 {
                        ready.push(child);
                    }
                }
            }
        }
        // Reversed so the first child is popped first.
        self.stack.extend(ready.into_iter().rev());
    }
}

impl<K, T, E, P, C, F, R> Iterator for TopologicalTraversal<K, T, E, P, C, F, R>
where
    K: Clone + Eq + Hash,
    P: FnMut(&K) -> Vec<K>,
    C: FnMut(&K) -> Vec<K>,
    F: FnMut(&K) -> Result<bool, E>,
    R: FnMut(&K) -> Result<T, E>,
{
    type Item = Result<T, E>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if !self.prepared {
            self.prepare();
        }

        while let Some(node) = self.stack.pop() {
            if !self.visited.insert(node.clone()) {
                continue;
            }
            self.release_children(&node);

            let outcome = match (self.predicate)(&node) {
                Ok(false) => continue,
                Ok(true) => (self.get_result)(&node),
                Err(err) => Err(err),
            };
            if outcome.is_err() {
                self.finished = true;
                self.stack.clear();
            }
            return Some(outcome);
        }

        self.finished = true;
        None
    }
}

// ============================================================================
// Tests
// ============================================================================
