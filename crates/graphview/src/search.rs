//! Bounded breadth-first path queries over the undirected link structure.
//!
//! The search runs level by level across the whole frontier and checks its
//! [`SearchBudget`] once per level. Running out of budget is not an error:
//! the result comes back tagged [`SearchOutcome::Timeout`] with whatever
//! was found so far, and a warning is logged.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use itertools::Itertools;
use tracing::{trace, warn};

use crate::error::{NetworkError, Result};
use crate::graph::{GraphModel, NodeKey};

/// Limits for one query. `Default` is unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchBudget {
    pub deadline: Option<Instant>,
    /// Longest path, in links, the search will look for.
    pub max_depth: Option<usize>,
    /// Most tied paths returned per pair.
    pub max_paths: Option<usize>,
}

impl SearchBudget {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            ..Self::default()
        }
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn max_paths(mut self, paths: usize) -> Self {
        self.max_paths = Some(paths);
        self
    }

    fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome<T> {
    Complete(T),
    /// The budget ran out; the value is the best partial answer.
    Timeout(T),
}

impl<T> SearchOutcome<T> {
    pub fn is_complete(&self) -> bool {
        matches!(self, SearchOutcome::Complete(_))
    }

    pub fn value(&self) -> &T {
        match self {
            SearchOutcome::Complete(v) | SearchOutcome::Timeout(v) => v,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            SearchOutcome::Complete(v) | SearchOutcome::Timeout(v) => v,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> SearchOutcome<U> {
        match self {
            SearchOutcome::Complete(v) => SearchOutcome::Complete(f(v)),
            SearchOutcome::Timeout(v) => SearchOutcome::Timeout(f(v)),
        }
    }
}

enum Stop {
    Found,
    Unreachable,
    OutOfBudget,
}

/// Distances from the start plus every shortest-path predecessor of each reached node.
struct Levels {
    dist: HashMap<NodeKey, usize>,
    preds: HashMap<NodeKey, Vec<NodeKey>>,
    stop: Stop,
}

impl Levels {
    fn explore(graph: &GraphModel, a: NodeKey, b: NodeKey, budget: &SearchBudget) -> Self {
        let mut dist = HashMap::from([(a, 0)]);
        let mut preds: HashMap<NodeKey, Vec<NodeKey>> = HashMap::new();
        let mut frontier = vec![a];
        let mut depth = 0;

        let stop = loop {
            if dist.contains_key(&b) {
                break Stop::Found;
            }
            if frontier.is_empty() {
                break Stop::Unreachable;
            }
            if budget.expired() || budget.max_depth.is_some_and(|m| depth >= m) {
                break Stop::OutOfBudget;
            }
            depth += 1;
            let mut next = Vec::new();
            for &u in &frontier {
                for v in graph.neighbors(u) {
                    match dist.get(&v) {
                        None => {
                            dist.insert(v, depth);
                            preds.insert(v, vec![u]);
                            next.push(v);
                        }
                        Some(&d) if d == depth => {
                            let list = preds.entry(v).or_default();
                            if !list.contains(&u) {
                                list.push(u);
                            }
                        }
                        Some(_) => {}
                    }
                }
            }
            trace!(depth, frontier = next.len(), "search level expanded");
            frontier = next;
        };

        Levels { dist, preds, stop }
    }

    /// Path from the start to `end` along first predecessors.
    fn first_path(&self, end: NodeKey) -> Vec<NodeKey> {
        let mut path = vec![end];
        let mut cursor = end;
        while let Some(&prev) = self.preds.get(&cursor).and_then(|p| p.first()) {
            path.push(prev);
            cursor = prev;
        }
        path.reverse();
        path
    }

    /// Every shortest path from `a` to `b`, stopping early when the budget runs out.
    fn all_paths(&self, a: NodeKey, b: NodeKey, budget: &SearchBudget) -> (Vec<Vec<NodeKey>>, bool) {
        let mut out = Vec::new();
        let mut suffix = Vec::new();
        let complete = self.walk(a, b, &mut suffix, &mut out, budget);
        (out, complete)
    }

    fn walk(
        &self,
        a: NodeKey,
        node: NodeKey,
        suffix: &mut Vec<NodeKey>,
        out: &mut Vec<Vec<NodeKey>>,
        budget: &SearchBudget,
    ) -> bool {
        suffix.push(node);
        if node == a {
            // A full cap only cuts the walk once one more path turns up.
            let full = budget.max_paths.is_some_and(|m| out.len() >= m);
            if !full {
                out.push(suffix.iter().rev().copied().collect());
            }
            suffix.pop();
            return !full && !budget.expired();
        }
        for &prev in self.preds.get(&node).map(Vec::as_slice).unwrap_or(&[]) {
            if !self.walk(a, prev, suffix, out, budget) {
                suffix.pop();
                return false;
            }
        }
        suffix.pop();
        true
    }
}

fn require(graph: &GraphModel, key: NodeKey) -> Result<()> {
    if graph.contains(key) {
        Ok(())
    } else {
        Err(NetworkError::UnknownNode(format!("{key:?}")))
    }
}

impl GraphModel {
    /// One shortest path from `a` to `b`, ignoring link direction.
    ///
    /// An unreachable `b` gives an empty complete path. On timeout the partial
    /// path leads to the reached node that lies geometrically closest to `b`.
    pub fn shortest_path(
        &self,
        a: NodeKey,
        b: NodeKey,
        budget: SearchBudget,
    ) -> Result<SearchOutcome<Vec<NodeKey>>> {
        require(self, a)?;
        require(self, b)?;
        if a == b {
            return Ok(SearchOutcome::Complete(vec![a]));
        }

        let levels = Levels::explore(self, a, b, &budget);
        Ok(match levels.stop {
            Stop::Found => SearchOutcome::Complete(levels.first_path(b)),
            Stop::Unreachable => SearchOutcome::Complete(Vec::new()),
            Stop::OutOfBudget => {
                let goal = self.node(b).map(|n| n.position).unwrap_or_default();
                let closest = self
                    .node_keys()
                    .iter()
                    .copied()
                    .filter(|k| levels.dist.contains_key(k))
                    .min_by(|x, y| {
                        let dx = self.node(*x).map_or(f64::INFINITY, |n| n.position.distance(&goal));
                        let dy = self.node(*y).map_or(f64::INFINITY, |n| n.position.distance(&goal));
                        dx.total_cmp(&dy)
                    })
                    .unwrap_or(a);
                warn!(
                    reached = levels.dist.len(),
                    "shortest path search ran out of budget, returning partial path"
                );
                SearchOutcome::Timeout(levels.first_path(closest))
            }
        })
    }

    /// Every tied shortest path from `a` to `b`.
    ///
    /// Enumeration is complete unless the budget runs out, in which case the
    /// paths found so far come back as a timeout.
    pub fn shortest_paths_all(
        &self,
        a: NodeKey,
        b: NodeKey,
        budget: SearchBudget,
    ) -> Result<SearchOutcome<Vec<Vec<NodeKey>>>> {
        require(self, a)?;
        require(self, b)?;
        if a == b {
            return Ok(SearchOutcome::Complete(vec![vec![a]]));
        }

        let levels = Levels::explore(self, a, b, &budget);
        Ok(match levels.stop {
            Stop::Found => {
                let (paths, complete) = levels.all_paths(a, b, &budget);
                if complete {
                    SearchOutcome::Complete(paths)
                } else {
                    warn!(paths = paths.len(), "tied path enumeration cut short by budget");
                    SearchOutcome::Timeout(paths)
                }
            }
            Stop::Unreachable => SearchOutcome::Complete(Vec::new()),
            Stop::OutOfBudget => {
                warn!(
                    reached = levels.dist.len(),
                    "tied path search ran out of budget before reaching the target"
                );
                SearchOutcome::Timeout(Vec::new())
            }
        })
    }

    /// The subgraph of interest around a selection: every tied shortest path
    /// between each pair of selected nodes, plus the metabolites adjacent to
    /// each reaction on those paths. Returned in node order.
    pub fn component(
        &self,
        selection: &[NodeKey],
        budget: SearchBudget,
    ) -> Result<SearchOutcome<Vec<NodeKey>>> {
        for &key in selection {
            require(self, key)?;
        }
        let selection: Vec<NodeKey> = selection.iter().copied().unique().collect();
        let mut on_paths: HashSet<NodeKey> = selection.iter().copied().collect();
        let mut complete = true;

        for (&a, &b) in selection.iter().tuple_combinations() {
            let outcome = self.shortest_paths_all(a, b, budget)?;
            complete &= outcome.is_complete();
            on_paths.extend(outcome.into_inner().into_iter().flatten());
        }

        let mut members = on_paths.clone();
        for &key in &on_paths {
            if self.node(key).is_some_and(|n| n.is_reaction()) {
                members.extend(
                    self.neighbors(key)
                        .into_iter()
                        .filter(|&n| self.node(n).is_some_and(|m| m.is_metabolite())),
                );
            }
        }

        let members: Vec<NodeKey> = members
            .into_iter()
            .sorted_by_key(|&k| self.index_of(k))
            .collect();
        Ok(if complete {
            SearchOutcome::Complete(members)
        } else {
            SearchOutcome::Timeout(members)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::Link;
    use crate::node::Node;
    use tracing_test::traced_test;

    /// Two parallel routes from `s` to `t`: s - R1 - x - R3 - t and s - R2 - y - R3 - t.
    fn diamond() -> GraphModel {
        let mut g = GraphModel::new();
        let keys: Vec<NodeKey> = [
            Node::metabolite("s", "s").at(0.0, 0.0),
            Node::reaction("R1", "R1").at(10.0, 10.0),
            Node::reaction("R2", "R2").at(10.0, -10.0),
            Node::metabolite("x", "x").at(20.0, 10.0),
            Node::metabolite("y", "y").at(20.0, -10.0),
            Node::reaction("R3", "R3").at(30.0, 0.0),
            Node::metabolite("t", "t").at(40.0, 0.0),
            Node::metabolite("lone", "lone").at(0.0, 50.0),
        ]
        .into_iter()
        .map(|n| g.add_node(n).unwrap())
        .collect();
        for (s, t) in [(0, 1), (0, 2), (1, 3), (2, 4), (3, 5), (4, 5), (5, 6)] {
            g.add_link(keys[s], keys[t], Link::default()).unwrap();
        }
        g
    }

    fn ids(g: &GraphModel, path: &[NodeKey]) -> Vec<String> {
        path.iter().map(|&k| g.id_of(k).unwrap().to_string()).collect()
    }

    #[test]
    fn test_path_to_self_is_single_node() {
        let g = diamond();
        let s = g.key_of("s").unwrap();
        assert_eq!(
            g.shortest_path(s, s, SearchBudget::unlimited()).unwrap(),
            SearchOutcome::Complete(vec![s])
        );
    }

    #[test]
    fn test_shortest_path_ignores_direction() {
        let g = diamond();
        let (s, t) = (g.key_of("s").unwrap(), g.key_of("t").unwrap());
        let path = g.shortest_path(t, s, SearchBudget::unlimited()).unwrap();
        assert!(path.is_complete());
        let path = path.into_inner();
        assert_eq!(path.len(), 5);
        assert_eq!(path.first(), Some(&t));
        assert_eq!(path.last(), Some(&s));
    }

    #[test]
    fn test_unreachable_is_complete_and_empty() {
        let g = diamond();
        let (s, lone) = (g.key_of("s").unwrap(), g.key_of("lone").unwrap());
        assert_eq!(
            g.shortest_path(s, lone, SearchBudget::unlimited()).unwrap(),
            SearchOutcome::Complete(vec![])
        );
        assert_eq!(
            g.shortest_paths_all(s, lone, SearchBudget::unlimited()).unwrap(),
            SearchOutcome::Complete(vec![])
        );
    }

    #[test]
    fn test_all_tied_paths_are_enumerated() {
        let g = diamond();
        let (s, t) = (g.key_of("s").unwrap(), g.key_of("t").unwrap());
        let paths = g
            .shortest_paths_all(s, t, SearchBudget::unlimited())
            .unwrap()
            .into_inner();
        let mut paths: Vec<Vec<String>> = paths.iter().map(|p| ids(&g, p)).collect();
        paths.sort();
        assert_eq!(
            paths,
            vec![
                vec!["s", "R1", "x", "R3", "t"],
                vec!["s", "R2", "y", "R3", "t"],
            ]
        );
    }

    #[traced_test]
    #[test]
    fn test_depth_budget_returns_partial_path() {
        let g = diamond();
        let (s, t) = (g.key_of("s").unwrap(), g.key_of("t").unwrap());
        let outcome = g
            .shortest_path(s, t, SearchBudget::unlimited().max_depth(2))
            .unwrap();

        let SearchOutcome::Timeout(path) = outcome else {
            panic!("expected a timeout");
        };
        // x and y are equally close to t; x is first in node order.
        assert_eq!(ids(&g, &path), vec!["s", "R1", "x"]);
        assert!(logs_contain("ran out of budget"));
    }

    #[test]
    fn test_expired_deadline_times_out() {
        let g = diamond();
        let (s, t) = (g.key_of("s").unwrap(), g.key_of("t").unwrap());
        let budget = SearchBudget {
            deadline: Some(Instant::now()),
            ..SearchBudget::default()
        };
        let outcome = g.shortest_paths_all(s, t, budget).unwrap();
        assert_eq!(outcome, SearchOutcome::Timeout(vec![]));
    }

    #[test]
    fn test_path_cap_cuts_enumeration() {
        let g = diamond();
        let (s, t) = (g.key_of("s").unwrap(), g.key_of("t").unwrap());
        let outcome = g
            .shortest_paths_all(s, t, SearchBudget::unlimited().max_paths(1))
            .unwrap();
        assert!(!outcome.is_complete());
        assert_eq!(outcome.value().len(), 1);
    }

    #[test]
    fn test_path_cap_equal_to_tie_count_is_complete() {
        let g = diamond();
        let (s, t) = (g.key_of("s").unwrap(), g.key_of("t").unwrap());
        let outcome = g
            .shortest_paths_all(s, t, SearchBudget::unlimited().max_paths(2))
            .unwrap();
        assert!(outcome.is_complete());
        assert_eq!(outcome.value().len(), 2);
    }

    #[test]
    fn test_component_adds_reaction_neighbors() {
        let mut g = diamond();
        let r1 = g.key_of("R1").unwrap();
        let side = g.add_node(Node::metabolite("h2o", "h2o")).unwrap();
        g.add_link(r1, side, Link::default()).unwrap();

        let (s, x) = (g.key_of("s").unwrap(), g.key_of("x").unwrap());
        let members = g
            .component(&[s, x], SearchBudget::unlimited())
            .unwrap()
            .into_inner();
        assert_eq!(ids(&g, &members), vec!["s", "R1", "x", "h2o"]);
    }
}
