//! The graph of one named network.
//!
//! Nodes and links live in a `petgraph::StableGraph`, so handles survive the
//! removal of other elements and a link can never point at a slot that was
//! removed under it. The dense array view (node `index`, link endpoints as
//! indices) is derived from slot order and recomputed by [`GraphModel::reindex`],
//! which every public mutating method runs before returning.

use std::collections::{HashMap, HashSet};

use layout::{Position, initial_position};
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableGraph};
use petgraph::visit::EdgeRef;
use petgraph::{Directed, Direction};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::edge::Link;
use crate::error::{LinkEnd, NetworkError, Result};
use crate::node::{Node, NodeGroup};

/// Stable node handle.
pub type NodeKey = NodeIndex;

/// Stable link handle.
pub type LinkKey = EdgeIndex;

/// Role the suspended node played in one of its links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkRole {
    Source,
    Target,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighborToken {
    pub neighbor_id: String,
    pub role: LinkRole,
    #[serde(default)]
    pub link: Link,
}

/// Everything needed to put a suspended node back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuspendedToken {
    pub node_id: String,
    pub neighbors: Vec<NeighborToken>,
    /// The node itself as JSON.
    pub node: String,
}

#[derive(Debug, Clone, Copy)]
pub struct LinkView<'a> {
    pub key: LinkKey,
    pub source: NodeKey,
    pub target: NodeKey,
    pub link: &'a Link,
}

impl LinkView<'_> {
    /// Endpoints in drawing order, honoring the `reversed` flag.
    pub fn oriented(&self) -> (NodeKey, NodeKey) {
        if self.link.reversed {
            (self.target, self.source)
        } else {
            (self.source, self.target)
        }
    }

    pub fn other(&self, key: NodeKey) -> NodeKey {
        if self.source == key {
            self.target
        } else {
            self.source
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GraphModel {
    inner: StableGraph<Node, Link, Directed>,
    /// Dense order of live nodes.
    keys: Vec<NodeKey>,
    index: HashMap<NodeKey, usize>,
    /// Dense order of live links.
    link_keys: Vec<LinkKey>,
    link_index: HashMap<LinkKey, usize>,
    id_to_node: HashMap<String, NodeKey>,
    pub(crate) suspended: Vec<SuspendedToken>,
    next_id: u64,
    seed_center: Position,
}

impl GraphModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Center of the spiral unplaced nodes are seeded on.
    pub fn with_seed_center(mut self, center: Position) -> Self {
        self.seed_center = center;
        self
    }

    pub fn set_seed_center(&mut self, center: Position) {
        self.seed_center = center;
    }

    pub fn node_count(&self) -> usize {
        self.keys.len()
    }

    pub fn link_count(&self) -> usize {
        self.link_keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn suspended(&self) -> &[SuspendedToken] {
        &self.suspended
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.inner.contains_node(key)
    }

    pub fn node(&self, key: NodeKey) -> Option<&Node> {
        self.inner.node_weight(key)
    }

    pub(crate) fn node_mut(&mut self, key: NodeKey) -> Option<&mut Node> {
        self.inner.node_weight_mut(key)
    }

    pub fn link(&self, key: LinkKey) -> Option<&Link> {
        self.inner.edge_weight(key)
    }

    pub fn link_mut(&mut self, key: LinkKey) -> Option<&mut Link> {
        self.inner.edge_weight_mut(key)
    }

    pub fn key_of(&self, id: &str) -> Option<NodeKey> {
        self.id_to_node.get(id).copied()
    }

    pub fn require_key(&self, id: &str) -> Result<NodeKey> {
        self.key_of(id)
            .ok_or_else(|| NetworkError::UnknownNode(id.to_string()))
    }

    pub fn keys_of<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<NodeKey>> {
        ids.iter().map(|id| self.require_key(id.as_ref())).collect()
    }

    pub fn id_of(&self, key: NodeKey) -> Option<&str> {
        self.node(key).map(|n| n.id.as_str())
    }

    /// Position of `key` in the dense node array.
    pub fn index_of(&self, key: NodeKey) -> Option<usize> {
        self.index.get(&key).copied()
    }

    pub fn link_index_of(&self, key: LinkKey) -> Option<usize> {
        self.link_index.get(&key).copied()
    }

    pub fn node_at(&self, index: usize) -> Option<NodeKey> {
        self.keys.get(index).copied()
    }

    /// Live node keys in dense order.
    pub fn node_keys(&self) -> &[NodeKey] {
        &self.keys
    }

    pub fn link_keys(&self) -> &[LinkKey] {
        &self.link_keys
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeKey, &Node)> + '_ {
        self.keys.iter().map(move |&key| (key, &self.inner[key]))
    }

    /// Node weights in dense order, for the simulation.
    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> + '_ {
        self.inner.node_weights_mut()
    }

    pub fn links(&self) -> impl Iterator<Item = LinkView<'_>> + '_ {
        self.link_keys.iter().filter_map(move |&key| self.link_view(key))
    }

    pub fn link_view(&self, key: LinkKey) -> Option<LinkView<'_>> {
        let (source, target) = self.inner.edge_endpoints(key)?;
        Some(LinkView {
            key,
            source,
            target,
            link: self.inner.edge_weight(key)?,
        })
    }

    pub fn endpoints(&self, key: LinkKey) -> Option<(NodeKey, NodeKey)> {
        self.inner.edge_endpoints(key)
    }

    /// Count of incident links, computed from the structure on every call.
    pub fn degree(&self, key: NodeKey) -> usize {
        self.inner.edges_directed(key, Direction::Outgoing).count()
            + self.inner.edges_directed(key, Direction::Incoming).count()
    }

    /// Incident links in dense link order.
    pub fn incident_links(&self, key: NodeKey) -> Vec<LinkKey> {
        let mut links: Vec<LinkKey> = self
            .inner
            .edges_directed(key, Direction::Outgoing)
            .chain(self.inner.edges_directed(key, Direction::Incoming))
            .map(|e| e.id())
            .collect();
        // slot order is dense order
        links.sort_by_key(|l| l.index());
        links.dedup();
        links
    }

    /// Undirected neighbors without repeats, in dense link order.
    pub fn neighbors(&self, key: NodeKey) -> Vec<NodeKey> {
        let mut seen = HashSet::new();
        self.incident_links(key)
            .into_iter()
            .filter_map(|l| self.link_view(l).map(|v| v.other(key)))
            .filter(|n| seen.insert(*n))
            .collect()
    }

    /// Neighbors feeding into `key`, honoring reversed links.
    pub fn inputs(&self, key: NodeKey) -> Vec<NodeKey> {
        self.incident_links(key)
            .into_iter()
            .filter_map(|l| self.link_view(l))
            .filter_map(|v| {
                let (from, to) = v.oriented();
                (to == key && from != key).then_some(from)
            })
            .collect()
    }

    /// Neighbors `key` feeds into, honoring reversed links.
    pub fn outputs(&self, key: NodeKey) -> Vec<NodeKey> {
        self.incident_links(key)
            .into_iter()
            .filter_map(|l| self.link_view(l))
            .filter_map(|v| {
                let (from, to) = v.oriented();
                (from == key && to != key).then_some(to)
            })
            .collect()
    }

    /// Link endpoints as dense indices, in link order.
    pub fn dense_links(&self) -> Vec<(usize, usize)> {
        self.links()
            .filter_map(|v| Some((self.index_of(v.source)?, self.index_of(v.target)?)))
            .collect()
    }

    /// Add a node and return its handle. Unplaced nodes get a seed position.
    pub fn add_node(&mut self, node: Node) -> Result<NodeKey> {
        let key = self.insert_node(node)?;
        self.reindex();
        Ok(key)
    }

    pub fn add_link(&mut self, source: NodeKey, target: NodeKey, link: Link) -> Result<LinkKey> {
        let key = self.insert_link(source, target, link)?;
        self.reindex();
        Ok(key)
    }

    /// Remove nodes together with every link touching them.
    pub fn remove_nodes(&mut self, keys: &[NodeKey]) -> Vec<Node> {
        let removed = self.take_nodes(keys);
        self.reindex();
        removed
    }

    pub fn remove_links(&mut self, keys: &[LinkKey]) -> usize {
        let removed = keys
            .iter()
            .filter(|&&k| self.inner.remove_edge(k).is_some())
            .count();
        self.reindex();
        removed
    }

    /// Recompute the dense view after a structural change.
    ///
    /// Also clears `secondary` on nodes that are no longer degree-0/1 metabolites.
    pub fn reindex(&mut self) {
        self.keys = self.inner.node_indices().collect();
        self.index = self.keys.iter().enumerate().map(|(i, &k)| (k, i)).collect();
        self.link_keys = self.inner.edge_indices().collect();
        self.link_index = self
            .link_keys
            .iter()
            .enumerate()
            .map(|(i, &k)| (k, i))
            .collect();
        self.id_to_node = self
            .keys
            .iter()
            .map(|&k| (self.inner[k].id.clone(), k))
            .collect();

        let demote: Vec<NodeKey> = self
            .keys
            .iter()
            .copied()
            .filter(|&k| {
                let node = &self.inner[k];
                node.secondary && !(node.is_metabolite() && self.degree(k) <= 1)
            })
            .collect();
        for key in demote {
            trace!(node = %self.inner[key].id, "secondary flag cleared");
            self.inner[key].secondary = false;
        }
    }

    /// Check that every link resolves to a live node in the dense view.
    pub fn validate(&self) -> Result<()> {
        for (i, &link) in self.link_keys.iter().enumerate() {
            let Some((source, target)) = self.inner.edge_endpoints(link) else {
                return Err(NetworkError::ReferentialIntegrity {
                    link: i,
                    endpoint: LinkEnd::Source,
                });
            };
            if self.index_of(source).is_none_or(|s| s >= self.keys.len()) {
                return Err(NetworkError::ReferentialIntegrity {
                    link: i,
                    endpoint: LinkEnd::Source,
                });
            }
            if self.index_of(target).is_none_or(|t| t >= self.keys.len()) {
                return Err(NetworkError::ReferentialIntegrity {
                    link: i,
                    endpoint: LinkEnd::Target,
                });
            }
        }
        if self.link_keys.len() != self.inner.edge_count() {
            return Err(NetworkError::ReferentialIntegrity {
                link: self.link_keys.len(),
                endpoint: LinkEnd::Source,
            });
        }
        Ok(())
    }

    /// An id not used by any live or suspended node, derived from `base`.
    pub fn fresh_id(&mut self, base: &str) -> String {
        loop {
            self.next_id += 1;
            let id = format!("{base}_{}", self.next_id);
            if !self.id_in_use(&id) {
                return id;
            }
        }
    }

    pub fn id_in_use(&self, id: &str) -> bool {
        self.id_to_node.contains_key(id) || self.suspended.iter().any(|t| t.node_id == id)
    }

    pub fn centroid(&self, keys: &[NodeKey]) -> Option<Position> {
        let points: Vec<Position> = keys
            .iter()
            .filter_map(|&k| self.node(k))
            .map(|n| n.position)
            .collect();
        Position::centroid(&points)
    }

    /// Copy of the subgraph induced by `keys`. Ids are preserved.
    pub fn subgraph(&self, keys: &[NodeKey]) -> GraphModel {
        let wanted: HashSet<NodeKey> = keys.iter().copied().collect();
        let mut sub = GraphModel::new().with_seed_center(self.seed_center);
        let mut mapping = HashMap::new();
        for (key, node) in self.nodes() {
            if wanted.contains(&key) {
                let mut copy = node.clone();
                copy.trap = None;
                mapping.insert(key, sub.inner.add_node(copy));
            }
        }
        for view in self.links() {
            if let (Some(&s), Some(&t)) = (mapping.get(&view.source), mapping.get(&view.target)) {
                sub.inner.add_edge(s, t, view.link.clone());
            }
        }
        sub.reindex();
        debug!(
            nodes = sub.node_count(),
            links = sub.link_count(),
            "subgraph extracted"
        );
        sub
    }

    /// Append every node, link and suspended token of `other`, renaming
    /// colliding ids. Returns the renames as `(old, new)` pairs.
    pub fn absorb(&mut self, other: &GraphModel) -> Vec<(String, String)> {
        let mut renames = HashMap::new();
        let incoming: Vec<&str> = other
            .nodes()
            .map(|(_, n)| n.id.as_str())
            .chain(other.suspended.iter().map(|t| t.node_id.as_str()))
            .collect();
        for &id in &incoming {
            if self.id_in_use(id) && !renames.contains_key(id) {
                let fresh = loop {
                    let candidate = self.fresh_id(id);
                    if !other.id_in_use(&candidate) {
                        break candidate;
                    }
                };
                renames.insert(id.to_string(), fresh);
            }
        }
        let rename = |id: &str| renames.get(id).cloned().unwrap_or_else(|| id.to_string());

        let mut mapping = HashMap::new();
        for (key, node) in other.nodes() {
            let mut copy = node.clone();
            copy.id = rename(&copy.id);
            copy.grouping = copy.grouping.iter().map(|g| rename(g)).collect();
            copy.trap = None;
            mapping.insert(key, self.inner.add_node(copy));
        }
        for view in other.links() {
            if let (Some(&s), Some(&t)) = (mapping.get(&view.source), mapping.get(&view.target)) {
                self.inner.add_edge(s, t, view.link.clone());
            }
        }
        for token in &other.suspended {
            let mut token = token.clone();
            token.node_id = rename(&token.node_id);
            for neighbor in &mut token.neighbors {
                neighbor.neighbor_id = rename(&neighbor.neighbor_id);
            }
            if let Ok(mut node) = serde_json::from_str::<Node>(&token.node) {
                node.id = token.node_id.clone();
                if let Ok(json) = serde_json::to_string(&node) {
                    token.node = json;
                }
            }
            self.suspended.push(token);
        }
        self.reindex();

        let mut renames: Vec<(String, String)> = renames.into_iter().collect();
        renames.sort();
        renames
    }

    /// Insert without reindexing. Callers reindex once their edit is done.
    pub(crate) fn insert_node(&mut self, mut node: Node) -> Result<NodeKey> {
        if self.id_to_node.contains_key(&node.id) {
            return Err(NetworkError::DuplicateId(node.id));
        }
        if !node.has_position() {
            node.position = initial_position(self.inner.node_count(), self.seed_center);
        }
        if let Some(pin) = node.pinned {
            node.position = pin;
        }
        let id = node.id.clone();
        let key = self.inner.add_node(node);
        self.id_to_node.insert(id, key);
        Ok(key)
    }

    pub(crate) fn insert_link(
        &mut self,
        source: NodeKey,
        target: NodeKey,
        link: Link,
    ) -> Result<LinkKey> {
        if !self.inner.contains_node(source) {
            return Err(NetworkError::UnknownNode(format!("{source:?}")));
        }
        if !self.inner.contains_node(target) {
            return Err(NetworkError::UnknownNode(format!("{target:?}")));
        }
        Ok(self.inner.add_edge(source, target, link))
    }

    pub(crate) fn take_nodes(&mut self, keys: &[NodeKey]) -> Vec<Node> {
        let mut removed = Vec::new();
        for &key in keys {
            if let Some(node) = self.inner.remove_node(key) {
                self.id_to_node.remove(&node.id);
                removed.push(node);
            }
        }
        removed
    }

    /// Move the `from` end(s) of `link` onto `to`, keeping payload and, where
    /// the slot is reused, the handle.
    pub(crate) fn repoint(&mut self, link: LinkKey, from: NodeKey, to: NodeKey) -> Result<LinkKey> {
        let (source, target) = self
            .inner
            .edge_endpoints(link)
            .ok_or_else(|| NetworkError::InvalidSelection(format!("unknown link {link:?}")))?;
        if !self.inner.contains_node(to) {
            return Err(NetworkError::UnknownNode(format!("{to:?}")));
        }
        let payload = self
            .inner
            .remove_edge(link)
            .ok_or_else(|| NetworkError::InvalidSelection(format!("unknown link {link:?}")))?;
        let source = if source == from { to } else { source };
        let target = if target == from { to } else { target };
        Ok(self.inner.add_edge(source, target, payload))
    }

    pub(crate) fn drop_link(&mut self, link: LinkKey) -> Option<Link> {
        self.inner.remove_edge(link)
    }

    pub(crate) fn require_all(&self, keys: &[NodeKey]) -> Result<()> {
        match keys.iter().find(|&&k| !self.contains(k)) {
            Some(missing) => Err(NetworkError::UnknownNode(format!("{missing:?}"))),
            None => Ok(()),
        }
    }

    pub(crate) fn group_of(&self, key: NodeKey) -> Option<NodeGroup> {
        self.node(key).map(|n| n.group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> (GraphModel, [NodeKey; 3]) {
        let mut g = GraphModel::new();
        let m1 = g.add_node(Node::metabolite("M1", "m1")).unwrap();
        let r1 = g.add_node(Node::reaction("R1", "r1")).unwrap();
        let m2 = g.add_node(Node::metabolite("M2", "m2")).unwrap();
        g.add_link(m1, r1, Link::default()).unwrap();
        g.add_link(r1, m2, Link::default()).unwrap();
        (g, [m1, r1, m2])
    }

    #[test]
    fn test_dense_indices_follow_removal() {
        let (mut g, [m1, r1, m2]) = chain();
        assert_eq!(g.dense_links(), vec![(0, 1), (1, 2)]);

        g.remove_nodes(&[m1]);
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.link_count(), 1);
        assert_eq!(g.index_of(r1), Some(0));
        assert_eq!(g.index_of(m2), Some(1));
        assert_eq!(g.dense_links(), vec![(0, 1)]);
        assert!(g.key_of("M1").is_none());
        g.validate().unwrap();
    }

    #[test]
    fn test_degree_and_neighbors() {
        let (g, [m1, r1, m2]) = chain();
        assert_eq!(g.degree(r1), 2);
        assert_eq!(g.degree(m1), 1);
        assert_eq!(g.neighbors(r1), vec![m1, m2]);
        assert_eq!(g.inputs(r1), vec![m1]);
        assert_eq!(g.outputs(r1), vec![m2]);
    }

    #[test]
    fn test_reversed_link_swaps_inputs_and_outputs() {
        let (mut g, [m1, r1, m2]) = chain();
        let first = g.incident_links(m1)[0];
        g.link_mut(first).unwrap().reversed = true;
        assert_eq!(g.inputs(r1), Vec::<NodeKey>::new());
        assert_eq!(g.outputs(r1), vec![m1, m2]);
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let (mut g, _) = chain();
        let err = g.add_node(Node::metabolite("M1", "other")).unwrap_err();
        assert!(matches!(err, NetworkError::DuplicateId(id) if id == "M1"));
    }

    #[test]
    fn test_add_link_rejects_removed_endpoint() {
        let (mut g, [m1, r1, _]) = chain();
        g.remove_nodes(&[m1]);
        assert!(matches!(
            g.add_link(m1, r1, Link::default()),
            Err(NetworkError::UnknownNode(_))
        ));
    }

    #[test]
    fn test_unplaced_nodes_are_seeded() {
        let (g, keys) = chain();
        assert!(keys.iter().all(|&k| g.node(k).unwrap().has_position()));
    }

    #[test]
    fn test_reindex_demotes_ineligible_secondary() {
        let (mut g, [m1, r1, m2]) = chain();
        g.node_mut(m1).unwrap().secondary = true;
        g.node_mut(r1).unwrap().secondary = true;
        g.reindex();
        assert!(g.node(m1).unwrap().secondary);
        assert!(!g.node(r1).unwrap().secondary);

        g.add_link(m1, m2, Link::default()).unwrap();
        assert!(!g.node(m1).unwrap().secondary);
    }

    #[test]
    fn test_fresh_id_avoids_live_ids() {
        let mut g = GraphModel::new();
        g.add_node(Node::metabolite("atp_1", "atp")).unwrap();
        assert_eq!(g.fresh_id("atp"), "atp_2");
    }

    #[test]
    fn test_subgraph_keeps_induced_links() {
        let (g, [m1, r1, _]) = chain();
        let sub = g.subgraph(&[m1, r1]);
        assert_eq!(sub.node_count(), 2);
        assert_eq!(sub.link_count(), 1);
        assert!(sub.key_of("M1").is_some());
        assert!(sub.key_of("M2").is_none());
    }

    #[test]
    fn test_absorb_renames_colliding_ids() {
        let (mut a, _) = chain();
        let (b, _) = chain();
        let renames = a.absorb(&b);

        assert_eq!(a.node_count(), 6);
        assert_eq!(a.link_count(), 4);
        assert_eq!(renames.len(), 3);
        a.validate().unwrap();
        let ids: HashSet<&str> = a.nodes().map(|(_, n)| n.id.as_str()).collect();
        assert_eq!(ids.len(), 6);
    }
}
