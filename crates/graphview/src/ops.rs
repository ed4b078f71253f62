//! Structural rewrites of a [`GraphModel`].
//!
//! Every operation validates its selection before touching the graph and
//! reindexes before returning. Nodes of the wrong group in a selection are
//! skipped rather than rejected, so a mixed selection can be passed as-is.

use std::collections::{HashMap, HashSet};

use itertools::Itertools;
use layout::{Position, auto_bezi};
use tracing::{debug, warn};

use crate::edge::Link;
use crate::error::{NetworkError, Result};
use crate::graph::{GraphModel, LinkKey, LinkRole, NeighborToken, NodeKey, SuspendedToken};
use crate::node::{Node, NodeGroup};

/// What [`GraphModel::restore`] put back.
#[derive(Debug, Clone, PartialEq)]
pub struct RestoreReport {
    pub key: NodeKey,
    pub restored_links: usize,
    /// Neighbor ids that no longer exist; those links were not recreated.
    pub skipped: Vec<String>,
}

fn copy_of(template: &Node, id: String, position: Position) -> Node {
    Node {
        id,
        position,
        pinned: None,
        secondary: false,
        bezi: None,
        grouping: Vec::new(),
        trap: None,
        ..template.clone()
    }
}

impl GraphModel {
    /// Give every extra incident link of each selected metabolite its own copy.
    ///
    /// The original keeps its first link in link order. Returns the new nodes.
    pub fn split_nodes(&mut self, keys: &[NodeKey]) -> Result<Vec<NodeKey>> {
        self.require_all(keys)?;
        let mut created = Vec::new();
        for &key in keys.iter().unique() {
            let Some(template) = self.node(key).filter(|n| n.is_metabolite()).cloned() else {
                continue;
            };
            for link in self.incident_links(key).into_iter().skip(1) {
                let other = self.link_view(link).map(|v| v.other(key));
                let position = other
                    .and_then(|o| self.node(o))
                    .map(|n| template.position.lerp(&n.position, 0.5))
                    .unwrap_or(template.position);
                let id = self.fresh_id(&template.id);
                let copy = self.insert_node(copy_of(&template, id, position))?;
                self.repoint(link, key, copy)?;
                created.push(copy);
            }
        }
        self.reindex();
        debug!(created = created.len(), "split nodes");
        Ok(created)
    }

    /// Give `reaction` a private copy of every shared metabolite it touches.
    ///
    /// Each link to a metabolite of degree above one is moved onto a fresh
    /// degree-one copy. The link count does not change.
    pub fn isolate_reaction(&mut self, reaction: NodeKey) -> Result<Vec<NodeKey>> {
        let node = self
            .node(reaction)
            .ok_or_else(|| NetworkError::UnknownNode(format!("{reaction:?}")))?;
        if !node.is_reaction() {
            return Err(NetworkError::InvalidSelection(format!(
                "{} is not a reaction",
                node.id
            )));
        }
        let center = node.position;

        let mut created = Vec::new();
        for link in self.incident_links(reaction) {
            let Some(other) = self.link_view(link).map(|v| v.other(reaction)) else {
                continue;
            };
            let Some(template) = self.node(other).filter(|n| n.is_metabolite()).cloned() else {
                continue;
            };
            if other == reaction || self.degree(other) <= 1 {
                continue;
            }
            let id = self.fresh_id(&template.id);
            let position = center.lerp(&template.position, 0.5);
            let copy = self.insert_node(copy_of(&template, id, position))?;
            self.repoint(link, other, copy)?;
            created.push(copy);
        }
        self.reindex();
        debug!(created = created.len(), "isolated reaction");
        Ok(created)
    }

    /// Merge selected metabolites that share a group key.
    ///
    /// Within each key the member earliest in node order survives; links of
    /// the others are moved onto it and self loops produced by the move are
    /// dropped. Returns the number of nodes merged away.
    pub fn join_metabolites(&mut self, keys: &[NodeKey]) -> Result<usize> {
        self.require_all(keys)?;
        let mut members: Vec<NodeKey> = keys
            .iter()
            .copied()
            .unique()
            .filter(|&k| self.group_of(k) == Some(NodeGroup::Metabolite))
            .collect();
        members.sort_by_key(|&k| self.index_of(k).unwrap_or(usize::MAX));

        let classes = members
            .into_iter()
            .into_group_map_by(|&k| self.node(k).map(|n| n.group_key.clone()).unwrap_or_default());

        let mut removed = Vec::new();
        for (_, mut group) in classes.into_iter().sorted_by_key(|(_, g)| g[0].index()) {
            if group.len() < 2 {
                continue;
            }
            let keep = group.remove(0);
            for extra in group {
                for link in self.incident_links(extra) {
                    let moved = self.repoint(link, extra, keep)?;
                    if let Some((s, t)) = self.endpoints(moved) {
                        if s == t {
                            self.drop_link(moved);
                        }
                    }
                }
                removed.push(extra);
            }
        }
        let merged = self.take_nodes(&removed).len();
        self.reindex();
        debug!(merged, "joined metabolites");
        Ok(merged)
    }

    /// Move selected metabolites out of the graph into the suspended list.
    pub fn suspend_metabolites(&mut self, keys: &[NodeKey]) -> Result<Vec<String>> {
        self.require_all(keys)?;
        let targets: Vec<NodeKey> = keys
            .iter()
            .copied()
            .unique()
            .filter(|&k| self.group_of(k) == Some(NodeGroup::Metabolite))
            .collect();

        let mut tokens = Vec::with_capacity(targets.len());
        for &key in &targets {
            let Some(node) = self.node(key) else {
                continue;
            };
            let neighbors = self
                .incident_links(key)
                .into_iter()
                .filter_map(|l| self.link_view(l))
                .filter_map(|v| {
                    let (other, role) = if v.source == key {
                        (v.target, LinkRole::Source)
                    } else {
                        (v.source, LinkRole::Target)
                    };
                    Some(NeighborToken {
                        neighbor_id: self.id_of(other)?.to_string(),
                        role,
                        link: v.link.clone(),
                    })
                })
                .collect();
            tokens.push(SuspendedToken {
                node_id: node.id.clone(),
                neighbors,
                node: serde_json::to_string(node)?,
            });
        }

        let ids: Vec<String> = tokens.iter().map(|t| t.node_id.clone()).collect();
        self.suspended.extend(tokens);
        self.take_nodes(&targets);
        self.reindex();
        debug!(suspended = ids.len(), "suspended metabolites");
        Ok(ids)
    }

    /// Put a suspended node back and reconnect it to the neighbors that still exist.
    ///
    /// Missing neighbors are skipped, not fatal; they are listed in the report.
    pub fn restore(&mut self, node_id: &str) -> Result<RestoreReport> {
        let position = self
            .suspended
            .iter()
            .position(|t| t.node_id == node_id)
            .ok_or_else(|| NetworkError::NotSuspended(node_id.to_string()))?;
        if self.key_of(node_id).is_some() {
            return Err(NetworkError::DuplicateId(node_id.to_string()));
        }
        let node: Node = serde_json::from_str(&self.suspended[position].node)?;
        let token = self.suspended.remove(position);

        let key = self.insert_node(node)?;
        let mut restored_links = 0;
        let mut skipped = Vec::new();
        for neighbor in token.neighbors {
            let Some(other) = self.key_of(&neighbor.neighbor_id) else {
                warn!(
                    node = node_id,
                    neighbor = %neighbor.neighbor_id,
                    "neighbor of restored node is gone, link not recreated"
                );
                skipped.push(neighbor.neighbor_id);
                continue;
            };
            let (source, target) = match neighbor.role {
                LinkRole::Source => (key, other),
                LinkRole::Target => (other, key),
            };
            self.insert_link(source, target, neighbor.link)?;
            restored_links += 1;
        }
        self.reindex();
        debug!(node = node_id, restored_links, "restored node");
        Ok(RestoreReport {
            key,
            restored_links,
            skipped,
        })
    }

    /// Remove nodes and every link touching them.
    pub fn delete_nodes(&mut self, keys: &[NodeKey]) -> Result<usize> {
        self.require_all(keys)?;
        let removed = self.remove_nodes(keys).len();
        debug!(removed, "deleted nodes");
        Ok(removed)
    }

    /// Contract selected reactions, and the metabolites only they touch, into
    /// one synthetic reaction at the centroid of the removed reactions.
    pub fn collapse(&mut self, keys: &[NodeKey]) -> Result<NodeKey> {
        self.require_all(keys)?;
        let reactions: Vec<NodeKey> = keys
            .iter()
            .copied()
            .unique()
            .filter(|&k| self.group_of(k) == Some(NodeGroup::Reaction))
            .sorted_by_key(|&k| self.index_of(k))
            .collect();
        if reactions.is_empty() {
            return Err(NetworkError::InvalidSelection(
                "collapse needs at least one reaction".to_string(),
            ));
        }
        let reaction_set: HashSet<NodeKey> = reactions.iter().copied().collect();

        let candidates = keys
            .iter()
            .copied()
            .chain(reactions.iter().flat_map(|&r| self.neighbors(r)))
            .filter(|&k| self.group_of(k) == Some(NodeGroup::Metabolite))
            .unique();
        let internal: Vec<NodeKey> = candidates
            .filter(|&m| {
                let around = self.neighbors(m);
                !around.is_empty() && around.iter().all(|n| reaction_set.contains(n))
            })
            .collect();
        let removed: HashSet<NodeKey> = reactions.iter().chain(&internal).copied().collect();

        // One link per external neighbor and direction.
        let mut external: Vec<(NodeKey, LinkRole, Link)> = Vec::new();
        let mut seen = HashSet::new();
        for view in self.links() {
            let (inside_source, inside_target) =
                (removed.contains(&view.source), removed.contains(&view.target));
            let entry = match (inside_source, inside_target) {
                (true, false) => (view.target, LinkRole::Source),
                (false, true) => (view.source, LinkRole::Target),
                _ => continue,
            };
            if seen.insert(entry) {
                external.push((entry.0, entry.1, view.link.clone()));
            }
        }

        let group_key = reactions
            .iter()
            .filter_map(|&r| self.node(r).map(|n| n.group_key.as_str()))
            .join("+");
        let position = self.centroid(&reactions).unwrap_or_default();
        let id = self.fresh_id("collapsed");
        let mut node = Node::reaction(id, group_key);
        node.position = position;

        let removed: Vec<NodeKey> = removed.into_iter().sorted().collect();
        self.take_nodes(&removed);
        let key = self.insert_node(node)?;
        for (other, role, link) in external {
            let (source, target) = match role {
                LinkRole::Source => (key, other),
                LinkRole::Target => (other, key),
            };
            self.insert_link(source, target, link)?;
        }
        self.reindex();
        debug!(
            reactions = reactions.len(),
            metabolites = internal.len(),
            "collapsed selection"
        );
        Ok(key)
    }

    /// Pin a node at `at`, or where it currently is.
    pub fn pin(&mut self, key: NodeKey, at: Option<Position>) -> Result<()> {
        let node = self
            .node_mut(key)
            .ok_or_else(|| NetworkError::UnknownNode(format!("{key:?}")))?;
        let at = at.unwrap_or(node.position);
        node.position = at;
        node.pinned = Some(at);
        Ok(())
    }

    pub fn unpin(&mut self, key: NodeKey) -> Result<()> {
        let node = self
            .node_mut(key)
            .ok_or_else(|| NetworkError::UnknownNode(format!("{key:?}")))?;
        node.pinned = None;
        Ok(())
    }

    /// Place a node; a pinned node keeps its pin at the new place.
    pub fn set_position(&mut self, key: NodeKey, at: Position) -> Result<()> {
        let node = self
            .node_mut(key)
            .ok_or_else(|| NetworkError::UnknownNode(format!("{key:?}")))?;
        node.position = at;
        if node.pinned.is_some() {
            node.pinned = Some(at);
        }
        Ok(())
    }

    /// Move the selection and everything grouped with it by the same offset.
    pub fn translate(&mut self, keys: &[NodeKey], dx: f64, dy: f64) -> Result<Vec<NodeKey>> {
        let moved = self.expand_grouping(keys)?;
        for &key in &moved {
            if let Some(node) = self.node_mut(key) {
                node.position = node.position.offset(dx, dy);
                node.pinned = node.pinned.map(|p| p.offset(dx, dy));
            }
        }
        Ok(moved)
    }

    /// Closure of `keys` over the nodes' `grouping` lists, in node order.
    pub fn expand_grouping(&self, keys: &[NodeKey]) -> Result<Vec<NodeKey>> {
        self.require_all(keys)?;
        let mut seen: HashSet<NodeKey> = HashSet::new();
        let mut stack: Vec<NodeKey> = keys.to_vec();
        while let Some(key) = stack.pop() {
            if !seen.insert(key) {
                continue;
            }
            if let Some(node) = self.node(key) {
                stack.extend(node.grouping.iter().filter_map(|id| self.key_of(id)));
            }
        }
        Ok(seen
            .into_iter()
            .sorted_by_key(|&k| self.index_of(k))
            .collect())
    }

    /// Bind a set of nodes into one rigid group.
    pub fn set_grouping(&mut self, keys: &[NodeKey]) -> Result<()> {
        self.require_all(keys)?;
        let ids: Vec<String> = keys
            .iter()
            .filter_map(|&k| self.id_of(k).map(str::to_string))
            .collect();
        for &key in keys {
            if let Some(node) = self.node_mut(key) {
                node.grouping = ids.iter().filter(|id| **id != node.id).cloned().collect();
            }
        }
        Ok(())
    }

    pub fn add_auxiliary(&mut self, at: Position) -> Result<NodeKey> {
        let id = self.fresh_id("aux");
        let mut node = Node::new(id.clone(), id, NodeGroup::Auxiliary);
        node.position = at;
        self.add_node(node)
    }

    /// Remove every auxiliary node. Returns how many were removed.
    pub fn clear_auxiliary(&mut self) -> usize {
        let aux: Vec<NodeKey> = self
            .nodes()
            .filter(|(_, n)| n.is_auxiliary())
            .map(|(k, _)| k)
            .collect();
        if aux.is_empty() {
            return 0;
        }
        self.remove_nodes(&aux).len()
    }

    /// Set or clear `secondary`. Only metabolites of degree one or less can be
    /// secondary; others are left alone. Returns the number of nodes changed.
    pub fn set_secondary(&mut self, keys: &[NodeKey], secondary: bool) -> Result<usize> {
        self.require_all(keys)?;
        let mut changed = 0;
        for &key in keys.iter().unique() {
            let eligible = self.group_of(key) == Some(NodeGroup::Metabolite) && self.degree(key) <= 1;
            let Some(node) = self.node_mut(key) else {
                continue;
            };
            if node.secondary == secondary || (secondary && !eligible) {
                continue;
            }
            node.secondary = secondary;
            changed += 1;
        }
        Ok(changed)
    }

    /// Flip the drawing orientation of a link.
    pub fn reverse_link(&mut self, key: LinkKey) -> Result<bool> {
        let link = self
            .link_mut(key)
            .ok_or_else(|| NetworkError::InvalidSelection(format!("unknown link {key:?}")))?;
        link.reversed = !link.reversed;
        Ok(link.reversed)
    }

    /// Bind nodes to path constraint `trap`, or release them.
    pub fn set_trap(&mut self, keys: &[NodeKey], trap: Option<usize>) -> Result<()> {
        self.require_all(keys)?;
        for &key in keys {
            if let Some(node) = self.node_mut(key) {
                node.trap = trap;
            }
        }
        Ok(())
    }

    /// Curve the edges of every reaction that has both inputs and outputs.
    pub fn auto_bezi_all(&mut self) -> usize {
        let updates: Vec<(NodeKey, [f64; 4])> = self
            .nodes()
            .filter(|(_, n)| n.is_reaction())
            .filter_map(|(key, node)| {
                let side = |keys: Vec<NodeKey>| -> Vec<Position> {
                    keys.into_iter()
                        .filter_map(|k| self.node(k))
                        .map(|n| n.position)
                        .collect()
                };
                let bezi = auto_bezi(node.position, &side(self.inputs(key)), &side(self.outputs(key)))?;
                Some((key, bezi))
            })
            .collect();
        for &(key, bezi) in &updates {
            if let Some(node) = self.node_mut(key) {
                node.bezi = Some(bezi);
            }
        }
        debug!(reactions = updates.len(), "auto bezier applied");
        updates.len()
    }

    pub fn clear_bezi(&mut self, keys: &[NodeKey]) -> Result<()> {
        self.require_all(keys)?;
        for &key in keys {
            if let Some(node) = self.node_mut(key) {
                node.bezi = None;
            }
        }
        Ok(())
    }

    /// Ids of nodes per group key, restricted to metabolites.
    pub fn metabolite_classes(&self) -> HashMap<&str, Vec<NodeKey>> {
        let mut classes: HashMap<&str, Vec<NodeKey>> = HashMap::new();
        for (key, node) in self.nodes().filter(|(_, n)| n.is_metabolite()) {
            classes.entry(node.group_key.as_str()).or_default().push(key);
        }
        classes
    }
}
