//! On-disk snapshot types.
//!
//! Link endpoints are stored as node indices and resolved back to handles on
//! load. Auxiliary nodes are never written.

use std::collections::{BTreeMap, HashMap};

use layout::Position;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::edge::Link;
use crate::error::{LinkEnd, NetworkError, Result};
use crate::graph::{GraphModel, SuspendedToken};
use crate::history::Commit;
use crate::node::{Node, NodeGroup};

fn no_trap() -> i64 {
    -1
}

fn forward() -> i8 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedNode {
    pub id: String,
    pub class: String,
    #[serde(default)]
    pub label: String,
    pub group: NodeGroup,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub fx: Option<f64>,
    #[serde(default)]
    pub fy: Option<f64>,
    #[serde(default)]
    pub secondary: bool,
    #[serde(default)]
    pub bezi: [Option<f64>; 4],
    #[serde(default)]
    pub label_shift: [f64; 2],
    #[serde(default)]
    pub grouping: Vec<String>,
    #[serde(default = "no_trap")]
    pub trap: i64,
    #[serde(default)]
    pub size: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedLink {
    pub source: usize,
    pub target: usize,
    /// `1` or `-1`.
    #[serde(default = "forward")]
    pub reversed: i8,
    #[serde(default)]
    pub reversible: bool,
    #[serde(default)]
    pub flux: Option<f64>,
    #[serde(default)]
    pub width: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedGraph {
    pub nodes: Vec<PersistedNode>,
    pub links: Vec<PersistedLink>,
    #[serde(default)]
    pub suspended: Vec<SuspendedToken>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedHistory {
    pub undo: Vec<PersistedGraph>,
    pub redo: Vec<PersistedGraph>,
}

/// The whole registry plus per-graph history, selection and commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub graphs: BTreeMap<String, PersistedGraph>,
    pub active_name: String,
    /// Node ids of the active graph.
    #[serde(default)]
    pub selection: Vec<String>,
    #[serde(default)]
    pub history_buffers: BTreeMap<String, PersistedHistory>,
    #[serde(default)]
    pub commits: BTreeMap<String, Vec<Commit<PersistedGraph>>>,
    #[serde(default)]
    pub traps: Vec<Vec<Position>>,
}

impl SessionSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl PersistedNode {
    fn from_node(node: &Node) -> Self {
        let bezi = match node.bezi {
            Some([a, b, c, d]) => [Some(a), Some(b), Some(c), Some(d)],
            None => [None; 4],
        };
        Self {
            id: node.id.clone(),
            class: node.group_key.clone(),
            label: node.label.clone(),
            group: node.group,
            x: node.position.x,
            y: node.position.y,
            fx: node.pinned.map(|p| p.x),
            fy: node.pinned.map(|p| p.y),
            secondary: node.secondary,
            bezi,
            label_shift: node.label_shift,
            grouping: node.grouping.clone(),
            trap: node.trap.map_or(-1, |t| t as i64),
            size: node.size,
        }
    }

    fn into_node(self) -> Node {
        let pinned = match (self.fx, self.fy) {
            (Some(x), Some(y)) => Some(Position::new(x, y)),
            (None, None) => None,
            _ => {
                warn!(node = %self.id, "node is pinned on one axis only, loading it unpinned");
                None
            }
        };
        let bezi = match self.bezi {
            [Some(a), Some(b), Some(c), Some(d)] => Some([a, b, c, d]),
            [None, None, None, None] => None,
            _ => {
                warn!(node = %self.id, "incomplete bezier offsets dropped");
                None
            }
        };
        let label = if self.label.is_empty() {
            self.class.clone()
        } else {
            self.label
        };
        Node {
            id: self.id,
            group_key: self.class,
            label,
            group: self.group,
            position: Position::new(self.x, self.y),
            pinned,
            secondary: self.secondary,
            bezi,
            label_shift: self.label_shift,
            grouping: self.grouping,
            trap: usize::try_from(self.trap).ok(),
            size: self.size,
        }
    }
}

impl GraphModel {
    pub fn to_persisted(&self) -> PersistedGraph {
        let mut dense = HashMap::new();
        let mut nodes = Vec::with_capacity(self.node_count());
        for (key, node) in self.nodes().filter(|(_, n)| !n.is_auxiliary()) {
            dense.insert(key, nodes.len());
            nodes.push(PersistedNode::from_node(node));
        }
        let links = self
            .links()
            .filter_map(|view| {
                Some(PersistedLink {
                    source: *dense.get(&view.source)?,
                    target: *dense.get(&view.target)?,
                    reversed: view.link.orientation(),
                    reversible: view.link.reversible,
                    flux: view.link.flux,
                    width: view.link.width,
                })
            })
            .collect();
        PersistedGraph {
            nodes,
            links,
            suspended: self.suspended.clone(),
        }
    }

    pub fn from_persisted(persisted: &PersistedGraph) -> Result<Self> {
        Self::from_persisted_at(persisted, Position::default())
    }

    /// Load a snapshot; `seed_center` places nodes stored without coordinates.
    pub fn from_persisted_at(persisted: &PersistedGraph, seed_center: Position) -> Result<Self> {
        let mut graph = GraphModel::new().with_seed_center(seed_center);
        let mut keys = Vec::with_capacity(persisted.nodes.len());
        for node in &persisted.nodes {
            keys.push(graph.insert_node(node.clone().into_node())?);
        }
        for (i, link) in persisted.links.iter().enumerate() {
            let source = *keys.get(link.source).ok_or(NetworkError::ReferentialIntegrity {
                link: i,
                endpoint: LinkEnd::Source,
            })?;
            let target = *keys.get(link.target).ok_or(NetworkError::ReferentialIntegrity {
                link: i,
                endpoint: LinkEnd::Target,
            })?;
            let payload = Link {
                reversed: link.reversed < 0,
                reversible: link.reversible,
                flux: link.flux,
                width: link.width,
            };
            graph.insert_link(source, target, payload)?;
        }
        graph.suspended = persisted.suspended.clone();
        graph.reindex();
        graph.validate()?;
        Ok(graph)
    }
}
