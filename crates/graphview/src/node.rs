use layout::{LayoutNode, Position};
use serde::{Deserialize, Serialize};

/// Role of a node in the bipartite network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeGroup {
    Reaction,
    #[default]
    Metabolite,
    /// Transient helper created during an interactive gesture. Never persisted.
    Auxiliary,
}

/// A metabolite, reaction or helper node.
///
/// `group_key` is the identity shared by every copy of the same species or
/// reaction (split copies, isolated copies). Two nodes are class-mates when
/// their keys are equal as strings, case included. `label` is display only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "class")]
    pub group_key: String,
    #[serde(default)]
    pub label: String,
    pub group: NodeGroup,
    pub position: Position,
    /// Pinned position. Pin state is a single value so it is all-or-nothing.
    #[serde(default)]
    pub pinned: Option<Position>,
    #[serde(default)]
    pub secondary: bool,
    /// Curvature offsets `[in_dx, in_dy, out_dx, out_dy]` for edges touching this node.
    #[serde(default)]
    pub bezi: Option<[f64; 4]>,
    #[serde(default)]
    pub label_shift: [f64; 2],
    /// Ids of nodes that move together with this one.
    #[serde(default)]
    pub grouping: Vec<String>,
    /// Index of the path constraint this node is bound to.
    #[serde(default)]
    pub trap: Option<usize>,
    /// Display size data, clamped by the node style.
    #[serde(default)]
    pub size: Option<f64>,
}

impl Node {
    pub fn new(id: impl Into<String>, group_key: impl Into<String>, group: NodeGroup) -> Self {
        let group_key = group_key.into();
        Self {
            id: id.into(),
            label: group_key.clone(),
            group_key,
            group,
            position: Position::new(f64::NAN, f64::NAN),
            pinned: None,
            secondary: false,
            bezi: None,
            label_shift: [0.0, 0.0],
            grouping: Vec::new(),
            trap: None,
            size: None,
        }
    }

    pub fn metabolite(id: impl Into<String>, group_key: impl Into<String>) -> Self {
        Self::new(id, group_key, NodeGroup::Metabolite)
    }

    pub fn reaction(id: impl Into<String>, group_key: impl Into<String>) -> Self {
        Self::new(id, group_key, NodeGroup::Reaction)
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Position::new(x, y);
        self
    }

    pub fn is_reaction(&self) -> bool {
        self.group == NodeGroup::Reaction
    }

    pub fn is_metabolite(&self) -> bool {
        self.group == NodeGroup::Metabolite
    }

    pub fn is_auxiliary(&self) -> bool {
        self.group == NodeGroup::Auxiliary
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned.is_some()
    }

    pub fn has_position(&self) -> bool {
        self.position.x.is_finite() && self.position.y.is_finite()
    }

    /// Simulation mass: fixed nodes take no displacement.
    pub fn weight(&self) -> f64 {
        if self.is_pinned() { 0.0 } else { 1.0 }
    }

    pub fn pin_here(&mut self) {
        self.pinned = Some(self.position);
    }
}

impl LayoutNode for Node {
    fn position(&self) -> Position {
        self.position
    }

    fn set_position(&mut self, pos: Position) {
        self.position = pos;
    }

    fn pinned(&self) -> Option<Position> {
        self.pinned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_key_serializes_as_class() {
        let node = Node::metabolite("m1", "atp_c").at(1.0, 2.0);
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["class"], "atp_c");
        assert_eq!(json["group"], "metabolite");

        let back: Node = serde_json::from_value(json).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn test_weight_follows_pin() {
        let mut node = Node::reaction("r1", "PGI").at(0.0, 0.0);
        assert_eq!(node.weight(), 1.0);
        node.pin_here();
        assert_eq!(node.weight(), 0.0);
        assert_eq!(LayoutNode::pinned(&node), Some(Position::new(0.0, 0.0)));
    }
}
