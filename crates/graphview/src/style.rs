use layout::{Extent, RouteStyle, Shape};
use serde::{Deserialize, Serialize};

use crate::node::{Node, NodeGroup};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStyle {
    pub shape: Shape,
    pub min_size: f64,
    pub max_size: f64,
}

impl GroupStyle {
    pub fn size_of(&self, node: &Node) -> f64 {
        let min = self.min_size.min(self.max_size);
        let max = self.max_size.max(self.min_size);
        node.size.unwrap_or(min).clamp(min, max)
    }
}

/// Node shapes and sizes used by the router and the collision force.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeStyle {
    pub reaction: GroupStyle,
    pub metabolite: GroupStyle,
    pub auxiliary: GroupStyle,
    pub route: RouteStyle,
}

impl Default for NodeStyle {
    fn default() -> Self {
        Self {
            reaction: GroupStyle {
                shape: Shape::Rectangle,
                min_size: 8.0,
                max_size: 24.0,
            },
            metabolite: GroupStyle {
                shape: Shape::Circle,
                min_size: 10.0,
                max_size: 30.0,
            },
            auxiliary: GroupStyle {
                shape: Shape::Circle,
                min_size: 4.0,
                max_size: 4.0,
            },
            route: RouteStyle::default(),
        }
    }
}

impl NodeStyle {
    pub fn group(&self, group: NodeGroup) -> &GroupStyle {
        match group {
            NodeGroup::Reaction => &self.reaction,
            NodeGroup::Metabolite => &self.metabolite,
            NodeGroup::Auxiliary => &self.auxiliary,
        }
    }

    pub fn extent(&self, node: &Node) -> Extent {
        let style = self.group(node.group);
        Extent::from_shape(style.shape, style.size_of(node))
    }

    pub fn radius(&self, node: &Node) -> f64 {
        self.extent(node).bounding_radius()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_is_clamped_per_group() {
        let style = NodeStyle::default();
        let mut m = Node::metabolite("m", "glc");
        assert_eq!(style.radius(&m), 5.0);
        m.size = Some(1000.0);
        assert_eq!(style.radius(&m), 15.0);

        let r = Node::reaction("r", "HEX1");
        assert!(matches!(
            style.extent(&r),
            Extent::Rect {
                half_width: 4.0,
                half_height: 4.0
            }
        ));
    }
}
