use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Position) -> f64 {
        ((other.x - self.x).powi(2) + (other.y - self.y).powi(2)).sqrt()
    }

    pub fn offset(&self, dx: f64, dy: f64) -> Position {
        Position::new(self.x + dx, self.y + dy)
    }

    pub fn lerp(&self, other: &Position, t: f64) -> Position {
        Position::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
        )
    }

    /// Mean of a set of positions, `None` when the set is empty.
    pub fn centroid<'a>(points: impl IntoIterator<Item = &'a Position>) -> Option<Position> {
        let mut sum = Position::default();
        let mut count = 0usize;
        for p in points {
            sum.x += p.x;
            sum.y += p.y;
            count += 1;
        }
        if count == 0 {
            return None;
        }
        Some(Position::new(sum.x / count as f64, sum.y / count as f64))
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum LayoutError {
    #[error("node index {0} is out of range")]
    InvalidNodeIndex(usize),
    #[error("simulation cache holds {expected} nodes but {found} were supplied; rebuild after structural edits")]
    StaleCache { expected: usize, found: usize },
    #[error("invalid force configuration: {0}")]
    InvalidConfig(String),
}

/// Trait for layout-compatible node structures.
///
/// The simulation never owns nodes. It writes positions back through this
/// trait on every tick and re-reads pins, since those may change between ticks.
pub trait LayoutNode {
    fn position(&self) -> Position;
    fn set_position(&mut self, pos: Position);
    /// Pinned position, if the node is fixed.
    fn pinned(&self) -> Option<Position>;
}

/// Per-node state read once when the simulation caches are rebuilt.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BodySpec {
    pub position: Position,
    pub pinned: Option<Position>,
    pub secondary: bool,
    /// Rendered radius used by the collision force.
    pub radius: f64,
    /// Index of the path constraint this node is bound to.
    pub trap: Option<usize>,
}

/// Knobs of the force simulation. Supplied by the surrounding application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForceConfig {
    /// Target separation along every link.
    pub link_distance: f64,
    /// Overrides the degree-based default link strength.
    pub link_strength: Option<f64>,
    /// Negative values repel.
    pub charge_strength: f64,
    /// Pairs further apart than this do not interact.
    pub charge_distance_max: f64,
    pub secondary_charge_strength: f64,
    pub collision_padding: f64,
    pub collision_strength: f64,
    /// Fraction of velocity removed on every tick.
    pub velocity_decay: f64,
    pub center_strength: f64,
    pub secondary_center_strength: f64,
    pub center: Position,
    pub alpha_min: f64,
    pub alpha_decay: f64,
    pub alpha_target: f64,
    pub seed: u64,
}

impl Default for ForceConfig {
    fn default() -> Self {
        let alpha_min = 0.001;
        Self {
            link_distance: 60.0,
            link_strength: None,
            charge_strength: -120.0,
            charge_distance_max: 400.0,
            secondary_charge_strength: -20.0,
            collision_padding: 4.0,
            collision_strength: 0.7,
            velocity_decay: 0.4,
            center_strength: 0.02,
            secondary_center_strength: 0.3,
            center: Position::new(400.0, 300.0),
            alpha_min,
            // settles in roughly 300 ticks
            alpha_decay: 1.0 - alpha_min.powf(1.0 / 300.0),
            alpha_target: 0.0,
            seed: 0x5eed,
        }
    }
}

impl ForceConfig {
    /// A configuration with every force disabled except the link spring.
    pub fn springs_only(link_distance: f64) -> Self {
        Self {
            link_distance,
            charge_strength: 0.0,
            secondary_charge_strength: 0.0,
            collision_strength: 0.0,
            center_strength: 0.0,
            secondary_center_strength: 0.0,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), LayoutError> {
        if !(0.0..1.0).contains(&self.velocity_decay) {
            return Err(LayoutError::InvalidConfig(format!(
                "velocity_decay must be in [0, 1), got {}",
                self.velocity_decay
            )));
        }
        if !(0.0..=1.0).contains(&self.alpha_decay) {
            return Err(LayoutError::InvalidConfig(format!(
                "alpha_decay must be in [0, 1], got {}",
                self.alpha_decay
            )));
        }
        if self.link_distance < 0.0 || self.charge_distance_max <= 0.0 {
            return Err(LayoutError::InvalidConfig(
                "distances must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
