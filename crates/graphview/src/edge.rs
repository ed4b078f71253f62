use serde::{Deserialize, Serialize};

/// Directed link payload. Endpoints live in the graph structure itself:
/// source to target reads "flows into".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Link {
    /// Drawn against its stored direction.
    #[serde(default)]
    pub reversed: bool,
    /// Drawn with heads at both ends when the style asks for it.
    #[serde(default)]
    pub reversible: bool,
    #[serde(default)]
    pub flux: Option<f64>,
    #[serde(default)]
    pub width: Option<f64>,
}

impl Link {
    /// `-1` when reversed, `1` otherwise.
    pub fn orientation(&self) -> i8 {
        if self.reversed { -1 } else { 1 }
    }
}
