//! Editable metabolite–reaction networks.
//!
//! [`GraphModel`] holds one bipartite network; [`GraphSession`] ties a
//! registry of named networks to selection, undo history and the force layout.

pub mod edge;
pub mod error;
pub mod graph;
pub mod history;
pub mod node;
pub mod ops;
pub mod persist;
pub mod registry;
pub mod search;
pub mod session;
pub mod style;

pub use edge::Link;
pub use error::{LinkEnd, NetworkError, Result};
pub use graph::{GraphModel, LinkKey, LinkRole, LinkView, NeighborToken, NodeKey, SuspendedToken};
pub use history::{Commit, History};
pub use node::{Node, NodeGroup};
pub use ops::RestoreReport;
pub use persist::{PersistedGraph, PersistedHistory, PersistedLink, PersistedNode, SessionSnapshot};
pub use registry::GraphRegistry;
pub use search::{SearchBudget, SearchOutcome};
pub use session::{GraphSession, SessionConfig};
pub use style::{GroupStyle, NodeStyle};
