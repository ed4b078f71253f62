//! Force-directed layout and edge geometry for node-link diagrams.
//!
//! The crate is agnostic of what the nodes represent: callers adapt their own
//! node type through [`LayoutNode`] and feed links as index pairs.

pub mod force;
pub mod router;
pub mod svg;
pub mod types;

pub use force::{Simulation, TickOutcome, initial_position, project_onto_polyline};
pub use router::{
    ArrowHead, ArrowMode, EdgeGeometry, Endpoint, Extent, HeadShape, RouteStyle, Shape,
    auto_bezi, route_link,
};
pub use types::*;
