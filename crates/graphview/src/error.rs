use layout::LayoutError;
use thiserror::Error;

/// Which end of a link failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEnd {
    Source,
    Target,
}

impl std::fmt::Display for LinkEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkEnd::Source => write!(f, "source"),
            LinkEnd::Target => write!(f, "target"),
        }
    }
}

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("unknown node: {0}")]
    UnknownNode(String),

    #[error("node id already in use: {0}")]
    DuplicateId(String),

    #[error("link {link} has a dangling {endpoint} reference")]
    ReferentialIntegrity { link: usize, endpoint: LinkEnd },

    #[error("unknown graph: {0}")]
    UnknownGraph(String),

    #[error("graph already exists: {0}")]
    GraphExists(String),

    #[error("cannot remove the last remaining graph")]
    LastGraph,

    #[error("no suspended node with id {0}")]
    NotSuspended(String),

    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Layout(#[from] LayoutError),
}

pub type Result<T, E = NetworkError> = std::result::Result<T, E>;
