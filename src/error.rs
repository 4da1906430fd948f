// WHY: Typed conditions callers may want to match on after an anyhow::Result bubbles up
// Per-match stale conditions are not errors and live in rewrite::StaleReason instead

use thiserror::Error;

use crate::document::{NodeKey, NodeKind};

/// Reportable failures of the editing core
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Host document cannot hold marker spans; fatal at attach time
    #[error("node kind {0:?} is not registered with the document")]
    MarkerKindNotRegistered(NodeKind),

    #[error("invalid terminator pattern {pattern:?}: {reason}")]
    InvalidTerminatorPattern { pattern: String, reason: String },

    #[error("node {0} does not exist")]
    UnknownNode(NodeKey),

    #[error("node {0} is not a marker span")]
    NotAMarker(NodeKey),

    #[error("node {0} is not a text span")]
    NotAText(NodeKey),

    #[error("cannot split node {key} at offset {offset} (length {len})")]
    SplitOutOfRange { key: NodeKey, offset: usize, len: usize },
}
