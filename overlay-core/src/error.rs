//! Shared error kinds.
//!
//! Hand-rolled `Display` + `std::error::Error` impls rather than a
//! `thiserror` derive.

use core::fmt;

use crate::identifier::NodeId;

pub type Result<T> = core::result::Result<T, OverlayError>;

/// Error kinds that can surface from `overlay-core`, `overlay-net` and
/// `overlay-proto`. Names are semantic, not type identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayError {
    /// `join` requested an already-live node id.
    DuplicateId(NodeId),
    /// `leave`/route targeted a non-live node id.
    UnknownNode(NodeId),
    /// The `Network` was asked to deliver to an unregistered endpoint.
    UnknownPeer(NodeId),
    /// Routing exhausted without converging (Pastry cycle guard tripped
    /// with no remaining improvement).
    UnreachableOwner { started_from: NodeId },
    /// `leave` would remove the last live node.
    EmptyOverlayForbidden,
    /// `OverlayConfig::validate` rejected a factory's configuration.
    InvalidConfig(String),
}

impl fmt::Display for OverlayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverlayError::DuplicateId(id) => write!(f, "node {id} is already live"),
            OverlayError::UnknownNode(id) => write!(f, "node {id} is not live"),
            OverlayError::UnknownPeer(id) => write!(f, "no endpoint registered for node {id}"),
            OverlayError::UnreachableOwner { started_from } => {
                write!(f, "routing from {started_from} did not converge on an owner")
            }
            OverlayError::EmptyOverlayForbidden => {
                write!(f, "leave rejected: would empty the overlay")
            }
            OverlayError::InvalidConfig(reason) => write!(f, "invalid overlay config: {reason}"),
        }
    }
}

impl std::error::Error for OverlayError {}
