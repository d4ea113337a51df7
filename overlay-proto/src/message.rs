//! The request both overlays forward over `overlay_net::Network` while
//! resolving a key's owner. Shared between Chord and Pastry since both
//! ultimately answer with the owning `NodeId`; Pastry additionally needs
//! the hops already taken, to drive its cycle guard.

use overlay_core::identifier::{KeyId, NodeId};

#[derive(Debug, Clone)]
pub struct FindOwnerRequest {
    pub key_id: KeyId,
    /// Nodes already visited by this routing operation, oldest first.
    /// Unused by Chord; consulted by Pastry's termination guard.
    pub visited: Vec<NodeId>,
}

impl FindOwnerRequest {
    pub fn new(key_id: KeyId) -> Self {
        FindOwnerRequest { key_id, visited: Vec::new() }
    }

    pub fn visiting(mut self, node: NodeId) -> Self {
        self.visited.push(node);
        self
    }
}

pub type FindOwnerResponse = NodeId;
