//! Endpoint registry and synchronous request/response delivery.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use overlay_core::error::OverlayError;
use overlay_core::identifier::NodeId;

use crate::hops::record_hop;

/// Anything that can be registered as a node's endpoint: given the sender
/// and a request, produce a response. Blanket-implemented for closures so
/// callers rarely need to name this trait directly.
pub trait Endpoint<Req, Resp>: Send + Sync {
    fn handle(&self, from: NodeId, request: Req) -> Resp;
}

impl<Req, Resp, F> Endpoint<Req, Resp> for F
where
    F: Fn(NodeId, Req) -> Resp + Send + Sync,
{
    fn handle(&self, from: NodeId, request: Req) -> Resp {
        self(from, request)
    }
}

type BoxedEndpoint<Req, Resp> = Arc<dyn Endpoint<Req, Resp>>;

/// The process-wide delivery fabric. Generic over the
/// request/response payload so `overlay-proto` can plug in its own
/// message type without this crate depending on it.
///
/// The registry lock is held only long enough to resolve the target
/// endpoint; the endpoint itself runs outside the lock, matching
/// the rule that `send` acquires a short lock only to resolve the
/// endpoint, never during delivery.
pub struct Network<Req, Resp> {
    endpoints: Mutex<BTreeMap<NodeId, BoxedEndpoint<Req, Resp>>>,
}

impl<Req, Resp> Default for Network<Req, Resp> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Req, Resp> Network<Req, Resp> {
    pub fn new() -> Self {
        Network {
            endpoints: Mutex::new(BTreeMap::new()),
        }
    }

    /// Bind `endpoint` to `node_id`, replacing any prior binding.
    pub fn register<F>(&self, node_id: NodeId, endpoint: F)
    where
        F: Fn(NodeId, Req) -> Resp + Send + Sync + 'static,
    {
        let mut endpoints = self.endpoints.lock().unwrap();
        endpoints.insert(node_id, Arc::new(endpoint));
        tracing::trace!(%node_id, "endpoint registered");
    }

    /// Remove `node_id`'s endpoint. Returns whether one was present.
    pub fn unregister(&self, node_id: NodeId) -> bool {
        let mut endpoints = self.endpoints.lock().unwrap();
        let existed = endpoints.remove(&node_id).is_some();
        tracing::trace!(%node_id, existed, "endpoint unregistered");
        existed
    }

    pub fn is_registered(&self, node_id: NodeId) -> bool {
        self.endpoints.lock().unwrap().contains_key(&node_id)
    }

    /// Deliver `request` from `from` to `to`, incrementing this thread's
    /// hop counter by one. Fails with `UnknownPeer` if `to` has no
    /// registered endpoint.
    pub fn send(&self, from: NodeId, to: NodeId, request: Req) -> overlay_core::error::Result<Resp> {
        let endpoint = {
            let endpoints = self.endpoints.lock().unwrap();
            endpoints.get(&to).cloned()
        };
        match endpoint {
            Some(ep) => {
                record_hop();
                Ok(ep.handle(from, request))
            }
            None => Err(OverlayError::UnknownPeer(to)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overlay_core::identifier::Identifier;

    fn node(n: u64) -> NodeId {
        NodeId::new(Identifier::new(n))
    }

    #[test]
    fn send_to_unregistered_peer_fails() {
        let net: Network<u32, u32> = Network::new();
        let err = net.send(node(1), node(2), 0).unwrap_err();
        assert_eq!(err, OverlayError::UnknownPeer(node(2)));
    }

    #[test]
    fn register_then_send_invokes_endpoint_with_sender() {
        let net: Network<u32, (NodeId, u32)> = Network::new();
        net.register(node(2), |from, req| (from, req * 2));
        let (seen_from, resp) = net.send(node(1), node(2), 21).unwrap();
        assert_eq!(seen_from, node(1));
        assert_eq!(resp, 42);
    }

    #[test]
    fn unregister_removes_endpoint() {
        let net: Network<u32, u32> = Network::new();
        net.register(node(2), |_from, req| req);
        assert!(net.unregister(node(2)));
        assert!(!net.unregister(node(2)));
        assert!(net.send(node(1), node(2), 0).is_err());
    }

    #[test]
    fn re_registering_replaces_the_prior_endpoint() {
        let net: Network<u32, u32> = Network::new();
        net.register(node(2), |_from, req| req + 1);
        net.register(node(2), |_from, req| req + 100);
        assert_eq!(net.send(node(1), node(2), 0).unwrap(), 100);
    }
}
