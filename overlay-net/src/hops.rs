//! Per-operation, thread-local hop counter.
//!
//! Counters are thread-local so that concurrent lookups issued by the
//! driver's thread pool ("K concurrent popularity lookups") don't step on
//! one another's counts: each thread's recursion into `Network::send`
//! increments only that thread's counter.

use std::cell::Cell;

thread_local! {
    static HOPS: Cell<u32> = const { Cell::new(0) };
}

/// Reset this thread's hop counter to zero, starting a new operation.
pub fn begin_op() {
    HOPS.with(|h| h.set(0));
}

/// Read this thread's hop counter since the last [`begin_op`].
pub fn end_op() -> u32 {
    HOPS.with(|h| h.get())
}

pub(crate) fn record_hop() {
    HOPS.with(|h| h.set(h.get() + 1));
}

/// RAII convenience wrapper around `begin_op`/`end_op`: construct at the
/// start of an operation, read [`HopScope::hops`] once routing has
/// returned.
pub struct HopScope {
    _private: (),
}

impl HopScope {
    pub fn start() -> Self {
        begin_op();
        HopScope { _private: () }
    }

    pub fn hops(&self) -> u32 {
        end_op()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Network;
    use overlay_core::identifier::{Identifier, NodeId};

    #[test]
    fn hop_scope_counts_sends_on_this_thread() {
        let net: Network<u32, u32> = Network::new();
        let a = NodeId::new(Identifier::new(1));
        let b = NodeId::new(Identifier::new(2));
        net.register(a, |_from, req| req + 1);
        net.register(b, |_from, req| req + 1);

        let scope = HopScope::start();
        let r1 = net.send(a, b, 0).unwrap();
        let r2 = net.send(b, a, r1).unwrap();
        assert_eq!(r2, 2);
        assert_eq!(scope.hops(), 2);
    }
}
