//! # overlay-net
//!
//! The in-process delivery substrate the overlays route over:
//! endpoint registration, synchronous request/response
//! `send`, and the per-operation hop counter both overlays thread through
//! their routing recursion.
//!
//! A map from peer id to a handler, dispatched synchronously, since
//! delivery here is never asynchronous or concurrent.

pub mod hops;
pub mod registry;

pub use hops::{begin_op, end_op, HopScope};
pub use registry::Network;

pub mod prelude {
    pub use crate::hops::{begin_op, end_op, HopScope};
    pub use crate::registry::{Endpoint, Network};
}
