//! Chord and Pastry routing protocols layered over the hop-counted
//! delivery substrate: ring/matrix topology, the uniform operation API,
//! and the overlay factory used to stand either one up.

pub mod api;
pub mod chord;
pub mod config;
pub mod message;
pub mod overlay;
pub mod pastry;

pub mod prelude {
    pub use crate::api::{OpResult, OperationApi};
    pub use crate::chord::ChordOverlay;
    pub use crate::config::OverlayConfig;
    pub use crate::overlay::{new_chord, new_pastry, Overlay, Protocol};
    pub use crate::pastry::PastryOverlay;
}
