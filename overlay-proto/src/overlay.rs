//! A single overlay type tagged by protocol, dispatching to whichever
//! concrete implementation it wraps rather than modeling Chord and Pastry
//! as a shared base type — the two route completely differently, and a
//! trait object would hide which one a caller is really talking to.

use overlay_core::error::Result;
use overlay_core::hash::KeyHasher;
use overlay_core::identifier::NodeId;
use overlay_core::record::Record;

use crate::api::{OpResult, OperationApi};
use crate::chord::ChordOverlay;
use crate::config::OverlayConfig;
use crate::pastry::PastryOverlay;

/// Which protocol this overlay runs, named for aggregation output
/// (`protocol_tag` in driver statistics).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Chord,
    Pastry,
}

impl Protocol {
    pub fn tag(self) -> &'static str {
        match self {
            Protocol::Chord => "chord",
            Protocol::Pastry => "pastry",
        }
    }
}

pub enum Overlay<H: KeyHasher> {
    Chord(ChordOverlay<H>),
    Pastry(PastryOverlay<H>),
}

impl<H: KeyHasher + 'static> Clone for Overlay<H> {
    fn clone(&self) -> Self {
        match self {
            Overlay::Chord(o) => Overlay::Chord(o.clone()),
            Overlay::Pastry(o) => Overlay::Pastry(o.clone()),
        }
    }
}

impl<H: KeyHasher + 'static> Overlay<H> {
    pub fn protocol(&self) -> Protocol {
        match self {
            Overlay::Chord(_) => Protocol::Chord,
            Overlay::Pastry(_) => Protocol::Pastry,
        }
    }
}

/// Build a Chord overlay over `node_ids`, using `m` bits of identifier
/// space and the given successor-list length; every other knob keeps the
/// configuration default.
pub fn new_chord<H: KeyHasher + 'static>(
    m: u32,
    r: usize,
    hasher: H,
    node_ids: Vec<NodeId>,
) -> Result<Overlay<H>> {
    let config = OverlayConfig { m, r, ..OverlayConfig::default() };
    ChordOverlay::build(config, hasher, node_ids).map(Overlay::Chord)
}

/// Build a Pastry overlay over `node_ids`, using `m` bits of identifier
/// space, base-`2^b` digits, and a leaf set of size `l`.
pub fn new_pastry<H: KeyHasher + 'static>(
    m: u32,
    b: u32,
    l: usize,
    hasher: H,
    node_ids: Vec<NodeId>,
) -> Result<Overlay<H>> {
    let config = OverlayConfig { m, b, l, ..OverlayConfig::default() };
    PastryOverlay::build(config, hasher, node_ids).map(Overlay::Pastry)
}

impl<H: KeyHasher + 'static> OperationApi for Overlay<H> {
    fn insert(&self, key: &str, value: Record) -> Result<OpResult<()>> {
        match self {
            Overlay::Chord(o) => o.insert(key, value),
            Overlay::Pastry(o) => o.insert(key, value),
        }
    }

    fn lookup(&self, key: &str) -> Result<OpResult<Option<Vec<Record>>>> {
        match self {
            Overlay::Chord(o) => o.lookup(key),
            Overlay::Pastry(o) => o.lookup(key),
        }
    }

    fn delete(&self, key: &str) -> Result<OpResult<bool>> {
        match self {
            Overlay::Chord(o) => o.delete(key),
            Overlay::Pastry(o) => o.delete(key),
        }
    }

    fn update(&self, key: &str, value: Record) -> Result<OpResult<bool>> {
        match self {
            Overlay::Chord(o) => o.update(key, value),
            Overlay::Pastry(o) => o.update(key, value),
        }
    }

    fn join(&self, new_id: NodeId) -> Result<OpResult<()>> {
        match self {
            Overlay::Chord(o) => o.join(new_id),
            Overlay::Pastry(o) => o.join(new_id),
        }
    }

    fn leave(&self, id: NodeId) -> Result<OpResult<()>> {
        match self {
            Overlay::Chord(o) => o.leave(id),
            Overlay::Pastry(o) => o.leave(id),
        }
    }

    fn node_count(&self) -> usize {
        match self {
            Overlay::Chord(o) => o.node_count(),
            Overlay::Pastry(o) => o.node_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overlay_core::hash::HashFn;
    use overlay_core::identifier::Identifier;

    fn node(n: u64) -> NodeId {
        NodeId::new(Identifier::new(n))
    }

    #[test]
    fn chord_and_pastry_factories_both_answer_the_same_api() {
        let chord = new_chord(16, 4, HashFn::new(16), vec![node(1), node(2), node(3)]).unwrap();
        let pastry = new_pastry(16, 4, 4, HashFn::new(16), vec![node(1), node(2), node(3)]).unwrap();

        assert_eq!(chord.protocol(), Protocol::Chord);
        assert_eq!(pastry.protocol(), Protocol::Pastry);

        chord.insert("widget", Record::new().with("id", 1i64)).unwrap();
        pastry.insert("widget", Record::new().with("id", 1i64)).unwrap();
        assert!(chord.lookup("widget").unwrap().value.is_some());
        assert!(pastry.lookup("widget").unwrap().value.is_some());
    }

    #[test]
    fn protocol_tag_is_lowercase() {
        assert_eq!(Protocol::Chord.tag(), "chord");
        assert_eq!(Protocol::Pastry.tag(), "pastry");
    }
}
