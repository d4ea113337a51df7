//! The uniform operation surface both overlays implement.

use overlay_core::error::Result;
use overlay_core::identifier::NodeId;
use overlay_core::record::Record;

/// The outcome of a single operation: its return value, the hops it
/// consumed, and the node that ultimately handled it.
#[derive(Debug, Clone, PartialEq)]
pub struct OpResult<T> {
    pub value: T,
    pub hops: u32,
    pub owner: NodeId,
}

impl<T> OpResult<T> {
    pub fn new(value: T, hops: u32, owner: NodeId) -> Self {
        OpResult { value, hops, owner }
    }
}

/// `build`, `insert`, `lookup`, `delete`, `update`, `join`, `leave` —
/// implemented once for `ChordOverlay` and once for `PastryOverlay`
/// `build` itself is a constructor on each overlay type
/// rather than a trait method, since it has no `&self` to dispatch on.
pub trait OperationApi {
    fn insert(&self, key: &str, value: Record) -> Result<OpResult<()>>;
    fn lookup(&self, key: &str) -> Result<OpResult<Option<Vec<Record>>>>;
    fn delete(&self, key: &str) -> Result<OpResult<bool>>;
    fn update(&self, key: &str, value: Record) -> Result<OpResult<bool>>;
    fn join(&self, new_id: NodeId) -> Result<OpResult<()>>;
    fn leave(&self, id: NodeId) -> Result<OpResult<()>>;

    /// Live node count, for hop-bound statistics.
    fn node_count(&self) -> usize;
}
