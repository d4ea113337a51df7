//! B+ tree node storage.
//!
//! An `Internal`/`Leaf` split living in a flat arena (`Vec<Node<V>>`)
//! addressed by index rather than a `PageId` resolved through a page
//! cache: the index is in-memory and non-persistent, so there is no
//! (de)serialization step.
//!
//! ## Node Types
//!
//! - **Internal**: `keys.len() + 1 == children.len()`. `children[i]` holds
//!   every key `< keys[i]`; `children[i+1]` holds every key `>= keys[i]`.
//! - **Leaf**: holds the actual `(key, values)` pairs plus `next`, a link
//!   to the leaf immediately to its right in key order, so `LocalIndex::scan`
//!   can walk every entry without revisiting internal nodes.

/// A single entry's value list. Insertion order is preserved, per
/// Inserting with an existing key appends, rather than replacing.
pub type ValueList<V> = Vec<V>;

pub enum Node<V> {
    Internal {
        keys: Vec<String>,
        children: Vec<usize>,
    },
    Leaf {
        keys: Vec<String>,
        values: Vec<ValueList<V>>,
        next: Option<usize>,
    },
}

impl<V> Node<V> {
    pub fn empty_leaf() -> Self {
        Node::Leaf {
            keys: Vec::new(),
            values: Vec::new(),
            next: None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }

    pub fn key_count(&self) -> usize {
        match self {
            Node::Internal { keys, .. } => keys.len(),
            Node::Leaf { keys, .. } => keys.len(),
        }
    }

    /// Index of the child that should hold `key`, for internal nodes.
    /// `children[i]` holds keys `< keys[i]`.
    pub fn find_child(&self, key: &str) -> usize {
        match self {
            Node::Internal { keys, .. } => match keys.binary_search_by(|k| k.as_str().cmp(key)) {
                Ok(idx) => idx + 1,
                Err(idx) => idx,
            },
            Node::Leaf { .. } => panic!("find_child called on a leaf"),
        }
    }
}
