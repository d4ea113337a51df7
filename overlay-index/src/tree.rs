//! `LocalIndex`: the per-node B+ tree.

use crate::node::Node;

/// Branching factor `t` bounds: every internal node holds between
/// `ceil(t/2) - 1` and `t - 1` separator keys, except the root.
fn min_keys(t: usize) -> usize {
    t.div_ceil(2).saturating_sub(1)
}

fn max_keys(t: usize) -> usize {
    t - 1
}

/// In-memory B+ tree keyed by normalized string, ordered lexicographically,
/// with a leaf-level linked list for in-order scan.
///
/// Not `Send`/`Sync` on its own; callers that need per-node serialization
/// under concurrent access wrap it in a `Mutex`.
pub struct LocalIndex<V> {
    arena: Vec<Node<V>>,
    root: usize,
    t: usize,
}

impl<V: Clone> LocalIndex<V> {
    pub const DEFAULT_T: usize = 4;

    pub fn new(t: usize) -> Self {
        assert!(t >= 3, "branching factor must be >= 3");
        LocalIndex {
            arena: vec![Node::empty_leaf()],
            root: 0,
            t,
        }
    }

    pub fn t(&self) -> usize {
        self.t
    }

    /// `insert(k, v)`: append `v` to the value list at `k`; create the key
    /// if absent. Always succeeds.
    pub fn insert(&mut self, key: &str, value: V) {
        if let Some((sep, new_idx)) = self.insert_rec(self.root, key, value) {
            let old_root = self.root;
            let new_root = Node::Internal {
                keys: vec![sep],
                children: vec![old_root, new_idx],
            };
            self.arena.push(new_root);
            self.root = self.arena.len() - 1;
        }
    }

    /// `lookup(k) -> list|None`.
    pub fn lookup(&self, key: &str) -> Option<&[V]> {
        let leaf = self.find_leaf(self.root, key);
        match &self.arena[leaf] {
            Node::Leaf { keys, values, .. } => keys
                .iter()
                .position(|k| k == key)
                .map(|i| values[i].as_slice()),
            Node::Internal { .. } => unreachable!("find_leaf always returns a leaf"),
        }
    }

    /// `delete(k) -> bool`: removes the entire key; returns whether
    /// anything was removed.
    pub fn delete(&mut self, key: &str) -> bool {
        let (removed, underflow) = self.delete_rec(self.root, key);
        let _ = underflow; // root underflow for a leaf root is never a structural problem
        if let Node::Internal { keys, children, .. } = &self.arena[self.root] {
            if keys.is_empty() {
                self.root = children[0];
            }
        }
        removed
    }

    /// `update(k, v) -> bool`: replaces the value list with `[v]` iff `k`
    /// exists; returns whether it did.
    pub fn update(&mut self, key: &str, value: V) -> bool {
        let leaf = self.find_leaf(self.root, key);
        match &mut self.arena[leaf] {
            Node::Leaf { keys, values, .. } => match keys.iter().position(|k| k == key) {
                Some(i) => {
                    values[i] = vec![value];
                    true
                }
                None => false,
            },
            Node::Internal { .. } => unreachable!(),
        }
    }

    /// `scan() -> iterator of (k, list)` in sorted key order, walking the
    /// leaf linked list rather than re-descending the tree.
    pub fn scan(&self) -> impl Iterator<Item = (&str, &[V])> {
        let mut leaf = self.leftmost_leaf(self.root);
        let mut pending: Vec<(&str, &[V])> = Vec::new();
        loop {
            match &self.arena[leaf] {
                Node::Leaf { keys, values, next } => {
                    for (k, v) in keys.iter().zip(values.iter()) {
                        pending.push((k.as_str(), v.as_slice()));
                    }
                    match next {
                        Some(n) => leaf = *n,
                        None => break,
                    }
                }
                Node::Internal { .. } => unreachable!(),
            }
        }
        pending.into_iter()
    }

    pub fn len(&self) -> usize {
        self.scan().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ---- internal descent helpers ----

    fn find_leaf(&self, mut node_idx: usize, key: &str) -> usize {
        loop {
            match &self.arena[node_idx] {
                Node::Leaf { .. } => return node_idx,
                node @ Node::Internal { children, .. } => {
                    let child_pos = node.find_child(key);
                    node_idx = children[child_pos];
                }
            }
        }
    }

    fn leftmost_leaf(&self, mut node_idx: usize) -> usize {
        loop {
            match &self.arena[node_idx] {
                Node::Leaf { .. } => return node_idx,
                Node::Internal { children, .. } => node_idx = children[0],
            }
        }
    }

    // ---- insert ----

    /// Returns `Some((separator_key, new_right_sibling_idx))` if `node_idx`
    /// split as a result of the insert.
    fn insert_rec(&mut self, node_idx: usize, key: &str, value: V) -> Option<(String, usize)> {
        let is_leaf = self.arena[node_idx].is_leaf();
        if is_leaf {
            return self.insert_into_leaf(node_idx, key, value);
        }

        let child_pos = self.arena[node_idx].find_child(key);
        let child_idx = match &self.arena[node_idx] {
            Node::Internal { children, .. } => children[child_pos],
            Node::Leaf { .. } => unreachable!(),
        };

        let split = self.insert_rec(child_idx, key, value)?;
        let (sep, new_child_idx) = split;

        if let Node::Internal { keys, children, .. } = &mut self.arena[node_idx] {
            keys.insert(child_pos, sep);
            children.insert(child_pos + 1, new_child_idx);
        }

        if self.arena[node_idx].key_count() > max_keys(self.t) {
            return Some(self.split_internal(node_idx));
        }
        None
    }

    fn insert_into_leaf(&mut self, node_idx: usize, key: &str, value: V) -> Option<(String, usize)> {
        if let Node::Leaf { keys, values, .. } = &mut self.arena[node_idx] {
            match keys.binary_search_by(|k| k.as_str().cmp(key)) {
                Ok(i) => {
                    values[i].push(value);
                    return None;
                }
                Err(i) => {
                    keys.insert(i, key.to_string());
                    values.insert(i, vec![value]);
                }
            }
        }
        if self.arena[node_idx].key_count() > max_keys(self.t) {
            return Some(self.split_leaf(node_idx));
        }
        None
    }

    fn split_leaf(&mut self, node_idx: usize) -> (String, usize) {
        let (right_keys, right_values, right_next) = match &mut self.arena[node_idx] {
            Node::Leaf { keys, values, next } => {
                let mid = keys.len() / 2;
                let right_keys = keys.split_off(mid);
                let right_values = values.split_off(mid);
                let right_next = *next;
                (right_keys, right_values, right_next)
            }
            Node::Internal { .. } => unreachable!(),
        };
        let separator = right_keys[0].clone();
        let right_node = Node::Leaf {
            keys: right_keys,
            values: right_values,
            next: right_next,
        };
        self.arena.push(right_node);
        let right_idx = self.arena.len() - 1;
        if let Node::Leaf { next, .. } = &mut self.arena[node_idx] {
            *next = Some(right_idx);
        }
        (separator, right_idx)
    }

    fn split_internal(&mut self, node_idx: usize) -> (String, usize) {
        let (promoted, right_keys, right_children) = match &mut self.arena[node_idx] {
            Node::Internal { keys, children } => {
                let mid = keys.len() / 2;
                let promoted = keys[mid].clone();
                let right_keys = keys.split_off(mid + 1);
                keys.truncate(mid);
                let right_children = children.split_off(mid + 1);
                (promoted, right_keys, right_children)
            }
            Node::Leaf { .. } => unreachable!(),
        };
        let right_node = Node::Internal {
            keys: right_keys,
            children: right_children,
        };
        self.arena.push(right_node);
        let right_idx = self.arena.len() - 1;
        tracing::trace!(node_idx, right_idx, "internal node split");
        (promoted, right_idx)
    }

    // ---- delete ----

    /// Returns `(removed, underflow)`: whether `key` was found and removed,
    /// and whether `node_idx` now holds fewer than `min_keys(t)` keys
    /// (irrelevant for the root, which the caller handles separately).
    fn delete_rec(&mut self, node_idx: usize, key: &str) -> (bool, bool) {
        if self.arena[node_idx].is_leaf() {
            return self.delete_from_leaf(node_idx, key);
        }

        let child_pos = self.arena[node_idx].find_child(key);
        let child_idx = match &self.arena[node_idx] {
            Node::Internal { children, .. } => children[child_pos],
            Node::Leaf { .. } => unreachable!(),
        };

        let (removed, child_underflow) = self.delete_rec(child_idx, key);
        if !removed {
            return (false, false);
        }

        let mut self_underflow = false;
        if child_underflow {
            self_underflow = self.fix_underflow(node_idx, child_pos);
        }
        (true, self_underflow)
    }

    fn delete_from_leaf(&mut self, node_idx: usize, key: &str) -> (bool, bool) {
        let removed = if let Node::Leaf { keys, values, .. } = &mut self.arena[node_idx] {
            match keys.binary_search_by(|k| k.as_str().cmp(key)) {
                Ok(i) => {
                    keys.remove(i);
                    values.remove(i);
                    true
                }
                Err(_) => false,
            }
        } else {
            unreachable!()
        };
        if !removed {
            return (false, false);
        }
        let underflow = self.arena[node_idx].key_count() < min_keys(self.t);
        (true, underflow)
    }

    /// Fix an underflowing child at `parent.children[child_pos]` by
    /// borrowing a key from a sibling that has more than `min_keys(t)`, or
    /// merging with a sibling that doesn't. Returns whether `parent` itself
    /// now underflows.
    fn fix_underflow(&mut self, parent_idx: usize, child_pos: usize) -> bool {
        let (left_sib, right_sib) = match &self.arena[parent_idx] {
            Node::Internal { children, .. } => (
                if child_pos > 0 { Some(child_pos - 1) } else { None },
                if child_pos + 1 < children.len() { Some(child_pos + 1) } else { None },
            ),
            Node::Leaf { .. } => unreachable!(),
        };

        if let Some(left_pos) = left_sib {
            let left_idx = self.child_at(parent_idx, left_pos);
            if self.arena[left_idx].key_count() > min_keys(self.t) {
                self.borrow_from_left(parent_idx, left_pos, child_pos);
                return false;
            }
        }
        if let Some(right_pos) = right_sib {
            let right_idx = self.child_at(parent_idx, right_pos);
            if self.arena[right_idx].key_count() > min_keys(self.t) {
                self.borrow_from_right(parent_idx, child_pos, right_pos);
                return false;
            }
        }

        // Both siblings (whichever exists) are at minimum: merge.
        if let Some(left_pos) = left_sib {
            self.merge_children(parent_idx, left_pos, child_pos)
        } else if let Some(right_pos) = right_sib {
            self.merge_children(parent_idx, child_pos, right_pos)
        } else {
            // Only child of the root; nothing to rebalance against.
            false
        }
    }

    fn child_at(&self, parent_idx: usize, pos: usize) -> usize {
        match &self.arena[parent_idx] {
            Node::Internal { children, .. } => children[pos],
            Node::Leaf { .. } => unreachable!(),
        }
    }

    fn two_mut(&mut self, i: usize, j: usize) -> (&mut Node<V>, &mut Node<V>) {
        assert_ne!(i, j);
        if i < j {
            let (l, r) = self.arena.split_at_mut(j);
            (&mut l[i], &mut r[0])
        } else {
            let (l, r) = self.arena.split_at_mut(i);
            (&mut r[0], &mut l[j])
        }
    }

    fn borrow_from_left(&mut self, parent_idx: usize, left_pos: usize, child_pos: usize) {
        let left_idx = self.child_at(parent_idx, left_pos);
        let child_idx = self.child_at(parent_idx, child_pos);
        let parent_sep = self.separator(parent_idx, left_pos);

        let new_separator = {
            let (left, child) = self.two_mut(left_idx, child_idx);
            match (left, child) {
                (
                    Node::Leaf { keys: lk, values: lv, .. },
                    Node::Leaf { keys: ck, values: cv, .. },
                ) => {
                    let k = lk.pop().unwrap();
                    let v = lv.pop().unwrap();
                    ck.insert(0, k.clone());
                    cv.insert(0, v);
                    k
                }
                (
                    Node::Internal { keys: lk, children: lc, .. },
                    Node::Internal { keys: ck, children: cc, .. },
                ) => {
                    let borrowed_child = lc.pop().unwrap();
                    let borrowed_key = lk.pop().unwrap();
                    ck.insert(0, parent_sep);
                    cc.insert(0, borrowed_child);
                    borrowed_key
                }
                _ => unreachable!("siblings at the same tree level have the same node kind"),
            }
        };
        self.set_separator(parent_idx, left_pos, &new_separator);
    }

    fn borrow_from_right(&mut self, parent_idx: usize, child_pos: usize, right_pos: usize) {
        let child_idx = self.child_at(parent_idx, child_pos);
        let right_idx = self.child_at(parent_idx, right_pos);
        let parent_sep = self.separator(parent_idx, child_pos);

        let new_separator = {
            let (child, right) = self.two_mut(child_idx, right_idx);
            match (child, right) {
                (
                    Node::Leaf { keys: ck, values: cv, .. },
                    Node::Leaf { keys: rk, values: rv, .. },
                ) => {
                    let k = rk.remove(0);
                    let v = rv.remove(0);
                    ck.push(k);
                    cv.push(v);
                    rk[0].clone()
                }
                (
                    Node::Internal { keys: ck, children: cc, .. },
                    Node::Internal { keys: rk, children: rc, .. },
                ) => {
                    let borrowed_child = rc.remove(0);
                    let borrowed_key = rk.remove(0);
                    ck.push(parent_sep);
                    cc.push(borrowed_child);
                    borrowed_key
                }
                _ => unreachable!("siblings at the same tree level have the same node kind"),
            }
        };
        self.set_separator(parent_idx, child_pos, &new_separator);
    }

    fn separator(&self, parent_idx: usize, pos: usize) -> String {
        match &self.arena[parent_idx] {
            Node::Internal { keys, .. } => keys[pos].clone(),
            Node::Leaf { .. } => unreachable!(),
        }
    }

    fn set_separator(&mut self, parent_idx: usize, pos: usize, value: &str) {
        if let Node::Internal { keys, .. } = &mut self.arena[parent_idx] {
            keys[pos] = value.to_string();
        }
    }

    /// Merge `children[left_pos]` and `children[right_pos] == left_pos + 1`
    /// into the left slot, dropping the separator between them from
    /// `parent`. Returns whether `parent` now underflows.
    fn merge_children(&mut self, parent_idx: usize, left_pos: usize, right_pos: usize) -> bool {
        debug_assert_eq!(right_pos, left_pos + 1);
        let left_idx = self.child_at(parent_idx, left_pos);
        let right_idx = self.child_at(parent_idx, right_pos);
        let sep = self.separator(parent_idx, left_pos);

        let (left, right) = self.two_mut(left_idx, right_idx);
        match (left, right) {
            (
                Node::Leaf { keys: lk, values: lv, next: ln },
                Node::Leaf { keys: rk, values: rv, next: rn },
            ) => {
                lk.extend(rk.drain(..));
                lv.extend(rv.drain(..));
                *ln = *rn;
            }
            (
                Node::Internal { keys: lk, children: lc, .. },
                Node::Internal { keys: rk, children: rc, .. },
            ) => {
                lk.push(sep);
                lk.extend(rk.drain(..));
                lc.extend(rc.drain(..));
            }
            _ => unreachable!("siblings at the same tree level have the same node kind"),
        }

        if let Node::Internal { keys, children, .. } = &mut self.arena[parent_idx] {
            keys.remove(left_pos);
            children.remove(right_pos);
        }
        self.arena[parent_idx].key_count() < min_keys(self.t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_lookup_round_trips() {
        let mut idx: LocalIndex<i64> = LocalIndex::new(4);
        idx.insert("alpha", 1);
        idx.insert("bravo", 2);
        assert_eq!(idx.lookup("alpha"), Some(&[1][..]));
        assert_eq!(idx.lookup("bravo"), Some(&[2][..]));
        assert_eq!(idx.lookup("charlie"), None);
    }

    #[test]
    fn insert_with_existing_key_appends() {
        let mut idx: LocalIndex<i64> = LocalIndex::new(4);
        idx.insert("alpha", 1);
        idx.insert("alpha", 2);
        assert_eq!(idx.lookup("alpha"), Some(&[1, 2][..]));
    }

    #[test]
    fn update_replaces_value_list() {
        let mut idx: LocalIndex<i64> = LocalIndex::new(4);
        idx.insert("alpha", 1);
        idx.insert("alpha", 2);
        assert!(idx.update("alpha", 99));
        assert_eq!(idx.lookup("alpha"), Some(&[99][..]));
        assert!(!idx.update("missing", 0));
    }

    #[test]
    fn delete_is_not_idempotent_the_second_time() {
        let mut idx: LocalIndex<i64> = LocalIndex::new(4);
        idx.insert("alpha", 1);
        assert!(idx.delete("alpha"));
        assert!(!idx.delete("alpha"));
        assert_eq!(idx.lookup("alpha"), None);
    }

    #[test]
    fn scan_returns_sorted_order() {
        let mut idx: LocalIndex<i64> = LocalIndex::new(4);
        for (i, key) in ["delta", "alpha", "charlie", "bravo"].iter().enumerate() {
            idx.insert(key, i as i64);
        }
        let keys: Vec<&str> = idx.scan().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["alpha", "bravo", "charlie", "delta"]);
    }

    #[test]
    fn len_and_is_empty_track_key_count_not_entry_count() {
        let mut idx: LocalIndex<i64> = LocalIndex::new(4);
        assert!(idx.is_empty());
        idx.insert("alpha", 1);
        idx.insert("alpha", 2);
        idx.insert("bravo", 3);
        assert_eq!(idx.len(), 2);
        assert!(!idx.is_empty());
    }

    #[test]
    fn stress_insert_and_delete_exercises_split_and_merge() {
        let mut idx: LocalIndex<i64> = LocalIndex::new(4);
        let mut keys: Vec<String> = (0..500).map(|i| format!("key-{:04}", i)).collect();

        for (i, k) in keys.iter().enumerate() {
            idx.insert(k, i as i64);
        }
        assert_eq!(idx.len(), keys.len());
        let scanned: Vec<&str> = idx.scan().map(|(k, _)| k).collect();
        let mut sorted_keys = keys.clone();
        sorted_keys.sort();
        assert_eq!(scanned, sorted_keys);

        // Delete every third key, then every remaining even-indexed one,
        // driving both borrow and merge rebalancing paths.
        let mut deleted = std::collections::HashSet::new();
        for (i, k) in keys.iter().enumerate() {
            if i % 3 == 0 {
                assert!(idx.delete(k));
                deleted.insert(k.clone());
            }
        }
        keys.retain(|k| !deleted.contains(k));
        for (i, k) in keys.clone().iter().enumerate() {
            if i % 2 == 0 {
                assert!(idx.delete(k));
                deleted.insert(k.clone());
            }
        }
        keys.retain(|k| !deleted.contains(k));

        assert_eq!(idx.len(), keys.len());
        for k in &keys {
            assert!(idx.lookup(k).is_some(), "expected {k} to survive deletion");
        }
        for k in &deleted {
            assert_eq!(idx.lookup(k), None, "expected {k} to be gone");
        }
        let scanned: Vec<&str> = idx.scan().map(|(k, _)| k).collect();
        let mut sorted_keys = keys.clone();
        sorted_keys.sort();
        assert_eq!(scanned, sorted_keys);
    }

    #[test]
    fn delete_drains_tree_back_to_a_single_empty_leaf() {
        let mut idx: LocalIndex<i64> = LocalIndex::new(4);
        for i in 0..50 {
            idx.insert(&format!("k{i}"), i);
        }
        for i in 0..50 {
            assert!(idx.delete(&format!("k{i}")));
        }
        assert!(idx.is_empty());
        assert_eq!(idx.lookup("k0"), None);
        idx.insert("fresh", 1);
        assert_eq!(idx.lookup("fresh"), Some(&[1][..]));
    }
}
