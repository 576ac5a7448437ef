// Copyright 2026 the Weft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tree traversal utilities.

use super::id::INVALID;
use super::store::NodeStore;

/// An iterator over the slots of a node's direct children.
///
/// Created by [`NodeStore::children`].
#[derive(Debug)]
pub(crate) struct Children<'a> {
    store: &'a NodeStore,
    current: u32,
}

impl<'a> Children<'a> {
    pub(crate) fn new(store: &'a NodeStore, first: u32) -> Self {
        Self {
            store,
            current: first,
        }
    }
}

impl Iterator for Children<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.current == INVALID {
            return None;
        }
        let idx = self.current;
        self.current = self.store[idx].sibling;
        Some(idx)
    }
}

/// Depth-first pre-order walk of the subtree under `root`, root included.
///
/// `descend` decides per node whether its children are visited.
pub(crate) fn walk_subtree(
    store: &NodeStore,
    root: u32,
    mut visit: impl FnMut(u32),
    mut descend: impl FnMut(u32) -> bool,
) {
    let mut node = root;
    loop {
        visit(node);
        let child = store[node].child;
        if child != INVALID && descend(node) {
            node = child;
            continue;
        }
        if node == root {
            return;
        }
        while store[node].sibling == INVALID {
            node = store[node].parent;
            if node == root || node == INVALID {
                return;
            }
        }
        node = store[node].sibling;
    }
}

/// Collects the topmost host nodes under `root`: host nodes with no host
/// ancestor below `root`. Portals are not entered.
pub(crate) fn top_level_hosts(store: &NodeStore, root: u32) -> alloc::vec::Vec<u32> {
    let mut out = alloc::vec::Vec::new();
    walk_subtree(
        store,
        root,
        |idx| {
            if store[idx].tag.is_host() {
                out.push(idx);
            }
        },
        |idx| {
            idx == root
                || !(store[idx].tag.is_host() || store[idx].tag == super::WorkTag::Portal)
        },
    );
    if store[root].tag.is_host() {
        out.retain(|i| *i == root);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;
    use crate::lane::Lanes;
    use alloc::vec::Vec;

    fn link(store: &mut NodeStore, parent: u32, children: &[u32]) {
        store[parent].child = children.first().copied().unwrap_or(INVALID);
        for (i, c) in children.iter().enumerate() {
            store[*c].parent = parent;
            store[*c].sibling = children.get(i + 1).copied().unwrap_or(INVALID);
        }
    }

    #[test]
    fn children_and_top_level_hosts() {
        let mut store = NodeStore::default();
        let root = store.create_root();
        let frag = store.create_from_element(&Element::fragment([]), Lanes::NONE);
        let div = store.create_from_element(&Element::host("div"), Lanes::NONE);
        let inner = store.create_from_element(&Element::text("a"), Lanes::NONE);
        let text = store.create_from_element(&Element::text("b"), Lanes::NONE);
        link(&mut store, root, &[frag, text]);
        link(&mut store, frag, &[div]);
        link(&mut store, div, &[inner]);

        assert_eq!(store.children(root).collect::<Vec<_>>(), [frag, text]);
        assert_eq!(top_level_hosts(&store, root), [div, text]);
        assert_eq!(top_level_hosts(&store, div), [div]);

        let mut seen = Vec::new();
        walk_subtree(&store, frag, |i| seen.push(i), |_| true);
        assert_eq!(seen, [frag, div, inner], "walk stays inside the subtree");
    }
}
