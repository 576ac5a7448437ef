// Copyright 2026 the Weft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Keyed child reconciliation.
//!
//! Matches a list of new child [`Element`]s against the current children of
//! a node. Children are matched by key first, then by type and position:
//!
//! 1. Walk the old and new lists in lockstep while keys line up.
//! 2. If the new list ran out, the remaining old children are deleted.
//! 3. If the old list ran out, the remaining new children are created.
//! 4. Otherwise the remaining old children are indexed by key (or by
//!    position when unkeyed) and looked up for each remaining element.
//!
//! A matched child of the same type reuses the old node through its
//! alternate; anything else is created fresh. Old children left unmatched
//! are recorded as deletions on the parent.
//!
//! Moves are detected with a single "last placed index": a reused child
//! whose old index is below it has moved right and gets a placement.

use alloc::vec::Vec;

use hashbrown::HashMap;

use crate::element::{Element, Key};
use crate::lane::Lanes;
use crate::node::{INVALID, NodeFlags, NodeStore};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum ChildKey {
    Key(Key),
    Index(u32),
}

/// Reconciles `elements` against the children starting at `current_first`
/// and links the result under `wip`.
///
/// With `track` off (a subtree being mounted) no placement or deletion
/// effects are recorded; the host instances are assembled during
/// completion instead. Returns the first new child.
pub(crate) fn reconcile_children(
    store: &mut NodeStore,
    wip: u32,
    current_first: u32,
    elements: &[Element],
    track: bool,
    lanes: Lanes,
) -> u32 {
    let mut b = ChildBuilder {
        store: &mut *store,
        wip,
        track,
        lanes,
        first: INVALID,
        prev: INVALID,
        last_placed: 0,
    };
    b.reconcile(current_first, elements);
    let first = b.first;
    store[wip].child = first;
    first
}

/// Deletes every current child and mounts `elements` in their place.
///
/// Used when a boundary switches to its recovery content: no state of the
/// failed subtree may survive.
pub(crate) fn remount_children(
    store: &mut NodeStore,
    wip: u32,
    current_first: u32,
    elements: &[Element],
    lanes: Lanes,
) -> u32 {
    let mut old = current_first;
    while old != INVALID {
        let next = store[old].sibling;
        store[wip].deletions.push(old);
        store[wip].flags |= NodeFlags::CHILD_DELETION;
        old = next;
    }
    reconcile_children(store, wip, INVALID, elements, true, lanes)
}

/// Gives `wip` fresh work-in-progress copies of its current children.
///
/// Called when a node bails out but its subtree still has pending work.
pub(crate) fn clone_child_nodes(store: &mut NodeStore, wip: u32) {
    let mut current = store[wip].child;
    if current == INVALID {
        return;
    }
    let props = store[current].pending_props.clone();
    let mut new = store.create_work_in_progress(current, props);
    store[wip].child = new;
    store[new].parent = wip;
    loop {
        current = store[current].sibling;
        if current == INVALID {
            break;
        }
        let props = store[current].pending_props.clone();
        let next = store.create_work_in_progress(current, props);
        store[new].sibling = next;
        store[next].parent = wip;
        new = next;
    }
    store[new].sibling = INVALID;
}

struct ChildBuilder<'a> {
    store: &'a mut NodeStore,
    wip: u32,
    track: bool,
    lanes: Lanes,
    first: u32,
    prev: u32,
    last_placed: u32,
}

impl ChildBuilder<'_> {
    fn reconcile(&mut self, current_first: u32, elements: &[Element]) {
        let mut old = current_first;
        let mut new_idx: u32 = 0;
        let len = elements.len();

        while old != INVALID && (new_idx as usize) < len {
            let next_old;
            if self.store[old].index > new_idx {
                // A gap in the old indices: nothing to match at this slot.
                next_old = old;
                old = INVALID;
            } else {
                next_old = self.store[old].sibling;
            }
            let Some(new) = self.update_slot(old, &elements[new_idx as usize]) else {
                if old == INVALID {
                    old = next_old;
                }
                break;
            };
            if old != INVALID && self.store[new].alternate != old {
                self.delete_child(old);
            }
            self.place(new, new_idx);
            old = next_old;
            new_idx += 1;
        }

        if new_idx as usize == len {
            self.delete_remaining(old);
            return;
        }

        if old == INVALID {
            for element in &elements[new_idx as usize..] {
                let new = self.create_child(element);
                self.place(new, new_idx);
                new_idx += 1;
            }
            return;
        }

        let mut existing: HashMap<ChildKey, u32> = HashMap::new();
        while old != INVALID {
            let node = &self.store[old];
            let key = match &node.key {
                Some(key) => ChildKey::Key(key.clone()),
                None => ChildKey::Index(node.index),
            };
            existing.insert(key, old);
            old = node.sibling;
        }

        for element in &elements[new_idx as usize..] {
            let key = match &element.key {
                Some(key) => ChildKey::Key(key.clone()),
                None => ChildKey::Index(new_idx),
            };
            let matched = existing
                .get(&key)
                .copied()
                .filter(|m| self.same_type(*m, element));
            let new = match matched {
                Some(m) => {
                    existing.remove(&key);
                    self.use_node(m, element)
                }
                None => self.create_child(element),
            };
            self.place(new, new_idx);
            new_idx += 1;
        }

        if self.track {
            let mut leftover: Vec<u32> = existing.into_values().collect();
            leftover.sort_by_key(|idx| self.store[*idx].index);
            for idx in leftover {
                self.delete_child(idx);
            }
        }
    }

    /// Matches `element` against the old child at the same position.
    ///
    /// Returns `None` on a key mismatch, which ends the lockstep walk.
    fn update_slot(&mut self, old: u32, element: &Element) -> Option<u32> {
        let old_key = if old == INVALID {
            None
        } else {
            self.store[old].key.as_ref()
        };
        if old_key != element.key.as_ref() {
            return None;
        }
        if old != INVALID && self.same_type(old, element) {
            Some(self.use_node(old, element))
        } else {
            Some(self.create_child(element))
        }
    }

    fn same_type(&self, old: u32, element: &Element) -> bool {
        self.store[old]
            .element_type()
            .is_some_and(|ty| ty.same_type(&element.ty))
    }

    fn use_node(&mut self, old: u32, element: &Element) -> u32 {
        let idx = self
            .store
            .create_work_in_progress(old, element.props.clone());
        let node = &mut self.store[idx];
        node.ty = Some(element.ty.clone());
        node.node_ref = element.node_ref.clone();
        node.index = 0;
        node.sibling = INVALID;
        node.parent = self.wip;
        idx
    }

    fn create_child(&mut self, element: &Element) -> u32 {
        let idx = self.store.create_from_element(element, self.lanes);
        self.store[idx].parent = self.wip;
        idx
    }

    fn place(&mut self, new: u32, new_idx: u32) {
        self.store[new].index = new_idx;
        if self.track {
            let alt = self.store[new].alternate;
            if alt == INVALID {
                self.store[new].flags |= NodeFlags::PLACEMENT;
            } else {
                let old_index = self.store[alt].index;
                if old_index < self.last_placed {
                    self.store[new].flags |= NodeFlags::PLACEMENT;
                } else {
                    self.last_placed = old_index;
                }
            }
        }

        if self.prev == INVALID {
            self.first = new;
        } else {
            self.store[self.prev].sibling = new;
        }
        self.store[new].sibling = INVALID;
        self.prev = new;
    }

    fn delete_child(&mut self, old: u32) {
        if !self.track {
            return;
        }
        self.store[self.wip].deletions.push(old);
        self.store[self.wip].flags |= NodeFlags::CHILD_DELETION;
    }

    fn delete_remaining(&mut self, mut old: u32) {
        while old != INVALID {
            let next = self.store[old].sibling;
            self.delete_child(old);
            old = next;
        }
    }
}
