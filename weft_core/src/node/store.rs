// Copyright 2026 the Weft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Arena storage for both generations of a root's work nodes.

use alloc::vec;
use alloc::vec::Vec;
use core::ops::{Index, IndexMut};

use crate::component::{ContextDependency, EffectHook, Wakeable};
use crate::element::{Element, ElementType, Key, NodeRef, OffscreenMode, Props, UpdatePayload, Value};
use crate::error::ComponentError;
use crate::host::InstanceId;
use crate::lane::Lanes;
use crate::update_queue::UpdateQueue;

use super::id::{INVALID, NodeId};
use super::tag::{NodeFlags, WorkTag};
use super::traverse::Children;

/// Which direct children of a suspense list must show their fallback.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum ListForce {
    #[default]
    None,
    All,
    /// Rows after this index.
    After(u32),
    /// Rows before this index.
    Before(u32),
}

impl ListForce {
    pub(crate) const fn covers(self, row: u32) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::After(i) => row > i,
            Self::Before(i) => row < i,
        }
    }
}

/// Kind-specific persisted state.
#[derive(Clone, Debug, Default)]
pub(crate) enum NodeState {
    #[default]
    None,
    /// Function component state, class state, or a cache handle.
    Value(Value),
    Root(Option<Element>),
    Suspense {
        showing_fallback: bool,
    },
    Offscreen {
        hidden: bool,
    },
    SuspenseList {
        force: ListForce,
    },
}

impl NodeState {
    pub(crate) fn value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    pub(crate) const fn is_showing_fallback(&self) -> bool {
        matches!(
            self,
            Self::Suspense {
                showing_fallback: true
            }
        )
    }

    pub(crate) const fn is_hidden(&self) -> bool {
        matches!(self, Self::Offscreen { hidden: true })
    }
}

/// One position in the tree, in one generation.
#[derive(Clone, Debug)]
pub(crate) struct WorkNode {
    pub(crate) tag: WorkTag,
    /// `None` for the root node.
    pub(crate) ty: Option<ElementType>,
    pub(crate) key: Option<Key>,
    pub(crate) index: u32,

    // -- Topology --
    pub(crate) parent: u32,
    pub(crate) child: u32,
    pub(crate) sibling: u32,
    pub(crate) alternate: u32,

    // -- Payload --
    pub(crate) pending_props: Props,
    pub(crate) memoized_props: Option<Props>,
    pub(crate) state: NodeState,
    pub(crate) queue: Option<UpdateQueue>,
    pub(crate) dependencies: Vec<ContextDependency>,
    pub(crate) node_ref: Option<NodeRef>,
    pub(crate) instance: Option<InstanceId>,
    pub(crate) effects: Vec<EffectHook>,

    // -- Scheduling --
    pub(crate) lanes: Lanes,
    pub(crate) child_lanes: Lanes,
    pub(crate) flags: NodeFlags,
    pub(crate) subtree_flags: NodeFlags,

    // -- Commit payload (reset per pass) --
    pub(crate) deletions: Vec<u32>,
    pub(crate) update_payload: Option<UpdatePayload>,
    pub(crate) retry_wakeables: Vec<Wakeable>,
    pub(crate) snapshot: Option<Value>,
    pub(crate) caught: Vec<ComponentError>,

    /// Reachable from the root's current tree as of the last sweep.
    pub(crate) is_current: bool,
}

impl WorkNode {
    fn vacant() -> Self {
        Self::new(WorkTag::Fragment, None, None, Props::default())
    }

    fn new(tag: WorkTag, ty: Option<ElementType>, key: Option<Key>, props: Props) -> Self {
        let queue = matches!(
            tag,
            WorkTag::Root
                | WorkTag::Function
                | WorkTag::Class
                | WorkTag::Memo
                | WorkTag::Lazy
                | WorkTag::Cache
        )
        .then(UpdateQueue::default);
        let state = match tag {
            WorkTag::Root => NodeState::Root(None),
            WorkTag::Suspense => NodeState::Suspense {
                showing_fallback: false,
            },
            WorkTag::Offscreen => NodeState::Offscreen {
                hidden: OffscreenMode::from_props(&props) == OffscreenMode::Hidden,
            },
            WorkTag::SuspenseList => NodeState::SuspenseList {
                force: ListForce::None,
            },
            _ => NodeState::None,
        };
        Self {
            tag,
            ty,
            key,
            index: 0,
            parent: INVALID,
            child: INVALID,
            sibling: INVALID,
            alternate: INVALID,
            pending_props: props,
            memoized_props: None,
            state,
            queue,
            dependencies: Vec::new(),
            node_ref: None,
            instance: None,
            effects: Vec::new(),
            lanes: Lanes::NONE,
            child_lanes: Lanes::NONE,
            flags: NodeFlags::empty(),
            subtree_flags: NodeFlags::empty(),
            deletions: Vec::new(),
            update_payload: None,
            retry_wakeables: Vec::new(),
            snapshot: None,
            caught: Vec::new(),
            is_current: false,
        }
    }

    /// The element type; only the root node has none.
    pub(crate) fn element_type(&self) -> Option<&ElementType> {
        self.ty.as_ref()
    }

    /// The name used in diagnostics.
    pub(crate) fn name(&self) -> &str {
        self.ty.as_ref().map_or("root", ElementType::name)
    }
}

/// Arena of work nodes for one root.
///
/// Nodes are addressed by raw `u32` slots inside the engine and by
/// generational [`NodeId`] handles outside it. Both generations of every
/// position live here; the `alternate` link pairs them. Slots that are no
/// longer reachable from the current tree are released by
/// [`sweep`](Self::sweep) and recycled through a free list.
#[derive(Debug, Default)]
pub(crate) struct NodeStore {
    nodes: Vec<WorkNode>,
    generation: Vec<u32>,
    live: Vec<bool>,
    free_list: Vec<u32>,
}

impl Index<u32> for NodeStore {
    type Output = WorkNode;

    #[inline]
    fn index(&self, idx: u32) -> &WorkNode {
        &self.nodes[idx as usize]
    }
}

impl IndexMut<u32> for NodeStore {
    #[inline]
    fn index_mut(&mut self, idx: u32) -> &mut WorkNode {
        &mut self.nodes[idx as usize]
    }
}

/// Converts the next slot position into an index.
///
/// # Panics
///
/// Panics if `len` does not fit below [`INVALID`].
fn slot_index(len: usize) -> u32 {
    match u32::try_from(len) {
        Ok(idx) if idx < INVALID => idx,
        _ => panic!("node store is full: {len} slots in use"),
    }
}

impl NodeStore {
    // -- Allocation --

    /// Allocates a slot for `node`, reusing freed slots first.
    ///
    /// # Panics
    ///
    /// Panics if every slot index below [`INVALID`] is in use.
    fn allocate(&mut self, node: WorkNode) -> u32 {
        if let Some(idx) = self.free_list.pop() {
            self.nodes[idx as usize] = node;
            self.live[idx as usize] = true;
            idx
        } else {
            let idx = slot_index(self.nodes.len());
            self.nodes.push(node);
            self.generation.push(0);
            self.live.push(true);
            idx
        }
    }

    /// Releases a slot.
    ///
    /// # Panics
    ///
    /// Panics if the slot is already free.
    fn free(&mut self, idx: u32) {
        assert!(self.live[idx as usize], "node slot {idx} freed twice");
        self.live[idx as usize] = false;
        self.generation[idx as usize] = self.generation[idx as usize].wrapping_add(1);
        self.nodes[idx as usize] = WorkNode::vacant();
        self.free_list.push(idx);
    }

    /// Creates the root node of a fresh tree.
    pub(crate) fn create_root(&mut self) -> u32 {
        self.allocate(WorkNode::new(WorkTag::Root, None, None, Props::default()))
    }

    /// Creates a node for an element that has no counterpart in the current
    /// tree.
    pub(crate) fn create_from_element(&mut self, element: &Element, lanes: Lanes) -> u32 {
        let mut node = WorkNode::new(
            element.ty.tag(),
            Some(element.ty.clone()),
            element.key.clone(),
            element.props.clone(),
        );
        node.node_ref = element.node_ref.clone();
        node.lanes = lanes;
        self.allocate(node)
    }

    /// Returns the work-in-progress counterpart of `current`, reusing the
    /// alternate slot when there is one.
    ///
    /// The result starts as a copy of `current` with fresh commit state.
    ///
    /// # Panics
    ///
    /// Panics if `current` is not a live slot.
    pub(crate) fn create_work_in_progress(&mut self, current: u32, pending_props: Props) -> u32 {
        assert!(self.is_live(current), "work on freed node slot {current}");
        let mut node = self.nodes[current as usize].clone();
        node.pending_props = pending_props;
        node.flags = NodeFlags::empty();
        node.subtree_flags = NodeFlags::empty();
        node.deletions.clear();
        node.update_payload = None;
        node.retry_wakeables.clear();
        node.snapshot = None;
        node.caught.clear();
        node.is_current = false;
        node.alternate = current;

        let alt = self.nodes[current as usize].alternate;
        if alt != INVALID && self.is_live(alt) {
            self.nodes[alt as usize] = node;
            alt
        } else {
            let wip = self.allocate(node);
            self.nodes[current as usize].alternate = wip;
            wip
        }
    }

    // -- Handles --

    #[inline]
    pub(crate) fn is_live(&self, idx: u32) -> bool {
        idx != INVALID && self.live.get(idx as usize).copied().unwrap_or(false)
    }

    /// A generational handle for a live slot.
    pub(crate) fn id(&self, idx: u32) -> NodeId {
        NodeId {
            idx,
            generation: self.generation[idx as usize],
        }
    }

    /// Resolves a handle, or `None` if it is stale.
    pub(crate) fn resolve(&self, id: NodeId) -> Option<u32> {
        (self.is_live(id.idx) && self.generation[id.idx as usize] == id.generation)
            .then_some(id.idx)
    }

    /// The generation of `idx` that belongs to the current tree.
    pub(crate) fn current_of(&self, idx: u32) -> Option<u32> {
        if !self.is_live(idx) {
            return None;
        }
        if self.nodes[idx as usize].is_current {
            return Some(idx);
        }
        let alt = self.nodes[idx as usize].alternate;
        (self.is_live(alt) && self.nodes[alt as usize].is_current).then_some(alt)
    }

    /// The alternate of `idx`, if it is live.
    #[inline]
    pub(crate) fn alternate(&self, idx: u32) -> Option<u32> {
        let alt = self.nodes[idx as usize].alternate;
        self.is_live(alt).then_some(alt)
    }

    /// Returns an iterator over the direct children of a node.
    pub(crate) fn children(&self, idx: u32) -> Children<'_> {
        Children::new(self, self.nodes[idx as usize].child)
    }

    /// Number of live slots.
    pub(crate) fn live_count(&self) -> usize {
        self.live.iter().filter(|l| **l).count()
    }

    // -- Reclamation --

    /// Frees every slot that is neither in the tree under `root` nor the
    /// alternate of a node in it, and refreshes `is_current`.
    ///
    /// Must only run while no pass is in flight. Returns the number of slots
    /// freed.
    pub(crate) fn sweep(&mut self, root: u32) -> usize {
        let mut keep = vec![false; self.nodes.len()];
        for node in &mut self.nodes {
            node.is_current = false;
        }
        let mut stack = vec![root];
        while let Some(idx) = stack.pop() {
            if !self.is_live(idx) || self.nodes[idx as usize].is_current {
                continue;
            }
            keep[idx as usize] = true;
            let node = &mut self.nodes[idx as usize];
            node.is_current = true;
            let (alt, child, sibling) = (node.alternate, node.child, node.sibling);
            if self.is_live(alt) {
                keep[alt as usize] = true;
            }
            if child != INVALID {
                stack.push(child);
            }
            if sibling != INVALID && idx != root {
                stack.push(sibling);
            }
        }

        let mut freed = 0;
        for idx in 0..self.nodes.len() {
            if self.live[idx] && !keep[idx] {
                #[expect(
                    clippy::cast_possible_truncation,
                    reason = "slot count is bounded by u32 allocation"
                )]
                self.free(idx as u32);
                freed += 1;
            }
        }
        freed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(store: &mut NodeStore, parent: u32) -> u32 {
        let idx = store.create_from_element(&Element::text("x"), Lanes::DEFAULT);
        store[idx].parent = parent;
        idx
    }

    #[test]
    fn work_in_progress_reuses_alternate() {
        let mut store = NodeStore::default();
        let root = store.create_root();
        let wip = store.create_work_in_progress(root, Props::default());
        assert_ne!(wip, root);
        assert_eq!(store[root].alternate, wip);
        assert_eq!(store[wip].alternate, root);
        let again = store.create_work_in_progress(root, Props::default());
        assert_eq!(again, wip, "second pass reuses the pooled slot");
    }

    #[test]
    fn sweep_frees_unreachable_and_bumps_generation() {
        let mut store = NodeStore::default();
        let root = store.create_root();
        let kept = leaf(&mut store, root);
        store[root].child = kept;
        let orphan = leaf(&mut store, root);
        let orphan_id = store.id(orphan);

        assert_eq!(store.sweep(root), 1);
        assert!(store.resolve(orphan_id).is_none(), "stale handle detected");
        assert!(store[kept].is_current);
        assert_eq!(store.current_of(kept), Some(kept));

        // The freed slot is recycled with a new generation.
        let reused = leaf(&mut store, root);
        assert_eq!(reused, orphan);
        assert_ne!(store.id(reused), orphan_id);
    }

    #[test]
    fn sweep_keeps_alternates_of_current_nodes() {
        let mut store = NodeStore::default();
        let root = store.create_root();
        let wip = store.create_work_in_progress(root, Props::default());
        assert_eq!(store.sweep(root), 0);
        assert_eq!(store.current_of(wip), Some(root));
        assert_eq!(store.live_count(), 2);
    }

    #[test]
    #[should_panic(expected = "freed twice")]
    fn double_free_panics() {
        let mut store = NodeStore::default();
        let root = store.create_root();
        store.free(root);
        store.free(root);
    }

    #[test]
    #[should_panic(expected = "node store is full")]
    fn exhausted_slot_space_panics() {
        slot_index(INVALID as usize);
    }

    #[test]
    fn last_valid_slot_index_is_accepted() {
        assert_eq!(slot_index(INVALID as usize - 1), INVALID - 1);
    }

    #[test]
    fn list_force_rows() {
        assert!(ListForce::All.covers(0));
        assert!(ListForce::After(1).covers(2));
        assert!(!ListForce::After(1).covers(1));
        assert!(ListForce::Before(2).covers(1));
        assert!(!ListForce::None.covers(0));
    }
}
