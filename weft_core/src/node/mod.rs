// Copyright 2026 the Weft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Work node data model.
//!
//! A *work node* is one position of a root's tree in one generation. Every
//! position has up to two generations: the *current* node, which reflects
//! what is committed to the host, and the *work-in-progress* node, which a
//! render pass builds. The two are linked as each other's `alternate`, and a
//! commit swaps which one is current.
//!
//! Each node carries:
//!
//! - An identity: a generational [`NodeId`] handle, stale once the slot is
//!   swept.
//! - Topology: parent, first-child and sibling links forming an ordered tree.
//! - Input: pending props from the parent, memoized props from the last
//!   pass, kind-specific state and an update queue.
//! - Scheduling: its own pending `lanes` and the union of its descendants'
//!   pending lanes in `child_lanes`.
//! - Commit payload: [`NodeFlags`] plus the bubbled `subtree_flags`, the
//!   list of children to delete, and the host update payload.
//!
//! Nodes live in a [`NodeStore`] arena per root and are referred to by raw
//! slot indices inside the engine.

mod id;
mod store;
mod tag;
mod traverse;

pub use id::NodeId;
pub use tag::WorkTag;

pub(crate) use id::INVALID;
pub(crate) use store::{ListForce, NodeState, NodeStore, WorkNode};
pub(crate) use tag::NodeFlags;
pub(crate) use traverse::{top_level_hosts, walk_subtree};
