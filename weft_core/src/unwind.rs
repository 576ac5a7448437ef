// Copyright 2026 the Weft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Boundary search and unwinding after a step fails.
//!
//! A begin or complete step that cannot finish returns a [`Thrown`] value.
//! The value is attributed to exactly one place:
//!
//! - a suspension goes to the nearest suspense boundary that has not
//!   captured yet in this pass, which will render its fallback;
//! - an error goes to the nearest error boundary class that has not captured
//!   yet, which receives a capture update;
//! - with no boundary, the pass itself ends (delayed or errored).
//!
//! After marking a boundary, the walk unwinds from the failed node up to it,
//! popping provided contexts on the way, and begins the boundary again.

use alloc::vec;

use crate::component::Wakeable;
use crate::element::ElementType;
use crate::error::ComponentError;
use crate::lane::Lanes;
use crate::node::{INVALID, NodeFlags, NodeStore, WorkTag};
use crate::trace::{ErrorCapturedEvent, ErrorPhase, SuspendEvent};
use crate::update_queue::{Action, Update};
use crate::work_loop::{PassExit, WorkCx};

/// Why a begin or complete step stopped.
#[derive(Clone, Debug)]
pub(crate) enum Thrown {
    Suspended(Wakeable),
    Failed(ComponentError),
}

impl From<ComponentError> for Thrown {
    fn from(err: ComponentError) -> Self {
        Self::Failed(err)
    }
}

/// Attributes `thrown` from `source` and moves the pass to wherever work
/// continues.
pub(crate) fn throw_and_unwind(cx: &mut WorkCx<'_, '_>, source: u32, thrown: Thrown) {
    if mark_boundary(cx, source, thrown) {
        unwind_from(cx, source);
    } else {
        cx.pass.next = INVALID;
    }
}

/// Returns `true` if a boundary took the value, `false` if the pass ended.
fn mark_boundary(cx: &mut WorkCx<'_, '_>, source: u32, thrown: Thrown) -> bool {
    let wakeable = match thrown {
        Thrown::Failed(err) => return capture_error(cx, source, err),
        Thrown::Suspended(w) => w,
    };
    let lanes = cx.pass.lanes;
    let boundary = find_suspense_boundary(cx.store, cx.store[source].parent);
    let delayed = match boundary {
        Some(b) => {
            let shows_content = cx
                .current_of(b)
                .is_some_and(|c| !cx.store[c].state.is_showing_fallback());
            lanes.is_deferrable() && shows_content
        }
        None if lanes.includes_any(Lanes::SYNC) => {
            let err = ComponentError::new(
                "a component suspended during a synchronous render with no suspense boundary above it",
            );
            return capture_error(cx, source, err);
        }
        None => true,
    };
    cx.tracer.suspend(&SuspendEvent {
        root: cx.pass.root,
        lanes,
        wakeable,
        delayed,
    });
    match boundary {
        Some(b) if !delayed => {
            let node = &mut cx.store[b];
            node.flags |= NodeFlags::SHOULD_CAPTURE;
            if !node.retry_wakeables.contains(&wakeable) {
                node.retry_wakeables.push(wakeable);
            }
            true
        }
        _ => {
            cx.pass.exit = PassExit::Delayed(vec![wakeable]);
            false
        }
    }
}

fn capture_error(cx: &mut WorkCx<'_, '_>, source: u32, err: ComponentError) -> bool {
    let boundary = find_error_boundary(cx.store, cx.store[source].parent);
    cx.tracer.error_captured(&ErrorCapturedEvent {
        root: cx.pass.root,
        phase: ErrorPhase::Render,
        boundary: boundary.map(|b| cx.store.id(b)),
    });
    let Some(b) = boundary else {
        cx.pass.exit = PassExit::Errored(err);
        return false;
    };
    let lane = cx.pass.lanes.highest_priority_lane();
    let node = &mut cx.store[b];
    if let Some(queue) = node.queue.as_mut() {
        queue.push_captured(Update {
            lane,
            action: Action::Capture(err),
        });
    }
    node.flags |= NodeFlags::SHOULD_CAPTURE;
    true
}

/// Nearest suspense boundary at or above `from` that can still capture.
pub(crate) fn find_suspense_boundary(store: &NodeStore, from: u32) -> Option<u32> {
    let mut node = from;
    while node != INVALID {
        let n = &store[node];
        if n.tag == WorkTag::Suspense && !n.flags.contains(NodeFlags::DID_CAPTURE) {
            return Some(node);
        }
        node = n.parent;
    }
    None
}

/// Nearest error boundary class at or above `from` that can still capture.
pub(crate) fn find_error_boundary(store: &NodeStore, from: u32) -> Option<u32> {
    let mut node = from;
    while node != INVALID {
        let n = &store[node];
        if let Some(ElementType::Class(class)) = &n.ty
            && class.is_error_boundary()
            && !n.flags.contains(NodeFlags::DID_CAPTURE)
        {
            return Some(node);
        }
        node = n.parent;
    }
    None
}

/// Walks up from `source` to the marked boundary and begins it again.
fn unwind_from(cx: &mut WorkCx<'_, '_>, source: u32) {
    let mut node = source;
    loop {
        let tag = cx.store[node].tag;
        if matches!(tag, WorkTag::Provider | WorkTag::Cache) {
            cx.pass.contexts.pop(node);
        }
        let n = &mut cx.store[node];
        if n.flags.contains(NodeFlags::SHOULD_CAPTURE) {
            n.flags.remove(NodeFlags::SHOULD_CAPTURE | NodeFlags::CHILD_DELETION);
            n.flags.insert(NodeFlags::DID_CAPTURE);
            n.subtree_flags = NodeFlags::empty();
            n.deletions.clear();
            cx.pass.next = node;
            return;
        }
        if node == cx.pass.wip_root {
            cx.pass.next = INVALID;
            return;
        }
        let parent = n.parent;
        let p = &mut cx.store[parent];
        p.subtree_flags = NodeFlags::empty();
        p.deletions.clear();
        p.flags.remove(NodeFlags::CHILD_DELETION);
        node = parent;
    }
}
