// Copyright 2026 the Weft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Render passes and the cooperative work loop.
//!
//! A [`RenderPass`] is one attempt to render a set of lanes into a
//! work-in-progress tree. Its only resumption state is the `next` pointer:
//! the node whose begin step runs next. Because traversal follows explicit
//! parent and sibling links, the loop can stop between any two steps and
//! pick up later without re-validating finished nodes.
//!
//! ```text
//!   perform_unit(n):  begin(n) ─┬─ child c  ─► next = c
//!                               └─ none     ─► complete(n), then n's sibling,
//!                                              or complete the parent, ...
//! ```
//!
//! The synchronous loop runs until `next` is empty. The concurrent loop asks
//! the host whether to yield after every unit.

use alloc::vec::Vec;

use crate::begin::begin_work;
use crate::complete::complete_work;
use crate::component::{ContextStack, Wakeable};
use crate::error::ComponentError;
use crate::host::{HostAdapter, HostScheduler};
use crate::lane::Lanes;
use crate::node::{INVALID, NodeStore};
use crate::reconciler::RootId;
use crate::trace::Tracer;
use crate::unwind::throw_and_unwind;

/// How a pass ended, or that it has not yet.
#[derive(Clone, Debug)]
pub(crate) enum PassExit {
    InProgress,
    /// The tree is complete and ready to commit.
    Completed,
    /// The pass must not commit; its lanes wait for one of these wakeables.
    Delayed(Vec<Wakeable>),
    /// An error reached the root.
    Errored(ComponentError),
}

/// One in-flight render attempt of a root.
#[derive(Debug)]
pub(crate) struct RenderPass {
    pub(crate) root: RootId,
    pub(crate) lanes: Lanes,
    pub(crate) wip_root: u32,
    /// The next unit of work, or [`INVALID`] when the walk is done.
    pub(crate) next: u32,
    pub(crate) exit: PassExit,
    pub(crate) contexts: ContextStack,
    /// Render an empty tree, ignoring the root's queue (teardown).
    pub(crate) force_empty: bool,
    pub(crate) units: u64,
}

impl RenderPass {
    pub(crate) fn is_finished(&self) -> bool {
        !matches!(self.exit, PassExit::InProgress)
    }
}

/// Everything a begin or complete step may touch.
pub(crate) struct WorkCx<'a, 't> {
    pub(crate) store: &'a mut NodeStore,
    pub(crate) pass: &'a mut RenderPass,
    pub(crate) host: &'a mut dyn HostAdapter,
    pub(crate) next_cache_handle: &'a mut i64,
    pub(crate) tracer: &'a mut Tracer<'t>,
}

impl core::fmt::Debug for WorkCx<'_, '_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkCx")
            .field("lanes", &self.pass.lanes)
            .field("next", &self.pass.next)
            .finish_non_exhaustive()
    }
}

impl WorkCx<'_, '_> {
    /// The committed counterpart of a work-in-progress node.
    pub(crate) fn current_of(&self, wip: u32) -> Option<u32> {
        let alt = self.store[wip].alternate;
        (self.store.is_live(alt) && self.store[alt].is_current).then_some(alt)
    }
}

/// Discards any previous attempt and starts a new pass against the current
/// tree.
pub(crate) fn prepare_fresh_stack(
    store: &mut NodeStore,
    current: u32,
    root: RootId,
    lanes: Lanes,
    force_empty: bool,
) -> RenderPass {
    store.sweep(current);
    let props = store[current].pending_props.clone();
    let wip_root = store.create_work_in_progress(current, props);
    RenderPass {
        root,
        lanes,
        wip_root,
        next: wip_root,
        exit: PassExit::InProgress,
        contexts: ContextStack::default(),
        force_empty,
        units: 0,
    }
}

/// Runs the pass to the end without yielding.
pub(crate) fn work_loop_sync(cx: &mut WorkCx<'_, '_>) {
    while cx.pass.next != INVALID {
        let unit = cx.pass.next;
        perform_unit(cx, unit);
    }
}

/// Runs units until the pass ends or the host asks to yield.
///
/// Returns `true` if the pass yielded with work left.
pub(crate) fn work_loop_concurrent(cx: &mut WorkCx<'_, '_>, scheduler: &dyn HostScheduler) -> bool {
    while cx.pass.next != INVALID {
        let unit = cx.pass.next;
        perform_unit(cx, unit);
        if cx.pass.next != INVALID && scheduler.should_yield() {
            return true;
        }
    }
    false
}

fn perform_unit(cx: &mut WorkCx<'_, '_>, unit: u32) {
    cx.pass.units += 1;
    #[cfg(feature = "trace-rich")]
    emit_unit(cx, unit, crate::trace::UnitStep::Begin);
    match begin_work(cx, unit) {
        Ok(next) => {
            let props = cx.store[unit].pending_props.clone();
            cx.store[unit].memoized_props = Some(props);
            if next == INVALID {
                complete_unit(cx, unit);
            } else {
                cx.pass.next = next;
            }
        }
        Err(thrown) => throw_and_unwind(cx, unit, thrown),
    }
}

/// Completes `unit` and its ancestors until a sibling is found.
fn complete_unit(cx: &mut WorkCx<'_, '_>, unit: u32) {
    let mut node = unit;
    loop {
        #[cfg(feature = "trace-rich")]
        emit_unit(cx, node, crate::trace::UnitStep::Complete);
        match complete_work(cx, node) {
            Ok(Some(again)) => {
                cx.pass.next = again;
                return;
            }
            Ok(None) => {}
            Err(thrown) => {
                throw_and_unwind(cx, node, thrown);
                return;
            }
        }
        if node == cx.pass.wip_root {
            cx.pass.next = INVALID;
            cx.pass.exit = PassExit::Completed;
            return;
        }
        let sibling = cx.store[node].sibling;
        if sibling != INVALID {
            cx.pass.next = sibling;
            return;
        }
        node = cx.store[node].parent;
    }
}

#[cfg(feature = "trace-rich")]
fn emit_unit(cx: &mut WorkCx<'_, '_>, node: u32, step: crate::trace::UnitStep) {
    let e = crate::trace::UnitEvent {
        root: cx.pass.root,
        node: cx.store.id(node),
        tag: cx.store[node].tag,
        step,
    };
    cx.tracer.unit(&e);
}
