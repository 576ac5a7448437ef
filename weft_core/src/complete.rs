// Copyright 2026 the Weft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The complete step: finish a node once its children are done.
//!
//! Host elements are created here on mount, with their finished host
//! children appended; on update the attribute diff is recorded for the
//! commit. Every node then bubbles its children's lanes and flags into
//! `child_lanes` and `subtree_flags`, so the commit and later passes can
//! skip subtrees with nothing to do.
//!
//! A suspense list may ask to be begun again from here, once it knows which
//! of its rows showed a fallback.

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::element::{ElementType, Props, RevealOrder};
use crate::error::HostError;
use crate::host::InstanceId;
use crate::lane::Lanes;
use crate::node::{INVALID, ListForce, NodeFlags, NodeState, WorkTag};
use crate::unwind::Thrown;
use crate::work_loop::WorkCx;

/// Attribute holding a text node's content.
pub(crate) const TEXT_ATTR: &str = "text";

/// The content of a text node's props.
pub(crate) fn text_of(props: &Props) -> String {
    props.get(TEXT_ATTR).map(ToString::to_string).unwrap_or_default()
}

fn host_failed(err: HostError) -> Thrown {
    Thrown::Failed(err.into())
}

/// Runs the complete step of `wip`.
///
/// Returns `Some(node)` if `node` must be begun again before the walk moves
/// on.
pub(crate) fn complete_work(cx: &mut WorkCx<'_, '_>, wip: u32) -> Result<Option<u32>, Thrown> {
    let current = cx.current_of(wip);
    match cx.store[wip].tag {
        WorkTag::HostElement => complete_host(cx, wip, current)?,
        WorkTag::HostText => complete_text(cx, wip, current)?,
        WorkTag::Root => {
            if let Some(cur) = current
                && cx.store[cur].child == INVALID
                && cx.store[wip].child != INVALID
            {
                // First content: the container is cleared before mutation.
                cx.store[wip].flags |= NodeFlags::SNAPSHOT;
            }
        }
        WorkTag::Suspense => {
            if !cx.store[wip].retry_wakeables.is_empty() {
                cx.store[wip].flags |= NodeFlags::UPDATE;
            }
        }
        WorkTag::SuspenseList => {
            if complete_suspense_list(cx, wip) {
                return Ok(Some(wip));
            }
            if !cx.store[wip].retry_wakeables.is_empty() {
                cx.store[wip].flags |= NodeFlags::UPDATE;
            }
        }
        WorkTag::Provider | WorkTag::Cache => cx.pass.contexts.pop(wip),
        _ => {}
    }
    bubble_properties(cx, wip, current);
    Ok(None)
}

fn complete_host(cx: &mut WorkCx<'_, '_>, wip: u32, current: Option<u32>) -> Result<(), Thrown> {
    let node = &cx.store[wip];
    let ty = match &node.ty {
        Some(ElementType::Host(ty)) => *ty,
        _ => return Ok(()),
    };
    let props = node.pending_props.clone();
    if let Some(cur) = current
        && node.instance.is_some()
    {
        let old = cx.store[cur].memoized_props.clone().unwrap_or_default();
        if let Some(payload) = props.attrs().diff(old.attrs()) {
            let node = &mut cx.store[wip];
            node.update_payload = Some(payload);
            node.flags |= NodeFlags::UPDATE;
        }
        return Ok(());
    }

    let instance = cx
        .host
        .create_instance(ty, props.attrs())
        .map_err(host_failed)?;
    append_all_children(cx, wip, instance)?;
    cx.store[wip].instance = Some(instance);
    if cx.host.finalize_initial_children(instance, ty, props.attrs()) {
        cx.store[wip].flags |= NodeFlags::CALLBACK;
    }
    Ok(())
}

fn complete_text(cx: &mut WorkCx<'_, '_>, wip: u32, current: Option<u32>) -> Result<(), Thrown> {
    let node = &cx.store[wip];
    let text = text_of(&node.pending_props);
    if let Some(cur) = current
        && node.instance.is_some()
    {
        let old = cx.store[cur]
            .memoized_props
            .as_ref()
            .map(text_of)
            .unwrap_or_default();
        if old != text {
            cx.store[wip].flags |= NodeFlags::UPDATE;
        }
        return Ok(());
    }
    let instance = cx.host.create_text_instance(&text).map_err(host_failed)?;
    cx.store[wip].instance = Some(instance);
    Ok(())
}

/// Appends the topmost host nodes below `wip` to its new instance.
fn append_all_children(
    cx: &mut WorkCx<'_, '_>,
    wip: u32,
    parent: InstanceId,
) -> Result<(), Thrown> {
    let mut node = cx.store[wip].child;
    while node != INVALID {
        let n = &cx.store[node];
        if n.tag.is_host() {
            if let Some(child) = n.instance {
                cx.host
                    .append_initial_child(parent, child)
                    .map_err(host_failed)?;
            }
        } else if n.tag != WorkTag::Portal && n.child != INVALID {
            let child = n.child;
            cx.store[child].parent = node;
            node = child;
            continue;
        }
        while cx.store[node].sibling == INVALID {
            let up = cx.store[node].parent;
            if up == wip || up == INVALID {
                return Ok(());
            }
            node = up;
        }
        let sibling = cx.store[node].sibling;
        cx.store[sibling].parent = cx.store[node].parent;
        node = sibling;
    }
    Ok(())
}

/// Decides which rows of a list are forced to their fallback.
///
/// `rows` holds each suspense row's index and whether it showed its
/// fallback in this attempt.
fn list_force(order: RevealOrder, rows: &[(u32, bool)]) -> ListForce {
    let fallback = || rows.iter().filter(|r| r.1).map(|r| r.0);
    let content = || rows.iter().filter(|r| !r.1).map(|r| r.0);
    match order {
        RevealOrder::Together => {
            if fallback().next().is_some() && content().next().is_some() {
                ListForce::All
            } else {
                ListForce::None
            }
        }
        RevealOrder::Forwards => match fallback().min() {
            Some(first) if content().any(|c| c > first) => ListForce::After(first),
            _ => ListForce::None,
        },
        RevealOrder::Backwards => match fallback().max() {
            Some(last) if content().any(|c| c < last) => ListForce::Before(last),
            _ => ListForce::None,
        },
    }
}

/// Returns `true` if the list must render its rows again.
fn complete_suspense_list(cx: &mut WorkCx<'_, '_>, wip: u32) -> bool {
    if cx.store[wip].flags.contains(NodeFlags::DID_CAPTURE) {
        return false;
    }
    let rows: Vec<(u32, bool)> = cx
        .store
        .children(wip)
        .filter(|&c| cx.store[c].tag == WorkTag::Suspense)
        .map(|c| (cx.store[c].index, cx.store[c].state.is_showing_fallback()))
        .collect();
    let order = RevealOrder::from_props(&cx.store[wip].pending_props);
    let force = list_force(order, &rows);
    if force == ListForce::None {
        return false;
    }
    // Forced rows do not render their primary content again, so the list
    // waits on what they suspended on.
    let mut pending = Vec::new();
    for row in cx.store.children(wip) {
        for &w in &cx.store[row].retry_wakeables {
            if !pending.contains(&w) {
                pending.push(w);
            }
        }
    }
    let node = &mut cx.store[wip];
    for w in pending {
        if !node.retry_wakeables.contains(&w) {
            node.retry_wakeables.push(w);
        }
    }
    node.state = NodeState::SuspenseList { force };
    node.flags.remove(NodeFlags::CHILD_DELETION);
    node.flags.insert(NodeFlags::DID_CAPTURE);
    node.deletions.clear();
    node.subtree_flags = NodeFlags::empty();
    true
}

/// Folds the children's lanes and flags into `wip`.
fn bubble_properties(cx: &mut WorkCx<'_, '_>, wip: u32, current: Option<u32>) {
    let first = cx.store[wip].child;
    let did_bailout = current.is_some_and(|c| cx.store[c].child == first);
    let mut lanes = Lanes::NONE;
    let mut flags = NodeFlags::empty();
    let mut child = first;
    while child != INVALID {
        let c = &mut cx.store[child];
        c.parent = wip;
        lanes |= c.lanes | c.child_lanes;
        if !did_bailout {
            flags |= c.flags | c.subtree_flags;
        }
        child = c.sibling;
    }
    let node = &mut cx.store[wip];
    if node.tag == WorkTag::Offscreen && node.state.is_hidden() {
        // Work inside a frozen subtree resurfaces when it is shown again.
        lanes = Lanes::NONE;
    }
    node.child_lanes = lanes;
    node.subtree_flags = flags;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn together_forces_all_rows_while_any_is_pending() {
        let rows = [(0, false), (1, true), (2, false)];
        assert_eq!(list_force(RevealOrder::Together, &rows), ListForce::All);
        assert_eq!(
            list_force(RevealOrder::Together, &[(0, true), (1, true)]),
            ListForce::None,
            "nothing to hold back"
        );
    }

    #[test]
    fn forwards_holds_rows_after_the_first_fallback() {
        let rows = [(0, false), (1, true), (2, false)];
        let force = list_force(RevealOrder::Forwards, &rows);
        assert_eq!(force, ListForce::After(1));
        assert!(!force.covers(0));
        assert!(force.covers(2));
        assert_eq!(
            list_force(RevealOrder::Forwards, &[(0, false), (1, true)]),
            ListForce::None
        );
    }

    #[test]
    fn backwards_holds_rows_before_the_last_fallback() {
        let rows = [(0, false), (1, true), (2, false)];
        assert_eq!(list_force(RevealOrder::Backwards, &rows), ListForce::Before(1));
        assert_eq!(
            list_force(RevealOrder::Backwards, &[(0, true), (1, false)]),
            ListForce::None
        );
    }
}
