// Copyright 2026 the Weft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The begin step: compute a node's next state and its children.
//!
//! [`begin_work`] first tries to bail out. A node whose props are the same
//! allocation as last commit and whose `lanes` miss the render lanes is not
//! rendered; if its `child_lanes` also miss, the whole subtree is skipped,
//! otherwise its children are cloned so the walk can reach the deeper work.
//!
//! Everything else is dispatched on the node's [`WorkTag`]. Components run
//! through a [`RenderCx`]; host elements only reconcile their child
//! elements; boundaries decide between primary and fallback content.

use alloc::vec;
use alloc::vec::Vec;

use crate::child::{clone_child_nodes, reconcile_children, remount_children};
use crate::component::{
    ClassComponent, Component, Context, ContextDependency, ContextKey, ContextStack, ConsumerFn,
    Render, RenderCx,
};
use crate::element::{Element, ElementType, NodeRef, OffscreenMode, Props, Value};
use crate::lane::Lanes;
use crate::node::{INVALID, ListForce, NodeFlags, NodeState, NodeStore, WorkTag};
use crate::reconciler::StateHandle;
use crate::unwind::Thrown;
use crate::work_loop::WorkCx;

/// Attribute holding a provider's value.
pub(crate) const VALUE_ATTR: &str = "value";
const PRIMARY_KEY: &str = "primary";
const FALLBACK_KEY: &str = "fallback";

/// Runs the begin step of `wip` and returns its first child to visit, or
/// [`INVALID`] if the node has no work below it.
pub(crate) fn begin_work(cx: &mut WorkCx<'_, '_>, wip: u32) -> Result<u32, Thrown> {
    let current = cx.current_of(wip);
    let lanes = cx.pass.lanes;
    let scheduled = cx.store[wip].lanes.includes_any(lanes);

    if let Some(cur) = current {
        let node = &cx.store[wip];
        let props_unchanged = cx.store[cur]
            .memoized_props
            .as_ref()
            .is_some_and(|old| Props::ptr_eq(old, &node.pending_props));
        let forced = node.flags.contains(NodeFlags::DID_CAPTURE)
            || (node.tag == WorkTag::Root && cx.pass.force_empty);
        if props_unchanged && !scheduled && !forced {
            return Ok(bailout_early(cx, wip));
        }
    }

    cx.store[wip].lanes = cx.store[wip].lanes.subtract(lanes);
    let tag = cx.store[wip].tag;
    let ty = cx.store[wip].ty.clone();
    let props = cx.store[wip].pending_props.clone();
    match (tag, ty) {
        (WorkTag::Root, _) => Ok(update_root(cx, wip, current)),
        (WorkTag::Function, Some(ElementType::Function(component))) => {
            update_function(cx, wip, current, &component, &props)
        }
        (WorkTag::Memo, Some(ElementType::Memo(memo))) => {
            if let Some(cur) = current
                && !scheduled
                && cx.store[cur]
                    .memoized_props
                    .as_ref()
                    .is_some_and(|old| memo.props_equal(old, &props))
            {
                return Ok(bailout_on_already_finished(cx, wip));
            }
            update_function(cx, wip, current, memo.inner(), &props)
        }
        (WorkTag::Lazy, Some(ElementType::Lazy(lazy))) => match lazy.poll() {
            Ok(component) => update_function(cx, wip, current, &component, &props),
            Err(Render::Suspended(w)) => Err(Thrown::Suspended(w)),
            Err(Render::Failed(err)) => Err(Thrown::Failed(err)),
            Err(Render::Ready(children)) => Ok(reconcile(cx, wip, current, &children)),
        },
        (WorkTag::Class, Some(ElementType::Class(class))) => {
            update_class(cx, wip, current, &class, &props)
        }
        (WorkTag::HostElement | WorkTag::Scope, _) => {
            mark_ref(cx.store, wip, current);
            Ok(reconcile(cx, wip, current, props.children()))
        }
        (WorkTag::HostText, _) => Ok(INVALID),
        (WorkTag::Fragment, _) => Ok(reconcile(cx, wip, current, props.children())),
        (WorkTag::Portal, _) => {
            // Portal children are always placed: no host ancestor appends
            // them on mount.
            let first = current.map_or(INVALID, |c| cx.store[c].child);
            Ok(reconcile_children(
                cx.store,
                wip,
                first,
                props.children(),
                true,
                lanes,
            ))
        }
        (WorkTag::Provider, Some(ElementType::Provider(context))) => {
            Ok(update_provider(cx, wip, current, &context, &props))
        }
        (WorkTag::Consumer, Some(ElementType::Consumer(context, render))) => {
            Ok(update_consumer(cx, wip, current, &context, &render))
        }
        (WorkTag::Cache, _) => Ok(update_cache(cx, wip, current, &props)),
        (WorkTag::Suspense, _) => Ok(update_suspense(cx, wip, current, &props)),
        (WorkTag::SuspenseList, _) => Ok(update_suspense_list(cx, wip, current, &props)),
        (WorkTag::Offscreen, _) => Ok(update_offscreen(cx, wip, current, &props)),
        (tag, ty) => {
            debug_assert!(false, "node kind {tag:?} does not match element type {ty:?}");
            Ok(INVALID)
        }
    }
}

// ---------------------------------------------------------------------------
// Bail-out
// ---------------------------------------------------------------------------

fn bailout_early(cx: &mut WorkCx<'_, '_>, wip: u32) -> u32 {
    let node = &cx.store[wip];
    match (node.tag, &node.ty) {
        (WorkTag::Provider, Some(ElementType::Provider(context))) => {
            let value = node
                .pending_props
                .get(VALUE_ATTR)
                .cloned()
                .unwrap_or_default();
            cx.pass.contexts.push(context.key(), value, wip);
        }
        (WorkTag::Cache, _) => {
            let handle = node.state.value().cloned().unwrap_or_default();
            cx.pass.contexts.push(ContextKey::Cache, handle, wip);
        }
        (WorkTag::Offscreen, _) if node.state.is_hidden() => return INVALID,
        _ => {}
    }
    bailout_on_already_finished(cx, wip)
}

/// Skips the node itself; descends only if its subtree has render lanes.
fn bailout_on_already_finished(cx: &mut WorkCx<'_, '_>, wip: u32) -> u32 {
    if !cx.store[wip].child_lanes.includes_any(cx.pass.lanes) {
        return INVALID;
    }
    clone_child_nodes(cx.store, wip);
    cx.store[wip].child
}

fn reconcile(cx: &mut WorkCx<'_, '_>, wip: u32, current: Option<u32>, elements: &[Element]) -> u32 {
    let current_first = current.map_or(INVALID, |c| cx.store[c].child);
    reconcile_children(
        cx.store,
        wip,
        current_first,
        elements,
        current.is_some(),
        cx.pass.lanes,
    )
}

fn dependencies_changed(contexts: &ContextStack, deps: &[ContextDependency]) -> bool {
    deps.iter()
        .any(|d| contexts.read(d.key).is_some_and(|v| *v != d.observed))
}

fn update_root(cx: &mut WorkCx<'_, '_>, wip: u32, current: Option<u32>) -> u32 {
    let lanes = cx.pass.lanes;
    let memoized = match &cx.store[wip].state {
        NodeState::Root(element) => element.clone(),
        _ => None,
    };
    if cx.pass.force_empty {
        // Teardown renders nothing and drops whatever was still queued.
        let node = &mut cx.store[wip];
        if let Some(queue) = node.queue.as_mut() {
            queue.clear();
        }
        node.lanes = Lanes::NONE;
        node.state = NodeState::Root(None);
        return reconcile(cx, wip, current, &[]);
    }

    let mut queue = cx.store[wip].queue.take().unwrap_or_default();
    let mut current_queue = current.and_then(|c| cx.store[c].queue.take());
    let processed = queue.process_element(memoized.clone(), current_queue.as_mut(), lanes);
    cx.store[wip].queue = Some(queue);
    if let Some(c) = current {
        cx.store[c].queue = current_queue;
    }

    let element = processed.state;
    let unchanged = match (&memoized, &element) {
        (Some(old), Some(new)) => Element::same_identity(old, new),
        (None, None) => true,
        _ => false,
    };
    let node = &mut cx.store[wip];
    node.lanes = processed.skipped_lanes;
    node.state = NodeState::Root(element.clone());
    if unchanged && !processed.forced && current.is_some_and(|c| cx.store[c].child != INVALID) {
        return bailout_on_already_finished(cx, wip);
    }
    let children: Vec<Element> = element.into_iter().collect();
    reconcile(cx, wip, current, &children)
}

fn handle_of(cx: &WorkCx<'_, '_>, wip: u32) -> StateHandle {
    StateHandle {
        root: cx.pass.root,
        node: cx.store.id(wip),
    }
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

fn update_function(
    cx: &mut WorkCx<'_, '_>,
    wip: u32,
    current: Option<u32>,
    component: &Component,
    props: &Props,
) -> Result<u32, Thrown> {
    let handle = handle_of(cx, wip);
    let lanes = cx.pass.lanes;
    let base_state = cx.store[wip].state.value().cloned();
    let mut queue = cx.store[wip].queue.take();
    let mut current_queue = current.and_then(|c| cx.store[c].queue.take());
    let prev_effects = core::mem::take(&mut cx.store[wip].effects);

    let (render, out) = {
        let mut rcx = RenderCx::new(
            handle,
            lanes,
            base_state,
            queue.as_mut(),
            current_queue.as_mut(),
            &cx.pass.contexts,
            &prev_effects,
        );
        let render = component.render(&mut rcx, props);
        (render, rcx.finish())
    };
    cx.store[wip].queue = queue;
    if let Some(c) = current {
        cx.store[c].queue = current_queue;
    }

    let children = match render {
        Render::Ready(children) => children,
        Render::Suspended(w) => {
            cx.store[wip].effects = prev_effects;
            return Err(Thrown::Suspended(w));
        }
        Render::Failed(err) => {
            cx.store[wip].effects = prev_effects;
            return Err(Thrown::Failed(err));
        }
    };

    let received_update = match current {
        None => true,
        Some(cur) => {
            let old = &cx.store[cur];
            out.state_changed
                || !old
                    .memoized_props
                    .as_ref()
                    .is_some_and(|p| Props::ptr_eq(p, props))
                || dependencies_changed(&cx.pass.contexts, &old.dependencies)
        }
    };

    let node = &mut cx.store[wip];
    node.lanes = out.skipped_lanes;
    if let Some(state) = out.state {
        node.state = NodeState::Value(state);
    }
    node.dependencies = out.dependencies;
    if !received_update {
        node.effects = prev_effects;
        return Ok(bailout_on_already_finished(cx, wip));
    }

    node.flags |= NodeFlags::PERFORMED_WORK;
    for hook in out.effects.iter().filter(|h| h.has_effect) {
        node.flags |= match hook.kind {
            crate::component::EffectKind::Layout => NodeFlags::UPDATE,
            crate::component::EffectKind::Passive => NodeFlags::PASSIVE,
        };
    }
    node.effects = out.effects;
    Ok(reconcile(cx, wip, current, &children))
}

fn update_class(
    cx: &mut WorkCx<'_, '_>,
    wip: u32,
    current: Option<u32>,
    class: &ClassComponent,
    props: &Props,
) -> Result<u32, Thrown> {
    let lanes = cx.pass.lanes;
    let old_state = match cx.store[wip].state.value() {
        Some(state) => state.clone(),
        None => class.initial_state(props),
    };
    let mut queue = cx.store[wip].queue.take().unwrap_or_default();
    let mut current_queue = current.and_then(|c| cx.store[c].queue.take());
    let processed = queue.process_value(old_state.clone(), current_queue.as_mut(), lanes);
    cx.store[wip].queue = Some(queue);
    if let Some(c) = current {
        cx.store[c].queue = current_queue;
    }

    let mut state = processed.state;
    let did_capture = !processed.captured.is_empty();
    for err in &processed.captured {
        if let Some(next) = class.catch(err, &state) {
            state = next;
        }
    }
    let node = &mut cx.store[wip];
    node.lanes = processed.skipped_lanes;
    if did_capture {
        node.flags |= NodeFlags::CALLBACK | NodeFlags::DID_CAPTURE;
        node.caught = processed.captured;
    }

    let should_render = match current {
        None => true,
        Some(_) if did_capture || processed.forced => true,
        Some(cur) => {
            let old = &cx.store[cur];
            let old_props = old.memoized_props.clone().unwrap_or_default();
            let unchanged = Props::ptr_eq(&old_props, props)
                && state == old_state
                && !dependencies_changed(&cx.pass.contexts, &old.dependencies);
            !unchanged && class.should_update(&old_props, props, &old_state, &state)
        }
    };
    cx.store[wip].state = NodeState::Value(state.clone());
    if !should_render {
        return Ok(bailout_on_already_finished(cx, wip));
    }

    let handle = handle_of(cx, wip);
    let (render, out) = {
        let mut rcx = RenderCx::new(handle, lanes, None, None, None, &cx.pass.contexts, &[]);
        let render = class.render(&mut rcx, props, &state);
        (render, rcx.finish())
    };
    let children = match render {
        Render::Ready(children) => children,
        Render::Suspended(w) => return Err(Thrown::Suspended(w)),
        Render::Failed(err) => return Err(Thrown::Failed(err)),
    };

    let node = &mut cx.store[wip];
    node.dependencies = out.dependencies;
    node.flags |= NodeFlags::PERFORMED_WORK;
    if class.has_layout_callbacks() {
        node.flags |= NodeFlags::UPDATE;
    }
    if current.is_some() && class.has_snapshot() {
        node.flags |= NodeFlags::SNAPSHOT;
    }
    match current {
        Some(cur) if did_capture => {
            let first = cx.store[cur].child;
            Ok(remount_children(cx.store, wip, first, &children, lanes))
        }
        _ => Ok(reconcile(cx, wip, current, &children)),
    }
}

// ---------------------------------------------------------------------------
// Host, context and cache
// ---------------------------------------------------------------------------

fn mark_ref(store: &mut NodeStore, wip: u32, current: Option<u32>) {
    let new = store[wip].node_ref.as_ref();
    let changed = match current.map(|c| store[c].node_ref.as_ref()) {
        None => new.is_some(),
        Some(old) => match (old, new) {
            (Some(a), Some(b)) => !NodeRef::ptr_eq(a, b),
            (None, None) => false,
            _ => true,
        },
    };
    if changed {
        store[wip].flags |= NodeFlags::REF;
    }
}

fn update_provider(
    cx: &mut WorkCx<'_, '_>,
    wip: u32,
    current: Option<u32>,
    context: &Context,
    props: &Props,
) -> u32 {
    let key = context.key();
    let value = props.get(VALUE_ATTR).cloned().unwrap_or_default();
    if let Some(cur) = current {
        let old = cx.store[cur]
            .memoized_props
            .as_ref()
            .and_then(|p| p.get(VALUE_ATTR))
            .cloned()
            .unwrap_or_default();
        if old != value {
            propagate_context_change(cx.store, wip, key, cx.pass.lanes);
        }
    }
    cx.pass.contexts.push(key, value, wip);
    reconcile(cx, wip, current, props.children())
}

fn update_consumer(
    cx: &mut WorkCx<'_, '_>,
    wip: u32,
    current: Option<u32>,
    context: &Context,
    render: &ConsumerFn,
) -> u32 {
    let key = context.key();
    let value = cx
        .pass
        .contexts
        .read(key)
        .cloned()
        .unwrap_or_else(|| context.default_value().clone());
    let children = render(&value);
    let node = &mut cx.store[wip];
    node.flags |= NodeFlags::PERFORMED_WORK;
    node.dependencies = vec![ContextDependency {
        key,
        observed: value,
    }];
    reconcile(cx, wip, current, &children)
}

fn update_cache(cx: &mut WorkCx<'_, '_>, wip: u32, current: Option<u32>, props: &Props) -> u32 {
    let lanes = cx.pass.lanes;
    let handle = match cx.store[wip].state.value() {
        Some(handle) => handle.clone(),
        None => {
            let handle = Value::Int(*cx.next_cache_handle);
            *cx.next_cache_handle += 1;
            handle
        }
    };
    let mut queue = cx.store[wip].queue.take().unwrap_or_default();
    let mut current_queue = current.and_then(|c| cx.store[c].queue.take());
    let processed = queue.process_value(handle.clone(), current_queue.as_mut(), lanes);
    cx.store[wip].queue = Some(queue);
    if let Some(c) = current {
        cx.store[c].queue = current_queue;
    }

    let next = processed.state;
    if current.is_some() && next != handle {
        propagate_context_change(cx.store, wip, ContextKey::Cache, lanes);
    }
    let node = &mut cx.store[wip];
    node.lanes = processed.skipped_lanes;
    node.state = NodeState::Value(next.clone());
    cx.pass.contexts.push(ContextKey::Cache, next, wip);
    reconcile(cx, wip, current, props.children())
}

/// Schedules every reader of `key` below `provider` for the render lanes.
///
/// Readers get `lanes`; their ancestors up to the provider get
/// `child_lanes`, so bailed-out parents still descend to them. Nested
/// providers of the same key shadow their subtrees.
pub(crate) fn propagate_context_change(
    store: &mut NodeStore,
    provider: u32,
    key: ContextKey,
    lanes: Lanes,
) {
    let first = store[provider].child;
    if first == INVALID {
        return;
    }
    store[first].parent = provider;
    let mut node = first;
    while node != INVALID {
        let n = &store[node];
        let mut next = n.child;
        if n.dependencies.iter().any(|d| d.key == key) {
            store[node].lanes |= lanes;
            if let Some(alt) = store.alternate(node) {
                store[alt].lanes |= lanes;
            }
            let parent = store[node].parent;
            mark_parent_path(store, parent, lanes, provider);
        } else if shadows(store, node, key) {
            next = INVALID;
        }

        if next != INVALID {
            store[next].parent = node;
            node = next;
            continue;
        }
        let mut up = node;
        node = loop {
            if up == provider {
                break INVALID;
            }
            let sibling = store[up].sibling;
            if sibling != INVALID {
                store[sibling].parent = store[up].parent;
                break sibling;
            }
            up = store[up].parent;
        };
    }
}

fn shadows(store: &NodeStore, node: u32, key: ContextKey) -> bool {
    match &store[node].ty {
        Some(ElementType::Provider(context)) => context.key() == key,
        Some(ElementType::Cache) => key == ContextKey::Cache,
        _ => false,
    }
}

fn mark_parent_path(store: &mut NodeStore, from: u32, lanes: Lanes, until: u32) {
    let mut node = from;
    while node != INVALID {
        store[node].child_lanes |= lanes;
        if let Some(alt) = store.alternate(node) {
            store[alt].child_lanes |= lanes;
        }
        if node == until {
            break;
        }
        node = store[node].parent;
    }
}

// ---------------------------------------------------------------------------
// Boundaries
// ---------------------------------------------------------------------------

fn update_suspense(cx: &mut WorkCx<'_, '_>, wip: u32, current: Option<u32>, props: &Props) -> u32 {
    let parent = cx.store[wip].parent;
    let row = cx.store[wip].index;
    let forced = parent != INVALID
        && matches!(cx.store[parent].state, NodeState::SuspenseList { force } if force.covers(row));
    let show_fallback = cx.store[wip].flags.contains(NodeFlags::DID_CAPTURE) || forced;
    cx.store[wip].state = NodeState::Suspense {
        showing_fallback: show_fallback,
    };

    let mode = if show_fallback {
        OffscreenMode::Hidden
    } else {
        OffscreenMode::Visible
    };
    let mut children: Vec<Element> = vec![
        Element::offscreen(mode)
            .with_key(PRIMARY_KEY)
            .with_children(props.children().iter().cloned()),
    ];
    if show_fallback {
        children.push(
            Element::fragment(props.fallback().iter().cloned()).with_key(FALLBACK_KEY),
        );
    }
    reconcile(cx, wip, current, &children)
}

fn update_offscreen(cx: &mut WorkCx<'_, '_>, wip: u32, current: Option<u32>, props: &Props) -> u32 {
    let hidden = OffscreenMode::from_props(props) == OffscreenMode::Hidden;
    if let Some(cur) = current
        && cx.store[cur].state.is_hidden() != hidden
    {
        cx.store[wip].flags |= NodeFlags::VISIBILITY;
    }
    cx.store[wip].state = NodeState::Offscreen { hidden };
    if hidden {
        // Frozen: keep whatever is committed and do not descend.
        cx.store[wip].child = current.map_or(INVALID, |c| cx.store[c].child);
        return INVALID;
    }
    reconcile(cx, wip, current, props.children())
}

fn update_suspense_list(
    cx: &mut WorkCx<'_, '_>,
    wip: u32,
    current: Option<u32>,
    props: &Props,
) -> u32 {
    if !cx.store[wip].flags.contains(NodeFlags::DID_CAPTURE) {
        cx.store[wip].state = NodeState::SuspenseList {
            force: ListForce::None,
        };
    }
    let first = reconcile(cx, wip, current, props.children());
    // Every row re-evaluates its fallback against the list's decision.
    let lanes = cx.pass.lanes;
    let mut row = first;
    while row != INVALID {
        if cx.store[row].tag == WorkTag::Suspense {
            cx.store[row].lanes |= lanes;
        }
        row = cx.store[row].sibling;
    }
    first
}
