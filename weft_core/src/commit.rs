// Copyright 2026 the Weft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The commit engine.
//!
//! Applies a finished work-in-progress tree to the host in three
//! synchronous phases, then queues passive effects:
//!
//! ```text
//!   before-mutation   class snapshots, clear the container on first mount
//!   mutation          deletions, placements, updates, ref detach, visibility
//!   (swap)            the finished tree becomes current
//!   layout            layout effects, class lifecycles, ref attach
//!   passive           collected here, flushed later at normal priority
//! ```
//!
//! Each phase only descends into subtrees whose bubbled `subtree_flags`
//! intersect the phase's mask. Host failures do not abort a phase: the
//! first one is recorded and the commit runs to the end, so the host tree
//! always matches the committed node tree.

use alloc::vec::Vec;

use hashbrown::HashMap;

use crate::complete::text_of;
use crate::component::{EffectCx, EffectHook, EffectKind, Wakeable};
use crate::element::{ElementType, RefTarget};
use crate::error::HostError;
use crate::host::{HostAdapter, HostParent, HostScheduler, InstanceId};
use crate::lane::Lanes;
use crate::node::{INVALID, NodeFlags, NodeId, NodeStore, WorkTag, top_level_hosts};
use crate::reconciler::{RootId, StateHandle};
use crate::root::{PendingPassive, RootCoordinator};
use crate::trace::{PassSummaryBuilder, PhaseBeginEvent, PhaseEndEvent, PhaseKind, Tracer};
use crate::unwind::find_error_boundary;
use crate::update_queue::Action;
use crate::work_loop::RenderPass;

/// A host failure recorded during a commit.
#[derive(Debug)]
pub(crate) struct CommitError {
    /// The error boundary that should handle it, if any.
    pub(crate) boundary: Option<StateHandle>,
    pub(crate) error: HostError,
}

/// What a commit leaves for the reconciler to act on.
#[derive(Debug, Default)]
pub(crate) struct CommitOutcome {
    /// State updates requested by layout effects and lifecycles.
    pub(crate) updates: Vec<(StateHandle, Action)>,
    pub(crate) error: Option<CommitError>,
    /// Passive effects were queued on the root.
    pub(crate) has_passive: bool,
    pub(crate) mutations: u32,
}

struct CommitCx<'a> {
    store: &'a mut NodeStore,
    host: &'a mut dyn HostAdapter,
    root: RootId,
    retry_cache: &'a mut HashMap<Wakeable, Vec<NodeId>>,
    passive: PendingPassive,
    updates: Vec<(StateHandle, Action)>,
    mutations: u32,
    error: Option<(u32, HostError)>,
}

impl CommitCx<'_> {
    fn record(&mut self, node: u32, result: Result<(), HostError>) {
        self.mutations += 1;
        if let Err(err) = result
            && self.error.is_none()
        {
            self.error = Some((node, err));
        }
    }

    fn handle(&self, node: u32) -> StateHandle {
        StateHandle {
            root: self.root,
            node: self.store.id(node),
        }
    }
}

fn touches(store: &NodeStore, node: u32, mask: NodeFlags) -> bool {
    (store[node].flags | store[node].subtree_flags).intersects(mask)
}

fn children(store: &NodeStore, node: u32) -> Vec<u32> {
    store.children(node).collect()
}

fn phase(
    tracer: &mut Tracer<'_>,
    summary: &mut PassSummaryBuilder,
    scheduler: &dyn HostScheduler,
    root: RootId,
    kind: PhaseKind,
    begin: bool,
) {
    let timestamp = scheduler.now();
    if begin {
        summary.phase_begin(kind, timestamp);
        tracer.phase_begin(&PhaseBeginEvent {
            root,
            phase: kind,
            timestamp,
        });
    } else {
        summary.phase_end(kind, timestamp);
        tracer.phase_end(&PhaseEndEvent {
            root,
            phase: kind,
            timestamp,
        });
    }
}

/// Commits the finished tree of `pass` and makes it current.
pub(crate) fn commit_root(
    root: &mut RootCoordinator,
    pass: RenderPass,
    host: &mut dyn HostAdapter,
    scheduler: &dyn HostScheduler,
    tracer: &mut Tracer<'_>,
) -> CommitOutcome {
    let finished = pass.wip_root;
    let id = root.id;
    let container = root.container;
    let remaining = root.store[finished].lanes | root.store[finished].child_lanes;
    root.mark_finished(remaining);

    let mut summary = PassSummaryBuilder::new(id, pass.lanes, pass.units, scheduler.now());
    summary.set_remaining(remaining);
    host.prepare_for_commit(container);

    let mut cx = CommitCx {
        store: &mut root.store,
        host,
        root: id,
        retry_cache: &mut root.retry_cache,
        passive: PendingPassive {
            lanes: pass.lanes,
            ..PendingPassive::default()
        },
        updates: Vec::new(),
        mutations: 0,
        error: None,
    };

    phase(tracer, &mut summary, scheduler, id, PhaseKind::BeforeMutation, true);
    if touches(cx.store, finished, NodeFlags::BEFORE_MUTATION_MASK) {
        before_mutation(&mut cx, finished, container);
    }
    phase(tracer, &mut summary, scheduler, id, PhaseKind::BeforeMutation, false);

    phase(tracer, &mut summary, scheduler, id, PhaseKind::Mutation, true);
    mutation(&mut cx, finished, HostParent::Container(container));
    cx.host.reset_after_commit(container);
    phase(tracer, &mut summary, scheduler, id, PhaseKind::Mutation, false);

    root.current = finished;

    phase(tracer, &mut summary, scheduler, id, PhaseKind::Layout, true);
    if touches(cx.store, finished, NodeFlags::LAYOUT_MASK) {
        layout(&mut cx, finished);
    }
    phase(tracer, &mut summary, scheduler, id, PhaseKind::Layout, false);

    if touches(cx.store, finished, NodeFlags::PASSIVE_MASK) {
        collect_passive(&mut cx, finished);
    }

    let error = cx.error.take().map(|(node, error)| {
        let parent = cx.store[node].parent;
        let boundary = if node == finished {
            None
        } else {
            find_error_boundary(cx.store, parent)
        };
        CommitError {
            boundary: boundary.map(|b| cx.handle(b)),
            error,
        }
    });
    let mutations = cx.mutations;
    let updates = core::mem::take(&mut cx.updates);
    let passive = core::mem::take(&mut cx.passive);

    root.store.sweep(finished);
    let has_passive = !passive.is_empty();
    if has_passive {
        root.passive = Some(passive);
    }

    summary.set_mutations(mutations);
    tracer.commit_summary(&summary.finish());
    CommitOutcome {
        updates,
        error,
        has_passive,
        mutations,
    }
}

// ---------------------------------------------------------------------------
// Before mutation
// ---------------------------------------------------------------------------

fn before_mutation(cx: &mut CommitCx<'_>, node: u32, container: crate::host::ContainerId) {
    if cx.store[node].subtree_flags.intersects(NodeFlags::BEFORE_MUTATION_MASK) {
        for child in children(cx.store, node) {
            before_mutation(cx, child, container);
        }
    }
    if !cx.store[node].flags.contains(NodeFlags::SNAPSHOT) {
        return;
    }
    match (cx.store[node].tag, cx.store[node].ty.clone()) {
        (WorkTag::Root, _) => {
            let result = cx.host.clear_container(container);
            cx.record(node, result);
        }
        (WorkTag::Class, Some(ElementType::Class(class))) => {
            if let Some(prev) = cx.store.alternate(node) {
                let props = cx.store[prev].memoized_props.clone().unwrap_or_default();
                let state = cx.store[prev].state.value().cloned().unwrap_or_default();
                cx.store[node].snapshot = class.snapshot(&props, &state);
            }
        }
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Mutation
// ---------------------------------------------------------------------------

/// The host parent that children of `node` attach to.
fn host_parent_for_children(cx: &CommitCx<'_>, node: u32, parent: HostParent) -> HostParent {
    let n = &cx.store[node];
    match (&n.ty, n.instance) {
        (Some(ElementType::Host(_)), Some(instance)) => HostParent::Instance(instance),
        (Some(ElementType::Portal(container)), _) => HostParent::Container(*container),
        _ => parent,
    }
}

fn mutation(cx: &mut CommitCx<'_>, node: u32, parent: HostParent) {
    let child_parent = host_parent_for_children(cx, node, parent);

    let deletions = core::mem::take(&mut cx.store[node].deletions);
    for deleted in deletions {
        delete_subtree(cx, deleted, Some(child_parent));
    }

    if cx.store[node].subtree_flags.intersects(NodeFlags::MUTATION_MASK) {
        for child in children(cx.store, node) {
            cx.store[child].parent = node;
            mutation(cx, child, child_parent);
        }
    }

    let flags = cx.store[node].flags;
    if flags.contains(NodeFlags::PLACEMENT) {
        let before = host_sibling(cx.store, node);
        insert_placed(cx, node, parent, before);
        cx.store[node].flags.remove(NodeFlags::PLACEMENT);
    }
    if flags.contains(NodeFlags::UPDATE) {
        commit_update(cx, node);
    }
    if flags.contains(NodeFlags::REF)
        && let Some(prev) = cx.store.alternate(node)
        && let Some(old) = &cx.store[prev].node_ref
    {
        old.set(None);
    }
    if flags.contains(NodeFlags::VISIBILITY) {
        let hidden = cx.store[node].state.is_hidden();
        for host in top_level_hosts(cx.store, node) {
            // Hosts mounted in this commit were never hidden.
            if !hidden && cx.store.alternate(host).is_none() {
                continue;
            }
            if let Some(instance) = cx.store[host].instance {
                let result = if hidden {
                    cx.host.hide_instance(instance)
                } else {
                    cx.host.unhide_instance(instance)
                };
                cx.record(host, result);
            }
        }
    }
}

/// Finds the host instance a placed node must be inserted before.
///
/// Walks forward through siblings (and up through non-host parents),
/// skipping nodes that are themselves being placed.
fn host_sibling(store: &mut NodeStore, node: u32) -> Option<InstanceId> {
    let mut n = node;
    'siblings: loop {
        while store[n].sibling == INVALID {
            let parent = store[n].parent;
            if parent == INVALID || store[parent].tag.is_host_parent() {
                return None;
            }
            n = parent;
        }
        let sibling = store[n].sibling;
        store[sibling].parent = store[n].parent;
        n = sibling;

        while !store[n].tag.is_host() {
            let child = store[n].child;
            if store[n].flags.contains(NodeFlags::PLACEMENT)
                || child == INVALID
                || store[n].tag == WorkTag::Portal
            {
                continue 'siblings;
            }
            store[child].parent = n;
            n = child;
        }
        if !store[n].flags.contains(NodeFlags::PLACEMENT) {
            return store[n].instance;
        }
    }
}

fn insert_placed(cx: &mut CommitCx<'_>, node: u32, parent: HostParent, before: Option<InstanceId>) {
    let n = &cx.store[node];
    if n.tag.is_host() {
        if let Some(instance) = n.instance {
            let result = cx.host.insert(parent, instance, before);
            cx.record(node, result);
        }
        return;
    }
    if n.tag == WorkTag::Portal {
        return;
    }
    for child in children(cx.store, node) {
        insert_placed(cx, child, parent, before);
    }
}

fn commit_update(cx: &mut CommitCx<'_>, node: u32) {
    let n = &cx.store[node];
    match n.tag {
        WorkTag::HostElement => {
            if let (Some(ElementType::Host(ty)), Some(instance), Some(payload)) =
                (&n.ty, n.instance, n.update_payload.clone())
            {
                let ty = *ty;
                let result = cx.host.commit_update(instance, ty, &payload);
                cx.record(node, result);
            }
        }
        WorkTag::HostText => {
            let Some(instance) = n.instance else { return };
            let new = text_of(&n.pending_props);
            let old = cx
                .store
                .alternate(node)
                .and_then(|prev| cx.store[prev].memoized_props.as_ref())
                .map(text_of)
                .unwrap_or_default();
            let result = cx.host.commit_text_update(instance, &old, &new);
            cx.record(node, result);
        }
        WorkTag::Function | WorkTag::Memo | WorkTag::Lazy => {
            for hook in &n.effects {
                if hook.kind == EffectKind::Layout && hook.has_effect {
                    hook.inst.run_destroy();
                }
            }
        }
        WorkTag::Suspense => {
            let parent = n.parent;
            let target = if parent != INVALID && cx.store[parent].tag == WorkTag::SuspenseList {
                parent
            } else {
                node
            };
            let id = cx.store.id(target);
            let wakeables = n.retry_wakeables.clone();
            register_retries(cx, id, wakeables);
        }
        WorkTag::SuspenseList => {
            let id = cx.store.id(node);
            let wakeables = n.retry_wakeables.clone();
            register_retries(cx, id, wakeables);
        }
        _ => {}
    }
}

fn register_retries(cx: &mut CommitCx<'_>, boundary: NodeId, wakeables: Vec<Wakeable>) {
    for wakeable in wakeables {
        let boundaries = cx.retry_cache.entry(wakeable).or_default();
        if !boundaries.contains(&boundary) {
            boundaries.push(boundary);
        }
    }
}

/// Unmounts a deleted subtree.
///
/// `remove_from` is the host parent the topmost host nodes are removed
/// from; below the first host node it is `None`, since removing that node
/// detaches its whole host subtree.
fn delete_subtree(cx: &mut CommitCx<'_>, node: u32, remove_from: Option<HostParent>) {
    let tag = cx.store[node].tag;
    let ty = cx.store[node].ty.clone();
    match tag {
        WorkTag::HostElement | WorkTag::HostText => {
            if let Some(node_ref) = &cx.store[node].node_ref {
                node_ref.set(None);
            }
            for child in children(cx.store, node) {
                delete_subtree(cx, child, None);
            }
            if let Some(instance) = cx.store[node].instance {
                if let Some(parent) = remove_from {
                    let result = cx.host.remove(parent, instance);
                    cx.record(node, result);
                }
                cx.host.detach_deleted_instance(instance);
            }
            return;
        }
        WorkTag::Portal => {
            if let Some(ElementType::Portal(container)) = ty {
                for child in children(cx.store, node) {
                    delete_subtree(cx, child, Some(HostParent::Container(container)));
                }
            }
            return;
        }
        WorkTag::Function | WorkTag::Memo | WorkTag::Lazy => {
            for hook in &cx.store[node].effects {
                match hook.kind {
                    EffectKind::Layout => hook.inst.run_destroy(),
                    EffectKind::Passive => cx.passive.unmounts.push(hook.inst.clone()),
                }
            }
        }
        WorkTag::Class => {
            if let Some(ElementType::Class(class)) = ty {
                let state = cx.store[node].state.value().cloned().unwrap_or_default();
                class.will_unmount(&state);
            }
        }
        WorkTag::Scope => {
            if let Some(node_ref) = &cx.store[node].node_ref {
                node_ref.set(None);
            }
        }
        _ => {}
    }
    for child in children(cx.store, node) {
        delete_subtree(cx, child, remove_from);
    }
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

fn layout(cx: &mut CommitCx<'_>, node: u32) {
    if cx.store[node].subtree_flags.intersects(NodeFlags::LAYOUT_MASK) {
        for child in children(cx.store, node) {
            layout(cx, child);
        }
    }
    let flags = cx.store[node].flags;
    if !flags.intersects(NodeFlags::LAYOUT_MASK) {
        return;
    }
    let ty = cx.store[node].ty.clone();
    match (cx.store[node].tag, ty) {
        (WorkTag::Function | WorkTag::Memo | WorkTag::Lazy, _) => {
            if flags.contains(NodeFlags::UPDATE) {
                run_effects(cx, node, EffectKind::Layout);
            }
        }
        (WorkTag::Class, Some(ElementType::Class(class))) => {
            let handle = cx.handle(node);
            let state = cx.store[node].state.value().cloned().unwrap_or_default();
            if flags.contains(NodeFlags::UPDATE) {
                let mounted = cx.store.alternate(node).is_none();
                let snapshot = cx.store[node].snapshot.clone();
                let mut ecx = EffectCx {
                    handle,
                    updates: &mut cx.updates,
                };
                if mounted {
                    class.did_mount(&mut ecx, &state);
                } else {
                    class.did_update(&mut ecx, &state, snapshot.as_ref());
                }
            }
            if flags.contains(NodeFlags::CALLBACK) {
                for err in &cx.store[node].caught {
                    class.did_catch(err);
                }
            }
        }
        (WorkTag::HostElement, Some(ElementType::Host(ty))) => {
            let n = &cx.store[node];
            if flags.contains(NodeFlags::CALLBACK)
                && let Some(instance) = n.instance
            {
                cx.host.commit_mount(instance, ty, n.pending_props.attrs());
            }
        }
        _ => {}
    }
    if flags.contains(NodeFlags::REF)
        && let Some(node_ref) = &cx.store[node].node_ref
    {
        let target = match cx.store[node].tag {
            WorkTag::Scope => Some(RefTarget::Scope(cx.handle(node))),
            _ => cx.store[node].instance.map(RefTarget::Instance),
        };
        node_ref.set(target);
    }
}

fn run_effects(cx: &mut CommitCx<'_>, node: u32, kind: EffectKind) {
    let handle = cx.handle(node);
    let hooks: Vec<EffectHook> = cx.store[node]
        .effects
        .iter()
        .filter(|h| h.kind == kind && h.has_effect)
        .cloned()
        .collect();
    for hook in hooks {
        let mut ecx = EffectCx {
            handle,
            updates: &mut cx.updates,
        };
        let cleanup = (hook.create)(&mut ecx);
        hook.inst.store(cleanup);
    }
}

// ---------------------------------------------------------------------------
// Passive
// ---------------------------------------------------------------------------

fn collect_passive(cx: &mut CommitCx<'_>, node: u32) {
    if cx.store[node].flags.contains(NodeFlags::PASSIVE) {
        let handle = cx.handle(node);
        for hook in &cx.store[node].effects {
            if hook.kind == EffectKind::Passive && hook.has_effect {
                cx.passive.unmounts.push(hook.inst.clone());
                cx.passive.mounts.push((handle, hook.clone()));
            }
        }
    }
    if cx.store[node].subtree_flags.intersects(NodeFlags::PASSIVE_MASK) {
        for child in children(cx.store, node) {
            collect_passive(cx, child);
        }
    }
}

/// Runs queued passive effects: every cleanup first, then every effect.
///
/// Returns the state updates the effects requested.
pub(crate) fn flush_passive(pending: PendingPassive) -> Vec<(StateHandle, Action)> {
    let mut updates = Vec::new();
    for inst in pending.unmounts {
        inst.run_destroy();
    }
    for (handle, hook) in pending.mounts {
        let mut ecx = EffectCx {
            handle,
            updates: &mut updates,
        };
        let cleanup = (hook.create)(&mut ecx);
        hook.inst.store(cleanup);
    }
    updates
}

/// Lanes that updates scheduled from effects get.
pub(crate) const LAYOUT_UPDATE_LANE: Lanes = Lanes::SYNC;
pub(crate) const PASSIVE_UPDATE_LANE: Lanes = Lanes::DEFAULT;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;

    fn link(store: &mut NodeStore, parent: u32, kids: &[u32]) {
        store[parent].child = kids.first().copied().unwrap_or(INVALID);
        for (i, c) in kids.iter().enumerate() {
            store[*c].parent = parent;
            store[*c].sibling = kids.get(i + 1).copied().unwrap_or(INVALID);
        }
    }

    #[test]
    fn host_sibling_skips_placed_and_descends_fragments() {
        let mut store = NodeStore::default();
        let root = store.create_root();
        let placed = store.create_from_element(&Element::host("a"), Lanes::NONE);
        let also_placed = store.create_from_element(&Element::host("b"), Lanes::NONE);
        let frag = store.create_from_element(&Element::fragment([]), Lanes::NONE);
        let anchor = store.create_from_element(&Element::host("c"), Lanes::NONE);
        link(&mut store, root, &[placed, also_placed, frag]);
        link(&mut store, frag, &[anchor]);
        store[placed].flags |= NodeFlags::PLACEMENT;
        store[also_placed].flags |= NodeFlags::PLACEMENT;
        store[anchor].instance = Some(InstanceId(7));

        assert_eq!(host_sibling(&mut store, placed), Some(InstanceId(7)));
        assert_eq!(host_sibling(&mut store, anchor), None, "stops at the root");
    }

    #[test]
    fn passive_flush_runs_all_cleanups_before_effects() {
        use alloc::rc::Rc;
        use core::cell::RefCell;

        use crate::component::EffectInstance;

        let log = Rc::new(RefCell::new(Vec::new()));
        let hook = |name: &'static str| {
            let log = log.clone();
            let inst = Rc::new(EffectInstance::default());
            let cleanup_log = log.clone();
            inst.store(Some(alloc::boxed::Box::new(move || {
                cleanup_log.borrow_mut().push(alloc::format!("destroy {name}"));
            })));
            EffectHook {
                kind: EffectKind::Passive,
                deps: None,
                create: Rc::new(move |_: &mut EffectCx<'_>| {
                    log.borrow_mut().push(alloc::format!("create {name}"));
                    None::<crate::component::Cleanup>
                }),
                inst,
                has_effect: true,
            }
        };
        let a = hook("a");
        let b = hook("b");
        let handle = StateHandle {
            root: RootId {
                idx: 0,
                generation: 0,
            },
            node: NodeId {
                idx: 0,
                generation: 0,
            },
        };
        let pending = PendingPassive {
            unmounts: alloc::vec![a.inst.clone(), b.inst.clone()],
            mounts: alloc::vec![(handle, a), (handle, b)],
            lanes: Lanes::DEFAULT,
        };
        assert!(flush_passive(pending).is_empty());
        assert_eq!(
            *log.borrow(),
            ["destroy a", "destroy b", "create a", "create b"]
        );
    }
}
