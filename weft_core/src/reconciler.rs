// Copyright 2026 the Weft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The public face of the engine.
//!
//! A [`Reconciler`] owns the host adapter, the host scheduler and every
//! mounted root. Callers drive it through a small set of entry points:
//!
//! - [`render`](Reconciler::render) and
//!   [`schedule_update`](Reconciler::schedule_update) enqueue work and ask
//!   the host scheduler for a callback;
//! - the host hands each callback's [`Task`] back to
//!   [`run_task`](Reconciler::run_task), which renders, yields or commits;
//! - [`flush_sync`](Reconciler::flush_sync) completes pending sync work
//!   immediately;
//! - [`ping`](Reconciler::ping) reports that a dependency became ready;
//! - [`unmount`](Reconciler::unmount) tears a root down.
//!
//! ```text
//!   render / schedule_update ──► enqueue ──► ensure_scheduled ──► host
//!                                                                  │
//!   run_task(Render) ◄─────────────────────────────────────────────┘
//!       ├─ yield ──────────────► TaskStatus::Continue
//!       ├─ delayed ────────────► lanes suspended until ping
//!       └─ completed ──► commit ──► passive task, sync flush
//! ```

use alloc::vec::Vec;
use core::fmt;

use crate::commit::{LAYOUT_UPDATE_LANE, PASSIVE_UPDATE_LANE, commit_root, flush_passive};
use crate::component::Wakeable;
use crate::config::EngineConfig;
use crate::element::{Element, Value};
use crate::error::{ComponentError, EngineError};
use crate::host::{
    ContainerId, HostAdapter, HostScheduler, InstanceId, SchedulerPriority, Task, TaskKind,
    TaskStatus,
};
use crate::lane::Lanes;
use crate::node::{INVALID, NodeId, WorkTag, top_level_hosts};
use crate::root::{RootCoordinator, ScheduledCallback};
use crate::trace::{
    ErrorCapturedEvent, ErrorPhase, PassBeginEvent, PassCompleteEvent, PassInterruptedEvent,
    PassOutcome, PassYieldEvent, PhaseBeginEvent, PhaseEndEvent, PhaseKind, PingEvent,
    StarvationEvent, TraceSink, Tracer,
};
use crate::update_queue::{Action, Update, UpdateQueue};
use crate::work_loop::{
    PassExit, RenderPass, WorkCx, prepare_fresh_stack, work_loop_concurrent, work_loop_sync,
};

/// A handle to a mounted root.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RootId {
    pub(crate) idx: u32,
    pub(crate) generation: u32,
}

impl RootId {
    /// Rebuilds a handle from its parts, as read back from a trace
    /// recording. Such handles are only meaningful for display.
    #[must_use]
    pub const fn from_raw(index: u32, generation: u32) -> Self {
        Self {
            idx: index,
            generation,
        }
    }

    /// Returns the raw slot index (for diagnostics only).
    #[must_use]
    pub const fn index(self) -> u32 {
        self.idx
    }

    /// Returns the generation counter of the slot.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for RootId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RootId({}@gen{})", self.idx, self.generation)
    }
}

/// Addresses a stateful node: a component, a cache boundary or a scope.
///
/// Handed to components through [`RenderCx::handle`] and used to schedule
/// updates on them later.
///
/// [`RenderCx::handle`]: crate::component::RenderCx::handle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StateHandle {
    pub(crate) root: RootId,
    pub(crate) node: NodeId,
}

impl StateHandle {
    /// The root the node belongs to.
    #[must_use]
    pub const fn root(self) -> RootId {
        self.root
    }

    /// The node.
    #[must_use]
    pub const fn node(self) -> NodeId {
        self.node
    }
}

/// Priority of a scheduled update, mapped to a lane.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UpdatePriority {
    /// Discrete input; renders synchronously.
    Sync,
    /// Continuous input such as scrolling or dragging.
    Input,
    /// Ordinary updates.
    Default,
    /// A transition: may yield and may keep stale content on screen.
    Transition,
    /// Work for when nothing else is pending.
    Idle,
    /// An explicit lane; only its highest-priority lane is used.
    Explicit(Lanes),
}

/// State updates produced while flushing effects, applied afterwards.
type Deferred = Vec<(StateHandle, Action, Lanes)>;

#[derive(Debug)]
struct RootSlot {
    generation: u32,
    root: Option<RootCoordinator>,
}

/// Borrowed collaborators for the per-root driving functions.
struct Env<'a> {
    host: &'a mut dyn HostAdapter,
    scheduler: &'a mut dyn HostScheduler,
    config: &'a EngineConfig,
    next_seq: &'a mut u64,
}

impl Env<'_> {
    fn schedule(
        &mut self,
        root: RootId,
        kind: TaskKind,
        priority: SchedulerPriority,
    ) -> ScheduledCallback {
        *self.next_seq += 1;
        let seq = *self.next_seq;
        let handle = self
            .scheduler
            .schedule_callback(priority, Task { root, kind, seq });
        ScheduledCallback {
            seq,
            handle,
            priority,
        }
    }
}

/// The engine: roots, their host adapter and their scheduler.
pub struct Reconciler<H, S> {
    host: H,
    scheduler: S,
    config: EngineConfig,
    roots: Vec<RootSlot>,
    next_seq: u64,
}

impl<H: fmt::Debug, S: fmt::Debug> fmt::Debug for Reconciler<H, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("host", &self.host)
            .field("scheduler", &self.scheduler)
            .field("config", &self.config)
            .field("roots", &self.roots.len())
            .finish_non_exhaustive()
    }
}

impl<H: HostAdapter, S: HostScheduler> Reconciler<H, S> {
    /// Creates an engine with no roots.
    pub fn new(host: H, scheduler: S, config: EngineConfig) -> Self {
        Self {
            host,
            scheduler,
            config,
            roots: Vec::new(),
            next_seq: 0,
        }
    }

    /// The host adapter.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// The host adapter, mutably.
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// The host scheduler.
    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// The host scheduler, mutably.
    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn parts(&mut self) -> (&mut Vec<RootSlot>, Env<'_>) {
        (
            &mut self.roots,
            Env {
                host: &mut self.host,
                scheduler: &mut self.scheduler,
                config: &self.config,
                next_seq: &mut self.next_seq,
            },
        )
    }

    fn root(&self, id: RootId) -> Result<&RootCoordinator, EngineError> {
        self.roots
            .get(id.idx as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.root.as_ref())
            .ok_or(EngineError::UnknownRoot(id))
    }

    // -- Roots --

    /// Mounts an empty root rendering into `container`.
    pub fn create_root(&mut self, container: ContainerId) -> RootId {
        let free = self.roots.iter().position(|slot| slot.root.is_none());
        let idx = free.unwrap_or(self.roots.len());
        if free.is_none() {
            self.roots.push(RootSlot {
                generation: 0,
                root: None,
            });
        }
        let slot = &mut self.roots[idx];
        #[expect(
            clippy::cast_possible_truncation,
            reason = "root count is bounded by u32 allocation"
        )]
        let id = RootId {
            idx: idx as u32,
            generation: slot.generation,
        };
        slot.root = Some(RootCoordinator::new(id, container));
        id
    }

    /// Synchronously commits an empty tree, runs every cleanup and releases
    /// the root. Its handle becomes unknown afterwards.
    pub fn unmount(&mut self, id: RootId) -> Result<(), EngineError> {
        self.unmount_inner(id, &mut Tracer::none())
    }

    /// Like [`unmount`](Self::unmount), reporting to `sink`.
    pub fn unmount_traced(
        &mut self,
        id: RootId,
        sink: &mut dyn TraceSink,
    ) -> Result<(), EngineError> {
        self.unmount_inner(id, &mut Tracer::new(sink))
    }

    fn unmount_inner(&mut self, id: RootId, tracer: &mut Tracer<'_>) -> Result<(), EngineError> {
        let (roots, mut env) = self.parts();
        let root = root_mut(roots, id)?;
        teardown(root, &mut env, tracer);
        if let Some(cb) = root.passive_callback.take() {
            env.scheduler.cancel_callback(cb.handle);
        }
        let slot = &mut roots[id.idx as usize];
        slot.root = None;
        slot.generation = slot.generation.wrapping_add(1);
        Ok(())
    }

    // -- Updates --

    /// Replaces the element rendered by a root.
    ///
    /// Returns the lane the update was scheduled on.
    pub fn render(
        &mut self,
        id: RootId,
        element: Option<Element>,
        priority: UpdatePriority,
    ) -> Result<Lanes, EngineError> {
        let (roots, mut env) = self.parts();
        let root = root_mut(roots, id)?;
        let lane = lane_for(root, priority);
        let current = root.current;
        enqueue_on_node(root, current, lane, Action::Render(element), env.config);
        ensure_scheduled(root, &mut env);
        Ok(lane)
    }

    /// Enqueues `action` on the node behind `handle`.
    ///
    /// Returns the lane the update was scheduled on.
    pub fn schedule_update(
        &mut self,
        handle: StateHandle,
        action: Action,
        priority: UpdatePriority,
    ) -> Result<Lanes, EngineError> {
        let root = root_mut(&mut self.roots, handle.root)?;
        let lane = lane_for(root, priority);
        self.enqueue_update(handle, action, lane)
    }

    /// Issues a fresh cache handle from the nearest cache boundary at or
    /// above `handle`, re-rendering every reader of the old one.
    ///
    /// Returns [`Lanes::NONE`] when no cache boundary encloses the node;
    /// the root-level cache is never refreshed.
    pub fn refresh_cache(
        &mut self,
        handle: StateHandle,
        priority: UpdatePriority,
    ) -> Result<Lanes, EngineError> {
        let root = root_mut(&mut self.roots, handle.root)?;
        let idx = root
            .store
            .resolve(handle.node)
            .ok_or(EngineError::StaleNode(handle.node))?;
        let mut cursor = root.store.current_of(idx).unwrap_or(idx);
        while cursor != INVALID && root.store[cursor].tag != WorkTag::Cache {
            cursor = root.store[cursor].parent;
        }
        if cursor == INVALID {
            return Ok(Lanes::NONE);
        }
        let boundary = StateHandle {
            root: handle.root,
            node: root.store.id(cursor),
        };
        let fresh = Value::Int(root.next_cache_handle);
        root.next_cache_handle += 1;
        let lane = lane_for(root, priority);
        self.enqueue_update(boundary, Action::Replace(fresh), lane)
    }

    /// Claims a transition lane for a group of updates that should commit
    /// together.
    pub fn request_transition_lane(&mut self, id: RootId) -> Result<Lanes, EngineError> {
        Ok(root_mut(&mut self.roots, id)?.claim_transition_lane())
    }

    /// Binds `lanes` so they always render in one pass.
    pub fn entangle(&mut self, id: RootId, lanes: Lanes) -> Result<(), EngineError> {
        let (roots, mut env) = self.parts();
        let root = root_mut(roots, id)?;
        root.entangle(lanes);
        ensure_scheduled(root, &mut env);
        Ok(())
    }

    fn enqueue_update(
        &mut self,
        handle: StateHandle,
        action: Action,
        lane: Lanes,
    ) -> Result<Lanes, EngineError> {
        let (roots, mut env) = self.parts();
        let root = root_mut(roots, handle.root)?;
        let idx = root
            .store
            .resolve(handle.node)
            .ok_or(EngineError::StaleNode(handle.node))?;
        enqueue_on_node(root, idx, lane, action, env.config);
        ensure_scheduled(root, &mut env);
        Ok(lane)
    }

    fn apply_deferred(&mut self, deferred: Deferred) {
        for (handle, action, lane) in deferred {
            // Updates aimed at nodes unmounted in the meantime are dropped.
            _ = self.enqueue_update(handle, action, lane);
        }
    }

    // -- Driving --

    /// Runs a task previously handed to the host scheduler.
    ///
    /// Tasks that were cancelled or superseded are ignored.
    pub fn run_task(&mut self, task: Task) -> Result<TaskStatus, EngineError> {
        self.run_task_inner(task, &mut Tracer::none())
    }

    /// Like [`run_task`](Self::run_task), reporting to `sink`.
    pub fn run_task_traced(
        &mut self,
        task: Task,
        sink: &mut dyn TraceSink,
    ) -> Result<TaskStatus, EngineError> {
        self.run_task_inner(task, &mut Tracer::new(sink))
    }

    fn run_task_inner(
        &mut self,
        task: Task,
        tracer: &mut Tracer<'_>,
    ) -> Result<TaskStatus, EngineError> {
        let (roots, mut env) = self.parts();
        let Ok(root) = root_mut(roots, task.root) else {
            return Ok(TaskStatus::Done);
        };
        match task.kind {
            TaskKind::Passive => {
                if root.passive_callback.map(|cb| cb.seq) != Some(task.seq) {
                    return Ok(TaskStatus::Done);
                }
                root.passive_callback = None;
                let mut deferred = Deferred::new();
                flush_passive_effects(root, &mut env, tracer, &mut deferred);
                self.apply_deferred(deferred);
                Ok(TaskStatus::Done)
            }
            TaskKind::Render => {
                if root.callback.map(|cb| cb.seq) != Some(task.seq) {
                    return Ok(TaskStatus::Done);
                }
                // Effects of the previous commit run before anything new
                // renders.
                let mut deferred = Deferred::new();
                flush_passive_effects(root, &mut env, tracer, &mut deferred);
                if !deferred.is_empty() {
                    self.apply_deferred(deferred);
                }
                self.perform_work(task, tracer)
            }
        }
    }

    fn perform_work(
        &mut self,
        task: Task,
        tracer: &mut Tracer<'_>,
    ) -> Result<TaskStatus, EngineError> {
        let (roots, mut env) = self.parts();
        let root = root_mut(roots, task.root)?;
        let Some(callback) = root.callback.filter(|cb| cb.seq == task.seq) else {
            // Rescheduled at another priority while effects ran.
            return Ok(TaskStatus::Done);
        };

        let now = env.scheduler.now();
        let expired = root.mark_starved(now, env.config);
        if !expired.is_empty() {
            tracer.starvation(&StarvationEvent {
                root: root.id,
                lanes: expired,
                timestamp: now,
            });
        }
        let wip_lanes = root.pass.as_ref().map_or(Lanes::NONE, |p| p.lanes);
        let lanes = root.get_next_lanes(wip_lanes);
        if lanes.is_empty() {
            root.callback = None;
            return Ok(TaskStatus::Done);
        }

        let sync = root.renders_sync(lanes);
        let mut deferred = Deferred::new();
        let result = work_on_root(root, &mut env, tracer, lanes, sync, &mut deferred);
        if matches!(result, Ok(TaskStatus::Continue)) {
            root.callback = Some(callback);
            return result;
        }
        root.callback = None;
        self.apply_deferred(deferred);
        result?;
        self.flush_sync_inner(task.root, tracer)?;
        Ok(TaskStatus::Done)
    }

    /// Renders and commits pending sync work of a root right away.
    pub fn flush_sync(&mut self, id: RootId) -> Result<(), EngineError> {
        self.flush_sync_inner(id, &mut Tracer::none())
    }

    /// Like [`flush_sync`](Self::flush_sync), reporting to `sink`.
    pub fn flush_sync_traced(
        &mut self,
        id: RootId,
        sink: &mut dyn TraceSink,
    ) -> Result<(), EngineError> {
        self.flush_sync_inner(id, &mut Tracer::new(sink))
    }

    fn flush_sync_inner(&mut self, id: RootId, tracer: &mut Tracer<'_>) -> Result<(), EngineError> {
        let mut commits: u32 = 0;
        loop {
            let (roots, mut env) = self.parts();
            let root = root_mut(roots, id)?;
            let lanes = root.get_next_lanes(Lanes::NONE);
            if !lanes.includes_any(Lanes::SYNC) {
                ensure_scheduled(root, &mut env);
                return Ok(());
            }
            commits += 1;
            if commits > env.config.nested_update_limit {
                root.pending_lanes = root.pending_lanes.subtract(Lanes::SYNC);
                ensure_scheduled(root, &mut env);
                return Err(EngineError::NestedUpdateLimit);
            }
            let mut deferred = Deferred::new();
            let result = work_on_root(root, &mut env, tracer, lanes, true, &mut deferred);
            self.apply_deferred(deferred);
            result?;
        }
    }

    /// Runs pending passive effects of a root now.
    ///
    /// Returns `true` if there were any.
    pub fn flush_passive_effects(&mut self, id: RootId) -> Result<bool, EngineError> {
        let (roots, mut env) = self.parts();
        let root = root_mut(roots, id)?;
        let mut deferred = Deferred::new();
        let ran = flush_passive_effects(root, &mut env, &mut Tracer::none(), &mut deferred);
        self.apply_deferred(deferred);
        Ok(ran)
    }

    /// Reports that `wakeable` is ready.
    ///
    /// Passes that were abandoned on it become renderable again; boundaries
    /// showing a fallback because of it are retried on a retry lane.
    pub fn ping(&mut self, id: RootId, wakeable: Wakeable) -> Result<(), EngineError> {
        self.ping_inner(id, wakeable, &mut Tracer::none())
    }

    /// Like [`ping`](Self::ping), reporting to `sink`.
    pub fn ping_traced(
        &mut self,
        id: RootId,
        wakeable: Wakeable,
        sink: &mut dyn TraceSink,
    ) -> Result<(), EngineError> {
        self.ping_inner(id, wakeable, &mut Tracer::new(sink))
    }

    fn ping_inner(
        &mut self,
        id: RootId,
        wakeable: Wakeable,
        tracer: &mut Tracer<'_>,
    ) -> Result<(), EngineError> {
        let (roots, mut env) = self.parts();
        let root = root_mut(roots, id)?;
        if let Some(lanes) = root.ping_cache.remove(&wakeable) {
            root.mark_pinged(lanes);
            tracer.ping(&PingEvent {
                root: id,
                wakeable,
                lanes,
                retry: false,
            });
        }
        if let Some(boundaries) = root.retry_cache.remove(&wakeable) {
            let lane = root.claim_retry_lane();
            let mut retried = false;
            for boundary in boundaries {
                if let Some(idx) = root.store.resolve(boundary) {
                    mark_lane_on_path(root, idx, lane);
                    retried = true;
                }
            }
            if retried {
                root.mark_updated(lane);
                tracer.ping(&PingEvent {
                    root: id,
                    wakeable,
                    lanes: lane,
                    retry: true,
                });
            }
        }
        ensure_scheduled(root, &mut env);
        Ok(())
    }

    // -- Queries --

    /// Lanes with work pending on a root.
    pub fn pending_lanes(&self, id: RootId) -> Result<Lanes, EngineError> {
        Ok(self.root(id)?.pending_lanes)
    }

    /// Returns `true` while a pass of the root is in flight.
    pub fn is_rendering(&self, id: RootId) -> bool {
        self.root(id).is_ok_and(|root| root.pass.is_some())
    }

    /// The error that last tore the root's content down, if any.
    pub fn root_error(&self, id: RootId) -> Option<&EngineError> {
        self.root(id).ok().and_then(|root| root.error.as_ref())
    }

    /// Host instances directly beneath a committed scope.
    pub fn scope_instances(&self, scope: StateHandle) -> Result<Vec<InstanceId>, EngineError> {
        let root = self.root(scope.root)?;
        let idx = root
            .store
            .resolve(scope.node)
            .ok_or(EngineError::StaleNode(scope.node))?;
        let idx = root.store.current_of(idx).unwrap_or(idx);
        Ok(top_level_hosts(&root.store, idx)
            .into_iter()
            .filter(|&host| host != idx)
            .filter_map(|host| root.store[host].instance)
            .collect())
    }

    /// Number of live node slots of a root, both generations included.
    pub fn live_nodes(&self, id: RootId) -> Result<usize, EngineError> {
        Ok(self.root(id)?.store.live_count())
    }
}

fn root_mut(roots: &mut [RootSlot], id: RootId) -> Result<&mut RootCoordinator, EngineError> {
    roots
        .get_mut(id.idx as usize)
        .filter(|slot| slot.generation == id.generation)
        .and_then(|slot| slot.root.as_mut())
        .ok_or(EngineError::UnknownRoot(id))
}

fn lane_for(root: &mut RootCoordinator, priority: UpdatePriority) -> Lanes {
    match priority {
        UpdatePriority::Sync => Lanes::SYNC,
        UpdatePriority::Input => Lanes::INPUT_CONTINUOUS,
        UpdatePriority::Default => Lanes::DEFAULT,
        UpdatePriority::Transition => root.claim_transition_lane(),
        UpdatePriority::Idle => Lanes::IDLE,
        UpdatePriority::Explicit(lanes) if lanes.is_empty() => Lanes::DEFAULT,
        UpdatePriority::Explicit(lanes) => lanes.highest_priority_lane(),
    }
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

/// Appends an update to both generations of a node and marks its lane up
/// to the root.
fn enqueue_on_node(
    root: &mut RootCoordinator,
    idx: u32,
    lane: Lanes,
    action: Action,
    config: &EngineConfig,
) {
    let alternate = root.store.alternate(idx);
    for slot in [Some(idx), alternate].into_iter().flatten() {
        root.store[slot]
            .queue
            .get_or_insert_with(UpdateQueue::default)
            .enqueue(Update {
                lane,
                action: action.clone(),
            });
    }
    mark_lane_on_path(root, idx, lane);
    root.mark_updated(lane);

    if config.entangle_transitions_per_queue
        && lane.includes_any(Lanes::TRANSITIONS)
        && let Some(queue) = root.store[idx].queue.as_mut()
    {
        let lanes = (queue.transition_lanes & root.pending_lanes) | lane;
        queue.transition_lanes = lanes;
        root.entangle(lanes);
    }
}

/// Adds `lane` to a node and to `child_lanes` of each ancestor, in both
/// generations.
fn mark_lane_on_path(root: &mut RootCoordinator, idx: u32, lane: Lanes) {
    let store = &mut root.store;
    let mut node = store.current_of(idx).unwrap_or(idx);
    store[node].lanes |= lane;
    if let Some(alt) = store.alternate(node) {
        store[alt].lanes |= lane;
    }
    node = store[node].parent;
    while node != INVALID {
        store[node].child_lanes |= lane;
        if let Some(alt) = store.alternate(node) {
            store[alt].child_lanes |= lane;
        }
        node = store[node].parent;
    }
}

/// Makes sure exactly one render callback at the right priority is queued
/// for the root's next lanes.
fn ensure_scheduled(root: &mut RootCoordinator, env: &mut Env<'_>) {
    let wip_lanes = root.pass.as_ref().map_or(Lanes::NONE, |p| p.lanes);
    let next = root.get_next_lanes(wip_lanes);
    if next.is_empty() {
        if let Some(cb) = root.callback.take() {
            env.scheduler.cancel_callback(cb.handle);
        }
        return;
    }
    let priority = next.scheduler_priority();
    if root.callback.is_some_and(|cb| cb.priority == priority) {
        return;
    }
    if let Some(cb) = root.callback.take() {
        env.scheduler.cancel_callback(cb.handle);
    }
    root.callback = Some(env.schedule(root.id, TaskKind::Render, priority));
}

// ---------------------------------------------------------------------------
// Passes
// ---------------------------------------------------------------------------

/// Renders `lanes` and acts on how the pass ended.
fn work_on_root(
    root: &mut RootCoordinator,
    env: &mut Env<'_>,
    tracer: &mut Tracer<'_>,
    lanes: Lanes,
    sync: bool,
    deferred: &mut Deferred,
) -> Result<TaskStatus, EngineError> {
    let mut sync = sync;
    loop {
        let Some(mut pass) = render_pass(root, env, tracer, lanes, sync) else {
            return Ok(TaskStatus::Continue);
        };
        let exit = core::mem::replace(&mut pass.exit, PassExit::InProgress);
        let outcome = match exit {
            PassExit::Completed => PassOutcome::Completed,
            PassExit::Delayed(_) => PassOutcome::Suspended,
            PassExit::Errored(_) | PassExit::InProgress => PassOutcome::Errored,
        };
        tracer.pass_complete(&PassCompleteEvent {
            root: root.id,
            lanes,
            units: pass.units,
            outcome,
            timestamp: env.scheduler.now(),
        });
        match exit {
            PassExit::Completed => {
                commit_pass(root, env, tracer, pass, deferred)?;
                return Ok(TaskStatus::Done);
            }
            PassExit::Delayed(wakeables) => {
                root.mark_suspended(lanes);
                for wakeable in wakeables {
                    *root.ping_cache.entry(wakeable).or_insert(Lanes::NONE) |= lanes;
                }
                return Ok(TaskStatus::Done);
            }
            PassExit::Errored(err) => {
                if !sync && env.config.recover_from_concurrent_errors {
                    sync = true;
                    continue;
                }
                return Err(fail_root(root, env, tracer, EngineError::Uncaught(err)));
            }
            PassExit::InProgress => {
                let err = ComponentError::new("render pass stopped without an outcome");
                return Err(fail_root(root, env, tracer, EngineError::Uncaught(err)));
            }
        }
    }
}

/// Runs the work loop for `lanes`, starting a fresh pass unless the
/// in-flight one renders exactly those lanes.
///
/// Returns the finished pass, or `None` if the loop yielded.
fn render_pass(
    root: &mut RootCoordinator,
    env: &mut Env<'_>,
    tracer: &mut Tracer<'_>,
    lanes: Lanes,
    sync: bool,
) -> Option<RenderPass> {
    let now = env.scheduler.now();
    let mut pass = match root.pass.take() {
        Some(pass) if pass.lanes == lanes => pass,
        previous => {
            if let Some(discarded) = previous {
                tracer.pass_interrupted(&PassInterruptedEvent {
                    root: root.id,
                    discarded: discarded.lanes,
                    next: lanes,
                    timestamp: now,
                });
            }
            let fresh = prepare_fresh_stack(&mut root.store, root.current, root.id, lanes, false);
            tracer.pass_begin(&PassBeginEvent {
                root: root.id,
                lanes,
                fresh: true,
                sync,
                timestamp: now,
            });
            fresh
        }
    };
    if pass.units > 0 {
        tracer.pass_begin(&PassBeginEvent {
            root: root.id,
            lanes,
            fresh: false,
            sync,
            timestamp: now,
        });
    }

    let yielded = {
        let mut cx = WorkCx {
            store: &mut root.store,
            pass: &mut pass,
            host: &mut *env.host,
            next_cache_handle: &mut root.next_cache_handle,
            tracer: &mut *tracer,
        };
        if sync {
            work_loop_sync(&mut cx);
            false
        } else {
            work_loop_concurrent(&mut cx, &*env.scheduler)
        }
    };
    if yielded {
        tracer.pass_yield(&PassYieldEvent {
            root: root.id,
            lanes,
            units: pass.units,
            timestamp: env.scheduler.now(),
        });
        root.pass = Some(pass);
        return None;
    }
    Some(pass)
}

fn commit_pass(
    root: &mut RootCoordinator,
    env: &mut Env<'_>,
    tracer: &mut Tracer<'_>,
    pass: RenderPass,
    deferred: &mut Deferred,
) -> Result<(), EngineError> {
    flush_passive_effects(root, env, tracer, deferred);
    root.error = None;
    let outcome = commit_root(root, pass, &mut *env.host, &*env.scheduler, tracer);
    if outcome.has_passive && root.passive_callback.is_none() {
        root.passive_callback =
            Some(env.schedule(root.id, TaskKind::Passive, SchedulerPriority::Normal));
    }
    deferred.extend(
        outcome
            .updates
            .into_iter()
            .map(|(handle, action)| (handle, action, LAYOUT_UPDATE_LANE)),
    );
    let Some(err) = outcome.error else {
        return Ok(());
    };
    tracer.error_captured(&ErrorCapturedEvent {
        root: root.id,
        phase: ErrorPhase::Commit,
        boundary: err.boundary.map(|b| b.node),
    });
    match err.boundary {
        Some(boundary) => {
            let error = ComponentError::from(err.error);
            deferred.push((boundary, Action::Capture(error), Lanes::SYNC));
            Ok(())
        }
        None => Err(fail_root(root, env, tracer, EngineError::Commit(err.error))),
    }
}

/// Tears the root's content down after an error nothing caught.
fn fail_root(
    root: &mut RootCoordinator,
    env: &mut Env<'_>,
    tracer: &mut Tracer<'_>,
    err: EngineError,
) -> EngineError {
    teardown(root, env, tracer);
    root.error = Some(err.clone());
    err
}

/// Synchronously commits an empty tree and runs every pending effect and
/// cleanup. Nothing is scheduled afterwards.
fn teardown(root: &mut RootCoordinator, env: &mut Env<'_>, tracer: &mut Tracer<'_>) {
    if let Some(cb) = root.callback.take() {
        env.scheduler.cancel_callback(cb.handle);
    }
    let mut dropped = Deferred::new();
    flush_passive_effects(root, env, tracer, &mut dropped);

    root.pass = None;
    let mut pass = prepare_fresh_stack(&mut root.store, root.current, root.id, Lanes::SYNC, true);
    {
        let mut cx = WorkCx {
            store: &mut root.store,
            pass: &mut pass,
            host: &mut *env.host,
            next_cache_handle: &mut root.next_cache_handle,
            tracer: &mut *tracer,
        };
        work_loop_sync(&mut cx);
    }
    if matches!(pass.exit, PassExit::Completed) {
        // Errors while removing content leave nothing else to recover.
        _ = commit_root(root, pass, &mut *env.host, &*env.scheduler, tracer);
    }
    flush_passive_effects(root, env, tracer, &mut dropped);

    root.mark_finished(Lanes::NONE);
    root.ping_cache.clear();
    root.retry_cache.clear();
}

/// Runs the root's pending passive effects; returns `true` if there were
/// any. Updates they request land in `deferred`.
fn flush_passive_effects(
    root: &mut RootCoordinator,
    env: &mut Env<'_>,
    tracer: &mut Tracer<'_>,
    deferred: &mut Deferred,
) -> bool {
    let Some(pending) = root.passive.take() else {
        return false;
    };
    if let Some(cb) = root.passive_callback.take() {
        env.scheduler.cancel_callback(cb.handle);
    }
    tracer.phase_begin(&PhaseBeginEvent {
        root: root.id,
        phase: PhaseKind::Passive,
        timestamp: env.scheduler.now(),
    });
    let updates = flush_passive(pending);
    tracer.phase_end(&PhaseEndEvent {
        root: root.id,
        phase: PhaseKind::Passive,
        timestamp: env.scheduler.now(),
    });
    deferred.extend(
        updates
            .into_iter()
            .map(|(handle, action)| (handle, action, PASSIVE_UPDATE_LANE)),
    );
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, Render};
    use crate::testing::{TestHost, TestScheduler};

    fn engine() -> Reconciler<TestHost, TestScheduler> {
        Reconciler::new(
            TestHost::default(),
            TestScheduler::default(),
            EngineConfig::testing(),
        )
    }

    fn run_all(engine: &mut Reconciler<TestHost, TestScheduler>) {
        while let Some(task) = engine.scheduler_mut().pop() {
            while engine.run_task(task).expect("task runs") == TaskStatus::Continue {}
        }
    }

    #[test]
    fn mount_creates_and_inserts_text() {
        let mut engine = engine();
        let root = engine.create_root(ContainerId(0));
        engine
            .render(root, Some(Element::text("hello")), UpdatePriority::Default)
            .expect("root exists");
        run_all(&mut engine);
        assert_eq!(engine.host().ops, ["clear", "create_text hello", "insert"]);
        assert!(engine.pending_lanes(root).expect("root").is_empty());
    }

    #[test]
    fn stale_handles_are_reported() {
        let mut engine = engine();
        let root = engine.create_root(ContainerId(0));
        let captured = alloc::rc::Rc::new(core::cell::Cell::new(None));
        let sink = captured.clone();
        let probe = Component::new("Probe", move |cx, _| {
            sink.set(Some(cx.handle()));
            Render::empty()
        });
        engine
            .render(root, Some(Element::component(&probe)), UpdatePriority::Sync)
            .expect("root exists");
        engine.flush_sync(root).expect("flush");
        let handle = captured.get().expect("rendered");
        assert_eq!(handle.root(), root);

        engine.render(root, None, UpdatePriority::Sync).expect("root exists");
        engine.flush_sync(root).expect("flush");
        assert_eq!(
            engine.schedule_update(handle, Action::ForceUpdate, UpdatePriority::Default),
            Err(EngineError::StaleNode(handle.node))
        );
    }

    #[test]
    fn unmount_releases_the_root() {
        let mut engine = engine();
        let root = engine.create_root(ContainerId(0));
        engine
            .render(root, Some(Element::text("x")), UpdatePriority::Sync)
            .expect("root exists");
        engine.flush_sync(root).expect("flush");
        engine.unmount(root).expect("mounted");
        assert_eq!(engine.pending_lanes(root), Err(EngineError::UnknownRoot(root)));
        assert!(engine.scheduler().is_idle(), "nothing left scheduled");
        let again = engine.create_root(ContainerId(1));
        assert_eq!(again.index(), root.index());
        assert_ne!(again, root, "slot reuse bumps the generation");
    }

    #[test]
    fn sync_layout_loops_hit_the_nested_limit() {
        let mut engine = engine();
        let root = engine.create_root(ContainerId(0));
        let looping = Component::new("Loop", |cx, _| {
            let n = cx.use_state(|| Value::Int(0));
            cx.use_layout_effect(Some(n.clone()), move |ecx| {
                let handle = ecx.handle();
                ecx.set_state(
                    handle,
                    Action::reduce(|v| Value::Int(v.as_int().unwrap_or(0) + 1)),
                );
                None
            });
            Render::one(Element::text(n))
        });
        engine
            .render(root, Some(Element::component(&looping)), UpdatePriority::Sync)
            .expect("root exists");
        assert_eq!(engine.flush_sync(root), Err(EngineError::NestedUpdateLimit));
    }

    #[test]
    fn layout_effect_updates_build_on_the_committed_tree() {
        let mut engine = engine();
        let root = engine.create_root(ContainerId(0));
        let settle = Component::new("Settle", |cx, _| {
            let n = cx.use_state(|| Value::Int(0));
            let seen = n.as_int().unwrap_or(0);
            cx.use_layout_effect(Some(n.clone()), move |ecx| {
                if seen < 2 {
                    let handle = ecx.handle();
                    ecx.set_state(
                        handle,
                        Action::reduce(|v| Value::Int(v.as_int().unwrap_or(0) + 1)),
                    );
                }
                None
            });
            Render::one(Element::text(n))
        });
        engine
            .render(root, Some(Element::component(&settle)), UpdatePriority::Sync)
            .expect("root exists");
        engine.flush_sync(root).expect("flush");
        assert_eq!(
            engine.host().ops,
            ["clear", "create_text 0", "insert", "text 1", "text 2"]
        );
        assert!(engine.pending_lanes(root).expect("root").is_empty());
    }
}
