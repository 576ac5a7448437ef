// Copyright 2026 the Weft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for render passes and commits.
//!
//! This module provides a [`TraceSink`] trait with per-event methods that the
//! engine calls as passes start, yield, finish and commit. All method bodies
//! default to no-ops, so implementing only the events you care about is fine.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`. When the `trace` feature
//! is **off**, every `Tracer` method compiles to nothing (zero overhead). When
//! **on**, each method performs a single `Option` branch before dispatching.
//!
//! [`PassSummaryBuilder`] is a convenience helper that collects commit phase
//! timestamps and produces a [`CommitSummary`] at the end.
//!
//! # Crate features
//!
//! - `trace` — enables the `Tracer` method bodies (one branch per call).
//! - `trace-rich` (implies `trace`) — gates the per-node [`UnitEvent`] plus
//!   the corresponding `TraceSink` method.

use crate::component::Wakeable;
use crate::lane::Lanes;
use crate::node::NodeId;
#[cfg(feature = "trace-rich")]
use crate::node::WorkTag;
use crate::reconciler::RootId;
use crate::time::HostTime;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which phase of a commit is being measured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    /// Snapshots and container preparation, before any host mutation.
    BeforeMutation,
    /// Host insertions, updates, removals and visibility changes.
    Mutation,
    /// Layout effects, lifecycle callbacks and ref attachment.
    Layout,
    /// The deferred passive effect flush.
    Passive,
}

/// How a render pass ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PassOutcome {
    /// The tree is complete and will be committed.
    Completed,
    /// The pass was abandoned to keep visible content on screen.
    Suspended,
    /// An error reached the root.
    Errored,
}

/// Where a captured error was thrown.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorPhase {
    /// During begin or complete.
    Render,
    /// During a host operation in the commit.
    Commit,
}

/// Which half of a unit of work a [`UnitEvent`] reports.
#[cfg(feature = "trace-rich")]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnitStep {
    /// The begin step.
    Begin,
    /// The complete step.
    Complete,
}

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted when a render pass starts or resumes.
#[derive(Clone, Copy, Debug)]
pub struct PassBeginEvent {
    /// The root being rendered.
    pub root: RootId,
    /// Lanes of the pass.
    pub lanes: Lanes,
    /// `true` for a new work-in-progress tree, `false` when resuming.
    pub fresh: bool,
    /// `true` if the pass runs without yielding.
    pub sync: bool,
    /// Host time at the start.
    pub timestamp: HostTime,
}

/// Emitted when a concurrent pass returns control to the host.
#[derive(Clone, Copy, Debug)]
pub struct PassYieldEvent {
    /// The root being rendered.
    pub root: RootId,
    /// Lanes of the pass.
    pub lanes: Lanes,
    /// Units of work performed so far.
    pub units: u64,
    /// Host time of the yield.
    pub timestamp: HostTime,
}

/// Emitted when an in-progress pass is discarded for higher-priority work.
#[derive(Clone, Copy, Debug)]
pub struct PassInterruptedEvent {
    /// The root being rendered.
    pub root: RootId,
    /// Lanes of the discarded pass; they stay pending.
    pub discarded: Lanes,
    /// Lanes of the pass that replaces it.
    pub next: Lanes,
    /// Host time of the interruption.
    pub timestamp: HostTime,
}

/// Emitted when a render pass stops running.
#[derive(Clone, Copy, Debug)]
pub struct PassCompleteEvent {
    /// The root being rendered.
    pub root: RootId,
    /// Lanes of the pass.
    pub lanes: Lanes,
    /// Units of work performed.
    pub units: u64,
    /// How the pass ended.
    pub outcome: PassOutcome,
    /// Host time at the end.
    pub timestamp: HostTime,
}

/// Marks the beginning of a commit phase.
#[derive(Clone, Copy, Debug)]
pub struct PhaseBeginEvent {
    /// The root being committed.
    pub root: RootId,
    /// Which phase is starting.
    pub phase: PhaseKind,
    /// Host time at the start of the phase.
    pub timestamp: HostTime,
}

/// Marks the end of a commit phase.
#[derive(Clone, Copy, Debug)]
pub struct PhaseEndEvent {
    /// The root being committed.
    pub root: RootId,
    /// Which phase is ending.
    pub phase: PhaseKind,
    /// Host time at the end of the phase.
    pub timestamp: HostTime,
}

/// Emitted when a component suspends.
#[derive(Clone, Copy, Debug)]
pub struct SuspendEvent {
    /// The root being rendered.
    pub root: RootId,
    /// Lanes of the pass.
    pub lanes: Lanes,
    /// The dependency the component is waiting on.
    pub wakeable: Wakeable,
    /// `true` if the whole pass is abandoned instead of showing a fallback.
    pub delayed: bool,
}

/// Emitted when a dependency resolves.
#[derive(Clone, Copy, Debug)]
pub struct PingEvent {
    /// The root that was waiting.
    pub root: RootId,
    /// The dependency.
    pub wakeable: Wakeable,
    /// Lanes that became renderable again.
    pub lanes: Lanes,
    /// `true` if a committed fallback is being retried.
    pub retry: bool,
}

/// Emitted when an error is handed to a boundary or to the root.
#[derive(Clone, Copy, Debug)]
pub struct ErrorCapturedEvent {
    /// The root the error occurred in.
    pub root: RootId,
    /// Where the error was thrown.
    pub phase: ErrorPhase,
    /// The boundary that captured it, or `None` if it reached the root.
    pub boundary: Option<NodeId>,
}

/// Emitted when pending lanes pass their expiration time.
#[derive(Clone, Copy, Debug)]
pub struct StarvationEvent {
    /// The root with starved work.
    pub root: RootId,
    /// Lanes that just expired and will render synchronously.
    pub lanes: Lanes,
    /// Host time of detection.
    pub timestamp: HostTime,
}

/// Per-commit summary produced by [`PassSummaryBuilder`].
#[derive(Clone, Copy, Debug)]
pub struct CommitSummary {
    /// The root that committed.
    pub root: RootId,
    /// Lanes of the committed pass.
    pub lanes: Lanes,
    /// Lanes still pending after the commit.
    pub remaining: Lanes,
    /// Units of work in the pass (0 if not measured).
    pub units: u64,
    /// Host operations issued in the mutation phase.
    pub mutations: u32,
    /// Host time of the commit.
    pub committed_at: HostTime,
    /// Before-mutation phase duration in ticks (0 if not measured).
    pub before_mutation_ticks: u64,
    /// Mutation phase duration in ticks (0 if not measured).
    pub mutation_ticks: u64,
    /// Layout phase duration in ticks (0 if not measured).
    pub layout_ticks: u64,
    /// Passive phase duration in ticks (0 if not measured).
    pub passive_ticks: u64,
}

/// One begin or complete step of one node.
#[cfg(feature = "trace-rich")]
#[derive(Clone, Copy, Debug)]
pub struct UnitEvent {
    /// The root being rendered.
    pub root: RootId,
    /// The node.
    pub node: NodeId,
    /// The node kind.
    pub tag: WorkTag,
    /// Begin or complete.
    pub step: UnitStep,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the engine.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called when a pass starts or resumes.
    fn on_pass_begin(&mut self, e: &PassBeginEvent) {
        _ = e;
    }

    /// Called when a concurrent pass yields.
    fn on_pass_yield(&mut self, e: &PassYieldEvent) {
        _ = e;
    }

    /// Called when a pass is discarded for higher-priority work.
    fn on_pass_interrupted(&mut self, e: &PassInterruptedEvent) {
        _ = e;
    }

    /// Called when a pass stops running.
    fn on_pass_complete(&mut self, e: &PassCompleteEvent) {
        _ = e;
    }

    /// Called at the beginning of a commit phase.
    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        _ = e;
    }

    /// Called at the end of a commit phase.
    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        _ = e;
    }

    /// Called with a per-commit summary.
    fn on_commit_summary(&mut self, s: &CommitSummary) {
        _ = s;
    }

    /// Called when a component suspends.
    fn on_suspend(&mut self, e: &SuspendEvent) {
        _ = e;
    }

    /// Called when a dependency resolves.
    fn on_ping(&mut self, e: &PingEvent) {
        _ = e;
    }

    /// Called when an error is captured.
    fn on_error_captured(&mut self, e: &ErrorCapturedEvent) {
        _ = e;
    }

    /// Called when lanes expire.
    fn on_starvation(&mut self, e: &StarvationEvent) {
        _ = e;
    }

    /// Called for every begin and complete step (requires `trace-rich`
    /// feature).
    #[cfg(feature = "trace-rich")]
    fn on_unit(&mut self, e: &UnitEvent) {
        _ = e;
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
///
/// When the `trace` feature is **off**, every method compiles to nothing. When
/// **on**, each method checks the inner `Option` (one branch) before
/// dispatching to the sink.
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

macro_rules! emit {
    ($(#[$doc:meta])* $name:ident, $method:ident, $event:ty) => {
        $(#[$doc])*
        #[inline]
        pub fn $name(&mut self, e: &$event) {
            #[cfg(feature = "trace")]
            if let Some(s) = &mut self.sink {
                s.$method(e);
            }
            #[cfg(not(feature = "trace"))]
            {
                _ = e;
            }
        }
    };
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    emit!(
        /// Emits a [`PassBeginEvent`].
        pass_begin, on_pass_begin, PassBeginEvent
    );
    emit!(
        /// Emits a [`PassYieldEvent`].
        pass_yield, on_pass_yield, PassYieldEvent
    );
    emit!(
        /// Emits a [`PassInterruptedEvent`].
        pass_interrupted, on_pass_interrupted, PassInterruptedEvent
    );
    emit!(
        /// Emits a [`PassCompleteEvent`].
        pass_complete, on_pass_complete, PassCompleteEvent
    );
    emit!(
        /// Emits a [`PhaseBeginEvent`].
        phase_begin, on_phase_begin, PhaseBeginEvent
    );
    emit!(
        /// Emits a [`PhaseEndEvent`].
        phase_end, on_phase_end, PhaseEndEvent
    );
    emit!(
        /// Emits a [`CommitSummary`].
        commit_summary, on_commit_summary, CommitSummary
    );
    emit!(
        /// Emits a [`SuspendEvent`].
        suspend, on_suspend, SuspendEvent
    );
    emit!(
        /// Emits a [`PingEvent`].
        ping, on_ping, PingEvent
    );
    emit!(
        /// Emits an [`ErrorCapturedEvent`].
        error_captured, on_error_captured, ErrorCapturedEvent
    );
    emit!(
        /// Emits a [`StarvationEvent`].
        starvation, on_starvation, StarvationEvent
    );

    /// Emits a [`UnitEvent`] (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    #[inline]
    pub fn unit(&mut self, e: &UnitEvent) {
        if let Some(s) = &mut self.sink {
            s.on_unit(e);
        }
    }
}

// ---------------------------------------------------------------------------
// PassSummaryBuilder
// ---------------------------------------------------------------------------

/// Collects phase timestamps during a commit and produces a
/// [`CommitSummary`].
#[derive(Debug)]
pub struct PassSummaryBuilder {
    root: RootId,
    lanes: Lanes,
    units: u64,
    committed_at: HostTime,
    remaining: Lanes,
    mutations: u32,
    phase_starts: [Option<HostTime>; 4],
    phase_ends: [Option<HostTime>; 4],
}

impl PassSummaryBuilder {
    /// Starts building a summary for a commit of `lanes` on `root`.
    #[must_use]
    pub fn new(root: RootId, lanes: Lanes, units: u64, committed_at: HostTime) -> Self {
        Self {
            root,
            lanes,
            units,
            committed_at,
            remaining: Lanes::NONE,
            mutations: 0,
            phase_starts: [None; 4],
            phase_ends: [None; 4],
        }
    }

    /// Records the start of a phase.
    pub fn phase_begin(&mut self, phase: PhaseKind, t: HostTime) {
        self.phase_starts[phase_index(phase)] = Some(t);
    }

    /// Records the end of a phase.
    pub fn phase_end(&mut self, phase: PhaseKind, t: HostTime) {
        self.phase_ends[phase_index(phase)] = Some(t);
    }

    /// Sets the number of host operations issued.
    pub fn set_mutations(&mut self, mutations: u32) {
        self.mutations = mutations;
    }

    /// Sets the lanes left pending by the commit.
    pub fn set_remaining(&mut self, remaining: Lanes) {
        self.remaining = remaining;
    }

    /// Consumes the builder and produces the final [`CommitSummary`].
    #[must_use]
    pub fn finish(self) -> CommitSummary {
        CommitSummary {
            root: self.root,
            lanes: self.lanes,
            remaining: self.remaining,
            units: self.units,
            mutations: self.mutations,
            committed_at: self.committed_at,
            before_mutation_ticks: self.phase_duration(PhaseKind::BeforeMutation),
            mutation_ticks: self.phase_duration(PhaseKind::Mutation),
            layout_ticks: self.phase_duration(PhaseKind::Layout),
            passive_ticks: self.phase_duration(PhaseKind::Passive),
        }
    }

    fn phase_duration(&self, phase: PhaseKind) -> u64 {
        let idx = phase_index(phase);
        match (self.phase_starts[idx], self.phase_ends[idx]) {
            (Some(start), Some(end)) => end.saturating_duration_since(start).ticks(),
            _ => 0,
        }
    }
}

/// Maps a [`PhaseKind`] to an array index.
const fn phase_index(phase: PhaseKind) -> usize {
    match phase {
        PhaseKind::BeforeMutation => 0,
        PhaseKind::Mutation => 1,
        PhaseKind::Layout => 2,
        PhaseKind::Passive => 3,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
