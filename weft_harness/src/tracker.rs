// Copyright 2026 the Weft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pass and commit metrics collected from trace events.
//!
//! [`PassTracker`] is a [`TraceSink`] that keeps the events tests usually
//! assert on and folds them into a [`PassReport`]. Events only arrive when
//! `weft_core` is built with the `trace` feature.

use alloc::vec::Vec;

use weft_core::lane::Lanes;
use weft_core::trace::{
    CommitSummary, ErrorCapturedEvent, PassBeginEvent, PassCompleteEvent, PassInterruptedEvent,
    PassOutcome, PassYieldEvent, PhaseBeginEvent, PhaseKind, PingEvent, StarvationEvent,
    SuspendEvent, TraceSink,
};

/// One committed pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommitRecord {
    /// Lanes the pass rendered.
    pub lanes: Lanes,
    /// Lanes still pending afterwards.
    pub remaining: Lanes,
    /// Units of work performed by the pass, across all its slices.
    pub units: u64,
    /// Host operations issued by the commit.
    pub mutations: u32,
}

/// Aggregated numbers returned by [`PassTracker::report`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Passes started from scratch.
    pub fresh_passes: u32,
    /// Passes resumed after a yield.
    pub resumed_passes: u32,
    /// Yields of concurrent passes.
    pub yields: u32,
    /// Passes discarded in favor of other lanes.
    pub interruptions: u32,
    /// Passes that ended suspended without committing.
    pub suspended_passes: u32,
    /// Commits.
    pub commits: u32,
    /// Host operations across all commits.
    pub mutations: u64,
    /// Units of work across all passes, committed or not.
    pub units: u64,
    /// Most units performed in one slice.
    pub longest_slice: u64,
    /// Lane groups that starved.
    pub starvations: u32,
    /// Errors captured, by a boundary or the root.
    pub errors: u32,
}

/// Collects pass metrics for assertions.
#[derive(Debug, Default)]
pub struct PassTracker {
    commits: Vec<CommitRecord>,
    fresh: Vec<Lanes>,
    interruptions: Vec<PassInterruptedEvent>,
    suspends: Vec<SuspendEvent>,
    pings: Vec<PingEvent>,
    errors: Vec<ErrorCapturedEvent>,
    starvations: Vec<StarvationEvent>,
    phases: Vec<PhaseKind>,
    report: PassReport,
    slice_start: u64,
}

impl PassTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current aggregate numbers.
    #[must_use]
    pub fn report(&self) -> PassReport {
        self.report
    }

    /// Commits in order.
    #[must_use]
    pub fn commits(&self) -> &[CommitRecord] {
        &self.commits
    }

    /// Lanes of the committed passes, in order.
    #[must_use]
    pub fn committed_lanes(&self) -> Vec<Lanes> {
        self.commits.iter().map(|c| c.lanes).collect()
    }

    /// Lanes of every pass started from scratch, in order.
    #[must_use]
    pub fn fresh_passes(&self) -> &[Lanes] {
        &self.fresh
    }

    /// Discarded passes.
    #[must_use]
    pub fn interruptions(&self) -> &[PassInterruptedEvent] {
        &self.interruptions
    }

    /// Suspensions, in order.
    #[must_use]
    pub fn suspends(&self) -> &[SuspendEvent] {
        &self.suspends
    }

    /// Pings that matched waiting work.
    #[must_use]
    pub fn pings(&self) -> &[PingEvent] {
        &self.pings
    }

    /// Captured errors.
    #[must_use]
    pub fn errors(&self) -> &[ErrorCapturedEvent] {
        &self.errors
    }

    /// Starvation events.
    #[must_use]
    pub fn starvations(&self) -> &[StarvationEvent] {
        &self.starvations
    }

    /// Commit phases in the order they began.
    #[must_use]
    pub fn phases(&self) -> &[PhaseKind] {
        &self.phases
    }

    /// Forgets everything recorded so far.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    fn close_slice(&mut self, units: u64) {
        let slice = units.saturating_sub(self.slice_start);
        self.report.longest_slice = self.report.longest_slice.max(slice);
        self.slice_start = units;
    }
}

impl TraceSink for PassTracker {
    fn on_pass_begin(&mut self, e: &PassBeginEvent) {
        if e.fresh {
            self.fresh.push(e.lanes);
            self.report.fresh_passes += 1;
            self.slice_start = 0;
        } else {
            self.report.resumed_passes += 1;
        }
    }

    fn on_pass_yield(&mut self, e: &PassYieldEvent) {
        self.report.yields += 1;
        self.close_slice(e.units);
    }

    fn on_pass_interrupted(&mut self, e: &PassInterruptedEvent) {
        self.report.interruptions += 1;
        self.interruptions.push(*e);
    }

    fn on_pass_complete(&mut self, e: &PassCompleteEvent) {
        self.close_slice(e.units);
        self.report.units += e.units;
        if e.outcome == PassOutcome::Suspended {
            self.report.suspended_passes += 1;
        }
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        self.phases.push(e.phase);
    }

    fn on_commit_summary(&mut self, s: &CommitSummary) {
        self.report.commits += 1;
        self.report.mutations += u64::from(s.mutations);
        self.commits.push(CommitRecord {
            lanes: s.lanes,
            remaining: s.remaining,
            units: s.units,
            mutations: s.mutations,
        });
    }

    fn on_suspend(&mut self, e: &SuspendEvent) {
        self.suspends.push(*e);
    }

    fn on_ping(&mut self, e: &PingEvent) {
        self.pings.push(*e);
    }

    fn on_error_captured(&mut self, e: &ErrorCapturedEvent) {
        self.report.errors += 1;
        self.errors.push(*e);
    }

    fn on_starvation(&mut self, e: &StarvationEvent) {
        self.report.starvations += 1;
        self.starvations.push(*e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::reconciler::RootId;
    use weft_core::time::HostTime;

    const ROOT: RootId = RootId::from_raw(0, 0);

    fn begin(fresh: bool) -> PassBeginEvent {
        PassBeginEvent {
            root: ROOT,
            lanes: Lanes::TRANSITION_1,
            fresh,
            sync: false,
            timestamp: HostTime(0),
        }
    }

    #[test]
    fn slices_are_measured_between_yields() {
        let mut t = PassTracker::new();
        t.on_pass_begin(&begin(true));
        t.on_pass_yield(&PassYieldEvent {
            root: ROOT,
            lanes: Lanes::TRANSITION_1,
            units: 3,
            timestamp: HostTime(1),
        });
        t.on_pass_begin(&begin(false));
        t.on_pass_complete(&PassCompleteEvent {
            root: ROOT,
            lanes: Lanes::TRANSITION_1,
            units: 8,
            outcome: PassOutcome::Completed,
            timestamp: HostTime(2),
        });
        let r = t.report();
        assert_eq!(r.fresh_passes, 1);
        assert_eq!(r.resumed_passes, 1);
        assert_eq!(r.yields, 1);
        assert_eq!(r.units, 8);
        assert_eq!(r.longest_slice, 5);
    }

    #[test]
    fn commits_accumulate_mutations() {
        let mut t = PassTracker::new();
        for mutations in [2, 3] {
            t.on_commit_summary(&CommitSummary {
                root: ROOT,
                lanes: Lanes::SYNC,
                remaining: Lanes::NONE,
                units: 1,
                mutations,
                committed_at: HostTime(0),
                before_mutation_ticks: 0,
                mutation_ticks: 0,
                layout_ticks: 0,
                passive_ticks: 0,
            });
        }
        assert_eq!(t.report().commits, 2);
        assert_eq!(t.report().mutations, 5);
        assert_eq!(t.committed_lanes(), [Lanes::SYNC, Lanes::SYNC]);
        t.clear();
        assert_eq!(t.report(), PassReport::default());
    }
}
