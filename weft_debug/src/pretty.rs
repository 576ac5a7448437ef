// Copyright 2026 the Weft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Timestamps
//! are printed in raw host ticks.

use std::io::Write;

use weft_core::lane::Lanes;
use weft_core::reconciler::RootId;
use weft_core::trace::{
    CommitSummary, ErrorCapturedEvent, PassBeginEvent, PassCompleteEvent, PassInterruptedEvent,
    PassYieldEvent, PhaseBeginEvent, PhaseEndEvent, PhaseKind, PingEvent, StarvationEvent,
    SuspendEvent, TraceSink, UnitEvent, UnitStep,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
    units: bool,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink")
            .field("units", &self.units)
            .finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self::new(Box::new(std::io::stderr()))
    }

    /// Creates a sink that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write>) -> Self {
        Self {
            writer,
            units: false,
        }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self {
            writer,
            units: false,
        }
    }

    /// Also print one line per begin and complete step.
    #[must_use]
    pub fn with_units(mut self, units: bool) -> Self {
        self.units = units;
        self
    }
}

fn phase_name(phase: PhaseKind) -> &'static str {
    match phase {
        PhaseKind::BeforeMutation => "before-mutation",
        PhaseKind::Mutation => "mutation",
        PhaseKind::Layout => "layout",
        PhaseKind::Passive => "passive",
    }
}

fn root(id: RootId) -> String {
    format!("{}.{}", id.index(), id.generation())
}

fn lanes(l: Lanes) -> String {
    format!("{:#x}", l.0)
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_pass_begin(&mut self, e: &PassBeginEvent) {
        let _ = writeln!(
            self.writer,
            "[pass:{}] root={} lanes={} sync={} at {}t",
            if e.fresh { "begin" } else { "resume" },
            root(e.root),
            lanes(e.lanes),
            e.sync,
            e.timestamp.ticks(),
        );
    }

    fn on_pass_yield(&mut self, e: &PassYieldEvent) {
        let _ = writeln!(
            self.writer,
            "[pass:yield] root={} lanes={} units={} at {}t",
            root(e.root),
            lanes(e.lanes),
            e.units,
            e.timestamp.ticks(),
        );
    }

    fn on_pass_interrupted(&mut self, e: &PassInterruptedEvent) {
        let _ = writeln!(
            self.writer,
            "[pass:interrupted] root={} discarded={} next={}",
            root(e.root),
            lanes(e.discarded),
            lanes(e.next),
        );
    }

    fn on_pass_complete(&mut self, e: &PassCompleteEvent) {
        let _ = writeln!(
            self.writer,
            "[pass:end] root={} lanes={} units={} outcome={:?}",
            root(e.root),
            lanes(e.lanes),
            e.units,
            e.outcome,
        );
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        let _ = writeln!(
            self.writer,
            "[phase:begin] root={} {} at {}t",
            root(e.root),
            phase_name(e.phase),
            e.timestamp.ticks(),
        );
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        let _ = writeln!(
            self.writer,
            "[phase:end] root={} {} at {}t",
            root(e.root),
            phase_name(e.phase),
            e.timestamp.ticks(),
        );
    }

    fn on_commit_summary(&mut self, s: &CommitSummary) {
        let _ = writeln!(
            self.writer,
            "[commit] root={} lanes={} remaining={} units={} mutations={} \
             before={}t mutation={}t layout={}t",
            root(s.root),
            lanes(s.lanes),
            lanes(s.remaining),
            s.units,
            s.mutations,
            s.before_mutation_ticks,
            s.mutation_ticks,
            s.layout_ticks,
        );
    }

    fn on_suspend(&mut self, e: &SuspendEvent) {
        let _ = writeln!(
            self.writer,
            "[suspend] root={} lanes={} wakeable=#{} {}",
            root(e.root),
            lanes(e.lanes),
            e.wakeable.id(),
            if e.delayed { "delayed" } else { "fallback" },
        );
    }

    fn on_ping(&mut self, e: &PingEvent) {
        let _ = writeln!(
            self.writer,
            "[ping] root={} wakeable=#{} lanes={}{}",
            root(e.root),
            e.wakeable.id(),
            lanes(e.lanes),
            if e.retry { " retry" } else { "" },
        );
    }

    fn on_error_captured(&mut self, e: &ErrorCapturedEvent) {
        let boundary = e
            .boundary
            .map_or_else(|| "root".to_owned(), |b| format!("{b:?}"));
        let _ = writeln!(
            self.writer,
            "[error] root={} phase={:?} boundary={boundary}",
            root(e.root),
            e.phase,
        );
    }

    fn on_starvation(&mut self, e: &StarvationEvent) {
        let _ = writeln!(
            self.writer,
            "[starved] root={} lanes={} at {}t",
            root(e.root),
            lanes(e.lanes),
            e.timestamp.ticks(),
        );
    }

    fn on_unit(&mut self, e: &UnitEvent) {
        if !self.units {
            return;
        }
        let step = match e.step {
            UnitStep::Begin => "begin",
            UnitStep::Complete => "complete",
        };
        let _ = writeln!(
            self.writer,
            "[unit:{step}] root={} {} {:?}",
            root(e.root),
            e.tag.as_str(),
            e.node,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::time::HostTime;

    #[test]
    fn pretty_print_pass_begin() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new());
        sink.on_pass_begin(&PassBeginEvent {
            root: RootId::from_raw(0, 0),
            lanes: Lanes::DEFAULT,
            fresh: true,
            sync: true,
            timestamp: HostTime(7),
        });
        let output = String::from_utf8(sink.writer).unwrap();
        assert!(output.contains("[pass:begin]"), "got: {output}");
        assert!(output.contains("lanes=0x20"), "got: {output}");
        assert!(output.contains("at 7t"), "got: {output}");
    }

    #[test]
    fn unit_lines_are_opt_in() {
        let event = UnitEvent {
            root: RootId::from_raw(0, 0),
            node: weft_core::node::NodeId::from_raw(3, 0),
            tag: weft_core::node::WorkTag::Suspense,
            step: UnitStep::Begin,
        };
        let mut quiet = PrettyPrintSink::with_writer(Vec::<u8>::new());
        quiet.on_unit(&event);
        assert!(quiet.writer.is_empty());

        let mut loud = PrettyPrintSink::with_writer(Vec::<u8>::new()).with_units(true);
        loud.on_unit(&event);
        let output = String::from_utf8(loud.writer).unwrap();
        assert!(output.contains("[unit:begin]"), "got: {output}");
        assert!(output.contains("suspense"), "got: {output}");
    }
}
