// Copyright 2026 the Weft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as fixed-size little-endian records. [`decode`] reads them back
//! as an iterator of [`RecordedEvent`].
//!
//! Handles (roots, nodes, wakeables) are stored as raw parts; decoded
//! handles are only good for display.

use weft_core::component::Wakeable;
use weft_core::lane::Lanes;
use weft_core::node::{NodeId, WorkTag};
use weft_core::reconciler::RootId;
use weft_core::time::HostTime;
use weft_core::trace::{
    CommitSummary, ErrorCapturedEvent, ErrorPhase, PassBeginEvent, PassCompleteEvent,
    PassInterruptedEvent, PassOutcome, PassYieldEvent, PhaseBeginEvent, PhaseEndEvent, PhaseKind,
    PingEvent, StarvationEvent, SuspendEvent, TraceSink, UnitEvent, UnitStep,
};

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_PASS_BEGIN: u8 = 1;
const TAG_PASS_YIELD: u8 = 2;
const TAG_PASS_INTERRUPTED: u8 = 3;
const TAG_PASS_COMPLETE: u8 = 4;
const TAG_PHASE_BEGIN: u8 = 5;
const TAG_PHASE_END: u8 = 6;
const TAG_COMMIT_SUMMARY: u8 = 7;
const TAG_SUSPEND: u8 = 8;
const TAG_PING: u8 = 9;
const TAG_ERROR_CAPTURED: u8 = 10;
const TAG_STARVATION: u8 = 11;
const TAG_UNIT: u8 = 12;

/// Node kinds in encoding order.
const WORK_TAGS: [WorkTag; 16] = [
    WorkTag::Root,
    WorkTag::HostElement,
    WorkTag::HostText,
    WorkTag::Function,
    WorkTag::Class,
    WorkTag::Fragment,
    WorkTag::Provider,
    WorkTag::Consumer,
    WorkTag::Suspense,
    WorkTag::SuspenseList,
    WorkTag::Portal,
    WorkTag::Memo,
    WorkTag::Lazy,
    WorkTag::Offscreen,
    WorkTag::Cache,
    WorkTag::Scope,
];

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Vec<u8>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view of the recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    // -- encoding helpers --------------------------------------------------

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_bool(&mut self, v: bool) {
        self.write_u8(u8::from(v));
    }

    fn write_root(&mut self, root: RootId) {
        self.write_u32(root.index());
        self.write_u32(root.generation());
    }

    fn write_node(&mut self, node: Option<NodeId>) {
        match node {
            Some(id) => {
                self.write_u8(1);
                self.write_u32(id.index());
                self.write_u32(id.generation());
            }
            None => {
                self.write_u8(0);
                self.write_u32(0);
                self.write_u32(0);
            }
        }
    }

    fn write_lanes(&mut self, lanes: Lanes) {
        self.write_u32(lanes.0);
    }

    fn write_time(&mut self, t: HostTime) {
        self.write_u64(t.ticks());
    }

    fn write_phase(&mut self, p: PhaseKind) {
        self.write_u8(match p {
            PhaseKind::BeforeMutation => 0,
            PhaseKind::Mutation => 1,
            PhaseKind::Layout => 2,
            PhaseKind::Passive => 3,
        });
    }

    fn write_outcome(&mut self, o: PassOutcome) {
        self.write_u8(match o {
            PassOutcome::Completed => 0,
            PassOutcome::Suspended => 1,
            PassOutcome::Errored => 2,
        });
    }

    fn write_work_tag(&mut self, tag: WorkTag) {
        let code = WORK_TAGS.iter().position(|t| *t == tag).unwrap_or(0);
        #[expect(
            clippy::cast_possible_truncation,
            reason = "there are fewer than 256 node kinds"
        )]
        self.write_u8(code as u8);
    }
}

impl TraceSink for RecorderSink {
    fn on_pass_begin(&mut self, e: &PassBeginEvent) {
        self.write_u8(TAG_PASS_BEGIN);
        self.write_root(e.root);
        self.write_lanes(e.lanes);
        self.write_bool(e.fresh);
        self.write_bool(e.sync);
        self.write_time(e.timestamp);
    }

    fn on_pass_yield(&mut self, e: &PassYieldEvent) {
        self.write_u8(TAG_PASS_YIELD);
        self.write_root(e.root);
        self.write_lanes(e.lanes);
        self.write_u64(e.units);
        self.write_time(e.timestamp);
    }

    fn on_pass_interrupted(&mut self, e: &PassInterruptedEvent) {
        self.write_u8(TAG_PASS_INTERRUPTED);
        self.write_root(e.root);
        self.write_lanes(e.discarded);
        self.write_lanes(e.next);
        self.write_time(e.timestamp);
    }

    fn on_pass_complete(&mut self, e: &PassCompleteEvent) {
        self.write_u8(TAG_PASS_COMPLETE);
        self.write_root(e.root);
        self.write_lanes(e.lanes);
        self.write_u64(e.units);
        self.write_outcome(e.outcome);
        self.write_time(e.timestamp);
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        self.write_u8(TAG_PHASE_BEGIN);
        self.write_root(e.root);
        self.write_phase(e.phase);
        self.write_time(e.timestamp);
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        self.write_u8(TAG_PHASE_END);
        self.write_root(e.root);
        self.write_phase(e.phase);
        self.write_time(e.timestamp);
    }

    fn on_commit_summary(&mut self, s: &CommitSummary) {
        self.write_u8(TAG_COMMIT_SUMMARY);
        self.write_root(s.root);
        self.write_lanes(s.lanes);
        self.write_lanes(s.remaining);
        self.write_u64(s.units);
        self.write_u32(s.mutations);
        self.write_time(s.committed_at);
        self.write_u64(s.before_mutation_ticks);
        self.write_u64(s.mutation_ticks);
        self.write_u64(s.layout_ticks);
        self.write_u64(s.passive_ticks);
    }

    fn on_suspend(&mut self, e: &SuspendEvent) {
        self.write_u8(TAG_SUSPEND);
        self.write_root(e.root);
        self.write_lanes(e.lanes);
        self.write_u32(e.wakeable.id());
        self.write_bool(e.delayed);
    }

    fn on_ping(&mut self, e: &PingEvent) {
        self.write_u8(TAG_PING);
        self.write_root(e.root);
        self.write_u32(e.wakeable.id());
        self.write_lanes(e.lanes);
        self.write_bool(e.retry);
    }

    fn on_error_captured(&mut self, e: &ErrorCapturedEvent) {
        self.write_u8(TAG_ERROR_CAPTURED);
        self.write_root(e.root);
        self.write_u8(match e.phase {
            ErrorPhase::Render => 0,
            ErrorPhase::Commit => 1,
        });
        self.write_node(e.boundary);
    }

    fn on_starvation(&mut self, e: &StarvationEvent) {
        self.write_u8(TAG_STARVATION);
        self.write_root(e.root);
        self.write_lanes(e.lanes);
        self.write_time(e.timestamp);
    }

    fn on_unit(&mut self, e: &UnitEvent) {
        self.write_u8(TAG_UNIT);
        self.write_root(e.root);
        self.write_node(Some(e.node));
        self.write_work_tag(e.tag);
        self.write_u8(match e.step {
            UnitStep::Begin => 0,
            UnitStep::Complete => 1,
        });
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// A decoded event from a binary recording.
#[derive(Clone, Debug)]
pub enum RecordedEvent {
    /// A [`PassBeginEvent`].
    PassBegin(PassBeginEvent),
    /// A [`PassYieldEvent`].
    PassYield(PassYieldEvent),
    /// A [`PassInterruptedEvent`].
    PassInterrupted(PassInterruptedEvent),
    /// A [`PassCompleteEvent`].
    PassComplete(PassCompleteEvent),
    /// A [`PhaseBeginEvent`].
    PhaseBegin(PhaseBeginEvent),
    /// A [`PhaseEndEvent`].
    PhaseEnd(PhaseEndEvent),
    /// A [`CommitSummary`].
    CommitSummary(CommitSummary),
    /// A [`SuspendEvent`].
    Suspend(SuspendEvent),
    /// A [`PingEvent`].
    Ping(PingEvent),
    /// An [`ErrorCapturedEvent`].
    ErrorCaptured(ErrorCapturedEvent),
    /// A [`StarvationEvent`].
    Starvation(StarvationEvent),
    /// A [`UnitEvent`].
    Unit(UnitEvent),
}

/// Decodes a byte slice produced by [`RecorderSink`] into an iterator of
/// [`RecordedEvent`].
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter {
        data: bytes,
        pos: 0,
    }
}

/// Iterator over decoded events.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn read_u8(&mut self) -> Option<u8> {
        if self.remaining() < 1 {
            return None;
        }
        let v = self.data[self.pos];
        self.pos += 1;
        Some(v)
    }

    fn read_u32(&mut self) -> Option<u32> {
        if self.remaining() < 4 {
            return None;
        }
        let v = u32::from_le_bytes(self.data[self.pos..self.pos + 4].try_into().ok()?);
        self.pos += 4;
        Some(v)
    }

    fn read_u64(&mut self) -> Option<u64> {
        if self.remaining() < 8 {
            return None;
        }
        let v = u64::from_le_bytes(self.data[self.pos..self.pos + 8].try_into().ok()?);
        self.pos += 8;
        Some(v)
    }

    fn read_bool(&mut self) -> Option<bool> {
        Some(self.read_u8()? != 0)
    }

    fn read_root(&mut self) -> Option<RootId> {
        let index = self.read_u32()?;
        let generation = self.read_u32()?;
        Some(RootId::from_raw(index, generation))
    }

    fn read_node(&mut self) -> Option<Option<NodeId>> {
        let present = self.read_u8()?;
        let index = self.read_u32()?;
        let generation = self.read_u32()?;
        Some((present != 0).then(|| NodeId::from_raw(index, generation)))
    }

    fn read_lanes(&mut self) -> Option<Lanes> {
        Some(Lanes(self.read_u32()?))
    }

    fn read_time(&mut self) -> Option<HostTime> {
        Some(HostTime(self.read_u64()?))
    }

    fn read_phase(&mut self) -> Option<PhaseKind> {
        Some(match self.read_u8()? {
            0 => PhaseKind::BeforeMutation,
            1 => PhaseKind::Mutation,
            2 => PhaseKind::Layout,
            _ => PhaseKind::Passive,
        })
    }

    fn read_outcome(&mut self) -> Option<PassOutcome> {
        Some(match self.read_u8()? {
            0 => PassOutcome::Completed,
            1 => PassOutcome::Suspended,
            _ => PassOutcome::Errored,
        })
    }

    fn decode_pass_begin(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PassBegin(PassBeginEvent {
            root: self.read_root()?,
            lanes: self.read_lanes()?,
            fresh: self.read_bool()?,
            sync: self.read_bool()?,
            timestamp: self.read_time()?,
        }))
    }

    fn decode_pass_yield(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PassYield(PassYieldEvent {
            root: self.read_root()?,
            lanes: self.read_lanes()?,
            units: self.read_u64()?,
            timestamp: self.read_time()?,
        }))
    }

    fn decode_pass_interrupted(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PassInterrupted(PassInterruptedEvent {
            root: self.read_root()?,
            discarded: self.read_lanes()?,
            next: self.read_lanes()?,
            timestamp: self.read_time()?,
        }))
    }

    fn decode_pass_complete(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PassComplete(PassCompleteEvent {
            root: self.read_root()?,
            lanes: self.read_lanes()?,
            units: self.read_u64()?,
            outcome: self.read_outcome()?,
            timestamp: self.read_time()?,
        }))
    }

    fn decode_phase_begin(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PhaseBegin(PhaseBeginEvent {
            root: self.read_root()?,
            phase: self.read_phase()?,
            timestamp: self.read_time()?,
        }))
    }

    fn decode_phase_end(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PhaseEnd(PhaseEndEvent {
            root: self.read_root()?,
            phase: self.read_phase()?,
            timestamp: self.read_time()?,
        }))
    }

    fn decode_commit_summary(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::CommitSummary(CommitSummary {
            root: self.read_root()?,
            lanes: self.read_lanes()?,
            remaining: self.read_lanes()?,
            units: self.read_u64()?,
            mutations: self.read_u32()?,
            committed_at: self.read_time()?,
            before_mutation_ticks: self.read_u64()?,
            mutation_ticks: self.read_u64()?,
            layout_ticks: self.read_u64()?,
            passive_ticks: self.read_u64()?,
        }))
    }

    fn decode_suspend(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Suspend(SuspendEvent {
            root: self.read_root()?,
            lanes: self.read_lanes()?,
            wakeable: Wakeable::from_raw(self.read_u32()?),
            delayed: self.read_bool()?,
        }))
    }

    fn decode_ping(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Ping(PingEvent {
            root: self.read_root()?,
            wakeable: Wakeable::from_raw(self.read_u32()?),
            lanes: self.read_lanes()?,
            retry: self.read_bool()?,
        }))
    }

    fn decode_error_captured(&mut self) -> Option<RecordedEvent> {
        let root = self.read_root()?;
        let phase = match self.read_u8()? {
            0 => ErrorPhase::Render,
            _ => ErrorPhase::Commit,
        };
        Some(RecordedEvent::ErrorCaptured(ErrorCapturedEvent {
            root,
            phase,
            boundary: self.read_node()?,
        }))
    }

    fn decode_starvation(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Starvation(StarvationEvent {
            root: self.read_root()?,
            lanes: self.read_lanes()?,
            timestamp: self.read_time()?,
        }))
    }

    fn decode_unit(&mut self) -> Option<RecordedEvent> {
        let root = self.read_root()?;
        let node = self.read_node()??;
        let tag = *WORK_TAGS.get(usize::from(self.read_u8()?))?;
        let step = match self.read_u8()? {
            0 => UnitStep::Begin,
            _ => UnitStep::Complete,
        };
        Some(RecordedEvent::Unit(UnitEvent {
            root,
            node,
            tag,
            step,
        }))
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = RecordedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let tag = self.read_u8()?;
        match tag {
            TAG_PASS_BEGIN => self.decode_pass_begin(),
            TAG_PASS_YIELD => self.decode_pass_yield(),
            TAG_PASS_INTERRUPTED => self.decode_pass_interrupted(),
            TAG_PASS_COMPLETE => self.decode_pass_complete(),
            TAG_PHASE_BEGIN => self.decode_phase_begin(),
            TAG_PHASE_END => self.decode_phase_end(),
            TAG_COMMIT_SUMMARY => self.decode_commit_summary(),
            TAG_SUSPEND => self.decode_suspend(),
            TAG_PING => self.decode_ping(),
            TAG_ERROR_CAPTURED => self.decode_error_captured(),
            TAG_STARVATION => self.decode_starvation(),
            TAG_UNIT => self.decode_unit(),
            _ => None, // unknown tag → stop iteration
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
