// Copyright 2026 the Weft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads recorded bytes from a [`RecorderSink`](super::recorder::RecorderSink)
//! and writes [Chrome Trace Event Format][spec] JSON to the given writer.
//!
//! Each root becomes one process; render passes and commit phases are
//! duration slices on its thread 0, everything else is an instant event.
//!
//! [spec]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use weft_core::time::HostTime;

use crate::recorder::{RecordedEvent, decode};

/// Exports recorded events as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
///
/// `us_per_tick` converts host ticks to microseconds (1000.0 for a
/// millisecond clock).
pub fn export(bytes: &[u8], us_per_tick: f64, writer: &mut dyn Write) -> io::Result<()> {
    let ts = |t: HostTime| t.ticks() as f64 * us_per_tick;
    // Events without a timestamp are placed at the last one seen.
    let mut last = 0.0;
    let mut events: Vec<Value> = Vec::new();

    for recorded in decode(bytes) {
        match recorded {
            RecordedEvent::PassBegin(e) => {
                last = ts(e.timestamp);
                events.push(json!({
                    "ph": "B",
                    "name": "Pass",
                    "cat": "Render",
                    "ts": last,
                    "pid": e.root.index(),
                    "tid": 0,
                    "args": {
                        "lanes": e.lanes.0,
                        "fresh": e.fresh,
                        "sync": e.sync,
                    }
                }));
            }
            RecordedEvent::PassYield(e) => {
                last = ts(e.timestamp);
                events.push(json!({
                    "ph": "E",
                    "name": "Pass",
                    "cat": "Render",
                    "ts": last,
                    "pid": e.root.index(),
                    "tid": 0,
                    "args": {
                        "units": e.units,
                        "yielded": true,
                    }
                }));
            }
            RecordedEvent::PassInterrupted(e) => {
                last = ts(e.timestamp);
                events.push(json!({
                    "ph": "i",
                    "name": "Interrupted",
                    "cat": "Render",
                    "ts": last,
                    "pid": e.root.index(),
                    "tid": 0,
                    "s": "p",
                    "args": {
                        "discarded": e.discarded.0,
                        "next": e.next.0,
                    }
                }));
            }
            RecordedEvent::PassComplete(e) => {
                last = ts(e.timestamp);
                events.push(json!({
                    "ph": "E",
                    "name": "Pass",
                    "cat": "Render",
                    "ts": last,
                    "pid": e.root.index(),
                    "tid": 0,
                    "args": {
                        "units": e.units,
                        "outcome": format!("{:?}", e.outcome),
                    }
                }));
            }
            RecordedEvent::PhaseBegin(e) => {
                last = ts(e.timestamp);
                events.push(json!({
                    "ph": "B",
                    "name": format!("{:?}", e.phase),
                    "cat": "Commit",
                    "ts": last,
                    "pid": e.root.index(),
                    "tid": 0,
                }));
            }
            RecordedEvent::PhaseEnd(e) => {
                last = ts(e.timestamp);
                events.push(json!({
                    "ph": "E",
                    "name": format!("{:?}", e.phase),
                    "cat": "Commit",
                    "ts": last,
                    "pid": e.root.index(),
                    "tid": 0,
                }));
            }
            RecordedEvent::CommitSummary(s) => {
                events.push(json!({
                    "ph": "i",
                    "name": "CommitSummary",
                    "cat": "Summary",
                    "ts": ts(s.committed_at),
                    "pid": s.root.index(),
                    "tid": 0,
                    "s": "p",
                    "args": {
                        "lanes": s.lanes.0,
                        "remaining": s.remaining.0,
                        "units": s.units,
                        "mutations": s.mutations,
                        "mutation_us": s.mutation_ticks as f64 * us_per_tick,
                        "layout_us": s.layout_ticks as f64 * us_per_tick,
                    }
                }));
            }
            RecordedEvent::Suspend(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "Suspend",
                    "cat": "Suspense",
                    "ts": last,
                    "pid": e.root.index(),
                    "tid": 0,
                    "s": "t",
                    "args": {
                        "wakeable": e.wakeable.id(),
                        "delayed": e.delayed,
                    }
                }));
            }
            RecordedEvent::Ping(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "Ping",
                    "cat": "Suspense",
                    "ts": last,
                    "pid": e.root.index(),
                    "tid": 0,
                    "s": "p",
                    "args": {
                        "wakeable": e.wakeable.id(),
                        "lanes": e.lanes.0,
                        "retry": e.retry,
                    }
                }));
            }
            RecordedEvent::ErrorCaptured(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "ErrorCaptured",
                    "cat": "Error",
                    "ts": last,
                    "pid": e.root.index(),
                    "tid": 0,
                    "s": "p",
                    "args": {
                        "phase": format!("{:?}", e.phase),
                        "boundary": e.boundary.map(|b| b.index()),
                    }
                }));
            }
            RecordedEvent::Starvation(e) => {
                last = ts(e.timestamp);
                events.push(json!({
                    "ph": "i",
                    "name": "Starvation",
                    "cat": "Scheduler",
                    "ts": last,
                    "pid": e.root.index(),
                    "tid": 0,
                    "s": "p",
                    "args": {
                        "lanes": e.lanes.0,
                    }
                }));
            }
            RecordedEvent::Unit(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": e.tag.as_str(),
                    "cat": "Rich",
                    "ts": last,
                    "pid": e.root.index(),
                    "tid": 1,
                    "s": "t",
                    "args": {
                        "node": e.node.index(),
                        "step": format!("{:?}", e.step),
                    }
                }));
            }
        }
    }

    serde_json::to_writer_pretty(writer, &events)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::RecorderSink;
    use weft_core::lane::Lanes;
    use weft_core::reconciler::RootId;
    use weft_core::trace::{
        PassBeginEvent, PassCompleteEvent, PassOutcome, PhaseBeginEvent, PhaseEndEvent,
        PhaseKind, TraceSink,
    };

    #[test]
    fn export_produces_valid_json() {
        let root = RootId::from_raw(1, 0);
        let mut rec = RecorderSink::new();
        rec.on_pass_begin(&PassBeginEvent {
            root,
            lanes: Lanes::DEFAULT,
            fresh: true,
            sync: true,
            timestamp: HostTime(1),
        });
        rec.on_pass_complete(&PassCompleteEvent {
            root,
            lanes: Lanes::DEFAULT,
            units: 4,
            outcome: PassOutcome::Completed,
            timestamp: HostTime(3),
        });
        rec.on_phase_begin(&PhaseBeginEvent {
            root,
            phase: PhaseKind::Mutation,
            timestamp: HostTime(3),
        });
        rec.on_phase_end(&PhaseEndEvent {
            root,
            phase: PhaseKind::Mutation,
            timestamp: HostTime(4),
        });

        let mut out = Vec::new();
        export(rec.as_bytes(), 1000.0, &mut out).unwrap();
        let json_str = String::from_utf8(out).unwrap();

        let parsed: Vec<Value> = serde_json::from_str(&json_str).unwrap();
        assert_eq!(parsed.len(), 4);

        assert_eq!(parsed[0]["ph"], "B");
        assert_eq!(parsed[0]["name"], "Pass");
        assert_eq!(parsed[0]["pid"], 1);
        assert_eq!(parsed[0]["ts"], 1000.0);

        assert_eq!(parsed[1]["ph"], "E");
        assert_eq!(parsed[1]["args"]["outcome"], "Completed");

        assert_eq!(parsed[2]["ph"], "B");
        assert_eq!(parsed[2]["name"], "Mutation");
        assert_eq!(parsed[3]["ph"], "E");
    }

    #[test]
    fn export_empty_recording() {
        let mut out = Vec::new();
        export(&[], 1.0, &mut out).unwrap();
        let json_str = String::from_utf8(out).unwrap();
        let parsed: Vec<Value> = serde_json::from_str(&json_str).unwrap();
        assert!(parsed.is_empty());
    }
}
