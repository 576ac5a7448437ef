// Copyright 2026 the Weft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Deterministic host, scheduler and metrics for exercising weft.
//!
//! - [`RecordingHost`]: an in-memory host tree that logs every call.
//! - [`ManualScheduler`]: a task queue with a manual clock and time slices
//!   counted in units of work.
//! - [`PassTracker`]: a trace sink aggregating pass and commit metrics into
//!   a [`PassReport`].
//!
//! The `run_*` helpers pop tasks from the scheduler and hand them to the
//! engine, requeueing tasks that yielded:
//!
//! ```ignore
//! let mut engine = Reconciler::new(RecordingHost::new(), ManualScheduler::new(), config);
//! let root = engine.create_root(ContainerId(1));
//! engine.render(root, Some(Element::text("hi")), UpdatePriority::Default)?;
//! run_until_idle(&mut engine)?;
//! assert_eq!(engine.host().texts(ContainerId(1)), ["hi"]);
//! ```

#![no_std]

extern crate alloc;

mod host;
mod scheduler;
mod tracker;

#[cfg(test)]
mod scenarios;

pub use host::{FailOn, HostOp, RecordingHost};
pub use scheduler::ManualScheduler;
pub use tracker::{CommitRecord, PassReport, PassTracker};

use weft_core::error::EngineError;
use weft_core::host::{HostAdapter, TaskStatus};
use weft_core::reconciler::Reconciler;
use weft_core::trace::{NoopSink, TraceSink};

/// The engine as driven by this crate.
pub type Engine<H = RecordingHost> = Reconciler<H, ManualScheduler>;

/// Runs one slice of the next queued task.
///
/// Returns `None` when nothing is queued. A task that yields is put back in
/// the queue under its original handle.
pub fn run_next<H: HostAdapter>(engine: &mut Engine<H>) -> Result<Option<TaskStatus>, EngineError> {
    run_next_traced(engine, &mut NoopSink)
}

/// Like [`run_next`], reporting to `sink`.
pub fn run_next_traced<H: HostAdapter>(
    engine: &mut Engine<H>,
    sink: &mut dyn TraceSink,
) -> Result<Option<TaskStatus>, EngineError> {
    let Some(task) = engine.scheduler_mut().pop() else {
        return Ok(None);
    };
    let result = engine.run_task_traced(task, sink);
    match result {
        Ok(TaskStatus::Continue) => engine.scheduler_mut().requeue(),
        _ => engine.scheduler_mut().finish(),
    }
    result.map(Some)
}

/// Runs queued tasks until the queue is empty or a task fails.
///
/// Returns the number of slices run.
pub fn run_until_idle<H: HostAdapter>(engine: &mut Engine<H>) -> Result<u32, EngineError> {
    run_until_idle_traced(engine, &mut NoopSink)
}

/// Like [`run_until_idle`], reporting to `sink`.
pub fn run_until_idle_traced<H: HostAdapter>(
    engine: &mut Engine<H>,
    sink: &mut dyn TraceSink,
) -> Result<u32, EngineError> {
    let mut slices = 0;
    while run_next_traced(engine, sink)?.is_some() {
        slices += 1;
    }
    Ok(slices)
}
