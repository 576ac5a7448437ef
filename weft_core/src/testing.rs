// Copyright 2026 the Weft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Minimal host and scheduler doubles for unit tests inside this crate.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use crate::element::{Attrs, UpdatePayload};
use crate::error::HostError;
use crate::host::{
    CallbackHandle, ContainerId, HostAdapter, HostParent, HostScheduler, InstanceId,
    SchedulerPriority, Task,
};
use crate::time::HostTime;

/// Records every host call as a short string.
#[derive(Debug, Default)]
pub(crate) struct TestHost {
    pub(crate) ops: Vec<String>,
    next: u32,
}

impl TestHost {
    fn instance(&mut self) -> InstanceId {
        self.next += 1;
        InstanceId(self.next)
    }
}

impl HostAdapter for TestHost {
    fn create_instance(&mut self, ty: &'static str, _: &Attrs) -> Result<InstanceId, HostError> {
        self.ops.push(format!("create {ty}"));
        Ok(self.instance())
    }

    fn create_text_instance(&mut self, text: &str) -> Result<InstanceId, HostError> {
        self.ops.push(format!("create_text {text}"));
        Ok(self.instance())
    }

    fn append_initial_child(&mut self, _: InstanceId, _: InstanceId) -> Result<(), HostError> {
        self.ops.push("append".into());
        Ok(())
    }

    fn clear_container(&mut self, _: ContainerId) -> Result<(), HostError> {
        self.ops.push("clear".into());
        Ok(())
    }

    fn insert(
        &mut self,
        _: HostParent,
        _: InstanceId,
        _: Option<InstanceId>,
    ) -> Result<(), HostError> {
        self.ops.push("insert".into());
        Ok(())
    }

    fn remove(&mut self, _: HostParent, _: InstanceId) -> Result<(), HostError> {
        self.ops.push("remove".into());
        Ok(())
    }

    fn commit_update(
        &mut self,
        _: InstanceId,
        ty: &'static str,
        _: &UpdatePayload,
    ) -> Result<(), HostError> {
        self.ops.push(format!("update {ty}"));
        Ok(())
    }

    fn commit_text_update(&mut self, _: InstanceId, _: &str, new: &str) -> Result<(), HostError> {
        self.ops.push(format!("text {new}"));
        Ok(())
    }

    fn hide_instance(&mut self, _: InstanceId) -> Result<(), HostError> {
        self.ops.push("hide".into());
        Ok(())
    }

    fn unhide_instance(&mut self, _: InstanceId) -> Result<(), HostError> {
        self.ops.push("unhide".into());
        Ok(())
    }
}

/// Queues tasks by priority; never asks the engine to yield.
#[derive(Debug, Default)]
pub(crate) struct TestScheduler {
    queue: Vec<(SchedulerPriority, u64, Task)>,
    next: u64,
}

impl TestScheduler {
    /// Removes and returns the highest-priority, oldest task.
    pub(crate) fn pop(&mut self) -> Option<Task> {
        let best = self
            .queue
            .iter()
            .enumerate()
            .min_by_key(|(_, (priority, handle, _))| (*priority, *handle))
            .map(|(i, _)| i)?;
        Some(self.queue.remove(best).2)
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }
}

impl HostScheduler for TestScheduler {
    fn schedule_callback(&mut self, priority: SchedulerPriority, task: Task) -> CallbackHandle {
        self.next += 1;
        self.queue.push((priority, self.next, task));
        CallbackHandle(self.next)
    }

    fn cancel_callback(&mut self, handle: CallbackHandle) {
        self.queue.retain(|(_, h, _)| *h != handle.0);
    }

    fn should_yield(&self) -> bool {
        false
    }

    fn now(&self) -> HostTime {
        HostTime(0)
    }
}
