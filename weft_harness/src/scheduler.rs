// Copyright 2026 the Weft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A deterministic [`HostScheduler`] driven by hand.
//!
//! Nothing runs until the test pops a task. Time only moves when the test
//! advances the clock, and time slices are measured in units of work: with
//! a slice of `n`, [`should_yield`](HostScheduler::should_yield) answers
//! `true` after the `n`th call since the running task was popped.

use alloc::vec::Vec;
use core::cell::Cell;

use weft_core::host::{CallbackHandle, HostScheduler, SchedulerPriority, Task};
use weft_core::time::{Duration, HostTime};

#[derive(Clone, Copy, Debug)]
struct Entry {
    priority: SchedulerPriority,
    handle: CallbackHandle,
    task: Task,
}

/// A task queue with a manual clock and unit-counted time slices.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    queue: Vec<Entry>,
    running: Option<Entry>,
    next_handle: u64,
    now: u64,
    slice: Option<u32>,
    budget: Cell<u32>,
    scheduled: u64,
    cancelled: u64,
}

impl ManualScheduler {
    /// Creates a scheduler that never asks work to yield.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a scheduler that asks work to yield every `units` units.
    #[must_use]
    pub fn with_slice(units: u32) -> Self {
        let units = units.max(1);
        Self {
            slice: Some(units),
            budget: Cell::new(units),
            ..Self::default()
        }
    }

    /// Changes the slice length; `None` disables yielding.
    pub fn set_slice(&mut self, units: Option<u32>) {
        self.slice = units.map(|u| u.max(1));
        self.budget.set(self.slice.unwrap_or(0));
    }

    /// Moves the clock forward.
    pub fn advance(&mut self, by: Duration) {
        self.now = self.now.saturating_add(by.ticks());
    }

    /// Sets the clock. Moving it backwards is ignored.
    pub fn set_time(&mut self, t: HostTime) {
        self.now = self.now.max(t.ticks());
    }

    /// Removes the highest-priority task (first scheduled among equals) and
    /// starts a fresh time slice for it.
    pub fn pop(&mut self) -> Option<Task> {
        let at = self
            .queue
            .iter()
            .enumerate()
            .min_by_key(|(_, e)| (e.priority, e.handle.0))
            .map(|(i, _)| i)?;
        let entry = self.queue.remove(at);
        self.running = Some(entry);
        self.budget.set(self.slice.unwrap_or(0));
        Some(entry.task)
    }

    /// Puts the task popped last back into the queue under its original
    /// handle, as a continuation. Does nothing if it was cancelled while
    /// running.
    pub fn requeue(&mut self) {
        if let Some(entry) = self.running.take() {
            self.queue.push(entry);
        }
    }

    /// Forgets the task popped last.
    pub fn finish(&mut self) {
        self.running = None;
    }

    /// Returns `true` if no task is queued.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of queued tasks.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Priority of the task that would be popped next.
    #[must_use]
    pub fn peek_priority(&self) -> Option<SchedulerPriority> {
        self.queue.iter().map(|e| e.priority).min()
    }

    /// Total `schedule_callback` calls.
    #[must_use]
    pub fn scheduled(&self) -> u64 {
        self.scheduled
    }

    /// Total `cancel_callback` calls that removed a queued task.
    #[must_use]
    pub fn cancelled(&self) -> u64 {
        self.cancelled
    }
}

impl HostScheduler for ManualScheduler {
    fn schedule_callback(&mut self, priority: SchedulerPriority, task: Task) -> CallbackHandle {
        self.next_handle += 1;
        self.scheduled += 1;
        let handle = CallbackHandle(self.next_handle);
        self.queue.push(Entry {
            priority,
            handle,
            task,
        });
        handle
    }

    fn cancel_callback(&mut self, handle: CallbackHandle) {
        let before = self.queue.len();
        self.queue.retain(|e| e.handle != handle);
        if self.queue.len() != before {
            self.cancelled += 1;
        }
        if self.running.is_some_and(|e| e.handle == handle) {
            self.running = None;
        }
    }

    fn should_yield(&self) -> bool {
        if self.slice.is_none() {
            return false;
        }
        let left = self.budget.get().saturating_sub(1);
        self.budget.set(left);
        left == 0
    }

    fn now(&self) -> HostTime {
        HostTime(self.now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slices_count_down_per_pop() {
        let mut s = ManualScheduler::with_slice(3);
        assert!(!s.should_yield(), "1 of 3");
        assert!(!s.should_yield(), "2 of 3");
        assert!(s.should_yield(), "3 of 3");
        s.set_slice(Some(2));
        assert!(!s.should_yield(), "budget was reset");
        assert!(s.should_yield(), "2 of 2");
    }

    #[test]
    fn unsliced_never_yields() {
        let s = ManualScheduler::new();
        for _ in 0..100 {
            assert!(!s.should_yield(), "no slice configured");
        }
    }

    #[test]
    fn clock_only_moves_forward() {
        let mut s = ManualScheduler::new();
        s.advance(Duration(5));
        s.set_time(HostTime(3));
        assert_eq!(s.now(), HostTime(5));
        s.set_time(HostTime(9));
        assert_eq!(s.now(), HostTime(9));
    }
}
