// Copyright 2026 the Weft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host contracts.
//!
//! The engine never touches a rendering target directly. It talks to two
//! collaborators supplied by the embedder:
//!
//! - [`HostAdapter`]: creates, updates and removes host instances.
//! - [`HostScheduler`]: runs engine tasks at a priority and answers
//!   "should I yield?" and "what time is it?".
//!
//! Instances and containers are opaque ids chosen by the adapter.

use core::fmt;

use crate::element::{Attrs, UpdatePayload};
use crate::error::HostError;
use crate::reconciler::RootId;
use crate::time::HostTime;

/// A host instance created by a [`HostAdapter`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u32);

impl fmt::Debug for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceId({})", self.0)
    }
}

/// A host container: the top of a root's host tree, or a portal target.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(pub u32);

impl fmt::Debug for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContainerId({})", self.0)
    }
}

/// Where a host instance is inserted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HostParent {
    /// Directly under a container.
    Container(ContainerId),
    /// Under another instance.
    Instance(InstanceId),
}

/// Applies committed changes to the rendering target.
///
/// The mandatory operations (`create_*`, `insert`, `remove`) return
/// `Result`. A failure during render is treated as a render error of the
/// node; a failure during commit is a commit error.
pub trait HostAdapter {
    /// Creates a detached element instance.
    fn create_instance(&mut self, ty: &'static str, attrs: &Attrs) -> Result<InstanceId, HostError>;

    /// Creates a detached text instance.
    fn create_text_instance(&mut self, text: &str) -> Result<InstanceId, HostError>;

    /// Appends a child to an instance that is not attached yet.
    fn append_initial_child(&mut self, parent: InstanceId, child: InstanceId)
    -> Result<(), HostError>;

    /// Called once the children of a new instance are appended.
    ///
    /// Return `true` to receive [`commit_mount`](Self::commit_mount) for the
    /// instance in the layout phase.
    fn finalize_initial_children(
        &mut self,
        instance: InstanceId,
        ty: &'static str,
        attrs: &Attrs,
    ) -> bool {
        _ = (instance, ty, attrs);
        false
    }

    /// Called before the mutation phase of each commit.
    fn prepare_for_commit(&mut self, container: ContainerId) {
        _ = container;
    }

    /// Called after the mutation phase of each commit.
    fn reset_after_commit(&mut self, container: ContainerId) {
        _ = container;
    }

    /// Removes all pre-existing content from a container before its first
    /// mount.
    fn clear_container(&mut self, container: ContainerId) -> Result<(), HostError>;

    /// Inserts `child` under `parent`, before `before` or at the end.
    fn insert(
        &mut self,
        parent: HostParent,
        child: InstanceId,
        before: Option<InstanceId>,
    ) -> Result<(), HostError>;

    /// Removes `child` from `parent`.
    fn remove(&mut self, parent: HostParent, child: InstanceId) -> Result<(), HostError>;

    /// Applies attribute changes to an element instance.
    fn commit_update(
        &mut self,
        instance: InstanceId,
        ty: &'static str,
        payload: &UpdatePayload,
    ) -> Result<(), HostError>;

    /// Replaces the content of a text instance.
    fn commit_text_update(
        &mut self,
        instance: InstanceId,
        old_text: &str,
        new_text: &str,
    ) -> Result<(), HostError>;

    /// Layout-phase notification requested by
    /// [`finalize_initial_children`](Self::finalize_initial_children).
    fn commit_mount(&mut self, instance: InstanceId, ty: &'static str, attrs: &Attrs) {
        _ = (instance, ty, attrs);
    }

    /// Hides an instance without removing it.
    fn hide_instance(&mut self, instance: InstanceId) -> Result<(), HostError>;

    /// Reverses [`hide_instance`](Self::hide_instance).
    fn unhide_instance(&mut self, instance: InstanceId) -> Result<(), HostError>;

    /// Called for every instance of a deleted subtree after it was removed.
    fn detach_deleted_instance(&mut self, instance: InstanceId) {
        _ = instance;
    }
}

/// Priority levels offered by a [`HostScheduler`], highest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SchedulerPriority {
    /// Run before anything else.
    Immediate,
    /// Run soon; user input is waiting on it.
    UserBlocking,
    /// Ordinary work.
    Normal,
    /// Work that can be delayed.
    Low,
    /// Only when nothing else is queued.
    Idle,
}

/// What a scheduled [`Task`] does when run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Render (and commit) pending lanes of the root.
    Render,
    /// Flush the root's pending passive effects.
    Passive,
}

/// A unit of engine work handed to the host scheduler.
///
/// The host stores it and later passes it back to
/// [`Reconciler::run_task`](crate::reconciler::Reconciler::run_task).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Task {
    /// The root the task belongs to.
    pub root: RootId,
    /// What to run.
    pub kind: TaskKind,
    /// Identifies the scheduling request; stale tasks are ignored.
    pub(crate) seq: u64,
}

impl Task {
    /// The scheduling sequence number (for diagnostics only).
    #[must_use]
    pub const fn seq(&self) -> u64 {
        self.seq
    }
}

/// A cancellable handle returned by
/// [`HostScheduler::schedule_callback`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CallbackHandle(pub u64);

/// Result of running a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// The task is finished.
    Done,
    /// The task yielded; run the same task again later.
    Continue,
}

/// The host's task scheduler.
pub trait HostScheduler {
    /// Queues `task` at `priority`.
    fn schedule_callback(&mut self, priority: SchedulerPriority, task: Task) -> CallbackHandle;

    /// Cancels a queued task. Cancelling a task that already ran is a no-op.
    fn cancel_callback(&mut self, handle: CallbackHandle);

    /// Returns `true` when the current time slice is used up.
    fn should_yield(&self) -> bool;

    /// Monotonic current time.
    fn now(&self) -> HostTime;
}
