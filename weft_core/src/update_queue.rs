// Copyright 2026 the Weft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-node update queues.
//!
//! Every node that owns state has an [`UpdateQueue`]. Both generations of a
//! node carry their own copy, and new updates are appended to both, so a
//! pass that is thrown away never loses an update.
//!
//! Processing is non-destructive. Updates whose lane is not being rendered
//! are kept, together with every later update, in the *base* list; the state
//! before the first skipped update is kept as the *base state*. The next pass
//! that includes the skipped lane starts from that base state and replays the
//! list, so the final state is the same as applying every update in issue
//! order.
//!
//! ```text
//!   issued:  B(default)  A(sync)
//!   pass 1 (sync):     skip B, apply A         base = [B, A*]
//!   pass 2 (default):  apply B, apply A*       base = []
//!   (A* is A rebased onto the empty lane, so it always applies)
//! ```

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::fmt;

use crate::element::{Element, Value};
use crate::error::ComponentError;
use crate::lane::Lanes;

/// A state transition.
#[derive(Clone)]
pub enum Action {
    /// Replace the state with a value.
    Replace(Value),
    /// Compute the next state from the previous one.
    Reduce(Rc<dyn Fn(&Value) -> Value>),
    /// Replace the element rendered by a root.
    Render(Option<Element>),
    /// Re-render without changing state.
    ForceUpdate,
    /// Deliver an error to an error boundary.
    Capture(ComponentError),
}

impl Action {
    /// Shorthand for [`Action::Reduce`].
    pub fn reduce(f: impl Fn(&Value) -> Value + 'static) -> Self {
        Self::Reduce(Rc::new(f))
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Replace(v) => f.debug_tuple("Replace").field(v).finish(),
            Self::Reduce(_) => f.write_str("Reduce(..)"),
            Self::Render(e) => f.debug_tuple("Render").field(&e.is_some()).finish(),
            Self::ForceUpdate => f.write_str("ForceUpdate"),
            Self::Capture(e) => f.debug_tuple("Capture").field(e).finish(),
        }
    }
}

/// One queued update.
#[derive(Clone, Debug)]
pub(crate) struct Update {
    pub(crate) lane: Lanes,
    pub(crate) action: Action,
}

/// The kind of state a queue folds over.
#[derive(Clone, Debug)]
pub(crate) enum QueueState {
    Value(Value),
    Element(Option<Element>),
}

/// Result of processing a queue for one pass.
#[derive(Debug)]
pub(crate) struct Processed<T> {
    pub(crate) state: T,
    /// Lanes of updates that were skipped and remain queued.
    pub(crate) skipped_lanes: Lanes,
    /// A [`Action::ForceUpdate`] was applied.
    pub(crate) forced: bool,
    /// Errors delivered through [`Action::Capture`].
    pub(crate) captured: Vec<ComponentError>,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct UpdateQueue {
    /// State before the first skipped update; `None` when nothing was
    /// skipped, in which case processing starts from the memoized state.
    base_state: Option<QueueState>,
    base: Vec<Update>,
    pending: Vec<Update>,
    /// Transition lanes that landed in this queue, for entanglement.
    pub(crate) transition_lanes: Lanes,
}

impl UpdateQueue {
    pub(crate) fn enqueue(&mut self, update: Update) {
        self.pending.push(update);
    }

    /// Adds an update to this copy only, ahead of processing.
    ///
    /// Used for errors captured during a pass: if the pass is thrown away,
    /// the capture goes with it.
    pub(crate) fn push_captured(&mut self, update: Update) {
        self.base.push(update);
    }

    pub(crate) fn has_updates(&self) -> bool {
        !self.pending.is_empty() || !self.base.is_empty()
    }

    /// Drops every queued update.
    pub(crate) fn clear(&mut self) {
        self.base_state = None;
        self.base.clear();
        self.pending.clear();
        self.transition_lanes = Lanes::NONE;
    }

    pub(crate) fn process_value(
        &mut self,
        memoized: Value,
        current: Option<&mut Self>,
        render_lanes: Lanes,
    ) -> Processed<Value> {
        let p = self.process(QueueState::Value(memoized.clone()), current, render_lanes);
        Processed {
            state: match p.state {
                QueueState::Value(v) => v,
                QueueState::Element(_) => memoized,
            },
            skipped_lanes: p.skipped_lanes,
            forced: p.forced,
            captured: p.captured,
        }
    }

    pub(crate) fn process_element(
        &mut self,
        memoized: Option<Element>,
        current: Option<&mut Self>,
        render_lanes: Lanes,
    ) -> Processed<Option<Element>> {
        let p = self.process(
            QueueState::Element(memoized.clone()),
            current,
            render_lanes,
        );
        Processed {
            state: match p.state {
                QueueState::Element(e) => e,
                QueueState::Value(_) => memoized,
            },
            skipped_lanes: p.skipped_lanes,
            forced: p.forced,
            captured: p.captured,
        }
    }

    /// Folds the updates included in `render_lanes` into the state.
    ///
    /// Pending updates move into the base list of this copy and of the other
    /// generation's copy, so the other copy still holds them if this pass is
    /// discarded.
    fn process(
        &mut self,
        memoized: QueueState,
        current: Option<&mut Self>,
        render_lanes: Lanes,
    ) -> Processed<QueueState> {
        if !self.pending.is_empty() {
            let pending = core::mem::take(&mut self.pending);
            if let Some(current) = current {
                current.pending.clear();
                current.base.extend(pending.iter().cloned());
            }
            self.base.extend(pending);
        }

        let mut state = self.base_state.take().unwrap_or(memoized);
        let mut new_base_state = None;
        let mut new_base = Vec::new();
        let mut skipped_lanes = Lanes::NONE;
        let mut forced = false;
        let mut captured = Vec::new();

        for update in core::mem::take(&mut self.base) {
            if !update.lane.is_subset_of(render_lanes) {
                if new_base.is_empty() {
                    new_base_state = Some(state.clone());
                }
                skipped_lanes |= update.lane;
                new_base.push(update);
                continue;
            }
            if !new_base.is_empty() {
                new_base.push(Update {
                    lane: Lanes::NONE,
                    action: update.action.clone(),
                });
            }
            state = apply(state, &update.action, &mut forced, &mut captured);
        }

        self.base_state = new_base_state;
        self.base = new_base;
        Processed {
            state,
            skipped_lanes,
            forced,
            captured,
        }
    }
}

fn apply(
    state: QueueState,
    action: &Action,
    forced: &mut bool,
    captured: &mut Vec<ComponentError>,
) -> QueueState {
    match (state, action) {
        (QueueState::Value(_), Action::Replace(v)) => QueueState::Value(v.clone()),
        (QueueState::Value(v), Action::Reduce(f)) => QueueState::Value(f(&v)),
        (QueueState::Element(_), Action::Render(e)) => QueueState::Element(e.clone()),
        (state, Action::ForceUpdate) => {
            *forced = true;
            state
        }
        (state, Action::Capture(err)) => {
            captured.push(err.clone());
            state
        }
        // Mismatched actions leave the state alone.
        (state, _) => state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn append(s: &'static str) -> Action {
        Action::reduce(move |v| Value::from(alloc::format!("{v}{s}")))
    }

    fn update(lane: Lanes, action: Action) -> Update {
        Update { lane, action }
    }

    #[test]
    fn rebasing_preserves_issue_order() {
        let mut wip = UpdateQueue::default();
        let mut current = UpdateQueue::default();
        for q in [&mut wip, &mut current] {
            q.enqueue(update(Lanes::DEFAULT, append("B")));
            q.enqueue(update(Lanes::SYNC, append("A")));
        }

        let first = wip.process_value(Value::from(""), Some(&mut current), Lanes::SYNC);
        assert_eq!(first.state, Value::from("A"));
        assert_eq!(first.skipped_lanes, Lanes::DEFAULT);

        // The committed copy carries the rebased list forward.
        let second = wip.process_value(first.state, None, Lanes::DEFAULT);
        assert_eq!(second.state, Value::from("BA"));
        assert_eq!(second.skipped_lanes, Lanes::NONE);
        assert!(!wip.has_updates());
    }

    #[test]
    fn discarded_pass_leaves_updates_in_other_copy() {
        let mut wip = UpdateQueue::default();
        let mut current = UpdateQueue::default();
        for q in [&mut wip, &mut current] {
            q.enqueue(update(Lanes::DEFAULT, Action::Replace(Value::from(1))));
        }
        let p = wip.process_value(Value::Null, Some(&mut current), Lanes::DEFAULT);
        assert_eq!(p.state, Value::from(1));

        // Pass thrown away: a fresh copy of `current` still replays the update.
        let mut retry = current.clone();
        let p = retry.process_value(Value::Null, None, Lanes::DEFAULT);
        assert_eq!(p.state, Value::from(1));
    }

    #[test]
    fn force_and_capture_do_not_change_state() {
        let mut q = UpdateQueue::default();
        q.enqueue(update(Lanes::SYNC, Action::ForceUpdate));
        q.push_captured(update(Lanes::SYNC, Action::Capture(ComponentError::new("boom"))));
        let p = q.process_value(Value::from(3), None, Lanes::SYNC);
        assert_eq!(p.state, Value::from(3));
        assert!(p.forced);
        assert_eq!(p.captured.len(), 1);
    }

    #[test]
    fn element_queue_takes_last_render() {
        let mut q = UpdateQueue::default();
        q.enqueue(update(Lanes::DEFAULT, Action::Render(Some(Element::text("a")))));
        q.enqueue(update(Lanes::DEFAULT, Action::Render(None)));
        let p = q.process_element(Some(Element::text("old")), None, Lanes::DEFAULT);
        assert!(p.state.is_none());
    }
}
