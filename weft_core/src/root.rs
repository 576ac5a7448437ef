// Copyright 2026 the Weft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The Root Coordinator: per-root lane bookkeeping.
//!
//! A [`RootCoordinator`] owns one root's node arena and tracks which lanes
//! are pending, suspended, pinged, expired and entangled. It decides which
//! lanes the next pass renders:
//!
//! ```text
//!   pending ─┬─ suspended ──(ping)──► pinged ─┐
//!            │                                ▼
//!            └──────────────► get_next_lanes ──► pass ──► commit
//!                                   ▲                      │
//!            expired ──(sync)───────┘          mark_finished(remaining)
//! ```
//!
//! Lane state transitions live here. Driving passes and commits is the job
//! of [`Reconciler`](crate::reconciler::Reconciler).

use alloc::rc::Rc;
use alloc::vec::Vec;

use hashbrown::HashMap;

use crate::component::{EffectHook, EffectInstance, Wakeable};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::host::{CallbackHandle, ContainerId, SchedulerPriority};
use crate::lane::{LaneCursor, LaneMap, Lanes};
use crate::node::{NodeId, NodeStore};
use crate::reconciler::{RootId, StateHandle};
use crate::time::HostTime;
use crate::work_loop::RenderPass;

/// A task currently queued with the host scheduler.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ScheduledCallback {
    pub(crate) seq: u64,
    pub(crate) handle: CallbackHandle,
    pub(crate) priority: SchedulerPriority,
}

/// Passive effects of the last commit that have not run yet.
#[derive(Debug, Default)]
pub(crate) struct PendingPassive {
    /// Cleanups to run first: changed effects and deleted components.
    pub(crate) unmounts: Vec<Rc<EffectInstance>>,
    /// Effects to run after every cleanup.
    pub(crate) mounts: Vec<(StateHandle, EffectHook)>,
    pub(crate) lanes: Lanes,
}

impl PendingPassive {
    pub(crate) fn is_empty(&self) -> bool {
        self.unmounts.is_empty() && self.mounts.is_empty()
    }
}

/// State of one mounted root.
#[derive(Debug)]
pub(crate) struct RootCoordinator {
    pub(crate) id: RootId,
    pub(crate) container: ContainerId,
    pub(crate) store: NodeStore,
    /// Root node of the current tree.
    pub(crate) current: u32,

    // -- Lanes --
    pub(crate) pending_lanes: Lanes,
    pub(crate) suspended_lanes: Lanes,
    pub(crate) pinged_lanes: Lanes,
    pub(crate) expired_lanes: Lanes,
    pub(crate) entangled_lanes: Lanes,
    pub(crate) entanglements: LaneMap<Lanes>,
    pub(crate) expiration_times: LaneMap<Option<HostTime>>,
    pub(crate) transition_cursor: LaneCursor,
    pub(crate) retry_cursor: LaneCursor,

    // -- Scheduling --
    pub(crate) callback: Option<ScheduledCallback>,
    pub(crate) passive_callback: Option<ScheduledCallback>,
    pub(crate) pass: Option<RenderPass>,

    // -- Suspense --
    /// Wakeables that abandoned a whole pass, with the lanes to ping.
    pub(crate) ping_cache: HashMap<Wakeable, Lanes>,
    /// Wakeables behind committed fallbacks, with the boundaries to retry.
    pub(crate) retry_cache: HashMap<Wakeable, Vec<NodeId>>,

    pub(crate) passive: Option<PendingPassive>,
    pub(crate) next_cache_handle: i64,
    /// Set when the root was torn down by an error nothing caught.
    pub(crate) error: Option<EngineError>,
}

impl RootCoordinator {
    pub(crate) fn new(id: RootId, container: ContainerId) -> Self {
        let mut store = NodeStore::default();
        let current = store.create_root();
        store.sweep(current);
        Self {
            id,
            container,
            store,
            current,
            pending_lanes: Lanes::NONE,
            suspended_lanes: Lanes::NONE,
            pinged_lanes: Lanes::NONE,
            expired_lanes: Lanes::NONE,
            entangled_lanes: Lanes::NONE,
            entanglements: LaneMap::new(Lanes::NONE),
            expiration_times: LaneMap::new(None),
            transition_cursor: LaneCursor::new(Lanes::TRANSITIONS),
            retry_cursor: LaneCursor::new(Lanes::RETRIES),
            callback: None,
            passive_callback: None,
            pass: None,
            ping_cache: HashMap::new(),
            retry_cache: HashMap::new(),
            passive: None,
            next_cache_handle: 1,
            error: None,
        }
    }

    /// Picks the lanes of the next pass.
    ///
    /// `wip_lanes` are the lanes of an in-progress pass, or [`Lanes::NONE`].
    /// The in-progress lanes are kept unless the best pending lanes are of
    /// strictly higher priority, or a pending lane has since been entangled
    /// with them.
    pub(crate) fn get_next_lanes(&self, wip_lanes: Lanes) -> Lanes {
        let pending = self.pending_lanes;
        if pending.is_empty() {
            return Lanes::NONE;
        }
        let non_idle = pending & Lanes::NON_IDLE;
        let candidates = if non_idle.is_empty() { pending } else { non_idle };
        let unblocked = candidates.subtract(self.suspended_lanes);
        let next = if unblocked.is_empty() {
            (candidates & self.pinged_lanes).highest_priority_lanes()
        } else {
            unblocked.highest_priority_lanes()
        };
        if next.is_empty() {
            return Lanes::NONE;
        }
        // Never render part of an entangled group.
        let next = self.with_entangled(next);

        if !wip_lanes.is_empty()
            && wip_lanes != next
            && !wip_lanes.includes_any(self.suspended_lanes)
            && !next.is_higher_priority_than(wip_lanes)
            && (self.with_entangled(wip_lanes) & pending).is_subset_of(wip_lanes)
        {
            return wip_lanes;
        }
        next
    }

    /// Adds every lane entangled with one of `lanes`.
    fn with_entangled(&self, lanes: Lanes) -> Lanes {
        let mut all = lanes;
        for lane in (lanes & self.entangled_lanes).iter() {
            all |= self.entanglements.get(lane);
        }
        all
    }

    /// Records a newly scheduled update on `lane`.
    ///
    /// A new update may unblock suspended work, so suspended and pinged
    /// lanes are reset (idle updates excepted).
    pub(crate) fn mark_updated(&mut self, lane: Lanes) {
        self.pending_lanes |= lane;
        if lane != Lanes::IDLE {
            self.suspended_lanes = Lanes::NONE;
            self.pinged_lanes = Lanes::NONE;
        }
    }

    /// Stamps expiration times on newly pending lanes and moves lanes whose
    /// time has passed into the expired set.
    ///
    /// Returns the lanes that expired in this call.
    pub(crate) fn mark_starved(&mut self, now: HostTime, config: &EngineConfig) -> Lanes {
        let mut newly_expired = Lanes::NONE;
        for lane in self.pending_lanes.iter() {
            match self.expiration_times.get(lane) {
                None => {
                    if !lane.includes_any(self.suspended_lanes)
                        || lane.includes_any(self.pinged_lanes)
                    {
                        self.expiration_times
                            .set(lane, config.expiration_time(lane, now));
                    }
                }
                Some(t) if t <= now => {
                    if !lane.includes_any(self.expired_lanes) {
                        newly_expired |= lane;
                    }
                    self.expired_lanes |= lane;
                }
                Some(_) => {}
            }
        }
        newly_expired
    }

    /// Returns `true` if `lanes` must render without yielding.
    pub(crate) fn renders_sync(&self, lanes: Lanes) -> bool {
        !lanes.is_time_sliced() || lanes.includes_any(self.expired_lanes)
    }

    /// Marks `lanes` as blocked on a dependency.
    pub(crate) fn mark_suspended(&mut self, lanes: Lanes) {
        self.suspended_lanes |= lanes;
        self.pinged_lanes = self.pinged_lanes.subtract(lanes);
        for lane in lanes.iter() {
            self.expiration_times.set(lane, None);
        }
    }

    /// Makes suspended `lanes` renderable again.
    pub(crate) fn mark_pinged(&mut self, lanes: Lanes) {
        self.pinged_lanes |= self.suspended_lanes & lanes;
    }

    /// Drops every lane not in `remaining` after a commit.
    pub(crate) fn mark_finished(&mut self, remaining: Lanes) {
        let finished = self.pending_lanes.subtract(remaining);
        self.pending_lanes = remaining;
        self.suspended_lanes = Lanes::NONE;
        self.pinged_lanes = Lanes::NONE;
        self.expired_lanes &= remaining;
        self.entangled_lanes &= remaining;
        for lane in finished.iter() {
            self.entanglements.set(lane, Lanes::NONE);
            self.expiration_times.set(lane, None);
        }
    }

    /// Binds `lanes` together so they are always rendered in one pass.
    pub(crate) fn entangle(&mut self, lanes: Lanes) {
        self.entangled_lanes |= lanes;
        for lane in self.entangled_lanes.iter() {
            if lane.includes_any(lanes) || self.entanglements.get(lane).includes_any(lanes) {
                let merged = self.entanglements.get(lane) | lanes;
                self.entanglements.set(lane, merged);
            }
        }
    }

    /// Claims the next rotating transition lane.
    pub(crate) fn claim_transition_lane(&mut self) -> Lanes {
        self.transition_cursor.claim()
    }

    /// Claims the next rotating retry lane.
    pub(crate) fn claim_retry_lane(&mut self) -> Lanes {
        self.retry_cursor.claim()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> RootCoordinator {
        RootCoordinator::new(
            RootId {
                idx: 0,
                generation: 0,
            },
            ContainerId(1),
        )
    }

    #[test]
    fn picks_highest_priority_group() {
        let mut r = root();
        assert_eq!(r.get_next_lanes(Lanes::NONE), Lanes::NONE);
        let t1 = r.claim_transition_lane();
        let t2 = r.claim_transition_lane();
        r.mark_updated(t1);
        r.mark_updated(t2);
        r.mark_updated(Lanes::IDLE);
        assert_eq!(r.get_next_lanes(Lanes::NONE), t1 | t2, "transitions batch");
        r.mark_updated(Lanes::DEFAULT);
        assert_eq!(r.get_next_lanes(Lanes::NONE), Lanes::DEFAULT);
    }

    #[test]
    fn in_progress_lanes_win_unless_outranked() {
        let mut r = root();
        let t = r.claim_transition_lane();
        r.mark_updated(t);
        r.mark_updated(Lanes::IDLE);
        assert_eq!(r.get_next_lanes(t), t);
        r.mark_updated(Lanes::SYNC);
        assert_eq!(r.get_next_lanes(t), Lanes::SYNC);
    }

    #[test]
    fn suspended_lanes_wait_for_a_ping() {
        let mut r = root();
        let t = r.claim_transition_lane();
        r.mark_updated(t);
        r.mark_suspended(t);
        assert_eq!(r.get_next_lanes(Lanes::NONE), Lanes::NONE);
        r.mark_pinged(t);
        assert_eq!(r.get_next_lanes(Lanes::NONE), t);
    }

    #[test]
    fn entangled_lanes_render_together() {
        let mut r = root();
        let t = r.claim_transition_lane();
        r.mark_updated(t);
        r.mark_updated(Lanes::SYNC);
        r.entangle(Lanes::SYNC | t);
        assert_eq!(r.get_next_lanes(Lanes::NONE), Lanes::SYNC | t);
        r.mark_finished(Lanes::NONE);
        assert_eq!(r.entangled_lanes, Lanes::NONE);
        assert_eq!(r.entanglements.get(Lanes::SYNC), Lanes::NONE);
    }

    #[test]
    fn entangling_an_in_flight_pass_restarts_it_with_the_group() {
        let mut r = root();
        let t1 = r.claim_transition_lane();
        let t2 = r.claim_transition_lane();
        r.mark_updated(t1);
        r.mark_updated(t2);
        assert_eq!(r.get_next_lanes(t1), t1, "unrelated lanes wait their turn");
        r.entangle(t1 | t2);
        assert_eq!(r.get_next_lanes(t1), t1 | t2);
        assert_eq!(r.get_next_lanes(t1 | t2), t1 | t2);
    }

    #[test]
    fn starved_lanes_expire_and_render_sync() {
        for config in [EngineConfig::testing(), EngineConfig::interactive()] {
            let mut r = root();
            let t = r.claim_transition_lane();
            r.mark_updated(t);
            assert_eq!(r.mark_starved(HostTime(0), &config), Lanes::NONE);
            assert!(!r.renders_sync(t));
            let deadline = config
                .expiration_time(t, HostTime(0))
                .unwrap_or(HostTime(u64::MAX));
            assert_eq!(r.mark_starved(deadline, &config), t);
            assert_eq!(r.mark_starved(deadline, &config), Lanes::NONE, "reported once");
            assert!(r.renders_sync(t));
        }
    }

    #[test]
    fn retry_lanes_never_expire_by_default() {
        let config = EngineConfig::testing();
        let mut r = root();
        let retry = r.claim_retry_lane();
        r.mark_updated(retry);
        r.mark_starved(HostTime(0), &config);
        assert_eq!(r.mark_starved(HostTime(u64::MAX), &config), Lanes::NONE);
    }

    #[test]
    fn finishing_keeps_remaining_lanes() {
        let mut r = root();
        r.mark_updated(Lanes::DEFAULT);
        r.mark_updated(Lanes::IDLE);
        r.mark_finished(Lanes::IDLE);
        assert_eq!(r.pending_lanes, Lanes::IDLE);
        assert_eq!(r.get_next_lanes(Lanes::NONE), Lanes::IDLE);
    }
}
