// Copyright 2026 the Weft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Lane sets: bitset priorities for pending work.
//!
//! A *lane* is one bit of a [`Lanes`] value. Each bit belongs to a priority
//! class, and a lower bit index always means a higher priority:
//!
//! ```text
//!   bit  1        SYNC               discrete input, flush-sync
//!   bit  3        INPUT_CONTINUOUS   drags, scrolls
//!   bit  5        DEFAULT            ordinary updates
//!   bits 7..=21   TRANSITIONS        15 rotating transition lanes
//!   bits 22..=25  RETRIES            4 rotating suspense retry lanes
//!   bit  28       IDLE
//!   bit  29       OFFSCREEN
//! ```
//!
//! Transition and retry lanes rotate so that independent transitions can be
//! tracked (and entangled) separately. [`Lanes::highest_priority_lanes`]
//! batches all pending lanes of the same group together, which is how
//! concurrent transitions end up rendering in one pass.

use core::fmt;
use core::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};

use crate::host::SchedulerPriority;

/// Number of usable lane bits.
pub const TOTAL_LANES: usize = 31;

/// A set of lanes.
///
/// A single lane is represented as a `Lanes` value with exactly one bit set.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Lanes(pub u32);

impl Lanes {
    /// The empty set.
    pub const NONE: Self = Self(0);
    /// Highest priority: discrete input and [`flush_sync`] work.
    ///
    /// [`flush_sync`]: crate::reconciler::Reconciler::flush_sync
    pub const SYNC: Self = Self(0b0000_0000_0000_0000_0000_0000_0000_0010);
    /// Continuous input such as pointer moves.
    pub const INPUT_CONTINUOUS: Self = Self(0b0000_0000_0000_0000_0000_0000_0000_1000);
    /// Updates with no particular urgency.
    pub const DEFAULT: Self = Self(0b0000_0000_0000_0000_0000_0000_0010_0000);
    /// All transition lanes.
    pub const TRANSITIONS: Self = Self(0b0000_0000_0011_1111_1111_1111_1000_0000);
    /// The first transition lane.
    pub const TRANSITION_1: Self = Self(0b0000_0000_0000_0000_0000_0000_1000_0000);
    /// All suspense retry lanes.
    pub const RETRIES: Self = Self(0b0000_0011_1100_0000_0000_0000_0000_0000);
    /// The first retry lane.
    pub const RETRY_1: Self = Self(0b0000_0000_0100_0000_0000_0000_0000_0000);
    /// Work that can wait until nothing else is pending.
    pub const IDLE: Self = Self(0b0001_0000_0000_0000_0000_0000_0000_0000);
    /// Work deferred into hidden subtrees.
    pub const OFFSCREEN: Self = Self(0b0010_0000_0000_0000_0000_0000_0000_0000);
    /// Every lane below [`IDLE`](Self::IDLE).
    pub const NON_IDLE: Self = Self(0b0000_1111_1111_1111_1111_1111_1111_1111);
    /// Lanes that render without yielding to the host.
    pub const BLOCKING: Self = Self(Self::SYNC.0 | Self::INPUT_CONTINUOUS.0 | Self::DEFAULT.0);

    /// Returns `true` if no lane is set.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Set union.
    #[inline]
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Set intersection.
    #[inline]
    #[must_use]
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Removes every lane of `other` from `self`.
    #[inline]
    #[must_use]
    pub const fn subtract(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Returns `true` if `self` and `other` share at least one lane.
    #[inline]
    #[must_use]
    pub const fn includes_any(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Returns `true` if every lane of `self` is also in `other`.
    ///
    /// The empty set is a subset of everything.
    #[inline]
    #[must_use]
    pub const fn is_subset_of(self, other: Self) -> bool {
        self.0 & other.0 == self.0
    }

    /// Returns the single highest-priority lane, or [`NONE`](Self::NONE).
    #[inline]
    #[must_use]
    pub const fn highest_priority_lane(self) -> Self {
        Self(self.0 & self.0.wrapping_neg())
    }

    /// Returns the highest-priority subset of `self`.
    ///
    /// For transition and retry lanes, this is every pending lane of that
    /// group; for other classes it is the single highest lane.
    #[must_use]
    pub const fn highest_priority_lanes(self) -> Self {
        let lane = self.highest_priority_lane();
        if lane.includes_any(Self::TRANSITIONS) {
            self.intersection(Self::TRANSITIONS)
        } else if lane.includes_any(Self::RETRIES) {
            self.intersection(Self::RETRIES)
        } else {
            lane
        }
    }

    /// Returns `true` if `self` holds a lane of higher priority than every
    /// lane of `other`.
    #[inline]
    #[must_use]
    pub const fn is_higher_priority_than(self, other: Self) -> bool {
        if self.is_empty() {
            return false;
        }
        if other.is_empty() {
            return true;
        }
        self.highest_priority_lane().0 < other.highest_priority_lane().0
    }

    /// Index of the single highest-priority lane.
    ///
    /// Returns [`TOTAL_LANES`] for the empty set.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        if self.is_empty() {
            TOTAL_LANES
        } else {
            self.0.trailing_zeros() as usize
        }
    }

    /// Builds the single lane at `index`.
    #[inline]
    #[must_use]
    pub const fn from_index(index: usize) -> Self {
        if index >= TOTAL_LANES {
            Self::NONE
        } else {
            Self(1 << index)
        }
    }

    /// Returns `true` if rendering these lanes may yield to the host.
    ///
    /// Sync, continuous-input and default lanes always render to completion.
    #[inline]
    #[must_use]
    pub const fn is_time_sliced(self) -> bool {
        !self.includes_any(Self::BLOCKING)
    }

    /// Returns `true` if every lane is a transition, retry, idle or offscreen
    /// lane: work that may keep showing stale content instead of a fallback.
    #[inline]
    #[must_use]
    pub const fn is_deferrable(self) -> bool {
        !self.is_empty()
            && self.is_subset_of(
                Self::TRANSITIONS
                    .union(Self::RETRIES)
                    .union(Self::IDLE)
                    .union(Self::OFFSCREEN),
            )
    }

    /// The host scheduler priority that matches the highest lane.
    #[must_use]
    pub const fn scheduler_priority(self) -> SchedulerPriority {
        let lane = self.highest_priority_lane();
        if lane.is_empty() {
            SchedulerPriority::Idle
        } else if lane.0 <= Self::SYNC.0 {
            SchedulerPriority::Immediate
        } else if lane.0 <= Self::INPUT_CONTINUOUS.0 {
            SchedulerPriority::UserBlocking
        } else if lane.includes_any(Self::NON_IDLE) {
            SchedulerPriority::Normal
        } else {
            SchedulerPriority::Idle
        }
    }

    /// Iterates the individual lanes from highest to lowest priority.
    #[inline]
    pub fn iter(self) -> LaneIter {
        LaneIter { remaining: self.0 }
    }
}

impl BitOr for Lanes {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for Lanes {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Lanes {
    type Output = Self;

    #[inline]
    fn bitand(self, rhs: Self) -> Self {
        self.intersection(rhs)
    }
}

impl BitAndAssign for Lanes {
    #[inline]
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}

impl Not for Lanes {
    type Output = Self;

    #[inline]
    fn not(self) -> Self {
        Self(!self.0)
    }
}

impl fmt::Debug for Lanes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lanes({:#033b})", self.0)
    }
}

/// Iterator over the single lanes of a [`Lanes`] value.
#[derive(Clone, Debug)]
pub struct LaneIter {
    remaining: u32,
}

impl Iterator for LaneIter {
    type Item = Lanes;

    fn next(&mut self) -> Option<Lanes> {
        if self.remaining == 0 {
            return None;
        }
        let lane = self.remaining & self.remaining.wrapping_neg();
        self.remaining &= !lane;
        Some(Lanes(lane))
    }
}

/// Hands out rotating lanes within one group (transitions or retries).
#[derive(Clone, Copy, Debug)]
pub(crate) struct LaneCursor {
    group: Lanes,
    next: Lanes,
}

impl LaneCursor {
    pub(crate) const fn new(group: Lanes) -> Self {
        Self {
            group,
            next: group.highest_priority_lane(),
        }
    }

    /// Returns the next lane and advances, wrapping at the end of the group.
    pub(crate) fn claim(&mut self) -> Lanes {
        let lane = self.next;
        let shifted = Lanes(lane.0 << 1);
        self.next = if shifted.includes_any(self.group) {
            shifted
        } else {
            self.group.highest_priority_lane()
        };
        lane
    }
}

/// One value per lane.
#[derive(Clone, Debug)]
pub(crate) struct LaneMap<T> {
    slots: [T; TOTAL_LANES],
}

impl<T: Copy> LaneMap<T> {
    pub(crate) const fn new(init: T) -> Self {
        Self {
            slots: [init; TOTAL_LANES],
        }
    }

    /// Value for a single lane.
    pub(crate) fn get(&self, lane: Lanes) -> T {
        self.slots[lane.index().min(TOTAL_LANES - 1)]
    }

    pub(crate) fn set(&mut self, lane: Lanes, value: T) {
        let idx = lane.index();
        if idx < TOTAL_LANES {
            self.slots[idx] = value;
        }
    }
}
