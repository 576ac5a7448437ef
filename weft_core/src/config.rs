// Copyright 2026 the Weft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Policy constants for lane expiration and error recovery.
//!
//! Lane bit assignments are fixed (see [`Lanes`]); everything that is a
//! tuning decision lives in [`EngineConfig`] so hosts and tests can choose
//! their own values.

use crate::lane::Lanes;
use crate::time::{Duration, HostTime};

/// Tunable engine policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// How long a pending sync lane may wait before it is treated as expired.
    pub sync_timeout: Duration,
    /// Expiration delay for continuous-input lanes.
    pub input_timeout: Duration,
    /// Expiration delay for default lanes.
    pub default_timeout: Duration,
    /// Expiration delay for transition lanes.
    pub transition_timeout: Duration,
    /// Expiration delay for retry lanes; `None` means they never expire.
    pub retry_timeout: Option<Duration>,
    /// Expiration delay for idle and offscreen lanes; `None` means never.
    pub idle_timeout: Option<Duration>,
    /// Maximum number of back-to-back synchronous commits that each schedule
    /// more synchronous work before the engine gives up.
    pub nested_update_limit: u32,
    /// Retry a concurrent pass that ended in an uncaught error once,
    /// synchronously, before tearing the root down.
    pub recover_from_concurrent_errors: bool,
    /// Entangle transition updates that land in the same update queue, so
    /// they always commit together.
    pub entangle_transitions_per_queue: bool,
}

impl EngineConfig {
    /// Values suited to interactive hosts with a millisecond clock.
    #[must_use]
    pub const fn interactive() -> Self {
        Self {
            sync_timeout: Duration(250),
            input_timeout: Duration(250),
            default_timeout: Duration(5_000),
            transition_timeout: Duration(5_000),
            retry_timeout: None,
            idle_timeout: None,
            nested_update_limit: 50,
            recover_from_concurrent_errors: true,
            entangle_transitions_per_queue: true,
        }
    }

    /// Short timeouts that make starvation observable in a handful of ticks.
    #[must_use]
    pub const fn testing() -> Self {
        Self {
            sync_timeout: Duration(2),
            input_timeout: Duration(2),
            default_timeout: Duration(10),
            transition_timeout: Duration(10),
            retry_timeout: None,
            idle_timeout: None,
            nested_update_limit: 20,
            recover_from_concurrent_errors: true,
            entangle_transitions_per_queue: true,
        }
    }

    /// Timeout for a single lane, or `None` if the lane never expires.
    #[must_use]
    pub const fn timeout_for(&self, lane: Lanes) -> Option<Duration> {
        if lane.includes_any(Lanes::SYNC) {
            Some(self.sync_timeout)
        } else if lane.includes_any(Lanes::INPUT_CONTINUOUS) {
            Some(self.input_timeout)
        } else if lane.includes_any(Lanes::DEFAULT) {
            Some(self.default_timeout)
        } else if lane.includes_any(Lanes::TRANSITIONS) {
            Some(self.transition_timeout)
        } else if lane.includes_any(Lanes::RETRIES) {
            self.retry_timeout
        } else if lane.is_empty() {
            None
        } else {
            self.idle_timeout
        }
    }

    /// Expiration time for a lane that becomes pending at `now`.
    #[must_use]
    pub const fn expiration_time(&self, lane: Lanes, now: HostTime) -> Option<HostTime> {
        match self.timeout_for(lane) {
            Some(timeout) => Some(now.saturating_add(timeout)),
            None => None,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::interactive()
    }
}
