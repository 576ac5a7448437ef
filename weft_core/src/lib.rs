// Copyright 2026 the Weft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Interruptible tree reconciliation with lane-based work scheduling.
//!
//! `weft_core` turns descriptions of a UI tree ([`Element`]s) into minimal
//! sequences of host operations. It is `no_std` compatible (with `alloc`)
//! and keeps both generations of the tree (committed and work-in-progress)
//! in one arena with generational handles.
//!
//! # Architecture
//!
//! ```text
//!   render / schedule_update
//!       │ (lane)
//!       ▼
//!   RootCoordinator::get_next_lanes ──► HostScheduler::schedule_callback
//!                                                │
//!                 ┌──────────────────────────────┘
//!                 ▼
//!   run_task ──► work loop: begin ─► reconcile children ─► complete
//!                   │         (yield between units when time-sliced)
//!                   ▼
//!   commit: before-mutation ─► mutation ─► layout ─► (passive, later)
//!                                 │
//!                                 ▼
//!                            HostAdapter
//! ```
//!
//! **[`lane`]**: Bitset priorities. Every update is tagged with one lane;
//! each pass renders a set of lanes.
//!
//! **[`reconciler`]**: The [`Reconciler`] entry points: roots, updates,
//! task execution, pings and unmounting.
//!
//! **[`element`]** and **[`component`]**: The element model, function and
//! class components, hooks, contexts, memo and lazy components.
//!
//! **[`host`]**: The [`HostAdapter`](host::HostAdapter) and
//! [`HostScheduler`](host::HostScheduler) contracts supplied by embedders.
//!
//! **[`config`]**: Expiration timeouts and recovery policy.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) trait and event types for
//! pass and commit instrumentation, with a zero-overhead
//! [`Tracer`](trace::Tracer) wrapper.
//!
//! # Crate features
//!
//! - `std` (disabled by default): Enables `std` support in dependencies.
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one branch
//!   per call site).
//! - `trace-rich` (disabled by default, implies `trace`): Adds per-unit begin
//!   and complete events.

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod component;
pub mod config;
pub mod element;
pub mod error;
pub mod host;
pub mod lane;
pub mod node;
pub mod reconciler;
pub mod time;
pub mod trace;
pub mod update_queue;

mod begin;
mod child;
mod commit;
mod complete;
mod root;
mod unwind;
mod work_loop;

#[cfg(test)]
mod testing;

pub use component::{Component, Render, RenderCx};
pub use element::{Element, Props, Value};
pub use error::EngineError;
pub use lane::Lanes;
pub use reconciler::{Reconciler, RootId, StateHandle, UpdatePriority};
pub use update_queue::Action;
