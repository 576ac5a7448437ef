// Copyright 2026 the Weft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Work node identity.

use core::fmt;

/// Sentinel value indicating "no node" in index fields.
pub(crate) const INVALID: u32 = u32::MAX;

/// A handle to a work node in a root's node arena.
///
/// Contains both a slot index and a generation counter so that stale handles
/// can be detected after the node is released and the slot is reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    /// Slot index into the arena.
    pub(crate) idx: u32,
    /// Generation counter; must match the arena's generation for this slot.
    pub(crate) generation: u32,
}

impl NodeId {
    /// Rebuilds a handle from its parts, as read back from a trace
    /// recording. Such handles are only meaningful for display.
    #[inline]
    #[must_use]
    pub const fn from_raw(index: u32, generation: u32) -> Self {
        Self {
            idx: index,
            generation,
        }
    }

    /// Returns the raw slot index (for diagnostics only).
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.idx
    }

    /// Returns the generation counter.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({}@gen{})", self.idx, self.generation)
    }
}
