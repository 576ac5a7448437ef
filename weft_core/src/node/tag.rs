// Copyright 2026 the Weft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Node kinds and commit flags.

/// The kind of a work node.
///
/// The set is closed; the builder and the commit engine match on it
/// exhaustively.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WorkTag {
    /// The top of a root's tree.
    Root,
    /// A host element.
    HostElement,
    /// A host text node.
    HostText,
    /// A function component.
    Function,
    /// A class component.
    Class,
    /// A fragment.
    Fragment,
    /// A context provider.
    Provider,
    /// A context consumer.
    Consumer,
    /// A suspense boundary.
    Suspense,
    /// A suspense list.
    SuspenseList,
    /// A portal into another container.
    Portal,
    /// A memoized function component.
    Memo,
    /// A lazily resolved component.
    Lazy,
    /// A hideable subtree.
    Offscreen,
    /// A cache boundary.
    Cache,
    /// A scope.
    Scope,
}

impl WorkTag {
    /// A short lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::HostElement => "host",
            Self::HostText => "text",
            Self::Function => "function",
            Self::Class => "class",
            Self::Fragment => "fragment",
            Self::Provider => "provider",
            Self::Consumer => "consumer",
            Self::Suspense => "suspense",
            Self::SuspenseList => "suspense_list",
            Self::Portal => "portal",
            Self::Memo => "memo",
            Self::Lazy => "lazy",
            Self::Offscreen => "offscreen",
            Self::Cache => "cache",
            Self::Scope => "scope",
        }
    }

    /// Host elements and text nodes own a host instance.
    #[inline]
    #[must_use]
    pub const fn is_host(self) -> bool {
        matches!(self, Self::HostElement | Self::HostText)
    }

    /// Nodes whose children are inserted directly into a host parent.
    #[inline]
    #[must_use]
    pub const fn is_host_parent(self) -> bool {
        matches!(self, Self::HostElement | Self::Root | Self::Portal)
    }
}

bitflags::bitflags! {
    /// Side effects a node needs at commit, plus render-phase markers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub(crate) struct NodeFlags: u32 {
        /// Insert the node's host instances.
        const PLACEMENT = 1 << 0;
        /// Host attributes, effects, lifecycles or retry listeners.
        const UPDATE = 1 << 1;
        /// `deletions` holds children to remove.
        const CHILD_DELETION = 1 << 2;
        /// Detach the old ref and attach the new one.
        const REF = 1 << 3;
        /// An offscreen node changed visibility.
        const VISIBILITY = 1 << 4;
        /// Before-mutation work: class snapshots, clearing a container.
        const SNAPSHOT = 1 << 5;
        /// Passive effects to run.
        const PASSIVE = 1 << 6;
        /// Layout callbacks for caught errors or host mount notifications.
        const CALLBACK = 1 << 7;
        /// A boundary that must capture on unwind.
        const SHOULD_CAPTURE = 1 << 8;
        /// A boundary that captured in this pass.
        const DID_CAPTURE = 1 << 9;
        /// The component body ran in this pass.
        const PERFORMED_WORK = 1 << 10;

        const BEFORE_MUTATION_MASK = Self::SNAPSHOT.bits();
        const MUTATION_MASK = Self::PLACEMENT.bits()
            | Self::UPDATE.bits()
            | Self::CHILD_DELETION.bits()
            | Self::REF.bits()
            | Self::VISIBILITY.bits();
        const LAYOUT_MASK = Self::UPDATE.bits()
            | Self::CALLBACK.bits()
            | Self::REF.bits();
        const PASSIVE_MASK = Self::PASSIVE.bits();
    }
}
