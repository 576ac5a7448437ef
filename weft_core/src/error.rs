// Copyright 2026 the Weft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types.
//!
//! Suspension is not an error: it travels as
//! [`Render::Suspended`](crate::component::Render::Suspended) and is handled
//! by suspense boundaries. Everything else ends up in one of the types here.

use alloc::rc::Rc;
use core::fmt;

use crate::node::NodeId;
use crate::reconciler::RootId;

/// A failure reported by a [`HostAdapter`](crate::host::HostAdapter).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostError {
    message: Rc<str>,
}

impl HostError {
    /// Creates a host error with the given message.
    pub fn new(message: impl Into<Rc<str>>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host operation failed: {}", self.message)
    }
}

impl core::error::Error for HostError {}

/// A value a component failed with.
///
/// Returned inside [`Render::Failed`](crate::component::Render::Failed) and
/// handed to error boundaries.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ComponentError {
    message: Rc<str>,
}

impl ComponentError {
    /// Creates a component error with the given message.
    pub fn new(message: impl Into<Rc<str>>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ComponentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl core::error::Error for ComponentError {}

impl From<HostError> for ComponentError {
    fn from(err: HostError) -> Self {
        Self {
            message: err.message,
        }
    }
}

/// Errors returned by the [`Reconciler`](crate::reconciler::Reconciler)
/// entry points.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineError {
    /// A render error reached the root without meeting an error boundary.
    /// The root's content has been torn down.
    Uncaught(ComponentError),
    /// A host operation failed during commit and no error boundary recovered.
    /// The root's content has been torn down.
    Commit(HostError),
    /// The node handle no longer refers to a mounted node.
    StaleNode(NodeId),
    /// The root handle no longer refers to a mounted root.
    UnknownRoot(RootId),
    /// Synchronous commits kept scheduling more synchronous work.
    NestedUpdateLimit,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uncaught(err) => write!(f, "uncaught render error: {err}"),
            Self::Commit(err) => write!(f, "commit failed: {err}"),
            Self::StaleNode(id) => write!(f, "stale node handle {id:?}"),
            Self::UnknownRoot(id) => write!(f, "unknown root {id:?}"),
            Self::NestedUpdateLimit => {
                f.write_str("maximum nested synchronous update depth exceeded")
            }
        }
    }
}

impl core::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Uncaught(err) => Some(err),
            Self::Commit(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn display_includes_cause() {
        let err = EngineError::Commit(HostError::new("insert rejected"));
        assert_eq!(
            err.to_string(),
            "commit failed: host operation failed: insert rejected"
        );
        assert!(core::error::Error::source(&err).is_some());
    }

    #[test]
    fn host_errors_convert_to_component_errors() {
        let err = ComponentError::from(HostError::new("no such tag"));
        assert_eq!(err.message(), "no such tag");
    }
}
