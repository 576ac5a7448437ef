// Copyright 2026 the Weft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! An in-memory [`HostAdapter`] that records every call.
//!
//! [`RecordingHost`] keeps a small instance tree per container so tests can
//! assert on what a user would see ([`RecordingHost::texts`],
//! [`RecordingHost::serialize`]) as well as on the exact sequence of host
//! operations ([`RecordingHost::ops`]).

use alloc::borrow::ToOwned;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Write as _;

use hashbrown::HashMap;
use weft_core::element::{Attrs, UpdatePayload};
use weft_core::error::HostError;
use weft_core::host::{ContainerId, HostAdapter, HostParent, InstanceId};

/// One recorded host call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostOp {
    /// `create_instance`.
    CreateInstance {
        /// The new instance.
        id: InstanceId,
        /// Its element type.
        ty: &'static str,
    },
    /// `create_text_instance`.
    CreateText {
        /// The new instance.
        id: InstanceId,
        /// Its initial content.
        text: String,
    },
    /// `append_initial_child`.
    AppendInitialChild {
        /// The detached parent.
        parent: InstanceId,
        /// The appended child.
        child: InstanceId,
    },
    /// `clear_container`.
    ClearContainer(ContainerId),
    /// `insert`.
    Insert {
        /// Where the child goes.
        parent: HostParent,
        /// The inserted instance.
        child: InstanceId,
        /// The sibling it was placed before, if any.
        before: Option<InstanceId>,
    },
    /// `remove`.
    Remove {
        /// The former parent.
        parent: HostParent,
        /// The removed instance.
        child: InstanceId,
    },
    /// `commit_update`.
    CommitUpdate {
        /// The updated instance.
        id: InstanceId,
        /// The attribute changes.
        payload: UpdatePayload,
    },
    /// `commit_text_update`.
    CommitTextUpdate {
        /// The updated instance.
        id: InstanceId,
        /// The new content.
        text: String,
    },
    /// `hide_instance`.
    Hide(InstanceId),
    /// `unhide_instance`.
    Unhide(InstanceId),
    /// `commit_mount`.
    CommitMount(InstanceId),
    /// `detach_deleted_instance`.
    Detach(InstanceId),
}

impl HostOp {
    /// Returns `true` for operations that change what is attached to a
    /// container or how it looks.
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::ClearContainer(_)
                | Self::Insert { .. }
                | Self::Remove { .. }
                | Self::CommitUpdate { .. }
                | Self::CommitTextUpdate { .. }
                | Self::Hide(_)
                | Self::Unhide(_)
        )
    }

    /// Returns `true` if the operation targets `instance`, as the created,
    /// moved or updated node.
    #[must_use]
    pub fn touches(&self, instance: InstanceId) -> bool {
        match self {
            Self::CreateInstance { id, .. }
            | Self::CreateText { id, .. }
            | Self::CommitUpdate { id, .. }
            | Self::CommitTextUpdate { id, .. } => *id == instance,
            Self::AppendInitialChild { child, .. }
            | Self::Insert { child, .. }
            | Self::Remove { child, .. } => *child == instance,
            Self::Hide(id) | Self::Unhide(id) | Self::CommitMount(id) | Self::Detach(id) => {
                *id == instance
            }
            Self::ClearContainer(_) => false,
        }
    }
}

/// Which host call fails next, for error-path tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailOn {
    /// The next `create_instance` or `create_text_instance`.
    Create,
    /// The next `insert`.
    Insert,
    /// The next `commit_update` or `commit_text_update`.
    Update,
}

#[derive(Clone, Debug)]
enum InstanceKind {
    Element { ty: &'static str, attrs: Attrs },
    Text(String),
}

#[derive(Clone, Debug)]
struct HostInstance {
    kind: InstanceKind,
    children: Vec<InstanceId>,
    hidden: bool,
}

/// A [`HostAdapter`] that keeps the host tree in memory and logs each call.
#[derive(Debug, Default)]
pub struct RecordingHost {
    ops: Vec<HostOp>,
    instances: HashMap<InstanceId, HostInstance>,
    containers: HashMap<ContainerId, Vec<InstanceId>>,
    next_id: u32,
    fail: Option<FailOn>,
}

impl RecordingHost {
    /// Creates an empty host.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call recorded since creation or the last
    /// [`take_ops`](Self::take_ops).
    #[must_use]
    pub fn ops(&self) -> &[HostOp] {
        &self.ops
    }

    /// Returns and clears the recorded calls.
    pub fn take_ops(&mut self) -> Vec<HostOp> {
        core::mem::take(&mut self.ops)
    }

    /// Number of recorded calls that are [mutations](HostOp::is_mutation).
    #[must_use]
    pub fn mutation_count(&self) -> usize {
        self.ops.iter().filter(|op| op.is_mutation()).count()
    }

    /// Makes the next matching call fail once.
    pub fn fail_next(&mut self, on: FailOn) {
        self.fail = Some(on);
    }

    /// Instances directly under `container`, in order.
    #[must_use]
    pub fn children(&self, container: ContainerId) -> &[InstanceId] {
        self.containers.get(&container).map_or(&[], Vec::as_slice)
    }

    /// Children of an instance, in order.
    #[must_use]
    pub fn instance_children(&self, instance: InstanceId) -> &[InstanceId] {
        self.instances
            .get(&instance)
            .map_or(&[], |i| i.children.as_slice())
    }

    /// The content of a text instance.
    #[must_use]
    pub fn text(&self, instance: InstanceId) -> Option<&str> {
        match &self.instances.get(&instance)?.kind {
            InstanceKind::Text(text) => Some(text),
            InstanceKind::Element { .. } => None,
        }
    }

    /// An attribute of an element instance.
    #[must_use]
    pub fn attr(&self, instance: InstanceId, name: &str) -> Option<String> {
        match &self.instances.get(&instance)?.kind {
            InstanceKind::Element { attrs, .. } => attrs.get(name).map(|v| alloc::format!("{v}")),
            InstanceKind::Text(_) => None,
        }
    }

    /// Returns `true` if the instance is currently hidden.
    #[must_use]
    pub fn is_hidden(&self, instance: InstanceId) -> bool {
        self.instances.get(&instance).is_some_and(|i| i.hidden)
    }

    /// Returns `true` while the instance exists (created and not detached).
    #[must_use]
    pub fn exists(&self, instance: InstanceId) -> bool {
        self.instances.contains_key(&instance)
    }

    /// Visible text instances under `container`, in document order.
    ///
    /// Hidden instances and their subtrees are skipped.
    #[must_use]
    pub fn texts(&self, container: ContainerId) -> Vec<String> {
        let mut out = Vec::new();
        for &child in self.children(container) {
            self.collect_texts(child, &mut out);
        }
        out
    }

    /// All visible text under `container`, concatenated.
    #[must_use]
    pub fn text_content(&self, container: ContainerId) -> String {
        self.texts(container).concat()
    }

    /// A compact rendering of the container, e.g.
    /// `<div id=1>"a"</div>"b"`. Hidden instances print as `(hidden)`.
    #[must_use]
    pub fn serialize(&self, container: ContainerId) -> String {
        let mut out = String::new();
        for &child in self.children(container) {
            self.write_instance(child, &mut out);
        }
        out
    }

    fn collect_texts(&self, id: InstanceId, out: &mut Vec<String>) {
        let Some(instance) = self.instances.get(&id) else {
            return;
        };
        if instance.hidden {
            return;
        }
        match &instance.kind {
            InstanceKind::Text(text) => out.push(text.clone()),
            InstanceKind::Element { .. } => {
                for &child in &instance.children {
                    self.collect_texts(child, out);
                }
            }
        }
    }

    fn write_instance(&self, id: InstanceId, out: &mut String) {
        let Some(instance) = self.instances.get(&id) else {
            return;
        };
        if instance.hidden {
            out.push_str("(hidden)");
            return;
        }
        match &instance.kind {
            InstanceKind::Text(text) => {
                _ = write!(out, "{text:?}");
            }
            InstanceKind::Element { ty, attrs } => {
                _ = write!(out, "<{ty}");
                for (name, value) in attrs.iter() {
                    _ = write!(out, " {name}={value}");
                }
                out.push('>');
                for &child in &instance.children {
                    self.write_instance(child, out);
                }
                _ = write!(out, "</{ty}>");
            }
        }
    }

    fn take_failure(&mut self, on: FailOn) -> Result<(), HostError> {
        if self.fail == Some(on) {
            self.fail = None;
            return Err(HostError::new(alloc::format!("injected {on:?} failure")));
        }
        Ok(())
    }

    fn allocate(&mut self, kind: InstanceKind) -> InstanceId {
        self.next_id += 1;
        let id = InstanceId(self.next_id);
        self.instances.insert(
            id,
            HostInstance {
                kind,
                children: Vec::new(),
                hidden: false,
            },
        );
        id
    }

    fn child_list(&mut self, parent: HostParent) -> Result<&mut Vec<InstanceId>, HostError> {
        match parent {
            HostParent::Container(container) => Ok(self.containers.entry(container).or_default()),
            HostParent::Instance(instance) => self
                .instances
                .get_mut(&instance)
                .map(|i| &mut i.children)
                .ok_or_else(|| HostError::new("unknown parent instance")),
        }
    }
}

impl HostAdapter for RecordingHost {
    fn create_instance(&mut self, ty: &'static str, attrs: &Attrs) -> Result<InstanceId, HostError> {
        self.take_failure(FailOn::Create)?;
        let id = self.allocate(InstanceKind::Element {
            ty,
            attrs: attrs.clone(),
        });
        self.ops.push(HostOp::CreateInstance { id, ty });
        Ok(id)
    }

    fn create_text_instance(&mut self, text: &str) -> Result<InstanceId, HostError> {
        self.take_failure(FailOn::Create)?;
        let id = self.allocate(InstanceKind::Text(text.to_owned()));
        self.ops.push(HostOp::CreateText {
            id,
            text: text.to_owned(),
        });
        Ok(id)
    }

    fn append_initial_child(
        &mut self,
        parent: InstanceId,
        child: InstanceId,
    ) -> Result<(), HostError> {
        self.child_list(HostParent::Instance(parent))?.push(child);
        self.ops.push(HostOp::AppendInitialChild { parent, child });
        Ok(())
    }

    fn clear_container(&mut self, container: ContainerId) -> Result<(), HostError> {
        self.containers.insert(container, Vec::new());
        self.ops.push(HostOp::ClearContainer(container));
        Ok(())
    }

    fn insert(
        &mut self,
        parent: HostParent,
        child: InstanceId,
        before: Option<InstanceId>,
    ) -> Result<(), HostError> {
        self.take_failure(FailOn::Insert)?;
        let list = self.child_list(parent)?;
        // Moving an attached child first detaches it.
        list.retain(|&c| c != child);
        let at = before
            .and_then(|b| list.iter().position(|&c| c == b))
            .unwrap_or(list.len());
        list.insert(at, child);
        self.ops.push(HostOp::Insert {
            parent,
            child,
            before,
        });
        Ok(())
    }

    fn remove(&mut self, parent: HostParent, child: InstanceId) -> Result<(), HostError> {
        let list = self.child_list(parent)?;
        let before = list.len();
        list.retain(|&c| c != child);
        if list.len() == before {
            return Err(HostError::new("removed instance is not a child"));
        }
        self.ops.push(HostOp::Remove { parent, child });
        Ok(())
    }

    fn commit_update(
        &mut self,
        instance: InstanceId,
        _ty: &'static str,
        payload: &UpdatePayload,
    ) -> Result<(), HostError> {
        self.take_failure(FailOn::Update)?;
        let node = self
            .instances
            .get_mut(&instance)
            .ok_or_else(|| HostError::new("unknown instance"))?;
        if let InstanceKind::Element { attrs, .. } = &mut node.kind {
            let mut next = Attrs::new();
            for (name, value) in attrs.iter() {
                if !payload.removed.contains(&name) {
                    next.set(name, value.clone());
                }
            }
            for (name, value) in &payload.set {
                next.set(name, value.clone());
            }
            *attrs = next;
        }
        self.ops.push(HostOp::CommitUpdate {
            id: instance,
            payload: payload.clone(),
        });
        Ok(())
    }

    fn commit_text_update(
        &mut self,
        instance: InstanceId,
        _old_text: &str,
        new_text: &str,
    ) -> Result<(), HostError> {
        self.take_failure(FailOn::Update)?;
        let node = self
            .instances
            .get_mut(&instance)
            .ok_or_else(|| HostError::new("unknown instance"))?;
        node.kind = InstanceKind::Text(new_text.to_owned());
        self.ops.push(HostOp::CommitTextUpdate {
            id: instance,
            text: new_text.to_owned(),
        });
        Ok(())
    }

    fn commit_mount(&mut self, instance: InstanceId, _ty: &'static str, _attrs: &Attrs) {
        self.ops.push(HostOp::CommitMount(instance));
    }

    fn hide_instance(&mut self, instance: InstanceId) -> Result<(), HostError> {
        if let Some(node) = self.instances.get_mut(&instance) {
            node.hidden = true;
        }
        self.ops.push(HostOp::Hide(instance));
        Ok(())
    }

    fn unhide_instance(&mut self, instance: InstanceId) -> Result<(), HostError> {
        if let Some(node) = self.instances.get_mut(&instance) {
            node.hidden = false;
        }
        self.ops.push(HostOp::Unhide(instance));
        Ok(())
    }

    fn detach_deleted_instance(&mut self, instance: InstanceId) {
        self.instances.remove(&instance);
        self.ops.push(HostOp::Detach(instance));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::element::Value;

    #[test]
    fn insert_before_orders_children() {
        let mut host = RecordingHost::new();
        let c = ContainerId(1);
        let a = host.create_text_instance("a").unwrap();
        let b = host.create_text_instance("b").unwrap();
        host.insert(HostParent::Container(c), b, None).unwrap();
        host.insert(HostParent::Container(c), a, Some(b)).unwrap();
        assert_eq!(host.texts(c), ["a", "b"]);
    }

    #[test]
    fn hidden_subtrees_are_not_visible() {
        let mut host = RecordingHost::new();
        let c = ContainerId(1);
        let div = host.create_instance("div", &Attrs::new()).unwrap();
        let t = host.create_text_instance("x").unwrap();
        host.append_initial_child(div, t).unwrap();
        host.insert(HostParent::Container(c), div, None).unwrap();
        assert_eq!(host.serialize(c), "<div>\"x\"</div>");
        host.hide_instance(div).unwrap();
        assert!(host.texts(c).is_empty());
        assert_eq!(host.serialize(c), "(hidden)");
    }

    #[test]
    fn update_payload_applies_set_and_removed() {
        let mut host = RecordingHost::new();
        let mut attrs = Attrs::new();
        attrs.set("a", Value::Int(1));
        attrs.set("b", Value::Int(2));
        let div = host.create_instance("div", &attrs).unwrap();
        let payload = UpdatePayload {
            set: alloc::vec![("a", Value::Int(5))],
            removed: alloc::vec!["b"],
        };
        host.commit_update(div, "div", &payload).unwrap();
        assert_eq!(host.attr(div, "a").as_deref(), Some("5"));
        assert_eq!(host.attr(div, "b"), None);
    }

    #[test]
    fn injected_failure_fires_once() {
        let mut host = RecordingHost::new();
        host.fail_next(FailOn::Create);
        assert!(host.create_text_instance("x").is_err());
        assert!(host.create_text_instance("x").is_ok());
        assert_eq!(host.ops().len(), 1);
    }
}
