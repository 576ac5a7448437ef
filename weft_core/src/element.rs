// Copyright 2026 the Weft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Element descriptions: what the caller wants the tree to look like.
//!
//! An [`Element`] is an immutable description of one position in the
//! component tree: its [`ElementType`], an optional [`Key`], and its
//! [`Props`]. Components return lists of elements; the builder turns them
//! into work nodes.
//!
//! [`Props`] are reference counted. Two props values are *identical* when
//! they share the same allocation, and identity is what the builder uses to
//! decide whether a node received new input. Cloning an element keeps the
//! identity; every builder method (`with_*`) on an element that shares its
//! props creates a fresh allocation.

use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;

use crate::component::{
    ClassComponent, Component, ConsumerFn, Context, LazyComponent, MemoComponent,
};
use crate::host::{ContainerId, InstanceId};
use crate::node::WorkTag;
use crate::reconciler::StateHandle;

// ---------------------------------------------------------------------------
// Values and attributes
// ---------------------------------------------------------------------------

/// A dynamically typed prop, state, or context value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Value {
    /// No value.
    #[default]
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A shared string.
    Text(Rc<str>),
}

impl Value {
    /// Returns the string payload, if this is a [`Value::Text`].
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer payload, if this is a [`Value::Int`].
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the boolean payload, if this is a [`Value::Bool`].
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns `true` for [`Value::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(Rc::from(s))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// An explicit identity for an element among its siblings.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Key(Rc<str>);

impl Key {
    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self(Rc::from(s))
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Self(Rc::from(s))
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Self(Rc::from(alloc::format!("{i}")))
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({:?})", &*self.0)
    }
}

/// An ordered list of named attribute values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Attrs {
    entries: Vec<(&'static str, Value)>,
}

impl Attrs {
    /// Creates an empty attribute list.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Looks up an attribute by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v)
    }

    /// Sets an attribute, replacing any previous value with the same name.
    pub fn set(&mut self, name: &'static str, value: Value) {
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == name) {
            slot.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    /// Iterates `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Value)> + '_ {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Computes the changes needed to turn `old` into `self`.
    ///
    /// Returns `None` when nothing changed.
    #[must_use]
    pub fn diff(&self, old: &Self) -> Option<UpdatePayload> {
        let mut payload = UpdatePayload::default();
        for (name, value) in self.iter() {
            if old.get(name) != Some(value) {
                payload.set.push((name, value.clone()));
            }
        }
        for (name, _) in old.iter() {
            if self.get(name).is_none() {
                payload.removed.push(name);
            }
        }
        if payload.set.is_empty() && payload.removed.is_empty() {
            None
        } else {
            Some(payload)
        }
    }
}

/// Attribute changes for one host element, computed during completion and
/// applied during the mutation phase.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdatePayload {
    /// Attributes that were added or changed, with their new values.
    pub set: Vec<(&'static str, Value)>,
    /// Attributes that were removed.
    pub removed: Vec<&'static str>,
}

// ---------------------------------------------------------------------------
// Props
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct PropsData {
    attrs: Attrs,
    children: Vec<Element>,
    fallback: Vec<Element>,
}

/// The input of one element: attributes plus child elements.
#[derive(Clone, Default)]
pub struct Props(Rc<PropsData>);

impl Props {
    /// The attributes.
    #[must_use]
    pub fn attrs(&self) -> &Attrs {
        &self.0.attrs
    }

    /// Shorthand for `self.attrs().get(name)`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.attrs.get(name)
    }

    /// Child elements.
    #[must_use]
    pub fn children(&self) -> &[Element] {
        &self.0.children
    }

    /// Fallback elements of a suspense boundary.
    #[must_use]
    pub fn fallback(&self) -> &[Element] {
        &self.0.fallback
    }

    /// Returns `true` if both values share one allocation.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    /// Attribute equality plus identity of every child element.
    ///
    /// This is the default comparison used by [`MemoComponent`].
    #[must_use]
    pub fn shallow_eq(a: &Self, b: &Self) -> bool {
        if Self::ptr_eq(a, b) {
            return true;
        }
        a.0.attrs == b.0.attrs
            && a.0.children.len() == b.0.children.len()
            && a.0
                .children
                .iter()
                .zip(&b.0.children)
                .all(|(x, y)| Element::same_identity(x, y))
    }

    fn make_mut(&mut self) -> &mut PropsData {
        Rc::make_mut(&mut self.0)
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Props")
            .field("attrs", &self.0.attrs)
            .field("children", &self.0.children.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Refs
// ---------------------------------------------------------------------------

/// What a [`NodeRef`] points at once attached.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefTarget {
    /// A host instance.
    Instance(InstanceId),
    /// A scope node; see
    /// [`Reconciler::scope_instances`](crate::reconciler::Reconciler::scope_instances).
    Scope(StateHandle),
}

/// A shared slot the commit engine fills with a host instance or scope.
///
/// Attached during the layout phase, cleared during the mutation phase.
#[derive(Clone, Default)]
pub struct NodeRef(Rc<RefCell<Option<RefTarget>>>);

impl NodeRef {
    /// Creates an empty ref.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the attached target, if any.
    #[must_use]
    pub fn get(&self) -> Option<RefTarget> {
        *self.0.borrow()
    }

    pub(crate) fn set(&self, target: Option<RefTarget>) {
        *self.0.borrow_mut() = target;
    }

    pub(crate) fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeRef({:?})", self.get())
    }
}

// ---------------------------------------------------------------------------
// Element types
// ---------------------------------------------------------------------------

/// How a suspense list reveals its boundaries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RevealOrder {
    /// No boundary reveals its content until every boundary can.
    Together,
    /// Boundaries reveal first to last; none reveals before an earlier one.
    Forwards,
    /// Boundaries reveal last to first.
    Backwards,
}

impl RevealOrder {
    const ATTR: &'static str = "reveal_order";

    const fn as_str(self) -> &'static str {
        match self {
            Self::Together => "together",
            Self::Forwards => "forwards",
            Self::Backwards => "backwards",
        }
    }

    pub(crate) fn from_props(props: &Props) -> Self {
        match props.get(Self::ATTR).and_then(Value::as_text) {
            Some("together") => Self::Together,
            Some("backwards") => Self::Backwards,
            _ => Self::Forwards,
        }
    }
}

/// Visibility of an offscreen subtree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OffscreenMode {
    /// Children are rendered and shown.
    Visible,
    /// Children keep their host instances but are hidden and not re-rendered.
    Hidden,
}

impl OffscreenMode {
    const ATTR: &'static str = "mode";

    const fn as_str(self) -> &'static str {
        match self {
            Self::Visible => "visible",
            Self::Hidden => "hidden",
        }
    }

    pub(crate) fn from_props(props: &Props) -> Self {
        match props.get(Self::ATTR).and_then(Value::as_text) {
            Some("hidden") => Self::Hidden,
            _ => Self::Visible,
        }
    }
}

/// The kind of an element, and the component identity for user components.
#[derive(Clone)]
pub enum ElementType {
    /// A host element such as `"div"`.
    Host(&'static str),
    /// A host text node; the text is the `text` attribute.
    Text,
    /// A function component.
    Function(Component),
    /// A class component.
    Class(ClassComponent),
    /// Groups children without a node of its own in the host tree.
    Fragment,
    /// Provides a context value to its subtree.
    Provider(Context),
    /// Renders its children from the nearest provided context value.
    Consumer(Context, ConsumerFn),
    /// Shows a fallback while part of its subtree is not ready.
    Suspense,
    /// Coordinates the reveal order of sibling suspense boundaries.
    SuspenseList,
    /// Renders its children into another host container.
    Portal(ContainerId),
    /// A function component that skips rendering for equal props.
    Memo(MemoComponent),
    /// A component that is resolved asynchronously.
    Lazy(LazyComponent),
    /// A subtree that can be hidden while keeping its host instances.
    Offscreen,
    /// Provides a fresh cache handle to its subtree.
    Cache,
    /// A transparent grouping whose host instances can be queried.
    Scope,
}

impl ElementType {
    /// Returns `true` if a node of type `self` can be reused for `other`.
    #[must_use]
    pub fn same_type(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Host(a), Self::Host(b)) => a == b,
            (Self::Function(a), Self::Function(b)) => Component::ptr_eq(a, b),
            (Self::Class(a), Self::Class(b)) => ClassComponent::ptr_eq(a, b),
            (Self::Provider(a), Self::Provider(b)) | (Self::Consumer(a, _), Self::Consumer(b, _)) => {
                a.key() == b.key()
            }
            (Self::Portal(a), Self::Portal(b)) => a == b,
            (Self::Memo(a), Self::Memo(b)) => MemoComponent::ptr_eq(a, b),
            (Self::Lazy(a), Self::Lazy(b)) => LazyComponent::ptr_eq(a, b),
            (Self::Text, Self::Text)
            | (Self::Fragment, Self::Fragment)
            | (Self::Suspense, Self::Suspense)
            | (Self::SuspenseList, Self::SuspenseList)
            | (Self::Offscreen, Self::Offscreen)
            | (Self::Cache, Self::Cache)
            | (Self::Scope, Self::Scope) => true,
            _ => false,
        }
    }

    /// The work tag a node of this type gets.
    #[must_use]
    pub const fn tag(&self) -> WorkTag {
        match self {
            Self::Host(_) => WorkTag::HostElement,
            Self::Text => WorkTag::HostText,
            Self::Function(_) => WorkTag::Function,
            Self::Class(_) => WorkTag::Class,
            Self::Fragment => WorkTag::Fragment,
            Self::Provider(_) => WorkTag::Provider,
            Self::Consumer(..) => WorkTag::Consumer,
            Self::Suspense => WorkTag::Suspense,
            Self::SuspenseList => WorkTag::SuspenseList,
            Self::Portal(_) => WorkTag::Portal,
            Self::Memo(_) => WorkTag::Memo,
            Self::Lazy(_) => WorkTag::Lazy,
            Self::Offscreen => WorkTag::Offscreen,
            Self::Cache => WorkTag::Cache,
            Self::Scope => WorkTag::Scope,
        }
    }

    /// A short name for diagnostics.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Host(tag) => *tag,
            Self::Function(c) => c.name(),
            Self::Class(c) => c.name(),
            Self::Memo(m) => m.name(),
            Self::Lazy(_) => "lazy",
            Self::Provider(c) | Self::Consumer(c, _) => c.name(),
            _ => self.tag().as_str(),
        }
    }
}

impl fmt::Debug for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.tag(), self.name())
    }
}

// ---------------------------------------------------------------------------
// Element
// ---------------------------------------------------------------------------

/// One described position in the component tree.
#[derive(Clone)]
pub struct Element {
    pub(crate) ty: ElementType,
    pub(crate) key: Option<Key>,
    pub(crate) props: Props,
    pub(crate) node_ref: Option<NodeRef>,
}

impl Element {
    /// Creates an element of the given type with empty props.
    #[must_use]
    pub fn new(ty: ElementType) -> Self {
        Self {
            ty,
            key: None,
            props: Props::default(),
            node_ref: None,
        }
    }

    /// A host element.
    #[must_use]
    pub fn host(tag: &'static str) -> Self {
        Self::new(ElementType::Host(tag))
    }

    /// A host text node.
    #[must_use]
    pub fn text(text: impl Into<Value>) -> Self {
        Self::new(ElementType::Text).with_attr("text", text)
    }

    /// A function component.
    #[must_use]
    pub fn component(component: &Component) -> Self {
        Self::new(ElementType::Function(component.clone()))
    }

    /// A class component.
    #[must_use]
    pub fn class(component: &ClassComponent) -> Self {
        Self::new(ElementType::Class(component.clone()))
    }

    /// A fragment around `children`.
    #[must_use]
    pub fn fragment(children: impl IntoIterator<Item = Self>) -> Self {
        Self::new(ElementType::Fragment).with_children(children)
    }

    /// Provides `value` for `context` to the children.
    #[must_use]
    pub fn provider(context: &Context, value: impl Into<Value>) -> Self {
        Self::new(ElementType::Provider(context.clone())).with_attr("value", value)
    }

    /// Renders children from the nearest value of `context`.
    #[must_use]
    pub fn consumer(context: &Context, render: impl Fn(&Value) -> Vec<Self> + 'static) -> Self {
        Self::new(ElementType::Consumer(context.clone(), Rc::new(render)))
    }

    /// A suspense boundary showing `fallback` while its children are not
    /// ready.
    #[must_use]
    pub fn suspense(fallback: impl IntoIterator<Item = Self>) -> Self {
        let mut element = Self::new(ElementType::Suspense);
        element.props.make_mut().fallback = fallback.into_iter().collect();
        element
    }

    /// A suspense list with the given reveal order.
    #[must_use]
    pub fn suspense_list(order: RevealOrder) -> Self {
        Self::new(ElementType::SuspenseList).with_attr(RevealOrder::ATTR, order.as_str())
    }

    /// Renders its children into `container`.
    #[must_use]
    pub fn portal(container: ContainerId) -> Self {
        Self::new(ElementType::Portal(container))
    }

    /// A memoized function component.
    #[must_use]
    pub fn memo(component: &MemoComponent) -> Self {
        Self::new(ElementType::Memo(component.clone()))
    }

    /// A lazily resolved component.
    #[must_use]
    pub fn lazy(component: &LazyComponent) -> Self {
        Self::new(ElementType::Lazy(component.clone()))
    }

    /// An offscreen subtree in the given mode.
    #[must_use]
    pub fn offscreen(mode: OffscreenMode) -> Self {
        Self::new(ElementType::Offscreen).with_attr(OffscreenMode::ATTR, mode.as_str())
    }

    /// A cache boundary.
    #[must_use]
    pub fn cache() -> Self {
        Self::new(ElementType::Cache)
    }

    /// A scope.
    #[must_use]
    pub fn scope() -> Self {
        Self::new(ElementType::Scope)
    }

    /// Sets the key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Requests a ref to this element's host instance or scope.
    #[must_use]
    pub fn with_ref(mut self, node_ref: &NodeRef) -> Self {
        self.node_ref = Some(node_ref.clone());
        self
    }

    /// Sets an attribute.
    #[must_use]
    pub fn with_attr(mut self, name: &'static str, value: impl Into<Value>) -> Self {
        self.props.make_mut().attrs.set(name, value.into());
        self
    }

    /// Appends one child.
    #[must_use]
    pub fn with_child(mut self, child: Self) -> Self {
        self.props.make_mut().children.push(child);
        self
    }

    /// Appends several children.
    #[must_use]
    pub fn with_children(mut self, children: impl IntoIterator<Item = Self>) -> Self {
        self.props.make_mut().children.extend(children);
        self
    }

    /// The element type.
    #[must_use]
    pub fn element_type(&self) -> &ElementType {
        &self.ty
    }

    /// The key, if any.
    #[must_use]
    pub fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    /// The props.
    #[must_use]
    pub fn props(&self) -> &Props {
        &self.props
    }

    /// Same type, same key, identical props.
    #[must_use]
    pub fn same_identity(a: &Self, b: &Self) -> bool {
        a.key == b.key && a.ty.same_type(&b.ty) && Props::ptr_eq(&a.props, &b.props)
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("ty", &self.ty)
            .field("key", &self.key)
            .field("props", &self.props)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attr_diff_reports_changes_and_removals() {
        let mut old = Attrs::new();
        old.set("id", Value::from("a"));
        old.set("hidden", Value::from(true));
        let mut new = Attrs::new();
        new.set("id", Value::from("b"));
        new.set("title", Value::from("t"));

        let payload = new.diff(&old).expect("attributes changed");
        assert_eq!(
            payload.set,
            [("id", Value::from("b")), ("title", Value::from("t"))]
        );
        assert_eq!(payload.removed, ["hidden"]);
        assert!(new.diff(&new.clone()).is_none(), "no change, no payload");
    }

    #[test]
    fn builders_break_props_identity() {
        let a = Element::host("div").with_attr("id", 1);
        let b = a.clone();
        assert!(Element::same_identity(&a, &b));
        let c = b.with_attr("id", 1);
        assert!(!Props::ptr_eq(&a.props, &c.props));
        assert!(Props::shallow_eq(&a.props, &c.props));
    }

    #[test]
    fn same_type_ignores_payload_for_structural_kinds() {
        let hidden = Element::offscreen(OffscreenMode::Hidden);
        let visible = Element::offscreen(OffscreenMode::Visible);
        assert!(hidden.ty.same_type(&visible.ty));
        assert_eq!(OffscreenMode::from_props(&hidden.props), OffscreenMode::Hidden);
        assert!(!Element::host("div").ty.same_type(&Element::host("span").ty));
        assert!(!Element::text("x").ty.same_type(&Element::fragment([]).ty));
    }

    #[test]
    fn reveal_order_defaults_to_forwards() {
        let list = Element::suspense_list(RevealOrder::Together);
        assert_eq!(RevealOrder::from_props(&list.props), RevealOrder::Together);
        assert_eq!(
            RevealOrder::from_props(&Props::default()),
            RevealOrder::Forwards
        );
    }

    #[test]
    fn keys_from_integers() {
        assert_eq!(Key::from(7).as_str(), "7");
        assert_eq!(Key::from("a"), Key::from(String::from("a")));
    }
}
