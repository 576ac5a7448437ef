// Copyright 2026 the Weft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Component identities and the render-time context.
//!
//! Components never touch engine state directly. A function component is
//! called with a [`RenderCx`] that is scoped to the begin step of its node:
//! it reads state and context through the context (which records the reads
//! as dependencies), registers effects, and returns a [`Render`] outcome.
//!
//! ```text
//!   Render::Ready(children)   reconcile children
//!   Render::Suspended(w)      unwind to the nearest suspense boundary
//!   Render::Failed(err)       unwind to the nearest error boundary
//! ```
//!
//! Effects run later, in the layout or passive phase, and receive an
//! [`EffectCx`] through which they may schedule further updates.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::element::{Element, Props, Value};
use crate::error::ComponentError;
use crate::lane::Lanes;
use crate::reconciler::StateHandle;
use crate::update_queue::{Action, UpdateQueue};

static NEXT_ID: AtomicU32 = AtomicU32::new(1);

fn next_id() -> u32 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

// ---------------------------------------------------------------------------
// Render outcome
// ---------------------------------------------------------------------------

/// The result of invoking a component body.
#[derive(Clone, Debug)]
pub enum Render {
    /// The component produced these children.
    Ready(Vec<Element>),
    /// The component depends on something that is not available yet.
    Suspended(Wakeable),
    /// The component failed.
    Failed(ComponentError),
}

impl Render {
    /// No children.
    #[must_use]
    pub fn empty() -> Self {
        Self::Ready(Vec::new())
    }

    /// A single child.
    #[must_use]
    pub fn one(element: Element) -> Self {
        Self::Ready(alloc::vec![element])
    }
}

impl From<Element> for Render {
    fn from(element: Element) -> Self {
        Self::one(element)
    }
}

/// A pending asynchronous dependency.
///
/// Returned inside [`Render::Suspended`]. Once the dependency is available,
/// the host reports it with
/// [`Reconciler::ping`](crate::reconciler::Reconciler::ping).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Wakeable(u32);

impl Wakeable {
    /// Creates a new, unique dependency token.
    #[must_use]
    pub fn new() -> Self {
        Self(next_id())
    }

    /// The raw token value (for diagnostics only).
    #[must_use]
    pub const fn id(self) -> u32 {
        self.0
    }

    /// Rebuilds a token from [`id`](Self::id), as read back from a trace
    /// recording.
    #[must_use]
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }
}

impl Default for Wakeable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Wakeable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Wakeable(#{})", self.0)
    }
}

// ---------------------------------------------------------------------------
// Component identities
// ---------------------------------------------------------------------------

type RenderFn = dyn Fn(&mut RenderCx<'_>, &Props) -> Render;

/// A function component.
///
/// Identity is the allocation: clones of one `Component` are the same type,
/// two separately created components never are.
#[derive(Clone)]
pub struct Component {
    name: &'static str,
    render: Rc<RenderFn>,
}

impl Component {
    /// Creates a function component.
    pub fn new(
        name: &'static str,
        render: impl Fn(&mut RenderCx<'_>, &Props) -> Render + 'static,
    ) -> Self {
        Self {
            name,
            render: Rc::new(render),
        }
    }

    /// The component name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn render(&self, cx: &mut RenderCx<'_>, props: &Props) -> Render {
        (self.render)(cx, props)
    }

    pub(crate) fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.render, &b.render)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component({})", self.name)
    }
}

type ClassRenderFn = dyn Fn(&mut RenderCx<'_>, &Props, &Value) -> Render;
type LifecycleFn = dyn Fn(&mut EffectCx<'_>, &Value);
type UpdateLifecycleFn = dyn Fn(&mut EffectCx<'_>, &Value, Option<&Value>);

struct ClassSpec {
    name: &'static str,
    render: Rc<ClassRenderFn>,
    initial_state: Option<Rc<dyn Fn(&Props) -> Value>>,
    should_update: Option<Rc<dyn Fn(&Props, &Props, &Value, &Value) -> bool>>,
    snapshot: Option<Rc<dyn Fn(&Props, &Value) -> Value>>,
    did_mount: Option<Rc<LifecycleFn>>,
    did_update: Option<Rc<UpdateLifecycleFn>>,
    will_unmount: Option<Rc<dyn Fn(&Value)>>,
    catch: Option<Rc<dyn Fn(&ComponentError, &Value) -> Value>>,
    did_catch: Option<Rc<dyn Fn(&ComponentError)>>,
}

/// A stateful component with lifecycle callbacks.
///
/// A class with a [`catch`](ClassBuilder::catch) hook is an *error boundary*:
/// errors from its subtree are mapped to new state and the subtree is
/// rendered again from scratch.
#[derive(Clone)]
pub struct ClassComponent(Rc<ClassSpec>);

impl ClassComponent {
    /// Starts building a class component around its render function.
    pub fn builder(
        name: &'static str,
        render: impl Fn(&mut RenderCx<'_>, &Props, &Value) -> Render + 'static,
    ) -> ClassBuilder {
        ClassBuilder {
            spec: ClassSpec {
                name,
                render: Rc::new(render),
                initial_state: None,
                should_update: None,
                snapshot: None,
                did_mount: None,
                did_update: None,
                will_unmount: None,
                catch: None,
                did_catch: None,
            },
        }
    }

    /// The component name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.0.name
    }

    /// Returns `true` if this class catches errors from its subtree.
    #[must_use]
    pub fn is_error_boundary(&self) -> bool {
        self.0.catch.is_some()
    }

    pub(crate) fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    pub(crate) fn initial_state(&self, props: &Props) -> Value {
        self.0
            .initial_state
            .as_ref()
            .map_or(Value::Null, |init| init(props))
    }

    pub(crate) fn render(&self, cx: &mut RenderCx<'_>, props: &Props, state: &Value) -> Render {
        (self.0.render)(cx, props, state)
    }

    pub(crate) fn should_update(
        &self,
        old_props: &Props,
        new_props: &Props,
        old_state: &Value,
        new_state: &Value,
    ) -> bool {
        self.0
            .should_update
            .as_ref()
            .is_none_or(|f| f(old_props, new_props, old_state, new_state))
    }

    pub(crate) fn catch(&self, error: &ComponentError, state: &Value) -> Option<Value> {
        self.0.catch.as_ref().map(|f| f(error, state))
    }

    pub(crate) fn has_snapshot(&self) -> bool {
        self.0.snapshot.is_some()
    }

    pub(crate) fn snapshot(&self, props: &Props, state: &Value) -> Option<Value> {
        self.0.snapshot.as_ref().map(|f| f(props, state))
    }

    pub(crate) fn has_layout_callbacks(&self) -> bool {
        self.0.did_mount.is_some() || self.0.did_update.is_some() || self.0.did_catch.is_some()
    }

    pub(crate) fn did_mount(&self, cx: &mut EffectCx<'_>, state: &Value) {
        if let Some(f) = &self.0.did_mount {
            f(cx, state);
        }
    }

    pub(crate) fn did_update(&self, cx: &mut EffectCx<'_>, state: &Value, snapshot: Option<&Value>) {
        if let Some(f) = &self.0.did_update {
            f(cx, state, snapshot);
        }
    }

    pub(crate) fn did_catch(&self, error: &ComponentError) {
        if let Some(f) = &self.0.did_catch {
            f(error);
        }
    }

    pub(crate) fn will_unmount(&self, state: &Value) {
        if let Some(f) = &self.0.will_unmount {
            f(state);
        }
    }
}

impl fmt::Debug for ClassComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassComponent({})", self.0.name)
    }
}

/// Builder returned by [`ClassComponent::builder`].
pub struct ClassBuilder {
    spec: ClassSpec,
}

impl ClassBuilder {
    /// Initial state computed from the first props.
    #[must_use]
    pub fn initial_state(mut self, f: impl Fn(&Props) -> Value + 'static) -> Self {
        self.spec.initial_state = Some(Rc::new(f));
        self
    }

    /// Decides whether a props or state change re-renders.
    #[must_use]
    pub fn should_update(
        mut self,
        f: impl Fn(&Props, &Props, &Value, &Value) -> bool + 'static,
    ) -> Self {
        self.spec.should_update = Some(Rc::new(f));
        self
    }

    /// Captured in the before-mutation phase of an update and passed to
    /// [`did_update`](Self::did_update).
    #[must_use]
    pub fn snapshot(mut self, f: impl Fn(&Props, &Value) -> Value + 'static) -> Self {
        self.spec.snapshot = Some(Rc::new(f));
        self
    }

    /// Runs in the layout phase after the first commit.
    #[must_use]
    pub fn did_mount(mut self, f: impl Fn(&mut EffectCx<'_>, &Value) + 'static) -> Self {
        self.spec.did_mount = Some(Rc::new(f));
        self
    }

    /// Runs in the layout phase after every later commit that re-rendered
    /// the component.
    #[must_use]
    pub fn did_update(
        mut self,
        f: impl Fn(&mut EffectCx<'_>, &Value, Option<&Value>) + 'static,
    ) -> Self {
        self.spec.did_update = Some(Rc::new(f));
        self
    }

    /// Runs when the component is removed.
    #[must_use]
    pub fn will_unmount(mut self, f: impl Fn(&Value) + 'static) -> Self {
        self.spec.will_unmount = Some(Rc::new(f));
        self
    }

    /// Maps an error caught from the subtree to new state.
    #[must_use]
    pub fn catch(mut self, f: impl Fn(&ComponentError, &Value) -> Value + 'static) -> Self {
        self.spec.catch = Some(Rc::new(f));
        self
    }

    /// Observes a caught error in the layout phase.
    #[must_use]
    pub fn did_catch(mut self, f: impl Fn(&ComponentError) + 'static) -> Self {
        self.spec.did_catch = Some(Rc::new(f));
        self
    }

    /// Finishes the component.
    #[must_use]
    pub fn build(self) -> ClassComponent {
        ClassComponent(Rc::new(self.spec))
    }
}

impl fmt::Debug for ClassBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassBuilder")
            .field("name", &self.spec.name)
            .finish_non_exhaustive()
    }
}

struct MemoSpec {
    inner: Component,
    compare: Option<Rc<dyn Fn(&Props, &Props) -> bool>>,
}

/// A function component that skips rendering when its props compare equal.
#[derive(Clone)]
pub struct MemoComponent(Rc<MemoSpec>);

impl MemoComponent {
    /// Wraps `inner` using [`Props::shallow_eq`] as the comparison.
    #[must_use]
    pub fn new(inner: &Component) -> Self {
        Self(Rc::new(MemoSpec {
            inner: inner.clone(),
            compare: None,
        }))
    }

    /// Wraps `inner` with a custom props comparison.
    pub fn with_compare(
        inner: &Component,
        compare: impl Fn(&Props, &Props) -> bool + 'static,
    ) -> Self {
        Self(Rc::new(MemoSpec {
            inner: inner.clone(),
            compare: Some(Rc::new(compare)),
        }))
    }

    /// The name of the wrapped component.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.0.inner.name()
    }

    pub(crate) fn inner(&self) -> &Component {
        &self.0.inner
    }

    pub(crate) fn props_equal(&self, old: &Props, new: &Props) -> bool {
        match &self.0.compare {
            Some(compare) => compare(old, new),
            None => Props::shallow_eq(old, new),
        }
    }

    pub(crate) fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }
}

impl fmt::Debug for MemoComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemoComponent({})", self.name())
    }
}

enum LazyStatus {
    Pending,
    Resolved(Component),
    Rejected(ComponentError),
}

struct LazySpec {
    wakeable: Wakeable,
    status: RefCell<LazyStatus>,
}

/// A component whose implementation arrives later.
///
/// Rendering an unresolved lazy component suspends on its [`Wakeable`].
/// Resolve it, then [`ping`](crate::reconciler::Reconciler::ping) the
/// wakeable.
#[derive(Clone)]
pub struct LazyComponent(Rc<LazySpec>);

impl LazyComponent {
    /// Creates an unresolved lazy component.
    #[must_use]
    pub fn new() -> Self {
        Self(Rc::new(LazySpec {
            wakeable: Wakeable::new(),
            status: RefCell::new(LazyStatus::Pending),
        }))
    }

    /// The dependency rendering suspends on.
    #[must_use]
    pub fn wakeable(&self) -> Wakeable {
        self.0.wakeable
    }

    /// Supplies the implementation.
    pub fn resolve(&self, component: &Component) {
        *self.0.status.borrow_mut() = LazyStatus::Resolved(component.clone());
    }

    /// Marks loading as failed; rendering will fail with `error`.
    pub fn reject(&self, error: ComponentError) {
        *self.0.status.borrow_mut() = LazyStatus::Rejected(error);
    }

    pub(crate) fn poll(&self) -> Result<Component, Render> {
        match &*self.0.status.borrow() {
            LazyStatus::Pending => Err(Render::Suspended(self.0.wakeable)),
            LazyStatus::Resolved(c) => Ok(c.clone()),
            LazyStatus::Rejected(e) => Err(Render::Failed(e.clone())),
        }
    }

    pub(crate) fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }
}

impl Default for LazyComponent {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LazyComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LazyComponent({:?})", self.0.wakeable)
    }
}

/// The render function of a context consumer element.
pub type ConsumerFn = Rc<dyn Fn(&Value) -> Vec<Element>>;

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Identifies a value channel read through [`RenderCx::read_context`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum ContextKey {
    User(u32),
    Cache,
}

struct ContextDef {
    id: u32,
    name: &'static str,
    default: Value,
}

/// A context: a value provided by an ancestor and read by descendants.
#[derive(Clone)]
pub struct Context(Rc<ContextDef>);

impl Context {
    /// Creates a context with the value readers see when no provider is
    /// above them.
    pub fn new(name: &'static str, default: impl Into<Value>) -> Self {
        Self(Rc::new(ContextDef {
            id: next_id(),
            name,
            default: default.into(),
        }))
    }

    /// The context name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.0.name
    }

    pub(crate) fn key(&self) -> ContextKey {
        ContextKey::User(self.0.id)
    }

    pub(crate) fn default_value(&self) -> &Value {
        &self.0.default
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Context({})", self.0.name)
    }
}

/// A context read recorded on a node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ContextDependency {
    pub(crate) key: ContextKey,
    pub(crate) observed: Value,
}

#[derive(Clone, Debug)]
struct ContextFrame {
    key: ContextKey,
    value: Value,
    owner: u32,
}

/// Provided values visible at the node currently being rendered.
///
/// Providers push when they begin and pop when they complete, or when the
/// pass unwinds through them.
#[derive(Clone, Debug, Default)]
pub(crate) struct ContextStack {
    frames: Vec<ContextFrame>,
}

impl ContextStack {
    pub(crate) fn push(&mut self, key: ContextKey, value: Value, owner: u32) {
        self.frames.push(ContextFrame { key, value, owner });
    }

    /// Pops the frame pushed by `owner`, if it is on top.
    pub(crate) fn pop(&mut self, owner: u32) {
        if self.frames.last().is_some_and(|f| f.owner == owner) {
            self.frames.pop();
        }
    }

    pub(crate) fn read(&self, key: ContextKey) -> Option<&Value> {
        self.frames
            .iter()
            .rev()
            .find(|f| f.key == key)
            .map(|f| &f.value)
    }

    pub(crate) fn clear(&mut self) {
        self.frames.clear();
    }

    #[cfg(test)]
    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }
}

// ---------------------------------------------------------------------------
// Effects
// ---------------------------------------------------------------------------

/// Cleanup returned by an effect.
pub type Cleanup = Box<dyn FnOnce()>;

pub(crate) type EffectFn = dyn Fn(&mut EffectCx<'_>) -> Option<Cleanup>;

/// When an effect runs relative to the commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EffectKind {
    /// Synchronously after mutation, before the host paints.
    Layout,
    /// In a separate, lower-priority flush after the commit.
    Passive,
}

/// The cleanup slot of one effect, shared by both generations of its node.
#[derive(Default)]
pub(crate) struct EffectInstance {
    destroy: RefCell<Option<Cleanup>>,
}

impl EffectInstance {
    pub(crate) fn run_destroy(&self) {
        let destroy = self.destroy.borrow_mut().take();
        if let Some(destroy) = destroy {
            destroy();
        }
    }

    pub(crate) fn store(&self, cleanup: Option<Cleanup>) {
        *self.destroy.borrow_mut() = cleanup;
    }
}

impl fmt::Debug for EffectInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectInstance")
            .field("has_destroy", &self.destroy.borrow().is_some())
            .finish()
    }
}

/// One effect registered by a function component during render.
#[derive(Clone)]
pub(crate) struct EffectHook {
    pub(crate) kind: EffectKind,
    pub(crate) deps: Option<Value>,
    pub(crate) create: Rc<EffectFn>,
    pub(crate) inst: Rc<EffectInstance>,
    /// The effect must run in this commit.
    pub(crate) has_effect: bool,
}

impl fmt::Debug for EffectHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectHook")
            .field("kind", &self.kind)
            .field("deps", &self.deps)
            .field("has_effect", &self.has_effect)
            .finish_non_exhaustive()
    }
}

/// Context handed to effects and class lifecycle callbacks.
pub struct EffectCx<'a> {
    pub(crate) handle: StateHandle,
    pub(crate) updates: &'a mut Vec<(StateHandle, Action)>,
}

impl EffectCx<'_> {
    /// The node that registered the effect.
    #[must_use]
    pub fn handle(&self) -> StateHandle {
        self.handle
    }

    /// Schedules a state update once the current flush finishes.
    ///
    /// Updates from layout effects get the sync lane, updates from passive
    /// effects the default lane.
    pub fn set_state(&mut self, target: StateHandle, action: Action) {
        self.updates.push((target, action));
    }
}

impl fmt::Debug for EffectCx<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectCx")
            .field("handle", &self.handle)
            .field("queued", &self.updates.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// RenderCx
// ---------------------------------------------------------------------------

/// The queue state a function component saw while rendering.
#[derive(Debug, Default)]
pub(crate) struct HookOutput {
    pub(crate) state: Option<Value>,
    pub(crate) skipped_lanes: Lanes,
    pub(crate) state_changed: bool,
    pub(crate) dependencies: Vec<ContextDependency>,
    pub(crate) effects: Vec<EffectHook>,
}

/// Explicit render-time context, scoped to one node's begin step.
pub struct RenderCx<'a> {
    handle: StateHandle,
    render_lanes: Lanes,
    base_state: Option<Value>,
    queue: Option<&'a mut UpdateQueue>,
    current_queue: Option<&'a mut UpdateQueue>,
    contexts: &'a ContextStack,
    prev_effects: &'a [EffectHook],
    out: HookOutput,
}

impl<'a> RenderCx<'a> {
    pub(crate) fn new(
        handle: StateHandle,
        render_lanes: Lanes,
        base_state: Option<Value>,
        queue: Option<&'a mut UpdateQueue>,
        current_queue: Option<&'a mut UpdateQueue>,
        contexts: &'a ContextStack,
        prev_effects: &'a [EffectHook],
    ) -> Self {
        Self {
            handle,
            render_lanes,
            base_state,
            queue,
            current_queue,
            contexts,
            prev_effects,
            out: HookOutput::default(),
        }
    }

    /// The handle updates to this component are scheduled through.
    #[must_use]
    pub fn handle(&self) -> StateHandle {
        self.handle
    }

    /// The lanes of the pass rendering this component.
    #[must_use]
    pub fn render_lanes(&self) -> Lanes {
        self.render_lanes
    }

    /// Returns this component's state, initializing it with `init` on the
    /// first render. Pending updates for the rendered lanes are applied.
    pub fn use_state(&mut self, init: impl FnOnce() -> Value) -> Value {
        if let Some(state) = &self.out.state {
            return state.clone();
        }
        let base = self.base_state.take().unwrap_or_else(init);
        let state = match self.queue.as_deref_mut() {
            Some(queue) => {
                let processed = queue.process_value(
                    base.clone(),
                    self.current_queue.as_deref_mut(),
                    self.render_lanes,
                );
                self.out.skipped_lanes |= processed.skipped_lanes;
                self.out.state_changed = processed.state != base || processed.forced;
                processed.state
            }
            None => base,
        };
        self.out.state = Some(state.clone());
        state
    }

    /// Shorthand for `use_state(|| Value::Null)`.
    pub fn state(&mut self) -> Value {
        self.use_state(|| Value::Null)
    }

    /// Reads the nearest provided value of `context` and subscribes to it.
    pub fn read_context(&mut self, context: &Context) -> Value {
        let value = self
            .contexts
            .read(context.key())
            .unwrap_or_else(|| context.default_value())
            .clone();
        self.record_dependency(context.key(), &value);
        value
    }

    /// Reads the handle of the nearest cache boundary and subscribes to it.
    ///
    /// Returns [`Value::Null`] outside any cache boundary.
    pub fn cache(&mut self) -> Value {
        let value = self
            .contexts
            .read(ContextKey::Cache)
            .cloned()
            .unwrap_or_default();
        self.record_dependency(ContextKey::Cache, &value);
        value
    }

    /// Registers a passive effect.
    ///
    /// With `deps == None` the effect runs after every commit of this
    /// component; otherwise only when `deps` changed since the last commit.
    pub fn use_effect(
        &mut self,
        deps: Option<Value>,
        create: impl Fn(&mut EffectCx<'_>) -> Option<Cleanup> + 'static,
    ) {
        self.push_effect(EffectKind::Passive, deps, Rc::new(create));
    }

    /// Registers a layout effect, which runs synchronously after mutation.
    pub fn use_layout_effect(
        &mut self,
        deps: Option<Value>,
        create: impl Fn(&mut EffectCx<'_>) -> Option<Cleanup> + 'static,
    ) {
        self.push_effect(EffectKind::Layout, deps, Rc::new(create));
    }

    fn push_effect(&mut self, kind: EffectKind, deps: Option<Value>, create: Rc<EffectFn>) {
        let index = self.out.effects.len();
        let hook = match self.prev_effects.get(index) {
            Some(prev) if prev.kind == kind => {
                let unchanged = deps.is_some() && prev.deps == deps;
                EffectHook {
                    kind,
                    deps,
                    create,
                    inst: prev.inst.clone(),
                    has_effect: !unchanged,
                }
            }
            _ => EffectHook {
                kind,
                deps,
                create,
                inst: Rc::new(EffectInstance::default()),
                has_effect: true,
            },
        };
        self.out.effects.push(hook);
    }

    fn record_dependency(&mut self, key: ContextKey, value: &Value) {
        if !self.out.dependencies.iter().any(|d| d.key == key) {
            self.out.dependencies.push(ContextDependency {
                key,
                observed: value.clone(),
            });
        }
    }

    /// Processes the queue if the component never asked for its state.
    pub(crate) fn finish(mut self) -> HookOutput {
        if self.out.state.is_none() && (self.base_state.is_some() || self.has_pending_updates()) {
            self.state();
        }
        self.out
    }

    fn has_pending_updates(&self) -> bool {
        self.queue.as_deref().is_some_and(UpdateQueue::has_updates)
    }
}

impl fmt::Debug for RenderCx<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderCx")
            .field("handle", &self.handle)
            .field("render_lanes", &self.render_lanes)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_stack_shadows_and_pops_by_owner() {
        let ctx = Context::new("theme", "light");
        let mut stack = ContextStack::default();
        stack.push(ctx.key(), Value::from("dark"), 1);
        stack.push(ctx.key(), Value::from("blue"), 2);
        assert_eq!(stack.read(ctx.key()), Some(&Value::from("blue")));
        stack.pop(1);
        assert_eq!(stack.depth(), 2, "pop by a non-top owner is ignored");
        stack.pop(2);
        assert_eq!(stack.read(ctx.key()), Some(&Value::from("dark")));
        stack.pop(1);
        assert_eq!(stack.read(ctx.key()), None);
    }

    #[test]
    fn contexts_and_wakeables_are_unique() {
        let a = Context::new("a", Value::Null);
        let b = Context::new("a", Value::Null);
        assert_ne!(a.key(), b.key());
        assert_ne!(Wakeable::new(), Wakeable::new());
    }

    #[test]
    fn lazy_polls_through_its_lifecycle() {
        let lazy = LazyComponent::new();
        assert!(matches!(lazy.poll(), Err(Render::Suspended(w)) if w == lazy.wakeable()));
        let inner = Component::new("Inner", |_, _| Render::empty());
        lazy.resolve(&inner);
        assert!(lazy.poll().is_ok_and(|c| Component::ptr_eq(&c, &inner)));
        lazy.reject(ComponentError::new("load failed"));
        assert!(matches!(lazy.poll(), Err(Render::Failed(_))));
    }

    #[test]
    fn effect_instance_runs_destroy_once() {
        use core::cell::Cell;
        let count = Rc::new(Cell::new(0));
        let inst = EffectInstance::default();
        let c = count.clone();
        inst.store(Some(Box::new(move || c.set(c.get() + 1))));
        inst.run_destroy();
        inst.run_destroy();
        assert_eq!(count.get(), 1);
    }
}
