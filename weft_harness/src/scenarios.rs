// Copyright 2026 the Weft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end behavior of the engine against the recording host and the
//! manual scheduler.

use alloc::boxed::Box;
use alloc::format;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::Cell;

use weft_core::component::{ClassComponent, Component, Context, LazyComponent, MemoComponent};
use weft_core::component::{Cleanup, Render, Wakeable};
use weft_core::config::EngineConfig;
use weft_core::element::{Element, NodeRef, OffscreenMode, RefTarget, RevealOrder, Value};
use weft_core::error::{ComponentError, EngineError};
use weft_core::host::{ContainerId, HostParent, HostScheduler, TaskStatus};
use weft_core::lane::Lanes;
use weft_core::reconciler::{Reconciler, RootId, StateHandle, UpdatePriority};
use weft_core::time::{Duration, HostTime};
use weft_core::trace::ErrorPhase;
use weft_core::update_queue::Action;

use crate::{
    Engine, FailOn, HostOp, ManualScheduler, PassTracker, RecordingHost, run_next,
    run_next_traced, run_until_idle, run_until_idle_traced,
};

const C: ContainerId = ContainerId(1);

type Slot = Rc<Cell<Option<StateHandle>>>;

fn engine() -> Engine {
    Reconciler::new(RecordingHost::new(), ManualScheduler::new(), EngineConfig::testing())
}

fn sliced(units: u32) -> Engine {
    Reconciler::new(
        RecordingHost::new(),
        ManualScheduler::with_slice(units),
        EngineConfig::testing(),
    )
}

fn mount(engine: &mut Engine, element: Element) -> RootId {
    let root = engine.create_root(C);
    engine
        .render(root, Some(element), UpdatePriority::Default)
        .unwrap();
    run_until_idle(engine).unwrap();
    root
}

fn slot() -> Slot {
    Rc::new(Cell::new(None))
}

fn handle(slot: &Slot) -> StateHandle {
    slot.get().expect("component has rendered")
}

fn increment() -> Action {
    Action::reduce(|v| Value::Int(v.as_int().unwrap_or(0) + 1))
}

fn append(suffix: &'static str) -> Action {
    Action::reduce(move |v| Value::from(format!("{v}{suffix}")))
}

/// Renders its integer state as text.
fn counter(name: &'static str, slot: &Slot) -> Component {
    let slot = slot.clone();
    Component::new(name, move |cx, _| {
        slot.set(Some(cx.handle()));
        let n = cx.use_state(|| Value::Int(0));
        Render::one(Element::text(format!("{name} {n}")))
    })
}

/// Renders `count` texts that all show the component's state.
fn slow(count: usize, slot: &Slot) -> Component {
    let slot = slot.clone();
    Component::new("Slow", move |cx, _| {
        slot.set(Some(cx.handle()));
        let n = cx.use_state(|| Value::Int(0));
        Render::Ready(
            (0..count)
                .map(|i| Element::text(format!("{i}:{n}")))
                .collect(),
        )
    })
}

/// Stand-in for data loaded from elsewhere.
struct Resource {
    ready: Cell<bool>,
    version: Cell<i64>,
    wakeable: Cell<Wakeable>,
}

impl Resource {
    fn new() -> Rc<Self> {
        Rc::new(Self {
            ready: Cell::new(false),
            version: Cell::new(1),
            wakeable: Cell::new(Wakeable::new()),
        })
    }

    fn read(&self) -> Result<i64, Wakeable> {
        if self.ready.get() {
            Ok(self.version.get())
        } else {
            Err(self.wakeable.get())
        }
    }

    /// Makes the data available and returns the wakeable to ping.
    fn resolve(&self) -> Wakeable {
        self.ready.set(true);
        self.wakeable.get()
    }

    /// Starts loading a newer version.
    fn invalidate(&self) {
        self.ready.set(false);
        self.version.set(self.version.get() + 1);
        self.wakeable.set(Wakeable::new());
    }
}

fn reader(name: &'static str, resource: &Rc<Resource>, slot: &Slot) -> Component {
    let resource = resource.clone();
    let slot = slot.clone();
    Component::new(name, move |cx, _| {
        slot.set(Some(cx.handle()));
        match resource.read() {
            Ok(v) => Render::one(Element::text(format!("{name} {v}"))),
            Err(w) => Render::Suspended(w),
        }
    })
}

/// An error boundary showing the caught message instead of its children.
fn boundary(caught: &Rc<Cell<u32>>) -> ClassComponent {
    let caught = caught.clone();
    ClassComponent::builder("Boundary", |_, props, state| match state.as_text() {
        Some(message) => Render::one(Element::text(format!("Error: {message}"))),
        None => Render::Ready(props.children().to_vec()),
    })
    .catch(|err, _| Value::from(err.message()))
    .did_catch(move |_| caught.set(caught.get() + 1))
    .build()
}

fn bomb() -> Component {
    Component::new("Bomb", |_, _| Render::Failed(ComponentError::new("boom")))
}

// ---------------------------------------------------------------------------
// Mounting and updating
// ---------------------------------------------------------------------------

#[test]
fn mounting_text_creates_and_inserts_once() {
    let mut engine = engine();
    mount(&mut engine, Element::text("hello"));

    let host = engine.host();
    assert_eq!(host.texts(C), ["hello"]);
    let creates = host
        .ops()
        .iter()
        .filter(|op| matches!(op, HostOp::CreateText { .. }))
        .count();
    let inserts = host
        .ops()
        .iter()
        .filter(|op| matches!(op, HostOp::Insert { .. }))
        .count();
    assert_eq!(creates, 1, "one text instance");
    assert_eq!(inserts, 1, "one insertion into the container");
    assert!(
        host.ops().contains(&HostOp::ClearContainer(C)),
        "first mount clears the container"
    );
    assert!(engine.scheduler().is_idle(), "nothing left to do");
}

#[test]
fn nested_hosts_are_assembled_before_insertion() {
    let mut engine = engine();
    mount(
        &mut engine,
        Element::host("div")
            .with_attr("id", 7)
            .with_child(Element::host("span").with_child(Element::text("a")))
            .with_child(Element::text("b")),
    );

    let host = engine.host();
    assert_eq!(host.serialize(C), r#"<div id=7><span>"a"</span>"b"</div>"#);
    let inserts: Vec<_> = host
        .ops()
        .iter()
        .filter(|op| matches!(op, HostOp::Insert { .. }))
        .collect();
    assert_eq!(inserts.len(), 1, "only the outermost instance is inserted");
}

#[test]
fn attribute_changes_are_committed_as_payloads() {
    let mut engine = engine();
    let root = mount(
        &mut engine,
        Element::host("div").with_attr("a", 1).with_attr("b", 2),
    );
    engine.host_mut().take_ops();

    engine
        .render(
            root,
            Some(Element::host("div").with_attr("a", 3)),
            UpdatePriority::Sync,
        )
        .unwrap();
    run_until_idle(&mut engine).unwrap();

    let host = engine.host();
    let div = host.children(C)[0];
    assert_eq!(host.attr(div, "a").as_deref(), Some("3"));
    assert_eq!(host.attr(div, "b"), None, "removed attribute");
    let ops = host.ops();
    assert_eq!(ops.len(), 1, "a single update: {ops:?}");
    assert!(matches!(ops[0], HostOp::CommitUpdate { id, .. } if id == div));
}

#[test]
fn keyed_children_are_moved_not_recreated() {
    let item = |k: &'static str| {
        Element::host("li")
            .with_key(k)
            .with_child(Element::text(k))
    };
    let mut engine = engine();
    let root = mount(
        &mut engine,
        Element::host("ul").with_children([item("a"), item("b"), item("c")]),
    );
    let ul = engine.host().children(C)[0];
    let before = engine.host().instance_children(ul).to_vec();
    engine.host_mut().take_ops();

    engine
        .render(
            root,
            Some(Element::host("ul").with_children([item("c"), item("a"), item("b")])),
            UpdatePriority::Sync,
        )
        .unwrap();
    run_until_idle(&mut engine).unwrap();

    let host = engine.host();
    assert_eq!(host.texts(C), ["c", "a", "b"]);
    assert_eq!(
        host.instance_children(ul),
        [before[2], before[0], before[1]],
        "instances are reused"
    );
    assert!(
        !host
            .ops()
            .iter()
            .any(|op| matches!(op, HostOp::CreateInstance { .. } | HostOp::CreateText { .. })),
        "nothing is created: {:?}",
        host.ops()
    );
}

#[test]
fn higher_priority_update_commits_first_and_order_is_preserved() {
    let s = slot();
    let log = Component::new("Log", {
        let s = s.clone();
        move |cx, _| {
            s.set(Some(cx.handle()));
            let text = cx.use_state(|| Value::from(""));
            Render::one(Element::text(text))
        }
    });
    let mut engine = engine();
    mount(&mut engine, Element::component(&log));
    let mut tracker = PassTracker::new();

    engine
        .schedule_update(handle(&s), append("B"), UpdatePriority::Default)
        .unwrap();
    engine
        .schedule_update(handle(&s), append("A"), UpdatePriority::Input)
        .unwrap();

    run_next_traced(&mut engine, &mut tracker).unwrap();
    assert_eq!(engine.host().texts(C), ["A"], "input lane renders alone");
    assert_eq!(tracker.committed_lanes(), [Lanes::INPUT_CONTINUOUS]);

    run_until_idle_traced(&mut engine, &mut tracker).unwrap();
    assert_eq!(
        engine.host().texts(C),
        ["BA"],
        "the skipped update is rebased in insertion order"
    );
    assert_eq!(
        tracker.committed_lanes(),
        [Lanes::INPUT_CONTINUOUS, Lanes::DEFAULT]
    );
}

#[test]
fn sync_update_preempts_a_queued_default_update() {
    let a = slot();
    let b = slot();
    let mut engine = engine();
    mount(
        &mut engine,
        Element::fragment([
            Element::component(&counter("A", &a)),
            Element::component(&counter("B", &b)),
        ]),
    );
    let mut tracker = PassTracker::new();

    engine
        .schedule_update(handle(&a), increment(), UpdatePriority::Default)
        .unwrap();
    engine
        .schedule_update(handle(&b), increment(), UpdatePriority::Sync)
        .unwrap();
    run_until_idle_traced(&mut engine, &mut tracker).unwrap();

    assert_eq!(tracker.committed_lanes()[0], Lanes::SYNC);
    assert_eq!(engine.host().texts(C), ["A 1", "B 1"]);
}

#[test]
fn unaffected_siblings_are_not_rendered_or_touched() {
    let s = slot();
    let sibling_renders = Rc::new(Cell::new(0_u32));
    let sibling = Component::new("Sibling", {
        let renders = sibling_renders.clone();
        move |_, _| {
            renders.set(renders.get() + 1);
            Render::one(Element::text("static"))
        }
    });
    let mut engine = engine();
    mount(
        &mut engine,
        Element::host("div").with_children([
            Element::component(&counter("Counter", &s)),
            Element::component(&sibling),
        ]),
    );
    let div = engine.host().children(C)[0];
    let [count_text, sibling_text] = engine.host().instance_children(div) else {
        panic!("two children expected");
    };
    let (count_text, sibling_text) = (*count_text, *sibling_text);
    engine.host_mut().take_ops();

    engine
        .schedule_update(handle(&s), increment(), UpdatePriority::Sync)
        .unwrap();
    run_until_idle(&mut engine).unwrap();

    assert_eq!(sibling_renders.get(), 1, "sibling bailed out");
    let ops = engine.host().ops();
    assert!(!ops.iter().any(|op| op.touches(sibling_text)), "{ops:?}");
    assert_eq!(
        ops,
        [HostOp::CommitTextUpdate {
            id: count_text,
            text: "Counter 1".into(),
        }]
    );
}

#[test]
fn identical_input_produces_no_host_operations() {
    let element = Element::host("p").with_child(Element::text("same"));
    let mut engine = engine();
    let root = mount(&mut engine, element.clone());
    engine.host_mut().take_ops();

    engine
        .render(root, Some(element), UpdatePriority::Sync)
        .unwrap();
    run_until_idle(&mut engine).unwrap();
    assert!(engine.host().ops().is_empty(), "same element");

    let s = slot();
    let fresh = Component::new("Fresh", {
        let s = s.clone();
        move |cx, _| {
            s.set(Some(cx.handle()));
            Render::one(
                Element::host("span")
                    .with_attr("a", 1)
                    .with_child(Element::text("x")),
            )
        }
    });
    engine
        .render(root, Some(Element::component(&fresh)), UpdatePriority::Sync)
        .unwrap();
    run_until_idle(&mut engine).unwrap();
    engine.host_mut().take_ops();

    engine
        .schedule_update(handle(&s), Action::ForceUpdate, UpdatePriority::Sync)
        .unwrap();
    run_until_idle(&mut engine).unwrap();
    assert!(
        engine.host().ops().is_empty(),
        "equal output of a forced render: {:?}",
        engine.host().ops()
    );
}

// ---------------------------------------------------------------------------
// Time slicing, interruption and starvation
// ---------------------------------------------------------------------------

#[test]
fn sync_update_interrupts_a_yielded_transition() {
    let slow_slot = slot();
    let fast_slot = slot();
    let mut engine = sliced(2);
    let root = mount(
        &mut engine,
        Element::host("div").with_children([
            Element::component(&slow(10, &slow_slot)),
            Element::component(&counter("Fast", &fast_slot)),
        ]),
    );
    let mut tracker = PassTracker::new();

    let t = engine
        .schedule_update(handle(&slow_slot), increment(), UpdatePriority::Transition)
        .unwrap();
    assert!(t.includes_any(Lanes::TRANSITIONS));
    let status = run_next_traced(&mut engine, &mut tracker).unwrap();
    assert_eq!(status, Some(TaskStatus::Continue), "transition yielded");
    assert!(engine.is_rendering(root));

    engine
        .schedule_update(handle(&fast_slot), increment(), UpdatePriority::Sync)
        .unwrap();
    run_until_idle_traced(&mut engine, &mut tracker).unwrap();

    assert_eq!(tracker.committed_lanes(), [Lanes::SYNC, t]);
    let interruptions = tracker.interruptions();
    assert_eq!(interruptions.len(), 1);
    assert_eq!(interruptions[0].discarded, t);
    assert_eq!(interruptions[0].next, Lanes::SYNC);
    assert_eq!(tracker.fresh_passes(), [t, Lanes::SYNC, t], "restarted");
    assert!(tracker.report().yields >= 2, "{:?}", tracker.report());

    let texts = engine.host().texts(C);
    assert_eq!(texts.len(), 11);
    assert!(texts[..10].iter().all(|s| s.ends_with(":1")), "{texts:?}");
    assert_eq!(texts[10], "Fast 1");
}

#[test]
fn entangled_lanes_commit_in_one_pass() {
    let slow_slot = slot();
    let fast_slot = slot();
    let mut engine = sliced(2);
    let root = mount(
        &mut engine,
        Element::fragment([
            Element::component(&slow(6, &slow_slot)),
            Element::component(&counter("Fast", &fast_slot)),
        ]),
    );
    let mut tracker = PassTracker::new();

    let t = engine
        .schedule_update(handle(&slow_slot), increment(), UpdatePriority::Transition)
        .unwrap();
    run_next_traced(&mut engine, &mut tracker).unwrap();
    engine
        .schedule_update(handle(&fast_slot), increment(), UpdatePriority::Sync)
        .unwrap();
    engine.entangle(root, Lanes::SYNC | t).unwrap();
    run_until_idle_traced(&mut engine, &mut tracker).unwrap();

    assert_eq!(tracker.committed_lanes(), [Lanes::SYNC | t]);
    assert_eq!(tracker.fresh_passes(), [t, Lanes::SYNC | t]);
    assert_eq!(engine.pending_lanes(root).unwrap(), Lanes::NONE);
}

#[test]
fn lanes_entangled_with_a_yielded_pass_join_it() {
    let slow_slot = slot();
    let fast_slot = slot();
    let mut engine = sliced(2);
    let root = mount(
        &mut engine,
        Element::fragment([
            Element::component(&slow(6, &slow_slot)),
            Element::component(&counter("Fast", &fast_slot)),
        ]),
    );
    let mut tracker = PassTracker::new();

    let t1 = engine
        .schedule_update(handle(&slow_slot), increment(), UpdatePriority::Transition)
        .unwrap();
    let status = run_next_traced(&mut engine, &mut tracker).unwrap();
    assert_eq!(status, Some(TaskStatus::Continue), "transition yielded");

    let t2 = engine.request_transition_lane(root).unwrap();
    assert_ne!(t1, t2);
    engine
        .schedule_update(handle(&fast_slot), increment(), UpdatePriority::Explicit(t2))
        .unwrap();
    engine.entangle(root, t1 | t2).unwrap();
    run_until_idle_traced(&mut engine, &mut tracker).unwrap();

    assert_eq!(tracker.committed_lanes(), [t1 | t2], "never a part of the group");
    assert_eq!(tracker.fresh_passes(), [t1, t1 | t2]);
    assert_eq!(engine.pending_lanes(root).unwrap(), Lanes::NONE);
    let texts = engine.host().texts(C);
    assert!(texts[..6].iter().all(|s| s.ends_with(":1")), "{texts:?}");
    assert_eq!(texts[6], "Fast 1");
}

#[test]
fn readers_of_one_value_never_disagree_between_slices() {
    let ctx = Context::new("value", 0);
    let app_slot = slot();
    let reader = Component::new("Reader", {
        let ctx = ctx.clone();
        move |cx, _| Render::one(Element::text(cx.read_context(&ctx)))
    });
    let app = Component::new("App", {
        let app_slot = app_slot.clone();
        let reader = reader.clone();
        let ctx = ctx.clone();
        move |cx, _| {
            app_slot.set(Some(cx.handle()));
            let v = cx.use_state(|| Value::Int(0));
            Render::one(
                Element::provider(&ctx, v)
                    .with_child(Element::host("div").with_children(
                        (0..5).map(|_| Element::component(&reader)),
                    )),
            )
        }
    });
    let mut engine = sliced(1);
    mount(&mut engine, Element::component(&app));
    let mut tracker = PassTracker::new();

    engine
        .schedule_update(handle(&app_slot), increment(), UpdatePriority::Transition)
        .unwrap();
    loop {
        let ran = run_next_traced(&mut engine, &mut tracker).unwrap();
        let texts = engine.host().texts(C);
        assert_eq!(texts.len(), 5);
        assert!(texts.iter().all(|t| *t == texts[0]), "tearing: {texts:?}");
        if ran.is_none() {
            break;
        }
    }
    assert_eq!(engine.host().texts(C)[0], "1");
    assert!(tracker.report().yields > 0, "the pass was sliced");
}

#[test]
fn starved_transition_finishes_within_its_timeout() {
    let slow_slot = slot();
    let tick_slot = slot();
    let config = EngineConfig::testing();
    let mut engine = sliced(1);
    mount(
        &mut engine,
        Element::fragment([
            Element::component(&slow(30, &slow_slot)),
            Element::component(&counter("Ticker", &tick_slot)),
        ]),
    );
    let mut tracker = PassTracker::new();

    let t = engine
        .schedule_update(handle(&slow_slot), increment(), UpdatePriority::Transition)
        .unwrap();
    let committed = |tracker: &PassTracker| tracker.committed_lanes().iter().any(|l| l.includes_any(t));
    for _ in 0..50 {
        run_next_traced(&mut engine, &mut tracker).unwrap();
        if committed(&tracker) {
            break;
        }
        engine.scheduler_mut().advance(Duration(1));
        engine
            .schedule_update(handle(&tick_slot), increment(), UpdatePriority::Input)
            .unwrap();
        run_next_traced(&mut engine, &mut tracker).unwrap();
        if committed(&tracker) {
            break;
        }
    }

    assert!(committed(&tracker), "transition never committed");
    let deadline = HostTime(0).saturating_add(config.transition_timeout.saturating_add(Duration(2)));
    assert!(
        engine.scheduler().now() <= deadline,
        "committed at {:?}",
        engine.scheduler().now()
    );
    assert!(
        tracker.starvations().iter().any(|s| s.lanes.includes_any(t)),
        "{:?}",
        tracker.starvations()
    );
    assert!(engine.host().texts(C)[0].ends_with(":1"));
}

// ---------------------------------------------------------------------------
// Suspense
// ---------------------------------------------------------------------------

#[test]
fn fallback_is_replaced_once_the_data_arrives() {
    let resource = Resource::new();
    let s = slot();
    let data = reader("Data", &resource, &s);
    let mut engine = engine();
    let mut tracker = PassTracker::new();
    let root = engine.create_root(C);
    engine
        .render(
            root,
            Some(
                Element::suspense([Element::text("Loading")])
                    .with_child(Element::component(&data)),
            ),
            UpdatePriority::Default,
        )
        .unwrap();
    run_until_idle_traced(&mut engine, &mut tracker).unwrap();

    assert_eq!(engine.host().texts(C), ["Loading"]);
    assert_eq!(tracker.suspends().len(), 1);
    assert!(!tracker.suspends()[0].delayed, "nothing to keep on screen");
    let loading = engine.host().children(C)[0];

    let w = resource.resolve();
    engine.ping_traced(root, w, &mut tracker).unwrap();
    run_until_idle_traced(&mut engine, &mut tracker).unwrap();

    assert_eq!(engine.host().texts(C), ["Data 1"]);
    assert!(!engine.host().exists(loading), "fallback was deleted");
    assert!(tracker.pings().iter().any(|p| p.retry), "boundary retried");

    // A transition that suspends keeps the current content instead.
    resource.invalidate();
    tracker.clear();
    engine
        .schedule_update(handle(&s), Action::ForceUpdate, UpdatePriority::Transition)
        .unwrap();
    run_until_idle_traced(&mut engine, &mut tracker).unwrap();

    assert_eq!(engine.host().texts(C), ["Data 1"], "stale content stays");
    assert_eq!(tracker.report().commits, 0);
    assert_eq!(tracker.report().suspended_passes, 1);
    assert!(tracker.suspends()[0].delayed);
    assert!(engine.scheduler().is_idle(), "waiting for a ping");

    let w = resource.resolve();
    engine.ping(root, w).unwrap();
    run_until_idle_traced(&mut engine, &mut tracker).unwrap();
    assert_eq!(engine.host().texts(C), ["Data 2"]);
    assert_eq!(tracker.report().commits, 1);
}

#[test]
fn suspending_without_a_boundary_in_a_sync_pass_is_an_error() {
    let resource = Resource::new();
    let data = reader("Data", &resource, &slot());
    let mut engine = engine();
    let root = engine.create_root(C);
    engine
        .render(root, Some(Element::component(&data)), UpdatePriority::Sync)
        .unwrap();

    let err = run_until_idle(&mut engine).unwrap_err();
    assert!(matches!(err, EngineError::Uncaught(_)), "{err:?}");
    assert_eq!(engine.root_error(root), Some(&err));
}

#[test]
fn together_list_reveals_rows_at_once() {
    let first = Resource::new();
    let second = Resource::new();
    first.resolve();
    let row = |name: &'static str, resource: &Rc<Resource>| {
        Element::suspense([Element::text(format!("{name}..."))])
            .with_child(Element::component(&reader(name, resource, &slot())))
    };
    let mut engine = engine();
    let root = mount(
        &mut engine,
        Element::suspense_list(RevealOrder::Together)
            .with_children([row("First", &first), row("Second", &second)]),
    );
    assert_eq!(
        engine.host().texts(C),
        ["First...", "Second..."],
        "a ready row waits for the others"
    );

    let w = second.resolve();
    engine.ping(root, w).unwrap();
    run_until_idle(&mut engine).unwrap();
    assert_eq!(engine.host().texts(C), ["First 1", "Second 1"]);
}

#[test]
fn lazy_component_renders_after_resolution() {
    let lazy = LazyComponent::new();
    let mut engine = engine();
    let root = mount(
        &mut engine,
        Element::suspense([Element::text("...")]).with_child(Element::lazy(&lazy)),
    );
    assert_eq!(engine.host().texts(C), ["..."]);

    lazy.resolve(&Component::new("Loaded", |_, _| {
        Render::one(Element::text("loaded"))
    }));
    engine.ping(root, lazy.wakeable()).unwrap();
    run_until_idle(&mut engine).unwrap();
    assert_eq!(engine.host().texts(C), ["loaded"]);
}

#[test]
fn hidden_offscreen_keeps_instances() {
    let mut engine = engine();
    let shown = |mode| Element::offscreen(mode).with_child(Element::text("panel"));
    let root = mount(&mut engine, shown(OffscreenMode::Visible));
    let panel = engine.host().children(C)[0];

    engine
        .render(root, Some(shown(OffscreenMode::Hidden)), UpdatePriority::Sync)
        .unwrap();
    run_until_idle(&mut engine).unwrap();
    assert!(engine.host().is_hidden(panel));
    assert!(engine.host().texts(C).is_empty());

    engine
        .render(root, Some(shown(OffscreenMode::Visible)), UpdatePriority::Sync)
        .unwrap();
    run_until_idle(&mut engine).unwrap();
    assert!(!engine.host().is_hidden(panel), "same instance shown again");
    assert_eq!(engine.host().texts(C), ["panel"]);
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[test]
fn boundary_replaces_a_failing_subtree() {
    let caught = Rc::new(Cell::new(0));
    let mut engine = engine();
    let mut tracker = PassTracker::new();
    let root = engine.create_root(C);
    engine
        .render(
            root,
            Some(Element::class(&boundary(&caught)).with_child(Element::component(&bomb()))),
            UpdatePriority::Default,
        )
        .unwrap();
    run_until_idle_traced(&mut engine, &mut tracker).unwrap();

    assert_eq!(engine.host().texts(C), ["Error: boom"]);
    assert_eq!(caught.get(), 1, "did_catch ran once");
    let errors = tracker.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].phase, ErrorPhase::Render);
    assert!(errors[0].boundary.is_some());
    assert_eq!(engine.root_error(root), None);
}

#[test]
fn uncaught_render_error_tears_the_root_down() {
    let mut engine = engine();
    let root = mount(&mut engine, Element::text("before"));

    engine
        .render(root, Some(Element::component(&bomb())), UpdatePriority::Default)
        .unwrap();
    let err = run_until_idle(&mut engine).unwrap_err();

    assert_eq!(err, EngineError::Uncaught(ComponentError::new("boom")));
    assert_eq!(engine.root_error(root), Some(&err));
    assert!(engine.host().texts(C).is_empty(), "content removed");
}

#[test]
fn concurrent_render_error_is_retried_synchronously() {
    let calls = Rc::new(Cell::new(0));
    let flaky = Component::new("Flaky", {
        let calls = calls.clone();
        move |_, _| {
            calls.set(calls.get() + 1);
            if calls.get() == 1 {
                Render::Failed(ComponentError::new("first try"))
            } else {
                Render::one(Element::text("ok"))
            }
        }
    });
    let mut engine = sliced(1);
    let root = engine.create_root(C);
    engine
        .render(root, Some(Element::component(&flaky)), UpdatePriority::Transition)
        .unwrap();
    run_until_idle(&mut engine).unwrap();

    assert_eq!(calls.get(), 2, "failed once, then rendered synchronously");
    assert_eq!(engine.host().texts(C), ["ok"]);
    assert_eq!(engine.root_error(root), None);
}

#[test]
fn concurrent_render_error_that_fails_again_tears_the_root_down() {
    let calls = Rc::new(Cell::new(0));
    let failing = Component::new("Failing", {
        let calls = calls.clone();
        move |_, _| {
            calls.set(calls.get() + 1);
            Render::Failed(ComponentError::new("boom"))
        }
    });
    let mut engine = sliced(1);
    let root = mount(&mut engine, Element::text("before"));

    engine
        .render(root, Some(Element::component(&failing)), UpdatePriority::Transition)
        .unwrap();
    let err = run_until_idle(&mut engine).unwrap_err();

    assert_eq!(calls.get(), 2, "one concurrent and one synchronous attempt");
    assert_eq!(err, EngineError::Uncaught(ComponentError::new("boom")));
    assert_eq!(engine.root_error(root), Some(&err));
    assert!(engine.host().texts(C).is_empty(), "content removed");
}

#[test]
fn commit_error_without_a_boundary_is_reported() {
    let s = slot();
    let mut engine = engine();
    let root = mount(&mut engine, Element::component(&counter("Label", &s)));

    engine.host_mut().fail_next(FailOn::Update);
    engine
        .schedule_update(handle(&s), increment(), UpdatePriority::Sync)
        .unwrap();
    let err = run_until_idle(&mut engine).unwrap_err();

    assert!(matches!(&err, EngineError::Commit(e) if e.message() == "injected Update failure"));
    assert!(engine.host().children(C).is_empty(), "content removed");
    assert_eq!(engine.root_error(root), Some(&err));
}

#[test]
fn commit_error_is_delivered_to_the_nearest_boundary() {
    let caught = Rc::new(Cell::new(0));
    let s = slot();
    let mut engine = engine();
    let mut tracker = PassTracker::new();
    mount(
        &mut engine,
        Element::class(&boundary(&caught))
            .with_child(Element::component(&counter("Label", &s))),
    );

    engine.host_mut().fail_next(FailOn::Update);
    engine
        .schedule_update(handle(&s), increment(), UpdatePriority::Sync)
        .unwrap();
    run_until_idle_traced(&mut engine, &mut tracker).unwrap();

    assert_eq!(engine.host().texts(C), ["Error: injected Update failure"]);
    assert_eq!(caught.get(), 1);
    assert_eq!(tracker.errors()[0].phase, ErrorPhase::Commit);
}

// ---------------------------------------------------------------------------
// Effects and unmounting
// ---------------------------------------------------------------------------

fn effectful(mounts: &Rc<Cell<u32>>, cleanups: &Rc<Cell<u32>>) -> Component {
    let mounts = mounts.clone();
    let cleanups = cleanups.clone();
    Component::new("Effectful", move |cx, _| {
        let mounts = mounts.clone();
        let cleanups = cleanups.clone();
        cx.use_effect(Some(Value::Null), move |_| {
            mounts.set(mounts.get() + 1);
            let cleanups = cleanups.clone();
            let cleanup: Cleanup = Box::new(move || cleanups.set(cleanups.get() + 1));
            Some(cleanup)
        });
        Render::one(Element::text("fx"))
    })
}

#[test]
fn unmount_runs_each_cleanup_once() {
    let mounts = Rc::new(Cell::new(0));
    let cleanups = Rc::new(Cell::new(0));
    let mut engine = engine();
    let root = mount(&mut engine, Element::component(&effectful(&mounts, &cleanups)));
    assert_eq!(mounts.get(), 1);

    engine.unmount(root).unwrap();
    assert_eq!(cleanups.get(), 1);
    assert!(engine.host().children(C).is_empty());
    assert!(engine.scheduler().is_idle());
    assert_eq!(
        engine.render(root, Some(Element::text("late")), UpdatePriority::Default),
        Err(EngineError::UnknownRoot(root))
    );
}

#[test]
fn unmount_flushes_effects_that_never_ran() {
    let mounts = Rc::new(Cell::new(0));
    let cleanups = Rc::new(Cell::new(0));
    let mut engine = engine();
    let root = engine.create_root(C);
    engine
        .render(
            root,
            Some(Element::component(&effectful(&mounts, &cleanups))),
            UpdatePriority::Default,
        )
        .unwrap();
    run_next(&mut engine).unwrap();
    assert_eq!(mounts.get(), 0, "passive effects are still queued");
    assert!(!engine.scheduler().is_idle());

    engine.unmount(root).unwrap();
    assert_eq!(mounts.get(), 1);
    assert_eq!(cleanups.get(), 1);
    assert!(engine.scheduler().is_idle(), "passive task cancelled");
    assert_eq!(run_until_idle(&mut engine), Ok(0));
}

#[test]
fn effect_updates_are_applied_after_the_flush() {
    let s = slot();
    let synced = Component::new("Synced", {
        let s = s.clone();
        move |cx, _| {
            s.set(Some(cx.handle()));
            let n = cx.use_state(|| Value::Int(0));
            cx.use_layout_effect(Some(Value::Null), |fx| {
                let me = fx.handle();
                fx.set_state(me, Action::Replace(Value::Int(10)));
                None
            });
            Render::one(Element::text(n))
        }
    });
    let mut engine = engine();
    let mut tracker = PassTracker::new();
    let root = engine.create_root(C);
    engine
        .render(root, Some(Element::component(&synced)), UpdatePriority::Default)
        .unwrap();
    run_until_idle_traced(&mut engine, &mut tracker).unwrap();

    assert_eq!(engine.host().texts(C), ["10"]);
    assert_eq!(
        tracker.committed_lanes(),
        [Lanes::DEFAULT, Lanes::SYNC],
        "layout effect updates are synchronous"
    );
}

// ---------------------------------------------------------------------------
// Context, portals, caches and scopes
// ---------------------------------------------------------------------------

#[test]
fn context_reaches_readers_below_a_memo_bailout() {
    let ctx = Context::new("theme", "light");
    let middle_renders = Rc::new(Cell::new(0));
    let reader = Component::new("Reader", {
        let ctx = ctx.clone();
        move |cx, _| Render::one(Element::text(cx.read_context(&ctx)))
    });
    let middle = MemoComponent::new(&Component::new("Middle", {
        let renders = middle_renders.clone();
        move |_, _| {
            renders.set(renders.get() + 1);
            Render::one(Element::component(&reader))
        }
    }));
    let app_slot = slot();
    let app = Component::new("App", {
        let app_slot = app_slot.clone();
        move |cx, _| {
            app_slot.set(Some(cx.handle()));
            let theme = cx.use_state(|| Value::from("light"));
            Render::one(Element::provider(&ctx, theme).with_child(Element::memo(&middle)))
        }
    });
    let mut engine = engine();
    mount(&mut engine, Element::component(&app));
    assert_eq!(engine.host().texts(C), ["light"]);

    engine
        .schedule_update(
            handle(&app_slot),
            Action::Replace(Value::from("dark")),
            UpdatePriority::Sync,
        )
        .unwrap();
    run_until_idle(&mut engine).unwrap();

    assert_eq!(engine.host().texts(C), ["dark"]);
    assert_eq!(middle_renders.get(), 1, "memo skipped its own render");
}

#[test]
fn portal_children_go_to_their_own_container() {
    let other = ContainerId(2);
    let mut engine = engine();
    let root = mount(
        &mut engine,
        Element::host("div").with_children([
            Element::text("inside"),
            Element::portal(other).with_child(Element::text("elsewhere")),
        ]),
    );
    assert_eq!(engine.host().texts(C), ["inside"]);
    assert_eq!(engine.host().texts(other), ["elsewhere"]);
    let placed = engine.host().children(other)[0];
    assert!(engine.host().ops().contains(&HostOp::Insert {
        parent: HostParent::Container(other),
        child: placed,
        before: None,
    }));

    engine.render(root, None, UpdatePriority::Sync).unwrap();
    run_until_idle(&mut engine).unwrap();
    assert!(engine.host().children(other).is_empty(), "portal content removed");
}

#[test]
fn refreshing_a_cache_rerenders_its_readers() {
    let s = slot();
    let reader = Component::new("CacheReader", {
        let s = s.clone();
        move |cx, _| {
            s.set(Some(cx.handle()));
            let handle = cx.cache();
            Render::one(Element::text(format!("cache {handle}")))
        }
    });
    let outside = Component::new("Outside", |cx, _| {
        Render::one(Element::text(format!("outside {}", cx.cache())))
    });
    let mut engine = engine();
    mount(
        &mut engine,
        Element::fragment([
            Element::cache().with_child(Element::component(&reader)),
            Element::component(&outside),
        ]),
    );
    let before = engine.host().texts(C);
    assert_eq!(before[1], "outside null");

    let lane = engine
        .refresh_cache(handle(&s), UpdatePriority::Default)
        .unwrap();
    assert_eq!(lane, Lanes::DEFAULT);
    run_until_idle(&mut engine).unwrap();

    let after = engine.host().texts(C);
    assert_ne!(after[0], before[0], "reader saw a fresh handle");
    assert_eq!(after[1], "outside null");
}

#[test]
fn refs_and_scopes_resolve_to_host_instances() {
    let div_ref = NodeRef::new();
    let scope_ref = NodeRef::new();
    let mut engine = engine();
    mount(
        &mut engine,
        Element::fragment([
            Element::host("div").with_ref(&div_ref),
            Element::scope().with_ref(&scope_ref).with_children([
                Element::host("span"),
                Element::fragment([Element::text("a"), Element::text("b")]),
            ]),
        ]),
    );
    let children = engine.host().children(C).to_vec();
    assert_eq!(children.len(), 4);
    assert_eq!(div_ref.get(), Some(RefTarget::Instance(children[0])));

    let Some(RefTarget::Scope(scope)) = scope_ref.get() else {
        panic!("scope ref not attached: {:?}", scope_ref.get());
    };
    assert_eq!(engine.scope_instances(scope).unwrap(), &children[1..]);
}

#[test]
fn host_serialization_reflects_updates() {
    let s = slot();
    let mut engine = engine();
    mount(
        &mut engine,
        Element::host("section").with_child(Element::component(&counter("N", &s))),
    );
    for _ in 0..3 {
        engine
            .schedule_update(handle(&s), increment(), UpdatePriority::Default)
            .unwrap();
    }
    run_until_idle(&mut engine).unwrap();
    let rendered: String = engine.host().serialize(C);
    assert_eq!(rendered, r#"<section>"N 3"</section>"#);
}
