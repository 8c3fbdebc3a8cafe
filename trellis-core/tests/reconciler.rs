//! Integration Tests for the Reconciler
//!
//! These tests drive a `Renderer` against the in-memory DOM and check both
//! the resulting tree and the mutations it took to get there.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use proptest::prelude::*;

use trellis_core::config::RuntimeConfig;
use trellis_core::reactive::{Runtime, Value};
use trellis_core::render::{
    fragment, h, props, Component, DomOp, MemoryDom, NodeId, Renderer, SetupResult, Slot, VNode,
};
use trellis_core::TrellisError;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .try_init();
}

fn setup() -> (MemoryDom, Renderer, NodeId) {
    setup_with(Runtime::new())
}

fn setup_with(runtime: Runtime) -> (MemoryDom, Renderer, NodeId) {
    init_tracing();
    let dom = MemoryDom::new();
    let renderer = Renderer::with_runtime(Rc::new(dom.clone()), runtime);
    let container = dom.create_container("app");
    (dom, renderer, container)
}

fn keyed(key: &str) -> VNode {
    h("li", (props([("key", key)]), key))
}

fn list(keys: &[&str]) -> VNode {
    h("ul", keys.iter().map(|k| keyed(k)).collect::<Vec<_>>())
}

fn count_ops(ops: &[DomOp], pred: impl Fn(&DomOp) -> bool) -> usize {
    ops.iter().filter(|op| pred(op)).count()
}

/// Test that a keyed middle replacement keeps the nodes on both sides.
#[test]
fn keyed_diff_reuses_stable_nodes() {
    let (dom, renderer, app) = setup();
    renderer.render(Some(list(&["a", "b", "c"])), app).unwrap();
    let ul = dom.children(app)[0];
    let before = dom.children(ul);

    dom.clear_ops();
    renderer.render(Some(list(&["a", "d", "c"])), app).unwrap();
    let after = dom.children(ul);

    assert_eq!(after[0], before[0]);
    assert_eq!(after[2], before[2]);
    assert_ne!(after[1], before[1]);
    assert_eq!(dom.text_content(ul), "adc");

    let ops = dom.take_ops();
    let created = count_ops(&ops, |op| matches!(op, DomOp::CreateElement { .. }));
    let removed = count_ops(&ops, |op| matches!(op, DomOp::Remove { .. }));
    assert_eq!((created, removed), (1, 1));
}

/// Test that front and back trimming leaves a single replacement.
#[test]
fn trims_both_ends_before_replacing_middle() {
    let (dom, renderer, app) = setup();
    renderer
        .render(Some(list(&["1", "2", "3", "4", "5"])), app)
        .unwrap();
    let ul = dom.children(app)[0];
    let before = dom.children(ul);

    dom.clear_ops();
    renderer
        .render(Some(list(&["1", "2", "3", "6", "5"])), app)
        .unwrap();
    let after = dom.children(ul);

    assert_eq!(&after[..3], &before[..3]);
    assert_eq!(after[4], before[4]);
    assert_eq!(dom.text_content(ul), "12365");

    let ops = dom.take_ops();
    assert_eq!(
        count_ops(&ops, |op| matches!(op, DomOp::Remove { node } if *node == before[3])),
        1
    );
    assert_eq!(
        count_ops(&ops, |op| matches!(op, DomOp::CreateElement { .. })),
        1
    );
    // The new node lands before the kept tail
    assert!(ops.iter().any(|op| matches!(
        op,
        DomOp::Insert { parent, anchor: Some(anchor), .. } if *parent == ul && *anchor == before[4]
    )));
}

/// Test that pure additions and removals in the middle touch nothing else.
#[test]
fn middle_additions_and_removals() {
    let (dom, renderer, app) = setup();
    renderer.render(Some(list(&["a", "c"])), app).unwrap();
    let ul = dom.children(app)[0];

    renderer.render(Some(list(&["a", "b", "c"])), app).unwrap();
    assert_eq!(dom.text_content(ul), "abc");

    dom.clear_ops();
    renderer.render(Some(list(&["a", "c"])), app).unwrap();
    assert_eq!(dom.text_content(ul), "ac");
    assert_eq!(dom.take_ops().len(), 1);
}

/// Test that reordered middle nodes are recreated rather than moved.
#[test]
fn reordered_middle_is_remounted() {
    let (dom, renderer, app) = setup();
    renderer.render(Some(list(&["a", "b", "c", "d"])), app).unwrap();
    let ul = dom.children(app)[0];
    let before = dom.children(ul);

    renderer.render(Some(list(&["a", "c", "b", "d"])), app).unwrap();
    let after = dom.children(ul);

    assert_eq!(dom.text_content(ul), "acbd");
    assert_eq!(after[0], before[0]);
    assert_eq!(after[3], before[3]);
    // b and c swapped places but neither host node survived
    assert!(!after[1..3].contains(&before[1]));
    assert!(!after[1..3].contains(&before[2]));
}

/// Test that one vnode placed twice in a list gets its own host nodes per
/// position and both are torn down.
#[test]
fn shared_child_vnode_is_mounted_per_position() {
    let (dom, renderer, app) = setup();
    let x = h("span", "x");

    renderer
        .render(Some(h("div", vec![x.clone(), x.clone()])), app)
        .unwrap();
    let div = dom.children(app)[0];
    assert_eq!(dom.text_content(div), "xx");
    assert_eq!(dom.children(div).len(), 2);

    renderer.render(Some(h("div", Vec::<VNode>::new())), app).unwrap();
    assert_eq!(dom.text_content(div), "");
    assert!(dom.children(div).is_empty());
}

/// Test that a vnode kept from the previous render is patched, not stolen.
#[test]
fn child_reused_across_renders_stays_tracked() {
    let (dom, renderer, app) = setup();
    let x = h("b", "x");

    renderer.render(Some(h("p", vec![x.clone()])), app).unwrap();
    let p = dom.children(app)[0];
    renderer
        .render(Some(h("p", vec![x.clone(), x.clone()])), app)
        .unwrap();
    assert_eq!(dom.text_content(p), "xx");

    renderer.render(Some(h("p", Vec::<VNode>::new())), app).unwrap();
    assert!(dom.children(p).is_empty());
}

/// Test that unmounting a fragment removes its children and both markers.
#[test]
fn fragment_teardown_removes_markers() {
    let (dom, renderer, app) = setup();
    let tree = |with_fragment: bool| {
        let mut children = vec![h("header", "top")];
        if with_fragment {
            children.push(fragment(vec![h("p", "1"), h("p", "2"), h("p", "3")]));
        }
        children.push(h("footer", "bottom"));
        h("div", children)
    };

    renderer.render(Some(tree(true)), app).unwrap();
    let div = dom.children(app)[0];
    // header + start marker + 3 children + end marker + footer
    assert_eq!(dom.children(div).len(), 7);

    dom.clear_ops();
    renderer.render(Some(tree(false)), app).unwrap();

    let ops = dom.take_ops();
    assert_eq!(count_ops(&ops, |op| matches!(op, DomOp::Remove { .. })), 5);
    assert_eq!(dom.to_html(div), "<div><header>top</header><footer>bottom</footer></div>");
}

/// Test that a fragment patched in place keeps its markers.
#[test]
fn fragment_children_patch_between_markers() {
    let (dom, renderer, app) = setup();
    let tree = |items: &[&str]| {
        h(
            "div",
            vec![
                fragment(items.iter().map(|k| keyed(k)).collect::<Vec<_>>()),
                h("span", "end"),
            ],
        )
    };

    renderer.render(Some(tree(&["a"])), app).unwrap();
    renderer.render(Some(tree(&["a", "b"])), app).unwrap();
    let div = dom.children(app)[0];
    assert_eq!(dom.text_content(div), "abend");
    assert_eq!(
        dom.inner_html(div),
        "<li>a</li><li>b</li><span>end</span>"
    );
}

/// Test that element props converge to the new set.
#[test]
fn prop_diff_sets_and_removes_attributes() {
    let (dom, renderer, app) = setup();
    renderer
        .render(Some(h("div", props([("a", 1), ("b", 2)]))), app)
        .unwrap();
    let div = dom.children(app)[0];

    dom.clear_ops();
    renderer
        .render(Some(h("div", props([("b", 3), ("c", 4)]))), app)
        .unwrap();

    let attrs: Vec<(String, String)> = dom.attributes(div).into_iter().collect();
    assert_eq!(
        attrs,
        vec![("b".to_string(), "3".to_string()), ("c".to_string(), "4".to_string())]
    );
    assert_eq!(dom.take_ops().len(), 3);
}

/// Test that handlers are bound once and swapped in place.
#[test]
fn event_handlers_swap_without_rebinding() {
    let (dom, renderer, app) = setup();
    let clicks = Rc::new(RefCell::new(Vec::new()));
    let button = |label: &'static str| {
        let clicks = clicks.clone();
        h(
            "button",
            props([(
                "onClick",
                Value::callback(move |_| clicks.borrow_mut().push(label)),
            )]),
        )
    };

    renderer.render(Some(button("first")), app).unwrap();
    let el = dom.children(app)[0];
    dom.dispatch(el, "click", &Value::Null);

    dom.clear_ops();
    renderer.render(Some(button("second")), app).unwrap();
    assert!(dom.ops().is_empty());
    dom.dispatch(el, "click", &Value::Null);

    assert_eq!(*clicks.borrow(), vec!["first", "second"]);
}

/// Test that a component re-renders itself when its own state changes.
#[test]
fn component_rerenders_on_state_change() {
    let (dom, renderer, app) = setup();
    let state_slot = Rc::new(RefCell::new(None));

    let slot = state_slot.clone();
    let counter = Component::new("Counter")
        .setup(move |ctx| {
            let state = ctx.runtime().reactive_map([("count", 0)]);
            *slot.borrow_mut() = Some(state.clone());
            Ok(state.into())
        })
        .render(|scope| Ok(h("span", scope.get("count").to_string())))
        .build();

    renderer.render(Some(h(counter, ())), app).unwrap();
    let span = dom.children(app)[0];
    assert_eq!(dom.text_content(span), "0");

    let state = state_slot.borrow().clone().unwrap();
    state.set("count", 5);
    assert_eq!(dom.children(app), vec![span]);
    assert_eq!(dom.text_content(span), "5");
}

/// Test that parent prop changes reach the child through its props bag.
#[test]
fn child_updates_when_parent_passes_new_props() {
    let (dom, renderer, app) = setup();
    let child_renders = Rc::new(Cell::new(0));

    let renders = child_renders.clone();
    let child = Component::new("Child")
        .render(move |scope| {
            renders.set(renders.get() + 1);
            Ok(h("b", scope.get("label").to_string()))
        })
        .build();

    let tree = |label: &str, extra: i32| {
        h(
            "div",
            (
                props([("data-extra", extra)]),
                vec![h(child.clone(), props([("label", label)]))],
            ),
        )
    };

    renderer.render(Some(tree("x", 0)), app).unwrap();
    assert_eq!(child_renders.get(), 1);

    // Unrelated parent change: the child does not re-render
    renderer.render(Some(tree("x", 1)), app).unwrap();
    assert_eq!(child_renders.get(), 1);

    renderer.render(Some(tree("y", 1)), app).unwrap();
    assert_eq!(child_renders.get(), 2);
    assert_eq!(dom.inner_html(app), "<div data-extra=\"1\"><b>y</b></div>");
}

/// Test that slotted children and emitted events flow through a component.
#[test]
fn slots_and_emit() {
    let (dom, renderer, app) = setup();
    let picked = Rc::new(RefCell::new(Vec::new()));

    let card = Component::new("Card")
        .render(|scope| {
            let mut body = scope.slot("header");
            body.extend(scope.slot("default"));
            scope.emit("rendered", body.len());
            Ok(h("section", body))
        })
        .build();

    let mut slots = trellis_core::render::Slots::new();
    slots.insert("header".into(), Slot::new(|| vec![h("h1", "Title")]));
    slots.insert("default".into(), Slot::new(|| vec![h("p", "Body")]));

    let sink = picked.clone();
    let vnode = h(
        card,
        (
            props([(
                "onRendered",
                Value::callback(move |n| sink.borrow_mut().push(n.clone())),
            )]),
            slots,
        ),
    );
    renderer.render(Some(vnode), app).unwrap();

    assert_eq!(
        dom.inner_html(app),
        "<section><h1>Title</h1><p>Body</p></section>"
    );
    assert_eq!(*picked.borrow(), vec![Value::from(2)]);
}

/// Test that a render error surfaces from the initial mount.
#[test]
fn render_errors_surface_from_mount() {
    let (_dom, renderer, app) = setup();
    let broken = Component::new("Broken")
        .render(|_| Err(TrellisError::render("boom")))
        .build();

    let err = renderer.render(Some(h(broken, ())), app).unwrap_err();
    assert_eq!(
        err,
        TrellisError::Render {
            component: "Broken".into(),
            message: "boom".into()
        }
    );
}

/// Test that a template-only component renders the diagnostic placeholder.
#[test]
fn template_component_renders_placeholder() {
    let (dom, renderer, app) = setup();
    let templated = Component::new("Legacy")
        .template("<div>{{ msg }}</div>")
        .build();

    renderer.render(Some(h(templated, ())), app).unwrap();
    let el = dom.children(app)[0];
    assert_eq!(
        dom.attribute(el, "class").as_deref(),
        Some("trellis-template-placeholder")
    );
    assert!(dom.text_content(el).contains("Legacy"));
}

/// Test that unmounting stops component effects.
#[test]
fn unmount_stops_component_effects() {
    let (dom, renderer, app) = setup();
    let renders = Rc::new(Cell::new(0));
    let state_slot = Rc::new(RefCell::new(None));

    let (r, slot) = (renders.clone(), state_slot.clone());
    let comp = Component::new("Ticker")
        .setup(move |ctx| {
            let state = ctx.runtime().reactive_map([("n", 0)]);
            *slot.borrow_mut() = Some(state.clone());
            let r = r.clone();
            Ok(SetupResult::render(move |_| {
                r.set(r.get() + 1);
                Ok(h("i", state.get("n").to_string()))
            }))
        })
        .build();

    renderer.render(Some(h(comp, ())), app).unwrap();
    renderer.render(None, app).unwrap();
    assert!(dom.children(app).is_empty());

    let state = state_slot.borrow().clone().unwrap();
    state.set("n", 1);
    assert_eq!(renders.get(), 1);
}

/// Test that batched mode defers component re-renders to the flush.
#[test]
fn batched_component_updates_once_per_flush() {
    let runtime = Runtime::with_config(RuntimeConfig::batched());
    let (dom, renderer, app) = setup_with(runtime.clone());
    let state = runtime.reactive_map([("a", 0), ("b", 0)]);
    let renders = Rc::new(Cell::new(0));

    let (s, r) = (state.clone(), renders.clone());
    let comp = Component::new("Pair")
        .render(move |_| {
            r.set(r.get() + 1);
            Ok(h("p", format!("{}-{}", s.get("a"), s.get("b"))))
        })
        .build();

    renderer.render(Some(h(comp, ())), app).unwrap();
    state.set("a", 1);
    state.set("b", 2);
    assert_eq!(dom.inner_html(app), "<p>0-0</p>");

    runtime.flush_jobs();
    assert_eq!(renders.get(), 2);
    assert_eq!(dom.inner_html(app), "<p>1-2</p>");
}

/// Test that the mutation log replays through both wire encodings.
#[test]
fn mutation_log_encodes() {
    let (dom, renderer, app) = setup();
    renderer.render(Some(list(&["a", "b"])), app).unwrap();

    let ops = dom.ops();
    let bytes = dom.ops_msgpack().unwrap();
    assert_eq!(DomOp::decode_msgpack(&bytes).unwrap(), ops);

    let json = dom.ops_json().unwrap();
    assert!(json.contains("\"op\":\"create_element\""));
}

proptest! {
    /// Any keyed list patched into any other ends up in the new order.
    #[test]
    fn keyed_lists_converge(
        old in proptest::sample::subsequence((0..12).collect::<Vec<u8>>(), 0..12),
        new in proptest::sample::subsequence((0..12).collect::<Vec<u8>>(), 0..12),
        shuffle in any::<bool>(),
    ) {
        let (dom, renderer, app) = setup();
        let render = |keys: &[u8]| {
            let names: Vec<String> = keys.iter().map(|k| format!("k{k}")).collect();
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();
            renderer.render(Some(list(&refs)), app).unwrap();
        };

        let mut new = new;
        if shuffle {
            new.reverse();
        }
        render(&old);
        render(&new);

        let ul = dom.children(app)[0];
        let expected: String = new.iter().map(|k| format!("k{k}")).collect();
        prop_assert_eq!(dom.text_content(ul), expected);
        prop_assert_eq!(dom.children(ul).len(), new.len());
    }
}
