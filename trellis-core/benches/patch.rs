use std::hint::black_box;
use std::rc::Rc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use trellis_core::reactive::Runtime;
use trellis_core::render::{h, props, MemoryDom, Renderer, VNode};

fn keyed_list(keys: impl Iterator<Item = usize>) -> VNode {
    h(
        "ul",
        keys.map(|k| h("li", (props([("key", k)]), format!("item {k}"))))
            .collect::<Vec<_>>(),
    )
}

fn bench_keyed_patch(c: &mut Criterion) {
    let mut group = c.benchmark_group("keyed_patch");

    for size in [10usize, 100, 1000] {
        // Replace one item in the middle: two-end trim does the work.
        group.bench_with_input(BenchmarkId::new("replace_middle", size), &size, |b, &size| {
            let dom = MemoryDom::new();
            let renderer = Renderer::with_runtime(Rc::new(dom.clone()), Runtime::new());
            let app = dom.create_container("app");
            let mut flip = false;

            b.iter(|| {
                flip = !flip;
                let mid = size / 2;
                let keys = (0..size).map(|k| if k == mid && flip { size + 1 } else { k });
                renderer
                    .render(Some(black_box(keyed_list(keys))), app)
                    .expect("patch");
                dom.clear_ops();
            });
        });

        // Reversal falls through to the full middle remount.
        group.bench_with_input(BenchmarkId::new("reverse", size), &size, |b, &size| {
            let dom = MemoryDom::new();
            let renderer = Renderer::with_runtime(Rc::new(dom.clone()), Runtime::new());
            let app = dom.create_container("app");
            let mut flip = false;

            b.iter(|| {
                flip = !flip;
                let tree = if flip {
                    keyed_list((0..size).rev())
                } else {
                    keyed_list(0..size)
                };
                renderer.render(Some(black_box(tree)), app).expect("patch");
                dom.clear_ops();
            });
        });
    }

    group.finish();
}

fn bench_reactive_update(c: &mut Criterion) {
    c.bench_function("reactive_set_with_100_effects", |b| {
        let rt = Runtime::new();
        let state = rt.reactive_map([("n", 0)]);
        let effects: Vec<_> = (0..100)
            .map(|_| {
                let state = state.clone();
                rt.effect(move || {
                    black_box(state.get("n"));
                })
            })
            .collect();

        let mut n = 0;
        b.iter(|| {
            n += 1;
            state.set("n", n);
        });
        drop(effects);
    });
}

criterion_group!(benches, bench_keyed_patch, bench_reactive_update);
criterion_main!(benches);
