// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use std::hint::black_box;
use tango_bench::{IntoBenchmarks, benchmark_fn, tango_benchmarks, tango_main};
use typetx::{InstanceId, Store, Value, complex_type};

fn setup(len: usize) -> (Store, InstanceId, InstanceId) {
    typetx::enable_determinism();

    let mut store = Store::default();
    store
        .register_type(
            complex_type!("node" {
                "name" => string,
                "children" => [{"node"}],
            })
            .unwrap(),
        )
        .unwrap();
    let root = store.create("node").unwrap();
    let children = store.list_of(root, "children").unwrap();
    let mut tx = store.begin();
    for _ in 0..len {
        let child = tx.create("node").unwrap();
        tx.list_add(children, child).unwrap();
    }
    tx.accept().unwrap();
    (store, root, children)
}

fn list_benchmarks() -> impl IntoBenchmarks {
    [
        benchmark_fn("list::add-reject", move |b| {
            let (mut store, _, children) = setup(255);
            b.iter(move || {
                let mut tx = store.begin();
                let child = tx.create("node").unwrap();
                tx.list_add(children, black_box(child)).unwrap();
                tx.reject("bench")
            })
        }),
        benchmark_fn("list::move-reject", move |b| {
            let (mut store, _, children) = setup(255);
            let last = store.list_get(children, 254).unwrap().cloned().unwrap();
            b.iter(move || {
                let mut tx = store.begin();
                tx.list_move(children, black_box(&last), 0).unwrap();
                tx.reject("bench")
            })
        }),
        benchmark_fn("list::sort-reject", move |b| {
            let (mut store, _, children) = setup(255);
            b.iter(move || {
                let mut tx = store.begin();
                tx.list_sort_by(children, |a, b| b.key().cmp(&a.key())).unwrap();
                tx.reject("bench")
            })
        }),
    ]
}

fn set_benchmarks() -> impl IntoBenchmarks {
    [
        benchmark_fn("set::implicit", move |b| {
            let (mut store, root, _) = setup(0);
            let mut n = 0;
            b.iter(move || {
                n = (n + 1) % 1024;
                store.set(root, "name", Value::from(black_box(n))).unwrap()
            })
        }),
        benchmark_fn("set::nested-propagation", move |b| {
            let (mut store, _, children) = setup(255);
            let child = store.list_get(children, 128).unwrap().and_then(Value::instance).unwrap();
            b.iter(move || {
                let mut tx = store.begin();
                tx.set(black_box(child), "name", "deep").unwrap();
                tx.reject("bench")
            })
        }),
        benchmark_fn("set::coalesce", move |b| {
            let (mut store, root, _) = setup(0);
            b.iter(move || {
                let mut tx = store.begin();
                for name in ["a", "b", "c", "d"] {
                    tx.set(root, "name", black_box(name)).unwrap();
                }
                tx.accept().unwrap()
            })
        }),
    ]
}

tango_benchmarks!(list_benchmarks(), set_benchmarks());
tango_main!();
