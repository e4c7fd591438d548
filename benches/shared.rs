use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rcblock::Shared;
use std::rc::Rc as StdRc;

// A simple struct to test reference counting
#[derive(Debug)]
struct TestStruct {
    x: u8,
    y: u8,
}

// Benchmark the creation of a new in-place shared object
fn new_shared_benchmark(c: &mut Criterion) {
    c.bench_function("rcblock::Shared::new", |b| {
        b.iter(|| {
            let obj = Shared::new(black_box(TestStruct { x: 0, y: 0 }));
            black_box(obj)
        })
    });
    c.bench_function("rcblock::Shared::from_box", |b| {
        b.iter(|| {
            let obj = Shared::from_box(Box::new(black_box(TestStruct { x: 0, y: 0 })));
            black_box(obj)
        })
    });
    c.bench_function("std::rc::Rc::new", |b| {
        b.iter(|| {
            let obj = StdRc::new(black_box(TestStruct { x: 0, y: 0 }));
            black_box(obj)
        })
    });
}

// Benchmark cloning a shared object
fn clone_shared_benchmark(c: &mut Criterion) {
    let shared = Shared::new(black_box(TestStruct { x: 0, y: 0 }));
    c.bench_function("rcblock::Shared::clone", |b| {
        b.iter(|| {
            let obj_clone = black_box(shared.clone());
            black_box(obj_clone)
        })
    });
    let obj = StdRc::new(black_box(TestStruct { x: 0, y: 0 }));
    c.bench_function("std::rc::Rc::clone", |b| {
        b.iter(|| {
            let obj_clone = black_box(obj.clone());
            black_box(obj_clone)
        })
    });
}

// Benchmark dropping a clone of a shared object
fn drop_shared_benchmark(c: &mut Criterion) {
    let shared = Shared::new(black_box(TestStruct { x: 0, y: 0 }));
    c.bench_function("rcblock::Shared::drop", |b| {
        b.iter(|| {
            let obj_clone = black_box(shared.clone());
            drop(obj_clone);
        })
    });
    let obj = StdRc::new(black_box(TestStruct { x: 0, y: 0 }));
    c.bench_function("std::rc::Rc::drop", |b| {
        b.iter(|| {
            let obj_clone = black_box(obj.clone());
            drop(obj_clone);
        })
    });
}

// Benchmark accessing fields through the cached object pointer
fn access_shared_benchmark(c: &mut Criterion) {
    let shared = Shared::new(black_box(TestStruct { x: 0, y: 0 }));
    c.bench_function("rcblock::Shared::access", |b| {
        b.iter(|| {
            let x = black_box(shared.x);
            let y = black_box(shared.y);
            assert_eq!(x, 0);
            assert_eq!(y, 0);
            (x, y)
        })
    });
    let obj = StdRc::new(black_box(TestStruct { x: 0, y: 0 }));
    c.bench_function("std::rc::Rc::access", |b| {
        b.iter(|| {
            let x = black_box(obj.x);
            let y = black_box(obj.y);
            assert_eq!(x, 0);
            assert_eq!(y, 0);
            (x, y)
        })
    });
}

criterion_group!(
    shared_benches,
    access_shared_benchmark,
    new_shared_benchmark,
    clone_shared_benchmark,
    drop_shared_benchmark,
);

criterion_main!(shared_benches);
