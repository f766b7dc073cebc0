//! End-to-end pipeline benchmarks over assembled methods.

use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

use dexmir::{
    bytecode::{CodeAssembler, MethodBody},
    compiler::{compile_method, CompileOptions, InlinerCache},
    mir::{GraphBuilder, PrimType},
    ssa::build_ssa,
};

/// A loop-heavy method: nested counting loops storing into an array.
fn nested_loop_method() -> MethodBody {
    let mut asm = CodeAssembler::new(6, 1);
    asm.param_types(&[PrimType::Ref]);
    asm.const4(0, 0)
        .unwrap()
        .const4(3, 10)
        .unwrap()
        .label("outer")
        .unwrap()
        .array_length(2, 5)
        .unwrap()
        .if_ge(0, 2, "outer_done")
        .unwrap()
        .const4(1, 0)
        .unwrap()
        .label("inner")
        .unwrap()
        .array_length(2, 5)
        .unwrap()
        .if_ge(1, 2, "inner_done")
        .unwrap()
        .aput(3, 5, 1)
        .unwrap()
        .add_int_lit8(1, 1, 1)
        .unwrap()
        .goto("inner")
        .unwrap()
        .label("inner_done")
        .unwrap()
        .add_int_lit8(0, 0, 1)
        .unwrap()
        .goto("outer")
        .unwrap()
        .label("outer_done")
        .unwrap()
        .return_void()
        .unwrap();
    asm.finish().unwrap()
}

fn bench_build(c: &mut Criterion) {
    let body = nested_loop_method();
    c.bench_function("cfg_build", |b| {
        b.iter(|| GraphBuilder::build(black_box(&body), false).unwrap());
    });
}

fn bench_ssa(c: &mut Criterion) {
    let body = nested_loop_method();
    c.bench_function("ssa_construction", |b| {
        b.iter(|| {
            let mut graph = GraphBuilder::build(black_box(&body), false).unwrap();
            build_ssa(&mut graph).unwrap();
            graph
        });
    });
}

fn bench_full_pipeline(c: &mut Criterion) {
    let body = nested_loop_method();
    let options = CompileOptions::default();
    let cache = InlinerCache::new();
    c.bench_function("compile_method", |b| {
        b.iter(|| compile_method(black_box(&body), &options, &cache).unwrap());
    });
}

criterion_group!(benches, bench_build, bench_ssa, bench_full_pipeline);
criterion_main!(benches);
