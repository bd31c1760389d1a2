use std::hint::black_box;

use divan::{AllocProfiler, Bencher};
use pgroup_ast::DeclArena;
use pgroup_bench::{bench_registry, layered_arena, wide_aggregate, wide_mismatch};
use pgroup_derive::{Capability, DeriveConfig, Deriver, RequirementDecl};

#[global_allocator]
static ALLOC: AllocProfiler = AllocProfiler::system();

fn main() {
    divan::main();
}

#[divan::bench(args = [32, 128, 512])]
fn unify_wide_aggregate(bencher: Bencher, field_count: usize) {
    let registry = bench_registry();
    let mut arena = DeclArena::new();
    let id = arena
        .add_aggregate(wide_aggregate("Wide", field_count))
        .unwrap_or_else(|err| panic!("benchmark setup: {err}"));
    let deriver = Deriver::new(Capability::parameter_group(), &registry);
    bencher.bench(|| black_box(deriver.unify(black_box(&arena), id)));
}

#[divan::bench(args = [32, 128, 512])]
fn unify_late_mismatch(bencher: Bencher, field_count: usize) {
    let registry = bench_registry();
    let mut arena = DeclArena::new();
    let id = arena
        .add_aggregate(wide_mismatch("Wide", field_count))
        .unwrap_or_else(|err| panic!("benchmark setup: {err}"));
    let deriver = Deriver::new(Capability::parameter_group(), &registry);
    bencher.bench(|| black_box(deriver.can_derive(black_box(&arena), id)));
}

#[divan::bench(args = [32, 128, 512])]
fn derive_and_realize_wide_body(bencher: Bencher, field_count: usize) {
    let registry = bench_registry();
    let mut arena = DeclArena::new();
    let id = arena
        .add_aggregate(wide_aggregate("Wide", field_count))
        .unwrap_or_else(|err| panic!("benchmark setup: {err}"));
    let update = RequirementDecl::method("update");
    bencher
        .with_inputs(|| arena.clone())
        .bench_local_values(|mut arena| {
            let mut deriver = Deriver::new(Capability::parameter_group(), &registry);
            let decl = deriver
                .derive_method(&mut arena, id, &update)
                .unwrap_or_else(|err| panic!("derive failed in benchmark: {err}"));
            black_box(deriver.realize_body(&arena, decl).len())
        });
}

#[divan::bench(args = [4, 16, 64])]
fn nested_derivation_depth(bencher: Bencher, depth: usize) {
    let registry = bench_registry();
    let (arena, ids) = layered_arena(depth, 4);
    let outermost = *ids.last().unwrap_or_else(|| panic!("empty layered arena"));
    bencher.bench(|| {
        let deriver = Deriver::for_arena(&DeriveConfig::default(), &registry, &arena);
        black_box(deriver.can_derive(black_box(&arena), outermost))
    });
}
