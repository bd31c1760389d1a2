//! Fixtures shared by the benchmarks and the metrics binary.

use pgroup_ast::{AggregateDecl, AggregateId, DeclArena};
use pgroup_derive::{Capability, CapabilityRegistry, ImplInfo, ImplVia};
use pgroup_types::Type;

/// `Dense` (element `Float`) and `Tensor(t)` (element `t`).
pub fn bench_registry() -> CapabilityRegistry {
    let mut registry = CapabilityRegistry::with_capability(Capability::parameter_group());
    registry
        .register_impl(
            ImplInfo::new("ParameterGroup", "Dense").with_associated_type("Parameter", Type::Float),
        )
        .unwrap_or_else(|diag| panic!("fixture registry: {diag}"));
    registry
        .register_impl(
            ImplInfo::new("ParameterGroup", "Tensor")
                .with_type_params(&["t"])
                .with_associated_type("Parameter", Type::param("t"))
                .via(ImplVia::Builtin),
        )
        .unwrap_or_else(|diag| panic!("fixture registry: {diag}"));
    registry
}

/// An aggregate of `field_count` fields cycling through `Float`, `Dense`
/// and `Tensor(Float)`. Every field contributes `Float`.
pub fn wide_aggregate(name: &str, field_count: usize) -> AggregateDecl {
    AggregateDecl::new(name).with_fields((0..field_count).map(|i| {
        let ty = match i % 3 {
            0 => Type::Float,
            1 => Type::named("Dense"),
            _ => Type::applied("Tensor", vec![Type::Float]),
        };
        (format!("p{i}"), ty)
    }))
}

/// Like [`wide_aggregate`] but the last field disagrees, so unification
/// walks every field before failing.
pub fn wide_mismatch(name: &str, field_count: usize) -> AggregateDecl {
    wide_aggregate(name, field_count.saturating_sub(1)).with_field("last", Type::Double)
}

/// `depth` aggregates deriving the capability, each holding the previous one
/// plus `width` leaf fields. Returns the ids outermost last.
pub fn layered_arena(depth: usize, width: usize) -> (DeclArena, Vec<AggregateId>) {
    let mut arena = DeclArena::new();
    let mut ids = Vec::with_capacity(depth);
    for level in 0..depth {
        let mut decl = AggregateDecl::new(format!("Layer{level}")).deriving("ParameterGroup");
        if level > 0 {
            decl = decl.with_field("inner", Type::named(format!("Layer{}", level - 1)));
        }
        decl = decl.with_fields((0..width).map(|i| (format!("w{i}"), Type::Float)));
        let id = arena
            .add_aggregate(decl)
            .unwrap_or_else(|err| panic!("fixture arena: {err}"));
        ids.push(id);
    }
    (arena, ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgroup_derive::{DeriveConfig, Deriver};

    #[test]
    fn wide_aggregate_derives_float() {
        let registry = bench_registry();
        let mut arena = DeclArena::new();
        let id = arena.add_aggregate(wide_aggregate("Wide", 9)).expect("declare");
        let deriver = Deriver::new(Capability::parameter_group(), &registry);
        assert!(deriver.can_derive(&arena, id));

        let bad = arena.add_aggregate(wide_mismatch("Bad", 9)).expect("declare");
        assert!(!deriver.can_derive(&arena, bad));
        assert_eq!(arena.aggregate(bad).fields.len(), 9);
    }

    #[test]
    fn layered_arena_derives_through_every_level() {
        let registry = bench_registry();
        let (arena, ids) = layered_arena(5, 2);
        let deriver = Deriver::for_arena(&DeriveConfig::default(), &registry, &arena);
        assert!(ids.iter().all(|id| deriver.can_derive(&arena, *id)));
    }
}
