use std::path::PathBuf;

use pgroup_ast::{AggregateDecl, DeclArena, ExprKind};
use pgroup_bench::{bench_registry, layered_arena, wide_aggregate, wide_mismatch};
use pgroup_derive::{Capability, CapabilityRegistry, DeriveConfig, Deriver, RequirementDecl};
use serde::Serialize;

#[derive(Serialize)]
struct FixtureMetric {
    name: &'static str,
    fields: usize,
    derivable: bool,
    statements: usize,
    recursive_calls: usize,
    leaf_applications: usize,
    trace_steps: usize,
}

#[derive(Serialize)]
struct Report {
    fixtures: Vec<FixtureMetric>,
    total_statements: usize,
    total_recursive_calls: usize,
    total_leaf_applications: usize,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let registry = bench_registry();
    let mut fixtures = vec![
        measure_flat(&registry, "wide_32", wide_aggregate("Wide32", 32))?,
        measure_flat(&registry, "wide_512", wide_aggregate("Wide512", 512))?,
        measure_flat(&registry, "late_mismatch_128", wide_mismatch("Late128", 128))?,
    ];
    fixtures.push(measure_layered(&registry, "layered_16x4", 16, 4)?);

    let report = Report {
        total_statements: fixtures.iter().map(|m| m.statements).sum(),
        total_recursive_calls: fixtures.iter().map(|m| m.recursive_calls).sum(),
        total_leaf_applications: fixtures.iter().map(|m| m.leaf_applications).sum(),
        fixtures,
    };
    let json = serde_json::to_string_pretty(&report).map_err(|err| err.to_string())?;

    if let Some(path) = std::env::args().nth(1) {
        let path = PathBuf::from(path);
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|err| format!("failed to create `{}`: {err}", parent.display()))?;
        }
        std::fs::write(&path, json)
            .map_err(|err| format!("failed to write `{}`: {err}", path.display()))?;
    } else {
        println!("{json}");
    }
    Ok(())
}

fn measure_flat(
    registry: &CapabilityRegistry,
    name: &'static str,
    decl: AggregateDecl,
) -> Result<FixtureMetric, String> {
    let mut arena = DeclArena::new();
    let id = arena.add_aggregate(decl)?;
    let mut deriver = Deriver::new(Capability::parameter_group(), registry);
    deriver.enable_tracing();
    measure(&mut deriver, &mut arena, name, id)
}

fn measure_layered(
    registry: &CapabilityRegistry,
    name: &'static str,
    depth: usize,
    width: usize,
) -> Result<FixtureMetric, String> {
    let (mut arena, ids) = layered_arena(depth, width);
    let mut deriver = Deriver::for_arena(&DeriveConfig::default(), registry, &arena);
    deriver.enable_tracing();
    let mut last = None;
    for id in ids {
        last = Some(measure(&mut deriver, &mut arena, name, id)?);
    }
    last.ok_or_else(|| format!("fixture `{name}` has no layers"))
}

fn measure<O: pgroup_derive::ConformanceOracle>(
    deriver: &mut Deriver<O>,
    arena: &mut DeclArena,
    name: &'static str,
    id: pgroup_ast::AggregateId,
) -> Result<FixtureMetric, String> {
    let fields = arena.aggregate(id).fields.len();
    let mut metric = FixtureMetric {
        name,
        fields,
        derivable: false,
        statements: 0,
        recursive_calls: 0,
        leaf_applications: 0,
        trace_steps: 0,
    };
    match deriver.derive_method(arena, id, &RequirementDecl::method("update")) {
        Ok(decl) => {
            let body = deriver.realize_body(arena, decl);
            metric.derivable = true;
            metric.statements = body.len();
            for stmt in &body.stmts {
                let ExprKind::Call { callee, .. } = &stmt.as_expr().kind else {
                    return Err(format!("fixture `{name}`: statement is not a call"));
                };
                if matches!(callee.kind, ExprKind::MethodRef { .. }) {
                    metric.recursive_calls += 1;
                } else {
                    metric.leaf_applications += 1;
                }
            }
        }
        Err(err) if err.is_recoverable() => {}
        Err(err) => return Err(format!("fixture `{name}`: {err}")),
    }
    metric.trace_steps = deriver.take_trace().len();
    Ok(metric)
}
