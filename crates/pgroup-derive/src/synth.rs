//! Body synthesis for the implicit `update(withGradients:_:)` method.
//!
//! The body is one statement per stored field, in declaration order:
//!
//! ```text
//! self.layer.update(withGradients: gradients.layer, updater)   // field conforms
//! updater(&self.bias, gradients.bias)                          // leaf field
//! ```
//!
//! Deep aggregates are handled by each conforming field's own `update`, so
//! the synthesizer itself never recurses.

use pgroup_ast::{
    AggregateDecl, Arg, Block, DeclArena, Expr, FuncDecl, ParamDecl, Stmt, StoredField,
    WitnessRef,
};
use pgroup_types::{FnParam, FunctionType, Type};

use crate::capability::Capability;
use crate::oracle::ConformanceOracle;
use crate::trace::{DeriveAction, DeriveTrace};

/// Everything the synthesizer reads.
pub struct SynthesisCx<'a, O: ?Sized> {
    pub arena: &'a DeclArena,
    pub oracle: &'a O,
    pub capability: &'a Capability,
}

/// Build the traversal body for `decl`, which must be an update method built
/// by [`crate::builder::build_update_decl`].
pub fn synthesize_update_body<O: ConformanceOracle + ?Sized>(
    cx: &SynthesisCx<'_, O>,
    decl: &FuncDecl,
    trace: &mut DeriveTrace,
) -> Block {
    let aggregate = cx.arena.aggregate(decl.owner);
    let gradients = decl
        .param(0)
        .expect("synthesized update declarations take gradients first");
    let updater = decl
        .param(1)
        .expect("synthesized update declarations take the updater second");
    let self_ty = aggregate.declared_interface_type();

    let stmts = aggregate
        .fields
        .iter()
        .map(|field| {
            let call = update_call(cx, aggregate, &self_ty, field, gradients, updater, trace);
            Stmt::Expr(call)
        })
        .collect();
    Block::implicit(stmts)
}

/// The member of `gradients` that corresponds to `target`.
///
/// `gradients` has type `Self`, so both sides share one field list; a miss
/// means the host broke that invariant.
fn matching_member<'a>(aggregate: &'a AggregateDecl, target: &StoredField) -> &'a StoredField {
    aggregate.field(&target.name).unwrap_or_else(|| {
        panic!(
            "gradients of `{}` has no member `{}`",
            aggregate.name, target.name
        )
    })
}

fn update_call<O: ConformanceOracle + ?Sized>(
    cx: &SynthesisCx<'_, O>,
    aggregate: &AggregateDecl,
    self_ty: &Type,
    field: &StoredField,
    gradients: &ParamDecl,
    updater: &ParamDecl,
    trace: &mut DeriveTrace,
) -> Expr {
    let member = Expr::member(Expr::self_ref(self_ty.clone()), &field.name, field.ty.clone());
    let gradient = matching_member(aggregate, field);
    let gradient_member = Expr::member(
        Expr::param_ref(&gradients.name, gradients.ty.clone()),
        &gradient.name,
        gradient.ty.clone(),
    );
    let updater_ref = Expr::param_ref(&updater.name, updater.ty.clone());

    let Some(witness) = cx.oracle.conforms(&field.ty, cx.capability) else {
        trace.record(&aggregate.name, DeriveAction::ApplyLeaf, &field.name, || {
            format!("`{}` does not conform to `{}`", field.ty, cx.capability.name)
        });
        return Expr::call(
            updater_ref,
            vec![
                Arg::unlabeled(Expr::inout(member)),
                Arg::unlabeled(gradient_member),
            ],
            Type::Unit,
        );
    };

    let method = witness.update.unwrap_or_else(|| crate::oracle::WitnessMethod {
        name: cx.capability.update_decl_name(),
        decl: None,
    });
    let decl = method.decl.or_else(|| {
        let nested = cx.arena.aggregate_for_type(&field.ty)?;
        cx.arena
            .find_member(nested, |member| member.implicit && member.name == method.name)
    });
    trace.record(&aggregate.name, DeriveAction::Recurse, &field.name, || {
        format!("`{}` conforms via {}", field.ty, witness.via.as_str())
    });

    let method_ty = Type::Function(
        FunctionType::new(
            vec![FnParam::value(field.ty.clone()), FnParam::value(updater.ty.clone())],
            Type::Unit,
        )
        .non_escaping(),
    );
    let witness_ref = WitnessRef {
        owner: field.ty.clone(),
        name: method.name,
        decl,
    };
    Expr::call(
        Expr::method_ref(member, witness_ref, method_ty),
        vec![
            Arg::labeled(&cx.capability.gradients_label, gradient_member),
            Arg::unlabeled(updater_ref),
        ],
        Type::Unit,
    )
}
