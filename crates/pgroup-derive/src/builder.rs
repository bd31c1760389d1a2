//! Construction of the implicit `update(withGradients:_:)` declaration.

use pgroup_ast::{
    AggregateId, BodySynthesizer, DeclArena, FuncDecl, LazyBody, ParamDecl, SelfAccess,
    ValidationState,
};
use pgroup_types::{FnParam, FunctionType, Type};

use crate::DeriveFailure;
use crate::capability::Capability;
use crate::oracle::ConformanceOracle;
use crate::trace::{DeriveAction, DeriveTrace};
use crate::unify::unify_element_type;

/// The element type the update method is written against.
///
/// Prefers the binding the host already recorded for the associated type and
/// falls back to unifying the fields.
pub fn element_type_for<O: ConformanceOracle + ?Sized>(
    arena: &DeclArena,
    oracle: &O,
    capability: &Capability,
    owner: AggregateId,
    trace: &mut DeriveTrace,
) -> Option<Type> {
    if let Some(bound) = arena.associated_type(owner, &capability.element_name) {
        return Some(bound.clone());
    }
    let aggregate = arena.aggregate(owner);
    unify_element_type(
        oracle,
        capability,
        &aggregate.name,
        aggregate.field_types(),
        trace,
    )
    .element()
}

/// Build `mutating func update(withGradients gradients: Self, _ updater: (inout Element, Element) -> ())`.
///
/// The body is attached unrealized; see [`crate::synth::synthesize_update_body`].
pub fn build_update_decl<O: ConformanceOracle + ?Sized>(
    arena: &DeclArena,
    oracle: &O,
    capability: &Capability,
    owner: AggregateId,
    trace: &mut DeriveTrace,
) -> Result<FuncDecl, DeriveFailure> {
    let aggregate = arena.aggregate(owner);
    let Some(element) = element_type_for(arena, oracle, capability, owner, trace) else {
        return Err(DeriveFailure::NotDerivable {
            aggregate: aggregate.name.clone(),
            capability: capability.name.clone(),
        });
    };

    let gradients = ParamDecl {
        label: Some(capability.gradients_label.clone()),
        name: capability.gradients_name.clone(),
        ty: aggregate.declared_interface_type(),
    };
    let updater = ParamDecl {
        label: None,
        name: capability.updater_name.clone(),
        ty: Type::Function(
            FunctionType::new(
                vec![FnParam::inout(element.clone()), FnParam::value(element.clone())],
                Type::Unit,
            )
            .non_escaping(),
        ),
    };

    let decl = FuncDecl {
        name: capability.update_decl_name(),
        owner,
        params: vec![gradients, updater],
        ret: Type::Unit,
        self_access: SelfAccess::Mutating,
        generic_env: aggregate.generic_env.clone(),
        access: aggregate.access,
        implicit: true,
        validation: ValidationState::Checked,
        body: LazyBody::synthesized(BodySynthesizer::CapabilityUpdate),
    };
    trace.record(&aggregate.name, DeriveAction::BuildDecl, &decl.name.to_string(), || {
        decl.signature()
    });
    Ok(decl)
}
