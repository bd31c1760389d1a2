//! Entry point for host derivation requests.
//!
//! The host type checker asks for one requirement at a time. Requests are
//! resolved against the capability's fixed requirement set once and matched
//! exhaustively; anything outside that set is a broken capability and is
//! reported with a single diagnostic.
//!
//! Conformance questions about an aggregate's fields are asked inside that
//! aggregate's generic environment (see [`InContext`]).

use pgroup_ast::{AggregateId, Block, BodySynthesizer, DeclArena, DeclId};
use pgroup_diag::{Category, Diagnostic, DiagnosticError};
use pgroup_types::Type;

use crate::builder::build_update_decl;
use crate::capability::{Capability, CapabilityRequirement, RequirementDecl, RequirementKind};
use crate::config::DeriveConfig;
use crate::oracle::{ConformanceOracle, InContext, NestedOracle};
use crate::synth::{SynthesisCx, synthesize_update_body};
use crate::trace::{DeriveAction, DeriveStep, DeriveTrace};
use crate::unify::{ElementUnification, unify_element_type};
use crate::{DeriveFailure, span_to_loc};

/// Derives one capability for aggregates in a [`DeclArena`].
///
/// Holds no per-aggregate state: every request is answered from the arena and
/// the oracle. Diagnostics and (when enabled) trace steps accumulate until
/// the host takes them.
pub struct Deriver<O> {
    capability: Capability,
    oracle: O,
    diagnostics: Vec<Diagnostic>,
    trace: DeriveTrace,
}

impl<O: ConformanceOracle> Deriver<O> {
    pub fn new(capability: Capability, oracle: O) -> Self {
        Self {
            capability,
            oracle,
            diagnostics: Vec::new(),
            trace: DeriveTrace::disabled(),
        }
    }

    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Enable step-by-step tracing for observability tools.
    pub fn enable_tracing(&mut self) {
        self.trace.enable();
    }

    pub fn is_tracing(&self) -> bool {
        self.trace.is_enabled()
    }

    /// Recorded trace steps (empty if tracing was not enabled).
    pub fn trace(&self) -> &[DeriveStep] {
        self.trace.steps()
    }

    pub fn take_trace(&mut self) -> Vec<DeriveStep> {
        self.trace.take()
    }

    pub fn trace_json(&self) -> serde_json::Result<String> {
        self.trace.to_json()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Hand the accumulated diagnostics to the host as one error.
    ///
    /// Drains the deriver, so a second call after a failure succeeds.
    pub fn finish(&mut self) -> Result<(), DiagnosticError> {
        if self.diagnostics.is_empty() {
            return Ok(());
        }
        Err(DiagnosticError::multiple(self.take_diagnostics()))
    }

    /// Unify `aggregate`'s field element types without recording anything.
    pub fn unify(&self, arena: &DeclArena, aggregate: AggregateId) -> ElementUnification {
        let decl = arena.aggregate(aggregate);
        unify_element_type(
            &InContext::new(&self.oracle, decl.generic_env.as_ref()),
            &self.capability,
            &decl.name,
            decl.field_types(),
            &mut DeriveTrace::disabled(),
        )
    }

    /// Cheap eligibility check: does `aggregate` have a derivable element type?
    ///
    /// Builds no declarations and realizes no bodies.
    pub fn can_derive(&self, arena: &DeclArena, aggregate: AggregateId) -> bool {
        self.unify(arena, aggregate).is_unified()
    }

    /// Derive the associated element type.
    ///
    /// On success the binding is recorded on the aggregate and its layout is
    /// pinned. An empty or disagreeing aggregate yields `NotDerivable` and no
    /// diagnostic.
    pub fn derive_associated_type(
        &mut self,
        arena: &mut DeclArena,
        aggregate: AggregateId,
        requirement: &RequirementDecl,
    ) -> Result<Type, DeriveFailure> {
        let name = arena.aggregate(aggregate).name.clone();
        match self.capability.resolve(requirement) {
            Some(CapabilityRequirement::AssociatedElementType) => {}
            Some(CapabilityRequirement::UpdateMethod) | None => {
                return Err(self.broken_requirement(&name, requirement));
            }
        }
        tracing::debug!(
            aggregate = %name,
            requirement = %requirement.name,
            "deriving associated element type"
        );

        let decl = arena.aggregate(aggregate);
        let unified = unify_element_type(
            &InContext::new(&self.oracle, decl.generic_env.as_ref()),
            &self.capability,
            &decl.name,
            decl.field_types(),
            &mut self.trace,
        );
        let element = match unified {
            ElementUnification::Unified(element) => element,
            ElementUnification::Empty => {
                tracing::debug!(aggregate = %name, "no stored fields; not derivable");
                return Err(self.not_derivable(&name));
            }
            ElementUnification::Mismatch {
                index,
                candidate,
                found,
            } => {
                tracing::debug!(
                    aggregate = %name,
                    field = index,
                    expected = %candidate,
                    found = %found,
                    "field element types disagree; not derivable"
                );
                return Err(self.not_derivable(&name));
            }
        };

        arena.bind_associated_type(aggregate, self.capability.element_name.clone(), element.clone());
        self.trace.record(&name, DeriveAction::BindElement, &requirement.name, || {
            element.to_string()
        });
        self.pin_layout(arena, aggregate, &name);
        Ok(element)
    }

    /// Derive the update method.
    ///
    /// Builds the implicit declaration with an unrealized body, registers it
    /// on the aggregate and in the arena's synthesized set, and pins the
    /// aggregate's layout. Deriving again returns the registered declaration.
    pub fn derive_method(
        &mut self,
        arena: &mut DeclArena,
        aggregate: AggregateId,
        requirement: &RequirementDecl,
    ) -> Result<DeclId, DeriveFailure> {
        let name = arena.aggregate(aggregate).name.clone();
        match self.capability.resolve(requirement) {
            Some(CapabilityRequirement::UpdateMethod) => {}
            Some(CapabilityRequirement::AssociatedElementType) | None => {
                return Err(self.broken_requirement(&name, requirement));
            }
        }
        tracing::debug!(
            aggregate = %name,
            requirement = %requirement.name,
            "deriving update method"
        );

        let env = arena.aggregate(aggregate).generic_env.as_ref();
        let decl = build_update_decl(
            arena,
            &InContext::new(&self.oracle, env),
            &self.capability,
            aggregate,
            &mut self.trace,
        )?;
        let decl_name = decl.name.to_string();
        let registered_before = arena.synthesized().len();
        let id = arena.add_member(decl);
        let reused = arena.synthesized().len() == registered_before;
        self.trace.record(&name, DeriveAction::Register, &decl_name, || {
            if reused {
                format!("reused existing member #{}", id.0)
            } else {
                format!("registered member #{}", id.0)
            }
        });
        tracing::trace!(aggregate = %name, decl = %decl_name, reused, "registered update method");
        self.pin_layout(arena, aggregate, &name);
        Ok(id)
    }

    /// Realize the body of a synthesized declaration, or return the cached one.
    pub fn realize_body<'a>(&mut self, arena: &'a DeclArena, decl: DeclId) -> &'a Block {
        let func = arena.decl(decl);
        match func.body.synthesizer() {
            Some(BodySynthesizer::CapabilityUpdate) => func.body.realize_with(|| {
                let owner = arena.aggregate(func.owner);
                tracing::debug!(aggregate = %owner.name, decl = %func.name, "synthesizing update body");
                let cx = SynthesisCx {
                    arena,
                    oracle: &InContext::new(&self.oracle, owner.generic_env.as_ref()),
                    capability: &self.capability,
                };
                let block = synthesize_update_body(&cx, func, &mut self.trace);
                self.trace.record(&owner.name, DeriveAction::RealizeBody, &func.name.to_string(), || {
                    format!("{} statements", block.len())
                });
                block
            }),
            None => func
                .body
                .get()
                .expect("declarations without a synthesizer are built with their body"),
        }
    }

    fn pin_layout(&mut self, arena: &mut DeclArena, aggregate: AggregateId, name: &str) {
        arena.mark_fixed_layout(aggregate);
        self.trace.record(name, DeriveAction::FixedLayout, name, String::new);
    }

    fn not_derivable(&self, aggregate: &str) -> DeriveFailure {
        DeriveFailure::NotDerivable {
            aggregate: aggregate.to_string(),
            capability: self.capability.name.clone(),
        }
    }

    fn broken_requirement(&mut self, aggregate: &str, requirement: &RequirementDecl) -> DeriveFailure {
        let kind = match requirement.kind {
            RequirementKind::AssociatedType => "associated type",
            RequirementKind::Method => "method",
        };
        let [element, update] = self.capability.requirement_names();
        let diag = Diagnostic::error(
            Category::BrokenCapabilityRequirement,
            format!(
                "broken `{}` requirement: cannot derive {kind} `{}`",
                self.capability.name, requirement.name
            ),
        )
        .with_help(format!(
            "`{}` derives only the associated type `{element}` and the method `{update}`",
            self.capability.name
        ));
        let diag = if requirement.span.is_synthetic() {
            diag
        } else {
            diag.at(span_to_loc(requirement.span))
        };
        tracing::warn!(
            aggregate = %aggregate,
            requirement = %requirement.name,
            "broken capability requirement"
        );
        self.trace.record(aggregate, DeriveAction::BrokenRequirement, &requirement.name, || {
            kind.to_string()
        });
        self.diagnostics.push(diag);
        DeriveFailure::BrokenRequirement {
            capability: self.capability.name.clone(),
            requirement: requirement.name.clone(),
        }
    }
}

impl<'o, O: ConformanceOracle> Deriver<NestedOracle<&'o O>> {
    /// A deriver configured from `config` that also answers for aggregates in
    /// `arena` that derive the capability themselves.
    pub fn for_arena(config: &DeriveConfig, base: &'o O, arena: &DeclArena) -> Self {
        let capability = Capability::from_config(config);
        let oracle =
            NestedOracle::new(base, &capability, arena).with_memoization(config.memoize_nested);
        Self::new(capability, oracle)
    }
}
