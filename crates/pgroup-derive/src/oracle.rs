//! Conformance queries.
//!
//! The derivation engine never decides conformance itself: it asks a
//! [`ConformanceOracle`]. Two oracles live here. [`CapabilityRegistry`]
//! answers from explicitly registered conformances, matched by type
//! constructor. [`NestedOracle`] layers on top of any oracle and answers for
//! aggregates that ask to derive the capability themselves, recursively and
//! memoized per concrete type. [`InContext`] scopes any oracle to one
//! declaration's generic environment, so bounded parameters conform.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};

use pgroup_ast::{DeclArena, DeclId, DeclName, GenericEnv, Span};
use pgroup_diag::{Category, Diagnostic};
use pgroup_types::{Substitution, Type, type_constructor};

use crate::capability::Capability;
use crate::span_to_loc;
use crate::trace::DeriveTrace;
use crate::unify::unify_element_type;

// ---------------------------------------------------------------------------
// Oracle contract
// ---------------------------------------------------------------------------

/// The implementation of a capability method for one concrete type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WitnessMethod {
    pub name: DeclName,
    /// Set when the implementation is a declaration in the host's arena.
    pub decl: Option<DeclId>,
}

/// Proof that a concrete type implements a capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Witness {
    pub ty: Type,
    pub capability: String,
    /// Bound element type, if the conformance binds one.
    pub element: Option<Type>,
    pub update: Option<WitnessMethod>,
    pub via: ImplVia,
}

/// Answers conformance questions for the derivation engine.
///
/// Implementations must be deterministic: the engine may ask the same
/// question several times and relies on getting the same answer.
pub trait ConformanceOracle {
    fn conforms(&self, ty: &Type, capability: &Capability) -> Option<Witness>;

    /// The element type a witness binds.
    fn element_type_of(&self, witness: &Witness) -> Option<Type> {
        witness.element.clone()
    }
}

impl<O: ConformanceOracle + ?Sized> ConformanceOracle for &O {
    fn conforms(&self, ty: &Type, capability: &Capability) -> Option<Witness> {
        (**self).conforms(ty, capability)
    }

    fn element_type_of(&self, witness: &Witness) -> Option<Type> {
        (**self).element_type_of(witness)
    }
}

// ---------------------------------------------------------------------------
// Registry of explicit conformances
// ---------------------------------------------------------------------------

/// Source of a conformance registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImplVia {
    Builtin,
    Manual,
    Derive,
    /// A generic parameter declared with the capability as a bound.
    Bound,
}

impl ImplVia {
    pub fn as_str(self) -> &'static str {
        match self {
            ImplVia::Builtin => "builtin",
            ImplVia::Manual => "manual",
            ImplVia::Derive => "derive",
            ImplVia::Bound => "bound",
        }
    }
}

/// An explicit conformance: `impl ParameterGroup for Tensor(t) where Parameter = t`.
#[derive(Debug, Clone)]
pub struct ImplInfo {
    pub capability: String,
    /// Type constructor the conformance is declared on.
    pub type_name: String,
    /// Type parameters declared in the impl header, bound positionally.
    pub type_params: Vec<String>,
    /// Associated type assignments, e.g. `Parameter` → `t`.
    pub associated_types: BTreeMap<String, Type>,
    /// Method implementations by requirement base name.
    pub methods: BTreeMap<String, WitnessMethod>,
    pub via: ImplVia,
    pub span: Span,
}

impl ImplInfo {
    pub fn new(capability: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
            type_name: type_name.into(),
            type_params: Vec::new(),
            associated_types: BTreeMap::new(),
            methods: BTreeMap::new(),
            via: ImplVia::Manual,
            span: Span::synthetic(),
        }
    }

    pub fn with_type_params(mut self, params: &[&str]) -> Self {
        self.type_params = params.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_associated_type(mut self, name: impl Into<String>, ty: Type) -> Self {
        self.associated_types.insert(name.into(), ty);
        self
    }

    pub fn with_method(mut self, requirement: impl Into<String>, method: WitnessMethod) -> Self {
        self.methods.insert(requirement.into(), method);
        self
    }

    pub fn via(mut self, via: ImplVia) -> Self {
        self.via = via;
        self
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }
}

/// Explicit conformances, keyed by capability and type constructor.
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    capabilities: BTreeMap<String, Capability>,
    impls: Vec<ImplInfo>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that already knows `capability`.
    pub fn with_capability(capability: Capability) -> Self {
        let mut registry = Self::new();
        registry.register_capability(capability);
        registry
    }

    pub fn register_capability(&mut self, capability: Capability) {
        self.capabilities.insert(capability.name.clone(), capability);
    }

    /// Register an explicit conformance.
    ///
    /// Rejected when the capability is unknown, when the conformance does not
    /// bind the element type, or when the type constructor already conforms.
    pub fn register_impl(&mut self, info: ImplInfo) -> Result<(), Diagnostic> {
        let Some(capability) = self.capabilities.get(&info.capability) else {
            return Err(Diagnostic::error(
                Category::UnknownCapability,
                format!("unknown capability `{}`", info.capability),
            )
            .at(span_to_loc(info.span)));
        };
        if !info.associated_types.contains_key(&capability.element_name) {
            return Err(Diagnostic::error(
                Category::MissingElementBinding,
                format!(
                    "conformance of `{}` to `{}` does not bind `{}`",
                    info.type_name, info.capability, capability.element_name
                ),
            )
            .at(span_to_loc(info.span))
            .with_help(format!(
                "add `where {} = <type>` to the conformance",
                capability.element_name
            )));
        }
        if let Some(existing) = self
            .impls
            .iter()
            .find(|imp| imp.capability == info.capability && imp.type_name == info.type_name)
        {
            return Err(Diagnostic::error(
                Category::DuplicateConformance,
                format!(
                    "`{}` already conforms to `{}` ({})",
                    info.type_name,
                    info.capability,
                    existing.via.as_str()
                ),
            )
            .at(span_to_loc(info.span))
            .with_label(span_to_loc(existing.span), "first conformance declared here"));
        }
        self.impls.push(info);
        Ok(())
    }

    /// Find the conformance for `ty` and bind its impl type parameters.
    fn solve(&self, ty: &Type, capability: &Capability) -> Option<Witness> {
        let (type_name, type_args) = type_constructor(ty)?;
        let imp = self
            .impls
            .iter()
            .find(|imp| imp.capability == capability.name && imp.type_name == type_name)?;
        let subst = if imp.type_params.is_empty() {
            Substitution::new()
        } else {
            Substitution::zip(&imp.type_params, &type_args)?
        };
        let element = imp
            .associated_types
            .get(&capability.element_name)
            .map(|bound| subst.apply(bound));
        let update = imp
            .methods
            .get(&capability.update_name)
            .cloned()
            .unwrap_or_else(|| WitnessMethod {
                name: capability.update_decl_name(),
                decl: None,
            });
        Some(Witness {
            ty: ty.clone(),
            capability: capability.name.clone(),
            element,
            update: Some(update),
            via: imp.via,
        })
    }
}

impl ConformanceOracle for CapabilityRegistry {
    fn conforms(&self, ty: &Type, capability: &Capability) -> Option<Witness> {
        self.solve(ty, capability)
    }
}

// ---------------------------------------------------------------------------
// Nested aggregates deriving the capability
// ---------------------------------------------------------------------------

/// Field shape of an aggregate that asked to derive the capability.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DerivingShape {
    type_params: Vec<String>,
    field_types: Vec<Type>,
}

/// Answers for aggregates that derive the capability, on top of `base`.
///
/// An aggregate listed as deriving the capability, with no explicit
/// conformance in `base`, conforms exactly when its own fields unify; its
/// element type is the unified one. Shapes are snapshotted from the arena at
/// construction. Aggregates reached again while their own answer is being
/// computed do not conform.
#[derive(Debug)]
pub struct NestedOracle<O> {
    base: O,
    capability: String,
    shapes: BTreeMap<String, DerivingShape>,
    memoize: bool,
    memo: RefCell<BTreeMap<Type, Option<Witness>>>,
    in_progress: RefCell<BTreeSet<Type>>,
    cycle_seen: Cell<bool>,
}

impl<O: ConformanceOracle> NestedOracle<O> {
    pub fn new(base: O, capability: &Capability, arena: &DeclArena) -> Self {
        let shapes = arena
            .aggregates()
            .filter(|(_, agg)| agg.derives.contains(&capability.name))
            .map(|(_, agg)| {
                (
                    agg.name.clone(),
                    DerivingShape {
                        type_params: agg.type_params.clone(),
                        field_types: agg.field_types().cloned().collect(),
                    },
                )
            })
            .collect();
        Self {
            base,
            capability: capability.name.clone(),
            shapes,
            memoize: true,
            memo: RefCell::new(BTreeMap::new()),
            in_progress: RefCell::new(BTreeSet::new()),
            cycle_seen: Cell::new(false),
        }
    }

    pub fn with_memoization(mut self, memoize: bool) -> Self {
        self.memoize = memoize;
        self
    }

    /// Number of cached answers.
    pub fn memoized(&self) -> usize {
        self.memo.borrow().len()
    }

    fn derive_nested(&self, ty: &Type, capability: &Capability) -> Option<Witness> {
        let Type::Named { name, args } = ty else {
            return None;
        };
        let shape = self.shapes.get(name)?;
        if let Some(cached) = self.memo.borrow().get(ty) {
            return cached.clone();
        }
        let subst = Substitution::zip(&shape.type_params, args)?;
        if !self.in_progress.borrow_mut().insert(ty.clone()) {
            self.cycle_seen.set(true);
            return None;
        }

        let outer_cycle = self.cycle_seen.replace(false);
        let field_types: Vec<Type> = shape.field_types.iter().map(|t| subst.apply(t)).collect();
        let element = unify_element_type(
            self,
            capability,
            name,
            field_types.iter(),
            &mut DeriveTrace::disabled(),
        )
        .element();
        let witness = element.map(|element| Witness {
            ty: ty.clone(),
            capability: capability.name.clone(),
            element: Some(element),
            update: Some(WitnessMethod {
                name: capability.update_decl_name(),
                decl: None,
            }),
            via: ImplVia::Derive,
        });

        self.in_progress.borrow_mut().remove(ty);
        let hit_cycle = self.cycle_seen.replace(outer_cycle || self.cycle_seen.get());
        if self.memoize && !hit_cycle {
            self.memo.borrow_mut().insert(ty.clone(), witness.clone());
        }
        witness
    }
}

impl<O: ConformanceOracle> ConformanceOracle for NestedOracle<O> {
    fn conforms(&self, ty: &Type, capability: &Capability) -> Option<Witness> {
        if let Some(witness) = self.base.conforms(ty, capability) {
            return Some(witness);
        }
        if capability.name != self.capability {
            return None;
        }
        self.derive_nested(ty, capability)
    }

    fn element_type_of(&self, witness: &Witness) -> Option<Type> {
        match witness.via {
            ImplVia::Derive if witness.element.is_some() => witness.element.clone(),
            _ => self.base.element_type_of(witness),
        }
    }
}

// ---------------------------------------------------------------------------
// Generic context of one declaration
// ---------------------------------------------------------------------------

/// Answers inside one declaration's generic environment, on top of `base`.
///
/// A generic parameter declared with the capability among its bounds
/// conforms; its element type is the projection `T.Parameter`. Every other
/// question goes to `base`.
#[derive(Debug)]
pub struct InContext<'a, O: ?Sized> {
    base: &'a O,
    env: Option<&'a GenericEnv>,
}

impl<'a, O: ConformanceOracle + ?Sized> InContext<'a, O> {
    pub fn new(base: &'a O, env: Option<&'a GenericEnv>) -> Self {
        Self { base, env }
    }

    fn bounded(&self, ty: &Type, capability: &Capability) -> Option<Witness> {
        let Type::Param(name) = ty else {
            return None;
        };
        if !self.env?.is_bounded_by(name, &capability.name) {
            return None;
        }
        Some(Witness {
            ty: ty.clone(),
            capability: capability.name.clone(),
            element: Some(Type::assoc(ty.clone(), &capability.element_name)),
            update: Some(WitnessMethod {
                name: capability.update_decl_name(),
                decl: None,
            }),
            via: ImplVia::Bound,
        })
    }
}

impl<O: ConformanceOracle + ?Sized> ConformanceOracle for InContext<'_, O> {
    fn conforms(&self, ty: &Type, capability: &Capability) -> Option<Witness> {
        self.bounded(ty, capability)
            .or_else(|| self.base.conforms(ty, capability))
    }

    fn element_type_of(&self, witness: &Witness) -> Option<Type> {
        match witness.via {
            ImplVia::Bound => witness.element.clone(),
            _ => self.base.element_type_of(witness),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgroup_ast::AggregateDecl;

    fn registry() -> CapabilityRegistry {
        let cap = Capability::parameter_group();
        let mut registry = CapabilityRegistry::with_capability(cap);
        registry
            .register_impl(
                ImplInfo::new("ParameterGroup", "Dense")
                    .with_associated_type("Parameter", Type::Float),
            )
            .expect("register Dense");
        registry
            .register_impl(
                ImplInfo::new("ParameterGroup", "Tensor")
                    .with_type_params(&["t"])
                    .with_associated_type("Parameter", Type::param("t"))
                    .via(ImplVia::Builtin),
            )
            .expect("register Tensor");
        registry
    }

    #[test]
    fn registry_binds_impl_type_params() {
        let registry = registry();
        let cap = Capability::parameter_group();
        let witness = registry
            .conforms(&Type::applied("Tensor", vec![Type::Double]), &cap)
            .expect("Tensor(Double) conforms");
        assert_eq!(registry.element_type_of(&witness), Some(Type::Double));
        assert_eq!(witness.via, ImplVia::Builtin);
        assert_eq!(
            witness.update.map(|m| m.name.to_string()),
            Some("update(withGradients:_:)".to_string())
        );
    }

    #[test]
    fn registry_rejects_arity_mismatch_and_unknown_types() {
        let registry = registry();
        let cap = Capability::parameter_group();
        assert!(registry.conforms(&Type::named("Tensor"), &cap).is_none());
        assert!(registry.conforms(&Type::Float, &cap).is_none());
        assert!(registry.conforms(&Type::param("T"), &cap).is_none());
    }

    #[test]
    fn registry_does_not_look_through_aliases() {
        let registry = registry();
        let cap = Capability::parameter_group();
        let alias = Type::alias("Layer", Type::named("Dense"));
        assert!(registry.conforms(&alias, &cap).is_none());
    }

    #[test]
    fn register_impl_diagnostics() {
        let mut registry = registry();

        let dup = registry
            .register_impl(
                ImplInfo::new("ParameterGroup", "Dense")
                    .with_associated_type("Parameter", Type::Double),
            )
            .expect_err("duplicate");
        assert_eq!(dup.category, Category::DuplicateConformance);
        assert_eq!(dup.labels.len(), 1);

        let unknown = registry
            .register_impl(ImplInfo::new("Missing", "Dense"))
            .expect_err("unknown capability");
        assert_eq!(unknown.category, Category::UnknownCapability);

        let unbound = registry
            .register_impl(ImplInfo::new("ParameterGroup", "Conv"))
            .expect_err("missing element");
        assert_eq!(unbound.category, Category::MissingElementBinding);
        assert_eq!(unbound.code.as_deref(), Some("E0904"));
    }

    #[test]
    fn nested_oracle_derives_deriving_aggregates() {
        let cap = Capability::parameter_group();
        let mut arena = DeclArena::new();
        arena
            .add_aggregate(
                AggregateDecl::new("Block")
                    .with_field("a", Type::named("Dense"))
                    .with_field("b", Type::Float)
                    .deriving("ParameterGroup"),
            )
            .expect("declare Block");
        arena
            .add_aggregate(AggregateDecl::new("Plain").with_field("a", Type::Float))
            .expect("declare Plain");

        let oracle = NestedOracle::new(registry(), &cap, &arena);
        let witness = oracle
            .conforms(&Type::named("Block"), &cap)
            .expect("Block derives");
        assert_eq!(witness.via, ImplVia::Derive);
        assert_eq!(oracle.element_type_of(&witness), Some(Type::Float));
        assert!(oracle.conforms(&Type::named("Plain"), &cap).is_none());
        assert_eq!(oracle.memoized(), 1);

        // Explicit conformances still come from the base registry.
        let dense = oracle
            .conforms(&Type::named("Dense"), &cap)
            .expect("Dense conforms");
        assert_eq!(dense.via, ImplVia::Manual);
    }

    #[test]
    fn nested_oracle_stops_on_self_reference() {
        let cap = Capability::parameter_group();
        let mut arena = DeclArena::new();
        arena
            .add_aggregate(
                AggregateDecl::new("Loop")
                    .with_field("next", Type::named("Loop"))
                    .with_field("w", Type::Float)
                    .deriving("ParameterGroup"),
            )
            .expect("declare Loop");

        let oracle = NestedOracle::new(CapabilityRegistry::with_capability(cap.clone()), &cap, &arena);
        // `next` is treated as a leaf of type `Loop`, which disagrees with `Float`.
        assert!(oracle.conforms(&Type::named("Loop"), &cap).is_none());
        assert_eq!(oracle.memoized(), 0);
    }

    #[test]
    fn nested_oracle_substitutes_generic_fields() {
        let cap = Capability::parameter_group();
        let mut arena = DeclArena::new();
        arena
            .add_aggregate(
                AggregateDecl::new("Affine")
                    .with_type_param("Scalar", vec![])
                    .with_field("w", Type::applied("Tensor", vec![Type::param("Scalar")]))
                    .with_field("b", Type::param("Scalar"))
                    .deriving("ParameterGroup"),
            )
            .expect("declare Affine");

        let oracle = NestedOracle::new(registry(), &cap, &arena).with_memoization(false);
        let witness = oracle
            .conforms(&Type::applied("Affine", vec![Type::Double]), &cap)
            .expect("Affine(Double) derives");
        assert_eq!(witness.element, Some(Type::Double));
        assert_eq!(oracle.memoized(), 0);
    }

    #[test]
    fn nested_oracle_rejects_wrong_type_argument_count() {
        let cap = Capability::parameter_group();
        let mut arena = DeclArena::new();
        arena
            .add_aggregate(
                AggregateDecl::new("Affine")
                    .with_type_param("Scalar", vec![])
                    .with_field("b", Type::param("Scalar"))
                    .deriving("ParameterGroup"),
            )
            .expect("declare Affine");

        let oracle = NestedOracle::new(registry(), &cap, &arena);
        // Same answer the registry gives for an unapplied `Tensor`.
        assert!(oracle.conforms(&Type::named("Affine"), &cap).is_none());
        assert!(
            oracle
                .conforms(&Type::applied("Affine", vec![Type::Float, Type::Float]), &cap)
                .is_none()
        );
        assert!(registry().conforms(&Type::named("Tensor"), &cap).is_none());
        assert_eq!(oracle.memoized(), 0);
    }

    #[test]
    fn bounded_params_conform_in_their_context() {
        let cap = Capability::parameter_group();
        let decl = AggregateDecl::new("Model")
            .with_type_param("T", vec!["ParameterGroup".into()])
            .with_type_param("U", vec!["Numeric".into()]);
        let registry = registry();
        let oracle = InContext::new(&registry, decl.generic_env.as_ref());

        let witness = oracle
            .conforms(&Type::param("T"), &cap)
            .expect("T is bounded by ParameterGroup");
        assert_eq!(witness.via, ImplVia::Bound);
        assert_eq!(
            oracle.element_type_of(&witness),
            Some(Type::assoc(Type::param("T"), "Parameter"))
        );
        assert!(oracle.conforms(&Type::param("U"), &cap).is_none());
        assert!(oracle.conforms(&Type::param("V"), &cap).is_none());

        // Outside any context the same parameter is a leaf.
        let bare = InContext::new(&registry, None);
        assert!(bare.conforms(&Type::param("T"), &cap).is_none());
        assert_eq!(
            bare.conforms(&Type::named("Dense"), &cap).map(|w| w.via),
            Some(ImplVia::Manual)
        );
    }
}
