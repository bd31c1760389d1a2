//! Type representations for ParameterGroup derivation.
//!
//! This crate defines the semantic types the derivation engine compares and
//! builds signatures from. Equality is exact nominal equality: two types are
//! the same only when they are spelled by the same constructor with the same
//! arguments. Aliases are kept as their own nodes and never looked through.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A semantic type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Type {
    // -- Primitives --
    Int,
    Float,
    Double,
    Bool,
    String,
    Unit,

    // -- Nominal types --
    /// A nominal type, optionally applied to type arguments: `Dense`,
    /// `Tensor(Float)`. Aggregates being derived for are always `Named`.
    Named { name: String, args: Vec<Type> },
    /// A named alias of another type: `typealias Meters = Float`.
    /// `Alias("Meters", Float)` is not equal to `Float`.
    Alias { name: String, target: Box<Type> },
    /// A generic parameter in scope of the declaration, e.g. `Scalar`.
    Param(String),
    /// An associated type projected from a constrained type: `T.Parameter`.
    Assoc { base: Box<Type>, name: String },

    // -- Compound types --
    Tuple(Vec<Type>),
    Function(FunctionType),
}

/// A function type: `(inout Float, Float) -> ()`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionType {
    pub params: Vec<FnParam>,
    pub ret: Box<Type>,
    /// Non-escaping closures may not outlive the call they are passed to.
    pub escaping: bool,
}

/// One parameter of a function type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FnParam {
    pub ty: Type,
    pub inout: bool,
}

impl FnParam {
    pub fn value(ty: Type) -> Self {
        Self { ty, inout: false }
    }

    pub fn inout(ty: Type) -> Self {
        Self { ty, inout: true }
    }
}

impl FunctionType {
    pub fn new(params: Vec<FnParam>, ret: Type) -> Self {
        Self {
            params,
            ret: Box::new(ret),
            escaping: true,
        }
    }

    pub fn non_escaping(mut self) -> Self {
        self.escaping = false;
        self
    }
}

impl Type {
    /// A nominal type with no arguments.
    pub fn named(name: impl Into<String>) -> Self {
        Type::Named {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// A nominal type applied to arguments.
    pub fn applied(name: impl Into<String>, args: Vec<Type>) -> Self {
        Type::Named {
            name: name.into(),
            args,
        }
    }

    pub fn alias(name: impl Into<String>, target: Type) -> Self {
        Type::Alias {
            name: name.into(),
            target: Box::new(target),
        }
    }

    pub fn param(name: impl Into<String>) -> Self {
        Type::Param(name.into())
    }

    /// The associated type `name` of `base`, e.g. `T.Parameter`.
    pub fn assoc(base: Type, name: impl Into<String>) -> Self {
        Type::Assoc {
            base: Box::new(base),
            name: name.into(),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "Int"),
            Type::Float => write!(f, "Float"),
            Type::Double => write!(f, "Double"),
            Type::Bool => write!(f, "Bool"),
            Type::String => write!(f, "String"),
            Type::Unit => write!(f, "()"),
            Type::Named { name, args } => {
                write!(f, "{name}")?;
                if !args.is_empty() {
                    write!(f, "(")?;
                    write_comma_separated(f, args)?;
                    write!(f, ")")?;
                }
                Ok(())
            }
            Type::Alias { name, .. } => write!(f, "{name}"),
            Type::Param(name) => write!(f, "{name}"),
            Type::Assoc { base, name } => write!(f, "{base}.{name}"),
            Type::Tuple(elems) => {
                write!(f, "#(")?;
                write_comma_separated(f, elems)?;
                write!(f, ")")
            }
            Type::Function(ft) => write!(f, "{ft}"),
        }
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if param.inout {
                write!(f, "inout ")?;
            }
            write!(f, "{}", param.ty)?;
        }
        write!(f, ") -> {}", self.ret)
    }
}

fn write_comma_separated(f: &mut fmt::Formatter<'_>, types: &[Type]) -> fmt::Result {
    for (i, t) in types.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{t}")?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Type constructors
// ---------------------------------------------------------------------------

/// Extract the conformance-lookup type constructor and its type arguments.
///
/// Primitives map to their own names with no arguments, nominal types to
/// `(name, args)`. Aliases are their own constructors: conformances are looked
/// up for the alias name, not for its target. Parameters, projections,
/// tuples and functions have no constructor and can never conform by lookup.
pub fn type_constructor(ty: &Type) -> Option<(String, Vec<Type>)> {
    match ty {
        Type::Int => Some(("Int".into(), vec![])),
        Type::Float => Some(("Float".into(), vec![])),
        Type::Double => Some(("Double".into(), vec![])),
        Type::Bool => Some(("Bool".into(), vec![])),
        Type::String => Some(("String".into(), vec![])),
        Type::Unit => Some(("Unit".into(), vec![])),
        Type::Named { name, args } => Some((name.clone(), args.clone())),
        Type::Alias { name, .. } => Some((name.clone(), vec![])),
        Type::Param(_) | Type::Assoc { .. } | Type::Tuple(_) | Type::Function(_) => None,
    }
}

// ---------------------------------------------------------------------------
// Substitution
// ---------------------------------------------------------------------------

/// Maps generic parameter names to concrete types.
///
/// Used when a conformance is declared on a generic constructor
/// (`Tensor(t)`) and queried for an application of it (`Tensor(Float)`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Substitution {
    params: BTreeMap<String, Type>,
}

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind parameters positionally. Returns `None` on an arity mismatch.
    pub fn zip(names: &[String], args: &[Type]) -> Option<Self> {
        if names.len() != args.len() {
            return None;
        }
        Some(Self {
            params: names.iter().cloned().zip(args.iter().cloned()).collect(),
        })
    }

    pub fn lookup(&self, name: &str) -> Option<&Type> {
        self.params.get(name)
    }

    /// Apply this substitution to a type, replacing every bound parameter.
    ///
    /// Bindings are not re-applied to their own results: impl headers bind
    /// parameters to caller types, which never mention the impl's names.
    pub fn apply(&self, ty: &Type) -> Type {
        match ty {
            Type::Param(name) => match self.lookup(name) {
                Some(resolved) => resolved.clone(),
                None => ty.clone(),
            },
            Type::Named { name, args } => Type::Named {
                name: name.clone(),
                args: args.iter().map(|arg| self.apply(arg)).collect(),
            },
            Type::Alias { name, target } => Type::Alias {
                name: name.clone(),
                target: Box::new(self.apply(target)),
            },
            Type::Assoc { base, name } => Type::Assoc {
                base: Box::new(self.apply(base)),
                name: name.clone(),
            },
            Type::Tuple(elems) => Type::Tuple(elems.iter().map(|elem| self.apply(elem)).collect()),
            Type::Function(ft) => Type::Function(FunctionType {
                params: ft
                    .params
                    .iter()
                    .map(|param| FnParam {
                        ty: self.apply(&param.ty),
                        inout: param.inout,
                    })
                    .collect(),
                ret: Box::new(self.apply(&ft.ret)),
                escaping: ft.escaping,
            }),
            Type::Int | Type::Float | Type::Double | Type::Bool | Type::String | Type::Unit => {
                ty.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn mentions_param(ty: &Type) -> bool {
        match ty {
            Type::Param(_) => true,
            Type::Named { args, .. } => args.iter().any(mentions_param),
            Type::Alias { target, .. } => mentions_param(target),
            Type::Assoc { base, .. } => mentions_param(base),
            Type::Tuple(elems) => elems.iter().any(mentions_param),
            Type::Function(ft) => {
                ft.params.iter().any(|param| mentions_param(&param.ty)) || mentions_param(&ft.ret)
            }
            Type::Int | Type::Float | Type::Double | Type::Bool | Type::String | Type::Unit => false,
        }
    }

    #[test]
    fn alias_is_not_its_target() {
        let meters = Type::alias("Meters", Type::Float);
        assert_ne!(meters, Type::Float);
        assert_eq!(meters, Type::alias("Meters", Type::Float));
        assert_eq!(meters.to_string(), "Meters");
    }

    #[test]
    fn display_nominal_and_function_types() {
        assert_eq!(Type::applied("Tensor", vec![Type::Float]).to_string(), "Tensor(Float)");
        assert_eq!(Type::Tuple(vec![Type::Int, Type::Bool]).to_string(), "#(Int, Bool)");
        let updater = FunctionType::new(
            vec![FnParam::inout(Type::Float), FnParam::value(Type::Float)],
            Type::Unit,
        )
        .non_escaping();
        assert_eq!(updater.to_string(), "(inout Float, Float) -> ()");
        assert!(!updater.escaping);
    }

    #[test]
    fn type_constructor_of_aliases_and_params() {
        assert_eq!(
            type_constructor(&Type::applied("Tensor", vec![Type::Double])),
            Some(("Tensor".to_string(), vec![Type::Double]))
        );
        assert_eq!(
            type_constructor(&Type::alias("Meters", Type::Float)),
            Some(("Meters".to_string(), vec![]))
        );
        assert_eq!(type_constructor(&Type::param("T")), None);
        assert_eq!(type_constructor(&Type::assoc(Type::param("T"), "Parameter")), None);
    }

    #[test]
    fn projection_displays_and_substitutes_its_base() {
        let projected = Type::assoc(Type::param("T"), "Parameter");
        assert_eq!(projected.to_string(), "T.Parameter");
        assert_ne!(projected, Type::param("T"));

        let subst = Substitution::zip(&["T".to_string()], &[Type::named("Dense")]).expect("arity");
        assert_eq!(subst.apply(&projected).to_string(), "Dense.Parameter");
    }

    #[test]
    fn substitution_zip_checks_arity() {
        let names = vec!["t".to_string()];
        assert!(Substitution::zip(&names, &[]).is_none());
        let subst = Substitution::zip(&names, &[Type::Float]).expect("arity matches");
        assert_eq!(subst.apply(&Type::param("t")), Type::Float);
        assert_eq!(subst.apply(&Type::param("u")), Type::param("u"));
    }

    #[test]
    fn substitution_reaches_into_function_params() {
        let subst = Substitution::zip(&["Scalar".to_string()], &[Type::Double]).expect("arity");
        let ft = Type::Function(FunctionType::new(
            vec![FnParam::inout(Type::param("Scalar"))],
            Type::Unit,
        ));
        let applied = subst.apply(&ft);
        assert!(!mentions_param(&applied));
        assert_eq!(applied.to_string(), "(inout Double) -> ()");
    }

    fn arb_type() -> impl Strategy<Value = Type> {
        let leaf = prop_oneof![
            Just(Type::Int),
            Just(Type::Float),
            Just(Type::String),
            prop::sample::select(vec!["a", "b", "c"]).prop_map(Type::param),
            prop::sample::select(vec!["Dense", "Conv"]).prop_map(Type::named),
        ];
        leaf.prop_recursive(3, 16, 3, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 1..3)
                    .prop_map(|args| Type::applied("Tensor", args)),
                prop::collection::vec(inner.clone(), 0..3).prop_map(Type::Tuple),
                inner.prop_map(|target| Type::alias("A", target)),
            ]
        })
    }

    proptest! {
        #[test]
        fn empty_substitution_is_identity(ty in arb_type()) {
            prop_assert_eq!(Substitution::new().apply(&ty), ty);
        }

        #[test]
        fn ground_substitution_removes_bound_params(ty in arb_type()) {
            let names: Vec<String> = ["a", "b", "c"].iter().map(|n| n.to_string()).collect();
            let subst = Substitution::zip(&names, &[Type::Float, Type::Float, Type::Float])
                .expect("arity");
            let applied = subst.apply(&ty);
            prop_assert!(!mentions_param(&applied));
            prop_assert_eq!(subst.apply(&applied), applied.clone());
        }
    }
}
