//! Declaration model for ParameterGroup derivation.
//!
//! This crate defines what the host hands to the derivation engine
//! (aggregates and their stored fields) and what the engine hands back
//! (implicit method declarations with lazily synthesized bodies). Every
//! declaration carries a [`Span`] for source location tracking; compiler
//! generated nodes use [`Span::synthetic`].

mod arena;
mod expr;

pub use arena::DeclArena;
pub use expr::{Arg, Block, Expr, ExprKind, Stmt, WitnessRef};

use std::cell::OnceCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use pgroup_types::Type;

// ---------------------------------------------------------------------------
// Spans
// ---------------------------------------------------------------------------

/// Identifies a source file in the compilation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub u32);

/// A byte offset range within a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Span {
    pub file: FileId,
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(file: FileId, start: u32, end: u32) -> Self {
        Self { file, start, end }
    }

    /// A synthetic span for compiler-generated nodes.
    pub fn synthetic() -> Self {
        Self {
            file: FileId(u32::MAX),
            start: 0,
            end: 0,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.file == FileId(u32::MAX)
    }
}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Index of an aggregate inside a [`DeclArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AggregateId(pub u32);

/// Index of a function declaration inside a [`DeclArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeclId(pub u32);

// ---------------------------------------------------------------------------
// Aggregates
// ---------------------------------------------------------------------------

/// Declared visibility of a type or member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum AccessLevel {
    Private,
    FilePrivate,
    #[default]
    Internal,
    Public,
}

/// A generic parameter together with the capability names it is bounded by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericParam {
    pub name: String,
    pub bounds: Vec<String>,
}

/// Generic environment of a declaration context.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GenericEnv {
    pub params: Vec<GenericParam>,
}

impl GenericEnv {
    /// Whether parameter `name` is declared with `bound` among its bounds.
    pub fn is_bounded_by(&self, name: &str, bound: &str) -> bool {
        self.params
            .iter()
            .any(|param| param.name == name && param.bounds.iter().any(|b| b == bound))
    }
}

/// A stored field of an aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredField {
    pub name: String,
    pub ty: Type,
    pub span: Span,
}

impl StoredField {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            span: Span::synthetic(),
        }
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }
}

/// A nominal type with named stored fields.
///
/// `fields` is the host's input and is only read by the derivation engine.
/// `members`, `fixed_layout` and `associated_types` are written through the
/// [`DeclArena`] registration API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateDecl {
    pub name: String,
    pub type_params: Vec<String>,
    pub fields: Vec<StoredField>,
    pub generic_env: Option<GenericEnv>,
    pub access: AccessLevel,
    pub span: Span,
    /// Capabilities this aggregate asked to have derived.
    pub derives: BTreeSet<String>,
    pub members: Vec<DeclId>,
    pub fixed_layout: bool,
    /// Associated type bindings recorded by the host, e.g. `Parameter = Float`.
    pub associated_types: BTreeMap<String, Type>,
}

impl AggregateDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_params: Vec::new(),
            fields: Vec::new(),
            generic_env: None,
            access: AccessLevel::default(),
            span: Span::synthetic(),
            derives: BTreeSet::new(),
            members: Vec::new(),
            fixed_layout: false,
            associated_types: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, ty: Type) -> Self {
        self.fields.push(StoredField::new(name, ty));
        self
    }

    pub fn with_fields<N: Into<String>>(mut self, fields: impl IntoIterator<Item = (N, Type)>) -> Self {
        self.fields
            .extend(fields.into_iter().map(|(name, ty)| StoredField::new(name, ty)));
        self
    }

    /// Add a generic parameter, also recording it in the generic environment.
    pub fn with_type_param(mut self, name: impl Into<String>, bounds: Vec<String>) -> Self {
        let name = name.into();
        self.type_params.push(name.clone());
        self.generic_env
            .get_or_insert_with(GenericEnv::default)
            .params
            .push(GenericParam { name, bounds });
        self
    }

    pub fn with_access(mut self, access: AccessLevel) -> Self {
        self.access = access;
        self
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Request derivation of `capability` for this aggregate.
    pub fn deriving(mut self, capability: impl Into<String>) -> Self {
        self.derives.insert(capability.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&StoredField> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn field_types(&self) -> impl Iterator<Item = &Type> {
        self.fields.iter().map(|field| &field.ty)
    }

    /// The aggregate's type as seen from inside its own declaration:
    /// `Model(Scalar)` for `struct Model<Scalar>`.
    pub fn declared_interface_type(&self) -> Type {
        Type::applied(
            self.name.clone(),
            self.type_params.iter().cloned().map(Type::Param).collect(),
        )
    }
}

// ---------------------------------------------------------------------------
// Function declarations
// ---------------------------------------------------------------------------

/// A full declaration name: base name plus argument labels.
///
/// Displays as `update(withGradients:_:)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeclName {
    pub base: String,
    pub labels: Vec<Option<String>>,
}

impl DeclName {
    pub fn new(base: impl Into<String>, labels: Vec<Option<String>>) -> Self {
        Self {
            base: base.into(),
            labels,
        }
    }
}

impl fmt::Display for DeclName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.base)?;
        for label in &self.labels {
            write!(f, "{}:", label.as_deref().unwrap_or("_"))?;
        }
        write!(f, ")")
    }
}

/// A formal parameter: `withGradients gradients: Self`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDecl {
    /// Argument label used at call sites; `None` for `_`.
    pub label: Option<String>,
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelfAccess {
    NonMutating,
    Mutating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationState {
    Unchecked,
    Checked,
}

/// Which synthesizer produces a deferred body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodySynthesizer {
    /// Per-field traversal that threads an updater through the aggregate.
    CapabilityUpdate,
}

/// A body that is either written out or synthesized on first read.
///
/// Once realized the block is cached for the lifetime of the declaration.
#[derive(Debug, Clone)]
pub struct LazyBody {
    synthesizer: Option<BodySynthesizer>,
    block: OnceCell<Block>,
}

impl LazyBody {
    pub fn synthesized(synthesizer: BodySynthesizer) -> Self {
        Self {
            synthesizer: Some(synthesizer),
            block: OnceCell::new(),
        }
    }

    pub fn explicit(block: Block) -> Self {
        Self {
            synthesizer: None,
            block: OnceCell::from(block),
        }
    }

    pub fn synthesizer(&self) -> Option<BodySynthesizer> {
        self.synthesizer
    }

    pub fn is_realized(&self) -> bool {
        self.block.get().is_some()
    }

    /// The body if it has already been realized.
    pub fn get(&self) -> Option<&Block> {
        self.block.get()
    }

    /// Realize the body with `synthesize` unless it already is.
    pub fn realize_with(&self, synthesize: impl FnOnce() -> Block) -> &Block {
        self.block.get_or_init(synthesize)
    }
}

impl PartialEq for LazyBody {
    fn eq(&self, other: &Self) -> bool {
        self.synthesizer == other.synthesizer && self.block.get() == other.block.get()
    }
}

impl Eq for LazyBody {}

/// A method declaration owned by an aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncDecl {
    pub name: DeclName,
    pub owner: AggregateId,
    pub params: Vec<ParamDecl>,
    pub ret: Type,
    pub self_access: SelfAccess,
    pub generic_env: Option<GenericEnv>,
    pub access: AccessLevel,
    /// Compiler-generated declarations are implicit.
    pub implicit: bool,
    pub validation: ValidationState,
    pub body: LazyBody,
}

impl FuncDecl {
    pub fn param(&self, index: usize) -> Option<&ParamDecl> {
        self.params.get(index)
    }

    pub fn is_mutating(&self) -> bool {
        self.self_access == SelfAccess::Mutating
    }

    /// Render the signature the way it would be written in source.
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|param| match &param.label {
                Some(label) if *label == param.name => format!("{}: {}", param.name, param.ty),
                Some(label) => format!("{label} {}: {}", param.name, param.ty),
                None => format!("_ {}: {}", param.name, param.ty),
            })
            .collect();
        let mutating = if self.is_mutating() { "mutating " } else { "" };
        format!(
            "{mutating}func {}({}) -> {}",
            self.name.base,
            params.join(", "),
            self.ret
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_of(n: usize) -> Block {
        Block::implicit(
            (0..n)
                .map(|i| Stmt::Expr(Expr::param_ref(format!("p{i}"), Type::Float)))
                .collect(),
        )
    }

    #[test]
    fn decl_name_display_uses_underscore_for_unlabeled() {
        let name = DeclName::new("update", vec![Some("withGradients".into()), None]);
        assert_eq!(name.to_string(), "update(withGradients:_:)");
    }

    #[test]
    fn lazy_body_realizes_once() {
        let body = LazyBody::synthesized(BodySynthesizer::CapabilityUpdate);
        assert!(!body.is_realized());
        assert!(body.get().is_none());

        let mut calls = 0;
        let first = body
            .realize_with(|| {
                calls += 1;
                block_of(2)
            })
            .clone();
        let second = body.realize_with(|| block_of(5));

        assert_eq!(calls, 1);
        assert_eq!(&first, second);
        assert_eq!(second.stmts.len(), 2);
        assert!(body.is_realized());
    }

    #[test]
    fn explicit_body_is_already_realized() {
        let body = LazyBody::explicit(block_of(1));
        assert!(body.is_realized());
        assert_eq!(body.synthesizer(), None);
    }

    #[test]
    fn declared_interface_type_uses_type_params() {
        let agg = AggregateDecl::new("Model")
            .with_type_param("Scalar", vec!["ParameterGroup".into()])
            .with_field("w", Type::param("Scalar"));
        assert_eq!(agg.declared_interface_type().to_string(), "Model(Scalar)");
        let env = agg.generic_env.as_ref().expect("type param recorded");
        assert_eq!(env.params[0].bounds, vec!["ParameterGroup".to_string()]);
        assert!(env.is_bounded_by("Scalar", "ParameterGroup"));
        assert!(!env.is_bounded_by("Scalar", "Numeric"));
        assert!(!env.is_bounded_by("Other", "ParameterGroup"));
        assert_eq!(agg.field("w").map(|f| &f.ty), Some(&Type::param("Scalar")));
        assert!(agg.field("missing").is_none());
    }

    #[test]
    fn synthetic_spans_are_recognized() {
        let a = Span::new(FileId(1), 4, 8);
        assert!(Span::synthetic().is_synthetic());
        assert!(!a.is_synthetic());
    }
}
