//! Typed implicit expression tree for synthesized bodies.
//!
//! Only the shapes the synthesizer emits exist here: references to `self`
//! and parameters, member access, in-out arguments, witness method references
//! and calls. Every node carries its type so later passes need not re-infer.

use std::fmt;

use pgroup_types::Type;

use crate::{DeclId, DeclName};

/// A reference to the declaration implementing a capability method for a
/// concrete type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WitnessRef {
    /// Type the witness belongs to, e.g. `Dense`.
    pub owner: Type,
    pub name: DeclName,
    /// Set when the witness is itself a synthesized declaration in the arena.
    pub decl: Option<DeclId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
    pub implicit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprKind {
    SelfRef,
    ParamRef(String),
    Member {
        base: Box<Expr>,
        field: String,
    },
    /// `&expr`: pass a storage location as an in-out argument.
    InOut(Box<Expr>),
    /// `base.method`, the witness method partially applied to its receiver.
    MethodRef {
        base: Box<Expr>,
        witness: WitnessRef,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Arg>,
    },
}

/// A call argument with its optional label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arg {
    pub label: Option<String>,
    pub value: Expr,
}

impl Arg {
    pub fn unlabeled(value: Expr) -> Self {
        Self { label: None, value }
    }

    pub fn labeled(label: impl Into<String>, value: Expr) -> Self {
        Self {
            label: Some(label.into()),
            value,
        }
    }
}

impl Expr {
    fn implicit(kind: ExprKind, ty: Type) -> Self {
        Self {
            kind,
            ty,
            implicit: true,
        }
    }

    pub fn self_ref(ty: Type) -> Self {
        Self::implicit(ExprKind::SelfRef, ty)
    }

    pub fn param_ref(name: impl Into<String>, ty: Type) -> Self {
        Self::implicit(ExprKind::ParamRef(name.into()), ty)
    }

    pub fn member(base: Expr, field: impl Into<String>, ty: Type) -> Self {
        Self::implicit(
            ExprKind::Member {
                base: Box::new(base),
                field: field.into(),
            },
            ty,
        )
    }

    /// In-out wrapper; keeps the type of the wrapped storage.
    pub fn inout(inner: Expr) -> Self {
        let ty = inner.ty.clone();
        Self::implicit(ExprKind::InOut(Box::new(inner)), ty)
    }

    pub fn method_ref(base: Expr, witness: WitnessRef, ty: Type) -> Self {
        Self::implicit(
            ExprKind::MethodRef {
                base: Box::new(base),
                witness,
            },
            ty,
        )
    }

    pub fn call(callee: Expr, args: Vec<Arg>, ty: Type) -> Self {
        Self::implicit(
            ExprKind::Call {
                callee: Box::new(callee),
                args,
            },
            ty,
        )
    }

    /// True for a call whose callee is a witness method reference.
    pub fn is_method_call(&self) -> bool {
        matches!(
            &self.kind,
            ExprKind::Call { callee, .. } if matches!(callee.kind, ExprKind::MethodRef { .. })
        )
    }

    /// True for a call of a plain parameter (the updater closure).
    pub fn is_param_call(&self) -> bool {
        matches!(
            &self.kind,
            ExprKind::Call { callee, .. } if matches!(callee.kind, ExprKind::ParamRef(_))
        )
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::SelfRef => write!(f, "self"),
            ExprKind::ParamRef(name) => write!(f, "{name}"),
            ExprKind::Member { base, field } => write!(f, "{base}.{field}"),
            ExprKind::InOut(inner) => write!(f, "&{inner}"),
            ExprKind::MethodRef { base, witness } => write!(f, "{base}.{}", witness.name.base),
            ExprKind::Call { callee, args } => {
                write!(f, "{callee}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    if let Some(label) = &arg.label {
                        write!(f, "{label}: ")?;
                    }
                    write!(f, "{}", arg.value)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Expr(Expr),
}

impl Stmt {
    pub fn as_expr(&self) -> &Expr {
        match self {
            Stmt::Expr(expr) => expr,
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Expr(expr) => write!(f, "{expr}"),
        }
    }
}

/// A brace statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub implicit: bool,
}

impl Block {
    pub fn implicit(stmts: Vec<Stmt>) -> Self {
        Self {
            stmts,
            implicit: true,
        }
    }

    pub fn len(&self) -> usize {
        self.stmts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{{")?;
        for stmt in &self.stmts {
            writeln!(f, "  {stmt}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgroup_types::{FnParam, FunctionType};

    #[test]
    fn leaf_application_renders_inout_argument() {
        let model = Type::named("Point");
        let updater_ty = Type::Function(
            FunctionType::new(
                vec![FnParam::inout(Type::Float), FnParam::value(Type::Float)],
                Type::Unit,
            )
            .non_escaping(),
        );
        let call = Expr::call(
            Expr::param_ref("updater", updater_ty),
            vec![
                Arg::unlabeled(Expr::inout(Expr::member(
                    Expr::self_ref(model.clone()),
                    "x",
                    Type::Float,
                ))),
                Arg::unlabeled(Expr::member(
                    Expr::param_ref("gradients", model),
                    "x",
                    Type::Float,
                )),
            ],
            Type::Unit,
        );
        assert_eq!(call.to_string(), "updater(&self.x, gradients.x)");
        assert!(call.is_param_call());
        assert!(!call.is_method_call());
        assert!(call.implicit);
    }

    #[test]
    fn block_display_lists_one_statement_per_line() {
        let block = Block::implicit(vec![
            Stmt::Expr(Expr::param_ref("a", Type::Int)),
            Stmt::Expr(Expr::param_ref("b", Type::Int)),
        ]);
        assert_eq!(block.to_string(), "{\n  a\n  b\n}");
        assert_eq!(block.len(), 2);
        assert!(!block.is_empty());
    }
}
