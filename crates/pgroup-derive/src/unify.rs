//! Element-type unification across an aggregate's stored fields.
//!
//! Every field is mapped to its effective element type: the element type its
//! own conformance binds, or the field type itself when it does not conform.
//! The aggregate derives an element type only when all of those agree under
//! exact nominal equality. Assignability, subtyping and alias targets are
//! never consulted.

use pgroup_types::Type;

use crate::capability::Capability;
use crate::oracle::ConformanceOracle;
use crate::trace::{DeriveAction, DeriveTrace};

/// Outcome of unifying an aggregate's field element types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementUnification {
    /// Every field agreed on this element type.
    Unified(Type),
    /// The aggregate has no stored fields.
    Empty,
    /// Field `index` disagreed with the candidate fixed by the first field.
    Mismatch {
        index: usize,
        candidate: Type,
        found: Type,
    },
}

impl ElementUnification {
    pub fn element(self) -> Option<Type> {
        match self {
            ElementUnification::Unified(ty) => Some(ty),
            ElementUnification::Empty | ElementUnification::Mismatch { .. } => None,
        }
    }

    pub fn is_unified(&self) -> bool {
        matches!(self, ElementUnification::Unified(_))
    }
}

/// The element type `ty` contributes to its enclosing aggregate.
pub fn effective_element_type<O: ConformanceOracle + ?Sized>(
    oracle: &O,
    capability: &Capability,
    ty: &Type,
) -> Type {
    oracle
        .conforms(ty, capability)
        .and_then(|witness| oracle.element_type_of(&witness))
        .unwrap_or_else(|| ty.clone())
}

/// Fold the fields' effective element types into a single element type.
///
/// Stops at the first disagreeing field; later fields are not queried.
pub fn unify_element_type<'a, O: ConformanceOracle + ?Sized>(
    oracle: &O,
    capability: &Capability,
    aggregate: &str,
    field_types: impl IntoIterator<Item = &'a Type>,
    trace: &mut DeriveTrace,
) -> ElementUnification {
    let mut fields = field_types.into_iter();
    let Some(first) = fields.next() else {
        trace.record(aggregate, DeriveAction::Empty, "", || {
            "no stored fields".to_string()
        });
        return ElementUnification::Empty;
    };

    let candidate = effective_element_type(oracle, capability, first);
    trace.record(aggregate, DeriveAction::Candidate, "0", || {
        format!("`{first}` contributes `{candidate}`")
    });

    for (offset, ty) in fields.enumerate() {
        let index = offset + 1;
        let found = effective_element_type(oracle, capability, ty);
        if found != candidate {
            trace.record(aggregate, DeriveAction::Mismatch, &index.to_string(), || {
                format!("`{ty}` contributes `{found}`, expected `{candidate}`")
            });
            return ElementUnification::Mismatch {
                index,
                candidate,
                found,
            };
        }
        trace.record(aggregate, DeriveAction::Agree, &index.to_string(), || {
            format!("`{ty}` contributes `{found}`")
        });
    }

    ElementUnification::Unified(candidate)
}
