//! Derived `ParameterGroup` conformances.
//!
//! Given an aggregate whose stored fields do not come with a hand-written
//! conformance, this crate
//! - infers the associated element type shared by every field (`unify`),
//! - builds the implicit `update(withGradients:_:)` method (`builder`), and
//! - synthesizes that method's body on first read (`synth`), threading the
//!   caller's updater through each field: recursing into fields that conform
//!   themselves and applying the updater directly to the others.
//!
//! The host type checker drives everything through [`Deriver`], answering
//! conformance questions through a [`ConformanceOracle`].

pub mod builder;
pub mod capability;
pub mod config;
pub mod dispatch;
pub mod oracle;
pub mod synth;
pub mod trace;
pub mod unify;

pub use capability::{Capability, CapabilityRequirement, RequirementDecl, RequirementKind};
pub use config::{ConfigError, DeriveConfig};
pub use dispatch::Deriver;
pub use oracle::{
    CapabilityRegistry, ConformanceOracle, ImplInfo, ImplVia, InContext, NestedOracle, Witness,
    WitnessMethod,
};
pub use unify::{ElementUnification, effective_element_type, unify_element_type};

// Re-export for convenience.
pub use pgroup_diag::{Category, Diagnostic, DiagnosticError, SourceLocation};

use pgroup_ast::Span;

/// Why a derivation request did not produce a result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeriveFailure {
    /// The aggregate is empty or its fields disagree on the element type.
    /// No diagnostic is emitted; the host asks for an explicit conformance.
    #[error("`{aggregate}` cannot derive `{capability}`")]
    NotDerivable {
        aggregate: String,
        capability: String,
    },
    /// The requirement is not one of the capability's two requirements.
    /// A diagnostic has been recorded on the deriver.
    #[error("broken `{capability}` requirement `{requirement}`")]
    BrokenRequirement {
        capability: String,
        requirement: String,
    },
}

impl DeriveFailure {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, DeriveFailure::NotDerivable { .. })
    }
}

fn span_to_loc(span: Span) -> SourceLocation {
    SourceLocation {
        file_id: span.file.0,
        start: span.start,
        end: span.end,
    }
}
