//! Error reporting and diagnostics for ParameterGroup derivation.
//!
//! This crate provides structured diagnostics with source location tracking.
//! Diagnostics are created by `pgroup-derive` (the dispatcher and the
//! capability registry) and rendered here for display. A host compiler is
//! expected to store and format them; this crate only gives them a stable
//! shape and code.

use std::fmt;

use serde::Serialize;

// ---------------------------------------------------------------------------
// Diagnostic severity and categories
// ---------------------------------------------------------------------------

/// How severe a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// Broad category for diagnostics. Used for filtering and grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// A requirement outside the capability's fixed set was asked for.
    BrokenCapabilityRequirement,
    /// A second conformance for the same type constructor was registered.
    DuplicateConformance,
    /// A conformance names a capability the registry does not serve.
    UnknownCapability,
    /// A conformance does not bind the capability's element type.
    MissingElementBinding,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::BrokenCapabilityRequirement,
        Category::DuplicateConformance,
        Category::UnknownCapability,
        Category::MissingElementBinding,
    ];

    pub fn all() -> &'static [Category] {
        &Self::ALL
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::BrokenCapabilityRequirement => "broken_capability_requirement",
            Category::DuplicateConformance => "duplicate_conformance",
            Category::UnknownCapability => "unknown_capability",
            Category::MissingElementBinding => "missing_element_binding",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Category::BrokenCapabilityRequirement => "E0901",
            Category::DuplicateConformance => "E0902",
            Category::UnknownCapability => "E0903",
            Category::MissingElementBinding => "E0904",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Category::BrokenCapabilityRequirement => {
                "The capability definition declares a requirement that cannot be derived."
            }
            Category::DuplicateConformance => {
                "A type already has a registered conformance to this capability."
            }
            Category::UnknownCapability => "A conformance refers to a capability that is not known.",
            Category::MissingElementBinding => {
                "A conformance does not say which element type it operates on."
            }
        }
    }

    pub fn example_fix(self) -> &'static str {
        match self {
            Category::BrokenCapabilityRequirement => {
                "Restore the capability to exactly one element type and one update method."
            }
            Category::DuplicateConformance => "Remove one of the conflicting conformances.",
            Category::UnknownCapability => "Fix the capability name or register the capability.",
            Category::MissingElementBinding => {
                "Bind the element type in the conformance's where clause."
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Source locations
// ---------------------------------------------------------------------------

/// A source location for diagnostics.
///
/// Uses byte offsets. Callers convert from `pgroup-ast` spans to this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SourceLocation {
    pub file_id: u32,
    pub start: u32,
    pub end: u32,
}

// ---------------------------------------------------------------------------
// Diagnostic
// ---------------------------------------------------------------------------

/// A structured diagnostic message.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    /// Stable diagnostic code (e.g. E0901).
    pub code: Option<String>,
    pub severity: Severity,
    pub category: Category,
    /// Primary message: what went wrong.
    pub message: String,
    /// Where it went wrong.
    pub location: Option<SourceLocation>,
    /// Additional labeled spans (e.g., "aggregate declared here").
    pub labels: Vec<DiagLabel>,
    /// Suggested fix, if any.
    pub help: Option<String>,
}

/// A labeled source span within a diagnostic.
#[derive(Debug, Clone, Serialize)]
pub struct DiagLabel {
    pub location: SourceLocation,
    pub message: String,
}

impl Diagnostic {
    pub fn error(category: Category, message: impl Into<String>) -> Self {
        Self {
            code: Some(category.code().to_string()),
            severity: Severity::Error,
            category,
            message: message.into(),
            location: None,
            labels: Vec::new(),
            help: None,
        }
    }

    pub fn warning(category: Category, message: impl Into<String>) -> Self {
        Self {
            code: Some(category.code().to_string()),
            severity: Severity::Warning,
            category,
            message: message.into(),
            location: None,
            labels: Vec::new(),
            help: None,
        }
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_label(mut self, location: SourceLocation, message: impl Into<String>) -> Self {
        self.labels.push(DiagLabel {
            location,
            message: message.into(),
        });
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        if let Some(code) = &self.code {
            write!(f, "{prefix}[{code}]: {}", self.message)?;
        } else {
            write!(f, "{prefix}: {}", self.message)?;
        }
        if let Some(help) = &self.help {
            write!(f, "\n  help: {help}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Error type for crates that produce diagnostics
// ---------------------------------------------------------------------------

/// Error type wrapping one or more diagnostics.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}", .0.first().map(|d| d.to_string()).unwrap_or_default())]
pub struct DiagnosticError(pub Vec<Diagnostic>);

impl DiagnosticError {
    pub fn multiple(diags: Vec<Diagnostic>) -> Self {
        Self(diags)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_builder() {
        let loc = SourceLocation {
            file_id: 0,
            start: 10,
            end: 20,
        };
        let diag = Diagnostic::error(
            Category::BrokenCapabilityRequirement,
            "broken `ParameterGroup` requirement `scale`",
        )
        .at(loc)
        .with_help("expected `Parameter` or `update`");

        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.code.as_deref(), Some("E0901"));
        assert_eq!(diag.category, Category::BrokenCapabilityRequirement);
        assert_eq!(diag.location, Some(loc));
        assert!(diag.message.contains("scale"));
        assert!(diag.help.unwrap().contains("update"));
    }

    #[test]
    fn diagnostic_display() {
        let diag = Diagnostic::error(Category::DuplicateConformance, "`Dense` already conforms");
        let s = format!("{diag}");
        assert!(s.starts_with("error[E0902]: `Dense` already conforms"));
    }

    #[test]
    fn diagnostic_error_displays_first_diagnostic() {
        let err = DiagnosticError::multiple(vec![
            Diagnostic::error(Category::UnknownCapability, "first"),
            Diagnostic::warning(Category::MissingElementBinding, "second"),
        ]);
        assert_eq!(err.to_string(), "error[E0903]: first");
        assert_eq!(err.diagnostics().len(), 2);
    }

    #[test]
    fn category_metadata_is_stable_and_unique() {
        let mut codes = std::collections::BTreeSet::new();
        for cat in Category::all() {
            assert!(!cat.as_str().is_empty());
            assert!(!cat.description().is_empty());
            assert!(!cat.example_fix().is_empty());
            assert!(
                codes.insert(cat.code()),
                "duplicate diagnostic code detected: {}",
                cat.code()
            );
        }
    }
}
