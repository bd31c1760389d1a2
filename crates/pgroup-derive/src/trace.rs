//! Derivation traces for compiler observability.
//!
//! These types capture step-by-step traces of element-type unification and
//! body synthesis, so tooling can show why an aggregate did or did not derive
//! its conformance. All tracing is opt-in via `Deriver::enable_tracing()` and
//! costs nothing when disabled.

use serde::Serialize;

/// A single step in a derivation trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeriveStep {
    pub step: usize,
    pub aggregate: String,
    pub action: DeriveAction,
    /// Field, requirement or declaration the step is about.
    pub subject: String,
    pub detail: String,
}

/// What happened during a derivation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeriveAction {
    /// An aggregate without stored fields was asked for its element type.
    Empty,
    /// First field fixed the candidate element type.
    Candidate,
    /// A later field agreed with the candidate.
    Agree,
    /// A field disagreed with the candidate; unification stops.
    Mismatch,
    /// Element type bound on the aggregate.
    BindElement,
    /// Implicit update declaration built.
    BuildDecl,
    /// Declaration registered on the aggregate (or an existing one reused).
    Register,
    /// Field layout pinned.
    FixedLayout,
    /// Body statement delegating to the field's own update.
    Recurse,
    /// Body statement applying the updater to the field.
    ApplyLeaf,
    /// Body realized from its synthesizer.
    RealizeBody,
    /// Request named a requirement outside the capability.
    BrokenRequirement,
}

/// Collected trace steps, recorded only while enabled.
#[derive(Debug, Clone, Default)]
pub struct DeriveTrace {
    enabled: bool,
    steps: Vec<DeriveStep>,
}

impl DeriveTrace {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            steps: Vec::new(),
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record a step. `detail` is only evaluated while tracing is enabled.
    pub fn record(
        &mut self,
        aggregate: &str,
        action: DeriveAction,
        subject: &str,
        detail: impl FnOnce() -> String,
    ) {
        if !self.enabled {
            return;
        }
        self.steps.push(DeriveStep {
            step: self.steps.len(),
            aggregate: aggregate.to_string(),
            action,
            subject: subject.to_string(),
            detail: detail(),
        });
    }

    pub fn steps(&self) -> &[DeriveStep] {
        &self.steps
    }

    pub fn take(&mut self) -> Vec<DeriveStep> {
        std::mem::take(&mut self.steps)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.steps)
    }
}
