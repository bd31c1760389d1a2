//! The capability being derived and its fixed requirement set.

use pgroup_ast::{DeclName, Span};

use crate::config::DeriveConfig;

/// A protocol-like requirement set with exactly one associated element type
/// and one `update` method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    pub name: String,
    /// Associated element type, `Parameter` by default.
    pub element_name: String,
    /// Update method base name, `update` by default.
    pub update_name: String,
    pub gradients_label: String,
    pub gradients_name: String,
    pub updater_name: String,
}

/// The two requirements a capability can be asked to derive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityRequirement {
    AssociatedElementType,
    UpdateMethod,
}

/// Whether the host is asking for a type witness or a value witness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequirementKind {
    AssociatedType,
    Method,
}

/// A requirement as the host names it in a derivation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementDecl {
    pub name: String,
    pub kind: RequirementKind,
    pub span: Span,
}

impl RequirementDecl {
    pub fn associated_type(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: RequirementKind::AssociatedType,
            span: Span::synthetic(),
        }
    }

    pub fn method(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: RequirementKind::Method,
            span: Span::synthetic(),
        }
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }
}

impl Capability {
    pub fn parameter_group() -> Self {
        Self::from_config(&DeriveConfig::default())
    }

    pub fn from_config(config: &DeriveConfig) -> Self {
        Self {
            name: config.capability.clone(),
            element_name: config.element_name.clone(),
            update_name: config.update_name.clone(),
            gradients_label: config.gradients_label.clone(),
            gradients_name: config.gradients_name.clone(),
            updater_name: config.updater_name.clone(),
        }
    }

    /// Full name of the update method: `update(withGradients:_:)`.
    pub fn update_decl_name(&self) -> DeclName {
        DeclName::new(
            self.update_name.clone(),
            vec![Some(self.gradients_label.clone()), None],
        )
    }

    /// Map a host requirement onto the fixed requirement set.
    pub fn resolve(&self, requirement: &RequirementDecl) -> Option<CapabilityRequirement> {
        match requirement.kind {
            RequirementKind::AssociatedType if requirement.name == self.element_name => {
                Some(CapabilityRequirement::AssociatedElementType)
            }
            RequirementKind::Method if requirement.name == self.update_name => {
                Some(CapabilityRequirement::UpdateMethod)
            }
            RequirementKind::AssociatedType | RequirementKind::Method => None,
        }
    }

    /// The names a well-formed request may use, for diagnostics.
    pub fn requirement_names(&self) -> [&str; 2] {
        [self.element_name.as_str(), self.update_name.as_str()]
    }
}

impl Default for Capability {
    fn default() -> Self {
        Self::parameter_group()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_only_the_fixed_requirements() {
        let cap = Capability::parameter_group();
        assert_eq!(
            cap.resolve(&RequirementDecl::associated_type("Parameter")),
            Some(CapabilityRequirement::AssociatedElementType)
        );
        assert_eq!(
            cap.resolve(&RequirementDecl::method("update")),
            Some(CapabilityRequirement::UpdateMethod)
        );
        assert_eq!(cap.resolve(&RequirementDecl::method("Parameter")), None);
        assert_eq!(cap.resolve(&RequirementDecl::associated_type("update")), None);
        assert_eq!(cap.resolve(&RequirementDecl::method("scale")), None);
    }

    #[test]
    fn update_decl_name_carries_gradients_label() {
        let cap = Capability::parameter_group();
        assert_eq!(cap.update_decl_name().to_string(), "update(withGradients:_:)");
        assert_eq!(cap.requirement_names(), ["Parameter", "update"]);
    }
}
