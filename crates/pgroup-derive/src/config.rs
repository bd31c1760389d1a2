//! Naming configuration for the derived capability.

use serde::{Deserialize, Serialize};

/// Names used when resolving requirements and building the update method.
///
/// Every field has a default, so a partial JSON object only overrides what it
/// mentions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeriveConfig {
    pub capability: String,
    pub element_name: String,
    pub update_name: String,
    pub gradients_label: String,
    pub gradients_name: String,
    pub updater_name: String,
    /// Cache nested-aggregate conformance answers per concrete type.
    pub memoize_nested: bool,
}

impl Default for DeriveConfig {
    fn default() -> Self {
        Self {
            capability: "ParameterGroup".to_string(),
            element_name: "Parameter".to_string(),
            update_name: "update".to_string(),
            gradients_label: "withGradients".to_string(),
            gradients_name: "gradients".to_string(),
            updater_name: "updater".to_string(),
            memoize_nested: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid derive config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("derive config field `{0}` must not be empty")]
    EmptyName(&'static str),
    #[error("`{0}` is used for both the gradients and the updater parameter")]
    ParameterNameClash(String),
}

impl DeriveConfig {
    pub fn from_json(source: &str) -> Result<Self, ConfigError> {
        let config: DeriveConfig = serde_json::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let names = [
            ("capability", &self.capability),
            ("element_name", &self.element_name),
            ("update_name", &self.update_name),
            ("gradients_label", &self.gradients_label),
            ("gradients_name", &self.gradients_name),
            ("updater_name", &self.updater_name),
        ];
        if let Some((field, _)) = names.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(ConfigError::EmptyName(*field));
        }
        if self.gradients_name == self.updater_name {
            return Err(ConfigError::ParameterNameClash(self.updater_name.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = DeriveConfig::from_json(r#"{ "capability": "Optimizable" }"#)
            .expect("valid config");
        assert_eq!(config.capability, "Optimizable");
        assert_eq!(config.element_name, "Parameter");
        assert!(config.memoize_nested);
    }

    #[test]
    fn rejects_unknown_fields_and_empty_names() {
        assert!(matches!(
            DeriveConfig::from_json(r#"{ "capabilty": "Typo" }"#),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            DeriveConfig::from_json(r#"{ "update_name": " " }"#),
            Err(ConfigError::EmptyName("update_name"))
        ));
    }

    #[test]
    fn rejects_parameter_name_clash() {
        let err = DeriveConfig::from_json(r#"{ "gradients_name": "updater" }"#)
            .expect_err("clashing names");
        assert_eq!(
            err.to_string(),
            "`updater` is used for both the gradients and the updater parameter"
        );
    }
}
