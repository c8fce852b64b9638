use std::path::Path;

use crate::config::schema::{FieldType, SyncConfig};
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SyncConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<SyncConfig, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: SyncConfig = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &SyncConfig) -> Result<(), ConfigError> {
    // Validate version
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.api_key.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "api_key must not be empty".to_string(),
        });
    }

    if config.requests_per_minute == 0 {
        return Err(ConfigError::Validation {
            message: "requests_per_minute must be at least 1".to_string(),
        });
    }

    // Validate field mappings
    let all_mappings = config.post_lists.iter().chain(config.term_lists.iter());
    for (subtype, mapping) in all_mappings {
        for (attribute, field) in &mapping.fields {
            if field.id.is_empty() {
                return Err(ConfigError::Validation {
                    message: format!(
                        "Field mapping '{}' of '{}' has an empty custom field id",
                        attribute, subtype
                    ),
                });
            }

            // A dropdown with no options can never match a value; treat it
            // as a broken mapping rather than silently dropping every sync.
            if field.field_type == FieldType::DropDown && field.options.is_empty() {
                return Err(ConfigError::Validation {
                    message: format!(
                        "Dropdown mapping '{}' of '{}' has no options",
                        attribute, subtype
                    ),
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal(extra: &str) -> String {
        format!(r#"{{ "api_key": "pk_123"{} }}"#, extra)
    }

    #[test]
    fn test_minimal_config_loads() {
        let config = load_config_from_str(&minimal("")).unwrap();
        assert_eq!(config.api_key, "pk_123");
    }

    #[test]
    fn test_full_config_loads() {
        let config = load_config_from_str(
            r#"{
                "api_key": "pk_123",
                "requests_per_minute": 10,
                "queue_retain_days": 7,
                "post_lists": {
                    "article": {
                        "list_id": "900100",
                        "fields": {
                            "status": {
                                "id": "f-status",
                                "type": "drop_down",
                                "options": [
                                    { "id": "opt-1", "label": "Published" },
                                    { "id": "opt-2", "label": "Draft" }
                                ]
                            },
                            "date": { "id": "f-date", "type": "date" }
                        }
                    }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.requests_per_minute, 10);
        let mapping = &config.post_lists["article"];
        assert_eq!(mapping.fields["status"].options.len(), 2);
        assert_eq!(mapping.fields["date"].field_type, FieldType::Date);
    }

    #[test]
    fn test_missing_api_key_fails_schema() {
        let err = load_config_from_str("{}").unwrap_err();
        assert!(matches!(err, ConfigError::SchemaValidation { .. }));
    }

    #[test]
    fn test_unknown_top_level_key_fails_schema() {
        let err = load_config_from_str(&minimal(r#", "api_keys": "typo""#)).unwrap_err();
        assert!(matches!(err, ConfigError::SchemaValidation { .. }));
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let err = load_config_from_str(&minimal(r#", "version": "2.0""#)).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn test_dropdown_without_options_rejected() {
        let err = load_config_from_str(
            r#"{
                "api_key": "pk_123",
                "term_lists": {
                    "category": {
                        "list_id": "900200",
                        "fields": {
                            "status": { "id": "f-status", "type": "drop_down" }
                        }
                    }
                }
            }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn test_zero_rate_limit_fails_schema() {
        let err = load_config_from_str(&minimal(r#", "requests_per_minute": 0"#)).unwrap_err();
        assert!(matches!(err, ConfigError::SchemaValidation { .. }));
    }
}
