//! Manifest validation

use arbor_extension_api::ExtensionManifest;
use semver::Version;
use serde_json::{Map, Value};

use crate::error::ValidationError;

/// Validate a manifest before load, returning warnings on success.
///
/// Hard failures: empty name, a version that is not strict semver, and
/// a missing entry point. Everything else (absent metadata, undeclared
/// hook names, config values that contradict the schema) is a warning;
/// the caller logs warnings and proceeds.
pub fn validate_manifest(
    manifest: &ExtensionManifest,
    has_entry: bool,
    known_hooks: &[String],
) -> Result<Vec<String>, ValidationError> {
    if manifest.name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }

    if let Err(e) = Version::parse(&manifest.version) {
        return Err(ValidationError::InvalidVersion {
            name: manifest.name.clone(),
            version: manifest.version.clone(),
            reason: e.to_string(),
        });
    }

    if !has_entry {
        return Err(ValidationError::MissingEntry {
            name: manifest.name.clone(),
        });
    }

    let mut warnings = Vec::new();

    if manifest
        .description
        .as_deref()
        .is_none_or(|d| d.trim().is_empty())
    {
        warnings.push(format!("extension '{}' has no description", manifest.name));
    }

    if manifest
        .author
        .as_deref()
        .is_none_or(|a| a.trim().is_empty())
    {
        warnings.push(format!("extension '{}' has no author", manifest.name));
    }

    if !known_hooks.is_empty() {
        for hook in &manifest.hooks {
            if !known_hooks.contains(hook) {
                warnings.push(format!(
                    "extension '{}' declares unknown hook '{}'",
                    manifest.name, hook
                ));
            }
        }
    }

    if let Some(schema) = &manifest.config_schema {
        warnings.extend(schema_mismatches(
            &manifest.name,
            schema,
            &manifest.default_config,
        ));
    }

    Ok(warnings)
}

/// Advisory check of config values against a manifest's config schema.
///
/// The schema is a flat object mapping keys to expected JSON type names
/// (`string`, `number`, `boolean`, `array`, `object`). Also used when
/// committing config updates from a running extension.
pub(crate) fn schema_mismatches(
    name: &str,
    schema: &Value,
    values: &Map<String, Value>,
) -> Vec<String> {
    let Some(shape) = schema.as_object() else {
        return vec![format!("extension '{}' has a non-object config schema", name)];
    };

    let mut warnings = Vec::new();
    for (key, expected) in shape {
        let Some(expected) = expected.as_str() else {
            continue;
        };
        if let Some(actual) = values.get(key)
            && !actual.is_null()
            && json_type(actual) != expected
        {
            warnings.push(format!(
                "extension '{}' config key '{}' is {} but schema expects {}",
                name,
                key,
                json_type(actual),
                expected
            ));
        }
    }
    warnings
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest(name: &str, version: &str) -> ExtensionManifest {
        ExtensionManifest {
            description: Some("A test extension".into()),
            author: Some("tests".into()),
            ..ExtensionManifest::new(name, version)
        }
    }

    #[test]
    fn test_valid_manifest_passes_clean() {
        let warnings = validate_manifest(&manifest("good", "1.0.0"), true, &[]).unwrap();
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_empty_name_rejected() {
        let result = validate_manifest(&manifest("  ", "1.0.0"), true, &[]);
        assert_eq!(result.unwrap_err(), ValidationError::EmptyName);
    }

    #[test]
    fn test_invalid_semver_rejected() {
        let result = validate_manifest(&manifest("bad", "1.0"), true, &[]);
        assert!(matches!(
            result.unwrap_err(),
            ValidationError::InvalidVersion { .. }
        ));
    }

    #[test]
    fn test_missing_entry_rejected() {
        let result = validate_manifest(&manifest("orphan", "1.0.0"), false, &[]);
        assert!(matches!(
            result.unwrap_err(),
            ValidationError::MissingEntry { .. }
        ));
    }

    #[test]
    fn test_missing_metadata_warns() {
        let warnings =
            validate_manifest(&ExtensionManifest::new("bare", "1.0.0"), true, &[]).unwrap();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("no description"));
        assert!(warnings[1].contains("no author"));
    }

    #[test]
    fn test_unknown_hook_warns_when_known_set_configured() {
        let mut m = manifest("hooky", "1.0.0");
        m.hooks = vec!["request:start".into(), "made:up".into()];

        let known = vec!["request:start".to_string(), "request:end".to_string()];
        let warnings = validate_manifest(&m, true, &known).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("made:up"));
    }

    #[test]
    fn test_unknown_hook_check_skipped_without_known_set() {
        let mut m = manifest("hooky", "1.0.0");
        m.hooks = vec!["made:up".into()];

        let warnings = validate_manifest(&m, true, &[]).unwrap();
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_schema_mismatch_warns() {
        let mut m = manifest("typed", "1.0.0");
        m.config_schema = Some(json!({"window": "number", "label": "string"}));
        m.default_config
            .insert("window".into(), json!("sixty"));
        m.default_config.insert("label".into(), json!("ok"));

        let warnings = validate_manifest(&m, true, &[]).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("window"));
        assert!(warnings[0].contains("string"));
    }

    #[test]
    fn test_schema_ignores_unlisted_and_missing_keys() {
        let mut m = manifest("typed", "1.0.0");
        m.config_schema = Some(json!({"window": "number"}));
        m.default_config.insert("other".into(), json!([1, 2]));

        let warnings = validate_manifest(&m, true, &[]).unwrap();
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_non_object_schema_warns() {
        let mut m = manifest("typed", "1.0.0");
        m.config_schema = Some(json!("not a schema"));

        let warnings = validate_manifest(&m, true, &[]).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("non-object"));
    }
}
