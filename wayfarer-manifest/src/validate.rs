//! Manifest document invariants.

use semver::Version;
use wayfarer_core::{Manifest, ManifestError, MANIFEST_VERSION_PREFIX, SDK_VERSION};

/// Validate a decoded manifest.
///
/// Checks, in order:
/// - `manifestVersion` begins with the supported prefix
/// - `minSdk` does not exceed the runtime version
/// - `security.allowedOrigins` is non-empty
/// - `steps[startStep]` exists
/// - every transition target resolves to a defined step
pub fn validate_manifest(manifest: &Manifest) -> Result<(), ManifestError> {
    if !manifest.manifest_version.starts_with(MANIFEST_VERSION_PREFIX) {
        return Err(ManifestError::ValidationFailed {
            reason: format!(
                "Unsupported manifestVersion '{}', expected {}.x",
                manifest.manifest_version, MANIFEST_VERSION_PREFIX
            ),
        });
    }

    let min_sdk = parse_version(&manifest.min_sdk).ok_or_else(|| {
        ManifestError::ValidationFailed {
            reason: format!("minSdk '{}' is not a version number", manifest.min_sdk),
        }
    })?;
    let runtime = parse_version(SDK_VERSION).ok_or_else(|| ManifestError::ValidationFailed {
        reason: format!("runtime version '{SDK_VERSION}' is not a version number"),
    })?;
    if min_sdk > runtime {
        return Err(ManifestError::ValidationFailed {
            reason: format!(
                "minSdk {} exceeds runtime version {}",
                manifest.min_sdk, SDK_VERSION
            ),
        });
    }

    if manifest.security.allowed_origins.is_empty() {
        return Err(ManifestError::ValidationFailed {
            reason: "security.allowedOrigins must not be empty".to_string(),
        });
    }

    if !manifest.steps.contains_key(&manifest.start_step) {
        return Err(ManifestError::ValidationFailed {
            reason: format!(
                "startStep '{}' is not defined in steps",
                manifest.start_step
            ),
        });
    }

    for (step_id, step) in &manifest.steps {
        for (event, transition) in &step.on {
            if let Some(target) = &transition.to {
                if !manifest.steps.contains_key(target) {
                    return Err(ManifestError::ValidationFailed {
                        reason: format!(
                            "transition '{event}' on step '{step_id}' targets undefined step '{target}'"
                        ),
                    });
                }
            }
        }
    }

    Ok(())
}

/// Parse a dotted version, padding missing minor/patch components, so
/// `"1.2"` compares like `1.2.0`.
fn parse_version(text: &str) -> Option<Version> {
    if let Ok(version) = Version::parse(text) {
        return Some(version);
    }
    let mut parts = text.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next().map_or(Some(0), |p| p.parse().ok())?;
    let patch = parts.next().map_or(Some(0), |p| p.parse().ok())?;
    if parts.next().is_some() {
        return None;
    }
    Some(Version::new(major, minor, patch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use wayfarer_core::Manifest;

    fn manifest(document: serde_json::Value) -> Manifest {
        serde_json::from_value(document).unwrap()
    }

    fn valid_document() -> serde_json::Value {
        json!({
            "manifestVersion": "1.1.0",
            "minSdk": "0.1.0",
            "journeyId": "j-1",
            "oapiBundle": "https://api.example.com/openapi.json",
            "startStep": "intro",
            "security": { "allowedOrigins": ["https://flows.example.com"] },
            "steps": {
                "intro": { "type": "web", "on": { "go": { "to": "done" } } },
                "done": { "type": "terminal" }
            }
        })
    }

    #[test]
    fn accepts_a_valid_manifest() {
        assert!(validate_manifest(&manifest(valid_document())).is_ok());
    }

    #[test]
    fn rejects_unsupported_manifest_version() {
        let mut document = valid_document();
        document["manifestVersion"] = json!("2.0");
        let err = validate_manifest(&manifest(document)).unwrap_err();
        assert!(err.to_string().contains("manifestVersion"));
    }

    #[test]
    fn rejects_min_sdk_above_runtime() {
        let mut document = valid_document();
        document["minSdk"] = json!("99.0.0");
        let err = validate_manifest(&manifest(document)).unwrap_err();
        assert!(err.to_string().contains("minSdk"));
    }

    #[test]
    fn accepts_two_component_min_sdk() {
        let mut document = valid_document();
        document["minSdk"] = json!("0.1");
        assert!(validate_manifest(&manifest(document)).is_ok());
    }

    #[test]
    fn rejects_empty_allowed_origins() {
        let mut document = valid_document();
        document["security"]["allowedOrigins"] = json!([]);
        let err = validate_manifest(&manifest(document)).unwrap_err();
        assert!(err.to_string().contains("allowedOrigins"));
    }

    #[test]
    fn rejects_missing_start_step() {
        let mut document = valid_document();
        document["startStep"] = json!("nowhere");
        let err = validate_manifest(&manifest(document)).unwrap_err();
        assert!(err.to_string().contains("startStep"));
    }

    #[test]
    fn rejects_dangling_transition_target() {
        let mut document = valid_document();
        document["steps"]["intro"]["on"]["go"]["to"] = json!("missing");
        let err = validate_manifest(&manifest(document)).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    proptest! {
        // Any startStep absent from steps fails with a message naming
        // "startStep".
        #[test]
        fn prop_absent_start_step_always_fails(name in "[a-z]{1,12}") {
            prop_assume!(name != "intro" && name != "done");
            let mut document = valid_document();
            document["startStep"] = json!(name);
            let err = validate_manifest(&manifest(document)).unwrap_err();
            prop_assert!(err.to_string().contains("startStep"));
        }

        // An empty allow-list always fails with a message naming
        // "allowedOrigins", regardless of the rest of the document.
        #[test]
        fn prop_empty_allowed_origins_always_fails(version in "1\\.1\\.[0-9]{1,2}") {
            let mut document = valid_document();
            document["manifestVersion"] = json!(version);
            document["security"]["allowedOrigins"] = json!([]);
            let err = validate_manifest(&manifest(document)).unwrap_err();
            prop_assert!(err.to_string().contains("allowedOrigins"));
        }
    }
}
