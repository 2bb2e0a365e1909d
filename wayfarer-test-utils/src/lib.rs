//! Wayfarer Test Utilities
//!
//! Centralized test infrastructure for the workspace:
//! - journey fixtures (manifest + OpenAPI bundle files on disk)
//! - proptest generators for wire-level types
//! - re-exported test doubles from their source crates

// Re-export test doubles from their source crates
pub use wayfarer_api::ScriptedTransport;
pub use wayfarer_bridge::CapturePageSink;
pub use wayfarer_session::MemorySnapshotStore;

// Re-export the signing surface tests lean on
pub use wayfarer_signing::{canonical_json, verify_compact, EnvelopeSigner, TrustStore};

pub mod fixtures {
    //! Pre-built journey documents and on-disk fixtures.

    use serde_json::{json, Value};
    use tempfile::TempDir;
    use url::Url;
    use wayfarer_core::RuntimeConfig;
    use wayfarer_signing::EnvelopeSigner;

    /// Build an OpenAPI bundle from `(method, path, operationId)` triples.
    pub fn openapi_bundle(server_url: &str, operations: &[(&str, &str, &str)]) -> Value {
        let mut paths = serde_json::Map::new();
        for (method, path, operation_id) in operations {
            let entry = paths
                .entry(path.to_string())
                .or_insert_with(|| json!({}));
            let verb = method.to_lowercase();
            entry[verb.as_str()] = json!({ "operationId": operation_id });
        }
        json!({
            "openapi": "3.0.0",
            "servers": [{ "url": server_url }],
            "paths": Value::Object(paths),
        })
    }

    /// A minimal valid manifest document around the given steps.
    pub fn manifest_document(journey_id: &str, start_step: &str, steps: Value) -> Value {
        json!({
            "manifestVersion": "1.1.0",
            "minSdk": "0.1.0",
            "journeyId": journey_id,
            "oapiBundle": "openapi.json",
            "startStep": start_step,
            "security": { "allowedOrigins": ["https://flows.example.com"] },
            "steps": steps,
        })
    }

    /// Journey documents written to disk, ready for a file-URL loader.
    pub struct JourneyFiles {
        pub dir: TempDir,
        pub manifest_url: Url,
    }

    /// Write a manifest and its bundle into a fresh temp directory. The
    /// manifest's `oapiBundle` is pointed at the written bundle; when a
    /// signer is given the manifest is signed after that rewrite.
    pub fn write_journey(
        mut manifest: Value,
        bundle: &Value,
        signer: Option<&EnvelopeSigner>,
    ) -> JourneyFiles {
        let dir = tempfile::tempdir().expect("create fixture dir");

        let bundle_path = dir.path().join("openapi.json");
        std::fs::write(&bundle_path, serde_json::to_vec(bundle).expect("encode bundle"))
            .expect("write bundle");
        let bundle_url = Url::from_file_path(&bundle_path).expect("bundle file url");
        manifest["oapiBundle"] = json!(bundle_url.to_string());

        if let Some(signer) = signer {
            let signature = signer.sign_detached(&manifest).expect("sign manifest");
            manifest["signature"] = json!(signature);
        }

        let manifest_path = dir.path().join("manifest.json");
        std::fs::write(
            &manifest_path,
            serde_json::to_vec(&manifest).expect("encode manifest"),
        )
        .expect("write manifest");
        let manifest_url = Url::from_file_path(&manifest_path).expect("manifest file url");

        JourneyFiles { dir, manifest_url }
    }

    /// Sandbox config pointing at a fixture manifest with signature
    /// verification disabled (unsigned local development flow).
    pub fn dev_config(manifest_url: &Url) -> RuntimeConfig {
        let mut config = RuntimeConfig::sandbox("partner-test", "client-test");
        config.remote_config_url = Some(manifest_url.to_string());
        config.feature_flags.disable_manifest_signature_verification = true;
        config
    }

    /// Sandbox config pointing at a fixture manifest with signature
    /// verification on.
    pub fn verified_config(manifest_url: &Url) -> RuntimeConfig {
        let mut config = RuntimeConfig::sandbox("partner-test", "client-test");
        config.remote_config_url = Some(manifest_url.to_string());
        config
    }
}

pub mod generators {
    //! Proptest strategies for wire-level types.

    use proptest::prelude::*;
    use wayfarer_core::ErrorCode;

    /// Any code from the fixed taxonomy.
    pub fn arb_error_code() -> impl Strategy<Value = ErrorCode> {
        prop_oneof![
            Just(ErrorCode::AuthExpired),
            Just(ErrorCode::PinningFail),
            Just(ErrorCode::OriginBlocked),
            Just(ErrorCode::NetTimeout),
            Just(ErrorCode::RateLimited),
            Just(ErrorCode::ValidationFail),
            Just(ErrorCode::IdempotentReplay),
            Just(ErrorCode::ScaRequired),
            Just(ErrorCode::ComplianceHold),
            Just(ErrorCode::MoreInfo),
            Just(ErrorCode::Unknown),
        ]
    }

    /// A https origin with a plausible host.
    pub fn arb_https_origin() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9]{1,10}\\.[a-z]{2,4}".prop_map(|host| format!("https://{host}"))
    }

    /// A step identifier.
    pub fn arb_step_id() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_-]{0,15}".prop_map(|s| s)
    }
}
