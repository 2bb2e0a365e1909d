//! Manifest fetching, signature verification and decoding.

use crate::validate::validate_manifest;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wayfarer_core::{Environment, Manifest, ManifestError, RuntimeConfig, SigningError};
use wayfarer_signing::{canonical_json, verify_detached, TrustStore};

/// Built-in manifest base used when the caller supplies no
/// `remote_config_url`.
pub const PRODUCTION_MANIFEST_BASE: &str = "https://manifests.wayfarer.dev/v1";

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches, verifies and validates journey manifests.
pub struct ManifestLoader {
    config: RuntimeConfig,
    trust: Arc<TrustStore>,
    http: reqwest::Client,
}

impl ManifestLoader {
    pub fn new(config: RuntimeConfig, trust: Arc<TrustStore>) -> Result<Self, ManifestError> {
        let http = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| ManifestError::NetworkError {
                reason: e.to_string(),
            })?;
        Ok(Self {
            config,
            trust,
            http,
        })
    }

    /// Resolve the manifest location for a journey.
    ///
    /// A configured URL ending in `.json` is used verbatim; otherwise
    /// `/<journeyId>/manifest.json` is appended. Without a configured URL
    /// the built-in production base applies.
    pub fn manifest_url(&self, journey_id: &str) -> String {
        match self.config.remote_config_url.as_deref() {
            Some(base) if base.ends_with(".json") => base.to_string(),
            Some(base) => format!("{}/{}/manifest.json", base.trim_end_matches('/'), journey_id),
            None => format!("{PRODUCTION_MANIFEST_BASE}/{journey_id}/manifest.json"),
        }
    }

    /// Load, verify and validate the manifest for a journey.
    pub async fn load(
        &self,
        journey_id: &str,
        context_token: &str,
    ) -> Result<Manifest, ManifestError> {
        let location = self.manifest_url(journey_id);
        let url = Url::parse(&location).map_err(|e| ManifestError::NetworkError {
            reason: format!("invalid manifest URL '{location}': {e}"),
        })?;

        let bytes = self.fetch(&url, context_token).await?;
        let document: Value =
            serde_json::from_slice(&bytes).map_err(|e| ManifestError::DecodingError {
                reason: e.to_string(),
            })?;

        let skip_verification = self
            .config
            .feature_flags
            .disable_manifest_signature_verification;
        if skip_verification {
            tracing::warn!(journey_id, "manifest signature verification is disabled");
        } else {
            self.verify_signature(&document)?;
        }

        let mut manifest: Manifest =
            serde_json::from_value(document).map_err(|e| ManifestError::DecodingError {
                reason: e.to_string(),
            })?;

        // Local development convenience: file manifests loaded with
        // verification disabled may reference their bundle and pages
        // relative to the manifest's own directory.
        if url.scheme() == "file"
            && skip_verification
            && self.config.environment != Environment::Production
        {
            rewrite_relative_urls(&mut manifest, &url);
        }

        validate_manifest(&manifest)?;
        tracing::debug!(
            journey_id,
            start_step = %manifest.start_step,
            steps = manifest.steps.len(),
            "manifest loaded"
        );
        Ok(manifest)
    }

    /// Fetch and parse the OpenAPI bundle a manifest references.
    pub async fn load_openapi_bundle(
        &self,
        manifest: &Manifest,
        context_token: &str,
    ) -> Result<Value, ManifestError> {
        let url =
            Url::parse(&manifest.oapi_bundle).map_err(|_| ManifestError::ValidationFailed {
                reason: format!(
                    "oapiBundle '{}' must be an absolute URL",
                    manifest.oapi_bundle
                ),
            })?;
        let bytes = self.fetch(&url, context_token).await?;
        serde_json::from_slice(&bytes).map_err(|e| ManifestError::DecodingError {
            reason: format!("OpenAPI bundle: {e}"),
        })
    }

    async fn fetch(&self, url: &Url, context_token: &str) -> Result<Vec<u8>, ManifestError> {
        if url.scheme() == "file" {
            let path = url
                .to_file_path()
                .map_err(|()| ManifestError::NetworkError {
                    reason: format!("'{url}' is not a readable file path"),
                })?;
            return std::fs::read(&path).map_err(|e| ManifestError::NetworkError {
                reason: format!("{}: {e}", path.display()),
            });
        }

        let response = self
            .http
            .get(url.clone())
            .bearer_auth(context_token)
            .send()
            .await
            .map_err(|e| ManifestError::NetworkError {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status.as_u16() != 200 {
            return Err(ManifestError::InvalidResponse {
                reason: format!("HTTP {}", status.as_u16()),
            });
        }
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| ManifestError::InvalidResponse {
                reason: e.to_string(),
            })
    }

    /// Verify the detached signature over the canonical document without
    /// its top-level `signature` field.
    fn verify_signature(&self, document: &Value) -> Result<(), ManifestError> {
        let signature = document
            .get("signature")
            .and_then(Value::as_str)
            .ok_or_else(|| ManifestError::SignatureVerificationFailed {
                reason: "manifest carries no signature".to_string(),
            })?;

        let mut unsigned = document.clone();
        if let Some(map) = unsigned.as_object_mut() {
            map.remove("signature");
        }
        let payload = canonical_json(&unsigned);

        verify_detached(signature, payload.as_bytes(), &self.trust).map_err(|e| match e {
            SigningError::KeyNotFound { kid } => ManifestError::KeyNotFound { kid },
            other => ManifestError::SignatureVerificationFailed {
                reason: other.to_string(),
            },
        })
    }
}

fn rewrite_relative_urls(manifest: &mut Manifest, manifest_url: &Url) {
    if Url::parse(&manifest.oapi_bundle) == Err(url::ParseError::RelativeUrlWithoutBase) {
        if let Ok(resolved) = manifest_url.join(&manifest.oapi_bundle) {
            manifest.oapi_bundle = resolved.to_string();
        }
    }
    for step in manifest.steps.values_mut() {
        if let Some(page) = &step.url {
            if Url::parse(page) == Err(url::ParseError::RelativeUrlWithoutBase) {
                if let Ok(resolved) = manifest_url.join(page) {
                    step.url = Some(resolved.to_string());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wayfarer_signing::EnvelopeSigner;

    fn loader_with(config: RuntimeConfig, trust: TrustStore) -> ManifestLoader {
        ManifestLoader::new(config, Arc::new(trust)).unwrap()
    }

    fn document() -> Value {
        json!({
            "manifestVersion": "1.1.0",
            "minSdk": "0.1.0",
            "journeyId": "transfer",
            "oapiBundle": "openapi.json",
            "startStep": "intro",
            "security": { "allowedOrigins": ["https://flows.example.com"] },
            "steps": {
                "intro": { "type": "web", "url": "pages/intro.html", "on": { "go": { "to": "done" } } },
                "done": { "type": "terminal", "result": { "status": "ok" } }
            }
        })
    }

    fn write_manifest(dir: &tempfile::TempDir, document: &Value) -> Url {
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, serde_json::to_vec(document).unwrap()).unwrap();
        Url::from_file_path(&path).unwrap()
    }

    fn dev_config(manifest_url: &Url) -> RuntimeConfig {
        let mut config = RuntimeConfig::sandbox("partner", "client");
        config.remote_config_url = Some(manifest_url.to_string());
        config.feature_flags.disable_manifest_signature_verification = true;
        config
    }

    #[test]
    fn manifest_url_appends_journey_path() {
        let mut config = RuntimeConfig::sandbox("p", "c");
        config.remote_config_url = Some("https://cfg.example.com/manifests/".to_string());
        let loader = loader_with(config, TrustStore::new());
        assert_eq!(
            loader.manifest_url("transfer"),
            "https://cfg.example.com/manifests/transfer/manifest.json"
        );
    }

    #[test]
    fn manifest_url_uses_json_urls_verbatim() {
        let mut config = RuntimeConfig::sandbox("p", "c");
        config.remote_config_url = Some("https://cfg.example.com/custom.json".to_string());
        let loader = loader_with(config, TrustStore::new());
        assert_eq!(
            loader.manifest_url("ignored"),
            "https://cfg.example.com/custom.json"
        );
    }

    #[test]
    fn manifest_url_defaults_to_production_base() {
        let loader = loader_with(RuntimeConfig::sandbox("p", "c"), TrustStore::new());
        assert_eq!(
            loader.manifest_url("transfer"),
            format!("{PRODUCTION_MANIFEST_BASE}/transfer/manifest.json")
        );
    }

    #[tokio::test]
    async fn loads_and_rewrites_a_dev_file_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_url = write_manifest(&dir, &document());
        let loader = loader_with(dev_config(&manifest_url), TrustStore::new());

        let manifest = loader.load("transfer", "ctx-token").await.unwrap();
        assert_eq!(manifest.journey_id, "transfer");
        // Relative references resolve against the manifest's directory.
        assert!(manifest.oapi_bundle.starts_with("file://"));
        assert!(manifest.oapi_bundle.ends_with("/openapi.json"));
        let intro = manifest.step("intro").unwrap();
        assert!(intro.url.as_deref().unwrap().ends_with("/pages/intro.html"));
    }

    #[tokio::test]
    async fn verifies_a_signed_manifest() {
        let signer = EnvelopeSigner::ephemeral().unwrap();
        let mut signed = document();
        signed["oapiBundle"] = json!("https://api.example.com/openapi.json");
        let signature = signer.sign_detached(&signed).unwrap();
        signed["signature"] = json!(signature);

        let dir = tempfile::tempdir().unwrap();
        let manifest_url = write_manifest(&dir, &signed);

        let trust = TrustStore::new();
        trust.insert(signer.kid(), signer.public_jwk().clone());

        let mut config = RuntimeConfig::sandbox("partner", "client");
        config.remote_config_url = Some(manifest_url.to_string());
        let loader = loader_with(config, trust);

        let manifest = loader.load("transfer", "ctx").await.unwrap();
        assert_eq!(manifest.journey_id, "transfer");
    }

    #[tokio::test]
    async fn rejects_a_tampered_signed_manifest() {
        let signer = EnvelopeSigner::ephemeral().unwrap();
        let mut signed = document();
        signed["oapiBundle"] = json!("https://api.example.com/openapi.json");
        let signature = signer.sign_detached(&signed).unwrap();
        signed["signature"] = json!(signature);
        // Tamper after signing.
        signed["journeyId"] = json!("evil");

        let dir = tempfile::tempdir().unwrap();
        let manifest_url = write_manifest(&dir, &signed);

        let trust = TrustStore::new();
        trust.insert(signer.kid(), signer.public_jwk().clone());

        let mut config = RuntimeConfig::sandbox("partner", "client");
        config.remote_config_url = Some(manifest_url.to_string());
        let loader = loader_with(config, trust);

        let err = loader.load("transfer", "ctx").await.unwrap_err();
        assert!(matches!(
            err,
            ManifestError::SignatureVerificationFailed { .. }
        ));
    }

    #[tokio::test]
    async fn reports_unknown_signing_key() {
        let signer = EnvelopeSigner::ephemeral().unwrap();
        let mut signed = document();
        signed["oapiBundle"] = json!("https://api.example.com/openapi.json");
        signed["signature"] = json!(signer.sign_detached(&signed).unwrap());

        let dir = tempfile::tempdir().unwrap();
        let manifest_url = write_manifest(&dir, &signed);

        let mut config = RuntimeConfig::sandbox("partner", "client");
        config.remote_config_url = Some(manifest_url.to_string());
        // Empty trust store: the signer's kid is unknown.
        let loader = loader_with(config, TrustStore::new());

        let err = loader.load("transfer", "ctx").await.unwrap_err();
        assert!(matches!(err, ManifestError::KeyNotFound { .. }));
    }

    #[tokio::test]
    async fn unsigned_manifest_fails_when_verification_is_on() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_url = write_manifest(&dir, &document());

        let mut config = RuntimeConfig::sandbox("partner", "client");
        config.remote_config_url = Some(manifest_url.to_string());
        let loader = loader_with(config, TrustStore::new());

        let err = loader.load("transfer", "ctx").await.unwrap_err();
        assert!(matches!(
            err,
            ManifestError::SignatureVerificationFailed { .. }
        ));
    }

    #[tokio::test]
    async fn missing_file_maps_to_network_error() {
        let mut config = RuntimeConfig::sandbox("partner", "client");
        config.remote_config_url = Some("file:///nonexistent/manifest.json".to_string());
        config.feature_flags.disable_manifest_signature_verification = true;
        let loader = loader_with(config, TrustStore::new());

        let err = loader.load("transfer", "ctx").await.unwrap_err();
        assert!(matches!(err, ManifestError::NetworkError { .. }));
    }

    #[tokio::test]
    async fn undecodable_document_maps_to_decoding_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, b"not json at all").unwrap();

        let mut config = RuntimeConfig::sandbox("partner", "client");
        config.remote_config_url = Some(Url::from_file_path(&path).unwrap().to_string());
        config.feature_flags.disable_manifest_signature_verification = true;
        let loader = loader_with(config, TrustStore::new());

        let err = loader.load("transfer", "ctx").await.unwrap_err();
        assert!(matches!(err, ManifestError::DecodingError { .. }));
    }

    #[tokio::test]
    async fn relative_bundle_is_rejected_without_rewrite() {
        let manifest: Manifest = serde_json::from_value(document()).unwrap();
        let loader = loader_with(RuntimeConfig::sandbox("p", "c"), TrustStore::new());
        let err = loader
            .load_openapi_bundle(&manifest, "ctx")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("oapiBundle"));
    }
}
