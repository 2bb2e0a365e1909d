//! Runtime configuration supplied by the embedding partner application.

use crate::{ConfigError, WayfarerResult};
use serde::{Deserialize, Serialize};
use url::Url;

/// Which provider environment the runtime talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Sandbox,
    Production,
}

/// Feature flags the caller may toggle. All default to off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeatureFlags {
    /// Accept `file://` page origins at the bridge. Local development only.
    pub allow_file_origins: bool,
    /// Fire a step's `demoEvent` parameter automatically on entry, so demo
    /// hosts can run journeys without a live page.
    pub demo_auto_complete: bool,
    /// Skip manifest signature verification and permit relative-URL
    /// rewriting for file manifests. Local development only.
    pub disable_manifest_signature_verification: bool,
}

/// Configuration consumed from the caller at runtime construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    pub environment: Environment,
    pub partner_id: String,
    pub client_id: String,
    /// Custom URL scheme the sign-in surface redirects back to.
    pub redirect_scheme: String,
    /// BCP-47 locale passed through to hosted pages.
    pub locale: String,
    /// Override for the manifest base URL; a value ending in `.json` is used
    /// verbatim as the manifest location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_config_url: Option<String>,
    #[serde(default)]
    pub feature_flags: FeatureFlags,
    #[serde(default)]
    pub telemetry_opt_in: bool,
}

impl RuntimeConfig {
    /// Minimal sandbox configuration for a partner; useful in examples
    /// and tests.
    pub fn sandbox(partner_id: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            environment: Environment::Sandbox,
            partner_id: partner_id.into(),
            client_id: client_id.into(),
            redirect_scheme: "wayfarer".to_string(),
            locale: "en-US".to_string(),
            remote_config_url: None,
            feature_flags: FeatureFlags::default(),
            telemetry_opt_in: false,
        }
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - `partner_id`, `client_id` and `redirect_scheme` are non-empty
    /// - `remote_config_url`, when present, parses as an absolute URL
    /// - development-only flags are not enabled against production
    pub fn validate(&self) -> WayfarerResult<()> {
        if self.partner_id.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "partner_id".to_string(),
            }
            .into());
        }

        if self.client_id.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "client_id".to_string(),
            }
            .into());
        }

        if self.redirect_scheme.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "redirect_scheme".to_string(),
            }
            .into());
        }

        if let Some(url) = &self.remote_config_url {
            if Url::parse(url).is_err() {
                return Err(ConfigError::InvalidValue {
                    field: "remote_config_url".to_string(),
                    value: url.clone(),
                    reason: "must be an absolute URL".to_string(),
                }
                .into());
            }
        }

        if self.environment == Environment::Production
            && self.feature_flags.disable_manifest_signature_verification
        {
            return Err(ConfigError::InvalidValue {
                field: "feature_flags.disable_manifest_signature_verification".to_string(),
                value: "true".to_string(),
                reason: "signature verification cannot be disabled in production".to_string(),
            }
            .into());
        }

        Ok(())
    }
}
