//! HTTP request construction from resolved operations.

use crate::resolver::Operation;
use serde_json::Value;
use std::collections::HashMap;
use wayfarer_core::ResolverError;

/// A transport-agnostic HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub method: String,
    pub url: String,
    /// Ordered header list; names compare case-insensitively.
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl ApiRequest {
    /// Look up a header value, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Set a header, replacing any existing value for the same name.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(entry) = self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            entry.1 = value;
        } else {
            self.headers.push((name.to_string(), value));
        }
    }
}

/// Build a request for an operation against a base URL.
///
/// The URL joins the base and operation paths with exactly one slash
/// between them. A JSON body gets `Content-Type: application/json`;
/// `Accept: application/json` is always set. Caller headers override the
/// defaults.
pub fn build_request(
    base_url: &str,
    operation: &Operation,
    body: Option<&Value>,
    headers: &HashMap<String, String>,
) -> Result<ApiRequest, ResolverError> {
    let url = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        operation.path.trim_matches('/')
    );

    let body_bytes = body
        .map(serde_json::to_vec)
        .transpose()
        .map_err(|e| ResolverError::InvalidBody {
            reason: e.to_string(),
        })?;

    let mut request = ApiRequest {
        method: operation.method.to_uppercase(),
        url,
        headers: Vec::new(),
        body: body_bytes,
    };

    if request.body.is_some() {
        request.set_header("Content-Type", "application/json");
    }
    request.set_header("Accept", "application/json");
    for (name, value) in headers {
        request.set_header(name, value.clone());
    }

    Ok(request)
}
