//! OpenAPI operation resolution.

use serde_json::Value;
use std::collections::HashMap;
use wayfarer_core::{Manifest, ResolverError};

const HTTP_VERBS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// One resolvable HTTP endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    /// Uppercased HTTP verb.
    pub method: String,
    /// OpenAPI path, as written in the document.
    pub path: String,
}

/// `operationId` index over an OpenAPI 3.0 bundle.
///
/// Only `paths.<p>.<verb>.operationId` and `servers[0].url` are consumed;
/// everything else in the document is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenApiResolver {
    operations: HashMap<String, Operation>,
    server_url: Option<String>,
}

impl OpenApiResolver {
    /// Scan a parsed OpenAPI document.
    pub fn from_json(document: &Value) -> Result<Self, ResolverError> {
        let mut operations = HashMap::new();

        if let Some(paths) = document.get("paths").and_then(Value::as_object) {
            for (path, item) in paths {
                let Some(item) = item.as_object() else {
                    continue;
                };
                for verb in HTTP_VERBS {
                    let Some(operation_id) = item
                        .get(verb)
                        .and_then(|op| op.get("operationId"))
                        .and_then(Value::as_str)
                    else {
                        continue;
                    };
                    operations.insert(
                        operation_id.to_string(),
                        Operation {
                            method: verb.to_uppercase(),
                            path: path.clone(),
                        },
                    );
                }
            }
        }

        if operations.is_empty() {
            return Err(ResolverError::InvalidDocument {
                reason: "no operationIds found under paths".to_string(),
            });
        }

        let server_url = document
            .pointer("/servers/0/url")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(Self {
            operations,
            server_url,
        })
    }

    /// The bundle's first server URL, if declared.
    pub fn server_url(&self) -> Option<&str> {
        self.server_url.as_deref()
    }

    /// Resolve an operation identifier.
    pub fn operation(&self, operation_id: &str) -> Option<&Operation> {
        self.operations.get(operation_id)
    }

    /// Check that every binding in every manifest step references a known
    /// operation.
    pub fn validate_operation_ids(&self, manifest: &Manifest) -> Result<(), ResolverError> {
        for (step_id, step) in &manifest.steps {
            for binding in &step.bindings {
                if !self.operations.contains_key(&binding.call.operation_id) {
                    return Err(ResolverError::InvalidDocument {
                        reason: format!(
                            "operationId '{}' referenced by step '{}' is not defined",
                            binding.call.operation_id, step_id
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}
