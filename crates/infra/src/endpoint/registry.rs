//! Name-keyed store of endpoint descriptors.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::Method;
use tracing::debug;
use twinline_domain::{ApiError, Result};

use super::Endpoint;

/// Registry of endpoints, populated at startup and read during traffic.
#[derive(Debug, Default)]
pub struct Registry {
    endpoints: RwLock<HashMap<String, Arc<Endpoint>>>,
}

impl Registry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and store `endpoint`.
    ///
    /// # Errors
    /// Returns `ApiError::Configuration` when the definition is invalid or
    /// the name is already taken; the existing entry is left untouched.
    pub fn register(&self, endpoint: Endpoint) -> Result<Arc<Endpoint>> {
        validate(&endpoint)?;

        let mut endpoints = self.endpoints.write();
        if endpoints.contains_key(endpoint.name()) {
            return Err(ApiError::Configuration(format!(
                "endpoint '{}' is already registered",
                endpoint.name()
            )));
        }

        let endpoint = Arc::new(endpoint);
        endpoints.insert(endpoint.name().to_string(), endpoint.clone());
        debug!(
            endpoint = endpoint.name(),
            partition = %endpoint.partition(),
            method = %endpoint.method(),
            path = endpoint.path_template(),
            "registered endpoint"
        );
        Ok(endpoint)
    }

    /// Register every endpoint, stopping at the first invalid one.
    pub fn register_all(&self, endpoints: impl IntoIterator<Item = Endpoint>) -> Result<()> {
        for endpoint in endpoints {
            self.register(endpoint)?;
        }
        Ok(())
    }

    /// # Errors
    /// Returns `ApiError::EndpointNotFound` if no endpoint has this name.
    pub fn get(&self, name: &str) -> Result<Arc<Endpoint>> {
        self.endpoints
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ApiError::EndpointNotFound(name.to_string()))
    }

    /// Whether an endpoint is registered as `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.endpoints.read().contains_key(name)
    }

    /// Number of registered endpoints.
    pub fn len(&self) -> usize {
        self.endpoints.read().len()
    }

    /// Whether nothing is registered yet.
    pub fn is_empty(&self) -> bool {
        self.endpoints.read().is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.endpoints.read().keys().cloned().collect();
        names.sort();
        names
    }
}

fn validate(endpoint: &Endpoint) -> Result<()> {
    let invalid = |reason: &str| {
        let name = if endpoint.name().is_empty() { "<unnamed>" } else { endpoint.name() };
        Err(ApiError::Configuration(format!("endpoint '{name}': {reason}")))
    };

    if endpoint.name().trim().is_empty() {
        return invalid("name is required");
    }
    if endpoint.path_template().is_empty() {
        return invalid("path template is required");
    }
    if !endpoint.path_template().starts_with('/') {
        return invalid("path template must start with '/'");
    }
    if endpoint.documentation().trim().is_empty() {
        return invalid("documentation reference is required");
    }

    let needs_body = [Method::POST, Method::PUT, Method::PATCH].contains(endpoint.method());
    if needs_body && endpoint.request_body().is_none() {
        return invalid("request body type is required for POST/PUT/PATCH");
    }

    let Some(placeholders) = endpoint.placeholders() else {
        return invalid("path template has unbalanced or empty placeholders");
    };
    let placeholders: BTreeSet<&str> = placeholders.into_iter().collect();

    let mut declared = BTreeSet::new();
    for param in endpoint.path_params() {
        if !declared.insert(param.name()) {
            return invalid(&format!("path parameter '{}' declared twice", param.name()));
        }
        if !placeholders.contains(param.name()) {
            return invalid(&format!("path parameter '{}' has no placeholder", param.name()));
        }
    }
    if let Some(missing) = placeholders.iter().find(|name| !declared.contains(*name)) {
        return invalid(&format!("placeholder '{{{missing}}}' has no declared path parameter"));
    }

    let mut query = BTreeSet::new();
    for param in endpoint.query_params() {
        if !query.insert(param.name()) {
            return invalid(&format!("query parameter '{}' declared twice", param.name()));
        }
    }

    if let Some(policy) = endpoint.job_policy() {
        if policy.poll_interval().is_zero() {
            return invalid("job poll interval must be positive");
        }
        if policy.max_attempts() == 0 {
            return invalid("job timeout must be at least one poll interval");
        }
    }

    Ok(())
}
