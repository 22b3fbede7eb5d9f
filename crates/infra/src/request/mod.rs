//! Request options and the validate → transform → apply pipeline.
//!
//! Callers describe a call as an ordered list of [`RequestOption`]s built
//! with [`with_path_param`], [`with_query_param`] and [`with_body`]. The
//! executor feeds them through [`PreparedRequest::prepare`], which rejects
//! the whole call before any network I/O if a single option fails.

use std::collections::HashMap;

use serde::Serialize;
use twinline_domain::ParameterError;

use crate::endpoint::{BodyType, Endpoint};

/// One caller-supplied step in building a request.
#[derive(Debug, Clone)]
pub enum RequestOption {
    PathParam { name: String, value: String },
    QueryParam { name: String, value: String },
    Body(RequestBody),
}

/// A serialized request body together with its source type.
#[derive(Debug, Clone)]
pub struct RequestBody {
    ty: BodyType,
    json: Result<serde_json::Value, String>,
}

/// Set path parameter `name`; validated and transformed when applied.
pub fn with_path_param(name: impl Into<String>, value: impl Into<String>) -> RequestOption {
    RequestOption::PathParam { name: name.into(), value: value.into() }
}

/// Set query parameter `name`, replacing an earlier value; empty optional values are dropped.
pub fn with_query_param(name: impl Into<String>, value: impl Into<String>) -> RequestOption {
    RequestOption::QueryParam { name: name.into(), value: value.into() }
}

/// Attach a JSON body. Its type is checked against the endpoint's declared
/// request body type when the option is applied; a `Box`, `Arc`, `Rc` or
/// `&'static` around the declared type is accepted.
pub fn with_body<T: Serialize + 'static>(body: &T) -> RequestOption {
    RequestOption::Body(RequestBody {
        ty: BodyType::of::<T>(),
        json: serde_json::to_value(body).map_err(|err| err.to_string()),
    })
}

/// Parameters and body bound to one endpoint, ready to be sent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreparedRequest {
    path_values: HashMap<String, String>,
    query: Vec<(String, String)>,
    body: Option<serde_json::Value>,
}

impl PreparedRequest {
    /// Apply every option in order, then check that no required parameter
    /// was left out.
    pub fn prepare(
        endpoint: &Endpoint,
        options: impl IntoIterator<Item = RequestOption>,
    ) -> Result<Self, ParameterError> {
        let mut prepared = Self::default();
        let mut supplied: Vec<String> = Vec::new();

        for option in options {
            if let RequestOption::PathParam { name, .. } | RequestOption::QueryParam { name, .. } =
                &option
            {
                supplied.push(name.clone());
            }
            prepared.apply(endpoint, option)?;
        }

        let required = endpoint.path_params().iter().chain(endpoint.query_params());
        for spec in required.filter(|spec| spec.is_required()) {
            if !supplied.iter().any(|name| name == spec.name()) {
                return Err(ParameterError::Missing {
                    endpoint: endpoint.name().to_string(),
                    parameter: spec.name().to_string(),
                });
            }
        }

        Ok(prepared)
    }

    /// Apply a single option. On error `self` is left unchanged.
    pub fn apply(&mut self, endpoint: &Endpoint, option: RequestOption) -> Result<(), ParameterError> {
        match option {
            RequestOption::PathParam { name, value } => {
                let spec = endpoint.path_param(&name).ok_or_else(|| undeclared(endpoint, &name))?;
                match spec.resolve(endpoint.name(), &value)? {
                    Some(value) => {
                        self.path_values.insert(name, value);
                    }
                    None => {
                        self.path_values.remove(&name);
                    }
                }
            }
            RequestOption::QueryParam { name, value } => {
                let spec = endpoint.query_param(&name).ok_or_else(|| undeclared(endpoint, &name))?;
                let resolved = spec.resolve(endpoint.name(), &value)?;
                self.query.retain(|(key, _)| key != &name);
                if let Some(value) = resolved {
                    self.query.push((name, value));
                }
            }
            RequestOption::Body(body) => {
                if let Some(expected) = endpoint.request_body() {
                    if !expected.accepts(&body.ty) {
                        return Err(ParameterError::BodyMismatch {
                            endpoint: endpoint.name().to_string(),
                            expected: expected.name().to_string(),
                            actual: body.ty.name().to_string(),
                        });
                    }
                }
                let json = body.json.map_err(|reason| ParameterError::BodyEncoding {
                    endpoint: endpoint.name().to_string(),
                    reason,
                })?;
                self.body = Some(json);
            }
        }
        Ok(())
    }

    /// Substitute path values into the endpoint's template.
    ///
    /// Values are percent-encoded; unset optional placeholders become empty.
    pub fn render_path(&self, endpoint: &Endpoint) -> String {
        let mut path = endpoint.path_template().to_string();
        for spec in endpoint.path_params() {
            let placeholder = format!("{{{}}}", spec.name());
            let value = self.path_values.get(spec.name()).map(String::as_str).unwrap_or_default();
            path = path.replace(&placeholder, &urlencoding::encode(value));
        }
        path
    }

    /// Bound value of path parameter `name`.
    pub fn path_value(&self, name: &str) -> Option<&str> {
        self.path_values.get(name).map(String::as_str)
    }

    /// Query pairs in application order.
    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// Serialized JSON body.
    pub fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }
}

fn undeclared(endpoint: &Endpoint, name: &str) -> ParameterError {
    ParameterError::Undeclared {
        endpoint: endpoint.name().to_string(),
        parameter: name.to_string(),
    }
}
