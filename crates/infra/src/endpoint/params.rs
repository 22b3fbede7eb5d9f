//! Path and query parameter contracts.

use std::fmt;
use std::sync::Arc;

use twinline_domain::ParameterError;

/// Checks a non-empty parameter value; `Err` carries the rejection reason.
pub type ValidatorFn = Arc<dyn Fn(&str) -> Result<(), String> + Send + Sync>;

/// Rewrites a non-empty parameter value into its wire form.
pub type TransformFn = Arc<dyn Fn(&str) -> Result<String, String> + Send + Sync>;

/// Declared contract of a single path or query parameter.
#[derive(Clone)]
pub struct ParamSpec {
    name: String,
    required: bool,
    description: String,
    validator: Option<ValidatorFn>,
    transform: Option<TransformFn>,
}

/// Path parameters and query parameters share one contract shape.
pub type PathParam = ParamSpec;
/// Contract of a query parameter.
pub type QueryParam = ParamSpec;

impl ParamSpec {
    /// A parameter that must be supplied with a non-empty value.
    pub fn required(name: impl Into<String>) -> Self {
        Self::new(name, true)
    }

    /// A parameter that may be left out or empty.
    pub fn optional(name: impl Into<String>) -> Self {
        Self::new(name, false)
    }

    fn new(name: impl Into<String>, required: bool) -> Self {
        Self {
            name: name.into(),
            required,
            description: String::new(),
            validator: None,
            transform: None,
        }
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Check non-empty values with `validator` before they are applied.
    #[must_use]
    pub fn validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&str) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Rewrite non-empty values with `transform` after validation.
    #[must_use]
    pub fn transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(&str) -> Result<String, String> + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    /// Parameter name as used in templates and query strings.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a non-empty value must be supplied.
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Human-readable description.
    pub fn doc(&self) -> &str {
        &self.description
    }

    /// Whether a validator is attached.
    pub fn has_validator(&self) -> bool {
        self.validator.is_some()
    }

    /// Whether a transform is attached.
    pub fn has_transform(&self) -> bool {
        self.transform.is_some()
    }

    /// Run the validate → transform steps for `value`.
    ///
    /// Returns `Ok(None)` for an empty optional value, which callers omit
    /// from the request. Hooks only ever see non-empty values.
    pub fn resolve(&self, endpoint: &str, value: &str) -> Result<Option<String>, ParameterError> {
        if value.is_empty() {
            if self.required {
                return Err(ParameterError::Missing {
                    endpoint: endpoint.to_string(),
                    parameter: self.name.clone(),
                });
            }
            return Ok(None);
        }

        if let Some(validator) = &self.validator {
            validator(value).map_err(|reason| ParameterError::Invalid {
                endpoint: endpoint.to_string(),
                parameter: self.name.clone(),
                reason,
            })?;
        }

        let value = match &self.transform {
            Some(transform) => transform(value).map_err(|reason| ParameterError::Transform {
                endpoint: endpoint.to_string(),
                parameter: self.name.clone(),
                reason,
            })?,
            None => value.to_string(),
        };

        Ok(Some(value))
    }
}

impl fmt::Debug for ParamSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamSpec")
            .field("name", &self.name)
            .field("required", &self.required)
            .field("validator", &self.validator.is_some())
            .field("transform", &self.transform.is_some())
            .finish()
    }
}
