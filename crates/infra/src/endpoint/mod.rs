//! Typed descriptors of remote operations.
//!
//! An [`Endpoint`] is built once with [`Endpoint::builder`], registered in a
//! [`Registry`], and shared read-only afterwards. It describes everything the
//! executor needs to issue the call: method, partition, path template,
//! parameter contracts, body types and, for asynchronous operations, the
//! [`JobPolicy`] driving the job poller.

pub mod params;
pub mod registry;

use std::any::{type_name, TypeId};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use twinline_domain::PartitionId;

pub use params::{ParamSpec, PathParam, QueryParam, TransformFn, ValidatorFn};
pub use registry::Registry;

use crate::http::RawResponse;

/// Harvests auxiliary values from a job response (initial or poll).
pub type ExtractorFn =
    Arc<dyn Fn(&RawResponse) -> Result<BTreeMap<String, String>, String> + Send + Sync>;

/// Runtime identity of a request or response body type.
///
/// Besides `T` itself it remembers the ids of `Box<T>`, `Arc<T>`, `Rc<T>`
/// and `&'static T`, so a body and a declared type can be matched through
/// one pointer indirection on either side.
#[derive(Clone, Copy)]
pub struct BodyType {
    id: TypeId,
    wrapped: [TypeId; 4],
    name: &'static str,
}

impl BodyType {
    /// Identity of `T`.
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            wrapped: [
                TypeId::of::<Box<T>>(),
                TypeId::of::<Arc<T>>(),
                TypeId::of::<Rc<T>>(),
                TypeId::of::<&'static T>(),
            ],
            name: type_name::<T>(),
        }
    }

    /// Fully qualified type name, for error messages.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether a body of type `other` satisfies this declared type.
    ///
    /// Holds for the same type, or when one side is a `Box`, `Arc`, `Rc` or
    /// `&'static` pointer to the other.
    pub fn accepts(&self, other: &Self) -> bool {
        self.id == other.id || self.wrapped.contains(&other.id) || other.wrapped.contains(&self.id)
    }
}

impl PartialEq for BodyType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for BodyType {}

impl fmt::Debug for BodyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// How the poller waits for an asynchronous operation.
#[derive(Clone)]
pub struct JobPolicy {
    poll_interval: Duration,
    timeout: Duration,
    extractor: Option<ExtractorFn>,
}

impl JobPolicy {
    /// Poll every `poll_interval` until `timeout` has been spent.
    pub fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self { poll_interval, timeout, extractor: None }
    }

    /// Run `extractor` on every job response; failures are logged and ignored.
    #[must_use]
    pub fn extractor<F>(mut self, extractor: F) -> Self
    where
        F: Fn(&RawResponse) -> Result<BTreeMap<String, String>, String> + Send + Sync + 'static,
    {
        self.extractor = Some(Arc::new(extractor));
        self
    }

    /// Delay before each poll.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Total polling budget.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The extractor hook, if any.
    pub fn extractor_fn(&self) -> Option<&ExtractorFn> {
        self.extractor.as_ref()
    }

    /// `floor(timeout / poll_interval)`; zero for a zero interval.
    pub fn max_attempts(&self) -> u32 {
        if self.poll_interval.is_zero() {
            return 0;
        }
        let attempts = self.timeout.as_nanos() / self.poll_interval.as_nanos();
        u32::try_from(attempts).unwrap_or(u32::MAX)
    }
}

impl Default for JobPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(300))
    }
}

impl fmt::Debug for JobPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobPolicy")
            .field("poll_interval", &self.poll_interval)
            .field("timeout", &self.timeout)
            .field("extractor", &self.extractor.is_some())
            .finish()
    }
}

/// Immutable descriptor of one remote operation.
#[derive(Debug, Clone)]
pub struct Endpoint {
    name: String,
    method: Method,
    partition: PartitionId,
    path_template: String,
    documentation: String,
    description: String,
    path_params: Vec<PathParam>,
    query_params: Vec<QueryParam>,
    request_body: Option<BodyType>,
    response_body: Option<BodyType>,
    job: Option<JobPolicy>,
}

impl Endpoint {
    /// Start describing an endpoint; `path_template` uses `{name}` placeholders.
    pub fn builder(
        name: impl Into<String>,
        method: Method,
        partition: PartitionId,
        path_template: impl Into<String>,
    ) -> EndpointBuilder {
        EndpointBuilder {
            endpoint: Endpoint {
                name: name.into(),
                method,
                partition,
                path_template: path_template.into(),
                documentation: String::new(),
                description: String::new(),
                path_params: Vec::new(),
                query_params: Vec::new(),
                request_body: None,
                response_body: None,
                job: None,
            },
        }
    }

    /// Unique registry key.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Backend partition serving this endpoint.
    pub fn partition(&self) -> PartitionId {
        self.partition
    }

    /// Path relative to the partition base URL.
    pub fn path_template(&self) -> &str {
        &self.path_template
    }

    /// Link to the backend's reference documentation for this operation.
    pub fn documentation(&self) -> &str {
        &self.documentation
    }

    /// Short human-readable summary.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Declared path parameters, in declaration order.
    pub fn path_params(&self) -> &[PathParam] {
        &self.path_params
    }

    /// Declared query parameters, in declaration order.
    pub fn query_params(&self) -> &[QueryParam] {
        &self.query_params
    }

    /// Path parameter declared as `name`.
    pub fn path_param(&self, name: &str) -> Option<&PathParam> {
        self.path_params.iter().find(|p| p.name() == name)
    }

    /// Query parameter declared as `name`.
    pub fn query_param(&self, name: &str) -> Option<&QueryParam> {
        self.query_params.iter().find(|p| p.name() == name)
    }

    /// Declared request body type.
    pub fn request_body(&self) -> Option<BodyType> {
        self.request_body
    }

    /// Declared response body type.
    pub fn response_body(&self) -> Option<BodyType> {
        self.response_body
    }

    /// Polling policy for asynchronous operations.
    pub fn job_policy(&self) -> Option<&JobPolicy> {
        self.job.as_ref()
    }

    /// Placeholder names in the path template, in order of appearance.
    ///
    /// Returns `None` when braces are unbalanced or nested.
    pub fn placeholders(&self) -> Option<Vec<&str>> {
        let mut names = Vec::new();
        let mut rest = self.path_template.as_str();
        while let Some(open) = rest.find(['{', '}']) {
            if rest[open..].starts_with('}') {
                return None;
            }
            let after = &rest[open + 1..];
            let close = after.find('}')?;
            let name = &after[..close];
            if name.is_empty() || name.contains('{') {
                return None;
            }
            names.push(name);
            rest = &after[close + 1..];
        }
        Some(names)
    }
}

/// Builder for [`Endpoint`]. Validation happens at registration.
#[derive(Debug)]
pub struct EndpointBuilder {
    endpoint: Endpoint,
}

impl EndpointBuilder {
    /// Link to the backend reference documentation. Required.
    #[must_use]
    pub fn documentation(mut self, url: impl Into<String>) -> Self {
        self.endpoint.documentation = url.into();
        self
    }

    /// Short human-readable summary.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.endpoint.description = description.into();
        self
    }

    /// Declare a path parameter matching a `{name}` placeholder.
    #[must_use]
    pub fn path_param(mut self, spec: PathParam) -> Self {
        self.endpoint.path_params.push(spec);
        self
    }

    /// Declare a query parameter.
    #[must_use]
    pub fn query_param(mut self, spec: QueryParam) -> Self {
        self.endpoint.query_params.push(spec);
        self
    }

    /// Require request bodies of type `T` (or one pointer to it).
    #[must_use]
    pub fn request_body<T: 'static>(mut self) -> Self {
        self.endpoint.request_body = Some(BodyType::of::<T>());
        self
    }

    /// Record the response body type `T`.
    #[must_use]
    pub fn response_body<T: 'static>(mut self) -> Self {
        self.endpoint.response_body = Some(BodyType::of::<T>());
        self
    }

    /// Resolve the returned job with `policy` before returning.
    #[must_use]
    pub fn job(mut self, policy: JobPolicy) -> Self {
        self.endpoint.job = Some(policy);
        self
    }

    /// Finish the descriptor; it is validated by [`Registry::register`].
    pub fn build(self) -> Endpoint {
        self.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(path: &str) -> Endpoint {
        Endpoint::builder("Probe", Method::GET, PartitionId::Vmware, path).build()
    }

    #[test]
    fn placeholders_are_listed_in_order() {
        let ep = endpoint("/orgs/{orgId}/vdcs/{vdcId}");
        assert_eq!(ep.placeholders(), Some(vec!["orgId", "vdcId"]));
        assert_eq!(endpoint("/orgs").placeholders(), Some(vec![]));
    }

    #[test]
    fn unbalanced_placeholders_are_rejected() {
        assert_eq!(endpoint("/orgs/{orgId").placeholders(), None);
        assert_eq!(endpoint("/orgs/orgId}").placeholders(), None);
        assert_eq!(endpoint("/orgs/{}").placeholders(), None);
        assert_eq!(endpoint("/orgs/{a{b}}").placeholders(), None);
    }

    #[test]
    fn max_attempts_floors_timeout_over_interval() {
        let policy = JobPolicy::new(Duration::from_secs(1), Duration::from_secs(5));
        assert_eq!(policy.max_attempts(), 5);

        let policy = JobPolicy::new(Duration::from_millis(300), Duration::from_secs(1));
        assert_eq!(policy.max_attempts(), 3);

        let policy = JobPolicy::new(Duration::ZERO, Duration::from_secs(1));
        assert_eq!(policy.max_attempts(), 0);
    }

    #[test]
    fn body_types_compare_by_type() {
        struct Foo;
        struct Bar;
        assert_eq!(BodyType::of::<Foo>(), BodyType::of::<Foo>());
        assert_ne!(BodyType::of::<Foo>(), BodyType::of::<Bar>());
        assert!(BodyType::of::<Foo>().name().ends_with("Foo"));
    }

    #[test]
    fn body_types_accept_one_pointer_indirection() {
        struct Foo;
        struct Bar;
        let declared = BodyType::of::<Foo>();
        assert!(declared.accepts(&BodyType::of::<Foo>()));
        assert!(declared.accepts(&BodyType::of::<Box<Foo>>()));
        assert!(declared.accepts(&BodyType::of::<Arc<Foo>>()));
        assert!(declared.accepts(&BodyType::of::<Rc<Foo>>()));
        assert!(declared.accepts(&BodyType::of::<&'static Foo>()));
        assert!(BodyType::of::<Box<Foo>>().accepts(&declared));

        assert!(!declared.accepts(&BodyType::of::<Box<Box<Foo>>>()));
        assert!(!declared.accepts(&BodyType::of::<Box<Bar>>()));
    }
}
