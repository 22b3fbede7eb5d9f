//! Wire-level constants shared by the domain and infrastructure crates.

/// Response header carrying the session token after a successful login.
pub const DEFAULT_TOKEN_HEADER: &str = "X-VMWARE-VCLOUD-ACCESS-TOKEN";

/// Path, relative to the login base URL, of the session endpoint.
pub const SESSIONS_PATH: &str = "/sessions";

/// Default API version advertised to the VMware partition.
pub const DEFAULT_VMWARE_API_VERSION: &str = "38.1";

/// Default API version advertised to the Cerberus partition.
pub const DEFAULT_CERBERUS_API_VERSION: &str = "2.0";

/// Default per-request HTTP timeout.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Path parameter name used by both partitions' job-status endpoints.
pub const JOB_ID_PARAM: &str = "jobId";
