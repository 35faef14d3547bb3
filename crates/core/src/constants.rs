//! Constants used throughout the PSU core crate.
//!
//! Endpoint paths, OAuth2 form values and client defaults live here so the auth, submission and
//! configuration modules agree on them.

/// Path of the OAuth2 token endpoint, relative to the API base URL.
pub const TOKEN_PATH: &str = "/oauth2/token";

/// Path of the Prescription Status Update endpoint, relative to the API base URL.
pub const PSU_PATH: &str = "/prescription-status-update/";

/// Lifetime of a signed client assertion, in seconds.
pub const ASSERTION_LIFETIME_SECS: i64 = 180;

/// OAuth2 grant type for the signed JWT client credentials flow.
pub const GRANT_TYPE: &str = "client_credentials";

/// Client assertion type for a JWT bearer assertion.
pub const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Access tokens are treated as expired this many seconds before the endpoint says so.
pub const TOKEN_EXPIRY_MARGIN_SECS: i64 = 10;

/// Header carrying the per-request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Header carrying the per-request correlation id.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Default timeout applied to every outbound HTTP request.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Base URL template for pull-request deployments of the PSU service.
pub const PR_BASE_URL_PREFIX: &str = "https://psu-pr-";
pub const PR_BASE_URL_SUFFIX: &str = ".dev.eps.national.nhs.uk";

/// ODS code length used when generating owners for PSU entries.
pub const GENERATED_ODS_CODE_LEN: usize = 5;
