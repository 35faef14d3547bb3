//! PSU client configuration.
//!
//! Everything in here is resolved once at process startup and then passed into the auth and
//! submission clients. Functions take the raw environment values as arguments so the library
//! never reads process-wide environment variables itself.

use crate::constants::{
    DEFAULT_HTTP_TIMEOUT_SECS, PR_BASE_URL_PREFIX, PR_BASE_URL_SUFFIX, PSU_PATH, TOKEN_PATH,
};
use crate::{PsuError, PsuResult};
use psu_types::{NonEmptyText, SecretText};
use std::path::PathBuf;
use std::time::Duration;

/// Resolved token and submission URLs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoints {
    token_url: String,
    submission_url: String,
    pull_request: Option<u32>,
}

impl Endpoints {
    /// Endpoints on `https://{host}`.
    pub fn for_host(host: &str) -> PsuResult<Self> {
        validate_host(host)?;
        Ok(Self::from_base(&format!("https://{host}")))
    }

    /// Endpoints under an explicit base URL, such as a local mock server.
    pub fn for_base_url(base_url: &str) -> PsuResult<Self> {
        let base = base_url.trim().trim_end_matches('/');
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(PsuError::Config(format!(
                "base URL must start with http:// or https://, got '{base_url}'"
            )));
        }
        Ok(Self::from_base(base))
    }

    fn from_base(base: &str) -> Self {
        Self {
            token_url: format!("{base}{TOKEN_PATH}"),
            submission_url: format!("{base}{PSU_PATH}"),
            pull_request: None,
        }
    }

    /// Routes submissions to the deployment for pull request `pr_number`.
    ///
    /// The token URL is left unchanged.
    pub fn with_pull_request(mut self, pr_number: u32) -> Self {
        self.submission_url = format!("{PR_BASE_URL_PREFIX}{pr_number}{PR_BASE_URL_SUFFIX}/");
        self.pull_request = Some(pr_number);
        self
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    pub fn submission_url(&self) -> &str {
        &self.submission_url
    }

    /// Pull-request deployments are reached directly and do not take an access token.
    pub fn pull_request(&self) -> Option<u32> {
        self.pull_request
    }
}

/// Validate that `host` is a bare DNS name (optionally with a port) safe to put in a URL.
pub fn validate_host(host: &str) -> PsuResult<()> {
    const MAX_HOST_LEN: usize = 253;

    if host.trim().is_empty() {
        return Err(PsuError::Config("HOST cannot be empty".into()));
    }

    if host.len() > MAX_HOST_LEN {
        return Err(PsuError::Config(format!(
            "HOST exceeds maximum length of {MAX_HOST_LEN} characters"
        )));
    }

    if !host.is_ascii() {
        return Err(PsuError::Config(
            "HOST must contain only ASCII characters".into(),
        ));
    }

    let ok = host
        .bytes()
        .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' | b'.' | b'-' | b':'));

    if !ok {
        return Err(PsuError::Config(format!(
            "HOST '{host}' contains invalid characters (expected a bare host name such as internal-dev.api.service.nhs.uk)"
        )));
    }

    Ok(())
}

/// Application credentials registered with the API platform.
#[derive(Clone, Debug)]
pub struct Credentials {
    pub api_key: NonEmptyText,
    pub kid: NonEmptyText,
    pub private_key_pem: SecretText,
}

impl Credentials {
    pub fn new(api_key: &str, kid: &str, private_key_pem: SecretText) -> PsuResult<Self> {
        let api_key =
            NonEmptyText::new(api_key).map_err(|_| PsuError::Config("API_KEY not set".into()))?;
        let kid = NonEmptyText::new(kid).map_err(|_| PsuError::Config("KID not set".into()))?;
        Ok(Self {
            api_key,
            kid,
            private_key_pem,
        })
    }
}

/// Configuration for a sending run.
#[derive(Clone, Debug)]
pub struct PsuConfig {
    credentials: Credentials,
    endpoints: Endpoints,
    http_timeout: Duration,
}

impl PsuConfig {
    pub fn new(credentials: Credentials, endpoints: Endpoints, http_timeout: Duration) -> Self {
        Self {
            credentials,
            endpoints,
            http_timeout,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn http_timeout(&self) -> Duration {
        self.http_timeout
    }
}

/// Resolve endpoints from the `HOST`, `PSU_BASE_URL`, `IS_PR` and `PR_NUMBER` values.
///
/// A base URL override wins over `host`. Pull-request routing applies on top of either.
pub fn resolve_endpoints(
    host: Option<String>,
    base_url_override: Option<String>,
    is_pr: Option<String>,
    pr_number: Option<String>,
) -> PsuResult<Endpoints> {
    let endpoints = match (non_blank(base_url_override), non_blank(host)) {
        (Some(base_url), _) => Endpoints::for_base_url(&base_url)?,
        (None, Some(host)) => Endpoints::for_host(&host)?,
        (None, None) => return Err(PsuError::Config("HOST not set".into())),
    };

    if !is_pr_from_env_value(is_pr) {
        return Ok(endpoints);
    }

    let pr_number = non_blank(pr_number)
        .ok_or_else(|| PsuError::Config("PR_NUMBER must be set when IS_PR is true".into()))?;
    let pr_number = pr_number.trim().parse::<u32>().map_err(|_| {
        PsuError::Config(format!("PR_NUMBER must be a positive integer, got '{pr_number}'"))
    })?;

    Ok(endpoints.with_pull_request(pr_number))
}

/// `IS_PR` is true only for the literal `true` (case-insensitive).
pub fn is_pr_from_env_value(value: Option<String>) -> bool {
    value
        .map(|v| v.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Resolve the PEM signing key from `PRIVATE_KEY` or, failing that, `PRIVATE_KEY_PATH`.
///
/// Inline keys may carry literal `\n` sequences in place of newlines, as `.env` files often do.
pub fn resolve_private_key(
    inline: Option<String>,
    path: Option<PathBuf>,
) -> PsuResult<SecretText> {
    let missing = || PsuError::Config("set PRIVATE_KEY or PRIVATE_KEY_PATH".into());

    if let Some(inline) = non_blank(inline) {
        return SecretText::new(inline.replace("\\n", "\n")).map_err(|_| missing());
    }

    let Some(path) = path.filter(|p| !p.as_os_str().is_empty()) else {
        return Err(missing());
    };

    let pem = std::fs::read_to_string(&path)
        .map_err(|source| PsuError::PrivateKeyRead { path, source })?;
    SecretText::new(pem).map_err(|_| missing())
}

/// Parse `PSU_HTTP_TIMEOUT_SECS`, falling back to the default when unset.
pub fn http_timeout_from_env_value(value: Option<String>) -> PsuResult<Duration> {
    let Some(raw) = non_blank(value) else {
        return Ok(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS));
    };

    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(PsuError::Config(format!(
            "PSU_HTTP_TIMEOUT_SECS must be a positive number of seconds, got '{raw}'"
        ))),
    }
}

/// Build the shared HTTP client with an explicit request timeout.
pub fn build_http_client(timeout: Duration) -> PsuResult<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
