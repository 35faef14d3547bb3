//! Submission of PSU bundles.
//!
//! Each call carries a fresh request id and correlation id so the receiving service's logs can be
//! matched to a single submission. Only `201 Created` counts as success; there are no retries.

use crate::auth::AccessToken;
use crate::config::Endpoints;
use crate::constants::{CORRELATION_ID_HEADER, REQUEST_ID_HEADER};
use crate::{PsuError, PsuResult};
use fhir::{Bundle, TransactionBundle};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use uuid::Uuid;

/// Outcome of one submission, successful or not.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmissionResult {
    pub request_id: Uuid,
    pub correlation_id: Uuid,
    pub status: u16,
    pub body: String,
}

impl SubmissionResult {
    pub fn is_success(&self) -> bool {
        self.status == StatusCode::CREATED.as_u16()
    }

    /// The response body, indented if it is JSON and verbatim otherwise.
    pub fn body_pretty(&self) -> String {
        serde_json::from_str::<serde_json::Value>(&self.body)
            .ok()
            .and_then(|value| serde_json::to_string_pretty(&value).ok())
            .unwrap_or_else(|| self.body.clone())
    }
}

/// Client for the PSU endpoint.
#[derive(Clone, Debug)]
pub struct SubmissionClient {
    http: reqwest::Client,
    submission_url: String,
}

impl SubmissionClient {
    pub fn new(http: reqwest::Client, endpoints: &Endpoints) -> Self {
        Self {
            http,
            submission_url: endpoints.submission_url().to_owned(),
        }
    }

    pub fn submission_url(&self) -> &str {
        &self.submission_url
    }

    /// POST `bundle` to the PSU endpoint.
    ///
    /// `token` is `None` only for pull-request deployments, which are not behind the gateway.
    ///
    /// # Errors
    ///
    /// - [`PsuError::SubmissionFailure`] for any status other than 201, carrying both ids.
    /// - [`PsuError::Http`] for transport failures, including timeouts.
    pub async fn submit(
        &self,
        token: Option<&AccessToken>,
        bundle: &TransactionBundle,
    ) -> PsuResult<SubmissionResult> {
        let payload = Bundle::render(bundle)?;
        self.post(token, payload, bundle.entries.len()).await
    }

    /// POST a bundle supplied as JSON text, byte for byte.
    ///
    /// The text is checked with [`Bundle::parse`] first but the parsed form is not re-rendered,
    /// so FHIR elements this crate does not model reach the server intact.
    ///
    /// # Errors
    ///
    /// As [`SubmissionClient::submit`], plus [`PsuError::Fhir`] if `json_text` is not a valid
    /// PSU bundle.
    pub async fn submit_json(
        &self,
        token: Option<&AccessToken>,
        json_text: &str,
    ) -> PsuResult<SubmissionResult> {
        let bundle = Bundle::parse(json_text)?;
        self.post(token, json_text.to_owned(), bundle.entries.len())
            .await
    }

    async fn post(
        &self,
        token: Option<&AccessToken>,
        payload: String,
        entries: usize,
    ) -> PsuResult<SubmissionResult> {
        let request_id = Uuid::new_v4();
        let correlation_id = Uuid::new_v4();

        tracing::info!(
            %request_id,
            %correlation_id,
            url = %self.submission_url,
            entries,
            "submitting PSU bundle"
        );

        let mut request = self
            .http
            .post(&self.submission_url)
            .header(CONTENT_TYPE, "application/json")
            .header(REQUEST_ID_HEADER, request_id.to_string())
            .header(CORRELATION_ID_HEADER, correlation_id.to_string());
        if let Some(token) = token {
            request = request.bearer_auth(token.bearer());
        }

        let response = request.body(payload).send().await?;
        let status = response.status();
        let body = response.text().await?;

        let result = SubmissionResult {
            request_id,
            correlation_id,
            status: status.as_u16(),
            body,
        };

        if !result.is_success() {
            tracing::warn!(
                %request_id,
                %correlation_id,
                status = result.status,
                "PSU submission rejected"
            );
            return Err(PsuError::SubmissionFailure(Box::new(result)));
        }

        tracing::info!(%request_id, %correlation_id, status = result.status, "PSU submission accepted");
        Ok(result)
    }
}
