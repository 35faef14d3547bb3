//! One sending run: token acquisition plus submission.
//!
//! The access token is fetched lazily before the first submission and reused for the rest of the
//! run. It is refetched only if the endpoint gave it a lifetime that has since run out. Tokens
//! are never persisted.

use crate::auth::{AccessToken, AuthClient};
use crate::config::{build_http_client, PsuConfig};
use crate::submission::{SubmissionClient, SubmissionResult};
use crate::PsuResult;
use fhir::TransactionBundle;

#[derive(Debug)]
pub struct PsuClient {
    auth: AuthClient,
    submission: SubmissionClient,
    needs_token: bool,
    token: Option<AccessToken>,
}

impl PsuClient {
    /// Build a client with its own HTTP client, using the configured timeout.
    pub fn new(config: &PsuConfig) -> PsuResult<Self> {
        let http = build_http_client(config.http_timeout())?;
        Self::with_http_client(http, config)
    }

    pub fn with_http_client(http: reqwest::Client, config: &PsuConfig) -> PsuResult<Self> {
        let endpoints = config.endpoints();
        Ok(Self {
            auth: AuthClient::new(http.clone(), endpoints, config.credentials())?,
            submission: SubmissionClient::new(http, endpoints),
            needs_token: endpoints.pull_request().is_none(),
            token: None,
        })
    }

    /// Submit `bundle`, obtaining an access token first if this run does not have one yet.
    pub async fn send(&mut self, bundle: &TransactionBundle) -> PsuResult<SubmissionResult> {
        self.ensure_token().await?;
        self.submission.submit(self.token.as_ref(), bundle).await
    }

    /// Submit a bundle given as JSON text, forwarding the text unchanged once it validates.
    pub async fn send_json(&mut self, json_text: &str) -> PsuResult<SubmissionResult> {
        self.ensure_token().await?;
        self.submission
            .submit_json(self.token.as_ref(), json_text)
            .await
    }

    async fn ensure_token(&mut self) -> PsuResult<()> {
        if !self.needs_token {
            tracing::debug!("pull-request deployment, skipping access token");
            return Ok(());
        }

        if self.token.as_ref().is_some_and(|t| !t.is_expired()) {
            return Ok(());
        }

        self.token = Some(self.auth.obtain_access_token().await?);
        Ok(())
    }
}
