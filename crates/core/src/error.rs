use crate::submission::SubmissionResult;

#[derive(Debug, thiserror::Error)]
pub enum PsuError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("identifier error: {0}")]
    Identifier(#[from] nhs_identifiers::IdentifierError),
    #[error("FHIR error: {0}")]
    Fhir(#[from] fhir::FhirError),
    #[error(
        "failed to read private key from {path}: {source}",
        path = path.display()
    )]
    PrivateKeyRead {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to sign client assertion: {0}")]
    Signing(String),
    #[error("token request failed with HTTP {status}")]
    AuthFailure { status: u16, body: String },
    #[error("token response did not contain an access_token")]
    MissingAccessToken { body: String },
    #[error(
        "submission failed with HTTP {} (request id {}, correlation id {})",
        .0.status, .0.request_id, .0.correlation_id
    )]
    SubmissionFailure(Box<SubmissionResult>),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl PsuError {
    /// Raw response body returned by the remote service, where there was one.
    pub fn response_body(&self) -> Option<&str> {
        match self {
            Self::AuthFailure { body, .. } | Self::MissingAccessToken { body } => Some(body),
            Self::SubmissionFailure(result) => Some(&result.body),
            _ => None,
        }
    }
}

pub type PsuResult<T> = std::result::Result<T, PsuError>;
