//! Signed JWT client credentials flow.
//!
//! The API platform authenticates applications with a short-lived RS512 client assertion signed
//! by the application's private key. The assertion is exchanged at the token endpoint for a
//! bearer access token, which is then presented on each PSU submission.

use crate::config::{Credentials, Endpoints};
use crate::constants::{
    ASSERTION_LIFETIME_SECS, CLIENT_ASSERTION_TYPE, GRANT_TYPE, TOKEN_EXPIRY_MARGIN_SECS,
};
use crate::{PsuError, PsuResult};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use psu_types::{NonEmptyText, SecretText};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// RSA private key used to sign client assertions, with its registered key id.
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    key: EncodingKey,
}

impl SigningKey {
    /// Load a PEM-encoded RSA private key (PKCS#1 or PKCS#8).
    pub fn from_rsa_pem(kid: &NonEmptyText, pem: &SecretText) -> PsuResult<Self> {
        let key = EncodingKey::from_rsa_pem(pem.expose().as_bytes())
            .map_err(|e| PsuError::Signing(format!("invalid RSA private key: {e}")))?;
        Ok(Self {
            kid: kid.as_str().to_owned(),
            key,
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Claims of a client assertion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub sub: String,
    pub iss: String,
    pub jti: String,
    pub aud: String,
    pub exp: i64,
}

/// Build and sign a client assertion for `api_key`.
///
/// Every call produces a fresh `jti` and an expiry [`ASSERTION_LIFETIME_SECS`] from now.
pub fn build_assertion(
    api_key: &str,
    signing_key: &SigningKey,
    token_url: &str,
) -> PsuResult<String> {
    build_assertion_at(api_key, signing_key, token_url, Utc::now())
}

/// As [`build_assertion`], with the current time supplied by the caller.
pub fn build_assertion_at(
    api_key: &str,
    signing_key: &SigningKey,
    token_url: &str,
    now: DateTime<Utc>,
) -> PsuResult<String> {
    let claims = AssertionClaims {
        sub: api_key.to_owned(),
        iss: api_key.to_owned(),
        jti: Uuid::new_v4().to_string(),
        aud: token_url.to_owned(),
        exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
    };

    let mut header = Header::new(Algorithm::RS512);
    header.kid = Some(signing_key.kid.clone());
    header.typ = Some("JWT".to_owned());

    encode(&header, &claims, &signing_key.key)
        .map_err(|e| PsuError::Signing(format!("failed to encode assertion: {e}")))
}

/// A bearer token returned by the token endpoint.
#[derive(Clone, Debug)]
pub struct AccessToken {
    value: SecretText,
    expires_in: Option<u64>,
    obtained_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(value: SecretText, expires_in: Option<u64>, obtained_at: DateTime<Utc>) -> Self {
        Self {
            value,
            expires_in,
            obtained_at,
        }
    }

    pub fn bearer(&self) -> &str {
        self.value.expose()
    }

    pub fn expires_in(&self) -> Option<u64> {
        self.expires_in
    }

    pub fn obtained_at(&self) -> DateTime<Utc> {
        self.obtained_at
    }

    /// Tokens without a known lifetime are never treated as expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let Some(expires_in) = self.expires_in else {
            return false;
        };
        let lifetime = i64::try_from(expires_in)
            .unwrap_or(i64::MAX)
            .saturating_sub(TOKEN_EXPIRY_MARGIN_SECS)
            .max(0);
        match Duration::try_seconds(lifetime)
            .and_then(|lifetime| self.obtained_at.checked_add_signed(lifetime))
        {
            Some(expires_at) => now >= expires_at,
            None => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Client for the OAuth2 token endpoint.
#[derive(Clone, Debug)]
pub struct AuthClient {
    http: reqwest::Client,
    token_url: String,
    api_key: NonEmptyText,
    signing_key: SigningKey,
}

impl AuthClient {
    pub fn new(
        http: reqwest::Client,
        endpoints: &Endpoints,
        credentials: &Credentials,
    ) -> PsuResult<Self> {
        let signing_key = SigningKey::from_rsa_pem(&credentials.kid, &credentials.private_key_pem)?;
        Ok(Self {
            http,
            token_url: endpoints.token_url().to_owned(),
            api_key: credentials.api_key.clone(),
            signing_key,
        })
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Build a fresh assertion and exchange it for an access token.
    pub async fn obtain_access_token(&self) -> PsuResult<AccessToken> {
        let assertion = build_assertion(self.api_key.as_str(), &self.signing_key, &self.token_url)?;
        self.exchange_for_token(&assertion).await
    }

    /// Exchange a signed assertion for an access token.
    ///
    /// # Errors
    ///
    /// - [`PsuError::AuthFailure`] for a non-2xx response, carrying the response body.
    /// - [`PsuError::MissingAccessToken`] if a 2xx body has no usable `access_token`.
    /// - [`PsuError::Http`] for transport failures, including timeouts.
    pub async fn exchange_for_token(&self, assertion: &str) -> PsuResult<AccessToken> {
        let params = [
            ("grant_type", GRANT_TYPE),
            ("client_assertion_type", CLIENT_ASSERTION_TYPE),
            ("client_assertion", assertion),
        ];

        tracing::info!(token_url = %self.token_url, kid = %self.signing_key.kid, "requesting access token");

        let response = self
            .http
            .post(&self.token_url)
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "token request rejected");
            return Err(PsuError::AuthFailure {
                status: status.as_u16(),
                body,
            });
        }

        let token = parse_token_response(&body, Utc::now())?;
        tracing::info!(expires_in = ?token.expires_in, "obtained access token");
        Ok(token)
    }
}

fn parse_token_response(body: &str, obtained_at: DateTime<Utc>) -> PsuResult<AccessToken> {
    let missing = || PsuError::MissingAccessToken {
        body: body.to_owned(),
    };

    let payload: Value = serde_json::from_str(body).map_err(|_| missing())?;

    let value = payload
        .get("access_token")
        .and_then(Value::as_str)
        .and_then(|token| SecretText::new(token).ok())
        .ok_or_else(missing)?;

    // Some gateways send expires_in as a string.
    let expires_in = match payload.get("expires_in") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };

    Ok(AccessToken::new(value, expires_in, obtained_at))
}
