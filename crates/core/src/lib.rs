//! # PSU Core
//!
//! Client-side logic for sending Prescription Status Updates:
//! - configuration resolved once at startup ([`config`])
//! - signed JWT client credentials and access tokens ([`auth`])
//! - bundle submission with correlation ids ([`submission`])
//! - per-run token reuse ([`client`])
//! - test-data bundle generation ([`generate`])
//!
//! Identifier checksums live in `nhs-identifiers` and the FHIR wire model in `fhir`; this crate
//! only composes them.

pub mod auth;
pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod generate;
pub mod submission;

pub use auth::{build_assertion, AccessToken, AssertionClaims, AuthClient, SigningKey};
pub use client::PsuClient;
pub use config::{Credentials, Endpoints, PsuConfig};
pub use error::{PsuError, PsuResult};
pub use generate::{generate_psu_bundle, PsuRequestOptions};
pub use submission::{SubmissionClient, SubmissionResult};

#[cfg(test)]
mod test_support {
    use crate::config::Credentials;
    use fhir::{Bundle, LastModified, Task, TaskReferences, TransactionBundle};
    use nhs_identifiers::{NhsNumber, OdsCode, PrescriptionId};
    use psu_types::SecretText;
    use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
    use rsa::RsaPrivateKey;
    use std::sync::OnceLock;
    use uuid::Uuid;

    /// PEM-encoded (private, public) RSA key pair, generated once per test binary.
    pub fn test_key_pair() -> &'static (String, String) {
        static KEYS: OnceLock<(String, String)> = OnceLock::new();
        KEYS.get_or_init(|| {
            let private_key =
                RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048).expect("generate RSA key");
            let private_pem = private_key
                .to_pkcs8_pem(LineEnding::LF)
                .expect("encode private key");
            let public_pem = private_key
                .to_public_key()
                .to_public_key_pem(LineEnding::LF)
                .expect("encode public key");
            (private_pem.as_str().to_owned(), public_pem)
        })
    }

    pub fn credentials() -> Credentials {
        let (private_pem, _) = test_key_pair();
        Credentials::new(
            "api-key-123",
            "kid-1",
            SecretText::new(private_pem.as_str()).expect("pem"),
        )
        .expect("credentials")
    }

    pub fn sample_bundle() -> TransactionBundle {
        let entry = Task::build_entry(
            "Ready to Collect",
            TaskReferences {
                order_number: PrescriptionId::parse("9A822C-A83008-13DCAB").expect("order"),
                order_item_number: Uuid::new_v4(),
                nhs_number: NhsNumber::parse("9434765919").expect("nhs"),
                ods_code: OdsCode::parse("FA565").expect("ods"),
            },
            LastModified::Now,
        )
        .expect("entry");
        Bundle::build(vec![entry]).expect("bundle")
    }
}
