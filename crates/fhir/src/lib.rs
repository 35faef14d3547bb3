//! FHIR wire/boundary support for Prescription Status Update (PSU) messages.
//!
//! This crate provides **wire models** and **translation helpers** for the FHIR R4 `Task`
//! resources and transaction `Bundle`s accepted by the PSU endpoint.
//!
//! This crate focuses on:
//! - the canonical NPPT business status vocabulary and its lifecycle mapping
//! - building Task entries from validated identifiers
//! - serialisation/deserialisation of bundles as JSON
//!
//! Transport (tokens, HTTP) lives in `psu-core`; this crate performs no I/O.

pub mod bundle;
pub mod business_status;
pub mod task;

// Re-export facades
pub use bundle::Bundle;
pub use task::Task;

// Re-export public domain-level types
pub use bundle::TransactionBundle;
pub use business_status::{derive_lifecycle_state, BusinessStatus, TaskStatus};
pub use task::{LastModified, TaskData, TaskReferences};

/// Identifier and code systems used in PSU Task resources.
pub mod systems {
    pub const PRESCRIPTION_ORDER_NUMBER: &str = "https://fhir.nhs.uk/Id/prescription-order-number";
    pub const PRESCRIPTION_ORDER_ITEM_NUMBER: &str =
        "https://fhir.nhs.uk/Id/prescription-order-item-number";
    pub const NHS_NUMBER: &str = "https://fhir.nhs.uk/Id/nhs-number";
    pub const ODS_ORGANIZATION_CODE: &str = "https://fhir.nhs.uk/Id/ods-organization-code";
    pub const BUSINESS_STATUS_NPPT: &str =
        "https://fhir.nhs.uk/CodeSystem/task-businessStatus-nppt";
}

/// Errors returned by the `fhir` boundary crate.
#[derive(Debug, thiserror::Error)]
pub enum FhirError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid business status '{raw}'. Choose from: {choices}")]
    UnknownStatus { raw: String, choices: String },

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(#[from] nhs_identifiers::IdentifierError),

    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("translation error: {0}")]
    Translation(String),

    #[error("invalid UUID: {0}")]
    InvalidUuid(String),
}

/// Type alias for Results that can fail with a [`FhirError`].
pub type FhirResult<T> = Result<T, FhirError>;
