//! NHS identifier checksums.
//!
//! Two identifier families are covered, each protected by a check character:
//!
//! - **NHS number**: 9 subject digits followed by a modulus-11 check digit.
//!   See the NHS Data Dictionary entry for `NHS_NUMBER`.
//! - **Prescription order number**: `XXXXXX-OOOOOO-XXXXXC`, where `OOOOOO` is the prescribing
//!   organisation's ODS code (padded or truncated to 6 characters) and `C` is a modulus-37 check
//!   character drawn from `0-9`, `A-Z` and `+`.
//!
//! ODS organisation codes are also provided here since they are embedded in prescription ids.
//!
//! ## Wrapper types
//! [`NhsNumber`], [`PrescriptionId`] and [`OdsCode`] guarantee validity once constructed.
//! Use `parse` for externally supplied values and the `generate*` functions for test data.
//!
//! Generators take any [`rand::Rng`] so callers (and tests) can supply a seeded source.

mod nhs_number;
mod ods_code;
mod prescription_id;

pub use nhs_number::{
    complete_nhs_number, compute_check_digit, generate_nhs_number, generate_nhs_numbers,
    validate_nhs_number, NhsNumber, DUMMY_PREFIX, MAX_GENERATION_ATTEMPTS,
};
pub use ods_code::{generate_ods_code, OdsCode, DEFAULT_ODS_CODE};
pub use prescription_id::{
    compute_prescription_check_char, generate_prescription_id, validate_prescription_id,
    PrescriptionId, CHECK_CHAR_ALPHABET,
};

/// Error type for identifier operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IdentifierError {
    /// The input does not have the shape of the identifier (length, character set, grouping).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The base digits have no valid check digit (the modulus-11 result is 10).
    ///
    /// Such sequences are never issued as NHS numbers; generators discard and resample.
    #[error("Invalid NHS number sequence {nine_digits} (check digit would be 10)")]
    InvalidSequence { nine_digits: String },

    /// A generator rejected too many consecutive candidates.
    #[error("Gave up after {attempts} attempts to generate a valid identifier")]
    RetriesExhausted { attempts: usize },
}

/// Result type for identifier operations.
pub type IdentifierResult<T> = Result<T, IdentifierError>;
