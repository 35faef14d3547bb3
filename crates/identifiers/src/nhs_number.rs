//! NHS number check digits, validation and generation.

use crate::{IdentifierError, IdentifierResult};
use rand::Rng;
use std::fmt;

/// Multipliers applied to the nine subject digits.
const WEIGHTS: [u32; 9] = [10, 9, 8, 7, 6, 5, 4, 3, 2];

/// Reserved prefix for dummy (test-only) NHS numbers.
pub const DUMMY_PREFIX: &str = "999";

/// Upper bound on consecutive rejected candidates when generating a single number.
///
/// Roughly 1 in 11 random sequences has no valid check digit, so hitting this bound means the
/// random source is broken.
pub const MAX_GENERATION_ATTEMPTS: usize = 10_000;

/// Computes the check digit for nine subject digits.
///
/// # Errors
///
/// - [`IdentifierError::InvalidInput`] if `nine_digits` is not exactly 9 ASCII digits.
/// - [`IdentifierError::InvalidSequence`] if the modulus-11 result is 10.
pub fn compute_check_digit(nine_digits: &str) -> IdentifierResult<u8> {
    if nine_digits.len() != 9 || !nine_digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(IdentifierError::InvalidInput(format!(
            "NHS number base must be exactly 9 digits, got '{nine_digits}'"
        )));
    }

    let total: u32 = nine_digits
        .bytes()
        .zip(WEIGHTS)
        .map(|(b, w)| u32::from(b - b'0') * w)
        .sum();

    match 11 - (total % 11) {
        11 => Ok(0),
        10 => Err(IdentifierError::InvalidSequence {
            nine_digits: nine_digits.to_owned(),
        }),
        digit => Ok(digit as u8),
    }
}

/// Appends a check digit to nine subject digits.
///
/// With `want_invalid`, a uniformly random *wrong* digit is appended instead, for producing
/// negative test data.
pub fn complete_nhs_number<R: Rng + ?Sized>(
    nine_digits: &str,
    want_invalid: bool,
    rng: &mut R,
) -> IdentifierResult<String> {
    let correct = compute_check_digit(nine_digits)?;

    let digit = if want_invalid {
        // Sample from the nine remaining digits by skipping over the correct one.
        let mut wrong = rng.gen_range(0..9u8);
        if wrong >= correct {
            wrong += 1;
        }
        wrong
    } else {
        correct
    };

    Ok(format!("{nine_digits}{digit}"))
}

/// Returns true if `candidate` is a well-formed NHS number with a correct check digit.
pub fn validate_nhs_number(candidate: &str) -> bool {
    if candidate.len() != 10 || !candidate.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    match compute_check_digit(&candidate[..9]) {
        Ok(expected) => candidate.as_bytes()[9] - b'0' == expected,
        Err(_) => false,
    }
}

/// Generates a single NHS number, resampling base sequences that have no check digit.
///
/// # Errors
///
/// Returns [`IdentifierError::RetriesExhausted`] after [`MAX_GENERATION_ATTEMPTS`] consecutive
/// rejected sequences.
pub fn generate_nhs_number<R: Rng + ?Sized>(
    invalid: bool,
    dummy: bool,
    rng: &mut R,
) -> IdentifierResult<String> {
    for _ in 0..MAX_GENERATION_ATTEMPTS {
        let nine = random_base(dummy, rng);
        match complete_nhs_number(&nine, invalid, rng) {
            Ok(number) => return Ok(number),
            Err(IdentifierError::InvalidSequence { .. }) => {
                tracing::trace!(base = %nine, "discarding base sequence without a check digit");
            }
            Err(other) => return Err(other),
        }
    }

    Err(IdentifierError::RetriesExhausted {
        attempts: MAX_GENERATION_ATTEMPTS,
    })
}

/// Generates `count` NHS numbers.
///
/// - `invalid`: every number carries a wrong check digit
/// - `dummy`: every number starts with [`DUMMY_PREFIX`]
pub fn generate_nhs_numbers<R: Rng + ?Sized>(
    count: usize,
    invalid: bool,
    dummy: bool,
    rng: &mut R,
) -> IdentifierResult<Vec<String>> {
    let numbers = (0..count)
        .map(|_| generate_nhs_number(invalid, dummy, rng))
        .collect::<IdentifierResult<Vec<_>>>()?;

    tracing::debug!(count, invalid, dummy, "generated NHS numbers");
    Ok(numbers)
}

fn random_base<R: Rng + ?Sized>(dummy: bool, rng: &mut R) -> String {
    let (mut base, remaining) = if dummy {
        (String::from(DUMMY_PREFIX), 9 - DUMMY_PREFIX.len())
    } else {
        (String::with_capacity(9), 9)
    };

    for _ in 0..remaining {
        base.push(char::from(b'0' + rng.gen_range(0..10u8)));
    }
    base
}

/// A validated NHS number (10 digits, correct check digit).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NhsNumber(String);

impl NhsNumber {
    /// Parses an externally supplied NHS number.
    ///
    /// Surrounding whitespace and single spaces between the `3 3 4` digit groups are accepted,
    /// since that is how NHS numbers are usually printed. The stored form has no spaces.
    pub fn parse(input: &str) -> IdentifierResult<Self> {
        let compact: String = input.trim().chars().filter(|c| *c != ' ').collect();
        if validate_nhs_number(&compact) {
            return Ok(Self(compact));
        }
        Err(IdentifierError::InvalidInput(format!(
            "'{input}' is not a valid NHS number"
        )))
    }

    /// Generates a fresh valid NHS number.
    pub fn generate<R: Rng + ?Sized>(dummy: bool, rng: &mut R) -> IdentifierResult<Self> {
        generate_nhs_number(false, dummy, rng).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if this number is in the reserved dummy range.
    pub fn is_dummy(&self) -> bool {
        self.0.starts_with(DUMMY_PREFIX)
    }
}

impl fmt::Display for NhsNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NhsNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for NhsNumber {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for NhsNumber {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for NhsNumber {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
