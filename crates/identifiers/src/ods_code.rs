//! ODS (Organisation Data Service) codes.

use crate::{IdentifierError, IdentifierResult};
use rand::Rng;
use std::fmt;

/// Pharmacy ODS code used when none is supplied.
pub const DEFAULT_ODS_CODE: &str = "FA565";

const MIN_LEN: usize = 3;
const MAX_LEN: usize = 6;

/// Letter/digit layouts observed in ODS test data, indexed by `length - MIN_LEN`.
///
/// `L` is an uppercase letter and `D` a digit. These are not formal NHS rules, so
/// [`OdsCode::parse`] accepts any alphanumeric code of a valid length.
const PATTERNS: [&str; 4] = ["LLD", "LDDD", "LLDDD", "LDDDDD"];

/// An organisation code: 3 to 6 uppercase ASCII letters or digits.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OdsCode(String);

impl OdsCode {
    /// Parses a code, normalising to uppercase.
    pub fn parse(input: &str) -> IdentifierResult<Self> {
        let code = input.trim().to_ascii_uppercase();

        if !(MIN_LEN..=MAX_LEN).contains(&code.len()) {
            return Err(IdentifierError::InvalidInput(format!(
                "ODS code must be between {MIN_LEN} and {MAX_LEN} characters, got '{input}'"
            )));
        }
        if !code.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(IdentifierError::InvalidInput(format!(
                "ODS code must contain only letters and digits, got '{input}'"
            )));
        }

        Ok(Self(code))
    }

    /// Generates a random code following the observed pattern for `length`.
    pub fn generate<R: Rng + ?Sized>(length: usize, rng: &mut R) -> IdentifierResult<Self> {
        generate_ods_code(length, rng).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for OdsCode {
    fn default() -> Self {
        Self(DEFAULT_ODS_CODE.to_owned())
    }
}

impl fmt::Display for OdsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for OdsCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for OdsCode {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for OdsCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for OdsCode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Generates a random ODS code string of `length` characters (3 to 6).
pub fn generate_ods_code<R: Rng + ?Sized>(length: usize, rng: &mut R) -> IdentifierResult<String> {
    if !(MIN_LEN..=MAX_LEN).contains(&length) {
        return Err(IdentifierError::InvalidInput(format!(
            "ODS code length must be between {MIN_LEN} and {MAX_LEN} characters, got {length}"
        )));
    }

    let code = PATTERNS[length - MIN_LEN]
        .chars()
        .map(|slot| match slot {
            'L' => char::from(b'A' + rng.gen_range(0..26u8)),
            _ => char::from(b'0' + rng.gen_range(0..10u8)),
        })
        .collect();

    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn matches_pattern(code: &str, pattern: &str) -> bool {
        code.len() == pattern.len()
            && code.chars().zip(pattern.chars()).all(|(c, p)| match p {
                'L' => c.is_ascii_uppercase(),
                _ => c.is_ascii_digit(),
            })
    }

    #[test]
    fn generated_codes_follow_length_patterns() {
        let mut rng = StdRng::seed_from_u64(1);
        for length in MIN_LEN..=MAX_LEN {
            for _ in 0..20 {
                let code = generate_ods_code(length, &mut rng).expect("generate");
                assert!(
                    matches_pattern(&code, PATTERNS[length - MIN_LEN]),
                    "{code} does not match pattern for length {length}"
                );
                OdsCode::parse(&code).expect("generated code should parse");
            }
        }
    }

    #[test]
    fn rejects_out_of_range_lengths() {
        let mut rng = StdRng::seed_from_u64(1);
        for length in [0, 2, 7, 12] {
            assert!(matches!(
                generate_ods_code(length, &mut rng),
                Err(IdentifierError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn parse_normalises_case() {
        let code = OdsCode::parse(" fa565 ").expect("parse");
        assert_eq!(code.as_str(), "FA565");
    }

    #[test]
    fn parse_rejects_bad_codes() {
        for bad in ["AB", "ABCDEFG", "FA-65", "", "FA 65"] {
            assert!(OdsCode::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn default_is_fallback_pharmacy() {
        assert_eq!(OdsCode::default().as_str(), DEFAULT_ODS_CODE);
    }
}
