//! Prescription order numbers and their modulus-37 check character.
//!
//! Wire format: `XXXXXX-OOOOOO-XXXXXC` (20 characters)
//! - `X`: random base-36 character (`0-9`, `A-Z`)
//! - `OOOOOO`: prescribing organisation ODS code, right-padded with `0` or truncated to 6
//! - `C`: check character from [`CHECK_CHAR_ALPHABET`]
//!
//! Generated ids always use the padded 6-character middle group. Older tooling embedded the ODS
//! code unpadded, so validation also accepts a 3 to 5 character middle group as long as the
//! check character is correct.
//!
//! The digest ignores `-` separators.

use crate::ods_code::OdsCode;
use crate::{IdentifierError, IdentifierResult};
use rand::Rng;
use std::fmt;

/// Symbols a check character can take; the index of a symbol is its numeric value.
pub const CHECK_CHAR_ALPHABET: &[u8; 37] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ+";

const MODULUS: u32 = 37;
const BASE36: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

const GROUP_LEN: usize = 6;
const MIN_ORG_GROUP_LEN: usize = 3;
const RANDOM_CHARS: usize = 11;
const SEPARATOR: char = '-';

/// Computes the check character for a prescription id without its final character.
///
/// Separators are skipped. Every other character must be base-36.
pub fn compute_prescription_check_char(core: &str) -> IdentifierResult<char> {
    let mut total: u32 = 0;
    let mut seen = 0usize;

    for c in core.chars().filter(|c| *c != SEPARATOR) {
        let value = c.to_digit(36).ok_or_else(|| {
            IdentifierError::InvalidInput(format!(
                "invalid character '{c}' in prescription id '{core}'"
            ))
        })?;
        total = ((total + value) * 2) % MODULUS;
        seen += 1;
    }

    if seen == 0 {
        return Err(IdentifierError::InvalidInput(
            "prescription id cannot be empty".into(),
        ));
    }

    // The check value i satisfies (total + i) mod 37 == 1. With total in 0..37 there is exactly
    // one such i in 0..37.
    let index = (MODULUS + 1 - total) % MODULUS;
    debug_assert_eq!((total + index) % MODULUS, 1);

    Ok(char::from(CHECK_CHAR_ALPHABET[index as usize]))
}

/// Returns true if `candidate` has the `XXXXXX-OOOOOO-XXXXXC` shape and a correct check
/// character. The middle group may be 3 to 6 characters long.
pub fn validate_prescription_id(candidate: &str) -> bool {
    if !has_valid_shape(candidate) {
        return false;
    }

    let (body, check) = candidate.split_at(candidate.len() - 1);
    match compute_prescription_check_char(body) {
        Ok(expected) => check.starts_with(expected),
        Err(_) => false,
    }
}

fn has_valid_shape(candidate: &str) -> bool {
    if !candidate.is_ascii() {
        return false;
    }

    let groups: Vec<&str> = candidate.split(SEPARATOR).collect();
    let [head, organisation, tail] = groups[..] else {
        return false;
    };

    let is_base36 = |group: &str| {
        group
            .bytes()
            .all(|b| b.is_ascii_digit() || b.is_ascii_uppercase())
    };

    head.len() == GROUP_LEN
        && is_base36(head)
        && (MIN_ORG_GROUP_LEN..=GROUP_LEN).contains(&organisation.len())
        && is_base36(organisation)
        && tail.len() == GROUP_LEN
        && is_base36(&tail[..GROUP_LEN - 1])
        && CHECK_CHAR_ALPHABET.contains(&tail.as_bytes()[GROUP_LEN - 1])
}

/// Generates a prescription id embedding `ods_code`, or a fresh 6-character code if `None`.
pub fn generate_prescription_id<R: Rng + ?Sized>(
    ods_code: Option<&OdsCode>,
    rng: &mut R,
) -> IdentifierResult<PrescriptionId> {
    let random: String = (0..RANDOM_CHARS)
        .map(|_| char::from(BASE36[rng.gen_range(0..BASE36.len())]))
        .collect();

    let ods = match ods_code {
        Some(code) => code.clone(),
        None => OdsCode::generate(GROUP_LEN, rng)?,
    };

    let body = format!(
        "{}{SEPARATOR}{}{SEPARATOR}{}",
        &random[..GROUP_LEN],
        ods_segment(&ods),
        &random[GROUP_LEN..]
    );
    let check = compute_prescription_check_char(&body)?;

    let id = PrescriptionId(format!("{body}{check}"));
    tracing::debug!(prescription_id = %id, ods_code = %ods, "generated prescription id");
    Ok(id)
}

/// Fits an ODS code into the fixed-width middle group.
fn ods_segment(ods: &OdsCode) -> String {
    let mut segment: String = ods.as_str().chars().take(GROUP_LEN).collect();
    while segment.len() < GROUP_LEN {
        segment.push('0');
    }
    segment
}

/// A validated prescription order number.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PrescriptionId(String);

impl PrescriptionId {
    /// Parses an externally supplied prescription id, normalising to uppercase.
    pub fn parse(input: &str) -> IdentifierResult<Self> {
        let normalised = input.trim().to_ascii_uppercase();
        if validate_prescription_id(&normalised) {
            return Ok(Self(normalised));
        }
        Err(IdentifierError::InvalidInput(format!(
            "'{input}' is not a valid prescription id (expected XXXXXX-OOOOOO-XXXXXC with a correct check character)"
        )))
    }

    /// Generates a fresh prescription id. See [`generate_prescription_id`].
    pub fn generate<R: Rng + ?Sized>(
        ods_code: Option<&OdsCode>,
        rng: &mut R,
    ) -> IdentifierResult<Self> {
        generate_prescription_id(ods_code, rng)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The organisation group: 6 characters for generated ids, 3 to 6 for parsed ones.
    pub fn organisation_segment(&self) -> &str {
        &self.0[GROUP_LEN + 1..self.0.len() - GROUP_LEN - 1]
    }

    pub fn check_char(&self) -> char {
        char::from(self.0.as_bytes()[self.0.len() - 1])
    }
}

impl fmt::Display for PrescriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PrescriptionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for PrescriptionId {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for PrescriptionId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for PrescriptionId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const FORMATTED_LEN: usize = 3 * GROUP_LEN + 2;

    #[test]
    fn known_id_has_expected_check_char() {
        assert_eq!(compute_prescription_check_char("9A822C-A83008-13DCA"), Ok('B'));
        assert!(validate_prescription_id("9A822C-A83008-13DCAB"));
    }

    #[test]
    fn separators_do_not_affect_digest() {
        assert_eq!(
            compute_prescription_check_char("9A822CA8300813DCA"),
            compute_prescription_check_char("9A822C-A83008-13DCA")
        );
    }

    #[test]
    fn covers_extremes_of_alphabet() {
        assert_eq!(compute_prescription_check_char("000000-000000-00000"), Ok('1'));
        assert_eq!(compute_prescription_check_char("ZZZZZZ-ZZZZZZ-ZZZZZ"), Ok('W'));
    }

    #[test]
    fn rejects_non_base36_characters() {
        match compute_prescription_check_char("9A822C-A83_08-13DCA") {
            Err(IdentifierError::InvalidInput(msg)) => assert!(msg.contains('_')),
            other => panic!("expected InvalidInput, got {other:?}"),
        }
        assert!(compute_prescription_check_char("--").is_err());
    }

    #[test]
    fn generated_ids_always_validate() {
        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..500 {
            let id = generate_prescription_id(None, &mut rng).expect("generate");
            assert_eq!(id.as_str().len(), FORMATTED_LEN);
            assert!(validate_prescription_id(id.as_str()), "{id} should validate");

            let body = &id.as_str()[..FORMATTED_LEN - 1];
            assert_eq!(
                compute_prescription_check_char(body).expect("digest"),
                id.check_char()
            );
        }
    }

    #[test]
    fn embeds_supplied_ods_code_padded() {
        let mut rng = StdRng::seed_from_u64(4);
        let ods = OdsCode::parse("FA565").expect("ods");
        let id = generate_prescription_id(Some(&ods), &mut rng).expect("generate");
        assert_eq!(id.organisation_segment(), "FA5650");

        let six = OdsCode::parse("A83008").expect("ods");
        let id = generate_prescription_id(Some(&six), &mut rng).expect("generate");
        assert_eq!(id.organisation_segment(), "A83008");
    }

    #[test]
    fn tampered_ids_fail_validation() {
        assert!(!validate_prescription_id("9A822C-A83008-13DCAC"));
        assert!(!validate_prescription_id("9A822D-A83008-13DCAB"));
        assert!(!validate_prescription_id("9A822CA83008-13DCAB"));
        assert!(!validate_prescription_id("9A822C_A83008_13DCAB"));
        assert!(!validate_prescription_id(""));
    }

    #[test]
    fn accepts_unpadded_organisation_group() {
        assert_eq!(compute_prescription_check_char("ABC123-FA565-XYZ12"), Ok('N'));
        assert!(validate_prescription_id("ABC123-FA565-XYZ12N"));
        assert!(validate_prescription_id("ABC123-FA5-XYZ12S"));

        let id = PrescriptionId::parse("abc123-fa565-xyz12n").expect("19-character id");
        assert_eq!(id.organisation_segment(), "FA565");
        assert_eq!(id.check_char(), 'N');
    }

    #[test]
    fn organisation_group_length_is_bounded() {
        // Correct check characters, wrong grouping.
        assert!(!validate_prescription_id("ABC123-FA-XYZ12Q"));
        assert!(!validate_prescription_id("ABC123-FA56500-XYZ12I"));
        assert!(!validate_prescription_id("ABC12-FA565-XYZ123+"));

        assert!(!validate_prescription_id("ABC123-FA565-XYZ12M"));
    }

    #[test]
    fn parse_normalises_case() {
        let id = PrescriptionId::parse("9a822c-a83008-13dcab").expect("parse");
        assert_eq!(id.as_str(), "9A822C-A83008-13DCAB");
        assert_eq!(id.check_char(), 'B');
    }
}
