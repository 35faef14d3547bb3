//! Test-data generation for PSU bundles.
//!
//! Any reference the caller leaves out is generated: a valid (non-dummy) NHS number, a 5-character
//! ODS code, a prescription id embedding that ODS code, and a random order item UUID.

use crate::constants::GENERATED_ODS_CODE_LEN;
use crate::{PsuError, PsuResult};
use chrono::{DateTime, Utc};
use fhir::{Bundle, BusinessStatus, LastModified, Task, TaskReferences, TransactionBundle};
use nhs_identifiers::{NhsNumber, OdsCode, PrescriptionId};
use rand::Rng;
use uuid::Uuid;

/// Inputs for [`generate_psu_bundle`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PsuRequestOptions {
    /// Free-text business status; matched case-insensitively.
    pub business_status: String,
    pub order_number: Option<PrescriptionId>,
    pub order_item_number: Option<Uuid>,
    /// Shared by every entry when supplied.
    pub nhs_number: Option<NhsNumber>,
    /// Shared by every entry when supplied.
    pub ods_code: Option<OdsCode>,
    pub last_modified: LastModified,
    pub num_entries: usize,
}

impl PsuRequestOptions {
    /// A single-entry request with every reference generated.
    pub fn new(business_status: impl Into<String>) -> Self {
        Self {
            business_status: business_status.into(),
            order_number: None,
            order_item_number: None,
            nhs_number: None,
            ods_code: None,
            last_modified: LastModified::Now,
            num_entries: 1,
        }
    }
}

/// Build a transaction bundle of `options.num_entries` Task entries.
///
/// Every entry gets its own prescription and order item. Order numbers and order item numbers
/// identify a single item, so supplying one is only allowed for a single-entry bundle.
pub fn generate_psu_bundle<R: Rng + ?Sized>(
    options: &PsuRequestOptions,
    rng: &mut R,
) -> PsuResult<TransactionBundle> {
    generate_psu_bundle_at(options, rng, Utc::now())
}

/// As [`generate_psu_bundle`], with the current time supplied by the caller.
pub fn generate_psu_bundle_at<R: Rng + ?Sized>(
    options: &PsuRequestOptions,
    rng: &mut R,
    now: DateTime<Utc>,
) -> PsuResult<TransactionBundle> {
    if options.num_entries == 0 {
        return Err(PsuError::InvalidInput(
            "number of entries must be at least 1".into(),
        ));
    }
    if options.num_entries > 1
        && (options.order_number.is_some() || options.order_item_number.is_some())
    {
        return Err(PsuError::InvalidInput(
            "an order number or order item number can only be supplied for a single entry".into(),
        ));
    }

    let business_status = BusinessStatus::canonicalize(&options.business_status)?;

    let mut entries = Vec::with_capacity(options.num_entries);
    for _ in 0..options.num_entries {
        let references = fill_references(options, rng)?;

        tracing::info!(
            nhs_number = %references.nhs_number,
            ods_code = %references.ods_code,
            order_number = %references.order_number,
            order_item_number = %references.order_item_number,
            business_status = %business_status,
            "generated PSU entry"
        );

        entries.push(Task::build_entry_at(
            business_status.as_str(),
            references,
            options.last_modified,
            now,
        )?);
    }

    Ok(Bundle::build(entries)?)
}

fn fill_references<R: Rng + ?Sized>(
    options: &PsuRequestOptions,
    rng: &mut R,
) -> PsuResult<TaskReferences> {
    let nhs_number = match &options.nhs_number {
        Some(nhs) => nhs.clone(),
        None => NhsNumber::generate(false, rng)?,
    };

    let ods_code = match &options.ods_code {
        Some(ods) => ods.clone(),
        None => OdsCode::generate(GENERATED_ODS_CODE_LEN, rng)?,
    };

    let order_number = match &options.order_number {
        Some(order) => order.clone(),
        None => PrescriptionId::generate(Some(&ods_code), rng)?,
    };

    let order_item_number = options
        .order_item_number
        .unwrap_or_else(|| uuid::Builder::from_random_bytes(rng.gen()).into_uuid());

    Ok(TaskReferences {
        order_number,
        order_item_number,
        nhs_number,
        ods_code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use fhir::{FhirError, TaskStatus};
    use nhs_identifiers::{validate_nhs_number, validate_prescription_id};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).single().expect("timestamp")
    }

    #[test]
    fn fills_in_missing_references() {
        let mut rng = StdRng::seed_from_u64(1);
        let bundle =
            generate_psu_bundle_at(&PsuRequestOptions::new("ready to collect"), &mut rng, now())
                .expect("bundle");

        assert_eq!(bundle.entries.len(), 1);
        let task = &bundle.entries[0];
        assert_eq!(task.business_status, BusinessStatus::ReadyToCollect);
        assert_eq!(task.status(), TaskStatus::InProgress);
        assert!(validate_nhs_number(task.nhs_number.as_str()));
        assert_eq!(task.ods_code.as_str().len(), GENERATED_ODS_CODE_LEN);
        assert!(validate_prescription_id(task.order_number.as_str()));
        assert_eq!(
            task.order_number.organisation_segment(),
            format!("{}0", task.ods_code)
        );
        assert_eq!(task.order_item_number.get_version_num(), 4);
        assert_eq!(task.last_modified, now());
    }

    #[test]
    fn supplied_references_are_used_verbatim() {
        let mut options = PsuRequestOptions::new("Collected");
        options.order_number = Some(PrescriptionId::parse("9A822C-A83008-13DCAB").expect("order"));
        options.order_item_number =
            Some(Uuid::parse_str("a4f91c6d-3b2e-4c5f-9d7a-1e8b6c0a9f12").expect("uuid"));
        options.nhs_number = Some(NhsNumber::parse("9434765919").expect("nhs"));
        options.ods_code = Some(OdsCode::parse("FA565").expect("ods"));

        let mut rng = StdRng::seed_from_u64(2);
        let bundle = generate_psu_bundle_at(&options, &mut rng, now()).expect("bundle");
        let task = &bundle.entries[0];

        assert_eq!(task.order_number.as_str(), "9A822C-A83008-13DCAB");
        assert_eq!(
            task.order_item_number.to_string(),
            "a4f91c6d-3b2e-4c5f-9d7a-1e8b6c0a9f12"
        );
        assert_eq!(task.nhs_number.as_str(), "9434765919");
        assert_eq!(task.ods_code.as_str(), "FA565");
        assert_eq!(task.status(), TaskStatus::Completed);
    }

    #[test]
    fn multiple_entries_get_distinct_prescriptions() {
        let mut options = PsuRequestOptions::new("With Pharmacy");
        options.num_entries = 4;
        options.ods_code = Some(OdsCode::parse("FA565").expect("ods"));

        let mut rng = StdRng::seed_from_u64(3);
        let bundle = generate_psu_bundle_at(&options, &mut rng, now()).expect("bundle");
        assert_eq!(bundle.entries.len(), 4);

        let orders: HashSet<_> = bundle.entries.iter().map(|e| e.order_number.clone()).collect();
        let items: HashSet<_> = bundle.entries.iter().map(|e| e.order_item_number).collect();
        let ids: HashSet<_> = bundle.entries.iter().map(|e| e.id).collect();
        assert_eq!(orders.len(), 4);
        assert_eq!(items.len(), 4);
        assert_eq!(ids.len(), 4);
        assert!(bundle.entries.iter().all(|e| e.ods_code.as_str() == "FA565"));
    }

    #[test]
    fn order_number_with_many_entries_is_rejected() {
        let mut options = PsuRequestOptions::new("With Pharmacy");
        options.num_entries = 2;
        options.order_number = Some(PrescriptionId::parse("9A822C-A83008-13DCAB").expect("order"));

        let mut rng = StdRng::seed_from_u64(4);
        assert!(matches!(
            generate_psu_bundle(&options, &mut rng),
            Err(PsuError::InvalidInput(_))
        ));
    }

    #[test]
    fn zero_entries_is_rejected() {
        let mut options = PsuRequestOptions::new("With Pharmacy");
        options.num_entries = 0;
        let mut rng = StdRng::seed_from_u64(5);
        assert!(matches!(
            generate_psu_bundle(&options, &mut rng),
            Err(PsuError::InvalidInput(_))
        ));
    }

    #[test]
    fn unknown_status_is_reported() {
        let mut rng = StdRng::seed_from_u64(6);
        match generate_psu_bundle(&PsuRequestOptions::new("Lost in post"), &mut rng) {
            Err(PsuError::Fhir(FhirError::UnknownStatus { raw, .. })) => {
                assert_eq!(raw, "Lost in post")
            }
            other => panic!("expected UnknownStatus, got {other:?}"),
        }
    }

    #[test]
    fn post_dated_entries_carry_last_updated() {
        let mut options = PsuRequestOptions::new("Ready to Collect");
        options.num_entries = 2;
        options.last_modified = LastModified::PostDated(Duration::hours(2));

        let mut rng = StdRng::seed_from_u64(7);
        let bundle = generate_psu_bundle_at(&options, &mut rng, now()).expect("bundle");
        for task in &bundle.entries {
            assert_eq!(task.last_updated, Some(now()));
            assert_eq!(task.last_modified, now() + Duration::hours(2));
        }
    }

    #[test]
    fn seeded_generation_is_deterministic() {
        let options = PsuRequestOptions::new("Dispatched");
        let a = generate_psu_bundle_at(&options, &mut StdRng::seed_from_u64(8), now())
            .expect("first");
        let b = generate_psu_bundle_at(&options, &mut StdRng::seed_from_u64(8), now())
            .expect("second");
        assert_eq!(a.entries[0].nhs_number, b.entries[0].nhs_number);
        assert_eq!(a.entries[0].order_number, b.entries[0].order_number);
        assert_eq!(a.entries[0].order_item_number, b.entries[0].order_item_number);
    }
}
