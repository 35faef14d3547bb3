//! FHIR `Task` entries for prescription status updates.
//!
//! Responsibilities:
//! - Define the domain-level [`TaskData`] carrier built from validated identifiers
//! - Build fresh Task entries from a raw business status ([`Task::build_entry`])
//! - Translate between the domain carrier and the strict JSON wire model
//!
//! Notes:
//! - A status change is always a *new* Task with a new id; existing Tasks are never mutated
//! - `Task.status` is derived from the business status once, at creation

use crate::business_status::{BusinessStatus, TaskStatus};
use crate::{systems, FhirError, FhirResult};
use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use nhs_identifiers::{NhsNumber, OdsCode, PrescriptionId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Public domain-level types
// ============================================================================

/// The identifiers a Task refers to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskReferences {
    /// Prescription order number (`Task.basedOn`).
    pub order_number: PrescriptionId,

    /// Prescription line item (`Task.focus`).
    pub order_item_number: Uuid,

    /// Patient (`Task.for`).
    pub nhs_number: NhsNumber,

    /// Dispensing organisation (`Task.owner`).
    pub ods_code: OdsCode,
}

/// How `Task.lastModified` is resolved when an entry is built.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LastModified {
    /// The current time.
    #[default]
    Now,
    /// An explicit timestamp supplied by the caller.
    At(DateTime<Utc>),
    /// The current time plus an offset, to simulate a future-dated update.
    ///
    /// The entry also carries `meta.lastUpdated` set to the current time.
    PostDated(Duration),
}

/// Domain-level carrier for a single Task entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskData {
    /// Task id, also used for the entry's `urn:uuid:` full URL.
    pub id: Uuid,

    pub order_number: PrescriptionId,
    pub order_item_number: Uuid,
    pub nhs_number: NhsNumber,
    pub ods_code: OdsCode,

    pub business_status: BusinessStatus,

    /// Second precision, UTC.
    pub last_modified: DateTime<Utc>,

    /// Set for post-dated entries only.
    pub last_updated: Option<DateTime<Utc>>,
}

impl TaskData {
    /// Lifecycle state derived from the business status.
    pub fn status(&self) -> TaskStatus {
        self.business_status.lifecycle_state()
    }
}

// ============================================================================
// Public Task operations
// ============================================================================

/// Task resource operations.
///
/// This is a zero-sized type used for namespacing Task-related operations.
pub struct Task;

impl Task {
    /// Builds a new Task entry.
    ///
    /// The raw status is canonicalised (case-insensitive) and a fresh Task id is generated.
    ///
    /// # Errors
    ///
    /// - [`FhirError::UnknownStatus`] if `business_status` is not a known status.
    /// - [`FhirError::InvalidInput`] for a negative or out-of-range post-dating offset.
    pub fn build_entry(
        business_status: &str,
        references: TaskReferences,
        last_modified: LastModified,
    ) -> FhirResult<TaskData> {
        Self::build_entry_at(business_status, references, last_modified, Utc::now())
    }

    /// As [`Task::build_entry`], with the current time supplied by the caller.
    pub fn build_entry_at(
        business_status: &str,
        references: TaskReferences,
        last_modified: LastModified,
        now: DateTime<Utc>,
    ) -> FhirResult<TaskData> {
        let business_status = BusinessStatus::canonicalize(business_status)?;
        let now = now.trunc_subsecs(0);

        let (last_modified, last_updated) = match last_modified {
            LastModified::Now => (now, None),
            LastModified::At(at) => (at.trunc_subsecs(0), None),
            LastModified::PostDated(offset) => {
                if offset < Duration::zero() {
                    return Err(FhirError::InvalidInput(
                        "post-dating offset cannot be negative".into(),
                    ));
                }
                let future = now.checked_add_signed(offset).ok_or_else(|| {
                    FhirError::InvalidInput("post-dating offset is out of range".into())
                })?;
                (future.trunc_subsecs(0), Some(now))
            }
        };

        Ok(TaskData {
            id: Uuid::new_v4(),
            order_number: references.order_number,
            order_item_number: references.order_item_number,
            nhs_number: references.nhs_number,
            ods_code: references.ods_code,
            business_status,
            last_modified,
            last_updated,
        })
    }
}

// ============================================================================
// Wire types (internal)
// ============================================================================

/// Wire representation of one transaction bundle entry.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct EntryWire {
    full_url: String,
    resource: TaskWire,
    request: RequestWire,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
struct RequestWire {
    method: String,
    url: String,
}

/// Wire representation of the Task resource. Field order matches the published examples.
///
/// Resource-level types tolerate extra FHIR elements (`meta.versionId`, `display`, ...) so that
/// bundles written by other tooling still parse. The envelope stays strict.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
struct TaskWire {
    resource_type: String,
    id: String,
    based_on: Vec<ReferenceWire>,
    status: TaskStatus,
    business_status: CodeableConceptWire,
    intent: String,
    focus: ReferenceWire,
    #[serde(rename = "for")]
    subject: ReferenceWire,
    last_modified: String,
    owner: ReferenceWire,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    meta: Option<MetaWire>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
struct ReferenceWire {
    identifier: IdentifierWire,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
struct IdentifierWire {
    system: String,
    value: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
struct CodeableConceptWire {
    coding: Vec<CodingWire>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
struct CodingWire {
    system: String,
    code: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
struct MetaWire {
    last_updated: String,
}

// ============================================================================
// Helper functions (internal)
// ============================================================================

const RESOURCE_TYPE: &str = "Task";
const INTENT: &str = "order";
const REQUEST_METHOD: &str = "POST";

/// ISO-8601, UTC, second precision, `Z` suffix.
pub(crate) fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_timestamp(value: &str, field: &str) -> FhirResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| FhirError::Translation(format!("invalid {field} timestamp '{value}': {e}")))
}

fn reference(system: &str, value: impl Into<String>) -> ReferenceWire {
    ReferenceWire {
        identifier: IdentifierWire {
            system: system.to_owned(),
            value: value.into(),
        },
    }
}

/// Returns the identifier value after checking its system.
fn identifier_value<'a>(
    reference: &'a ReferenceWire,
    system: &str,
    field: &str,
) -> FhirResult<&'a str> {
    if reference.identifier.system != system {
        return Err(FhirError::Translation(format!(
            "{field}.identifier.system must be '{system}', got '{}'",
            reference.identifier.system
        )));
    }
    Ok(&reference.identifier.value)
}

/// Convert a domain Task to its bundle entry wire form.
pub(crate) fn domain_to_wire(data: &TaskData) -> EntryWire {
    let id = data.id.to_string();

    EntryWire {
        full_url: format!("urn:uuid:{id}"),
        resource: TaskWire {
            resource_type: RESOURCE_TYPE.to_owned(),
            id,
            based_on: vec![reference(
                systems::PRESCRIPTION_ORDER_NUMBER,
                data.order_number.as_str(),
            )],
            status: data.status(),
            business_status: CodeableConceptWire {
                coding: vec![CodingWire {
                    system: systems::BUSINESS_STATUS_NPPT.to_owned(),
                    code: data.business_status.as_str().to_owned(),
                }],
            },
            intent: INTENT.to_owned(),
            focus: reference(
                systems::PRESCRIPTION_ORDER_ITEM_NUMBER,
                data.order_item_number.to_string(),
            ),
            subject: reference(systems::NHS_NUMBER, data.nhs_number.as_str()),
            last_modified: format_timestamp(&data.last_modified),
            owner: reference(systems::ODS_ORGANIZATION_CODE, data.ods_code.as_str()),
            meta: data.last_updated.as_ref().map(|at| MetaWire {
                last_updated: format_timestamp(at),
            }),
        },
        request: RequestWire {
            method: REQUEST_METHOD.to_owned(),
            url: RESOURCE_TYPE.to_owned(),
        },
    }
}

/// Convert a wire entry to the domain carrier, validating identifiers and invariants.
pub(crate) fn wire_to_domain(wire: EntryWire) -> FhirResult<TaskData> {
    let task = wire.resource;

    if task.resource_type != RESOURCE_TYPE {
        return Err(FhirError::InvalidInput(format!(
            "Expected resourceType '{RESOURCE_TYPE}', got '{}'",
            task.resource_type
        )));
    }
    if wire.request.method != REQUEST_METHOD || wire.request.url != RESOURCE_TYPE {
        return Err(FhirError::Translation(format!(
            "entry request must be POST Task, got {} {}",
            wire.request.method, wire.request.url
        )));
    }
    if task.intent != INTENT {
        return Err(FhirError::Translation(format!(
            "Task.intent must be '{INTENT}', got '{}'",
            task.intent
        )));
    }

    let id = Uuid::parse_str(&task.id)
        .map_err(|_| FhirError::InvalidUuid(format!("Invalid UUID in Task.id: {}", task.id)))?;
    if wire.full_url != format!("urn:uuid:{id}") {
        return Err(FhirError::Translation(format!(
            "fullUrl '{}' does not match Task.id {id}",
            wire.full_url
        )));
    }

    let [based_on] = task.based_on.as_slice() else {
        return Err(FhirError::Translation(format!(
            "Task.basedOn must contain exactly one reference, got {}",
            task.based_on.len()
        )));
    };
    let order_number = PrescriptionId::parse(identifier_value(
        based_on,
        systems::PRESCRIPTION_ORDER_NUMBER,
        "Task.basedOn",
    )?)?;

    let item = identifier_value(&task.focus, systems::PRESCRIPTION_ORDER_ITEM_NUMBER, "Task.focus")?;
    let order_item_number = Uuid::parse_str(item).map_err(|_| {
        FhirError::InvalidUuid(format!("Invalid UUID in Task.focus: {item}"))
    })?;

    let nhs_number =
        NhsNumber::parse(identifier_value(&task.subject, systems::NHS_NUMBER, "Task.for")?)?;
    let ods_code = OdsCode::parse(identifier_value(
        &task.owner,
        systems::ODS_ORGANIZATION_CODE,
        "Task.owner",
    )?)?;

    let coding = task
        .business_status
        .coding
        .iter()
        .find(|c| c.system == systems::BUSINESS_STATUS_NPPT)
        .ok_or_else(|| {
            FhirError::Translation(format!(
                "Task.businessStatus has no coding in system '{}'",
                systems::BUSINESS_STATUS_NPPT
            ))
        })?;
    let business_status = BusinessStatus::canonicalize(&coding.code)?;

    if task.status != business_status.lifecycle_state() {
        return Err(FhirError::Translation(format!(
            "Task.status '{}' does not match business status '{business_status}' (expected '{}')",
            task.status,
            business_status.lifecycle_state()
        )));
    }

    let last_modified = parse_timestamp(&task.last_modified, "Task.lastModified")?;
    let last_updated = task
        .meta
        .map(|meta| parse_timestamp(&meta.last_updated, "Task.meta.lastUpdated"))
        .transpose()?;

    Ok(TaskData {
        id,
        order_number,
        order_item_number,
        nhs_number,
        ods_code,
        business_status,
        last_modified,
        last_updated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn references() -> TaskReferences {
        TaskReferences {
            order_number: PrescriptionId::parse("9A822C-A83008-13DCAB").expect("order number"),
            order_item_number: Uuid::parse_str("a4f91c6d-3b2e-4c5f-9d7a-1e8b6c0a9f12")
                .expect("item uuid"),
            nhs_number: NhsNumber::parse("9434765919").expect("nhs number"),
            ods_code: OdsCode::parse("FA565").expect("ods code"),
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap()
            + Duration::milliseconds(589)
    }

    #[test]
    fn builds_in_progress_entry_with_current_time() {
        let before = Utc::now();
        let task = Task::build_entry("ready to collect", references(), LastModified::Now)
            .expect("build entry");

        assert_eq!(task.status(), TaskStatus::InProgress);
        assert_eq!(task.business_status.as_str(), "Ready to Collect");
        assert_eq!(task.last_updated, None);

        let drift = (task.last_modified - before).num_seconds().abs();
        assert!(drift <= 5, "lastModified drifted {drift}s from now");
        assert_eq!(task.last_modified.timestamp_subsec_nanos(), 0);
    }

    #[test]
    fn terminal_status_completes_task() {
        let task =
            Task::build_entry("Collected", references(), LastModified::Now).expect("build entry");
        assert_eq!(task.status(), TaskStatus::Completed);
    }

    #[test]
    fn every_build_gets_a_fresh_id() {
        let a = Task::build_entry("Collected", references(), LastModified::Now).expect("a");
        let b = Task::build_entry("Collected", references(), LastModified::Now).expect("b");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn unknown_status_is_rejected() {
        let err = Task::build_entry("bogus", references(), LastModified::Now)
            .expect_err("should reject status");
        assert!(matches!(err, FhirError::UnknownStatus { .. }));
    }

    #[test]
    fn explicit_timestamp_is_truncated_to_seconds() {
        let at = fixed_now();
        let task = Task::build_entry("With Pharmacy", references(), LastModified::At(at))
            .expect("build entry");
        assert_eq!(format_timestamp(&task.last_modified), "2025-03-14T09:26:53Z");
    }

    #[test]
    fn post_dated_entry_carries_meta() {
        let now = fixed_now();
        let task = Task::build_entry_at(
            "Ready to Collect",
            references(),
            LastModified::PostDated(Duration::hours(2)),
            now,
        )
        .expect("build entry");

        assert_eq!(format_timestamp(&task.last_modified), "2025-03-14T11:26:53Z");
        assert_eq!(
            task.last_updated.map(|t| format_timestamp(&t)).as_deref(),
            Some("2025-03-14T09:26:53Z")
        );
    }

    #[test]
    fn negative_post_dating_is_rejected() {
        let err = Task::build_entry(
            "Ready to Collect",
            references(),
            LastModified::PostDated(Duration::hours(-1)),
        )
        .expect_err("should reject");
        assert!(matches!(err, FhirError::InvalidInput(_)));
    }

    #[test]
    fn wire_shape_matches_psu_examples() {
        let task = Task::build_entry_at(
            "ready to collect",
            references(),
            LastModified::Now,
            fixed_now(),
        )
        .expect("build entry");
        let id = task.id.to_string();

        let value = serde_json::to_value(domain_to_wire(&task)).expect("serialize");
        assert_eq!(
            value,
            json!({
                "fullUrl": format!("urn:uuid:{id}"),
                "resource": {
                    "resourceType": "Task",
                    "id": id,
                    "basedOn": [{"identifier": {
                        "system": "https://fhir.nhs.uk/Id/prescription-order-number",
                        "value": "9A822C-A83008-13DCAB"
                    }}],
                    "status": "in-progress",
                    "businessStatus": {"coding": [{
                        "system": "https://fhir.nhs.uk/CodeSystem/task-businessStatus-nppt",
                        "code": "Ready to Collect"
                    }]},
                    "intent": "order",
                    "focus": {"identifier": {
                        "system": "https://fhir.nhs.uk/Id/prescription-order-item-number",
                        "value": "a4f91c6d-3b2e-4c5f-9d7a-1e8b6c0a9f12"
                    }},
                    "for": {"identifier": {
                        "system": "https://fhir.nhs.uk/Id/nhs-number",
                        "value": "9434765919"
                    }},
                    "lastModified": "2025-03-14T09:26:53Z",
                    "owner": {"identifier": {
                        "system": "https://fhir.nhs.uk/Id/ods-organization-code",
                        "value": "FA565"
                    }}
                },
                "request": {"method": "POST", "url": "Task"}
            })
        );
    }

    #[test]
    fn wire_round_trip_preserves_post_dated_entry() {
        let task = Task::build_entry(
            "Dispatched",
            references(),
            LastModified::PostDated(Duration::minutes(30)),
        )
        .expect("build entry");

        let back = wire_to_domain(domain_to_wire(&task)).expect("wire to domain");
        assert_eq!(back, task);
    }

    #[test]
    fn rejects_status_that_contradicts_business_status() {
        let task = Task::build_entry("Collected", references(), LastModified::Now).expect("build");
        let mut wire = domain_to_wire(&task);
        wire.resource.status = TaskStatus::InProgress;

        match wire_to_domain(wire) {
            Err(FhirError::Translation(msg)) => assert!(msg.contains("does not match")),
            other => panic!("expected Translation error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_wrong_identifier_system() {
        let task = Task::build_entry("Collected", references(), LastModified::Now).expect("build");
        let mut wire = domain_to_wire(&task);
        wire.resource.subject.identifier.system = "https://example.org/patient".into();

        match wire_to_domain(wire) {
            Err(FhirError::Translation(msg)) => assert!(msg.contains("Task.for")),
            other => panic!("expected Translation error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_invalid_nhs_number_on_the_wire() {
        let task = Task::build_entry("Collected", references(), LastModified::Now).expect("build");
        let mut wire = domain_to_wire(&task);
        wire.resource.subject.identifier.value = "9434765918".into();

        assert!(matches!(
            wire_to_domain(wire),
            Err(FhirError::InvalidIdentifier(_))
        ));
    }
}
