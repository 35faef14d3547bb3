//! FHIR transaction bundles of PSU Task entries.
//!
//! Entries are independent: the receiving system processes each Task on its own, so the order
//! of entries carries no meaning.

use crate::task::{self, EntryWire, TaskData};
use crate::{FhirError, FhirResult};
use serde::{Deserialize, Serialize};

/// Domain-level carrier for a transaction bundle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionBundle {
    pub entries: Vec<TaskData>,
}

impl TransactionBundle {
    /// NHS numbers referenced by the bundle's Tasks, in entry order.
    pub fn nhs_numbers(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.nhs_number.as_str())
    }
}

/// Bundle operations.
///
/// This is a zero-sized type used for namespacing bundle-related operations.
pub struct Bundle;

impl Bundle {
    /// Wraps one or more Task entries into a transaction bundle.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::InvalidInput`] if `entries` is empty.
    pub fn build(entries: Vec<TaskData>) -> FhirResult<TransactionBundle> {
        if entries.is_empty() {
            return Err(FhirError::InvalidInput(
                "a transaction bundle needs at least one entry".into(),
            ));
        }
        Ok(TransactionBundle { entries })
    }

    /// Render a bundle as compact JSON, as sent on the wire.
    pub fn render(bundle: &TransactionBundle) -> FhirResult<String> {
        Ok(serde_json::to_string(&domain_to_wire(bundle))?)
    }

    /// Render a bundle as indented JSON for display.
    pub fn render_pretty(bundle: &TransactionBundle) -> FhirResult<String> {
        Ok(serde_json::to_string_pretty(&domain_to_wire(bundle))?)
    }

    /// Parse a transaction bundle from JSON text.
    ///
    /// This uses `serde_path_to_error` to report the path to the failing field (for example
    /// `entry[0].resource.businessStatus`) when the JSON does not match the wire schema.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError`] if:
    /// - the JSON does not match the wire schema or contains unknown keys,
    /// - `resourceType` is not `Bundle` or `type` is not `transaction`,
    /// - any entry fails Task validation (identifiers, status consistency, timestamps).
    pub fn parse(json_text: &str) -> FhirResult<TransactionBundle> {
        let mut deserializer = serde_json::Deserializer::from_str(json_text);

        let wire = match serde_path_to_error::deserialize::<_, BundleWire>(&mut deserializer) {
            Ok(parsed) => parsed,
            Err(err) => {
                let path = err.path().to_string();
                let source = err.into_inner();
                let path = if path.is_empty() || path == "." {
                    "<root>"
                } else {
                    path.as_str()
                };
                return Err(FhirError::Translation(format!(
                    "Bundle schema mismatch at {path}: {source}"
                )));
            }
        };
        deserializer.end()?;

        wire_to_domain(wire)
    }
}

// ============================================================================
// Wire types (internal)
// ============================================================================

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct BundleWire {
    resource_type: String,
    #[serde(rename = "type")]
    bundle_type: String,
    entry: Vec<EntryWire>,
}

const RESOURCE_TYPE: &str = "Bundle";
const BUNDLE_TYPE: &str = "transaction";

fn domain_to_wire(bundle: &TransactionBundle) -> BundleWire {
    BundleWire {
        resource_type: RESOURCE_TYPE.to_owned(),
        bundle_type: BUNDLE_TYPE.to_owned(),
        entry: bundle.entries.iter().map(task::domain_to_wire).collect(),
    }
}

fn wire_to_domain(wire: BundleWire) -> FhirResult<TransactionBundle> {
    if wire.resource_type != RESOURCE_TYPE {
        return Err(FhirError::InvalidInput(format!(
            "Expected resourceType '{RESOURCE_TYPE}', got '{}'",
            wire.resource_type
        )));
    }
    if wire.bundle_type != BUNDLE_TYPE {
        return Err(FhirError::InvalidInput(format!(
            "Expected bundle type '{BUNDLE_TYPE}', got '{}'",
            wire.bundle_type
        )));
    }

    let entries = wire
        .entry
        .into_iter()
        .map(task::wire_to_domain)
        .collect::<FhirResult<Vec<_>>>()?;

    Bundle::build(entries)
}
