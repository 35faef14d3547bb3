//! NPPT business status vocabulary.
//!
//! The business status tells the patient where their prescription is in the dispensing
//! process. Each value maps to exactly one Task lifecycle state: terminal statuses complete the
//! Task, everything else leaves it in progress.

use crate::{FhirError, FhirResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical business status values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BusinessStatus {
    WithPharmacy,
    WithPharmacyPreparingRemainder,
    ReadyToCollect,
    ReadyToCollectPartial,
    Collected,
    Dispatched,
    NotDispensed,
    ReadyToDispatch,
    ReadyToDispatchPartial,
}

impl BusinessStatus {
    /// Every status in display order.
    pub const ALL: [BusinessStatus; 9] = [
        Self::WithPharmacy,
        Self::WithPharmacyPreparingRemainder,
        Self::ReadyToCollect,
        Self::ReadyToCollectPartial,
        Self::Collected,
        Self::Dispatched,
        Self::NotDispensed,
        Self::ReadyToDispatch,
        Self::ReadyToDispatchPartial,
    ];

    /// The canonical code, exactly as sent on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WithPharmacy => "With Pharmacy",
            Self::WithPharmacyPreparingRemainder => "With Pharmacy - Preparing Remainder",
            Self::ReadyToCollect => "Ready to Collect",
            Self::ReadyToCollectPartial => "Ready to Collect - Partial",
            Self::Collected => "Collected",
            Self::Dispatched => "Dispatched",
            Self::NotDispensed => "Not Dispensed",
            Self::ReadyToDispatch => "Ready to Dispatch",
            Self::ReadyToDispatchPartial => "Ready to Dispatch - Partial",
        }
    }

    /// Terminal statuses need no further patient action.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Collected | Self::Dispatched | Self::NotDispensed)
    }

    /// Matches free text against the canonical set, ignoring case and surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::UnknownStatus`] listing the valid choices when nothing matches.
    pub fn canonicalize(raw: &str) -> FhirResult<Self> {
        let wanted = raw.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().to_lowercase() == wanted)
            .ok_or_else(|| FhirError::UnknownStatus {
                raw: raw.to_owned(),
                choices: Self::choices(),
            })
    }

    /// Comma-separated list of canonical values, for help text and error messages.
    pub fn choices() -> String {
        Self::ALL
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn lifecycle_state(self) -> TaskStatus {
        derive_lifecycle_state(self)
    }
}

/// Derives the Task lifecycle state for a canonical business status.
pub fn derive_lifecycle_state(canonical: BusinessStatus) -> TaskStatus {
    if canonical.is_terminal() {
        TaskStatus::Completed
    } else {
        TaskStatus::InProgress
    }
}

impl fmt::Display for BusinessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BusinessStatus {
    type Err = FhirError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::canonicalize(s)
    }
}

/// FHIR `Task.status` values used by PSU.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
