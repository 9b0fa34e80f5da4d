//! Paused-journey snapshots.
//!
//! A paused journey exists only as a [`JourneySnapshot`] value: the actor
//! is gone and the snapshot is the sole owner-transferable representation
//! until it is resumed. The envelope carries a format version that is
//! checked on rehydration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SnapshotError;

use super::model::Journey;

/// Current snapshot format version.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Serialized state of a paused journey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JourneySnapshot {
    /// Snapshot format version
    pub format_version: u32,
    /// When the journey was paused
    pub paused_at: DateTime<Utc>,
    /// The journey aggregate, including its pending deadline
    pub journey: Journey,
}

impl JourneySnapshot {
    /// Wraps a journey in a current-format envelope.
    #[must_use]
    pub const fn new(journey: Journey, paused_at: DateTime<Utc>) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            paused_at,
            journey,
        }
    }

    /// Returns the id of the wrapped journey.
    #[must_use]
    pub fn journey_id(&self) -> &str {
        &self.journey.id
    }

    /// Encodes the snapshot as JSON.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::Serialization` if encoding fails.
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes and version-checks a snapshot.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::Serialization` for malformed input and
    /// `SnapshotError::VersionMismatch` for another format version.
    pub fn from_json(raw: &str) -> Result<Self, SnapshotError> {
        let snapshot: Self = serde_json::from_str(raw)?;
        snapshot.check_version()?;
        Ok(snapshot)
    }

    /// Checks the format version against this build.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::VersionMismatch` when they differ.
    pub const fn check_version(&self) -> Result<(), SnapshotError> {
        if self.format_version == SNAPSHOT_FORMAT_VERSION {
            Ok(())
        } else {
            Err(SnapshotError::VersionMismatch {
                expected: SNAPSHOT_FORMAT_VERSION,
                actual: self.format_version,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn snapshot() -> JourneySnapshot {
        let now = Utc::now();
        JourneySnapshot::new(Journey::new("j-1", "guest-1", BTreeMap::new(), now), now)
    }

    #[test]
    fn test_json_round_trip() {
        let original = snapshot();
        let decoded = JourneySnapshot::from_json(&original.to_json().unwrap()).unwrap();
        assert_eq!(decoded, original);
        assert_eq!(decoded.journey_id(), "j-1");
    }

    #[test]
    fn test_version_mismatch() {
        let mut value = serde_json::to_value(snapshot()).unwrap();
        value["format_version"] = serde_json::json!(7);
        let err = JourneySnapshot::from_json(&value.to_string()).unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::VersionMismatch {
                expected: SNAPSHOT_FORMAT_VERSION,
                actual: 7
            }
        ));
    }

    #[test]
    fn test_malformed_input() {
        let err = JourneySnapshot::from_json("{\"format_version\":1}").unwrap_err();
        assert!(matches!(err, SnapshotError::Serialization(_)));
    }
}
