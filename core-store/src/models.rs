//! Sample models
//!
//! `Sample` is what the queue hands back, `NewSample` is what capture appends.

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

// =============================================================================
// ID Types
// =============================================================================

/// Store-assigned sample identifier; unique and never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleId(pub i64);

impl SampleId {
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl From<i64> for SampleId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Domain Models
// =============================================================================

/// A persisted location sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub id: SampleId,
    pub subject_id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy radius in meters
    pub accuracy: f32,
    /// Device time at capture, Unix epoch milliseconds
    pub captured_at_millis: i64,
    /// Meters per second, if the provider reported it
    pub speed: Option<f32>,
    pub synced: bool,
}

/// Payload for [`SampleStore::append`](crate::SampleStore::append)
#[derive(Debug, Clone, PartialEq)]
pub struct NewSample {
    /// `None` lets the store assign the next id. An explicit id that already
    /// exists replaces that row.
    pub id: Option<SampleId>,
    pub subject_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f32,
    pub captured_at_millis: i64,
    pub speed: Option<f32>,
}

impl NewSample {
    pub fn new(
        subject_id: impl Into<String>,
        latitude: f64,
        longitude: f64,
        accuracy: f32,
        captured_at_millis: i64,
    ) -> Self {
        Self {
            id: None,
            subject_id: subject_id.into(),
            latitude,
            longitude,
            accuracy,
            captured_at_millis,
            speed: None,
        }
    }

    pub fn with_speed(mut self, speed: Option<f32>) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_id(mut self, id: SampleId) -> Self {
        self.id = Some(id);
        self
    }

    /// Reject values the collector could never accept
    pub fn validate(&self) -> Result<()> {
        if self.subject_id.trim().is_empty() {
            return Err(StoreError::invalid("subject_id", "must not be empty"));
        }
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(StoreError::invalid(
                "latitude",
                format!("{} is outside [-90, 90]", self.latitude),
            ));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(StoreError::invalid(
                "longitude",
                format!("{} is outside [-180, 180]", self.longitude),
            ));
        }
        if !self.accuracy.is_finite() || self.accuracy < 0.0 {
            return Err(StoreError::invalid(
                "accuracy",
                format!("{} is not a non-negative radius", self.accuracy),
            ));
        }
        if let Some(speed) = self.speed {
            if !speed.is_finite() || speed < 0.0 {
                return Err(StoreError::invalid(
                    "speed",
                    format!("{} is not a non-negative speed", speed),
                ));
            }
        }
        if self.captured_at_millis < 0 {
            return Err(StoreError::invalid(
                "captured_at_millis",
                "must not precede the Unix epoch",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Database Rows
// =============================================================================

#[derive(Debug, FromRow)]
pub(crate) struct SampleRow {
    pub id: i64,
    pub subject_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub captured_at_millis: i64,
    pub speed: Option<f64>,
    pub synced: bool,
}

impl From<SampleRow> for Sample {
    fn from(row: SampleRow) -> Self {
        Self {
            id: SampleId(row.id),
            subject_id: row.subject_id,
            latitude: row.latitude,
            longitude: row.longitude,
            accuracy: row.accuracy as f32,
            captured_at_millis: row.captured_at_millis,
            speed: row.speed.map(|s| s as f32),
            synced: row.synced,
        }
    }
}
