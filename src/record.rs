// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Measurement record data structure.
//!
//! The [`Record`] is the unit that flows through every storage tier and out
//! to the remote store. It serializes as a flat camelCase object:
//!
//! ```json
//! {
//!   "id": "5f0c...",
//!   "location": "Tama river mouth",
//!   "coordinates": "35.5533, 139.7581",
//!   "dateTime": "2024-03-15T10:30",
//!   "temperature": 18.5,
//!   "ph": 7.2,
//!   "dissolvedOxygen": null,
//!   "conductivity": 320,
//!   "timestamp": "2024-03-15T01:30:00Z",
//!   "synced": false
//! }
//! ```
//!
//! A `null` reading means "not measured". It is never coerced to zero, and
//! zero is a valid reading.
//!
//! # Example
//!
//! ```
//! use field_sync::Record;
//!
//! let mut record = Record::new("Tama river mouth");
//! record.temperature = Some(0.0);
//!
//! assert!(!record.synced);
//! assert!(record.timestamp.is_none());
//! assert!(record.validate().is_ok());
//! ```

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::traits::StorageError;

/// One field measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Opaque unique id, immutable primary key
    pub id: String,
    #[serde(default)]
    pub location: String,
    /// `"lat, lng"` or empty
    #[serde(default)]
    pub coordinates: String,
    /// User-supplied wall-clock string (distinct from `timestamp`)
    #[serde(default)]
    pub date_time: String,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub ph: Option<f64>,
    #[serde(default)]
    pub dissolved_oxygen: Option<f64>,
    #[serde(default)]
    pub turbidity: Option<f64>,
    #[serde(default)]
    pub conductivity: Option<i64>,
    #[serde(default)]
    pub depth: Option<f64>,
    #[serde(default)]
    pub weather: String,
    #[serde(default)]
    pub notes: String,
    /// Creation instant, stamped once at save time if absent
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// True only after a confirmed remote write
    #[serde(default)]
    pub synced: bool,
}

impl Record {
    /// Create an empty, unsynced record with a freshly generated id.
    pub fn new(location: impl Into<String>) -> Self {
        Self::with_id(generate_id(), location)
    }

    /// Create an empty, unsynced record with a caller-chosen id.
    pub fn with_id(id: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            location: location.into(),
            coordinates: String::new(),
            date_time: String::new(),
            temperature: None,
            ph: None,
            dissolved_oxygen: None,
            turbidity: None,
            conductivity: None,
            depth: None,
            weather: String::new(),
            notes: String::new(),
            timestamp: None,
            synced: false,
        }
    }

    /// Check identity, numeric fields and coordinates.
    ///
    /// Runs before any tier sees the record.
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.id.trim().is_empty() {
            return Err(StorageError::InvalidRecord("record has no id".into()));
        }

        let readings = [
            ("temperature", self.temperature),
            ("ph", self.ph),
            ("dissolvedOxygen", self.dissolved_oxygen),
            ("turbidity", self.turbidity),
            ("depth", self.depth),
        ];
        for (field, value) in readings {
            if let Some(v) = value {
                if !v.is_finite() {
                    return Err(StorageError::InvalidRecord(format!(
                        "{} is not a finite number for '{}'",
                        field, self.id
                    )));
                }
            }
        }

        if !self.coordinates.trim().is_empty() {
            parse_coordinates(&self.coordinates).map_err(|reason| {
                StorageError::InvalidRecord(format!(
                    "bad coordinates '{}' for '{}': {}",
                    self.coordinates, self.id, reason
                ))
            })?;
        }

        Ok(())
    }

    /// Stamp the creation instant if it was never set.
    ///
    /// Returns true when a timestamp was assigned.
    pub fn ensure_timestamp(&mut self) -> bool {
        if self.timestamp.is_some() {
            return false;
        }
        self.timestamp = Some(Utc::now());
        true
    }

    /// Whether the record still needs a remote write.
    #[must_use]
    #[inline]
    pub fn is_pending(&self) -> bool {
        !self.synced
    }
}

/// Generate an opaque record id.
#[must_use]
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Parse `"lat, lng"` and check both ranges.
pub fn parse_coordinates(raw: &str) -> Result<(f64, f64), String> {
    let mut parts = raw.split(',');
    let (lat, lng) = match (parts.next(), parts.next(), parts.next()) {
        (Some(lat), Some(lng), None) => (lat.trim(), lng.trim()),
        _ => return Err("expected \"lat, lng\"".into()),
    };

    let lat: f64 = lat.parse().map_err(|_| format!("latitude '{}' is not a number", lat))?;
    let lng: f64 = lng.parse().map_err(|_| format!("longitude '{}' is not a number", lng))?;

    if !(-90.0..=90.0).contains(&lat) {
        return Err(format!("latitude {} out of range", lat));
    }
    if !(-180.0..=180.0).contains(&lng) {
        return Err(format!("longitude {} out of range", lng));
    }
    Ok((lat, lng))
}

/// Raw entry payload, as captured by the data-entry form.
///
/// Numeric readings arrive as text. Blank text means "not measured".
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordInput {
    pub location: String,
    pub coordinates: String,
    pub date_time: String,
    pub temperature: Option<String>,
    pub ph: Option<String>,
    pub dissolved_oxygen: Option<String>,
    pub turbidity: Option<String>,
    pub conductivity: Option<String>,
    pub depth: Option<String>,
    pub weather: String,
    pub notes: String,
}

impl RecordInput {
    /// Turn the payload into a new unsynced record with a generated id.
    ///
    /// Fails with `InvalidRecord` if a non-blank reading does not parse or
    /// the resulting record does not validate.
    pub fn into_record(self) -> Result<Record, StorageError> {
        let mut record = Record::new(self.location);
        record.coordinates = self.coordinates.trim().to_string();
        record.date_time = self.date_time;
        record.temperature = parse_reading("temperature", self.temperature.as_deref())?;
        record.ph = parse_reading("ph", self.ph.as_deref())?;
        record.dissolved_oxygen =
            parse_reading("dissolvedOxygen", self.dissolved_oxygen.as_deref())?;
        record.turbidity = parse_reading("turbidity", self.turbidity.as_deref())?;
        record.conductivity = parse_integer_reading("conductivity", self.conductivity.as_deref())?;
        record.depth = parse_reading("depth", self.depth.as_deref())?;
        record.weather = self.weather;
        record.notes = self.notes;

        record.validate()?;
        Ok(record)
    }
}

fn blank(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

fn parse_reading(field: &str, raw: Option<&str>) -> Result<Option<f64>, StorageError> {
    match blank(raw) {
        None => Ok(None),
        Some(text) => text
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Some)
            .ok_or_else(|| {
                StorageError::InvalidRecord(format!("{} '{}' is not a number", field, text))
            }),
    }
}

fn parse_integer_reading(field: &str, raw: Option<&str>) -> Result<Option<i64>, StorageError> {
    match blank(raw) {
        None => Ok(None),
        Some(text) => text.parse::<i64>().map(Some).map_err(|_| {
            StorageError::InvalidRecord(format!("{} '{}' is not an integer", field, text))
        }),
    }
}

/// Sample measurements shown when no remote store is configured.
#[must_use]
pub fn demo_records() -> Vec<Record> {
    let at = |h, m| Utc.with_ymd_and_hms(2024, 3, 15, h, m, 0).single();

    let mut tama = Record::with_id("demo1", "Tama river mouth");
    tama.coordinates = "35.5533, 139.7581".into();
    tama.date_time = "2024-03-15T10:30".into();
    tama.temperature = Some(18.5);
    tama.ph = Some(7.2);
    tama.dissolved_oxygen = Some(8.3);
    tama.turbidity = Some(2.1);
    tama.conductivity = Some(320);
    tama.depth = Some(1.5);
    tama.weather = "sunny".into();
    tama.notes = "sample survey (demo)".into();
    tama.timestamp = at(10, 30);

    let mut arakawa = Record::with_id("demo2", "Arakawa midstream");
    arakawa.coordinates = "35.7061, 139.7814".into();
    arakawa.date_time = "2024-03-15T14:15".into();
    arakawa.temperature = Some(19.2);
    arakawa.ph = Some(7.5);
    arakawa.dissolved_oxygen = Some(7.8);
    arakawa.turbidity = Some(3.2);
    arakawa.conductivity = Some(285);
    arakawa.depth = Some(2.1);
    arakawa.weather = "cloudy".into();
    arakawa.notes = "inflow from upstream confirmed".into();
    arakawa.timestamp = at(14, 15);

    vec![tama, arakawa]
}
