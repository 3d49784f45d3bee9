//! Location values.
//!
//! A [`Location`] is built once from an inbound [`LocationUpdate`] and never
//! mutated afterwards; hubs replace their cached value on every update.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A position report from one party of a delivery session.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    lat: f64,
    lng: f64,
    #[serde(default)]
    speed: f64,
    #[serde(default, skip_serializing_if = "is_zero")]
    heading: f64,
    #[serde(default, skip_serializing_if = "is_zero")]
    accuracy: f64,
    at: DateTime<Utc>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(v: &f64) -> bool {
    *v == 0.0
}

impl Location {
    /// Build a location with only coordinates and a timestamp.
    pub fn new(lat: f64, lng: f64, at: DateTime<Utc>) -> Self {
        Self {
            lat,
            lng,
            speed: 0.0,
            heading: 0.0,
            accuracy: 0.0,
            at,
        }
    }

    /// Set ground speed (unvalidated).
    #[must_use]
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    /// Set heading in degrees (unvalidated).
    #[must_use]
    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = heading;
        self
    }

    /// Set horizontal accuracy (unvalidated).
    #[must_use]
    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = accuracy;
        self
    }

    /// Latitude in degrees.
    pub fn lat(&self) -> f64 {
        self.lat
    }

    /// Longitude in degrees.
    pub fn lng(&self) -> f64 {
        self.lng
    }

    /// Ground speed as reported by the sender.
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Heading as reported by the sender.
    pub fn heading(&self) -> f64 {
        self.heading
    }

    /// Accuracy as reported by the sender.
    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }

    /// When the position was taken (or received, if the sender omitted it).
    pub fn at(&self) -> DateTime<Utc> {
        self.at
    }

    /// Whether the coordinates are usable.
    ///
    /// Latitude must lie in `[-90, 90]` and longitude in `[-180, 180]`; NaN
    /// fails both range checks. Speed, heading and accuracy are passed through
    /// without any check.
    pub fn validate(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Inbound position fields, shared by live frames and the REST fallback body.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct LocationUpdate {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Ground speed.
    #[serde(default)]
    pub speed: f64,
    /// Heading.
    #[serde(default)]
    pub heading: f64,
    /// Horizontal accuracy.
    #[serde(default)]
    pub accuracy: f64,
    /// Sender timestamp in epoch milliseconds.
    #[serde(default, alias = "at")]
    pub at_ms: Option<i64>,
}

impl LocationUpdate {
    /// Build the immutable [`Location`], stamping receipt time when the sender
    /// gave no usable timestamp.
    pub fn into_location(self) -> Location {
        Location::new(self.lat, self.lng, timestamp_or_now(self.at_ms))
            .with_speed(self.speed)
            .with_heading(self.heading)
            .with_accuracy(self.accuracy)
    }
}

/// Convert epoch milliseconds to a UTC timestamp.
///
/// Missing, non-positive or unrepresentable values fall back to `Utc::now()`.
pub fn timestamp_or_now(at_ms: Option<i64>) -> DateTime<Utc> {
    at_ms
        .filter(|ms| *ms > 0)
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or_else(Utc::now)
}
