//! Common types used across the platform

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

/// A single polygon vertex in WGS84 degrees.
///
/// Serialized as a `[longitude, latitude]` pair, which is the order every
/// geospatial backend we talk to expects.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Coordinate {
    pub longitude: f64,
    pub latitude: f64,
}

impl Coordinate {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }
}

impl From<[f64; 2]> for Coordinate {
    fn from([longitude, latitude]: [f64; 2]) -> Self {
        Self::new(longitude, latitude)
    }
}

impl From<Coordinate> for [f64; 2] {
    fn from(c: Coordinate) -> Self {
        [c.longitude, c.latitude]
    }
}

/// Axis-aligned bounds of a geometry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingBox {
    pub fn contains(&self, c: &Coordinate) -> bool {
        c.longitude >= self.west
            && c.longitude <= self.east
            && c.latitude >= self.south
            && c.latitude <= self.north
    }
}

/// Inclusive calendar window used to filter imagery and reanalysis data
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl DateRange {
    /// Number of days between the two ends of the window
    pub fn days(&self) -> i64 {
        (self.end_date - self.start_date).num_days()
    }

    /// Window of `days` days ending at `end`, or `None` when the start would
    /// fall before the earliest representable date
    pub fn checked_ending_at(end: NaiveDate, days: i64) -> Option<Self> {
        let days = u64::try_from(days).unwrap_or(0);
        Some(Self {
            start_date: end.checked_sub_days(Days::new(days))?,
            end_date: end,
        })
    }

    /// Window of `days` days ending at `end`, clipped at the earliest
    /// representable date
    pub fn ending_at(end: NaiveDate, days: i64) -> Self {
        Self::checked_ending_at(end, days).unwrap_or(Self {
            start_date: NaiveDate::MIN,
            end_date: end,
        })
    }

    /// `YYYY-MM-DD` form of the start date
    pub fn start_iso(&self) -> String {
        self.start_date.format("%Y-%m-%d").to_string()
    }

    /// `YYYY-MM-DD` form of the end date
    pub fn end_iso(&self) -> String {
        self.end_date.format("%Y-%m-%d").to_string()
    }
}
