//! Validation utilities for the Field Health Analysis Platform
//!
//! Everything here runs before any network call is made, both in the backend
//! and in the browser through the WASM module.

use chrono::{Datelike, NaiveDate};
use serde_json::Value;
use thiserror::Error;

use crate::models::FieldPolygon;
use crate::types::{Coordinate, DateRange};

/// Minimum number of vertices a field boundary needs to be analyzable
pub const MIN_POLYGON_POINTS: usize = 3;

/// Default length of the analysis window when no start date is given
pub const DEFAULT_WINDOW_DAYS: i64 = 90;

/// Calendar years accepted in request dates
pub const MIN_DATE_YEAR: i32 = 1900;
pub const MAX_DATE_YEAR: i32 = 9999;

/// Input rejected before entering the analysis pipeline
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Polygon must have at least 3 points, got {count}")]
    TooFewPoints { count: usize },

    #[error("Point {index} is not a valid coordinate: {reason}")]
    InvalidCoordinate { index: usize, reason: String },

    #[error("Point {index} is out of range (longitude {longitude}, latitude {latitude})")]
    OutOfRange {
        index: usize,
        longitude: f64,
        latitude: f64,
    },

    #[error("Polygon must be an array of [longitude, latitude] pairs")]
    NotAnArray,

    #[error("Invalid {field}: expected YYYY-MM-DD, got '{value}'")]
    InvalidDate { field: &'static str, value: String },

    #[error("Start date {start} is after end date {end}")]
    InvertedDateRange { start: NaiveDate, end: NaiveDate },
}

impl ValidationError {
    /// Name of the request field the error refers to
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::InvalidDate { field, .. } => field,
            ValidationError::InvertedDateRange { .. } => "startDate",
            _ => "polygon",
        }
    }
}

/// Validate field boundary vertices
pub fn validate_polygon(vertices: &[Coordinate]) -> Result<(), ValidationError> {
    if vertices.len() < MIN_POLYGON_POINTS {
        return Err(ValidationError::TooFewPoints {
            count: vertices.len(),
        });
    }

    for (index, c) in vertices.iter().enumerate() {
        if !c.longitude.is_finite() || !c.latitude.is_finite() {
            return Err(ValidationError::InvalidCoordinate {
                index,
                reason: "longitude and latitude must be finite numbers".to_string(),
            });
        }
        if !(-180.0..=180.0).contains(&c.longitude) || !(-90.0..=90.0).contains(&c.latitude) {
            return Err(ValidationError::OutOfRange {
                index,
                longitude: c.longitude,
                latitude: c.latitude,
            });
        }
    }

    Ok(())
}

/// Parse a polygon from loosely-typed JSON.
///
/// Accepts `[[lon, lat], ...]` pairs as well as `{"lng": .., "lat": ..}`
/// objects, which is how the document store keeps geo points.
pub fn parse_polygon(value: &Value) -> Result<FieldPolygon, ValidationError> {
    let points = value.as_array().ok_or(ValidationError::NotAnArray)?;

    if points.len() < MIN_POLYGON_POINTS {
        return Err(ValidationError::TooFewPoints {
            count: points.len(),
        });
    }

    FieldPolygon::new(parse_points(value)?)
}

/// Parse boundary points in either accepted shape without checking the
/// vertex count, for boundaries that may still be incomplete
pub fn parse_points(value: &Value) -> Result<Vec<Coordinate>, ValidationError> {
    value
        .as_array()
        .ok_or(ValidationError::NotAnArray)?
        .iter()
        .enumerate()
        .map(|(index, point)| parse_point(index, point))
        .collect()
}

fn parse_point(index: usize, point: &Value) -> Result<Coordinate, ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidCoordinate {
        index,
        reason: reason.to_string(),
    };

    match point {
        Value::Array(pair) => {
            if pair.len() != 2 {
                return Err(invalid("expected exactly two numbers"));
            }
            let lon = pair[0].as_f64().ok_or_else(|| invalid("longitude is not a number"))?;
            let lat = pair[1].as_f64().ok_or_else(|| invalid("latitude is not a number"))?;
            Ok(Coordinate::new(lon, lat))
        }
        Value::Object(map) => {
            let lon = ["lng", "lon", "longitude"]
                .iter()
                .find_map(|k| map.get(*k))
                .and_then(Value::as_f64)
                .ok_or_else(|| invalid("missing numeric longitude"))?;
            let lat = ["lat", "latitude"]
                .iter()
                .find_map(|k| map.get(*k))
                .and_then(Value::as_f64)
                .ok_or_else(|| invalid("missing numeric latitude"))?;
            Ok(Coordinate::new(lon, lat))
        }
        _ => Err(invalid("expected [longitude, latitude]")),
    }
}

/// Parse an ISO `YYYY-MM-DD` date with a year in
/// `MIN_DATE_YEAR..=MAX_DATE_YEAR`
pub fn parse_iso_date(field: &'static str, value: &str) -> Result<NaiveDate, ValidationError> {
    let invalid = || ValidationError::InvalidDate {
        field,
        value: value.to_string(),
    };

    let date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| invalid())?;
    if !(MIN_DATE_YEAR..=MAX_DATE_YEAR).contains(&date.year()) {
        return Err(invalid());
    }
    Ok(date)
}

/// Resolve the analysis window.
///
/// The end defaults to `today`; the start defaults to `default_days` before
/// the end.
pub fn resolve_date_range(
    start: Option<&str>,
    end: Option<&str>,
    today: NaiveDate,
    default_days: i64,
) -> Result<DateRange, ValidationError> {
    let end_date = match end {
        Some(s) if !s.trim().is_empty() => parse_iso_date("endDate", s)?,
        _ => today,
    };

    let range = match start {
        Some(s) if !s.trim().is_empty() => DateRange {
            start_date: parse_iso_date("startDate", s)?,
            end_date,
        },
        _ => DateRange::checked_ending_at(end_date, default_days).ok_or_else(|| {
            ValidationError::InvalidDate {
                field: "endDate",
                value: end_date.format("%Y-%m-%d").to_string(),
            }
        })?,
    };

    if range.start_date > range.end_date {
        return Err(ValidationError::InvertedDateRange {
            start: range.start_date,
            end: range.end_date,
        });
    }

    Ok(range)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
    }

    // ========================================================================
    // Polygon Validation Tests
    // ========================================================================

    #[test]
    fn test_parse_polygon_pairs() {
        let polygon = parse_polygon(&json!([[100.0, 10.0], [100.1, 10.0], [100.1, 10.1]])).unwrap();
        assert_eq!(polygon.len(), 3);
        assert_eq!(polygon.vertices()[1], Coordinate::new(100.1, 10.0));
    }

    #[test]
    fn test_parse_polygon_objects() {
        let polygon = parse_polygon(&json!([
            {"lng": 100.0, "lat": 10.0},
            {"lng": 100.1, "lat": 10.0},
            {"longitude": 100.1, "latitude": 10.1},
        ]))
        .unwrap();
        assert_eq!(polygon.vertices()[2], Coordinate::new(100.1, 10.1));
    }

    #[test]
    fn test_parse_polygon_too_few_points() {
        assert_eq!(
            parse_polygon(&json!([[0, 0], [1, 1]])),
            Err(ValidationError::TooFewPoints { count: 2 })
        );
        assert_eq!(
            parse_polygon(&json!([])),
            Err(ValidationError::TooFewPoints { count: 0 })
        );
    }

    #[test]
    fn test_parse_polygon_non_numeric() {
        let err = parse_polygon(&json!([[0, 0], [1, "a"], [2, 2]])).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidCoordinate { index: 1, .. }));
    }

    #[test]
    fn test_parse_polygon_not_array() {
        assert_eq!(
            parse_polygon(&json!({"type": "Polygon"})),
            Err(ValidationError::NotAnArray)
        );
    }

    #[test]
    fn test_validate_polygon_out_of_range() {
        let err = validate_polygon(&[
            Coordinate::new(0.0, 0.0),
            Coordinate::new(181.0, 0.0),
            Coordinate::new(0.0, 1.0),
        ])
        .unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { index: 1, .. }));
    }

    #[test]
    fn test_validate_polygon_nan() {
        let err = validate_polygon(&[
            Coordinate::new(0.0, 0.0),
            Coordinate::new(1.0, f64::NAN),
            Coordinate::new(0.0, 1.0),
        ])
        .unwrap_err();
        assert_eq!(err.field(), "polygon");
    }

    // ========================================================================
    // Date Window Tests
    // ========================================================================

    #[test]
    fn test_default_window_is_90_days_ending_today() {
        let range = resolve_date_range(None, None, today(), DEFAULT_WINDOW_DAYS).unwrap();
        assert_eq!(range.end_date, today());
        assert_eq!(range.days(), 90);
    }

    #[test]
    fn test_start_defaults_relative_to_given_end() {
        let range =
            resolve_date_range(None, Some("2024-03-31"), today(), DEFAULT_WINDOW_DAYS).unwrap();
        assert_eq!(range.end_iso(), "2024-03-31");
        assert_eq!(range.start_iso(), "2024-01-01");
    }

    #[test]
    fn test_explicit_window() {
        let range = resolve_date_range(Some("2024-05-01"), Some("2024-05-31"), today(), 90).unwrap();
        assert_eq!(range.days(), 30);
    }

    #[test]
    fn test_blank_dates_use_defaults() {
        let range = resolve_date_range(Some(""), Some("  "), today(), 90).unwrap();
        assert_eq!(range.end_date, today());
    }

    #[test]
    fn test_invalid_date_format() {
        let err = resolve_date_range(Some("05/01/2024"), None, today(), 90).unwrap_err();
        assert_eq!(err.field(), "startDate");
    }

    #[test]
    fn test_inverted_range_rejected() {
        let err = resolve_date_range(Some("2024-06-01"), Some("2024-05-01"), today(), 90);
        assert!(matches!(err, Err(ValidationError::InvertedDateRange { .. })));
    }

    #[test]
    fn test_extreme_years_rejected() {
        for value in ["-262143-01-05", "+262142-12-31", "0001-01-01", "10000-01-01"] {
            let err = parse_iso_date("endDate", value).unwrap_err();
            assert_eq!(err.field(), "endDate", "{value}");
        }

        let err = resolve_date_range(None, Some("-262143-01-05"), today(), DEFAULT_WINDOW_DAYS).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidDate { field: "endDate", .. }));
    }

    #[test]
    fn test_year_band_edges_accepted() {
        let range = resolve_date_range(Some("1900-01-01"), Some("9999-12-31"), today(), 90).unwrap();
        assert_eq!(range.start_iso(), "1900-01-01");
        assert_eq!(range.end_iso(), "9999-12-31");
    }
}
