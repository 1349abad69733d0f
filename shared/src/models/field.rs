//! Farm field models

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::types::{BoundingBox, Coordinate};
use crate::validation::{parse_points, validate_polygon, ValidationError};

/// Identifier of a field document in the upstream document store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldId(pub String);

impl FieldId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FieldId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FieldId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Boundary of a farm field.
///
/// Always holds at least three vertices. The ring is implicitly closed: a
/// trailing vertex equal to the first one is dropped on construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Coordinate>", into = "Vec<Coordinate>")]
pub struct FieldPolygon {
    vertices: Vec<Coordinate>,
}

impl FieldPolygon {
    /// Build a polygon, rejecting fewer than three vertices or non-finite /
    /// out-of-range coordinates.
    pub fn new(mut vertices: Vec<Coordinate>) -> Result<Self, ValidationError> {
        if vertices.len() > 3 && vertices.first() == vertices.last() {
            vertices.pop();
        }
        validate_polygon(&vertices)?;
        Ok(Self { vertices })
    }

    pub fn vertices(&self) -> &[Coordinate] {
        &self.vertices
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Vertices as a closed ring (first vertex repeated at the end), the form
    /// GeoJSON-style polygon constructors expect.
    pub fn closed_ring(&self) -> Vec<[f64; 2]> {
        let mut ring: Vec<[f64; 2]> = self.vertices.iter().map(|c| (*c).into()).collect();
        if let Some(first) = ring.first().copied() {
            ring.push(first);
        }
        ring
    }

    pub fn bounds(&self) -> BoundingBox {
        let mut bounds = BoundingBox {
            west: f64::INFINITY,
            south: f64::INFINITY,
            east: f64::NEG_INFINITY,
            north: f64::NEG_INFINITY,
        };
        for c in &self.vertices {
            bounds.west = bounds.west.min(c.longitude);
            bounds.east = bounds.east.max(c.longitude);
            bounds.south = bounds.south.min(c.latitude);
            bounds.north = bounds.north.max(c.latitude);
        }
        bounds
    }

    /// Signed planar area in square degrees (positive when counter-clockwise)
    pub fn signed_area(&self) -> f64 {
        let origin = self.vertices[0];
        let mut twice_area = 0.0;
        for (a, b) in self.edges() {
            let (ax, ay) = (a.longitude - origin.longitude, a.latitude - origin.latitude);
            let (bx, by) = (b.longitude - origin.longitude, b.latitude - origin.latitude);
            twice_area += ax * by - bx * ay;
        }
        twice_area / 2.0
    }

    /// Area-weighted centroid of the ring.
    ///
    /// Coarse datasets are sampled at this point because their pixels are
    /// larger than a typical field. Degenerate (zero-area) rings fall back to
    /// the vertex average.
    pub fn centroid(&self) -> Coordinate {
        let origin = self.vertices[0];
        let area = self.signed_area();

        if area.abs() < 1e-12 {
            let n = self.vertices.len() as f64;
            let (sum_lon, sum_lat) = self
                .vertices
                .iter()
                .fold((0.0, 0.0), |(x, y), c| (x + c.longitude, y + c.latitude));
            return Coordinate::new(sum_lon / n, sum_lat / n);
        }

        let (mut cx, mut cy) = (0.0, 0.0);
        for (a, b) in self.edges() {
            let (ax, ay) = (a.longitude - origin.longitude, a.latitude - origin.latitude);
            let (bx, by) = (b.longitude - origin.longitude, b.latitude - origin.latitude);
            let cross = ax * by - bx * ay;
            cx += (ax + bx) * cross;
            cy += (ay + by) * cross;
        }

        Coordinate::new(
            origin.longitude + cx / (6.0 * area),
            origin.latitude + cy / (6.0 * area),
        )
    }

    fn edges(&self) -> impl Iterator<Item = (&Coordinate, &Coordinate)> {
        self.vertices
            .iter()
            .zip(self.vertices.iter().cycle().skip(1))
    }
}

impl TryFrom<Vec<Coordinate>> for FieldPolygon {
    type Error = ValidationError;

    fn try_from(vertices: Vec<Coordinate>) -> Result<Self, Self::Error> {
        Self::new(vertices)
    }
}

impl From<FieldPolygon> for Vec<Coordinate> {
    fn from(p: FieldPolygon) -> Self {
        p.vertices
    }
}

/// A field the dashboard is currently showing, as handed over by the
/// document store layer. The boundary may be incomplete while a user is still
/// drawing it, so it is kept raw here. Points are read in the same shapes as
/// [`crate::parse_polygon`] accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedField {
    pub id: FieldId,
    #[serde(default, deserialize_with = "deserialize_boundary")]
    pub polygon: Vec<Coordinate>,
}

fn deserialize_boundary<'de, D>(deserializer: D) -> Result<Vec<Coordinate>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(Vec::new());
    }
    parse_points(&value).map_err(serde::de::Error::custom)
}

impl ObservedField {
    pub fn new(id: impl Into<String>, polygon: Vec<Coordinate>) -> Self {
        Self {
            id: FieldId::new(id),
            polygon,
        }
    }

    /// The boundary as a validated polygon, or `None` if it is not analyzable
    pub fn analyzable_polygon(&self) -> Option<FieldPolygon> {
        FieldPolygon::new(self.polygon.clone()).ok()
    }
}
