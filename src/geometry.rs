// 🗺️ Geometry helpers - bounding boxes and WKT points

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeometryError {
    #[error("Invalid format")]
    InvalidFormat,

    #[error("{0}")]
    OutOfBounds(String),
}

// ============================================================================
// POINT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub longitude: f64,
    pub latitude: f64,
}

fn point_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^POINT\((-?\d+\.\d+) (-?\d+\.\d+)\)").expect("point pattern is valid")
    })
}

/// Parse a WKT literal such as `POINT(-1.1834759844410794 50.72234886358317)`
pub fn parse_point(wkt: &str) -> Result<Point, GeometryError> {
    let captures = point_pattern()
        .captures(wkt)
        .ok_or(GeometryError::InvalidFormat)?;

    let longitude = captures[1]
        .parse::<f64>()
        .map_err(|_| GeometryError::InvalidFormat)?;
    let latitude = captures[2]
        .parse::<f64>()
        .map_err(|_| GeometryError::InvalidFormat)?;

    Ok(Point {
        longitude,
        latitude,
    })
}

// ============================================================================
// BOUNDING BOX
// ============================================================================

/// Axis-aligned envelope in WGS84 (SRID 4326) degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_long: f64,
    pub max_long: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn validate(&self) -> Result<(), GeometryError> {
        let bounds = [self.min_long, self.max_long, self.min_lat, self.max_lat];
        if bounds.iter().any(|b| !b.is_finite()) {
            return Err(GeometryError::OutOfBounds(
                "Bounding box coordinates must be finite numbers".to_string(),
            ));
        }

        if !(-180.0..=180.0).contains(&self.min_long) || !(-180.0..=180.0).contains(&self.max_long) {
            return Err(GeometryError::OutOfBounds(
                "Longitude must be between -180 and 180".to_string(),
            ));
        }

        if !(-90.0..=90.0).contains(&self.min_lat) || !(-90.0..=90.0).contains(&self.max_lat) {
            return Err(GeometryError::OutOfBounds(
                "Latitude must be between -90 and 90".to_string(),
            ));
        }

        if self.min_long >= self.max_long || self.min_lat >= self.max_lat {
            return Err(GeometryError::OutOfBounds(
                "Minimum bounds must be smaller than maximum bounds".to_string(),
            ));
        }

        Ok(())
    }

    /// Closed ring, counter-clockwise from the south-west corner
    pub fn to_polygon_wkt(&self) -> String {
        format!(
            "POLYGON(({min_long} {min_lat}, {max_long} {min_lat}, {max_long} {max_lat}, {min_long} {max_lat}, {min_long} {min_lat}))",
            min_long = self.min_long,
            min_lat = self.min_lat,
            max_long = self.max_long,
            max_lat = self.max_lat,
        )
    }

    /// Envelope of a `POLYGON((x y, ...))` literal
    pub fn from_polygon_wkt(wkt: &str) -> Result<BoundingBox, GeometryError> {
        let body = wkt
            .trim()
            .strip_prefix("POLYGON((")
            .and_then(|rest| rest.strip_suffix("))"))
            .ok_or(GeometryError::InvalidFormat)?;

        let mut envelope: Option<BoundingBox> = None;
        for vertex in body.split(',') {
            let mut coords = vertex.split_whitespace();
            let (Some(x), Some(y), None) = (coords.next(), coords.next(), coords.next()) else {
                return Err(GeometryError::InvalidFormat);
            };
            let x: f64 = x.parse().map_err(|_| GeometryError::InvalidFormat)?;
            let y: f64 = y.parse().map_err(|_| GeometryError::InvalidFormat)?;

            envelope = Some(match envelope {
                None => BoundingBox {
                    min_long: x,
                    max_long: x,
                    min_lat: y,
                    max_lat: y,
                },
                Some(b) => BoundingBox {
                    min_long: b.min_long.min(x),
                    max_long: b.max_long.max(x),
                    min_lat: b.min_lat.min(y),
                    max_lat: b.max_lat.max(y),
                },
            });
        }

        envelope.ok_or(GeometryError::InvalidFormat)
    }

    /// Boundary points count as inside
    pub fn contains(&self, point: &Point) -> bool {
        point.longitude >= self.min_long
            && point.longitude <= self.max_long
            && point.latitude >= self.min_lat
            && point.latitude <= self.max_lat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn isle_of_wight() -> BoundingBox {
        BoundingBox {
            min_long: -1.1835,
            max_long: -1.1507,
            min_lat: 50.6445,
            max_lat: 50.7261,
        }
    }

    #[test]
    fn test_parse_point() {
        let point = parse_point("POINT(-1.1835 50.7223)").unwrap();
        assert_eq!(point.longitude, -1.1835);
        assert_eq!(point.latitude, 50.7223);
    }

    #[test]
    fn test_parse_point_rejects_malformed_input() {
        for bad in ["POINT(-1 50)", "POINT(abc def)", "LINESTRING(0.1 0.2)", "", "POINT(-1.1,50.2)"] {
            let err = parse_point(bad).unwrap_err();
            assert_eq!(err, GeometryError::InvalidFormat);
            assert_eq!(err.to_string(), "Invalid format");
        }
    }

    #[test]
    fn test_polygon_wkt() {
        assert_eq!(
            isle_of_wight().to_polygon_wkt(),
            "POLYGON((-1.1835 50.6445, -1.1507 50.6445, -1.1507 50.7261, -1.1835 50.7261, -1.1835 50.6445))"
        );
    }

    #[test]
    fn test_polygon_envelope_matches_original_box() {
        let bbox = isle_of_wight();
        let parsed = BoundingBox::from_polygon_wkt(&bbox.to_polygon_wkt()).unwrap();
        assert_eq!(parsed, bbox);
    }

    #[test]
    fn test_from_polygon_rejects_garbage() {
        assert!(BoundingBox::from_polygon_wkt("POLYGON(())").is_err());
        assert!(BoundingBox::from_polygon_wkt("POINT(1.0 2.0)").is_err());
        assert!(BoundingBox::from_polygon_wkt("POLYGON((1 2 3, 4 5))").is_err());
    }

    #[test]
    fn test_contains() {
        let bbox = isle_of_wight();
        assert!(bbox.contains(&Point { longitude: -1.1834759844410794, latitude: 50.72234886358317 }));
        assert!(bbox.contains(&Point { longitude: -1.1835, latitude: 50.6445 }));
        assert!(!bbox.contains(&Point { longitude: -1.30, latitude: 50.70 }));
    }

    #[test]
    fn test_validate() {
        assert!(isle_of_wight().validate().is_ok());

        let inverted = BoundingBox { min_long: 1.0, max_long: 0.0, min_lat: 0.0, max_lat: 1.0 };
        assert!(inverted.validate().is_err());

        let off_globe = BoundingBox { min_long: 0.0, max_long: 1.0, min_lat: 0.0, max_lat: 91.0 };
        assert!(off_globe.validate().is_err());

        let nan = BoundingBox { min_long: f64::NAN, max_long: 1.0, min_lat: 0.0, max_lat: 1.0 };
        assert!(nan.validate().is_err());
    }
}
