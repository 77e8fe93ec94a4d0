//! Geometry glue over the `geo` crate.
//!
//! Regions, training samples and class polygons are plain `geo` types. This
//! module adds the GeoJSON-like serde form used by configuration and label
//! files, plus the planar and spherical area helpers shared by the raster and
//! vector area estimators.

use geo::{Area, BoundingRect, ChamberlainDuquetteArea};
use serde::{Deserialize, Serialize};

pub use geo::{Coord, LineString, Point, Polygon, Rect};

/// Mean Earth radius in meters (IUGG)
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Axis-aligned rectangle with a counter-clockwise exterior
pub fn rectangle(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Polygon<f64> {
    Polygon::new(
        LineString::from(vec![(min_x, min_y), (max_x, min_y), (max_x, max_y), (min_x, max_y), (min_x, min_y)]),
        Vec::new(),
    )
}

/// Planar area in squared coordinate units, holes removed
pub fn planar_area(polygon: &Polygon<f64>) -> f64 {
    polygon.unsigned_area()
}

/// Spherical area in square meters of a lon/lat polygon, holes removed.
///
/// Rings are measured one at a time so the result does not depend on ring
/// winding. The trapezoid integration is exact for edges along parallels and
/// meridians, which is every edge a pixel-aligned polygon has.
pub fn geodesic_area(polygon: &Polygon<f64>) -> f64 {
    let ring_area = |ring: &LineString<f64>| Polygon::new(ring.clone(), Vec::new()).chamberlain_duquette_unsigned_area();
    polygon
        .interiors()
        .iter()
        .fold(ring_area(polygon.exterior()), |total, hole| total - ring_area(hole))
}

fn open_ring(mut ring: Vec<[f64; 2]>) -> Vec<[f64; 2]> {
    if ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    ring
}

fn polygon_from_rings(rings: Vec<Vec<[f64; 2]>>) -> Result<Polygon<f64>, String> {
    let mut rings = rings.into_iter().map(open_ring);
    let exterior = rings.next().ok_or_else(|| "polygon has no exterior ring".to_string())?;
    if exterior.len() < 3 {
        return Err(format!("polygon exterior needs at least 3 vertices, got {}", exterior.len()));
    }
    Ok(Polygon::new(LineString::from(exterior), rings.map(LineString::from).collect()))
}

/// Serde adapter for a polygon as GeoJSON ring coordinates.
///
/// Rings are written closed. Reading accepts open or closed rings.
pub mod polygon_coords {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(polygon: &Polygon<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        let rings: Vec<Vec<[f64; 2]>> = std::iter::once(polygon.exterior())
            .chain(polygon.interiors())
            .map(|ring| ring.coords().map(|c| [c.x, c.y]).collect())
            .collect();
        rings.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Polygon<f64>, D::Error> {
        let rings = Vec::<Vec<[f64; 2]>>::deserialize(deserializer)?;
        polygon_from_rings(rings).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for a point as a `[x, y]` pair
pub mod point_coords {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(point: &Point<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        [point.x(), point.y()].serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Point<f64>, D::Error> {
        let [x, y] = <[f64; 2]>::deserialize(deserializer)?;
        Ok(Point::new(x, y))
    }
}

/// Sample geometry (GeoJSON-like `{"type": ..., "coordinates": ...}`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(#[serde(with = "point_coords")] Point<f64>),
    Polygon(#[serde(with = "polygon_coords")] Polygon<f64>),
}

impl Geometry {
    pub fn bounds(&self) -> Option<Rect<f64>> {
        match self {
            Geometry::Point(p) => Some(p.bounding_rect()),
            Geometry::Polygon(poly) => poly.bounding_rect(),
        }
    }

    /// Bit-exact key used to detect the same geometry appearing twice
    pub(crate) fn identity_key(&self) -> Vec<u64> {
        fn push_coords<'a>(coords: impl ExactSizeIterator<Item = &'a Coord<f64>>, key: &mut Vec<u64>) {
            key.push(coords.len() as u64);
            for c in coords {
                key.push(c.x.to_bits());
                key.push(c.y.to_bits());
            }
        }

        let mut key = Vec::new();
        match self {
            Geometry::Point(p) => {
                key.push(0);
                push_coords(std::iter::once(&p.0), &mut key);
            }
            Geometry::Polygon(poly) => {
                key.push(1);
                push_coords(poly.exterior().0.iter(), &mut key);
                for hole in poly.interiors() {
                    push_coords(hole.0.iter(), &mut key);
                }
            }
        }
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::Contains;

    #[test]
    fn test_point_in_polygon_with_hole() {
        let hole = rectangle(4.0, 4.0, 6.0, 6.0).exterior().clone();
        let poly = Polygon::new(rectangle(0.0, 0.0, 10.0, 10.0).exterior().clone(), vec![hole]);

        assert!(poly.contains(&Point::new(1.0, 1.0)));
        assert!(!poly.contains(&Point::new(5.0, 5.0)));
        assert!(!poly.contains(&Point::new(11.0, 5.0)));
        assert_relative_eq!(planar_area(&poly), 96.0);
    }

    #[test]
    fn test_rectangle_is_counter_clockwise() {
        let rect = rectangle(0.0, 0.0, 2.0, 3.0);
        assert_relative_eq!(rect.signed_area(), 6.0);
        assert_eq!(rect.exterior().0.len(), 5);
        assert_eq!(rect.bounding_rect().map(|b| b.max()), Some(Coord { x: 2.0, y: 3.0 }));
    }

    #[test]
    fn test_geodesic_area_of_equatorial_cell() {
        // One degree square at the equator is ~12,364 km^2 on the mean sphere
        let cell = rectangle(0.0, 0.0, 1.0, 1.0);
        let expected = EARTH_RADIUS_M.powi(2) * 1f64.to_radians() * 1f64.to_radians().sin();
        assert_relative_eq!(geodesic_area(&cell), expected, max_relative = 5e-3);

        let holed = Polygon::new(cell.exterior().clone(), vec![rectangle(0.25, 0.25, 0.75, 0.75).exterior().clone()]);
        let hole = geodesic_area(&rectangle(0.25, 0.25, 0.75, 0.75));
        assert_relative_eq!(geodesic_area(&holed), geodesic_area(&cell) - hole, max_relative = 1e-12);
    }

    #[test]
    fn test_geometry_json_accepts_closed_rings() {
        let json = r#"{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,1],[0,0]]]}"#;
        let geometry: Geometry = serde_json::from_str(json).unwrap();
        match &geometry {
            Geometry::Polygon(poly) => {
                assert_eq!(poly.exterior().0.len(), 5);
                assert_relative_eq!(planar_area(poly), 1.0);
            }
            other => panic!("unexpected geometry {:?}", other),
        }
        let back: Geometry = serde_json::from_str(&serde_json::to_string(&geometry).unwrap()).unwrap();
        assert_eq!(back, geometry);

        let point: Geometry = serde_json::from_str(r#"{"type":"Point","coordinates":[2.5,-1]}"#).unwrap();
        assert_eq!(point, Geometry::Point(Point::new(2.5, -1.0)));
    }

    #[test]
    fn test_degenerate_polygon_rejected() {
        let json = r#"{"type":"Polygon","coordinates":[[[0,0],[1,0],[0,0]]]}"#;
        assert!(serde_json::from_str::<Geometry>(json).is_err());
    }
}
