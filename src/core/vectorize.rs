//! Raster to polygon conversion for class masks.
//!
//! Foreground pixels are grouped into 8-connected components. The boundary of
//! each component is traced along pixel edges on the integer corner lattice,
//! keeping the component on the right-hand side of every edge, so exteriors and
//! holes come out with opposite orientation. Rings are then oriented in map
//! coordinates: exteriors counter-clockwise, holes clockwise. Where two foreground pixels touch
//! only at a corner the tracer turns towards them, which keeps diagonal
//! neighbours inside one ring and matches the 8-connected labeling.

use crate::geometry::{Coord, LineString, Polygon};
use geo::orient::{Direction as Winding, Orient};
use geo::{Area, BoundingRect, Contains};
use crate::types::{ClassRaster, GridGeometry, LandCoverClass};
use ndarray::Array2;
use std::collections::{HashMap, HashSet, VecDeque};

/// One connected region of a class
#[derive(Debug, Clone, PartialEq)]
pub struct ClassPolygon {
    pub polygon: Polygon<f64>,
    /// Raster pixels the polygon was traced from
    pub pixel_count: usize,
}

/// All polygons of one class, in the grid's CRS
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonCollection {
    pub class: LandCoverClass,
    pub grid: GridGeometry,
    pub polygons: Vec<ClassPolygon>,
}

impl PolygonCollection {
    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    pub fn pixel_count(&self) -> usize {
        self.polygons.iter().map(|p| p.pixel_count).sum()
    }

    pub fn hole_count(&self) -> usize {
        self.polygons.iter().map(|p| p.polygon.interiors().len()).sum()
    }
}

/// Polygon collections of every class
#[derive(Debug, Clone, PartialEq)]
pub struct ClassVectorSet {
    pub collections: Vec<PolygonCollection>,
}

impl ClassVectorSet {
    pub fn get(&self, class: LandCoverClass) -> Option<&PolygonCollection> {
        self.collections.iter().find(|c| c.class == class)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Direction {
    East,
    South,
    West,
    North,
}

impl Direction {
    /// Step on the corner lattice, x to the right and y down
    fn step(self) -> (i64, i64) {
        match self {
            Direction::East => (1, 0),
            Direction::South => (0, 1),
            Direction::West => (-1, 0),
            Direction::North => (0, -1),
        }
    }

    fn left(self) -> Self {
        match self {
            Direction::East => Direction::North,
            Direction::North => Direction::West,
            Direction::West => Direction::South,
            Direction::South => Direction::East,
        }
    }

    fn right(self) -> Self {
        match self {
            Direction::East => Direction::South,
            Direction::South => Direction::West,
            Direction::West => Direction::North,
            Direction::North => Direction::East,
        }
    }
}

type Vertex = (i64, i64);
type Edge = (Vertex, Direction);

/// Converts class masks into polygon collections
#[derive(Debug, Clone, Copy, Default)]
pub struct Vectorizer;

impl Vectorizer {
    pub fn new() -> Self {
        Self
    }

    /// Polygons of every 8-connected region of `class`; all other pixels,
    /// including masked ones, are background
    pub fn vectorize(&self, raster: &ClassRaster, class: LandCoverClass) -> PolygonCollection {
        let mask = raster.mask(class);
        let polygons = vectorize_mask(&mask, &raster.grid);
        let collection = PolygonCollection { class, grid: raster.grid, polygons };
        log::info!(
            "Vectorized '{}': {} polygons ({} holes) from {} pixels",
            class,
            collection.len(),
            collection.hole_count(),
            collection.pixel_count()
        );
        collection
    }

    pub fn vectorize_all(&self, raster: &ClassRaster) -> ClassVectorSet {
        ClassVectorSet {
            collections: LandCoverClass::ALL
                .iter()
                .map(|&class| self.vectorize(raster, class))
                .collect(),
        }
    }
}

/// Polygons of the true pixels of a mask laid on `grid`
pub fn vectorize_mask(mask: &Array2<bool>, grid: &GridGeometry) -> Vec<ClassPolygon> {
    let (labels, components) = label_components(mask);
    let t = &grid.transform;
    let to_world = |ring: &[Vertex]| -> LineString<f64> {
        ring.iter()
            .map(|&(x, y)| t.corner(y as f64, x as f64))
            .collect::<Vec<Coord<f64>>>()
            .into()
    };
    let oriented = |exterior: LineString<f64>, holes: Vec<LineString<f64>>| {
        Polygon::new(exterior, holes).orient(Winding::Default)
    };

    let mut polygons = Vec::with_capacity(components.len());
    for (index, pixels) in components.iter().enumerate() {
        let label = index as u32 + 1;
        let rings = trace_component(&labels, label, pixels);

        let mut exteriors = Vec::new();
        let mut holes = Vec::new();
        for ring in rings {
            let lattice: Vec<Coord<f64>> = ring.iter().map(|&(x, y)| Coord { x: x as f64, y: y as f64 }).collect();
            // y-down lattice: the component lies right of every edge, so
            // exteriors have positive shoelace area
            let area = Polygon::new(LineString::from(lattice), Vec::new()).signed_area();
            if area > 0.0 {
                exteriors.push((area, ring));
            } else if area < 0.0 {
                holes.push(to_world(&ring));
            }
        }
        exteriors.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        if exteriors.len() > 1 {
            log::warn!(
                "Component {} traced to {} exterior rings; extra rings kept as separate polygons",
                label,
                exteriors.len()
            );
        }

        let mut exteriors = exteriors.into_iter();
        if let Some((_, ring)) = exteriors.next() {
            polygons.push(ClassPolygon {
                polygon: oriented(to_world(&ring), std::mem::take(&mut holes)),
                pixel_count: pixels.len(),
            });
        }
        for (area, ring) in exteriors {
            polygons.push(ClassPolygon {
                polygon: oriented(to_world(&ring), Vec::new()),
                pixel_count: area.round() as usize,
            });
        }
    }
    polygons
}

/// 8-connected component labels (0 = background) plus the pixels of each
/// component, in scan order of their first pixel
fn label_components(mask: &Array2<bool>) -> (Array2<u32>, Vec<Vec<(usize, usize)>>) {
    let (rows, cols) = mask.dim();
    let mut labels = Array2::<u32>::zeros((rows, cols));
    let mut components = Vec::new();
    let mut queue = VecDeque::new();

    for row in 0..rows {
        for col in 0..cols {
            if !mask[[row, col]] || labels[[row, col]] != 0 {
                continue;
            }
            let label = components.len() as u32 + 1;
            let mut pixels = Vec::new();
            labels[[row, col]] = label;
            queue.push_back((row, col));

            while let Some((r, c)) = queue.pop_front() {
                pixels.push((r, c));
                for dr in -1i64..=1 {
                    for dc in -1i64..=1 {
                        if dr == 0 && dc == 0 {
                            continue;
                        }
                        let (nr, nc) = (r as i64 + dr, c as i64 + dc);
                        if nr < 0 || nc < 0 || nr >= rows as i64 || nc >= cols as i64 {
                            continue;
                        }
                        let (nr, nc) = (nr as usize, nc as usize);
                        if mask[[nr, nc]] && labels[[nr, nc]] == 0 {
                            labels[[nr, nc]] = label;
                            queue.push_back((nr, nc));
                        }
                    }
                }
            }
            components.push(pixels);
        }
    }
    (labels, components)
}

/// Boundary rings of one component on the corner lattice, collinear vertices removed
fn trace_component(labels: &Array2<u32>, label: u32, pixels: &[(usize, usize)]) -> Vec<Vec<Vertex>> {
    let (rows, cols) = labels.dim();
    let member = |r: i64, c: i64| {
        r >= 0 && c >= 0 && r < rows as i64 && c < cols as i64 && labels[[r as usize, c as usize]] == label
    };

    let mut edges: Vec<Edge> = Vec::new();
    for &(row, col) in pixels {
        let (r, c) = (row as i64, col as i64);
        if !member(r - 1, c) {
            edges.push(((c, r), Direction::East));
        }
        if !member(r, c + 1) {
            edges.push(((c + 1, r), Direction::South));
        }
        if !member(r + 1, c) {
            edges.push(((c + 1, r + 1), Direction::West));
        }
        if !member(r, c - 1) {
            edges.push(((c, r + 1), Direction::North));
        }
    }

    let mut outgoing: HashMap<Vertex, Vec<Direction>> = HashMap::with_capacity(edges.len());
    for &(vertex, direction) in &edges {
        outgoing.entry(vertex).or_default().push(direction);
    }

    let mut visited: HashSet<Edge> = HashSet::with_capacity(edges.len());
    let mut rings = Vec::new();
    for &start in &edges {
        if visited.contains(&start) {
            continue;
        }
        let mut ring: Vec<Edge> = Vec::new();
        let (mut vertex, mut direction) = start;
        loop {
            visited.insert((vertex, direction));
            ring.push((vertex, direction));
            let (dx, dy) = direction.step();
            let next = (vertex.0 + dx, vertex.1 + dy);
            let candidates = outgoing.get(&next).map(Vec::as_slice).unwrap_or(&[]);
            let turn = [direction.left(), direction, direction.right()]
                .into_iter()
                .find(|d| candidates.contains(d));
            match turn {
                Some(d) => {
                    vertex = next;
                    direction = d;
                }
                None => {
                    log::warn!("Open boundary at lattice vertex {:?} of component {}", next, label);
                    break;
                }
            }
            if (vertex, direction) == start || ring.len() > edges.len() {
                break;
            }
        }

        // Keep only the corners where the direction changes
        let n = ring.len();
        let corners: Vec<Vertex> = (0..n)
            .filter(|&i| ring[(i + n - 1) % n].1 != ring[i].1)
            .map(|i| ring[i].0)
            .collect();
        if corners.len() >= 4 {
            rings.push(corners);
        }
    }
    rings
}

/// Burn a polygon collection back onto a grid: a pixel is set when its center
/// lies inside any polygon
pub fn rasterize(collection: &PolygonCollection, grid: &GridGeometry) -> Array2<bool> {
    let mut mask = Array2::from_elem(grid.shape(), false);
    for class_polygon in &collection.polygons {
        let polygon = &class_polygon.polygon;
        let window = polygon.bounding_rect().and_then(|bounds| grid.pixel_window(&bounds));
        let (row_lo, row_hi, col_lo, col_hi) = match window {
            Some(window) => window,
            None => continue,
        };
        for row in row_lo..=row_hi {
            for col in col_lo..=col_hi {
                if !mask[[row, col]] && polygon.contains(&grid.transform.pixel_center(row, col)) {
                    mask[[row, col]] = true;
                }
            }
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::planar_area;
    use crate::types::{CoordinateSystem, GeoTransform, CLASS_NODATA};
    use approx::assert_relative_eq;
    use ndarray::array;

    fn raster(classes: Array2<u8>, pixel: f64) -> ClassRaster {
        let (rows, cols) = classes.dim();
        ClassRaster {
            grid: GridGeometry::new(
                rows,
                cols,
                GeoTransform::north_up(1000.0, 2000.0, pixel),
                CoordinateSystem::Projected { epsg: 32721 },
            ),
            classes,
            masked_pixels: 0,
            model_fingerprint: 7,
        }
    }

    #[test]
    fn test_single_block_is_rectangle() {
        let mut classes = Array2::from_elem((5, 6), 0u8);
        for r in 1..4 {
            for c in 2..5 {
                classes[[r, c]] = 1;
            }
        }
        let raster = raster(classes, 10.0);
        let water = Vectorizer::new().vectorize(&raster, LandCoverClass::Water);

        assert_eq!(water.len(), 1);
        let polygon = &water.polygons[0].polygon;
        // four corners plus the closing vertex
        assert_eq!(polygon.exterior().0.len(), 5);
        assert!(polygon.interiors().is_empty());
        assert_relative_eq!(planar_area(polygon), 900.0);
        // counter-clockwise in map coordinates
        assert!(polygon.signed_area() > 0.0);
        let bounds = polygon.bounding_rect().unwrap();
        assert_relative_eq!(bounds.min().x, 1020.0);
        assert_relative_eq!(bounds.max().x, 1050.0);
        assert_relative_eq!(bounds.min().y, 1960.0);
        assert_relative_eq!(bounds.max().y, 1990.0);
    }

    #[test]
    fn test_ring_with_hole() {
        let classes = array![
            [1, 1, 1, 1],
            [1, 0, 0, 1],
            [1, 0, 0, 1],
            [1, 1, 1, 1]
        ];
        let raster = raster(classes, 1.0);
        let water = Vectorizer::new().vectorize(&raster, LandCoverClass::Water);
        assert_eq!(water.len(), 1);
        assert_eq!(water.hole_count(), 1);
        let polygon = &water.polygons[0].polygon;
        assert_relative_eq!(planar_area(polygon), 12.0);
        let hole = Polygon::new(polygon.interiors()[0].clone(), Vec::new());
        assert!(hole.signed_area() < 0.0);

        let land = Vectorizer::new().vectorize(&raster, LandCoverClass::Land);
        assert_eq!(land.len(), 1);
        assert_relative_eq!(land.polygons[0].polygon.unsigned_area(), 4.0);
    }

    #[test]
    fn test_diagonal_neighbours_form_one_region() {
        let classes = array![[1, 0, 0], [0, 1, 0], [0, 0, 1]];
        let raster = raster(classes, 1.0);
        let water = Vectorizer::new().vectorize(&raster, LandCoverClass::Water);
        assert_eq!(water.len(), 1);
        assert_eq!(water.polygons[0].pixel_count, 3);
        assert_relative_eq!(water.polygons[0].polygon.unsigned_area(), 3.0);

        // the two land triangles also touch diagonally across the water line
        let land = Vectorizer::new().vectorize(&raster, LandCoverClass::Land);
        assert_eq!(land.len(), 1);
        assert_eq!(land.pixel_count(), 6);
        assert_relative_eq!(land.polygons[0].polygon.unsigned_area(), 6.0);
        assert_eq!(rasterize(&land, &raster.grid), raster.mask(LandCoverClass::Land));
    }

    #[test]
    fn test_notched_ring_keeps_hole_separate() {
        // corner pixel missing: the center gap touches the outside only diagonally
        let classes = array![[0, 1, 1], [1, 0, 1], [1, 1, 1]];
        let raster = raster(classes, 1.0);
        let water = Vectorizer::new().vectorize(&raster, LandCoverClass::Water);
        assert_eq!(water.len(), 1);
        assert_eq!(water.hole_count(), 1);
        assert_relative_eq!(water.polygons[0].polygon.unsigned_area(), 7.0);
    }

    #[test]
    fn test_round_trip_reproduces_mask() {
        let classes = Array2::from_shape_fn((12, 15), |(r, c)| {
            if (r * 7 + c * 3) % 11 < 3 {
                1
            } else if (r + c) % 5 == 0 {
                2
            } else if r == 6 && c == 6 {
                CLASS_NODATA
            } else {
                0
            }
        });
        let raster = raster(classes, 30.0);
        let vectors = Vectorizer::new().vectorize_all(&raster);
        assert_eq!(vectors.collections.len(), 3);

        let mut covered = 0;
        for class in LandCoverClass::ALL {
            let collection = vectors.get(class).unwrap();
            let burned = rasterize(collection, &raster.grid);
            assert_eq!(burned, raster.mask(class), "class {}", class);
            assert_eq!(collection.pixel_count(), raster.count(class));
            let area: f64 = collection.polygons.iter().map(|p| p.polygon.unsigned_area()).sum();
            assert_relative_eq!(area, raster.count(class) as f64 * 900.0, max_relative = 1e-9);
            covered += collection.pixel_count();
        }
        assert_eq!(covered, 12 * 15 - 1);
    }

    #[test]
    fn test_south_up_grid_keeps_exterior_counter_clockwise() {
        let mut raster = raster(array![[1, 1], [1, 0]], 1.0);
        raster.grid.transform.pixel_height = 1.0;
        let water = Vectorizer::new().vectorize(&raster, LandCoverClass::Water);
        assert_eq!(water.len(), 1);
        assert!(water.polygons[0].polygon.signed_area() > 0.0);
        assert_relative_eq!(planar_area(&water.polygons[0].polygon), 3.0);
    }

    #[test]
    fn test_empty_class_has_no_polygons() {
        let raster = raster(Array2::from_elem((3, 3), 0u8), 1.0);
        let humid = Vectorizer::new().vectorize(&raster, LandCoverClass::Humid);
        assert!(humid.is_empty());
        assert!(!rasterize(&humid, &raster.grid).iter().any(|&b| b));
    }
}
