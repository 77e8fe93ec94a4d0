use crate::geometry::{geodesic_area, rectangle, Coord, Point, Polygon, Rect, EARTH_RADIUS_M};
use geo::{BoundingRect, Contains, Intersects};
use chrono::{DateTime, NaiveDate, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Real-valued band data; `NaN` marks masked / no-data pixels
pub type Band = Array2<f32>;

/// Discrete class codes per pixel
pub type ClassImage = Array2<u8>;

/// Class code used for masked pixels in a [`ClassRaster`]
pub const CLASS_NODATA: u8 = 255;

/// Coordinate system enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordinateSystem {
    /// Geographic coordinates (longitude, latitude) in degrees, EPSG:4326
    Geographic,
    /// Projected coordinates in meters (e.g., UTM)
    Projected { epsg: u32 },
}

impl CoordinateSystem {
    /// Parse an `EPSG:<code>` identifier
    pub fn from_code(code: &str) -> LandCoverResult<Self> {
        let epsg = code
            .trim()
            .to_uppercase()
            .strip_prefix("EPSG:")
            .and_then(|c| c.parse::<u32>().ok())
            .ok_or_else(|| LandCoverError::InvalidFormat(format!("Invalid CRS code: {}", code)))?;
        Ok(match epsg {
            4326 => CoordinateSystem::Geographic,
            epsg => CoordinateSystem::Projected { epsg },
        })
    }

    /// Coordinate units per ground meter (degrees are measured at the equator)
    pub fn units_per_meter(&self) -> f64 {
        match self {
            CoordinateSystem::Geographic => 360.0 / (2.0 * std::f64::consts::PI * EARTH_RADIUS_M),
            CoordinateSystem::Projected { .. } => 1.0,
        }
    }
}

impl std::fmt::Display for CoordinateSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoordinateSystem::Geographic => write!(f, "EPSG:4326"),
            CoordinateSystem::Projected { epsg } => write!(f, "EPSG:{}", epsg),
        }
    }
}

/// Geospatial transformation parameters (north-up grids have a negative `pixel_height`)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_size: f64) -> Self {
        Self {
            top_left_x,
            pixel_width: pixel_size,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height: -pixel_size,
        }
    }

    /// Map coordinate of a pixel corner; fractional indices are allowed
    pub fn corner(&self, row: f64, col: f64) -> Coord<f64> {
        Coord {
            x: self.top_left_x + col * self.pixel_width + row * self.rotation_x,
            y: self.top_left_y + col * self.rotation_y + row * self.pixel_height,
        }
    }

    /// Map coordinate of a pixel center
    pub fn pixel_center(&self, row: usize, col: usize) -> Point<f64> {
        Point::from(self.corner(row as f64 + 0.5, col as f64 + 0.5))
    }
}

/// Grid geometry shared by every band of a raster
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry {
    pub rows: usize,
    pub cols: usize,
    pub transform: GeoTransform,
    pub crs: CoordinateSystem,
}

impl GridGeometry {
    pub fn new(rows: usize, cols: usize, transform: GeoTransform, crs: CoordinateSystem) -> Self {
        Self { rows, cols, transform, crs }
    }

    /// Smallest north-up grid with the given pixel size covering `bounds`
    pub fn covering(bounds: &Rect<f64>, pixel_size: f64, crs: CoordinateSystem) -> LandCoverResult<Self> {
        if !(pixel_size > 0.0) {
            return Err(LandCoverError::InvalidFormat(format!(
                "Pixel size must be positive, got {}",
                pixel_size
            )));
        }
        let cols = ((bounds.width() / pixel_size) - 1e-9).ceil().max(1.0) as usize;
        let rows = ((bounds.height() / pixel_size) - 1e-9).ceil().max(1.0) as usize;
        Ok(Self::new(
            rows,
            cols,
            GeoTransform::north_up(bounds.min().x, bounds.max().y, pixel_size),
            crs,
        ))
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Absolute pixel size (x, y) in CRS units
    pub fn pixel_size(&self) -> (f64, f64) {
        (self.transform.pixel_width.abs(), self.transform.pixel_height.abs())
    }

    pub fn bounds(&self) -> Rect<f64> {
        let corners = [
            self.transform.corner(0.0, self.cols as f64),
            self.transform.corner(self.rows as f64, 0.0),
            self.transform.corner(self.rows as f64, self.cols as f64),
        ];
        let origin = self.transform.corner(0.0, 0.0);
        let (min, max) = corners.iter().fold((origin, origin), |(min, max), c| {
            (
                Coord { x: min.x.min(c.x), y: min.y.min(c.y) },
                Coord { x: max.x.max(c.x), y: max.y.max(c.y) },
            )
        });
        Rect::new(min, max)
    }

    /// Pixel containing a map coordinate (north-up grids only)
    pub fn pixel_at(&self, p: &Point<f64>) -> Option<(usize, usize)> {
        let col = (p.x() - self.transform.top_left_x) / self.transform.pixel_width;
        let row = (p.y() - self.transform.top_left_y) / self.transform.pixel_height;
        if col < 0.0 || row < 0.0 {
            return None;
        }
        let (row, col) = (row.floor() as usize, col.floor() as usize);
        (row < self.rows && col < self.cols).then_some((row, col))
    }

    /// Inclusive pixel index window `(row_lo, row_hi, col_lo, col_hi)` covering a
    /// bounding box, clamped to the grid; `None` if the box misses the grid
    pub fn pixel_window(&self, bbox: &Rect<f64>) -> Option<(usize, usize, usize, usize)> {
        if self.rows == 0 || self.cols == 0 || !self.bounds().intersects(bbox) {
            return None;
        }
        let t = &self.transform;
        let index = |value: f64, limit: usize| {
            (value.floor().max(0.0) as usize).min(limit - 1)
        };
        let (min, max) = (bbox.min(), bbox.max());
        let col_a = index((min.x - t.top_left_x) / t.pixel_width, self.cols);
        let col_b = index((max.x - t.top_left_x) / t.pixel_width, self.cols);
        let row_a = index((max.y - t.top_left_y) / t.pixel_height, self.rows);
        let row_b = index((min.y - t.top_left_y) / t.pixel_height, self.rows);
        Some((row_a.min(row_b), row_a.max(row_b), col_a.min(col_b), col_a.max(col_b)))
    }

    /// Same extent, resolution and projection, within floating point tolerance
    pub fn matches(&self, other: &GridGeometry) -> bool {
        let close = |a: f64, b: f64| (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0);
        let (t, o) = (&self.transform, &other.transform);
        self.rows == other.rows
            && self.cols == other.cols
            && self.crs == other.crs
            && close(t.top_left_x, o.top_left_x)
            && close(t.top_left_y, o.top_left_y)
            && close(t.pixel_width, o.pixel_width)
            && close(t.pixel_height, o.pixel_height)
            && close(t.rotation_x, o.rotation_x)
            && close(t.rotation_y, o.rotation_y)
    }

    /// Ground area of one pixel in the given row, in square meters.
    ///
    /// Projected grids have constant pixel area. Geographic pixels use the same
    /// spherical polygon area as the vector estimator, so a pixel-aligned
    /// polygon and its pixels measure alike.
    pub fn pixel_area_m2(&self, row: usize) -> f64 {
        let (width, height) = self.pixel_size();
        match self.crs {
            CoordinateSystem::Projected { .. } => width * height,
            CoordinateSystem::Geographic => {
                let (a, b) = (self.transform.corner(row as f64, 0.0), self.transform.corner(row as f64 + 1.0, 0.0));
                geodesic_area(&rectangle(a.x, a.y.min(b.y), a.x + width, a.y.max(b.y)))
            }
        }
    }
}

/// Region of interest bounding every operation of a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    #[serde(with = "crate::geometry::polygon_coords")]
    pub polygon: Polygon<f64>,
    pub crs: CoordinateSystem,
}

impl Region {
    pub fn new(polygon: Polygon<f64>, crs: CoordinateSystem) -> Self {
        Self { polygon, crs }
    }

    pub fn contains(&self, p: &Point<f64>) -> bool {
        self.polygon.contains(p)
    }

    pub fn bounds(&self) -> LandCoverResult<Rect<f64>> {
        self.polygon
            .bounding_rect()
            .ok_or_else(|| LandCoverError::InvalidFormat("Region polygon is empty".to_string()))
    }
}

/// Half-open date range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> LandCoverResult<Self> {
        if end <= start {
            return Err(LandCoverError::InvalidFormat(format!(
                "Date window end {} must be after start {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse `YYYY-MM-DD` dates
    pub fn parse(start: &str, end: &str) -> LandCoverResult<Self> {
        let parse = |s: &str| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|e| LandCoverError::InvalidFormat(format!("Invalid date '{}': {}", s, e)))
        };
        Self::new(parse(start)?, parse(end)?)
    }

    pub fn contains(&self, time: &DateTime<Utc>) -> bool {
        let date = time.date_naive();
        date >= self.start && date < self.end
    }
}

impl std::fmt::Display for DateWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Point of the hydrological cycle a composite represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Season {
    HighWater,
    LowWater,
}

impl std::fmt::Display for Season {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Season::HighWater => write!(f, "high-water"),
            Season::LowWater => write!(f, "low-water"),
        }
    }
}

/// Land-cover classes and their raster codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LandCoverClass {
    Land = 0,
    Water = 1,
    Humid = 2,
}

impl LandCoverClass {
    pub const ALL: [LandCoverClass; 3] = [LandCoverClass::Land, LandCoverClass::Water, LandCoverClass::Humid];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(LandCoverClass::Land),
            1 => Some(LandCoverClass::Water),
            2 => Some(LandCoverClass::Humid),
            _ => None,
        }
    }
}

impl std::fmt::Display for LandCoverClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LandCoverClass::Land => write!(f, "land"),
            LandCoverClass::Water => write!(f, "water"),
            LandCoverClass::Humid => write!(f, "humid"),
        }
    }
}

/// A named band
#[derive(Debug, Clone)]
pub struct NamedBand {
    pub name: String,
    pub data: Band,
}

/// Multi-band raster; every band shares the grid
#[derive(Debug, Clone)]
pub struct Raster {
    pub grid: GridGeometry,
    bands: Vec<NamedBand>,
    /// Number of source observations reduced into this raster
    pub observation_count: usize,
}

impl Raster {
    pub fn new(grid: GridGeometry, observation_count: usize) -> Self {
        Self { grid, bands: Vec::new(), observation_count }
    }

    /// Append a band, rejecting duplicate names and foreign shapes
    pub fn add_band(&mut self, name: impl Into<String>, data: Band) -> LandCoverResult<()> {
        let name = name.into();
        if data.dim() != self.grid.shape() {
            return Err(LandCoverError::GridMismatch(format!(
                "Band '{}' has shape {:?}, raster grid is {:?}",
                name,
                data.dim(),
                self.grid.shape()
            )));
        }
        if self.bands.iter().any(|b| b.name == name) {
            return Err(LandCoverError::InvalidFormat(format!("Duplicate band '{}'", name)));
        }
        self.bands.push(NamedBand { name, data });
        Ok(())
    }

    pub fn with_band(mut self, name: impl Into<String>, data: Band) -> LandCoverResult<Self> {
        self.add_band(name, data)?;
        Ok(self)
    }

    pub fn band(&self, name: &str) -> LandCoverResult<&Band> {
        self.bands
            .iter()
            .find(|b| b.name == name)
            .map(|b| &b.data)
            .ok_or_else(|| LandCoverError::MissingBand(name.to_string()))
    }

    pub fn bands(&self) -> &[NamedBand] {
        &self.bands
    }

    pub fn band_names(&self) -> Vec<&str> {
        self.bands.iter().map(|b| b.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// New raster holding only `names`, in that order
    pub fn select(&self, names: &[&str]) -> LandCoverResult<Raster> {
        let mut out = Raster::new(self.grid, self.observation_count);
        for name in names {
            out.add_band(*name, self.band(name)?.clone())?;
        }
        Ok(out)
    }

    /// Single-band selection under a new name
    pub fn select_as(&self, name: &str, new_name: &str) -> LandCoverResult<Raster> {
        let mut out = Raster::new(self.grid, self.observation_count);
        out.add_band(new_name, self.band(name)?.clone())?;
        Ok(out)
    }
}

/// Single-band discrete class raster
#[derive(Debug, Clone, PartialEq)]
pub struct ClassRaster {
    pub grid: GridGeometry,
    pub classes: ClassImage,
    /// Pixels left as [`CLASS_NODATA`] because a predictor was masked
    pub masked_pixels: usize,
    /// Fingerprint of the model that produced the raster
    pub model_fingerprint: u64,
}

impl ClassRaster {
    pub fn class_at(&self, row: usize, col: usize) -> Option<LandCoverClass> {
        LandCoverClass::from_code(self.classes[[row, col]])
    }

    pub fn count(&self, class: LandCoverClass) -> usize {
        self.classes.iter().filter(|&&c| c == class.code()).count()
    }

    /// Binary mask of one class
    pub fn mask(&self, class: LandCoverClass) -> Array2<bool> {
        self.classes.mapv(|c| c == class.code())
    }
}

/// Error types for land-cover processing
#[derive(Debug, thiserror::Error)]
pub enum LandCoverError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Empty composite: no qualifying observations in '{collection}' for {window}")]
    EmptyComposite { collection: String, window: String },

    #[error("Grid mismatch: {0}")]
    GridMismatch(String),

    #[error("Missing band: {0}")]
    MissingBand(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Unsupported request: {0}")]
    Unsupported(String),
}

/// Result type for land-cover operations
pub type LandCoverResult<T> = Result<T, LandCoverError>;
