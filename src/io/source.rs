//! Raster access capability consumed by the composite builder.
//!
//! Archive access, temporal reduction and clipping are delegated to whatever
//! implements [`RasterSource`]; the processing core only describes what it needs.

use crate::types::{CoordinateSystem, DateWindow, LandCoverResult, Raster, Region};
use serde::{Deserialize, Serialize};

/// Scene metadata property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Number(f64),
    Text(String),
    List(Vec<String>),
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::Text(s.to_string())
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Number(v)
    }
}

impl From<Vec<&str>> for PropertyValue {
    fn from(v: Vec<&str>) -> Self {
        PropertyValue::List(v.into_iter().map(str::to_string).collect())
    }
}

/// Attribute predicate evaluated against scene metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeFilter {
    /// Property equals a text value
    Equals { property: String, value: String },
    /// List property contains a value
    ListContains { property: String, value: String },
    /// Numeric property strictly below a threshold
    LessThan { property: String, value: f64 },
}

impl AttributeFilter {
    pub fn equals(property: &str, value: &str) -> Self {
        AttributeFilter::Equals { property: property.to_string(), value: value.to_string() }
    }

    pub fn list_contains(property: &str, value: &str) -> Self {
        AttributeFilter::ListContains { property: property.to_string(), value: value.to_string() }
    }

    pub fn less_than(property: &str, value: f64) -> Self {
        AttributeFilter::LessThan { property: property.to_string(), value }
    }

    /// Missing properties never match
    pub fn matches(&self, property: Option<&PropertyValue>) -> bool {
        match (self, property) {
            (AttributeFilter::Equals { value, .. }, Some(PropertyValue::Text(text))) => text == value,
            (AttributeFilter::ListContains { value, .. }, Some(PropertyValue::List(items))) => {
                items.iter().any(|item| item == value)
            }
            (AttributeFilter::LessThan { value, .. }, Some(PropertyValue::Number(n))) => n < value,
            _ => false,
        }
    }

    pub fn property(&self) -> &str {
        match self {
            AttributeFilter::Equals { property, .. }
            | AttributeFilter::ListContains { property, .. }
            | AttributeFilter::LessThan { property, .. } => property,
        }
    }
}

/// Temporal reduction applied per pixel and per band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReduceOp {
    /// Per-pixel median of valid observations
    Median,
    /// First valid observation in collection order
    Mosaic,
}

/// A composite query: filter a collection, reduce it, resample and clip
#[derive(Debug, Clone)]
pub struct CompositeRequest {
    pub collection: String,
    pub filters: Vec<AttributeFilter>,
    /// `None` for static collections
    pub window: Option<DateWindow>,
    pub region: Region,
    pub reduce: ReduceOp,
    /// Bands to keep after reduction
    pub bands: Vec<String>,
    /// Output pixel size in ground meters; `None` keeps the native resolution
    pub resolution_m: Option<f64>,
    /// Output coordinate system; `None` keeps the native one
    pub crs: Option<CoordinateSystem>,
}

impl CompositeRequest {
    pub fn new(collection: &str, region: &Region, reduce: ReduceOp) -> Self {
        Self {
            collection: collection.to_string(),
            filters: Vec::new(),
            window: None,
            region: region.clone(),
            reduce,
            bands: Vec::new(),
            resolution_m: None,
            crs: None,
        }
    }

    pub fn filter(mut self, filter: AttributeFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn window(mut self, window: DateWindow) -> Self {
        self.window = Some(window);
        self
    }

    pub fn bands(mut self, bands: &[&str]) -> Self {
        self.bands = bands.iter().map(|b| b.to_string()).collect();
        self
    }

    pub fn grid(mut self, resolution_m: f64, crs: CoordinateSystem) -> Self {
        self.resolution_m = Some(resolution_m);
        self.crs = Some(crs);
        self
    }

    /// Human-readable window label for diagnostics
    pub fn window_label(&self) -> String {
        self.window
            .map(|w| w.to_string())
            .unwrap_or_else(|| "static collection".to_string())
    }
}

/// Data-access capability returning reduced, clipped rasters.
///
/// Implementations must be idempotent and side-effect free: the same request
/// returns the same raster. A request matching no observations returns a raster
/// with `observation_count == 0` and no bands.
pub trait RasterSource: Send + Sync {
    fn query_composite(&self, request: &CompositeRequest) -> LandCoverResult<Raster>;
}

impl<S: RasterSource + ?Sized> RasterSource for &S {
    fn query_composite(&self, request: &CompositeRequest) -> LandCoverResult<Raster> {
        (**self).query_composite(request)
    }
}
