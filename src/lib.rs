//! varzea: floodplain land-cover classification
//!
//! Classifies a region of interest into open water, dry land and humid
//! (seasonally flooded) land at high and low water. Radar backscatter, optical
//! reflectance, a water index, elevation and canopy height are composited per
//! season, a Random Forest trained on high-water samples is applied to both
//! seasons, the class maps are smoothed and vectorized, and class areas are
//! reported from both the rasters and the polygons.

pub mod types;
pub mod geometry;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    Band, ClassImage, ClassRaster, CoordinateSystem, DateWindow, GeoTransform, GridGeometry,
    LandCoverClass, LandCoverError, LandCoverResult, Raster, Region, Season, CLASS_NODATA,
};

pub use geometry::{rectangle, Geometry, Point, Polygon, Rect};

pub use io::{read_labeled_sets, InMemorySource, LabeledGeometrySets, RasterSource, Scene};

pub use crate::core::{
    AreaMethod, AreaMismatchWarning, AreaRecord, FloodplainPipeline, PipelineConfig, PipelineOutput,
};
