use crate::io::source::{AttributeFilter, CompositeRequest, RasterSource, ReduceOp};
use crate::types::{
    Band, CoordinateSystem, DateWindow, GridGeometry, LandCoverError, LandCoverResult, Raster, Region,
};
use ndarray::Zip;
use serde::{Deserialize, Serialize};

pub const BAND_VH: &str = "VH";
pub const BAND_BLUE: &str = "B2";
pub const BAND_GREEN: &str = "B3";
pub const BAND_RED: &str = "B4";
pub const BAND_NIR: &str = "B8";
pub const BAND_NDWI: &str = "NDWI";
pub const BAND_ELEVATION: &str = "elevation";
pub const BAND_CANOPY_HEIGHT: &str = "canopy_height";

/// Feature stack band order
pub const FEATURE_BANDS: [&str; 8] = [
    BAND_VH,
    BAND_BLUE,
    BAND_GREEN,
    BAND_RED,
    BAND_NIR,
    BAND_NDWI,
    BAND_ELEVATION,
    BAND_CANOPY_HEIGHT,
];

/// Source collections and filters for composite building
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeParams {
    pub radar_collection: String,
    pub optical_collection: String,
    pub elevation_collection: String,
    pub canopy_collection: String,
    /// Required instrument mode (Interferometric Wide swath)
    pub instrument_mode: String,
    /// Polarisation that must be available and is kept
    pub polarization: String,
    pub orbit_pass: String,
    /// Optical scenes must be strictly below this cloud percentage
    pub max_cloud_percentage: f64,
    pub elevation_band: String,
    pub canopy_band: String,
    /// Reference grid resolution in ground meters
    pub resolution_m: f64,
    /// Reference grid CRS code
    pub crs: String,
}

impl Default for CompositeParams {
    fn default() -> Self {
        Self {
            radar_collection: "COPERNICUS/S1_GRD".to_string(),
            optical_collection: "COPERNICUS/S2_SR_HARMONIZED".to_string(),
            elevation_collection: "COPERNICUS/DEM/GLO30".to_string(),
            canopy_collection: "projects/sat-io/open-datasets/GLAD/GEDI_V27".to_string(),
            instrument_mode: "IW".to_string(),
            polarization: BAND_VH.to_string(),
            orbit_pass: "DESCENDING".to_string(),
            max_cloud_percentage: 15.0,
            elevation_band: "DEM".to_string(),
            canopy_band: "b1".to_string(),
            resolution_m: 60.0,
            crs: "EPSG:4326".to_string(),
        }
    }
}

/// Elevation and canopy height, built once per run and shared by both windows
#[derive(Debug, Clone)]
pub struct StaticLayers {
    pub elevation: Raster,
    pub canopy_height: Raster,
}

/// Eight-band feature raster for one time window
#[derive(Debug, Clone)]
pub struct FeatureStack {
    pub window: DateWindow,
    raster: Raster,
    pub radar_observations: usize,
    pub optical_observations: usize,
}

impl FeatureStack {
    /// Wrap a raster carrying exactly [`FEATURE_BANDS`] in order.
    ///
    /// Observation counts stay zero unless the stack came from [`CompositeBuilder`].
    pub fn from_raster(window: DateWindow, raster: Raster) -> LandCoverResult<Self> {
        let names = raster.band_names();
        if names != FEATURE_BANDS {
            return Err(LandCoverError::InvalidFormat(format!(
                "Feature stack bands {:?} differ from {:?}",
                names, FEATURE_BANDS
            )));
        }
        Ok(Self {
            window,
            raster,
            radar_observations: 0,
            optical_observations: 0,
        })
    }

    pub fn grid(&self) -> &GridGeometry {
        &self.raster.grid
    }

    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    pub fn band(&self, name: &str) -> LandCoverResult<&Band> {
        self.raster.band(name)
    }

    pub fn band_names(&self) -> Vec<&str> {
        self.raster.band_names()
    }

    /// Feature vector of one pixel, `None` if any band is masked
    pub fn features_at(&self, row: usize, col: usize) -> Option<[f32; 8]> {
        let mut out = [0.0f32; 8];
        for (slot, band) in out.iter_mut().zip(self.raster.bands()) {
            let value = band.data[[row, col]];
            if !value.is_finite() {
                return None;
            }
            *slot = value;
        }
        Some(out)
    }
}

/// Normalized difference `(a - b) / (a + b)`.
///
/// Masked where either input is masked, where the denominator is zero, and where
/// the result falls outside [-1, 1] (negative reflectance).
pub fn normalized_difference(a: &Band, b: &Band) -> Band {
    let mut out = Band::from_elem(a.dim(), f32::NAN);
    Zip::from(&mut out).and(a).and(b).for_each(|o, &a, &b| {
        let sum = a + b;
        if a.is_finite() && b.is_finite() && sum != 0.0 {
            let value = (a - b) / sum;
            if (-1.0..=1.0).contains(&value) {
                *o = value;
            }
        }
    });
    out
}

/// Builds per-window feature stacks from a raster source
pub struct CompositeBuilder<'a, S: RasterSource + ?Sized> {
    source: &'a S,
    region: &'a Region,
    params: &'a CompositeParams,
    crs: CoordinateSystem,
}

impl<'a, S: RasterSource + ?Sized> CompositeBuilder<'a, S> {
    pub fn new(source: &'a S, region: &'a Region, params: &'a CompositeParams) -> LandCoverResult<Self> {
        let crs = CoordinateSystem::from_code(&params.crs)?;
        Ok(Self { source, region, params, crs })
    }

    fn query(&self, request: CompositeRequest) -> LandCoverResult<Raster> {
        let request = request.grid(self.params.resolution_m, self.crs);
        let raster = self.source.query_composite(&request)?;
        if raster.observation_count == 0 {
            log::warn!(
                "No qualifying observations in '{}' for {}",
                request.collection,
                request.window_label()
            );
            return Err(LandCoverError::EmptyComposite {
                collection: request.collection.clone(),
                window: request.window_label(),
            });
        }
        log::info!(
            "Collection '{}' ({}): {} observations reduced",
            request.collection,
            request.window_label(),
            raster.observation_count
        );
        Ok(raster)
    }

    /// Median VH backscatter of descending IW acquisitions
    pub fn radar_composite(&self, window: DateWindow) -> LandCoverResult<Raster> {
        let p = self.params;
        let request = CompositeRequest::new(&p.radar_collection, self.region, ReduceOp::Median)
            .window(window)
            .filter(AttributeFilter::equals("instrumentMode", &p.instrument_mode))
            .filter(AttributeFilter::list_contains(
                "transmitterReceiverPolarisation",
                &p.polarization,
            ))
            .filter(AttributeFilter::equals("orbitProperties_pass", &p.orbit_pass))
            .bands(&[p.polarization.as_str()]);
        self.query(request)?.select_as(&p.polarization, BAND_VH)
    }

    /// Median blue, green, red and near-infrared reflectance of low-cloud scenes
    pub fn optical_composite(&self, window: DateWindow) -> LandCoverResult<Raster> {
        let p = self.params;
        let bands = [BAND_BLUE, BAND_GREEN, BAND_RED, BAND_NIR];
        let request = CompositeRequest::new(&p.optical_collection, self.region, ReduceOp::Median)
            .window(window)
            .filter(AttributeFilter::less_than("CLOUDY_PIXEL_PERCENTAGE", p.max_cloud_percentage))
            .bands(&bands);
        self.query(request)?.select(&bands)
    }

    /// Mosaicked elevation and canopy height; identical for every window
    pub fn build_static_layers(&self) -> LandCoverResult<StaticLayers> {
        let p = self.params;
        log::info!("Building static elevation and canopy height layers");

        let elevation = CompositeRequest::new(&p.elevation_collection, self.region, ReduceOp::Mosaic)
            .bands(&[p.elevation_band.as_str()]);
        let canopy = CompositeRequest::new(&p.canopy_collection, self.region, ReduceOp::Mosaic)
            .bands(&[p.canopy_band.as_str()]);

        Ok(StaticLayers {
            elevation: self.query(elevation)?.select_as(&p.elevation_band, BAND_ELEVATION)?,
            canopy_height: self.query(canopy)?.select_as(&p.canopy_band, BAND_CANOPY_HEIGHT)?,
        })
    }

    /// Radar + optical + water index + static layers for one window
    pub fn build(&self, window: DateWindow, static_layers: &StaticLayers) -> LandCoverResult<FeatureStack> {
        log::info!("Building feature stack for {}", window);

        let radar = self.radar_composite(window)?;
        let optical = self.optical_composite(window)?;
        let ndwi = normalized_difference(optical.band(BAND_GREEN)?, optical.band(BAND_NIR)?);

        let grid = radar.grid;
        for (label, other) in [
            ("optical", &optical.grid),
            ("elevation", &static_layers.elevation.grid),
            ("canopy height", &static_layers.canopy_height.grid),
        ] {
            if !other.matches(&grid) {
                return Err(LandCoverError::GridMismatch(format!(
                    "{} layer grid {:?} differs from radar grid {:?}",
                    label, other, grid
                )));
            }
        }

        let mut stack = Raster::new(grid, radar.observation_count + optical.observation_count);
        stack.add_band(BAND_VH, radar.band(BAND_VH)?.clone())?;
        for name in [BAND_BLUE, BAND_GREEN, BAND_RED, BAND_NIR] {
            stack.add_band(name, optical.band(name)?.clone())?;
        }
        stack.add_band(BAND_NDWI, ndwi)?;
        stack.add_band(BAND_ELEVATION, static_layers.elevation.band(BAND_ELEVATION)?.clone())?;
        stack.add_band(
            BAND_CANOPY_HEIGHT,
            static_layers.canopy_height.band(BAND_CANOPY_HEIGHT)?.clone(),
        )?;

        let mut feature_stack = FeatureStack::from_raster(window, stack)?;
        feature_stack.radar_observations = radar.observation_count;
        feature_stack.optical_observations = optical.observation_count;
        log::debug!(
            "Feature stack {}: {}x{} pixels, bands {:?}",
            window,
            grid.rows,
            grid.cols,
            feature_stack.band_names()
        );
        Ok(feature_stack)
    }
}
