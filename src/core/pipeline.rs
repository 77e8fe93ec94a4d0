//! End-to-end floodplain classification run.
//!
//! static layers -> high/low-water feature stacks -> training (high water only)
//! -> one model applied to both stacks -> modal smoothing -> high-water
//! vectorization -> raster and vector area records -> seasonal change.

use crate::core::area::{AreaMethod, AreaMismatchWarning, AreaReconciler, AreaRecord};
use crate::core::change::SeasonalChange;
use crate::core::classifier::{classify, LandCoverClassifier};
use crate::core::composite::{CompositeBuilder, CompositeParams, FeatureStack};
use crate::core::forest::RandomForestParams;
use crate::core::smoothing::{ModalFilter, ModalFilterParams};
use crate::core::training::{TrainingReport, TrainingSampleAssembler};
use crate::core::vectorize::{ClassVectorSet, Vectorizer};
use crate::io::labels::LabeledGeometrySets;
use crate::io::source::RasterSource;
use crate::types::{
    ClassRaster, CoordinateSystem, DateWindow, LandCoverClass, LandCoverError, LandCoverResult, Region, Season,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
}

fn default_high_water() -> DateWindow {
    DateWindow { start: date(2024, 1, 1), end: date(2024, 3, 31) }
}

fn default_low_water() -> DateWindow {
    DateWindow { start: date(2024, 7, 1), end: date(2024, 9, 30) }
}

fn default_area_tolerance() -> f64 {
    0.01
}

/// Configuration of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Region of interest bounding every stage
    pub region: Region,
    #[serde(default = "default_high_water")]
    pub high_water: DateWindow,
    #[serde(default = "default_low_water")]
    pub low_water: DateWindow,
    #[serde(default)]
    pub composite: CompositeParams,
    #[serde(default)]
    pub forest: RandomForestParams,
    #[serde(default)]
    pub smoothing: ModalFilterParams,
    /// Relative raster/vector area difference tolerated before a warning
    #[serde(default = "default_area_tolerance")]
    pub area_tolerance: f64,
}

impl PipelineConfig {
    /// Production defaults for a region
    pub fn new(region: Region) -> Self {
        Self {
            region,
            high_water: default_high_water(),
            low_water: default_low_water(),
            composite: CompositeParams::default(),
            forest: RandomForestParams::default(),
            smoothing: ModalFilterParams::default(),
            area_tolerance: default_area_tolerance(),
        }
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> LandCoverResult<Self> {
        let path = path.as_ref();
        log::debug!("Reading pipeline configuration from {}", path.display());
        let reader = BufReader::new(File::open(path)?);
        let config: PipelineConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> LandCoverResult<()> {
        self.region.bounds()?;
        for (label, window) in [("high-water", &self.high_water), ("low-water", &self.low_water)] {
            if window.end <= window.start {
                return Err(LandCoverError::InvalidFormat(format!(
                    "{} window {} is empty",
                    label, window
                )));
            }
        }
        let crs = CoordinateSystem::from_code(&self.composite.crs)?;
        if crs != self.region.crs {
            return Err(LandCoverError::InvalidFormat(format!(
                "Region is in {} but composites are requested in {}",
                self.region.crs, crs
            )));
        }
        if !(self.composite.resolution_m > 0.0) {
            return Err(LandCoverError::InvalidFormat(format!(
                "Resolution must be positive, got {}",
                self.composite.resolution_m
            )));
        }
        if self.forest.n_trees == 0 {
            return Err(LandCoverError::InvalidFormat("Forest needs at least one tree".to_string()));
        }
        if !(self.area_tolerance >= 0.0) {
            return Err(LandCoverError::InvalidFormat(format!(
                "Area tolerance must be non-negative, got {}",
                self.area_tolerance
            )));
        }
        Ok(())
    }

    pub fn window(&self, season: Season) -> DateWindow {
        match season {
            Season::HighWater => self.high_water,
            Season::LowWater => self.low_water,
        }
    }
}

/// Observations behind one season's feature stack
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompositeSummary {
    pub season: Season,
    pub window: DateWindow,
    pub radar_observations: usize,
    pub optical_observations: usize,
}

impl CompositeSummary {
    fn of(season: Season, stack: &FeatureStack) -> Self {
        Self {
            season,
            window: stack.window,
            radar_observations: stack.radar_observations,
            optical_observations: stack.optical_observations,
        }
    }
}

/// Everything a run produces
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub high_water: ClassRaster,
    pub low_water: ClassRaster,
    /// Polygons of the smoothed high-water raster, one collection per class
    pub vectors: ClassVectorSet,
    /// Raster method for both seasons, vector method for high water
    pub area_records: Vec<AreaRecord>,
    pub area_warnings: Vec<AreaMismatchWarning>,
    pub training_report: TrainingReport,
    pub model_fingerprint: u64,
    pub composites: [CompositeSummary; 2],
    pub seasonal_change: SeasonalChange,
}

impl PipelineOutput {
    pub fn smoothed(&self, season: Season) -> &ClassRaster {
        match season {
            Season::HighWater => &self.high_water,
            Season::LowWater => &self.low_water,
        }
    }

    pub fn area(&self, season: Season, class: LandCoverClass, method: AreaMethod) -> Option<f64> {
        self.area_records
            .iter()
            .find(|r| r.season == season && r.class == class && r.method == method)
            .map(|r| r.hectares)
    }

    /// Pixels left unclassified because of masked predictors, per season
    pub fn masked_pixels(&self, season: Season) -> usize {
        self.smoothed(season).masked_pixels
    }
}

/// Floodplain land-cover pipeline over an injected raster source
pub struct FloodplainPipeline<S: RasterSource> {
    source: S,
    config: PipelineConfig,
}

impl<S: RasterSource> FloodplainPipeline<S> {
    pub fn new(source: S, config: PipelineConfig) -> LandCoverResult<Self> {
        config.validate()?;
        Ok(Self { source, config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// High- and low-water feature stacks; both must share grid and band layout
    pub fn build_feature_stacks(&self) -> LandCoverResult<(FeatureStack, FeatureStack)> {
        let cfg = &self.config;
        let builder = CompositeBuilder::new(&self.source, &cfg.region, &cfg.composite)?;
        let static_layers = builder.build_static_layers()?;

        #[cfg(feature = "parallel")]
        let (high, low) = rayon::join(
            || builder.build(cfg.high_water, &static_layers),
            || builder.build(cfg.low_water, &static_layers),
        );
        #[cfg(not(feature = "parallel"))]
        let (high, low) = (
            builder.build(cfg.high_water, &static_layers),
            builder.build(cfg.low_water, &static_layers),
        );
        let (high, low) = (high?, low?);

        if high.band_names() != low.band_names() || !high.grid().matches(low.grid()) {
            return Err(LandCoverError::GridMismatch(
                "High- and low-water feature stacks differ in grid or band layout".to_string(),
            ));
        }
        Ok((high, low))
    }

    pub fn run(&self, labels: &LabeledGeometrySets) -> LandCoverResult<PipelineOutput> {
        let cfg = &self.config;
        log::info!(
            "Floodplain classification: high water {}, low water {}",
            cfg.high_water,
            cfg.low_water
        );

        let (high_stack, low_stack) = self.build_feature_stacks()?;

        let table = TrainingSampleAssembler::new(&cfg.region).build_training_table(&high_stack, labels)?;
        let model = LandCoverClassifier::new(cfg.forest.clone()).train(&table)?;

        #[cfg(feature = "parallel")]
        let (high_classes, low_classes) = rayon::join(|| classify(&model, &high_stack), || classify(&model, &low_stack));
        #[cfg(not(feature = "parallel"))]
        let (high_classes, low_classes) = (classify(&model, &high_stack), classify(&model, &low_stack));
        let (high_classes, low_classes) = (high_classes?, low_classes?);

        if high_classes.model_fingerprint != low_classes.model_fingerprint {
            return Err(LandCoverError::Processing(format!(
                "Seasons classified by different models ({:016x} vs {:016x})",
                high_classes.model_fingerprint, low_classes.model_fingerprint
            )));
        }

        let filter = ModalFilter::new(cfg.smoothing.clone())?;
        let high_water = filter.apply(&high_classes);
        let low_water = filter.apply(&low_classes);

        let vectors = Vectorizer::new().vectorize_all(&high_water);

        let reconciler = AreaReconciler::new(cfg.area_tolerance)?;
        let mut area_records = reconciler.raster_records(Season::HighWater, &high_water)?;
        area_records.extend(reconciler.raster_records(Season::LowWater, &low_water)?);
        area_records.extend(reconciler.vector_records(Season::HighWater, &vectors));
        let area_warnings = reconciler.compare(&area_records);

        let seasonal_change = SeasonalChange::between(&high_water, &low_water)?;

        log::info!(
            "Run complete: {} area records, {} area warnings, {} + {} masked pixels",
            area_records.len(),
            area_warnings.len(),
            high_water.masked_pixels,
            low_water.masked_pixels
        );

        Ok(PipelineOutput {
            composites: [
                CompositeSummary::of(Season::HighWater, &high_stack),
                CompositeSummary::of(Season::LowWater, &low_stack),
            ],
            high_water,
            low_water,
            vectors,
            area_records,
            area_warnings,
            training_report: table.report,
            model_fingerprint: model.fingerprint(),
            seasonal_change,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::rectangle;

    fn region() -> Region {
        Region::new(rectangle(-60.1, -3.2, -60.0, -3.1), CoordinateSystem::Geographic)
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::new(region());
        assert!(config.validate().is_ok());
        assert_eq!(config.high_water.to_string(), "2024-01-01..2024-03-31");
        assert_eq!(config.low_water.to_string(), "2024-07-01..2024-09-30");
        assert_eq!(config.forest.n_trees, 50);
        assert_eq!(config.smoothing.radius, 1.5);
        assert_eq!(config.area_tolerance, 0.01);
        assert_eq!(config.window(Season::LowWater), config.low_water);
    }

    #[test]
    fn test_config_validation() {
        let mut config = PipelineConfig::new(region());
        config.composite.crs = "EPSG:32721".to_string();
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::new(region());
        config.area_tolerance = -1.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::new(region());
        config.low_water = DateWindow { start: date(2024, 9, 30), end: date(2024, 7, 1) };
        assert!(config.validate().is_err());
    }
}
