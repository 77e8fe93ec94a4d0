use crate::core::composite::FeatureStack;
use crate::geometry::{Geometry, Point, Polygon};
use geo::{BoundingRect, Contains};
use crate::io::labels::LabeledGeometrySets;
use crate::types::{LandCoverClass, LandCoverError, LandCoverResult, Region};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A geometry tagged with its class
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledSample {
    pub geometry: Geometry,
    pub class: LandCoverClass,
}

/// Outcome counts of training table assembly
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Geometries across all three input sets
    pub total: usize,
    /// Rows in the training table
    pub kept: usize,
    /// Dropped because the same geometry carries more than one class
    pub conflicting: usize,
    /// Dropped because the geometry lies outside the region or grid
    pub outside_region: usize,
    /// Dropped because a feature value was masked
    pub masked: usize,
}

impl TrainingReport {
    pub fn excluded(&self) -> usize {
        self.conflicting + self.outside_region + self.masked
    }
}

/// Feature rows sampled from the high-water stack plus their labels
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingTable {
    pub band_names: Vec<String>,
    /// samples x bands
    pub features: Array2<f32>,
    pub labels: Vec<LandCoverClass>,
    pub report: TrainingReport,
}

impl TrainingTable {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn class_count(&self, class: LandCoverClass) -> usize {
        self.labels.iter().filter(|&&c| c == class).count()
    }
}

/// Tag every geometry with its set's class and concatenate the sets.
///
/// Geometries present in more than one set are conflicting: every copy is
/// removed and counted. Repeats inside one set are kept as given.
pub fn merge_labeled_sets(sets: &LabeledGeometrySets) -> (Vec<LabeledSample>, usize) {
    let mut classes_by_geometry: HashMap<Vec<u64>, u8> = HashMap::new();
    for (class, geometries) in sets.tagged() {
        for geometry in geometries {
            *classes_by_geometry.entry(geometry.identity_key()).or_default() |= 1 << class.code();
        }
    }

    let mut samples = Vec::with_capacity(sets.len());
    let mut conflicting = 0;
    for (class, geometries) in sets.tagged() {
        for geometry in geometries {
            let tags = classes_by_geometry
                .get(&geometry.identity_key())
                .copied()
                .unwrap_or_default();
            if tags.count_ones() > 1 {
                conflicting += 1;
            } else {
                samples.push(LabeledSample { geometry: geometry.clone(), class });
            }
        }
    }
    (samples, conflicting)
}

enum SampleOutcome {
    Row([f32; 8]),
    OutsideRegion,
    Masked,
}

/// Builds the training table from labeled geometries and a feature stack
pub struct TrainingSampleAssembler<'a> {
    region: &'a Region,
}

impl<'a> TrainingSampleAssembler<'a> {
    pub fn new(region: &'a Region) -> Self {
        Self { region }
    }

    pub fn build_training_table(
        &self,
        stack: &FeatureStack,
        sets: &LabeledGeometrySets,
    ) -> LandCoverResult<TrainingTable> {
        let (samples, conflicting) = merge_labeled_sets(sets);
        let mut report = TrainingReport {
            total: sets.len(),
            conflicting,
            ..Default::default()
        };

        let mut rows: Vec<f32> = Vec::with_capacity(samples.len() * 8);
        let mut labels = Vec::with_capacity(samples.len());
        for sample in &samples {
            match self.sample(stack, &sample.geometry) {
                SampleOutcome::Row(features) => {
                    rows.extend_from_slice(&features);
                    labels.push(sample.class);
                }
                SampleOutcome::OutsideRegion => report.outside_region += 1,
                SampleOutcome::Masked => report.masked += 1,
            }
        }
        report.kept = labels.len();

        if report.excluded() > 0 {
            log::warn!(
                "Excluded {} of {} training samples ({} conflicting, {} outside region, {} masked)",
                report.excluded(),
                report.total,
                report.conflicting,
                report.outside_region,
                report.masked
            );
        }
        if labels.is_empty() {
            return Err(LandCoverError::Training(format!(
                "No valid training samples out of {}",
                report.total
            )));
        }

        let features = Array2::from_shape_vec((labels.len(), 8), rows)
            .map_err(|e| LandCoverError::Processing(format!("Training table shape: {}", e)))?;
        let table = TrainingTable {
            band_names: stack.band_names().into_iter().map(str::to_string).collect(),
            features,
            labels,
            report,
        };
        for class in LandCoverClass::ALL {
            let count = table.class_count(class);
            if count == 0 {
                log::warn!("Training table has no '{}' samples", class);
            }
            log::debug!("Training rows for '{}': {}", class, count);
        }
        log::info!("Training table: {} rows from {} samples", table.len(), report.total);
        Ok(table)
    }

    fn sample(&self, stack: &FeatureStack, geometry: &Geometry) -> SampleOutcome {
        match geometry {
            Geometry::Point(p) => self.sample_point(stack, p),
            Geometry::Polygon(poly) => self.sample_polygon(stack, poly),
        }
    }

    fn sample_point(&self, stack: &FeatureStack, p: &Point<f64>) -> SampleOutcome {
        if !self.region.contains(p) {
            return SampleOutcome::OutsideRegion;
        }
        match stack.grid().pixel_at(p) {
            None => SampleOutcome::OutsideRegion,
            Some((row, col)) => stack
                .features_at(row, col)
                .map_or(SampleOutcome::Masked, SampleOutcome::Row),
        }
    }

    /// Per-band mean over unmasked pixels whose centers fall inside the polygon
    fn sample_polygon(&self, stack: &FeatureStack, poly: &Polygon<f64>) -> SampleOutcome {
        let bounds = match poly.bounding_rect() {
            Some(bounds) => bounds,
            None => return SampleOutcome::OutsideRegion,
        };
        let grid = stack.grid();
        let t = &grid.transform;
        let (row_lo, row_hi, col_lo, col_hi) = match grid.pixel_window(&bounds) {
            Some(window) => window,
            None => return SampleOutcome::OutsideRegion,
        };

        let bands = stack.raster().bands();
        let mut sums = [0.0f64; 8];
        let mut counts = [0usize; 8];
        let mut inside_polygon = 0;
        let mut inside_region = 0;

        for row in row_lo..=row_hi {
            for col in col_lo..=col_hi {
                let center = t.pixel_center(row, col);
                if !poly.contains(&center) {
                    continue;
                }
                inside_polygon += 1;
                if !self.region.contains(&center) {
                    continue;
                }
                inside_region += 1;
                for (k, band) in bands.iter().enumerate() {
                    let value = band.data[[row, col]];
                    if value.is_finite() {
                        sums[k] += value as f64;
                        counts[k] += 1;
                    }
                }
            }
        }

        if inside_polygon == 0 {
            // Smaller than a pixel: read the pixel under its center
            return self.sample_point(stack, &Point::from(bounds.center()));
        }
        if inside_region == 0 {
            return SampleOutcome::OutsideRegion;
        }
        if counts.iter().any(|&c| c == 0) {
            return SampleOutcome::Masked;
        }
        let mut features = [0.0f32; 8];
        for k in 0..8 {
            features[k] = (sums[k] / counts[k] as f64) as f32;
        }
        SampleOutcome::Row(features)
    }
}
