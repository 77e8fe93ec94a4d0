//! Train-once, apply-everywhere land-cover classifier.
//!
//! The model is fitted on the high-water training table only. The same
//! [`TrainedModel`] is then applied to every feature stack; `classify` borrows
//! it immutably and stamps each output with the model fingerprint so callers can
//! verify both seasons came from one model.

use crate::core::composite::FeatureStack;
use crate::core::forest::{RandomForest, RandomForestParams};
use crate::core::parallel::sum_rows;
use crate::core::training::TrainingTable;
use crate::types::{ClassImage, ClassRaster, LandCoverClass, LandCoverError, LandCoverResult, CLASS_NODATA};
use ndarray::{Array2, ArrayView1, ArrayViewMut1};

/// Fitted model plus the band layout it expects
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedModel {
    forest: RandomForest,
    band_names: Vec<String>,
    fingerprint: u64,
    training_rows: usize,
}

impl TrainedModel {
    pub fn band_names(&self) -> &[String] {
        &self.band_names
    }

    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    pub fn training_rows(&self) -> usize {
        self.training_rows
    }

    pub fn n_trees(&self) -> usize {
        self.forest.n_trees()
    }

    /// Class of one feature vector in the model's band order; `None` when a
    /// value is masked or the vector length does not match the band layout
    pub fn predict(&self, features: ArrayView1<f32>) -> Option<LandCoverClass> {
        if features.len() != self.band_names.len() || features.iter().any(|v| !v.is_finite()) {
            return None;
        }
        LandCoverClass::from_code(self.forest.predict(features))
    }
}

/// Random Forest wrapper for land-cover classification
pub struct LandCoverClassifier {
    params: RandomForestParams,
}

impl LandCoverClassifier {
    pub fn new(params: RandomForestParams) -> Self {
        Self { params }
    }

    /// Fit the forest on every feature of the table
    pub fn train(&self, table: &TrainingTable) -> LandCoverResult<TrainedModel> {
        let labels: Vec<u8> = table.labels.iter().map(|c| c.code()).collect();
        let forest = RandomForest::fit(&table.features, &labels, LandCoverClass::ALL.len(), &self.params)?;
        let fingerprint = forest.fingerprint();
        log::info!(
            "Classifier trained on {} samples (model {:016x})",
            table.len(),
            fingerprint
        );
        Ok(TrainedModel {
            forest,
            band_names: table.band_names.clone(),
            fingerprint,
            training_rows: table.len(),
        })
    }

    /// Apply the model pixel by pixel; pixels with a masked predictor stay masked
    pub fn classify(&self, model: &TrainedModel, stack: &FeatureStack) -> LandCoverResult<ClassRaster> {
        classify(model, stack)
    }
}

impl Default for LandCoverClassifier {
    fn default() -> Self {
        Self::new(RandomForestParams::default())
    }
}

/// Apply a trained model to a feature stack
pub fn classify(model: &TrainedModel, stack: &FeatureStack) -> LandCoverResult<ClassRaster> {
    classify_with(model, stack, cfg!(feature = "parallel"))
}

/// As [`classify`], choosing row-parallel or sequential execution
pub fn classify_with(model: &TrainedModel, stack: &FeatureStack, parallel: bool) -> LandCoverResult<ClassRaster> {
    let stack_bands = stack.band_names();
    if stack_bands != model.band_names {
        return Err(LandCoverError::MissingBand(format!(
            "Model expects bands {:?}, feature stack has {:?}",
            model.band_names, stack_bands
        )));
    }

    let grid = *stack.grid();
    log::info!(
        "Classifying {}x{} pixels for {} with model {:016x}",
        grid.rows,
        grid.cols,
        stack.window,
        model.fingerprint
    );

    let bands = stack.raster().bands();
    let mut classes = ClassImage::from_elem(grid.shape(), CLASS_NODATA);

    // One forest call per row over its unmasked pixels
    let classify_row = |row: usize, mut out_row: ArrayViewMut1<u8>| -> usize {
        let valid: Vec<usize> = (0..grid.cols)
            .filter(|&col| bands.iter().all(|b| b.data[[row, col]].is_finite()))
            .collect();
        if !valid.is_empty() {
            let features = Array2::from_shape_fn((valid.len(), bands.len()), |(i, k)| bands[k].data[[row, valid[i]]]);
            for (&col, class) in valid.iter().zip(model.forest.predict_rows(features.view())) {
                out_row[col] = class;
            }
        }
        grid.cols - valid.len()
    };
    let masked_pixels = sum_rows(&mut classes, parallel, classify_row);

    if masked_pixels > 0 {
        log::warn!(
            "{} of {} pixels left unclassified for {}: masked predictor values",
            masked_pixels,
            grid.rows * grid.cols,
            stack.window
        );
    }

    Ok(ClassRaster {
        grid,
        classes,
        masked_pixels,
        model_fingerprint: model.fingerprint,
    })
}
