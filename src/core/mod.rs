//! Core land-cover processing stages

pub mod area;
pub mod change;
pub mod classifier;
pub mod composite;
pub mod forest;
pub(crate) mod parallel;
pub mod pipeline;
pub mod smoothing;
pub mod training;
pub mod vectorize;

// Re-export main types
pub use area::{area_by_raster, area_by_vector, AreaMethod, AreaMismatchWarning, AreaReconciler, AreaRecord};
pub use change::SeasonalChange;
pub use classifier::{classify, classify_with, LandCoverClassifier, TrainedModel};
pub use composite::{normalized_difference, CompositeBuilder, CompositeParams, FeatureStack, StaticLayers, FEATURE_BANDS};
pub use forest::{RandomForest, RandomForestParams};
pub use pipeline::{CompositeSummary, FloodplainPipeline, PipelineConfig, PipelineOutput};
pub use smoothing::{ModalFilter, ModalFilterParams};
pub use training::{merge_labeled_sets, LabeledSample, TrainingReport, TrainingSampleAssembler, TrainingTable};
pub use vectorize::{rasterize, ClassPolygon, ClassVectorSet, PolygonCollection, Vectorizer};
