//! Input/output modules for raster access and training geometries

pub mod labels;
pub mod memory;
pub mod source;

// Re-export main types
pub use labels::{read_labeled_sets, LabeledGeometrySets};
pub use memory::{InMemorySource, Scene};
pub use source::{AttributeFilter, CompositeRequest, PropertyValue, RasterSource, ReduceOp};
