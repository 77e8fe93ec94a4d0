//! Labeled training geometries.
//!
//! Three class collections with no class attribute of their own; the class is
//! implied by the collection a geometry belongs to.

use crate::geometry::Geometry;
use crate::types::{LandCoverClass, LandCoverResult};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Training geometry collections, one per class
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabeledGeometrySets {
    #[serde(default)]
    pub water: Vec<Geometry>,
    #[serde(default)]
    pub land: Vec<Geometry>,
    #[serde(default)]
    pub humid: Vec<Geometry>,
}

impl LabeledGeometrySets {
    /// Collections paired with the class they stand for
    pub fn tagged(&self) -> [(LandCoverClass, &[Geometry]); 3] {
        [
            (LandCoverClass::Water, self.water.as_slice()),
            (LandCoverClass::Land, self.land.as_slice()),
            (LandCoverClass::Humid, self.humid.as_slice()),
        ]
    }

    pub fn len(&self) -> usize {
        self.water.len() + self.land.len() + self.humid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read labeled sets from a JSON document
/// (`{"water": [geometry...], "land": [...], "humid": [...]}`)
pub fn read_labeled_sets<P: AsRef<Path>>(path: P) -> LandCoverResult<LabeledGeometrySets> {
    let path = path.as_ref();
    log::debug!("Reading labeled geometries from {}", path.display());
    let reader = BufReader::new(File::open(path)?);
    let sets: LabeledGeometrySets = serde_json::from_reader(reader)?;
    log::info!(
        "Loaded {} labeled geometries (water: {}, land: {}, humid: {})",
        sets.len(),
        sets.water.len(),
        sets.land.len(),
        sets.humid.len()
    );
    Ok(sets)
}
