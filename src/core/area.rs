//! Class area accounting by two independent estimators.
//!
//! The raster method sums per-pixel ground area over a class mask. The vector
//! method sums polygon areas of the traced class regions. Both are reported;
//! disagreement beyond the configured relative tolerance is returned as an
//! [`AreaMismatchWarning`] and never treated as an error.

use crate::core::vectorize::{ClassVectorSet, PolygonCollection};
use crate::geometry::{geodesic_area, planar_area};
use crate::types::{ClassRaster, CoordinateSystem, GridGeometry, LandCoverClass, LandCoverError, LandCoverResult, Season};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

pub const SQUARE_METERS_PER_HECTARE: f64 = 10_000.0;

/// How an area figure was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AreaMethod {
    Raster,
    Vector,
}

impl std::fmt::Display for AreaMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AreaMethod::Raster => write!(f, "raster"),
            AreaMethod::Vector => write!(f, "vector"),
        }
    }
}

/// Area of one class in one season by one method
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AreaRecord {
    pub season: Season,
    pub class: LandCoverClass,
    pub method: AreaMethod,
    pub hectares: f64,
}

/// Raster and vector area of the same class disagree beyond tolerance
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AreaMismatchWarning {
    pub season: Season,
    pub class: LandCoverClass,
    pub raster_hectares: f64,
    pub vector_hectares: f64,
    /// |raster - vector| / max(raster, vector)
    pub relative_difference: f64,
    pub tolerance: f64,
}

impl std::fmt::Display for AreaMismatchWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} '{}' area mismatch: raster {:.4} ha vs vector {:.4} ha ({:.3}% > {:.3}%)",
            self.season,
            self.class,
            self.raster_hectares,
            self.vector_hectares,
            self.relative_difference * 100.0,
            self.tolerance * 100.0
        )
    }
}

/// Hectares covered by the true pixels of `mask`
pub fn area_by_raster(mask: &Array2<bool>, grid: &GridGeometry) -> LandCoverResult<f64> {
    if mask.dim() != grid.shape() {
        return Err(LandCoverError::GridMismatch(format!(
            "Mask shape {:?} does not match grid {:?}",
            mask.dim(),
            grid.shape()
        )));
    }
    let square_meters: f64 = mask
        .axis_iter(Axis(0))
        .enumerate()
        .map(|(row, values)| {
            let count = values.iter().filter(|&&v| v).count();
            count as f64 * grid.pixel_area_m2(row)
        })
        .sum();
    Ok(square_meters / SQUARE_METERS_PER_HECTARE)
}

/// Hectares enclosed by a polygon collection.
///
/// Projected coordinates use the planar shoelace area; lon/lat coordinates use
/// the Chamberlain-Duquette spherical area, which is exact for rings along
/// parallels and meridians and is the same measure the raster method applies
/// to each geographic pixel.
pub fn area_by_vector(collection: &PolygonCollection) -> f64 {
    let square_meters: f64 = match collection.grid.crs {
        CoordinateSystem::Geographic => collection.polygons.iter().map(|p| geodesic_area(&p.polygon)).sum(),
        crs @ CoordinateSystem::Projected { .. } => {
            let scale = crs.units_per_meter();
            collection
                .polygons
                .iter()
                .map(|p| planar_area(&p.polygon))
                .sum::<f64>()
                / (scale * scale)
        }
    };
    square_meters / SQUARE_METERS_PER_HECTARE
}

fn relative_difference(a: f64, b: f64) -> f64 {
    let scale = a.abs().max(b.abs());
    if scale == 0.0 {
        0.0
    } else {
        (a - b).abs() / scale
    }
}

/// Produces area records and flags raster/vector disagreement
#[derive(Debug, Clone, Copy)]
pub struct AreaReconciler {
    tolerance: f64,
}

impl AreaReconciler {
    /// `tolerance` is the accepted relative difference between the two methods
    pub fn new(tolerance: f64) -> LandCoverResult<Self> {
        if !(tolerance >= 0.0) || !tolerance.is_finite() {
            return Err(LandCoverError::InvalidFormat(format!(
                "Area tolerance must be a non-negative number, got {}",
                tolerance
            )));
        }
        Ok(Self { tolerance })
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Raster-method area of every class
    pub fn raster_records(&self, season: Season, raster: &ClassRaster) -> LandCoverResult<Vec<AreaRecord>> {
        LandCoverClass::ALL
            .iter()
            .map(|&class| {
                let hectares = area_by_raster(&raster.mask(class), &raster.grid)?;
                log::info!("{} '{}' raster area: {:.4} ha", season, class, hectares);
                Ok(AreaRecord { season, class, method: AreaMethod::Raster, hectares })
            })
            .collect()
    }

    /// Vector-method area of every collection in the set
    pub fn vector_records(&self, season: Season, vectors: &ClassVectorSet) -> Vec<AreaRecord> {
        vectors
            .collections
            .iter()
            .map(|collection| {
                let hectares = area_by_vector(collection);
                log::info!("{} '{}' vector area: {:.4} ha", season, collection.class, hectares);
                AreaRecord {
                    season,
                    class: collection.class,
                    method: AreaMethod::Vector,
                    hectares,
                }
            })
            .collect()
    }

    /// Pair raster and vector records of the same season and class and report
    /// every pair whose relative difference exceeds the tolerance
    pub fn compare(&self, records: &[AreaRecord]) -> Vec<AreaMismatchWarning> {
        let mut warnings = Vec::new();
        for raster in records.iter().filter(|r| r.method == AreaMethod::Raster) {
            let vector = records
                .iter()
                .find(|v| v.method == AreaMethod::Vector && v.season == raster.season && v.class == raster.class);
            if let Some(vector) = vector {
                let difference = relative_difference(raster.hectares, vector.hectares);
                if difference > self.tolerance {
                    let warning = AreaMismatchWarning {
                        season: raster.season,
                        class: raster.class,
                        raster_hectares: raster.hectares,
                        vector_hectares: vector.hectares,
                        relative_difference: difference,
                        tolerance: self.tolerance,
                    };
                    log::warn!("{}", warning);
                    warnings.push(warning);
                }
            }
        }
        warnings
    }
}

impl Default for AreaReconciler {
    fn default() -> Self {
        Self { tolerance: 0.01 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vectorize::Vectorizer;
    use crate::types::{GeoTransform, CLASS_NODATA};
    use approx::assert_relative_eq;

    fn class_raster(grid: GridGeometry) -> ClassRaster {
        let classes = Array2::from_shape_fn(grid.shape(), |(r, c)| match (r + 2 * c) % 7 {
            0 | 1 => LandCoverClass::Water.code(),
            2 => LandCoverClass::Humid.code(),
            6 if r == 0 => CLASS_NODATA,
            _ => LandCoverClass::Land.code(),
        });
        ClassRaster { grid, classes, masked_pixels: 0, model_fingerprint: 1 }
    }

    #[test]
    fn test_raster_area_is_pixel_count_times_pixel_area() {
        let grid = GridGeometry::new(6, 8, GeoTransform::north_up(500_000.0, 9_600_000.0, 60.0), CoordinateSystem::Projected { epsg: 32721 });
        let raster = class_raster(grid);
        for class in LandCoverClass::ALL {
            let hectares = area_by_raster(&raster.mask(class), &grid).unwrap();
            assert_relative_eq!(hectares, raster.count(class) as f64 * 0.36, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_vector_area_matches_raster_area() {
        let projected = GridGeometry::new(6, 8, GeoTransform::north_up(500_000.0, 9_600_000.0, 60.0), CoordinateSystem::Projected { epsg: 32721 });
        let geographic = GridGeometry::new(6, 8, GeoTransform::north_up(-60.0, -3.0, 0.0005), CoordinateSystem::Geographic);

        for grid in [projected, geographic] {
            let raster = class_raster(grid);
            let reconciler = AreaReconciler::default();
            let mut records = reconciler.raster_records(Season::HighWater, &raster).unwrap();
            records.extend(reconciler.vector_records(Season::HighWater, &Vectorizer::new().vectorize_all(&raster)));
            assert_eq!(records.len(), 6);

            for class in LandCoverClass::ALL {
                let by = |method| {
                    records
                        .iter()
                        .find(|r| r.class == class && r.method == method)
                        .map(|r| r.hectares)
                        .unwrap()
                };
                assert_relative_eq!(by(AreaMethod::Raster), by(AreaMethod::Vector), max_relative = 1e-9);
            }
            assert!(reconciler.compare(&records).is_empty());
        }
    }

    #[test]
    fn test_mismatch_beyond_tolerance_is_reported() {
        let record = |method, hectares| AreaRecord {
            season: Season::LowWater,
            class: LandCoverClass::Humid,
            method,
            hectares,
        };
        let records = [record(AreaMethod::Raster, 100.0), record(AreaMethod::Vector, 97.0)];

        let warnings = AreaReconciler::new(0.01).unwrap().compare(&records);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].class, LandCoverClass::Humid);
        assert_relative_eq!(warnings[0].relative_difference, 0.03);

        assert!(AreaReconciler::new(0.05).unwrap().compare(&records).is_empty());
        assert!(AreaReconciler::new(-0.1).is_err());
    }

    #[test]
    fn test_empty_class_has_zero_area() {
        let grid = GridGeometry::new(2, 2, GeoTransform::north_up(0.0, 20.0, 10.0), CoordinateSystem::Projected { epsg: 32721 });
        let mask = Array2::from_elem((2, 2), false);
        assert_eq!(area_by_raster(&mask, &grid).unwrap(), 0.0);
        assert_eq!(relative_difference(0.0, 0.0), 0.0);
        assert!(area_by_raster(&Array2::from_elem((3, 2), true), &grid).is_err());
    }
}
