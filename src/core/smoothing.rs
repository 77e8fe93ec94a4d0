//! Focal mode smoothing of class rasters.

use crate::core::parallel::sum_rows;
use crate::types::{ClassImage, ClassRaster, LandCoverError, LandCoverResult, CLASS_NODATA};
use ndarray::ArrayViewMut1;
use serde::{Deserialize, Serialize};

/// Focal mode filter parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModalFilterParams {
    /// Circular kernel radius in pixels
    pub radius: f64,
}

impl Default for ModalFilterParams {
    fn default() -> Self {
        Self { radius: 1.5 }
    }
}

/// Offsets `(d_row, d_col)` of every pixel whose centre lies within `radius`
/// pixels of the kernel centre
fn kernel_offsets(radius: f64) -> Vec<(isize, isize)> {
    let reach = radius.floor() as isize;
    let r2 = radius * radius;
    let mut offsets = Vec::new();
    for dy in -reach..=reach {
        for dx in -reach..=reach {
            if ((dx * dx + dy * dy) as f64) <= r2 {
                offsets.push((dy, dx));
            }
        }
    }
    offsets
}

/// Majority-vote filter over a circular pixel neighbourhood.
///
/// Masked neighbours do not vote and masked centres stay masked. When two
/// classes are equally frequent the lowest class code wins.
pub struct ModalFilter {
    params: ModalFilterParams,
    offsets: Vec<(isize, isize)>,
}

impl ModalFilter {
    pub fn new(params: ModalFilterParams) -> LandCoverResult<Self> {
        if !(params.radius >= 0.0) || !params.radius.is_finite() {
            return Err(LandCoverError::Processing(format!(
                "Modal filter radius must be a non-negative number, got {}",
                params.radius
            )));
        }
        let offsets = kernel_offsets(params.radius);
        Ok(Self { params, offsets })
    }

    /// Kernel offsets `(d_row, d_col)` including the centre
    pub fn kernel(&self) -> &[(isize, isize)] {
        &self.offsets
    }

    pub fn params(&self) -> &ModalFilterParams {
        &self.params
    }

    pub fn apply(&self, raster: &ClassRaster) -> ClassRaster {
        self.apply_with(raster, cfg!(feature = "parallel"))
    }

    /// As [`ModalFilter::apply`], choosing row-parallel or sequential execution
    pub fn apply_with(&self, raster: &ClassRaster, parallel: bool) -> ClassRaster {
        log::info!(
            "Applying modal filter (radius {} px, {} pixel kernel)",
            self.params.radius,
            self.offsets.len()
        );
        let source = &raster.classes;
        let (rows, cols) = source.dim();
        let mut smoothed = ClassImage::from_elem((rows, cols), CLASS_NODATA);

        let smooth_row = |row: usize, mut out_row: ArrayViewMut1<u8>| -> usize {
            for col in 0..cols {
                if source[[row, col]] == CLASS_NODATA {
                    continue;
                }
                let mut votes = [0u32; 256];
                for &(dy, dx) in &self.offsets {
                    let r = row as isize + dy;
                    let c = col as isize + dx;
                    if r >= 0 && r < rows as isize && c >= 0 && c < cols as isize {
                        let class = source[[r as usize, c as usize]];
                        if class != CLASS_NODATA {
                            votes[class as usize] += 1;
                        }
                    }
                }
                let mut best = 0usize;
                for class in 1..votes.len() {
                    if votes[class] > votes[best] {
                        best = class;
                    }
                }
                out_row[col] = best as u8;
            }
            0
        };
        sum_rows(&mut smoothed, parallel, smooth_row);

        let changed = smoothed
            .iter()
            .zip(source.iter())
            .filter(|(a, b)| a != b)
            .count();
        log::debug!("Modal filter changed {} pixels", changed);

        ClassRaster {
            grid: raster.grid,
            classes: smoothed,
            masked_pixels: raster.masked_pixels,
            model_fingerprint: raster.model_fingerprint,
        }
    }
}

impl Default for ModalFilter {
    fn default() -> Self {
        let params = ModalFilterParams::default();
        let offsets = kernel_offsets(params.radius);
        Self { params, offsets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CoordinateSystem, GeoTransform, GridGeometry};
    use ndarray::array;

    fn raster(classes: ClassImage) -> ClassRaster {
        let (rows, cols) = classes.dim();
        ClassRaster {
            grid: GridGeometry::new(rows, cols, GeoTransform::north_up(0.0, rows as f64, 1.0), CoordinateSystem::Projected { epsg: 32721 }),
            classes,
            masked_pixels: 0,
            model_fingerprint: 0,
        }
    }

    #[test]
    fn test_radius_1_5_kernel_is_3x3() {
        let filter = ModalFilter::new(ModalFilterParams::default()).unwrap();
        assert_eq!(filter.kernel().len(), 9);

        let wide = ModalFilter::new(ModalFilterParams { radius: 2.0 }).unwrap();
        assert_eq!(wide.kernel().len(), 13);
        assert!(ModalFilter::new(ModalFilterParams { radius: -1.0 }).is_err());
    }

    #[test]
    fn test_default_filter_follows_default_params() {
        let default = ModalFilter::default();
        let built = ModalFilter::new(ModalFilterParams::default()).unwrap();
        assert_eq!(default.params(), &ModalFilterParams::default());
        assert_eq!(default.kernel(), built.kernel());
        assert_eq!(default.kernel(), kernel_offsets(ModalFilterParams::default().radius).as_slice());
    }

    #[test]
    fn test_parallel_and_sequential_smoothing_agree() {
        let classes = ClassImage::from_shape_fn((23, 17), |(r, c)| match (r * 5 + c * 3) % 7 {
            0 | 1 => 1,
            2 => 2,
            3 if r % 4 == 0 => CLASS_NODATA,
            _ => 0,
        });
        let input = raster(classes);
        let filter = ModalFilter::new(ModalFilterParams { radius: 2.0 }).unwrap();
        let parallel = filter.apply_with(&input, true);
        let sequential = filter.apply_with(&input, false);
        assert_eq!(parallel, sequential);
        assert_ne!(parallel.classes, input.classes);
    }

    #[test]
    fn test_isolated_pixel_removed() {
        let mut classes = ClassImage::from_elem((5, 5), 0);
        classes[[2, 2]] = 1;
        let smoothed = ModalFilter::default().apply(&raster(classes));
        assert!(smoothed.classes.iter().all(|&c| c == 0));
    }

    #[test]
    fn test_tie_resolves_to_lowest_code() {
        // Corner pixel sees 4 neighbours: two of class 2, two of class 1
        let classes = array![[2, 1], [1, 2]];
        let smoothed = ModalFilter::default().apply(&raster(classes));
        assert!(smoothed.classes.iter().all(|&c| c == 1));

        let classes = array![[0, 2], [2, 0]];
        let smoothed = ModalFilter::default().apply(&raster(classes));
        assert!(smoothed.classes.iter().all(|&c| c == 0));
    }

    #[test]
    fn test_uniform_region_is_stable() {
        let mut classes = ClassImage::from_elem((8, 8), 0);
        for r in 1..7 {
            for c in 1..7 {
                classes[[r, c]] = 2;
            }
        }
        let filter = ModalFilter::default();
        let once = filter.apply(&raster(classes));
        let twice = filter.apply(&once);
        assert_eq!(once.classes.slice(ndarray::s![2..6, 2..6]), twice.classes.slice(ndarray::s![2..6, 2..6]));
        assert!(once.classes.slice(ndarray::s![2..6, 2..6]).iter().all(|&c| c == 2));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_masked_pixels_stay_masked_and_do_not_vote() {
        let classes = array![[CLASS_NODATA, CLASS_NODATA, CLASS_NODATA], [CLASS_NODATA, 1, 0], [0, 0, 0]];
        let smoothed = ModalFilter::default().apply(&raster(classes));
        assert_eq!(smoothed.classes[[0, 0]], CLASS_NODATA);
        assert_eq!(smoothed.classes[[1, 0]], CLASS_NODATA);
        // Centre sees 1 vote for class 1 and 4 for class 0
        assert_eq!(smoothed.classes[[1, 1]], 0);
    }
}
