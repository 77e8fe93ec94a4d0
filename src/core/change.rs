//! Seasonal land-cover change between the smoothed high- and low-water rasters.
//!
//! Areas are cross-tabulated in hectares by class pair. Pixels masked in
//! either season are counted apart and excluded from every cell.

use crate::core::area::SQUARE_METERS_PER_HECTARE;
use crate::types::{ClassRaster, LandCoverClass, LandCoverError, LandCoverResult, CLASS_NODATA};
use serde::{Deserialize, Serialize};

/// Cross-tabulation of high-water against low-water classes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalChange {
    /// `hectares[high][low]`, indexed by class code
    pub hectares: [[f64; 3]; 3],
    /// Water at high water that is no longer water at low water
    pub seasonally_flooded_hectares: f64,
    /// Pixels masked in either season
    pub masked_pixels: usize,
}

impl SeasonalChange {
    /// Both rasters must share one grid
    pub fn between(high_water: &ClassRaster, low_water: &ClassRaster) -> LandCoverResult<Self> {
        if !high_water.grid.matches(&low_water.grid) {
            return Err(LandCoverError::GridMismatch(
                "High- and low-water class rasters are on different grids".to_string(),
            ));
        }
        let grid = &high_water.grid;
        let mut hectares = [[0.0f64; 3]; 3];
        let mut masked_pixels = 0;

        for row in 0..grid.rows {
            let pixel_hectares = grid.pixel_area_m2(row) / SQUARE_METERS_PER_HECTARE;
            for col in 0..grid.cols {
                let (from, to) = (high_water.classes[[row, col]], low_water.classes[[row, col]]);
                if from == CLASS_NODATA || to == CLASS_NODATA || from > 2 || to > 2 {
                    masked_pixels += 1;
                    continue;
                }
                hectares[from as usize][to as usize] += pixel_hectares;
            }
        }

        let water = LandCoverClass::Water.code() as usize;
        let seasonally_flooded_hectares = LandCoverClass::ALL
            .iter()
            .filter(|&&c| c != LandCoverClass::Water)
            .map(|c| hectares[water][c.code() as usize])
            .sum();
        log::info!("Seasonally flooded area: {:.4} ha", seasonally_flooded_hectares);

        Ok(Self { hectares, seasonally_flooded_hectares, masked_pixels })
    }

    pub fn transition(&self, high_water: LandCoverClass, low_water: LandCoverClass) -> f64 {
        self.hectares[high_water.code() as usize][low_water.code() as usize]
    }

    /// Area whose class is the same in both seasons
    pub fn unchanged_hectares(&self) -> f64 {
        (0..3).map(|i| self.hectares[i][i]).sum()
    }
}
