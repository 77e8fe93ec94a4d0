//! Synthetic floodplain scenes shared by the integration tests

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use varzea::core::CompositeParams;
use varzea::{
    Band, CoordinateSystem, GeoTransform, Geometry, GridGeometry, InMemorySource, LabeledGeometrySets,
    LandCoverClass, PipelineConfig, Point, Raster, Region, Scene,
};

pub const ROWS: usize = 20;
pub const COLS: usize = 30;
pub const PIXEL_M: f64 = 60.0;
pub const PIXEL_HA: f64 = 0.36;
pub const TOP_LEFT_X: f64 = 500_000.0;
pub const TOP_LEFT_Y: f64 = 9_650_000.0;
pub const CRS: CoordinateSystem = CoordinateSystem::Projected { epsg: 32721 };

/// High-water optical pixel with a masked near-infrared value
pub const MASKED_PIXEL: (usize, usize) = (15, 25);

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn grid() -> GridGeometry {
    GridGeometry::new(ROWS, COLS, GeoTransform::north_up(TOP_LEFT_X, TOP_LEFT_Y, PIXEL_M), CRS)
}

pub fn region() -> Region {
    Region::new(
        varzea::rectangle(
            TOP_LEFT_X,
            TOP_LEFT_Y - ROWS as f64 * PIXEL_M,
            TOP_LEFT_X + COLS as f64 * PIXEL_M,
            TOP_LEFT_Y,
        ),
        CRS,
    )
}

pub fn config() -> PipelineConfig {
    let mut config = PipelineConfig::new(region());
    config.composite = CompositeParams {
        crs: "EPSG:32721".to_string(),
        resolution_m: PIXEL_M,
        ..CompositeParams::default()
    };
    config
}

/// Water west of column 10 with a land island, humid strip up to column 18, land east
pub fn high_water_truth(row: usize, col: usize) -> LandCoverClass {
    if (8..12).contains(&row) && (3..7).contains(&col) {
        LandCoverClass::Land
    } else if col < 10 {
        LandCoverClass::Water
    } else if col < 18 {
        LandCoverClass::Humid
    } else {
        LandCoverClass::Land
    }
}

/// Receded water: the western water shrinks and the humid strip dries out
pub fn low_water_appearance(row: usize, col: usize) -> LandCoverClass {
    match high_water_truth(row, col) {
        LandCoverClass::Water if col >= 6 => LandCoverClass::Humid,
        LandCoverClass::Humid => LandCoverClass::Land,
        class => class,
    }
}

/// VH, B2, B3, B4, B8
fn seasonal_signature(class: LandCoverClass) -> [f32; 5] {
    match class {
        LandCoverClass::Land => [-12.0, 0.05, 0.08, 0.06, 0.35],
        LandCoverClass::Water => [-24.0, 0.04, 0.07, 0.04, 0.02],
        LandCoverClass::Humid => [-16.0, 0.04, 0.09, 0.05, 0.18],
    }
}

/// elevation, canopy height
fn static_signature(class: LandCoverClass) -> [f32; 2] {
    match class {
        LandCoverClass::Land => [80.0, 25.0],
        LandCoverClass::Water => [60.0, 0.0],
        LandCoverClass::Humid => [65.0, 8.0],
    }
}

fn band(appearance: fn(usize, usize) -> LandCoverClass, index: usize, offset: f32) -> Band {
    Band::from_shape_fn((ROWS, COLS), |(r, c)| seasonal_signature(appearance(r, c))[index] + offset)
}

fn radar_scene(id: &str, month: u32, day: u32, appearance: fn(usize, usize) -> LandCoverClass, offset: f32, pass: &str) -> Scene {
    let raster = Raster::new(grid(), 1)
        .with_band("VV", band(appearance, 0, offset + 6.0))
        .and_then(|r| r.with_band("VH", band(appearance, 0, offset)))
        .unwrap();
    Scene::new(id, Utc.with_ymd_and_hms(2024, month, day, 9, 30, 0).unwrap(), raster)
        .with_property("instrumentMode", "IW")
        .with_property("transmitterReceiverPolarisation", vec!["VV", "VH"])
        .with_property("orbitProperties_pass", pass)
}

fn optical_scene(
    id: &str,
    month: u32,
    day: u32,
    appearance: fn(usize, usize) -> LandCoverClass,
    offset: f32,
    cloud: f64,
    mask_nir: bool,
) -> Scene {
    let mut raster = Raster::new(grid(), 1);
    for (k, name) in ["B2", "B3", "B4", "B8"].iter().enumerate() {
        let mut data = band(appearance, k + 1, offset);
        if mask_nir && *name == "B8" {
            data[MASKED_PIXEL] = f32::NAN;
        }
        raster.add_band(*name, data).unwrap();
    }
    Scene::new(id, Utc.with_ymd_and_hms(2024, month, day, 13, 45, 0).unwrap(), raster)
        .with_property("CLOUDY_PIXEL_PERCENTAGE", cloud)
}

/// Static layer tile of `rows` x `cols` pixels whose top-left pixel is
/// `(row0, col0)` of the reference grid; indices may fall outside it
fn static_tile(id: &str, name: &str, index: usize, (row0, col0): (i64, i64), (rows, cols): (usize, usize)) -> Scene {
    let data = Band::from_shape_fn((rows, cols), |(r, c)| {
        let row = (row0 + r as i64).clamp(0, ROWS as i64 - 1) as usize;
        let col = (col0 + c as i64).clamp(0, COLS as i64 - 1) as usize;
        static_signature(high_water_truth(row, col))[index]
    });
    let transform = GeoTransform::north_up(
        TOP_LEFT_X + col0 as f64 * PIXEL_M,
        TOP_LEFT_Y - row0 as f64 * PIXEL_M,
        PIXEL_M,
    );
    let raster = Raster::new(GridGeometry::new(rows, cols, transform, CRS), 1)
        .with_band(name, data)
        .unwrap();
    Scene::new(id, Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(), raster)
}

fn static_scene(id: &str, name: &str, index: usize) -> Scene {
    static_tile(id, name, index, (0, 0), (ROWS, COLS))
}

/// How the elevation collection covers the region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemLayout {
    /// One tile on the reference grid
    Aligned,
    /// One 22 x 32 tile starting a pixel north-west of the region
    Oversized,
    /// Two tiles meeting at column 15
    Split,
}

/// Which parts of the synthetic catalogue are present
#[derive(Debug, Clone, Copy)]
pub struct Catalogue {
    pub low_water_optical: bool,
    pub low_water_radar: bool,
    pub canopy: bool,
    pub dem: DemLayout,
}

impl Default for Catalogue {
    fn default() -> Self {
        Self {
            low_water_optical: true,
            low_water_radar: true,
            canopy: true,
            dem: DemLayout::Aligned,
        }
    }
}

/// Full catalogue, optionally without low-water optical scenes
pub fn source(with_low_water_optical: bool) -> InMemorySource {
    catalogue(Catalogue { low_water_optical: with_low_water_optical, ..Catalogue::default() })
}

/// Catalogue with three qualifying radar and optical scenes per season, plus
/// scenes every filter must reject
pub fn catalogue(parts: Catalogue) -> InMemorySource {
    let params = CompositeParams::default();
    let mut source = InMemorySource::new();

    for (i, day) in [5u32, 17, 29].iter().enumerate() {
        let offset = i as f32 * 0.001;
        source.add_scene(&params.radar_collection, radar_scene(&format!("S1_HW_{}", i), 2, *day, high_water_truth, offset, "DESCENDING"));
        if parts.low_water_radar {
            source.add_scene(&params.radar_collection, radar_scene(&format!("S1_LW_{}", i), 8, *day, low_water_appearance, offset, "DESCENDING"));
        }
        source.add_scene(
            &params.optical_collection,
            optical_scene(&format!("S2_HW_{}", i), 2, *day, high_water_truth, offset, 4.0 + i as f64, true),
        );
        if parts.low_water_optical {
            source.add_scene(
                &params.optical_collection,
                optical_scene(&format!("S2_LW_{}", i), 8, *day, low_water_appearance, offset, 2.0, false),
            );
        }
    }

    // rejected: ascending pass, cloudy, outside both windows
    source.add_scene(&params.radar_collection, radar_scene("S1_ASC", 2, 11, low_water_appearance, 9.0, "ASCENDING"));
    source.add_scene(
        &params.optical_collection,
        optical_scene("S2_CLOUDY", 2, 11, low_water_appearance, 0.5, 62.0, false),
    );
    source.add_scene(
        &params.optical_collection,
        optical_scene("S2_MAY", 5, 11, low_water_appearance, 0.5, 1.0, false),
    );

    match parts.dem {
        DemLayout::Aligned => source.add_scene(&params.elevation_collection, static_scene("GLO30", "DEM", 0)),
        DemLayout::Oversized => source.add_scene(
            &params.elevation_collection,
            static_tile("GLO30_WIDE", "DEM", 0, (-1, -1), (ROWS + 2, COLS + 2)),
        ),
        DemLayout::Split => {
            source.add_scene(&params.elevation_collection, static_tile("GLO30_W", "DEM", 0, (0, 0), (ROWS, 15)));
            source.add_scene(&params.elevation_collection, static_tile("GLO30_E", "DEM", 0, (0, 15), (ROWS, COLS - 15)));
        }
    }
    if parts.canopy {
        source.add_scene(&params.canopy_collection, static_scene("GEDI_V27", "b1", 1));
    }
    source
}

pub fn pixel_center(row: usize, col: usize) -> Point<f64> {
    grid().transform.pixel_center(row, col)
}

/// 10 water, 15 land and 5 humid point samples at pixel centers
pub fn labels() -> LabeledGeometrySets {
    let water = (0..10).map(|i| Geometry::Point(pixel_center(1 + i, 1 + i % 2))).collect();
    let land = (0..15).map(|i| Geometry::Point(pixel_center(1 + i, 20 + i % 5))).collect();
    let humid = (0..5).map(|i| Geometry::Point(pixel_center(2 + 3 * i, 12 + i))).collect();
    LabeledGeometrySets { water, land, humid }
}
