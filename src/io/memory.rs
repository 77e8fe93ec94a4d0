//! In-memory raster source.
//!
//! Holds scene collections in memory and answers composite requests with the
//! same filtering semantics as an archive-backed source. Used for synthetic
//! runs and tests. Scenes may sit on any north-up grid in the request CRS:
//! each is sampled onto the region grid, then the stack is reduced per pixel.

use crate::core::parallel::sum_rows;
use crate::io::source::{CompositeRequest, PropertyValue, RasterSource, ReduceOp};
use crate::types::{Band, GridGeometry, LandCoverError, LandCoverResult, Raster, Region};
use chrono::{DateTime, Utc};
use geo::Intersects;
use ndarray::ArrayViewMut1;
use num_traits::Float;
use std::collections::HashMap;

/// One observation of a collection
#[derive(Debug, Clone)]
pub struct Scene {
    pub id: String,
    pub acquired: DateTime<Utc>,
    pub properties: HashMap<String, PropertyValue>,
    pub raster: Raster,
}

impl Scene {
    pub fn new(id: &str, acquired: DateTime<Utc>, raster: Raster) -> Self {
        Self {
            id: id.to_string(),
            acquired,
            properties: HashMap::new(),
            raster,
        }
    }

    pub fn with_property(mut self, key: &str, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }
}

/// Scene catalogue answering [`CompositeRequest`]s
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    collections: HashMap<String, Vec<Scene>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_scene(&mut self, collection: &str, scene: Scene) {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .push(scene);
    }

    pub fn with_scene(mut self, collection: &str, scene: Scene) -> Self {
        self.add_scene(collection, scene);
        self
    }

    pub fn scene_count(&self, collection: &str) -> usize {
        self.collections.get(collection).map_or(0, Vec::len)
    }

    /// Scenes passing the bounds, date and attribute filters, in insertion order
    fn select_scenes(&self, request: &CompositeRequest) -> LandCoverResult<Vec<&Scene>> {
        let region_bounds = request.region.bounds()?;
        let scenes = match self.collections.get(&request.collection) {
            Some(scenes) => scenes,
            None => return Ok(Vec::new()),
        };

        Ok(scenes
            .iter()
            .filter(|scene| scene.raster.grid.bounds().intersects(&region_bounds))
            .filter(|scene| request.window.map_or(true, |w| w.contains(&scene.acquired)))
            .filter(|scene| {
                request
                    .filters
                    .iter()
                    .all(|f| f.matches(scene.properties.get(f.property())))
            })
            .collect())
    }

    /// Grid every composite of `request` is delivered on: the region bounds at
    /// the requested resolution, or at the native pixel size of the first scene
    fn target_grid(request: &CompositeRequest, native: Option<&GridGeometry>) -> LandCoverResult<GridGeometry> {
        let bounds = request.region.bounds()?;
        let crs = request.crs.unwrap_or(request.region.crs);
        let pixel = match (request.resolution_m, native) {
            (Some(resolution), _) => resolution * crs.units_per_meter(),
            (None, Some(native)) => native.pixel_size().0,
            (None, None) => bounds.width().max(bounds.height()),
        };
        GridGeometry::covering(&bounds, pixel, crs)
    }
}

impl RasterSource for InMemorySource {
    fn query_composite(&self, request: &CompositeRequest) -> LandCoverResult<Raster> {
        let scenes = self.select_scenes(request)?;
        log::debug!(
            "Collection '{}' ({}): {} of {} scenes pass filters",
            request.collection,
            request.window_label(),
            scenes.len(),
            self.scene_count(&request.collection)
        );

        let first = match scenes.first() {
            Some(scene) => scene,
            None => return Ok(Raster::new(Self::target_grid(request, None)?, 0)),
        };

        let target = Self::target_grid(request, Some(&first.raster.grid))?;
        if request.region.crs != target.crs {
            return Err(LandCoverError::Unsupported(format!(
                "Reprojection of a region in {} to {}",
                request.region.crs, target.crs
            )));
        }
        if let Some(scene) = scenes.iter().find(|s| s.raster.grid.crs != target.crs) {
            return Err(LandCoverError::Unsupported(format!(
                "Reprojection of scene '{}' from {} to {}",
                scene.id, scene.raster.grid.crs, target.crs
            )));
        }

        let band_names: Vec<String> = if request.bands.is_empty() {
            first.raster.band_names().into_iter().map(str::to_string).collect()
        } else {
            request.bands.clone()
        };

        let mut out = Raster::new(target, scenes.len());
        for name in &band_names {
            let layers = scenes
                .iter()
                .map(|s| {
                    let band = s.raster.band(name)?;
                    Ok(if s.raster.grid.matches(&target) {
                        band.clone()
                    } else {
                        resample_nearest(band, &s.raster.grid, &target)
                    })
                })
                .collect::<LandCoverResult<Vec<Band>>>()?;
            let layers: Vec<&Band> = layers.iter().collect();
            let mut band = reduce_band(&layers, target.shape(), request.reduce);
            clip_to_region(&mut band, &target, &request.region);
            out.add_band(name.as_str(), band)?;
        }

        Ok(out)
    }
}

/// Median of finite values; the mean of the two middle values for even counts
pub fn median<T: Float>(values: &mut [T]) -> Option<T> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        let two = T::one() + T::one();
        Some((values[mid - 1] + values[mid]) / two)
    }
}

/// Per-pixel temporal reduction ignoring masked observations
fn reduce_band(layers: &[&Band], (rows, cols): (usize, usize), op: ReduceOp) -> Band {
    let mut out = Band::from_elem((rows, cols), f32::NAN);

    let reduce_row = |row: usize, mut out_row: ArrayViewMut1<f32>| -> usize {
        let mut values: Vec<f32> = Vec::with_capacity(layers.len());
        for col in 0..cols {
            values.clear();
            values.extend(layers.iter().map(|l| l[[row, col]]).filter(|v| v.is_finite()));
            out_row[col] = match op {
                ReduceOp::Median => median(&mut values).unwrap_or(f32::NAN),
                ReduceOp::Mosaic => values.first().copied().unwrap_or(f32::NAN),
            };
        }
        0
    };
    sum_rows(&mut out, cfg!(feature = "parallel"), reduce_row);

    out
}

/// Nearest-neighbour resampling between north-up grids; target pixels whose
/// centre falls outside the source grid are masked
fn resample_nearest(band: &Band, source: &GridGeometry, target: &GridGeometry) -> Band {
    Band::from_shape_fn(target.shape(), |(row, col)| {
        let center = target.transform.pixel_center(row, col);
        source
            .pixel_at(&center)
            .map_or(f32::NAN, |(r, c)| band[[r, c]])
    })
}

/// Mask every pixel whose center falls outside the region
fn clip_to_region(band: &mut Band, grid: &GridGeometry, region: &Region) {
    for ((row, col), value) in band.indexed_iter_mut() {
        if !region.contains(&grid.transform.pixel_center(row, col)) {
            *value = f32::NAN;
        }
    }
}
