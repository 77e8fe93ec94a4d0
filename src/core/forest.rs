//! Random Forest classifier over `linfa-trees` decision trees.
//!
//! Each tree is a Gini-split CART fitted on its own bootstrap sample and its own
//! random feature subspace. Every tree draws from an RNG seeded from the forest
//! seed and the tree index, so training is reproducible with or without the
//! `parallel` feature. The ensemble vote breaks ties towards the lowest class
//! code.

use crate::types::{LandCoverError, LandCoverResult};
use linfa::traits::{Fit, Predict};
use linfa::DatasetBase;
use linfa_trees::{DecisionTree, SplitQuality};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Random Forest training parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomForestParams {
    /// Number of trees in the ensemble
    pub n_trees: usize,
    /// Maximum tree depth (`None` grows until leaves are pure)
    pub max_depth: Option<usize>,
    /// Minimum node size eligible for splitting
    pub min_samples_split: usize,
    /// Features each tree is grown on (`None` uses floor(sqrt(n_features)))
    pub features_per_tree: Option<usize>,
    /// Draw a bootstrap sample per tree
    pub bootstrap: bool,
    pub seed: u64,
}

impl Default for RandomForestParams {
    fn default() -> Self {
        Self {
            n_trees: 50,
            max_depth: None,
            min_samples_split: 2,
            features_per_tree: None,
            bootstrap: true,
            seed: 0x5EED_F0E5,
        }
    }
}

/// Majority class of a count vector; ties go to the lowest code
fn majority(counts: &[usize]) -> u8 {
    let mut best = 0;
    for (class, &count) in counts.iter().enumerate() {
        if count > counts[best] {
            best = class;
        }
    }
    best as u8
}

/// One ensemble member and the feature columns it was grown on
#[derive(Clone)]
struct Member {
    features: Vec<usize>,
    tree: DecisionTree<f32, usize>,
}

impl Member {
    fn grow(
        features: &Array2<f32>,
        labels: &Array1<usize>,
        params: &RandomForestParams,
        subspace: usize,
        tree_index: usize,
    ) -> LandCoverResult<Self> {
        let n_samples = features.nrows();
        let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(tree_index as u64));
        let rows: Vec<usize> = if params.bootstrap {
            (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
        } else {
            (0..n_samples).collect()
        };
        let mut columns = sample(&mut rng, features.ncols(), subspace).into_vec();
        columns.sort_unstable();

        let records = features.select(Axis(0), &rows).select(Axis(1), &columns);
        let targets = labels.select(Axis(0), &rows);
        let tree = DecisionTree::<f32, usize>::params()
            .split_quality(SplitQuality::Gini)
            .max_depth(params.max_depth)
            .min_weight_split(params.min_samples_split.max(2) as f32)
            .fit(&DatasetBase::new(records, targets))
            .map_err(|e| LandCoverError::Training(format!("Tree {}: {}", tree_index, e)))?;
        Ok(Self { features: columns, tree })
    }

    fn predict(&self, x: ArrayView2<f32>) -> Array1<usize> {
        self.tree.predict(&x.select(Axis(1), &self.features))
    }
}

/// Ensemble of decision trees voting by majority
#[derive(Clone)]
pub struct RandomForest {
    members: Vec<Member>,
    n_features: usize,
    n_classes: usize,
    fingerprint: u64,
}

impl RandomForest {
    /// Fit on `features` (samples x features) and class codes `labels` (< `n_classes`)
    pub fn fit(
        features: &Array2<f32>,
        labels: &[u8],
        n_classes: usize,
        params: &RandomForestParams,
    ) -> LandCoverResult<Self> {
        Self::fit_with(features, labels, n_classes, params, cfg!(feature = "parallel"))
    }

    /// As [`RandomForest::fit`], growing trees on the rayon pool when `parallel`
    /// is set and the feature is compiled in
    pub fn fit_with(
        features: &Array2<f32>,
        labels: &[u8],
        n_classes: usize,
        params: &RandomForestParams,
        parallel: bool,
    ) -> LandCoverResult<Self> {
        let n_samples = features.nrows();
        if n_samples == 0 {
            return Err(LandCoverError::Training("No training samples".to_string()));
        }
        if labels.len() != n_samples {
            return Err(LandCoverError::Training(format!(
                "{} labels for {} samples",
                labels.len(),
                n_samples
            )));
        }
        if let Some(&bad) = labels.iter().find(|&&l| l as usize >= n_classes) {
            return Err(LandCoverError::Training(format!("Label {} out of range", bad)));
        }
        if features.iter().any(|v| !v.is_finite()) {
            return Err(LandCoverError::Training("Training features contain masked values".to_string()));
        }
        if params.n_trees == 0 {
            return Err(LandCoverError::Training("Forest needs at least one tree".to_string()));
        }
        let n_features = features.ncols();
        if n_features == 0 {
            return Err(LandCoverError::Training("Training table has no features".to_string()));
        }
        let subspace = params
            .features_per_tree
            .unwrap_or_else(|| (n_features as f64).sqrt().floor() as usize)
            .clamp(1, n_features);

        log::info!(
            "Training random forest: {} trees, {} samples, {} features ({} per tree)",
            params.n_trees,
            n_samples,
            n_features,
            subspace
        );
        log::debug!("Forest parameters: {:?}", params);

        let targets: Array1<usize> = labels.iter().map(|&l| l as usize).collect();
        let grow = |tree_index: usize| Member::grow(features, &targets, params, subspace, tree_index);

        #[cfg(feature = "parallel")]
        {
            if parallel {
                use rayon::prelude::*;
                let members = (0..params.n_trees)
                    .into_par_iter()
                    .map(grow)
                    .collect::<LandCoverResult<Vec<Member>>>()?;
                return Ok(Self::assemble(members, features, labels, n_classes, params));
            }
        }
        #[cfg(not(feature = "parallel"))]
        let _ = parallel;

        let members = (0..params.n_trees)
            .map(grow)
            .collect::<LandCoverResult<Vec<Member>>>()?;
        Ok(Self::assemble(members, features, labels, n_classes, params))
    }

    /// The fitted model is a pure function of its training inputs, so the
    /// fingerprint hashes those plus every member's feature subspace
    fn assemble(
        members: Vec<Member>,
        features: &Array2<f32>,
        labels: &[u8],
        n_classes: usize,
        params: &RandomForestParams,
    ) -> Self {
        let mut hasher = DefaultHasher::new();
        features.dim().hash(&mut hasher);
        for value in features.iter() {
            value.to_bits().hash(&mut hasher);
        }
        labels.hash(&mut hasher);
        n_classes.hash(&mut hasher);
        (params.n_trees, params.max_depth, params.min_samples_split, params.bootstrap, params.seed).hash(&mut hasher);
        for member in &members {
            member.features.hash(&mut hasher);
        }
        let fingerprint = hasher.finish();
        log::debug!("Forest grown: {} trees, fingerprint {:016x}", members.len(), fingerprint);

        Self {
            members,
            n_features: features.ncols(),
            n_classes,
            fingerprint,
        }
    }

    /// Majority vote across trees for every row of `x`; ties go to the lowest class code
    pub fn predict_rows(&self, x: ArrayView2<f32>) -> Vec<u8> {
        let mut votes = Array2::<usize>::zeros((x.nrows(), self.n_classes));
        for member in &self.members {
            for (row, class) in member.predict(x).iter().enumerate() {
                if *class < self.n_classes {
                    votes[[row, *class]] += 1;
                }
            }
        }
        votes
            .axis_iter(Axis(0))
            .map(|counts| majority(&counts.to_vec()))
            .collect()
    }

    /// Majority vote for a single feature vector
    pub fn predict(&self, x: ArrayView1<f32>) -> u8 {
        self.predict_rows(x.insert_axis(Axis(0))).first().copied().unwrap_or(0)
    }

    pub fn n_trees(&self) -> usize {
        self.members.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Hash identifying this fitted model
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }
}

impl std::fmt::Debug for RandomForest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RandomForest")
            .field("n_trees", &self.members.len())
            .field("n_features", &self.n_features)
            .field("n_classes", &self.n_classes)
            .field("fingerprint", &format_args!("{:016x}", self.fingerprint))
            .finish()
    }
}

impl PartialEq for RandomForest {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint
            && self.n_features == other.n_features
            && self.n_classes == other.n_classes
            && self.members.len() == other.members.len()
    }
}
