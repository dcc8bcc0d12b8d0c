//! Clustering strategies consumed by the gap-statistic search

use crate::error::GapError;
use linfa::prelude::*;
use linfa_clustering::KMeans;
use linfa_nn::distance::L2Dist;
use ndarray::{Array1, ArrayView2};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

/// A clustering algorithm run at a fixed cluster count.
///
/// Implementations receive the matrix to cluster, the target number of
/// clusters and a source of randomness, and return one label per row.
pub trait Clusterer {
    /// Cluster `data` into `n_clusters` groups and return a label per row.
    fn fit_predict(
        &self,
        data: ArrayView2<'_, f64>,
        n_clusters: usize,
        rng: &mut dyn RngCore,
    ) -> crate::Result<Array1<usize>>;
}

impl<C: Clusterer + ?Sized> Clusterer for &C {
    fn fit_predict(
        &self,
        data: ArrayView2<'_, f64>,
        n_clusters: usize,
        rng: &mut dyn RngCore,
    ) -> crate::Result<Array1<usize>> {
        (**self).fit_predict(data, n_clusters, rng)
    }
}

/// K-Means strategy backed by linfa
#[derive(Debug, Clone)]
pub struct KMeansClusterer {
    /// Maximum Lloyd iterations per run
    pub max_iters: u64,
    /// Convergence tolerance on centroid movement
    pub tolerance: f64,
    /// Independent restarts; the run with lowest inertia wins
    pub n_runs: usize,
}

impl Default for KMeansClusterer {
    fn default() -> Self {
        Self {
            max_iters: 300,
            tolerance: 1e-4,
            n_runs: 10,
        }
    }
}

impl KMeansClusterer {
    /// Create a K-Means strategy with default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the iteration limit.
    pub fn with_max_iters(mut self, max_iters: u64) -> Self {
        self.max_iters = max_iters;
        self
    }

    /// Set the convergence tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the number of restarts.
    pub fn with_n_runs(mut self, n_runs: usize) -> Self {
        self.n_runs = n_runs;
        self
    }
}

impl Clusterer for KMeansClusterer {
    fn fit_predict(
        &self,
        data: ArrayView2<'_, f64>,
        n_clusters: usize,
        rng: &mut dyn RngCore,
    ) -> crate::Result<Array1<usize>> {
        if n_clusters == 0 {
            return Err(GapError::invalid_parameter("n_clusters", "must be at least 1").into());
        }

        if n_clusters > data.nrows() {
            return Err(GapError::TooManyClusters {
                requested: n_clusters,
                n_rows: data.nrows(),
            }
            .into());
        }

        let dataset = DatasetBase::from(data.to_owned());

        // linfa owns its RNG, so derive one from the caller's stream
        let run_rng = StdRng::seed_from_u64(rng.next_u64());
        let model = KMeans::params_with(n_clusters, run_rng, L2Dist)
            .max_n_iterations(self.max_iters)
            .tolerance(self.tolerance)
            .n_runs(self.n_runs)
            .fit(&dataset)?;

        let labels: Array1<usize> = model.predict(dataset.records());
        Ok(labels)
    }
}

/// Strategy wrapping a plain function or closure.
///
/// Build one with [`clusterer_fn`].
#[derive(Debug, Clone, Copy)]
pub struct FnClusterer<F>(F);

/// Wrap a function as a [`Clusterer`].
///
/// ```
/// use gapfinder::model::{clusterer_fn, Clusterer};
/// use ndarray::{array, Array1};
/// use rand::{rngs::StdRng, SeedableRng};
///
/// let halves = clusterer_fn(|data, k, _rng| {
///     let n = data.nrows();
///     Ok(Array1::from_iter((0..n).map(|i| i * k / n)))
/// });
/// let data = array![[0.0], [1.0], [2.0], [3.0]];
/// let labels = halves
///     .fit_predict(data.view(), 2, &mut StdRng::seed_from_u64(0))
///     .unwrap();
/// assert_eq!(labels.to_vec(), vec![0, 0, 1, 1]);
/// ```
pub fn clusterer_fn<F>(f: F) -> FnClusterer<F>
where
    F: Fn(ArrayView2<'_, f64>, usize, &mut dyn RngCore) -> crate::Result<Array1<usize>>,
{
    FnClusterer(f)
}

impl<F> Clusterer for FnClusterer<F>
where
    F: Fn(ArrayView2<'_, f64>, usize, &mut dyn RngCore) -> crate::Result<Array1<usize>>,
{
    fn fit_predict(
        &self,
        data: ArrayView2<'_, f64>,
        n_clusters: usize,
        rng: &mut dyn RngCore,
    ) -> crate::Result<Array1<usize>> {
        (self.0)(data, n_clusters, rng)
    }
}

/// Count rows per label, indexed by label value
pub fn cluster_sizes(labels: &Array1<usize>) -> Vec<usize> {
    let n_labels = labels.iter().max().map_or(0, |&max| max + 1);
    let mut sizes = vec![0; n_labels];
    for &label in labels.iter() {
        sizes[label] += 1;
    }
    sizes
}
