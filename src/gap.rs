//! Gap-statistic selection of the cluster count
//!
//! For each candidate k the data is clustered and scored, and the same is
//! done for uniform random reference matrices of identical shape. The gap at
//! k is `ln(reference score) - ln(data score)`; the chosen k is the one where
//! the gap grows the most from k-1 to k.

use crate::error::GapError;
use crate::model::Clusterer;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::RngCore;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Reference clusterings averaged per candidate k unless configured otherwise
pub const DEFAULT_REFERENCE_TRIALS: usize = 2;

/// Outcome of clustering the data and its references at one k
#[derive(Debug, Clone)]
pub struct GapTrial {
    /// `ln(reference_score) - ln(data_score)`, NaN when either score is zero
    pub gap: f64,
    /// Within-cluster score of the data
    pub data_score: f64,
    /// Mean within-cluster score over the reference matrices
    pub reference_score: f64,
    /// Labels assigned to the data rows
    pub labels: Array1<usize>,
}

/// One entry of the gap curve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GapPoint {
    pub k: usize,
    pub data_score: f64,
    pub reference_score: f64,
    pub gap: f64,
}

/// Gap statistic for every candidate k, in ascending k starting at 1
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GapCurve {
    points: Vec<GapPoint>,
}

impl GapCurve {
    fn push(&mut self, point: GapPoint) {
        debug_assert_eq!(point.k, self.points.len() + 1);
        self.points.push(point);
    }

    pub fn points(&self) -> &[GapPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// First differences `(k, gap[k] - gap[k-1])` for k = 2..=K.
    ///
    /// Differences involving a NaN gap are NaN.
    pub fn differences(&self) -> Vec<(usize, f64)> {
        self.points
            .windows(2)
            .map(|pair| (pair[1].k, pair[1].gap - pair[0].gap))
            .collect()
    }

    /// The k with the largest finite first difference; ties keep the smaller k.
    pub fn best_k(&self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (k, diff) in self.differences() {
            if !diff.is_finite() {
                continue;
            }
            match best {
                Some((_, best_diff)) if diff <= best_diff => {}
                _ => best = Some((k, diff)),
            }
        }
        best.map(|(k, _)| k)
    }
}

/// Result of the optimal-k search
#[derive(Debug, Clone)]
pub struct GapResult {
    /// Chosen cluster count
    pub best_k: usize,
    /// Data labels computed at `best_k`
    pub labels: Array1<usize>,
    /// Full gap curve for diagnostics
    pub curve: GapCurve,
}

/// Gap-statistic search configuration
#[derive(Debug, Clone)]
pub struct GapStatistic {
    /// Largest candidate cluster count
    pub max_clusters: usize,
    /// Reference matrices clustered per candidate k
    pub reference_trials: usize,
}

impl GapStatistic {
    /// Search k in `1..=max_clusters` with the default reference trial count.
    pub fn new(max_clusters: usize) -> Self {
        Self {
            max_clusters,
            reference_trials: DEFAULT_REFERENCE_TRIALS,
        }
    }

    /// Set how many reference matrices are averaged per k.
    pub fn with_reference_trials(mut self, reference_trials: usize) -> Self {
        self.reference_trials = reference_trials;
        self
    }

    /// Check the search settings without looking at any data.
    pub fn validate_config(&self) -> Result<(), GapError> {
        if self.max_clusters < 2 {
            return Err(GapError::TooFewCandidates {
                max_clusters: self.max_clusters,
            });
        }
        if self.reference_trials == 0 {
            return Err(GapError::invalid_parameter(
                "reference_trials",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    fn validate(&self, data: &ArrayView2<'_, f64>) -> Result<(), GapError> {
        self.validate_config()?;
        if data.nrows() == 0 || data.ncols() == 0 {
            return Err(GapError::EmptyInput {
                rows: data.nrows(),
                cols: data.ncols(),
            });
        }
        Ok(())
    }

    /// Cluster the data and a fresh reference matrix at `k` and compute the gap.
    ///
    /// One reference matrix is drawn per call and clustered `reference_trials`
    /// times, so the averaging smooths the strategy's own randomness against a
    /// single baseline. Strategy errors are returned unchanged.
    pub fn trial<C: Clusterer + ?Sized>(
        &self,
        data: ArrayView2<'_, f64>,
        k: usize,
        clusterer: &C,
        rng: &mut dyn RngCore,
    ) -> crate::Result<GapTrial> {
        if self.reference_trials == 0 {
            return Err(
                GapError::invalid_parameter("reference_trials", "must be at least 1").into(),
            );
        }

        let reference = reference_matrix(data.nrows(), data.ncols(), rng);
        let mut reference_total = 0.0;
        for _ in 0..self.reference_trials {
            let labels = fit_labels(clusterer, reference.view(), k, rng)?;
            reference_total += cluster_score(reference.view(), labels.view());
        }
        let reference_score = reference_total / self.reference_trials as f64;

        let labels = fit_labels(clusterer, data, k, rng)?;
        let data_score = cluster_score(data, labels.view());

        let gap = if reference_score > 0.0 && data_score > 0.0 {
            reference_score.ln() - data_score.ln()
        } else {
            f64::NAN
        };

        debug!(k, data_score, reference_score, gap, "gap trial");
        if gap.is_nan() {
            warn!(k, data_score, reference_score, "degenerate score, gap is undefined");
        }

        Ok(GapTrial {
            gap,
            data_score,
            reference_score,
            labels,
        })
    }

    /// Run a trial for every k in `1..=max_clusters` and pick the best k.
    ///
    /// Configuration is checked before any clustering is attempted.
    pub fn search<C: Clusterer + ?Sized>(
        &self,
        data: ArrayView2<'_, f64>,
        clusterer: &C,
        rng: &mut dyn RngCore,
    ) -> crate::Result<GapResult> {
        self.validate(&data)?;

        let mut curve = GapCurve::default();
        let mut assignments = Vec::with_capacity(self.max_clusters);
        for k in 1..=self.max_clusters {
            let trial = self.trial(data, k, clusterer, rng)?;
            curve.push(GapPoint {
                k,
                data_score: trial.data_score,
                reference_score: trial.reference_score,
                gap: trial.gap,
            });
            assignments.push(trial.labels);
        }

        let best_k = curve.best_k().ok_or(GapError::NoValidGap {
            max_clusters: self.max_clusters,
        })?;
        // best_k is in 2..=max_clusters and assignments holds one entry per k
        let labels = assignments.swap_remove(best_k - 1);

        info!(best_k, max_clusters = self.max_clusters, "selected cluster count");

        Ok(GapResult {
            best_k,
            labels,
            curve,
        })
    }
}

/// Search `1..=max_clusters` with the default number of reference trials.
pub fn find_optimal_clusters<C: Clusterer + ?Sized>(
    data: ArrayView2<'_, f64>,
    max_clusters: usize,
    clusterer: &C,
    rng: &mut dyn RngCore,
) -> crate::Result<GapResult> {
    GapStatistic::new(max_clusters).search(data, clusterer, rng)
}

/// Sum over clusters of the mean nonzero pairwise distance between members.
///
/// Clusters without any nonzero distance (singletons, or all members equal)
/// contribute nothing, so an all-singleton assignment scores 0.
pub fn cluster_score(data: ArrayView2<'_, f64>, labels: ArrayView1<'_, usize>) -> f64 {
    let mut members: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (row, &label) in labels.iter().enumerate() {
        members.entry(label).or_default().push(row);
    }

    let mut total = 0.0;
    for rows in members.values() {
        let mut sum = 0.0;
        let mut count = 0usize;
        for (i, &a) in rows.iter().enumerate() {
            for &b in &rows[i + 1..] {
                let distance = euclidean_distance(data.row(a), data.row(b));
                if distance != 0.0 {
                    sum += distance;
                    count += 1;
                }
            }
        }
        if count > 0 {
            total += sum / count as f64;
        }
    }
    total
}

/// Uniform [0, 1) matrix of the given shape
pub fn reference_matrix(rows: usize, cols: usize, rng: &mut dyn RngCore) -> Array2<f64> {
    Array2::random_using((rows, cols), Uniform::new(0.0, 1.0), rng)
}

fn fit_labels<C: Clusterer + ?Sized>(
    clusterer: &C,
    data: ArrayView2<'_, f64>,
    k: usize,
    rng: &mut dyn RngCore,
) -> crate::Result<Array1<usize>> {
    let labels = clusterer.fit_predict(data, k, rng)?;
    if labels.len() != data.nrows() {
        return Err(GapError::LabelCountMismatch {
            expected: data.nrows(),
            found: labels.len(),
        }
        .into());
    }
    Ok(labels)
}

fn euclidean_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{clusterer_fn, KMeansClusterer};
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::cell::{Cell, RefCell};

    fn curve_from_gaps(gaps: &[f64]) -> GapCurve {
        let mut curve = GapCurve::default();
        for (i, &gap) in gaps.iter().enumerate() {
            curve.push(GapPoint {
                k: i + 1,
                data_score: 1.0,
                reference_score: 1.0,
                gap,
            });
        }
        curve
    }

    #[test]
    fn test_cluster_score_two_pairs() {
        let data = array![[0.0, 0.0], [0.0, 1.0], [10.0, 0.0], [10.0, 1.0]];
        let labels = array![0, 0, 1, 1];

        let score = cluster_score(data.view(), labels.view());
        assert!((score - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_cluster_score_single_cluster_mean() {
        // Triangle with sides 3, 4, 5
        let data = array![[0.0, 0.0], [3.0, 0.0], [0.0, 4.0]];
        let labels = array![0, 0, 0];

        let score = cluster_score(data.view(), labels.view());
        assert!((score - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_cluster_score_singletons_are_zero() {
        let data = array![[0.0], [1.0], [2.0]];
        let labels = array![0, 1, 2];

        assert_eq!(cluster_score(data.view(), labels.view()), 0.0);
    }

    #[test]
    fn test_cluster_score_skips_zero_distances() {
        // Duplicate rows are ignored, leaving the mean of two distances of 2
        let data = array![[0.0], [0.0], [2.0]];
        let labels = array![0, 0, 0];

        let score = cluster_score(data.view(), labels.view());
        assert!((score - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_cluster_score_is_pure() {
        let mut rng = StdRng::seed_from_u64(3);
        let data = reference_matrix(20, 3, &mut rng);
        let labels = Array1::from_iter((0..20).map(|i| i % 4));

        let first = cluster_score(data.view(), labels.view());
        let second = cluster_score(data.view(), labels.view());
        assert_eq!(first, second);
    }

    #[test]
    fn test_reference_matrix_shape_and_range() {
        let mut rng = StdRng::seed_from_u64(11);
        let reference = reference_matrix(50, 4, &mut rng);

        assert_eq!(reference.shape(), &[50, 4]);
        assert!(reference.iter().all(|&v| (0.0..1.0).contains(&v)));
    }

    #[test]
    fn test_best_k_uses_first_difference() {
        let curve = curve_from_gaps(&[-2.0, 0.5, 0.8, 0.2]);
        assert_eq!(curve.best_k(), Some(2));

        let differences = curve.differences();
        assert_eq!(differences.len(), 3);
        assert_eq!(differences[0].0, 2);
        assert!((differences[0].1 - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_best_k_skips_nan_and_keeps_first_tie() {
        let curve = curve_from_gaps(&[f64::NAN, 0.0, 1.0, 2.0]);
        assert_eq!(curve.best_k(), Some(3));

        let all_nan = curve_from_gaps(&[f64::NAN, f64::NAN, f64::NAN]);
        assert_eq!(all_nan.best_k(), None);
    }

    #[test]
    fn test_trial_nan_gap_on_zero_score() {
        let data = array![[1.0, 1.0], [1.0, 1.0], [1.0, 1.0]];
        let everything_together =
            clusterer_fn(|data, _k, _rng| Ok(Array1::zeros(data.nrows())));
        let mut rng = StdRng::seed_from_u64(5);

        let trial = GapStatistic::new(3)
            .trial(data.view(), 1, &everything_together, &mut rng)
            .unwrap();

        assert_eq!(trial.data_score, 0.0);
        assert!(trial.reference_score > 0.0);
        assert!(trial.gap.is_nan());
    }

    #[test]
    fn test_trial_reference_count() {
        let calls = Cell::new(0usize);
        let counting = clusterer_fn(|data, _k, _rng| {
            calls.set(calls.get() + 1);
            Ok(Array1::zeros(data.nrows()))
        });
        let data = array![[0.0], [1.0]];
        let mut rng = StdRng::seed_from_u64(1);

        GapStatistic::new(2)
            .with_reference_trials(3)
            .trial(data.view(), 1, &counting, &mut rng)
            .unwrap();

        // three reference clusterings plus one on the data
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn test_reference_trials_share_one_matrix() {
        let seen = RefCell::new(Vec::new());
        let recording = clusterer_fn(|data, _k, _rng| {
            seen.borrow_mut().push(data.to_owned());
            Ok(Array1::zeros(data.nrows()))
        });
        let data = array![[5.0, 5.0], [6.0, 6.0], [7.0, 7.0]];
        let mut rng = StdRng::seed_from_u64(4);

        GapStatistic::new(2)
            .with_reference_trials(3)
            .trial(data.view(), 1, &recording, &mut rng)
            .unwrap();

        let seen = seen.into_inner();
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[0], seen[1]);
        assert_eq!(seen[0], seen[2]);
        assert!(seen[0].iter().all(|&v| (0.0..1.0).contains(&v)));
        // the data itself is clustered last
        assert_eq!(seen[3], data);
    }

    #[test]
    fn test_reference_matrix_redrawn_per_trial() {
        let seen = RefCell::new(Vec::new());
        let recording = clusterer_fn(|data, _k, _rng| {
            seen.borrow_mut().push(data.to_owned());
            Ok(Array1::zeros(data.nrows()))
        });
        let data = array![[0.0], [1.0], [2.0]];
        let gap = GapStatistic::new(2);
        let mut rng = StdRng::seed_from_u64(4);

        gap.trial(data.view(), 1, &recording, &mut rng).unwrap();
        gap.trial(data.view(), 2, &recording, &mut rng).unwrap();

        let seen = seen.into_inner();
        assert_eq!(seen.len(), 6);
        assert_ne!(seen[0], seen[3]);
    }

    #[test]
    fn test_validate_config() {
        assert_eq!(
            GapStatistic::new(1).validate_config(),
            Err(GapError::TooFewCandidates { max_clusters: 1 })
        );
        assert!(matches!(
            GapStatistic::new(3)
                .with_reference_trials(0)
                .validate_config(),
            Err(GapError::InvalidParameter {
                name: "reference_trials",
                ..
            })
        ));
        assert_eq!(GapStatistic::new(2).validate_config(), Ok(()));
    }

    #[test]
    fn test_search_labels_match_best_k_trial() {
        // labels encode the k they were produced for
        let tagged = clusterer_fn(|data, k, _rng| {
            let n = data.nrows();
            Ok(Array1::from_iter((0..n).map(|i| if i < n / 2 { 0 } else { k - 1 })))
        });
        let data = array![[0.0, 0.0], [0.0, 1.0], [10.0, 0.0], [10.0, 1.0]];
        let mut rng = StdRng::seed_from_u64(8);

        let result = find_optimal_clusters(data.view(), 4, &tagged, &mut rng).unwrap();

        let expected = result.best_k - 1;
        assert_eq!(result.labels[3], expected);
        assert_eq!(result.curve.len(), 4);
    }

    #[test]
    fn test_label_count_mismatch() {
        let short = clusterer_fn(|_data, _k, _rng| Ok(Array1::zeros(1)));
        let data = array![[0.0], [1.0], [2.0]];
        let mut rng = StdRng::seed_from_u64(1);

        let err = GapStatistic::new(2)
            .trial(data.view(), 1, &short, &mut rng)
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<GapError>(),
            Some(&GapError::LabelCountMismatch {
                expected: 3,
                found: 1
            })
        );
    }

    #[test]
    fn test_search_rejects_single_candidate_before_clustering() {
        let calls = Cell::new(0usize);
        let counting = clusterer_fn(|data, _k, _rng| {
            calls.set(calls.get() + 1);
            Ok(Array1::zeros(data.nrows()))
        });
        let data = array![[0.0], [1.0]];
        let mut rng = StdRng::seed_from_u64(1);

        let err = find_optimal_clusters(data.view(), 1, &counting, &mut rng).unwrap_err();

        assert_eq!(
            err.downcast_ref::<GapError>(),
            Some(&GapError::TooFewCandidates { max_clusters: 1 })
        );
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_search_rejects_empty_matrix() {
        let data: Array2<f64> = Array2::zeros((0, 2));
        let mut rng = StdRng::seed_from_u64(1);

        let err = find_optimal_clusters(data.view(), 3, &KMeansClusterer::new(), &mut rng)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GapError>(),
            Some(GapError::EmptyInput { rows: 0, cols: 2 })
        ));
    }

    #[test]
    fn test_search_curve_has_one_entry_per_k() {
        let mut rng = StdRng::seed_from_u64(9);
        let data = reference_matrix(30, 2, &mut rng);

        let result =
            find_optimal_clusters(data.view(), 5, &KMeansClusterer::new(), &mut rng).unwrap();

        let ks: Vec<usize> = result.curve.points().iter().map(|p| p.k).collect();
        assert_eq!(ks, vec![1, 2, 3, 4, 5]);
        assert!(result.best_k >= 2 && result.best_k <= 5);
        assert_eq!(result.labels.len(), 30);
    }

    #[test]
    fn test_search_propagates_clustering_failure() {
        let data = array![[0.0, 0.0], [1.0, 1.0]];
        let mut rng = StdRng::seed_from_u64(2);

        let err = find_optimal_clusters(data.view(), 3, &KMeansClusterer::new(), &mut rng)
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<GapError>(),
            Some(&GapError::TooManyClusters {
                requested: 3,
                n_rows: 2
            })
        );
    }
}
