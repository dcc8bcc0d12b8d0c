//! gapfinder: choose the number of clusters in a feature matrix with the gap statistic
//!
//! The search clusters the data at every candidate k and compares its
//! within-cluster pairwise-distance score against uniform random reference
//! data of the same shape. K-Means from linfa is the default clustering
//! strategy; any [`model::Clusterer`] can be supplied instead.

pub mod cli;
pub mod data;
pub mod error;
pub mod gap;
pub mod model;
pub mod viz;

// Re-export public items for easier access
pub use cli::Args;
pub use data::{load_features, write_labeled_csv, FeatureData};
pub use error::GapError;
pub use gap::{cluster_score, find_optimal_clusters, GapCurve, GapResult, GapStatistic};
pub use model::{clusterer_fn, Clusterer, KMeansClusterer};
pub use viz::generate_diagnostic_report;

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
