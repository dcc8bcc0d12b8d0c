//! Command-line interface definitions and argument parsing

use crate::gap::{GapStatistic, DEFAULT_REFERENCE_TRIALS};
use crate::model::KMeansClusterer;
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;

/// Pick the number of K-Means clusters in a CSV feature matrix using the gap statistic
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the input CSV file (header row required)
    #[arg(short, long, default_value = "data.csv")]
    pub input: PathBuf,

    /// Feature columns to cluster on, comma-separated; defaults to every column
    /// Example: --columns price,range_km,weight_kg
    #[arg(short, long, value_delimiter = ',')]
    pub columns: Option<Vec<String>>,

    /// Largest candidate number of clusters (at least 2)
    #[arg(short = 'k', long, default_value = "10")]
    pub max_clusters: usize,

    /// Uniform reference datasets clustered per candidate k
    #[arg(long, default_value_t = DEFAULT_REFERENCE_TRIALS)]
    pub reference_trials: usize,

    /// Seed for reference data and K-Means initialization
    #[arg(long)]
    pub seed: Option<u64>,

    /// Min-max scale every feature into [0, 1] before clustering
    #[arg(long)]
    pub normalize: bool,

    /// Maximum iterations for K-Means algorithm
    #[arg(long, default_value = "300")]
    pub max_iters: u64,

    /// Tolerance for K-Means convergence
    #[arg(long, default_value = "1e-4")]
    pub tolerance: f64,

    /// Write diagnostic plots (SVG) to this path
    #[arg(short, long)]
    pub plot: Option<PathBuf>,

    /// Write the input rows with their cluster label to this CSV path
    #[arg(short = 'o', long)]
    pub labels_out: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Search configuration from the arguments
    pub fn gap_statistic(&self) -> GapStatistic {
        GapStatistic::new(self.max_clusters).with_reference_trials(self.reference_trials)
    }

    /// K-Means strategy from the arguments
    pub fn clusterer(&self) -> KMeansClusterer {
        KMeansClusterer::new()
            .with_max_iters(self.max_iters)
            .with_tolerance(self.tolerance)
    }

    /// Seeded RNG when `--seed` is given, otherwise seeded from OS entropy
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}
