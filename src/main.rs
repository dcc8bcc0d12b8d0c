//! gapfinder: pick a cluster count for a CSV feature matrix with the gap statistic
//!
//! This is the main entrypoint that orchestrates data loading, the gap
//! search, diagnostic plots and labelled output.

use anyhow::Result;
use clap::Parser;
use gapfinder::model::cluster_sizes;
use gapfinder::{load_features, viz, write_labeled_csv, Args, GapResult};
use std::time::Instant;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    run_pipeline(&args)
}

/// Load data, search for the best cluster count and write the requested outputs
fn run_pipeline(args: &Args) -> Result<()> {
    let start_time = Instant::now();

    // Validate the search before touching the input file
    let gap_statistic = args.gap_statistic();
    gap_statistic.validate_config()?;

    // Step 1: Load data
    info!(input = %args.input.display(), "loading features");
    let mut data = load_features(&args.input, args.columns.as_deref())?;
    if args.normalize {
        data = data.normalize()?;
        debug!("features min-max scaled into [0, 1]");
    }
    info!(
        rows = data.n_rows(),
        columns = data.features.ncols(),
        "features loaded: {}",
        data.column_names.join(", ")
    );

    // Step 2: Gap search
    let clusterer = args.clusterer();
    let mut rng = args.rng();
    let search_start = Instant::now();
    let result = gap_statistic.search(data.features.view(), &clusterer, &mut rng)?;
    debug!(
        elapsed_secs = search_start.elapsed().as_secs_f64(),
        "gap search finished"
    );

    print_gap_report(&result, data.n_rows());

    // Step 3: Outputs
    if let Some(plot_path) = &args.plot {
        let written = viz::generate_diagnostic_report(&data, &result, plot_path)?;
        for path in written {
            info!(path = %path.display(), "plot written");
        }
    }

    if let Some(labels_path) = &args.labels_out {
        write_labeled_csv(&data, result.labels.view(), labels_path)?;
        info!(path = %labels_path.display(), "labelled rows written");
    }

    info!(
        elapsed_secs = start_time.elapsed().as_secs_f64(),
        "pipeline complete"
    );
    Ok(())
}

/// Print the gap curve, the chosen k and cluster sizes to stdout
fn print_gap_report(result: &GapResult, n_rows: usize) {
    println!("\n=== Gap Statistic ===");
    println!("  k | data score | reference score |      gap | change");
    println!("  --|------------|-----------------|----------|--------");

    let differences = result.curve.differences();
    for point in result.curve.points() {
        let change = differences
            .iter()
            .find(|(k, _)| *k == point.k)
            .map_or_else(|| "-".to_string(), |(_, diff)| format!("{diff:.4}"));
        println!(
            "  {:2} | {:10.4} | {:15.4} | {:8.4} | {}",
            point.k, point.data_score, point.reference_score, point.gap, change
        );
    }

    println!("\nOptimal number of clusters: {}", result.best_k);

    println!("\n=== Cluster Sizes ===");
    for (cluster, size) in cluster_sizes(&result.labels).into_iter().enumerate() {
        let percentage = (size as f64 / n_rows as f64) * 100.0;
        println!("Cluster {}: {} rows ({:.1}%)", cluster, size, percentage);
    }
}
