//! Diagnostic plots of the gap search using Plotters

use crate::data::FeatureData;
use crate::gap::{GapCurve, GapResult};
use ndarray::{Array1, Array2};
use plotters::coord::Shift;
use plotters::prelude::*;
use std::path::{Path, PathBuf};

/// Two stacked panels: gap statistic vs k, and its first difference vs k
///
/// # Arguments
/// * `curve` - Gap curve from the search
/// * `best_k` - Chosen cluster count, shown in the title
/// * `output_path` - Path of the SVG to write
pub fn plot_gap_curve(curve: &GapCurve, best_k: usize, output_path: &Path) -> crate::Result<()> {
    let gaps: Vec<(f64, f64)> = curve
        .points()
        .iter()
        .map(|p| (p.k as f64, p.gap))
        .filter(|&(_, gap)| gap.is_finite())
        .collect();
    let differences: Vec<(f64, f64)> = curve
        .differences()
        .into_iter()
        .map(|(k, diff)| (k as f64, diff))
        .filter(|&(_, diff)| diff.is_finite())
        .collect();

    let max_k = curve.len().max(1) as f64;

    let root = SVGBackend::new(output_path, (900, 700)).into_drawing_area();
    root.fill(&WHITE)?;
    let root = root.titled(
        &format!("Number of optimal clusters is: {best_k}"),
        ("sans-serif", 24),
    )?;

    let panels = root.split_evenly((2, 1));
    draw_line_panel(&panels[0], max_k, "Gap Statistic", &gaps)?;
    draw_line_panel(&panels[1], max_k, "Change in Gap Statistic", &differences)?;

    root.present()?;
    Ok(())
}

fn draw_line_panel(
    area: &DrawingArea<SVGBackend<'_>, Shift>,
    max_k: f64,
    y_desc: &str,
    points: &[(f64, f64)],
) -> crate::Result<()> {
    let (y_min, y_max) = padded_bounds(points.iter().map(|&(_, y)| y));

    let mut chart = ChartBuilder::on(area)
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0.5f64..(max_k + 0.5), y_min..y_max)?;

    chart
        .configure_mesh()
        .x_desc("Number of clusters")
        .y_desc(y_desc)
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    chart.draw_series(LineSeries::new(points.iter().copied(), &BLUE))?;
    chart.draw_series(
        points
            .iter()
            .map(|&(x, y)| Circle::new((x, y), 4, BLUE.filled())),
    )?;

    Ok(())
}

/// Scatter of the first two feature columns colored by cluster
pub fn plot_clusters(
    features: &Array2<f64>,
    labels: &Array1<usize>,
    column_names: &[String],
    output_path: &Path,
) -> crate::Result<()> {
    if features.ncols() < 2 {
        anyhow::bail!("Cluster scatter needs at least 2 feature columns");
    }
    if labels.len() != features.nrows() {
        anyhow::bail!(
            "Got {} labels for {} rows",
            labels.len(),
            features.nrows()
        );
    }

    let (x_min, x_max) = padded_bounds(features.column(0).iter().copied());
    let (y_min, y_max) = padded_bounds(features.column(1).iter().copied());
    let x_desc = column_names.first().map_or("x0", String::as_str);
    let y_desc = column_names.get(1).map_or("x1", String::as_str);

    let root = SVGBackend::new(output_path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Cluster assignments", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;

    chart
        .configure_mesh()
        .x_desc(x_desc)
        .y_desc(y_desc)
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    let n_clusters = labels.iter().max().map_or(0, |&max| max + 1);
    for cluster in 0..n_clusters {
        let color = Palette99::pick(cluster);
        let members = features
            .rows()
            .into_iter()
            .zip(labels.iter())
            .filter(|&(_, &label)| label == cluster)
            .map(|(row, _)| Circle::new((row[0], row[1]), 4, color.filled()));

        chart
            .draw_series(members)?
            .label(format!("Cluster {cluster}"))
            .legend(move |(x, y)| Circle::new((x, y), 4, Palette99::pick(cluster).filled()));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

/// Write the gap-curve plot and, for data with 2+ columns, the cluster scatter
///
/// The scatter goes next to `base_output_path` with a `_clusters` suffix.
/// Returns the paths written.
pub fn generate_diagnostic_report(
    data: &FeatureData,
    result: &GapResult,
    base_output_path: &Path,
) -> crate::Result<Vec<PathBuf>> {
    let mut written = Vec::new();

    plot_gap_curve(&result.curve, result.best_k, base_output_path)?;
    written.push(base_output_path.to_path_buf());

    if data.features.ncols() >= 2 {
        let scatter_path = sibling_path(base_output_path, "_clusters");
        plot_clusters(
            &data.features,
            &result.labels,
            &data.column_names,
            &scatter_path,
        )?;
        written.push(scatter_path);
    }

    Ok(written)
}

/// `dir/name.svg` -> `dir/name<suffix>.svg`
fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "gap".to_string());
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "svg".to_string());
    path.with_file_name(format!("{stem}{suffix}.{extension}"))
}

/// Min/max of the finite values with 10% padding; never an empty range
fn padded_bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (min, max) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });

    if !min.is_finite() {
        return (-1.0, 1.0);
    }
    let pad = if max > min { (max - min) * 0.1 } else { 1.0 };
    (min - pad, max + pad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gap::{find_optimal_clusters, reference_matrix};
    use crate::model::KMeansClusterer;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::tempdir;

    fn create_test_data() -> (FeatureData, GapResult) {
        let mut rng = StdRng::seed_from_u64(17);
        let features = reference_matrix(24, 2, &mut rng);
        let data = FeatureData::from_matrix(features);
        let result =
            find_optimal_clusters(data.features.view(), 4, &KMeansClusterer::new(), &mut rng)
                .unwrap();
        (data, result)
    }

    #[test]
    fn test_plot_gap_curve() {
        let (_data, result) = create_test_data();
        let temp_dir = tempdir().unwrap();
        let output_path = temp_dir.path().join("gap.svg");

        plot_gap_curve(&result.curve, result.best_k, &output_path).unwrap();
        assert!(output_path.exists());
    }

    #[test]
    fn test_plot_clusters_needs_two_columns() {
        let features = Array2::zeros((3, 1));
        let labels = Array1::zeros(3);
        let temp_dir = tempdir().unwrap();

        let result = plot_clusters(
            &features,
            &labels,
            &["x0".to_string()],
            &temp_dir.path().join("scatter.svg"),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_generate_diagnostic_report() {
        let (data, result) = create_test_data();
        let temp_dir = tempdir().unwrap();
        let output_path = temp_dir.path().join("report.svg");

        let written = generate_diagnostic_report(&data, &result, &output_path).unwrap();

        assert_eq!(
            written,
            vec![output_path.clone(), temp_dir.path().join("report_clusters.svg")]
        );
        assert!(written.iter().all(|path| path.exists()));
    }

    #[test]
    fn test_padded_bounds() {
        assert_eq!(padded_bounds([0.0, 10.0].into_iter()), (-1.0, 11.0));
        assert_eq!(padded_bounds([2.0, f64::NAN].into_iter()), (1.0, 3.0));
        assert_eq!(padded_bounds(std::iter::empty()), (-1.0, 1.0));
    }
}
