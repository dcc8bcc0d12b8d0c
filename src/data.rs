//! Feature matrix loading, scaling and labelled export using Polars

use anyhow::Context;
use linfa::traits::{Fit, Transformer};
use linfa::Dataset;
use linfa_preprocessing::linear_scaling::LinearScaler;
use ndarray::{Array1, Array2, ArrayView1};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

/// Feature matrix loaded from a CSV file
#[derive(Debug)]
pub struct FeatureData {
    /// Matrix handed to the clustering search (scaled when a scaler is set)
    pub features: Array2<f64>,
    /// Values as read from the file
    pub raw_features: Array2<f64>,
    /// Column name for each feature, in matrix order
    pub column_names: Vec<String>,
    /// Min-max scaler fitted on the raw features, if normalization was requested
    pub scaler: Option<LinearScaler<f64>>,
}

impl FeatureData {
    /// Wrap an in-memory matrix, naming columns `x0`, `x1`, ...
    pub fn from_matrix(features: Array2<f64>) -> Self {
        let column_names = (0..features.ncols()).map(|j| format!("x{j}")).collect();
        Self {
            raw_features: features.clone(),
            features,
            column_names,
            scaler: None,
        }
    }

    /// Fit a min-max scaler and replace the features with their values in [0, 1]
    ///
    /// Constant columns map to 0.
    pub fn normalize(mut self) -> crate::Result<Self> {
        let n_samples = self.raw_features.nrows();
        let dataset = Dataset::new(self.raw_features.clone(), Array1::<usize>::zeros(n_samples));
        let scaler = LinearScaler::min_max().fit(&dataset)?;
        self.features = scaler.transform(self.raw_features.clone());
        self.scaler = Some(scaler);
        Ok(self)
    }

    pub fn n_rows(&self) -> usize {
        self.features.nrows()
    }
}

/// Load a CSV file into a feature matrix
///
/// # Arguments
/// * `file_path` - CSV file with a header row
/// * `columns` - Columns to use as features; all columns when `None`
///
/// Rows with a missing value in any selected column are dropped. Every
/// selected column must be numeric.
pub fn load_features(file_path: &Path, columns: Option<&[String]>) -> crate::Result<FeatureData> {
    let mut lazy = LazyCsvReader::new(file_path)
        .with_has_header(true)
        .finish()
        .with_context(|| format!("failed to open {}", file_path.display()))?;

    if let Some(columns) = columns {
        if columns.is_empty() {
            anyhow::bail!("At least one feature column must be selected");
        }
        let exprs: Vec<Expr> = columns.iter().map(|name| col(name.as_str())).collect();
        lazy = lazy.select(exprs);
    }

    let df = lazy
        .drop_nulls(None)
        .collect()
        .with_context(|| format!("failed to read {}", file_path.display()))?;

    if df.height() == 0 || df.width() == 0 {
        anyhow::bail!("No complete rows found in {}", file_path.display());
    }

    let features = dataframe_to_matrix(&df)?;
    let column_names = df
        .get_column_names()
        .into_iter()
        .map(str::to_string)
        .collect();

    Ok(FeatureData {
        raw_features: features.clone(),
        features,
        column_names,
        scaler: None,
    })
}

/// Convert every column of a DataFrame to f64 and stack them into a matrix
fn dataframe_to_matrix(df: &DataFrame) -> crate::Result<Array2<f64>> {
    let mut matrix = Array2::zeros((df.height(), df.width()));

    for (j, series) in df.get_columns().iter().enumerate() {
        let values = series
            .strict_cast(&DataType::Float64)
            .with_context(|| format!("column '{}' is not numeric", series.name()))?;

        for (i, value) in values.f64()?.into_iter().enumerate() {
            matrix[[i, j]] = value
                .with_context(|| format!("column '{}' has a missing value at row {i}", series.name()))?;
        }
    }

    Ok(matrix)
}

/// Write the raw features plus a `cluster` column to CSV
pub fn write_labeled_csv(
    data: &FeatureData,
    labels: ArrayView1<'_, usize>,
    output_path: &Path,
) -> crate::Result<()> {
    if labels.len() != data.n_rows() {
        anyhow::bail!(
            "Got {} labels for {} rows",
            labels.len(),
            data.n_rows()
        );
    }

    let mut columns: Vec<Series> = data
        .column_names
        .iter()
        .zip(data.raw_features.columns())
        .map(|(name, values)| Series::new(name.as_str(), values.to_vec()))
        .collect();
    let cluster: Vec<i64> = labels.iter().map(|&label| label as i64).collect();
    columns.push(Series::new("cluster", cluster));

    let mut df = DataFrame::new(columns)?;
    let mut file = File::create(output_path)
        .with_context(|| format!("failed to create {}", output_path.display()))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut df)?;

    Ok(())
}
