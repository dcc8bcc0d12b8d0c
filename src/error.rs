//! Error types for the cluster-count search.

use thiserror::Error;

/// Errors raised by the gap-statistic search itself.
///
/// Clustering strategies may fail with their own error types; those are
/// propagated untouched through [`crate::Result`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GapError {
    /// The candidate range cannot produce a first difference.
    #[error("max_clusters must be at least 2 to select a cluster count, got {max_clusters}")]
    TooFewCandidates {
        /// Requested largest candidate k.
        max_clusters: usize,
    },

    /// The feature matrix has no rows or no columns.
    #[error("feature matrix is empty ({rows} rows, {cols} columns)")]
    EmptyInput {
        /// Number of rows supplied.
        rows: usize,
        /// Number of columns supplied.
        cols: usize,
    },

    /// A configuration value is out of range.
    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// More clusters were requested than there are rows.
    #[error("cannot create {requested} clusters from {n_rows} rows")]
    TooManyClusters {
        /// Requested cluster count.
        requested: usize,
        /// Rows available.
        n_rows: usize,
    },

    /// A clustering strategy returned the wrong number of labels.
    #[error("clustering returned {found} labels for {expected} rows")]
    LabelCountMismatch {
        /// Rows in the clustered matrix.
        expected: usize,
        /// Labels returned.
        found: usize,
    },

    /// Every first difference of the gap curve was non-numeric.
    #[error("no finite gap difference for k in 2..={max_clusters}; data scores are degenerate")]
    NoValidGap {
        /// Largest candidate k searched.
        max_clusters: usize,
    },
}

impl GapError {
    /// Create an InvalidParameter error.
    pub fn invalid_parameter(name: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = GapError::TooFewCandidates { max_clusters: 1 };
        assert!(err.to_string().contains("at least 2"));

        let err = GapError::TooManyClusters {
            requested: 5,
            n_rows: 3,
        };
        assert_eq!(err.to_string(), "cannot create 5 clusters from 3 rows");

        let err = GapError::invalid_parameter("reference_trials", "must be at least 1");
        assert_eq!(
            err.to_string(),
            "invalid parameter 'reference_trials': must be at least 1"
        );
    }

    #[test]
    fn test_downcast_through_anyhow() {
        let err: anyhow::Error = GapError::NoValidGap { max_clusters: 4 }.into();
        assert_eq!(
            err.downcast_ref::<GapError>(),
            Some(&GapError::NoValidGap { max_clusters: 4 })
        );
    }
}
