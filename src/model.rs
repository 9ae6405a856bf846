//! Single-feature K-Means fitting

use crate::config::ScoringConfig;
use crate::data::{require_columns, CUSTOMER_ID};
use crate::error::RfmError;
use linfa::traits::{Fit, Predict};
use linfa::DatasetBase;
use linfa_clustering::KMeans;
use linfa_nn::distance::L2Dist;
use ndarray::{Array1, Array2};
use polars::prelude::{DataFrame, DataType, NamedFrom, Series};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// K-Means fit for one feature column
///
/// `centers` keep the fitted model's internal order; index `i` is the center of
/// raw cluster `i`. They are not sorted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterFit {
    /// Column the model was fitted on
    pub feature: String,
    /// Number of clusters
    pub n_clusters: usize,
    /// One center per raw cluster index
    pub centers: Vec<f64>,
    /// Raw cluster index per table row
    #[serde(skip)]
    pub labels: Vec<usize>,
    /// Within-cluster sum of squares
    pub inertia: f64,
    /// False when another Lloyd step would still move a center
    pub converged: bool,
}

impl ClusterFit {
    /// Raw cluster index of the center nearest to `value`
    ///
    /// Equal distances resolve to the lowest index. `None` only when the fit
    /// has no centers.
    pub fn predict(&self, value: f64) -> Option<usize> {
        self.centers
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| (value - **a).abs().total_cmp(&(value - **b).abs()))
            .map(|(idx, _)| idx)
    }

    /// Number of rows assigned to each raw cluster
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &label in &self.labels {
            if label < self.n_clusters {
                sizes[label] += 1;
            }
        }
        sizes
    }

    /// Append the raw labels to `table` as a `UInt32` column
    pub fn attach(&self, table: &DataFrame, column: &str) -> crate::Result<DataFrame> {
        if self.labels.len() != table.height() {
            return Err(RfmError::LabelMismatch(format!(
                "{} labels for {} rows",
                self.labels.len(),
                table.height()
            )));
        }

        let labels: Vec<u32> = self.labels.iter().map(|&label| label as u32).collect();
        let mut output = table.clone();
        output.with_column(Series::new(column, labels))?;
        Ok(output)
    }
}

/// Fit K-Means on one numeric column of `table`
///
/// # Arguments
/// * `table` - Feature table
/// * `column` - Name of the column to cluster
/// * `config` - Cluster count, seed and iteration cap
///
/// # Returns
/// * Labels per row and the unsorted cluster centers
pub fn fit_cluster(table: &DataFrame, column: &str, config: &ScoringConfig) -> crate::Result<ClusterFit> {
    let n_clusters = config.n_clusters;
    if n_clusters == 0 {
        return Err(RfmError::InvalidClusterCount(n_clusters));
    }

    let values = column_values(table, column)?;
    let customers = customer_count(table)?;
    if customers < n_clusters {
        return Err(RfmError::InsufficientData {
            requested: n_clusters,
            available: customers,
        });
    }

    let distinct = distinct_values(&values);
    if distinct.len() < n_clusters {
        warn!(
            feature = column,
            k = n_clusters,
            distinct = distinct.len(),
            "Fewer distinct values than clusters; padding with repeated centers"
        );
        return Ok(repeated_center_fit(column, n_clusters, &values, &distinct));
    }

    let records = Array2::from_shape_vec((values.len(), 1), values.clone())
        .map_err(|e| RfmError::Clustering(e.to_string()))?;
    let dataset = DatasetBase::from(records.clone());

    let model = KMeans::params_with(n_clusters, StdRng::seed_from_u64(config.seed), L2Dist)
        .max_n_iterations(config.max_iters)
        .tolerance(config.tolerance)
        .fit(&dataset)
        .map_err(|e| RfmError::Clustering(e.to_string()))?;

    let labels: Array1<usize> = model.predict(&records);
    let labels = labels.to_vec();
    let centers = model.centroids().column(0).to_vec();

    let inertia = compute_inertia(&values, &labels, &centers);
    let shift = lloyd_shift(&values, &labels, &centers);
    let converged = shift
        .iter()
        .zip(&centers)
        .all(|(delta, center)| *delta <= config.tolerance * center.abs().max(1.0));

    if converged {
        debug!(feature = column, k = n_clusters, inertia, "Fitted K-Means");
    } else {
        warn!(
            feature = column,
            k = n_clusters,
            max_iters = config.max_iters,
            "K-Means hit the iteration cap before centers settled; using best-effort labels"
        );
    }

    Ok(ClusterFit {
        feature: column.to_string(),
        n_clusters,
        centers,
        labels,
        inertia,
        converged,
    })
}

fn column_values(table: &DataFrame, column: &str) -> crate::Result<Vec<f64>> {
    require_columns(table, &[column])?;

    let series = table.column(column)?.cast(&DataType::Float64)?;
    series
        .f64()?
        .into_iter()
        .map(|value| value.ok_or_else(|| RfmError::NullValue(column.to_string())))
        .collect()
}

/// Distinct customers, or rows when the table has no `CustomerID`
fn customer_count(table: &DataFrame) -> crate::Result<usize> {
    if table.get_column_names().contains(&CUSTOMER_ID) {
        Ok(table.column(CUSTOMER_ID)?.n_unique()?)
    } else {
        Ok(table.height())
    }
}

/// Sorted distinct values
fn distinct_values(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted.dedup();
    sorted
}

/// One center per distinct value; the clusters left over repeat the largest
/// value and stay empty.
fn repeated_center_fit(column: &str, n_clusters: usize, values: &[f64], distinct: &[f64]) -> ClusterFit {
    let mut centers = distinct.to_vec();
    let largest = distinct.last().copied().unwrap_or_default();
    centers.resize(n_clusters, largest);

    let labels = values
        .iter()
        .map(|value| distinct.partition_point(|center| center < value))
        .collect();

    ClusterFit {
        feature: column.to_string(),
        n_clusters,
        centers,
        labels,
        inertia: 0.0,
        converged: false,
    }
}

/// Within-cluster sum of squares
fn compute_inertia(values: &[f64], labels: &[usize], centers: &[f64]) -> f64 {
    values
        .iter()
        .zip(labels)
        .filter(|(_, &label)| label < centers.len())
        .map(|(value, &label)| (value - centers[label]).powi(2))
        .sum()
}

/// Distance each center would move under one more Lloyd update
///
/// Empty clusters keep their center.
fn lloyd_shift(values: &[f64], labels: &[usize], centers: &[f64]) -> Vec<f64> {
    let mut sums = vec![0.0; centers.len()];
    let mut counts = vec![0usize; centers.len()];
    for (value, &label) in values.iter().zip(labels) {
        if label < centers.len() {
            sums[label] += value;
            counts[label] += 1;
        }
    }

    centers
        .iter()
        .enumerate()
        .map(|(idx, center)| match counts[idx] {
            0 => 0.0,
            n => (sums[idx] / n as f64 - center).abs(),
        })
        .collect()
}
