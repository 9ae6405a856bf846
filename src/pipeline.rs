//! RFM scoring pipeline
//!
//! extract features -> fit Recency, Frequency, MonetaryValue in turn -> rank each
//! fit into a 1..k score column. Any error aborts the run.

use crate::config::ScoringConfig;
use crate::data::CUSTOMER_ID;
use crate::error::RfmError;
use crate::features::{extract_features, FREQUENCY, MONETARY_VALUE, RECENCY};
use crate::model::{fit_cluster, ClusterFit};
use crate::rank::{rank_clusters, score_lookup, Direction};
use polars::prelude::{DataFrame, DataType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// The three scored customer features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    Recency,
    Frequency,
    MonetaryValue,
}

impl Feature {
    /// Fitting order used by the pipeline
    pub const ALL: [Feature; 3] = [Feature::Recency, Feature::Frequency, Feature::MonetaryValue];

    /// Raw feature column
    pub fn column(self) -> &'static str {
        match self {
            Feature::Recency => RECENCY,
            Feature::Frequency => FREQUENCY,
            Feature::MonetaryValue => MONETARY_VALUE,
        }
    }

    /// Raw cluster index column appended by the fitter
    pub fn cluster_column(self) -> &'static str {
        match self {
            Feature::Recency => "RecencyCluster",
            Feature::Frequency => "FrequencyCluster",
            Feature::MonetaryValue => "MonetaryValueCluster",
        }
    }

    /// Ordinal score column appended by the ranker
    pub fn score_column(self) -> &'static str {
        match self {
            Feature::Recency => "RecencyScore",
            Feature::Frequency => "FrequencyScore",
            Feature::MonetaryValue => "MonetaryValueScore",
        }
    }

    /// Fixed business direction: recent purchases, many purchases and high
    /// spend all score high
    pub fn direction(self) -> Direction {
        match self {
            Feature::Recency => Direction::Descending,
            Feature::Frequency | Feature::MonetaryValue => Direction::Ascending,
        }
    }

    /// Lower-case name used for file names
    pub fn slug(self) -> &'static str {
        match self {
            Feature::Recency => "recency",
            Feature::Frequency => "frequency",
            Feature::MonetaryValue => "monetary_value",
        }
    }
}

/// Fitted model and score mapping for one feature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureModel {
    pub feature: Feature,
    pub direction: Direction,
    pub fit: ClusterFit,
    /// Score per raw cluster index
    pub score_lookup: Vec<u32>,
}

impl FeatureModel {
    /// Score a new value through its nearest center
    ///
    /// `None` when the model has no center, or when the lookup does not cover
    /// the nearest one (a hand-edited model file, for instance).
    pub fn score(&self, value: f64) -> Option<u32> {
        self.fit
            .predict(value)
            .and_then(|raw| self.score_lookup.get(raw).copied())
    }

    fn require_score(&self, value: f64) -> crate::Result<u32> {
        self.score(value).ok_or_else(|| {
            RfmError::LabelMismatch(format!(
                "{} model cannot score {}: {} centers, {} scores",
                self.feature.column(),
                value,
                self.fit.centers.len(),
                self.score_lookup.len()
            ))
        })
    }
}

/// Scores for a single customer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RfmScores {
    pub recency: u32,
    pub frequency: u32,
    pub monetary_value: u32,
}

/// Raw-value statistics for the customers sharing one score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBand {
    pub score: u32,
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

/// Final pipeline output
#[derive(Debug, Clone)]
pub struct ScoreTable {
    /// Features, raw cluster columns and score columns, one row per customer
    pub frame: DataFrame,
    pub recency: FeatureModel,
    pub frequency: FeatureModel,
    pub monetary_value: FeatureModel,
}

impl ScoreTable {
    pub fn model(&self, feature: Feature) -> &FeatureModel {
        match feature {
            Feature::Recency => &self.recency,
            Feature::Frequency => &self.frequency,
            Feature::MonetaryValue => &self.monetary_value,
        }
    }

    pub fn models(&self) -> [&FeatureModel; 3] {
        [&self.recency, &self.frequency, &self.monetary_value]
    }

    pub fn n_customers(&self) -> usize {
        self.frame.height()
    }

    /// Score a customer who was not part of the fitted data
    pub fn predict(&self, recency: f64, frequency: f64, monetary_value: f64) -> crate::Result<RfmScores> {
        Ok(RfmScores {
            recency: self.recency.require_score(recency)?,
            frequency: self.frequency.require_score(frequency)?,
            monetary_value: self.monetary_value.require_score(monetary_value)?,
        })
    }

    /// `CustomerID`, the three raw features and the three scores
    pub fn report_frame(&self) -> crate::Result<DataFrame> {
        let mut columns = vec![CUSTOMER_ID];
        columns.extend(Feature::ALL.iter().map(|feature| feature.column()));
        columns.extend(Feature::ALL.iter().map(|feature| feature.score_column()));
        Ok(self.frame.select(columns)?)
    }

    /// Per-score statistics of the raw feature, ordered by score
    pub fn summary(&self, feature: Feature) -> crate::Result<Vec<ScoreBand>> {
        let values = self.frame.column(feature.column())?.cast(&DataType::Float64)?;
        let scores = self.frame.column(feature.score_column())?;

        let mut groups: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
        for (score, value) in scores.u32()?.into_iter().zip(values.f64()?.into_iter()) {
            if let (Some(score), Some(value)) = (score, value) {
                groups.entry(score).or_default().push(value);
            }
        }

        let bands = groups
            .into_iter()
            .map(|(score, values)| ScoreBand {
                score,
                count: values.len(),
                min: values.iter().copied().fold(f64::INFINITY, f64::min),
                max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                mean: values.iter().sum::<f64>() / values.len() as f64,
            })
            .collect();

        Ok(bands)
    }
}

/// Run the full pipeline on a filtered transaction table
///
/// # Arguments
/// * `transactions` - Table with `CustomerID`, `InvoiceDate`, `UnitPrice`, `Quantity`
/// * `config` - Cluster count (default 5) and fitter settings
///
/// # Returns
/// * Score table with a 1..k score per feature for every customer
pub fn build_scores(transactions: &DataFrame, config: &ScoringConfig) -> crate::Result<ScoreTable> {
    let features = extract_features(transactions)?;
    info!(customers = features.height(), "Feature table ready");
    score_features(features, config)
}

/// Fit and rank an already extracted feature table
pub fn score_features(features: DataFrame, config: &ScoringConfig) -> crate::Result<ScoreTable> {
    // Each fit sees the table with the previous fit's cluster column
    let (table, recency) = fit_feature(features, Feature::Recency, config)?;
    let (table, frequency) = fit_feature(table, Feature::Frequency, config)?;
    let (table, monetary_value) = fit_feature(table, Feature::MonetaryValue, config)?;

    let (table, recency) = rank_feature(table, recency)?;
    let (table, frequency) = rank_feature(table, frequency)?;
    let (table, monetary_value) = rank_feature(table, monetary_value)?;

    Ok(ScoreTable {
        frame: table,
        recency,
        frequency,
        monetary_value,
    })
}

fn fit_feature(
    table: DataFrame,
    feature: Feature,
    config: &ScoringConfig,
) -> crate::Result<(DataFrame, (Feature, ClusterFit))> {
    let fit = fit_cluster(&table, feature.column(), config)?;
    let table = fit.attach(&table, feature.cluster_column())?;
    Ok((table, (feature, fit)))
}

fn rank_feature(
    table: DataFrame,
    (feature, fit): (Feature, ClusterFit),
) -> crate::Result<(DataFrame, FeatureModel)> {
    let direction = feature.direction();
    let table = rank_clusters(&table, &fit.labels, &fit.centers, feature.score_column(), direction)?;
    let score_lookup = score_lookup(&fit.centers, direction);

    info!(
        feature = feature.column(),
        ?direction,
        ?score_lookup,
        inertia = fit.inertia,
        converged = fit.converged,
        "Scored feature"
    );

    let model = FeatureModel {
        feature,
        direction,
        fit,
        score_lookup,
    };
    Ok((table, model))
}
