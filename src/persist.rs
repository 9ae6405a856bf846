//! Writing scores and fitted models to disk
//!
//! Output locations are always passed in; a failed write never touches the
//! in-memory `ScoreTable`.

use crate::error::RfmError;
use crate::pipeline::ScoreTable;
use polars::prelude::{CsvWriter, SerWriter};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::info;

/// Where a run's outputs go
#[derive(Debug, Clone, PartialEq)]
pub struct OutputConfig {
    /// CSV file for the score report
    pub scores_path: PathBuf,
    /// Directory receiving one JSON model per feature
    pub models_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            scores_path: PathBuf::from("rfm_scores.csv"),
            models_dir: PathBuf::from("models"),
        }
    }
}

/// Save the score report and the fitted models
pub fn persist(table: &ScoreTable, output: &OutputConfig) -> crate::Result<()> {
    save_scores(table, &output.scores_path)?;
    save_models(table, &output.models_dir)?;
    Ok(())
}

/// Write `CustomerID`, raw features and scores as CSV
pub fn save_scores(table: &ScoreTable, path: &Path) -> crate::Result<()> {
    ensure_parent(path)?;

    let mut report = table.report_frame()?;
    let mut file = File::create(path).map_err(|source| RfmError::Persistence {
        path: path.to_path_buf(),
        source,
    })?;
    CsvWriter::new(&mut file).include_header(true).finish(&mut report)?;

    info!(path = %path.display(), rows = report.height(), "Saved scores");
    Ok(())
}

/// Write `<feature>_model.json` for each feature, returning the written paths
pub fn save_models(table: &ScoreTable, dir: &Path) -> crate::Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).map_err(|source| RfmError::Persistence {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut written = Vec::with_capacity(3);
    for model in table.models() {
        let path = dir.join(format!("{}_model.json", model.feature.slug()));
        let json = serde_json::to_string_pretty(model)?;
        fs::write(&path, json).map_err(|source| RfmError::Persistence {
            path: path.clone(),
            source,
        })?;
        written.push(path);
    }

    info!(dir = %dir.display(), "Saved models");
    Ok(written)
}

fn ensure_parent(path: &Path) -> crate::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|source| RfmError::Persistence {
                path: parent.to_path_buf(),
                source,
            })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoringConfig;
    use crate::pipeline::{score_features, FeatureModel};
    use polars::prelude::{DataFrame, NamedFrom, Series};
    use tempfile::tempdir;

    fn scored() -> ScoreTable {
        let features = DataFrame::new(vec![
            Series::new("CustomerID", vec![1i64, 2, 3]),
            Series::new("Recency", vec![1i64, 2, 100]),
            Series::new("Frequency", vec![1i64, 5, 10]),
            Series::new("MonetaryValue", vec![10.0, 20.0, 30.0]),
        ])
        .unwrap();
        score_features(features, &ScoringConfig::new(3)).unwrap()
    }

    #[test]
    fn test_save_scores_csv() {
        let table = scored();
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("rfm_scores.csv");

        save_scores(&table, &path).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(
            lines.next(),
            Some("CustomerID,Recency,Frequency,MonetaryValue,RecencyScore,FrequencyScore,MonetaryValueScore")
        );
        assert_eq!(lines.count(), 3);
    }

    #[test]
    fn test_save_models_json() {
        let table = scored();
        let dir = tempdir().unwrap();

        let written = save_models(&table, dir.path()).unwrap();
        assert_eq!(written.len(), 3);
        assert!(dir.path().join("recency_model.json").exists());
        assert!(dir.path().join("monetary_value_model.json").exists());

        let json = fs::read_to_string(dir.path().join("frequency_model.json")).unwrap();
        let model: FeatureModel = serde_json::from_str(&json).unwrap();
        assert_eq!(model.score_lookup, table.frequency.score_lookup);
        assert_eq!(model.fit.centers, table.frequency.fit.centers);
    }

    #[test]
    fn test_failed_write_leaves_table_intact() {
        let table = scored();
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("models");
        fs::write(&blocker, "not a directory").unwrap();

        let output = OutputConfig {
            scores_path: dir.path().join("rfm_scores.csv"),
            models_dir: blocker.clone(),
        };
        let result = persist(&table, &output);

        assert!(matches!(result, Err(RfmError::Persistence { ref path, .. }) if *path == blocker));
        assert_eq!(table.n_customers(), 3);
        assert_eq!(table.frame.width(), 10);
    }
}
