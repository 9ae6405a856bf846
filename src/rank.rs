//! Ordinal scores from unordered cluster labels
//!
//! K-Means numbers its clusters arbitrarily. Ranking sorts the raw indices by
//! their center value and uses each index's 1-based position as its score, so
//! score order follows center order in the requested direction.
//!
//! Equal centers keep raw index order in both directions (stable sort), which
//! makes the lookup deterministic for any input.

use crate::error::RfmError;
use polars::prelude::{DataFrame, NamedFrom, Series};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Which end of the center order receives the highest score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Lowest center scores 1, highest center scores k
    Ascending,
    /// Highest center scores 1, lowest center scores k
    Descending,
}

impl Direction {
    pub fn from_ascending(ascending: bool) -> Self {
        if ascending {
            Direction::Ascending
        } else {
            Direction::Descending
        }
    }
}

/// Score for every raw cluster index: `lookup[raw] == score`
///
/// The result is a bijection from `0..k` onto `1..=k`.
pub fn score_lookup(centers: &[f64], direction: Direction) -> Vec<u32> {
    let mut order: Vec<usize> = (0..centers.len()).collect();
    match direction {
        Direction::Ascending => order.sort_by(|&a, &b| centers[a].total_cmp(&centers[b])),
        Direction::Descending => order.sort_by(|&a, &b| centers[b].total_cmp(&centers[a])),
    }

    let mut lookup = vec![0; centers.len()];
    for (position, &raw) in order.iter().enumerate() {
        lookup[raw] = position as u32 + 1;
    }
    lookup
}

/// Score of a single raw cluster index, `None` if the index has no center
pub fn rank(centers: &[f64], raw_index: usize, direction: Direction) -> Option<u32> {
    score_lookup(centers, direction).get(raw_index).copied()
}

/// Append an ordinal score column derived from raw labels and their centers
///
/// # Arguments
/// * `table` - Table the labels were computed for, one label per row
/// * `labels` - Raw cluster index per row
/// * `centers` - Center per raw cluster index, in the model's order
/// * `new_column` - Name of the score column to add
/// * `direction` - Ranking direction
///
/// # Returns
/// * `table` with every row scored in `1..=k`
pub fn rank_clusters(
    table: &DataFrame,
    labels: &[usize],
    centers: &[f64],
    new_column: &str,
    direction: Direction,
) -> crate::Result<DataFrame> {
    if labels.len() != table.height() {
        return Err(RfmError::LabelMismatch(format!(
            "{} labels for {} rows",
            labels.len(),
            table.height()
        )));
    }

    let lookup = score_lookup(centers, direction);
    let scores = labels
        .iter()
        .map(|&label| {
            lookup.get(label).copied().ok_or_else(|| {
                RfmError::LabelMismatch(format!("label {} but only {} centers", label, centers.len()))
            })
        })
        .collect::<crate::Result<Vec<u32>>>()?;

    debug!(column = new_column, ?direction, ?lookup, "Ranked clusters");

    let mut output = table.clone();
    output.with_column(Series::new(new_column, scores))?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn table(rows: usize) -> DataFrame {
        let ids: Vec<i64> = (0..rows as i64).collect();
        DataFrame::new(vec![Series::new("CustomerID", ids)]).unwrap()
    }

    fn scores(df: &DataFrame, column: &str) -> Vec<u32> {
        df.column(column).unwrap().u32().unwrap().into_no_null_iter().collect()
    }

    #[test]
    fn test_ascending_lookup() {
        let centers = [30.0, 10.0, 50.0, 20.0, 40.0];
        assert_eq!(score_lookup(&centers, Direction::Ascending), vec![3, 1, 5, 2, 4]);
    }

    #[test]
    fn test_descending_lookup() {
        let centers = [30.0, 10.0, 50.0, 20.0, 40.0];
        assert_eq!(score_lookup(&centers, Direction::Descending), vec![3, 5, 1, 4, 2]);
    }

    #[test]
    fn test_ties_keep_raw_order() {
        let centers = [7.0, 3.0, 7.0, 3.0];
        assert_eq!(score_lookup(&centers, Direction::Ascending), vec![3, 1, 4, 2]);
        assert_eq!(score_lookup(&centers, Direction::Descending), vec![1, 3, 2, 4]);
    }

    #[test]
    fn test_rank_single_index() {
        let centers = [2.0, 100.0, 1.0];
        assert_eq!(rank(&centers, 1, Direction::Ascending), Some(3));
        assert_eq!(rank(&centers, 1, Direction::Descending), Some(1));
        assert_eq!(rank(&centers, 3, Direction::Ascending), None);
    }

    #[test]
    fn test_rank_clusters_scores_every_row() {
        let df = table(6);
        let labels = [2, 0, 1, 2, 1, 0];
        let centers = [5.0, 1.0, 9.0];

        let ranked = rank_clusters(&df, &labels, &centers, "FrequencyScore", Direction::Ascending).unwrap();
        assert_eq!(ranked.height(), 6);
        assert_eq!(ranked.width(), 2);
        assert_eq!(scores(&ranked, "FrequencyScore"), vec![3, 2, 1, 3, 1, 2]);
    }

    #[test]
    fn test_rank_clusters_descending() {
        let df = table(3);
        let labels = [0, 1, 2];
        let centers = [100.0, 1.0, 2.0];

        let ranked = rank_clusters(&df, &labels, &centers, "RecencyScore", Direction::Descending).unwrap();
        assert_eq!(scores(&ranked, "RecencyScore"), vec![1, 3, 2]);
    }

    #[test]
    fn test_rank_clusters_length_mismatch() {
        let result = rank_clusters(&table(3), &[0, 1], &[1.0, 2.0], "Score", Direction::Ascending);
        assert!(matches!(result, Err(RfmError::LabelMismatch(_))));
    }

    #[test]
    fn test_rank_clusters_unknown_label() {
        let result = rank_clusters(&table(2), &[0, 2], &[1.0, 2.0], "Score", Direction::Ascending);
        assert!(matches!(result, Err(RfmError::LabelMismatch(_))));
    }

    fn centers_and_labels() -> impl Strategy<Value = (Vec<f64>, Vec<usize>)> {
        prop::collection::vec(-1e3f64..1e3, 1..8).prop_flat_map(|centers| {
            let k = centers.len();
            (Just(centers), prop::collection::vec(0..k, 1..40))
        })
    }

    proptest! {
        #[test]
        fn prop_lookup_is_bijection(
            centers in prop::collection::vec(-1e6f64..1e6, 1..12),
            ascending in any::<bool>(),
        ) {
            let mut lookup = score_lookup(&centers, Direction::from_ascending(ascending));
            lookup.sort_unstable();
            let expected: Vec<u32> = (1..=centers.len() as u32).collect();
            prop_assert_eq!(lookup, expected);
        }

        #[test]
        fn prop_scores_follow_center_order(
            centers in prop::collection::vec(-1e6f64..1e6, 1..12),
            ascending in any::<bool>(),
        ) {
            let lookup = score_lookup(&centers, Direction::from_ascending(ascending));
            for a in 0..centers.len() {
                for b in 0..centers.len() {
                    if centers[a] < centers[b] {
                        if ascending {
                            prop_assert!(lookup[a] < lookup[b]);
                        } else {
                            prop_assert!(lookup[a] > lookup[b]);
                        }
                    }
                }
            }
        }

        #[test]
        fn prop_rank_clusters_is_deterministic(
            (centers, labels) in centers_and_labels(),
            ascending in any::<bool>(),
        ) {
            let df = table(labels.len());
            let direction = Direction::from_ascending(ascending);
            let first = rank_clusters(&df, &labels, &centers, "Score", direction).unwrap();
            let second = rank_clusters(&df, &labels, &centers, "Score", direction).unwrap();
            prop_assert_eq!(scores(&first, "Score"), scores(&second, "Score"));

            // Rows sharing a raw label share a score
            let ranked = scores(&first, "Score");
            for (i, &a) in labels.iter().enumerate() {
                for (j, &b) in labels.iter().enumerate() {
                    if a == b {
                        prop_assert_eq!(ranked[i], ranked[j]);
                    }
                }
            }
        }
    }
}
