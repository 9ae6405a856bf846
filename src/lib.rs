//! RFM customer scoring with K-Means
//!
//! Computes Recency, Frequency and MonetaryValue per customer from retail
//! transactions, clusters each feature separately and turns the arbitrary cluster
//! labels into ordered 1..k scores.

pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod features;
pub mod model;
pub mod pipeline;
pub mod persist;
pub mod rank;
pub mod viz;

// Re-export public items for easier access
pub use cli::{Args, RfmValues};
pub use config::ScoringConfig;
pub use data::{load_transactions, transactions_to_frame, FilterOptions, Transaction};
pub use error::RfmError;
pub use features::extract_features;
pub use model::{fit_cluster, ClusterFit};
pub use persist::{persist, OutputConfig};
pub use pipeline::{build_scores, score_features, Feature, RfmScores, ScoreTable};
pub use rank::{rank, rank_clusters, score_lookup, Direction};
pub use viz::generate_plots;

/// Common result type used throughout the library
pub type Result<T> = std::result::Result<T, RfmError>;
