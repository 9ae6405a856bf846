//! Command-line arguments and their conversion into library settings

use crate::config::{ScoringConfig, DEFAULT_CLUSTERS};
use crate::data::FilterOptions;
use crate::persist::OutputConfig;
use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use std::str::FromStr;

/// RFM customer scoring using per-feature K-Means clustering
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the retail transactions CSV file
    #[arg(short, long, default_value = "OnlineRetail.csv")]
    pub input: PathBuf,

    /// Number of clusters, which is also the highest score
    #[arg(short = 'k', long, default_value_t = DEFAULT_CLUSTERS)]
    pub clusters: usize,

    /// Keep only transactions from this country
    #[arg(long, default_value = "United Kingdom")]
    pub country: String,

    /// Keep transactions from every country
    #[arg(long, conflicts_with = "country")]
    pub all_countries: bool,

    /// Keep only invoices from this calendar year
    #[arg(long, default_value_t = 2011)]
    pub year: i32,

    /// Keep invoices from every year
    #[arg(long, conflicts_with = "year")]
    pub any_year: bool,

    /// Output path for the score table
    #[arg(short, long, default_value = "rfm_scores.csv")]
    pub scores: PathBuf,

    /// Directory for the fitted models
    #[arg(long, default_value = "models")]
    pub models_dir: PathBuf,

    /// Base path for score plots; one PNG per feature is written next to it
    #[arg(long)]
    pub plot: Option<PathBuf>,

    /// Score one customer instead of writing outputs, e.g. --predict "30,10,500.0"
    #[arg(short, long, value_name = "R,F,M")]
    pub predict: Option<String>,

    /// Log at debug level
    #[arg(short, long)]
    pub verbose: bool,
}

/// Raw Recency, Frequency and MonetaryValue of a customer to score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RfmValues {
    pub recency: f64,
    pub frequency: f64,
    pub monetary_value: f64,
}

impl FromStr for RfmValues {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let fields: Vec<&str> = s.split(',').map(str::trim).collect();
        let [recency, frequency, monetary_value] = fields.as_slice() else {
            bail!("expected 'recency,frequency,monetary', got {:?}", s);
        };

        Ok(Self {
            recency: parse_field("recency", recency)?,
            frequency: parse_field("frequency", frequency)?,
            monetary_value: parse_field("monetary", monetary_value)?,
        })
    }
}

fn parse_field(name: &str, raw: &str) -> anyhow::Result<f64> {
    raw.parse()
        .with_context(|| format!("invalid {} value {:?}", name, raw))
}

impl Args {
    /// Values given with `--predict`, if any
    pub fn parse_rfm_values(&self) -> anyhow::Result<Option<RfmValues>> {
        self.predict.as_deref().map(str::parse).transpose()
    }

    pub fn filter_options(&self) -> FilterOptions {
        FilterOptions {
            country: (!self.all_countries).then(|| self.country.clone()),
            year: (!self.any_year).then_some(self.year),
        }
    }

    pub fn scoring_config(&self) -> ScoringConfig {
        ScoringConfig::new(self.clusters)
    }

    pub fn output_config(&self) -> OutputConfig {
        OutputConfig {
            scores_path: self.scores.clone(),
            models_dir: self.models_dir.clone(),
        }
    }
}
