//! rfm-segments: score customers by Recency, Frequency and MonetaryValue
//!
//! Loads a retail export, scores every customer and writes the report, the
//! fitted models and optional plots. With `--predict` it scores a single
//! customer against models fitted on the same export instead.

use anyhow::{Context, Result};
use clap::Parser;
use rfm_segments::{
    build_scores, generate_plots, load_transactions, persist, Args, Feature, RfmValues,
    ScoreTable,
};
use std::time::Instant;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let started = Instant::now();
    match args.parse_rfm_values()? {
        Some(values) => score_single_customer(&args, values)?,
        None => score_all_customers(&args)?,
    }
    info!(elapsed_secs = started.elapsed().as_secs_f64(), "Done");

    Ok(())
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install log subscriber: {}", err);
    }
}

fn load_and_score(args: &Args) -> Result<ScoreTable> {
    let transactions = load_transactions(&args.input, &args.filter_options())
        .with_context(|| format!("loading {}", args.input.display()))?;
    let table = build_scores(&transactions, &args.scoring_config())?;

    println!(
        "Scored {} customers from {} transactions, k = {}",
        table.n_customers(),
        transactions.height(),
        args.clusters
    );
    Ok(table)
}

fn score_single_customer(args: &Args, values: RfmValues) -> Result<()> {
    let table = load_and_score(args)?;
    let scores = table.predict(values.recency, values.frequency, values.monetary_value)?;

    println!(
        "R={} F={} M={}  ->  RecencyScore={} FrequencyScore={} MonetaryValueScore={}",
        values.recency,
        values.frequency,
        values.monetary_value,
        scores.recency,
        scores.frequency,
        scores.monetary_value
    );
    Ok(())
}

fn score_all_customers(args: &Args) -> Result<()> {
    let table = load_and_score(args)?;
    print_score_statistics(&table)?;

    // Output failures are reported but never discard the computed scores
    let output = args.output_config();
    match persist(&table, &output) {
        Ok(()) => println!(
            "\nScores written to {}, models to {}",
            output.scores_path.display(),
            output.models_dir.display()
        ),
        Err(err) => warn!(error = %err, "Could not save outputs"),
    }

    if let Some(plot_path) = &args.plot {
        match generate_plots(&table, plot_path) {
            Ok(paths) => {
                for path in paths {
                    println!("Plot written to {}", path.display());
                }
            }
            Err(err) => warn!(error = %err, "Could not render plots"),
        }
    }

    Ok(())
}

fn print_score_statistics(table: &ScoreTable) -> Result<()> {
    let total = table.n_customers() as f64;

    for feature in Feature::ALL {
        let model = table.model(feature);
        println!(
            "\n{} ({:?}, inertia {:.2}{})",
            feature.column(),
            model.direction,
            model.fit.inertia,
            if model.fit.converged { "" } else { ", not converged" }
        );
        println!("  Score | Customers |      Min |      Max |     Mean");
        for band in table.summary(feature)? {
            println!(
                "  {:5} | {:5} ({:2.0}%) | {:8.2} | {:8.2} | {:8.2}",
                band.score,
                band.count,
                band.count as f64 / total * 100.0,
                band.min,
                band.max,
                band.mean
            );
        }
    }

    Ok(())
}
