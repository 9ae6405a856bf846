//! Distribution and score plots using Plotters

use crate::error::RfmError;
use crate::pipeline::{Feature, ScoreTable};
use plotters::prelude::*;
use polars::prelude::DataType;
use std::path::{Path, PathBuf};
use tracing::info;

/// Color per score, score 1 first
static SCORE_COLORS: [RGBColor; 5] = [RED, MAGENTA, YELLOW, BLUE, GREEN];

/// Bars per feature histogram
const HISTOGRAM_BINS: u32 = 20;

fn score_color(score: u32) -> &'static RGBColor {
    match score.checked_sub(1) {
        Some(idx) if (idx as usize) < SCORE_COLORS.len() => &SCORE_COLORS[idx as usize],
        _ => &BLACK,
    }
}

fn plot_error<E: std::fmt::Display>(err: E) -> RfmError {
    RfmError::Plot(err.to_string())
}

/// Strip plot of a raw feature against its score, with fitted centers marked
///
/// # Arguments
/// * `table` - Scored customers
/// * `feature` - Feature to plot
/// * `output_path` - Path to save the PNG plot
pub fn create_score_plot(table: &ScoreTable, feature: Feature, output_path: &Path) -> crate::Result<()> {
    let points = score_points(table, feature)?;
    let model = table.model(feature);
    let (y_min, y_max) = value_bounds(points.iter().map(|&(_, value)| value));
    let x_max = model.fit.n_clusters as f64 + 1.0;

    let root = BitMapBackend::new(output_path, (800, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_error)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("{} by {}", feature.column(), feature.score_column()),
            ("sans-serif", 30),
        )
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(0f64..x_max, y_min..y_max)
        .map_err(plot_error)?;

    chart
        .configure_mesh()
        .x_desc(feature.score_column())
        .y_desc(feature.column())
        .axis_desc_style(("sans-serif", 15))
        .draw()
        .map_err(plot_error)?;

    // Spread points sideways so equal values stay visible
    chart
        .draw_series(points.iter().enumerate().map(|(i, &(score, value))| {
            let jitter = ((i % 7) as f64 - 3.0) * 0.04;
            Circle::new((score as f64 + jitter, value), 3, score_color(score).filled())
        }))
        .map_err(plot_error)?;

    for (raw, &center) in model.fit.centers.iter().enumerate() {
        let Some(&score) = model.score_lookup.get(raw) else {
            continue;
        };
        let x = score as f64;
        chart
            .draw_series(std::iter::once(PathElement::new(
                vec![(x - 0.3, center), (x + 0.3, center)],
                BLACK.stroke_width(2),
            )))
            .map_err(plot_error)?;
    }

    root.present().map_err(plot_error)?;
    info!(path = %output_path.display(), feature = feature.column(), "Saved score plot");

    Ok(())
}

/// Histograms of the raw Recency, Frequency and MonetaryValue side by side
pub fn create_distribution_plot(table: &ScoreTable, output_path: &Path) -> crate::Result<()> {
    let root = BitMapBackend::new(output_path, (1500, 450)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_error)?;

    for (area, feature) in root.split_evenly((1, 3)).iter().zip(Feature::ALL) {
        let values = feature_values(table, feature)?;
        let bins = Bins::fit(&values, HISTOGRAM_BINS);
        let counts = bins.counts(&values);
        let max_count = counts.iter().copied().max().unwrap_or_default();

        let mut chart = ChartBuilder::on(area)
            .caption(format!("{} Distribution", feature.column()), ("sans-serif", 25))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d((0u32..HISTOGRAM_BINS).into_segmented(), 0u32..max_count + 1)
            .map_err(plot_error)?;

        let label = |segment: &SegmentValue<u32>| match segment {
            SegmentValue::Exact(bin) | SegmentValue::CenterOf(bin) => format!("{:.0}", bins.lower_edge(*bin)),
            SegmentValue::Last => String::new(),
        };
        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(5)
            .x_label_formatter(&label)
            .x_desc(feature.column())
            .y_desc("Customers")
            .axis_desc_style(("sans-serif", 15))
            .draw()
            .map_err(plot_error)?;

        chart
            .draw_series(
                Histogram::vertical(&chart)
                    .style(BLUE.mix(0.6).filled())
                    .margin(1)
                    .data(values.iter().map(|&value| (bins.index(value), 1u32))),
            )
            .map_err(plot_error)?;
    }

    root.present().map_err(plot_error)?;
    info!(path = %output_path.display(), "Saved distribution plot");

    Ok(())
}

/// Write every plot next to `base_path`: `rfm_distribution.png` plus one
/// score plot per feature, e.g. `rfm_recency.png` for `plots/rfm.png`
pub fn generate_plots(table: &ScoreTable, base_path: &Path) -> crate::Result<Vec<PathBuf>> {
    let distribution = distribution_path(base_path);
    create_distribution_plot(table, &distribution)?;

    let mut written = vec![distribution];
    for (feature, path) in plot_paths(base_path) {
        create_score_plot(table, feature, &path)?;
        written.push(path);
    }
    Ok(written)
}

/// Equal-width bins over the observed value range
#[derive(Debug, Clone, Copy, PartialEq)]
struct Bins {
    min: f64,
    width: f64,
    count: u32,
}

impl Bins {
    fn fit(values: &[f64], count: u32) -> Self {
        let (min, max) = values.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), &v| {
            (min.min(v), max.max(v))
        });

        if !min.is_finite() || !max.is_finite() || max <= min {
            let min = if min.is_finite() { min } else { 0.0 };
            return Self { min, width: 1.0, count };
        }
        Self {
            min,
            width: (max - min) / count as f64,
            count,
        }
    }

    /// Bin of `value`; the maximum lands in the last bin
    fn index(&self, value: f64) -> u32 {
        let offset = ((value - self.min) / self.width).floor();
        if offset <= 0.0 {
            0
        } else {
            (offset as u32).min(self.count - 1)
        }
    }

    fn lower_edge(&self, bin: u32) -> f64 {
        self.min + bin as f64 * self.width
    }

    fn counts(&self, values: &[f64]) -> Vec<u32> {
        let mut counts = vec![0; self.count as usize];
        for &value in values {
            counts[self.index(value) as usize] += 1;
        }
        counts
    }
}

fn distribution_path(base_path: &Path) -> PathBuf {
    let (dir, stem) = split_base(base_path);
    dir.join(format!("{}_distribution.png", stem))
}

fn split_base(base_path: &Path) -> (&Path, &str) {
    let stem = base_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("rfm");
    let dir = base_path.parent().unwrap_or_else(|| Path::new(""));
    (dir, stem)
}

fn plot_paths(base_path: &Path) -> Vec<(Feature, PathBuf)> {
    let (dir, stem) = split_base(base_path);
    Feature::ALL
        .iter()
        .map(|&feature| (feature, dir.join(format!("{}_{}.png", stem, feature.slug()))))
        .collect()
}

fn feature_values(table: &ScoreTable, feature: Feature) -> crate::Result<Vec<f64>> {
    let values = table.frame.column(feature.column())?.cast(&DataType::Float64)?;
    let values = values.f64()?.into_iter().flatten().collect();
    Ok(values)
}

fn score_points(table: &ScoreTable, feature: Feature) -> crate::Result<Vec<(u32, f64)>> {
    let values = table.frame.column(feature.column())?.cast(&DataType::Float64)?;
    let scores = table.frame.column(feature.score_column())?;

    let points = scores
        .u32()?
        .into_iter()
        .zip(values.f64()?.into_iter())
        .filter_map(|(score, value)| Some((score?, value?)))
        .collect();

    Ok(points)
}

/// Padded value range, never empty
fn value_bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), value| {
        (min.min(value), max.max(value))
    });

    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0);
    }

    let padding = ((max - min) * 0.05).max(1.0);
    (min - padding, max + padding)
}
