use std::path::Path;

use common::{
    MS_PER_SECOND,
    plot::{Plot, TimeSeriesChart, TimeSeriesLine, plot_time_series},
    stats::{Analysis, Bucket, Series},
};
use eyre::Result;

/// Maps each window of `series` to `(seconds since the first window, value)`
fn series_points(
    series: &Series,
    origin_ms: i64,
    value: impl Fn(&Bucket) -> Option<f64>,
) -> Vec<(f64, Option<f64>)> {
    series
        .buckets
        .iter()
        .map(|bucket| {
            (
                (bucket.start_ms - origin_ms) as f64 / MS_PER_SECOND,
                value(bucket),
            )
        })
        .collect()
}

fn origin_ms(analysis: &Analysis) -> i64 {
    analysis
        .overall
        .buckets
        .first()
        .map(|bucket| bucket.start_ms)
        .unwrap_or_default()
}

#[derive(Debug, Default, Clone)]
pub struct ErrorRateOverTime;

impl Plot for ErrorRateOverTime {
    fn filename(&self) -> &'static str {
        "error_rate_over_time.png"
    }

    fn title(&self) -> &'static str {
        "Error Rate Over Time"
    }

    fn plot(&self, analysis: &Analysis, filepath: &Path) -> Result<()> {
        let points = series_points(&analysis.overall, origin_ms(analysis), |bucket| {
            (bucket.count > 0).then(|| bucket.error_rate() * 100.0)
        });
        plot_time_series(
            filepath,
            &TimeSeriesChart {
                title: self.title(),
                y_desc: "Error rate (%)",
                lines: vec![TimeSeriesLine {
                    name: "Error rate".to_owned(),
                    points,
                }],
                y_range: Some((0.0, 105.0)),
            },
        )
    }
}

#[derive(Debug, Default, Clone)]
pub struct ResponseTimeOverTimeByLabel;

impl Plot for ResponseTimeOverTimeByLabel {
    fn filename(&self) -> &'static str {
        "response_time_over_time_by_label.png"
    }

    fn title(&self) -> &'static str {
        "Response Time Over Time by Label"
    }

    fn plot(&self, analysis: &Analysis, filepath: &Path) -> Result<()> {
        let origin = origin_ms(analysis);
        let lines = analysis
            .by_label
            .iter()
            .map(|(label, series)| TimeSeriesLine {
                name: label.clone(),
                points: series_points(series, origin, Bucket::mean_ms),
            })
            .collect();
        plot_time_series(
            filepath,
            &TimeSeriesChart {
                title: self.title(),
                y_desc: "Mean response time (ms)",
                lines,
                y_range: None,
            },
        )
    }
}

#[derive(Debug, Default, Clone)]
pub struct ThroughputOverTime;

impl Plot for ThroughputOverTime {
    fn filename(&self) -> &'static str {
        "throughput_over_time.png"
    }

    fn title(&self) -> &'static str {
        "Throughput Over Time"
    }

    fn plot(&self, analysis: &Analysis, filepath: &Path) -> Result<()> {
        let origin = origin_ms(analysis);
        let points = analysis
            .overall
            .throughput()
            .map(|(start_ms, rate)| ((start_ms - origin) as f64 / MS_PER_SECOND, Some(rate)))
            .collect();
        plot_time_series(
            filepath,
            &TimeSeriesChart {
                title: self.title(),
                y_desc: "Requests per second",
                lines: vec![TimeSeriesLine {
                    name: "Throughput".to_owned(),
                    points,
                }],
                y_range: None,
            },
        )
    }
}
