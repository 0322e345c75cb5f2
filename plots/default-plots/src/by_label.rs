use std::path::Path;

use common::{
    plot::{BarChart, Plot, plot_bar_chart},
    stats::{Analysis, LabelStats},
};
use eyre::Result;
use plotters::style::RGBColor;
use tracing::debug;

const BAR_COLOR: RGBColor = RGBColor(31, 119, 180);

/// Bars of `key` per label, lowest first
fn label_bars(analysis: &Analysis, key: fn(&LabelStats) -> f64) -> Vec<(String, f64)> {
    analysis
        .labels_sorted_by(key)
        .into_iter()
        .map(|stats| (stats.label.clone(), key(stats)))
        .collect()
}

#[derive(Debug, Default, Clone)]
pub struct AvgResponseTimeByLabel;

impl Plot for AvgResponseTimeByLabel {
    fn filename(&self) -> &'static str {
        "avg_response_time_by_label.png"
    }

    fn title(&self) -> &'static str {
        "Average Response Time by Label"
    }

    fn plot(&self, analysis: &Analysis, filepath: &Path) -> Result<()> {
        let bars = label_bars(analysis, |stats| stats.mean_ms);
        debug!("Drawing {} label bars", bars.len());
        plot_bar_chart(
            filepath,
            &BarChart {
                title: self.title(),
                y_desc: "Mean response time (ms)",
                bars,
                color: BAR_COLOR,
            },
        )
    }
}

#[derive(Debug, Default, Clone)]
pub struct P90ResponseTimeByLabel;

impl Plot for P90ResponseTimeByLabel {
    fn filename(&self) -> &'static str {
        "p90_response_time_by_label.png"
    }

    fn title(&self) -> &'static str {
        "90th Percentile Response Time by Label"
    }

    fn plot(&self, analysis: &Analysis, filepath: &Path) -> Result<()> {
        plot_bar_chart(
            filepath,
            &BarChart {
                title: self.title(),
                y_desc: "p90 response time (ms)",
                bars: label_bars(analysis, |stats| stats.p90_ms),
                color: BAR_COLOR,
            },
        )
    }
}
