use std::path::Path;

use common::{
    plot::{PieChart, Plot, plot_pie_chart},
    stats::Analysis,
};
use eyre::Result;
use plotters::style::RGBColor;

const SUCCESS_COLOR: RGBColor = RGBColor(44, 160, 44);
const FAILURE_COLOR: RGBColor = RGBColor(214, 39, 40);

#[derive(Debug, Default, Clone)]
pub struct ErrorRatePie;

impl ErrorRatePie {
    fn chart(&self, analysis: &Analysis) -> PieChart<'static> {
        let mut slices = Vec::new();
        let mut colors = Vec::new();
        for (name, count, color) in [
            ("Success", analysis.summary.successes, SUCCESS_COLOR),
            ("Failure", analysis.summary.failures, FAILURE_COLOR),
        ] {
            // zero slices are dropped by the renderer, keep colours aligned
            if count > 0 {
                slices.push((name.to_owned(), count as f64));
                colors.push(color);
            }
        }
        PieChart {
            title: self.title(),
            slices,
            colors,
            size: 600,
        }
    }
}

impl Plot for ErrorRatePie {
    fn filename(&self) -> &'static str {
        "error_rate_pie.png"
    }

    fn title(&self) -> &'static str {
        "Success vs Failure"
    }

    fn plot(&self, analysis: &Analysis, filepath: &Path) -> Result<()> {
        plot_pie_chart(filepath, &self.chart(analysis))
    }
}

#[derive(Debug, Default, Clone)]
pub struct ResponseCodeDistributionPie;

impl Plot for ResponseCodeDistributionPie {
    fn filename(&self) -> &'static str {
        "response_code_distribution_pie.png"
    }

    fn title(&self) -> &'static str {
        "Response Code Distribution"
    }

    fn plot(&self, analysis: &Analysis, filepath: &Path) -> Result<()> {
        let slices = analysis
            .response_codes
            .iter()
            .map(|code| (code.code.clone(), code.count as f64))
            .collect();
        plot_pie_chart(
            filepath,
            &PieChart {
                title: self.title(),
                slices,
                colors: Vec::new(),
                size: 800,
            },
        )
    }
}
