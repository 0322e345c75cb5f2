use std::{
    fs::{read_to_string, write},
    path::{Path, PathBuf},
    sync::LazyLock,
};

use eyre::{Context, Result};
use handlebars::{Handlebars, no_escape};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    MS_PER_SECOND,
    stats::{Analysis, CodeCount, LabelStats, Summary},
    util::{format_ms, format_percent, heading_from_filename},
};

const REPORT_TEMPLATE: &str = "report";
const DEFAULT_TEMPLATE: &str = include_str!("report.template.md");

static CHARTS_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{~?\s*#each\s+charts\b").expect("charts block regex is valid")
});

/// Whether a template iterates the chart sections
fn references_charts(source: &str) -> bool {
    CHARTS_BLOCK.is_match(source)
}

#[derive(Debug, Serialize)]
struct Overview {
    total: usize,
    successes: usize,
    failures: usize,
    error_rate: String,
    mean_ms: String,
    p90_ms: String,
    max_ms: String,
    duration_s: String,
    throughput: String,
}

impl From<&Summary> for Overview {
    fn from(summary: &Summary) -> Self {
        Self {
            total: summary.total,
            successes: summary.successes,
            failures: summary.failures,
            error_rate: format_percent(summary.error_rate),
            mean_ms: format_ms(summary.mean_ms),
            p90_ms: format_ms(summary.p90_ms),
            max_ms: format_ms(summary.max_ms as f64),
            duration_s: format_ms(summary.duration_ms as f64 / MS_PER_SECOND),
            throughput: format_ms(summary.throughput),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChartSection<'a> {
    heading: String,
    filename: &'a str,
}

/// Values visible to the template. The raw statistics are exposed next to the
/// pre-formatted tables so custom templates can lay them out differently.
#[derive(Debug, Serialize)]
struct ReportContext<'a> {
    title: &'a str,
    overview: Overview,
    summary_table: String,
    response_codes_table: String,
    charts: Vec<ChartSection<'a>>,
    summary: &'a Summary,
    labels: &'a [LabelStats],
    response_codes: &'a [CodeCount],
}

/// Keeps a cell from breaking out of its table column
fn escape_cell(value: &str) -> String {
    value.replace('|', "\\|").replace(['\r', '\n'], " ")
}

fn summary_table(labels: &[LabelStats]) -> String {
    let mut rows = vec![
        "| Label | Samples | Avg (ms) | p90 (ms) | Max (ms) | Successes | Failures |".to_owned(),
        "|---|---|---|---|---|---|---|".to_owned(),
    ];
    rows.extend(labels.iter().map(|stats| {
        format!(
            "| {} | {} | {} | {} | {} | {} | {} |",
            escape_cell(&stats.label),
            stats.count,
            format_ms(stats.mean_ms),
            format_ms(stats.p90_ms),
            format_ms(stats.max_ms as f64),
            stats.successes,
            stats.failures,
        )
    }));
    rows.join("\n")
}

fn response_codes_table(codes: &[CodeCount]) -> String {
    let mut rows = vec![
        "| Response code | Count | Share |".to_owned(),
        "|---|---|---|".to_owned(),
    ];
    rows.extend(codes.iter().map(|code| {
        format!(
            "| {} | {} | {} |",
            escape_cell(&code.code),
            code.count,
            format_percent(code.share)
        )
    }));
    rows.join("\n")
}

/// Renders the Markdown report
///
/// Arguments:
/// * `analysis` - Statistics of the run
/// * `charts` - Chart filenames, in the order their sections appear
/// * `title` - Top level heading
/// * `template` - Handlebars template replacing the built-in layout
pub fn render_report(
    analysis: &Analysis,
    charts: &[String],
    title: &str,
    template: Option<&Path>,
) -> Result<String> {
    let source = match template {
        Some(path) => {
            let source = read_to_string(path)
                .context(format!("Read report template {}", path.display()))?;
            if !references_charts(&source) {
                warn!(
                    "Report template {} does not reference charts, images will not be linked",
                    path.display()
                );
            }
            source
        }
        None => DEFAULT_TEMPLATE.to_owned(),
    };

    let context = ReportContext {
        title,
        overview: Overview::from(&analysis.summary),
        summary_table: summary_table(&analysis.labels),
        response_codes_table: response_codes_table(&analysis.response_codes),
        charts: charts
            .iter()
            .map(|filename| ChartSection {
                heading: heading_from_filename(filename),
                filename,
            })
            .collect(),
        summary: &analysis.summary,
        labels: &analysis.labels,
        response_codes: &analysis.response_codes,
    };

    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(true);
    handlebars.register_escape_fn(no_escape);
    handlebars
        .register_template_string(REPORT_TEMPLATE, source)
        .wrap_err("Parse report template")?;
    let rendered = handlebars
        .render(REPORT_TEMPLATE, &context)
        .wrap_err("Render report")?;
    Ok(rendered)
}

/// Writes `content` to `dir/report_file`, returning the written path
pub fn write_report(dir: &Path, report_file: &str, content: &str) -> Result<PathBuf> {
    let path = dir.join(report_file);
    debug!("Writing report to {}", path.display());
    write(&path, content).context(format!("Write report {}", path.display()))?;
    Ok(path)
}
