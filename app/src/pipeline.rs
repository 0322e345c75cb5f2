use std::path::{Path, PathBuf};

use common::{
    config::Config,
    jtl::{JtlFormat, read_jtl},
    plot::{Plot, plot},
    report::{render_report, write_report},
    stats::Analysis,
};
use default_plots::PlotKind;
use eyre::{Context, ContextCompat, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct Options {
    pub input: PathBuf,
    /// Overrides the configured `output_dir`
    pub output_dir: Option<PathBuf>,
    pub config: PathBuf,
    /// Fail instead of using the defaults when `config` does not exist
    pub config_required: bool,
    pub format: JtlFormat,
    pub progress: bool,
}

impl Options {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output_dir: None,
            config: PathBuf::from(common::config::DEFAULT_CONFIG_FILE),
            config_required: false,
            format: JtlFormat::Auto,
            progress: false,
        }
    }
}

/// What a run produced
#[derive(Debug, Clone)]
pub struct Outcome {
    pub records: usize,
    pub output_dir: PathBuf,
    pub report: PathBuf,
    pub charts: Vec<PathBuf>,
}

fn progress_bar(len: usize, enabled: bool) -> Result<ProgressBar> {
    if !enabled {
        return Ok(ProgressBar::hidden());
    }
    let bar = ProgressBar::new(len as u64);
    bar.set_style(
        ProgressStyle::with_template("{prefix:>10} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .context("Progress bar template")?
            .progress_chars("=> "),
    );
    bar.set_prefix("Charts");
    Ok(bar)
}

fn selected_plots(config: &Config) -> Result<Vec<Box<dyn Plot>>> {
    config
        .graph_files
        .iter()
        .map(|file| {
            PlotKind::from_filename(file)
                .map(|kind| kind.plot())
                .with_context(|| format!("Unknown chart {file}"))
        })
        .collect()
}

pub fn load_config(path: &Path, required: bool) -> Result<Config> {
    let config = Config::load_or_default(path, required)
        .wrap_err(format!("Load config {}", path.display()))?;
    config
        .validate(&PlotKind::filenames())
        .wrap_err("Invalid configuration")?;
    debug!("Config: {config:?}");
    Ok(config)
}

/// Parses the JTL file, computes the statistics, draws the configured charts
/// and writes the report. Any failure aborts the run.
pub fn run(options: &Options) -> Result<Outcome> {
    let config = load_config(&options.config, options.config_required)?;
    let output_dir = options
        .output_dir
        .clone()
        .unwrap_or_else(|| config.output_dir.clone());
    // validated above
    let frequency = config.resample_duration()?;

    let records = read_jtl(&options.input, options.format)
        .wrap_err(format!("Parse {}", options.input.display()))?;
    debug!("Parsed {} records from {}", records.len(), options.input.display());

    let analysis = Analysis::new(&records, frequency)
        .wrap_err(format!("Analyse {}", options.input.display()))?;

    let plots = selected_plots(&config)?;
    let bar = progress_bar(plots.len(), options.progress)?;
    let rendered = plot(&plots, &analysis, &output_dir, |filename| {
        bar.set_message(filename.to_owned());
        bar.inc(1);
    })?;
    bar.finish_and_clear();

    let content = render_report(
        &analysis,
        &config.graph_files,
        &config.title,
        config.template.as_deref(),
    )?;
    let report = write_report(&output_dir, &config.report_file, &content)?;
    info!(
        "Wrote {} and {} charts to {}",
        report.display(),
        rendered.len(),
        output_dir.display()
    );

    Ok(Outcome {
        records: records.len(),
        output_dir,
        report,
        charts: rendered.into_iter().map(|chart| chart.path).collect(),
    })
}
