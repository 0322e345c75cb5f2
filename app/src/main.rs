use std::path::PathBuf;

use clap::Parser;
use common::{config::DEFAULT_CONFIG_FILE, jtl::JtlFormat};
use console::style;
use eyre::Result;
use jtl_report::{Options, run};
use tracing::error;
use tracing_subscriber::{
    EnvFilter,
    fmt::{layer, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

const MODULES: &[&str] = &["jtl_report", "common", "default_plots"];

/// Turns a JMeter result file into a Markdown report with charts
#[derive(Parser)]
#[command(version)]
struct Cli {
    /// JTL file, CSV or XML
    #[arg(default_value = "results.jtl")]
    input: PathBuf,
    /// Directory for the report and charts, overrides `output_dir` from the config
    output_dir: Option<PathBuf>,
    /// YAML config, defaults are used when config.yaml does not exist
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(short, long, default_value_t = JtlFormat::Auto)]
    format: JtlFormat,
    #[arg(long, default_value_t = false)]
    no_progress: bool,
    /// Extra tracing directives, e.g. `common=debug`
    #[arg(short, long)]
    log: Vec<String>,
    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let log_level = std::env::var("RUST_LOG").unwrap_or("warn".to_owned());
    let args = Cli::parse();

    let mut env_filter = EnvFilter::new(format!("jtl_report={log_level}"));
    for log in &args.log {
        env_filter = env_filter.add_directive(log.parse()?);
    }
    for module in MODULES {
        if !args.log.iter().any(|x| x.starts_with(module)) {
            env_filter = env_filter.add_directive(format!("{module}={log_level}").parse()?);
        }
    }

    let (file_layer, _guard) = match &args.log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .map(|dir| dir.to_path_buf())
                .unwrap_or_else(|| PathBuf::from("."));
            let name = path.file_name().unwrap_or(path.as_os_str());
            let (non_blocking, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            (
                Some(layer().with_ansi(false).with_writer(non_blocking)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            layer()
                .with_timer(ChronoLocal::new("%v %k:%M:%S %z".to_owned()))
                .compact(),
        )
        .with(file_layer)
        .init();

    let options = Options {
        input: args.input,
        output_dir: args.output_dir,
        config_required: args.config.is_some(),
        config: args
            .config
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE)),
        format: args.format,
        progress: !args.no_progress,
    };

    match run(&options) {
        Ok(outcome) => {
            println!(
                "{} {} ({} samples, {} charts)",
                style("Report written to").green().bold(),
                outcome.report.display(),
                outcome.records,
                outcome.charts.len()
            );
            Ok(())
        }
        Err(err) => {
            error!("{err:#?}");
            Err(err)
        }
    }
}
