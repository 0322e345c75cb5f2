use std::{
    collections::HashSet,
    fs::read_to_string,
    io,
    path::{Component, Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::parse_duration;

pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
pub const DEFAULT_OUTPUT_DIR: &str = "output";
pub const DEFAULT_REPORT_FILE: &str = "report.md";
pub const DEFAULT_RESAMPLE_FREQUENCY: &str = "10s";
pub const DEFAULT_TITLE: &str = "JMeter Test Report";
pub const DEFAULT_GRAPH_FILES: &[&str] = &[
    "avg_response_time_by_label.png",
    "error_rate_over_time.png",
    "response_time_over_time_by_label.png",
    "p90_response_time_by_label.png",
    "error_rate_pie.png",
    "response_code_distribution_pie.png",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file {path:?} not found")]
    NotFound { path: PathBuf },
    #[error("Read config file {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("Parse config: {0}")]
    Yaml(#[from] serde_yml::Error),
    #[error("Invalid resample_frequency {value:?}: {reason}")]
    InvalidFrequency { value: String, reason: String },
    #[error("resample_frequency must be greater than zero")]
    ZeroFrequency,
    #[error("Unknown chart {0:?} in graph_files")]
    UnknownChart(String),
    #[error("Chart {0:?} is listed more than once in graph_files")]
    DuplicateChart(String),
    #[error("report_file must not be empty")]
    EmptyReportFile,
    #[error("report_file {0:?} must be a plain file name inside output_dir")]
    InvalidReportFile(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory receiving the report and chart images
    pub output_dir: PathBuf,
    /// Width of the time windows used by the over-time charts, e.g. `10s`
    pub resample_frequency: String,
    /// Charts to render, in the order they appear in the report
    pub graph_files: Vec<String>,
    pub report_file: String,
    pub title: String,
    /// Optional Handlebars template replacing the built-in report layout
    pub template: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            resample_frequency: DEFAULT_RESAMPLE_FREQUENCY.to_owned(),
            graph_files: DEFAULT_GRAPH_FILES.iter().map(|x| x.to_string()).collect(),
            report_file: DEFAULT_REPORT_FILE.to_owned(),
            title: DEFAULT_TITLE.to_owned(),
            template: None,
        }
    }
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        // an empty document deserializes to unit, not to a mapping
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let yaml = read_to_string(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                ConfigError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        Self::from_yaml(&yaml)
    }

    /// Loads `path`, or returns the defaults when `path` does not exist and
    /// `required` is false.
    pub fn load_or_default(path: &Path, required: bool) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::NotFound { .. }) if !required => Ok(Self::default()),
            other => other,
        }
    }

    pub fn resample_duration(&self) -> Result<Duration, ConfigError> {
        let duration = parse_duration(&self.resample_frequency).map_err(|err| {
            ConfigError::InvalidFrequency {
                value: self.resample_frequency.clone(),
                reason: err.to_string(),
            }
        })?;
        if duration.is_zero() {
            return Err(ConfigError::ZeroFrequency);
        }
        Ok(duration)
    }

    /// Checks every option once, before any input is read.
    ///
    /// Arguments:
    /// * `known_charts` - Chart filenames the renderer can produce
    pub fn validate(&self, known_charts: &[&str]) -> Result<(), ConfigError> {
        self.resample_duration()?;
        if self.report_file.trim().is_empty() {
            return Err(ConfigError::EmptyReportFile);
        }
        let mut components = Path::new(&self.report_file).components();
        if !matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        ) || self.report_file.contains(['/', '\\'])
        {
            return Err(ConfigError::InvalidReportFile(self.report_file.clone()));
        }

        let mut seen = HashSet::new();
        for file in &self.graph_files {
            if !known_charts.contains(&file.as_str()) {
                return Err(ConfigError::UnknownChart(file.clone()));
            }
            if !seen.insert(file.as_str()) {
                return Err(ConfigError::DuplicateChart(file.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.output_dir, PathBuf::from("output"));
        assert_eq!(config.resample_duration().unwrap(), Duration::from_secs(10));
        assert_eq!(config.graph_files.len(), 6);
        assert_eq!(config.graph_files[0], "avg_response_time_by_label.png");
        assert_eq!(config.report_file, "report.md");
        assert!(config.template.is_none());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = Config::from_yaml("resample_frequency: 1s\n").unwrap();
        assert_eq!(config.resample_duration().unwrap(), Duration::from_secs(1));
        assert_eq!(config.output_dir, PathBuf::from("output"));
        assert_eq!(config.graph_files.len(), DEFAULT_GRAPH_FILES.len());
    }

    #[test]
    fn test_full_yaml() {
        let yaml = r#"
output_dir: reports/nightly
resample_frequency: 500ms
graph_files:
  - error_rate_pie.png
  - avg_response_time_by_label.png
report_file: summary.md
title: Nightly run
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("reports/nightly"));
        assert_eq!(
            config.resample_duration().unwrap(),
            Duration::from_millis(500)
        );
        assert_eq!(
            config.graph_files,
            vec!["error_rate_pie.png", "avg_response_time_by_label.png"]
        );
        assert_eq!(config.report_file, "summary.md");
        assert_eq!(config.title, "Nightly run");
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(Config::from_yaml("").unwrap(), Config::default());
        assert_eq!(Config::from_yaml("  \n").unwrap(), Config::default());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result = Config::from_yaml("output_directory: out\n");
        assert!(matches!(result, Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_validate() {
        let known = DEFAULT_GRAPH_FILES;
        assert!(Config::default().validate(known).is_ok());

        let config = Config {
            graph_files: vec!["nope.png".to_owned()],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(known),
            Err(ConfigError::UnknownChart(name)) if name == "nope.png"
        ));

        let config = Config {
            graph_files: vec![
                "error_rate_pie.png".to_owned(),
                "error_rate_pie.png".to_owned(),
            ],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(known),
            Err(ConfigError::DuplicateChart(_))
        ));

        let config = Config {
            resample_frequency: "0s".to_owned(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(known),
            Err(ConfigError::ZeroFrequency)
        ));

        let config = Config {
            resample_frequency: "soon".to_owned(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(known),
            Err(ConfigError::InvalidFrequency { .. })
        ));
    }

    #[test]
    fn test_report_file_stays_in_output_dir() {
        let known = DEFAULT_GRAPH_FILES;
        for report_file in ["reports/run.md", "../run.md", "/tmp/run.md", "..", "a\\b.md"] {
            let config = Config {
                report_file: report_file.to_owned(),
                ..Default::default()
            };
            assert!(
                matches!(
                    config.validate(known),
                    Err(ConfigError::InvalidReportFile(_))
                ),
                "{report_file}"
            );
        }
        let config = Config {
            report_file: "summary.md".to_owned(),
            ..Default::default()
        };
        assert!(config.validate(known).is_ok());
    }

    #[test]
    fn test_huge_frequency_is_invalid() {
        let config = Config::from_yaml("resample_frequency: 9999999999999999999h\n").unwrap();
        assert!(matches!(
            config.resample_duration(),
            Err(ConfigError::InvalidFrequency { .. })
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::NotFound { .. })
        ));
        assert_eq!(
            Config::load_or_default(&path, false).unwrap(),
            Config::default()
        );
        assert!(Config::load_or_default(&path, true).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "output_dir: somewhere").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("somewhere"));
    }
}
