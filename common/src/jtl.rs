use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    str::FromStr,
};

use chrono::{DateTime, NaiveDateTime};
use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Columns every CSV result file has to carry, by their JMeter header names
pub const REQUIRED_COLUMNS: &[&str] = &["timeStamp", "elapsed", "label", "responseCode", "success"];

const TIMESTAMP_FORMATS: &[&str] = &["%Y/%m/%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
const SAMPLE_ELEMENTS: &[&[u8]] = &[b"httpSample", b"sample"];
const ROOT_ELEMENT: &[u8] = b"testResults";

#[derive(Debug, Error)]
pub enum JtlError {
    #[error("Result file {path:?} not found")]
    NotFound { path: PathBuf },
    #[error("Read result file {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("Missing required column {0:?} in CSV header")]
    MissingColumn(&'static str),
    #[error("Malformed sample at row {row}: {reason}")]
    Malformed { row: u64, reason: String },
    #[error("CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("XML: {0}")]
    Xml(String),
}

impl From<quick_xml::Error> for JtlError {
    fn from(err: quick_xml::Error) -> Self {
        JtlError::Xml(err.to_string())
    }
}

/// One sample from a JMeter result file
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Sample start, milliseconds since the Unix epoch
    pub timestamp_ms: i64,
    pub label: String,
    pub elapsed_ms: u64,
    pub response_code: String,
    pub success: bool,
    pub response_message: Option<String>,
    pub thread_name: Option<String>,
    pub failure_message: Option<String>,
    pub bytes: Option<u64>,
    pub sent_bytes: Option<u64>,
    pub latency_ms: Option<u64>,
    pub connect_ms: Option<u64>,
}

impl Record {
    pub fn new(
        timestamp_ms: i64,
        label: impl Into<String>,
        elapsed_ms: u64,
        response_code: impl Into<String>,
        success: bool,
    ) -> Self {
        Self {
            timestamp_ms,
            label: label.into(),
            elapsed_ms,
            response_code: response_code.into(),
            success,
            response_message: None,
            thread_name: None,
            failure_message: None,
            bytes: None,
            sent_bytes: None,
            latency_ms: None,
            connect_ms: None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum JtlFormat {
    /// XML when the file starts with `<`, CSV otherwise
    #[default]
    Auto,
    Csv,
    Xml,
}

impl fmt::Display for JtlFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JtlFormat::Auto => write!(f, "auto"),
            JtlFormat::Csv => write!(f, "csv"),
            JtlFormat::Xml => write!(f, "xml"),
        }
    }
}

impl FromStr for JtlFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(JtlFormat::Auto),
            "csv" => Ok(JtlFormat::Csv),
            "xml" => Ok(JtlFormat::Xml),
            other => Err(format!("Unsupported JTL format {other}")),
        }
    }
}

impl JtlFormat {
    fn detect(content: &str) -> JtlFormat {
        if content.trim_start().starts_with('<') {
            JtlFormat::Xml
        } else {
            JtlFormat::Csv
        }
    }
}

/// Reads a result file and returns its samples in chronological order.
/// Samples sharing a timestamp keep their file order.
pub fn read_jtl(path: &Path, format: JtlFormat) -> Result<Vec<Record>, JtlError> {
    let content = fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            JtlError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            JtlError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    let content = content.strip_prefix('\u{feff}').unwrap_or(&content);

    let format = match format {
        JtlFormat::Auto => JtlFormat::detect(content),
        other => other,
    };
    debug!("Reading {} as {format}", path.display());

    let mut records = match format {
        JtlFormat::Xml => parse_xml(content)?,
        _ => parse_csv(content)?,
    };
    records.sort_by_key(|record| record.timestamp_ms);
    debug!("Read {} samples", records.len());
    Ok(records)
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "timeStamp")]
    timestamp: String,
    elapsed: u64,
    label: String,
    #[serde(rename = "responseCode")]
    response_code: String,
    success: String,
    #[serde(rename = "responseMessage", default)]
    response_message: Option<String>,
    #[serde(rename = "threadName", default)]
    thread_name: Option<String>,
    #[serde(rename = "failureMessage", default)]
    failure_message: Option<String>,
    #[serde(default)]
    bytes: Option<u64>,
    #[serde(rename = "sentBytes", default)]
    sent_bytes: Option<u64>,
    #[serde(rename = "Latency", default)]
    latency: Option<u64>,
    #[serde(rename = "Connect", default)]
    connect: Option<u64>,
}

/// Parses the CSV flavour of a result file. The first row must be a header.
pub fn parse_csv(content: &str) -> Result<Vec<Record>, JtlError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(content.as_bytes());

    let headers = reader.headers()?.clone();
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == *column) {
            return Err(JtlError::MissingColumn(column));
        }
    }

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let line = row.position().map(|p| p.line()).unwrap_or_default();
        let malformed = |reason: String| JtlError::Malformed { row: line, reason };
        let row: CsvRow = row
            .deserialize(Some(&headers))
            .map_err(|err| malformed(err.to_string()))?;
        records.push(Record {
            timestamp_ms: parse_timestamp(&row.timestamp).map_err(malformed)?,
            label: row.label,
            elapsed_ms: row.elapsed,
            response_code: row.response_code,
            success: parse_success(&row.success).map_err(malformed)?,
            response_message: row.response_message.filter(|x| !x.is_empty()),
            thread_name: row.thread_name.filter(|x| !x.is_empty()),
            failure_message: row.failure_message.filter(|x| !x.is_empty()),
            bytes: row.bytes,
            sent_bytes: row.sent_bytes,
            latency_ms: row.latency,
            connect_ms: row.connect,
        });
    }
    Ok(records)
}

/// Parses the XML flavour of a result file. Only direct children of
/// `<testResults>` are samples; nested sub-samples are skipped.
pub fn parse_xml(content: &str) -> Result<Vec<Record>, JtlError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut records = Vec::new();
    let mut depth = 0usize;
    let mut seen_root = false;
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if depth == 0 {
                    check_root(&e)?;
                    seen_root = true;
                } else if depth == 1 && is_sample(&e) {
                    let row = records.len() as u64 + 1;
                    records.push(parse_sample(&e, row)?);
                }
                depth += 1;
            }
            Event::Empty(e) => {
                if depth == 0 {
                    check_root(&e)?;
                    seen_root = true;
                } else if depth == 1 && is_sample(&e) {
                    let row = records.len() as u64 + 1;
                    records.push(parse_sample(&e, row)?);
                }
            }
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_root {
        return Err(JtlError::Xml("missing <testResults> root element".to_owned()));
    }
    if depth != 0 {
        return Err(JtlError::Xml("unexpected end of document".to_owned()));
    }
    Ok(records)
}

fn check_root(e: &BytesStart<'_>) -> Result<(), JtlError> {
    if e.name().as_ref() != ROOT_ELEMENT {
        return Err(JtlError::Xml(format!(
            "expected <testResults> root element, found <{}>",
            String::from_utf8_lossy(e.name().as_ref())
        )));
    }
    Ok(())
}

fn is_sample(e: &BytesStart<'_>) -> bool {
    SAMPLE_ELEMENTS.contains(&e.name().as_ref())
}

fn parse_sample(e: &BytesStart<'_>, row: u64) -> Result<Record, JtlError> {
    let malformed = |reason: String| JtlError::Malformed { row, reason };

    let mut timestamp = None;
    let mut elapsed = None;
    let mut label = None;
    let mut response_code = None;
    let mut success = None;
    let mut record = Record::new(0, "", 0, "", false);

    for attr in e.attributes() {
        let attr = attr.map_err(|err| malformed(err.to_string()))?;
        let value = attr.unescape_value()?.into_owned();
        match attr.key.as_ref() {
            b"ts" => timestamp = Some(parse_timestamp(&value).map_err(malformed)?),
            b"t" => elapsed = Some(parse_number("t", &value).map_err(malformed)?),
            b"lb" => label = Some(value),
            b"rc" => response_code = Some(value),
            b"s" => success = Some(parse_success(&value).map_err(malformed)?),
            b"rm" => record.response_message = Some(value).filter(|x| !x.is_empty()),
            b"tn" => record.thread_name = Some(value).filter(|x| !x.is_empty()),
            b"by" => record.bytes = Some(parse_number("by", &value).map_err(malformed)?),
            b"sby" => record.sent_bytes = Some(parse_number("sby", &value).map_err(malformed)?),
            b"lt" => record.latency_ms = Some(parse_number("lt", &value).map_err(malformed)?),
            b"ct" => record.connect_ms = Some(parse_number("ct", &value).map_err(malformed)?),
            _ => {}
        }
    }

    record.timestamp_ms = timestamp.ok_or_else(|| malformed("missing attribute ts".to_owned()))?;
    record.elapsed_ms = elapsed.ok_or_else(|| malformed("missing attribute t".to_owned()))?;
    record.label = label.ok_or_else(|| malformed("missing attribute lb".to_owned()))?;
    record.response_code =
        response_code.ok_or_else(|| malformed("missing attribute rc".to_owned()))?;
    record.success = success.ok_or_else(|| malformed("missing attribute s".to_owned()))?;
    Ok(record)
}

fn parse_number(name: &str, value: &str) -> Result<u64, String> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("invalid {name} value {value:?}"))
}

/// Accepts a millisecond epoch or one of JMeter's formatted timestamps (UTC)
/// Epoch milliseconds or a formatted UTC time, limited to the range chrono can
/// represent
fn parse_timestamp(value: &str) -> Result<i64, String> {
    let value = value.trim();
    if let Ok(ms) = value.parse::<i64>() {
        return match DateTime::from_timestamp_millis(ms) {
            Some(_) => Ok(ms),
            None => Err(format!("timestamp {ms} out of range")),
        };
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|datetime| datetime.and_utc().timestamp_millis())
        .ok_or_else(|| format!("invalid timestamp {value:?}"))
}

fn parse_success(value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(format!("invalid success flag {other:?}")),
    }
}
