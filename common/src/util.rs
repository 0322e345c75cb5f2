use std::{sync::LazyLock, time::Duration};

use eyre::{Context, ContextCompat, Result, bail};
use regex::Regex;

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([0-9]+)\s*([A-Za-z]*)\s*$").expect("duration regex is valid")
});

/// Parses a resample frequency such as `10s`, `500ms`, `1min` or the
/// pandas-style `10S` / `1T` / `1H`. A bare number is taken as seconds.
pub fn parse_duration(frequency: &str) -> Result<Duration> {
    let caps = DURATION_RE
        .captures(frequency)
        .with_context(|| format!("Parse duration: {frequency:?}"))?;
    let amount = caps[1]
        .parse::<u64>()
        .context(format!("Parse duration amount: {frequency}"))?;
    let unit = &caps[2];

    let unit_ms: u64 = match unit {
        "" | "S" => 1_000,
        "L" => 1,
        "T" => 60_000,
        "H" => 3_600_000,
        _ => match unit.to_lowercase().as_str() {
            "ms" => 1,
            "s" | "sec" | "secs" => 1_000,
            "m" | "min" | "mins" => 60_000,
            "h" | "hr" | "hrs" => 3_600_000,
            _ => bail!("Unsupported duration unit {unit:?} in {frequency:?}"),
        },
    };
    let millis = amount
        .checked_mul(unit_ms)
        .with_context(|| format!("Duration out of range: {frequency:?}"))?;
    Ok(Duration::from_millis(millis))
}

/// Turns a chart filename into a section heading:
/// `p90_response_time_by_label.png` becomes `P90 Response Time By Label`.
pub fn heading_from_filename(filename: &str) -> String {
    let stem = filename.strip_suffix(".png").unwrap_or(filename);
    title_case(&stem.replace('_', " "))
}

/// Capitalises the first letter of every word, where a word starts after any
/// non-alphabetic character, and lowercases the rest.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_alpha = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

pub fn format_ms(value: f64) -> String {
    format!("{value:.2}")
}

pub fn format_percent(ratio: f64) -> String {
    format!("{:.2}%", ratio * 100.0)
}
