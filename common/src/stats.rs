use std::{collections::BTreeMap, time::Duration};

use itertools::Itertools;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::{MS_PER_SECOND, jtl::Record};

/// Upper bound on the number of windows a single series may span
pub const MAX_BUCKETS: usize = 1_000_000;
pub const P90: f64 = 0.9;

#[derive(Debug, Error, PartialEq)]
pub enum StatsError {
    #[error("The result file contains no samples")]
    EmptyInput,
    #[error("Resample frequency must be at least one millisecond")]
    ZeroFrequency,
    #[error("Resampling would create {count} windows (limit {limit}), use a wider resample_frequency")]
    TooManyBuckets { count: usize, limit: usize },
    #[error("Timestamp {0} cannot be aligned to the resample frequency")]
    TimestampOutOfRange(i64),
}

/// Whole-run figures
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub successes: usize,
    pub failures: usize,
    /// `failures / total`
    pub error_rate: f64,
    pub mean_ms: f64,
    pub p90_ms: f64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub first_timestamp_ms: i64,
    /// Latest sample end (start plus elapsed)
    pub last_timestamp_ms: i64,
    pub duration_ms: i64,
    /// Samples per second over `duration_ms`, zero for an instantaneous run
    pub throughput: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelStats {
    pub label: String,
    pub count: usize,
    pub successes: usize,
    pub failures: usize,
    pub mean_ms: f64,
    pub p90_ms: f64,
    pub min_ms: u64,
    pub max_ms: u64,
}

impl LabelStats {
    pub fn error_rate(&self) -> f64 {
        self.failures as f64 / self.count as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodeCount {
    pub code: String,
    pub count: usize,
    /// Fraction of all samples
    pub share: f64,
}

/// One fixed-width time window
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Bucket {
    pub start_ms: i64,
    pub count: usize,
    pub errors: usize,
    pub elapsed_sum_ms: u128,
}

impl Bucket {
    /// `None` for a window without samples
    pub fn mean_ms(&self) -> Option<f64> {
        (self.count > 0).then(|| self.elapsed_sum_ms as f64 / self.count as f64)
    }

    /// Zero for a window without samples
    pub fn error_rate(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.errors as f64 / self.count as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub width_ms: i64,
    pub buckets: Vec<Bucket>,
}

impl Series {
    pub fn total(&self) -> usize {
        self.buckets.iter().map(|b| b.count).sum()
    }

    /// Samples per second in each window
    pub fn throughput(&self) -> impl Iterator<Item = (i64, f64)> + '_ {
        let seconds = self.width_ms as f64 / MS_PER_SECOND;
        self.buckets
            .iter()
            .map(move |b| (b.start_ms, b.count as f64 / seconds))
    }
}

/// Everything the charts and the report need, computed once per run
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub summary: Summary,
    /// Sorted by label
    pub labels: Vec<LabelStats>,
    /// Most frequent first, ties by code
    pub response_codes: Vec<CodeCount>,
    pub overall: Series,
    pub by_label: BTreeMap<String, Series>,
}

impl Analysis {
    pub fn new(records: &[Record], frequency: Duration) -> Result<Self, StatsError> {
        if records.is_empty() {
            return Err(StatsError::EmptyInput);
        }
        let width_ms = i64::try_from(frequency.as_millis()).unwrap_or(i64::MAX);
        if width_ms == 0 {
            return Err(StatsError::ZeroFrequency);
        }

        let summary = summarize(records);
        let labels = label_stats(records);
        let response_codes = response_codes(records);
        let span = Span::new(records, width_ms)?;
        let overall = span.resample(records.iter());
        let by_label = records
            .iter()
            .map(|r| (r.label.clone(), r))
            .into_group_map()
            .into_iter()
            .map(|(label, group)| (label, span.resample(group.into_iter())))
            .collect::<BTreeMap<_, _>>();

        debug!(
            "Analysed {} samples, {} labels, {} windows of {width_ms} ms",
            summary.total,
            labels.len(),
            overall.buckets.len()
        );
        Ok(Self {
            summary,
            labels,
            response_codes,
            overall,
            by_label,
        })
    }

    /// Label statistics ordered by `key`, ascending
    pub fn labels_sorted_by(&self, key: fn(&LabelStats) -> f64) -> Vec<&LabelStats> {
        self.labels
            .iter()
            .sorted_by(|a, b| key(a).total_cmp(&key(b)).then_with(|| a.label.cmp(&b.label)))
            .collect()
    }
}

/// Linear interpolation between closest ranks: position `q * (n - 1)`
pub fn percentile(sorted: &[u64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0] as f64,
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            let frac = pos - lo as f64;
            sorted[lo] as f64 + (sorted[hi] as f64 - sorted[lo] as f64) * frac
        }
    }
}

fn mean(elapsed: &[u64]) -> f64 {
    let sum = elapsed.iter().map(|&ms| u128::from(ms)).sum::<u128>();
    sum as f64 / elapsed.len() as f64
}

fn summarize(records: &[Record]) -> Summary {
    let elapsed = records.iter().map(|r| r.elapsed_ms).sorted().collect::<Vec<_>>();
    let total = records.len();
    let failures = records.iter().filter(|r| !r.success).count();

    let first_timestamp_ms = records.iter().map(|r| r.timestamp_ms).min().unwrap_or(0);
    let last_timestamp_ms = records
        .iter()
        .map(|r| {
            r.timestamp_ms
                .saturating_add(i64::try_from(r.elapsed_ms).unwrap_or(i64::MAX))
        })
        .max()
        .unwrap_or(0);
    let duration_ms = last_timestamp_ms.saturating_sub(first_timestamp_ms);
    let throughput = if duration_ms > 0 {
        total as f64 / (duration_ms as f64 / MS_PER_SECOND)
    } else {
        0.0
    };

    Summary {
        total,
        successes: total - failures,
        failures,
        error_rate: failures as f64 / total as f64,
        mean_ms: mean(&elapsed),
        p90_ms: percentile(&elapsed, P90),
        min_ms: elapsed.first().copied().unwrap_or(0),
        max_ms: elapsed.last().copied().unwrap_or(0),
        first_timestamp_ms,
        last_timestamp_ms,
        duration_ms,
        throughput,
    }
}

fn label_stats(records: &[Record]) -> Vec<LabelStats> {
    records
        .iter()
        .map(|r| (r.label.as_str(), r))
        .into_group_map()
        .into_iter()
        .sorted_by(|a, b| a.0.cmp(b.0))
        .map(|(label, group)| {
            let elapsed = group.iter().map(|r| r.elapsed_ms).sorted().collect::<Vec<_>>();
            let failures = group.iter().filter(|r| !r.success).count();
            LabelStats {
                label: label.to_owned(),
                count: group.len(),
                successes: group.len() - failures,
                failures,
                mean_ms: mean(&elapsed),
                p90_ms: percentile(&elapsed, P90),
                min_ms: elapsed.first().copied().unwrap_or(0),
                max_ms: elapsed.last().copied().unwrap_or(0),
            }
        })
        .collect()
}

fn response_codes(records: &[Record]) -> Vec<CodeCount> {
    let total = records.len() as f64;
    records
        .iter()
        .counts_by(|r| r.response_code.as_str())
        .into_iter()
        .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)))
        .map(|(code, count)| CodeCount {
            code: code.to_owned(),
            count,
            share: count as f64 / total,
        })
        .collect()
}

/// Window layout shared by the overall and per-label series, so that their
/// buckets line up
#[derive(Debug, Clone, Copy)]
struct Span {
    width_ms: i64,
    first_ms: i64,
    len: usize,
}

impl Span {
    fn new(records: &[Record], width_ms: i64) -> Result<Self, StatsError> {
        let (min, max) = records
            .iter()
            .map(|r| r.timestamp_ms)
            .minmax()
            .into_option()
            .ok_or(StatsError::EmptyInput)?;
        let align = |ts: i64| {
            ts.div_euclid(width_ms)
                .checked_mul(width_ms)
                .ok_or(StatsError::TimestampOutOfRange(ts))
        };
        let first_ms = align(min)?;
        let last_ms = align(max)?;
        let len = last_ms
            .checked_sub(first_ms)
            .and_then(|span| usize::try_from(span / width_ms).ok())
            .and_then(|windows| windows.checked_add(1))
            .unwrap_or(usize::MAX);
        if len > MAX_BUCKETS {
            return Err(StatsError::TooManyBuckets {
                count: len,
                limit: MAX_BUCKETS,
            });
        }
        Ok(Self {
            width_ms,
            first_ms,
            len,
        })
    }

    fn index_of(&self, timestamp_ms: i64) -> usize {
        ((timestamp_ms.div_euclid(self.width_ms) * self.width_ms - self.first_ms) / self.width_ms)
            as usize
    }

    fn resample<'a>(&self, records: impl Iterator<Item = &'a Record>) -> Series {
        let mut buckets = (0..self.len)
            .map(|i| Bucket {
                start_ms: self.first_ms + i as i64 * self.width_ms,
                ..Default::default()
            })
            .collect::<Vec<_>>();
        for record in records {
            let bucket = &mut buckets[self.index_of(record.timestamp_ms)];
            bucket.count += 1;
            bucket.elapsed_sum_ms += u128::from(record.elapsed_ms);
            if !record.success {
                bucket.errors += 1;
            }
        }
        Series {
            width_ms: self.width_ms,
            buckets,
        }
    }
}

/// Buckets `records` into windows of `width` aligned to multiples of `width`
/// since the epoch. Every record lands in exactly one bucket; windows without
/// samples between the first and last one are kept.
pub fn resample(records: &[Record], width: Duration) -> Result<Series, StatsError> {
    let width_ms = i64::try_from(width.as_millis()).unwrap_or(i64::MAX);
    if width_ms == 0 {
        return Err(StatsError::ZeroFrequency);
    }
    if records.is_empty() {
        return Ok(Series {
            width_ms,
            buckets: Vec::new(),
        });
    }
    Ok(Span::new(records, width_ms)?.resample(records.iter()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_records() -> Vec<Record> {
        vec![
            Record::new(1_000, "Login", 100, "200", true),
            Record::new(2_500, "Login", 300, "200", true),
            Record::new(4_000, "Search", 50, "200", true),
            Record::new(12_000, "Login", 200, "500", false),
            Record::new(31_000, "Search", 150, "404", false),
        ]
    }

    #[test]
    fn test_percentile_linear_interpolation() {
        assert_eq!(percentile(&[], P90), 0.0);
        assert_eq!(percentile(&[42], P90), 42.0);
        assert!((percentile(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10], P90) - 9.1).abs() < 1e-9);
        assert_eq!(percentile(&[10, 20], 0.5), 15.0);
        assert_eq!(percentile(&[10, 20, 30], 1.0), 30.0);
        assert_eq!(percentile(&[10, 20, 30], 0.0), 10.0);
    }

    #[test]
    fn test_empty_input_is_an_error() {
        assert_eq!(
            Analysis::new(&[], Duration::from_secs(10)),
            Err(StatsError::EmptyInput)
        );
    }

    #[test]
    fn test_zero_frequency() {
        assert_eq!(
            Analysis::new(&sample_records(), Duration::from_micros(10)),
            Err(StatsError::ZeroFrequency)
        );
    }

    #[test]
    fn test_summary() {
        let analysis = Analysis::new(&sample_records(), Duration::from_secs(10)).unwrap();
        let summary = &analysis.summary;
        assert_eq!(summary.total, 5);
        assert_eq!(summary.failures, 2);
        assert_eq!(summary.successes, 3);
        assert_eq!(summary.error_rate, 2.0 / 5.0);
        assert_eq!(summary.mean_ms, 160.0);
        assert_eq!(summary.min_ms, 50);
        assert_eq!(summary.max_ms, 300);
        assert_eq!(summary.first_timestamp_ms, 1_000);
        assert_eq!(summary.last_timestamp_ms, 31_150);
        assert_eq!(summary.duration_ms, 30_150);
        assert!((summary.throughput - 5.0 / 30.15).abs() < 1e-9);
    }

    #[test]
    fn test_error_rate_matches_failures() {
        let mut records = Vec::new();
        for i in 0..97 {
            records.push(Record::new(i * 10, "a", 1, "200", i % 7 != 0));
        }
        let analysis = Analysis::new(&records, Duration::from_secs(1)).unwrap();
        let failed = records.iter().filter(|r| !r.success).count();
        assert_eq!(analysis.summary.error_rate, failed as f64 / records.len() as f64);
    }

    #[test]
    fn test_label_stats_sorted_by_label() {
        let analysis = Analysis::new(&sample_records(), Duration::from_secs(10)).unwrap();
        let labels = analysis
            .labels
            .iter()
            .map(|l| l.label.as_str())
            .collect::<Vec<_>>();
        assert_eq!(labels, vec!["Login", "Search"]);

        let login = &analysis.labels[0];
        assert_eq!(login.count, 3);
        assert_eq!(login.successes, 2);
        assert_eq!(login.failures, 1);
        assert_eq!(login.mean_ms, 200.0);
        assert_eq!(login.max_ms, 300);
        assert!((login.p90_ms - 280.0).abs() < 1e-9);
        assert!((login.error_rate() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_labels_sorted_by_metric() {
        let analysis = Analysis::new(&sample_records(), Duration::from_secs(10)).unwrap();
        let sorted = analysis
            .labels_sorted_by(|l| l.mean_ms)
            .into_iter()
            .map(|l| l.label.as_str())
            .collect::<Vec<_>>();
        assert_eq!(sorted, vec!["Search", "Login"]);
    }

    #[test]
    fn test_response_codes_ordered_by_count() {
        let analysis = Analysis::new(&sample_records(), Duration::from_secs(10)).unwrap();
        let codes = analysis
            .response_codes
            .iter()
            .map(|c| (c.code.as_str(), c.count))
            .collect::<Vec<_>>();
        assert_eq!(codes, vec![("200", 3), ("404", 1), ("500", 1)]);
        assert_eq!(analysis.response_codes[0].share, 0.6);
    }

    #[test]
    fn test_resample_windows_are_epoch_aligned_and_contiguous() {
        let series = resample(&sample_records(), Duration::from_secs(10)).unwrap();
        let starts = series.buckets.iter().map(|b| b.start_ms).collect::<Vec<_>>();
        assert_eq!(starts, vec![0, 10_000, 20_000, 30_000]);

        let counts = series.buckets.iter().map(|b| b.count).collect::<Vec<_>>();
        assert_eq!(counts, vec![3, 1, 0, 1]);
        assert_eq!(series.buckets[0].mean_ms(), Some(150.0));
        assert_eq!(series.buckets[1].error_rate(), 1.0);
        assert_eq!(series.buckets[2].mean_ms(), None);
        assert_eq!(series.buckets[2].error_rate(), 0.0);
    }

    #[test]
    fn test_resample_covers_every_record_once() {
        let mut records = Vec::new();
        for i in 0..1_000i64 {
            records.push(Record::new(
                1_700_000_000_000 + i * 37,
                "x",
                i as u64,
                "200",
                i % 3 != 0,
            ));
        }
        for width in [1u64, 7, 250, 1_000, 60_000] {
            let series = resample(&records, Duration::from_millis(width)).unwrap();
            assert_eq!(series.total(), records.len(), "width {width}");
            let errors = series.buckets.iter().map(|b| b.errors).sum::<usize>();
            assert_eq!(errors, records.iter().filter(|r| !r.success).count());
        }
    }

    #[test]
    fn test_resample_negative_timestamps() {
        let records = vec![
            Record::new(-1, "a", 1, "200", true),
            Record::new(0, "a", 1, "200", true),
        ];
        let series = resample(&records, Duration::from_secs(1)).unwrap();
        assert_eq!(series.buckets.len(), 2);
        assert_eq!(series.buckets[0].start_ms, -1_000);
        assert_eq!(series.total(), 2);
    }

    #[test]
    fn test_resample_limit() {
        let records = vec![
            Record::new(0, "a", 1, "200", true),
            Record::new(10_000_000_000, "a", 1, "200", true),
        ];
        assert!(matches!(
            resample(&records, Duration::from_millis(1)),
            Err(StatsError::TooManyBuckets { .. })
        ));
    }

    #[test]
    fn test_huge_elapsed_does_not_overflow() {
        let elapsed = u64::MAX / 2 + 1;
        let records = vec![
            Record::new(0, "slow", elapsed, "200", true),
            Record::new(1_000, "slow", elapsed, "200", true),
        ];
        let analysis = Analysis::new(&records, Duration::from_secs(1)).unwrap();
        assert!((analysis.summary.mean_ms - elapsed as f64).abs() < 1e6);
        assert!((analysis.labels[0].mean_ms - elapsed as f64).abs() < 1e6);
        assert_eq!(analysis.summary.last_timestamp_ms, i64::MAX);
        assert_eq!(analysis.overall.buckets[0].elapsed_sum_ms, u128::from(elapsed));
    }

    #[test]
    fn test_extreme_timestamps_are_errors() {
        let records = vec![
            Record::new(i64::MIN, "a", 1, "200", true),
            Record::new(i64::MAX, "a", 1, "200", true),
        ];
        assert_eq!(
            Analysis::new(&records, Duration::from_secs(1)),
            Err(StatsError::TimestampOutOfRange(i64::MIN))
        );
        assert!(matches!(
            Analysis::new(&records, Duration::from_millis(1)),
            Err(StatsError::TooManyBuckets { .. })
        ));
    }

    #[test]
    fn test_label_series_share_windows() {
        let analysis = Analysis::new(&sample_records(), Duration::from_secs(10)).unwrap();
        for series in analysis.by_label.values() {
            assert_eq!(series.buckets.len(), analysis.overall.buckets.len());
        }
        let per_label_total = analysis.by_label.values().map(Series::total).sum::<usize>();
        assert_eq!(per_label_total, analysis.summary.total);
        assert_eq!(analysis.by_label["Search"].buckets[3].count, 1);
    }

    #[test]
    fn test_throughput_series() {
        let series = resample(&sample_records(), Duration::from_secs(10)).unwrap();
        let throughput = series.throughput().collect::<Vec<_>>();
        assert_eq!(throughput[0], (0, 0.3));
        assert_eq!(throughput[2], (20_000, 0.0));
    }
}
