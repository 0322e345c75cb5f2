mod by_label;
mod over_time;
mod pies;

use std::{fmt, str::FromStr};

use common::plot::Plot;

pub use by_label::{AvgResponseTimeByLabel, P90ResponseTimeByLabel};
pub use over_time::{ErrorRateOverTime, ResponseTimeOverTimeByLabel, ThroughputOverTime};
pub use pies::{ErrorRatePie, ResponseCodeDistributionPie};

/// Every chart the renderer knows, keyed by the image filename
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlotKind {
    AvgResponseTimeByLabel,
    ErrorRateOverTime,
    ResponseTimeOverTimeByLabel,
    P90ResponseTimeByLabel,
    ErrorRatePie,
    ResponseCodeDistributionPie,
    ThroughputOverTime,
}

impl PlotKind {
    pub const ALL: [PlotKind; 7] = [
        PlotKind::AvgResponseTimeByLabel,
        PlotKind::ErrorRateOverTime,
        PlotKind::ResponseTimeOverTimeByLabel,
        PlotKind::P90ResponseTimeByLabel,
        PlotKind::ErrorRatePie,
        PlotKind::ResponseCodeDistributionPie,
        PlotKind::ThroughputOverTime,
    ];

    pub fn plot(&self) -> Box<dyn Plot> {
        match *self {
            PlotKind::AvgResponseTimeByLabel => Box::new(AvgResponseTimeByLabel),
            PlotKind::ErrorRateOverTime => Box::new(ErrorRateOverTime),
            PlotKind::ResponseTimeOverTimeByLabel => Box::new(ResponseTimeOverTimeByLabel),
            PlotKind::P90ResponseTimeByLabel => Box::new(P90ResponseTimeByLabel),
            PlotKind::ErrorRatePie => Box::new(ErrorRatePie),
            PlotKind::ResponseCodeDistributionPie => Box::new(ResponseCodeDistributionPie),
            PlotKind::ThroughputOverTime => Box::new(ThroughputOverTime),
        }
    }

    pub fn filename(&self) -> &'static str {
        self.plot().filename()
    }

    pub fn from_filename(filename: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.filename() == filename)
    }

    pub fn filenames() -> Vec<&'static str> {
        Self::ALL.iter().map(PlotKind::filename).collect()
    }
}

impl fmt::Display for PlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.filename())
    }
}

impl FromStr for PlotKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_filename(s).ok_or_else(|| format!("Unknown chart {s:?}"))
    }
}
