use core::fmt::Debug;
use std::{
    fmt::Display,
    fs,
    path::{Path, PathBuf},
};

use eyre::{Context, Result, bail, eyre};
use plotters::prelude::*;
use tracing::debug;

use crate::stats::Analysis;

pub const WIDE_CHART: (u32, u32) = (1200, 600);
const CAPTION_FONT: (&str, u32) = ("sans-serif", 28);
const LABEL_FONT: (&str, u32) = ("sans-serif", 14);
const MAX_LABEL_CHARS: usize = 24;

pub trait Plot: Debug + Send + Sync {
    /// Name of the image written to the output directory, also the key used
    /// to select the chart in `graph_files`
    fn filename(&self) -> &'static str;
    /// Caption drawn on the image
    fn title(&self) -> &'static str;
    /// Draws the chart
    ///
    /// Arguments:
    /// * `analysis` - Statistics and resampled series of the run
    /// * `filepath` - Where the PNG is written
    fn plot(&self, analysis: &Analysis, filepath: &Path) -> Result<()>;
}

/// A chart that has been written to disk
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPlot {
    pub filename: String,
    pub path: PathBuf,
}

pub fn ensure_plot_dir(dir: &Path) -> Result<()> {
    if dir.exists() && !dir.is_dir() {
        bail!("Output path {} exists and is not a directory", dir.display());
    }
    fs::create_dir_all(dir).context(format!("Create output directory {}", dir.display()))?;
    Ok(())
}

/// Renders `plots` in order into `plot_path`, calling `on_done` after each
///
/// Arguments:
/// * `plots` - Charts to draw, in report order
/// * `analysis` - Statistics shared by every chart
/// * `plot_path` - The output directory, ie. /output
/// * `on_done` - Progress callback receiving the finished filename
pub fn plot(
    plots: &[Box<dyn Plot>],
    analysis: &Analysis,
    plot_path: &Path,
    mut on_done: impl FnMut(&str),
) -> Result<Vec<RenderedPlot>> {
    ensure_plot_dir(plot_path)?;

    let mut rendered = Vec::with_capacity(plots.len());
    for plot in plots {
        let path = plot_path.join(plot.filename());
        debug!("Plotting {}", path.display());
        plot.plot(analysis, &path)
            .wrap_err(format!("Render chart {}", plot.filename()))?;
        on_done(plot.filename());
        rendered.push(RenderedPlot {
            filename: plot.filename().to_owned(),
            path,
        });
    }
    Ok(rendered)
}

trait DrawContext<T> {
    fn drawing(self, filepath: &Path) -> Result<T>;
}

impl<T, E: Display> DrawContext<T> for std::result::Result<T, E> {
    fn drawing(self, filepath: &Path) -> Result<T> {
        self.map_err(|err| eyre!("Draw {}: {err}", filepath.display()))
    }
}

fn palette_color(idx: usize) -> RGBColor {
    let (r, g, b) = Palette99::COLORS[idx % Palette99::COLORS.len()];
    RGBColor(r, g, b)
}

fn short_label(label: &str) -> String {
    if label.chars().count() > MAX_LABEL_CHARS {
        let mut short = label.chars().take(MAX_LABEL_CHARS - 1).collect::<String>();
        short.push('…');
        short
    } else {
        label.to_owned()
    }
}

/// Label of the bar centred on `x`, bars sit on whole numbers
fn bar_label(labels: &[String], x: f64) -> String {
    let idx = x.round();
    if (x - idx).abs() > 1e-6 || idx < 0.0 {
        return String::new();
    }
    labels.get(idx as usize).cloned().unwrap_or_default()
}

fn upper_bound(max: f64) -> f64 {
    if max > 0.0 { max * 1.1 } else { 1.0 }
}

#[derive(Debug, Clone)]
pub struct BarChart<'a> {
    pub title: &'a str,
    pub y_desc: &'a str,
    /// Bars from left to right
    pub bars: Vec<(String, f64)>,
    pub color: RGBColor,
}

pub fn plot_bar_chart(filepath: &Path, config: &BarChart<'_>) -> Result<()> {
    let root = BitMapBackend::new(filepath, WIDE_CHART).into_drawing_area();
    root.fill(&WHITE).drawing(filepath)?;

    let n = config.bars.len();
    let labels = config
        .bars
        .iter()
        .map(|(label, _)| short_label(label))
        .collect::<Vec<_>>();
    let y_max = upper_bound(config.bars.iter().map(|(_, v)| *v).fold(0.0, f64::max));

    let mut chart = ChartBuilder::on(&root)
        .caption(config.title, CAPTION_FONT)
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(70)
        .build_cartesian_2d(-0.5f64..n as f64 - 0.5, 0f64..y_max)
        .drawing(filepath)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(n)
        .x_label_formatter(&|x| bar_label(&labels, *x))
        .x_label_style(LABEL_FONT)
        .y_desc(config.y_desc)
        .axis_desc_style(LABEL_FONT)
        .draw()
        .drawing(filepath)?;

    chart
        .draw_series(config.bars.iter().enumerate().map(|(i, (_, value))| {
            let x = i as f64;
            Rectangle::new([(x - 0.35, 0.0), (x + 0.35, *value)], config.color.filled())
        }))
        .drawing(filepath)?;

    root.present().drawing(filepath)
}

#[derive(Debug, Clone)]
pub struct TimeSeriesLine {
    pub name: String,
    /// `(seconds since the first window, value)`, `None` leaves a gap
    pub points: Vec<(f64, Option<f64>)>,
}

#[derive(Debug, Clone)]
pub struct TimeSeriesChart<'a> {
    pub title: &'a str,
    pub y_desc: &'a str,
    pub lines: Vec<TimeSeriesLine>,
    /// Fixed y range instead of one fitted to the data
    pub y_range: Option<(f64, f64)>,
}

impl TimeSeriesChart<'_> {
    fn x_max(&self) -> f64 {
        self.lines
            .iter()
            .flat_map(|line| line.points.iter().map(|(x, _)| *x))
            .fold(0.0, f64::max)
    }

    fn y_max(&self) -> f64 {
        self.lines
            .iter()
            .flat_map(|line| line.points.iter().filter_map(|(_, y)| *y))
            .fold(0.0, f64::max)
    }
}

/// Splits a line at its gaps so each run of values is drawn separately
fn segments(points: &[(f64, Option<f64>)]) -> Vec<Vec<(f64, f64)>> {
    let mut out = Vec::new();
    let mut current = Vec::new();
    for (x, y) in points {
        match y {
            Some(y) => current.push((*x, *y)),
            None if !current.is_empty() => out.push(std::mem::take(&mut current)),
            None => {}
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

pub fn plot_time_series(filepath: &Path, config: &TimeSeriesChart<'_>) -> Result<()> {
    let root = BitMapBackend::new(filepath, WIDE_CHART).into_drawing_area();
    root.fill(&WHITE).drawing(filepath)?;

    let x_max = config.x_max().max(1.0);
    let (y_min, y_max) = config.y_range.unwrap_or((0.0, upper_bound(config.y_max())));

    let mut chart = ChartBuilder::on(&root)
        .caption(config.title, CAPTION_FONT)
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(0f64..x_max, y_min..y_max)
        .drawing(filepath)?;

    chart
        .configure_mesh()
        .x_desc("Time since start (s)")
        .y_desc(config.y_desc)
        .axis_desc_style(LABEL_FONT)
        .draw()
        .drawing(filepath)?;

    for (idx, line) in config.lines.iter().enumerate() {
        let color = palette_color(idx);
        for (n, segment) in segments(&line.points).into_iter().enumerate() {
            let series = chart
                .draw_series(LineSeries::new(segment, color.stroke_width(2)).point_size(2))
                .drawing(filepath)?;
            if n == 0 {
                series.label(line.name.as_str()).legend(move |(x, y)| {
                    PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2))
                });
            }
        }
    }

    if config.lines.len() > 1 {
        chart
            .configure_series_labels()
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .label_font(LABEL_FONT)
            .draw()
            .drawing(filepath)?;
    }

    root.present().drawing(filepath)
}

#[derive(Debug, Clone)]
pub struct PieChart<'a> {
    pub title: &'a str,
    pub slices: Vec<(String, f64)>,
    /// Slice colours, the palette is used when empty
    pub colors: Vec<RGBColor>,
    pub size: u32,
}

pub fn plot_pie_chart(filepath: &Path, config: &PieChart<'_>) -> Result<()> {
    let root = BitMapBackend::new(filepath, (config.size, config.size)).into_drawing_area();
    root.fill(&WHITE).drawing(filepath)?;
    let area = root.titled(config.title, CAPTION_FONT).drawing(filepath)?;

    let slices = config
        .slices
        .iter()
        .filter(|(_, value)| *value > 0.0)
        .collect::<Vec<_>>();
    let sizes = slices.iter().map(|(_, value)| *value).collect::<Vec<_>>();
    let labels = slices
        .iter()
        .map(|(label, _)| short_label(label))
        .collect::<Vec<_>>();
    let colors = (0..slices.len())
        .map(|i| config.colors.get(i).copied().unwrap_or_else(|| palette_color(i)))
        .collect::<Vec<_>>();

    let (width, height) = area.dim_in_pixel();
    let center = (width as i32 / 2, height as i32 / 2);
    let radius = f64::from(width.min(height)) * 0.35;

    let mut pie = Pie::new(&center, &radius, &sizes, &colors, &labels);
    pie.start_angle(140.0);
    pie.label_style(LABEL_FONT.into_font().color(&BLACK));
    pie.percentages(LABEL_FONT.into_font().color(&WHITE));
    area.draw(&pie).drawing(filepath)?;

    root.present().drawing(filepath)
}
