// 🖼️ Renderer - Observed vs forecast line chart
// A RenderContext lives only inside one render_chart call

use std::path::Path;

use chrono::{Datelike, NaiveDate};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::{FontDesc, FontFamily, FontStyle};
use serde::Serialize;
use tracing::info;

use crate::categorizer::Category;
use crate::config::ChartConfig;
use crate::error::PipelineError;
use crate::forecast::ForecastOutcome;
use crate::normalizer::NormalizedSeries;

// ============================================================================
// PALETTE
// ============================================================================

const PALETTE: [RGBColor; 10] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
    RGBColor(127, 127, 127),
    RGBColor(188, 189, 34),
    RGBColor(23, 190, 207),
];

const BACKGROUND: RGBColor = RGBColor(248, 248, 248);

/// Colour for a bin. Observed and forecast lines of one bin share it.
pub fn category_color(rank: usize) -> RGBColor {
    PALETTE[rank % PALETTE.len()]
}

// ============================================================================
// CHART SPEC
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub category: Category,
    pub observed: Vec<(NaiveDate, f64)>,
    /// Anchor + forecast points; `None` when the bin was not forecast
    pub forecast_line: Option<Vec<(NaiveDate, f64)>>,
}

/// Everything the renderer needs, already resolved from the analysis
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub width: u32,
    pub height: u32,
    pub show_markers: bool,
    pub series: Vec<ChartSeries>,
    pub last_observed: Option<NaiveDate>,
    pub forecast_end: Option<NaiveDate>,
}

impl ChartSpec {
    pub fn from_analysis(
        normalized: &NormalizedSeries,
        outcome: &ForecastOutcome,
        chart: &ChartConfig,
    ) -> Self {
        let series: Vec<ChartSeries> = normalized
            .columns
            .iter()
            .map(|col| {
                let category = col.column.category.clone();
                let forecast_line = outcome
                    .get(&category.label)
                    .map(|f| f.stitched.forecast_line());
                ChartSeries {
                    observed: col.column.observed(&normalized.periods).collect(),
                    category,
                    forecast_line,
                }
            })
            .filter(|s| !s.observed.is_empty())
            .collect();

        let last_observed = outcome
            .forecasts
            .iter()
            .map(|f| f.stitched.anchor.0)
            .max();
        let forecast_end = outcome
            .forecasts
            .iter()
            .filter_map(|f| f.forecast.periods.last().copied())
            .max();

        ChartSpec {
            title: chart.title.clone(),
            x_label: chart.x_label.clone(),
            y_label: chart.y_label.clone(),
            width: chart.width,
            height: chart.height,
            show_markers: chart.show_markers,
            series,
            last_observed,
            forecast_end,
        }
    }

    pub fn has_forecasts(&self) -> bool {
        self.series.iter().any(|s| s.forecast_line.is_some())
    }

    fn points(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.series.iter().flat_map(|s| {
            s.observed
                .iter()
                .chain(s.forecast_line.iter().flatten())
                .copied()
        })
    }

    /// Year span of every drawn point, padded by one year when degenerate
    pub fn x_range(&self) -> (f64, f64) {
        let (lo, hi) = self
            .points()
            .map(|(d, _)| decimal_year(d))
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), x| (lo.min(x), hi.max(x)));
        if !lo.is_finite() {
            return (0.0, 1.0);
        }
        if lo == hi {
            return (lo - 1.0, hi + 1.0);
        }
        (lo, hi)
    }

    /// Covers [0, 1] and any value outside it, with a small margin
    pub fn y_range(&self) -> (f64, f64) {
        let (lo, hi) = self
            .points()
            .map(|(_, v)| v)
            .fold((0.0_f64, 1.0_f64), |(lo, hi), v| (lo.min(v), hi.max(v)));
        let pad = (hi - lo) * 0.05;
        (lo - pad, hi + pad)
    }
}

pub fn decimal_year(date: NaiveDate) -> f64 {
    date.year() as f64 + date.ordinal0() as f64 / 365.25
}

fn to_xy(points: &[(NaiveDate, f64)]) -> Vec<(f64, f64)> {
    points.iter().map(|(d, v)| (decimal_year(*d), *v)).collect()
}

// ============================================================================
// RENDER CONTEXT
// ============================================================================

pub struct RenderContext<'a, DB: DrawingBackend> {
    area: DrawingArea<DB, Shift>,
    spec: &'a ChartSpec,
}

impl<'a, DB> RenderContext<'a, DB>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    pub fn new(area: DrawingArea<DB, Shift>, spec: &'a ChartSpec) -> Self {
        RenderContext { area, spec }
    }

    /// Draw the whole chart and flush it; consumes the context
    pub fn draw(self) -> anyhow::Result<()> {
        let spec = self.spec;
        let area = self.area;
        area.fill(&WHITE)?;

        let (x0, x1) = spec.x_range();
        let (y0, y1) = spec.y_range();

        let mut chart = ChartBuilder::on(&area)
            .caption(
                &spec.title,
                FontDesc::new(FontFamily::SansSerif, 30.0, FontStyle::Bold),
            )
            .margin(25)
            .set_label_area_size(LabelAreaPosition::Left, 70)
            .set_label_area_size(LabelAreaPosition::Bottom, 50)
            .build_cartesian_2d(x0..x1, y0..y1)?;

        chart.plotting_area().fill(&BACKGROUND)?;

        chart
            .configure_mesh()
            .x_desc(spec.x_label.as_str())
            .y_desc(spec.y_label.as_str())
            .x_label_formatter(&|v| format!("{:.0}", v))
            .y_label_formatter(&|v| format!("{:.1}", v))
            .bold_line_style(BLACK.mix(0.12))
            .light_line_style(BLACK.mix(0.04))
            .axis_desc_style(FontDesc::new(FontFamily::SansSerif, 18.0, FontStyle::Bold))
            .label_style(FontDesc::new(FontFamily::SansSerif, 14.0, FontStyle::Normal))
            .draw()?;

        for series in &spec.series {
            let color = category_color(series.category.rank);
            let observed = to_xy(&series.observed);

            // solid observed line; its legend patch stands for the whole bin
            chart
                .draw_series(LineSeries::new(observed.clone(), color.stroke_width(2)))?
                .label(format!("{} Emissions", series.category.label))
                .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 20, y + 5)], color.filled()));

            if spec.show_markers {
                chart.draw_series(
                    observed
                        .iter()
                        .map(|p| Circle::new(*p, 3, color.filled())),
                )?;
            }

            if let Some(line) = &series.forecast_line {
                chart.draw_series(DashedLineSeries::new(
                    to_xy(line).into_iter(),
                    10,
                    6,
                    color.mix(0.8).stroke_width(2),
                ))?;
            }
        }

        let note_font = FontDesc::new(FontFamily::SansSerif, 14.0, FontStyle::Normal);
        let markers = [
            (spec.last_observed, "(Last Observed)"),
            (spec.forecast_end, "(Forecast End)"),
        ];
        for (date, caption) in markers.iter() {
            if let Some(date) = date {
                let x = decimal_year(*date);
                chart.draw_series(DashedLineSeries::new(
                    vec![(x, y0), (x, y1)].into_iter(),
                    6,
                    4,
                    RGBColor(128, 128, 128).mix(0.6).stroke_width(1),
                ))?;
                let label_y = y0 + (y1 - y0) * 0.1;
                chart.draw_series(std::iter::once(Text::new(
                    format!("{} {}", date.year(), caption),
                    (x, label_y),
                    note_font.color(&BLACK),
                )))?;
            }
        }

        if spec.has_forecasts() {
            let x = x0 + (x1 - x0) * 0.02;
            let y = y0 + (y1 - y0) * 0.72;
            chart.draw_series(std::iter::once(Text::new(
                "Solid = Observed, Dashed = Forecasted",
                (x, y),
                note_font.clone().style(FontStyle::Italic).color(&BLACK),
            )))?;
        }

        chart
            .configure_series_labels()
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .label_font(FontDesc::new(FontFamily::SansSerif, 14.0, FontStyle::Normal))
            .position(SeriesLabelPosition::UpperLeft)
            .draw()?;

        area.present()?;
        Ok(())
    }
}

/// Render `spec` as a PNG at `path`, overwriting any existing file
pub fn render_chart(spec: &ChartSpec, path: &Path) -> Result<(), PipelineError> {
    let render_error = |reason: String| PipelineError::Render {
        path: path.to_path_buf(),
        reason,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.is_dir() {
            return Err(render_error(format!(
                "directory {} does not exist",
                parent.display()
            )));
        }
    }

    let backend = BitMapBackend::new(path, (spec.width, spec.height));
    RenderContext::new(backend.into_drawing_area(), spec)
        .draw()
        .map_err(|e| render_error(format!("{:#}", e)))?;

    info!(path = %path.display(), series = spec.series.len(), "chart written");
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::CategoryColumn;
    use crate::config::{ForecastConfig, ModelOrder};
    use crate::forecast::Forecaster;
    use crate::normalizer::NormalizedColumn;

    fn date(year: i32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, 1, 1).unwrap()
    }

    fn normalized() -> NormalizedSeries {
        let periods: Vec<NaiveDate> = (0..10).map(|i| date(2013 + i)).collect();
        let rising: Vec<Option<f64>> = (0..10).map(|i| Some(i as f64 / 9.0)).collect();
        let mut falling: Vec<Option<f64>> = (0..10).map(|i| Some(1.0 - i as f64 / 9.0)).collect();
        falling[2] = None;

        NormalizedSeries {
            periods,
            columns: vec![
                NormalizedColumn {
                    column: CategoryColumn {
                        category: Category::new(0, "Low"),
                        values: rising,
                    },
                    scale: None,
                },
                NormalizedColumn {
                    column: CategoryColumn {
                        category: Category::new(1, "Medium"),
                        values: falling,
                    },
                    scale: None,
                },
                NormalizedColumn {
                    column: CategoryColumn {
                        category: Category::new(2, "High"),
                        values: vec![None; 10],
                    },
                    scale: None,
                },
            ],
            diagnostics: Vec::new(),
        }
    }

    #[test]
    fn test_colors_follow_rank() {
        assert_eq!(category_color(0), RGBColor(31, 119, 180));
        assert_eq!(category_color(1), RGBColor(255, 127, 14));
        assert_eq!(category_color(2), RGBColor(44, 160, 44));
        assert_eq!(category_color(12), category_color(2));
    }

    #[test]
    fn test_spec_without_forecasts() {
        let spec = ChartSpec::from_analysis(
            &normalized(),
            &ForecastOutcome::default(),
            &ChartConfig::default(),
        );

        // the empty High column is not drawn
        assert_eq!(spec.series.len(), 2);
        assert_eq!(spec.series[1].observed.len(), 9);
        assert!(!spec.has_forecasts());
        assert_eq!(spec.last_observed, None);
        assert_eq!(spec.x_range(), (2013.0, 2022.0));
        let (y0, y1) = spec.y_range();
        assert!(y0 < 0.0 && y1 > 1.0);
    }

    #[test]
    fn test_spec_with_forecasts_connects_lines() {
        let norm = normalized();
        let forecaster = Forecaster::new(&ForecastConfig {
            horizon: 13,
            order: ModelOrder::new(5, 2, 1),
        });
        let outcome = forecaster.forecast_all(&norm);

        let spec = ChartSpec::from_analysis(&norm, &outcome, &ChartConfig::default());

        assert!(spec.has_forecasts());
        assert_eq!(spec.last_observed, Some(date(2022)));
        assert_eq!(spec.forecast_end, Some(date(2035)));
        for series in spec.series.iter().filter(|s| s.forecast_line.is_some()) {
            let line = series.forecast_line.as_ref().unwrap();
            assert_eq!(line.len(), 14);
            assert_eq!(line[0], *series.observed.last().unwrap());
        }
        assert_eq!(spec.x_range().1, 2035.0);
    }

    #[test]
    fn test_renders_png_with_forecasts() {
        let norm = normalized();
        let outcome = Forecaster::new(&ForecastConfig {
            horizon: 5,
            order: ModelOrder::new(5, 2, 1),
        })
        .forecast_all(&norm);
        let chart = ChartConfig {
            width: 640,
            height: 360,
            show_markers: true,
            ..ChartConfig::default()
        };
        let spec = ChartSpec::from_analysis(&norm, &outcome, &chart);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chart.png");

        render_chart(&spec, &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.len() > 8);
        assert_eq!(&bytes[1..4], b"PNG");

        // a second run overwrites the same file
        render_chart(&spec, &path).unwrap();
        assert!(path.is_file());
    }

    #[test]
    fn test_missing_directory_is_render_error() {
        let spec = ChartSpec::from_analysis(
            &normalized(),
            &ForecastOutcome::default(),
            &ChartConfig::default(),
        );
        let path = Path::new("/nonexistent-dir/chart.png");

        match render_chart(&spec, path) {
            Err(PipelineError::Render { path: p, reason }) => {
                assert_eq!(p, path);
                assert!(reason.contains("does not exist"));
            }
            other => panic!("expected Render error, got {:?}", other),
        }
    }
}
