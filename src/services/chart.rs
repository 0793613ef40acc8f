// src/services/chart.rs

//! Performance chart attached to periodic reports.
//!
//! Rendering is best effort: callers treat an error as "no chart".

use chrono::{DateTime, Utc};
use plotters::prelude::*;
use thiserror::Error;

use crate::{models::score::ScoreRecord, services::rollup::percentage};

const ROYAL_BLUE: RGBColor = RGBColor(65, 105, 225);

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("no data points to plot")]
    Empty,

    #[error("chart rendering failed: {0}")]
    Render(String),
}

/// One plotted attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartPoint {
    pub attempted_at: DateTime<Utc>,
    pub percentage: f64,
}

/// A rendered chart ready to be attached to a message.
#[derive(Debug, Clone)]
pub struct Chart {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Chronologically sorted points, one per record. Ties keep input order.
pub fn performance_points(records: &[ScoreRecord]) -> Vec<ChartPoint> {
    let mut points: Vec<ChartPoint> = records
        .iter()
        .map(|r| ChartPoint {
            attempted_at: r.attempted_at,
            percentage: percentage(r.total_scored, r.max_score),
        })
        .collect();
    points.sort_by_key(|p| p.attempted_at);
    points
}

/// Renders the points as an SVG: a single bar for one attempt, a line otherwise.
pub fn render_performance_chart(points: &[ChartPoint]) -> Result<Chart, ChartError> {
    if points.is_empty() {
        return Err(ChartError::Empty);
    }

    let labels: Vec<String> = points
        .iter()
        .map(|p| p.attempted_at.format("%m/%d").to_string())
        .collect();
    let n = points.len();

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (800, 400)).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;

        let mut chart = ChartBuilder::on(&root)
            .caption("Quiz Performance", ("sans-serif", 24))
            .margin(16)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d((0..n).into_segmented(), 0f64..100f64)
            .map_err(render_err)?;

        let label_for = |v: &SegmentValue<usize>| match v {
            SegmentValue::CenterOf(i) => labels.get(*i).cloned().unwrap_or_default(),
            _ => String::new(),
        };

        chart
            .configure_mesh()
            .x_desc("Date")
            .y_desc("Score (%)")
            .x_labels(n.min(12))
            .x_label_formatter(&label_for)
            .draw()
            .map_err(render_err)?;

        if n == 1 {
            chart
                .draw_series(points.iter().enumerate().map(|(i, p)| {
                    Rectangle::new(
                        [
                            (SegmentValue::Exact(i), 0.0),
                            (SegmentValue::Exact(i + 1), p.percentage),
                        ],
                        ROYAL_BLUE.filled(),
                    )
                }))
                .map_err(render_err)?;
        } else {
            chart
                .draw_series(LineSeries::new(
                    points
                        .iter()
                        .enumerate()
                        .map(|(i, p)| (SegmentValue::CenterOf(i), p.percentage)),
                    &ROYAL_BLUE,
                ))
                .map_err(render_err)?;
            chart
                .draw_series(points.iter().enumerate().map(|(i, p)| {
                    Circle::new(
                        (SegmentValue::CenterOf(i), p.percentage),
                        4,
                        ROYAL_BLUE.filled(),
                    )
                }))
                .map_err(render_err)?;
        }

        root.present().map_err(render_err)?;
    }

    Ok(Chart {
        file_name: "performance.svg".to_string(),
        content_type: "image/svg+xml".to_string(),
        bytes: svg.into_bytes(),
    })
}

fn render_err<E: std::fmt::Display>(e: E) -> ChartError {
    ChartError::Render(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn record(day: u32, scored: i64, max: i64) -> ScoreRecord {
        ScoreRecord {
            score_id: day as i64,
            quiz_id: 1,
            attempted_at: Utc.with_ymd_and_hms(2024, 4, day, 9, 0, 0).unwrap(),
            total_scored: scored,
            max_score: max,
            quiz_date: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            chapter_id: 1,
            chapter_name: "Limits".to_string(),
            subject_id: 1,
            subject_name: "Math".to_string(),
        }
    }

    #[test]
    fn points_are_sorted_chronologically() {
        let points = performance_points(&[record(9, 1, 2), record(3, 0, 0), record(5, 3, 4)]);
        let pct: Vec<f64> = points.iter().map(|p| p.percentage).collect();
        assert_eq!(pct, vec![0.0, 75.0, 50.0]);
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(matches!(render_performance_chart(&[]), Err(ChartError::Empty)));
    }

    #[test]
    fn renders_svg_for_one_and_many_points() {
        let single = render_performance_chart(&performance_points(&[record(2, 4, 5)])).unwrap();
        let text = String::from_utf8(single.bytes).unwrap();
        assert!(text.contains("<svg"));
        assert_eq!(single.content_type, "image/svg+xml");

        let many = render_performance_chart(&performance_points(&[
            record(2, 4, 5),
            record(4, 2, 5),
            record(8, 5, 5),
        ]))
        .unwrap();
        assert!(String::from_utf8(many.bytes).unwrap().contains("<svg"));
    }
}
