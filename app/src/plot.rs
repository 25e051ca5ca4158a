// ==============================================================================
// plot.rs - Box Plot Rendering
// ==============================================================================
// Description: Renders per-condition genotype box plots as SVG
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================
// Layout: two PLOT_SIZE x PLOT_SIZE panels side by side ("Non-infected",
// "Flu"), each with one box per genotype class. Boxes are drawn from group
// statistics only; no individual points are plotted.
// ==============================================================================

use svg::node::element::{Group, Line, Rectangle, Text};
use svg::Document;

use crate::aggregate::{GroupSummary, PeakStatistics, Stats};
use crate::models::{ByGenotype, Condition, GenotypeClass};

pub const PLOT_SIZE: f64 = 350.0;

const MARGIN_TOP: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 40.0;
const MARGIN_LEFT: f64 = 50.0;
const MARGIN_RIGHT: f64 = 10.0;
const BOX_WIDTH: f64 = 50.0;
const TICKS: usize = 5;

/// Shared y-domain of a panel, from group min/max
fn domain(groups: &ByGenotype<GroupSummary>) -> Option<(f64, f64)> {
    let stats: Vec<&Stats> = groups.iter().filter_map(|(_, g)| g.stats.as_ref()).collect();
    if stats.is_empty() {
        return None;
    }

    let low = stats.iter().map(|s| s.min).fold(f64::INFINITY, f64::min);
    let high = stats.iter().map(|s| s.max).fold(f64::NEG_INFINITY, f64::max);

    if (high - low).abs() < f64::EPSILON {
        // Flat data still needs a visible range
        let pad = if low == 0.0 { 1.0 } else { low.abs() * 0.1 };
        return Some((low - pad, high + pad));
    }

    let pad = (high - low) * 0.05;
    Some((low - pad, high + pad))
}

struct Scale {
    low: f64,
    high: f64,
}

impl Scale {
    fn y(&self, value: f64) -> f64 {
        let inner = PLOT_SIZE - MARGIN_TOP - MARGIN_BOTTOM;
        let fraction = (value - self.low) / (self.high - self.low);
        MARGIN_TOP + inner * (1.0 - fraction)
    }
}

fn label(x: f64, y: f64, content: impl Into<String>, size: u32) -> Text {
    Text::new(content.into())
        .set("x", x)
        .set("y", y)
        .set("text-anchor", "middle")
        .set("font-family", "sans-serif")
        .set("font-size", size)
        .set("fill", "#333333")
}

fn line(x1: f64, y1: f64, x2: f64, y2: f64) -> Line {
    Line::new()
        .set("x1", x1)
        .set("y1", y1)
        .set("x2", x2)
        .set("y2", y2)
        .set("stroke", "#333333")
        .set("stroke-width", 1)
}

fn box_for(center: f64, stats: &Stats, scale: &Scale) -> Group {
    let half = BOX_WIDTH / 2.0;
    let q3 = scale.y(stats.quartile_3);
    let q1 = scale.y(stats.quartile_1);

    Group::new()
        .set("class", "box")
        // whisker
        .add(line(center, scale.y(stats.max), center, scale.y(stats.min)))
        .add(line(center - half / 2.0, scale.y(stats.max), center + half / 2.0, scale.y(stats.max)))
        .add(line(center - half / 2.0, scale.y(stats.min), center + half / 2.0, scale.y(stats.min)))
        .add(
            Rectangle::new()
                .set("x", center - half)
                .set("y", q3)
                .set("width", BOX_WIDTH)
                .set("height", (q1 - q3).max(1.0))
                .set("fill", "#d6e4f0")
                .set("stroke", "#333333"),
        )
        .add(line(center - half, scale.y(stats.median), center + half, scale.y(stats.median)).set("stroke-width", 2))
}

fn panel(condition: Condition, groups: &ByGenotype<GroupSummary>, offset: f64) -> Group {
    let mut group = Group::new()
        .set("transform", format!("translate({} 0)", offset))
        .add(label(PLOT_SIZE / 2.0, 20.0, condition.title(), 14));

    let slot = (PLOT_SIZE - MARGIN_LEFT - MARGIN_RIGHT) / GenotypeClass::ALL.len() as f64;
    let baseline = PLOT_SIZE - MARGIN_BOTTOM;

    group = group
        .add(line(MARGIN_LEFT, MARGIN_TOP, MARGIN_LEFT, baseline))
        .add(line(MARGIN_LEFT, baseline, PLOT_SIZE - MARGIN_RIGHT, baseline));

    let scale = domain(groups).map(|(low, high)| Scale { low, high });

    if let Some(scale) = &scale {
        for i in 0..TICKS {
            let value = scale.low + (scale.high - scale.low) * i as f64 / (TICKS - 1) as f64;
            let y = scale.y(value);
            group = group
                .add(line(MARGIN_LEFT - 4.0, y, MARGIN_LEFT, y))
                .add(label(MARGIN_LEFT - 22.0, y + 4.0, format!("{:.2}", value), 10));
        }
    }

    for (index, (class, summary)) in groups.iter().enumerate() {
        let center = MARGIN_LEFT + slot * (index as f64 + 0.5);
        group = group.add(label(
            center,
            baseline + 16.0,
            format!("{} (n={})", class.label(), summary.n),
            11,
        ));

        match (&summary.stats, &scale) {
            (Some(stats), Some(scale)) => {
                group = group.add(box_for(center, stats, scale));
            }
            _ => {
                group = group.add(label(center, PLOT_SIZE / 2.0, "no data", 11).set("fill", "#999999"));
            }
        }
    }

    group
}

/// Render both condition panels into one SVG document
pub fn render_boxplots(stats: &PeakStatistics) -> String {
    let mut document = Document::new()
        .set("width", PLOT_SIZE * 2.0)
        .set("height", PLOT_SIZE)
        .set("viewBox", (0.0, 0.0, PLOT_SIZE * 2.0, PLOT_SIZE));

    for (index, (condition, groups)) in stats.iter().enumerate() {
        document = document.add(panel(condition, groups, PLOT_SIZE * index as f64));
    }

    document.to_string()
}
