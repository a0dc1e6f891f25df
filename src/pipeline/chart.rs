//! Ratio bar chart, encoded as PNG.
//!
//! One group of bars per ratio name, one bar per ratio set inside each
//! group, coloured by set. Bars grow up from a zero baseline, or down for
//! negative values; unavailable ratios leave a gap. Text labels are left to
//! the report, which lists every value next to its name.

use crate::error::AnalysisError;
use crate::output::TableRatios;
use crate::ratios::RATIO_NAMES;
use image::{ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use tracing::debug;

pub const CHART_WIDTH: u32 = 800;
pub const CHART_HEIGHT: u32 = 400;

const MARGIN: u32 = 40;
const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
const AXIS: Rgba<u8> = Rgba([60, 60, 60, 255]);

const PALETTE: [Rgba<u8>; 6] = [
    Rgba([31, 119, 180, 255]),
    Rgba([255, 127, 14, 255]),
    Rgba([44, 160, 44, 255]),
    Rgba([214, 39, 40, 255]),
    Rgba([148, 103, 189, 255]),
    Rgba([140, 86, 75, 255]),
];

/// Colour of the `i`-th ratio set.
pub fn series_colour(i: usize) -> Rgba<u8> {
    PALETTE[i % PALETTE.len()]
}

/// Render every available ratio of every set.
///
/// Returns `Ok(None)` when no set has an available ratio.
pub fn render_ratio_chart(sets: &[TableRatios]) -> Result<Option<Vec<u8>>, AnalysisError> {
    let values: Vec<Vec<Option<f64>>> = RATIO_NAMES
        .iter()
        .map(|name| {
            sets.iter()
                .map(|s| s.ratios.get(name).and_then(|v| v.value()))
                .collect()
        })
        .collect();

    let max = values.iter().flatten().flatten().fold(0.0f64, |m, v| m.max(*v));
    let min = values.iter().flatten().flatten().fold(0.0f64, |m, v| m.min(*v));
    if values.iter().flatten().all(Option::is_none) {
        return Ok(None);
    }

    let mut img = RgbaImage::from_pixel(CHART_WIDTH, CHART_HEIGHT, BACKGROUND);

    let plot_top = MARGIN;
    let plot_bottom = CHART_HEIGHT - MARGIN;
    let plot_height = (plot_bottom - plot_top) as f64;
    let span = if max - min > 0.0 { max - min } else { 1.0 };
    let to_y = |v: f64| -> u32 {
        let frac = (max - v) / span;
        plot_top + (frac * plot_height).round().clamp(0.0, plot_height) as u32
    };
    let baseline = to_y(0.0);

    let plot_width = CHART_WIDTH - 2 * MARGIN;
    let group_width = plot_width / RATIO_NAMES.len() as u32;
    let series = sets.len().max(1) as u32;
    let bar_width = ((group_width * 3 / 4) / series).max(1);

    for (g, group) in values.iter().enumerate() {
        let group_left = MARGIN + g as u32 * group_width + group_width / 8;
        for (s, value) in group.iter().enumerate() {
            let Some(v) = value else { continue };
            let x0 = group_left + s as u32 * bar_width;
            let y = to_y(*v);
            let (top, bottom) = if y <= baseline { (y, baseline) } else { (baseline, y) };
            // Zero-height bars still get one pixel so a 0.00 value is visible.
            let bottom = bottom.max(top + 1);
            fill_rect(&mut img, x0, top, bar_width.saturating_sub(2).max(1), bottom - top, series_colour(s));
        }
    }

    fill_rect(&mut img, MARGIN, baseline, plot_width, 1, AXIS);
    fill_rect(&mut img, MARGIN, plot_top, 1, plot_bottom - plot_top, AXIS);

    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| AnalysisError::ChartFailed(e.to_string()))?;
    debug!("Chart: {} sets, {} bytes PNG", sets.len(), buf.len());
    Ok(Some(buf))
}

fn fill_rect(img: &mut RgbaImage, x: u32, y: u32, w: u32, h: u32, colour: Rgba<u8>) {
    let x_end = (x + w).min(img.width());
    let y_end = (y + h).min(img.height());
    for py in y.min(y_end)..y_end {
        for px in x.min(x_end)..x_end {
            img.put_pixel(px, py, colour);
        }
    }
}
