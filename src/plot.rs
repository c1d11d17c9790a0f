use std::path::Path;

use log::debug;
use plotters::prelude::*;

use crate::{
    checkpoint::ensure_parent,
    error::{Error, Result},
    util::linear_fit,
};

const SIZE: (u32, u32) = (1024, 768);

fn plot_error(err: impl std::fmt::Display) -> Error {
    Error::Plot(err.to_string())
}

/// Y range covering every reward, padded so flat curves stay visible
fn y_range(rewards: &[f32]) -> (f64, f64) {
    let (lo, hi) = rewards
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
            (lo.min(r as f64), hi.max(r as f64))
        });
    if !lo.is_finite() {
        return (0.0, 1.0);
    }
    let pad = ((hi - lo) * 0.05).max(1.0);
    (lo - pad, hi + pad)
}

/// Render total rewards per episode to a PNG at `path`
///
/// With `trend` set, the least-squares line through the rewards is drawn dashed in red
pub fn plot_rewards(path: &Path, title: &str, rewards: &[f32], trend: bool) -> Result<()> {
    ensure_parent(path)?;

    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(plot_error)?;

    let x_max = rewards.len().max(1) as f64;
    let (y_min, y_max) = y_range(rewards);

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 40).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0.0..x_max, y_min..y_max)
        .map_err(plot_error)?;

    chart
        .configure_mesh()
        .x_desc("Episode")
        .y_desc("Reward")
        .draw()
        .map_err(plot_error)?;

    chart
        .draw_series(LineSeries::new(
            rewards.iter().enumerate().map(|(i, &r)| (i as f64, r as f64)),
            &BLUE,
        ))
        .map_err(plot_error)?;

    if trend {
        if let Some((slope, intercept)) = linear_fit(rewards) {
            chart
                .draw_series(DashedLineSeries::new(
                    [0.0, x_max - 1.0].map(|x| (x, slope * x + intercept)),
                    10,
                    5,
                    RED.stroke_width(2),
                ))
                .map_err(plot_error)?;
        }
    }

    root.present().map_err(plot_error)?;
    debug!("Wrote reward plot to {}", path.display());
    Ok(())
}
