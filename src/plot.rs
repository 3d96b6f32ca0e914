// src/plot.rs
// Rasterizes one chain snapshot plus its trail into a PNG data URL.
// Plotters draws into a raw RGB buffer, `image` encodes it as PNG, base64 wraps it for JSON transport.
// Chain coordinates grow downward; the chart flips y so the chain hangs down on screen.

use crate::math::Point;
use base64::{engine::general_purpose, Engine as _};
use image::ImageFormat;
use plotters::prelude::*;
use std::io::{self, Cursor};

/// Image width in pixels.
pub const W: u32 = 500;
/// Image height in pixels.
pub const H: u32 = 500;

/// Half-width of the square plot area for a chain of `link_count` links.
pub fn plot_limit(link_count: usize, link_length: f64) -> f64 {
    link_count as f64 * link_length + 0.5 * link_length.max(0.1)
}

/// Draws the end-effector trail (oldest faintest) and the current links with their joints.
///
/// With a caption the chart gets a title and labelled axes; without one no text
/// is drawn, so no system font is needed.
pub fn render_png_data_url(
    snapshot: &[Point],
    trail: &[Point],
    limit: f64,
    caption: Option<&str>,
) -> io::Result<String> {
    let mut pixel_buffer = vec![0u8; (W * H * 3) as usize]; // RGB, 3 bytes per pixel.

    {
        let root = BitMapBackend::with_buffer(&mut pixel_buffer, (W, H)).into_drawing_area();
        root.fill(&WHITE).map_err(io::Error::other)?;

        let mut builder = ChartBuilder::on(&root);
        builder.margin(10);
        if let Some(caption) = caption {
            builder
                .caption(caption, ("sans-serif", 20).into_font())
                .x_label_area_size(30)
                .y_label_area_size(30);
        }
        let mut chart = builder
            .build_cartesian_2d(-limit..limit, -limit..limit)
            .map_err(io::Error::other)?;

        if caption.is_some() {
            chart.configure_mesh().draw().map_err(io::Error::other)?;
        }

        // Trail: fade each segment in by age.
        let segments = trail.len().saturating_sub(1).max(1) as f64;
        for (i, pair) in trail.windows(2).enumerate() {
            let alpha = 0.1 + 0.8 * (i as f64 / segments);
            chart
                .draw_series(LineSeries::new(
                    pair.iter().map(|p| (p.x, -p.y)),
                    MAGENTA.mix(alpha).stroke_width(1),
                ))
                .map_err(io::Error::other)?;
        }

        // Links.
        chart
            .draw_series(LineSeries::new(
                snapshot.iter().map(|p| (p.x, -p.y)),
                BLUE.stroke_width(2),
            ))
            .map_err(io::Error::other)?;

        // Joints; the anchor in red.
        chart
            .draw_series(snapshot.iter().enumerate().map(|(i, p)| {
                let color = if i == 0 { RED } else { BLACK };
                Circle::new((p.x, -p.y), 3, color.filled())
            }))
            .map_err(io::Error::other)?;

        root.present().map_err(io::Error::other)?;
    }

    encode_data_url(pixel_buffer)
}

fn encode_data_url(pixel_buffer: Vec<u8>) -> io::Result<String> {
    let img_buffer = image::ImageBuffer::from_raw(W, H, pixel_buffer)
        .ok_or_else(|| io::Error::other("Failed to create image buffer"))?;
    let dynamic_image = image::DynamicImage::ImageRgb8(img_buffer);

    let mut png_buffer = Cursor::new(Vec::new());
    dynamic_image
        .write_to(&mut png_buffer, ImageFormat::Png)
        .map_err(|e| io::Error::other(e.to_string()))?;

    Ok(format!(
        "data:image/png;base64,{}",
        general_purpose::STANDARD.encode(png_buffer.into_inner())
    ))
}
