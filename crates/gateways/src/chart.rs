use std::f64::consts::PI;
use std::fmt;
use std::path::{Path, PathBuf};

use image::{codecs::png::PngEncoder, ColorType, ImageEncoder, Rgba, RgbaImage};
use tracing::info;
use uuid::Uuid;

use crate::{meraki::TrafficTotal, GatewayError};

pub const SERVICE: &str = "Chart renderer";

/// Number of destinations drawn as slices.
pub const CHART_TOP_N: usize = 10;

pub const WIDTH: u32 = 640;
pub const HEIGHT: u32 = 400;
const CENTER_X: f64 = 200.0;
const CENTER_Y: f64 = 200.0;
const RADIUS: f64 = 170.0;
const SWATCH_X: u32 = 420;
const SWATCH_Y: u32 = 52;
const SWATCH_SIZE: u32 = 18;
const SWATCH_STEP: u32 = 30;

const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
const EMPTY_PIE: Rgba<u8> = Rgba([224, 224, 224, 255]);
const PALETTE: [(&str, Rgba<u8>); CHART_TOP_N] = [
    ("blue", Rgba([31, 119, 180, 255])),
    ("orange", Rgba([255, 127, 14, 255])),
    ("green", Rgba([44, 160, 44, 255])),
    ("red", Rgba([214, 39, 40, 255])),
    ("purple", Rgba([148, 103, 189, 255])),
    ("brown", Rgba([140, 86, 75, 255])),
    ("pink", Rgba([227, 119, 194, 255])),
    ("grey", Rgba([127, 127, 127, 255])),
    ("olive", Rgba([188, 189, 34, 255])),
    ("cyan", Rgba([23, 190, 207, 255])),
];

/// One slice of the pie, in drawing order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChartSlice {
    pub destination: String,
    pub color: &'static str,
    /// Share of the charted bytes in tenths of a percent.
    pub share_permille: u32,
}

impl fmt::Display for ChartSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {}.{}%)",
            self.destination,
            self.color,
            self.share_permille / 10,
            self.share_permille % 10
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedChart {
    pub path: PathBuf,
    pub url: String,
    /// Empty when there was no traffic to draw.
    pub legend: Vec<ChartSlice>,
}

/// Writes PNG pie charts into the media directory served under `media_base_url`.
#[derive(Clone, Debug)]
pub struct PieChartRenderer {
    media_dir: PathBuf,
    media_base_url: String,
}

impl PieChartRenderer {
    pub fn new(media_dir: impl AsRef<Path>, media_base_url: impl Into<String>) -> Self {
        let media_base_url = media_base_url.into().trim_end_matches('/').to_owned();
        Self { media_dir: media_dir.as_ref().to_path_buf(), media_base_url }
    }

    pub async fn render(&self, totals: &[TrafficTotal]) -> Result<RenderedChart, GatewayError> {
        let legend = chart_legend(totals);
        let png = encode_png(&pie_chart_image(totals))?;
        let file_name = format!("traffic-{}.png", Uuid::new_v4());
        let path = self.media_dir.join(&file_name);

        tokio::fs::create_dir_all(&self.media_dir)
            .await
            .map_err(|error| GatewayError::Render(format!("create media dir: {error}")))?;
        tokio::fs::write(&path, png)
            .await
            .map_err(|error| GatewayError::Render(format!("write {}: {error}", path.display())))?;

        info!(
            event_name = "workflow.chart.rendered",
            path = %path.display(),
            slices = legend.len(),
            "traffic chart rendered"
        );
        Ok(RenderedChart { url: format!("{}/{file_name}", self.media_base_url), path, legend })
    }
}

fn charted_sum(shown: &[TrafficTotal]) -> u64 {
    shown.iter().fold(0u64, |sum, total| sum.saturating_add(total.total_bytes))
}

/// Legend entries for the first [`CHART_TOP_N`] totals. Empty when they sum to zero.
pub fn chart_legend(totals: &[TrafficTotal]) -> Vec<ChartSlice> {
    let shown = &totals[..totals.len().min(CHART_TOP_N)];
    let sum = charted_sum(shown);
    if sum == 0 {
        return Vec::new();
    }

    shown
        .iter()
        .zip(PALETTE)
        .map(|(total, (color, _))| ChartSlice {
            destination: total.destination.clone(),
            color,
            share_permille: (u128::from(total.total_bytes) * 1000 / u128::from(sum)) as u32,
        })
        .collect()
}

/// Draws the first [`CHART_TOP_N`] totals as a pie, clockwise from twelve
/// o'clock, with a colour swatch per slice. All-zero input draws a grey disc.
pub fn pie_chart_image(totals: &[TrafficTotal]) -> RgbaImage {
    let shown = &totals[..totals.len().min(CHART_TOP_N)];
    let sum = charted_sum(shown);

    let mut bounds = Vec::with_capacity(shown.len());
    let mut running = 0.0;
    for total in shown {
        running += if sum == 0 { 0.0 } else { total.total_bytes as f64 / sum as f64 };
        bounds.push(running);
    }

    let mut image = RgbaImage::from_pixel(WIDTH, HEIGHT, BACKGROUND);
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let dx = f64::from(x) + 0.5 - CENTER_X;
        let dy = f64::from(y) + 0.5 - CENTER_Y;
        if dx * dx + dy * dy > RADIUS * RADIUS {
            continue;
        }
        if sum == 0 {
            *pixel = EMPTY_PIE;
            continue;
        }

        let mut angle = dy.atan2(dx) + PI / 2.0;
        if angle < 0.0 {
            angle += 2.0 * PI;
        }
        let fraction = angle / (2.0 * PI);
        let slice = bounds
            .iter()
            .position(|bound| fraction < *bound)
            .or_else(|| shown.iter().rposition(|total| total.total_bytes > 0))
            .unwrap_or(0);
        *pixel = PALETTE[slice].1;
    }

    if sum > 0 {
        for (index, (_, color)) in PALETTE.iter().take(shown.len()).enumerate() {
            let top = SWATCH_Y + index as u32 * SWATCH_STEP;
            for y in top..top + SWATCH_SIZE {
                for x in SWATCH_X..SWATCH_X + SWATCH_SIZE {
                    image.put_pixel(x, y, *color);
                }
            }
        }
    }

    image
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, GatewayError> {
    let mut bytes = Vec::new();
    PngEncoder::new(&mut bytes)
        .write_image(image.as_raw(), image.width(), image.height(), ColorType::Rgba8)
        .map_err(|error| GatewayError::Render(format!("encode png: {error}")))?;
    Ok(bytes)
}
