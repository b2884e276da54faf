use image::{GrayImage, Luma};

use crate::error::QtarError;
use crate::grid::{Grid, Rect, RegionSet};

/// Peak signal to noise ratio in dB over all channels, infinite for identical images.
pub fn psnr(original: &[GrayImage], modified: &[GrayImage]) -> Result<f64, QtarError> {
    let mut squared = 0.0f64;
    let mut count = 0usize;
    for (channel, (a, b)) in original.iter().zip(modified.iter()).enumerate() {
        if a.dimensions() != b.dimensions() {
            return Err(QtarError::Dimension {
                channel,
                width: b.width() as usize,
                height: b.height() as usize,
            });
        }
        squared += a
            .as_raw()
            .iter()
            .zip(b.as_raw().iter())
            .map(|(p, q)| (*p as f64 - *q as f64).powi(2))
            .sum::<f64>();
        count += a.as_raw().len();
    }
    if original.len() != modified.len() || count == 0 {
        return Err(QtarError::SecretShape {
            reason: format!("cannot compare {} channels to {}", original.len(), modified.len()),
        });
    }
    let mse = squared / count as f64;
    Ok(10.0 * (255.0f64 * 255.0 / mse).log10())
}

/// Render coefficients as an image, the magnitudes are log-scaled into the 8 bit range.
pub fn coefficient_image(coefficients: &Grid<f32>) -> GrayImage {
    let scaled = coefficients.map(|v| (1.0 + v.abs()).ln());
    let max = scaled.as_slice().iter().fold(0.0f32, |a, b| a.max(*b));
    scaled
        .map(|v| if max > 0.0 { (v / max * 255.0) as u8 } else { 0 })
        .into()
}

/// Draw the right and bottom edge of every rectangle onto a copy of the channel.
pub fn draw_borders(channel: &GrayImage, rects: &[Rect], value: u8) -> GrayImage {
    let mut out = channel.clone();
    for rect in rects.iter().filter(|r| r.area() > 0) {
        for y in rect.y0..rect.y1 {
            out.put_pixel(rect.x1 as u32 - 1, y as u32, Luma([value]));
        }
        for x in rect.x0..rect.x1 {
            out.put_pixel(x as u32, rect.y1 as u32 - 1, Luma([value]));
        }
    }
    out
}

/// Mask of the writable cells: 255 inside an adaptive region, 0 elsewhere.
pub fn region_mask(regions: &RegionSet, width: usize, height: usize) -> GrayImage {
    let mut mask = Grid::new(width, height, 0u8);
    for i in 0..regions.len() {
        regions.set(&mut mask, i, &vec![255; regions.region_size(i)]);
    }
    mask.into()
}
