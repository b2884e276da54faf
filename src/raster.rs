//! Conversions between whole images and the square 8 bit channels the engine works on.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageBuffer, Luma, Rgb, RgbImage};

use crate::error::QtarError;

/// Largest power of two not exceeding the shorter side, 0 for an empty image.
pub fn power_of_two_side(width: u32, height: u32) -> u32 {
    let side = width.min(height);
    if side == 0 {
        0
    } else {
        1 << (31 - side.leading_zeros())
    }
}

/// Resize to the largest power-of-two square that fits inside the image.
pub fn fit_container(image: &DynamicImage) -> DynamicImage {
    let side = power_of_two_side(image.width(), image.height());
    if image.width() == side && image.height() == side {
        return image.clone();
    }
    image.resize_exact(side, side, FilterType::Triangle)
}

/// Side of the largest square secret carried by `capacity` samples per channel.
///
/// With a payload DCT the side is rounded down to whole tiles.
pub fn fitting_secret_side(capacity: usize, tile: usize) -> u32 {
    let mut side = (capacity as f64).sqrt().floor() as usize;
    if tile > 1 {
        side -= side % tile;
    }
    side as u32
}

/// Split into grayscale channels, one for luma images and three otherwise.
///
/// Alpha is dropped.
pub fn split_channels(image: &DynamicImage) -> Vec<GrayImage> {
    match image.color() {
        image::ColorType::L8 | image::ColorType::La8 | image::ColorType::L16 | image::ColorType::La16 => {
            vec![image.to_luma8()]
        }
        _ => {
            let rgb = image.to_rgb8();
            (0..3)
                .map(|c| {
                    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| Luma([rgb.get_pixel(x, y)[c]]))
                })
                .collect()
        }
    }
}

/// Split converting to the given number of channels, used to match a secret to its container.
pub fn split_channels_as(image: &DynamicImage, channels: usize) -> Vec<GrayImage> {
    if channels == 1 {
        vec![image.to_luma8()]
    } else {
        split_channels(&DynamicImage::ImageRgb8(image.to_rgb8()))
    }
}

/// Merge one or three grayscale channels back into an image.
pub fn merge_channels(channels: &[GrayImage]) -> Result<DynamicImage, QtarError> {
    match channels {
        [luma] => Ok(DynamicImage::ImageLuma8(luma.clone())),
        [r, g, b] if r.dimensions() == g.dimensions() && g.dimensions() == b.dimensions() => {
            let rgb: RgbImage = ImageBuffer::from_fn(r.width(), r.height(), |x, y| {
                Rgb([
                    r.get_pixel(x, y)[0],
                    g.get_pixel(x, y)[0],
                    b.get_pixel(x, y)[0],
                ])
            });
            Ok(DynamicImage::ImageRgb8(rgb))
        }
        _ => Err(QtarError::SecretShape {
            reason: format!("cannot merge {} channels into an image", channels.len()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_of_two_side() {
        assert_eq!(power_of_two_side(0, 10), 0);
        assert_eq!(power_of_two_side(1, 1), 1);
        assert_eq!(power_of_two_side(640, 480), 256);
        assert_eq!(power_of_two_side(512, 512), 512);
    }

    #[test]
    fn test_fitting_secret_side() {
        assert_eq!(fitting_secret_side(1000, 0), 31);
        assert_eq!(fitting_secret_side(1000, 8), 24);
        assert_eq!(fitting_secret_side(3, 8), 0);
    }

    #[test]
    fn test_split_merge() {
        let rgb = RgbImage::from_fn(4, 4, |x, y| Rgb([x as u8, y as u8, 7]));
        let image = DynamicImage::ImageRgb8(rgb.clone());
        let channels = split_channels(&image);
        assert_eq!(channels.len(), 3);
        assert_eq!(channels[1].get_pixel(2, 3)[0], 3);
        let merged = merge_channels(&channels).unwrap();
        assert_eq!(merged.to_rgb8(), rgb);

        let gray = DynamicImage::ImageLuma8(channels[0].clone());
        assert_eq!(split_channels(&gray).len(), 1);
        assert_eq!(split_channels_as(&gray, 3).len(), 3);
        assert!(merge_channels(&channels[..2]).is_err());
    }

    #[test]
    fn test_fit_container() {
        let image = DynamicImage::ImageLuma8(GrayImage::new(100, 70));
        let fitted = fit_container(&image);
        assert_eq!((fitted.width(), fitted.height()), (64, 64));
    }
}
