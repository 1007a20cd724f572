//! Layer stacking and preview helpers.

use image::imageops::{self, FilterType};
use image::RgbaImage;

/// Stack `overlay` onto `base` in place (source-over, straight alpha).
pub fn composite_onto(base: &mut RgbaImage, overlay: &RgbaImage) {
    imageops::overlay(base, overlay, 0, 0);
}

/// Stack `overlay` onto a copy of `base`.
pub fn composite(base: &RgbaImage, overlay: &RgbaImage) -> RgbaImage {
    let mut joined = base.clone();
    composite_onto(&mut joined, overlay);
    joined
}

/// Make pure white pixels fully transparent.
///
/// Base canvases are drawn on a white background; keying it out lets new
/// labels sit on top of the earlier drawing only.
pub fn key_out_white(mut image: RgbaImage) -> RgbaImage {
    for pixel in image.pixels_mut() {
        if pixel[0] == 255 && pixel[1] == 255 && pixel[2] == 255 {
            pixel[3] = 0;
        }
    }
    image
}

/// Resize to `height` pixels tall, keeping the aspect ratio.
pub fn scale_to_height(image: &RgbaImage, height: u32) -> RgbaImage {
    let (width, current_height) = image.dimensions();
    if height == 0 || current_height == 0 || current_height == height {
        return image.clone();
    }
    let scaled_width =
        ((u64::from(width) * u64::from(height)) as f64 / f64::from(current_height)).round() as u32;
    imageops::resize(image, scaled_width.max(1), height, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_key_out_white() {
        let mut image = RgbaImage::from_pixel(2, 1, Rgba([255, 255, 255, 255]));
        image.put_pixel(1, 0, Rgba([255, 255, 254, 255]));

        let keyed = key_out_white(image);
        assert_eq!(keyed.get_pixel(0, 0)[3], 0);
        assert_eq!(keyed.get_pixel(1, 0)[3], 255);
    }

    #[test]
    fn test_later_layer_wins() {
        let red = RgbaImage::from_pixel(3, 3, Rgba([255, 0, 0, 255]));
        let mut green = RgbaImage::new(3, 3);
        green.put_pixel(1, 1, Rgba([0, 255, 0, 255]));

        let joined = composite(&red, &green);
        assert_eq!(*joined.get_pixel(1, 1), Rgba([0, 255, 0, 255]));
        assert_eq!(*joined.get_pixel(0, 0), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_transparent_overlay_keeps_base() {
        let base = RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 255]));
        let joined = composite(&base, &RgbaImage::new(2, 2));
        assert_eq!(joined, base);
    }

    #[test]
    fn test_scale_to_height_keeps_aspect() {
        let image = RgbaImage::new(40, 20);
        let scaled = scale_to_height(&image, 10);
        assert_eq!(scaled.dimensions(), (20, 10));
    }

    #[test]
    fn test_scale_to_zero_height_is_identity() {
        let image = RgbaImage::new(4, 4);
        assert_eq!(scale_to_height(&image, 0).dimensions(), (4, 4));
    }
}
