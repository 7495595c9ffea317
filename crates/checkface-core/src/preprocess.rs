//! Image preprocessing for the ArcFace input.
//!
//! Captured photos are decoded, center-cropped to a square, resized to the
//! model's fixed input and written as planar normalized floats into a pooled
//! NCHW tensor.

use image::{imageops, DynamicImage, RgbImage};
use ndarray::Array4;

pub const INPUT_SIZE: u32 = 112;
pub const PIXEL_MEAN: f32 = 127.5;
pub const PIXEL_SCALE: f32 = 128.0;

/// Center-crop to the largest square, then resize to `size × size`.
pub fn crop_and_resize(image: &DynamicImage, size: u32) -> RgbImage {
    let rgb = image.to_rgb8();
    let (w, h) = rgb.dimensions();
    let side = w.min(h);
    let x = (w - side) / 2;
    let y = (h - side) / 2;
    let square = imageops::crop_imm(&rgb, x, y, side, side).to_image();
    if side == size {
        return square;
    }
    imageops::resize(&square, size, size, imageops::FilterType::Triangle)
}

/// Write interleaved RGB bytes into planar channels of `tensor[0]` as
/// `(v - 127.5) / 128`. The image must match the tensor's spatial size.
pub fn write_planar(image: &RgbImage, tensor: &mut Array4<f32>) {
    let (w, h) = image.dimensions();
    debug_assert_eq!(tensor.shape(), &[1, 3, h as usize, w as usize]);

    for (x, y, pixel) in image.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for c in 0..3 {
            tensor[[0, c, y, x]] = (pixel.0[c] as f32 - PIXEL_MEAN) / PIXEL_SCALE;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_crop_is_centered_square() {
        // Left third red, middle third green, right third blue.
        let img = RgbImage::from_fn(300, 100, |x, _| match x / 100 {
            0 => Rgb([255, 0, 0]),
            1 => Rgb([0, 255, 0]),
            _ => Rgb([0, 0, 255]),
        });
        let out = crop_and_resize(&DynamicImage::ImageRgb8(img), 100);
        assert_eq!(out.dimensions(), (100, 100));
        assert_eq!(out.get_pixel(50, 50), &Rgb([0, 255, 0]));
        assert_eq!(out.get_pixel(0, 0), &Rgb([0, 255, 0]));
    }

    #[test]
    fn test_resize_to_input_size() {
        let img = RgbImage::from_pixel(640, 480, Rgb([10, 20, 30]));
        let out = crop_and_resize(&DynamicImage::ImageRgb8(img), INPUT_SIZE);
        assert_eq!(out.dimensions(), (INPUT_SIZE, INPUT_SIZE));
        let px = out.get_pixel(56, 56).0;
        for (got, want) in px.iter().zip([10u8, 20, 30]) {
            assert!(got.abs_diff(want) <= 1, "{px:?}");
        }
    }

    #[test]
    fn test_planar_normalization() {
        let img = RgbImage::from_fn(2, 2, |x, y| Rgb([(x * 255) as u8, (y * 255) as u8, 128]));
        let mut tensor = Array4::<f32>::zeros((1, 3, 2, 2));
        write_planar(&img, &mut tensor);

        assert!((tensor[[0, 0, 0, 0]] - (-127.5 / 128.0)).abs() < 1e-6);
        assert!((tensor[[0, 0, 0, 1]] - (127.5 / 128.0)).abs() < 1e-6);
        assert!((tensor[[0, 1, 1, 0]] - (127.5 / 128.0)).abs() < 1e-6);
        assert!((tensor[[0, 2, 1, 1]] - (0.5 / 128.0)).abs() < 1e-6);
    }
}
