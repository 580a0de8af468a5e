//! In-memory sample images shared by the unit tests.

use image::{codecs::png::PngEncoder, ExtendedColorType, ImageEncoder, Rgb, RgbImage};

use crate::image_hash::encode_jpeg;

/// Raw secret key reused across tests so signatures are reproducible.
pub(crate) const TEST_SECRET_KEY_HEX: &str =
    "787b76d96345bd45e88827f1fb9b4235bb847128c18de11ab7e395789578c578";

pub(crate) fn sample_pixels(width: u32, height: u32, seed: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x.wrapping_mul(16).wrapping_add(seed.wrapping_mul(31))) as u8,
            (y.wrapping_mul(16).wrapping_add(seed.wrapping_mul(7))) as u8,
            ((x ^ y).wrapping_mul(8).wrapping_add(seed)) as u8,
        ])
    })
}

pub(crate) fn sample_jpeg(width: u32, height: u32, seed: u32) -> Vec<u8> {
    encode_jpeg(&sample_pixels(width, height, seed), 90).unwrap()
}

pub(crate) fn sample_png(width: u32, height: u32, seed: u32) -> Vec<u8> {
    let pixels = sample_pixels(width, height, seed);
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(pixels.as_raw(), width, height, ExtendedColorType::Rgb8)
        .unwrap();
    out
}
