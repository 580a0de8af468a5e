use std::borrow::Cow;

use anyhow::anyhow;
use image::{codecs::jpeg::JpegEncoder, ExtendedColorType, ImageEncoder, ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;

/// JPEG quality used whenever this crate re-encodes pixels.
pub const REENCODE_JPEG_QUALITY: u8 = 95;

/// How an image is reduced to bytes before SHA-256 hashing.
///
/// Each proof type is bound to exactly one convention (see
/// [`ProofType::hash_convention`](crate::payload::ProofType::hash_convention)).
/// The verifier never tries a second convention: a proof hashed one way and
/// checked another would read as tampered.
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    Debug,
    Serialize,
    Deserialize,
    strum::EnumString,
    strum::Display,
)]
pub enum HashConvention {
    /// Hash the container bytes exactly as they stood before the proof
    /// segment was inserted.
    #[serde(rename = "container_bytes")]
    #[strum(serialize = "container_bytes")]
    ContainerBytes,
    /// Decode, convert to RGB8, re-encode as JPEG at
    /// [`REENCODE_JPEG_QUALITY`] without metadata, hash the result.
    #[serde(rename = "reencoded_jpeg")]
    #[strum(serialize = "reencoded_jpeg")]
    ReencodedJpeg,
}

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes the content hash of `image` under `convention`.
///
/// For [`HashConvention::ContainerBytes`] the caller must pass the
/// pre-embedding artifact; the verifier gets it back with
/// [`exif::strip_proof_segment`](crate::exif::strip_proof_segment).
///
/// # Arguments
///
/// * `convention` - The hashing convention bound to the proof type.
/// * `image` - The image bytes to hash.
///
/// # Returns
///
/// A 64 character lowercase hex digest.
pub fn hash_image(convention: HashConvention, image: &[u8]) -> Result<String> {
    let digest = match convention {
        HashConvention::ContainerBytes => sha256_hex(image),
        HashConvention::ReencodedJpeg => sha256_hex(&reencode_jpeg(image)?),
    };
    log::trace!("{convention} hash over {} bytes: {digest}", image.len());

    Ok(digest)
}

/// Same as [`hash_image`] but runs on the blocking pool, since decoding and
/// re-encoding is CPU bound.
pub async fn hash_image_blocking(convention: HashConvention, image: Vec<u8>) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_image(convention, &image))
        .await
        .map_err(|e| anyhow!("hashing task failed: {e}"))?
}

/// Case-insensitive comparison of two hex digests.
pub fn hashes_match(recomputed: &str, expected: &str) -> bool {
    recomputed.eq_ignore_ascii_case(expected)
}

/// Decodes any supported image and re-encodes its RGB8 pixels as a clean JPEG.
pub fn reencode_jpeg(image: &[u8]) -> Result<Vec<u8>> {
    let decoded = image::load_from_memory(image)?;
    encode_jpeg(&decoded.to_rgb8(), REENCODE_JPEG_QUALITY)
}

/// Returns `image` untouched if it already is a JPEG, otherwise transcodes it.
pub fn normalize_to_jpeg(image: &[u8]) -> Result<Cow<'_, [u8]>> {
    if image::guess_format(image)? == ImageFormat::Jpeg {
        return Ok(Cow::Borrowed(image));
    }
    log::debug!("transcoding {} byte image to JPEG", image.len());

    Ok(Cow::Owned(reencode_jpeg(image)?))
}

pub(crate) fn encode_jpeg(pixels: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality).write_image(
        pixels.as_raw(),
        pixels.width(),
        pixels.height(),
        ExtendedColorType::Rgb8,
    )?;

    Ok(out)
}
