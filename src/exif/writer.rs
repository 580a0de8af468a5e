use crate::error::{ExtractStage, ProofError, Result};

use super::{
    APP1, EXIF_IDENTIFIER, SOI, TAG_USER_COMMENT, TIFF_LITTLE_ENDIAN, TIFF_MAGIC, TYPE_UNDEFINED,
};

const IFD0_OFFSET: u32 = 8;
// header (8) + entry count (2) + one entry (12) + next-IFD offset (4)
const DATA_OFFSET: u32 = 26;
const MAX_SEGMENT_LENGTH: usize = u16::MAX as usize;

/// Builds the little-endian TIFF structure holding `payload` as UserComment.
fn tiff_blob(payload: &[u8]) -> Result<Vec<u8>> {
    let count = u32::try_from(payload.len())
        .map_err(|_| ProofError::Embedding(format!("payload of {} bytes", payload.len())))?;
    let inline = payload.len() <= 4;

    let mut blob = Vec::with_capacity(DATA_OFFSET as usize + payload.len());
    blob.extend_from_slice(&TIFF_LITTLE_ENDIAN.to_le_bytes());
    blob.extend_from_slice(&TIFF_MAGIC.to_le_bytes());
    blob.extend_from_slice(&IFD0_OFFSET.to_le_bytes());

    blob.extend_from_slice(&1u16.to_le_bytes());
    blob.extend_from_slice(&TAG_USER_COMMENT.to_le_bytes());
    blob.extend_from_slice(&TYPE_UNDEFINED.to_le_bytes());
    blob.extend_from_slice(&count.to_le_bytes());
    if inline {
        let mut value = [0u8; 4];
        value[..payload.len()].copy_from_slice(payload);
        blob.extend_from_slice(&value);
    } else {
        blob.extend_from_slice(&DATA_OFFSET.to_le_bytes());
    }
    blob.extend_from_slice(&0u32.to_le_bytes());

    if !inline {
        blob.extend_from_slice(payload);
    }

    Ok(blob)
}

/// Inserts an Exif APP1 segment carrying `payload` directly after SOI.
///
/// Every byte after SOI is preserved in order, so removing the inserted
/// segment gives back the original image exactly.
///
/// # Arguments
///
/// * `image` - A JPEG byte stream.
/// * `payload` - Bytes stored under the user comment tag, usually proof JSON.
///
/// # Returns
///
/// The new JPEG bytes, or `Embedding` when the payload does not fit in one
/// segment.
pub fn embed(image: &[u8], payload: &[u8]) -> Result<Vec<u8>> {
    if image.len() < 2 || image[..2] != SOI {
        return Err(ProofError::malformed_input(
            ExtractStage::CheckingContainer,
            "cannot embed into an image that is not a JPEG",
        ));
    }

    let blob = tiff_blob(payload)?;
    let segment_length = 2 + EXIF_IDENTIFIER.len() + blob.len();
    if segment_length > MAX_SEGMENT_LENGTH {
        return Err(ProofError::Embedding(format!(
            "APP1 segment would be {segment_length} bytes, limit is {MAX_SEGMENT_LENGTH}"
        )));
    }

    let mut out = Vec::with_capacity(image.len() + 2 + segment_length);
    out.extend_from_slice(&SOI);
    out.extend_from_slice(&[0xFF, APP1]);
    out.extend_from_slice(&(segment_length as u16).to_be_bytes());
    out.extend_from_slice(EXIF_IDENTIFIER);
    out.extend_from_slice(&blob);
    out.extend_from_slice(&image[2..]);

    log::debug!(
        "embedded {} byte payload in {segment_length} byte APP1 segment",
        payload.len()
    );

    Ok(out)
}
