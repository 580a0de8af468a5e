//! Minimal JPEG/Exif codec for carrying a proof in the user comment tag.
//!
//! The writer inserts one APP1 segment right after SOI holding a little-endian
//! TIFF structure with a single IFD entry (tag 0x9286, type UNDEFINED). The
//! reader walks segments, parses either byte order, follows the Exif sub-IFD
//! pointer when the tag is not in IFD0, and recovers the JSON through a
//! fallback decode ladder. Every length-prefixed read is bounds checked.

/// Fallback decode ladder for user comment bytes.
pub mod decode;
mod reader;
mod writer;

pub use decode::{DecodeStrategy, ExtractedProof};
pub use writer::embed;

use crate::error::{ExtractStage, ProofError, Result};

/// Start-of-image marker.
pub const SOI: [u8; 2] = [0xFF, 0xD8];
/// APP1 marker code, the segment Exif lives in.
pub const APP1: u8 = 0xE1;
/// Identifier opening an Exif APP1 body.
pub const EXIF_IDENTIFIER: &[u8; 6] = b"Exif\0\0";
/// "II" byte order mark.
pub const TIFF_LITTLE_ENDIAN: u16 = 0x4949;
/// "MM" byte order mark.
pub const TIFF_BIG_ENDIAN: u16 = 0x4D4D;
/// TIFF format version magic.
pub const TIFF_MAGIC: u16 = 42;
/// Exif UserComment tag.
pub const TAG_USER_COMMENT: u16 = 0x9286;
/// Pointer from IFD0 to the Exif sub-IFD.
pub const TAG_EXIF_IFD_POINTER: u16 = 0x8769;
/// TIFF field type for opaque bytes.
pub const TYPE_UNDEFINED: u16 = 7;

const SOS: u8 = 0xDA;
const EOI: u8 = 0xD9;
const TEM: u8 = 0x01;

/// Byte range of an Exif APP1 segment inside a JPEG buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SegmentSpan {
    /// Offset of the segment's first 0xFF
    pub start: usize,
    /// Exclusive end, clamped to the buffer
    pub end: usize,
    /// Offset of the TIFF header, just past the identifier
    pub tiff_start: usize,
}

/// Walks JPEG segments until the first Exif APP1 segment.
pub(crate) fn find_exif_segment(image: &[u8]) -> Result<SegmentSpan> {
    let stage = ExtractStage::ScanningSegments;

    if image.len() < 2 || image[..2] != SOI {
        return Err(ProofError::malformed_input(
            ExtractStage::CheckingContainer,
            "missing start-of-image marker",
        ));
    }

    let mut offset = 2;
    loop {
        if offset >= image.len() {
            return Err(ProofError::not_found(
                stage,
                "reached end of image without an Exif segment",
            ));
        }
        if image[offset] != 0xFF {
            return Err(ProofError::malformed_input(
                stage,
                format!("expected marker at offset {offset}, found 0x{:02x}", image[offset]),
            ));
        }

        // any number of 0xFF fill bytes may precede the marker code
        let mut code_pos = offset + 1;
        while code_pos < image.len() && image[code_pos] == 0xFF {
            code_pos += 1;
        }
        let Some(&code) = image.get(code_pos) else {
            return Err(ProofError::malformed_input(
                stage,
                format!("marker at offset {offset} is truncated"),
            ));
        };

        match code {
            SOS | EOI => {
                return Err(ProofError::not_found(
                    stage,
                    "no Exif segment before image data",
                ))
            }
            TEM | 0xD0..=0xD7 => {
                offset = code_pos + 1;
                continue;
            }
            0x00 | 0xD8 => {
                return Err(ProofError::malformed_input(
                    stage,
                    format!("unexpected marker 0xff{code:02x} at offset {offset}"),
                ))
            }
            _ => {}
        }

        let length_pos = code_pos + 1;
        let Some(length_bytes) = image.get(length_pos..length_pos + 2) else {
            return Err(ProofError::malformed_input(
                stage,
                format!("segment length at offset {length_pos} is truncated"),
            ));
        };
        let declared = u16::from_be_bytes([length_bytes[0], length_bytes[1]]) as usize;
        if declared < 2 {
            return Err(ProofError::malformed_input(
                stage,
                format!("segment at offset {offset} declares invalid length {declared}"),
            ));
        }

        let body_start = length_pos + 2;
        let declared_end = length_pos + declared;
        let is_exif = code == APP1
            && declared >= 2 + EXIF_IDENTIFIER.len()
            && image.get(body_start..body_start + EXIF_IDENTIFIER.len())
                == Some(EXIF_IDENTIFIER.as_slice());

        if is_exif {
            let end = declared_end.min(image.len());
            if end < declared_end {
                log::warn!(
                    "Exif segment at offset {offset} declares {} bytes past the end of the image; clamping",
                    declared_end - end
                );
            }
            log::debug!("found Exif segment at offset {offset}, {} bytes", end - offset);

            return Ok(SegmentSpan {
                start: offset,
                end,
                tiff_start: body_start + EXIF_IDENTIFIER.len(),
            });
        }

        if declared_end > image.len() {
            return Err(ProofError::malformed_input(
                stage,
                format!(
                    "segment 0xff{code:02x} at offset {offset} declares {declared} bytes but only {} remain",
                    image.len() - length_pos
                ),
            ));
        }
        log::trace!("skipping segment 0xff{code:02x} at offset {offset} ({declared} bytes)");
        offset = declared_end;
    }
}

/// Returns the raw bytes stored under the user comment tag.
///
/// # Arguments
///
/// * `image` - A JPEG byte stream.
///
/// # Returns
///
/// The tag's byte range, or a `NotFound`/`MalformedInput` error naming the
/// extraction stage that failed.
pub fn read_user_comment(image: &[u8]) -> Result<Vec<u8>> {
    let span = find_exif_segment(image)?;
    let blob = &image[span.tiff_start.min(span.end)..span.end];

    reader::user_comment(blob).map(<[u8]>::to_vec)
}

/// Extracts the proof JSON embedded in `image`.
///
/// A missing segment or tag is `NotFound`; a tag whose bytes hold no
/// recognizable proof is also `NotFound` (stage `DecodingPayload`), while a
/// corrupt TIFF structure is `MalformedInput`.
pub fn extract_proof(image: &[u8]) -> Result<ExtractedProof> {
    let comment = read_user_comment(image)?;

    decode::decode_user_comment(&comment)
}

/// Removes the Exif segment that carries the proof, giving back the image as
/// it was before embedding. Images without one are returned unchanged.
pub fn strip_proof_segment(image: &[u8]) -> Result<Vec<u8>> {
    match find_exif_segment(image) {
        Ok(span) => {
            let mut stripped = Vec::with_capacity(image.len() - (span.end - span.start));
            stripped.extend_from_slice(&image[..span.start]);
            stripped.extend_from_slice(&image[span.end..]);
            Ok(stripped)
        }
        Err(e) if e.is_not_found() => Ok(image.to_vec()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::{json, Value};

    use super::*;
    use crate::test_util::sample_jpeg;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn proof_json() -> String {
        json!({
            "proof_type": "ai_generated",
            "image_hash": "ab".repeat(32),
            "nonce": "abcd1234abcd1234abcd1234abcd1234",
            "signature": "c2ln",
            "public_key_b64": "cGs=",
            "ai_model": "test-model",
            "prompt": "a cat",
            "timestamp": "2024-01-01T00:00:00.000Z"
        })
        .to_string()
    }

    /// Splices a hand-built TIFF blob into `image` as an Exif APP1 segment.
    fn with_exif_blob(image: &[u8], blob: &[u8]) -> Vec<u8> {
        let mut out = image[..2].to_vec();
        out.extend_from_slice(&[0xFF, APP1]);
        out.extend_from_slice(&((blob.len() + 8) as u16).to_be_bytes());
        out.extend_from_slice(EXIF_IDENTIFIER);
        out.extend_from_slice(blob);
        out.extend_from_slice(&image[2..]);
        out
    }

    #[test]
    fn round_trip_recovers_identical_json() {
        init_logger();
        let jpeg = sample_jpeg(16, 16, 1);
        let json = proof_json();

        let embedded = embed(&jpeg, json.as_bytes()).unwrap();
        let extracted = extract_proof(&embedded).unwrap();

        assert_eq!(extracted.json, json);
        assert_eq!(extracted.strategy, DecodeStrategy::Direct);
        assert_eq!(
            Value::Object(extracted.fields),
            serde_json::from_str::<Value>(&json).unwrap()
        );
    }

    #[test]
    fn writer_layout_is_byte_exact() {
        let jpeg = sample_jpeg(8, 8, 2);
        let payload = br#"{"proof_type":"ai_generated"}"#;

        let embedded = embed(&jpeg, payload).unwrap();

        let blob_len = 8 + 18 + payload.len();
        let mut expected = vec![0xFF, 0xD8, 0xFF, 0xE1];
        expected.extend_from_slice(&((blob_len + 8) as u16).to_be_bytes());
        expected.extend_from_slice(b"Exif\0\0");
        expected.extend_from_slice(&[0x49, 0x49, 42, 0, 8, 0, 0, 0]);
        expected.extend_from_slice(&[1, 0]);
        expected.extend_from_slice(&[0x86, 0x92, 7, 0]);
        expected.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        expected.extend_from_slice(&26u32.to_le_bytes());
        expected.extend_from_slice(&[0, 0, 0, 0]);
        expected.extend_from_slice(payload);
        expected.extend_from_slice(&jpeg[2..]);

        assert_eq!(embedded, expected);
    }

    #[test]
    fn writer_leaves_existing_segments_untouched() {
        let jpeg = sample_jpeg(8, 8, 3);

        let embedded = embed(&jpeg, proof_json().as_bytes()).unwrap();
        let stripped = strip_proof_segment(&embedded).unwrap();

        assert_eq!(stripped, jpeg);
    }

    #[test]
    fn rejects_non_jpeg_input() {
        let err = embed(b"\x89PNG\r\n\x1a\n", b"{}").unwrap_err();
        assert!(err.is_malformed());

        let err = extract_proof(b"GIF89a").unwrap_err();
        assert_eq!(err.stage(), Some(ExtractStage::CheckingContainer));
        assert!(err.is_malformed());
    }

    #[test]
    fn plain_jpeg_has_no_proof() {
        let jpeg = sample_jpeg(8, 8, 4);

        let err = extract_proof(&jpeg).unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(err.stage(), Some(ExtractStage::ScanningSegments));
        assert_eq!(strip_proof_segment(&jpeg).unwrap(), jpeg);
    }

    #[test]
    fn short_payload_is_stored_inline() {
        let jpeg = sample_jpeg(8, 8, 5);

        let embedded = embed(&jpeg, b"{}").unwrap();

        // header + IFD only, no trailing data area
        assert_eq!(u16::from_be_bytes([embedded[4], embedded[5]]), 2 + 6 + 26);
        assert_eq!(read_user_comment(&embedded).unwrap(), b"{}");
    }

    #[test]
    fn oversized_payload_fails_to_embed() {
        let jpeg = sample_jpeg(8, 8, 6);
        let payload = vec![b'a'; 70_000];

        assert!(matches!(
            embed(&jpeg, &payload),
            Err(ProofError::Embedding(_))
        ));
    }

    #[test]
    fn finds_segment_after_other_app_segments() {
        let jpeg = sample_jpeg(8, 8, 7);
        let embedded = embed(&jpeg, proof_json().as_bytes()).unwrap();

        // move a fake APP0 segment in front of the proof segment
        let mut shifted = SOI.to_vec();
        shifted.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x07, b'J', b'F', b'I', b'F', 0]);
        shifted.extend_from_slice(&[0xFF, 0xFF]);
        shifted.extend_from_slice(&embedded[3..]);

        let extracted = extract_proof(&shifted).unwrap();
        assert_eq!(extracted.json, proof_json());
    }

    #[test]
    fn skips_standalone_markers() {
        let jpeg = sample_jpeg(8, 8, 17);
        let embedded = embed(&jpeg, proof_json().as_bytes()).unwrap();

        // RST0, RST7 and TEM carry no length field
        let mut shifted = SOI.to_vec();
        shifted.extend_from_slice(&[0xFF, 0xD0, 0xFF, 0xD7, 0xFF, TEM]);
        shifted.extend_from_slice(&embedded[2..]);

        let extracted = extract_proof(&shifted).unwrap();
        assert_eq!(extracted.json, proof_json());

        let span = find_exif_segment(&shifted).unwrap();
        assert_eq!(span.start, 8);
    }

    #[test]
    fn reads_big_endian_blob() {
        let jpeg = sample_jpeg(8, 8, 8);
        let payload = proof_json();
        let mut blob = vec![0x4D, 0x4D, 0, 42, 0, 0, 0, 8];
        blob.extend_from_slice(&[0, 1]);
        blob.extend_from_slice(&[0x92, 0x86, 0, 7]);
        blob.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        blob.extend_from_slice(&26u32.to_be_bytes());
        blob.extend_from_slice(&[0, 0, 0, 0]);
        blob.extend_from_slice(payload.as_bytes());

        let extracted = extract_proof(&with_exif_blob(&jpeg, &blob)).unwrap();

        assert_eq!(extracted.json, payload);
    }

    #[test]
    fn follows_exif_sub_ifd_pointer() {
        let jpeg = sample_jpeg(8, 8, 9);
        let payload = proof_json();
        // IFD0 at 8 holds only the pointer; Exif IFD at 26 holds the comment
        let mut blob = vec![0x49, 0x49, 42, 0, 8, 0, 0, 0];
        blob.extend_from_slice(&[1, 0]);
        blob.extend_from_slice(&[0x69, 0x87, 4, 0, 1, 0, 0, 0]);
        blob.extend_from_slice(&26u32.to_le_bytes());
        blob.extend_from_slice(&[0, 0, 0, 0]);
        blob.extend_from_slice(&[1, 0]);
        blob.extend_from_slice(&[0x86, 0x92, 7, 0]);
        blob.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        blob.extend_from_slice(&44u32.to_le_bytes());
        blob.extend_from_slice(&[0, 0, 0, 0]);
        blob.extend_from_slice(payload.as_bytes());

        let extracted = extract_proof(&with_exif_blob(&jpeg, &blob)).unwrap();

        assert_eq!(extracted.json, payload);
    }

    #[test]
    fn charset_prefix_is_skipped() {
        let jpeg = sample_jpeg(8, 8, 10);
        let mut comment = b"ASCII\0\0\0".to_vec();
        comment.extend_from_slice(proof_json().as_bytes());

        let extracted = extract_proof(&embed(&jpeg, &comment).unwrap()).unwrap();

        assert_eq!(extracted.json, proof_json());
    }

    #[test]
    fn invalid_byte_order_is_malformed() {
        let jpeg = sample_jpeg(8, 8, 11);
        let blob = [0x41, 0x41, 42, 0, 8, 0, 0, 0, 0, 0];

        let err = extract_proof(&with_exif_blob(&jpeg, &blob)).unwrap_err();

        assert!(err.is_malformed());
        assert_eq!(err.stage(), Some(ExtractStage::FoundSegment));
    }

    #[test]
    fn bad_magic_is_malformed() {
        let jpeg = sample_jpeg(8, 8, 12);
        let blob = [0x49, 0x49, 43, 0, 8, 0, 0, 0, 0, 0];

        let err = extract_proof(&with_exif_blob(&jpeg, &blob)).unwrap_err();

        assert!(err.is_malformed());
        assert_eq!(err.stage(), Some(ExtractStage::FoundSegment));
    }

    #[test]
    fn missing_tag_is_not_found() {
        let jpeg = sample_jpeg(8, 8, 13);
        // one unrelated SHORT entry (orientation)
        let mut blob = vec![0x49, 0x49, 42, 0, 8, 0, 0, 0, 1, 0];
        blob.extend_from_slice(&[0x12, 0x01, 3, 0, 1, 0, 0, 0, 1, 0, 0, 0]);
        blob.extend_from_slice(&[0, 0, 0, 0]);

        let err = extract_proof(&with_exif_blob(&jpeg, &blob)).unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(err.stage(), Some(ExtractStage::LocatingTag));
    }

    #[test]
    fn comment_without_proof_is_not_found() {
        let jpeg = sample_jpeg(8, 8, 14);

        let embedded = embed(&jpeg, b"shot on a sunny day").unwrap();
        let err = extract_proof(&embedded).unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(err.stage(), Some(ExtractStage::DecodingPayload));
    }

    #[test]
    fn truncated_exif_segment_is_clamped() {
        let jpeg = sample_jpeg(8, 8, 15);
        let mut embedded = embed(&jpeg, proof_json().as_bytes()).unwrap();
        let segment_len = u16::from_be_bytes([embedded[4], embedded[5]]) as usize;
        // cut the buffer in the middle of the JSON
        embedded.truncate(4 + segment_len - 10);

        let err = extract_proof(&embedded).unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(err.stage(), Some(ExtractStage::DecodingPayload));
    }

    #[test]
    fn truncated_foreign_segment_is_malformed() {
        let bytes = [0xFF, 0xD8, 0xFF, 0xE0, 0x01, 0x00, b'J', b'F'];

        let err = extract_proof(&bytes).unwrap_err();

        assert!(err.is_malformed());
        assert_eq!(err.stage(), Some(ExtractStage::ScanningSegments));
    }

    #[test]
    fn data_offset_past_segment_is_malformed() {
        let jpeg = sample_jpeg(8, 8, 16);
        let mut blob = vec![0x49, 0x49, 42, 0, 8, 0, 0, 0, 1, 0];
        blob.extend_from_slice(&[0x86, 0x92, 7, 0, 100, 0, 0, 0]);
        blob.extend_from_slice(&5000u32.to_le_bytes());
        blob.extend_from_slice(&[0, 0, 0, 0]);

        let err = extract_proof(&with_exif_blob(&jpeg, &blob)).unwrap_err();

        assert!(err.is_malformed());
        assert_eq!(err.stage(), Some(ExtractStage::LocatingTag));
    }

    proptest! {
        #[test]
        fn embed_extract_round_trip(
            prompt in "[ -~]{0,200}",
            model in "[a-z0-9/.-]{1,40}",
            seed in 0u32..64,
        ) {
            let jpeg = sample_jpeg(8, 8, seed);
            let json = json!({
                "proof_type": "ai_generated",
                "ai_model": model,
                "prompt": prompt,
            })
            .to_string();

            let embedded = embed(&jpeg, json.as_bytes()).unwrap();
            let extracted = extract_proof(&embedded).unwrap();

            prop_assert_eq!(
                Value::Object(extracted.fields),
                serde_json::from_str::<Value>(&json).unwrap()
            );
        }

        #[test]
        fn decoy_padding_is_tolerated(padding in proptest::collection::vec(any::<u8>(), 1..=8)) {
            let jpeg = sample_jpeg(8, 8, 0);
            let mut comment = padding.clone();
            comment.extend_from_slice(proof_json().as_bytes());

            let extracted = extract_proof(&embed(&jpeg, &comment).unwrap()).unwrap();

            prop_assert_eq!(
                Value::Object(extracted.fields),
                serde_json::from_str::<Value>(&proof_json()).unwrap()
            );
        }
    }
}
