use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
    error::{ExtractStage, ProofError, Result},
    payload::PROOF_TYPE_FIELD,
};

/// Length of the character-code prefix Exif writers put before a comment.
pub const CHARSET_PREFIX_LEN: usize = 8;

/// Only a `{` within this many leading bytes may open the proof object.
/// Bounds the brace scan to linear time on hostile comments.
pub const BRACE_SCAN_WINDOW: usize = 64;

/// Which rung of the ladder recovered the proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DecodeStrategy {
    /// The tag bytes were the JSON object as-is
    Direct,
    /// The JSON followed an 8 byte character-code prefix
    SkipCharsetPrefix,
    /// The JSON was found by a balanced-brace scan
    BraceScan,
}

/// A proof object recovered from image metadata.
#[derive(Debug, Clone)]
pub struct ExtractedProof {
    /// The exact JSON text that decoded
    pub json: String,
    /// The decoded object with every field it carried
    pub fields: Map<String, Value>,
    pub strategy: DecodeStrategy,
}

/// Accepts `bytes` only if they are a JSON object carrying the proof marker.
///
/// Invalid UTF-8 is replaced and NUL padding removed before parsing.
fn parse_proof(bytes: &[u8]) -> Option<(String, Map<String, Value>)> {
    let text = String::from_utf8_lossy(bytes).replace('\0', "");
    let text = text.trim();
    if !text.contains(PROOF_TYPE_FIELD) {
        return None;
    }

    match serde_json::from_str::<Value>(text).ok()? {
        Value::Object(fields) if fields.contains_key(PROOF_TYPE_FIELD) => {
            Some((text.to_owned(), fields))
        }
        _ => None,
    }
}

/// End (exclusive) of the object opening at `bytes[start]`, if it closes.
/// Braces inside JSON strings are ignored.
fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }

    None
}

/// Turns user comment bytes into a proof object.
///
/// Tries, in order: the bytes as-is, the bytes after an 8 byte character-code
/// prefix, then a balanced-brace scan from each `{` in the first
/// [`BRACE_SCAN_WINDOW`] bytes. The first candidate that parses to an object
/// with a `proof_type` field wins.
pub fn decode_user_comment(bytes: &[u8]) -> Result<ExtractedProof> {
    let found = |(json, fields): (String, Map<String, Value>), strategy| ExtractedProof {
        json,
        fields,
        strategy,
    };

    if let Some(parsed) = parse_proof(bytes) {
        return Ok(found(parsed, DecodeStrategy::Direct));
    }

    if bytes.len() > CHARSET_PREFIX_LEN {
        if let Some(parsed) = parse_proof(&bytes[CHARSET_PREFIX_LEN..]) {
            log::debug!("proof decoded after skipping character-code prefix");
            return Ok(found(parsed, DecodeStrategy::SkipCharsetPrefix));
        }
    }

    let window = &bytes[..bytes.len().min(BRACE_SCAN_WINDOW)];
    for start in window
        .iter()
        .enumerate()
        .filter_map(|(i, b)| (*b == b'{').then_some(i))
    {
        let Some(end) = balanced_end(bytes, start) else {
            continue;
        };
        if let Some(parsed) = parse_proof(&bytes[start..end]) {
            log::debug!("proof decoded by brace scan at byte {start}");
            return Ok(found(parsed, DecodeStrategy::BraceScan));
        }
    }

    Err(ProofError::not_found(
        ExtractStage::DecodingPayload,
        "no valid proof found in user comment",
    ))
}
