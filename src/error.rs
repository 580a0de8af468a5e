use std::fmt;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = ProofError> = std::result::Result<T, E>;

/// The extraction state a metadata read was in when it stopped.
///
/// Extraction walks these states in order and never retries an earlier one,
/// so the stage attached to an error says exactly how far the reader got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractStage {
    /// Checking the start-of-image marker
    CheckingContainer,
    /// Walking JPEG segments looking for the Exif APP1 segment
    ScanningSegments,
    /// Exif segment located, reading the TIFF header
    FoundSegment,
    /// Reading directory entries
    ParsingDirectory,
    /// Looking for the user comment tag and its byte range
    LocatingTag,
    /// Turning the tag bytes into a proof JSON object
    DecodingPayload,
}

impl fmt::Display for ExtractStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExtractStage::CheckingContainer => "checking container",
            ExtractStage::ScanningSegments => "scanning segments",
            ExtractStage::FoundSegment => "found segment",
            ExtractStage::ParsingDirectory => "parsing directory",
            ExtractStage::LocatingTag => "locating tag",
            ExtractStage::DecodingPayload => "decoding payload",
        };
        write!(f, "{s}")
    }
}

/// Errors produced by the proof codec, signer and verifier.
#[derive(Debug, Error)]
pub enum ProofError {
    /// Signing keys are missing or unusable. Fatal, never retried.
    #[error("key configuration error: {0}")]
    Configuration(String),

    /// The input is not a usable image container.
    #[error("malformed input while {stage}: {detail}")]
    MalformedInput { stage: ExtractStage, detail: String },

    /// The image carries no metadata segment or no recognizable proof.
    #[error("not found while {stage}: {detail}")]
    NotFound { stage: ExtractStage, detail: String },

    /// A proof was located but it is structurally broken.
    #[error("malformed proof: {0}")]
    MalformedProof(String),

    /// Writing the metadata segment failed. Callers degrade instead of aborting.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// Failure reported by a collaborator: signer, registry, store or worker task.
    #[error(transparent)]
    Other(#[from] anyhow::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ProofError {
    pub(crate) fn malformed_input(stage: ExtractStage, detail: impl Into<String>) -> Self {
        ProofError::MalformedInput {
            stage,
            detail: detail.into(),
        }
    }

    pub(crate) fn not_found(stage: ExtractStage, detail: impl Into<String>) -> Self {
        ProofError::NotFound {
            stage,
            detail: detail.into(),
        }
    }

    /// True when the image was simply never proof-bearing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProofError::NotFound { .. })
    }

    /// True when a container or proof was present but corrupt.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            ProofError::MalformedInput { .. } | ProofError::MalformedProof(_)
        )
    }

    /// The extraction stage the error was raised in, if it came from the reader.
    pub fn stage(&self) -> Option<ExtractStage> {
        match self {
            ProofError::MalformedInput { stage, .. } | ProofError::NotFound { stage, .. } => {
                Some(*stage)
            }
            _ => None,
        }
    }
}
