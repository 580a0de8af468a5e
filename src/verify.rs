use base64::engine::{general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::{Signature, VerifyingKey, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
    canonical::canonical_message,
    error::{ExtractStage, ProofError},
    exif::{self, DecodeStrategy},
    image_hash::{hash_image, hashes_match, HashConvention},
    payload::{ProofPayload, ProofType},
};

/// Why a verification failed, in reporting priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    #[strum(serialize = "no proof found")]
    NoProofFound,
    #[strum(serialize = "proof malformed")]
    MalformedProof,
    #[strum(serialize = "signature invalid")]
    SignatureInvalid,
    #[strum(serialize = "content hash mismatch")]
    ContentHashMismatch,
}

/// Outcome of verifying one image. Failure is a value, never an error.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub success: bool,
    pub reason: Option<FailureReason>,
    /// Human readable explanation
    pub message: String,
    /// Hash recomputed from the image, absent when the image could not be
    /// reduced under the proof's convention
    pub recomputed_hash: Option<String>,
    /// `image_hash` claimed by the proof
    pub expected_hash: Option<String>,
    pub hash_match: bool,
    pub signature_valid: bool,
    pub proof_type: Option<ProofType>,
    /// Every field of the extracted proof
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decode_strategy: Option<DecodeStrategy>,
}

impl VerificationResult {
    fn failed(reason: FailureReason, message: impl Into<String>) -> Self {
        VerificationResult {
            success: false,
            reason: Some(reason),
            message: message.into(),
            recomputed_hash: None,
            expected_hash: None,
            hash_match: false,
            signature_valid: false,
            proof_type: None,
            proof: None,
            decode_strategy: None,
        }
    }
}

/// Checks a base64 Ed25519 signature over `message` against a base64 raw key.
///
/// Anything that does not decode to a 64-byte signature and a valid 32-byte
/// key counts as an invalid signature.
pub fn verify_signature(message: &[u8], signature_b64: &str, public_key_b64: &str) -> bool {
    let Ok(signature) = BASE64.decode(signature_b64) else {
        log::debug!("signature is not base64");
        return false;
    };
    let Ok(signature) = <[u8; SIGNATURE_LENGTH]>::try_from(signature.as_slice()) else {
        log::debug!("signature is {} bytes", signature.len());
        return false;
    };
    let Ok(public_key) = BASE64.decode(public_key_b64) else {
        log::debug!("public key is not base64");
        return false;
    };
    let Ok(public_key) = <[u8; PUBLIC_KEY_LENGTH]>::try_from(public_key.as_slice()) else {
        log::debug!("public key is {} bytes", public_key.len());
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&public_key) else {
        log::debug!("public key is not a valid curve point");
        return false;
    };

    verifying_key
        .verify_strict(message, &Signature::from_bytes(&signature))
        .is_ok()
}

/// Extracts, re-hashes and signature-checks the proof carried by an image.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProofVerifier;

impl ProofVerifier {
    pub fn new() -> Self {
        ProofVerifier
    }

    /// Verifies the proof embedded in `image`.
    ///
    /// The hash check and the signature check both run once a proof parses.
    /// An invalid signature is reported ahead of a hash mismatch.
    ///
    /// # Arguments
    ///
    /// * `image` - JPEG bytes, as received.
    ///
    /// # Returns
    ///
    /// A `VerificationResult`; `success` requires a matching hash and a
    /// valid signature.
    pub fn verify(&self, image: &[u8]) -> VerificationResult {
        let extracted = match exif::extract_proof(image) {
            Ok(extracted) => extracted,
            Err(e) => return Self::extraction_failure(e),
        };
        log::debug!("proof extracted with {} strategy", extracted.strategy);

        let payload = match ProofPayload::from_map(&extracted.fields) {
            Ok(payload) => payload,
            Err(e) => {
                let mut result = VerificationResult::failed(
                    FailureReason::MalformedProof,
                    format!("proof malformed: {e}"),
                );
                result.proof = Some(extracted.fields);
                result.decode_strategy = Some(extracted.strategy);
                return result;
            }
        };

        let proof_type = payload.proof_type();
        let expected_hash = payload.image_hash().to_owned();
        let recomputed_hash = Self::recompute_hash(proof_type.hash_convention(), image);
        let hash_match = recomputed_hash
            .as_deref()
            .is_some_and(|recomputed| hashes_match(recomputed, &expected_hash));

        // unknown extra fields stay in the signed message
        let signature_valid = match canonical_message(&extracted.fields) {
            Ok(message) => {
                verify_signature(&message, payload.signature(), payload.public_key_b64())
            }
            Err(e) => {
                log::warn!("could not canonicalize proof: {e}");
                false
            }
        };

        let (reason, message) = if !signature_valid {
            (
                Some(FailureReason::SignatureInvalid),
                format!(
                    "signature invalid for {proof_type} proof from {}",
                    payload.producer()
                ),
            )
        } else if !hash_match {
            (
                Some(FailureReason::ContentHashMismatch),
                format!(
                    "content hash mismatch: proof claims {expected_hash}, image hashes to {}",
                    recomputed_hash.as_deref().unwrap_or("nothing (image undecodable)")
                ),
            )
        } else {
            (
                None,
                format!("verified {proof_type} proof from {}", payload.producer()),
            )
        };
        log::debug!("{message}");

        VerificationResult {
            success: reason.is_none(),
            reason,
            message,
            recomputed_hash,
            expected_hash: Some(expected_hash),
            hash_match,
            signature_valid,
            proof_type: Some(proof_type),
            proof: Some(extracted.fields),
            decode_strategy: Some(extracted.strategy),
        }
    }

    fn extraction_failure(e: ProofError) -> VerificationResult {
        let no_proof = e.is_not_found()
            || matches!(
                e,
                ProofError::MalformedInput {
                    stage: ExtractStage::CheckingContainer,
                    ..
                }
            );

        if no_proof {
            log::debug!("no proof present: {e}");
            VerificationResult::failed(FailureReason::NoProofFound, format!("no proof found: {e}"))
        } else {
            log::warn!("proof segment present but unreadable: {e}");
            VerificationResult::failed(
                FailureReason::MalformedProof,
                format!("proof malformed: {e}"),
            )
        }
    }

    fn recompute_hash(convention: HashConvention, image: &[u8]) -> Option<String> {
        let hashed = match convention {
            HashConvention::ContainerBytes => exif::strip_proof_segment(image)
                .and_then(|original| hash_image(convention, &original)),
            HashConvention::ReencodedJpeg => hash_image(convention, image),
        };

        hashed
            .map_err(|e| log::warn!("could not hash image under {convention}: {e}"))
            .ok()
    }
}
