use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    payload::ProofPayload,
    verify::VerificationResult,
};

/// Details of the uploaded file a proof package describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub content_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PackageMetadata {
    pub upload_timestamp: String,
    pub original_file_name: String,
    pub file_size: u64,
    pub file_type: String,
    /// "verified" or "failed"
    pub verification_status: String,
    pub verification_message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub device_id: String,
    pub firmware: String,
    pub signature_algorithm: String,
    pub public_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorInfo {
    pub ai_model: String,
    pub prompt: String,
    pub public_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaptureDetails {
    pub timestamp: String,
    pub nonce: String,
    pub image_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CryptographicProof {
    pub signature: String,
    #[serde(rename = "publicKeyB64")]
    pub public_key_b64: String,
    pub image_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationDetails {
    pub verified_at: String,
    pub success: bool,
    pub message: String,
}

/// Self-describing archive record of a verified (or rejected) upload.
///
/// Exactly one of `device_info` and `generator_info` is set, matching the
/// proof variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProofPackage {
    pub id: Uuid,
    pub metadata: PackageMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_info: Option<DeviceInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator_info: Option<GeneratorInfo>,
    pub capture_details: CaptureDetails,
    pub cryptographic_proof: CryptographicProof,
    pub verification_details: VerificationDetails,
}

impl ProofPackage {
    /// Assembles a package from an upload, its proof and the verdict on it.
    pub fn new(file: FileInfo, proof: &ProofPayload, result: &VerificationResult) -> Self {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

        let (device_info, generator_info) = match proof {
            ProofPayload::HardwareCapture(p) => (
                Some(DeviceInfo {
                    device_id: p.device_id.clone(),
                    firmware: p.firmware.clone(),
                    signature_algorithm: p.sig_alg.clone(),
                    public_key: p.public_key_b64.clone(),
                }),
                None,
            ),
            ProofPayload::AiGenerated(p) => (
                None,
                Some(GeneratorInfo {
                    ai_model: p.ai_model.clone(),
                    prompt: p.prompt.clone(),
                    public_key: p.public_key_b64.clone(),
                }),
            ),
        };

        ProofPackage {
            id: Uuid::new_v4(),
            metadata: PackageMetadata {
                upload_timestamp: now.clone(),
                original_file_name: file.name,
                file_size: file.size,
                file_type: file.content_type,
                verification_status: if result.success { "verified" } else { "failed" }
                    .to_owned(),
                verification_message: result.message.clone(),
            },
            device_info,
            generator_info,
            capture_details: CaptureDetails {
                timestamp: proof.timestamp().to_owned(),
                nonce: proof.nonce().to_owned(),
                image_hash: proof.image_hash().to_owned(),
            },
            cryptographic_proof: CryptographicProof {
                signature: proof.signature().to_owned(),
                public_key_b64: proof.public_key_b64().to_owned(),
                image_hash: proof.image_hash().to_owned(),
            },
            verification_details: VerificationDetails {
                verified_at: now,
                success: result.success,
                message: result.message.clone(),
            },
        }
    }

    /// Pretty-printed JSON, the form packages are archived in.
    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }
}
