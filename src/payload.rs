use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    error::{ProofError, Result},
    image_hash::HashConvention,
};

/// Name of the discriminator field; also the marker the reader looks for.
pub const PROOF_TYPE_FIELD: &str = "proof_type";

/// Signature algorithm recorded in hardware proofs.
pub const SIG_ALG_ED25519: &str = "Ed25519";

/// Discriminator selecting which proof variant's required fields apply.
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
    strum::VariantNames,
)]
pub enum ProofType {
    /// Image produced by a generative model
    #[serde(rename = "ai_generated")]
    #[strum(serialize = "ai_generated")]
    AiGenerated,
    /// Image captured by a hardware device
    #[serde(rename = "hardware_capture")]
    #[strum(serialize = "hardware_capture")]
    HardwareCapture,
}

impl ProofType {
    /// Fields that must be present and non-empty for this variant.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            ProofType::AiGenerated => &[
                "proof_type",
                "timestamp",
                "nonce",
                "image_hash",
                "public_key_b64",
                "signature",
                "ai_model",
                "prompt",
            ],
            ProofType::HardwareCapture => &[
                "proof_type",
                "timestamp",
                "nonce",
                "image_hash",
                "public_key_b64",
                "signature",
                "device_id",
                "firmware",
                "sig_alg",
            ],
        }
    }

    /// The single hashing convention proofs of this type are bound with.
    pub fn hash_convention(&self) -> HashConvention {
        match self {
            ProofType::AiGenerated => HashConvention::ContainerBytes,
            ProofType::HardwareCapture => HashConvention::ReencodedJpeg,
        }
    }
}

/// Proof issued for a model-generated image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AiGeneratedProof {
    pub prompt: String,
    pub ai_model: String,
    pub timestamp: String,
    pub image_hash: String,
    pub nonce: String,
    pub public_key_b64: String,
    #[serde(default)]
    pub signature: String,
}

/// Proof issued by a capture device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HardwareCaptureProof {
    pub device_id: String,
    pub firmware: String,
    pub sig_alg: String,
    pub timestamp: String,
    pub image_hash: String,
    pub nonce: String,
    pub public_key_b64: String,
    #[serde(default)]
    pub signature: String,
}

/// The signed record binding a producer identity to image content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "proof_type")]
pub enum ProofPayload {
    #[serde(rename = "ai_generated")]
    AiGenerated(AiGeneratedProof),
    #[serde(rename = "hardware_capture")]
    HardwareCapture(HardwareCaptureProof),
}

macro_rules! common_field {
    ($self:ident, $field:ident) => {
        match $self {
            ProofPayload::AiGenerated(p) => &p.$field,
            ProofPayload::HardwareCapture(p) => &p.$field,
        }
    };
}

impl ProofPayload {
    pub fn proof_type(&self) -> ProofType {
        match self {
            ProofPayload::AiGenerated(_) => ProofType::AiGenerated,
            ProofPayload::HardwareCapture(_) => ProofType::HardwareCapture,
        }
    }

    pub fn image_hash(&self) -> &str {
        common_field!(self, image_hash)
    }

    pub fn timestamp(&self) -> &str {
        common_field!(self, timestamp)
    }

    pub fn nonce(&self) -> &str {
        common_field!(self, nonce)
    }

    pub fn public_key_b64(&self) -> &str {
        common_field!(self, public_key_b64)
    }

    pub fn signature(&self) -> &str {
        common_field!(self, signature)
    }

    /// Producer identity: the device id or the model name.
    pub fn producer(&self) -> &str {
        match self {
            ProofPayload::AiGenerated(p) => &p.ai_model,
            ProofPayload::HardwareCapture(p) => &p.device_id,
        }
    }

    pub(crate) fn set_signature(&mut self, signature: String) {
        match self {
            ProofPayload::AiGenerated(p) => p.signature = signature,
            ProofPayload::HardwareCapture(p) => p.signature = signature,
        }
    }

    /// The payload as a flat JSON object, discriminator included.
    pub fn to_map(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(ProofError::MalformedProof(format!(
                "payload serialized to non-object {other}"
            ))),
        }
    }

    /// Wire form embedded in the image.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Validates a raw JSON object against the variant its discriminator names.
    ///
    /// Every required field must be a non-empty string. Extra fields are
    /// tolerated here; they still take part in the signed message.
    pub fn from_map(fields: &Map<String, Value>) -> Result<Self> {
        let proof_type = match fields.get(PROOF_TYPE_FIELD) {
            Some(Value::String(s)) => s.parse::<ProofType>().map_err(|_| {
                ProofError::MalformedProof(format!("unknown proof_type '{s}'"))
            })?,
            Some(_) => {
                return Err(ProofError::MalformedProof(
                    "proof_type is not a string".to_owned(),
                ))
            }
            None => {
                return Err(ProofError::MalformedProof(
                    "missing proof_type discriminator".to_owned(),
                ))
            }
        };

        let missing = proof_type
            .required_fields()
            .iter()
            .filter(|name| !matches!(fields.get(**name), Some(Value::String(s)) if !s.is_empty()))
            .copied()
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(ProofError::MalformedProof(format!(
                "{proof_type} proof is missing required fields: {}",
                missing.join(", ")
            )));
        }

        let payload = serde_json::from_value(Value::Object(fields.clone()))
            .map_err(|e| ProofError::MalformedProof(e.to_string()))?;

        Ok(payload)
    }
}

/// Identity fields supplied by the producer when a proof is created.
#[derive(Debug, Clone, PartialEq)]
pub enum ProducerIdentity {
    /// A generative pipeline: model name and the prompt it was given.
    Ai { ai_model: String, prompt: String },
    /// A capture device: its id and firmware version.
    Hardware { device_id: String, firmware: String },
}

impl ProducerIdentity {
    pub fn ai(ai_model: impl Into<String>, prompt: impl Into<String>) -> Self {
        ProducerIdentity::Ai {
            ai_model: ai_model.into(),
            prompt: prompt.into(),
        }
    }

    pub fn hardware(device_id: impl Into<String>, firmware: impl Into<String>) -> Self {
        ProducerIdentity::Hardware {
            device_id: device_id.into(),
            firmware: firmware.into(),
        }
    }

    pub fn proof_type(&self) -> ProofType {
        match self {
            ProducerIdentity::Ai { .. } => ProofType::AiGenerated,
            ProducerIdentity::Hardware { .. } => ProofType::HardwareCapture,
        }
    }

    /// Assembles an unsigned payload for this identity.
    pub(crate) fn into_unsigned(
        self,
        timestamp: String,
        nonce: String,
        image_hash: String,
        public_key_b64: String,
    ) -> ProofPayload {
        match self {
            ProducerIdentity::Ai { ai_model, prompt } => {
                ProofPayload::AiGenerated(AiGeneratedProof {
                    prompt,
                    ai_model,
                    timestamp,
                    image_hash,
                    nonce,
                    public_key_b64,
                    signature: String::new(),
                })
            }
            ProducerIdentity::Hardware {
                device_id,
                firmware,
            } => ProofPayload::HardwareCapture(HardwareCaptureProof {
                device_id,
                firmware,
                sig_alg: SIG_ALG_ED25519.to_owned(),
                timestamp,
                image_hash,
                nonce,
                public_key_b64,
                signature: String::new(),
            }),
        }
    }
}
