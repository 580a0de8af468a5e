//! Operations exposed to the HTTP layer, UI and storage glue.

use std::sync::Arc;

use anyhow::anyhow;
use serde::Serialize;

use crate::{
    blob_store::{FileInfo, ProofPackage, ProofStore},
    config::KeyConfig,
    error::{ProofError, Result},
    exif,
    image_hash::normalize_to_jpeg,
    ownership::{check_hardware_ownership, DeviceOwnership, OwnershipRegistry},
    payload::{ProducerIdentity, ProofPayload, ProofType},
    proof::ProofSigner,
    verify::{ProofVerifier, VerificationResult},
};

/// An image together with the proof issued for it.
#[derive(Debug, Clone)]
pub struct EmbeddedProof {
    /// The image carrying the proof, or the unembedded image when
    /// `embedded` is false. Either way its content hashes to
    /// `proof.image_hash()`.
    pub image: Vec<u8>,
    pub proof: ProofPayload,
    /// False when writing the metadata segment failed
    pub embedded: bool,
    /// Why embedding was skipped
    pub embed_error: Option<String>,
}

/// Verification verdict plus the device ownership check for hardware proofs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipVerification {
    pub verification: VerificationResult,
    /// Present only for hardware proofs, when a registry is configured
    pub ownership: Option<DeviceOwnership>,
}

/// Proof issuance and verification with optional registry and archive.
#[derive(Clone, Default)]
pub struct ProofService {
    signer: Option<ProofSigner>,
    verifier: ProofVerifier,
    registry: Option<Arc<dyn OwnershipRegistry + Send + Sync>>,
    store: Option<Arc<dyn ProofStore + Send + Sync>>,
}

impl ProofService {
    /// A service that can verify but not issue proofs.
    pub fn new() -> Self {
        Self::default()
    }

    /// A service that signs with the given keys; bad keys fail here.
    pub fn with_keys(config: &KeyConfig) -> Result<Self> {
        Ok(Self::new().with_signer(ProofSigner::new(config)?))
    }

    /// Builds the service from `PROOF_PRIVATE_KEY` / `PROOF_PUBLIC_KEY`.
    ///
    /// Without a private key the service is verify-only and
    /// [`create_and_embed_proof`](Self::create_and_embed_proof) returns a
    /// configuration error. A key that is set but unusable fails immediately.
    pub fn from_env() -> Result<Self> {
        match KeyConfig::from_env() {
            Ok(config) => Self::with_keys(&config),
            Err(e) => {
                log::warn!("proof issuance disabled: {e}");
                Ok(Self::new())
            }
        }
    }

    pub fn with_signer(mut self, signer: ProofSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_registry(mut self, registry: Arc<dyn OwnershipRegistry + Send + Sync>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ProofStore + Send + Sync>) -> Self {
        self.store = Some(store);
        self
    }

    /// Issues a proof for `image` and embeds it.
    ///
    /// AI output is first normalized to JPEG, so the proof binds the bytes
    /// that are actually returned. If normalizing or embedding fails the
    /// proof is still returned, together with the unembedded image and
    /// `embedded: false`.
    ///
    /// # Arguments
    ///
    /// * `identity` - Producer identity fields; they select the proof type.
    /// * `image` - The produced image bytes.
    ///
    /// # Returns
    ///
    /// The image and proof, or `ProofError::Configuration` when no signing
    /// keys are configured. Signing failures are never degraded.
    pub async fn create_and_embed_proof(
        &self,
        identity: ProducerIdentity,
        image: &[u8],
    ) -> Result<EmbeddedProof> {
        let signer = self.signer.as_ref().ok_or_else(|| {
            ProofError::Configuration("no signing keys configured".to_owned())
        })?;

        let (carrier, normalize_error) = match identity.proof_type() {
            ProofType::AiGenerated => match normalize_to_jpeg(image) {
                Ok(jpeg) => (jpeg.into_owned(), None),
                Err(e) => {
                    log::warn!("could not normalize generated image to JPEG: {e}");
                    (image.to_vec(), Some(e.to_string()))
                }
            },
            ProofType::HardwareCapture => (image.to_vec(), None),
        };

        let proof = signer.create_proof(identity, &carrier).await?;

        if let Some(reason) = normalize_error {
            return Ok(Self::unembedded(carrier, proof, reason));
        }

        let embedded = proof
            .to_json_string()
            .and_then(|json| exif::embed(&carrier, json.as_bytes()));
        match embedded {
            Ok(image) => Ok(EmbeddedProof {
                image,
                proof,
                embedded: true,
                embed_error: None,
            }),
            Err(e) => {
                log::warn!("returning proof without embedding it: {e}");
                Ok(Self::unembedded(carrier, proof, e.to_string()))
            }
        }
    }

    fn unembedded(image: Vec<u8>, proof: ProofPayload, reason: String) -> EmbeddedProof {
        EmbeddedProof {
            image,
            proof,
            embedded: false,
            embed_error: Some(reason),
        }
    }

    /// Verifies the proof carried by `image` on the blocking pool.
    pub async fn verify_proof(&self, image: Vec<u8>) -> Result<VerificationResult> {
        let verifier = self.verifier;
        let result = tokio::task::spawn_blocking(move || verifier.verify(&image))
            .await
            .map_err(|e| anyhow!("verification task failed: {e}"))?;

        Ok(result)
    }

    /// Verifies `image` and, for hardware proofs, asks the registry whether
    /// the device is claimed.
    pub async fn verify_with_ownership(&self, image: Vec<u8>) -> Result<OwnershipVerification> {
        let verification = self.verify_proof(image).await?;

        let device_id = match verification.proof_type {
            Some(ProofType::HardwareCapture) => verification
                .proof
                .as_ref()
                .and_then(|fields| fields.get("device_id"))
                .and_then(|id| id.as_str()),
            _ => None,
        };
        let ownership = match (device_id, &self.registry) {
            (Some(device_id), Some(registry)) => {
                Some(check_hardware_ownership(registry.as_ref(), device_id).await?)
            }
            (Some(_), None) => {
                log::debug!("no ownership registry configured");
                None
            }
            _ => None,
        };

        Ok(OwnershipVerification {
            verification,
            ownership,
        })
    }

    /// Archives a proof package describing `file`, its proof and verdict.
    ///
    /// # Returns
    ///
    /// The SHA-256 digest the package is stored under.
    pub async fn archive_proof(
        &self,
        file: FileInfo,
        proof: &ProofPayload,
        result: &VerificationResult,
    ) -> Result<String> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| anyhow!("no proof store configured"))?;

        let package = ProofPackage::new(file, proof, result);
        let digest = store.put(package.to_json_bytes()?, None).await?;
        log::debug!("archived proof package {} as {digest}", package.id);

        Ok(digest)
    }
}
