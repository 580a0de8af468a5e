use std::sync::Arc;

use base64::engine::{general_purpose::STANDARD as BASE64, Engine};
use chrono::{SecondsFormat, Utc};
use rand_core::{OsRng, RngCore};

use crate::{
    canonical::canonical_message,
    config::KeyConfig,
    error::Result,
    image_hash::hash_image_blocking,
    payload::{ProducerIdentity, ProofPayload},
    signer::{Ed25519Signer, Signer},
};

/// Number of random bytes in a proof nonce.
pub const NONCE_LENGTH: usize = 16;

/// Current UTC time as ISO-8601 with millisecond precision and a `Z` suffix.
pub fn proof_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Hex-encoded nonce drawn from the operating system RNG.
pub fn generate_nonce() -> String {
    let mut nonce = [0u8; NONCE_LENGTH];
    OsRng.fill_bytes(&mut nonce);
    hex::encode(nonce)
}

/// Builds and signs proof payloads.
///
/// Construction decodes and checks the key material, so a signer that exists
/// can always sign; there is no unsigned fallback.
#[derive(Clone)]
pub struct ProofSigner {
    signer: Arc<dyn Signer + Send + Sync>,
    public_key_b64: String,
}

impl std::fmt::Debug for ProofSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProofSigner")
            .field("public_key_b64", &self.public_key_b64)
            .finish_non_exhaustive()
    }
}

impl ProofSigner {
    /// Creates a signer backed by an in-process Ed25519 key.
    ///
    /// # Arguments
    ///
    /// * `config` - Key material to sign with.
    ///
    /// # Returns
    ///
    /// The signer, or `ProofError::Configuration` if the keys are missing,
    /// undecodable or do not belong together.
    pub fn new(config: &KeyConfig) -> Result<Self> {
        let signing_key = config.signing_key()?;
        let public_key_b64 = BASE64.encode(signing_key.verifying_key().to_bytes());
        log::debug!("proof signer ready with public key {public_key_b64}");

        Ok(ProofSigner {
            signer: Arc::new(Ed25519Signer::from_signing_key(signing_key)),
            public_key_b64,
        })
    }

    /// Creates a proof signer around any [`Signer`], e.g. a remote one.
    pub async fn with_signer(signer: Arc<dyn Signer + Send + Sync>) -> Result<Self> {
        let public_key_b64 = BASE64.encode(signer.public_key().await?);

        Ok(ProofSigner {
            signer,
            public_key_b64,
        })
    }

    /// Base64 of the raw public key stamped into every proof.
    pub fn public_key_b64(&self) -> &str {
        &self.public_key_b64
    }

    /// Hashes `image`, stamps time and nonce, and signs the resulting payload.
    ///
    /// The image is hashed under the convention bound to the identity's proof
    /// type. For AI proofs `image` must already be the JPEG that will carry
    /// the proof.
    pub async fn create_proof(
        &self,
        identity: ProducerIdentity,
        image: &[u8],
    ) -> Result<ProofPayload> {
        let convention = identity.proof_type().hash_convention();
        let image_hash = hash_image_blocking(convention, image.to_vec()).await?;

        self.sign_fields(identity, image_hash, proof_timestamp(), generate_nonce())
            .await
    }

    /// Assembles and signs a payload from already computed fields.
    pub async fn sign_fields(
        &self,
        identity: ProducerIdentity,
        image_hash: String,
        timestamp: String,
        nonce: String,
    ) -> Result<ProofPayload> {
        let mut payload =
            identity.into_unsigned(timestamp, nonce, image_hash, self.public_key_b64.clone());

        let message = canonical_message(&payload.to_map()?)?;
        let signature = self.signer.sign(&message).await?;
        payload.set_signature(BASE64.encode(signature));

        log::debug!(
            "signed {} proof for {} over {} canonical bytes",
            payload.proof_type(),
            payload.producer(),
            message.len()
        );

        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use async_trait::async_trait;

    use super::*;
    use crate::{
        error::ProofError,
        image_hash::{hash_image, HashConvention},
        payload::ProofType,
        test_util::{sample_jpeg, TEST_SECRET_KEY_HEX},
        verify::verify_signature,
    };

    fn test_config() -> KeyConfig {
        KeyConfig::new(
            BASE64.encode(hex::decode(TEST_SECRET_KEY_HEX).unwrap()),
            None,
        )
    }

    #[test]
    fn timestamp_format() {
        let ts = proof_timestamp();

        assert_eq!(ts.len(), "2024-01-01T00:00:00.000Z".len());
        assert!(ts.ends_with('Z'));
    }

    #[test]
    fn nonce_is_fresh() {
        let a = generate_nonce();

        assert_eq!(a.len(), NONCE_LENGTH * 2);
        assert_ne!(a, generate_nonce());
    }

    #[test]
    fn missing_key_fails_at_construction() {
        let err = ProofSigner::new(&KeyConfig::new("", None)).unwrap_err();

        assert!(matches!(err, ProofError::Configuration(_)));
    }

    #[tokio::test]
    async fn ai_proof_is_signed_over_container_bytes() {
        let _ = env_logger::builder().is_test(true).try_init();
        let signer = ProofSigner::new(&test_config()).unwrap();
        let jpeg = sample_jpeg(16, 16, 1);

        let proof = signer
            .create_proof(ProducerIdentity::ai("test-model", "a cat"), &jpeg)
            .await
            .unwrap();

        assert_eq!(proof.proof_type(), ProofType::AiGenerated);
        assert_eq!(
            proof.image_hash(),
            hash_image(HashConvention::ContainerBytes, &jpeg).unwrap()
        );
        assert_eq!(proof.public_key_b64(), signer.public_key_b64());

        let map = proof.to_map().unwrap();
        let message = canonical_message(&map).unwrap();
        assert!(verify_signature(
            &message,
            proof.signature(),
            proof.public_key_b64()
        ));
    }

    #[tokio::test]
    async fn hardware_proof_is_signed_over_reencoded_pixels() {
        let signer = ProofSigner::new(&test_config()).unwrap();
        let jpeg = sample_jpeg(16, 16, 2);

        let proof = signer
            .create_proof(ProducerIdentity::hardware("pi-serial-01", "cam-v1.0"), &jpeg)
            .await
            .unwrap();

        assert_eq!(proof.proof_type(), ProofType::HardwareCapture);
        assert_eq!(
            proof.image_hash(),
            hash_image(HashConvention::ReencodedJpeg, &jpeg).unwrap()
        );
    }

    #[tokio::test]
    async fn fixed_fields_sign_deterministically() {
        let signer = ProofSigner::new(&test_config()).unwrap();
        let mut signed = Vec::new();
        for _ in 0..2 {
            let proof = signer
                .sign_fields(
                    ProducerIdentity::ai("test-model", "a cat"),
                    "ab".repeat(32),
                    "2024-01-01T00:00:00.000Z".to_owned(),
                    "abcd1234".repeat(4),
                )
                .await
                .unwrap();
            signed.push(proof);
        }
        let (first, second) = (&signed[0], &signed[1]);

        assert_eq!(first, second);
    }

    struct BrokenSigner;

    #[async_trait]
    impl Signer for BrokenSigner {
        async fn sign(&self, _data: &[u8]) -> anyhow::Result<[u8; 64]> {
            Err(anyhow!("HSM unavailable"))
        }

        async fn public_key(&self) -> anyhow::Result<[u8; 32]> {
            Ok([9u8; 32])
        }
    }

    #[tokio::test]
    async fn signing_failure_surfaces() {
        let signer = ProofSigner::with_signer(Arc::new(BrokenSigner)).await.unwrap();

        let result = signer
            .create_proof(ProducerIdentity::ai("m", "p"), &sample_jpeg(8, 8, 0))
            .await;

        assert!(result.unwrap_err().to_string().contains("HSM unavailable"));
    }
}
