use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use base64::engine::{general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::{
    pkcs8::{DecodePrivateKey, DecodePublicKey},
    SigningKey, VerifyingKey, PUBLIC_KEY_LENGTH, SECRET_KEY_LENGTH,
};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};

use crate::error::{ProofError, Result};

/// Environment variable holding the base64 private key.
pub const PRIVATE_KEY_ENV: &str = "PROOF_PRIVATE_KEY";
/// Environment variable holding the optional base64 public key.
pub const PUBLIC_KEY_ENV: &str = "PROOF_PUBLIC_KEY";

/// Signing key material handed to [`ProofSigner`](crate::proof::ProofSigner).
///
/// The private key is base64 of either a raw 32-byte seed or a PKCS#8 DER
/// document; a PKCS#8 PEM document is accepted as-is or base64 wrapped. The
/// public key is optional and, when present, must match the private key.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyConfig {
    pub private_key_b64: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_b64: Option<String>,
}

impl fmt::Debug for KeyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyConfig")
            .field("private_key_b64", &"<redacted>")
            .field("public_key_b64", &self.public_key_b64)
            .finish()
    }
}

fn config_error(msg: impl Into<String>) -> ProofError {
    ProofError::Configuration(msg.into())
}

fn is_pem(text: &str) -> bool {
    text.trim_start().starts_with("-----BEGIN")
}

impl KeyConfig {
    pub fn new(private_key_b64: impl Into<String>, public_key_b64: Option<String>) -> Self {
        KeyConfig {
            private_key_b64: private_key_b64.into(),
            public_key_b64,
        }
    }

    /// Reads [`PRIVATE_KEY_ENV`] and [`PUBLIC_KEY_ENV`].
    ///
    /// A missing or empty private key is a configuration error.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(
            std::env::var(PRIVATE_KEY_ENV).ok(),
            std::env::var(PUBLIC_KEY_ENV).ok(),
        )
    }

    fn from_vars(private: Option<String>, public: Option<String>) -> Result<Self> {
        let private_key_b64 = private
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| config_error(format!("{PRIVATE_KEY_ENV} is not set")))?;
        let public_key_b64 = public.filter(|v| !v.trim().is_empty());

        Ok(KeyConfig {
            private_key_b64,
            public_key_b64,
        })
    }

    /// Generates a fresh random key pair, both halves as raw base64.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);

        KeyConfig {
            private_key_b64: BASE64.encode(signing_key.to_bytes()),
            public_key_b64: Some(BASE64.encode(signing_key.verifying_key().to_bytes())),
        }
    }

    /// Saves the key configuration to a file in the specified folder.
    ///
    /// The config is serialized to JSON and base64-encoded before writing.
    ///
    /// # Arguments
    ///
    /// * `folder` - The directory to save the key file in.
    /// * `name` - The filename for the key file.
    ///
    /// # Returns
    ///
    /// The path that was written.
    pub fn save(&self, folder: impl AsRef<Path>, name: &str) -> Result<PathBuf> {
        let key_file = folder.as_ref().join(name);

        let config_str = serde_json::to_string(self)?;
        fs::write(&key_file, BASE64.encode(config_str))?;
        log::debug!("saved key configuration to {}", key_file.display());

        Ok(key_file)
    }

    /// Loads a key configuration written by [`KeyConfig::save`].
    pub fn load(key_file: impl AsRef<Path>) -> Result<Self> {
        let key_file = key_file.as_ref();
        let config_base64 = fs::read_to_string(key_file).map_err(|e| {
            config_error(format!("cannot read key file {}: {e}", key_file.display()))
        })?;
        let config_bytes = BASE64
            .decode(config_base64.trim())
            .map_err(|e| config_error(format!("key file is not base64: {e}")))?;

        serde_json::from_slice(&config_bytes)
            .map_err(|e| config_error(format!("key file is not a key configuration: {e}")))
    }

    /// Decodes the private key and checks it against the configured public key.
    pub fn signing_key(&self) -> Result<SigningKey> {
        let signing_key = decode_private_key(&self.private_key_b64)?;

        if let Some(public_key_b64) = &self.public_key_b64 {
            let configured = decode_public_key(public_key_b64)?;
            if configured != signing_key.verifying_key() {
                return Err(config_error(
                    "public key does not match the configured private key",
                ));
            }
        }

        Ok(signing_key)
    }
}

/// Accepts a raw 32-byte seed, PKCS#8 DER, or PKCS#8 PEM.
fn decode_private_key(encoded: &str) -> Result<SigningKey> {
    if is_pem(encoded) {
        return SigningKey::from_pkcs8_pem(encoded)
            .map_err(|e| config_error(format!("invalid PKCS#8 PEM private key: {e}")));
    }

    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| config_error(format!("private key is not base64: {e}")))?;

    if bytes.len() == SECRET_KEY_LENGTH {
        let mut seed = [0u8; SECRET_KEY_LENGTH];
        seed.copy_from_slice(&bytes);
        return Ok(SigningKey::from_bytes(&seed));
    }

    if let Ok(text) = std::str::from_utf8(&bytes) {
        if is_pem(text) {
            return SigningKey::from_pkcs8_pem(text)
                .map_err(|e| config_error(format!("invalid PKCS#8 PEM private key: {e}")));
        }
    }

    SigningKey::from_pkcs8_der(&bytes).map_err(|e| {
        config_error(format!(
            "private key is neither a {SECRET_KEY_LENGTH} byte seed nor PKCS#8 ({} bytes): {e}",
            bytes.len()
        ))
    })
}

/// Accepts a raw 32-byte key or SPKI DER.
fn decode_public_key(encoded: &str) -> Result<VerifyingKey> {
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| config_error(format!("public key is not base64: {e}")))?;

    if bytes.len() == PUBLIC_KEY_LENGTH {
        let mut raw = [0u8; PUBLIC_KEY_LENGTH];
        raw.copy_from_slice(&bytes);
        return VerifyingKey::from_bytes(&raw)
            .map_err(|e| config_error(format!("invalid Ed25519 public key: {e}")));
    }

    VerifyingKey::from_public_key_der(&bytes)
        .map_err(|e| config_error(format!("invalid SPKI public key: {e}")))
}
