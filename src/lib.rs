//! Library for binding content-authenticity proofs to images.
//!
//! This crate signs a proof record over an image's content hash with Ed25519,
//! embeds it in a JPEG's Exif user comment, and later extracts and verifies
//! it. Device ownership lookups and proof-package archival sit behind traits.

/// Proof package persistence (local filesystem, in-memory)
pub mod blob_store;

/// Sorted-key JSON encoding of the signed message
pub mod canonical;

/// Signing key configuration
pub mod config;

pub mod error;

/// Minimal Exif/TIFF writer and multi-strategy reader
pub mod exif;

/// Content hashing conventions
pub mod image_hash;

/// Device ownership registry seam
pub mod ownership;

/// Proof payload variants and validation
pub mod payload;

/// Proof creation and signing
pub mod proof;

pub mod service;

/// Digital signature implementations
pub mod signer;

/// Proof verification
pub mod verify;

#[cfg(test)]
mod test_util;

pub use config::KeyConfig;
pub use error::{ExtractStage, ProofError, Result};
pub use payload::{ProducerIdentity, ProofPayload, ProofType};
pub use proof::ProofSigner;
pub use service::{EmbeddedProof, ProofService};
pub use verify::{FailureReason, ProofVerifier, VerificationResult};
