//! Signer contract, registry and the reference Ed25519 backend.
//!
//! Every signer signs the same literal message,
//! `I sign this revision: [<parent_hash>]`, where the parent is the
//! revision being signed. Backends are looked up by `signature_type`.

use async_trait::async_trait;
use ed25519_dalek::{Signature, SigningKey, VerifyingKey};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::AquaError;
use crate::hashing;
use crate::revision::signing_message;
use crate::types::{Credentials, VerificationHash};

/// Output of a signer, stored verbatim on the signature revision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureMaterial {
    pub signature: String,
    pub public_key: String,
    pub wallet_address: String,
    pub signature_type: String,
}

/// A signing backend for one `signature_type`.
#[async_trait]
pub trait Signer: Send + Sync {
    fn signature_type(&self) -> &str;

    /// Sign the revision identified by `target`.
    async fn sign(
        &self,
        target: &VerificationHash,
        credentials: &Credentials,
    ) -> Result<SignatureMaterial, AquaError>;

    /// `Ok(false)` when the signature does not check out; `Err` only when the
    /// check itself could not run.
    async fn verify(
        &self,
        material: &SignatureMaterial,
        claimed_identity: &str,
        target: &VerificationHash,
    ) -> Result<bool, AquaError>;
}

/// Signers keyed by `signature_type`.
#[derive(Clone, Default)]
pub struct SignerRegistry {
    signers: HashMap<String, Arc<dyn Signer>>,
}

impl SignerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the reference Ed25519 signer.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(Ed25519Signer));
        registry
    }

    pub fn register(&mut self, signer: Arc<dyn Signer>) {
        self.signers
            .insert(signer.signature_type().to_string(), signer);
    }

    pub fn get(&self, signature_type: &str) -> Result<Arc<dyn Signer>, AquaError> {
        self.signers
            .get(signature_type)
            .cloned()
            .ok_or_else(|| AquaError::UnsupportedSignatureType(signature_type.to_string()))
    }

    pub fn signature_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.signers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl std::fmt::Debug for SignerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerRegistry")
            .field("signature_types", &self.signature_types())
            .finish()
    }
}

pub const ED25519_SIGNATURE_TYPE: &str = "ed25519";
/// Credentials key holding the hex-encoded 32-byte Ed25519 secret.
pub const ED25519_SECRET_KEY: &str = "ed25519_secret_key";

/// Reference signer over raw Ed25519 keys.
#[derive(Clone, Copy, Debug, Default)]
pub struct Ed25519Signer;

impl Ed25519Signer {
    /// Fresh random secret, hex-encoded, ready for [`ED25519_SECRET_KEY`].
    pub fn generate_secret() -> String {
        let bytes: [u8; 32] = rand::thread_rng().gen();
        hex::encode(bytes)
    }

    /// `0x` + the last 20 bytes of `sha256(public_key)`.
    pub fn wallet_address(key: &VerifyingKey) -> String {
        let digest = hashing::sha256_hex(key.as_bytes());
        format!("0x{}", &digest[digest.len() - 40..])
    }

    fn signing_key(credentials: &Credentials) -> Result<SigningKey, AquaError> {
        let secret_hex = credentials.get(ED25519_SECRET_KEY).ok_or_else(|| {
            AquaError::Backend(format!("credentials lack `{}`", ED25519_SECRET_KEY))
        })?;
        let bytes = hex::decode(secret_hex)
            .map_err(|e| AquaError::Backend(format!("secret key is not hex: {}", e)))?;
        let secret: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| AquaError::Backend("secret key must be 32 bytes".into()))?;
        Ok(SigningKey::from_bytes(&secret))
    }
}

#[async_trait]
impl Signer for Ed25519Signer {
    fn signature_type(&self) -> &str {
        ED25519_SIGNATURE_TYPE
    }

    async fn sign(
        &self,
        target: &VerificationHash,
        credentials: &Credentials,
    ) -> Result<SignatureMaterial, AquaError> {
        use ed25519_dalek::Signer as _;
        let signing_key = Self::signing_key(credentials)?;
        let verifying_key = signing_key.verifying_key();
        let signature = signing_key.sign(signing_message(target).as_bytes());
        Ok(SignatureMaterial {
            signature: hex::encode(signature.to_bytes()),
            public_key: hex::encode(verifying_key.as_bytes()),
            wallet_address: Self::wallet_address(&verifying_key),
            signature_type: ED25519_SIGNATURE_TYPE.to_string(),
        })
    }

    async fn verify(
        &self,
        material: &SignatureMaterial,
        claimed_identity: &str,
        target: &VerificationHash,
    ) -> Result<bool, AquaError> {
        use ed25519_dalek::Verifier;

        let Ok(pk_bytes) = hex::decode(&material.public_key) else {
            return Ok(false);
        };
        let Ok(sig_bytes) = hex::decode(&material.signature) else {
            return Ok(false);
        };
        let Ok(pk) = <[u8; 32]>::try_from(pk_bytes.as_slice()) else {
            return Ok(false);
        };
        let Ok(sig) = <[u8; 64]>::try_from(sig_bytes.as_slice()) else {
            return Ok(false);
        };
        let Ok(verifying_key) = VerifyingKey::from_bytes(&pk) else {
            return Ok(false);
        };

        if !Self::wallet_address(&verifying_key).eq_ignore_ascii_case(claimed_identity) {
            return Ok(false);
        }

        let signature = Signature::from_bytes(&sig);
        Ok(verifying_key
            .verify(signing_message(target).as_bytes(), &signature)
            .is_ok())
    }
}
