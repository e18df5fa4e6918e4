//! Credential vault: envelope encryption using AES-256-GCM
//!
//! Every seal draws a fresh random 256-bit data key. The credential plaintext
//! is encrypted with the data key, and the data key is encrypted with the
//! process-wide wrapping key. The wrapping key never touches credential
//! bytes directly.
//!
//! Both layers bind the same additional authenticated data: the record's key
//! context (name + namespace) and the wrapping key identity. A sealed blob
//! moved to another record, or opened under another key context, fails
//! authentication.
//!
//! ## Configuration
//!
//! The wrapping key is supplied at startup (see
//! [`crate::config::WrappingKeySettings`]) as base64-encoded 32 bytes together
//! with its name and namespace. It is never persisted by this crate.

use base64::Engine;
use ring::aead::{self, Aad, BoundKey, Nonce, NonceSequence, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::Arc;
use tracing::{debug, error, instrument};
use zeroize::{Zeroize, Zeroizing};

use crate::domain::{CipherRecord, Credential, KeyContext, WrappingKeyId};
use crate::errors::VaultError;

/// Size of wrapping and data keys in bytes
pub const KEY_SIZE: usize = 32;

/// Size of AES-256-GCM nonce in bytes
const NONCE_SIZE: usize = 12;

/// Size of AES-256-GCM tag in bytes
const TAG_SIZE: usize = 16;

/// Length of `CipherRecord::wrapped_data_key`: nonce, sealed key, tag
const WRAPPED_KEY_SIZE: usize = NONCE_SIZE + KEY_SIZE + TAG_SIZE;

const AAD_LABEL: &[u8] = b"datasource-broker.credential.v1";

type Result<T> = std::result::Result<T, VaultError>;

/// Single-use nonce sequence for AES-GCM
struct SingleNonce {
    nonce: Option<[u8; NONCE_SIZE]>,
}

impl SingleNonce {
    fn new(nonce_bytes: [u8; NONCE_SIZE]) -> Self {
        Self { nonce: Some(nonce_bytes) }
    }
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.nonce.take().map(Nonce::assume_unique_for_key).ok_or(ring::error::Unspecified)
    }
}

/// The process-wide master key used only to seal data keys
pub struct WrappingKey {
    id: WrappingKeyId,
    material: Zeroizing<[u8; KEY_SIZE]>,
}

impl WrappingKey {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        material: [u8; KEY_SIZE],
    ) -> Self {
        Self { id: WrappingKeyId::new(name, namespace), material: Zeroizing::new(material) }
    }

    /// Decode base64 key material, which must be exactly 32 bytes.
    pub fn from_base64(
        name: impl Into<String>,
        namespace: impl Into<String>,
        encoded: &str,
    ) -> Result<Self> {
        let mut decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| VaultError::invalid_key(format!("key material is not base64: {}", e)))?;

        if decoded.len() != KEY_SIZE {
            let len = decoded.len();
            decoded.zeroize();
            return Err(VaultError::invalid_key(format!(
                "key material must be {} bytes (256 bits), got {} bytes",
                KEY_SIZE, len
            )));
        }

        let mut material = [0u8; KEY_SIZE];
        material.copy_from_slice(&decoded);
        decoded.zeroize();

        let key = Self::new(name, namespace, material);
        material.zeroize();
        Ok(key)
    }

    /// Generate fresh random key material.
    pub fn generate(name: impl Into<String>, namespace: impl Into<String>) -> Result<Self> {
        let mut material = [0u8; KEY_SIZE];
        SystemRandom::new()
            .fill(&mut material)
            .map_err(|_| VaultError::internal("Failed to generate wrapping key material"))?;

        let key = Self::new(name, namespace, material);
        material.zeroize();
        Ok(key)
    }

    pub fn id(&self) -> &WrappingKeyId {
        &self.id
    }

    /// Base64 form of the key material, for operator tooling only.
    pub fn to_base64(&self) -> Zeroizing<String> {
        Zeroizing::new(base64::engine::general_purpose::STANDARD.encode(&*self.material))
    }
}

impl std::fmt::Debug for WrappingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WrappingKey").field("id", &self.id).field("material", &"[REDACTED]").finish()
    }
}

/// Envelope encryption for credential material.
///
/// Cheap to clone; clones share the loaded wrapping key.
#[derive(Clone)]
pub struct CredentialVault {
    key: Arc<WrappingKey>,
    rng: Arc<SystemRandom>,
}

impl CredentialVault {
    pub fn new(key: WrappingKey) -> Self {
        debug!(wrapping_key = %key.id, "Credential vault initialized");
        Self { key: Arc::new(key), rng: Arc::new(SystemRandom::new()) }
    }

    /// Identity of the loaded wrapping key
    pub fn key_id(&self) -> &WrappingKeyId {
        &self.key.id
    }

    /// Seal `plaintext` for the record identified by `context`.
    #[instrument(skip(self, plaintext), fields(key_context = %context, plaintext_len = plaintext.len()))]
    pub fn encrypt(&self, plaintext: &[u8], context: &KeyContext) -> Result<CipherRecord> {
        let aad = self.aad(context, &self.key.id);

        let mut data_key = Zeroizing::new([0u8; KEY_SIZE]);
        self.fill_random(&mut *data_key, "data key")?;

        let mut iv = [0u8; NONCE_SIZE];
        self.fill_random(&mut iv, "nonce")?;

        let mut data_sealer = sealing_key(&*data_key, iv)?;
        let mut ciphertext = plaintext.to_vec();
        let tag = data_sealer
            .seal_in_place_separate_tag(Aad::from(aad.as_slice()), &mut ciphertext)
            .map_err(|_| {
                error!("Credential encryption failed");
                VaultError::internal("Failed to encrypt credential data")
            })?;

        let mut wrap_nonce = [0u8; NONCE_SIZE];
        self.fill_random(&mut wrap_nonce, "nonce")?;

        let mut key_sealer = sealing_key(&*self.key.material, wrap_nonce)?;
        let mut sealed_key = Zeroizing::new(data_key.to_vec());
        sealed_key.reserve(TAG_SIZE);
        key_sealer.seal_in_place_append_tag(Aad::from(aad.as_slice()), &mut *sealed_key).map_err(
            |_| {
                error!("Data key wrapping failed");
                VaultError::internal("Failed to wrap data key")
            },
        )?;

        let mut wrapped_data_key = Vec::with_capacity(WRAPPED_KEY_SIZE);
        wrapped_data_key.extend_from_slice(&wrap_nonce);
        wrapped_data_key.extend_from_slice(&sealed_key);

        debug!(ciphertext_len = ciphertext.len(), "Sealed credential");

        Ok(CipherRecord {
            ciphertext,
            wrapped_data_key,
            iv: iv.to_vec(),
            tag: tag.as_ref().to_vec(),
            wrapping_key: self.key.id.clone(),
        })
    }

    /// Open a sealed record for the record identified by `context`.
    #[instrument(skip(self, record), fields(key_context = %context, wrapping_key = %record.wrapping_key))]
    pub fn decrypt(&self, record: &CipherRecord, context: &KeyContext) -> Result<Zeroizing<Vec<u8>>> {
        if record.wrapping_key != self.key.id {
            error!(loaded_key = %self.key.id, "Credential sealed under a wrapping key that is not loaded");
            return Err(VaultError::key_unavailable(
                &record.wrapping_key.name,
                &record.wrapping_key.namespace,
            ));
        }

        if record.iv.len() != NONCE_SIZE
            || record.tag.len() != TAG_SIZE
            || record.wrapped_data_key.len() != WRAPPED_KEY_SIZE
        {
            error!("Malformed cipher record");
            return Err(VaultError::integrity("cipher record fields have invalid lengths"));
        }

        let aad = self.aad(context, &record.wrapping_key);

        let (wrap_nonce, sealed_key) = record.wrapped_data_key.split_at(NONCE_SIZE);
        let mut unwrapping_key = opening_key(&*self.key.material, wrap_nonce)?;
        let mut key_buffer = Zeroizing::new(sealed_key.to_vec());
        let data_key = unwrapping_key
            .open_in_place(Aad::from(aad.as_slice()), &mut key_buffer[..])
            .map_err(|_| {
                error!("Data key failed authentication - tampering or key context mismatch");
                VaultError::integrity("wrapped data key failed authentication")
            })?;

        let mut opening = opening_key(data_key, &record.iv)?;
        let mut buffer = Zeroizing::new(Vec::with_capacity(record.ciphertext.len() + TAG_SIZE));
        buffer.extend_from_slice(&record.ciphertext);
        buffer.extend_from_slice(&record.tag);

        let plaintext = opening.open_in_place(Aad::from(aad.as_slice()), &mut buffer[..]).map_err(
            |_| {
                error!("Credential failed authentication - tampering or key context mismatch");
                VaultError::integrity("credential ciphertext failed authentication")
            },
        )?;

        debug!(plaintext_len = plaintext.len(), "Opened credential");
        Ok(Zeroizing::new(plaintext.to_vec()))
    }

    /// Serialize and seal a credential.
    pub fn encrypt_credential(
        &self,
        credential: &Credential,
        context: &KeyContext,
    ) -> Result<CipherRecord> {
        let plaintext = credential.to_plaintext().map_err(|e| VaultError::payload(&e))?;
        self.encrypt(&plaintext, context)
    }

    /// Open and parse a sealed credential.
    pub fn decrypt_credential(
        &self,
        record: &CipherRecord,
        context: &KeyContext,
    ) -> Result<Credential> {
        let plaintext = self.decrypt(record, context)?;
        Credential::from_plaintext(&plaintext).map_err(|e| VaultError::payload(&e))
    }

    fn fill_random(&self, dest: &mut [u8], what: &str) -> Result<()> {
        self.rng.fill(dest).map_err(|_| {
            error!(what = %what, "Failed to generate random bytes");
            VaultError::internal(format!("Failed to generate random {}", what))
        })
    }

    /// Length-prefixed encoding of key context and wrapping key identity.
    fn aad(&self, context: &KeyContext, wrapping_key: &WrappingKeyId) -> Vec<u8> {
        let parts = [
            context.namespace.as_bytes(),
            context.name.as_bytes(),
            wrapping_key.namespace.as_bytes(),
            wrapping_key.name.as_bytes(),
        ];

        let mut aad = Vec::with_capacity(
            AAD_LABEL.len() + parts.iter().map(|p| p.len() + 4).sum::<usize>(),
        );
        aad.extend_from_slice(AAD_LABEL);
        for part in parts {
            aad.extend_from_slice(&(part.len() as u32).to_be_bytes());
            aad.extend_from_slice(part);
        }
        aad
    }
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault").field("wrapping_key", &self.key.id).finish()
    }
}

fn sealing_key(key: &[u8], nonce: [u8; NONCE_SIZE]) -> Result<aead::SealingKey<SingleNonce>> {
    let unbound = UnboundKey::new(&AES_256_GCM, key).map_err(|_| {
        error!("Failed to create encryption key");
        VaultError::internal("Failed to create encryption key")
    })?;
    Ok(aead::SealingKey::new(unbound, SingleNonce::new(nonce)))
}

fn opening_key(key: &[u8], nonce: &[u8]) -> Result<aead::OpeningKey<SingleNonce>> {
    let nonce: [u8; NONCE_SIZE] =
        nonce.try_into().map_err(|_| VaultError::integrity("invalid nonce length"))?;
    let unbound = UnboundKey::new(&AES_256_GCM, key).map_err(|_| {
        error!("Failed to create decryption key");
        VaultError::integrity("unusable data key")
    })?;
    Ok(aead::OpeningKey::new(unbound, SingleNonce::new(nonce)))
}
