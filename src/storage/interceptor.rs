//! Encrypt-on-write layer for credential records.
//!
//! [`CredentialInterceptor`] wraps any [`MetadataStore`]. Records of kind
//! [`CREDENTIAL_KIND`] carrying a plaintext `credentials` attribute are sealed
//! with the [`CredentialVault`] before the inner store sees them. Everything
//! else, including reads, passes through untouched.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use zeroize::Zeroize;

use super::{MetadataReader, MetadataStore, Result, StorageError, StoredRecord, CREDENTIAL_KIND};
use crate::domain::{CipherRecord, Credential, CredentialRecord, KeyContext};
use crate::errors::VaultError;
use crate::services::credential_vault::CredentialVault;

const PLAINTEXT_ATTRIBUTE: &str = "credentials";
const CIPHER_ATTRIBUTE: &str = "cipher";

/// Seal the plaintext credential of a record.
///
/// Non-credential records are returned unchanged, and so are credential records
/// that are already sealed, provided the cipher still opens under the record's
/// name and namespace. On success the `credentials` attribute is gone and a
/// `cipher` attribute holds the envelope.
///
/// # Errors
///
/// - [`StorageError::CredentialProtection`] if the payload does not parse, the
///   vault fails, or a sealed record's cipher does not open under its own
///   name/namespace (e.g. a rename without resubmitting plaintext)
/// - [`StorageError::InvalidRecord`] if name/namespace are missing or the
///   record has neither plaintext nor cipher
pub fn seal_credential_record(vault: &CredentialVault, mut record: StoredRecord) -> Result<StoredRecord> {
    if record.kind != CREDENTIAL_KIND {
        return Ok(record);
    }

    let Some(attributes) = record.attributes.as_object_mut() else {
        return Err(StorageError::invalid_record(
            &record.kind,
            &record.id,
            "attributes are not an object",
        ));
    };

    let Some(mut plaintext) = attributes.remove(PLAINTEXT_ATTRIBUTE) else {
        let Some(cipher) = attributes.get(CIPHER_ATTRIBUTE) else {
            return Err(StorageError::invalid_record(
                &record.kind,
                &record.id,
                "record carries neither credentials nor cipher",
            ));
        };
        let cipher = serde_json::from_value::<CipherRecord>(cipher.clone()).map_err(|e| {
            StorageError::invalid_record(
                &record.kind,
                &record.id,
                format!("cipher attribute is malformed: {:?} error", e.classify()),
            )
        })?;
        let Some(context) = key_context(attributes) else {
            return Err(StorageError::invalid_record(
                &record.kind,
                &record.id,
                "credential record requires name and namespace",
            ));
        };

        // The cipher is bound to name/namespace; a renamed record would never open again.
        vault
            .decrypt(&cipher, &context)
            .map_err(|e| StorageError::credential_protection(&record.id, e))?;
        debug!(credential_id = %record.id, "Credential record already sealed, passing through");
        return Ok(record);
    };

    let Some(context) = key_context(attributes) else {
        scrub(&mut plaintext);
        return Err(StorageError::invalid_record(
            &record.kind,
            &record.id,
            "credential record requires name and namespace",
        ));
    };

    let parsed = Credential::deserialize(&plaintext);
    scrub(&mut plaintext);
    let credential = parsed
        .map_err(|e| StorageError::credential_protection(&record.id, VaultError::payload(&e)))?;

    let cipher = vault
        .encrypt_credential(&credential, &context)
        .map_err(|e| StorageError::credential_protection(&record.id, e))?;
    let cipher = serde_json::to_value(&cipher)
        .map_err(|e| StorageError::credential_protection(&record.id, VaultError::payload(&e)))?;

    attributes.insert(CIPHER_ATTRIBUTE.to_string(), cipher);
    Ok(record)
}

/// Open a sealed credential on demand.
pub fn open_credential_record(
    vault: &CredentialVault,
    record: &CredentialRecord,
) -> std::result::Result<Credential, VaultError> {
    vault.decrypt_credential(&record.cipher, &record.key_context())
}

fn key_context(attributes: &serde_json::Map<String, Value>) -> Option<KeyContext> {
    let name = attributes.get("name").and_then(Value::as_str)?;
    let namespace = attributes.get("namespace").and_then(Value::as_str)?;
    Some(KeyContext::new(name, namespace))
}

/// Overwrite every string inside a JSON value before it is dropped.
fn scrub(value: &mut Value) {
    match value {
        Value::String(s) => s.zeroize(),
        Value::Array(items) => items.iter_mut().for_each(scrub),
        Value::Object(map) => map.values_mut().for_each(scrub),
        _ => {}
    }
}

/// [`MetadataStore`] decorator that seals credential records on write.
#[derive(Clone)]
pub struct CredentialInterceptor<S> {
    inner: S,
    vault: Arc<CredentialVault>,
}

impl<S> CredentialInterceptor<S> {
    pub fn new(inner: S, vault: Arc<CredentialVault>) -> Self {
        Self { inner, vault }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn seal(&self, record: StoredRecord) -> Result<StoredRecord> {
        let id = record.id.clone();
        seal_credential_record(&self.vault, record).inspect_err(|e| {
            warn!(credential_id = %id, error = %e, "Refusing to write unprotected credential record");
        })
    }
}

#[async_trait]
impl<S: MetadataStore> MetadataReader for CredentialInterceptor<S> {
    async fn get(&self, kind: &str, id: &str) -> Result<StoredRecord> {
        self.inner.get(kind, id).await
    }

    async fn find(&self, kind: &str) -> Result<Vec<StoredRecord>> {
        self.inner.find(kind).await
    }
}

#[async_trait]
impl<S: MetadataStore> MetadataStore for CredentialInterceptor<S> {
    #[instrument(skip(self, record), fields(kind = %record.kind, id = %record.id), name = "interceptor_create")]
    async fn create(&self, record: StoredRecord) -> Result<StoredRecord> {
        let record = self.seal(record)?;
        self.inner.create(record).await
    }

    #[instrument(skip(self, record), fields(kind = %record.kind, id = %record.id), name = "interceptor_update")]
    async fn update(&self, record: StoredRecord) -> Result<StoredRecord> {
        let record = self.seal(record)?;
        self.inner.update(record).await
    }
}
