//! Credential domain types.
//!
//! A [`Credential`] is the plaintext authentication material of a data
//! source. It only exists in memory while being sealed or while a client is
//! being constructed. At rest the material is a [`CipherRecord`] inside a
//! [`CredentialRecord`].

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

use super::id::CredentialId;
use super::secret::SecretString;

/// Authentication scheme used against a remote cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    NoAuth,
    UsernamePassword,
    ApiKey,
}

impl AuthScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoAuth => "no_auth",
            Self::UsernamePassword => "username_password",
            Self::ApiKey => "api_key",
        }
    }
}

impl FromStr for AuthScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "no_auth" => Ok(Self::NoAuth),
            "username_password" => Ok(Self::UsernamePassword),
            "api_key" => Ok(Self::ApiKey),
            _ => Err(format!("Unknown auth scheme: {}", s)),
        }
    }
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Plaintext authentication material.
///
/// Deserializes from the JSON payload callers submit, e.g.
/// `{"scheme": "username_password", "user": "admin", "pass": "..."}`.
/// Secret fields are [`SecretString`]s, so Debug output and ordinary
/// serialization are redacted; [`Credential::to_plaintext`] is the only way to
/// obtain the raw payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum Credential {
    NoAuth,
    UsernamePassword {
        #[serde(alias = "user")]
        username: String,
        #[serde(alias = "pass")]
        password: SecretString,
    },
    ApiKey {
        #[serde(alias = "apiKey")]
        api_key: SecretString,
    },
}

#[derive(Serialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
enum PlaintextCredential<'a> {
    NoAuth,
    UsernamePassword { username: &'a str, password: &'a str },
    ApiKey { api_key: &'a str },
}

impl Credential {
    pub fn username_password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::UsernamePassword {
            username: username.into(),
            password: SecretString::new(password.into()),
        }
    }

    pub fn api_key(key: impl Into<String>) -> Self {
        Self::ApiKey { api_key: SecretString::new(key.into()) }
    }

    pub fn scheme(&self) -> AuthScheme {
        match self {
            Self::NoAuth => AuthScheme::NoAuth,
            Self::UsernamePassword { .. } => AuthScheme::UsernamePassword,
            Self::ApiKey { .. } => AuthScheme::ApiKey,
        }
    }

    /// Serialize the raw material into a buffer that is zeroed on drop.
    pub fn to_plaintext(&self) -> serde_json::Result<Zeroizing<Vec<u8>>> {
        let wire = match self {
            Self::NoAuth => PlaintextCredential::NoAuth,
            Self::UsernamePassword { username, password } => {
                PlaintextCredential::UsernamePassword {
                    username,
                    password: password.expose_secret(),
                }
            }
            Self::ApiKey { api_key } => {
                PlaintextCredential::ApiKey { api_key: api_key.expose_secret() }
            }
        };

        let mut buffer = Zeroizing::new(Vec::with_capacity(256));
        serde_json::to_writer(&mut *buffer, &wire)?;
        Ok(buffer)
    }

    pub fn from_plaintext(plaintext: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(plaintext)
    }
}

/// Identity of the record a ciphertext belongs to.
///
/// Bound into every seal as additional authenticated data, so a sealed blob
/// copied onto another record fails to open.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyContext {
    pub name: String,
    pub namespace: String,
}

impl KeyContext {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self { name: name.into(), namespace: namespace.into() }
    }
}

impl fmt::Display for KeyContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Name and namespace of the wrapping key that sealed a record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WrappingKeyId {
    pub name: String,
    pub namespace: String,
}

impl WrappingKeyId {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self { name: name.into(), namespace: namespace.into() }
    }
}

impl fmt::Display for WrappingKeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Envelope-encrypted credential material as stored at rest.
///
/// The data key that encrypted `ciphertext` is itself sealed under the
/// wrapping key named by `wrapping_key`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CipherRecord {
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
    /// Nonce of the wrapping key seal followed by the sealed data key
    #[serde(with = "base64_bytes")]
    pub wrapped_data_key: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub iv: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub tag: Vec<u8>,
    pub wrapping_key: WrappingKeyId,
}

impl CipherRecord {
    /// Short stable digest identifying this particular seal.
    ///
    /// Every encryption draws a fresh iv and data key, so re-sealing a
    /// credential (rotation, update) always yields a new version.
    pub fn version(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.iv);
        hasher.update(&self.tag);
        hasher.update(&self.wrapped_data_key);
        hex::encode(&hasher.finalize()[..8])
    }
}

impl fmt::Debug for CipherRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherRecord")
            .field("ciphertext_len", &self.ciphertext.len())
            .field("wrapping_key", &self.wrapping_key)
            .field("version", &self.version())
            .finish()
    }
}

/// Persisted credential: record identity plus sealed material
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub id: CredentialId,
    pub name: String,
    pub namespace: String,
    pub cipher: CipherRecord,
}

impl CredentialRecord {
    pub fn key_context(&self) -> KeyContext {
        KeyContext::new(&self.name, &self.namespace)
    }
}
