//! Credentials held in configuration
//!
//! Access tokens and the PostgreSQL connection string are kept as
//! [`SecretString`]: `Debug` prints `[REDACTED]`, reading the value needs an
//! explicit `expose_secret()`, and the buffer is zeroed on drop.
//!
//! ```rust
//! use crm_exporter::config::secret_string;
//! use secrecy::ExposeSecret;
//!
//! let token = secret_string("long-lived-token".to_string());
//! assert_eq!(token.expose_secret().bearer(), "Bearer long-lived-token");
//! assert!(!format!("{token:?}").contains("long-lived"));
//! ```

use secrecy::{CloneableSecret, DebugSecret, Secret, SerializableSecret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::ops::Deref;
use zeroize::Zeroize;

/// Credential text; only reachable through [`secrecy::ExposeSecret`]
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SecretValue(String);

impl CloneableSecret for SecretValue {}
impl DebugSecret for SecretValue {}
impl SerializableSecret for SecretValue {}

impl SecretValue {
    /// `Authorization` header value; surrounding whitespace from `.env` files is dropped
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0.trim())
    }
}

impl Deref for SecretValue {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for SecretValue {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for SecretValue {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl From<String> for SecretValue {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Serialize for SecretValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SecretValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self)
    }
}

pub type SecretString = Secret<SecretValue>;

pub fn secret_string(value: String) -> SecretString {
    Secret::new(SecretValue(value))
}

pub fn secret_string_opt(value: Option<String>) -> Option<SecretString> {
    value.map(secret_string)
}
