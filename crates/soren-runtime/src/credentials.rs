//! Agent credential decoding.
//!
//! Deployments hand the credential over in `AGENT_CRED` either as PEM text
//! or as base64 of the raw credential file.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::config::{ConfigError, ConfigResult};

const PEM_PREFIX: &str = "-----BEGIN";

/// Decoded credential material, ready to hand to a transport.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// PEM text, kept verbatim.
    Pem(String),
    /// Bytes decoded from base64.
    Decoded(Vec<u8>),
}

impl Credentials {
    /// Accepts PEM text verbatim and base64-decodes anything else.
    pub fn decode(raw: &str) -> ConfigResult<Self> {
        let raw = raw.trim();
        if raw.starts_with(PEM_PREFIX) {
            return Ok(Self::Pem(raw.to_string()));
        }
        STANDARD
            .decode(raw)
            .map(Self::Decoded)
            .map_err(|e| ConfigError::invalid_credential(e.to_string()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Pem(text) => text.as_bytes(),
            Self::Decoded(bytes) => bytes,
        }
    }

    pub fn is_pem(&self) -> bool {
        matches!(self, Self::Pem(_))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_pem() { "Pem" } else { "Decoded" };
        write!(f, "Credentials::{kind}(<{} bytes redacted>)", self.as_bytes().len())
    }
}
