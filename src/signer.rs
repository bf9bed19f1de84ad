use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::signature::{SignatureEncoding, Signer};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Hex SHA-256 digest of a binary payload.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Signs published artifacts with a process-wide RSA key. The key is loaded
/// once from a PKCS#8 PEM (optionally passphrase-encrypted) and reused for
/// every artifact of the run.
pub struct ArtifactSigner {
    key: SigningKey<Sha256>,
}

impl ArtifactSigner {
    pub fn from_pem(pem: &str, passphrase: &str) -> Result<Self> {
        let private_key = if passphrase.is_empty() {
            RsaPrivateKey::from_pkcs8_pem(pem)
        } else {
            RsaPrivateKey::from_pkcs8_encrypted_pem(pem, passphrase)
        }
        .map_err(|e| Error::Signer(format!("failed to load signing key: {e}")))?;

        Ok(Self {
            key: SigningKey::new(private_key),
        })
    }

    pub fn from_pem_file<P: AsRef<Path>>(path: P, passphrase: &str) -> Result<Self> {
        let pem = std::fs::read_to_string(path)?;
        Self::from_pem(&pem, passphrase)
    }

    /// Base64 RSA-PKCS#1v1.5-SHA256 signature over the payload.
    #[must_use]
    pub fn signature(&self, data: &[u8]) -> String {
        BASE64.encode(self.key.sign(data).to_bytes())
    }

    /// Hex SHA-256 checksum of the payload.
    #[must_use]
    pub fn checksum(&self, data: &[u8]) -> String {
        sha256_hex(data)
    }
}
