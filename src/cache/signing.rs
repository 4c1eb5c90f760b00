// src/cache/signing.rs
//! Network cache entry signing
//!
//! Directory entries are signed with Ed25519. The private key lives in a
//! small TOML file; trusted public keys are given as base64 strings.

use super::{CacheError, CacheResult};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// A signing key for uploading cache entries
pub struct CacheSigner {
    signing_key: SigningKey,
}

impl CacheSigner {
    /// Generate a new random key
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Public key as base64, for `signature_certificate_list`
    pub fn public_key_base64(&self) -> String {
        BASE64.encode(self.signing_key.verifying_key().as_bytes())
    }

    /// Sign a directory entry's metadata, returning the base64 signature
    pub fn sign(&self, metadata: &str) -> String {
        BASE64.encode(self.signing_key.sign(metadata.as_bytes()).to_bytes())
    }

    /// Write the private key to `path`, readable only by the owner
    pub fn save(&self, path: &Path) -> CacheResult<()> {
        let data = KeyFile {
            algorithm: "ed25519".to_string(),
            key: BASE64.encode(self.signing_key.to_bytes()),
        };
        let content =
            toml::to_string_pretty(&data).map_err(|e| CacheError::Signing(e.to_string()))?;
        fs::write(path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(path)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(path, perms)?;
        }
        Ok(())
    }

    /// Load a private key written by [`CacheSigner::save`]
    pub fn load(path: &Path) -> CacheResult<Self> {
        let content = fs::read_to_string(path)?;
        let key_file: KeyFile = toml::from_str(&content)
            .map_err(|e| CacheError::Signing(format!("{}: {}", path.display(), e)))?;

        if key_file.algorithm != "ed25519" {
            return Err(CacheError::Signing(format!(
                "Unsupported key algorithm: {}",
                key_file.algorithm
            )));
        }

        let key_array: [u8; 32] = BASE64
            .decode(&key_file.key)
            .map_err(|e| CacheError::Signing(format!("Invalid base64 in key file: {e}")))?
            .try_into()
            .map_err(|_| CacheError::Signing("Invalid key length".to_string()))?;

        Ok(Self {
            signing_key: SigningKey::from_bytes(&key_array),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct KeyFile {
    algorithm: String,
    key: String,
}

/// Trusted keys used to accept downloaded directory entries
#[derive(Debug, Clone, Default)]
pub struct TrustedKeys {
    keys: Vec<VerifyingKey>,
}

impl TrustedKeys {
    /// Decode base64 public keys, skipping malformed ones
    pub fn from_base64<S: AsRef<str>>(keys: &[S]) -> Self {
        let keys = keys
            .iter()
            .filter_map(|key| match decode_public_key(key.as_ref()) {
                Ok(key) => Some(key),
                Err(e) => {
                    tracing::warn!("Ignoring trusted cache key: {}", e);
                    None
                }
            })
            .collect();
        Self { keys }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Whether any trusted key produced `signature` over `metadata`
    pub fn verify(&self, metadata: &str, signature: &str) -> bool {
        let Ok(bytes) = BASE64.decode(signature) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(&bytes) else {
            return false;
        };
        self.keys
            .iter()
            .any(|key| key.verify_strict(metadata.as_bytes(), &signature).is_ok())
    }
}

fn decode_public_key(key: &str) -> CacheResult<VerifyingKey> {
    let bytes: [u8; 32] = BASE64
        .decode(key.trim())
        .map_err(|e| CacheError::Signing(format!("Invalid base64 public key: {e}")))?
        .try_into()
        .map_err(|_| CacheError::Signing("Invalid public key length".to_string()))?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| CacheError::Signing(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sign_and_verify() {
        let signer = CacheSigner::generate();
        let trusted = TrustedKeys::from_base64(&[signer.public_key_base64()]);

        let metadata = r#"{"file_name":"foo-1.0.tar.gz"}"#;
        let signature = signer.sign(metadata);
        assert!(trusted.verify(metadata, &signature));
        assert!(!trusted.verify(r#"{"file_name":"evil.tar.gz"}"#, &signature));
        assert!(!trusted.verify(metadata, "not base64!"));
    }

    #[test]
    fn test_untrusted_signer_rejected() {
        let signer = CacheSigner::generate();
        let other = CacheSigner::generate();
        let trusted = TrustedKeys::from_base64(&[other.public_key_base64(), "garbage".to_string()]);
        assert!(!trusted.is_empty());
        assert!(!trusted.verify("{}", &signer.sign("{}")));
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cache.key");

        let signer = CacheSigner::generate();
        signer.save(&path).unwrap();

        let loaded = CacheSigner::load(&path).unwrap();
        assert_eq!(loaded.public_key_base64(), signer.public_key_base64());
    }

    #[test]
    fn test_load_rejects_other_algorithms() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cache.key");
        fs::write(&path, "algorithm = \"rsa\"\nkey = \"AAAA\"\n").unwrap();
        assert!(matches!(CacheSigner::load(&path), Err(CacheError::Signing(_))));
    }
}
