//! Private key file SSH authentication.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use russh::{client, keys};
use tracing::debug;

use crate::survey::error::ConnectError;
use crate::survey::session::SshClientHandler;

use super::traits::AuthStrategy;

/// Private key file authentication strategy.
///
/// Supports passphrase-less keys only.
pub struct KeyAuth {
    key_path: PathBuf,
}

impl KeyAuth {
    pub fn new(key_path: impl Into<PathBuf>) -> Self {
        Self {
            key_path: key_path.into(),
        }
    }

    /// Load the private key, reporting a missing or unreadable file as a
    /// key file error rather than an authentication rejection.
    pub(crate) fn load(&self) -> Result<keys::PrivateKey, ConnectError> {
        if !self.key_path.is_file() {
            return Err(ConnectError::KeyFile {
                path: self.key_path.clone(),
                reason: "No such file".to_string(),
            });
        }

        keys::load_secret_key(&self.key_path, None).map_err(|e| ConnectError::KeyFile {
            path: self.key_path.clone(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl AuthStrategy for KeyAuth {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool, ConnectError> {
        let key_pair = self.load()?;

        // For RSA keys, use the best supported hash algorithm
        let hash_alg = handle
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();
        debug!("Using RSA hash algorithm for key auth: {:?}", hash_alg);

        let key_with_hash = keys::PrivateKeyWithHashAlg::new(Arc::new(key_pair), hash_alg);

        let result = handle
            .authenticate_publickey(username, key_with_hash)
            .await
            .map_err(|e| ConnectError::AuthFailed {
                mechanism: self.name(),
                reason: e.to_string(),
            })?;

        Ok(result.success())
    }

    fn name(&self) -> &'static str {
        "key"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_auth_name() {
        let auth = KeyAuth::new("/path/to/key");
        assert_eq!(auth.name(), "key");
    }

    #[test]
    fn test_missing_key_file_is_key_file_error() {
        let auth = KeyAuth::new("/definitely/not/here/id_ed25519");
        match auth.load() {
            Err(ConnectError::KeyFile { path, .. }) => {
                assert_eq!(path, PathBuf::from("/definitely/not/here/id_ed25519"));
            }
            other => panic!("expected KeyFile error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_garbage_key_file_is_key_file_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id_rsa");
        std::fs::write(&path, "not a private key").unwrap();

        let auth = KeyAuth::new(&path);
        assert!(matches!(auth.load(), Err(ConnectError::KeyFile { .. })));
    }
}
