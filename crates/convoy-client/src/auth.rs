//! Session keys — one freshly signed credential per scheduler operation.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};
use tracing::debug;

use convoy_core::SessionKey;

use crate::error::{ClientError, ClientResult};

/// Signs a session key on behalf of `owner`.
pub trait SessionSigner {
    fn sign(&self, key: &mut SessionKey, owner: &str) -> ClientResult<()>;
}

/// Mints session keys. Never caches: the scheduler checks freshness of
/// every key it receives.
pub struct SessionAuthenticator {
    signer: Box<dyn SessionSigner>,
}

impl SessionAuthenticator {
    pub fn new(signer: Box<dyn SessionSigner>) -> Self {
        Self { signer }
    }

    /// Build a key for `owner` and sign it.
    pub fn sign(&self, owner: &str) -> ClientResult<SessionKey> {
        let mut key = SessionKey::new(owner);
        self.signer.sign(&mut key, owner)?;
        debug!(user = %owner, nonce = %key.nonce, "minted session key");
        Ok(key)
    }

    /// Sign a key for the user running this process.
    pub fn acquire_session(&self) -> ClientResult<SessionKey> {
        self.sign(&current_user())
    }
}

/// Login name of the invoking user.
pub fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_else(|_| "nobody".to_string())
}

/// Signs keys with a shared secret read from disk.
///
/// The signature is `hex(sha256(secret ‖ user ‖ nonce ‖ issued_at))`,
/// fields separated by NUL bytes.
pub struct KeyFileSigner {
    key_file: PathBuf,
}

impl KeyFileSigner {
    pub fn new(key_file: PathBuf) -> Self {
        Self { key_file }
    }
}

impl SessionSigner for KeyFileSigner {
    fn sign(&self, key: &mut SessionKey, owner: &str) -> ClientResult<()> {
        let signing_error = |reason: String| ClientError::Signing {
            user: owner.to_string(),
            reason,
        };

        let secret = std::fs::read(&self.key_file)
            .map_err(|e| signing_error(format!("{}: {e}", self.key_file.display())))?;
        if secret.is_empty() {
            return Err(signing_error(format!(
                "{} is empty",
                self.key_file.display()
            )));
        }

        let mut nonce = [0u8; 16];
        getrandom::getrandom(&mut nonce).map_err(|e| signing_error(e.to_string()))?;
        let issued_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| signing_error(e.to_string()))?
            .as_secs();

        key.user = owner.to_string();
        key.nonce = hex::encode(nonce);
        key.issued_at = issued_at;
        key.signature = signature(&secret, key);
        Ok(())
    }
}

fn signature(secret: &[u8], key: &SessionKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret);
    hasher.update([0]);
    hasher.update(key.user.as_bytes());
    hasher.update([0]);
    hasher.update(key.nonce.as_bytes());
    hasher.update([0]);
    hasher.update(key.issued_at.to_string().as_bytes());
    hex::encode(hasher.finalize())
}
