use argon2::{
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use axum::extract::FromRef;
use rand::rngs::OsRng;
use tracing::error;

use crate::{config::PasswordConfig, state::AppState};

/// Argon2id hasher carrying the configured cost factor. Verification reads
/// the parameters embedded in the stored hash, so raising the cost does not
/// lock out existing users.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    memory_kib: u32,
    iterations: u32,
    parallelism: u32,
}

impl From<&PasswordConfig> for PasswordHasher {
    fn from(cfg: &PasswordConfig) -> Self {
        Self {
            memory_kib: cfg.memory_kib,
            iterations: cfg.iterations,
            parallelism: cfg.parallelism,
        }
    }
}

impl FromRef<AppState> for PasswordHasher {
    fn from_ref(state: &AppState) -> Self {
        Self::from(&state.config.password)
    }
}

impl PasswordHasher {
    fn argon2(&self) -> anyhow::Result<Argon2<'static>> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, None)
            .map_err(|e| anyhow::anyhow!("argon2 params: {e}"))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    pub fn hash(&self, plain: &str) -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()?
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                anyhow::anyhow!(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }

    /// `Ok(false)` on mismatch; `Err` only when the stored hash is unreadable.
    pub fn verify(&self, plain: &str, hash: &str) -> anyhow::Result<bool> {
        let parsed = PasswordHash::new(hash).map_err(|e| {
            error!(error = %e, "argon2 parse hash error");
            anyhow::anyhow!(e.to_string())
        })?;
        match Argon2::default().verify_password(plain.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(anyhow::anyhow!("argon2 verify: {e}")),
        }
    }
}
