//! 凭证原文与哈希
//!
//! 原文 = 前缀 + base64url(32 字节随机数)，只在签发时返回一次。
//! 存储的是 HMAC-SHA256(服务端盐值, 原文) 的十六进制，无法反推原文。

use crate::error::{AuthError, AuthResult};
use base64::prelude::*;
use hmac::{Hmac, Mac};
use keygate_common::config::SaltSource;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use std::fmt;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

const SECRET_BYTES: usize = 32;
const MIN_SALT_LEN: usize = 16;

/// 凭证原文
///
/// `Debug` 不输出内容，避免进入日志。
#[derive(Clone, PartialEq, Eq)]
pub struct RawSecret(String);

impl RawSecret {
    pub fn generate(prefix: &str) -> Self {
        let mut bytes = [0u8; SECRET_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(format!("{prefix}{}", BASE64_URL_SAFE_NO_PAD.encode(bytes)))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for RawSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RawSecret(<redacted>)")
    }
}

/// 凭证哈希器
#[derive(Clone)]
pub struct SecretHasher {
    mac: HmacSha256,
    salt_len: usize,
}

impl fmt::Debug for SecretHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretHasher")
            .field("salt_len", &self.salt_len)
            .finish()
    }
}

impl SecretHasher {
    pub fn new(salt: impl Into<Vec<u8>>) -> AuthResult<Self> {
        let salt = salt.into();
        if salt.len() < MIN_SALT_LEN {
            return Err(AuthError::Config(format!(
                "secret salt must be at least {MIN_SALT_LEN} bytes, got {}",
                salt.len()
            )));
        }
        let mac = HmacSha256::new_from_slice(&salt)
            .map_err(|e| AuthError::Config(format!("invalid secret salt: {e}")))?;
        Ok(Self {
            mac,
            salt_len: salt.len(),
        })
    }

    pub fn from_source(source: &SaltSource) -> AuthResult<Self> {
        let salt = match source {
            SaltSource::Direct(salt) => {
                debug!("Loading secret salt from direct configuration");
                salt.clone()
            }
            SaltSource::Environment(var) => {
                debug!("Loading secret salt from environment variable: {}", var);
                std::env::var(var).map_err(|e| {
                    AuthError::Config(format!(
                        "Failed to read secret salt from environment variable {var}: {e}"
                    ))
                })?
            }
            SaltSource::File(path) => {
                debug!("Loading secret salt from file: {}", path);
                std::fs::read_to_string(path).map_err(|e| {
                    AuthError::Config(format!("Failed to read secret salt from file {path}: {e}"))
                })?
            }
        };
        Self::new(salt.trim().as_bytes().to_vec())
    }

    /// 十六进制 HMAC-SHA256
    pub fn hash(&self, secret: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(secret.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn hasher() -> SecretHasher {
        SecretHasher::new(b"0123456789abcdef".to_vec()).unwrap()
    }

    #[test]
    fn test_generate_format() {
        let secret = RawSecret::generate("kg_");
        assert!(secret.expose().starts_with("kg_"));
        // 32 字节 base64url 无填充为 43 字符
        assert_eq!(secret.expose().len(), 3 + 43);
        assert_ne!(secret, RawSecret::generate("kg_"));
    }

    #[test]
    fn test_debug_redacted() {
        let secret = RawSecret::generate("kg_");
        let printed = format!("{secret:?}");
        assert!(!printed.contains(secret.expose()));
    }

    #[test]
    fn test_hash_is_deterministic_and_salted() {
        let a = hasher();
        assert_eq!(a.hash("kg_x"), a.hash("kg_x"));
        assert_eq!(a.hash("kg_x").len(), 64);
        assert_ne!(a.hash("kg_x"), a.hash("kg_y"));

        let b = SecretHasher::new(b"fedcba9876543210".to_vec()).unwrap();
        assert_ne!(a.hash("kg_x"), b.hash("kg_x"));
    }

    #[test]
    fn test_short_salt_rejected() {
        assert!(matches!(
            SecretHasher::new(b"short".to_vec()),
            Err(AuthError::Config(_))
        ));
    }

    #[test]
    #[serial]
    fn test_salt_from_env() {
        unsafe {
            std::env::set_var("KEYGATE_TEST_SALT", "  env-salt-0123456789  ");
        }
        let from_env =
            SecretHasher::from_source(&SaltSource::Environment("KEYGATE_TEST_SALT".to_string()))
                .unwrap();
        let direct = SecretHasher::from_source(&SaltSource::Direct("env-salt-0123456789".to_string()))
            .unwrap();
        assert_eq!(from_env.hash("kg_x"), direct.hash("kg_x"));
        unsafe {
            std::env::remove_var("KEYGATE_TEST_SALT");
        }
    }

    #[test]
    fn test_salt_from_file() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "file-salt-0123456789").unwrap();

        let hasher =
            SecretHasher::from_source(&SaltSource::File(file.path().to_string_lossy().to_string()))
                .unwrap();
        let direct = SecretHasher::new(b"file-salt-0123456789".to_vec()).unwrap();
        assert_eq!(hasher.hash("kg_x"), direct.hash("kg_x"));
    }
}
