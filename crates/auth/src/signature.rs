//! 钱包签名校验
//!
//! 采用 EIP-191 `personal_sign`：对
//! `"\x19Ethereum Signed Message:\n" + len(message) + message` 做 Keccak-256，
//! 用 secp256k1 从签名恢复公钥，地址为公钥（未压缩，去掉 0x04 前缀）哈希的后 20 字节。
//!
//! 签名格式为 65 字节十六进制 `r || s || v`，`v` 取 0/1 或 27/28。

use crate::error::{AuthError, AuthResult};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use keygate_common::WalletAddress;
use sha3::{Digest, Keccak256};

const SIGNATURE_LEN: usize = 65;

/// personal_sign 消息哈希
pub fn personal_message_hash(message: &str) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(format!("\x19Ethereum Signed Message:\n{}", message.len()).as_bytes());
    hasher.update(message.as_bytes());
    hasher.finalize().into()
}

/// 公钥对应的钱包地址
pub fn address_of(key: &VerifyingKey) -> WalletAddress {
    let point = key.to_encoded_point(false);
    let digest = Keccak256::digest(&point.as_bytes()[1..]);
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&digest[12..]);
    WalletAddress::from_bytes(&bytes)
}

/// 从消息与签名恢复签名者地址
pub fn recover_address(message: &str, signature: &str) -> AuthResult<WalletAddress> {
    let raw = signature.trim();
    let raw = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    let bytes = hex::decode(raw)
        .map_err(|_| AuthError::SignatureInvalid("signature is not hex".to_string()))?;
    if bytes.len() != SIGNATURE_LEN {
        return Err(AuthError::SignatureInvalid(format!(
            "expected {SIGNATURE_LEN} bytes, got {}",
            bytes.len()
        )));
    }

    let v = match bytes[64] {
        v @ (0 | 1) => v,
        v @ (27 | 28) => v - 27,
        v => {
            return Err(AuthError::SignatureInvalid(format!(
                "unsupported recovery byte {v}"
            )));
        }
    };

    let mut sig = Signature::from_slice(&bytes[..64])
        .map_err(|e| AuthError::SignatureInvalid(e.to_string()))?;
    let mut recovery_id = RecoveryId::from_byte(v)
        .ok_or_else(|| AuthError::SignatureInvalid("bad recovery id".to_string()))?;

    // 高 s 值签名先归一化，同时翻转 y 奇偶
    if let Some(normalized) = sig.normalize_s() {
        sig = normalized;
        recovery_id = RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced());
    }

    let hash = personal_message_hash(message);
    let key = VerifyingKey::recover_from_prehash(&hash, &sig, recovery_id)
        .map_err(|e| AuthError::SignatureInvalid(e.to_string()))?;

    Ok(address_of(&key))
}

/// 校验签名者即声明的身份
pub fn verify(message: &str, signature: &str, claimed: &WalletAddress) -> AuthResult<()> {
    let recovered = recover_address(message, signature).map_err(AuthError::record)?;
    if &recovered != claimed {
        return Err(AuthError::SignatureMismatch.record());
    }
    Ok(())
}

/// 以 personal_sign 方式签名，返回 `0x` 开头的 65 字节十六进制（v = 27/28）
///
/// 供运维工具与测试使用；服务本身从不持有私钥。
pub fn sign_personal_message(key: &SigningKey, message: &str) -> AuthResult<String> {
    let hash = personal_message_hash(message);
    let (sig, recovery_id) = key
        .sign_prehash_recoverable(&hash)
        .map_err(|e| AuthError::Internal(format!("signing failed: {e}")))?;

    let mut out = Vec::with_capacity(SIGNATURE_LEN);
    out.extend_from_slice(&sig.to_bytes());
    out.push(recovery_id.to_byte() + 27);
    Ok(format!("0x{}", hex::encode(out)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_known_private_key_address() {
        // 私钥 1 对应的地址是公开的测试向量
        let mut secret = [0u8; 32];
        secret[31] = 1;
        let key = SigningKey::from_bytes(&secret.into()).unwrap();
        assert_eq!(
            address_of(key.verifying_key()).as_str(),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }

    #[test]
    fn test_sign_and_recover() {
        let key = SigningKey::random(&mut OsRng);
        let addr = address_of(key.verifying_key());
        let signature = sign_personal_message(&key, "hello keygate").unwrap();

        assert_eq!(recover_address("hello keygate", &signature).unwrap(), addr);
        verify("hello keygate", &signature, &addr).unwrap();
    }

    #[test]
    fn test_accepts_zero_one_recovery_byte() {
        let key = SigningKey::random(&mut OsRng);
        let addr = address_of(key.verifying_key());
        let signature = sign_personal_message(&key, "msg").unwrap();

        let mut bytes = hex::decode(&signature[2..]).unwrap();
        bytes[64] -= 27;
        assert_eq!(recover_address("msg", &hex::encode(bytes)).unwrap(), addr);
    }

    #[test]
    fn test_other_message_is_mismatch() {
        let key = SigningKey::random(&mut OsRng);
        let addr = address_of(key.verifying_key());
        let signature = sign_personal_message(&key, "original").unwrap();

        assert!(matches!(
            verify("tampered", &signature, &addr),
            Err(AuthError::SignatureMismatch)
        ));
    }

    #[test]
    fn test_malformed_signatures() {
        let addr = WalletAddress::parse("0x7e5f4552091a69125d5dfcb7b8c2659029395bdf").unwrap();
        for bad in ["", "0x1234", "zz", &format!("0x{}", "00".repeat(65))] {
            assert!(
                matches!(verify("m", bad, &addr), Err(AuthError::SignatureInvalid(_))),
                "{bad} should be invalid"
            );
        }

        let mut bytes = vec![1u8; 65];
        bytes[64] = 29;
        assert!(matches!(
            recover_address("m", &hex::encode(bytes)),
            Err(AuthError::SignatureInvalid(_))
        ));
    }
}
