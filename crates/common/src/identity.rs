//! 钱包地址（身份）

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// 地址格式错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("address must start with 0x")]
    MissingPrefix,
    #[error("address must be 40 hex digits, got {0}")]
    InvalidLength(usize),
    #[error("address contains non-hex characters")]
    InvalidHex,
}

/// 规范化后的钱包地址：`0x` + 40 位小写十六进制
///
/// 所有对身份的比较、存储键、数据库列都使用这一形式。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WalletAddress(String);

impl WalletAddress {
    pub fn parse(raw: &str) -> Result<Self, IdentityError> {
        let raw = raw.trim();
        let digits = raw
            .strip_prefix("0x")
            .or_else(|| raw.strip_prefix("0X"))
            .ok_or(IdentityError::MissingPrefix)?;
        if digits.len() != 40 {
            return Err(IdentityError::InvalidLength(digits.len()));
        }
        if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(IdentityError::InvalidHex);
        }
        Ok(Self(format!("0x{}", digits.to_ascii_lowercase())))
    }

    /// 由 20 字节原始地址构造
    pub fn from_bytes(bytes: &[u8; 20]) -> Self {
        Self(format!("0x{}", hex::encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 20 字节原始地址
    pub fn to_bytes(&self) -> [u8; 20] {
        let mut out = [0u8; 20];
        // parse() 已保证 40 位十六进制
        if let Ok(decoded) = hex::decode(&self.0[2..]) {
            out.copy_from_slice(&decoded);
        }
        out
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for WalletAddress {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for WalletAddress {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<WalletAddress> for String {
    fn from(value: WalletAddress) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes_case() {
        let addr = WalletAddress::parse("0xAbCdEf0123456789aBCDef0123456789ABCDEF01").unwrap();
        assert_eq!(addr.as_str(), "0xabcdef0123456789abcdef0123456789abcdef01");
        assert_eq!(
            WalletAddress::parse(" 0XABCDEF0123456789ABCDEF0123456789ABCDEF01 ").unwrap(),
            addr
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(
            WalletAddress::parse("abcdef0123456789abcdef0123456789abcdef01"),
            Err(IdentityError::MissingPrefix)
        );
        assert_eq!(
            WalletAddress::parse("0x1234"),
            Err(IdentityError::InvalidLength(4))
        );
        assert_eq!(
            WalletAddress::parse("0xzzcdef0123456789abcdef0123456789abcdef01"),
            Err(IdentityError::InvalidHex)
        );
    }

    #[test]
    fn test_bytes_round_trip() {
        let addr = WalletAddress::parse("0x00000000000000000000000000000000000000ff").unwrap();
        let bytes = addr.to_bytes();
        assert_eq!(bytes[19], 0xff);
        assert_eq!(WalletAddress::from_bytes(&bytes), addr);
    }

    #[test]
    fn test_serde_validates() {
        let ok: WalletAddress =
            serde_json::from_str("\"0x00000000000000000000000000000000000000AA\"").unwrap();
        assert_eq!(ok.as_str(), "0x00000000000000000000000000000000000000aa");
        assert!(serde_json::from_str::<WalletAddress>("\"nope\"").is_err());
    }
}
