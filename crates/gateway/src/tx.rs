//! 未签名购买交易
//!
//! 只组装调用数据供外部钱包签名，本服务从不签名或广播交易。

use serde::Serialize;
use sha3::{Digest, Keccak256};

/// 未签名交易
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseTx {
    pub to: String,
    /// `0x` + 选择器 + 参数
    pub data: String,
    /// 以最小货币单位计的金额，十六进制
    pub value: String,
}

/// 函数选择器：签名 Keccak-256 的前 4 字节
pub fn function_selector(signature: &str) -> [u8; 4] {
    let digest = Keccak256::digest(signature.as_bytes());
    let mut selector = [0u8; 4];
    selector.copy_from_slice(&digest[..4]);
    selector
}

/// 按 ABI 规则编码：选择器后跟 32 字节大端参数字
pub fn encode_call(signature: &str, args: &[u128]) -> String {
    let mut data = Vec::with_capacity(4 + 32 * args.len());
    data.extend_from_slice(&function_selector(signature));
    for arg in args {
        let mut word = [0u8; 32];
        word[16..].copy_from_slice(&arg.to_be_bytes());
        data.extend_from_slice(&word);
    }
    format!("0x{}", hex::encode(data))
}

pub fn build_purchase_tx(
    contract: &str,
    signature: &str,
    tier: u8,
    duration_id: u8,
    price_minor_units: u128,
) -> PurchaseTx {
    PurchaseTx {
        to: contract.to_string(),
        data: encode_call(signature, &[u128::from(tier), u128::from(duration_id)]),
        value: format!("0x{price_minor_units:x}"),
    }
}
