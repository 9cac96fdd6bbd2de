//! 遥测签名校验。

use ed25519_dalek::{Signature, Verifier};

use crate::{crypto::keys::decode_verifying_key, errors::ConfigError};

/// 校验 Ed25519 签名。
///
/// 签名格式错误或与原文不符都返回 `Ok(false)`；
/// 公钥本身无法解析属于注册数据缺陷，返回 `ConfigError`。
pub(crate) fn verify_signature(
    public_key_hex: &str,
    message: &[u8],
    signature_hex: &str,
    owner: &str,
) -> Result<bool, ConfigError> {
    let verifying_key = decode_verifying_key(public_key_hex, owner)?;

    let Ok(sig_raw) = hex::decode(signature_hex.trim()) else {
        return Ok(false);
    };
    let Ok(sig_bytes) = <[u8; 64]>::try_from(sig_raw.as_slice()) else {
        return Ok(false);
    };
    let signature = Signature::from_bytes(&sig_bytes);
    Ok(verifying_key.verify(message, &signature).is_ok())
}
