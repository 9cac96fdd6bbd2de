//! 密钥生成与 hex 编解码。

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;

use crate::errors::ConfigError;

/// 生成网络密钥对，返回 `(私钥种子 hex, 公钥 hex)`。
pub(crate) fn generate_keypair_hex() -> (String, String) {
    let signing_key = SigningKey::generate(&mut OsRng);
    let public_hex = hex::encode(signing_key.verifying_key().to_bytes());
    (hex::encode(signing_key.to_bytes()), public_hex)
}

/// 解析 32 字节私钥种子。
pub(crate) fn decode_signing_key(raw_hex: &str, owner: &str) -> Result<SigningKey, ConfigError> {
    let seed: [u8; 32] = decode_fixed(raw_hex).ok_or_else(|| corrupt(owner))?;
    Ok(SigningKey::from_bytes(&seed))
}

/// 解析 32 字节公钥；非曲线点同样视为损坏。
pub(crate) fn decode_verifying_key(
    raw_hex: &str,
    owner: &str,
) -> Result<VerifyingKey, ConfigError> {
    let bytes: [u8; 32] = decode_fixed(raw_hex).ok_or_else(|| corrupt(owner))?;
    VerifyingKey::from_bytes(&bytes).map_err(|_| corrupt(owner))
}

fn decode_fixed<const N: usize>(raw_hex: &str) -> Option<[u8; N]> {
    let raw = hex::decode(raw_hex.trim()).ok()?;
    raw.try_into().ok()
}

fn corrupt(owner: &str) -> ConfigError {
    ConfigError::CorruptKeyMaterial {
        owner: owner.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_pair_round_trips_through_hex() {
        let (seed_hex, public_hex) = generate_keypair_hex();
        assert_eq!(seed_hex.len(), 64);
        assert_eq!(public_hex.len(), 64);

        let signing_key = decode_signing_key(&seed_hex, "network 1").unwrap();
        let verifying_key = decode_verifying_key(&public_hex, "network 1").unwrap();
        assert_eq!(signing_key.verifying_key(), verifying_key);
    }

    #[test]
    fn wrong_length_or_bad_hex_is_corrupt_material() {
        let short = decode_signing_key("abcd", "network 7").unwrap_err();
        assert_eq!(
            short,
            ConfigError::CorruptKeyMaterial {
                owner: "network 7".to_string()
            }
        );
        assert!(decode_verifying_key("zz", "device D1").is_err());
    }
}
