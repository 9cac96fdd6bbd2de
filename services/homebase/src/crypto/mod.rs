//! Ed25519 密钥编解码、遥测验签与命令签名。

pub(crate) mod keys;
pub(crate) mod signer;
pub(crate) mod verify;
