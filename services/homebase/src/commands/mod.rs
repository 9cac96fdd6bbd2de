//! 命令下发与外部 nonce 校验接口。

pub(crate) mod handlers;
