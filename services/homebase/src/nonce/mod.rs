//! 重放防护：nonce 签发、外部 nonce 校验与过期清理。

pub(crate) mod guard;
pub(crate) mod store;
