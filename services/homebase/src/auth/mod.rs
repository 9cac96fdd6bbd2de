//! 鉴权模块：TOTP、会话令牌、Bearer 鉴权与接口处理。

pub(crate) mod gate;
pub(crate) mod handlers;
pub(crate) mod session;
pub(crate) mod totp;
