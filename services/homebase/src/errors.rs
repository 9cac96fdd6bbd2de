//! 领域错误分类：鉴权、签名、重放、配置四类。
//!
//! 预期内的否定结果（签名不符、验证码错误、重放）都以错误值返回，
//! 只有配置类错误代表部署缺陷，需要运维介入。

use std::fmt;

/// 鉴权失败。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AuthError {
    /// 用户不存在或验证码错误，两者对外不可区分。
    InvalidCredentials,
    InvalidOrExpiredToken,
    /// 签名有效但缺少主体。
    MalformedToken,
    MissingAuthHeader,
    MalformedAuthHeader,
}

/// 签名校验失败。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SignatureError {
    /// 设备或网络未注册。
    UnknownSigner,
    BadSignature,
}

/// 重放防护拒绝。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReplayError {
    StaleTimestamp,
    DuplicateNonce,
    /// nonce 为空，无法登记。
    MalformedNonce,
}

/// 配置/存储错误：不可重试，不得降级为签名失败。
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ConfigError {
    MissingSigningKey { network_id: u64 },
    CorruptKeyMaterial { owner: String },
    /// nonce 存储超时或不可用；不能据此判定“未重放”。
    StoreUnavailable,
}

/// 核心链路统一错误。
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CoreError {
    Auth(AuthError),
    Signature(SignatureError),
    Replay(ReplayError),
    Config(ConfigError),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCredentials => write!(f, "invalid credentials"),
            Self::InvalidOrExpiredToken => write!(f, "invalid or expired token"),
            Self::MalformedToken => write!(f, "token payload has no subject"),
            Self::MissingAuthHeader => write!(f, "authorization header missing"),
            Self::MalformedAuthHeader => write!(f, "authorization header is not `Bearer <token>`"),
        }
    }
}

impl fmt::Display for SignatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownSigner => write!(f, "signer not registered"),
            Self::BadSignature => write!(f, "signature verification failed"),
        }
    }
}

impl fmt::Display for ReplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StaleTimestamp => write!(f, "timestamp outside the acceptance window"),
            Self::DuplicateNonce => write!(f, "nonce already used"),
            Self::MalformedNonce => write!(f, "nonce is empty"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSigningKey { network_id } => {
                write!(f, "network {network_id} has no signing key on file")
            }
            Self::CorruptKeyMaterial { owner } => write!(f, "key material for {owner} is corrupt"),
            Self::StoreUnavailable => write!(f, "nonce store unavailable"),
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auth(err) => err.fmt(f),
            Self::Signature(err) => err.fmt(f),
            Self::Replay(err) => err.fmt(f),
            Self::Config(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for AuthError {}
impl std::error::Error for SignatureError {}
impl std::error::Error for ReplayError {}
impl std::error::Error for ConfigError {}
impl std::error::Error for CoreError {}

impl From<AuthError> for CoreError {
    fn from(err: AuthError) -> Self {
        Self::Auth(err)
    }
}

impl From<SignatureError> for CoreError {
    fn from(err: SignatureError) -> Self {
        Self::Signature(err)
    }
}

impl From<ReplayError> for CoreError {
    fn from(err: ReplayError) -> Self {
        Self::Replay(err)
    }
}

impl From<ConfigError> for CoreError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}
