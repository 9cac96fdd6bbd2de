//! API 错误定义与响应转换。

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::WWW_AUTHENTICATE},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::errors::{AuthError, ConfigError, CoreError, ReplayError, SignatureError};

/// 失败响应体。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ErrorEnvelope {
    pub(crate) ok: bool,
    pub(crate) code: String,
    pub(crate) message: String,
    pub(crate) suggestion: String,
}

/// 接口错误。
#[derive(Debug)]
pub(crate) struct ApiError {
    pub(crate) status: StatusCode,
    pub(crate) code: &'static str,
    pub(crate) message: String,
    pub(crate) suggestion: &'static str,
    /// 是否附带 `WWW-Authenticate: Bearer`。
    pub(crate) bearer_challenge: bool,
}

impl ApiError {
    /// 构造统一 API 错误。
    pub(crate) fn new(
        status: StatusCode,
        code: &'static str,
        message: impl Into<String>,
        suggestion: &'static str,
    ) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            suggestion,
            bearer_challenge: false,
        }
    }

    fn with_bearer_challenge(mut self) -> Self {
        self.bearer_challenge = true;
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorEnvelope {
            ok: false,
            code: self.code.to_string(),
            message: self.message,
            suggestion: self.suggestion.to_string(),
        });
        let mut response = (self.status, body).into_response();
        if self.bearer_challenge {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => ApiError::new(
                StatusCode::BAD_REQUEST,
                "INVALID_CREDENTIALS",
                "用户名或验证码错误",
                "请核对用户名与验证器中的当前验证码",
            ),
            AuthError::InvalidOrExpiredToken => ApiError::new(
                StatusCode::UNAUTHORIZED,
                "TOKEN_INVALID",
                "会话令牌无效或已过期",
                "请重新登录",
            )
            .with_bearer_challenge(),
            AuthError::MalformedToken => ApiError::new(
                StatusCode::UNAUTHORIZED,
                "TOKEN_MALFORMED",
                "会话令牌缺少用户信息",
                "请重新登录",
            )
            .with_bearer_challenge(),
            AuthError::MissingAuthHeader => ApiError::new(
                StatusCode::UNAUTHORIZED,
                "MISSING_CREDENTIALS",
                "缺少 Authorization 头",
                "请先登录后携带 Bearer 令牌访问",
            )
            .with_bearer_challenge(),
            AuthError::MalformedAuthHeader => ApiError::new(
                StatusCode::UNAUTHORIZED,
                "AUTH_HEADER_MALFORMED",
                "Authorization 格式应为 Bearer <token>",
                "请检查请求头格式",
            )
            .with_bearer_challenge(),
        }
    }
}

impl From<SignatureError> for ApiError {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::UnknownSigner => ApiError::new(
                StatusCode::NOT_FOUND,
                "SIGNER_NOT_FOUND",
                "网络或设备未注册",
                "请先完成网络/设备注册",
            ),
            SignatureError::BadSignature => ApiError::new(
                StatusCode::UNAUTHORIZED,
                "SIGNATURE_INVALID",
                "签名校验失败",
                "请检查设备密钥",
            ),
        }
    }
}

impl From<ReplayError> for ApiError {
    fn from(err: ReplayError) -> Self {
        match err {
            ReplayError::StaleTimestamp => ApiError::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "TIMESTAMP_STALE",
                "时间戳超出允许窗口",
                "请校准设备时钟后重新签发",
            ),
            ReplayError::DuplicateNonce => ApiError::new(
                StatusCode::CONFLICT,
                "NONCE_REPLAYED",
                "nonce 已被使用",
                "请重新签发命令",
            ),
            ReplayError::MalformedNonce => ApiError::new(
                StatusCode::BAD_REQUEST,
                "NONCE_MALFORMED",
                "nonce 不能为空",
                "请携带命令包中的原始 nonce",
            ),
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::MissingSigningKey { network_id } => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "SIGNING_KEY_MISSING",
                format!("网络 {network_id} 缺少签名密钥"),
                "请检查网络开通流程并重新生成密钥",
            ),
            ConfigError::CorruptKeyMaterial { owner } => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "KEY_MATERIAL_CORRUPT",
                format!("{owner} 的密钥数据损坏"),
                "请检查注册表文件中的密钥编码",
            ),
            ConfigError::StoreUnavailable => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "NONCE_STORE_UNAVAILABLE",
                "nonce 存储暂不可用",
                "请稍后重试",
            ),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Auth(err) => err.into(),
            CoreError::Signature(err) => err.into(),
            CoreError::Replay(err) => err.into(),
            CoreError::Config(err) => err.into(),
        }
    }
}
