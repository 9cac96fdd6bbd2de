//! 受保护接口的 Bearer 鉴权。

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use tracing::debug;

use crate::{
    api::error::ApiError, auth::session::AdminPrincipal, errors::AuthError, state::AppState,
};

/// 解析 `Authorization` 头，返回令牌本体。
///
/// 方案名不区分大小写，其后必须恰好跟一个令牌。
pub(crate) fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let raw = header.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Err(AuthError::MissingAuthHeader);
    }
    let mut parts = raw.split_whitespace();
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() || parts.next().is_some() {
        return Err(AuthError::MalformedAuthHeader);
    }
    Ok(token)
}

impl AppState {
    /// 校验请求头中的管理员会话。
    pub(crate) fn authorize_admin(&self, headers: &HeaderMap) -> Result<AdminPrincipal, AuthError> {
        let header = match headers.get(AUTHORIZATION) {
            None => None,
            Some(value) => Some(value.to_str().map_err(|_| AuthError::MalformedAuthHeader)?),
        };
        let token = bearer_token(header)?;
        self.sessions.validate(token).inspect_err(|err| {
            debug!("bearer token rejected: {err}");
        })
    }
}

/// 作为提取器使用时须排在 `Json` 之前：请求体在鉴权通过后才会被读取。
impl FromRequestParts<AppState> for AdminPrincipal {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        Ok(state.authorize_admin(&parts.headers)?)
    }
}
