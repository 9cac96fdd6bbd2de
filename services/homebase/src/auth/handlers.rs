//! 管理员会话 HTTP 接口处理。

use axum::{Json, extract::State};

use crate::{
    api::{
        error::ApiError,
        types::{LoginRequest, SessionTokenData, WhoAmIData},
    },
    auth::session::AdminPrincipal,
    state::AppState,
};

/// 登录接口：TOTP 换取会话令牌。
pub(crate) async fn session_handler(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<SessionTokenData>, ApiError> {
    let access_token = state.sessions.login(&req.username, &req.totp_code).await?;
    Ok(Json(SessionTokenData {
        access_token,
        token_type: "bearer",
    }))
}

/// 当前会话主体。
pub(crate) async fn whoami_handler(
    principal: AdminPrincipal,
) -> Result<Json<WhoAmIData>, ApiError> {
    Ok(Json(WhoAmIData {
        username: principal.username,
    }))
}
