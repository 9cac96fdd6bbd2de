//! 命令 HTTP 接口处理：先鉴权，再签名或校验。

use axum::{
    Json,
    extract::{Path, State},
};
use tracing::info;

use crate::{
    api::{
        error::ApiError,
        types::{CommandQueuedData, CommandRequest, NonceValidateData, NonceValidateRequest},
    },
    auth::session::AdminPrincipal,
    state::AppState,
};

/// 签发命令包，交由推送通道下发。
pub(crate) async fn command_handler(
    principal: AdminPrincipal,
    State(state): State<AppState>,
    Path(network_id): Path<u64>,
    Json(req): Json<CommandRequest>,
) -> Result<Json<CommandQueuedData>, ApiError> {
    let command_bundle = state
        .signer
        .sign(network_id, &req.command, req.payload)
        .await?;
    info!(
        admin = %principal.username,
        network_id,
        command = %command_bundle.command,
        "command queued"
    );
    Ok(Json(CommandQueuedData {
        status: "command_queued",
        command_bundle,
    }))
}

/// 校验外部回显的 nonce。
pub(crate) async fn nonce_validate_handler(
    _admin: AdminPrincipal,
    State(state): State<AppState>,
    Json(req): Json<NonceValidateRequest>,
) -> Result<Json<NonceValidateData>, ApiError> {
    state
        .nonces
        .validate_incoming(req.network_id, &req.nonce, req.timestamp)
        .await?;
    Ok(Json(NonceValidateData { status: "accepted" }))
}
