//! API 请求/响应类型与全局常量。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use hb_shared_protocol::CommandBundle;

/// 管理员登录请求。
#[derive(Debug, Deserialize)]
pub(crate) struct LoginRequest {
    pub(crate) username: String,
    pub(crate) totp_code: String,
}

/// 登录成功返回。
#[derive(Debug, Serialize)]
pub(crate) struct SessionTokenData {
    pub(crate) access_token: String,
    /// 固定为 `bearer`。
    pub(crate) token_type: &'static str,
}

/// 会话令牌 claims。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SessionClaims {
    /// 管理员用户名；缺失时令牌视为格式错误。
    #[serde(default)]
    pub(crate) sub: Option<String>,
    pub(crate) iat: u64,
    pub(crate) exp: u64,
}

/// 当前会话主体。
#[derive(Debug, Serialize)]
pub(crate) struct WhoAmIData {
    pub(crate) username: String,
}

/// 下发命令请求。
#[derive(Debug, Deserialize)]
pub(crate) struct CommandRequest {
    pub(crate) command: String,
    #[serde(default)]
    pub(crate) payload: Value,
}

/// 下发命令返回。
#[derive(Debug, Serialize)]
pub(crate) struct CommandQueuedData {
    /// 固定为 `command_queued`。
    pub(crate) status: &'static str,
    pub(crate) command_bundle: CommandBundle,
}

/// 外部来源 nonce 校验请求（如设备回显的命令）。
#[derive(Debug, Deserialize)]
pub(crate) struct NonceValidateRequest {
    pub(crate) network_id: u64,
    pub(crate) nonce: String,
    pub(crate) timestamp: i64,
}

/// nonce 校验通过返回。
#[derive(Debug, Serialize)]
pub(crate) struct NonceValidateData {
    /// 固定为 `accepted`。
    pub(crate) status: &'static str,
}

/// 终端高亮样式：重置。
pub(crate) const ANSI_RESET: &str = "\x1b[0m";
/// 终端高亮样式：粗体。
pub(crate) const ANSI_BOLD: &str = "\x1b[1m";
/// 终端高亮样式：青色。
pub(crate) const ANSI_CYAN: &str = "\x1b[36m";
/// 终端高亮样式：亮白。
pub(crate) const ANSI_WHITE: &str = "\x1b[97m";

/// 管理员会话有效期（秒）。
pub(crate) const SESSION_TOKEN_TTL_SEC: u64 = 15 * 60;
/// 命令/nonce 时间戳允许偏差（秒）。
pub(crate) const NONCE_MAX_SKEW_SEC: i64 = hb_shared_protocol::COMMAND_TIMESTAMP_WINDOW_SEC;
/// nonce 默认保留时长（分钟），须大于时间窗。
pub(crate) const DEFAULT_NONCE_MAX_AGE_MIN: u64 = 10;
/// TOTP 时间步长（秒）。
pub(crate) const TOTP_STEP_SEC: u64 = 30;
/// TOTP 验证码位数。
pub(crate) const TOTP_DIGITS: u32 = 6;
/// TOTP 前后容忍步数。
pub(crate) const TOTP_SKEW_STEPS: i64 = 1;
/// 验证器中展示的签发方名称。
pub(crate) const TOTP_ISSUER: &str = "HomeBase";
