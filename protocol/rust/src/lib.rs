// 文件职责：
// 1) 定义 home base / 设备 / 管理端共用的线上数据结构（命令包、遥测日志）。
// 2) 提供签名原文的规范化拼装（遥测与命令两种格式），两端必须逐字节一致。
// 3) 作为 Rust 侧协议唯一代码源，供 home base 服务与设备工具复用。

use std::fmt::Write as _;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 命令时间戳允许的最大偏差（秒）。
pub const COMMAND_TIMESTAMP_WINDOW_SEC: i64 = 300;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandBundle {
    // 目标网络 ID。
    pub network_id: u64,
    // 命令名称。
    pub command: String,
    // 命令负载（任意 JSON）。
    pub payload: Value,
    // 签发时间（unix 秒）。
    pub timestamp: i64,
    // 一次性 nonce（32 位小写 hex）。
    pub nonce: String,
    // Ed25519 签名（128 位小写 hex）。
    pub signature: String,
}

impl CommandBundle {
    /// 还原该命令包的签名原文，设备侧据此校验签名。
    pub fn signed_message(&self) -> String {
        command_message(
            self.timestamp,
            &self.command,
            &canonical_json(&self.payload),
            &self.nonce,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEntry {
    // 上报设备 ID。
    pub device_id: String,
    // 设备侧时间戳（秒，可带小数，签名时截断为整数）。
    pub timestamp: f64,
    // 日志级别。
    pub level: String,
    // 日志类别。
    pub category: String,
    // 日志正文。
    pub message: String,
    // 设备私钥对签名原文的 Ed25519 签名（hex）。
    pub signature: String,
}

impl TelemetryEntry {
    /// 还原该条遥测的签名原文。
    pub fn signed_message(&self) -> String {
        telemetry_message(telemetry_timestamp_secs(self.timestamp), &self.message)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TelemetryBatch {
    // 批量日志条目。
    pub logs: Vec<TelemetryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct IngestSummary {
    // 固定为 `ok`。
    pub status: String,
    // 校验通过并入库的条数。
    pub ingested: usize,
    // 被拒绝的条数。
    pub errors: usize,
}

/// 遥测签名原文：`{timestamp}:{message}`。
pub fn telemetry_message(timestamp: i64, message: &str) -> String {
    format!("{timestamp}:{message}")
}

/// 命令签名原文：`{timestamp}:{command}:{json_payload}:{nonce}`。
pub fn command_message(timestamp: i64, command: &str, json_payload: &str, nonce: &str) -> String {
    format!("{timestamp}:{command}:{json_payload}:{nonce}")
}

/// 设备固件使用 `uint32_t` 秒，遥测时间戳按截断取整。
pub fn telemetry_timestamp_secs(raw: f64) -> i64 {
    raw.trunc() as i64
}

/// 规范化 JSON：紧凑输出，每一层对象的 key 均按字典序排列。
///
/// 不依赖 `serde_json` 的 map 实现，即使依赖图里开启了 `preserve_order`
/// 输出也保持稳定。
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(&mut out, value);
    out
}

fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => {
            let mut keys = map.keys().collect::<Vec<_>>();
            keys.sort();
            out.push('{');
            for (idx, key) in keys.into_iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                let _ = write!(out, "{}", Value::String(key.clone()));
                out.push(':');
                if let Some(item) = map.get(key) {
                    write_canonical(out, item);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        scalar => {
            let _ = write!(out, "{scalar}");
        }
    }
}

/// 当前 unix 秒。
pub fn unix_now_secs() -> i64 {
    Utc::now().timestamp()
}

/// 生成纳秒精度 UTC 时间戳（RFC3339）。
pub fn now_rfc3339_nanos() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)
}
