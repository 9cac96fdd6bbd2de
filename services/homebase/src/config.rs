//! 配置模块职责：
//! 1. 读取 home base 运行所需的环境变量并提供默认值。
//! 2. 解析数据目录、注册表、nonce 日志与遥测落盘路径。
//! 3. 提供时长/整数解析等通用能力。

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use anyhow::Context;

use crate::{api::types::DEFAULT_NONCE_MAX_AGE_MIN, registry::store::registry_path};

/// 默认监听地址。
pub(crate) const DEFAULT_ADDR: &str = "0.0.0.0:18090";
/// 默认 nonce 清理周期（秒）。
const DEFAULT_NONCE_CLEANUP_INTERVAL_SEC: u64 = 60;
/// 默认 nonce 存储加锁超时（毫秒）。
const DEFAULT_STORE_TIMEOUT_MS: u64 = 2000;
/// 表示“不落盘”的路径取值。
const IN_MEMORY_MARKER: &str = "-";

/// Home base 运行时配置。
#[derive(Debug, Clone)]
pub(crate) struct Config {
    /// HTTP 监听地址。
    pub(crate) addr: SocketAddr,
    /// 数据目录。
    pub(crate) data_dir: PathBuf,
    /// 注册表文件。
    pub(crate) registry_path: PathBuf,
    /// nonce 日志文件（JSONL）；`None` 表示仅内存。
    pub(crate) nonce_store_path: Option<PathBuf>,
    /// 显式指定的会话签名密钥。
    pub(crate) session_secret: Option<String>,
    pub(crate) nonce_cleanup_interval: Duration,
    pub(crate) nonce_max_age_min: u64,
    /// nonce 存储加锁超时。
    pub(crate) store_timeout: Duration,
    /// 遥测 JSONL 文件；`None` 表示只写日志。
    pub(crate) telemetry_path: Option<PathBuf>,
}

impl Config {
    /// 从环境变量构建配置。
    pub(crate) fn from_env() -> anyhow::Result<Self> {
        let raw_addr = env_or_default("HB_ADDR", DEFAULT_ADDR);
        let addr = SocketAddr::from_str(raw_addr.trim())
            .with_context(|| format!("invalid HB_ADDR: {raw_addr}"))?;

        let data_dir = std::env::var("HB_DATA_DIR")
            .ok()
            .map(|raw| raw.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);
        let registry_path = registry_path(&data_dir);
        let nonce_store_path = optional_path(
            std::env::var("HB_NONCE_STORE_PATH").ok(),
            data_dir.join("nonces.jsonl"),
        );
        let telemetry_path = optional_path(
            std::env::var("HB_TELEMETRY_PATH").ok(),
            data_dir.join("telemetry.jsonl"),
        );
        let session_secret = std::env::var("HB_SESSION_SECRET")
            .ok()
            .map(|raw| raw.trim().to_string())
            .filter(|value| !value.is_empty());

        Ok(Self {
            addr,
            registry_path,
            nonce_store_path,
            session_secret,
            nonce_cleanup_interval: duration_from_env(
                "HB_NONCE_CLEANUP_INTERVAL_SEC",
                DEFAULT_NONCE_CLEANUP_INTERVAL_SEC,
            ),
            nonce_max_age_min: u64_from_env("HB_NONCE_MAX_AGE_MIN", DEFAULT_NONCE_MAX_AGE_MIN),
            store_timeout: duration_from_env_millis(
                "HB_STORE_TIMEOUT_MS",
                DEFAULT_STORE_TIMEOUT_MS,
            ),
            telemetry_path,
            data_dir,
        })
    }
}

/// 默认数据目录：`~/.config/homebase`，无 HOME 时回退当前目录。
fn default_data_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".config").join("homebase")
}

/// 可关闭的路径配置：未设置取默认值，`-` 或空串表示不落盘。
fn optional_path(raw: Option<String>, fallback: PathBuf) -> Option<PathBuf> {
    match raw {
        None => Some(fallback),
        Some(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed == IN_MEMORY_MARKER {
                None
            } else {
                Some(PathBuf::from(trimmed))
            }
        }
    }
}

fn env_or_default(key: &str, fallback: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| fallback.to_string())
}

/// 读取秒级时长配置，非法值回退到默认秒数。
fn duration_from_env(key: &str, fallback_sec: u64) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(fallback_sec))
}

/// 读取毫秒级时长配置，非法值回退到默认毫秒数。
fn duration_from_env_millis(key: &str, fallback_ms: u64) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
        .map(Duration::from_millis)
        .unwrap_or_else(|| Duration::from_millis(fallback_ms))
}

fn u64_from_env(key: &str, fallback: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_path_defaults_and_opt_out() {
        let fallback = PathBuf::from("/data/nonces.jsonl");
        assert_eq!(optional_path(None, fallback.clone()), Some(fallback.clone()));
        assert_eq!(optional_path(Some("-".to_string()), fallback.clone()), None);
        assert_eq!(optional_path(Some("  ".to_string()), fallback.clone()), None);
        assert_eq!(
            optional_path(Some(" /tmp/n.json ".to_string()), fallback),
            Some(PathBuf::from("/tmp/n.json"))
        );
    }

    #[test]
    fn unset_numeric_env_falls_back() {
        assert_eq!(
            duration_from_env("HB_TEST_UNSET_INTERVAL", 60),
            Duration::from_secs(60)
        );
        assert_eq!(
            duration_from_env_millis("HB_TEST_UNSET_TIMEOUT", 2000),
            Duration::from_millis(2000)
        );
        assert_eq!(u64_from_env("HB_TEST_UNSET_AGE", 10), 10);
    }
}
