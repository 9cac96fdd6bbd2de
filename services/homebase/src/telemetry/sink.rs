//! 遥测落盘：验签通过的条目按 JSON Lines 追加写入。

use std::{path::PathBuf, sync::Arc};

use serde::Serialize;
use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::Mutex};
use tracing::debug;

use crate::telemetry::VerifiedEntry;

/// 单行遥测记录。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TelemetryLine<'a> {
    received_at: String,
    network_id: u64,
    device_id: &'a str,
    timestamp: f64,
    level: &'a str,
    category: &'a str,
    message: &'a str,
}

/// 遥测写入端；未配置路径时只写日志。
#[derive(Clone)]
pub(crate) struct TelemetrySink {
    path: Option<Arc<PathBuf>>,
    write_lock: Arc<Mutex<()>>,
}

impl TelemetrySink {
    pub(crate) fn new(path: Option<PathBuf>) -> Self {
        Self {
            path: path.map(Arc::new),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// 追加一批条目；同一批次的行保持连续。
    pub(crate) async fn append(&self, entries: &[VerifiedEntry]) -> Result<(), String> {
        if entries.is_empty() {
            return Ok(());
        }
        let received_at = hb_shared_protocol::now_rfc3339_nanos();
        let mut buffer = Vec::new();
        for item in entries {
            debug!(
                device_id = %item.entry.device_id,
                network_id = item.network_id,
                level = %item.entry.level,
                category = %item.entry.category,
                "telemetry: {}",
                item.entry.message
            );
            let line = TelemetryLine {
                received_at: received_at.clone(),
                network_id: item.network_id,
                device_id: &item.entry.device_id,
                timestamp: item.entry.timestamp,
                level: &item.entry.level,
                category: &item.entry.category,
                message: &item.entry.message,
            };
            serde_json::to_writer(&mut buffer, &line)
                .map_err(|err| format!("encode telemetry line failed: {err}"))?;
            buffer.push(b'\n');
        }

        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        let _guard = self.write_lock.lock().await;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| format!("create telemetry dir failed: {err}"))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|err| format!("open telemetry file failed: {err}"))?;
        file.write_all(&buffer)
            .await
            .map_err(|err| format!("write telemetry file failed: {err}"))?;
        file.flush()
            .await
            .map_err(|err| format!("flush telemetry file failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use hb_shared_protocol::TelemetryEntry;

    use super::*;

    fn verified(message: &str) -> VerifiedEntry {
        VerifiedEntry {
            network_id: 3,
            entry: TelemetryEntry {
                device_id: "D1".to_string(),
                timestamp: 1_700_000_000.5,
                level: "WARN".to_string(),
                category: "battery".to_string(),
                message: message.to_string(),
                signature: "ff".repeat(64),
            },
        }
    }

    #[tokio::test]
    async fn batches_append_as_json_lines() {
        let dir = std::env::temp_dir().join(format!("hb-telemetry-{}", uuid::Uuid::new_v4().simple()));
        let path = dir.join("telemetry.jsonl");
        let sink = TelemetrySink::new(Some(path.clone()));

        sink.append(&[verified("low"), verified("lower")]).await.unwrap();
        sink.append(&[verified("critical")]).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let lines = raw.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 3);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["deviceId"], "D1");
        assert_eq!(first["networkId"], 3);
        assert_eq!(first["message"], "low");
        assert!(first.get("signature").is_none());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn sink_without_path_accepts_silently() {
        let sink = TelemetrySink::new(None);
        assert!(sink.append(&[verified("x")]).await.is_ok());
    }
}
