//! nonce 记录集合：单写锁下的“不存在才插入”，可选 JSONL 追加日志落盘。
//!
//! 日志写入在释放记录锁之后进行；清理时把日志压缩为存活记录。

use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::{
    io::AsyncWriteExt,
    sync::{Mutex, MutexGuard, RwLock, RwLockWriteGuard},
};
use tracing::{debug, warn};

use crate::errors::ConfigError;

/// 已消费 nonce。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NonceRecord {
    pub(crate) nonce: String,
    /// 记录时间（unix 秒）。
    pub(crate) issued_at: i64,
    pub(crate) network_id: u64,
}

/// 追加日志：文件路径与写入串行锁。
struct Journal {
    path: PathBuf,
    write_lock: Mutex<()>,
}

/// nonce 存储。
pub(crate) struct NonceStore {
    pub(super) records: RwLock<HashMap<String, NonceRecord>>,
    journal: Option<Journal>,
    lock_timeout: Duration,
}

impl NonceStore {
    /// 纯内存存储。
    pub(crate) fn in_memory(lock_timeout: Duration) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            journal: None,
            lock_timeout,
        }
    }

    /// 带日志的存储；已有日志会被重放，保证重启后窗口内的 nonce 仍被拒绝。
    pub(crate) fn open(path: PathBuf, lock_timeout: Duration) -> Result<Self, String> {
        let records = load_journal(&path)?;
        Ok(Self {
            records: RwLock::new(records),
            journal: Some(Journal {
                path,
                write_lock: Mutex::new(()),
            }),
            lock_timeout,
        })
    }

    /// 原子地插入 nonce；已存在返回 `false`。
    pub(crate) async fn insert_if_absent(&self, record: NonceRecord) -> Result<bool, ConfigError> {
        {
            let mut guard = self.lock_for_write().await?;
            if guard.contains_key(&record.nonce) {
                return Ok(false);
            }
            guard.insert(record.nonce.clone(), record.clone());
        }
        self.append(&record).await;
        Ok(true)
    }

    /// 删除 `issued_at` 早于 `cutoff` 的记录，返回删除条数。
    pub(crate) async fn purge_older_than(&self, cutoff: i64) -> Result<usize, ConfigError> {
        // 先占日志锁：压缩期间不会有追加写穿插进来。
        let _journal = match &self.journal {
            Some(journal) => Some(self.lock_journal(journal).await?),
            None => None,
        };
        let (removed, survivors) = {
            let mut guard = self.lock_for_write().await?;
            let before = guard.len();
            guard.retain(|_, record| record.issued_at >= cutoff);
            let removed = before - guard.len();
            let survivors = (removed > 0 && self.journal.is_some())
                .then(|| guard.values().cloned().collect::<Vec<_>>());
            (removed, survivors)
        };
        if let (Some(journal), Some(survivors)) = (&self.journal, survivors) {
            match compact_journal(&journal.path, &survivors).await {
                Ok(()) => debug!(kept = survivors.len(), "nonce journal compacted"),
                Err(err) => warn!("compact nonce journal failed: {err}"),
            }
        }
        Ok(removed)
    }

    /// 当前记录数。
    pub(crate) async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// 拿写锁；超时视为存储不可用，而不是“未见过”。
    async fn lock_for_write(
        &self,
    ) -> Result<RwLockWriteGuard<'_, HashMap<String, NonceRecord>>, ConfigError> {
        tokio::time::timeout(self.lock_timeout, self.records.write())
            .await
            .map_err(|_| ConfigError::StoreUnavailable)
    }

    async fn lock_journal<'a>(
        &self,
        journal: &'a Journal,
    ) -> Result<MutexGuard<'a, ()>, ConfigError> {
        tokio::time::timeout(self.lock_timeout, journal.write_lock.lock())
            .await
            .map_err(|_| ConfigError::StoreUnavailable)
    }

    async fn append(&self, record: &NonceRecord) {
        let Some(journal) = &self.journal else {
            return;
        };
        let mut line = match serde_json::to_vec(record) {
            Ok(line) => line,
            Err(err) => {
                warn!("encode nonce record failed: {err}");
                return;
            }
        };
        line.push(b'\n');
        let _serial = journal.write_lock.lock().await;
        if let Err(err) = append_line(&journal.path, &line).await {
            warn!("append nonce journal failed: {err}");
        }
    }
}

fn load_journal(path: &Path) -> Result<HashMap<String, NonceRecord>, String> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|err| format!("read nonce journal failed: {err}"))?;
    let mut records = HashMap::new();
    for (index, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<NonceRecord>(line) {
            Ok(record) => {
                records.insert(record.nonce.clone(), record);
            }
            // 崩溃可能留下半行，跳过即可。
            Err(err) => warn!(line = index + 1, "skip bad nonce journal line: {err}"),
        }
    }
    Ok(records)
}

fn private_options() -> tokio::fs::OpenOptions {
    let mut options = tokio::fs::OpenOptions::new();
    options.create(true).write(true);
    #[cfg(unix)]
    {
        options.mode(0o600);
    }
    options
}

async fn append_line(path: &Path, line: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = private_options().append(true).open(path).await?;
    file.write_all(line).await?;
    file.flush().await
}

async fn compact_journal(path: &Path, survivors: &[NonceRecord]) -> io::Result<()> {
    let mut encoded = Vec::new();
    for record in survivors {
        serde_json::to_writer(&mut encoded, record)?;
        encoded.push(b'\n');
    }
    let tmp = path.with_extension("jsonl.tmp");
    let mut file = private_options().truncate(true).open(&tmp).await?;
    file.write_all(&encoded).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(&tmp, path).await
}
