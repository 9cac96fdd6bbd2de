//! 重放防护：签发 nonce、校验外部 nonce、定期清理。

use std::{sync::Arc, time::Duration};

use rand::{RngCore, rngs::OsRng};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::{
    api::types::NONCE_MAX_SKEW_SEC,
    errors::{ConfigError, CoreError, ReplayError},
    nonce::store::{NonceRecord, NonceStore},
};

/// nonce 随机字节数（hex 后 32 字符）。
const NONCE_BYTES: usize = 16;
/// 生成碰撞时的最大重试次数。
const MAX_RESERVE_ATTEMPTS: usize = 8;

/// 重放防护句柄。
#[derive(Clone)]
pub(crate) struct NonceGuard {
    store: Arc<NonceStore>,
}

impl NonceGuard {
    pub(crate) fn new(store: NonceStore) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    /// 生成并登记一个新 nonce，返回 `(nonce, timestamp)`。
    ///
    /// 生成与登记在同一临界区内完成，不会出现已发出却未登记的 nonce。
    pub(crate) async fn reserve(&self, network_id: u64) -> Result<(String, i64), ConfigError> {
        for _ in 0..MAX_RESERVE_ATTEMPTS {
            let nonce = random_nonce();
            let now = hb_shared_protocol::unix_now_secs();
            let inserted = self
                .store
                .insert_if_absent(NonceRecord {
                    nonce: nonce.clone(),
                    issued_at: now,
                    network_id,
                })
                .await?;
            if inserted {
                return Ok((nonce, now));
            }
            warn!(network_id, "nonce collision on reserve, regenerating");
        }
        error!(network_id, "nonce reserve exhausted retries");
        Err(ConfigError::StoreUnavailable)
    }

    /// 校验外部来源的 nonce：先查时间窗，再原子登记。
    pub(crate) async fn validate_incoming(
        &self,
        network_id: u64,
        nonce: &str,
        timestamp: i64,
    ) -> Result<(), CoreError> {
        let now = hb_shared_protocol::unix_now_secs();
        if now.abs_diff(timestamp) > NONCE_MAX_SKEW_SEC.unsigned_abs() {
            info!(network_id, timestamp, now, "nonce rejected: stale timestamp");
            return Err(ReplayError::StaleTimestamp.into());
        }

        let nonce = nonce.trim();
        if nonce.is_empty() {
            return Err(ReplayError::MalformedNonce.into());
        }

        // 未来时间戳以其自身为起点计保留期，清理时不会早于其失效。
        let inserted = self
            .store
            .insert_if_absent(NonceRecord {
                nonce: nonce.to_string(),
                issued_at: now.max(timestamp),
                network_id,
            })
            .await?;
        if !inserted {
            warn!(network_id, nonce, "nonce rejected: replay detected");
            return Err(ReplayError::DuplicateNonce.into());
        }
        Ok(())
    }

    /// 清理超过 `max_age_minutes` 的记录；保留期不会短于接收时间窗。
    pub(crate) async fn cleanup(&self, max_age_minutes: u64) -> Result<usize, ConfigError> {
        let max_age_sec = i64::try_from(max_age_minutes.saturating_mul(60))
            .unwrap_or(i64::MAX)
            .max(NONCE_MAX_SKEW_SEC);
        let cutoff = hb_shared_protocol::unix_now_secs().saturating_sub(max_age_sec);
        let removed = self.store.purge_older_than(cutoff).await?;
        if removed > 0 {
            debug!(removed, cutoff, "nonce cleanup evicted records");
        }
        Ok(removed)
    }

    /// 当前登记的 nonce 数量。
    pub(crate) async fn len(&self) -> usize {
        self.store.len().await
    }
}

/// 启动独立的周期清理任务。
pub(crate) fn spawn_cleanup_task(
    guard: NonceGuard,
    interval: Duration,
    max_age_minutes: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(err) = guard.cleanup(max_age_minutes).await {
                warn!("nonce cleanup skipped: {err}");
            }
        }
    })
}

fn random_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn guard() -> NonceGuard {
        NonceGuard::new(NonceStore::in_memory(Duration::from_secs(1)))
    }

    fn now() -> i64 {
        hb_shared_protocol::unix_now_secs()
    }

    #[tokio::test]
    async fn sequential_reserves_are_distinct_and_recorded() {
        let guard = guard();
        let (first, ts1) = guard.reserve(1).await.unwrap();
        let (second, ts2) = guard.reserve(1).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(first.len(), NONCE_BYTES * 2);
        assert!((ts1 - now()).abs() <= 1 && (ts2 - now()).abs() <= 1);
        assert_eq!(guard.len().await, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reserves_never_collide() {
        let guard = guard();
        let mut handles = Vec::new();
        for _ in 0..64 {
            let guard = guard.clone();
            handles.push(tokio::spawn(async move { guard.reserve(1).await.unwrap().0 }));
        }
        let mut seen = HashSet::new();
        for handle in handles {
            assert!(seen.insert(handle.await.unwrap()));
        }
        assert_eq!(guard.len().await, 64);
    }

    #[tokio::test]
    async fn reserved_nonce_is_rejected_when_echoed_back() {
        let guard = guard();
        let (nonce, ts) = guard.reserve(1).await.unwrap();
        let err = guard.validate_incoming(1, &nonce, ts).await.unwrap_err();
        assert_eq!(err, CoreError::Replay(ReplayError::DuplicateNonce));
    }

    #[tokio::test]
    async fn second_use_is_duplicate_for_any_timestamp() {
        let guard = guard();
        guard.validate_incoming(1, "n-1", now()).await.unwrap();
        for ts in [now(), now() - 200, now() + 100] {
            let err = guard.validate_incoming(1, "n-1", ts).await.unwrap_err();
            assert_eq!(err, CoreError::Replay(ReplayError::DuplicateNonce));
        }
        // 唯一性按 nonce 值全局判定。
        let err = guard.validate_incoming(2, "n-1", now()).await.unwrap_err();
        assert_eq!(err, CoreError::Replay(ReplayError::DuplicateNonce));
    }

    #[tokio::test]
    async fn stale_timestamp_wins_over_fresh_nonce() {
        let guard = guard();
        for ts in [now() - 301, now() + 400, 0] {
            let err = guard.validate_incoming(1, "fresh", ts).await.unwrap_err();
            assert_eq!(err, CoreError::Replay(ReplayError::StaleTimestamp));
        }
        assert_eq!(guard.len().await, 0);
        guard.validate_incoming(1, "fresh", now() - 290).await.unwrap();
    }

    #[tokio::test]
    async fn skew_of_exactly_window_is_accepted() {
        let guard = guard();
        guard.validate_incoming(1, "past-edge", now() - 300).await.unwrap();
        guard.validate_incoming(1, "future-edge", now() + 300).await.unwrap();
        assert_eq!(guard.len().await, 2);
    }

    #[tokio::test]
    async fn blank_nonce_is_malformed_not_replay() {
        let guard = guard();
        for nonce in ["", "   "] {
            let err = guard.validate_incoming(1, nonce, now()).await.unwrap_err();
            assert_eq!(err, CoreError::Replay(ReplayError::MalformedNonce));
        }
        assert_eq!(guard.len().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_validations_accept_exactly_once() {
        let guard = guard();
        let ts = now();
        let mut handles = Vec::new();
        for _ in 0..32 {
            let guard = guard.clone();
            handles.push(tokio::spawn(async move {
                guard.validate_incoming(3, "contested", ts).await
            }));
        }
        let mut accepted = 0;
        let mut duplicates = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => accepted += 1,
                Err(CoreError::Replay(ReplayError::DuplicateNonce)) => duplicates += 1,
                Err(other) => panic!("unexpected {other}"),
            }
        }
        assert_eq!((accepted, duplicates), (1, 31));
    }

    #[tokio::test]
    async fn cleanup_evicts_only_records_past_retention() {
        let store = NonceStore::in_memory(Duration::from_secs(1));
        let t = now();
        for (nonce, issued_at) in [("ancient", t - 3600), ("old", t - 601), ("recent", t - 299)] {
            store
                .insert_if_absent(NonceRecord {
                    nonce: nonce.to_string(),
                    issued_at,
                    network_id: 1,
                })
                .await
                .unwrap();
        }
        let guard = NonceGuard::new(store);

        assert_eq!(guard.cleanup(10).await.unwrap(), 2);
        assert_eq!(guard.len().await, 1);
        let err = guard.validate_incoming(1, "recent", t).await.unwrap_err();
        assert_eq!(err, CoreError::Replay(ReplayError::DuplicateNonce));
    }

    #[tokio::test]
    async fn cleanup_age_is_clamped_to_acceptance_window() {
        let store = NonceStore::in_memory(Duration::from_secs(1));
        store
            .insert_if_absent(NonceRecord {
                nonce: "inside-window".to_string(),
                issued_at: now() - 250,
                network_id: 1,
            })
            .await
            .unwrap();
        let guard = NonceGuard::new(store);

        assert_eq!(guard.cleanup(0).await.unwrap(), 0);
        assert_eq!(guard.len().await, 1);
    }

    #[tokio::test]
    async fn blocked_store_is_not_treated_as_fresh() {
        let store = NonceStore::in_memory(Duration::from_millis(20));
        let guard = NonceGuard::new(store);
        let _held = guard.store.records.write().await;

        let err = guard.validate_incoming(1, "n", now()).await.unwrap_err();
        assert_eq!(err, CoreError::Config(ConfigError::StoreUnavailable));
        assert_eq!(
            guard.reserve(1).await.unwrap_err(),
            ConfigError::StoreUnavailable
        );
    }
}
