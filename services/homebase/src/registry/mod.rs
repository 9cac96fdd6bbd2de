//! 身份注册表：按网络 ID 查签名密钥、按设备 ID 查公钥。
//!
//! 只负责查找；注册通过 CLI 开通命令写入同一份注册表文件，
//! 每次查找前比对文件修改时间与长度，变化即重新加载。

pub(crate) mod store;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};

use ed25519_dalek::SigningKey;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{info, warn};

use crate::{
    crypto::keys::decode_signing_key,
    errors::{ConfigError, CoreError, SignatureError},
};

use self::store::{RegistryStore, decode_registry};

/// 设备公钥及其所属网络。
#[derive(Debug, Clone)]
pub(crate) struct DeviceKey {
    pub(crate) network_id: u64,
    pub(crate) public_key_hex: String,
}

/// 注册表文件指纹。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

impl FileStamp {
    fn from_metadata(meta: &std::fs::Metadata) -> Self {
        Self {
            modified: meta.modified().ok(),
            len: meta.len(),
        }
    }
}

struct Loaded {
    store: RegistryStore,
    stamp: Option<FileStamp>,
}

/// 注册表只读句柄。
#[derive(Clone)]
pub(crate) struct IdentityRegistry {
    loaded: Arc<RwLock<Loaded>>,
    source: Option<Arc<PathBuf>>,
}

impl IdentityRegistry {
    /// 固定内容的注册表，不跟随文件。
    pub(crate) fn new(store: RegistryStore) -> Self {
        Self {
            loaded: Arc::new(RwLock::new(Loaded { store, stamp: None })),
            source: None,
        }
    }

    /// 跟随注册表文件：`store` 为启动时已加载的内容。
    pub(crate) fn from_file(path: PathBuf, store: RegistryStore) -> Self {
        let stamp = std::fs::metadata(&path)
            .ok()
            .map(|meta| FileStamp::from_metadata(&meta));
        Self {
            loaded: Arc::new(RwLock::new(Loaded { store, stamp })),
            source: Some(Arc::new(path)),
        }
    }

    /// 取网络签名私钥，并核对与登记公钥一致。
    pub(crate) async fn network_signing_key(&self, network_id: u64) -> Result<SigningKey, CoreError> {
        let loaded = self.current().await;
        let Some(network) = loaded.store.networks.get(&network_id) else {
            return Err(SignatureError::UnknownSigner.into());
        };
        let Some(seed_hex) = network
            .signing_key
            .as_deref()
            .filter(|raw| !raw.trim().is_empty())
        else {
            return Err(ConfigError::MissingSigningKey { network_id }.into());
        };

        let owner = format!("network {network_id}");
        let signing_key = decode_signing_key(seed_hex, &owner)?;
        let derived = hex::encode(signing_key.verifying_key().to_bytes());
        if !derived.eq_ignore_ascii_case(network.public_key.trim()) {
            return Err(ConfigError::CorruptKeyMaterial { owner }.into());
        }
        Ok(signing_key)
    }

    /// 取设备公钥（hex，解析交给验签方）。
    pub(crate) async fn device_verify_key(&self, device_id: &str) -> Option<DeviceKey> {
        let loaded = self.current().await;
        loaded.store.devices.get(device_id).map(|device| DeviceKey {
            network_id: device.network_id,
            public_key_hex: device.public_key.clone(),
        })
    }

    /// 取管理员 TOTP 密钥。
    pub(crate) async fn admin_totp_secret(&self, username: &str) -> Option<String> {
        let loaded = self.current().await;
        loaded
            .store
            .admins
            .get(username)
            .map(|admin| admin.totp_secret.clone())
    }

    /// 注册表内的会话签名密钥。
    pub(crate) async fn session_secret(&self) -> String {
        self.current().await.store.session_secret.clone()
    }

    /// 文件有变化时先重新加载，再返回读锁。
    async fn current(&self) -> RwLockReadGuard<'_, Loaded> {
        if let Some(path) = self.source.as_deref() {
            self.reload_if_changed(path).await;
        }
        self.loaded.read().await
    }

    async fn reload_if_changed(&self, path: &Path) {
        let Ok(meta) = tokio::fs::metadata(path).await else {
            // 文件被移走时沿用内存中的内容。
            return;
        };
        let stamp = Some(FileStamp::from_metadata(&meta));
        if self.loaded.read().await.stamp == stamp {
            return;
        }

        let mut loaded = self.loaded.write().await;
        if loaded.stamp == stamp {
            return;
        }
        let decoded = match tokio::fs::read(path).await {
            Ok(raw) => decode_registry(&raw),
            Err(err) => Err(format!("read registry failed: {err}")),
        };
        // 失败也记下指纹，同一份坏文件只告警一次。
        loaded.stamp = stamp;
        match decoded {
            Ok(store) => {
                info!(
                    networks = store.networks.len(),
                    devices = store.devices.len(),
                    admins = store.admins.len(),
                    "registry reloaded"
                );
                loaded.store = store;
            }
            Err(err) => warn!(path = %path.display(), "registry reload skipped: {err}"),
        }
    }
}
