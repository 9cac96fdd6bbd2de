//! 注册表持久化：网络密钥、设备公钥、管理员 TOTP 密钥。

use std::{
    collections::{BTreeMap, HashMap},
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{auth::totp::generate_secret, crypto::keys::generate_keypair_hex};

/// 注册表文件结构版本。
const REGISTRY_VERSION: u32 = 1;

/// 持久化注册表。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RegistryStore {
    pub(crate) version: u32,
    /// 管理员会话令牌的 HMAC 密钥。
    pub(crate) session_secret: String,
    #[serde(default = "first_network_id")]
    pub(crate) next_network_id: u64,
    #[serde(default)]
    pub(crate) networks: BTreeMap<u64, NetworkRecord>,
    #[serde(default)]
    pub(crate) devices: HashMap<String, DeviceRecord>,
    #[serde(default)]
    pub(crate) admins: HashMap<String, AdminRecord>,
}

/// 网络记录，签名密钥与网络一一对应。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NetworkRecord {
    pub(crate) id: u64,
    pub(crate) name: String,
    pub(crate) public_key: String,
    /// 私钥种子 hex；缺失表示开通流程不完整。
    #[serde(default)]
    pub(crate) signing_key: Option<String>,
    pub(crate) created_at: String,
}

/// 设备记录，仅存公钥。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeviceRecord {
    pub(crate) device_id: String,
    pub(crate) network_id: u64,
    pub(crate) device_type: String,
    pub(crate) public_key: String,
    pub(crate) created_at: String,
}

/// 管理员记录。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AdminRecord {
    pub(crate) username: String,
    /// base32 TOTP 共享密钥。
    pub(crate) totp_secret: String,
    pub(crate) created_at: String,
}

fn first_network_id() -> u64 {
    1
}

impl RegistryStore {
    pub(crate) fn new(session_secret: String) -> Self {
        Self {
            version: REGISTRY_VERSION,
            session_secret,
            next_network_id: first_network_id(),
            networks: BTreeMap::new(),
            devices: HashMap::new(),
            admins: HashMap::new(),
        }
    }

    /// 开通网络并生成签名密钥对。
    pub(crate) fn create_network(&mut self, name: &str) -> Result<NetworkRecord, String> {
        let name = name.trim();
        if name.is_empty() {
            return Err("network name must not be empty".to_string());
        }
        if self.networks.values().any(|network| network.name == name) {
            return Err(format!("network `{name}` already exists"));
        }

        let id = self
            .next_network_id
            .max(self.networks.keys().max().map_or(1, |last| last + 1));
        let (signing_key, public_key) = generate_keypair_hex();
        let record = NetworkRecord {
            id,
            name: name.to_string(),
            public_key,
            signing_key: Some(signing_key),
            created_at: hb_shared_protocol::now_rfc3339_nanos(),
        };
        self.networks.insert(id, record.clone());
        self.next_network_id = id + 1;
        Ok(record)
    }

    /// 登记设备公钥。
    pub(crate) fn register_device(
        &mut self,
        network_id: u64,
        device_id: &str,
        device_type: &str,
        public_key_hex: &str,
    ) -> Result<DeviceRecord, String> {
        let device_id = device_id.trim();
        if device_id.is_empty() {
            return Err("device id must not be empty".to_string());
        }
        if !self.networks.contains_key(&network_id) {
            return Err(format!("network {network_id} not found"));
        }
        if self.devices.contains_key(device_id) {
            return Err(format!("device `{device_id}` already registered"));
        }
        crate::crypto::keys::decode_verifying_key(public_key_hex, device_id)
            .map_err(|err| err.to_string())?;

        let record = DeviceRecord {
            device_id: device_id.to_string(),
            network_id,
            device_type: device_type.trim().to_string(),
            public_key: public_key_hex.trim().to_ascii_lowercase(),
            created_at: hb_shared_protocol::now_rfc3339_nanos(),
        };
        self.devices.insert(record.device_id.clone(), record.clone());
        Ok(record)
    }

    /// 创建管理员并生成 TOTP 密钥。
    pub(crate) fn create_admin(&mut self, username: &str) -> Result<AdminRecord, String> {
        let username = username.trim();
        if username.is_empty() {
            return Err("username must not be empty".to_string());
        }
        if self.admins.contains_key(username) {
            return Err(format!("admin `{username}` already exists"));
        }
        let record = AdminRecord {
            username: username.to_string(),
            totp_secret: generate_secret(),
            created_at: hb_shared_protocol::now_rfc3339_nanos(),
        };
        self.admins.insert(record.username.clone(), record.clone());
        Ok(record)
    }
}

/// 注册表路径：`HB_REGISTRY_PATH` 优先，否则落在数据目录下。
pub(crate) fn registry_path(data_dir: &Path) -> PathBuf {
    if let Ok(path) = std::env::var("HB_REGISTRY_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    data_dir.join("registry.json")
}

/// 加载注册表；文件不存在时生成新的会话密钥。
pub(crate) fn load_registry(path: &Path) -> Result<RegistryStore, String> {
    if !path.exists() {
        return Ok(RegistryStore::new(generate_session_secret()));
    }
    let raw = fs::read(path).map_err(|err| format!("read registry failed: {err}"))?;
    decode_registry(&raw)
}

/// 解析注册表文件内容。
pub(crate) fn decode_registry(raw: &[u8]) -> Result<RegistryStore, String> {
    let mut parsed: RegistryStore =
        serde_json::from_slice(raw).map_err(|err| format!("decode registry failed: {err}"))?;
    if parsed.session_secret.trim().is_empty() {
        parsed.session_secret = generate_session_secret();
    }
    Ok(parsed)
}

/// 持久化注册表：先写临时文件再改名，文件权限仅属主可读写。
pub(crate) fn persist_registry(path: &Path, store: &RegistryStore) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| format!("create registry dir failed: {err}"))?;
    }
    let encoded = serde_json::to_vec_pretty(store)
        .map_err(|err| format!("encode registry failed: {err}"))?;
    let tmp = path.with_extension("json.tmp");
    write_private(&tmp, &encoded).map_err(|err| format!("write registry failed: {err}"))?;
    fs::rename(&tmp, path).map_err(|err| format!("finalize registry failed: {err}"))
}

/// 写入仅属主可读写的文件（Unix 下 0o600）。
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    // 已存在的文件不受 open 时 mode 影响。
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

/// 生成会话令牌签名密钥。
pub(crate) fn generate_session_secret() -> String {
    format!(
        "hb_ss_{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}
