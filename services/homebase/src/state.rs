//! Home base 共享状态：注册表、重放防护、会话与遥测句柄。

use anyhow::Context;
use tracing::info;

use crate::{
    api::types::SESSION_TOKEN_TTL_SEC,
    auth::session::SessionAuthenticator,
    config::Config,
    crypto::signer::CommandSigner,
    nonce::{guard::NonceGuard, store::NonceStore},
    registry::{
        IdentityRegistry,
        store::{load_registry, persist_registry},
    },
    telemetry::sink::TelemetrySink,
};

/// 显式上下文，按请求克隆。
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) registry: IdentityRegistry,
    pub(crate) nonces: NonceGuard,
    pub(crate) sessions: SessionAuthenticator,
    pub(crate) signer: CommandSigner,
    pub(crate) telemetry: TelemetrySink,
}

impl AppState {
    /// 由已构建的组件装配状态。
    pub(crate) fn new(
        registry: IdentityRegistry,
        nonces: NonceGuard,
        session_secret: String,
        telemetry: TelemetrySink,
    ) -> Self {
        let sessions =
            SessionAuthenticator::new(registry.clone(), session_secret, SESSION_TOKEN_TTL_SEC);
        let signer = CommandSigner::new(registry.clone(), nonces.clone());
        Self {
            registry,
            nonces,
            sessions,
            signer,
            telemetry,
        }
    }

    /// 按配置加载注册表与 nonce 日志。
    pub(crate) async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store = load_registry(&config.registry_path)
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("load registry: {}", config.registry_path.display()))?;
        if !config.registry_path.exists() {
            // 首次启动即落盘，保证生成的会话密钥在重启后不变。
            persist_registry(&config.registry_path, &store)
                .map_err(anyhow::Error::msg)
                .context("initialize registry file")?;
        }
        info!(
            networks = store.networks.len(),
            devices = store.devices.len(),
            admins = store.admins.len(),
            "registry loaded"
        );

        let nonce_store = match &config.nonce_store_path {
            Some(path) => NonceStore::open(path.clone(), config.store_timeout)
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("open nonce store: {}", path.display()))?,
            None => NonceStore::in_memory(config.store_timeout),
        };

        let nonces = NonceGuard::new(nonce_store);
        info!(nonces = nonces.len().await, "nonce store ready");

        let registry = IdentityRegistry::from_file(config.registry_path.clone(), store);
        let session_secret = match &config.session_secret {
            Some(secret) => secret.clone(),
            None => registry.session_secret().await,
        };
        Ok(Self::new(
            registry,
            nonces,
            session_secret,
            TelemetrySink::new(config.telemetry_path.clone()),
        ))
    }
}
