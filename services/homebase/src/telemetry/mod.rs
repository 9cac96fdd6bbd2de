//! 遥测接入：逐条验签，通过的条目落盘，失败的只计数。

pub(crate) mod handlers;
pub(crate) mod sink;

use std::fmt;

use tracing::{debug, error, warn};

use hb_shared_protocol::{IngestSummary, TelemetryBatch, TelemetryEntry};

use crate::{
    crypto::verify::verify_signature,
    errors::{ConfigError, SignatureError},
    registry::IdentityRegistry,
    state::AppState,
};

/// 验签通过的遥测条目。
#[derive(Debug, Clone)]
pub(crate) struct VerifiedEntry {
    pub(crate) network_id: u64,
    pub(crate) entry: TelemetryEntry,
}

/// 单条拒绝原因。
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EntryRejection {
    Signature(SignatureError),
    Config(ConfigError),
}

impl fmt::Display for EntryRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signature(err) => err.fmt(f),
            Self::Config(err) => err.fmt(f),
        }
    }
}

/// 校验单条遥测。
pub(crate) async fn verify_entry(
    registry: &IdentityRegistry,
    entry: TelemetryEntry,
) -> Result<VerifiedEntry, EntryRejection> {
    let Some(device) = registry.device_verify_key(&entry.device_id).await else {
        warn!(device_id = %entry.device_id, "telemetry rejected: unknown device");
        return Err(EntryRejection::Signature(SignatureError::UnknownSigner));
    };

    let message = entry.signed_message();
    match verify_signature(
        &device.public_key_hex,
        message.as_bytes(),
        &entry.signature,
        &format!("device {}", entry.device_id),
    ) {
        Ok(true) => Ok(VerifiedEntry {
            network_id: device.network_id,
            entry,
        }),
        Ok(false) => {
            warn!(device_id = %entry.device_id, "telemetry rejected: bad signature");
            Err(EntryRejection::Signature(SignatureError::BadSignature))
        }
        Err(err) => {
            error!(device_id = %entry.device_id, "telemetry rejected: {err}");
            Err(EntryRejection::Config(err))
        }
    }
}

impl AppState {
    /// 批量接入；坏条目不影响其余条目，也不使整批失败。
    pub(crate) async fn ingest_telemetry(&self, batch: TelemetryBatch) -> IngestSummary {
        let total = batch.logs.len();
        let mut accepted = Vec::with_capacity(total);
        for entry in batch.logs {
            let device_id = entry.device_id.clone();
            match verify_entry(&self.registry, entry).await {
                Ok(verified) => accepted.push(verified),
                Err(rejection) => debug!(device_id = %device_id, "telemetry entry skipped: {rejection}"),
            }
        }

        let ingested = accepted.len();
        let errors = total - ingested;
        if let Err(err) = self.telemetry.append(&accepted).await {
            error!("persist telemetry failed: {err}");
        }
        debug!(ingested, errors, "telemetry batch processed");
        IngestSummary {
            status: "ok".to_string(),
            ingested,
            errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::{Signer, SigningKey};

    use super::*;
    use crate::registry::store::RegistryStore;

    fn device_key() -> SigningKey {
        SigningKey::from_bytes(&[9u8; 32])
    }

    fn registry() -> IdentityRegistry {
        let mut store = RegistryStore::new("s".to_string());
        let network = store.create_network("garden").unwrap();
        let public_key = hex::encode(device_key().verifying_key().to_bytes());
        store
            .register_device(network.id, "D1", "motion", &public_key)
            .unwrap();
        IdentityRegistry::new(store)
    }

    fn entry(device_id: &str, signature: String) -> TelemetryEntry {
        TelemetryEntry {
            device_id: device_id.to_string(),
            timestamp: 1_700_000_000.0,
            level: "INFO".to_string(),
            category: "motion".to_string(),
            message: "hello".to_string(),
            signature,
        }
    }

    fn signed(device_id: &str) -> TelemetryEntry {
        let sig = device_key().sign(b"1700000000:hello");
        entry(device_id, hex::encode(sig.to_bytes()))
    }

    #[tokio::test]
    async fn signed_entry_is_admitted_with_network() {
        let verified = verify_entry(&registry(), signed("D1")).await.unwrap();
        assert_eq!(verified.network_id, 1);
    }

    #[tokio::test]
    async fn zero_or_malformed_signatures_are_bad_signature() {
        let registry = registry();
        for sig in ["00".repeat(64), "abc123def456".to_string(), String::new()] {
            assert_eq!(
                verify_entry(&registry, entry("D1", sig)).await.unwrap_err(),
                EntryRejection::Signature(SignatureError::BadSignature)
            );
        }
    }

    #[tokio::test]
    async fn unknown_device_is_unknown_signer() {
        assert_eq!(
            verify_entry(&registry(), signed("D9")).await.unwrap_err(),
            EntryRejection::Signature(SignatureError::UnknownSigner)
        );
    }

    #[tokio::test]
    async fn corrupt_device_key_is_config_error() {
        let mut store = RegistryStore::new("s".to_string());
        let network = store.create_network("garden").unwrap();
        let public_key = hex::encode(device_key().verifying_key().to_bytes());
        store
            .register_device(network.id, "D1", "motion", &public_key)
            .unwrap();
        if let Some(device) = store.devices.get_mut("D1") {
            device.public_key = "zz".to_string();
        }
        let registry = IdentityRegistry::new(store);

        assert!(matches!(
            verify_entry(&registry, signed("D1")).await.unwrap_err(),
            EntryRejection::Config(ConfigError::CorruptKeyMaterial { .. })
        ));
    }
}
