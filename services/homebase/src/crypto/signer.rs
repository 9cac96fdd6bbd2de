//! 命令签名：用网络私钥对 `ts:command:json:nonce` 签名。

use ed25519_dalek::Signer;
use serde_json::Value;
use tracing::{error, info};

use hb_shared_protocol::{CommandBundle, canonical_json, command_message};

use crate::{errors::CoreError, nonce::guard::NonceGuard, registry::IdentityRegistry};

/// 命令签名器。
#[derive(Clone)]
pub(crate) struct CommandSigner {
    registry: IdentityRegistry,
    nonces: NonceGuard,
}

impl CommandSigner {
    pub(crate) fn new(registry: IdentityRegistry, nonces: NonceGuard) -> Self {
        Self { registry, nonces }
    }

    /// 签发命令包。
    ///
    /// 先解析密钥再占用 nonce：密钥问题不会消耗 nonce。
    pub(crate) async fn sign(
        &self,
        network_id: u64,
        command: &str,
        payload: Value,
    ) -> Result<CommandBundle, CoreError> {
        let signing_key = match self.registry.network_signing_key(network_id).await {
            Ok(key) => key,
            Err(CoreError::Config(err)) => {
                error!(network_id, "command signing key unusable: {err}");
                return Err(err.into());
            }
            Err(err) => return Err(err),
        };

        let (nonce, timestamp) = self.nonces.reserve(network_id).await.inspect_err(|err| {
            error!(network_id, "nonce reserve failed: {err}");
        })?;

        let payload_json = canonical_json(&payload);
        let message = command_message(timestamp, command, &payload_json, &nonce);
        let signature = hex::encode(signing_key.sign(message.as_bytes()).to_bytes());
        info!(network_id, command, nonce = %nonce, timestamp, "command signed");

        Ok(CommandBundle {
            network_id,
            command: command.to_string(),
            payload,
            timestamp,
            nonce,
            signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::{
        crypto::verify::verify_signature,
        errors::SignatureError,
        nonce::store::NonceStore,
        registry::store::RegistryStore,
    };

    fn signer_with_network() -> (CommandSigner, NonceGuard, u64, String) {
        let mut store = RegistryStore::new("s".to_string());
        let network = store.create_network("garden").unwrap();
        let nonces = NonceGuard::new(NonceStore::in_memory(Duration::from_secs(1)));
        let signer = CommandSigner::new(IdentityRegistry::new(store), nonces.clone());
        (signer, nonces, network.id, network.public_key)
    }

    #[tokio::test]
    async fn bundle_verifies_against_network_public_key() {
        let (signer, _, network_id, public_key) = signer_with_network();
        let bundle = signer
            .sign(network_id, "unlock", json!({"zone": 2, "door": "front"}))
            .await
            .unwrap();

        assert_eq!(bundle.nonce.len(), 32);
        assert_eq!(bundle.signature.len(), 128);
        let expected = format!(
            "{}:unlock:{{\"door\":\"front\",\"zone\":2}}:{}",
            bundle.timestamp, bundle.nonce
        );
        assert_eq!(bundle.signed_message(), expected);
        assert_eq!(
            verify_signature(&public_key, expected.as_bytes(), &bundle.signature, "n"),
            Ok(true)
        );
        assert_eq!(
            verify_signature(&public_key, b"other", &bundle.signature, "n"),
            Ok(false)
        );
    }

    #[tokio::test]
    async fn identical_requests_get_distinct_nonces_and_signatures() {
        let (signer, nonces, network_id, _) = signer_with_network();
        let first = signer.sign(network_id, "ping", json!({})).await.unwrap();
        let second = signer.sign(network_id, "ping", json!({})).await.unwrap();
        assert_ne!(first.nonce, second.nonce);
        assert_ne!(first.signature, second.signature);
        assert_eq!(nonces.len().await, 2);
    }

    #[tokio::test]
    async fn unknown_network_consumes_no_nonce() {
        let (signer, nonces, _, _) = signer_with_network();
        let err = signer.sign(404, "ping", Value::Null).await.unwrap_err();
        assert_eq!(err, CoreError::Signature(SignatureError::UnknownSigner));
        assert_eq!(nonces.len().await, 0);
    }
}
