//! 管理员会话：TOTP 登录换取短期 HS256 JWT。

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{info, warn};

use crate::{
    api::types::SessionClaims,
    auth::totp,
    errors::AuthError,
    registry::IdentityRegistry,
};

type HmacSha256 = Hmac<Sha256>;

/// 未知用户登录时参与校验的占位密钥。
const UNKNOWN_USER_TOTP_SECRET: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

/// 固定 JWT 头。
const JWT_HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

/// 已认证的管理员。
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AdminPrincipal {
    pub(crate) username: String,
}

#[derive(Deserialize)]
struct JwtHeader {
    alg: String,
}

/// 会话签发与校验。
#[derive(Clone)]
pub(crate) struct SessionAuthenticator {
    registry: IdentityRegistry,
    secret: String,
    ttl_sec: u64,
}

impl SessionAuthenticator {
    pub(crate) fn new(registry: IdentityRegistry, secret: String, ttl_sec: u64) -> Self {
        Self {
            registry,
            secret,
            ttl_sec,
        }
    }

    /// 校验 TOTP 并签发令牌；用户不存在与验证码错误对外一致。
    pub(crate) async fn login(&self, username: &str, totp_code: &str) -> Result<String, AuthError> {
        let username = username.trim();
        let Some(secret) = self.registry.admin_totp_secret(username).await else {
            // 未知用户也完整走一遍校验，响应耗时与验证码错误一致。
            let _ = totp::verify_code(UNKNOWN_USER_TOTP_SECRET, totp_code);
            warn!(username, "admin login rejected: unknown user");
            return Err(AuthError::InvalidCredentials);
        };
        if !totp::verify_code(&secret, totp_code) {
            warn!(username, "admin login rejected: bad totp code");
            return Err(AuthError::InvalidCredentials);
        }
        let token = self.issue_at(username, unix_now())?;
        info!(username, "admin session issued");
        Ok(token)
    }

    /// 以指定时间签发令牌。
    pub(crate) fn issue_at(&self, subject: &str, now: u64) -> Result<String, AuthError> {
        let claims = SessionClaims {
            sub: Some(subject.to_string()),
            iat: now,
            exp: now.saturating_add(self.ttl_sec),
        };
        let claims_json =
            serde_json::to_vec(&claims).map_err(|_| AuthError::InvalidOrExpiredToken)?;
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(JWT_HEADER.as_bytes()),
            URL_SAFE_NO_PAD.encode(claims_json)
        );
        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{signing_input}.{signature}"))
    }

    /// 校验当前时间的令牌。
    pub(crate) fn validate(&self, token: &str) -> Result<AdminPrincipal, AuthError> {
        self.validate_at(token, unix_now())
    }

    /// 以指定时间校验令牌；`exp <= now` 视为过期。
    pub(crate) fn validate_at(&self, token: &str, now: u64) -> Result<AdminPrincipal, AuthError> {
        let mut parts = token.split('.');
        let header_b64 = parts.next().unwrap_or_default();
        let claims_b64 = parts.next().unwrap_or_default();
        let sig_b64 = parts.next().unwrap_or_default();
        if header_b64.is_empty()
            || claims_b64.is_empty()
            || sig_b64.is_empty()
            || parts.next().is_some()
        {
            return Err(AuthError::InvalidOrExpiredToken);
        }

        let header: JwtHeader = decode_segment(header_b64)?;
        if header.alg != "HS256" {
            return Err(AuthError::InvalidOrExpiredToken);
        }

        let sig = URL_SAFE_NO_PAD
            .decode(sig_b64.as_bytes())
            .map_err(|_| AuthError::InvalidOrExpiredToken)?;
        let mut mac = self.mac()?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(claims_b64.as_bytes());
        mac.verify_slice(&sig)
            .map_err(|_| AuthError::InvalidOrExpiredToken)?;

        let claims: SessionClaims = decode_segment(claims_b64)?;
        if claims.exp <= now {
            return Err(AuthError::InvalidOrExpiredToken);
        }
        let username = claims
            .sub
            .map(|sub| sub.trim().to_string())
            .filter(|sub| !sub.is_empty())
            .ok_or(AuthError::MalformedToken)?;
        Ok(AdminPrincipal { username })
    }

    fn mac(&self) -> Result<HmacSha256, AuthError> {
        HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| AuthError::InvalidOrExpiredToken)
    }
}

fn decode_segment<T: for<'de> Deserialize<'de>>(segment: &str) -> Result<T, AuthError> {
    let raw = URL_SAFE_NO_PAD
        .decode(segment.as_bytes())
        .map_err(|_| AuthError::InvalidOrExpiredToken)?;
    serde_json::from_slice(&raw).map_err(|_| AuthError::InvalidOrExpiredToken)
}

fn unix_now() -> u64 {
    u64::try_from(hb_shared_protocol::unix_now_secs()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::store::RegistryStore;

    const NOW: u64 = 1_700_000_000;

    fn authenticator() -> (SessionAuthenticator, String) {
        let mut store = RegistryStore::new("registry-secret".to_string());
        let admin = store.create_admin("alice").unwrap();
        let auth =
            SessionAuthenticator::new(IdentityRegistry::new(store), "test-secret".to_string(), 900);
        (auth, admin.totp_secret)
    }

    fn forge(auth: &SessionAuthenticator, header: &str, claims: &str) -> String {
        let input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(claims)
        );
        let mut mac = auth.mac().unwrap();
        mac.update(input.as_bytes());
        format!("{input}.{}", URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn token_round_trips_until_expiry() {
        let (auth, _) = authenticator();
        let token = auth.issue_at("alice", NOW).unwrap();
        assert_eq!(
            auth.validate_at(&token, NOW + 899).unwrap(),
            AdminPrincipal {
                username: "alice".to_string()
            }
        );
        assert_eq!(
            auth.validate_at(&token, NOW + 900),
            Err(AuthError::InvalidOrExpiredToken)
        );
    }

    #[test]
    fn tampered_or_foreign_tokens_are_rejected() {
        let (auth, _) = authenticator();
        let token = auth.issue_at("alice", NOW).unwrap();

        let mut tampered = token.clone();
        tampered.pop();
        tampered.push(if token.ends_with('A') { 'B' } else { 'A' });
        assert_eq!(
            auth.validate_at(&tampered, NOW),
            Err(AuthError::InvalidOrExpiredToken)
        );

        let (other, _) = authenticator();
        let other = SessionAuthenticator {
            secret: "other-secret".to_string(),
            ..other
        };
        assert_eq!(
            other.validate_at(&token, NOW),
            Err(AuthError::InvalidOrExpiredToken)
        );

        for garbage in ["", "a.b", "a.b.c.d", "not-a-token"] {
            assert_eq!(
                auth.validate_at(garbage, NOW),
                Err(AuthError::InvalidOrExpiredToken)
            );
        }
    }

    #[test]
    fn non_hs256_header_is_rejected() {
        let (auth, _) = authenticator();
        let token = forge(
            &auth,
            r#"{"alg":"none","typ":"JWT"}"#,
            r#"{"sub":"alice","iat":1700000000,"exp":1700000900}"#,
        );
        assert_eq!(
            auth.validate_at(&token, NOW),
            Err(AuthError::InvalidOrExpiredToken)
        );
    }

    #[test]
    fn signed_token_without_subject_is_malformed() {
        let (auth, _) = authenticator();
        for claims in [
            r#"{"iat":1700000000,"exp":1700000900}"#,
            r#"{"sub":"  ","iat":1700000000,"exp":1700000900}"#,
        ] {
            let token = forge(&auth, JWT_HEADER, claims);
            assert_eq!(auth.validate_at(&token, NOW), Err(AuthError::MalformedToken));
        }
    }

    #[test]
    fn unknown_user_placeholder_secret_is_decodable() {
        // 占位密钥必须能解码，否则未知用户分支会跳过 HMAC 计算。
        assert!(totp::current_code(UNKNOWN_USER_TOTP_SECRET).is_some());
    }

    #[tokio::test]
    async fn login_requires_known_user_and_current_code() {
        let (auth, secret) = authenticator();
        let code = totp::current_code(&secret).unwrap();

        let token = auth.login("alice", &code).await.unwrap();
        assert_eq!(auth.validate(&token).unwrap().username, "alice");

        let wrong = if code == "000000" { "111111" } else { "000000" };
        assert_eq!(
            auth.login("alice", wrong).await,
            Err(AuthError::InvalidCredentials)
        );
        assert_eq!(
            auth.login("mallory", &code).await,
            Err(AuthError::InvalidCredentials)
        );
    }
}
