//! 管理员 TOTP（RFC 6238）：HMAC-SHA1、6 位、30 秒步长、前后各容忍一步。

use hmac::{Hmac, Mac};
use rand::{RngCore, rngs::OsRng};
use sha1::Sha1;
use subtle::ConstantTimeEq;
use url::Url;

use crate::api::types::{TOTP_DIGITS, TOTP_ISSUER, TOTP_SKEW_STEPS, TOTP_STEP_SEC};

/// RFC 4648 base32 字母表。
const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";
/// 共享密钥字节数（160 bit，与 HMAC-SHA1 输出等长）。
const SECRET_BYTES: usize = 20;

/// 生成 base32 共享密钥。
pub(crate) fn generate_secret() -> String {
    let mut raw = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut raw);
    base32_encode(&raw)
}

/// 校验当前时间的验证码。
pub(crate) fn verify_code(secret_b32: &str, code: &str) -> bool {
    verify_code_at(secret_b32, code, hb_shared_protocol::unix_now_secs())
}

/// 校验给定时间的验证码，接受 `t-1..=t+1` 三个步长。
pub(crate) fn verify_code_at(secret_b32: &str, code: &str, unix_secs: i64) -> bool {
    let code = code.trim();
    if code.len() != TOTP_DIGITS as usize || !code.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let Some(key) = base32_decode(secret_b32) else {
        return false;
    };
    let current = unix_secs.div_euclid(TOTP_STEP_SEC as i64);
    (-TOTP_SKEW_STEPS..=TOTP_SKEW_STEPS).any(|offset| {
        let Ok(counter) = u64::try_from(current + offset) else {
            return false;
        };
        hotp(&key, counter).as_bytes().ct_eq(code.as_bytes()).unwrap_u8() == 1
    })
}

/// 给定时间的验证码；密钥无法解码时返回 `None`。
pub(crate) fn code_at(secret_b32: &str, unix_secs: i64) -> Option<String> {
    let key = base32_decode(secret_b32)?;
    let counter = u64::try_from(unix_secs.div_euclid(TOTP_STEP_SEC as i64)).ok()?;
    Some(hotp(&key, counter))
}

/// 当前验证码。
pub(crate) fn current_code(secret_b32: &str) -> Option<String> {
    code_at(secret_b32, hb_shared_protocol::unix_now_secs())
}

/// 生成验证器可扫描的 `otpauth://` 链接。
pub(crate) fn provisioning_uri(username: &str, secret_b32: &str) -> Result<String, String> {
    let mut url = Url::parse(&format!("otpauth://totp/{TOTP_ISSUER}:{username}"))
        .map_err(|err| format!("build otpauth uri failed: {err}"))?;
    url.query_pairs_mut()
        .append_pair("secret", secret_b32)
        .append_pair("issuer", TOTP_ISSUER)
        .append_pair("algorithm", "SHA1")
        .append_pair("digits", &TOTP_DIGITS.to_string())
        .append_pair("period", &TOTP_STEP_SEC.to_string());
    Ok(url.to_string())
}

/// RFC 4226 HOTP，动态截断后取低位十进制。
fn hotp(key: &[u8], counter: u64) -> String {
    type HmacSha1 = Hmac<Sha1>;
    // HMAC 接受任意长度密钥。
    let Ok(mut mac) = HmacSha1::new_from_slice(key) else {
        return String::new();
    };
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = usize::from(digest[digest.len() - 1] & 0x0f);
    let binary = u32::from_be_bytes([
        digest[offset] & 0x7f,
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]);
    let value = binary % 10u32.pow(TOTP_DIGITS);
    format!("{value:0width$}", width = TOTP_DIGITS as usize)
}

fn base32_encode(raw: &[u8]) -> String {
    let mut out = String::with_capacity(raw.len().div_ceil(5) * 8);
    let mut buffer: u32 = 0;
    let mut bits = 0;
    for byte in raw {
        buffer = (buffer << 8) | u32::from(*byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}

/// 解码 base32；忽略大小写、空格与 `=` 填充。
fn base32_decode(raw: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(raw.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits = 0;
    for ch in raw.chars().filter(|ch| !ch.is_whitespace() && *ch != '=') {
        let upper = ch.to_ascii_uppercase() as u8;
        let index = BASE32_ALPHABET.iter().position(|item| *item == upper)?;
        buffer = (buffer << 5) | index as u32;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push(((buffer >> bits) & 0xff) as u8);
        }
    }
    if out.is_empty() { None } else { Some(out) }
}
