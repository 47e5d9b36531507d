//! Download tokens.
//!
//! Two kinds of token grant access to a package:
//!
//! * **Compact signed tokens** are self-contained. The token is `payload.signature`, where `payload` is the
//!   base64url-encoded JSON of [`TokenClaims`] and `signature` is the base64url-encoded HMAC-SHA256 of the payload
//!   segment under the server secret. Nothing is stored. Counting uses of a token's `jti` against the order is the
//!   caller's job.
//! * **Opaque tokens** are 32 random bytes, hex-encoded. They mean nothing by themselves; their [`TokenRecord`] lives
//!   in the [`TokenStore`](crate::traits::TokenStore), which consumes them atomically.
//!
//! The service itself holds no state beyond its key.
mod claims;
mod errors;

use chrono::{DateTime, Duration, Utc};
pub use claims::TokenClaims;
use dgw_common::Secret;
pub use errors::TokenError;
use hmac::{Hmac, Mac};
use log::*;
use rand::RngCore;
use sha2::Sha256;

use crate::db_types::{OrderId, TokenRecord};

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;
pub const DEFAULT_TOKEN_MAX_USES: u32 = 3;

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub secret: Secret<String>,
    /// Lifetime of newly issued tokens, in seconds. Negative values issue tokens that are already expired.
    pub ttl_secs: i64,
    pub max_uses: u32,
}

impl TokenConfig {
    pub fn new<S: Into<String>>(secret: S) -> Self {
        Self { secret: Secret::new(secret.into()), ttl_secs: DEFAULT_TOKEN_TTL_SECS, max_uses: DEFAULT_TOKEN_MAX_USES }
    }

    pub fn with_ttl(mut self, ttl_secs: i64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    pub fn with_max_uses(mut self, max_uses: u32) -> Self {
        self.max_uses = max_uses;
        self
    }

    /// Tokens that may only be used once carry the one-time flag
    pub fn one_time(&self) -> bool {
        self.max_uses <= 1
    }
}

#[derive(Clone)]
pub struct SignedTokenService {
    mac: HmacSha256,
    ttl: Duration,
    max_uses: u32,
    one_time: bool,
}

impl SignedTokenService {
    pub fn new(config: &TokenConfig) -> Result<Self, TokenError> {
        if config.secret.is_empty() {
            return Err(TokenError::InvalidSecret("the token secret cannot be empty".into()));
        }
        let mac = HmacSha256::new_from_slice(config.secret.as_bytes())
            .map_err(|e| TokenError::InvalidSecret(e.to_string()))?;
        Ok(Self { mac, ttl: Duration::seconds(config.ttl_secs), max_uses: config.max_uses, one_time: config.one_time() })
    }

    /// How many downloads one token allows. One-time tokens allow exactly one.
    pub fn max_uses(&self) -> u32 {
        if self.one_time {
            1
        } else {
            self.max_uses
        }
    }

    /// Issues a compact signed token for the order, valid for the configured TTL.
    pub fn issue(&self, order_id: &OrderId, product_id: &str) -> Result<(String, TokenClaims), TokenError> {
        self.issue_with_ttl(order_id, product_id, self.ttl)
    }

    pub fn issue_with_ttl(
        &self,
        order_id: &OrderId,
        product_id: &str,
        ttl: Duration,
    ) -> Result<(String, TokenClaims), TokenError> {
        let claims = TokenClaims {
            oid: order_id.as_str().to_string(),
            pid: product_id.to_string(),
            exp: (Utc::now() + ttl).timestamp(),
            jti: random_hex(16),
            ot: self.one_time,
        };
        let payload = base64::encode_config(serde_json::to_vec(&claims)?, base64::URL_SAFE_NO_PAD);
        let signature = base64::encode_config(self.sign(payload.as_bytes()), base64::URL_SAFE_NO_PAD);
        trace!("🔐️ Issued token {} for order {order_id}", claims.jti);
        Ok((format!("{payload}.{signature}"), claims))
    }

    /// Checks a compact token's signature and expiry against the current time.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, TokenError> {
        let (payload, signature) = token.trim().split_once('.').ok_or(TokenError::BadTokenFormat)?;
        if payload.is_empty() || signature.is_empty() || signature.contains('.') {
            return Err(TokenError::BadTokenFormat);
        }
        let signature = base64::decode_config(signature, base64::URL_SAFE_NO_PAD).map_err(|_| TokenError::BadSignature)?;
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature).map_err(|_| TokenError::BadSignature)?;
        let claims = base64::decode_config(payload, base64::URL_SAFE_NO_PAD)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<TokenClaims>(&bytes).ok())
            .ok_or(TokenError::BadPayload)?;
        if claims.is_expired_at(now) {
            return Err(TokenError::TokenExpired);
        }
        Ok(claims)
    }

    /// A fresh opaque token record for the order. The caller is responsible for storing it.
    pub fn issue_opaque(&self, order_id: &OrderId, product_id: &str) -> TokenRecord {
        let now = Utc::now();
        TokenRecord {
            token: random_hex(32),
            order_id: order_id.clone(),
            product_id: product_id.to_string(),
            created_at: now,
            expires_at: now + self.ttl,
            use_count: 0,
            max_uses: self.max_uses,
        }
    }

    fn sign(&self, data: &[u8]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }
}

fn random_hex(n: usize) -> String {
    let mut bytes = vec![0u8; n];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod test {
    use super::*;

    fn service() -> SignedTokenService {
        SignedTokenService::new(&TokenConfig::new("correct horse battery staple").with_ttl(600).with_max_uses(1)).unwrap()
    }

    #[test]
    fn round_trip() {
        let svc = service();
        let (token, issued) = svc.issue(&OrderId::from("ord_1"), "prod-1").unwrap();
        let claims = svc.verify(&token).unwrap();
        assert_eq!(claims, issued);
        assert_eq!(claims.oid, "ord_1");
        assert_eq!(claims.pid, "prod-1");
        assert!(claims.ot);
        assert_eq!(claims.jti.len(), 32);
    }

    #[test]
    fn negative_ttl_is_expired() {
        let svc = service();
        let (token, _) = svc.issue_with_ttl(&OrderId::from("ord_1"), "prod-1", Duration::seconds(-1)).unwrap();
        assert!(matches!(svc.verify(&token), Err(TokenError::TokenExpired)));
        let svc =
            SignedTokenService::new(&TokenConfig::new("correct horse battery staple").with_ttl(-1)).unwrap();
        let (token, _) = svc.issue(&OrderId::from("ord_1"), "prod-1").unwrap();
        assert!(matches!(svc.verify(&token), Err(TokenError::TokenExpired)));
    }

    #[test]
    fn tampering_never_verifies() {
        let svc = service();
        let (token, _) = svc.issue(&OrderId::from("ord_1"), "prod-1").unwrap();
        let bytes = token.as_bytes().to_vec();
        for i in 0..bytes.len() {
            if bytes[i] == b'.' {
                continue;
            }
            let mut tampered = bytes.clone();
            tampered[i] = if tampered[i] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(tampered).unwrap();
            if tampered == token {
                continue;
            }
            match svc.verify(&tampered) {
                Err(TokenError::BadSignature) | Err(TokenError::BadPayload) => {},
                other => panic!("Tampered token at byte {i} gave {other:?}"),
            }
        }
    }

    #[test]
    fn other_keys_are_rejected() {
        let (token, _) = service().issue(&OrderId::from("ord_1"), "prod-1").unwrap();
        let other = SignedTokenService::new(&TokenConfig::new("another secret")).unwrap();
        assert!(matches!(other.verify(&token), Err(TokenError::BadSignature)));
    }

    #[test]
    fn malformed_tokens() {
        let svc = service();
        for garbage in ["garbage-token", "", ".", "abc.", ".abc", "a.b.c"] {
            assert!(matches!(svc.verify(garbage), Err(TokenError::BadTokenFormat)), "{garbage}");
        }
        assert!(matches!(svc.verify("abc.!!!"), Err(TokenError::BadSignature)));
    }

    #[test]
    fn signed_garbage_is_a_bad_payload() {
        let svc = service();
        let payload = base64::encode_config(b"not json", base64::URL_SAFE_NO_PAD);
        let signature = base64::encode_config(svc.sign(payload.as_bytes()), base64::URL_SAFE_NO_PAD);
        assert!(matches!(svc.verify(&format!("{payload}.{signature}")), Err(TokenError::BadPayload)));
    }

    #[test]
    fn opaque_tokens() {
        let svc = service();
        let a = svc.issue_opaque(&OrderId::from("ord_1"), "prod-2");
        let b = svc.issue_opaque(&OrderId::from("ord_1"), "prod-2");
        assert_ne!(a.token, b.token);
        assert_eq!(a.token.len(), 64);
        assert!(a.token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(a.max_uses, 1);
        assert_eq!(a.use_count, 0);
        assert!(a.expires_at > a.created_at);
    }

    #[test]
    fn use_limits() {
        assert_eq!(service().max_uses(), 1);
        let svc = SignedTokenService::new(&TokenConfig::new("s").with_max_uses(3)).unwrap();
        assert_eq!(svc.max_uses(), 3);
        let (_, claims) = svc.issue(&OrderId::from("ord_1"), "prod-1").unwrap();
        assert!(!claims.ot);
        let svc = SignedTokenService::new(&TokenConfig::new("s").with_max_uses(0)).unwrap();
        assert_eq!(svc.max_uses(), 1);
    }

    #[test]
    fn empty_secret_is_refused() {
        assert!(matches!(SignedTokenService::new(&TokenConfig::new("")), Err(TokenError::InvalidSecret(_))));
    }
}
