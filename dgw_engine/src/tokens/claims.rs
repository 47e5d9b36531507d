use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The payload of a compact signed token. Field names are kept short since they travel in URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Order id
    pub oid: String,
    /// Product id
    pub pid: String,
    /// Expiry, as a unix timestamp in seconds
    pub exp: i64,
    /// Random token id. Uses are counted against it on the order.
    pub jti: String,
    /// One-time flag
    #[serde(default)]
    pub ot: bool,
}

impl TokenClaims {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() > self.exp
    }
}
