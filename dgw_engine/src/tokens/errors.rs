use thiserror::Error;

/// Everything that can be wrong with a download token.
///
/// The server reports all of these as `invalid_token`, with [`TokenError::kind`] as the reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("The token is not in a recognised format")]
    BadTokenFormat,
    #[error("The token signature is invalid")]
    BadSignature,
    #[error("The token payload could not be decoded")]
    BadPayload,
    #[error("The token has expired")]
    TokenExpired,
    #[error("The token does not exist")]
    TokenNotFound,
    #[error("The token has already been used")]
    TokenAlreadyUsed,
    #[error("The token has been used the maximum number of times")]
    TokenMaxUsesExceeded,
    #[error("The token was not issued for this order")]
    TokenOrderMismatch,
    #[error("The token was not issued for this product")]
    TokenProductMismatch,
    #[error("Cannot sign tokens: {0}")]
    InvalidSecret(String),
}

impl TokenError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BadTokenFormat => "bad_token_format",
            Self::BadSignature => "bad_signature",
            Self::BadPayload => "bad_payload",
            Self::TokenExpired => "token_expired",
            Self::TokenNotFound => "token_not_found",
            Self::TokenAlreadyUsed => "token_already_used",
            Self::TokenMaxUsesExceeded => "token_max_uses_exceeded",
            Self::TokenOrderMismatch => "token_order_mismatch",
            Self::TokenProductMismatch => "token_product_mismatch",
            Self::InvalidSecret(_) => "configuration_error",
        }
    }
}

impl From<serde_json::Error> for TokenError {
    fn from(_: serde_json::Error) -> Self {
        Self::BadPayload
    }
}
