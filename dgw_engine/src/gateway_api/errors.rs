use thiserror::Error;

use crate::{
    chain::{Rejection, VerifyError},
    db_types::{IllegalTransition, OrderId, OrderStatusType},
    tokens::TokenError,
    traits::{CatalogError, ProviderError, RpcError, StoreError},
};

/// Every way a gateway operation can fail.
///
/// [`GatewayError::kind`] is the stable, snake_case name of the failure that is reported to callers.
/// [`GatewayError::is_retryable`] separates transport failures, which leave all state unchanged and can be retried, from
/// business-rule failures, which are final for that attempt.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Invalid request. {0}")]
    InvalidRequest(String),
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("There is no order awaiting payment for {0}")]
    NoPendingOrder(String),
    #[error("Product {0} does not exist")]
    ProductNotFound(String),
    #[error("The package for product {0} could not be found")]
    PackageNotFound(String),
    #[error("Invalid token. {0}")]
    Token(#[from] TokenError),
    #[error("Order has not been paid. Its status is {0}")]
    NotPaid(OrderStatusType),
    #[error("Order {order_id} is not awaiting payment. Its status is {status}")]
    OrderNotPending { order_id: OrderId, status: OrderStatusType },
    #[error("{0}")]
    IllegalTransition(#[from] IllegalTransition),
    #[error("Transaction {0} has already been used to pay for another order")]
    TxHashAlreadyUsed(String),
    #[error("Payment verification failed. {0}")]
    PaymentRejected(#[from] Rejection),
    #[error("The blockchain RPC request failed. {0}")]
    RpcRequestFailed(String),
    #[error("The invoice provider is unavailable. {0}")]
    ProviderUnavailable(String),
    #[error("The order store is unavailable. {0}")]
    StoreUnavailable(String),
    #[error("Administrative actions are disabled")]
    AdminDisabled,
    #[error("The gateway is misconfigured. {0}")]
    Configuration(String),
}

impl GatewayError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::OrderNotFound(_) | Self::NoPendingOrder(_) => "order_not_found",
            Self::ProductNotFound(_) => "product_not_found",
            Self::PackageNotFound(_) => "package_not_found",
            Self::Token(e) => e.kind(),
            Self::NotPaid(_) => "not_paid",
            Self::OrderNotPending { .. } => "order_not_pending",
            Self::IllegalTransition(_) => "illegal_transition",
            Self::TxHashAlreadyUsed(_) => "tx_hash_already_used",
            Self::PaymentRejected(r) => r.kind(),
            Self::RpcRequestFailed(_) => "rpc_request_failed",
            Self::ProviderUnavailable(_) => "provider_unavailable",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::AdminDisabled => "admin_disabled",
            Self::Configuration(_) => "configuration_error",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RpcRequestFailed(_) | Self::ProviderUnavailable(_) | Self::StoreUnavailable(_))
    }

    /// Token faults are reported to callers as `invalid_token`, with the specific kind as the reason.
    pub fn is_token_fault(&self) -> bool {
        matches!(self, Self::Token(e) if !matches!(e, TokenError::InvalidSecret(_)))
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) => 400,
            Self::Token(TokenError::InvalidSecret(_)) => 500,
            Self::Token(_) => 401,
            Self::NotPaid(_) => 402,
            Self::AdminDisabled => 403,
            Self::OrderNotFound(_) | Self::NoPendingOrder(_) | Self::ProductNotFound(_) | Self::PackageNotFound(_) => 404,
            Self::PaymentRejected(Rejection::TxNotFound | Rejection::ReceiptNotFound) => 404,
            Self::PaymentRejected(_) => 402,
            Self::OrderNotPending { .. } | Self::IllegalTransition(_) | Self::TxHashAlreadyUsed(_) => 409,
            Self::RpcRequestFailed(_) | Self::ProviderUnavailable(_) => 502,
            Self::StoreUnavailable(_) => 503,
            Self::Configuration(_) => 500,
        }
    }
}

impl From<StoreError> for GatewayError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::OrderNotFound(id) => Self::OrderNotFound(id),
            StoreError::IllegalTransition(t) => Self::IllegalTransition(t),
            e => Self::StoreUnavailable(e.to_string()),
        }
    }
}

impl From<ProviderError> for GatewayError {
    fn from(e: ProviderError) -> Self {
        Self::ProviderUnavailable(e.to_string())
    }
}

impl From<RpcError> for GatewayError {
    fn from(e: RpcError) -> Self {
        Self::RpcRequestFailed(e.to_string())
    }
}

impl From<VerifyError> for GatewayError {
    fn from(e: VerifyError) -> Self {
        match e {
            VerifyError::Rejected(r) => Self::PaymentRejected(r),
            VerifyError::Rpc(e) => e.into(),
        }
    }
}

impl From<CatalogError> for GatewayError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::ProductNotFound(id) => Self::ProductNotFound(id),
            CatalogError::PackageNotFound(id) => Self::PackageNotFound(id),
            e => Self::Configuration(e.to_string()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn retry_classes() {
        assert!(GatewayError::from(RpcError::Transport("timeout".into())).is_retryable());
        assert!(GatewayError::from(ProviderError::Status { status: 503, body: String::new() }).is_retryable());
        assert!(!GatewayError::from(Rejection::RecipientMismatch { expected: "a".into(), actual: "b".into() })
            .is_retryable());
        assert!(!GatewayError::Token(TokenError::BadSignature).is_retryable());
    }

    #[test]
    fn kinds_and_statuses() {
        let e = GatewayError::from(VerifyError::Rejected(Rejection::TxNotFound));
        assert_eq!((e.kind(), e.http_status()), ("tx_not_found", 404));
        let e = GatewayError::from(Rejection::AmountInsufficient { expected: 2u64.into(), actual: 1u64.into() });
        assert_eq!((e.kind(), e.http_status()), ("amount_insufficient", 402));
        let e = GatewayError::from(TokenError::TokenMaxUsesExceeded);
        assert_eq!((e.kind(), e.http_status()), ("token_max_uses_exceeded", 401));
        assert!(e.is_token_fault());
        let e = GatewayError::from(StoreError::OrderNotFound(OrderId::from("x")));
        assert_eq!((e.kind(), e.http_status()), ("order_not_found", 404));
        let e = GatewayError::from(StoreError::Io("disk full".into()));
        assert_eq!((e.kind(), e.http_status()), ("store_unavailable", 503));
        assert_eq!(GatewayError::NotPaid(OrderStatusType::Pending).http_status(), 402);
        assert_eq!(GatewayError::from(CatalogError::PackageNotFound("p".into())).kind(), "package_not_found");
    }
}
