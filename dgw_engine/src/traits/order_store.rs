use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{IllegalTransition, MetaPatch, Order, OrderId, OrderStatusType, PaymentRecord, TokenRecord},
    traits::data_objects::{ConsumeOutcome, CreditOutcome, StatusChange},
};

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("{0}")]
    IllegalTransition(#[from] IllegalTransition),
    #[error("Token {0} already exists")]
    TokenAlreadyExists(String),
    #[error("Storage I/O error. {0}")]
    Io(String),
    #[error("Could not serialize or deserialize stored data. {0}")]
    Serialization(String),
    #[error("The remote store returned an error. {0}")]
    Remote(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Durable storage for orders.
///
/// Every mutation is a read-modify-write of whole records. Implementations must serialize their writers, and must
/// publish each write atomically so that a record is never observed half-written.
///
/// A missing or corrupt collection reads as empty. Callers cannot tell "store unavailable" from "no such order".
#[allow(async_fn_in_trait)]
pub trait OrderStore: Clone {
    /// Fetches the order with the given id, or `None` if it does not exist.
    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, StoreError>;

    /// Inserts the order, or replaces the stored record with the same id. The `updated_at` field is set by the store.
    ///
    /// This is a raw write. Status changes on existing orders must go through [`OrderStore::update_status`] instead.
    async fn upsert_order(&self, order: Order) -> Result<Order, StoreError>;

    /// Moves the order to `status`, subject to the order state machine (see
    /// [`OrderStatusType::transition`](crate::db_types::OrderStatusType::transition)).
    ///
    /// The check and the write happen inside the store's write section, so two concurrent callers asking for the same
    /// change see exactly one `Changed` result between them. An illegal transition is an error and leaves the order
    /// untouched.
    async fn update_status(&self, order_id: &OrderId, status: OrderStatusType) -> Result<StatusChange, StoreError>;

    /// Merges `patch` into the order's metadata.
    async fn update_meta(&self, order_id: &OrderId, patch: MetaPatch) -> Result<Order, StoreError>;

    /// Whether the one-time token id `jti` has been consumed for this order.
    async fn is_jti_used(&self, order_id: &OrderId, jti: &str) -> Result<bool, StoreError>;

    /// Check-and-set for one-time token ids. Returns `true` if this call marked the `jti` as used, and `false` if it
    /// had already been used.
    async fn mark_jti_used(&self, order_id: &OrderId, jti: &str) -> Result<bool, StoreError>;

    /// Check-and-increment for reusable token ids. Returns `true` if this call recorded a use, and `false` if `jti`
    /// has already been used `max_uses` times. A `jti` that reaches its limit is also marked as used.
    async fn record_jti_use(&self, order_id: &OrderId, jti: &str, max_uses: u32) -> Result<bool, StoreError>;

    /// All orders, oldest first.
    async fn list_orders(&self) -> Result<Vec<Order>, StoreError>;
}

/// The append-only ledger of on-chain verification attempts.
#[allow(async_fn_in_trait)]
pub trait PaymentLedger: Clone {
    /// The `pass` record for the given (normalized) transaction hash, if there is one.
    async fn find_passed_record(&self, tx_hash: &str) -> Result<Option<PaymentRecord>, StoreError>;

    /// Appends a record to the ledger. Used for failed attempts; successful ones go through
    /// [`PaymentLedger::credit_onchain_payment`].
    async fn append_record(&self, record: PaymentRecord) -> Result<(), StoreError>;

    /// Credits a verified on-chain transfer to its order in a single write section:
    /// * If a `pass` record for the transaction hash already exists, nothing is written and the existing record is
    ///   returned as [`CreditOutcome::AlreadyCredited`].
    /// * If the order is no longer awaiting payment, nothing is written and [`CreditOutcome::OrderNotPending`] is
    ///   returned.
    /// * Otherwise the `pass` record is appended, the opaque download `token` is stored, the order moves to `Paid` and
    ///   its metadata picks up the transaction hash, payment time and token.
    async fn credit_onchain_payment(
        &self,
        record: PaymentRecord,
        token: TokenRecord,
    ) -> Result<CreditOutcome, StoreError>;

    /// Every ledger entry for the given order, in the order they were written.
    async fn records_for_order(&self, order_id: &OrderId) -> Result<Vec<PaymentRecord>, StoreError>;
}

/// Server-side storage for opaque download tokens.
#[allow(async_fn_in_trait)]
pub trait TokenStore: Clone {
    /// Stores a new token record. Token strings are unique; inserting an existing token is an error.
    async fn insert_token(&self, record: TokenRecord) -> Result<(), StoreError>;

    /// Reads a token record without consuming it.
    async fn fetch_token(&self, token: &str) -> Result<Option<TokenRecord>, StoreError>;

    /// Verify-and-consume as one step: looks up the token, rejects it if it is missing, expired at `now` or
    /// exhausted, and otherwise increments its use count and persists the record before returning.
    ///
    /// Under concurrent calls on a token with one use left, at most one caller gets [`ConsumeOutcome::Consumed`].
    async fn consume_token(&self, token: &str, now: DateTime<Utc>) -> Result<ConsumeOutcome, StoreError>;
}
