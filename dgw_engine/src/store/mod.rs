//! Order, ledger and token persistence.
//!
//! Two backends implement the store traits:
//! * [`FileStore`] keeps each collection in one JSON file in a data directory.
//! * [`RemoteKvStore`] keeps one record per key in a remote key/value service with a REST interface.
//!
//! Both serialize their writers with a single in-process lock and publish every write as one atomic step. Neither can
//! stop a *second process* writing to the same files or keys in between a read and a write. Run one gateway process
//! per data directory or KV namespace.
//!
//! [`StoreBackend`] wraps the two so the backend can be picked from configuration at start-up.
mod file_store;
mod remote_kv;

use chrono::{DateTime, Utc};
pub use file_store::FileStore;
pub use remote_kv::RemoteKvStore;

use crate::{
    db_types::{MetaPatch, Order, OrderId, OrderStatusType, PaymentRecord, TokenRecord},
    traits::{ConsumeOutcome, CreditOutcome, OrderStore, PaymentLedger, StatusChange, StoreError, TokenStore},
};

/// Applies a verified on-chain credit to an order in memory. Returns `false`, leaving the order untouched, if the
/// order is not awaiting an on-chain payment.
pub(crate) fn apply_credit(order: &mut Order, record: &PaymentRecord, token: &TokenRecord) -> bool {
    if order.status != OrderStatusType::PendingPayment || order.apply_status(OrderStatusType::Paid).is_err() {
        return false;
    }
    let patch = MetaPatch::default()
        .with_tx_hash(record.tx_hash.clone())
        .with_paid_at(record.verified_at)
        .with_download_token(token.token.clone());
    order.meta.apply(patch);
    true
}

#[derive(Clone)]
pub enum StoreBackend {
    File(FileStore),
    Remote(RemoteKvStore),
}

impl OrderStore for StoreBackend {
    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, StoreError> {
        match self {
            Self::File(s) => s.fetch_order(order_id).await,
            Self::Remote(s) => s.fetch_order(order_id).await,
        }
    }

    async fn upsert_order(&self, order: Order) -> Result<Order, StoreError> {
        match self {
            Self::File(s) => s.upsert_order(order).await,
            Self::Remote(s) => s.upsert_order(order).await,
        }
    }

    async fn update_status(&self, order_id: &OrderId, status: OrderStatusType) -> Result<StatusChange, StoreError> {
        match self {
            Self::File(s) => s.update_status(order_id, status).await,
            Self::Remote(s) => s.update_status(order_id, status).await,
        }
    }

    async fn update_meta(&self, order_id: &OrderId, patch: MetaPatch) -> Result<Order, StoreError> {
        match self {
            Self::File(s) => s.update_meta(order_id, patch).await,
            Self::Remote(s) => s.update_meta(order_id, patch).await,
        }
    }

    async fn is_jti_used(&self, order_id: &OrderId, jti: &str) -> Result<bool, StoreError> {
        match self {
            Self::File(s) => s.is_jti_used(order_id, jti).await,
            Self::Remote(s) => s.is_jti_used(order_id, jti).await,
        }
    }

    async fn mark_jti_used(&self, order_id: &OrderId, jti: &str) -> Result<bool, StoreError> {
        match self {
            Self::File(s) => s.mark_jti_used(order_id, jti).await,
            Self::Remote(s) => s.mark_jti_used(order_id, jti).await,
        }
    }

    async fn record_jti_use(&self, order_id: &OrderId, jti: &str, max_uses: u32) -> Result<bool, StoreError> {
        match self {
            Self::File(s) => s.record_jti_use(order_id, jti, max_uses).await,
            Self::Remote(s) => s.record_jti_use(order_id, jti, max_uses).await,
        }
    }

    async fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        match self {
            Self::File(s) => s.list_orders().await,
            Self::Remote(s) => s.list_orders().await,
        }
    }
}

impl PaymentLedger for StoreBackend {
    async fn find_passed_record(&self, tx_hash: &str) -> Result<Option<PaymentRecord>, StoreError> {
        match self {
            Self::File(s) => s.find_passed_record(tx_hash).await,
            Self::Remote(s) => s.find_passed_record(tx_hash).await,
        }
    }

    async fn append_record(&self, record: PaymentRecord) -> Result<(), StoreError> {
        match self {
            Self::File(s) => s.append_record(record).await,
            Self::Remote(s) => s.append_record(record).await,
        }
    }

    async fn credit_onchain_payment(
        &self,
        record: PaymentRecord,
        token: TokenRecord,
    ) -> Result<CreditOutcome, StoreError> {
        match self {
            Self::File(s) => s.credit_onchain_payment(record, token).await,
            Self::Remote(s) => s.credit_onchain_payment(record, token).await,
        }
    }

    async fn records_for_order(&self, order_id: &OrderId) -> Result<Vec<PaymentRecord>, StoreError> {
        match self {
            Self::File(s) => s.records_for_order(order_id).await,
            Self::Remote(s) => s.records_for_order(order_id).await,
        }
    }
}

impl TokenStore for StoreBackend {
    async fn insert_token(&self, record: TokenRecord) -> Result<(), StoreError> {
        match self {
            Self::File(s) => s.insert_token(record).await,
            Self::Remote(s) => s.insert_token(record).await,
        }
    }

    async fn fetch_token(&self, token: &str) -> Result<Option<TokenRecord>, StoreError> {
        match self {
            Self::File(s) => s.fetch_token(token).await,
            Self::Remote(s) => s.fetch_token(token).await,
        }
    }

    async fn consume_token(&self, token: &str, now: DateTime<Utc>) -> Result<ConsumeOutcome, StoreError> {
        match self {
            Self::File(s) => s.consume_token(token, now).await,
            Self::Remote(s) => s.consume_token(token, now).await,
        }
    }
}
