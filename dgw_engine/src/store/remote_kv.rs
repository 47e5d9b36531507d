use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use dgw_common::Secret;
use log::*;
use reqwest::{Client, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    db_types::{normalize_tx_hash, MetaPatch, Order, OrderId, OrderStatusType, PaymentRecord, TokenRecord, TokenRejection},
    store::apply_credit,
    traits::{ConsumeOutcome, CreditOutcome, OrderStore, PaymentLedger, StatusChange, StoreError, TokenStore},
};

const ORDER_PREFIX: &str = "order:";
const PAYMENTS_PREFIX: &str = "payments:";
const TOKEN_PREFIX: &str = "token:";

/// The envelope every KV REST response comes in.
#[derive(Debug, Deserialize)]
struct KvResponse<T> {
    result: Option<T>,
    error: Option<String>,
}

/// A store backed by a remote key/value service with a REST interface (`GET /get/{key}`, `POST /set/{key}`,
/// `GET /keys/{pattern}`, bearer-token auth).
///
/// Layout:
/// * `order:{order_id}` holds one order.
/// * `payments:{tx_hash}` holds every ledger entry for one transaction hash.
/// * `token:{token}` holds one opaque token record.
///
/// Every key travels as a single percent-encoded path segment, whatever characters it contains.
///
/// Each mutation fetches and rewrites whole records. Writers inside this process are serialized, but the service offers
/// no compare-and-swap, so two gateway processes sharing a namespace can still race.
#[derive(Clone)]
pub struct RemoteKvStore {
    client: Client,
    base_url: Arc<Url>,
    token: Secret<String>,
    write_lock: Arc<Mutex<()>>,
}

impl RemoteKvStore {
    pub fn new(base_url: &str, token: Secret<String>, timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| StoreError::Remote(e.to_string()))?;
        let base_url = Url::parse(base_url.trim()).map_err(|e| StoreError::Remote(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::Remote(format!("{base_url} cannot be used as the KV service URL")));
        }
        info!("🗃️ Remote KV store configured at {base_url}");
        Ok(Self { client, base_url: Arc::new(base_url), token, write_lock: Arc::new(Mutex::new(())) })
    }

    /// `{base_url}/{command}/{key}`, with the key escaped so that it can never add path segments of its own.
    fn url(&self, command: &str, key: &str) -> Result<Url, StoreError> {
        let mut url = self.base_url.as_ref().clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Remote(format!("{} cannot be used as the KV service URL", self.base_url)))?
            .pop_if_empty()
            .push(command)
            .push(key);
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<Option<T>, StoreError> {
        let res = req.bearer_auth(self.token.reveal()).send().await.map_err(|e| StoreError::Remote(e.to_string()))?;
        let status = res.status();
        let body = res.text().await.map_err(|e| StoreError::Remote(e.to_string()))?;
        if !status.is_success() {
            return Err(StoreError::Remote(format!("HTTP {status}. {body}")));
        }
        let response: KvResponse<T> = serde_json::from_str(&body)
            .map_err(|e| StoreError::Remote(format!("Unexpected response from KV service: {e}. {body}")))?;
        match response.error {
            Some(e) => Err(StoreError::Remote(e)),
            None => Ok(response.result),
        }
    }

    /// Fetches and decodes one value. A missing or undecodable value is `None`.
    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let raw: Option<String> = self.send(self.client.get(self.url("get", key)?)).await?;
        let value = match raw {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!("🗃️ Value at {key} is corrupt. Treating it as absent. {e}");
                    None
                },
            },
            None => None,
        };
        Ok(value)
    }

    async fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let body = serde_json::to_string(value)?;
        let _: Option<String> = self.send(self.client.post(self.url("set", key)?).body(body)).await?;
        trace!("🗃️ {key} written");
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let keys: Option<Vec<String>> = self.send(self.client.get(self.url("keys", pattern)?)).await?;
        Ok(keys.unwrap_or_default())
    }

    fn order_key(order_id: &OrderId) -> String {
        format!("{ORDER_PREFIX}{}", order_id.as_str())
    }

    fn payments_key(tx_hash: &str) -> String {
        format!("{PAYMENTS_PREFIX}{}", normalize_tx_hash(tx_hash))
    }

    fn token_key(token: &str) -> String {
        format!("{TOKEN_PREFIX}{token}")
    }

    async fn modify_order<R, F>(&self, order_id: &OrderId, f: F) -> Result<R, StoreError>
    where F: FnOnce(&mut Order) -> Result<R, StoreError> {
        let _guard = self.write_lock.lock().await;
        let key = Self::order_key(order_id);
        let mut order: Order = self.get_json(&key).await?.ok_or_else(|| StoreError::OrderNotFound(order_id.clone()))?;
        let before = order.clone();
        let result = f(&mut order)?;
        if order != before {
            self.set_json(&key, &order).await?;
        }
        Ok(result)
    }

    async fn fetch_all<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>, StoreError> {
        let keys = self.keys(&format!("{prefix}*")).await?;
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(v) = self.get_json(&key).await? {
                values.push(v);
            }
        }
        Ok(values)
    }
}

impl OrderStore for RemoteKvStore {
    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, StoreError> {
        self.get_json(&Self::order_key(order_id)).await
    }

    async fn upsert_order(&self, mut order: Order) -> Result<Order, StoreError> {
        let _guard = self.write_lock.lock().await;
        order.updated_at = Utc::now();
        self.set_json(&Self::order_key(&order.order_id), &order).await?;
        debug!("🗃️ Order {} saved", order.order_id);
        Ok(order)
    }

    async fn update_status(&self, order_id: &OrderId, status: OrderStatusType) -> Result<StatusChange, StoreError> {
        self.modify_order(order_id, |order| {
            let transition = order.apply_status(status)?;
            Ok(StatusChange { order: order.clone(), transition })
        })
        .await
    }

    async fn update_meta(&self, order_id: &OrderId, patch: MetaPatch) -> Result<Order, StoreError> {
        self.modify_order(order_id, |order| {
            order.meta.apply(patch);
            order.updated_at = Utc::now();
            Ok(order.clone())
        })
        .await
    }

    async fn is_jti_used(&self, order_id: &OrderId, jti: &str) -> Result<bool, StoreError> {
        let order = self.fetch_order(order_id).await?.ok_or_else(|| StoreError::OrderNotFound(order_id.clone()))?;
        Ok(order.meta.used_jti.contains(jti))
    }

    async fn mark_jti_used(&self, order_id: &OrderId, jti: &str) -> Result<bool, StoreError> {
        self.modify_order(order_id, |order| {
            let newly_marked = order.meta.used_jti.insert(jti.to_string());
            if newly_marked {
                order.updated_at = Utc::now();
            }
            Ok(newly_marked)
        })
        .await
    }

    async fn record_jti_use(&self, order_id: &OrderId, jti: &str, max_uses: u32) -> Result<bool, StoreError> {
        self.modify_order(order_id, |order| {
            let recorded = order.meta.record_jti_use(jti, max_uses);
            if recorded {
                order.updated_at = Utc::now();
            }
            Ok(recorded)
        })
        .await
    }

    async fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> = self.fetch_all(ORDER_PREFIX).await?;
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }
}

impl PaymentLedger for RemoteKvStore {
    async fn find_passed_record(&self, tx_hash: &str) -> Result<Option<PaymentRecord>, StoreError> {
        let records: Vec<PaymentRecord> = self.get_json(&Self::payments_key(tx_hash)).await?.unwrap_or_default();
        Ok(records.into_iter().find(PaymentRecord::is_pass))
    }

    async fn append_record(&self, record: PaymentRecord) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let key = Self::payments_key(&record.tx_hash);
        let mut records: Vec<PaymentRecord> = self.get_json(&key).await?.unwrap_or_default();
        records.push(record);
        self.set_json(&key, &records).await
    }

    async fn credit_onchain_payment(
        &self,
        record: PaymentRecord,
        token: TokenRecord,
    ) -> Result<CreditOutcome, StoreError> {
        let _guard = self.write_lock.lock().await;
        let payments_key = Self::payments_key(&record.tx_hash);
        let mut records: Vec<PaymentRecord> = self.get_json(&payments_key).await?.unwrap_or_default();
        if let Some(existing) = records.iter().find(|r| r.is_pass()) {
            debug!("🗃️ Transaction {} has already been credited", record.tx_hash);
            return Ok(CreditOutcome::AlreadyCredited(existing.clone()));
        }
        let order_key = Self::order_key(&record.order_id);
        let mut order: Order =
            self.get_json(&order_key).await?.ok_or_else(|| StoreError::OrderNotFound(record.order_id.clone()))?;
        if !apply_credit(&mut order, &record, &token) {
            return Ok(CreditOutcome::OrderNotPending(order));
        }
        let token_key = Self::token_key(&token.token);
        if self.get_json::<TokenRecord>(&token_key).await?.is_some() {
            return Err(StoreError::TokenAlreadyExists(token.token));
        }
        self.set_json(&token_key, &token).await?;
        self.set_json(&order_key, &order).await?;
        records.push(record);
        self.set_json(&payments_key, &records).await?;
        Ok(CreditOutcome::Credited(order))
    }

    async fn records_for_order(&self, order_id: &OrderId) -> Result<Vec<PaymentRecord>, StoreError> {
        let all: Vec<Vec<PaymentRecord>> = self.fetch_all(PAYMENTS_PREFIX).await?;
        let mut records = all.into_iter().flatten().filter(|r| &r.order_id == order_id).collect::<Vec<_>>();
        records.sort_by_key(|r| r.verified_at);
        Ok(records)
    }
}

impl TokenStore for RemoteKvStore {
    async fn insert_token(&self, record: TokenRecord) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let key = Self::token_key(&record.token);
        if self.get_json::<TokenRecord>(&key).await?.is_some() {
            return Err(StoreError::TokenAlreadyExists(record.token));
        }
        self.set_json(&key, &record).await
    }

    async fn fetch_token(&self, token: &str) -> Result<Option<TokenRecord>, StoreError> {
        self.get_json(&Self::token_key(token)).await
    }

    async fn consume_token(&self, token: &str, now: DateTime<Utc>) -> Result<ConsumeOutcome, StoreError> {
        let _guard = self.write_lock.lock().await;
        let key = Self::token_key(token);
        let mut record: TokenRecord = match self.get_json(&key).await? {
            Some(r) => r,
            None => return Ok(ConsumeOutcome::NotFound),
        };
        match record.try_consume(now) {
            Err(TokenRejection::Expired) => Ok(ConsumeOutcome::Expired),
            Err(TokenRejection::Exhausted) => Ok(ConsumeOutcome::Exhausted),
            Ok(()) => {
                self.set_json(&key, &record).await?;
                Ok(ConsumeOutcome::Consumed(record))
            },
        }
    }
}
