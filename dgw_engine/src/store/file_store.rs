use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use log::*;
use serde::{de::DeserializeOwned, Serialize};
use tokio::{fs, io::AsyncWriteExt, sync::Mutex};

use crate::{
    db_types::{normalize_tx_hash, MetaPatch, Order, OrderId, OrderStatusType, PaymentRecord, TokenRecord, TokenRejection},
    store::apply_credit,
    traits::{ConsumeOutcome, CreditOutcome, OrderStore, PaymentLedger, StatusChange, StoreError, TokenStore},
};

const ORDERS_FILE: &str = "orders.json";
const PAYMENTS_FILE: &str = "payments.json";
const TOKENS_FILE: &str = "tokens.json";

type TokenTable = BTreeMap<String, TokenRecord>;

/// A store that keeps each collection as a single JSON document in `data_dir`.
///
/// Every mutation takes the writer lock, reads the whole collection, changes it in memory and writes it back to a
/// temporary file that is then renamed over the original. Readers never see a half-written file.
///
/// Reads treat a missing or corrupt collection as empty. Writes refuse to touch a corrupt collection, so it is never
/// silently replaced by an empty one.
#[derive(Clone)]
pub struct FileStore {
    data_dir: Arc<PathBuf>,
    write_lock: Arc<Mutex<()>>,
}

impl FileStore {
    pub async fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, StoreError> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir).await?;
        info!("🗃️ File store opened in {}", data_dir.display());
        Ok(Self { data_dir: Arc::new(data_dir), write_lock: Arc::new(Mutex::new(())) })
    }

    pub fn data_dir(&self) -> &Path {
        self.data_dir.as_path()
    }

    fn path(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    async fn read_collection<T: DeserializeOwned + Default>(&self, name: &str) -> T {
        match self.load_collection(name).await {
            Ok(v) => v,
            Err(e) => {
                warn!("🗃️ Could not read {name}. Treating it as empty. {e}");
                T::default()
            },
        }
    }

    async fn load_collection<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T, StoreError> {
        match fs::read(self.path(name)).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(T::default()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(T::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_collection<T: Serialize>(&self, name: &str, value: &T) -> Result<(), StoreError> {
        let path = self.path(name);
        let tmp = self.path(&format!(".{name}.{:016x}.tmp", rand::random::<u64>()));
        let bytes = serde_json::to_vec_pretty(value)?;
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        trace!("🗃️ {name} written");
        Ok(())
    }

    /// Read-modify-write of a single order under the writer lock. The collection is only rewritten if `f` changed
    /// the order.
    async fn modify_order<R, F>(&self, order_id: &OrderId, f: F) -> Result<R, StoreError>
    where F: FnOnce(&mut Order) -> Result<R, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut orders: Vec<Order> = self.load_collection(ORDERS_FILE).await?;
        let order = orders
            .iter_mut()
            .find(|o| &o.order_id == order_id)
            .ok_or_else(|| StoreError::OrderNotFound(order_id.clone()))?;
        let before = order.clone();
        let result = f(order)?;
        if *order != before {
            self.write_collection(ORDERS_FILE, &orders).await?;
        }
        Ok(result)
    }
}

impl OrderStore for FileStore {
    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, StoreError> {
        let orders: Vec<Order> = self.read_collection(ORDERS_FILE).await;
        Ok(orders.into_iter().find(|o| &o.order_id == order_id))
    }

    async fn upsert_order(&self, mut order: Order) -> Result<Order, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut orders: Vec<Order> = self.load_collection(ORDERS_FILE).await?;
        order.updated_at = Utc::now();
        match orders.iter_mut().find(|o| o.order_id == order.order_id) {
            Some(existing) => *existing = order.clone(),
            None => orders.push(order.clone()),
        }
        self.write_collection(ORDERS_FILE, &orders).await?;
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
        let mut orders: Vec<Order> = self.read_collection(ORDERS_FILE).await;
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }
}

impl PaymentLedger for FileStore {
    async fn find_passed_record(&self, tx_hash: &str) -> Result<Option<PaymentRecord>, StoreError> {
        let tx_hash = normalize_tx_hash(tx_hash);
        let records: Vec<PaymentRecord> = self.read_collection(PAYMENTS_FILE).await;
        Ok(records.into_iter().find(|r| r.tx_hash == tx_hash && r.is_pass()))
    }

    async fn append_record(&self, record: PaymentRecord) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut records: Vec<PaymentRecord> = self.load_collection(PAYMENTS_FILE).await?;
        records.push(record);
        self.write_collection(PAYMENTS_FILE, &records).await
    }

    async fn credit_onchain_payment(
        &self,
        record: PaymentRecord,
        token: TokenRecord,
    ) -> Result<CreditOutcome, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut records: Vec<PaymentRecord> = self.load_collection(PAYMENTS_FILE).await?;
        if let Some(existing) = records.iter().find(|r| r.tx_hash == record.tx_hash && r.is_pass()) {
            debug!("🗃️ Transaction {} has already been credited", record.tx_hash);
            return Ok(CreditOutcome::AlreadyCredited(existing.clone()));
        }
        let mut orders: Vec<Order> = self.load_collection(ORDERS_FILE).await?;
        let order = orders
            .iter_mut()
            .find(|o| o.order_id == record.order_id)
            .ok_or_else(|| StoreError::OrderNotFound(record.order_id.clone()))?;
        if !apply_credit(order, &record, &token) {
            return Ok(CreditOutcome::OrderNotPending(order.clone()));
        }
        let credited = order.clone();
        let mut tokens: TokenTable = self.load_collection(TOKENS_FILE).await?;
        if tokens.contains_key(&token.token) {
            return Err(StoreError::TokenAlreadyExists(token.token));
        }
        tokens.insert(token.token.clone(), token);
        records.push(record);
        // The pass record goes last. Until it lands, a replay of the transaction is not short-circuited.
        self.write_collection(TOKENS_FILE, &tokens).await?;
        self.write_collection(ORDERS_FILE, &orders).await?;
        self.write_collection(PAYMENTS_FILE, &records).await?;
        Ok(CreditOutcome::Credited(credited))
    }

    async fn records_for_order(&self, order_id: &OrderId) -> Result<Vec<PaymentRecord>, StoreError> {
        let records: Vec<PaymentRecord> = self.read_collection(PAYMENTS_FILE).await;
        Ok(records.into_iter().filter(|r| &r.order_id == order_id).collect())
    }
}

impl TokenStore for FileStore {
    async fn insert_token(&self, record: TokenRecord) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut tokens: TokenTable = self.load_collection(TOKENS_FILE).await?;
        if tokens.contains_key(&record.token) {
            return Err(StoreError::TokenAlreadyExists(record.token));
        }
        tokens.insert(record.token.clone(), record);
        self.write_collection(TOKENS_FILE, &tokens).await
    }

    async fn fetch_token(&self, token: &str) -> Result<Option<TokenRecord>, StoreError> {
        let mut tokens: TokenTable = self.read_collection(TOKENS_FILE).await;
        Ok(tokens.remove(token))
    }

    async fn consume_token(&self, token: &str, now: DateTime<Utc>) -> Result<ConsumeOutcome, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut tokens: TokenTable = self.load_collection(TOKENS_FILE).await?;
        let record = match tokens.get_mut(token) {
            Some(r) => r,
            None => return Ok(ConsumeOutcome::NotFound),
        };
        match record.try_consume(now) {
            Err(TokenRejection::Expired) => Ok(ConsumeOutcome::Expired),
            Err(TokenRejection::Exhausted) => Ok(ConsumeOutcome::Exhausted),
            Ok(()) => {
                let updated = record.clone();
                self.write_collection(TOKENS_FILE, &tokens).await?;
                Ok(ConsumeOutcome::Consumed(updated))
            },
        }
    }
}
