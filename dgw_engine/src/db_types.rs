use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Display,
    str::FromStr,
};

use chrono::{DateTime, Utc};
use dgw_common::{FiatAmount, Wei};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(String);

//--------------------------------------        OrderId        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    /// A fresh, unguessable order id.
    pub fn random() -> Self {
        let mut bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(format!("ord_{}", hex::encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

const MAX_ORDER_ID_LEN: usize = 64;

/// Order ids are 1-64 characters of `[A-Za-z0-9_-]`.
pub fn is_valid_order_id(s: &str) -> bool {
    !s.is_empty() &&
        s.len() <= MAX_ORDER_ID_LEN &&
        s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Parses an order id supplied by a caller. Anything outside `[A-Za-z0-9_-]` is rejected.
impl FromStr for OrderId {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ConversionError("order id cannot be empty".into()));
        }
        if !is_valid_order_id(s) {
            return Err(ConversionError(format!("'{s}' is not a valid order id")));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatusType {
    /// A hosted or simulated invoice has been created and is waiting for settlement.
    Pending,
    /// An on-chain order is waiting for the buyer to submit a transaction.
    PendingPayment,
    /// Payment has been positively confirmed.
    Paid,
    /// At least one download has been served.
    Delivered,
    /// The invoice window lapsed without payment.
    Expired,
    /// The provider reported the payment as failed or refunded.
    Failed,
}

/// The result of asking for a status change that the state machine allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTransition {
    Changed,
    /// The order is already in the requested state, or has already moved past it (`Delivered` when `Paid` is
    /// requested).
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Order status cannot change from {from} to {to}")]
pub struct IllegalTransition {
    pub from: OrderStatusType,
    pub to: OrderStatusType,
}

impl OrderStatusType {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending | Self::PendingPayment)
    }

    /// Payment has been received. Downloads are allowed only in these states.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Paid | Self::Delivered)
    }

    /// Checks a status change against the order state machine.
    ///
    /// | From \ To      | Pending | PendingPayment | Paid      | Delivered | Expired | Failed |
    /// |----------------|---------|----------------|-----------|-----------|---------|--------|
    /// | Pending        | same    | Err            | ok        | Err       | ok      | ok     |
    /// | PendingPayment | Err     | same           | ok        | Err       | ok      | ok     |
    /// | Paid           | Err     | Err            | same      | ok        | Err     | Err    |
    /// | Delivered      | Err     | Err            | unchanged | same      | Err     | Err    |
    /// | Expired        | Err     | Err            | Err       | Err       | same    | Err    |
    /// | Failed         | Err     | Err            | Err       | Err       | Err     | same   |
    ///
    /// Nothing ever moves from `Paid` or `Delivered` back to a pre-payment state.
    pub fn transition(self, to: OrderStatusType) -> Result<StatusTransition, IllegalTransition> {
        use OrderStatusType::*;
        match (self, to) {
            (from, to) if from == to => Ok(StatusTransition::Unchanged),
            (Delivered, Paid) => Ok(StatusTransition::Unchanged),
            (Pending | PendingPayment, Paid | Expired | Failed) => Ok(StatusTransition::Changed),
            (Paid, Delivered) => Ok(StatusTransition::Changed),
            (from, to) => Err(IllegalTransition { from, to }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::PendingPayment => "pending_payment",
            Self::Paid => "paid",
            Self::Delivered => "delivered",
            Self::Expired => "expired",
            Self::Failed => "failed",
        }
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "pending_payment" => Ok(Self::PendingPayment),
            "paid" => Ok(Self::Paid),
            "delivered" => Ok(Self::Delivered),
            "expired" => Ok(Self::Expired),
            "failed" => Ok(Self::Failed),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------     ProviderKind      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    HostedInvoice,
    OnChain,
    Simulated,
}

impl ProviderKind {
    /// Orders of this kind are settled through an invoice provider and downloaded with compact signed tokens.
    pub fn uses_invoices(&self) -> bool {
        matches!(self, Self::HostedInvoice | Self::Simulated)
    }
}

impl Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HostedInvoice => write!(f, "hosted-invoice"),
            Self::OnChain => write!(f, "on-chain"),
            Self::Simulated => write!(f, "simulated"),
        }
    }
}

//--------------------------------------       OrderMeta       ---------------------------------------------------------
/// Provider-specific order data. The known fields are typed; anything else lands in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer_wallet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_amount_wei: Option<Wei>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_token: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub used_jti: BTreeSet<String>,
    /// Downloads served so far per compact token id. A `jti` moves to `used_jti` once it reaches its limit.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub jti_uses: BTreeMap<String, u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OrderMeta {
    /// Counts one use of the compact token id `jti`, allowing at most `max_uses` in total. Returns `false`, changing
    /// nothing, once the limit has been reached.
    pub fn record_jti_use(&mut self, jti: &str, max_uses: u32) -> bool {
        let max_uses = max_uses.max(1);
        let uses = self.jti_uses.get(jti).copied().unwrap_or(0);
        if self.used_jti.contains(jti) || uses >= max_uses {
            return false;
        }
        self.jti_uses.insert(jti.to_string(), uses + 1);
        if uses + 1 >= max_uses {
            self.used_jti.insert(jti.to_string());
        }
        true
    }

    pub fn apply(&mut self, patch: MetaPatch) {
        let MetaPatch { buyer_wallet, chain_id, expected_amount_wei, tx_hash, paid_at, download_token, extra } = patch;
        if buyer_wallet.is_some() {
            self.buyer_wallet = buyer_wallet;
        }
        if chain_id.is_some() {
            self.chain_id = chain_id;
        }
        if expected_amount_wei.is_some() {
            self.expected_amount_wei = expected_amount_wei;
        }
        if tx_hash.is_some() {
            self.tx_hash = tx_hash;
        }
        if paid_at.is_some() {
            self.paid_at = paid_at;
        }
        if download_token.is_some() {
            self.download_token = download_token;
        }
        self.extra.extend(extra);
    }
}

/// A partial update to [`OrderMeta`]. `None` fields are left untouched. Token use bookkeeping (`used_jti` and
/// `jti_uses`) can only be changed via the store's `mark_jti_used` and `record_jti_use`.
#[derive(Debug, Clone, Default)]
pub struct MetaPatch {
    pub buyer_wallet: Option<String>,
    pub chain_id: Option<u64>,
    pub expected_amount_wei: Option<Wei>,
    pub tx_hash: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub download_token: Option<String>,
    pub extra: Map<String, Value>,
}

impl MetaPatch {
    pub fn with_tx_hash<S: Into<String>>(mut self, tx_hash: S) -> Self {
        self.tx_hash = Some(tx_hash.into());
        self
    }

    pub fn with_paid_at(mut self, paid_at: DateTime<Utc>) -> Self {
        self.paid_at = Some(paid_at);
        self
    }

    pub fn with_download_token<S: Into<String>>(mut self, token: S) -> Self {
        self.download_token = Some(token.into());
        self
    }

    pub fn with_extra<S: Into<String>>(mut self, key: S, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

//--------------------------------------        Order       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub product_id: String,
    pub amount: FiatAmount,
    pub currency: String,
    pub status: OrderStatusType,
    pub provider: ProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_payment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_invoice_url: Option<String>,
    #[serde(default)]
    pub meta: OrderMeta,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new<S: Into<String>>(
        order_id: OrderId,
        product_id: S,
        amount: FiatAmount,
        currency: S,
        provider: ProviderKind,
    ) -> Self {
        let status = match provider {
            ProviderKind::OnChain => OrderStatusType::PendingPayment,
            _ => OrderStatusType::Pending,
        };
        let now = Utc::now();
        Self {
            order_id,
            product_id: product_id.into(),
            amount,
            currency: currency.into(),
            status,
            provider,
            provider_payment_id: None,
            provider_invoice_url: None,
            meta: OrderMeta::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_invoice<S: Into<String>>(mut self, payment_id: S, invoice_url: S) -> Self {
        self.provider_payment_id = Some(payment_id.into());
        self.provider_invoice_url = Some(invoice_url.into());
        self
    }

    pub fn with_meta(mut self, meta: OrderMeta) -> Self {
        self.meta = meta;
        self
    }

    /// Applies a status change in memory, subject to [`OrderStatusType::transition`]. Bumps `updated_at` only when
    /// the status actually changes.
    pub fn apply_status(&mut self, status: OrderStatusType) -> Result<StatusTransition, IllegalTransition> {
        let transition = self.status.transition(status)?;
        if transition == StatusTransition::Changed {
            self.status = status;
            self.updated_at = Utc::now();
        }
        Ok(transition)
    }
}

//--------------------------------------     PaymentRecord     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PaymentResult {
    Pass,
    Fail { reason: String },
}

/// One entry in the on-chain payment ledger. Records are only ever appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// Lower-cased transaction hash
    pub tx_hash: String,
    pub order_id: OrderId,
    pub chain_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Wei>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    pub verified_at: DateTime<Utc>,
    #[serde(flatten)]
    pub result: PaymentResult,
    /// The opaque download token issued when this record passed. Replays of the same transaction hand this back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_token: Option<String>,
}

impl PaymentRecord {
    pub fn is_pass(&self) -> bool {
        matches!(self.result, PaymentResult::Pass)
    }
}

/// Transaction hashes are compared case-insensitively.
pub fn normalize_tx_hash(tx_hash: &str) -> String {
    tx_hash.trim().to_ascii_lowercase()
}

//--------------------------------------      TokenRecord      ---------------------------------------------------------
/// A persisted opaque download token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub token: String,
    pub order_id: OrderId,
    pub product_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub use_count: u32,
    pub max_uses: u32,
}

impl TokenRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_exhausted(&self) -> bool {
        self.use_count >= self.max_uses
    }

    /// Records one use if the token is still live at `now`.
    pub fn try_consume(&mut self, now: DateTime<Utc>) -> Result<(), TokenRejection> {
        if self.is_expired_at(now) {
            return Err(TokenRejection::Expired);
        }
        if self.is_exhausted() {
            return Err(TokenRejection::Exhausted);
        }
        self.use_count += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    Expired,
    Exhausted,
}
