use std::path::PathBuf;

use dgw_common::{FiatAmount, Wei};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    db_types::{Order, OrderId, OrderStatusType, ProviderKind},
    tokens::TokenConfig,
};

pub const DEFAULT_CHAIN_ID: u64 = 1;

#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// The address buyers pay on-chain. On-chain checkout is unavailable without it.
    pub merchant_address: Option<String>,
    pub chain_id: u64,
    /// Exchange rate used to price products that don't list a wei price
    pub usd_cents_per_native: Option<u64>,
    /// The RPC endpoint advertised to buyers
    pub rpc_endpoint: String,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self { merchant_address: None, chain_id: DEFAULT_CHAIN_ID, usd_cents_per_native: None, rpc_endpoint: String::new() }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayOptions {
    /// The externally visible base URL, used to build download links
    pub public_url: String,
    pub chain: ChainConfig,
    pub tokens: TokenConfig,
    pub admin_enabled: bool,
}

impl GatewayOptions {
    pub fn new<S: Into<String>>(public_url: S, tokens: TokenConfig) -> Self {
        Self { public_url: public_url.into(), chain: ChainConfig::default(), tokens, admin_enabled: false }
    }
}

//--------------------------------------     Hosted invoices    --------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartOrderRequest {
    pub product_id: String,
    #[serde(default)]
    pub amount: Option<FiatAmount>,
    #[serde(default)]
    pub currency: Option<String>,
}

impl StartOrderRequest {
    pub fn new<S: Into<String>>(product_id: S) -> Self {
        Self { product_id: product_id.into(), amount: None, currency: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartOrderResult {
    pub order_id: OrderId,
    pub status: OrderStatusType,
    pub provider: ProviderKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_url: Option<String>,
    pub amount: FiatAmount,
    pub currency: String,
}

impl From<Order> for StartOrderResult {
    fn from(order: Order) -> Self {
        Self {
            order_id: order.order_id,
            status: order.status,
            provider: order.provider,
            invoice_url: order.provider_invoice_url,
            amount: order.amount,
            currency: order.currency,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckOrderResult {
    pub order_id: OrderId,
    pub status: OrderStatusType,
    pub provider: ProviderKind,
    pub can_download: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Unix timestamp after which `token` no longer works
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

/// The parts of an invoice provider's payment notification that the gateway acts on. Providers send many more fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceNotification {
    pub order_id: OrderId,
    pub payment_status: String,
    #[serde(default)]
    pub payment_id: Option<Value>,
    #[serde(default)]
    pub invoice_id: Option<Value>,
}

//--------------------------------------     On-chain payments   -------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvmOrderRequest {
    pub product_id: String,
    #[serde(default)]
    pub buyer_wallet: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvmOrderResult {
    pub order_id: OrderId,
    pub status: OrderStatusType,
    pub product_id: String,
    pub expected_amount: Wei,
    pub chain_id: u64,
    pub merchant_address: String,
    pub rpc_endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyPaymentRequest {
    pub tx_hash: String,
    pub chain_id: u64,
    pub product_id: String,
    #[serde(default)]
    pub buyer_wallet: Option<String>,
    #[serde(default)]
    pub order_id: Option<OrderId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyPaymentResult {
    pub ok: bool,
    pub order_id: OrderId,
    /// True when this transaction had already been credited by an earlier call
    pub already_verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

//--------------------------------------        Downloads        -------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadResult {
    pub ok: bool,
    pub order_id: OrderId,
    pub product_id: String,
    pub package_path: PathBuf,
    pub filename: String,
}

//--------------------------------------          Admin          -------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkPaidResult {
    pub order: Order,
    /// False if the order was already paid or delivered
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_token: Option<String>,
}
