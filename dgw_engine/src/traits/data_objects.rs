use std::path::PathBuf;

use dgw_common::{FiatAmount, Wei};
use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderId, OrderStatusType, PaymentRecord, StatusTransition, TokenRecord};

//--------------------------------------     Store results     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    /// The order as it stands after the call
    pub order: Order,
    pub transition: StatusTransition,
}

impl StatusChange {
    pub fn is_changed(&self) -> bool {
        self.transition == StatusTransition::Changed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// The token was valid and one use has been recorded. Carries the updated record.
    Consumed(TokenRecord),
    NotFound,
    Expired,
    Exhausted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CreditOutcome {
    /// The payment was credited and the order is now paid.
    Credited(Order),
    /// The transaction had already been credited. Nothing was written.
    AlreadyCredited(PaymentRecord),
    /// The order is no longer awaiting payment. Nothing was written.
    OrderNotPending(Order),
}

//--------------------------------------       Invoices        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRequest {
    pub order_id: OrderId,
    pub product_id: String,
    pub amount: FiatAmount,
    pub currency: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    /// The provider's identifier for this payment
    pub payment_id: String,
    pub invoice_url: String,
}

/// A provider's payment status, reduced to what the gateway acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Paid,
    Pending,
    Expired,
    Failed,
}

impl InvoiceStatus {
    /// Maps a provider status string onto an [`InvoiceStatus`].
    ///
    /// | Provider status                                       | Result    |
    /// |-------------------------------------------------------|-----------|
    /// | `confirmed`, `finished`, `sending`, `partially_paid`   | `Paid`    |
    /// | `waiting`, `confirming`                               | `Pending` |
    /// | `expired`                                             | `Expired` |
    /// | `failed`, `refunded`                                  | `Failed`  |
    /// | anything else                                         | `Pending` |
    ///
    /// An unrecognised status is never treated as paid.
    pub fn from_provider(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "confirmed" | "finished" | "sending" | "partially_paid" => Self::Paid,
            "waiting" | "confirming" => Self::Pending,
            "expired" => Self::Expired,
            "failed" | "refunded" => Self::Failed,
            _ => Self::Pending,
        }
    }

    /// The order status this provider status moves a pending order to, if any.
    pub fn target_status(&self) -> Option<OrderStatusType> {
        match self {
            Self::Paid => Some(OrderStatusType::Paid),
            Self::Pending => None,
            Self::Expired => Some(OrderStatusType::Expired),
            Self::Failed => Some(OrderStatusType::Failed),
        }
    }
}

//--------------------------------------     Chain objects     ---------------------------------------------------------
/// The fields of `eth_getTransactionByHash` that the verifier uses. Quantities are left as raw hex strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainTransaction {
    pub hash: String,
    #[serde(default)]
    pub from: Option<String>,
    /// `None` for contract creation
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub chain_id: Option<String>,
    #[serde(default)]
    pub block_number: Option<String>,
}

/// The fields of `eth_getTransactionReceipt` that the verifier uses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainReceipt {
    #[serde(default)]
    pub transaction_hash: Option<String>,
    /// `0x1` on success
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub block_number: Option<String>,
}

//--------------------------------------       Products        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub product_id: String,
    #[serde(default)]
    pub title: String,
    pub price: FiatAmount,
    #[serde(default = "default_currency")]
    pub currency: String,
    /// File name of the packaged deliverable, relative to the packages directory
    pub package: String,
    /// An explicit on-chain price. When absent the price is converted at the configured rate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_wei: Option<Wei>,
}

fn default_currency() -> String {
    dgw_common::DEFAULT_FIAT_CURRENCY.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub product_id: String,
    pub package_path: PathBuf,
    pub filename: String,
}
