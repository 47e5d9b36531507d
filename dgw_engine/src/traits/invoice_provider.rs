use thiserror::Error;

use crate::{
    db_types::ProviderKind,
    traits::data_objects::{Invoice, InvoiceRequest},
};

/// Failures talking to an invoice provider. All of them mean "provider unavailable" and are safe to retry. None of them
/// ever says anything about whether a payment succeeded.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Could not reach the invoice provider. {0}")]
    Transport(String),
    #[error("The invoice provider responded with HTTP {status}. {body}")]
    Status { status: u16, body: String },
    #[error("The invoice provider sent a response we could not understand. {0}")]
    InvalidResponse(String),
    #[error("The invoice provider is not configured. {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

/// A hosted crypto-invoice service.
#[allow(async_fn_in_trait)]
pub trait InvoiceProvider: Clone {
    /// Which order flow this provider drives
    fn kind(&self) -> ProviderKind;

    /// Creates an invoice for the order and returns the provider's payment id and the URL the buyer pays at.
    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<Invoice, ProviderError>;

    /// The provider's raw status string for the payment. Map it with
    /// [`InvoiceStatus::from_provider`](crate::traits::InvoiceStatus::from_provider).
    async fn get_status(&self, payment_id: &str) -> Result<String, ProviderError>;
}
