//! Invoice providers.
//!
//! [`HostedInvoiceClient`] talks to a hosted crypto-invoice REST API. [`SimulatedProvider`] satisfies the same contract
//! without any credentials so that the whole order flow can run in test and demo deployments. Which one is used is
//! decided once, from configuration, by building an [`InvoiceBackend`].
mod hosted;
mod simulated;

pub use hosted::{HostedInvoiceClient, HostedInvoiceConfig, DEFAULT_INVOICE_API_URL};
pub use simulated::{SimulatedProvider, SIMULATED_PAYMENT_PREFIX};

use crate::{
    db_types::ProviderKind,
    traits::{Invoice, InvoiceProvider, InvoiceRequest, ProviderError},
};

#[derive(Clone)]
pub enum InvoiceBackend {
    Hosted(HostedInvoiceClient),
    Simulated(SimulatedProvider),
}

impl InvoiceProvider for InvoiceBackend {
    fn kind(&self) -> ProviderKind {
        match self {
            Self::Hosted(p) => p.kind(),
            Self::Simulated(p) => p.kind(),
        }
    }

    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<Invoice, ProviderError> {
        match self {
            Self::Hosted(p) => p.create_invoice(request).await,
            Self::Simulated(p) => p.create_invoice(request).await,
        }
    }

    async fn get_status(&self, payment_id: &str) -> Result<String, ProviderError> {
        match self {
            Self::Hosted(p) => p.get_status(payment_id).await,
            Self::Simulated(p) => p.get_status(payment_id).await,
        }
    }
}
