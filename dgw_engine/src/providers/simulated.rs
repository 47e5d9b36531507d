use log::*;

use crate::{
    db_types::ProviderKind,
    traits::{Invoice, InvoiceProvider, InvoiceRequest, ProviderError},
};

pub const SIMULATED_PAYMENT_PREFIX: &str = "sim_";

/// A provider that settles every invoice it issues.
///
/// It is deterministic and keeps no state: payment ids are `sim_{order_id}`, and any payment id with that prefix
/// reports `finished`. Anything else reports `waiting`.
#[derive(Debug, Clone)]
pub struct SimulatedProvider {
    base_url: String,
}

impl SimulatedProvider {
    /// `base_url` is where the (fake) invoice pages are said to live
    pub fn new(base_url: &str) -> Self {
        Self { base_url: base_url.trim_end_matches('/').to_string() }
    }
}

impl Default for SimulatedProvider {
    fn default() -> Self {
        Self::new("http://localhost:8360")
    }
}

impl InvoiceProvider for SimulatedProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Simulated
    }

    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<Invoice, ProviderError> {
        let payment_id = format!("{SIMULATED_PAYMENT_PREFIX}{}", request.order_id.as_str());
        let invoice_url = format!("{}/simulated/invoice/{payment_id}", self.base_url);
        info!("🧾️ Simulated invoice {payment_id} for {} {}", request.amount, request.currency);
        Ok(Invoice { payment_id, invoice_url })
    }

    async fn get_status(&self, payment_id: &str) -> Result<String, ProviderError> {
        let status = if payment_id.starts_with(SIMULATED_PAYMENT_PREFIX) { "finished" } else { "waiting" };
        debug!("🧾️ Simulated status for {payment_id}: {status}");
        Ok(status.to_string())
    }
}
