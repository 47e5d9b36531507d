use std::{sync::Arc, time::Duration};

use dgw_common::Secret;
use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    Method,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::{
    db_types::ProviderKind,
    traits::{Invoice, InvoiceProvider, InvoiceRequest, ProviderError},
};

pub const DEFAULT_INVOICE_API_URL: &str = "https://api.nowpayments.io/v1";

#[derive(Debug, Clone)]
pub struct HostedInvoiceConfig {
    pub api_url: String,
    pub api_key: Secret<String>,
    /// Where the provider should post payment notifications
    pub ipn_callback_url: Option<String>,
    /// Where the buyer is sent after paying
    pub success_url: Option<String>,
    pub timeout: Duration,
}

impl HostedInvoiceConfig {
    pub fn new<S: Into<String>>(api_key: S) -> Self {
        Self {
            api_url: DEFAULT_INVOICE_API_URL.to_string(),
            api_key: Secret::new(api_key.into()),
            ipn_callback_url: None,
            success_url: None,
            timeout: Duration::from_secs(20),
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateInvoiceBody<'a> {
    price_amount: f64,
    price_currency: &'a str,
    order_id: &'a str,
    order_description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    ipn_callback_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    success_url: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct CreateInvoiceResponse {
    /// Numeric or string, depending on the endpoint version
    id: Value,
    invoice_url: String,
}

#[derive(Debug, Deserialize)]
struct PaymentStatusResponse {
    payment_status: String,
}

/// Client for a NOWPayments-style hosted invoice API.
///
/// Requests carry the API key in the `x-api-key` header and are bounded by the configured timeout. Any transport
/// failure or non-2xx response is a [`ProviderError`]. None of them is ever read as a payment outcome.
#[derive(Clone)]
pub struct HostedInvoiceClient {
    config: Arc<HostedInvoiceConfig>,
    client: Client,
}

impl HostedInvoiceClient {
    pub fn new(config: HostedInvoiceConfig) -> Result<Self, ProviderError> {
        if config.api_key.is_empty() {
            return Err(ProviderError::NotConfigured("An invoice API key is required".into()));
        }
        let mut headers = HeaderMap::with_capacity(2);
        let mut key = HeaderValue::from_str(config.api_key.reveal().as_str())
            .map_err(|e| ProviderError::NotConfigured(format!("Invalid API key. {e}")))?;
        key.set_sensitive(true);
        headers.insert("x-api-key", key);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(e.to_string()))?;
        Ok(Self { config: Arc::new(config), client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_url.trim_end_matches('/'))
    }

    async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<B>,
    ) -> Result<T, ProviderError> {
        let url = self.url(path);
        trace!("🧾️ Sending invoice API request: {method} {url}");
        let mut req = self.client.request(method, url);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await?;
        let status = response.status();
        if status.is_success() {
            trace!("🧾️ Invoice API request successful. {status}");
            response.json::<T>().await.map_err(|e| ProviderError::InvalidResponse(e.to_string()))
        } else {
            let body = response.text().await.unwrap_or_default();
            warn!("🧾️ Invoice API responded with {status}. {body}");
            Err(ProviderError::Status { status: status.as_u16(), body })
        }
    }
}

impl InvoiceProvider for HostedInvoiceClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::HostedInvoice
    }

    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<Invoice, ProviderError> {
        let body = CreateInvoiceBody {
            price_amount: request.amount.as_major_f64(),
            price_currency: request.currency.as_str(),
            order_id: request.order_id.as_str(),
            order_description: request.description.clone().unwrap_or_else(|| request.product_id.clone()),
            ipn_callback_url: self.config.ipn_callback_url.as_deref(),
            success_url: self.config.success_url.as_deref(),
        };
        let response: CreateInvoiceResponse = self.rest_query(Method::POST, "/invoice", Some(body)).await?;
        let payment_id = match response.id {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            other => return Err(ProviderError::InvalidResponse(format!("Unexpected invoice id: {other}"))),
        };
        info!("🧾️ Invoice {payment_id} created for order {}", request.order_id);
        Ok(Invoice { payment_id, invoice_url: response.invoice_url })
    }

    async fn get_status(&self, payment_id: &str) -> Result<String, ProviderError> {
        let path = format!("/payment/{payment_id}");
        let response: PaymentStatusResponse = self.rest_query::<_, ()>(Method::GET, &path, None).await?;
        debug!("🧾️ Payment {payment_id} has status {}", response.payment_status);
        Ok(response.payment_status)
    }
}
