use std::{fmt::Debug, str::FromStr};

use alloy_primitives::Address;
use chrono::{Duration, Utc};
use dgw_common::Wei;
use log::*;
use serde_json::Value;

use crate::{
    chain::{same_address, OnChainVerifier, Rejection, TransferCheck, VerifyError},
    db_types::{
        is_valid_order_id,
        normalize_tx_hash,
        MetaPatch,
        Order,
        OrderId,
        OrderMeta,
        OrderStatusType,
        PaymentRecord,
        PaymentResult,
        ProviderKind,
    },
    events::{EventProducers, OrderAnnulledEvent, OrderPaidEvent},
    gateway_api::{
        errors::GatewayError,
        order_objects::{
            CheckOrderResult,
            DownloadResult,
            EvmOrderRequest,
            EvmOrderResult,
            GatewayOptions,
            InvoiceNotification,
            MarkPaidResult,
            StartOrderRequest,
            StartOrderResult,
            VerifyPaymentRequest,
            VerifyPaymentResult,
        },
    },
    tokens::{SignedTokenService, TokenClaims, TokenError},
    traits::{
        ArtifactResolver,
        ChainRpc,
        ConsumeOutcome,
        CreditOutcome,
        GatewayStack,
        InvoiceProvider,
        InvoiceRequest,
        InvoiceStatus,
        OrderStore,
        PaymentLedger,
        Product,
        ProductCatalog,
        StoreError,
        TokenStore,
    },
};

/// How a download request proved its right to the package
enum Grant {
    Compact(TokenClaims),
    Opaque(String),
}

/// `OrderFlowApi` runs the whole life of an order: checkout with either payment source, payment confirmation, token
/// issue and the final download.
///
/// It owns no state of its own. Everything durable lives in the store, so any number of clones can serve requests
/// concurrently.
#[derive(Clone)]
pub struct OrderFlowApi<G: GatewayStack> {
    store: G::Store,
    provider: G::Provider,
    verifier: OnChainVerifier<G::Chain>,
    catalog: G::Catalog,
    tokens: SignedTokenService,
    options: GatewayOptions,
    producers: EventProducers,
}

impl<G: GatewayStack> Debug for OrderFlowApi<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi ({})", self.options.public_url)
    }
}

impl<G: GatewayStack> OrderFlowApi<G> {
    pub fn new(
        store: G::Store,
        provider: G::Provider,
        chain: G::Chain,
        catalog: G::Catalog,
        options: GatewayOptions,
        producers: EventProducers,
    ) -> Result<Self, GatewayError> {
        let tokens = SignedTokenService::new(&options.tokens)?;
        if let Some(merchant) = options.chain.merchant_address.as_deref() {
            Address::from_str(merchant.trim())
                .map_err(|e| GatewayError::Configuration(format!("Invalid merchant address {merchant}. {e}")))?;
        }
        let verifier = OnChainVerifier::new(chain);
        Ok(Self { store, provider, verifier, catalog, tokens, options, producers })
    }

    pub fn store(&self) -> &G::Store {
        &self.store
    }

    pub fn options(&self) -> &GatewayOptions {
        &self.options
    }

    pub async fn products(&self) -> Result<Vec<Product>, GatewayError> {
        Ok(self.catalog.list_products().await?)
    }

    async fn product(&self, product_id: &str) -> Result<Product, GatewayError> {
        self.catalog.fetch_product(product_id).await?.ok_or_else(|| GatewayError::ProductNotFound(product_id.into()))
    }

    async fn order(&self, order_id: &OrderId) -> Result<Order, GatewayError> {
        require_valid_id(order_id)?;
        self.store.fetch_order(order_id).await?.ok_or_else(|| GatewayError::OrderNotFound(order_id.clone()))
    }

    fn download_url(&self, order_id: &OrderId, token: &str) -> String {
        let base = self.options.public_url.trim_end_matches('/');
        format!("{base}/api/download?order_id={}&token={token}", order_id.as_str())
    }

    //-----------------------------------------   Hosted invoices   --------------------------------------------------

    /// Starts a hosted-invoice checkout for a catalog product.
    ///
    /// The invoice is created before anything is stored, so a provider failure leaves no trace. The amount defaults to
    /// the list price; buyers may pay more, never less, and only in the product's currency.
    pub async fn start_order(&self, request: StartOrderRequest) -> Result<StartOrderResult, GatewayError> {
        let product_id = request.product_id.trim();
        if product_id.is_empty() {
            return Err(GatewayError::InvalidRequest("product_id is required".into()));
        }
        let product = self.product(product_id).await?;
        let currency = request
            .currency
            .map(|c| c.trim().to_ascii_lowercase())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| product.currency.to_ascii_lowercase());
        if !currency.eq_ignore_ascii_case(&product.currency) {
            return Err(GatewayError::InvalidRequest(format!(
                "{product_id} is priced in {}, not {currency}",
                product.currency
            )));
        }
        let amount = request.amount.unwrap_or(product.price);
        if amount < product.price {
            return Err(GatewayError::InvalidRequest(format!(
                "{amount} is less than the price of {product_id} ({})",
                product.price
            )));
        }
        let order_id = OrderId::random();
        let invoice_request = InvoiceRequest {
            order_id: order_id.clone(),
            product_id: product.product_id.clone(),
            amount,
            currency: currency.clone(),
            description: Some(product.title.clone()).filter(|t| !t.is_empty()),
        };
        let invoice = self.provider.create_invoice(&invoice_request).await.map_err(|e| {
            warn!("🔄️ Could not create an invoice for {product_id}. {e}");
            GatewayError::from(e)
        })?;
        let order = Order::new(order_id, product.product_id, amount, currency, self.provider.kind())
            .with_invoice(invoice.payment_id, invoice.invoice_url);
        let order = self.store.upsert_order(order).await?;
        info!("🔄️ Order {} started for {} ({} {})", order.order_id, order.product_id, order.amount, order.currency);
        Ok(order.into())
    }

    /// Reports an order's status, asking the invoice provider first if the order is still pending.
    ///
    /// Settled hosted-invoice orders get a freshly minted download token with every call. If the provider can't be
    /// reached the order is left exactly as it was and a retryable error is returned.
    pub async fn check_order(&self, order_id: &OrderId) -> Result<CheckOrderResult, GatewayError> {
        let mut order = self.order(order_id).await?;
        if order.status.is_pending() && order.provider.uses_invoices() {
            order = self.poll_provider(order).await?;
        }
        self.check_result(order)
    }

    async fn poll_provider(&self, order: Order) -> Result<Order, GatewayError> {
        let Some(payment_id) = order.provider_payment_id.clone() else {
            warn!("🔄️ Order {} has no invoice to poll. It stays {}", order.order_id, order.status);
            return Ok(order);
        };
        let status = self.provider.get_status(&payment_id).await.map_err(|e| {
            warn!("🔄️ Could not poll invoice {payment_id} for order {}. {e}", order.order_id);
            GatewayError::from(e)
        })?;
        self.apply_invoice_status(order, &status).await
    }

    /// Applies an invoice provider's payment status to a pending order.
    async fn apply_invoice_status(&self, order: Order, provider_status: &str) -> Result<Order, GatewayError> {
        let Some(target) = InvoiceStatus::from_provider(provider_status).target_status() else {
            debug!("🔄️ Invoice for order {} is still open ({provider_status})", order.order_id);
            return Ok(order);
        };
        let change = match self.store.update_status(&order.order_id, target).await {
            Ok(change) => change,
            Err(StoreError::IllegalTransition(e)) => {
                info!("🔄️ Order {} was settled by someone else ({e}). Keeping its current status.", order.order_id);
                return self.order(&order.order_id).await;
            },
            Err(e) => return Err(e.into()),
        };
        if !change.is_changed() {
            return Ok(change.order);
        }
        if target == OrderStatusType::Paid {
            let order =
                self.store.update_meta(&change.order.order_id, MetaPatch::default().with_paid_at(Utc::now())).await?;
            info!("🔄️ Order {} is paid", order.order_id);
            self.producers.publish_order_paid(OrderPaidEvent::new(order.clone())).await;
            Ok(order)
        } else {
            info!("🔄️ Order {} is {}", change.order.order_id, change.order.status);
            self.producers.publish_order_annulled(OrderAnnulledEvent::new(change.order.clone())).await;
            Ok(change.order)
        }
    }

    fn check_result(&self, order: Order) -> Result<CheckOrderResult, GatewayError> {
        let can_download = order.status.is_settled();
        let mut result = CheckOrderResult {
            order_id: order.order_id.clone(),
            status: order.status,
            provider: order.provider,
            can_download,
            download_url: None,
            token: None,
            expires_at: None,
        };
        if !can_download {
            return Ok(result);
        }
        if order.provider.uses_invoices() {
            let (token, claims) = self.tokens.issue(&order.order_id, &order.product_id)?;
            result.download_url = Some(self.download_url(&order.order_id, &token));
            result.token = Some(token);
            result.expires_at = Some(claims.exp);
        } else if let Some(token) = order.meta.download_token.as_deref() {
            result.download_url = Some(self.download_url(&order.order_id, token));
        }
        Ok(result)
    }

    /// Handles a signed payment notification from the invoice provider. Notifications for orders that have already
    /// settled are acknowledged and ignored.
    pub async fn process_invoice_notification(&self, note: InvoiceNotification) -> Result<Order, GatewayError> {
        let order = self.order(&note.order_id).await?;
        if !order.provider.uses_invoices() {
            return Err(GatewayError::InvalidRequest(format!("Order {} is not an invoice order", order.order_id)));
        }
        let reference = note.invoice_id.as_ref().or(note.payment_id.as_ref()).map(id_string).unwrap_or_default();
        debug!("🧾️ Notification for order {} (invoice {reference}): {}", order.order_id, note.payment_status);
        if !order.status.is_pending() {
            debug!("🧾️ Order {} is already {}. Ignoring the notification.", order.order_id, order.status);
            return Ok(order);
        }
        self.apply_invoice_status(order, &note.payment_status).await
    }

    //-----------------------------------------   On-chain payments   ------------------------------------------------

    /// Creates an order to be paid by a direct transfer to the merchant address.
    ///
    /// Without a `buyer_wallet` the order is not bound to a sender. Any transfer to the merchant of at least the
    /// expected amount then pays for it, including one that somebody else sent for their own order. Whoever verifies
    /// a transaction first is credited with it, and the other order gets `tx_hash_already_used`. Shops that can ask
    /// for the buyer's wallet should do so.
    pub async fn create_order_evm(&self, request: EvmOrderRequest) -> Result<EvmOrderResult, GatewayError> {
        let merchant = self.merchant_address()?.to_string();
        let product = self.product(request.product_id.trim()).await?;
        let buyer_wallet = request.buyer_wallet.map(|w| w.trim().to_string()).filter(|w| !w.is_empty());
        if let Some(wallet) = buyer_wallet.as_deref() {
            Address::from_str(wallet)
                .map_err(|_| GatewayError::InvalidRequest(format!("{wallet} is not a valid wallet address")))?;
        }
        let expected = self.expected_wei(&product)?;
        let chain_id = self.options.chain.chain_id;
        let meta =
            OrderMeta { buyer_wallet, chain_id: Some(chain_id), expected_amount_wei: Some(expected), ..Default::default() };
        let order =
            Order::new(OrderId::random(), product.product_id, product.price, product.currency, ProviderKind::OnChain)
                .with_meta(meta);
        let order = self.store.upsert_order(order).await?;
        info!("🔄️ On-chain order {} created for {}. Expecting {expected} wei.", order.order_id, order.product_id);
        let rpc_endpoint = match self.options.chain.rpc_endpoint.as_str() {
            "" => self.verifier.rpc().endpoint().to_string(),
            s => s.to_string(),
        };
        Ok(EvmOrderResult {
            order_id: order.order_id,
            status: order.status,
            product_id: order.product_id,
            expected_amount: expected,
            chain_id,
            merchant_address: merchant,
            rpc_endpoint,
        })
    }

    fn merchant_address(&self) -> Result<&str, GatewayError> {
        self.options
            .chain
            .merchant_address
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| GatewayError::Configuration("No merchant address is configured".into()))
    }

    fn expected_wei(&self, product: &Product) -> Result<Wei, GatewayError> {
        if let Some(price) = product.price_wei {
            return Ok(price);
        }
        let rate = self.options.chain.usd_cents_per_native.ok_or_else(|| {
            GatewayError::Configuration(format!("{} has no wei price and no exchange rate is set", product.product_id))
        })?;
        Wei::from_fiat(product.price, rate).map_err(|e| GatewayError::Configuration(e.to_string()))
    }

    /// Verifies a transfer against an on-chain order and, if it pays for it, marks the order paid and issues an
    /// opaque download token.
    ///
    /// A transaction is credited at most once. Submitting an already credited transaction again for the same order
    /// returns the original result; submitting it for a different order fails.
    ///
    /// The sender is checked against the request's `buyer_wallet`, or else the order's. When neither names a wallet
    /// the sender is not checked at all (see [`Self::create_order_evm`]).
    pub async fn verify_evm_payment(&self, request: VerifyPaymentRequest) -> Result<VerifyPaymentResult, GatewayError> {
        let tx_hash = normalize_tx_hash(&request.tx_hash);
        if !is_tx_hash(&tx_hash) {
            return Err(GatewayError::InvalidRequest(format!("{} is not a transaction hash", request.tx_hash)));
        }
        if let Some(record) = self.store.find_passed_record(&tx_hash).await? {
            return self.already_verified(record, request.order_id.as_ref());
        }
        let order = self.locate_evm_order(&request).await?;
        let chain_id = order.meta.chain_id.unwrap_or(self.options.chain.chain_id);
        if request.chain_id != chain_id {
            let rejection = Rejection::ChainIdMismatch { expected: chain_id, actual: request.chain_id };
            self.record_failure(&order, &tx_hash, request.chain_id, rejection.kind()).await;
            return Err(rejection.into());
        }
        let merchant = self.merchant_address()?;
        let expected_amount = match order.meta.expected_amount_wei {
            Some(wei) => wei,
            None => self.expected_wei(&self.product(&order.product_id).await?)?,
        };
        let from_address = request
            .buyer_wallet
            .as_deref()
            .map(str::trim)
            .filter(|w| !w.is_empty())
            .or(order.meta.buyer_wallet.as_deref());
        let check = TransferCheck { tx_hash: &tx_hash, merchant_address: merchant, expected_amount, chain_id, from_address };
        let transfer = match self.verifier.verify(&check).await {
            Ok(transfer) => transfer,
            Err(VerifyError::Rpc(e)) => {
                warn!("🔄️ Could not verify {tx_hash} for order {}. {e}", order.order_id);
                return Err(e.into());
            },
            Err(VerifyError::Rejected(rejection)) => {
                info!("🔄️ Transaction {tx_hash} does not pay for order {}. {rejection}", order.order_id);
                self.record_failure(&order, &tx_hash, chain_id, rejection.kind()).await;
                return Err(rejection.into());
            },
        };
        let token = self.tokens.issue_opaque(&order.order_id, &order.product_id);
        let record = PaymentRecord {
            tx_hash: tx_hash.clone(),
            order_id: order.order_id.clone(),
            chain_id,
            sender: Some(transfer.sender),
            recipient: Some(transfer.recipient),
            value: Some(transfer.value),
            block_number: transfer.block_number,
            verified_at: Utc::now(),
            result: PaymentResult::Pass,
            download_token: Some(token.token.clone()),
        };
        match self.store.credit_onchain_payment(record, token.clone()).await? {
            CreditOutcome::Credited(order) => {
                info!("🔄️ Order {} is paid by {tx_hash}", order.order_id);
                self.producers.publish_order_paid(OrderPaidEvent::new(order.clone())).await;
                Ok(VerifyPaymentResult {
                    ok: true,
                    download_url: Some(self.download_url(&order.order_id, &token.token)),
                    order_id: order.order_id,
                    already_verified: false,
                    download_token: Some(token.token),
                })
            },
            CreditOutcome::AlreadyCredited(record) => self.already_verified(record, request.order_id.as_ref()),
            CreditOutcome::OrderNotPending(order) => {
                self.record_failure(&order, &tx_hash, chain_id, "order_not_pending").await;
                Err(GatewayError::OrderNotPending { order_id: order.order_id, status: order.status })
            },
        }
    }

    fn already_verified(
        &self,
        record: PaymentRecord,
        requested: Option<&OrderId>,
    ) -> Result<VerifyPaymentResult, GatewayError> {
        if requested.is_some_and(|id| *id != record.order_id) {
            info!("🔄️ Transaction {} was already used for order {}", record.tx_hash, record.order_id);
            return Err(GatewayError::TxHashAlreadyUsed(record.tx_hash));
        }
        debug!("🔄️ Transaction {} was already credited to order {}", record.tx_hash, record.order_id);
        let download_url = record.download_token.as_deref().map(|t| self.download_url(&record.order_id, t));
        Ok(VerifyPaymentResult {
            ok: true,
            order_id: record.order_id,
            already_verified: true,
            download_token: record.download_token,
            download_url,
        })
    }

    /// Finds the order a payment is for. An explicit order id wins; otherwise it is the newest unpaid on-chain order
    /// for the product (and wallet, if one is given).
    async fn locate_evm_order(&self, request: &VerifyPaymentRequest) -> Result<Order, GatewayError> {
        let product_id = request.product_id.trim();
        if let Some(order_id) = &request.order_id {
            let order = self.order(order_id).await?;
            if order.provider != ProviderKind::OnChain {
                return Err(GatewayError::InvalidRequest(format!("Order {order_id} is not an on-chain order")));
            }
            if !product_id.is_empty() && order.product_id != product_id {
                return Err(GatewayError::InvalidRequest(format!("Order {order_id} is not for {product_id}")));
            }
            if order.status != OrderStatusType::PendingPayment {
                return Err(GatewayError::OrderNotPending { order_id: order.order_id, status: order.status });
            }
            return Ok(order);
        }
        if product_id.is_empty() {
            return Err(GatewayError::InvalidRequest("Either order_id or product_id is required".into()));
        }
        let wallet = request.buyer_wallet.as_deref().map(str::trim).filter(|w| !w.is_empty());
        self.store
            .list_orders()
            .await?
            .into_iter()
            .filter(|o| {
                o.provider == ProviderKind::OnChain &&
                    o.status == OrderStatusType::PendingPayment &&
                    o.product_id == product_id
            })
            .filter(|o| match (wallet, o.meta.buyer_wallet.as_deref()) {
                (Some(wallet), Some(buyer)) => same_address(wallet, buyer),
                _ => true,
            })
            .max_by_key(|o| o.created_at)
            .ok_or_else(|| GatewayError::NoPendingOrder(product_id.to_string()))
    }

    /// Appends a failed verification attempt to the ledger. Write failures are logged, not returned.
    async fn record_failure(&self, order: &Order, tx_hash: &str, chain_id: u64, reason: &str) {
        let record = PaymentRecord {
            tx_hash: tx_hash.to_string(),
            order_id: order.order_id.clone(),
            chain_id,
            sender: None,
            recipient: None,
            value: None,
            block_number: None,
            verified_at: Utc::now(),
            result: PaymentResult::Fail { reason: reason.to_string() },
            download_token: None,
        };
        if let Err(e) = self.store.append_record(record).await {
            warn!("🔄️ Could not record the failed verification of {tx_hash}. {e}");
        }
    }

    //-----------------------------------------      Downloads       -------------------------------------------------

    /// Authorizes a download and returns the package to serve.
    ///
    /// The token is checked against the order, the order must be paid, and the package must exist before a use of
    /// the token is spent. The first successful download moves the order to `Delivered`.
    pub async fn download(&self, order_id: &OrderId, token: &str) -> Result<DownloadResult, GatewayError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(GatewayError::InvalidRequest("A download token is required".into()));
        }
        let order = self.order(order_id).await?;
        let grant = if order.provider.uses_invoices() {
            let claims = self.tokens.verify(token)?;
            if claims.oid != order.order_id.as_str() {
                return Err(TokenError::TokenOrderMismatch.into());
            }
            if claims.pid != order.product_id {
                return Err(TokenError::TokenProductMismatch.into());
            }
            if self.store.is_jti_used(&order.order_id, &claims.jti).await? {
                return Err(used_up(&claims).into());
            }
            Grant::Compact(claims)
        } else {
            let record = self.store.fetch_token(token).await?.ok_or(TokenError::TokenNotFound)?;
            if record.order_id != order.order_id {
                return Err(TokenError::TokenOrderMismatch.into());
            }
            if record.product_id != order.product_id {
                return Err(TokenError::TokenProductMismatch.into());
            }
            if record.is_expired_at(Utc::now()) {
                return Err(TokenError::TokenExpired.into());
            }
            if record.is_exhausted() {
                return Err(TokenError::TokenMaxUsesExceeded.into());
            }
            Grant::Opaque(record.token)
        };
        if !order.status.is_settled() {
            return Err(GatewayError::NotPaid(order.status));
        }
        let product = self.product(&order.product_id).await?;
        let artifact = self.catalog.resolve_artifact(&product).await?;
        match grant {
            Grant::Compact(claims) if claims.ot => {
                if !self.store.mark_jti_used(&order.order_id, &claims.jti).await? {
                    return Err(TokenError::TokenAlreadyUsed.into());
                }
            },
            Grant::Compact(claims) => {
                if !self.store.record_jti_use(&order.order_id, &claims.jti, self.tokens.max_uses()).await? {
                    return Err(used_up(&claims).into());
                }
            },
            Grant::Opaque(token) => match self.store.consume_token(&token, Utc::now()).await? {
                ConsumeOutcome::Consumed(record) => {
                    trace!("🔐️ Token for order {} used {}/{} times", order.order_id, record.use_count, record.max_uses);
                },
                ConsumeOutcome::NotFound => return Err(TokenError::TokenNotFound.into()),
                ConsumeOutcome::Expired => return Err(TokenError::TokenExpired.into()),
                ConsumeOutcome::Exhausted => return Err(TokenError::TokenMaxUsesExceeded.into()),
            },
        }
        if order.status == OrderStatusType::Paid {
            match self.store.update_status(&order.order_id, OrderStatusType::Delivered).await {
                Ok(change) if change.is_changed() => info!("🔄️ Order {} is delivered", order.order_id),
                Ok(_) => {},
                Err(e) => warn!("🔄️ Could not mark order {} as delivered. {e}", order.order_id),
            }
        }
        info!("🔄️ Serving {} for order {}", artifact.filename, order.order_id);
        Ok(DownloadResult {
            ok: true,
            order_id: order.order_id,
            product_id: artifact.product_id,
            package_path: artifact.package_path,
            filename: artifact.filename,
        })
    }

    //-----------------------------------------        Admin         -------------------------------------------------

    fn require_admin(&self) -> Result<(), GatewayError> {
        if self.options.admin_enabled {
            Ok(())
        } else {
            Err(GatewayError::AdminDisabled)
        }
    }

    /// Marks an order as paid by hand and returns a token the buyer can download with.
    pub async fn mark_paid(&self, order_id: &OrderId) -> Result<MarkPaidResult, GatewayError> {
        self.require_admin()?;
        require_valid_id(order_id)?;
        let change = self.store.update_status(order_id, OrderStatusType::Paid).await?;
        let changed = change.is_changed();
        let mut order = change.order;
        if changed {
            let patch = MetaPatch::default().with_paid_at(Utc::now()).with_extra("paid_by", Value::from("admin"));
            order = self.store.update_meta(order_id, patch).await?;
            info!("🔄️ Order {order_id} was marked paid by an administrator");
            self.producers.publish_order_paid(OrderPaidEvent::new(order.clone())).await;
        }
        let download_token = if order.provider.uses_invoices() {
            Some(self.tokens.issue(&order.order_id, &order.product_id)?.0)
        } else if changed || order.meta.download_token.is_none() {
            let record = self.tokens.issue_opaque(&order.order_id, &order.product_id);
            let token = record.token.clone();
            self.store.insert_token(record).await?;
            order = self.store.update_meta(order_id, MetaPatch::default().with_download_token(token.clone())).await?;
            Some(token)
        } else {
            order.meta.download_token.clone()
        };
        Ok(MarkPaidResult { order, changed, download_token })
    }

    /// All orders, newest first, optionally only those with the given status.
    pub async fn list_orders(&self, status: Option<OrderStatusType>) -> Result<Vec<Order>, GatewayError> {
        self.require_admin()?;
        let mut orders = self.store.list_orders().await?;
        orders.retain(|o| status.map_or(true, |s| o.status == s));
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    /// Expires every pending order created more than `max_age` ago. Returns the orders that were expired.
    pub async fn expire_stale_orders(&self, max_age: Duration) -> Result<Vec<Order>, GatewayError> {
        self.require_admin()?;
        self.expire_orders_older_than(max_age).await
    }

    /// The unguarded form of [`Self::expire_stale_orders`], for the background expiry job.
    pub async fn expire_orders_older_than(&self, max_age: Duration) -> Result<Vec<Order>, GatewayError> {
        let cutoff = Utc::now() - max_age;
        let stale = self.store.list_orders().await?.into_iter().filter(|o| o.status.is_pending() && o.created_at < cutoff);
        let mut expired = Vec::new();
        for order in stale {
            match self.store.update_status(&order.order_id, OrderStatusType::Expired).await {
                Ok(change) if change.is_changed() => {
                    self.producers.publish_order_annulled(OrderAnnulledEvent::new(change.order.clone())).await;
                    expired.push(change.order);
                },
                Ok(_) => {},
                Err(StoreError::IllegalTransition(_)) => {
                    debug!("🕰️ Order {} settled before it could be expired", order.order_id);
                },
                Err(e) => return Err(e.into()),
            }
        }
        info!("🕰️ Expired {} orders older than {}", expired.len(), cutoff);
        Ok(expired)
    }
}

/// The error for a compact token that has no uses left
fn used_up(claims: &TokenClaims) -> TokenError {
    if claims.ot {
        TokenError::TokenAlreadyUsed
    } else {
        TokenError::TokenMaxUsesExceeded
    }
}

/// Order ids arrive from callers and end up in store keys. Only ids the gateway could have issued get that far.
fn require_valid_id(order_id: &OrderId) -> Result<(), GatewayError> {
    if is_valid_order_id(order_id.as_str()) {
        Ok(())
    } else {
        Err(GatewayError::InvalidRequest(format!("'{}' is not a valid order id", order_id.as_str())))
    }
}

fn is_tx_hash(s: &str) -> bool {
    s.len() == 66 && s.starts_with("0x") && s[2..].chars().all(|c| c.is_ascii_hexdigit())
}

fn id_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
