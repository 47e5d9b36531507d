use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use dgw_common::Secret;
use dgw_engine::{
    events::{EventHandlers, EventHooks, EventProducers},
    traits::GatewayStack,
    FileCatalog,
    FileStore,
    HostedInvoiceClient,
    HostedInvoiceConfig,
    InvoiceBackend,
    JsonRpcClient,
    OrderFlowApi,
    RemoteKvStore,
    SimulatedProvider,
    StoreBackend,
};
use futures::FutureExt;
use log::*;

use crate::{
    config::{ServerConfig, StoreConfig},
    errors::ServerError,
    expiry_worker::start_expiry_worker,
    helpers::SignatureScheme,
    middleware::HmacMiddlewareFactory,
    routes::{
        health,
        simulated_invoice,
        CheckOrderRoute,
        CreateOrderEvmRoute,
        DownloadRoute,
        ExpireOrdersRoute,
        InvoiceNotificationRoute,
        ListOrdersRoute,
        MarkPaidRoute,
        ProductsRoute,
        StartOrderRoute,
        VerifyEvmPaymentRoute,
    },
};

pub const IPN_SIGNATURE_HEADER: &str = "x-nowpayments-sig";
pub const ADMIN_SIGNATURE_HEADER: &str = "x-dgw-signature";

/// The backends a production server runs with
#[derive(Clone)]
pub struct LiveStack;

impl GatewayStack for LiveStack {
    type Catalog = FileCatalog;
    type Chain = JsonRpcClient;
    type Provider = InvoiceBackend;
    type Store = StoreBackend;
}

/// Which of the optional route groups are mounted, and the keys that guard them
#[derive(Clone, Debug, Default)]
pub struct RouteSecurity {
    pub ipn_secret: Secret<String>,
    /// The admin scope is only mounted when this is set
    pub admin_secret: Option<Secret<String>>,
    pub simulated_provider: bool,
}

impl RouteSecurity {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            ipn_secret: config.invoices.ipn_secret.clone(),
            admin_secret: config.admin.enabled.then(|| config.admin.secret.clone()),
            simulated_provider: config.invoices.simulated,
        }
    }
}

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let mut hooks = EventHooks::default();
    hooks
        .on_order_paid(|ev| {
            async move {
                info!("📬️ Order {} for {} was paid", ev.order.order_id, ev.order.product_id);
            }
            .boxed()
        })
        .on_order_annulled(|ev| {
            async move {
                info!("📬️ Order {} was annulled. Status: {}", ev.order.order_id, ev.status);
            }
            .boxed()
        });
    let handlers = EventHandlers::new(128, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let api = build_gateway(&config, producers).await?;
    if let Some(max_age) = config.pending_order_timeout {
        let _handle = start_expiry_worker(api.clone(), max_age);
    }
    let srv = create_server_instance(config, api)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

/// Builds the gateway and all its backends from configuration.
pub async fn build_gateway(
    config: &ServerConfig,
    producers: EventProducers,
) -> Result<OrderFlowApi<LiveStack>, ServerError> {
    let store = match &config.store {
        StoreConfig::File { data_dir } => {
            info!("🚀️ Using the file store in {}", data_dir.display());
            let store = FileStore::open(data_dir).await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
            StoreBackend::File(store)
        },
        StoreConfig::Remote { url, token } => {
            info!("🚀️ Using the remote KV store at {url}");
            let store = RemoteKvStore::new(url, token.clone(), config.http_timeout)
                .map_err(|e| ServerError::InitializeError(e.to_string()))?;
            StoreBackend::Remote(store)
        },
    };
    let provider = if config.invoices.simulated {
        InvoiceBackend::Simulated(SimulatedProvider::new(&config.public_url))
    } else {
        let invoice_config = HostedInvoiceConfig {
            api_url: config.invoices.api_url.clone(),
            api_key: config.invoices.api_key.clone(),
            ipn_callback_url: Some(config.ipn_callback_url()),
            success_url: config.invoices.success_url.clone(),
            timeout: config.http_timeout,
        };
        let client = HostedInvoiceClient::new(invoice_config).map_err(|e| ServerError::InitializeError(e.to_string()))?;
        InvoiceBackend::Hosted(client)
    };
    let chain = JsonRpcClient::new(&config.rpc_url, config.http_timeout)
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let catalog = FileCatalog::load(&config.catalog_path, &config.packages_dir)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let api = OrderFlowApi::<LiveStack>::new(store, provider, chain, catalog, config.gateway_options(), producers)
        .map_err(|e| ServerError::ConfigurationError(e.to_string()))?;
    Ok(api)
}

/// Mounts every gateway route on `cfg`. Tests use this with their own backend stack.
pub fn configure_gateway<G: GatewayStack>(cfg: &mut web::ServiceConfig, api: OrderFlowApi<G>, security: RouteSecurity) {
    let json_config = web::JsonConfig::default()
        .error_handler(|err, _req| ServerError::InvalidRequestBody(err.to_string()).into());
    let query_config = web::QueryConfig::default()
        .error_handler(|err, _req| ServerError::InvalidRequestBody(err.to_string()).into());
    cfg.app_data(web::Data::new(api)).app_data(json_config).app_data(query_config).service(health);
    let api_scope = web::scope("/api")
        .service(ProductsRoute::<G>::new())
        .service(StartOrderRoute::<G>::new())
        .service(CheckOrderRoute::<G>::new())
        .service(CreateOrderEvmRoute::<G>::new())
        .service(VerifyEvmPaymentRoute::<G>::new())
        .service(DownloadRoute::<G>::new());
    let webhook_scope = web::scope("/webhook")
        .wrap(HmacMiddlewareFactory::new(IPN_SIGNATURE_HEADER, security.ipn_secret, SignatureScheme::Sha512SortedJson))
        .service(InvoiceNotificationRoute::<G>::new());
    cfg.service(api_scope).service(webhook_scope);
    if let Some(secret) = security.admin_secret {
        let admin_scope = web::scope("/admin")
            .wrap(HmacMiddlewareFactory::new(ADMIN_SIGNATURE_HEADER, secret, SignatureScheme::Sha256Body))
            .service(MarkPaidRoute::<G>::new())
            .service(ListOrdersRoute::<G>::new())
            .service(ExpireOrdersRoute::<G>::new());
        cfg.service(admin_scope);
    }
    if security.simulated_provider {
        cfg.service(simulated_invoice);
    }
}

pub fn create_server_instance(config: ServerConfig, api: OrderFlowApi<LiveStack>) -> Result<Server, ServerError> {
    let security = RouteSecurity::from_config(&config);
    if security.ipn_secret.is_empty() {
        warn!("🚀️ No IPN secret is configured. Invoice notifications will be refused.");
    }
    let srv = HttpServer::new(move || {
        let api = api.clone();
        let security = security.clone();
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("dgw::access_log"))
            .configure(move |cfg| configure_gateway(cfg, api, security))
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}
