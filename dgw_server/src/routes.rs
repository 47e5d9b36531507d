//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! Every gateway call suspends on the store, the invoice provider or the chain node, so handlers are all async and
//! never block the worker thread.
use actix_web::{
    get,
    http::header::{ContentDisposition, DispositionParam, DispositionType},
    web,
    HttpResponse,
    Responder,
};
use chrono::Duration;
use dgw_engine::{
    db_types::OrderId,
    order_objects::{EvmOrderRequest, InvoiceNotification, StartOrderRequest, VerifyPaymentRequest},
    traits::GatewayStack,
    GatewayError,
    OrderFlowApi,
};
use log::*;
use serde_json::json;

use crate::{
    data_objects::{
        DownloadQuery,
        ExpireOrdersRequest,
        ExpireOrdersResponse,
        ListOrdersRequest,
        ListOrdersResponse,
        MarkPaidRequest,
        NotificationResponse,
    },
    errors::ServerError,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().json(json!({ "ok": true }))
}

// ----------------------------------------------  Products ----------------------------------------------------
route!(products => Get "/products" impl GatewayStack);
pub async fn products<G: GatewayStack>(api: web::Data<OrderFlowApi<G>>) -> Result<HttpResponse, ServerError> {
    trace!("💻️ Received products request");
    let products = api.products().await?;
    Ok(HttpResponse::Ok().json(json!({ "ok": true, "products": products })))
}

// ----------------------------------------------  Invoices ----------------------------------------------------
route!(start_order => Post "/orders" impl GatewayStack);
/// Starts a hosted-invoice checkout. The response carries the invoice URL the buyer should be sent to.
pub async fn start_order<G: GatewayStack>(
    api: web::Data<OrderFlowApi<G>>,
    body: web::Json<StartOrderRequest>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();
    debug!("💻️ Received checkout request for {}", request.product_id);
    let result = api.start_order(request).await?;
    Ok(HttpResponse::Ok().json(result))
}

route!(check_order => Get "/orders/{order_id}" impl GatewayStack);
/// Polls an order. Pending invoice orders are checked with the provider first. Once the order is paid, the response
/// includes a download link.
pub async fn check_order<G: GatewayStack>(
    api: web::Data<OrderFlowApi<G>>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServerError> {
    let order_id = parse_order_id(&path.into_inner())?;
    trace!("💻️ Received status request for order {order_id}");
    let result = api.check_order(&order_id).await?;
    Ok(HttpResponse::Ok().json(result))
}

route!(invoice_notification => Post "/invoice" impl GatewayStack);
/// Payment notifications from the invoice provider. The signature has already been checked by the time this handler
/// runs.
pub async fn invoice_notification<G: GatewayStack>(
    api: web::Data<OrderFlowApi<G>>,
    body: web::Json<InvoiceNotification>,
) -> Result<HttpResponse, ServerError> {
    let note = body.into_inner();
    info!("💻️ Received payment notification for order {} ({})", note.order_id, note.payment_status);
    let order = api.process_invoice_notification(note).await?;
    Ok(HttpResponse::Ok().json(NotificationResponse { ok: true, order_id: order.order_id, status: order.status }))
}

// ----------------------------------------------  On-chain ----------------------------------------------------
route!(create_order_evm => Post "/evm/orders" impl GatewayStack);
pub async fn create_order_evm<G: GatewayStack>(
    api: web::Data<OrderFlowApi<G>>,
    body: web::Json<EvmOrderRequest>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();
    debug!("💻️ Received on-chain checkout request for {}", request.product_id);
    let result = api.create_order_evm(request).await?;
    Ok(HttpResponse::Ok().json(result))
}

route!(verify_evm_payment => Post "/evm/verify" impl GatewayStack);
pub async fn verify_evm_payment<G: GatewayStack>(
    api: web::Data<OrderFlowApi<G>>,
    body: web::Json<VerifyPaymentRequest>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();
    debug!("💻️ Received payment verification request for {}", request.tx_hash);
    let result = api.verify_evm_payment(request).await?;
    Ok(HttpResponse::Ok().json(result))
}

// ----------------------------------------------  Download ----------------------------------------------------
route!(download => Get "/download" impl GatewayStack);
/// Serves the package for a paid order as an attachment, spending one use of the token.
pub async fn download<G: GatewayStack>(
    api: web::Data<OrderFlowApi<G>>,
    query: web::Query<DownloadQuery>,
) -> Result<HttpResponse, ServerError> {
    let DownloadQuery { order_id, token } = query.into_inner();
    let order_id = order_id
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| GatewayError::InvalidRequest("order_id is required".into()))?;
    let order_id = parse_order_id(&order_id)?;
    let token = token.unwrap_or_default();
    let result = api.download(&order_id, &token).await?;
    let bytes = tokio::fs::read(&result.package_path).await.map_err(|e| {
        error!("💻️ Package {} for order {order_id} could not be read. {e}", result.package_path.display());
        match e.kind() {
            std::io::ErrorKind::NotFound => ServerError::from(GatewayError::PackageNotFound(result.product_id.clone())),
            _ => ServerError::IOError(e),
        }
    })?;
    let disposition = ContentDisposition {
        disposition: DispositionType::Attachment,
        parameters: vec![DispositionParam::Filename(result.filename.clone())],
    };
    Ok(HttpResponse::Ok().content_type("application/octet-stream").insert_header(disposition).body(bytes))
}

// ----------------------------------------------   Admin   ----------------------------------------------------
route!(mark_paid => Post "/orders/mark_paid" impl GatewayStack);
pub async fn mark_paid<G: GatewayStack>(
    api: web::Data<OrderFlowApi<G>>,
    body: web::Json<MarkPaidRequest>,
) -> Result<HttpResponse, ServerError> {
    let MarkPaidRequest { order_id } = body.into_inner();
    info!("💻️ Admin request to mark order {order_id} as paid");
    let result = api.mark_paid(&order_id).await?;
    Ok(HttpResponse::Ok().json(result))
}

route!(list_orders => Post "/orders/list" impl GatewayStack);
pub async fn list_orders<G: GatewayStack>(
    api: web::Data<OrderFlowApi<G>>,
    body: web::Json<ListOrdersRequest>,
) -> Result<HttpResponse, ServerError> {
    let ListOrdersRequest { status } = body.into_inner();
    debug!("💻️ Admin request to list orders. Status filter: {status:?}");
    let orders = api.list_orders(status).await?;
    Ok(HttpResponse::Ok().json(ListOrdersResponse { ok: true, orders }))
}

route!(expire_orders => Post "/orders/expire" impl GatewayStack);
pub async fn expire_orders<G: GatewayStack>(
    api: web::Data<OrderFlowApi<G>>,
    body: web::Json<ExpireOrdersRequest>,
) -> Result<HttpResponse, ServerError> {
    let ExpireOrdersRequest { max_age_secs } = body.into_inner();
    if max_age_secs < 0 {
        return Err(GatewayError::InvalidRequest("max_age_secs cannot be negative".into()).into());
    }
    info!("💻️ Admin request to expire pending orders older than {max_age_secs}s");
    let expired = api.expire_stale_orders(Duration::seconds(max_age_secs)).await?;
    let expired = expired.into_iter().map(|o| o.order_id).collect();
    Ok(HttpResponse::Ok().json(ExpireOrdersResponse { ok: true, expired }))
}

// ----------------------------------------------  Simulated  --------------------------------------------------
/// The page the simulated provider sends buyers to. There is nothing to pay; the invoice settles on the next poll.
#[get("/simulated/invoice/{payment_id}")]
pub async fn simulated_invoice(path: web::Path<String>) -> impl Responder {
    let payment_id = path.into_inner();
    trace!("💻️ Simulated invoice page requested for {payment_id}");
    HttpResponse::Ok().json(json!({
        "ok": true,
        "simulated": true,
        "payment_id": payment_id,
        "message": "This invoice is simulated and is already paid. Return to the shop to download your order.",
    }))
}

fn parse_order_id(s: &str) -> Result<OrderId, ServerError> {
    s.parse::<OrderId>().map_err(|e| GatewayError::InvalidRequest(e.to_string()).into())
}
