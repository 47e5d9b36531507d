use actix_web::rt::task::JoinHandle;
use chrono::Duration;
use dgw_engine::{db_types::Order, traits::GatewayStack, OrderFlowApi};
use log::*;

/// Starts the expiry worker on the current Actix runtime. Do not await the returned JoinHandle, as it will run
/// indefinitely.
pub fn start_expiry_worker<G: GatewayStack>(api: OrderFlowApi<G>, max_age: Duration) -> JoinHandle<()> {
    actix_web::rt::spawn(async move {
        let mut timer = tokio::time::interval(std::time::Duration::from_secs(60));
        info!("🕰️ Pending order expiry worker started. Orders expire after {} minutes.", max_age.num_minutes());
        loop {
            timer.tick().await;
            info!("🕰️ Running pending order expiry job");
            match api.expire_orders_older_than(max_age).await {
                Ok(expired) => {
                    info!("🕰️ {} orders expired", expired.len());
                    debug!("🕰️ Expired orders: {}", order_list(&expired));
                },
                Err(e) => {
                    error!("🕰️ Error running pending order expiry job: {e}");
                },
            }
        }
    })
}

fn order_list(orders: &[Order]) -> String {
    orders
        .iter()
        .map(|o| format!("[{}] product: {} created: {}", o.order_id, o.product_id, o.created_at))
        .collect::<Vec<String>>()
        .join(", ")
}
