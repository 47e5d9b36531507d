use dgw_engine::db_types::{Order, OrderId, OrderStatusType};
use serde::{Deserialize, Serialize};

/// Query string of a download link. Both fields are required; they are optional here so that a missing one is
/// reported as a gateway error rather than an extractor failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadQuery {
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkPaidRequest {
    pub order_id: OrderId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListOrdersRequest {
    #[serde(default)]
    pub status: Option<OrderStatusType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListOrdersResponse {
    pub ok: bool,
    pub orders: Vec<Order>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpireOrdersRequest {
    pub max_age_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpireOrdersResponse {
    pub ok: bool,
    pub expired: Vec<OrderId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationResponse {
    pub ok: bool,
    pub order_id: OrderId,
    pub status: OrderStatusType,
}
