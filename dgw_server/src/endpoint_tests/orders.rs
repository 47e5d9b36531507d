use actix_web::{http::StatusCode, test::TestRequest};
use dgw_engine::{
    db_types::{OrderId, OrderStatusType},
    order_objects::StartOrderRequest,
    test_utils::test_gateway,
    traits::OrderStore,
};
use serde_json::{json, Value};

use super::helpers::{get, local_path, post_json, send, send_with, security};

#[actix_web::test]
async fn health() {
    let gw = test_gateway().await;
    let res = get(&gw, "/health").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json(), json!({"ok": true}));
}

#[actix_web::test]
async fn list_products() {
    let gw = test_gateway().await;
    let res = get(&gw, "/api/products").await;
    assert_eq!(res.status, StatusCode::OK);
    let products = res.json()["products"].as_array().cloned().unwrap_or_default();
    let ids = products.iter().filter_map(|p| p["product_id"].as_str()).collect::<Vec<_>>();
    assert_eq!(ids, vec!["prod-1", "prod-2", "prod-3", "prod-nopkg"]);
    assert_eq!(products[0]["price"], "29.00");
}

#[actix_web::test]
async fn simulated_checkout_to_download() {
    let mut gw = test_gateway().await;
    let res = post_json(&gw, "/api/orders", &StartOrderRequest::new("prod-1")).await;
    assert_eq!(res.status, StatusCode::OK);
    let started = res.json();
    assert_eq!(started["status"], "pending");
    assert_eq!(started["provider"], "simulated");
    assert_eq!(started["amount"], "29.00");
    let order_id = started["order_id"].as_str().unwrap().to_string();
    assert!(started["invoice_url"].as_str().unwrap().contains("/simulated/invoice/sim_"));

    let res = get(&gw, &format!("/api/orders/{order_id}")).await;
    assert_eq!(res.status, StatusCode::OK);
    let checked = res.json();
    assert_eq!(checked["status"], "paid");
    assert_eq!(checked["can_download"], true);
    assert!(checked["token"].is_string());
    assert_eq!(gw.paid_events().len(), 1);

    let url = local_path(checked["download_url"].as_str().unwrap());
    let res = get(&gw, &url).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body.as_ref(), b"PK contents of prod-1.zip");
    let disposition = res.headers.get("content-disposition").unwrap().to_str().unwrap();
    assert!(disposition.starts_with("attachment"));
    assert!(disposition.contains("prod-1.zip"));
    let order = gw.store.fetch_order(&OrderId::from(order_id.as_str())).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Delivered);

    // Tokens are single use in the test configuration
    let res = get(&gw, &url).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.error(), "invalid_token");
    assert_eq!(res.reason(), "token_already_used");

    // but polling again mints a fresh one
    let checked = get(&gw, &format!("/api/orders/{order_id}")).await.json();
    assert_eq!(checked["status"], "delivered");
    let res = get(&gw, &local_path(checked["download_url"].as_str().unwrap())).await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(gw.paid_events().is_empty());
}

#[actix_web::test]
async fn garbage_token() {
    let gw = test_gateway().await;
    let order_id = post_json(&gw, "/api/orders", &StartOrderRequest::new("prod-1")).await.json()["order_id"].clone();
    let order_id = order_id.as_str().unwrap();
    get(&gw, &format!("/api/orders/{order_id}")).await;
    let res = get(&gw, &format!("/api/download?order_id={order_id}&token=garbage")).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    let body = res.json();
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"], "invalid_token");
    assert_eq!(body["reason"], "bad_token_format");
    assert_eq!(body["retryable"], false);
}

#[actix_web::test]
async fn missing_download_params() {
    let gw = test_gateway().await;
    let res = get(&gw, "/api/download?token=abc").await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.error(), "invalid_request");
    let res = get(&gw, "/api/download?order_id=ord_nope").await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn malformed_order_ids_are_rejected() {
    let gw = test_gateway().await;
    for url in [
        "/api/download?order_id=x%2F..%2F..%2Fdel%2Forder:ord_victim&token=abc.def",
        "/api/download?order_id=ord%201&token=abc",
        "/api/orders/ord:victim",
        "/api/orders/ord%20victim",
    ] {
        let res = get(&gw, url).await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST, "{url}");
        assert_eq!(res.error(), "invalid_request", "{url}");
    }
    let body = json!({
        "tx_hash": format!("0x{}", "ab".repeat(32)),
        "chain_id": 1,
        "product_id": "prod-2",
        "order_id": "x/../set/token:forged",
    });
    let res = post_json(&gw, "/api/evm/verify", &body).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.error(), "invalid_request");
}

#[actix_web::test]
async fn unknown_things_are_not_found() {
    let gw = test_gateway().await;
    let res = get(&gw, "/api/orders/ord_nope").await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.error(), "order_not_found");
    let res = post_json(&gw, "/api/orders", &StartOrderRequest::new("prod-99")).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.error(), "product_not_found");
}

#[actix_web::test]
async fn malformed_bodies() {
    let gw = test_gateway().await;
    let req = TestRequest::post()
        .uri("/api/orders")
        .insert_header(("Content-Type", "application/json"))
        .set_payload("{\"product\": 1");
    let res = send(&gw, req).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.error(), "invalid_request");
    let res = post_json(&gw, "/api/orders", &json!({"product_id": "  "})).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    let res = post_json(&gw, "/api/orders", &json!({"product_id": "prod-1", "amount": "1.00"})).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn unpaid_orders_cannot_download() {
    let gw = test_gateway().await;
    gw.provider.set_status(Some("waiting"));
    let order_id = post_json(&gw, "/api/orders", &StartOrderRequest::new("prod-2")).await.json()["order_id"].clone();
    let checked = get(&gw, &format!("/api/orders/{}", order_id.as_str().unwrap())).await.json();
    assert_eq!(checked["status"], "pending");
    assert_eq!(checked["can_download"], false);
    assert_eq!(checked.get("download_url"), None);
}

#[actix_web::test]
async fn provider_outages_are_retryable() {
    let gw = test_gateway().await;
    let order_id = post_json(&gw, "/api/orders", &StartOrderRequest::new("prod-1")).await.json()["order_id"].clone();
    gw.provider.set_offline(true);
    let res = get(&gw, &format!("/api/orders/{}", order_id.as_str().unwrap())).await;
    assert_eq!(res.status, StatusCode::BAD_GATEWAY);
    assert_eq!(res.error(), "provider_unavailable");
    assert_eq!(res.json()["retryable"], true);
    let res = post_json(&gw, "/api/orders", &StartOrderRequest::new("prod-1")).await;
    assert_eq!(res.status, StatusCode::BAD_GATEWAY);
    gw.provider.set_offline(false);
    let checked = get(&gw, &format!("/api/orders/{}", order_id.as_str().unwrap())).await.json();
    assert_eq!(checked["status"], "paid");
}

#[actix_web::test]
async fn missing_package() {
    let gw = test_gateway().await;
    let started = post_json(&gw, "/api/orders", &StartOrderRequest::new("prod-nopkg")).await.json();
    let order_id = started["order_id"].clone();
    let checked = get(&gw, &format!("/api/orders/{}", order_id.as_str().unwrap())).await.json();
    let url = local_path(checked["download_url"].as_str().unwrap());
    let res = get(&gw, &url).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.error(), "package_not_found");
}

#[actix_web::test]
async fn simulated_invoice_page() {
    let gw = test_gateway().await;
    let res = get(&gw, "/simulated/invoice/sim_ord_1").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["payment_id"], "sim_ord_1");
    let mut live = security();
    live.simulated_provider = false;
    let res = send_with(&gw.api, live, TestRequest::get().uri("/simulated/invoice/sim_ord_1")).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.json(), Value::Null);
}
