use actix_web::{http::StatusCode, test::TestRequest};
use dgw_engine::{order_objects::StartOrderRequest, test_utils::test_gateway};
use serde_json::json;

use super::helpers::{admin_request, get, local_path, post_json, send, send_with, security};

#[actix_web::test]
async fn mark_paid() {
    let mut gw = test_gateway().await;
    gw.provider.set_status(Some("waiting"));
    let order_id = post_json(&gw, "/api/orders", &StartOrderRequest::new("prod-1")).await.json()["order_id"].clone();
    let body = json!({ "order_id": order_id }).to_string();
    let res = send(&gw, admin_request("/admin/orders/mark_paid", &body)).await;
    assert_eq!(res.status, StatusCode::OK);
    let result = res.json();
    assert_eq!(result["changed"], true);
    assert_eq!(result["order"]["status"], "paid");
    assert_eq!(result["order"]["meta"]["paid_by"], "admin");
    assert!(result["download_token"].is_string());
    assert_eq!(gw.paid_events().len(), 1);

    let res = send(&gw, admin_request("/admin/orders/mark_paid", &body)).await;
    assert_eq!(res.json()["changed"], false);
    assert!(gw.paid_events().is_empty());

    let checked = get(&gw, &format!("/api/orders/{}", order_id.as_str().unwrap())).await.json();
    let res = get(&gw, &local_path(checked["download_url"].as_str().unwrap())).await;
    assert_eq!(res.status, StatusCode::OK);
}

#[actix_web::test]
async fn mark_paid_on_chain_order() {
    let gw = test_gateway().await;
    let order = post_json(&gw, "/api/evm/orders", &json!({ "product_id": "prod-3" })).await.json();
    assert_eq!(order["expected_amount"], "1000000000000000");
    let body = json!({ "order_id": order["order_id"] }).to_string();
    let result = send(&gw, admin_request("/admin/orders/mark_paid", &body)).await.json();
    let token = result["download_token"].as_str().unwrap();
    let url = format!("/api/download?order_id={}&token={token}", order["order_id"].as_str().unwrap());
    let res = get(&gw, &url).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body.as_ref(), b"PK contents of prod-3.zip");
}

#[actix_web::test]
async fn list_and_expire_orders() {
    let mut gw = test_gateway().await;
    gw.provider.set_status(Some("waiting"));
    for product_id in ["prod-1", "prod-2"] {
        post_json(&gw, "/api/orders", &StartOrderRequest::new(product_id)).await;
    }
    post_json(&gw, "/api/evm/orders", &json!({ "product_id": "prod-2" })).await;

    let res = send(&gw, admin_request("/admin/orders/list", "{}")).await;
    assert_eq!(res.status, StatusCode::OK);
    let orders = res.json()["orders"].as_array().cloned().unwrap_or_default();
    assert_eq!(orders.len(), 3);
    // Newest first
    assert_eq!(orders[0]["provider"], "on-chain");

    let res = send(&gw, admin_request("/admin/orders/list", r#"{"status":"pending_payment"}"#)).await;
    assert_eq!(res.json()["orders"].as_array().map(Vec::len), Some(1));

    let res = send(&gw, admin_request("/admin/orders/expire", r#"{"max_age_secs": 3600}"#)).await;
    assert_eq!(res.json()["expired"], json!([]));
    let res = send(&gw, admin_request("/admin/orders/expire", r#"{"max_age_secs": 0}"#)).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["expired"].as_array().map(Vec::len), Some(3));
    assert_eq!(gw.annulled_events().len(), 3);

    let res = send(&gw, admin_request("/admin/orders/list", r#"{"status":"expired"}"#)).await;
    assert_eq!(res.json()["orders"].as_array().map(Vec::len), Some(3));
    let res = send(&gw, admin_request("/admin/orders/expire", r#"{"max_age_secs": -1}"#)).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn admin_calls_must_be_signed() {
    let gw = test_gateway().await;
    let req = TestRequest::post()
        .uri("/admin/orders/list")
        .insert_header(("Content-Type", "application/json"))
        .set_payload("{}");
    let res = send(&gw, req).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(res.reason(), "missing_signature");

    let req = admin_request("/admin/orders/list", "{}").set_payload(r#"{"status":"paid"}"#);
    let res = send(&gw, req).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(res.reason(), "invalid_signature");
}

#[actix_web::test]
async fn admin_routes_are_absent_when_disabled() {
    let gw = test_gateway().await;
    let mut disabled = security();
    disabled.admin_secret = None;
    let res = send_with(&gw.api, disabled, admin_request("/admin/orders/list", "{}")).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn admin_calls_are_refused_when_the_gateway_disallows_them() {
    let gw = dgw_engine::test_utils::test_gateway_with(|options| options.admin_enabled = false).await;
    let res = send(&gw, admin_request("/admin/orders/list", "{}")).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(res.error(), "admin_disabled");
}
