use actix_web::{http::StatusCode, test::TestRequest};
use dgw_engine::{
    order_objects::StartOrderRequest,
    test_utils::{test_gateway, TestGateway},
};
use serde_json::json;

use super::helpers::{get, ipn_request, post_json, send, send_with, security};
use crate::{
    helpers::{calculate_hmac, SignatureScheme},
    server::IPN_SIGNATURE_HEADER,
};

async fn pending_order(gw: &TestGateway) -> String {
    gw.provider.set_status(Some("waiting"));
    let started = post_json(gw, "/api/orders", &StartOrderRequest::new("prod-1")).await.json();
    started["order_id"].as_str().unwrap().to_string()
}

#[actix_web::test]
async fn signed_notification_settles_the_order() {
    let mut gw = test_gateway().await;
    let order_id = pending_order(&gw).await;
    // Key order and whitespace are irrelevant to the signature
    let body = format!(r#"{{ "payment_status": "finished", "payment_id": 5077125051, "order_id": "{order_id}" }}"#);
    let res = send(&gw, ipn_request(&body)).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json(), json!({ "ok": true, "order_id": order_id, "status": "paid" }));
    assert_eq!(gw.paid_events().len(), 1);

    // Redelivery is acknowledged without a second event
    let res = send(&gw, ipn_request(&body)).await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(gw.paid_events().is_empty());

    let checked = get(&gw, &format!("/api/orders/{order_id}")).await.json();
    assert_eq!(checked["can_download"], true);
}

#[actix_web::test]
async fn failed_payments_annul_the_order() {
    let mut gw = test_gateway().await;
    let order_id = pending_order(&gw).await;
    let body = json!({ "order_id": order_id, "payment_status": "expired" }).to_string();
    let res = send(&gw, ipn_request(&body)).await;
    assert_eq!(res.json()["status"], "expired");
    let events = gw.annulled_events();
    assert_eq!(events.len(), 1);
    let finished = json!({ "order_id": order_id, "payment_status": "finished" }).to_string();
    let res = send(&gw, ipn_request(&finished)).await;
    assert_eq!(res.json()["status"], "expired");
}

#[actix_web::test]
async fn confirming_payments_keep_the_order_open() {
    let gw = test_gateway().await;
    let order_id = pending_order(&gw).await;
    let body = json!({ "order_id": order_id, "payment_status": "confirming" }).to_string();
    let res = send(&gw, ipn_request(&body)).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["status"], "pending");
}

#[actix_web::test]
async fn unsigned_and_forged_notifications() {
    let gw = test_gateway().await;
    let order_id = pending_order(&gw).await;
    let body = json!({ "order_id": order_id, "payment_status": "finished" }).to_string();

    let req = TestRequest::post().uri("/webhook/invoice").insert_header(("Content-Type", "application/json"));
    let res = send(&gw, req.set_payload(body.clone())).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(res.error(), "invalid_signature");
    assert_eq!(res.reason(), "missing_signature");

    let forged = calculate_hmac(SignatureScheme::Sha512SortedJson, b"not the secret", body.as_bytes()).unwrap();
    let req = TestRequest::post()
        .uri("/webhook/invoice")
        .insert_header(("Content-Type", "application/json"))
        .insert_header((IPN_SIGNATURE_HEADER, forged))
        .set_payload(body.clone());
    let res = send(&gw, req).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    // A valid signature over a different body
    let other = json!({ "order_id": order_id, "payment_status": "waiting" }).to_string();
    let signature = calculate_hmac(SignatureScheme::Sha512SortedJson, b"ipn-secret-for-tests", other.as_bytes());
    let req = TestRequest::post()
        .uri("/webhook/invoice")
        .insert_header(("Content-Type", "application/json"))
        .insert_header((IPN_SIGNATURE_HEADER, signature.unwrap()))
        .set_payload(body.clone());
    assert_eq!(send(&gw, req).await.status, StatusCode::FORBIDDEN);

    let checked = get(&gw, &format!("/api/orders/{order_id}")).await.json();
    assert_eq!(checked["status"], "pending");
}

#[actix_web::test]
async fn notifications_are_refused_without_a_secret() {
    let gw = test_gateway().await;
    let order_id = pending_order(&gw).await;
    let body = json!({ "order_id": order_id, "payment_status": "finished" }).to_string();
    let mut unconfigured = security();
    unconfigured.ipn_secret = Default::default();
    let res = send_with(&gw.api, unconfigured, ipn_request(&body)).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn unknown_orders() {
    let gw = test_gateway().await;
    let body = json!({ "order_id": "ord_nope", "payment_status": "finished" }).to_string();
    let res = send(&gw, ipn_request(&body)).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}
