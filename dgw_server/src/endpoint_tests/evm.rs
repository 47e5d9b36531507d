use actix_web::http::StatusCode;
use dgw_common::Wei;
use dgw_engine::test_utils::{test_gateway, test_gateway_with, TestGateway, BUYER, MERCHANT, TEST_PRICE_WEI};
use serde_json::{json, Value};

use super::helpers::{get, local_path, post_json};

fn tx_hash(n: u8) -> String {
    format!("0x{}", hex::encode([n; 32]))
}

async fn evm_order(gw: &TestGateway, product_id: &str) -> Value {
    let res = post_json(gw, "/api/evm/orders", &json!({ "product_id": product_id })).await;
    assert_eq!(res.status, StatusCode::OK);
    res.json()
}

#[actix_web::test]
async fn pay_on_chain_and_download() {
    let mut gw = test_gateway().await;
    let order = evm_order(&gw, "prod-2").await;
    assert_eq!(order["status"], "pending_payment");
    assert_eq!(order["expected_amount"], "116000000000000000");
    assert_eq!(order["chain_id"], 1);
    assert_eq!(order["merchant_address"], MERCHANT);
    let order_id = order["order_id"].as_str().unwrap().to_string();

    gw.chain.add_transfer(&tx_hash(1), BUYER, MERCHANT, Wei::from(TEST_PRICE_WEI));
    let request = json!({ "tx_hash": tx_hash(1), "chain_id": 1, "product_id": "prod-2", "order_id": order_id });
    let res = post_json(&gw, "/api/evm/verify", &request).await;
    assert_eq!(res.status, StatusCode::OK);
    let verified = res.json();
    assert_eq!(verified["ok"], true);
    assert_eq!(verified["already_verified"], false);
    let token = verified["download_token"].as_str().unwrap().to_string();
    assert_eq!(gw.paid_events().len(), 1);

    let checked = get(&gw, &format!("/api/orders/{order_id}")).await.json();
    assert_eq!(checked["status"], "paid");
    assert!(checked["download_url"].as_str().unwrap().ends_with(&token));

    // Submitting the same transaction again returns the cached result
    let res = post_json(&gw, "/api/evm/verify", &request).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["already_verified"], true);
    assert_eq!(res.json()["download_token"], token.as_str());
    assert!(gw.paid_events().is_empty());

    let url = local_path(verified["download_url"].as_str().unwrap());
    let res = get(&gw, &url).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body.as_ref(), b"PK contents of prod-2.zip");
    let res = get(&gw, &url).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.reason(), "token_max_uses_exceeded");
}

#[actix_web::test]
async fn reused_transaction_for_another_order() {
    let gw = test_gateway().await;
    let first = evm_order(&gw, "prod-2").await["order_id"].clone();
    let second = evm_order(&gw, "prod-2").await["order_id"].clone();
    gw.chain.add_transfer(&tx_hash(2), BUYER, MERCHANT, Wei::from(TEST_PRICE_WEI));
    let request = |order_id: &Value| json!({ "tx_hash": tx_hash(2), "chain_id": 1, "product_id": "prod-2", "order_id": order_id });
    let res = post_json(&gw, "/api/evm/verify", &request(&first)).await;
    assert_eq!(res.status, StatusCode::OK);
    let res = post_json(&gw, "/api/evm/verify", &request(&second)).await;
    assert_eq!(res.status, StatusCode::CONFLICT);
    assert_eq!(res.error(), "tx_hash_already_used");
    let checked = get(&gw, &format!("/api/orders/{}", second.as_str().unwrap())).await.json();
    assert_eq!(checked["status"], "pending_payment");
}

#[actix_web::test]
async fn rejected_payments() {
    let gw = test_gateway().await;
    let order_id = evm_order(&gw, "prod-2").await["order_id"].clone();
    gw.chain.add_transfer(&tx_hash(3), BUYER, "0x000000000000000000000000000000000000dEaD", Wei::from(TEST_PRICE_WEI));
    gw.chain.add_transfer(&tx_hash(4), BUYER, MERCHANT, Wei::from(TEST_PRICE_WEI - 1));
    let cases = [
        (tx_hash(3), 1, StatusCode::PAYMENT_REQUIRED, "recipient_mismatch"),
        (tx_hash(4), 1, StatusCode::PAYMENT_REQUIRED, "amount_insufficient"),
        (tx_hash(5), 1, StatusCode::NOT_FOUND, "tx_not_found"),
        (tx_hash(4), 8453, StatusCode::PAYMENT_REQUIRED, "chain_id_mismatch"),
    ];
    for (hash, chain_id, status, reason) in cases {
        let body = json!({ "tx_hash": hash, "chain_id": chain_id, "product_id": "prod-2", "order_id": order_id });
        let res = post_json(&gw, "/api/evm/verify", &body).await;
        assert_eq!(res.status, status, "{reason}");
        assert_eq!(res.error(), reason);
        assert_eq!(res.json()["retryable"], false);
    }
    let checked = get(&gw, &format!("/api/orders/{}", order_id.as_str().unwrap())).await.json();
    assert_eq!(checked["status"], "pending_payment");
}

#[actix_web::test]
async fn node_outages_are_retryable() {
    let gw = test_gateway().await;
    evm_order(&gw, "prod-2").await;
    gw.chain.add_transfer(&tx_hash(6), BUYER, MERCHANT, Wei::from(TEST_PRICE_WEI));
    gw.chain.set_offline(true);
    let body = json!({ "tx_hash": tx_hash(6), "chain_id": 1, "product_id": "prod-2" });
    let res = post_json(&gw, "/api/evm/verify", &body).await;
    assert_eq!(res.status, StatusCode::BAD_GATEWAY);
    assert_eq!(res.error(), "rpc_request_failed");
    assert_eq!(res.json()["retryable"], true);
    gw.chain.set_offline(false);
    let res = post_json(&gw, "/api/evm/verify", &body).await;
    assert_eq!(res.status, StatusCode::OK);
}

#[actix_web::test]
async fn bad_requests() {
    let gw = test_gateway().await;
    let gw = &gw;
    let verify = |body: Value| async move { post_json(gw, "/api/evm/verify", &body).await };
    let res = verify(json!({ "tx_hash": "0x1234", "chain_id": 1, "product_id": "prod-2" })).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    let res = verify(json!({ "tx_hash": tx_hash(7), "product_id": "prod-2" })).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.error(), "invalid_request");
    // No pending order for the product
    let res = verify(json!({ "tx_hash": tx_hash(7), "chain_id": 1, "product_id": "prod-1" })).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    let body = json!({ "product_id": "prod-2", "buyer_wallet": "not-a-wallet" });
    let res = post_json(gw, "/api/evm/orders", &body).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn on_chain_checkout_needs_a_merchant() {
    let gw = test_gateway_with(|options| options.chain.merchant_address = None).await;
    let res = post_json(&gw, "/api/evm/orders", &json!({ "product_id": "prod-2" })).await;
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.error(), "configuration_error");
}
