use actix_web::{
    body::to_bytes,
    http::{header::HeaderMap, StatusCode},
    test,
    test::TestRequest,
    web::Bytes,
    App,
};
use dgw_engine::{
    test_utils::{TestGateway, TestStack},
    OrderFlowApi,
};
use log::debug;
use serde::Serialize;
use serde_json::Value;

use crate::{
    helpers::{calculate_hmac, SignatureScheme},
    server::{configure_gateway, RouteSecurity, ADMIN_SIGNATURE_HEADER, IPN_SIGNATURE_HEADER},
};

pub const IPN_SECRET: &str = "ipn-secret-for-tests";
pub const ADMIN_SECRET: &str = "admin-secret-for-tests";

pub fn security() -> RouteSecurity {
    RouteSecurity {
        ipn_secret: IPN_SECRET.into(),
        admin_secret: Some(ADMIN_SECRET.into()),
        simulated_provider: true,
    }
}

pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }

    /// The `error` field of a JSON error body
    pub fn error(&self) -> String {
        self.json()["error"].as_str().unwrap_or_default().to_string()
    }

    pub fn reason(&self) -> String {
        self.json()["reason"].as_str().unwrap_or_default().to_string()
    }
}

/// Runs one request through a fresh app serving `api`. Errors raised by middleware are rendered the way the server
/// would render them.
pub async fn send_with(api: &OrderFlowApi<TestStack>, security: RouteSecurity, req: TestRequest) -> Response {
    let api = api.clone();
    let app = test::init_service(App::new().configure(move |cfg| configure_gateway(cfg, api, security))).await;
    let req = req.to_request();
    debug!("Making request to {}", req.path());
    match test::try_call_service(&app, req).await {
        Ok(res) => {
            let status = res.status();
            let headers = res.headers().clone();
            let body = to_bytes(res.into_body()).await.ok().unwrap_or_default();
            Response { status, headers, body }
        },
        Err(e) => {
            let res = e.error_response();
            let status = res.status();
            let headers = res.headers().clone();
            let body = to_bytes(res.into_body()).await.ok().unwrap_or_default();
            Response { status, headers, body }
        },
    }
}

pub async fn send(gw: &TestGateway, req: TestRequest) -> Response {
    send_with(&gw.api, security(), req).await
}

pub async fn get(gw: &TestGateway, uri: &str) -> Response {
    send(gw, TestRequest::get().uri(uri)).await
}

pub async fn post_json<T: Serialize>(gw: &TestGateway, uri: &str, body: &T) -> Response {
    send(gw, TestRequest::post().uri(uri).set_json(body)).await
}

/// The path and query of an absolute download link
pub fn local_path(url: &str) -> String {
    let start = url.find("/api/").expect("Not a gateway URL");
    url[start..].to_string()
}

pub fn signed_request(uri: &str, body: &str, header: &str, scheme: SignatureScheme, key: &str) -> TestRequest {
    let signature = calculate_hmac(scheme, key.as_bytes(), body.as_bytes()).expect("Could not sign request");
    TestRequest::post()
        .uri(uri)
        .insert_header(("Content-Type", "application/json"))
        .insert_header((header, signature))
        .set_payload(body.to_string())
}

pub fn admin_request(uri: &str, body: &str) -> TestRequest {
    signed_request(uri, body, ADMIN_SIGNATURE_HEADER, SignatureScheme::Sha256Body, ADMIN_SECRET)
}

pub fn ipn_request(body: &str) -> TestRequest {
    signed_request("/webhook/invoice", body, IPN_SIGNATURE_HEADER, SignatureScheme::Sha512SortedJson, IPN_SECRET)
}
