//! Request signature checks for Actix Web.
//!
//! [`HmacMiddlewareFactory`] reads the whole request body, checks the hex-encoded HMAC in the configured header and
//! puts the body back for the handler. Two schemes are in use:
//! * Invoice payment notifications are signed with HMAC-SHA512 over the key-sorted JSON body, in `x-nowpayments-sig`.
//! * Admin calls are signed with HMAC-SHA256 over the raw body, in `x-dgw-signature`.
//!
//! A scope wrapped with an empty key refuses every request.

use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_http::h1;
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    web,
    Error,
};
use dgw_common::Secret;
use futures::future::LocalBoxFuture;
use log::{trace, warn};

use crate::{
    errors::ServerError,
    helpers::{signature_is_valid, SignatureScheme},
};

pub struct HmacMiddlewareFactory {
    hmac_header: String,
    key: Secret<String>,
    scheme: SignatureScheme,
}

impl HmacMiddlewareFactory {
    pub fn new(hmac_header: &str, key: Secret<String>, scheme: SignatureScheme) -> Self {
        HmacMiddlewareFactory { hmac_header: hmac_header.into(), key, scheme }
    }
}

impl<S, B> Transform<S, ServiceRequest> for HmacMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = HmacMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(HmacMiddlewareService {
            hmac_header: self.hmac_header.clone(),
            key: self.key.clone(),
            scheme: self.scheme,
            service: Rc::new(service),
        }))
    }
}

pub struct HmacMiddlewareService<S> {
    hmac_header: String,
    key: Secret<String>,
    scheme: SignatureScheme,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for HmacMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let secret = self.key.clone();
        let hmac_header = self.hmac_header.clone();
        let scheme = self.scheme;
        Box::pin(async move {
            trace!("🔐️ Checking {hmac_header} signature for {}", req.path());
            if secret.is_empty() {
                warn!("🔐️ No signing key is configured for {}. Denying access.", req.path());
                return Err(ServerError::InvalidSignature.into());
            }
            let data = req.extract::<web::Bytes>().await.map_err(|e| {
                warn!("🔐️ Failed to extract request data: {:?}", e);
                ServerError::InvalidRequestBody("Failed to extract request data.".into())
            })?;
            let signature = req
                .headers()
                .get(&hmac_header)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
                .ok_or_else(|| {
                    warn!("🔐️ No signature found in request. Denying access.");
                    ServerError::MissingSignature
                })?;
            if signature_is_valid(scheme, secret.as_bytes(), data.as_ref(), &signature) {
                trace!("🔐️ Signature check for request ✅️");
                req.set_payload(bytes_to_payload(data));
                service.call(req).await
            } else {
                warn!("🔐️ Invalid signature found in request. Denying access.");
                Err(ServerError::InvalidSignature.into())
            }
        })
    }
}

fn bytes_to_payload(buf: web::Bytes) -> Payload {
    let (_, mut pl) = h1::Payload::create(true);
    pl.unread_data(buf);
    Payload::from(pl)
}
