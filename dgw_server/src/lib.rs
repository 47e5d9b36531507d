//! # Digital goods gateway server
//! This crate hosts the HTTP surface of the gateway. It is responsible for:
//! * Taking checkout requests for hosted invoices and for on-chain payments.
//! * Receiving signed payment notifications from the invoice provider.
//! * Serving packages to buyers holding a valid download token.
//! * The optional, signed, admin routes.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! * `GET /health`
//! * `GET /api/products`
//! * `POST /api/orders`, `GET /api/orders/{order_id}`
//! * `POST /api/evm/orders`, `POST /api/evm/verify`
//! * `GET /api/download?order_id=..&token=..`
//! * `POST /webhook/invoice`
//! * `POST /admin/orders/mark_paid`, `POST /admin/orders/list`, `POST /admin/orders/expire`
//! * `GET /simulated/invoice/{payment_id}` when the simulated provider is active

pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod expiry_worker;
pub mod helpers;
pub mod middleware;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
