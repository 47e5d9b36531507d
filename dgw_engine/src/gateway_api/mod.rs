//! # Gateway public API
//!
//! [`order_flow_api::OrderFlowApi`] is the single entry point for everything a buyer, the invoice provider or an
//! administrator can do:
//!
//! * hosted-invoice checkout: [`start_order`](order_flow_api::OrderFlowApi::start_order),
//!   [`check_order`](order_flow_api::OrderFlowApi::check_order) and provider notifications;
//! * on-chain checkout: [`create_order_evm`](order_flow_api::OrderFlowApi::create_order_evm) and
//!   [`verify_evm_payment`](order_flow_api::OrderFlowApi::verify_evm_payment);
//! * [`download`](order_flow_api::OrderFlowApi::download), which spends a token and hands back the package;
//! * the admin actions.
//!
//! The API is generic over a [`GatewayStack`](crate::traits::GatewayStack), so tests and the live server can plug in
//! different backends without any change here.
//!
//! ```rust,ignore
//! let api = OrderFlowApi::<LiveStack>::new(store, provider, rpc, catalog, options, producers)?;
//! let started = api.start_order(StartOrderRequest::new("prod-1")).await?;
//! // ... the buyer pays the invoice ...
//! let status = api.check_order(&started.order_id).await?;
//! ```
pub mod errors;
pub mod order_flow_api;
pub mod order_objects;
