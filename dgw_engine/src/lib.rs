//! Digital Goods Gateway engine
//!
//! The engine sells digital packages. A buyer pays either through a hosted invoice or by transferring native coin
//! straight to the merchant's address, and gets back a token that unlocks the package download.
//! This library holds all of that logic and knows nothing about HTTP.
//!
//! The library is divided into these sections:
//! 1. Persistence ([`mod@store`]). Orders, the on-chain payment ledger and opaque tokens live in a JSON file store or
//!    a remote key/value service. Both implement the contracts in [`mod@traits`]. The data types they hold are in
//!    [`mod@db_types`].
//! 2. Payment sources. [`mod@providers`] creates and polls hosted invoices, and [`mod@chain`] verifies transfers with
//!    a JSON-RPC node.
//! 3. Download tokens ([`mod@tokens`]) and the product catalog ([`mod@catalog`]).
//! 4. The public API ([`OrderFlowApi`]), which ties all of the above together.
//!
//! The engine also emits events when orders are paid or annulled. See [`mod@events`] for how to subscribe.
pub mod catalog;
pub mod chain;
pub mod db_types;
pub mod events;
mod gateway_api;
pub mod providers;
pub mod store;
pub mod tokens;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use catalog::FileCatalog;
pub use chain::{JsonRpcClient, OnChainVerifier};
pub use gateway_api::{errors::GatewayError, order_flow_api::OrderFlowApi, order_objects};
pub use providers::{HostedInvoiceClient, HostedInvoiceConfig, InvoiceBackend, SimulatedProvider};
pub use store::{FileStore, RemoteKvStore, StoreBackend};
pub use tokens::{SignedTokenService, TokenConfig, TokenError};
