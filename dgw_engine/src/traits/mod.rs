//! # Gateway backends
//!
//! This module defines the interface contracts that the gateway's collaborators must satisfy.
//!
//! ## Persistence
//! The gateway needs somewhere to keep three collections: orders, the on-chain payment ledger and the opaque token
//! table. There are no relational transactions here. Backends only have to honour the consistency contracts spelled
//! out on each trait method, and they have to serialize their own writes.
//!
//! * [`OrderStore`] holds orders and enforces the order state machine on every status change.
//! * [`PaymentLedger`] is the append-only record of on-chain verification attempts. A `pass` record for a transaction
//!   hash is the idempotency guard against crediting the same transfer twice.
//! * [`TokenStore`] holds opaque download tokens and consumes them atomically.
//!
//! ## Payment sources
//! * [`InvoiceProvider`] creates hosted invoices and reports their status. The real client and the simulated provider
//!   both implement it.
//! * [`ChainRpc`] is the minimal JSON-RPC surface the on-chain verifier needs.
//!
//! ## Products
//! * [`ProductCatalog`] and [`ArtifactResolver`] give access to the product list and the packaged deliverables, which
//!   are produced elsewhere and consumed read-only here.
//!
//! [`GatewayStack`] bundles one implementation of each into a single type parameter for the orchestrator.
mod catalog;
mod chain_rpc;
mod data_objects;
mod invoice_provider;
mod order_store;

pub use catalog::{ArtifactResolver, CatalogError, ProductCatalog};
pub use chain_rpc::{ChainRpc, RpcError};
pub use data_objects::{
    Artifact,
    ChainReceipt,
    ChainTransaction,
    ConsumeOutcome,
    CreditOutcome,
    Invoice,
    InvoiceRequest,
    InvoiceStatus,
    Product,
    StatusChange,
};
pub use invoice_provider::{InvoiceProvider, ProviderError};
pub use order_store::{OrderStore, PaymentLedger, StoreError, TokenStore};

/// A complete set of backends for the orchestrator.
///
/// This is a marker trait. Implementors are usually zero-sized types that exist only to name the concrete backends,
/// e.g.
/// ```nocompile
/// #[derive(Clone)]
/// struct LiveStack;
/// impl GatewayStack for LiveStack {
///     type Store = FileStore;
///     type Provider = InvoiceBackend;
///     type Chain = JsonRpcClient;
///     type Catalog = FileCatalog;
/// }
/// ```
pub trait GatewayStack: Clone + 'static {
    type Store: OrderStore + PaymentLedger + TokenStore + 'static;
    type Provider: InvoiceProvider + 'static;
    type Chain: ChainRpc + 'static;
    type Catalog: ProductCatalog + ArtifactResolver + 'static;
}
