//! On-chain payment verification.
//!
//! [`JsonRpcClient`] is a thin Ethereum JSON-RPC client. [`OnChainVerifier`] uses any [`ChainRpc`] implementation to
//! decide whether a transaction pays the merchant at least the expected amount.
//!
//! [`ChainRpc`]: crate::traits::ChainRpc
mod json_rpc;
mod verifier;

pub use json_rpc::JsonRpcClient;
pub use verifier::{same_address, OnChainVerifier, Rejection, TransferCheck, VerifiedTransfer, VerifyError};
