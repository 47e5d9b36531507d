use thiserror::Error;

use crate::traits::data_objects::{ChainReceipt, ChainTransaction};

/// Transport and node-side failures. These are distinct from verification failures and are always retryable.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    #[error("RPC request failed. {0}")]
    Transport(String),
    #[error("RPC node returned error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("RPC node sent a response we could not understand. {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for RpcError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

/// The subset of an Ethereum-style JSON-RPC endpoint used for payment verification.
#[allow(async_fn_in_trait)]
pub trait ChainRpc: Clone {
    /// The endpoint URL, as handed to buyers' wallets
    fn endpoint(&self) -> &str;

    /// `eth_getTransactionByHash`. `None` if the node does not know the transaction.
    async fn get_transaction(&self, tx_hash: &str) -> Result<Option<ChainTransaction>, RpcError>;

    /// `eth_getTransactionReceipt`. `None` if the transaction has not been mined.
    async fn get_receipt(&self, tx_hash: &str) -> Result<Option<ChainReceipt>, RpcError>;
}
