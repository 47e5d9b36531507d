use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use log::*;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};

use crate::traits::{ChainReceipt, ChainRpc, ChainTransaction, RpcError};

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Clone)]
pub struct JsonRpcClient {
    client: Client,
    endpoint: Arc<String>,
    next_id: Arc<AtomicU64>,
}

impl JsonRpcClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, RpcError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| RpcError::Transport(e.to_string()))?;
        Ok(Self { client, endpoint: Arc::new(endpoint.to_string()), next_id: Arc::new(AtomicU64::new(1)) })
    }

    /// Calls `method` and returns its `result`, which is `None` when the node answers with `null`.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<Option<T>, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        trace!("⛓️ RPC call #{id} {method}");
        let response = self.client.post(self.endpoint.as_str()).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!("⛓️ RPC endpoint responded with {status} to {method}. {text}");
            return Err(RpcError::Transport(format!("HTTP {status}. {text}")));
        }
        let response: RpcResponse<T> =
            response.json().await.map_err(|e| RpcError::InvalidResponse(format!("{method}: {e}")))?;
        if let Some(RpcErrorBody { code, message }) = response.error {
            warn!("⛓️ RPC error for {method}: {code} {message}");
            return Err(RpcError::Rpc { code, message });
        }
        Ok(response.result)
    }
}

impl ChainRpc for JsonRpcClient {
    fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    async fn get_transaction(&self, tx_hash: &str) -> Result<Option<ChainTransaction>, RpcError> {
        self.call("eth_getTransactionByHash", json!([tx_hash])).await
    }

    async fn get_receipt(&self, tx_hash: &str) -> Result<Option<ChainReceipt>, RpcError> {
        self.call("eth_getTransactionReceipt", json!([tx_hash])).await
    }
}
