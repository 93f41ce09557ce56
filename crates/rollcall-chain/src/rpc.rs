//! Minimal JSON-RPC transport: `eth_call` against the latest block.

use crate::error::ChainError;
use ethabi::Address;
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

pub struct RpcClient {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Execute a read-only call and return the raw return data.
    pub async fn eth_call(&self, to: Address, data: &[u8]) -> Result<Vec<u8>, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "eth_call",
            "params": [
                { "to": format!("{to:?}"), "data": format!("0x{}", hex::encode(data)) },
                "latest"
            ],
        });

        tracing::debug!(id, url = %self.url, to = ?to, "eth_call");
        let response: RpcResponse = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = response.error {
            return Err(ChainError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        let result = response
            .result
            .ok_or_else(|| ChainError::InvalidResponse("neither result nor error".into()))?;
        decode_hex(&result)
    }
}

fn decode_hex(text: &str) -> Result<Vec<u8>, ChainError> {
    let digits = text
        .strip_prefix("0x")
        .ok_or_else(|| ChainError::InvalidResponse(format!("result {text:?} is not 0x-prefixed")))?;
    hex::decode(digits).map_err(|e| ChainError::InvalidResponse(format!("result is not hex: {e}")))
}
