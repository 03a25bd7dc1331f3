use serde::Deserialize;
use std::fmt;

/// Number and unix timestamp of a single block, as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockMeta {
    pub number: u64,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTarget {
    Latest,
    Number(u64),
}

impl BlockTarget {
    /// Wire encoding for eth_getBlockByNumber: "latest" or 0x-prefixed lowercase hex.
    fn to_wire(self) -> String {
        match self {
            BlockTarget::Latest => "latest".to_string(),
            BlockTarget::Number(number) => format!("{number:#x}"),
        }
    }
}

impl fmt::Display for BlockTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockTarget::Latest => write!(f, "latest"),
            BlockTarget::Number(number) => write!(f, "{number}"),
        }
    }
}

#[derive(Debug)]
pub enum ProviderError {
    Transport(String),
    HttpStatus(u16),
    Rpc(String),
    InvalidResponse(String),
    BlockNotFound(BlockTarget),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Transport(msg) => {
                write!(f, "Failed to reach block data provider: {msg}")
            }
            ProviderError::HttpStatus(status) => {
                write!(f, "Block data provider returned HTTP status {status}")
            }
            ProviderError::Rpc(msg) => {
                write!(f, "Block data provider returned an RPC error: {msg}")
            }
            ProviderError::InvalidResponse(msg) => {
                write!(f, "Failed to decode block data provider response: {msg}")
            }
            ProviderError::BlockNotFound(target) => {
                write!(f, "Block {target} not found on the provider")
            }
        }
    }
}

impl std::error::Error for ProviderError {}

/// Seam over the remote block data provider so the search logic
/// can be exercised against mocks.
pub trait BlockSource {
    async fn block_meta(&self, target: BlockTarget) -> Result<BlockMeta, ProviderError>;
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<RpcBlock>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcBlock {
    number: String,
    timestamp: String,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// JSON-RPC client for eth_getBlockByNumber. One POST per call,
/// no retry; failures propagate to the caller.
pub struct RpcBlockSource {
    client: reqwest::Client,
    url: String,
}

impl RpcBlockSource {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

impl BlockSource for RpcBlockSource {
    async fn block_meta(&self, target: BlockTarget) -> Result<BlockMeta, ProviderError> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "eth_getBlockByNumber",
            "params": [target.to_wire(), false],
            "id": 1,
        });

        tracing::debug!("Fetching block {target}");

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::HttpStatus(status.as_u16()));
        }

        let rpc_response: RpcResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        if let Some(error) = rpc_response.error {
            return Err(ProviderError::Rpc(format!(
                "code {}: {}",
                error.code, error.message
            )));
        }

        // A query past the chain head comes back as result: null and
        // must surface as an error, never as a zeroed block.
        let block = rpc_response
            .result
            .ok_or(ProviderError::BlockNotFound(target))?;

        Ok(BlockMeta {
            number: hex_to_u64("number", &block.number)?,
            timestamp: hex_to_u64("timestamp", &block.timestamp)?,
        })
    }
}

fn hex_to_u64(field: &str, value: &str) -> Result<u64, ProviderError> {
    let digits = value.strip_prefix("0x").ok_or_else(|| {
        ProviderError::InvalidResponse(format!("field {field}: missing 0x prefix in {value:?}"))
    })?;
    u64::from_str_radix(digits, 16).map_err(|e| {
        ProviderError::InvalidResponse(format!("field {field}: invalid hex {value:?}: {e}"))
    })
}
