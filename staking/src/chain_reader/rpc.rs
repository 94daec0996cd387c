//! JSON-RPC provider: `eth_call` against an ERC-721 contract.
//!
//! This provider hand-encodes the three read-only calls the backend
//! needs — `ownerOf(uint256)`, `balanceOf(address)`, `tokenURI(uint256)` —
//! and decodes the returned ABI words. The encoding helpers are shared
//! with the exhaustive-scan provider, which issues the same `ownerOf`
//! calls against a public fallback node.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::types::{CanonicalAddress, TokenId};

use super::metadata::{self, NftMetadata};
use super::{NftOwnershipSource, ProviderError, ProviderKind};

/// 4-byte selector of `ownerOf(uint256)`.
const SELECTOR_OWNER_OF: &str = "6352211e";
/// 4-byte selector of `balanceOf(address)`.
const SELECTOR_BALANCE_OF: &str = "70a08231";
/// 4-byte selector of `tokenURI(uint256)`.
const SELECTOR_TOKEN_URI: &str = "c87b56dd";

/// JSON-RPC provider over a single node endpoint.
pub struct JsonRpcProvider {
    endpoint: String,
    client: Client,
    ipfs_gateway: String,
}

impl JsonRpcProvider {
    /// Constructs a provider for `endpoint`, with every call (including
    /// follow-up metadata fetches) bounded by `timeout`.
    pub fn new(
        endpoint: impl Into<String>,
        timeout: Duration,
        ipfs_gateway: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            endpoint: endpoint.into(),
            client,
            ipfs_gateway: ipfs_gateway.into(),
        })
    }
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u32,
    method: &'static str,
    params: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// Issues one `eth_call` and returns the raw hex result (with `0x`).
pub(crate) fn eth_call(
    client: &Client,
    endpoint: &str,
    contract: &CanonicalAddress,
    data: &str,
) -> Result<String, ProviderError> {
    let params = json!([{ "to": contract.as_str(), "data": data }, "latest"]);
    let req = RpcRequest {
        jsonrpc: "2.0",
        id: 1,
        method: "eth_call",
        params: &params,
    };

    let resp = client
        .post(endpoint)
        .json(&req)
        .send()
        .map_err(|e| ProviderError::Transport(format!("POST {endpoint} failed: {e}")))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(ProviderError::Service(format!(
            "node returned HTTP status {status}"
        )));
    }

    let body = resp
        .json::<RpcResponse>()
        .map_err(|e| ProviderError::Protocol(format!("failed to parse JSON-RPC response: {e}")))?;

    if let Some(err) = body.error {
        return Err(ProviderError::Service(format!(
            "JSON-RPC error {}: {}",
            err.code, err.message
        )));
    }

    body.result
        .ok_or_else(|| ProviderError::Protocol("JSON-RPC response had no result".to_string()))
}

/// `ownerOf(uint256 tokenId)` calldata.
pub(crate) fn encode_owner_of(token: TokenId) -> String {
    format!("0x{SELECTOR_OWNER_OF}{:064x}", token.0)
}

/// `balanceOf(address owner)` calldata.
pub(crate) fn encode_balance_of(wallet: &CanonicalAddress) -> String {
    format!("0x{SELECTOR_BALANCE_OF}{:0>64}", wallet.hex_body())
}

/// `tokenURI(uint256 tokenId)` calldata.
pub(crate) fn encode_token_uri(token: TokenId) -> String {
    format!("0x{SELECTOR_TOKEN_URI}{:064x}", token.0)
}

/// Decodes a single ABI word holding an address.
pub(crate) fn decode_address_word(result: &str) -> Result<CanonicalAddress, ProviderError> {
    let body = result.trim_start_matches("0x");
    if body.len() < 40 {
        return Err(ProviderError::Protocol(format!(
            "result too short for an address word: {result:?}"
        )));
    }
    let tail = &body[body.len() - 40..];
    CanonicalAddress::normalize(tail)
        .map_err(|e| ProviderError::Protocol(format!("invalid address in result: {e}")))
}

/// Decodes a single ABI word holding an unsigned integer.
pub(crate) fn decode_uint_word(result: &str) -> Result<u64, ProviderError> {
    let body = result.trim_start_matches("0x");
    let digits = body.trim_start_matches('0');
    if digits.is_empty() && !body.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16)
        .map_err(|_| ProviderError::Protocol(format!("invalid uint word: {result:?}")))
}

/// Decodes an ABI-encoded dynamic string (offset word, length word, data).
pub(crate) fn decode_string(result: &str) -> Result<String, ProviderError> {
    let body = result.trim_start_matches("0x");
    let bytes = hex::decode(body)
        .map_err(|e| ProviderError::Protocol(format!("invalid hex in string result: {e}")))?;
    if bytes.len() < 64 {
        return Err(ProviderError::Protocol(
            "result too short for a dynamic string".to_string(),
        ));
    }

    let offset = word_to_usize(&bytes[..32])?;
    let len_start = offset.checked_add(32).filter(|end| *end <= bytes.len());
    let len_start = len_start.ok_or_else(|| {
        ProviderError::Protocol("dynamic string offset out of bounds".to_string())
    })?;
    let len = word_to_usize(&bytes[offset..len_start])?;

    let data_end = len_start.checked_add(len).filter(|end| *end <= bytes.len());
    let data_end = data_end.ok_or_else(|| {
        ProviderError::Protocol("dynamic string length out of bounds".to_string())
    })?;

    String::from_utf8(bytes[len_start..data_end].to_vec())
        .map_err(|e| ProviderError::Protocol(format!("dynamic string is not UTF-8: {e}")))
}

fn word_to_usize(word: &[u8]) -> Result<usize, ProviderError> {
    if word.len() != 32 || word[..24].iter().any(|b| *b != 0) {
        return Err(ProviderError::Protocol(
            "ABI word does not fit in usize".to_string(),
        ));
    }
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&word[24..]);
    Ok(u64::from_be_bytes(arr) as usize)
}

impl NftOwnershipSource for JsonRpcProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::JsonRpc
    }

    fn owner_of(
        &self,
        contract: &CanonicalAddress,
        token: TokenId,
    ) -> Result<CanonicalAddress, ProviderError> {
        let result = eth_call(&self.client, &self.endpoint, contract, &encode_owner_of(token))?;
        decode_address_word(&result)
    }

    fn balance_of(
        &self,
        contract: &CanonicalAddress,
        wallet: &CanonicalAddress,
    ) -> Result<u64, ProviderError> {
        let result = eth_call(
            &self.client,
            &self.endpoint,
            contract,
            &encode_balance_of(wallet),
        )?;
        decode_uint_word(&result)
    }

    fn token_metadata(
        &self,
        contract: &CanonicalAddress,
        token: TokenId,
    ) -> Result<NftMetadata, ProviderError> {
        let result = eth_call(
            &self.client,
            &self.endpoint,
            contract,
            &encode_token_uri(token),
        )?;
        let uri = decode_string(&result)?;
        metadata::resolve_token_uri(&self.client, &uri, &self.ipfs_gateway)
    }
}
