//! NFT metadata types and token-URI resolution.
//!
//! Metadata reaches us two ways: indexers return attribute lists directly,
//! while the on-chain path yields a `tokenURI` string that still has to be
//! fetched. Token URIs in the wild come in three shapes:
//!
//! - plain `https://` URLs,
//! - `ipfs://<cid>/<path>` URIs, rewritten to an HTTP gateway,
//! - inline `data:application/json;base64,<payload>` documents.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use super::ProviderError;

/// Default public IPFS gateway used to rewrite `ipfs://` URIs.
pub const DEFAULT_IPFS_GATEWAY: &str = "https://ipfs.io/ipfs/";

const IPFS_SCHEME: &str = "ipfs://";
const BASE64_JSON_PREFIX: &str = "data:application/json;base64,";

/// One `{trait_type, value}` entry from a metadata document.
///
/// `value` stays a raw JSON value because collections mix strings and
/// numbers freely; [`NftAttribute::value_str`] gives the string view the
/// rarity resolver needs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NftAttribute {
    #[serde(default)]
    pub trait_type: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl NftAttribute {
    /// Returns the attribute value as a string, if it is one.
    pub fn value_str(&self) -> Option<&str> {
        self.value.as_str()
    }
}

/// Parsed NFT metadata document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NftMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub attributes: Vec<NftAttribute>,
}

impl NftMetadata {
    /// Case-insensitive attribute lookup by trait key.
    pub fn attribute(&self, key: &str) -> Option<&NftAttribute> {
        self.attributes
            .iter()
            .find(|attr| attr.trait_type.eq_ignore_ascii_case(key))
    }
}

/// Rewrites an `ipfs://` URI to the given HTTP gateway; other URIs pass
/// through unchanged.
pub fn normalize_token_uri(uri: &str, ipfs_gateway: &str) -> String {
    match uri.strip_prefix(IPFS_SCHEME) {
        Some(path) => format!(
            "{}/{}",
            ipfs_gateway.trim_end_matches('/'),
            path.trim_start_matches('/')
        ),
        None => uri.to_string(),
    }
}

/// Resolves a token URI into parsed metadata.
///
/// Inline base64 JSON data URIs are decoded locally; everything else is
/// fetched over HTTP after gateway normalization.
pub fn resolve_token_uri(
    client: &Client,
    uri: &str,
    ipfs_gateway: &str,
) -> Result<NftMetadata, ProviderError> {
    if let Some(payload) = uri.strip_prefix(BASE64_JSON_PREFIX) {
        let bytes = BASE64
            .decode(payload.trim())
            .map_err(|e| ProviderError::Protocol(format!("invalid base64 data URI: {e}")))?;
        return serde_json::from_slice(&bytes)
            .map_err(|e| ProviderError::Protocol(format!("invalid JSON in data URI: {e}")));
    }

    let url = normalize_token_uri(uri, ipfs_gateway);
    let resp = client
        .get(&url)
        .send()
        .map_err(|e| ProviderError::Transport(format!("GET {url} failed: {e}")))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(ProviderError::Service(format!(
            "metadata host returned HTTP status {status} for {url}"
        )));
    }

    resp.json::<NftMetadata>()
        .map_err(|e| ProviderError::Protocol(format!("failed to parse metadata JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipfs_uris_are_rewritten_to_the_gateway() {
        let url = normalize_token_uri("ipfs://QmYwAPJzv5CZsnA/1.json", "https://ipfs.io/ipfs/");
        assert_eq!(url, "https://ipfs.io/ipfs/QmYwAPJzv5CZsnA/1.json");
    }

    #[test]
    fn http_uris_pass_through() {
        let url = normalize_token_uri("https://meta.cardforge.gg/42", DEFAULT_IPFS_GATEWAY);
        assert_eq!(url, "https://meta.cardforge.gg/42");
    }

    #[test]
    fn inline_base64_data_uris_decode_locally() {
        let json = r#"{"name":"Card #42","attributes":[{"trait_type":"Card Frame","value":"Elite"}]}"#;
        let uri = format!("{BASE64_JSON_PREFIX}{}", BASE64.encode(json));

        let client = Client::new();
        let meta = resolve_token_uri(&client, &uri, DEFAULT_IPFS_GATEWAY)
            .expect("data URI should decode without network I/O");

        assert_eq!(meta.name.as_deref(), Some("Card #42"));
        let frame = meta.attribute("card frame").expect("frame attribute");
        assert_eq!(frame.value_str(), Some("Elite"));
    }

    #[test]
    fn attribute_lookup_is_case_insensitive() {
        let meta: NftMetadata = serde_json::from_str(
            r#"{"attributes":[{"trait_type":"Rarity","value":"prototype"}]}"#,
        )
        .expect("metadata should parse");

        assert!(meta.attribute("RARITY").is_some());
        assert!(meta.attribute("Card Frame").is_none());
    }
}
