#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **indexer-rpc** – Tendermint/Cosmos JSON-RPC client.
//!
//! A thin, stateless wrapper over the chain endpoint's `/status`,
//! `/genesis`, `/block`, and `/block_results` routes, grounded directly in
//! the original indexer's `HTTPClient`. It performs no retries and no
//! response normalisation beyond parsing the wire envelope — the Sync
//! Controller owns retry policy, and `indexer-parser` owns turning a
//! `RawBlock` into a `Block`.

use std::time::Duration;

use indexer_types::{Height, RawBlock, RawBlockResults};
use serde::de::Error as _;
use serde::Deserialize;
use serde_json::Value;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors raised by the RPC client.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The underlying HTTP request failed (connection, TLS, timeout, etc.).
    #[error("request to {endpoint} failed: {source}")]
    Request {
        /// Endpoint that was being called.
        endpoint: String,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },
    /// The endpoint returned a non-2xx status.
    #[error("{endpoint} returned HTTP {code}")]
    Status {
        /// HTTP status code returned.
        code: u16,
        /// Endpoint that returned it.
        endpoint: String,
    },
    /// The response body could not be parsed into the expected shape.
    #[error("failed to decode response from {endpoint}: {source}")]
    Decode {
        /// Endpoint whose response failed to parse.
        endpoint: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// A stateless client for one chain endpoint's JSON-RPC surface.
#[derive(Debug, Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    base_url: String,
}

impl RpcClient {
    /// Build a client against `base_url`, using the default 10s timeout.
    pub fn new(base_url: impl Into<String>) -> Result<Self, RpcError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Build a client with an explicit per-request timeout.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| RpcError::Request {
                endpoint: "<client-build>".to_string(),
                source,
            })?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    /// `/status` — a generic JSON object; the indexer does not interpret it
    /// beyond surfacing it verbatim (e.g. for health checks).
    pub async fn status(&self) -> Result<Value, RpcError> {
        self.get("status", &[]).await
    }

    /// `/genesis` — returned as a generic JSON value; the indexer does not
    /// model the genesis document's full shape, only passes it through.
    pub async fn genesis(&self) -> Result<Value, RpcError> {
        let envelope: Envelope<GenesisResult> = self.get_typed("genesis", &[]).await?;
        Ok(envelope.result.genesis)
    }

    /// `/block?height=<h>` — the raw block at `height`.
    pub async fn block(&self, height: Height) -> Result<RawBlock, RpcError> {
        let height_str = height.to_string();
        let envelope: Envelope<RawBlock> =
            self.get_typed("block", &[("height", height_str.as_str())]).await?;
        Ok(envelope.result)
    }

    /// `/block_results?height=<h>` — per-transaction execution results at `height`.
    pub async fn block_results(&self, height: Height) -> Result<RawBlockResults, RpcError> {
        let height_str = height.to_string();
        let envelope: Envelope<RawBlockResults> = self
            .get_typed("block_results", &[("height", height_str.as_str())])
            .await?;
        Ok(envelope.result)
    }

    /// The chain's current tip height, taken from an unparameterised `/block`
    /// call (mirrors the original's `LatestBlockHeight`).
    pub async fn latest_block_height(&self) -> Result<Height, RpcError> {
        let envelope: Envelope<RawBlock> = self.get_typed("block", &[]).await?;
        envelope
            .result
            .header
            .height
            .parse()
            .map_err(|source| RpcError::Decode {
                endpoint: "block".to_string(),
                source: serde::de::Error::custom(format!("invalid height: {source}")),
            })
    }

    async fn get(&self, method: &str, query: &[(&str, &str)]) -> Result<Value, RpcError> {
        self.get_typed(method, query).await
    }

    async fn get_typed<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        query: &[(&str, &str)],
    ) -> Result<T, RpcError> {
        let url = format!("{}/{}", self.base_url, method);
        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|source| RpcError::Request {
                endpoint: method.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(RpcError::Status {
                code: response.status().as_u16(),
                endpoint: method.to_string(),
            });
        }

        let bytes = response.bytes().await.map_err(|source| RpcError::Request {
            endpoint: method.to_string(),
            source,
        })?;

        serde_json::from_slice(&bytes).map_err(|source| RpcError::Decode {
            endpoint: method.to_string(),
            source,
        })
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct GenesisResult {
    genesis: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_unwraps_result_field() {
        let json = r#"{"jsonrpc":"2.0","id":1,"result":{"genesis":{"chain_id":"test"}}}"#;
        let envelope: Envelope<GenesisResult> = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.result.genesis["chain_id"], "test");
    }

    #[tokio::test]
    async fn client_build_rejects_nothing_up_front() {
        let client = RpcClient::new("http://localhost:26657");
        assert!(client.is_ok());
    }
}
