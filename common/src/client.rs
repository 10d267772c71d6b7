// common/src/client.rs
//
// REST client for the full node (`/v1` API). Only the handful of endpoints the
// flows need are wrapped.

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};

use crate::types::{AccountAddress, ChainId, CoinType, SignedTransaction};

const BCS_SIGNED_TRANSACTION: &str = "application/x.aptos.signed_transaction+bcs";
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Errors returned by the node or while talking to it.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("node returned {status}: {message}")]
    Api {
        status: u16,
        error_code: Option<String>,
        message: String,
    },
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("failed to encode transaction: {0}")]
    Encode(#[from] bcs::Error),
    #[error("transaction {hash} not committed within {timeout:?}")]
    Timeout { hash: String, timeout: Duration },
}

impl NodeError {
    fn is_not_found(&self, code: &str) -> bool {
        matches!(
            self,
            NodeError::Api { status: 404, error_code: Some(c), .. } if c == code
        )
    }
}

/// A transaction as returned by `/transactions/by_hash`.
#[derive(Clone, Debug, PartialEq)]
pub struct TransactionResult(pub Value);

impl TransactionResult {
    pub fn is_pending(&self) -> bool {
        self.0.get("type").and_then(Value::as_str) == Some("pending_transaction")
    }

    pub fn success(&self) -> bool {
        self.0.get("success").and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn vm_status(&self) -> &str {
        self.0.get("vm_status").and_then(Value::as_str).unwrap_or("")
    }
}

/// The node operations the flows depend on.
#[async_trait]
pub trait NodeApi: Send + Sync {
    async fn chain_id(&self) -> Result<ChainId, NodeError>;

    async fn sequence_number(&self, address: AccountAddress) -> Result<u64, NodeError>;

    /// Balance of `coin` held by `address`. An unregistered coin store reads as 0.
    async fn coin_balance(&self, address: AccountAddress, coin: &CoinType) -> Result<u64, NodeError>;

    /// Submits the BCS-encoded transaction and returns its hash.
    async fn submit_bcs(&self, txn: &SignedTransaction) -> Result<String, NodeError>;

    /// `None` while the node has not seen the hash yet.
    async fn transaction_by_hash(&self, hash: &str) -> Result<Option<TransactionResult>, NodeError>;

    /// Polls until the transaction leaves the mempool or `timeout` elapses.
    async fn wait_for_transaction(
        &self,
        hash: &str,
        timeout: Duration,
    ) -> Result<TransactionResult, NodeError> {
        let start = Instant::now();
        loop {
            if let Some(txn) = self.transaction_by_hash(hash).await? {
                if !txn.is_pending() {
                    return Ok(txn);
                }
            }
            if start.elapsed() >= timeout {
                return Err(NodeError::Timeout {
                    hash: hash.to_string(),
                    timeout,
                });
            }
            tracing::debug!(hash, elapsed_secs = start.elapsed().as_secs(), "Waiting for transaction");
            sleep(POLL_INTERVAL).await;
        }
    }
}

// ─────────────────── Response shapes ───────────────────

#[derive(Deserialize)]
struct LedgerInfo {
    chain_id: u8,
}

#[derive(Deserialize)]
struct AccountData {
    sequence_number: String,
}

#[derive(Deserialize)]
struct CoinStoreResource {
    data: CoinStoreData,
}

#[derive(Deserialize)]
struct CoinStoreData {
    coin: CoinValue,
}

#[derive(Deserialize)]
struct CoinValue {
    value: String,
}

#[derive(Deserialize)]
struct PendingTransaction {
    hash: String,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: String,
    #[serde(default)]
    error_code: Option<String>,
}

fn parse_u64(field: &str, value: &str) -> Result<u64, NodeError> {
    value
        .parse()
        .map_err(|_| NodeError::Decode(format!("{field} is not a u64: {value}")))
}

/// Appends `/v1` unless the URL already ends with it.
pub fn api_base(node_url: &str) -> String {
    let trimmed = node_url.trim_end_matches('/');
    if trimmed.ends_with("/v1") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v1")
    }
}

// ─────────────────── HTTP implementation ───────────────────

#[derive(Clone)]
pub struct AptosClient {
    base_url: String,
    http: Client,
}

impl AptosClient {
    pub fn new(node_url: &str, http: Client) -> Self {
        Self {
            base_url: api_base(node_url),
            http,
        }
    }

    fn url(&self, path: &str) -> String {
        if path.is_empty() {
            return self.base_url.clone();
        }
        format!("{}/{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, NodeError> {
        let resp = self.http.get(self.url(path)).send().await?;
        Self::decode(resp).await
    }

    async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, NodeError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<ApiErrorBody>(&body) {
                Ok(err) => NodeError::Api {
                    status: status.as_u16(),
                    error_code: err.error_code,
                    message: err.message,
                },
                Err(_) => NodeError::Api {
                    status: status.as_u16(),
                    error_code: None,
                    message: body,
                },
            });
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl NodeApi for AptosClient {
    async fn chain_id(&self) -> Result<ChainId, NodeError> {
        let info: LedgerInfo = self.get_json("").await?;
        Ok(ChainId(info.chain_id))
    }

    async fn sequence_number(&self, address: AccountAddress) -> Result<u64, NodeError> {
        let account: AccountData = self.get_json(&format!("accounts/{address}")).await?;
        parse_u64("sequence_number", &account.sequence_number)
    }

    async fn coin_balance(&self, address: AccountAddress, coin: &CoinType) -> Result<u64, NodeError> {
        let path = format!("accounts/{address}/resource/0x1::coin::CoinStore<{coin}>");
        match self.get_json::<CoinStoreResource>(&path).await {
            Ok(store) => parse_u64("coin.value", &store.data.coin.value),
            Err(e) if e.is_not_found("resource_not_found") => Ok(0),
            Err(e) => Err(e),
        }
    }

    async fn submit_bcs(&self, txn: &SignedTransaction) -> Result<String, NodeError> {
        let body = txn.to_bcs()?;
        let resp = self
            .http
            .post(self.url("transactions"))
            .header(CONTENT_TYPE, BCS_SIGNED_TRANSACTION)
            .body(body)
            .send()
            .await?;
        let pending: PendingTransaction = Self::decode(resp).await?;
        Ok(pending.hash)
    }

    async fn transaction_by_hash(&self, hash: &str) -> Result<Option<TransactionResult>, NodeError> {
        let resp = self
            .http
            .get(self.url(&format!("transactions/by_hash/{hash}")))
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let value: Value = Self::decode(resp).await?;
        Ok(Some(TransactionResult(value)))
    }
}
