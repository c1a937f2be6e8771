//! Ethereum JSON-RPC ledger client.
//!
//! Two calls are used: `eth_blockNumber` for the head and `eth_getLogs`
//! filtered by contract address and the `PanelEventAdded` topic. Logs are
//! decoded one by one; a log that fails to decode is skipped and counted,
//! the rest of the batch is still returned.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::{Address, B256, Bytes, hex};
use async_trait::async_trait;
use dpp_core::DecodedEvent;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::abi::{PANEL_EVENT_TOPIC, decode_panel_event};
use crate::errors::{LedgerError, LedgerResult};
use crate::traits::LedgerClient;

/// Counter: logs returned by the node that could not be decoded.
pub const LEDGER_DECODE_FAILURES_TOTAL: &str = "dpp_ledger_decode_failures_total";

/// Longest response body kept in an error message.
const MAX_ERROR_BODY: usize = 256;

/// JSON-RPC 2.0 client for an Ethereum node.
pub struct JsonRpcLedgerClient {
    http: reqwest::Client,
    url: String,
    contract: Address,
    timeout: Duration,
    next_id: AtomicU64,
}

impl JsonRpcLedgerClient {
    /// Create a client for `rpc_url` watching `contract_address`.
    pub fn new(
        rpc_url: impl Into<String>,
        contract_address: &str,
        timeout: Duration,
    ) -> LedgerResult<Self> {
        let contract: Address = contract_address.parse().map_err(|e| {
            LedgerError::malformed(format!("contract address {contract_address}: {e}"))
        })?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: rpc_url.into(),
            contract,
            timeout,
            next_id: AtomicU64::new(1),
        })
    }

    /// Contract whose logs are fetched.
    pub fn contract(&self) -> Address {
        self.contract
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> LedgerResult<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let message = truncate(response.text().await.unwrap_or_default());
            return Err(LedgerError::RateLimited { message });
        }
        if !status.is_success() {
            let message = truncate(response.text().await.unwrap_or_default());
            return Err(LedgerError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: RpcResponse = response.json().await.map_err(|e| {
            if e.is_decode() {
                LedgerError::malformed(format!("{method}: {e}"))
            } else {
                self.map_transport(e)
            }
        })?;

        if let Some(err) = envelope.error {
            // Some providers report throttling as a JSON-RPC error
            if err.code == 429 {
                return Err(LedgerError::RateLimited {
                    message: err.message,
                });
            }
            return Err(LedgerError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        let result = envelope
            .result
            .ok_or_else(|| LedgerError::malformed(format!("{method}: missing result")))?;
        serde_json::from_value(result)
            .map_err(|e| LedgerError::malformed(format!("{method}: {e}")))
    }

    fn map_transport(&self, err: reqwest::Error) -> LedgerError {
        if err.is_timeout() {
            LedgerError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            LedgerError::Transport(err)
        }
    }
}

#[async_trait]
impl LedgerClient for JsonRpcLedgerClient {
    async fn current_height(&self) -> LedgerResult<u64> {
        let raw: String = self.call("eth_blockNumber", json!([])).await?;
        parse_quantity(&raw)
    }

    async fn events(&self, from: u64, to: u64) -> LedgerResult<Vec<DecodedEvent>> {
        let filter = json!({
            "address": hex::encode_prefixed(self.contract),
            "topics": [hex::encode_prefixed(PANEL_EVENT_TOPIC)],
            "fromBlock": format!("{from:#x}"),
            "toBlock": format!("{to:#x}"),
        });
        let logs: Vec<Value> = self.call("eth_getLogs", json!([filter])).await?;
        debug!(from_block = from, to_block = to, logs = logs.len(), "fetched logs");

        let mut events = Vec::with_capacity(logs.len());
        for (index, raw) in logs.into_iter().enumerate() {
            match decode_log(raw) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => debug!(index, "skipping removed log"),
                Err(e) => {
                    warn!(index, from_block = from, to_block = to, error = %e, "skipping undecodable log");
                    metrics::counter!(LEDGER_DECODE_FAILURES_TOTAL).increment(1);
                }
            }
        }
        Ok(events)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    topics: Vec<B256>,
    data: Bytes,
    block_number: Option<String>,
    #[serde(default)]
    removed: bool,
}

/// Decode one `eth_getLogs` entry. `Ok(None)` for logs removed by a reorg.
fn decode_log(raw: Value) -> LedgerResult<Option<DecodedEvent>> {
    let log: RpcLog =
        serde_json::from_value(raw).map_err(|e| LedgerError::malformed(format!("log: {e}")))?;
    if log.removed {
        return Ok(None);
    }
    let block_number = log
        .block_number
        .as_deref()
        .ok_or_else(|| LedgerError::malformed("log without blockNumber"))
        .and_then(parse_quantity)?;
    decode_panel_event(&log.topics, &log.data, block_number).map(Some)
}

/// Parse a `0x`-prefixed hex quantity.
pub fn parse_quantity(raw: &str) -> LedgerResult<u64> {
    let digits = raw
        .strip_prefix("0x")
        .ok_or_else(|| LedgerError::malformed(format!("quantity without 0x prefix: {raw}")))?;
    u64::from_str_radix(digits, 16)
        .map_err(|e| LedgerError::malformed(format!("quantity {raw}: {e}")))
}

fn truncate(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    body
}
