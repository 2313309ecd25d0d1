use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use blog_types::{Account, PostId, PostPatch, RemotePost};

use crate::config::NodeConfig;
use crate::error::{status_error, SyncError, SyncResult};
use crate::store::{
    EntryFunctionPayload, RemoteOutcome, RemotePostStore, TransactionId, TransactionSigner,
};
use crate::synchronizer::now_ms;

const UNTITLED: &str = "Untitled";

/// Remote store backed by the posts resource of an Aptos full node.
///
/// Reads go straight to the node's REST API. Writes are handed to a
/// [`TransactionSigner`] (the wallet), since this client holds no keys.
#[derive(Clone)]
pub struct AptosRestStore {
    http_client: HttpClient,
    config: NodeConfig,
    signer: Option<Arc<dyn TransactionSigner>>,
}

impl AptosRestStore {
    pub fn new(config: NodeConfig) -> SyncResult<Self> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| SyncError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            config,
            signer: None,
        })
    }

    /// Use `signer` to submit create transactions
    pub fn with_signer(mut self, signer: Arc<dyn TransactionSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.url.trim_end_matches('/'), path)
    }

    /// Payload publishing a post; content travels as `vector<u8>`
    pub fn create_payload(
        &self,
        title: &str,
        content: &str,
        tags: &[String],
    ) -> EntryFunctionPayload {
        EntryFunctionPayload::new(
            self.config.create_function_id(),
            vec![
                json!(title),
                json!(format!("0x{}", hex::encode(content.as_bytes()))),
                json!(tags),
            ],
        )
    }

    /// Poll the node until `transaction` leaves the pending state
    async fn wait_for_transaction(&self, transaction: &TransactionId) -> SyncResult<()> {
        let url = self.endpoint(&format!("transactions/by_hash/{}", transaction));
        let interval = Duration::from_millis(self.config.confirm_poll_interval_ms);

        for poll in 0..self.config.confirm_max_polls {
            if poll > 0 {
                tokio::time::sleep(interval).await;
            }

            let response = self.http_client.get(&url).send().await?;
            let status = response.status();

            // Not indexed yet
            if status == StatusCode::NOT_FOUND {
                continue;
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(status_error(status, &body));
            }

            let body: Value = response.json().await?;
            if body.get("type").and_then(Value::as_str) == Some("pending_transaction") {
                debug!("Transaction {} still pending", transaction);
                continue;
            }

            return match body.get("success").and_then(Value::as_bool) {
                Some(false) => {
                    let vm_status = body
                        .get("vm_status")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown vm status");
                    Err(SyncError::Rejected(format!("{}: {}", transaction, vm_status)))
                }
                _ => Ok(()),
            };
        }

        Err(SyncError::Timeout(format!(
            "Transaction {} not confirmed after {} polls",
            transaction, self.config.confirm_max_polls
        )))
    }
}

#[async_trait]
impl RemotePostStore for AptosRestStore {
    async fn fetch_posts(&self, address: &str) -> SyncResult<Vec<RemotePost>> {
        let address = address.trim().to_lowercase();
        let url = self.endpoint(&format!(
            "accounts/{}/resource/{}",
            address,
            self.config.resource_type()
        ));
        debug!("GET {}", url);

        let response = self.http_client.get(&url).send().await?;
        let status = response.status();

        // The account has never published
        if status == StatusCode::NOT_FOUND {
            debug!("No posts resource for {}", address);
            return Ok(Vec::new());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(status_error(status, &body));
        }

        let body: Value = response.json().await?;
        parse_resource(&body, &address, now_ms())
    }

    async fn submit_post(
        &self,
        account: &Account,
        title: &str,
        content: &str,
        tags: &[String],
    ) -> SyncResult<TransactionId> {
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| SyncError::Signer("No transaction signer configured".to_string()))?;

        let payload = self.create_payload(title, content, tags);
        let transaction = signer.sign_and_submit(account, &payload).await?;
        info!("Transaction {} submitted by {}", transaction, account.address());

        if self.config.confirm_transactions {
            self.wait_for_transaction(&transaction).await?;
            debug!("Transaction {} committed", transaction);
        }

        Ok(transaction)
    }

    async fn edit_post(&self, id: &PostId, _patch: &PostPatch) -> SyncResult<RemoteOutcome> {
        // The contract has no edit entry point
        warn!("Edit of post {} is not backed by the contract", id);
        Ok(RemoteOutcome::LocalOnly)
    }

    async fn delete_post(&self, id: &PostId) -> SyncResult<RemoteOutcome> {
        // The contract has no delete entry point
        warn!("Delete of post {} is not backed by the contract", id);
        Ok(RemoteOutcome::LocalOnly)
    }
}

/// Decode an account resource response into post records.
///
/// `data` may hold a single post or an array of posts.
pub fn parse_resource(body: &Value, address: &str, now_ms: i64) -> SyncResult<Vec<RemotePost>> {
    let data = body
        .get("data")
        .ok_or_else(|| {
            SyncError::Serialization("Resource response has no data field".to_string())
        })?;

    let records = match data {
        Value::Array(items) => items.iter().collect::<Vec<_>>(),
        single => vec![single],
    };

    records
        .into_iter()
        .map(|record| parse_record(record, address, now_ms))
        .collect()
}

fn parse_record(record: &Value, address: &str, now_ms: i64) -> SyncResult<RemotePost> {
    if !record.is_object() {
        return Err(SyncError::Serialization(format!(
            "Expected a post object, got {}",
            record
        )));
    }

    let title = record
        .get("title")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .unwrap_or(UNTITLED)
        .to_string();

    let tags: Vec<String> = record
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(RemotePost {
        id: parse_id(record.get("id")),
        title,
        content: decode_move_bytes(record.get("content")),
        tags,
        timestamp: parse_timestamp(record.get("timestamp")).unwrap_or(now_ms),
        author: address.to_lowercase(),
    })
}

/// Chain ids arrive as JSON numbers or as u64 strings. Zero and empty mean absent.
fn parse_id(value: Option<&Value>) -> Option<PostId> {
    match value? {
        Value::Number(n) => n.as_u64().filter(|n| *n > 0).map(PostId::Number),
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => match s.parse::<u64>() {
            Ok(0) => None,
            Ok(n) => Some(PostId::Number(n)),
            Err(_) => Some(PostId::Text(s.clone())),
        },
        _ => None,
    }
}

fn parse_timestamp(value: Option<&Value>) -> Option<i64> {
    let timestamp = match value? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse::<i64>().ok(),
        _ => None,
    };
    timestamp.filter(|t| *t > 0)
}

/// Move `vector<u8>` values are rendered as `0x` hex strings (or, by some
/// indexers, as byte arrays). Anything else is taken as text.
fn decode_move_bytes(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => match s.strip_prefix("0x").map(hex::decode) {
            Some(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
            _ => s.clone(),
        },
        Some(Value::Array(items)) => {
            let bytes: Vec<u8> = items
                .iter()
                .filter_map(Value::as_u64)
                .filter_map(|b| u8::try_from(b).ok())
                .collect();
            String::from_utf8_lossy(&bytes).into_owned()
        }
        _ => String::new(),
    }
}
