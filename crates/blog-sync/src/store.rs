use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use blog_types::{Account, PostId, PostPatch, RemotePost};

use crate::error::SyncResult;

/// Opaque identifier of a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub String);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Durability of a remote edit or delete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteOutcome {
    /// The remote store recorded the mutation
    Durable,
    /// The remote store acknowledged without recording anything; the change
    /// exists only in the local working set
    LocalOnly,
}

impl RemoteOutcome {
    pub fn is_durable(&self) -> bool {
        matches!(self, RemoteOutcome::Durable)
    }
}

/// The system of record for posts
#[async_trait]
pub trait RemotePostStore: Send + Sync {
    /// Fetch all posts published by `address`
    async fn fetch_posts(&self, address: &str) -> SyncResult<Vec<RemotePost>>;

    /// Publish a new post authorized by `account`
    async fn submit_post(
        &self,
        account: &Account,
        title: &str,
        content: &str,
        tags: &[String],
    ) -> SyncResult<TransactionId>;

    /// Apply `patch` to the post with `id`
    async fn edit_post(&self, id: &PostId, patch: &PostPatch) -> SyncResult<RemoteOutcome>;

    /// Remove the post with `id`
    async fn delete_post(&self, id: &PostId) -> SyncResult<RemoteOutcome>;
}

/// The wallet extension handshake
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Ask the wallet for an account. May suspend on user approval and may fail.
    async fn connect(&self) -> SyncResult<Account>;
}

/// Entry function call handed to a wallet for signing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryFunctionPayload {
    #[serde(rename = "type")]
    pub kind: String,
    /// Fully qualified `address::module::function`
    pub function: String,
    pub type_arguments: Vec<String>,
    pub arguments: Vec<Value>,
}

impl EntryFunctionPayload {
    pub fn new(function: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self {
            kind: "entry_function_payload".to_string(),
            function: function.into(),
            type_arguments: Vec::new(),
            arguments,
        }
    }
}

/// Signs and submits transactions on behalf of an account
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    async fn sign_and_submit(
        &self,
        sender: &Account,
        payload: &EntryFunctionPayload,
    ) -> SyncResult<TransactionId>;
}
