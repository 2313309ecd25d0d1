use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use blog_types::{Account, PostId, PostPatch, RemotePost};

use crate::error::{SyncError, SyncResult};
use crate::store::{RemoteOutcome, RemotePostStore, TransactionId};
use crate::synchronizer::now_ms;

/// Remote store operations, used to target injected failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Fetch,
    Submit,
    Edit,
    Delete,
}

/// A call received by the in-memory store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    FetchPosts(String),
    SubmitPost { address: String, title: String },
    EditPost(PostId),
    DeletePost(PostId),
}

#[derive(Debug, Clone)]
enum Failure {
    Once(SyncError),
    Always(SyncError),
}

#[derive(Debug)]
struct Inner {
    /// Records per lowercase address, in publication order
    posts: HashMap<String, Vec<RemotePost>>,
    calls: Vec<StoreCall>,
    failures: HashMap<StoreOp, Failure>,
    next_id: u64,
    assign_ids: bool,
    mutations: RemoteOutcome,
    latency: Option<Duration>,
}

/// In-memory remote store.
///
/// Clones share state, so a test can keep a handle while the synchronizer
/// owns another. Edits and deletes are acknowledged `LocalOnly` without
/// touching stored records unless [`MemoryPostStore::durable_mutations`] is set.
#[derive(Debug, Clone)]
pub struct MemoryPostStore {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MemoryPostStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPostStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                posts: HashMap::new(),
                calls: Vec::new(),
                failures: HashMap::new(),
                next_id: 1,
                assign_ids: true,
                mutations: RemoteOutcome::LocalOnly,
                latency: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a record under `address`
    pub fn insert(&self, address: &str, post: RemotePost) {
        self.lock()
            .posts
            .entry(address.to_lowercase())
            .or_default()
            .push(post);
    }

    /// Records currently held for `address`
    pub fn records(&self, address: &str) -> Vec<RemotePost> {
        self.lock()
            .posts
            .get(&address.to_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    /// Submitted posts get no id, exercising the fallback path
    pub fn without_ids(self) -> Self {
        self.lock().assign_ids = false;
        self
    }

    /// Apply edits and deletes to stored records and report them durable
    pub fn durable_mutations(self) -> Self {
        self.lock().mutations = RemoteOutcome::Durable;
        self
    }

    /// Delay every call by `latency`
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = Some(latency);
        self
    }

    /// Fail the next call of `op` with `error`
    pub fn fail_next(&self, op: StoreOp, error: SyncError) {
        self.lock().failures.insert(op, Failure::Once(error));
    }

    /// Fail every call of `op` with `error`
    pub fn fail_always(&self, op: StoreOp, error: SyncError) {
        self.lock().failures.insert(op, Failure::Always(error));
    }

    /// Every call received so far
    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    /// Record `call` and return the injected failure for `op`, if any
    async fn enter(&self, op: StoreOp, call: StoreCall) -> SyncResult<()> {
        let latency = {
            let mut inner = self.lock();
            inner.calls.push(call);
            inner.latency
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut inner = self.lock();
        match inner.failures.get(&op).cloned() {
            Some(Failure::Once(error)) => {
                inner.failures.remove(&op);
                Err(error)
            }
            Some(Failure::Always(error)) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemotePostStore for MemoryPostStore {
    async fn fetch_posts(&self, address: &str) -> SyncResult<Vec<RemotePost>> {
        self.enter(StoreOp::Fetch, StoreCall::FetchPosts(address.to_string()))
            .await?;
        Ok(self.records(address))
    }

    async fn submit_post(
        &self,
        account: &Account,
        title: &str,
        content: &str,
        tags: &[String],
    ) -> SyncResult<TransactionId> {
        self.enter(
            StoreOp::Submit,
            StoreCall::SubmitPost {
                address: account.address().to_string(),
                title: title.to_string(),
            },
        )
        .await?;

        let mut inner = self.lock();
        let sequence = inner.next_id;
        inner.next_id += 1;

        let id = if inner.assign_ids {
            Some(PostId::Number(sequence))
        } else {
            None
        };
        let record = RemotePost {
            id,
            title: title.to_string(),
            content: content.to_string(),
            tags: tags.to_vec(),
            timestamp: now_ms(),
            author: account.address().to_string(),
        };
        inner
            .posts
            .entry(account.address().to_string())
            .or_default()
            .push(record);

        Ok(TransactionId(format!("0x{:064x}", sequence)))
    }

    async fn edit_post(&self, id: &PostId, patch: &PostPatch) -> SyncResult<RemoteOutcome> {
        self.enter(StoreOp::Edit, StoreCall::EditPost(id.clone())).await?;

        let mut inner = self.lock();
        if inner.mutations == RemoteOutcome::LocalOnly {
            return Ok(RemoteOutcome::LocalOnly);
        }

        let record = inner
            .posts
            .values_mut()
            .flat_map(|records| records.iter_mut())
            .find(|r| r.id.as_ref() == Some(id))
            .ok_or_else(|| SyncError::Api(format!("No post with id {}", id)))?;

        if let Some(title) = &patch.title {
            record.title = title.clone();
        }
        if let Some(content) = &patch.content {
            record.content = content.clone();
        }
        if let Some(tags) = &patch.tags {
            record.tags = tags.clone();
        }
        Ok(RemoteOutcome::Durable)
    }

    async fn delete_post(&self, id: &PostId) -> SyncResult<RemoteOutcome> {
        self.enter(StoreOp::Delete, StoreCall::DeletePost(id.clone())).await?;

        let mut inner = self.lock();
        if inner.mutations == RemoteOutcome::LocalOnly {
            return Ok(RemoteOutcome::LocalOnly);
        }

        let mut removed = false;
        for records in inner.posts.values_mut() {
            let before = records.len();
            records.retain(|r| r.id.as_ref() != Some(id));
            removed |= records.len() != before;
        }

        if removed {
            Ok(RemoteOutcome::Durable)
        } else {
            Err(SyncError::Api(format!("No post with id {}", id)))
        }
    }
}
