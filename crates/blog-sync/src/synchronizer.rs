use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use blog_types::{Account, Post, PostDraft, PostId, PostPatch, WalletSession};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::merge;
use crate::retry::RetryPolicy;
use crate::store::{RemoteOutcome, RemotePostStore, TransactionId, WalletProvider};

/// Notice returned when creating without a wallet
pub const CREATE_NOTICE: &str = "Please connect your wallet before posting.";
/// Notice returned when editing without a wallet
pub const EDIT_NOTICE: &str = "Please connect your wallet to edit.";
/// Notice returned when deleting without a wallet
pub const DELETE_NOTICE: &str = "Please connect your wallet to delete.";

/// Operations that can fail and be recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Connect,
    Reconcile,
    Create,
    Edit,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Connect => "connect",
            Operation::Reconcile => "reconcile",
            Operation::Create => "create",
            Operation::Edit => "edit",
            Operation::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// The most recent failure seen by the synchronizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedFailure {
    pub operation: Operation,
    pub error: SyncError,
    /// Epoch milliseconds at which the failure was recorded
    pub at_ms: i64,
}

/// Result of a successful reconcile
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Records returned by the remote store
    pub fetched: usize,
    /// Ids newly added to the front of the working set
    pub added: Vec<PostId>,
}

/// Result of a successful create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateReport {
    pub transaction: TransactionId,
    /// The re-fetch that followed the write
    pub reconcile: ReconcileReport,
}

/// Marks an operation in flight for as long as it is alive
struct PendingGuard<'a>(&'a AtomicUsize);

impl<'a> PendingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Owns the working set of posts and keeps it in step with a remote store.
///
/// Mutating operations are serialized through a single writer lock, so an
/// overlapping create (a double click) waits for the first to finish before
/// it touches the working set. Readers take snapshots and never wait on a
/// remote call.
///
/// Every operation returns its error as a value. Whenever an operation
/// returns `Err` the working set is exactly what it was before the call, and
/// the error is kept in [`PostSynchronizer::last_failure`].
pub struct PostSynchronizer<S> {
    /// The system of record
    store: S,
    /// Policy applied to remote fetches
    retry: RetryPolicy,
    /// Working set, newest discoveries first
    posts: RwLock<Vec<Post>>,
    /// Serializes mutating operations
    writer: Mutex<()>,
    /// Operations currently in flight
    in_flight: AtomicUsize,
    last_failure: RwLock<Option<RecordedFailure>>,
}

impl<S: RemotePostStore> PostSynchronizer<S> {
    /// Create a synchronizer with an empty working set
    pub fn new(store: S, config: &SyncConfig) -> Self {
        Self::with_retry(store, config.retry.clone())
    }

    pub fn with_retry(store: S, retry: RetryPolicy) -> Self {
        Self {
            store,
            retry,
            posts: RwLock::new(Vec::new()),
            writer: Mutex::new(()),
            in_flight: AtomicUsize::new(0),
            last_failure: RwLock::new(None),
        }
    }

    /// The remote store this synchronizer talks to
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Replace the working set with `seed`. Called once at startup.
    pub async fn initialize(&self, seed: Vec<Post>) {
        let count = seed.len();
        let outcome = merge::merge_by_id(&[], seed);
        if outcome.posts.len() != count {
            warn!(
                "Dropped {} seed posts with duplicate ids",
                count - outcome.posts.len()
            );
        }
        *self.posts.write().await = outcome.posts;
        debug!("Working set initialized with {} posts", count);
    }

    /// Snapshot of the working set
    pub async fn posts(&self) -> Vec<Post> {
        self.posts.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.posts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.posts.read().await.is_empty()
    }

    /// Look up a post by id
    pub async fn get(&self, id: &PostId) -> Option<Post> {
        self.posts.read().await.iter().find(|p| &p.id == id).cloned()
    }

    /// Whether any operation is waiting on, or running against, the remote store
    pub fn is_pending(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    pub async fn last_failure(&self) -> Option<RecordedFailure> {
        self.last_failure.read().await.clone()
    }

    /// Fetch the posts of `address` and merge them into the working set
    pub async fn reconcile(&self, address: &str) -> SyncResult<ReconcileReport> {
        let _pending = PendingGuard::enter(&self.in_flight);
        let _writer = self.writer.lock().await;
        self.reconcile_locked(address, Operation::Reconcile).await
    }

    /// Reconcile for the session's account; a no-op while disconnected
    pub async fn reconcile_session(&self, session: &WalletSession) -> SyncResult<ReconcileReport> {
        match session.account() {
            Some(account) => self.reconcile(account.address()).await,
            None => {
                debug!("Skipping reconcile: no wallet connected");
                Ok(ReconcileReport::default())
            }
        }
    }

    /// Connect through `provider`, store the account in `session`, then reconcile.
    ///
    /// On a failed handshake the session is left untouched.
    pub async fn connect<P>(
        &self,
        provider: &P,
        session: &mut WalletSession,
    ) -> SyncResult<ReconcileReport>
    where
        P: WalletProvider + ?Sized,
    {
        let account = match provider.connect().await {
            Ok(account) => account,
            Err(e) => return Err(self.record(Operation::Connect, e).await),
        };

        info!("Wallet connected as {}", account.address());
        session.set_account(account.clone());
        self.reconcile(account.address()).await
    }

    /// Publish `draft` and pull the canonical state back from the store.
    ///
    /// No local entry is synthesized: the new post appears only once the
    /// follow-up fetch returns it, carrying its server-assigned fields.
    pub async fn create(
        &self,
        session: &WalletSession,
        draft: &PostDraft,
    ) -> SyncResult<CreateReport> {
        let account = self.require_account(session, Operation::Create, CREATE_NOTICE).await?;

        let _pending = PendingGuard::enter(&self.in_flight);
        let _writer = self.writer.lock().await;

        // Writes are not retried: a lost response does not mean a lost post
        let transaction = match self
            .store
            .submit_post(&account, &draft.title, &draft.content, &draft.tags)
            .await
        {
            Ok(tx) => tx,
            Err(e) => {
                return Err(self
                    .record(Operation::Create, SyncError::RemoteWrite(Box::new(e)))
                    .await)
            }
        };
        info!("Submitted post {:?} in transaction {}", draft.title, transaction);

        let reconcile = self.reconcile_locked(account.address(), Operation::Create).await?;
        Ok(CreateReport {
            transaction,
            reconcile,
        })
    }

    /// Edit the post with `id` after the remote store accepts the patch
    pub async fn edit(
        &self,
        session: &WalletSession,
        id: &PostId,
        patch: &PostPatch,
    ) -> SyncResult<RemoteOutcome> {
        self.require_account(session, Operation::Edit, EDIT_NOTICE).await?;

        let _pending = PendingGuard::enter(&self.in_flight);
        let _writer = self.writer.lock().await;

        let outcome = match self.store.edit_post(id, patch).await {
            Ok(outcome) => outcome,
            Err(e) => {
                return Err(self
                    .record(Operation::Edit, SyncError::RemoteWrite(Box::new(e)))
                    .await)
            }
        };

        let found = {
            let mut posts = self.posts.write().await;
            match posts.iter_mut().find(|p| &p.id == id) {
                Some(post) => {
                    patch.apply(post);
                    true
                }
                None => false,
            }
        };
        if !found {
            return Err(self.record(Operation::Edit, SyncError::PostNotFound(id.clone())).await);
        }

        self.note_outcome(Operation::Edit, id, outcome);
        Ok(outcome)
    }

    /// Remove the post with `id` after the remote store accepts the delete.
    ///
    /// Ownership is not checked here; the ownership gate only decides which
    /// controls a front end offers.
    pub async fn delete(&self, session: &WalletSession, id: &PostId) -> SyncResult<RemoteOutcome> {
        self.require_account(session, Operation::Delete, DELETE_NOTICE).await?;

        let _pending = PendingGuard::enter(&self.in_flight);
        let _writer = self.writer.lock().await;

        let outcome = match self.store.delete_post(id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                return Err(self
                    .record(Operation::Delete, SyncError::RemoteWrite(Box::new(e)))
                    .await)
            }
        };

        let removed = {
            let mut posts = self.posts.write().await;
            match posts.iter().position(|p| &p.id == id) {
                Some(index) => {
                    posts.remove(index);
                    true
                }
                None => false,
            }
        };
        if !removed {
            return Err(self.record(Operation::Delete, SyncError::PostNotFound(id.clone())).await);
        }

        self.note_outcome(Operation::Delete, id, outcome);
        Ok(outcome)
    }

    /// Fetch and merge. The caller must hold the writer lock.
    async fn reconcile_locked(
        &self,
        address: &str,
        operation: Operation,
    ) -> SyncResult<ReconcileReport> {
        let address = address.trim().to_lowercase();
        debug!("Fetching posts for {}", address);

        let records = match self
            .retry
            .run("fetch_posts", || self.store.fetch_posts(&address))
            .await
        {
            Ok(records) => records,
            Err(e) => {
                return Err(self
                    .record(operation, SyncError::RemoteFetch(Box::new(e)))
                    .await)
            }
        };
        let fetched = records.len();

        let mut posts = self.posts.write().await;
        let normalized = {
            let mut rng = rand::thread_rng();
            merge::normalize_batch(records, &posts, now_ms(), &mut rng)
        };
        let outcome = merge::merge_by_id(&posts, normalized);
        *posts = outcome.posts;

        info!(
            "Reconciled {} fetched posts for {}: {} new, {} total",
            fetched,
            address,
            outcome.added.len(),
            posts.len()
        );

        Ok(ReconcileReport {
            fetched,
            added: outcome.added,
        })
    }

    async fn require_account(
        &self,
        session: &WalletSession,
        operation: Operation,
        notice: &str,
    ) -> SyncResult<Account> {
        match session.account() {
            Some(account) => Ok(account.clone()),
            None => Err(self
                .record(operation, SyncError::ConnectionRequired(notice.to_string()))
                .await),
        }
    }

    fn note_outcome(&self, operation: Operation, id: &PostId, outcome: RemoteOutcome) {
        match outcome {
            RemoteOutcome::Durable => info!("{} of post {} persisted", operation, id),
            RemoteOutcome::LocalOnly => warn!(
                "{} of post {} applied locally only; the remote store did not persist it",
                operation, id
            ),
        }
    }

    /// Log and keep `error` as the last failure, then hand it back
    async fn record(&self, operation: Operation, error: SyncError) -> SyncError {
        match &error {
            SyncError::ConnectionRequired(notice) => warn!("{} rejected: {}", operation, notice),
            other => error!("Error during {}: {}", operation, other),
        }

        *self.last_failure.write().await = Some(RecordedFailure {
            operation,
            error: error.clone(),
            at_ms: now_ms(),
        });
        error
    }
}

/// Current time in epoch milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
