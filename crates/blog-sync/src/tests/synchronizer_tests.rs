use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_test::{assert_err, assert_ok};

use blog_types::{
    sample_posts, Account, Post, PostDraft, PostId, PostPatch, RemotePost, WalletSession,
};

use crate::error::{SyncError, SyncResult};
use crate::memory::{MemoryPostStore, StoreCall, StoreOp};
use crate::merge::has_unique_ids;
use crate::retry::RetryPolicy;
use crate::store::{RemoteOutcome, WalletProvider};
use crate::synchronizer::{
    Operation, PostSynchronizer, CREATE_NOTICE, DELETE_NOTICE, EDIT_NOTICE,
};
use crate::is_owner;

const NOW: i64 = 1_700_000_000_000;

/// Wallet that approves with a fixed account, or refuses when it has none
struct StaticWallet(Option<Account>);

#[async_trait]
impl WalletProvider for StaticWallet {
    async fn connect(&self) -> SyncResult<Account> {
        self.0
            .clone()
            .ok_or_else(|| SyncError::Wallet("User rejected the request".to_string()))
    }
}

// Helper to create a synchronizer seeded with the sample posts
async fn seeded(store: &MemoryPostStore) -> PostSynchronizer<MemoryPostStore> {
    let sync = PostSynchronizer::with_retry(store.clone(), RetryPolicy::None);
    sync.initialize(sample_posts(NOW)).await;
    sync
}

fn remote(id: Option<u64>, title: &str, author: &str) -> RemotePost {
    RemotePost {
        id: id.map(PostId::Number),
        title: title.to_string(),
        content: "from chain".to_string(),
        tags: vec!["chain".to_string()],
        timestamp: NOW,
        author: author.to_string(),
    }
}

fn connected(address: &str) -> WalletSession {
    WalletSession::connected(Account::new(address))
}

fn ids(posts: &[Post]) -> Vec<PostId> {
    posts.iter().map(|p| p.id.clone()).collect()
}

fn draft(title: &str) -> PostDraft {
    PostDraft::new(title, "some content", "rust, chain").unwrap()
}

#[tokio::test]
async fn test_connect_merges_id_less_post_at_front() {
    let store = MemoryPostStore::new();
    store.insert("0xabc", remote(None, "fresh", "0xABC"));
    let sync = seeded(&store).await;

    let mut session = WalletSession::disconnected();
    let report = sync
        .connect(&StaticWallet(Some(Account::new("0xabc"))), &mut session)
        .await
        .unwrap();

    assert!(session.is_connected());
    assert_eq!(report.fetched, 1);
    assert_eq!(report.added.len(), 1);

    let posts = sync.posts().await;
    assert_eq!(posts.len(), 4);
    assert_eq!(posts[0].title, "fresh");
    assert_eq!(posts[0].author, "0xabc");
    assert_eq!(posts[0].id, report.added[0]);
    assert!(!matches!(posts[0].id, PostId::Number(1_000_001..=1_000_003)));
    assert_eq!(
        ids(&posts[1..]),
        vec![PostId::Number(1_000_001), PostId::Number(1_000_002), PostId::Number(1_000_003)]
    );
}

#[tokio::test]
async fn test_failed_connect_leaves_session_untouched() {
    let store = MemoryPostStore::new();
    let sync = seeded(&store).await;

    let mut session = WalletSession::disconnected();
    let err = sync.connect(&StaticWallet(None), &mut session).await.unwrap_err();

    assert!(matches!(err, SyncError::Wallet(_)));
    assert!(!session.is_connected());
    assert_eq!(store.call_count(), 0);
    assert_eq!(sync.last_failure().await.unwrap().operation, Operation::Connect);
}

#[tokio::test]
async fn test_reconcile_is_idempotent() {
    let store = MemoryPostStore::new();
    store.insert("0xabc", remote(Some(1), "one", "0xabc"));
    store.insert("0xabc", remote(Some(2), "two", "0xabc"));
    let sync = seeded(&store).await;

    let first = sync.reconcile("0xabc").await.unwrap();
    let after_first = sync.posts().await;
    let second = sync.reconcile("0xabc").await.unwrap();

    assert_eq!(first.added, vec![PostId::Number(1), PostId::Number(2)]);
    assert!(second.added.is_empty());
    assert_eq!(sync.posts().await, after_first);
    assert_eq!(after_first.len(), 5);
}

#[tokio::test]
async fn test_reconcile_is_idempotent_for_id_less_records() {
    let store = MemoryPostStore::new();
    store.insert("0xabc", remote(None, "chain post", "0xABC"));
    store.insert("0xabc", remote(None, "another", "0xabc"));
    let sync = seeded(&store).await;

    let first = sync.reconcile("0xabc").await.unwrap();
    let after_first = sync.posts().await;
    let second = sync.reconcile("0xabc").await.unwrap();

    assert_eq!(first.added.len(), 2);
    assert_eq!(second.fetched, 2);
    assert!(second.added.is_empty());
    assert_eq!(sync.posts().await, after_first);
    assert_eq!(after_first.len(), 5);
}

#[tokio::test]
async fn test_repeated_creates_keep_id_less_chain_posts_once() {
    let store = MemoryPostStore::new().without_ids();
    let sync = seeded(&store).await;
    let session = connected("0xabc");

    sync.create(&session, &draft("one")).await.unwrap();
    sync.create(&session, &draft("two")).await.unwrap();
    sync.reconcile("0xabc").await.unwrap();

    let posts = sync.posts().await;
    let titles: Vec<&str> = posts.iter().map(|p| p.title.as_str()).collect();
    assert_eq!(titles[..2], ["two", "one"]);
    assert_eq!(posts.len(), 5);
}

#[tokio::test]
async fn test_existing_entry_wins_on_collision() {
    let store = MemoryPostStore::new();
    store.insert("0xabc", remote(Some(5), "B", "0xabc"));

    let sync = PostSynchronizer::with_retry(store.clone(), RetryPolicy::None);
    let mut existing = remote(Some(5), "A", "0xabc").into_post(PostId::Number(5));
    existing.content = "local".to_string();
    sync.initialize(vec![existing]).await;

    sync.reconcile("0xabc").await.unwrap();

    let posts = sync.posts().await;
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].title, "A");
    assert_eq!(posts[0].content, "local");
}

#[tokio::test]
async fn test_fetched_author_is_lowercased() {
    let store = MemoryPostStore::new();
    store.insert("0xabc", remote(Some(9), "mixed", "0xABC"));
    let sync = seeded(&store).await;

    sync.reconcile("0xABC").await.unwrap();

    let post = sync.get(&PostId::Number(9)).await.unwrap();
    assert_eq!(post.author, "0xabc");
    assert!(is_owner(&post, &connected("0xAbC")));
}

#[tokio::test]
async fn test_fetch_failure_leaves_working_set_untouched() {
    let store = MemoryPostStore::new();
    store.insert("0xabc", remote(Some(1), "one", "0xabc"));
    store.fail_next(StoreOp::Fetch, SyncError::Network("connection reset".to_string()));
    let sync = seeded(&store).await;
    let before = sync.posts().await;

    let err = sync.reconcile("0xabc").await.unwrap_err();

    assert!(matches!(err, SyncError::RemoteFetch(_)));
    assert_eq!(err.root_cause(), &SyncError::Network("connection reset".to_string()));
    assert_eq!(sync.posts().await, before);
    assert!(!sync.is_pending());

    let failure = sync.last_failure().await.unwrap();
    assert_eq!(failure.operation, Operation::Reconcile);
    assert_eq!(failure.error, err);
}

#[tokio::test]
async fn test_bounded_retry_recovers_from_transient_fetch_failure() {
    let store = MemoryPostStore::new();
    store.insert("0xabc", remote(Some(1), "one", "0xabc"));
    store.fail_next(StoreOp::Fetch, SyncError::Timeout("slow node".to_string()));

    let retry = RetryPolicy::Bounded {
        max_attempts: 3,
        initial_interval_ms: 1,
        max_interval_ms: 2,
    };
    let sync = PostSynchronizer::with_retry(store.clone(), retry);

    let report = assert_ok!(sync.reconcile("0xabc").await);
    assert_eq!(report.added, vec![PostId::Number(1)]);
    assert_eq!(store.call_count(), 2);
}

#[tokio::test]
async fn test_disconnected_mutations_never_reach_the_store() {
    let store = MemoryPostStore::new();
    let sync = seeded(&store).await;
    let before = sync.posts().await;
    let session = WalletSession::disconnected();
    let id = PostId::Number(1_000_001);

    let err = assert_err!(sync.create(&session, &draft("nope")).await);
    assert_eq!(err, SyncError::ConnectionRequired(CREATE_NOTICE.to_string()));

    let err = assert_err!(sync.edit(&session, &id, &PostPatch::default().title("x")).await);
    assert_eq!(err, SyncError::ConnectionRequired(EDIT_NOTICE.to_string()));

    let err = assert_err!(sync.delete(&session, &id).await);
    assert_eq!(err, SyncError::ConnectionRequired(DELETE_NOTICE.to_string()));

    assert_eq!(store.call_count(), 0);
    assert_eq!(sync.posts().await, before);
    assert!(!sync.is_pending());
}

#[tokio::test]
async fn test_reconcile_session_is_noop_when_disconnected() {
    let store = MemoryPostStore::new();
    let sync = seeded(&store).await;

    let report = sync.reconcile_session(&WalletSession::disconnected()).await.unwrap();

    assert_eq!(report.fetched, 0);
    assert_eq!(store.call_count(), 0);
    assert_eq!(sync.len().await, 3);
}

#[tokio::test]
async fn test_create_refetches_after_write() {
    let store = MemoryPostStore::new();
    let sync = seeded(&store).await;
    let session = connected("0xABC");

    let report = sync.create(&session, &draft("Hello chain")).await.unwrap();

    assert_eq!(report.reconcile.added, vec![PostId::Number(1)]);
    assert_eq!(
        store.calls(),
        vec![
            StoreCall::SubmitPost {
                address: "0xabc".to_string(),
                title: "Hello chain".to_string(),
            },
            StoreCall::FetchPosts("0xabc".to_string()),
        ]
    );

    let posts = sync.posts().await;
    assert_eq!(posts.len(), 4);
    assert_eq!(posts[0].title, "Hello chain");
    assert_eq!(posts[0].tags, vec!["rust", "chain"]);
    assert!(is_owner(&posts[0], &session));
}

#[tokio::test]
async fn test_create_without_server_ids_uses_fallback() {
    let store = MemoryPostStore::new().without_ids();
    let sync = seeded(&store).await;

    sync.create(&connected("0xabc"), &draft("no id")).await.unwrap();

    let posts = sync.posts().await;
    assert_eq!(posts.len(), 4);
    assert_eq!(posts[0].title, "no id");
    assert!(has_unique_ids(&posts));
}

#[tokio::test]
async fn test_create_failure_changes_nothing() {
    let store = MemoryPostStore::new();
    store.fail_next(StoreOp::Submit, SyncError::Signer("User rejected".to_string()));
    let sync = seeded(&store).await;
    let before = sync.posts().await;

    let err = sync.create(&connected("0xabc"), &draft("rejected")).await.unwrap_err();

    assert!(matches!(err, SyncError::RemoteWrite(_)));
    assert_eq!(sync.posts().await, before);
    // No re-fetch after a failed write
    assert_eq!(store.call_count(), 1);
    assert_eq!(sync.last_failure().await.unwrap().operation, Operation::Create);
}

#[tokio::test]
async fn test_overlapping_creates_are_serialized() {
    let store = MemoryPostStore::new().with_latency(Duration::from_millis(5));
    let sync = seeded(&store).await;
    let session = connected("0xabc");

    let first_draft = draft("first");
    let second_draft = draft("second");
    let (first, second) = tokio::join!(
        sync.create(&session, &first_draft),
        sync.create(&session, &second_draft),
    );
    assert_ok!(first);
    assert_ok!(second);

    let posts = sync.posts().await;
    assert_eq!(posts.len(), 5);
    assert!(has_unique_ids(&posts));

    // Each create ran submit and fetch back to back
    let calls = store.calls();
    assert!(matches!(calls[0], StoreCall::SubmitPost { .. }));
    assert!(matches!(calls[1], StoreCall::FetchPosts(_)));
    assert!(matches!(calls[2], StoreCall::SubmitPost { .. }));
    assert!(matches!(calls[3], StoreCall::FetchPosts(_)));
}

#[tokio::test]
async fn test_edit_applies_patch_and_reports_local_only() {
    let store = MemoryPostStore::new();
    let sync = seeded(&store).await;
    let id = PostId::Number(1_000_002);

    let outcome = sync
        .edit(&connected("0x9f8e7d6c5b4a3210"), &id, &PostPatch::default().title("Updated"))
        .await
        .unwrap();

    assert_eq!(outcome, RemoteOutcome::LocalOnly);
    let post = sync.get(&id).await.unwrap();
    assert_eq!(post.title, "Updated");
    assert_eq!(post.content, "Learn how to post on the Aptos blockchain with this dApp.");
    assert_eq!(post.username.as_deref(), Some("Bob Smith"));
    assert_eq!(store.calls(), vec![StoreCall::EditPost(id)]);
}

#[tokio::test]
async fn test_edit_failure_and_unknown_id() {
    let store = MemoryPostStore::new();
    let sync = seeded(&store).await;
    let before = sync.posts().await;
    let session = connected("0xabc");
    let patch = PostPatch::default().title("x");

    store.fail_next(StoreOp::Edit, SyncError::Network("down".to_string()));
    let err = sync.edit(&session, &PostId::Number(1_000_001), &patch).await.unwrap_err();
    assert!(matches!(err, SyncError::RemoteWrite(_)));
    assert_eq!(sync.posts().await, before);

    let missing = PostId::Text("ghost".to_string());
    let err = sync.edit(&session, &missing, &patch).await.unwrap_err();
    assert_eq!(err, SyncError::PostNotFound(missing));
    assert_eq!(sync.posts().await, before);
}

#[tokio::test]
async fn test_delete_is_authorization_blind() {
    let store = MemoryPostStore::new();
    let sync = seeded(&store).await;
    let session = connected("0xabc");
    let id = PostId::Number(1_000_002);

    // The ownership gate would hide the control for this account...
    let target = sync.get(&id).await.unwrap();
    assert!(!is_owner(&target, &session));

    // ...but the synchronizer itself does not refuse the call
    let outcome = sync.delete(&session, &id).await.unwrap();
    assert_eq!(outcome, RemoteOutcome::LocalOnly);
    assert_eq!(
        ids(&sync.posts().await),
        vec![PostId::Number(1_000_001), PostId::Number(1_000_003)]
    );
}

#[tokio::test]
async fn test_delete_failure_keeps_entry() {
    let store = MemoryPostStore::new();
    store.fail_next(StoreOp::Delete, SyncError::Api("refused".to_string()));
    let sync = seeded(&store).await;

    let err = sync.delete(&connected("0xabc"), &PostId::Number(1_000_001)).await.unwrap_err();

    assert!(matches!(err, SyncError::RemoteWrite(_)));
    assert_eq!(sync.len().await, 3);
    assert_eq!(sync.last_failure().await.unwrap().operation, Operation::Delete);
}

#[tokio::test]
async fn test_durable_store_round_trip() {
    let store = MemoryPostStore::new().durable_mutations();
    let sync = seeded(&store).await;
    let session = connected("0xabc");

    sync.create(&session, &draft("kept")).await.unwrap();
    let id = PostId::Number(1);

    let patch = PostPatch::from_form("renamed", "body", "");
    let outcome = sync.edit(&session, &id, &patch).await.unwrap();
    assert!(outcome.is_durable());
    assert_eq!(store.records("0xabc")[0].title, "renamed");

    sync.delete(&session, &id).await.unwrap();
    assert!(store.records("0xabc").is_empty());
    assert!(sync.get(&id).await.is_none());
}

#[tokio::test]
async fn test_ids_stay_unique_across_operation_sequences() {
    let store = MemoryPostStore::new().without_ids();
    store.insert("0xabc", remote(None, "a", "0xabc"));
    store.insert("0xabc", remote(None, "b", "0xabc"));
    store.insert("0xabc", remote(Some(1_000_001), "clash", "0xabc"));
    let sync = seeded(&store).await;
    let session = connected("0xabc");

    sync.reconcile("0xabc").await.unwrap();
    assert!(has_unique_ids(&sync.posts().await));

    sync.create(&session, &draft("c")).await.unwrap();
    assert!(has_unique_ids(&sync.posts().await));

    let first = sync.posts().await[0].id.clone();
    sync.edit(&session, &first, &PostPatch::default().content("edited")).await.unwrap();
    sync.delete(&session, &PostId::Number(1_000_003)).await.unwrap();
    sync.reconcile("0xabc").await.unwrap();

    let posts = sync.posts().await;
    assert!(has_unique_ids(&posts));
    // The clashing record never replaced the seed entry
    assert_eq!(
        sync.get(&PostId::Number(1_000_001)).await.unwrap().title,
        "Welcome to Decentralized Blog"
    );
}

#[tokio::test]
async fn test_pending_while_remote_call_in_flight() {
    let store = MemoryPostStore::new().with_latency(Duration::from_millis(100));
    let sync = Arc::new(seeded(&store).await);
    assert!(!sync.is_pending());

    let task = tokio::spawn({
        let sync = sync.clone();
        async move { sync.reconcile("0xabc").await }
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(sync.is_pending());

    task.await.unwrap().unwrap();
    assert!(!sync.is_pending());
}

#[tokio::test]
async fn test_pending_cleared_after_failure() {
    let store = MemoryPostStore::new().with_latency(Duration::from_millis(1));
    store.fail_always(StoreOp::Fetch, SyncError::Network("down".to_string()));
    let sync = seeded(&store).await;

    assert!(sync.reconcile("0xabc").await.is_err());
    assert!(!sync.is_pending());
}

#[tokio::test]
async fn test_initialize_drops_duplicate_seed_ids() {
    let store = MemoryPostStore::new();
    let sync = PostSynchronizer::with_retry(store, RetryPolicy::None);
    let mut seed = sample_posts(NOW);
    seed.push(seed[0].clone());

    sync.initialize(seed).await;
    assert_eq!(sync.len().await, 3);
}
