//! # Blog Sync
//!
//! Keeps an in-memory working set of blog posts in step with an on-chain
//! system of record.
//!
//! - [`PostSynchronizer`] owns the working set and runs reconcile, create,
//!   edit and delete against a [`RemotePostStore`]
//! - [`merge`] holds the id-priority merge and fallback id policy
//! - [`AptosRestStore`] reads the posts resource from a full node and hands
//!   create transactions to a wallet [`TransactionSigner`]
//! - [`MemoryPostStore`] is an in-process store for tests and demos
//!
//! ```rust,no_run
//! use blog_sync::{MemoryPostStore, PostSynchronizer, SyncConfig};
//! use blog_types::{sample_posts, Account, PostDraft, WalletSession};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let sync = PostSynchronizer::new(MemoryPostStore::new(), &SyncConfig::default());
//!     sync.initialize(sample_posts(blog_sync::now_ms())).await;
//!
//!     let session = WalletSession::connected(Account::new("0xabc"));
//!     sync.reconcile_session(&session).await?;
//!     sync.create(&session, &PostDraft::new("Hello", "First post", "intro")?).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod memory;
pub mod merge;
pub mod rest;
pub mod retry;
pub mod store;
pub mod synchronizer;

#[cfg(test)]
mod tests;

pub use config::{BlogConfig, LoggingConfig, NodeConfig, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use memory::{MemoryPostStore, StoreCall, StoreOp};
pub use rest::AptosRestStore;
pub use retry::RetryPolicy;
pub use store::{
    EntryFunctionPayload, RemoteOutcome, RemotePostStore, TransactionId, TransactionSigner,
    WalletProvider,
};
pub use synchronizer::{
    now_ms, CreateReport, Operation, PostSynchronizer, ReconcileReport, RecordedFailure,
    CREATE_NOTICE, DELETE_NOTICE, EDIT_NOTICE,
};

// The ownership gate lives with the value types
pub use blog_types::is_owner;
