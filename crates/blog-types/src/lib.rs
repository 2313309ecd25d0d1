//! Value types shared by the blog synchronizer and its front ends.

pub mod error;
pub mod post;
pub mod seed;
pub mod wallet;

pub use error::{TypesError, TypesResult};
pub use post::{parse_tags, Post, PostDraft, PostId, PostPatch, RemotePost};
pub use seed::sample_posts;
pub use wallet::{is_owner, Account, WalletSession};
