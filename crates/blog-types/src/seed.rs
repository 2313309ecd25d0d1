//! Sample posts shown before any wallet is connected.

use crate::post::{Post, PostId};

const HOUR_MS: i64 = 3_600_000;

/// The three sample posts, ids 1000001 to 1000003, newest first.
///
/// Ids sit far above anything the chain hands out so they never collide
/// with fetched posts.
pub fn sample_posts(now_ms: i64) -> Vec<Post> {
    vec![
        sample(
            1_000_001,
            "Welcome to Decentralized Blog",
            "This is a sample post so your blog isn't empty. Connect your wallet to create real blockchain posts.",
            &["sample", "demo"],
            now_ms,
            "0x1a2b3c4d5e6f7g8h9i",
            "Alice Johnson",
            32,
        ),
        sample(
            1_000_002,
            "Getting Started",
            "Learn how to post on the Aptos blockchain with this dApp.",
            &["tutorial", "aptos"],
            now_ms - HOUR_MS,
            "0x9f8e7d6c5b4a3210",
            "Bob Smith",
            12,
        ),
        sample(
            1_000_003,
            "Why Blockchain?",
            "Blockchain ensures transparency, immutability, and decentralization.",
            &["blockchain", "technology"],
            now_ms - 2 * HOUR_MS,
            "0xabc123def456ghi789",
            "Carol White",
            48,
        ),
    ]
}

#[allow(clippy::too_many_arguments)]
fn sample(
    id: u64,
    title: &str,
    content: &str,
    tags: &[&str],
    timestamp: i64,
    author: &str,
    username: &str,
    avatar_img: u32,
) -> Post {
    Post {
        id: PostId::Number(id),
        title: title.to_string(),
        content: content.to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        timestamp,
        author: author.to_lowercase(),
        username: Some(username.to_string()),
        avatar: Some(format!("https://i.pravatar.cc/150?img={}", avatar_img)),
    }
}
