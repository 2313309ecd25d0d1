//! Reconciliation of fetched posts into the working set.
//!
//! Fetched records are normalized (fallback id, lowercase author) and then
//! merged by id: anything already in the working set wins over the fetched
//! copy, and newly discovered posts are placed in front of older entries in
//! the order they were received.

use std::collections::HashSet;

use rand::Rng;
use tracing::debug;

use blog_types::{Post, PostId, RemotePost};

/// Attempts at drawing a fallback id that is not already taken
const FALLBACK_ID_DRAWS: usize = 8;

/// Placeholder id for a record the remote store returned without one.
///
/// `now_ms + rand(0..=999)`. This is a display key only and can collide
/// under concurrent generation; it must never be treated as a durable id.
pub fn fallback_id<R: Rng + ?Sized>(now_ms: i64, rng: &mut R) -> PostId {
    let base = u64::try_from(now_ms).unwrap_or(0);
    PostId::Number(base + rng.gen_range(0..1000))
}

/// Normalize a single record: keep its id or draw a fallback, lowercase the author
pub fn normalize<R: Rng + ?Sized>(remote: RemotePost, now_ms: i64, rng: &mut R) -> Post {
    let id = match &remote.id {
        Some(id) => id.clone(),
        None => fallback_id(now_ms, rng),
    };
    remote.into_post(id)
}

/// Normalize a fetched batch against the current working set.
///
/// An id-less record that matches an `existing` entry on author, timestamp,
/// title and content takes that entry's id, so fetching the same records
/// again adds nothing. Any other id-less record gets a fallback id that is
/// redrawn while it hits an id in `existing`, a real id anywhere in the
/// batch, or a placeholder already handed out.
pub fn normalize_batch<R: Rng + ?Sized>(
    records: Vec<RemotePost>,
    existing: &[Post],
    now_ms: i64,
    rng: &mut R,
) -> Vec<Post> {
    let taken: HashSet<PostId> = existing.iter().map(|p| p.id.clone()).collect();
    let mut assigned: HashSet<PostId> = records.iter().filter_map(|r| r.id.clone()).collect();
    let mut posts = Vec::with_capacity(records.len());

    for record in records {
        let post = if record.id.is_some() {
            normalize(record, now_ms, rng)
        } else if let Some(id) = find_known(existing, &record) {
            debug!("Fetched post without id matches known post {}", id);
            record.into_post(id)
        } else {
            let id = draw_free_id(&taken, &assigned, now_ms, rng);
            debug!("Assigned fallback id {} to fetched post", id);
            assigned.insert(id.clone());
            record.into_post(id)
        };
        posts.push(post);
    }

    posts
}

/// Id of the working set entry `record` was previously merged as, if any
fn find_known(existing: &[Post], record: &RemotePost) -> Option<PostId> {
    let author = record.author.to_lowercase();
    existing
        .iter()
        .find(|p| {
            p.author == author
                && p.timestamp == record.timestamp
                && p.title == record.title
                && p.content == record.content
        })
        .map(|p| p.id.clone())
}

fn draw_free_id<R: Rng + ?Sized>(
    taken: &HashSet<PostId>,
    assigned: &HashSet<PostId>,
    now_ms: i64,
    rng: &mut R,
) -> PostId {
    let is_free = |id: &PostId| !taken.contains(id) && !assigned.contains(id);

    for _ in 0..FALLBACK_ID_DRAWS {
        let id = fallback_id(now_ms, rng);
        if is_free(&id) {
            return id;
        }
    }

    // Every draw collided; probe upwards from the end of the random window
    let mut candidate = u64::try_from(now_ms).unwrap_or(0) + 1000;
    while !is_free(&PostId::Number(candidate)) {
        candidate += 1;
    }
    PostId::Number(candidate)
}

/// Result of merging a batch into the working set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// The new working set
    pub posts: Vec<Post>,
    /// Ids that were added, in their new order
    pub added: Vec<PostId>,
}

/// Id-priority merge.
///
/// Keeps only incoming posts whose id is not already in `existing` (and not
/// repeated earlier in `incoming`), and prepends them in received order.
/// Existing entries keep their relative order and are never overwritten.
pub fn merge_by_id(existing: &[Post], incoming: Vec<Post>) -> MergeOutcome {
    let mut seen: HashSet<PostId> = existing.iter().map(|p| p.id.clone()).collect();
    let mut fresh = Vec::new();

    for post in incoming {
        if seen.insert(post.id.clone()) {
            fresh.push(post);
        } else {
            debug!("Dropping fetched post {}: id already present", post.id);
        }
    }

    let added = fresh.iter().map(|p| p.id.clone()).collect();
    fresh.extend(existing.iter().cloned());

    MergeOutcome {
        posts: fresh,
        added,
    }
}

/// Whether every id in `posts` is distinct
pub fn has_unique_ids(posts: &[Post]) -> bool {
    let mut seen = HashSet::with_capacity(posts.len());
    posts.iter().all(|p| seen.insert(&p.id))
}
