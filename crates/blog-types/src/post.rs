use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{TypesError, TypesResult};

/// Notice shown when the create form is submitted with a blank field
pub const MISSING_FIELDS_NOTICE: &str = "Title and content are required!";

/// Display name used when a post carries no username
pub const ANONYMOUS_USER: &str = "Anonymous User";

/// Identifier of a post within the working set.
///
/// Chain records may carry numeric or textual ids, so both are accepted and
/// compared by value. Numbers and strings never compare equal to each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PostId {
    /// Numeric id (sample posts, generated fallbacks, most chain ids)
    Number(u64),
    /// Opaque textual id
    Text(String),
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostId::Number(n) => write!(f, "{}", n),
            PostId::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for PostId {
    fn from(id: u64) -> Self {
        PostId::Number(id)
    }
}

impl From<&str> for PostId {
    fn from(id: &str) -> Self {
        PostId::Text(id.to_string())
    }
}

impl From<String> for PostId {
    fn from(id: String) -> Self {
        PostId::Text(id)
    }
}

/// A post in the working set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Unique within the working set; merge key and display key
    pub id: PostId,
    /// Post title
    pub title: String,
    /// Post body, already decoded to text
    pub content: String,
    /// Tags in the order they were entered
    #[serde(default)]
    pub tags: Vec<String>,
    /// Creation time in epoch milliseconds, display ordering only
    pub timestamp: i64,
    /// Lowercase author address
    pub author: String,
    /// Optional display name (absent for chain posts)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Optional avatar URL (absent for chain posts)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl Post {
    /// Name to render next to the post
    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or(ANONYMOUS_USER)
    }

    /// Avatar to render, falling back to one derived from the author address
    pub fn avatar_url(&self) -> String {
        match &self.avatar {
            Some(url) => url.clone(),
            None => format!("https://i.pravatar.cc/150?u={}", self.author),
        }
    }
}

/// A post-like record as returned by a remote store.
///
/// Remote records may lack an id and may carry the author in any case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePost {
    #[serde(default)]
    pub id: Option<PostId>,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub timestamp: i64,
    pub author: String,
}

impl RemotePost {
    /// Convert into a working-set post with the given id, lowercasing the author
    pub fn into_post(self, id: PostId) -> Post {
        Post {
            id,
            title: self.title,
            content: self.content,
            tags: self.tags,
            timestamp: self.timestamp,
            author: self.author.to_lowercase(),
            username: None,
            avatar: None,
        }
    }
}

/// Field-wise update applied by an edit. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl PostPatch {
    /// Build a patch from the edit form fields; tags are comma-separated
    pub fn from_form(title: &str, content: &str, tags_csv: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            content: Some(content.to_string()),
            tags: Some(parse_tags(tags_csv)),
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    /// True when applying the patch would change nothing
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.tags.is_none()
    }

    /// Apply the patch in place
    pub fn apply(&self, post: &mut Post) {
        if let Some(title) = &self.title {
            post.title = title.clone();
        }
        if let Some(content) = &self.content {
            post.content = content.clone();
        }
        if let Some(tags) = &self.tags {
            post.tags = tags.clone();
        }
    }
}

/// Validated input of the create form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostDraft {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
}

impl PostDraft {
    /// Build a draft from raw form input.
    ///
    /// Title and content are trimmed and must not be empty. Tags are given
    /// as a comma-separated list.
    pub fn new(title: &str, content: &str, tags_csv: &str) -> TypesResult<Self> {
        Self::from_parts(title, content, parse_tags(tags_csv))
    }

    /// Build a draft from an already split tag list
    pub fn from_parts(title: &str, content: &str, tags: Vec<String>) -> TypesResult<Self> {
        let title = title.trim();
        let content = content.trim();

        if title.is_empty() || content.is_empty() {
            return Err(TypesError::MissingField(MISSING_FIELDS_NOTICE.to_string()));
        }

        Ok(Self {
            title: title.to_string(),
            content: content.to_string(),
            tags,
        })
    }
}

/// Split a comma-separated tag list, trimming entries and dropping blanks.
/// Order and duplicates are kept as entered.
pub fn parse_tags(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}
