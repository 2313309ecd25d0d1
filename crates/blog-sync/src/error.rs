use thiserror::Error;
use blog_types::{PostId, TypesError};

/// Sync errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Operation attempted while no wallet is connected. Carries the user notice.
    #[error("{0}")]
    ConnectionRequired(String),

    /// Fetching posts from the remote store failed
    #[error("Remote fetch failed: {0}")]
    RemoteFetch(Box<SyncError>),

    /// Creating, editing or deleting a post on the remote store failed
    #[error("Remote write failed: {0}")]
    RemoteWrite(Box<SyncError>),

    /// Connection error
    #[error("Network error: {0}")]
    Network(String),

    /// Request or confirmation timed out
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Non-success response from the node
    #[error("API error: {0}")]
    Api(String),

    /// Authentication error
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// The wallet refused or failed to connect
    #[error("Wallet error: {0}")]
    Wallet(String),

    /// No signer, or the signer refused the payload
    #[error("Signer error: {0}")]
    Signer(String),

    /// Transaction was committed but not executed successfully
    #[error("Transaction rejected: {0}")]
    Rejected(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// No post with the given id in the working set
    #[error("Post not found: {0}")]
    PostNotFound(PostId),

    /// Invalid value type
    #[error(transparent)]
    Types(#[from] TypesError),

    /// Configuration file is missing
    #[error("Configuration not found: {0}")]
    ConfigNotFound(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Sync result type
pub type SyncResult<T> = Result<T, SyncError>;

impl SyncError {
    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Network(_) | SyncError::Timeout(_))
    }

    /// Innermost store error, looking through fetch and write wrappers
    pub fn root_cause(&self) -> &SyncError {
        match self {
            SyncError::RemoteFetch(inner) | SyncError::RemoteWrite(inner) => inner.root_cause(),
            other => other,
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(error: serde_json::Error) -> Self {
        SyncError::Serialization(error.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            SyncError::Timeout(format!("Connection timeout: {}", error))
        } else if error.is_connect() {
            SyncError::Network(format!("Connection error: {}", error))
        } else if error.is_decode() {
            SyncError::Serialization(format!("Invalid response body: {}", error))
        } else {
            SyncError::Network(format!("HTTP error: {}", error))
        }
    }
}

/// Map a non-success HTTP status from the node to an error
pub fn status_error(status: reqwest::StatusCode, body: &str) -> SyncError {
    match status.as_u16() {
        401 | 403 => SyncError::Authentication(format!("HTTP {}: {}", status, body)),
        408 => SyncError::Timeout(format!("HTTP {}: {}", status, body)),
        429 => SyncError::Network(format!("Rate limited: HTTP {}: {}", status, body)),
        500..=599 => SyncError::Network(format!("Server error: HTTP {}: {}", status, body)),
        _ => SyncError::Api(format!("HTTP {}: {}", status, body)),
    }
}
