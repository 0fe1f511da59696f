use thiserror::Error;

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("Storage unavailable: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Post already stored: {0}")]
    Conflict(String),

    #[error("Upstream unavailable: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("Upstream returned HTTP {0}")]
    UpstreamStatus(u16),

    #[error("Malformed upstream response: {0}")]
    MalformedResponse(String),

    #[error("Invalid upstream record: {0}")]
    InvalidRecord(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Harvest cancelled")]
    Cancelled,
}

impl MirrorError {
    /// Whether a retry of the same upstream request could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            MirrorError::Upstream(e) => !e.is_builder() && !e.is_decode(),
            MirrorError::UpstreamStatus(code) => *code == 429 || (500..600).contains(code),
            _ => false,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, MirrorError::Conflict(_))
    }
}

pub type Result<T> = std::result::Result<T, MirrorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transience() {
        assert!(MirrorError::UpstreamStatus(503).is_transient());
        assert!(MirrorError::UpstreamStatus(429).is_transient());
        assert!(!MirrorError::UpstreamStatus(401).is_transient());
        assert!(!MirrorError::MalformedResponse("no meta".into()).is_transient());
    }

    #[test]
    fn test_conflict_detection() {
        assert!(MirrorError::Conflict("01011".into()).is_conflict());
        assert!(!MirrorError::NotFound("x".into()).is_conflict());
    }
}
