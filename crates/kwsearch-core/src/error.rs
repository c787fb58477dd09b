use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid document id: {0}")]
    InvalidId(String),
}

/// The index sink rejected or failed to accept a document.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct SinkError {
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl SinkError {
    pub fn new(message: impl Into<String>) -> Self { Self { message: message.into(), source: None } }

    pub fn with_source(message: impl Into<String>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self { message: message.into(), source: Some(Box::new(source)) }
    }
}

/// Document-level extraction failure. Already indexed chunks stay in place.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("reading text of object {object_id} failed after {chunks_indexed} chunk(s)")]
    StreamRead {
        object_id: i64,
        chunks_indexed: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("indexing object {object_id} failed after {chunks_indexed} chunk(s)")]
    SinkSubmit {
        object_id: i64,
        chunks_indexed: u32,
        #[source]
        source: SinkError,
    },
}

/// Query-side failure. Only transport failures are worth retrying.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid query: {0}")]
    Validation(String),

    #[error("search backend failure: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("the index holds no documents")]
    NoIndexedContent,
}

impl QueryError {
    pub fn transport(message: impl Into<String>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport { message: message.into(), source: Some(Box::new(source)) }
    }

    pub fn is_retryable(&self) -> bool { matches!(self, Self::Transport { .. }) }

    /// Message for end users; the three failure kinds never share wording.
    pub fn user_message(&self) -> String {
        match self {
            Self::NoIndexedContent => "No files have been indexed yet. Run an ingest before searching.".to_string(),
            Self::Validation(msg) => format!("The query syntax is invalid: {}", msg),
            Self::Transport { message, .. } => format!("The search backend is unavailable: {}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_errors_are_retryable() {
        assert!(QueryError::transport("down", std::io::Error::other("refused")).is_retryable());
        assert!(!QueryError::Validation("unbalanced quote".into()).is_retryable());
        assert!(!QueryError::NoIndexedContent.is_retryable());
    }

    #[test]
    fn user_messages_are_distinct() {
        let msgs = [
            QueryError::NoIndexedContent.user_message(),
            QueryError::Validation("x".into()).user_message(),
            QueryError::transport("x", std::io::Error::other("y")).user_message(),
        ];
        assert_ne!(msgs[0], msgs[1]);
        assert_ne!(msgs[1], msgs[2]);
        assert_ne!(msgs[0], msgs[2]);
    }
}
