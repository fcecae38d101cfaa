use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unreadable document {source_name}: {reason}")]
    UnreadableDocument { source_name: String, reason: String },

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("index error: {0}")]
    Index(#[from] SearchError),
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("invalid embedding endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("embedding request to {0} timed out")]
    Timeout(String),

    #[error("embedding service unavailable: {0}")]
    Unavailable(#[source] reqwest::Error),

    #[error("unexpected HTTP status {status} from {url}: {snippet}")]
    HttpStatus {
        status: StatusCode,
        url: String,
        snippet: String,
    },

    #[error("failed to decode embedding response: {0}")]
    Decode(String),

    #[error("embedding dimension {actual} != {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl EmbeddingError {
    /// Transient failures a caller may retry; config and shape errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Unavailable(_) => true,
            Self::HttpStatus { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::InvalidEndpoint(_) | Self::Decode(_) | Self::DimensionMismatch { .. } => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid model endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("generation request to {0} timed out")]
    Timeout(String),

    #[error("model service unavailable: {0}")]
    Unavailable(#[source] reqwest::Error),

    #[error("unexpected HTTP status {status} from {url}: {snippet}")]
    HttpStatus {
        status: StatusCode,
        url: String,
        snippet: String,
    },

    #[error("failed to decode generation response: {0}")]
    Decode(String),
}

impl ModelError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Unavailable(_) => true,
            Self::HttpStatus { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::InvalidEndpoint(_) | Self::Decode(_) => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector dimension {actual} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt index at {path}: {details}")]
    CorruptIndex { path: String, details: String },
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("question is empty")]
    EmptyQuestion,

    #[error("retrieval failed: {0}")]
    Search(#[from] SearchError),

    #[error("model failed: {0}")]
    Model(#[from] ModelError),
}

impl ChatError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::EmptyQuestion => false,
            Self::Search(SearchError::Embedding(error)) => error.is_retryable(),
            Self::Search(SearchError::IndexUnavailable(_)) => true,
            Self::Search(_) => false,
            Self::Model(error) => error.is_retryable(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid toml in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid setting {field}: {details}")]
    Invalid { field: &'static str, details: String },
}

/// Failure while wiring the chatbot service from settings.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Search(#[from] SearchError),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
