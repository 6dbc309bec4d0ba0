use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Artifact bundle invalid: {0}")]
    BundleInvalid(String),

    #[error("Item {item_code}: required feature column '{column}' not resolvable from any alias")]
    SchemaMismatch { item_code: String, column: String },

    #[error("Feature dimension mismatch: expected {expected}, got {actual}")]
    FeatureDimensionMismatch { expected: usize, actual: usize },

    #[error("Similarity index is empty")]
    EmptyIndex,

    #[error("Database unavailable: {0}")]
    DatabaseUnavailable(String),

    #[error("Database query failed: {0}")]
    Query(String),

    #[error("Request deadline exceeded")]
    DeadlineExceeded,

    #[error("No usable routing among {0} reference items")]
    NoCandidates(usize),

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Error kinds, independent of the payload carried by each variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BundleInvalid,
    SchemaMismatch,
    FeatureDimensionMismatch,
    EmptyIndex,
    DatabaseUnavailable,
    Query,
    DeadlineExceeded,
    NoCandidates,
    ItemNotFound,
    InvalidConfig,
    Io,
    Serialization,
}

/// What the caller does when an error of a given kind surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Recovery {
    /// Retry locally (bounded attempts, linear backoff), then surface.
    Retry,
    /// Abort the request and hand the error to the caller.
    Surface,
    /// Answer with an empty recommendation carrying a reason.
    EmptyResult,
    /// Answer with whatever was built so far, flagged.
    PartialResult,
    /// Fail this item only; a batch keeps going.
    SkipItem,
}

impl ErrorKind {
    /// The single recovery policy table.
    pub fn recovery(self) -> Recovery {
        match self {
            ErrorKind::DatabaseUnavailable => Recovery::Retry,
            ErrorKind::BundleInvalid
            | ErrorKind::FeatureDimensionMismatch
            | ErrorKind::Query
            | ErrorKind::InvalidConfig
            | ErrorKind::Io
            | ErrorKind::Serialization => Recovery::Surface,
            ErrorKind::EmptyIndex | ErrorKind::NoCandidates => Recovery::EmptyResult,
            ErrorKind::DeadlineExceeded => Recovery::PartialResult,
            ErrorKind::SchemaMismatch | ErrorKind::ItemNotFound => Recovery::SkipItem,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::BundleInvalid => "bundle_invalid",
            ErrorKind::SchemaMismatch => "schema_mismatch",
            ErrorKind::FeatureDimensionMismatch => "feature_dimension_mismatch",
            ErrorKind::EmptyIndex => "empty_index",
            ErrorKind::DatabaseUnavailable => "database_unavailable",
            ErrorKind::Query => "query",
            ErrorKind::DeadlineExceeded => "deadline_exceeded",
            ErrorKind::NoCandidates => "no_candidates",
            ErrorKind::ItemNotFound => "item_not_found",
            ErrorKind::InvalidConfig => "invalid_config",
            ErrorKind::Io => "io",
            ErrorKind::Serialization => "serialization",
        }
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::BundleInvalid(_) => ErrorKind::BundleInvalid,
            Error::SchemaMismatch { .. } => ErrorKind::SchemaMismatch,
            Error::FeatureDimensionMismatch { .. } | Error::InvalidDimension { .. } => {
                ErrorKind::FeatureDimensionMismatch
            }
            Error::EmptyIndex => ErrorKind::EmptyIndex,
            Error::DatabaseUnavailable(_) => ErrorKind::DatabaseUnavailable,
            Error::Query(_) => ErrorKind::Query,
            Error::DeadlineExceeded => ErrorKind::DeadlineExceeded,
            Error::NoCandidates(_) => ErrorKind::NoCandidates,
            Error::ItemNotFound(_) => ErrorKind::ItemNotFound,
            Error::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Error::Io(_) => ErrorKind::Io,
            Error::Serialization(_) => ErrorKind::Serialization,
        }
    }

    #[inline]
    pub fn recovery(&self) -> Recovery {
        self.kind().recovery()
    }

    #[inline]
    pub fn is_retryable(&self) -> bool {
        self.recovery() == Recovery::Retry
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
