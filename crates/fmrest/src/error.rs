use thiserror::Error;

/// Boxed cause carried by transport and identity-provider failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error type for every fmrest operation.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("request error: {method} {url}: {source}")]
    Request {
        method: String,
        url: String,
        #[source]
        source: BoxError,
    },
    #[error("{source}, {status} http response, content-type: {}", .content_type.as_deref().unwrap_or("None"))]
    BadJson {
        status: u16,
        content_type: Option<String>,
        #[source]
        source: serde_json::Error,
    },
    #[error("unexpected response: {0}")]
    Response(String),
    #[error("FileMaker Server returned error {code}, {message}")]
    Remote { code: i64, message: String },
    #[error(
        "No field named {0}. Note that the Data API only returns fields placed on your FileMaker layout."
    )]
    FieldNotFound(String),
    #[error(
        "{0} is read-only: portal data cannot be set through the record, pass it to edit_record() instead"
    )]
    ReadOnlyField(String),
    #[error("record error: {0}")]
    Record(String),
    #[error("length of keys ({keys}) does not match length of values ({values})")]
    LengthMismatch { keys: usize, values: usize },
    #[error("index {index} out of range for foundset of {len} records")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("identity provider failed: {0}")]
    Authentication(#[source] BoxError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn remote(code: i64, message: impl Into<String>) -> Self {
        Self::Remote {
            code,
            message: message.into(),
        }
    }

    pub fn response(message: impl Into<String>) -> Self {
        Self::Response(message.into())
    }

    /// Server error code when the server executed the request and reported failure.
    pub fn remote_code(&self) -> Option<i64> {
        match self {
            Self::Remote { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Checks whether this is a server-reported error with the given code.
    pub fn is_remote(&self, code: i64) -> bool {
        self.remote_code() == Some(code)
    }
}
