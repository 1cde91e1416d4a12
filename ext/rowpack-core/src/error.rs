use thiserror::Error;

/// Core error type for rowpack operations
#[derive(Error, Debug)]
pub enum RowpackError {
    /// IO errors from the underlying handle
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad magic, truncated header or trailer, corrupt framing
    #[error("Format error: {0}")]
    Format(String),

    /// A value could not be represented in the batch encoding
    #[error("Encode error: {0}")]
    Encode(String),

    /// A stored value could not be reconstructed
    #[error("Decode error: {0}")]
    Decode(String),

    /// Row append attempted on a writer that cannot take rows
    #[error("Not writable: {0}")]
    NotWritable(String),

    /// Column lookup miss
    #[error("Not found: {0}")]
    NotFound(String),

    /// No stable data pattern in the sampled rows
    #[error("Row intuition failed: {0}")]
    RowIntuit(String),

    /// Operation on a writer after `close()`
    #[error("Writer has been closed")]
    Closed,

    /// Invalid argument errors
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Data validation errors
    #[error("Data validation error: {0}")]
    DataValidation(String),

    /// An error annotated with what was being done when it happened
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<RowpackError>,
    },
}

/// Result type alias for rowpack operations
pub type Result<T> = std::result::Result<T, RowpackError>;

impl RowpackError {
    /// Create a new format error
    pub fn format<S: Into<String>>(msg: S) -> Self {
        RowpackError::Format(msg.into())
    }

    /// Create a new encode error
    pub fn encode<S: Into<String>>(msg: S) -> Self {
        RowpackError::Encode(msg.into())
    }

    /// Create a new decode error
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        RowpackError::Decode(msg.into())
    }

    /// Create a new not-writable error
    pub fn not_writable<S: Into<String>>(msg: S) -> Self {
        RowpackError::NotWritable(msg.into())
    }

    /// Create a new not-found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        RowpackError::NotFound(msg.into())
    }

    /// Create a new row intuition error
    pub fn row_intuit<S: Into<String>>(msg: S) -> Self {
        RowpackError::RowIntuit(msg.into())
    }

    /// Create a new invalid argument error
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        RowpackError::InvalidArgument(msg.into())
    }

    /// Create a new data validation error
    pub fn data_validation<S: Into<String>>(msg: S) -> Self {
        RowpackError::DataValidation(msg.into())
    }

    /// The innermost error, with any `Context` layers peeled off
    pub fn root_cause(&self) -> &RowpackError {
        match self {
            RowpackError::Context { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl From<rmp_serde::encode::Error> for RowpackError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        RowpackError::Encode(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for RowpackError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        RowpackError::Decode(err.to_string())
    }
}

/// Extension trait to add context to errors
pub trait ErrorContext<T> {
    /// Add context to an error
    fn context<S: Into<String>>(self, ctx: S) -> Result<T>;

    /// Add context with a closure that's only called on error
    fn with_context<S: Into<String>, F: FnOnce() -> S>(self, f: F) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<RowpackError>,
{
    fn context<S: Into<String>>(self, ctx: S) -> Result<T> {
        self.map_err(|e| RowpackError::Context {
            context: ctx.into(),
            source: Box::new(e.into()),
        })
    }

    fn with_context<S: Into<String>, F: FnOnce() -> S>(self, f: F) -> Result<T> {
        self.map_err(|e| RowpackError::Context {
            context: f().into(),
            source: Box::new(e.into()),
        })
    }
}
