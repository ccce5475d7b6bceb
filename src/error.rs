use std::error::Error;
use std::io;

/// Boxed error returned by user supplied field functions.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Error returned by a [`FieldProvider`](crate::field::FieldProvider).
#[derive(thiserror::Error, Debug)]
pub enum FieldError {
    /// The provider itself reported a failure.
    #[error(transparent)]
    Failed(BoxError),

    /// The provider produced a value that cannot be represented as JSON.
    #[error(transparent)]
    Encode(#[from] serde_json::Error),
}

impl FieldError {
    pub fn failed(err: impl Into<BoxError>) -> Self {
        FieldError::Failed(err.into())
    }
}

/// Error type returned by a single structured write.
///
/// Every variant except [`WriteError::Sink`] means nothing reached the
/// underlying sink for that call.
#[derive(thiserror::Error, Debug)]
pub enum WriteError {
    #[error("field `{field}` failed: {source}")]
    Provider {
        field: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to serialize write record: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Error reported by the underlying sink, unchanged.
    #[error(transparent)]
    Sink(#[from] io::Error),
}

impl WriteError {
    pub(crate) fn from_field(field: &str, err: FieldError) -> Self {
        match err {
            FieldError::Failed(source) => WriteError::Provider {
                field: field.to_string(),
                source,
            },
            FieldError::Encode(e) => WriteError::Serialize(e),
        }
    }
}

impl From<WriteError> for io::Error {
    fn from(err: WriteError) -> Self {
        match err {
            WriteError::Sink(e) => e,
            WriteError::Serialize(e) => io::Error::new(io::ErrorKind::InvalidData, e),
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}
