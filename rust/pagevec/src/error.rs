use thiserror::Error;

/// Error type for pagevec operations.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    pub fn out_of_memory(size: usize, source: std::io::Error) -> Error {
        Error(ErrorKind::OutOfMemory { size, source }.into())
    }

    pub fn out_of_range(index: usize, len: usize) -> Error {
        Error(ErrorKind::OutOfRange { index, len }.into())
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    /// An allocation, remap or resize primitive failed. Resource exhaustion
    /// is not recovered from: the operation is never retried, and the
    /// buffer's prior state remains valid.
    #[error("failed to allocate {size} bytes: {source}")]
    OutOfMemory {
        size: usize,
        source: std::io::Error,
    },

    /// Checked indexed access beyond the current length.
    #[error("index {index} out of range for length {len}")]
    OutOfRange { index: usize, len: usize },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}
