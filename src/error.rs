use thiserror::Error;

/// Decoding errors surfaced across every component boundary.
///
/// See §7 of the codec design: there is no panic/abort within the core,
/// parsing and synthesis errors always return here.
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying reader/writer failure.
    #[error("I/O error on `{path}`: {cause}")]
    Io { path: String, cause: String },

    /// Bad magic, inconsistent header, illegal state/edge ID, or
    /// unexpected EOF mid-frame.
    #[error("malformed stream in {where_}: {detail}")]
    Malformed { where_: String, detail: String },

    /// Unknown release, or a forbidden option combination.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// An option value outside its allowed range.
    #[error("parameter `{param}` out of bounds: {detail}")]
    OutOfBounds { param: String, detail: String },

    /// Allocation failure while sizing a per-frame scratch buffer.
    #[error("out of memory")]
    OutOfMemory,
}

impl Error {
    pub fn malformed(where_: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::Malformed {
            where_: where_.into(),
            detail: detail.into(),
        }
    }

    pub fn out_of_bounds(param: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::OutOfBounds {
            param: param.into(),
            detail: detail.into(),
        }
    }

    pub fn io(path: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Error::Io {
            path: path.into(),
            cause: cause.to_string(),
        }
    }
}

/// A specialised `Result` type used throughout the decoder core.
pub type Result<T> = ::std::result::Result<T, Error>;
