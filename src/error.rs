//! Contains the `Error` and `Result` types that `mongodb-driver-core` uses.

#[cfg(test)]
mod test;

use std::collections::HashSet;

use thiserror::Error;

use crate::wire::{codes, WireDomain, WireFailure};

/// The server error code reported when an operation ran longer than its
/// configured time limit. Wire failures carrying this code translate to
/// [`ErrorKind::ExecutionTimeout`] regardless of the domain that reported
/// them.
pub const EXCEEDED_TIME_LIMIT: i32 = 50;

pub(crate) const RETRYABLE_WRITE_ERROR: &str = "RetryableWriteError";

/// The result type for all methods that can return an error in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// An error that can occur while constructing clients, managing sessions, or
/// executing operations.
///
/// The inner [`ErrorKind`] is wrapped in an `Box` to allow the errors to be
/// cloned and passed around cheaply.
#[derive(Clone, Debug, Error)]
#[error("Kind: {kind}, labels: {labels:?}")]
#[non_exhaustive]
pub struct Error {
    /// The type of error that occurred.
    pub kind: Box<ErrorKind>,

    labels: HashSet<String>,

    #[source]
    pub(crate) source: Option<Box<Error>>,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind, labels: Option<impl IntoIterator<Item = String>>) -> Self {
        let labels = labels
            .map(|labels| labels.into_iter().collect())
            .unwrap_or_default();
        Self {
            kind: Box::new(kind),
            labels,
            source: None,
        }
    }

    /// Constructs the error kind corresponding 1:1 to a local error domain.
    pub fn from_domain(domain: ErrorDomain, message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = match domain {
            ErrorDomain::InvalidArgument => ErrorKind::InvalidArgument { message },
            ErrorDomain::Runtime => ErrorKind::Runtime { message },
            ErrorDomain::Wire => ErrorKind::Wire { message },
            ErrorDomain::ConnectionFailed => ErrorKind::ConnectionFailed { message },
            ErrorDomain::UnexpectedValue => ErrorKind::UnexpectedValue { message },
            ErrorDomain::Logic => ErrorKind::Logic { message },
        };
        kind.into()
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::from_domain(ErrorDomain::InvalidArgument, message)
    }

    pub(crate) fn runtime(message: impl Into<String>) -> Self {
        Self::from_domain(ErrorDomain::Runtime, message)
    }

    pub(crate) fn wire(message: impl Into<String>) -> Self {
        Self::from_domain(ErrorDomain::Wire, message)
    }

    pub(crate) fn logic(message: impl Into<String>) -> Self {
        Self::from_domain(ErrorDomain::Logic, message)
    }

    pub(crate) fn with_source<E: Into<Option<Error>>>(mut self, source: E) -> Self {
        self.source = source.into().map(Box::new);
        self
    }

    /// The labels attached to this error by the server or the wire library.
    pub fn labels(&self) -> &HashSet<String> {
        &self.labels
    }

    /// Whether this error or any of its sources contains the given label.
    pub fn contains_label<T: AsRef<str>>(&self, label: T) -> bool {
        self.labels.contains(label.as_ref())
            || self
                .source
                .as_ref()
                .map(|source| source.contains_label(label.as_ref()))
                .unwrap_or(false)
    }

    /// Whether an operation that failed with this error performed no work and
    /// may be retried as-is.
    pub fn is_retryable_write(&self) -> bool {
        self.contains_label(RETRYABLE_WRITE_ERROR)
    }
}

impl<E> From<E> for Error
where
    ErrorKind: From<E>,
{
    fn from(err: E) -> Self {
        Self::new(err.into(), None::<Option<String>>)
    }
}

impl From<bson::ser::Error> for ErrorKind {
    fn from(err: bson::ser::Error) -> Self {
        Self::InvalidArgument {
            message: err.to_string(),
        }
    }
}

impl From<bson::de::Error> for ErrorKind {
    fn from(err: bson::de::Error) -> Self {
        Self::UnexpectedValue {
            message: err.to_string(),
        }
    }
}

impl From<WireFailure> for Error {
    fn from(failure: WireFailure) -> Self {
        let WireFailure {
            domain,
            code,
            message,
            labels,
            ..
        } = failure;

        // Timeouts are classified by code alone so that a server, stream, or
        // query timeout all surface the same way.
        let kind = if code == EXCEEDED_TIME_LIMIT {
            ErrorKind::ExecutionTimeout { message }
        } else {
            match (domain, code) {
                (WireDomain::Stream, _) | (WireDomain::ServerSelection, _) => {
                    ErrorKind::ConnectionFailed { message }
                }
                (WireDomain::Client, codes::CLIENT_AUTHENTICATE) => {
                    ErrorKind::ConnectionFailed { message }
                }
                (WireDomain::Command, codes::COMMAND_INVALID_ARG) => {
                    ErrorKind::InvalidArgument { message }
                }
                _ => ErrorKind::Runtime {
                    message: format!("{} error (code {}): {}", domain, code, message),
                },
            }
        };
        Self::new(kind, Some(labels))
    }
}

/// The categories of error that this library itself reports, as opposed to
/// failures surfaced by the wire library. Each domain corresponds 1:1 to an
/// [`ErrorKind`] variant via [`Error::from_domain`].
///
/// The integer value of each domain is stable and will not be reassigned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorDomain {
    /// A caller-supplied argument was malformed or out of range.
    InvalidArgument = 1,

    /// A generic failure with no finer classification.
    Runtime = 2,

    /// The wire library failed in a way it could not describe further.
    Wire = 3,

    /// A connection to the deployment could not be established or used.
    ConnectionFailed = 7,

    /// A value crossing the wire boundary had an unexpected shape.
    UnexpectedValue = 8,

    /// An API usage contract was violated.
    Logic = 9,
}

/// The types of errors that can occur.
#[allow(missing_docs)]
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// An invalid argument was provided.
    #[error("An invalid argument was provided: {message}")]
    #[non_exhaustive]
    InvalidArgument { message: String },

    /// A runtime failure with no finer classification.
    #[error("{message}")]
    #[non_exhaustive]
    Runtime { message: String },

    /// A value received from the wire library or codec did not have the
    /// expected shape.
    #[error("Unexpected value: {message}")]
    #[non_exhaustive]
    UnexpectedValue { message: String },

    /// The wire library failed without reporting a translatable domain and
    /// code.
    #[error("Wire library failure: {message}")]
    #[non_exhaustive]
    Wire { message: String },

    /// Establishing or using a connection to the deployment failed. This
    /// covers stream failures, server selection failures, and authentication
    /// handshake failures.
    #[error("Connection failed: {message}")]
    #[non_exhaustive]
    ConnectionFailed { message: String },

    /// The caller used the API in an unsupported way, such as passing a
    /// session to a client other than the one that started it.
    #[error("{message}")]
    #[non_exhaustive]
    Logic { message: String },

    /// The server reported that an operation exceeded its time limit.
    #[error("Operation exceeded the configured time limit: {message}")]
    #[non_exhaustive]
    ExecutionTimeout { message: String },
}
