//! Error and Result module.
//!
//! This covers the setup/listener/I-O failure taxonomy. Per-request
//! failures produced by handlers never surface through this type; see
//! [`crate::handler::HandlerError`] instead.

use std::error::Error as StdError;
use std::fmt;
use std::io;

/// Result type returned from fallible core operations.
pub type Result<T> = std::result::Result<T, Error>;

type Cause = Box<dyn StdError + Send + Sync>;

/// An error occurring while setting up or running the server.
pub struct Error {
    inner: Box<ErrorImpl>,
}

struct ErrorImpl {
    kind: Kind,
    cause: Option<Cause>,
}

#[derive(Debug)]
pub(crate) enum Kind {
    /// Failed to create or bind the listening socket.
    Listen,
    /// Failed to accept a connection off the listening socket.
    Accept,
    /// An I/O error reading or writing a client socket.
    Io,
    /// A handler panicked while executing.
    HandlerPanic,
    /// Failed to register the `mio::Poll` for a Dispatch reactor.
    Poll,
}

impl Error {
    pub(crate) fn new(kind: Kind) -> Error {
        Error {
            inner: Box::new(ErrorImpl { kind, cause: None }),
        }
    }

    pub(crate) fn with<C: Into<Cause>>(mut self, cause: C) -> Error {
        self.inner.cause = Some(cause.into());
        self
    }

    pub(crate) fn new_listen<E: Into<Cause>>(cause: E) -> Error {
        Error::new(Kind::Listen).with(cause)
    }

    pub(crate) fn new_accept(cause: io::Error) -> Error {
        Error::new(Kind::Accept).with(cause)
    }

    pub(crate) fn new_io(cause: io::Error) -> Error {
        Error::new(Kind::Io).with(cause)
    }

    pub(crate) fn new_handler_panic() -> Error {
        Error::new(Kind::HandlerPanic)
    }

    pub(crate) fn new_poll(cause: io::Error) -> Error {
        Error::new(Kind::Poll).with(cause)
    }

    /// Returns true if this error occurred while creating the listener.
    pub fn is_listen(&self) -> bool {
        matches!(self.inner.kind, Kind::Listen)
    }

    /// Returns true if this error occurred while accepting a connection.
    pub fn is_accept(&self) -> bool {
        matches!(self.inner.kind, Kind::Accept)
    }

    /// Returns true if this was an I/O error on a client socket.
    pub fn is_io(&self) -> bool {
        matches!(self.inner.kind, Kind::Io)
    }

    fn description(&self) -> &str {
        match self.inner.kind {
            Kind::Listen => "error creating server listener",
            Kind::Accept => "error accepting connection",
            Kind::Io => "connection I/O error",
            Kind::HandlerPanic => "handler panicked",
            Kind::Poll => "error registering readiness poll",
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_tuple("Error");
        f.field(&self.inner.kind);
        if let Some(ref cause) = self.inner.cause {
            f.field(cause);
        }
        f.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref cause) = self.inner.cause {
            write!(f, "{}: {}", self.description(), cause)
        } else {
            f.write_str(self.description())
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner
            .cause
            .as_ref()
            .map(|cause| &**cause as &(dyn StdError + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem;

    #[test]
    fn error_size_of() {
        assert_eq!(mem::size_of::<Error>(), mem::size_of::<usize>());
    }

    #[test]
    fn display_includes_cause() {
        let io_err = io::Error::new(io::ErrorKind::Other, "boom");
        let err = Error::new_io(io_err);
        assert!(err.is_io());
        assert!(err.to_string().contains("boom"));
    }
}
