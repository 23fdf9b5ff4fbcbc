//! The handler-facing API: the `Result` type registered handlers return,
//! and the registry the Dispatch consults when a request parses.

use std::collections::HashMap;
use std::sync::Arc;

use crate::method::Method;
use crate::request::Request;
use crate::response::Response;
use crate::status::StatusCode;

/// The error a handler returns to signal a non-200 response.
///
/// Any other failure (a panic inside the handler) is caught by the Worker
/// and mapped to a generic `500` instead; a `HandlerError` is the
/// cooperative path for a handler that knows exactly which status and
/// body it wants to send back.
#[derive(Clone, Debug)]
pub struct HandlerError {
    /// The status code to send on the wire.
    pub status: StatusCode,
    /// The response body, sent as `text/plain`.
    pub body: Vec<u8>,
}

impl HandlerError {
    /// Builds a `HandlerError` with a UTF-8 body.
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        HandlerError {
            status,
            body: body.into(),
        }
    }
}

impl From<StatusCode> for HandlerError {
    fn from(status: StatusCode) -> Self {
        HandlerError {
            status,
            body: Vec::new(),
        }
    }
}

/// A registered request handler.
///
/// Handlers run on a Worker thread and may block arbitrarily; the pool is
/// sized with that in mind. They must be `Send + Sync` since any Worker
/// may be chosen to run a given request.
pub trait Handler: Send + Sync {
    /// Handles one parsed request, producing a response or a
    /// [`HandlerError`].
    fn call(&self, request: Request) -> Result<Response, HandlerError>;
}

impl<F> Handler for F
where
    F: Fn(Request) -> Result<Response, HandlerError> + Send + Sync,
{
    fn call(&self, request: Request) -> Result<Response, HandlerError> {
        self(request)
    }
}

pub(crate) type BoxedHandler = Arc<dyn Handler>;

/// The method/endpoint table consulted by `dispatch_request`.
///
/// Populated via [`crate::server::Server::register_handler`] before
/// `go`, then read-only for the lifetime of the server.
#[derive(Default)]
pub(crate) struct HandlerTable {
    routes: HashMap<(Method, String), BoxedHandler>,
}

impl HandlerTable {
    pub(crate) fn new() -> Self {
        HandlerTable {
            routes: HashMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, method: Method, endpoint: String, handler: BoxedHandler) {
        self.routes.insert((method, endpoint), handler);
    }

    /// Exact-match, case-sensitive lookup. RFC semantics would normalize
    /// the path; this server deliberately does not (see DESIGN.md).
    pub(crate) fn get(&self, method: Method, endpoint: &str) -> Option<&BoxedHandler> {
        self.routes.get(&(method, endpoint.to_string()))
    }
}
