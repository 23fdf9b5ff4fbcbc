//! The unit of work handed from a Dispatch to a Worker.

use std::sync::Arc;

use crossbeam_channel::Sender;
use mio::Token;

use crate::handler::BoxedHandler;
use crate::request::Request;

use super::client::Client;

/// One parsed request, already assigned its outgoing sequence number and
/// bound to a handler. A Worker owns this for the duration of one
/// handler invocation, then posts the result back into `client`.
pub(crate) struct Task {
    pub(crate) client: Arc<Client>,
    pub(crate) token: Token,
    pub(crate) sequence: u64,
    pub(crate) request: Request,
    pub(crate) handler: BoxedHandler,
    /// The owning Dispatch's "clients want write" inbox. Edge-triggered
    /// `mio` readiness won't re-fire OUT on its own once a socket is
    /// already writable, so a Worker posting a response has to nudge
    /// the Dispatch explicitly.
    pub(crate) wake: Sender<Token>,
}
