//! A small, thread-based HTTP/1.1 server built around a multi-reactor
//! dispatch layer, a custom incremental request parser, and a bounded
//! worker pool that preserves per-connection response ordering.
//!
//! ```no_run
//! use threadhttp::{Method, Server};
//!
//! let mut server = Server::new(2, 6);
//! server.register_handler(Method::Get, "/", |_req| {
//!     Ok(threadhttp::Response::new(
//!         threadhttp::StatusCode::Ok,
//!         threadhttp::ContentType::PlainText,
//!         &b"hello"[..],
//!     ))
//! });
//! server.go(7878).unwrap();
//! ```

pub mod error;
pub mod handler;
pub mod method;
mod parser;
pub mod request;
pub mod response;
pub mod server;
pub mod status;

pub use handler::{Handler, HandlerError};
pub use method::Method;
pub use request::Request;
pub use response::{ContentType, Response};
pub use server::Server;
pub use status::StatusCode;
