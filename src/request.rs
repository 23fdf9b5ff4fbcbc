//! The parsed HTTP request produced by the parser and handed to handlers.

use std::collections::HashMap;

use crate::method::Method;

/// A fully parsed HTTP/1.1 request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    /// The request method.
    pub method: Method,
    /// The request path, without the query string.
    pub endpoint: String,
    /// Query-string parameters. Not URL-decoded; duplicate keys overwrite
    /// the earlier value, keeping only the last occurrence.
    pub query: HashMap<String, String>,
    /// Request headers, keyed by their original case. Lookups are
    /// case-sensitive (see DESIGN.md).
    pub headers: HashMap<String, String>,
    /// The request body, exactly `Content-Length` bytes (or empty if the
    /// header was absent or unparsable).
    pub body: Vec<u8>,
}

impl Request {
    /// Looks up a header by its exact original case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Looks up a query-string parameter.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }
}
