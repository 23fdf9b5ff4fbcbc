//! The streaming request parser.
//!
//! A [`Parser`] consumes arbitrary byte slices handed to it by a
//! [`crate::server::client::Client`] and, as soon as a full request-line,
//! header block, and body have been seen, commits a [`Request`] to its
//! internal list. It never reads from a socket and never blocks; all of
//! its state lives in `self` so that `process` can be called repeatedly
//! with whatever chunk of bytes the last `read(2)` happened to return.
//!
//! The state machine is a tagged [`ParserState`] matched in one loop, one
//! arm per state — the idiomatic equivalent of the table-driven,
//! one-function-per-state design this parser is descended from.

use std::collections::HashMap;

use crate::method::Method;
use crate::request::Request;

/// One state of the request-parsing state machine.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum ParserState {
    ParseMethod,
    ParseEndpoint,
    ParseQueryKey,
    ParseQueryValue,
    FindHeaders,
    ParseHeaderKey,
    ParseHeaderValue,
    FindBody,
    ParseBody,
}

/// Streaming HTTP/1.1 request parser.
///
/// See the module docs for the consumption contract. `process` never
/// backtracks: each byte is consumed exactly once, by exactly one state.
#[derive(Debug)]
pub struct Parser {
    state: ParserState,
    /// Accumulates the "key-ish" token of whatever state we're in: the
    /// method, the path, a query key, or a header key.
    primary: Vec<u8>,
    /// Accumulates the "value-ish" token: a query value or a header value.
    secondary: Vec<u8>,
    /// Dual-use: CRLF-match progress in `FindHeaders`/header-value
    /// termination, and remaining body byte count in `ParseBody`.
    counter: usize,
    method: Option<Method>,
    endpoint: String,
    query: HashMap<String, String>,
    headers: HashMap<String, String>,
    body: Vec<u8>,
    error: bool,
    fresh: bool,
    requests: Vec<Request>,
}

impl Parser {
    /// Builds a fresh parser, ready to receive the first byte of a
    /// request-line.
    pub fn new() -> Self {
        Parser {
            state: ParserState::ParseMethod,
            primary: Vec::new(),
            secondary: Vec::new(),
            counter: 0,
            method: None,
            endpoint: String::new(),
            query: HashMap::new(),
            headers: HashMap::new(),
            body: Vec::new(),
            error: false,
            fresh: true,
            requests: Vec::new(),
        }
    }

    /// Feeds a chunk of bytes into the state machine. Any number of
    /// complete requests found along the way are appended to the internal
    /// list, retrievable with [`Parser::take_requests`].
    pub fn process(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.fresh = false;
            self.step(byte);
        }
    }

    fn step(&mut self, byte: u8) {
        match self.state {
            ParserState::ParseMethod => self.step_method(byte),
            ParserState::ParseEndpoint => self.step_endpoint(byte),
            ParserState::ParseQueryKey => self.step_query_key(byte),
            ParserState::ParseQueryValue => self.step_query_value(byte),
            ParserState::FindHeaders => self.step_find_headers(byte),
            ParserState::ParseHeaderKey => self.step_header_key(byte),
            ParserState::ParseHeaderValue => self.step_header_value(byte),
            ParserState::FindBody | ParserState::ParseBody => self.step_body(byte),
        }
    }

    fn step_method(&mut self, byte: u8) {
        if byte == b' ' {
            match Method::from_token(&self.primary) {
                Some(method) => self.method = Some(method),
                None => {
                    self.error = true;
                    self.method = Some(Method::Get);
                }
            }
            self.primary.clear();
            self.state = ParserState::ParseEndpoint;
        } else {
            self.primary.push(byte);
        }
    }

    fn step_endpoint(&mut self, byte: u8) {
        match byte {
            b'?' => {
                self.endpoint = String::from_utf8_lossy(&self.primary).into_owned();
                self.primary.clear();
                self.state = ParserState::ParseQueryKey;
            }
            b' ' => {
                self.endpoint = String::from_utf8_lossy(&self.primary).into_owned();
                self.primary.clear();
                self.enter_find_headers();
            }
            _ => self.primary.push(byte),
        }
    }

    fn step_query_key(&mut self, byte: u8) {
        match byte {
            b'=' => {
                self.state = ParserState::ParseQueryValue;
            }
            b'&' => {
                self.commit_query_pair();
            }
            b' ' => {
                self.commit_query_pair();
                self.enter_find_headers();
            }
            _ => self.primary.push(byte),
        }
    }

    fn step_query_value(&mut self, byte: u8) {
        match byte {
            b'&' => {
                self.commit_query_pair();
                self.state = ParserState::ParseQueryKey;
            }
            b' ' => {
                self.commit_query_pair();
                self.enter_find_headers();
            }
            // '=' (and everything else) inside a query value is literal.
            _ => self.secondary.push(byte),
        }
    }

    fn commit_query_pair(&mut self) {
        if !self.primary.is_empty() || !self.secondary.is_empty() {
            let key = String::from_utf8_lossy(&self.primary).into_owned();
            let value = String::from_utf8_lossy(&self.secondary).into_owned();
            self.query.insert(key, value);
        }
        self.primary.clear();
        self.secondary.clear();
    }

    /// Enters `FindHeaders` with the CRLF counter reset. Any bytes that
    /// don't match the CR/LF pattern (the literal `HTTP/1.1` tail of the
    /// request-line) are simply discarded by `step_find_headers` until
    /// the first real CRLF is found.
    fn enter_find_headers(&mut self) {
        self.state = ParserState::FindHeaders;
        self.counter = 0;
    }

    fn step_find_headers(&mut self, byte: u8) {
        let expected = match self.counter {
            0 | 2 => b'\r',
            1 | 3 => b'\n',
            _ => unreachable!("CRLF counter out of range"),
        };

        if byte == expected {
            self.counter += 1;
            if self.counter == 4 {
                self.enter_find_body();
            }
        } else if self.counter == 2 {
            // We'd already seen one complete CRLF; this byte starts the
            // next header line rather than a second, blank-line CRLF.
            self.counter = 0;
            self.state = ParserState::ParseHeaderKey;
            self.step_header_key(byte);
        } else {
            // Either still discarding the request-line's version tail
            // (counter == 0) or a stray CR/LF that wasn't a real CRLF;
            // either way, keep scanning.
            self.counter = 0;
        }
    }

    fn step_header_key(&mut self, byte: u8) {
        if byte == b':' {
            self.state = ParserState::ParseHeaderValue;
            self.counter = 0;
        } else {
            self.primary.push(byte);
        }
    }

    fn step_header_value(&mut self, byte: u8) {
        match self.counter {
            0 if byte == b'\r' => self.counter = 1,
            1 if byte == b'\n' => {
                self.commit_header_pair();
                self.counter = 0;
                self.state = ParserState::FindHeaders;
            }
            1 => {
                // A lone '\r' that wasn't followed by '\n': treat it
                // literally and keep accumulating the value.
                self.secondary.push(b'\r');
                self.counter = 0;
                self.secondary.push(byte);
            }
            _ => self.secondary.push(byte),
        }
    }

    fn commit_header_pair(&mut self) {
        let key = String::from_utf8_lossy(&self.primary).into_owned();
        let value = trim_ascii_whitespace(&self.secondary);
        self.headers.insert(key, value);
        self.primary.clear();
        self.secondary.clear();
    }

    fn enter_find_body(&mut self) {
        let remaining = match self.headers.get("Content-Length") {
            Some(value) => match value.parse::<usize>() {
                Ok(n) => n,
                Err(_) => {
                    self.error = true;
                    0
                }
            },
            None => 0,
        };
        self.counter = remaining;
        self.state = ParserState::ParseBody;
        if remaining == 0 {
            self.commit_request();
        }
    }

    fn step_body(&mut self, byte: u8) {
        self.body.push(byte);
        self.counter -= 1;
        if self.counter == 0 {
            self.commit_request();
        }
    }

    fn commit_request(&mut self) {
        let request = Request {
            method: self.method.take().unwrap_or(Method::Get),
            endpoint: std::mem::take(&mut self.endpoint),
            query: std::mem::take(&mut self.query),
            headers: std::mem::take(&mut self.headers),
            body: std::mem::take(&mut self.body),
        };
        self.requests.push(request);
        self.state = ParserState::ParseMethod;
        self.primary.clear();
        self.secondary.clear();
        self.counter = 0;
        self.fresh = true;
    }

    /// Drains and returns every request committed so far.
    pub fn take_requests(&mut self) -> Vec<Request> {
        std::mem::take(&mut self.requests)
    }

    /// True once any byte fed to this parser produced malformed input
    /// (an unrecognized method, or a non-numeric `Content-Length`).
    pub fn is_error(&self) -> bool {
        self.error
    }

    /// True iff no byte has been fed since construction or the last
    /// `reset`/`clear`.
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    /// Restores the parser to the state of a freshly constructed
    /// instance, except that any requests committed but not yet taken
    /// via [`Parser::take_requests`] are preserved.
    pub fn reset(&mut self) {
        self.state = ParserState::ParseMethod;
        self.primary.clear();
        self.secondary.clear();
        self.counter = 0;
        self.method = None;
        self.endpoint.clear();
        self.query.clear();
        self.headers.clear();
        self.body.clear();
        self.error = false;
        self.fresh = true;
    }

    /// Like [`Parser::reset`], but also drops any parsed-but-untaken
    /// requests.
    pub fn clear(&mut self) {
        self.reset();
        self.requests.clear();
    }
}

impl Default for Parser {
    fn default() -> Self {
        Parser::new()
    }
}

fn trim_ascii_whitespace(bytes: &[u8]) -> String {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace());
    let end = bytes.iter().rposition(|b| !b.is_ascii_whitespace());
    match (start, end) {
        (Some(start), Some(end)) => String::from_utf8_lossy(&bytes[start..=end]).into_owned(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests;
