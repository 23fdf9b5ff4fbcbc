//! Per-connection state: the non-blocking socket, the parser, and the
//! ordered outgoing write queue.
//!
//! A [`Client`] is shared behind an `Arc` between its owning Dispatch and
//! any Workers currently running a handler for it, so that a `Task` can
//! hold a cheap handle back to the connection it must respond on. Only
//! `outgoing` and `pending` are touched from more than one thread; the
//! rest of the fields are read and written exclusively by the Dispatch
//! that accepted the connection (never migrates), so they sit behind
//! `UnsafeCell` rather than a lock — the same contract a `&mut self`
//! receiver would express if `Client` weren't required to live behind a
//! shared `Arc`. See [`crate::server::task::Task`].

use std::cell::UnsafeCell;
use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use bytes::Bytes;
use mio::net::TcpStream;
use tracing::warn;

use crate::parser::Parser;
use crate::request::Request;
use crate::response::{ContentType, Response};
use crate::status::StatusCode;

/// Per-iteration cap on bytes read or written for a single Client.
pub(crate) const CHUNKSIZE: usize = 4096;

pub(crate) enum ReadOutcome {
    Continue,
    WouldBlock,
    Error,
}

pub(crate) enum WriteOutcome {
    Continue,
    WouldBlock,
    Error,
    Done,
}

struct Outgoing {
    map: BTreeMap<u64, Bytes>,
    wrhup: bool,
}

struct DispatchOwned {
    socket: TcpStream,
    parser: Parser,
    written: usize,
    next_sequence: u64,
    emitted_sequence: u64,
    closing: bool,
}

/// Owns one accepted connection. All methods take `&self`: the
/// Dispatch-only ones are safe only because exactly one Dispatch thread
/// ever calls them for a given Client (see the module docs), while
/// [`Client::add_outgoing`], [`Client::is_pending`], and
/// [`Client::not_writeable`] are genuinely thread-safe.
pub(crate) struct Client {
    dispatch_owned: UnsafeCell<DispatchOwned>,
    outgoing: Mutex<Outgoing>,
    pending: AtomicUsize,
}

// SAFETY: `dispatch_owned` is mutated only by the single Dispatch thread
// that owns this Client; `outgoing` and `pending` have their own
// synchronization.
unsafe impl Sync for Client {}

impl Client {
    pub(crate) fn new(socket: TcpStream) -> Self {
        Client {
            dispatch_owned: UnsafeCell::new(DispatchOwned {
                socket,
                parser: Parser::new(),
                written: 0,
                next_sequence: 0,
                emitted_sequence: 0,
                closing: false,
            }),
            outgoing: Mutex::new(Outgoing {
                map: BTreeMap::new(),
                wrhup: false,
            }),
            pending: AtomicUsize::new(0),
        }
    }

    #[allow(clippy::mut_from_ref)]
    fn owned(&self) -> &mut DispatchOwned {
        unsafe { &mut *self.dispatch_owned.get() }
    }

    pub(crate) fn socket_mut(&self) -> &mut TcpStream {
        &mut self.owned().socket
    }

    /// Reads up to [`CHUNKSIZE`] bytes and feeds them to the parser.
    pub(crate) fn handle_read(&self) -> ReadOutcome {
        let owned = self.owned();
        let mut buf = [0u8; CHUNKSIZE];
        match owned.socket.read(&mut buf) {
            Ok(0) => {
                owned.closing = true;
                ReadOutcome::WouldBlock
            }
            Ok(n) => {
                owned.parser.process(&buf[..n]);
                if owned.parser.is_error() {
                    warn!("malformed request, closing connection");
                    self.fail_with_response(bad_request_response());
                    ReadOutcome::Error
                } else {
                    ReadOutcome::Continue
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => ReadOutcome::WouldBlock,
            Err(_) => {
                self.initiate_shutdown();
                ReadOutcome::Error
            }
        }
    }

    /// Drains fully parsed requests, incrementing `pending` for each.
    pub(crate) fn take_requests(&self) -> Vec<Request> {
        let requests = self.owned().parser.take_requests();
        if !requests.is_empty() {
            self.pending.fetch_add(requests.len(), Ordering::AcqRel);
        }
        requests
    }

    /// Writes from the head of the outgoing map, in ascending-sequence
    /// order, up to a cumulative [`CHUNKSIZE`] budget across entries.
    pub(crate) fn handle_write(&self) -> WriteOutcome {
        let owned = self.owned();
        let mut budget = CHUNKSIZE;
        loop {
            let head = {
                let guard = match self.outgoing.try_lock() {
                    Ok(g) => g,
                    Err(_) => return WriteOutcome::Continue,
                };
                if guard.map.is_empty() {
                    return WriteOutcome::Done;
                }
                let key = *guard.map.keys().next().unwrap();
                if key > owned.emitted_sequence {
                    return WriteOutcome::Continue;
                }
                guard.map.get(&key).cloned().unwrap()
            };

            loop {
                let remaining = &head[owned.written..];
                if remaining.is_empty() {
                    break;
                }
                let to_write = remaining.len().min(budget);
                if to_write == 0 {
                    return WriteOutcome::Continue;
                }
                match owned.socket.write(&remaining[..to_write]) {
                    Ok(0) => {
                        self.initiate_shutdown();
                        return WriteOutcome::Error;
                    }
                    Ok(n) => {
                        owned.written += n;
                        budget -= n;
                    }
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                        return WriteOutcome::WouldBlock;
                    }
                    Err(_) => {
                        self.initiate_shutdown();
                        return WriteOutcome::Error;
                    }
                }
            }

            let empty = {
                let mut guard = self.outgoing.lock().unwrap();
                guard.map.remove(&owned.emitted_sequence);
                guard.map.is_empty()
            };
            owned.emitted_sequence += 1;
            owned.written = 0;

            if empty {
                if self.pending.load(Ordering::Acquire) == 0 {
                    owned.next_sequence = 0;
                    owned.emitted_sequence = 0;
                }
                return WriteOutcome::Done;
            }
            if budget == 0 {
                return WriteOutcome::Continue;
            }
        }
    }

    /// Shutdown-drain variant of [`Client::handle_write`]: flushes at
    /// most one [`CHUNKSIZE`] slice of the current head entry.
    pub(crate) fn write_one(&self) -> WriteOutcome {
        let owned = self.owned();
        let head = {
            let guard = self.outgoing.lock().unwrap();
            if guard.map.is_empty() {
                return WriteOutcome::Done;
            }
            let key = *guard.map.keys().next().unwrap();
            guard.map.get(&key).cloned().unwrap()
        };
        let remaining = &head[owned.written..];
        if remaining.is_empty() {
            return WriteOutcome::Done;
        }
        let to_write = remaining.len().min(CHUNKSIZE);
        match owned.socket.write(&remaining[..to_write]) {
            Ok(0) => {
                self.initiate_shutdown();
                WriteOutcome::Error
            }
            Ok(n) => {
                owned.written += n;
                if owned.written >= head.len() {
                    let empty = {
                        let mut guard = self.outgoing.lock().unwrap();
                        guard.map.remove(&owned.emitted_sequence);
                        guard.map.is_empty()
                    };
                    owned.emitted_sequence += 1;
                    owned.written = 0;
                    if empty {
                        WriteOutcome::Done
                    } else {
                        WriteOutcome::Continue
                    }
                } else {
                    WriteOutcome::Continue
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => WriteOutcome::WouldBlock,
            Err(_) => {
                self.initiate_shutdown();
                WriteOutcome::Error
            }
        }
    }

    /// Worker-facing: posts a response's encoded bytes under its assigned
    /// sequence, discarding it silently if the write half is already
    /// disabled. Always decrements `pending`, even on discard, so that
    /// quiescence detection stays correct. Returns whether the Dispatch
    /// should be woken for a write or a reap.
    pub(crate) fn add_outgoing(&self, sequence: u64, bytes: Bytes) -> bool {
        let (was_empty, wrhup) = {
            let mut guard = self.outgoing.lock().unwrap();
            let was_empty = guard.map.is_empty();
            let wrhup = guard.wrhup;
            if !wrhup {
                guard.map.insert(sequence, bytes);
            }
            (was_empty, wrhup)
        };
        let remaining_after = self.pending.fetch_sub(1, Ordering::AcqRel) - 1;
        (was_empty && !wrhup) || (wrhup && remaining_after == 0)
    }

    /// Returns `next_sequence`, then increments it. Dispatch-only.
    pub(crate) fn increment_sequence(&self) -> u64 {
        let owned = self.owned();
        let sequence = owned.next_sequence;
        owned.next_sequence += 1;
        sequence
    }

    /// Marks the write half permanently disabled and drops all queued
    /// bytes. Idempotent.
    pub(crate) fn initiate_shutdown(&self) {
        let mut guard = self.outgoing.lock().unwrap();
        guard.map.clear();
        guard.wrhup = true;
        drop(guard);
        let owned = self.owned();
        owned.closing = true;
        owned.parser.reset();
    }

    /// Like [`Client::initiate_shutdown`], but gives `response` one
    /// chance to be the sole surviving entry in the outgoing map — the
    /// best-effort synthesized error response. Dropped silently if the
    /// write half was already disabled.
    fn fail_with_response(&self, response: Response) {
        let owned = self.owned();
        let mut guard = self.outgoing.lock().unwrap();
        if !guard.wrhup {
            guard.map.clear();
            guard.map.insert(owned.emitted_sequence, response.serialize());
        }
        guard.wrhup = true;
        drop(guard);
        owned.closing = true;
        owned.parser.reset();
    }

    pub(crate) fn is_closing(&self) -> bool {
        self.owned().closing
    }

    pub(crate) fn mark_closing(&self) {
        self.owned().closing = true;
    }

    pub(crate) fn not_writeable(&self) -> bool {
        self.outgoing.lock().unwrap().wrhup
    }

    /// True iff there is outstanding handler work, queued bytes, or the
    /// parser has mid-request state.
    pub(crate) fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire) > 0
            || !self.outgoing.lock().unwrap().map.is_empty()
            || !self.owned().parser.is_fresh()
    }

    /// Number of handler invocations dispatched for this Client but not
    /// yet posted back via `add_outgoing`. Used for the periodic status
    /// summary; not otherwise load-bearing (see `is_pending`).
    pub(crate) fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

fn bad_request_response() -> Response {
    Response::new(
        StatusCode::BadRequest,
        ContentType::PlainText,
        &b"malformed request"[..],
    )
}
