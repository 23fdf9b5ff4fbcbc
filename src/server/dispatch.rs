//! The reactor thread: one `mio::Poll` instance and the slab of Clients
//! it owns.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use mio::event::Event;
use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token};
use slab::Slab;
use tracing::{debug, info, info_span, warn};

use crate::handler::HandlerTable;
use crate::request::Request;
use crate::response::Response;
use crate::status::StatusCode;

use super::client::{Client, ReadOutcome, WriteOutcome};
use super::task::Task;
use super::worker::WorkerPool;

const STATUS_INTERVAL: Duration = Duration::from_secs(5);

/// A fresh TCP connection handed off by the accept loop.
pub(crate) struct NewClient {
    pub(crate) socket: TcpStream,
}

/// Message on the new-client channel. `ShuttingDown` is the sentinel
/// pushed to unblock a Dispatch parked waiting for its first connection
/// so it notices a shutdown request even with zero live Clients.
pub(crate) enum NewClientMessage {
    Accepted(NewClient),
    ShuttingDown,
}

/// Readiness flags accumulated for a token since it was last fully
/// handled, mirroring the base design's per-fd bitset merged across
/// poll iterations.
#[derive(Default, Clone, Copy)]
struct PendingEvents {
    readable: bool,
    writable: bool,
    read_closed: bool,
    hup: bool,
}

impl PendingEvents {
    fn any(&self) -> bool {
        self.readable || self.writable || self.read_closed || self.hup
    }

    fn merge(&mut self, event: &Event) {
        self.readable |= event.is_readable();
        self.writable |= event.is_writable();
        self.read_closed |= event.is_read_closed();
        self.hup |= event.is_error();
    }
}

pub(crate) struct Dispatch {
    poll: Poll,
    clients: Slab<Arc<Client>>,
    pending: HashMap<Token, PendingEvents>,
    new_clients: Receiver<NewClientMessage>,
    want_write_tx: Sender<Token>,
    want_write_rx: Receiver<Token>,
    handlers: Arc<HandlerTable>,
    workers: Arc<WorkerPool>,
    stop: Arc<AtomicBool>,
    acknowledged: Arc<AtomicBool>,
    last_status: Instant,
    index: usize,
}

impl Dispatch {
    pub(crate) fn new(
        index: usize,
        new_clients: Receiver<NewClientMessage>,
        handlers: Arc<HandlerTable>,
        workers: Arc<WorkerPool>,
    ) -> io::Result<Dispatch> {
        let (want_write_tx, want_write_rx) = crossbeam_channel::unbounded();
        Ok(Dispatch {
            poll: Poll::new()?,
            clients: Slab::new(),
            pending: HashMap::new(),
            new_clients,
            want_write_tx,
            want_write_rx,
            handlers,
            workers,
            stop: Arc::new(AtomicBool::new(false)),
            acknowledged: Arc::new(AtomicBool::new(false)),
            last_status: Instant::now(),
            index,
        })
    }

    pub(crate) fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub(crate) fn acknowledged_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.acknowledged)
    }

    pub(crate) fn spawn(mut self) -> JoinHandle<()> {
        thread::Builder::new()
            .name(format!("httpd-dispatch-{}", self.index))
            .spawn(move || self.run())
            .expect("failed to spawn dispatch thread")
    }

    fn run(&mut self) {
        let mut events = Events::with_capacity(1024);
        loop {
            self.emit_status();

            if self.stop.load(Ordering::Acquire) {
                self.drain_and_exit();
                return;
            }

            if self.clients.is_empty() {
                match self.new_clients.recv() {
                    Ok(NewClientMessage::Accepted(new_client)) => self.accept(new_client),
                    Ok(NewClientMessage::ShuttingDown) | Err(_) => continue,
                }
            } else {
                while let Ok(message) = self.new_clients.try_recv() {
                    if let NewClientMessage::Accepted(new_client) = message {
                        self.accept(new_client);
                    }
                }
            }

            self.process_pending();

            if let Err(err) = self.poll.poll(&mut events, Some(Duration::ZERO)) {
                warn!(error = %err, "poll failed");
                continue;
            }
            for event in events.iter() {
                self.pending.entry(event.token()).or_default().merge(event);
            }

            while let Ok(token) = self.want_write_rx.try_recv() {
                self.pending.entry(token).or_default().writable = true;
            }
        }
    }

    fn emit_status(&mut self) {
        if self.last_status.elapsed() >= STATUS_INTERVAL {
            let pending: usize = self.clients.iter().map(|(_, client)| client.pending_count()).sum();
            info!(
                target: "dispatch",
                dispatch = self.index,
                clients = self.clients.len(),
                pending,
                worker_queue_depths = ?self.workers.queue_depths(),
                "status"
            );
            self.last_status = Instant::now();
        }
    }

    fn process_pending(&mut self) {
        let tokens: Vec<Token> = self.pending.keys().copied().collect();
        for token in tokens {
            self.process_one(token);
        }
    }

    fn process_one(&mut self, token: Token) {
        let mut flags = match self.pending.get(&token).copied() {
            Some(flags) => flags,
            None => return,
        };

        let client = match self.clients.get(token.0) {
            Some(client) => Arc::clone(client),
            None => {
                self.pending.remove(&token);
                return;
            }
        };

        let _span = info_span!("client", token = token.0).entered();

        if flags.readable {
            let outcome = client.handle_read();
            match outcome {
                ReadOutcome::WouldBlock => flags.readable = false,
                ReadOutcome::Error => flags = PendingEvents::default(),
                ReadOutcome::Continue => {}
            }
            for request in client.take_requests() {
                self.dispatch_request(token, &client, request);
            }
        }

        if flags.hup {
            client.initiate_shutdown();
            flags.hup = false;
        }

        if flags.read_closed {
            client.mark_closing();
            flags.read_closed = false;
        }

        if flags.writable {
            match client.handle_write() {
                WriteOutcome::Continue => {}
                _ => flags.writable = false,
            }
        }

        if client.is_closing() && !client.is_pending() {
            debug!(token = token.0, "client quiescent, reaping");
            self.deregister(token);
            self.pending.remove(&token);
            return;
        }

        if flags.any() {
            self.pending.insert(token, flags);
        } else {
            self.pending.remove(&token);
        }
    }

    fn dispatch_request(&mut self, token: Token, client: &Arc<Client>, request: Request) {
        let sequence = client.increment_sequence();
        match self.handlers.get(request.method, &request.endpoint) {
            Some(handler) => {
                let task = Task {
                    client: Arc::clone(client),
                    token,
                    sequence,
                    request,
                    handler: Arc::clone(handler),
                    wake: self.want_write_tx.clone(),
                };
                self.workers.pick().add(task);
            }
            None => {
                debug!(token = token.0, endpoint = %request.endpoint, "no handler, synthesizing 404");
                let response = Response::empty(StatusCode::NotFound);
                let _ = client.add_outgoing(sequence, response.serialize());
                self.pending.entry(token).or_default().writable = true;
            }
        }
    }

    fn accept(&mut self, new_client: NewClient) {
        let entry = self.clients.vacant_entry();
        let token = Token(entry.key());
        let client = Client::new(new_client.socket);
        if let Err(err) = self.poll.registry().register(
            client.socket_mut(),
            token,
            Interest::READABLE | Interest::WRITABLE,
        ) {
            warn!(error = %err, "failed to register client, dropping");
            return;
        }
        entry.insert(Arc::new(client));
        debug!(token = token.0, "client accepted");
        self.pending.insert(
            token,
            PendingEvents {
                readable: true,
                writable: false,
                read_closed: false,
                hup: false,
            },
        );
    }

    fn deregister(&mut self, token: Token) {
        if let Some(client) = self.clients.get(token.0) {
            let _ = self.poll.registry().deregister(client.socket_mut());
        }
        if self.clients.contains(token.0) {
            self.clients.remove(token.0);
        }
    }

    /// Shutdown drain: honors only OUT events via `write_one` until every
    /// known Client is drained or erred, then waits for Workers and
    /// clears the Client map.
    fn drain_and_exit(&mut self) {
        info!(dispatch = self.index, "entering shutdown drain");
        loop {
            let tokens: Vec<Token> = self.clients.iter().map(|(key, _)| Token(key)).collect();
            if tokens.is_empty() {
                break;
            }
            let mut any_active = false;
            for token in tokens {
                let client = match self.clients.get(token.0) {
                    Some(c) => Arc::clone(c),
                    None => continue,
                };
                match client.write_one() {
                    WriteOutcome::Done if !client.is_pending() => {
                        self.deregister(token);
                    }
                    WriteOutcome::Error => {
                        self.deregister(token);
                    }
                    _ => any_active = true,
                }
            }
            if !any_active {
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
        self.clients.clear();
        self.acknowledged.store(true, Ordering::Release);
        info!(dispatch = self.index, "shutdown drain complete");
    }
}
