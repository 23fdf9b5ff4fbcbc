//! The top-level `Server`: listening socket, Dispatch reactors, Worker
//! pool, handler registry, and signal-driven shutdown.

mod client;
mod dispatch;
mod task;
mod worker;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mio::net::TcpListener;
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::handler::{Handler, HandlerTable};
use crate::method::Method;

use dispatch::{Dispatch, NewClient, NewClientMessage};
use worker::WorkerPool;

const LISTEN_BACKLOG: i32 = 128;

/// Builds and runs the server. Register handlers with
/// [`Server::register_handler`], then call [`Server::go`].
pub struct Server {
    handlers: HandlerTable,
    dispatch_count: usize,
    worker_pool_size: usize,
}

impl Server {
    /// Creates a server with the given number of Dispatch reactor shards
    /// and the given Worker pool size.
    pub fn new(dispatch_count: usize, worker_pool_size: usize) -> Server {
        Server {
            handlers: HandlerTable::new(),
            dispatch_count: dispatch_count.max(1),
            worker_pool_size: worker_pool_size.max(1),
        }
    }

    /// Registers a handler for an exact-match `(method, endpoint)` pair.
    /// Must be called before [`Server::go`]; the table is read-only once
    /// the server starts.
    pub fn register_handler<H>(&mut self, method: Method, endpoint: impl Into<String>, handler: H)
    where
        H: Handler + 'static,
    {
        self.handlers
            .insert(method, endpoint.into(), Arc::new(handler));
    }

    /// Binds the listening socket and runs until a SIGINT shutdown
    /// completes. Blocks the calling thread for the server's lifetime.
    pub fn go(self, port: u16) -> Result<()> {
        let addr: SocketAddr = ([0, 0, 0, 0], port).into();
        let mut listener = bind_listener(addr)?;
        info!(%addr, "listening");

        let handlers = Arc::new(self.handlers);
        let workers = Arc::new(WorkerPool::new(self.worker_pool_size));

        let mut new_client_txs = Vec::with_capacity(self.dispatch_count);
        let mut dispatches = Vec::with_capacity(self.dispatch_count);
        for index in 0..self.dispatch_count {
            let (tx, rx) = crossbeam_channel::unbounded();
            let dispatch = Dispatch::new(index, rx, Arc::clone(&handlers), Arc::clone(&workers))
                .map_err(Error::new_poll)?;
            new_client_txs.push(tx);
            dispatches.push(dispatch);
        }

        let stop_handles: Vec<_> = dispatches.iter().map(Dispatch::stop_handle).collect();
        let ack_handles: Vec<_> = dispatches.iter().map(Dispatch::acknowledged_handle).collect();
        let dispatch_handles: Vec<_> = dispatches.into_iter().map(Dispatch::spawn).collect();

        let exiting = Arc::new(AtomicBool::new(false));
        register_sigint(Arc::clone(&exiting))?;

        let mut next_shard = 0usize;
        let accept_result = accept_loop(&mut listener, &exiting, &new_client_txs, &mut next_shard);

        info!("shutdown requested, closing listener");
        drop(listener);
        exiting.store(true, Ordering::Release);

        for stop in &stop_handles {
            stop.store(true, Ordering::Release);
        }
        for tx in &new_client_txs {
            let _ = tx.send(NewClientMessage::ShuttingDown);
        }
        for ack in &ack_handles {
            while !ack.load(Ordering::Acquire) {
                std::thread::sleep(Duration::from_millis(5));
            }
        }

        workers_request_stop(&workers);

        for handle in dispatch_handles {
            if handle.join().is_err() {
                error!("dispatch thread panicked");
            }
        }

        let mut workers = match Arc::try_unwrap(workers) {
            Ok(workers) => workers,
            Err(_) => {
                warn!("worker pool still shared at shutdown; skipping join");
                return accept_result;
            }
        };
        workers.join();

        accept_result
    }
}

fn workers_request_stop(workers: &Arc<WorkerPool>) {
    workers.request_stop();
}

fn accept_loop(
    listener: &mut TcpListener,
    exiting: &Arc<AtomicBool>,
    new_client_txs: &[crossbeam_channel::Sender<NewClientMessage>],
    next_shard: &mut usize,
) -> Result<()> {
    loop {
        if exiting.load(Ordering::Acquire) {
            return Ok(());
        }
        match listener.accept() {
            Ok((socket, peer)) => {
                tracing::debug!(%peer, "accepted connection");
                let shard = *next_shard % new_client_txs.len();
                *next_shard = next_shard.wrapping_add(1);
                let _ = new_client_txs[shard].send(NewClientMessage::Accepted(NewClient { socket }));
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(5));
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::ConnectionAborted => {
                warn!("accept: connection aborted, continuing");
            }
            Err(e) => {
                if exiting.load(Ordering::Acquire) {
                    return Ok(());
                }
                return Err(Error::new_accept(e));
            }
        }
    }
}

fn bind_listener(addr: SocketAddr) -> Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(Error::new_listen)?;
    socket.set_reuse_address(true).map_err(Error::new_listen)?;
    #[cfg(unix)]
    socket.set_reuse_port(true).map_err(Error::new_listen)?;
    socket.bind(&addr.into()).map_err(Error::new_listen)?;
    socket.listen(LISTEN_BACKLOG).map_err(Error::new_listen)?;
    socket.set_nonblocking(true).map_err(Error::new_listen)?;
    let std_listener: std::net::TcpListener = socket.into();
    Ok(TcpListener::from_std(std_listener))
}

fn register_sigint(exiting: Arc<AtomicBool>) -> Result<()> {
    let second = Arc::new(AtomicBool::new(false));
    // First SIGINT: cooperative shutdown. Second: abrupt exit.
    unsafe {
        signal_hook::low_level::register(signal_hook::consts::SIGINT, move || {
            if second.swap(true, Ordering::AcqRel) {
                std::process::exit(130);
            }
            exiting.store(true, Ordering::Release);
        })
    }
    .map(|_| ())
    .map_err(Error::new_listen)
}
