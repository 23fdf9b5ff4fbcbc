//! The handler-execution thread pool.
//!
//! The base design this is descended from lazily spawns a worker thread
//! per live queue and lets it tear itself down once its queue empties.
//! That pattern doesn't translate cleanly to a systems language without
//! either an unbounded number of short-lived `JoinHandle`s or a second
//! supervisor thread to reap them, so this pool instead keeps a fixed
//! number of long-lived worker threads, each blocked on its own queue —
//! the alternative this design explicitly calls out as the
//! systems-language-appropriate replacement.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::error;

use crate::response::{ContentType, Response};
use crate::status::StatusCode;

use super::task::Task;

const RECV_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// One handler-execution thread and the queue feeding it.
pub(crate) struct Worker {
    sender: Sender<Task>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn(index: usize) -> Worker {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name(format!("httpd-worker-{index}"))
            .spawn(move || run(receiver, thread_stop))
            .expect("failed to spawn worker thread");
        Worker {
            sender,
            stop,
            handle: Some(handle),
        }
    }

    /// Enqueues a task. Never blocks: the queue is unbounded, matching
    /// the base design's own small FIFO (bounded only by memory).
    pub(crate) fn add(&self, task: Task) {
        match self.sender.try_send(task) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => unreachable!("unbounded worker queue reported full"),
            Err(TrySendError::Disconnected(_)) => {
                error!("dropped task: worker thread already exited");
            }
        }
    }

    pub(crate) fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub(crate) fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// Number of tasks currently queued for this worker, not counting one
    /// possibly in flight. Status-reporting only.
    pub(crate) fn queue_depth(&self) -> usize {
        self.sender.len()
    }
}

/// A fixed-size pool of [`Worker`]s. `Dispatch` picks one uniformly at
/// random per request rather than round-robin, matching the base
/// design's bounded-PRNG selection.
pub(crate) struct WorkerPool {
    workers: Vec<Worker>,
}

impl WorkerPool {
    pub(crate) fn new(size: usize) -> WorkerPool {
        let workers = (0..size).map(Worker::spawn).collect();
        WorkerPool { workers }
    }

    pub(crate) fn pick(&self) -> &Worker {
        use rand::Rng;
        let index = rand::thread_rng().gen_range(0..self.workers.len());
        &self.workers[index]
    }

    pub(crate) fn request_stop(&self) {
        for worker in &self.workers {
            worker.request_stop();
        }
    }

    pub(crate) fn join(&mut self) {
        for worker in &mut self.workers {
            worker.join();
        }
    }

    /// Queue depth of each worker, in pool order. Status-reporting only.
    pub(crate) fn queue_depths(&self) -> Vec<usize> {
        self.workers.iter().map(Worker::queue_depth).collect()
    }
}

fn run(receiver: Receiver<Task>, stop: Arc<AtomicBool>) {
    loop {
        match receiver.recv_timeout(RECV_POLL_INTERVAL) {
            Ok(task) => run_task(task),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                if stop.load(Ordering::Acquire) {
                    return;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => return,
        }
    }
}

fn run_task(task: Task) {
    let Task {
        client,
        token,
        sequence,
        request,
        handler,
        wake,
    } = task;

    let result = panic::catch_unwind(AssertUnwindSafe(|| handler.call(request)));

    let response = match result {
        Ok(Ok(response)) => response,
        Ok(Err(handler_error)) => {
            Response::new(handler_error.status, ContentType::PlainText, handler_error.body)
        }
        Err(_) => {
            error!("handler panicked");
            Response::new(
                StatusCode::InternalServerError,
                ContentType::PlainText,
                &b"internal server error"[..],
            )
        }
    };

    let bytes = response.serialize();
    let wants_wake = client.add_outgoing(sequence, bytes);
    if wants_wake {
        // Best-effort: if the Dispatch already shut down, its inbox is
        // gone and there's nothing left to wake.
        let _ = wake.send(token);
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::net::{TcpListener, TcpStream as StdTcpStream};
    use std::sync::Arc;
    use std::time::Duration;

    use mio::net::TcpStream;

    use crate::handler::HandlerError;
    use crate::method::Method;
    use crate::request::Request;
    use crate::status::StatusCode;

    use super::super::client::{Client, WriteOutcome};
    use super::*;

    fn flush(client: &Client) {
        loop {
            match client.handle_write() {
                WriteOutcome::Done => return,
                WriteOutcome::Continue => continue,
                WriteOutcome::WouldBlock | WriteOutcome::Error => {
                    panic!("unexpected write outcome while flushing test response")
                }
            }
        }
    }

    fn loopback_pair() -> (TcpStream, StdTcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client_std = StdTcpStream::connect(addr).unwrap();
        let (peer, _) = listener.accept().unwrap();
        client_std.set_nonblocking(true).unwrap();
        (TcpStream::from_std(client_std), peer)
    }

    fn dummy_request() -> Request {
        Request {
            method: Method::Get,
            endpoint: "/".to_string(),
            query: Default::default(),
            headers: Default::default(),
            body: Vec::new(),
        }
    }

    fn read_one_response(peer: &mut StdTcpStream) -> String {
        peer.set_read_timeout(Some(Duration::from_millis(500))).unwrap();
        let mut buf = [0u8; 4096];
        let n = peer.read(&mut buf).expect("expected a response on the wire");
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    #[test]
    fn handler_error_maps_to_its_carried_status() {
        let (socket, mut peer) = loopback_pair();
        let client = Arc::new(Client::new(socket));
        let (wake_tx, wake_rx) = crossbeam_channel::unbounded();

        let task = Task {
            client: Arc::clone(&client),
            token: mio::Token(0),
            sequence: 0,
            request: dummy_request(),
            handler: Arc::new(|_req: Request| {
                Err(HandlerError::new(StatusCode::ImATeapot, &b"short and stout"[..]))
            }),
            wake: wake_tx,
        };

        run_task(task);
        flush(&client);

        let text = read_one_response(&mut peer);
        assert!(text.starts_with("HTTP/1.1 418 I'm a teapot\r\n"), "{text}");
        assert!(text.ends_with("short and stout"), "{text}");
        assert_eq!(wake_rx.try_recv(), Ok(mio::Token(0)));
    }

    #[test]
    fn panicking_handler_maps_to_500() {
        let (socket, mut peer) = loopback_pair();
        let client = Arc::new(Client::new(socket));
        let (wake_tx, _wake_rx) = crossbeam_channel::unbounded();

        let task = Task {
            client: Arc::clone(&client),
            token: mio::Token(0),
            sequence: 0,
            request: dummy_request(),
            handler: Arc::new(|_req: Request| -> Result<crate::response::Response, HandlerError> {
                panic!("handler exploded")
            }),
            wake: wake_tx,
        };

        run_task(task);
        flush(&client);

        let text = read_one_response(&mut peer);
        assert!(text.starts_with("HTTP/1.1 500 Internal Server Error\r\n"), "{text}");
    }
}
