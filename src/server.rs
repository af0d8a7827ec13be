//! TCP front end: configuration, the listening socket, and the connection
//! handler that feeds the shared queue.
//!
//! The server accepts exactly one connection per run and owns it for its whole
//! lifetime. The handler thread is the only producer; N workers consume.

use crate::queue::BoundedQueue;
use crate::report::{ReportSink, Reporter};
use crate::request::{QueuedRequest, Request, Response, Status, REQUEST_SIZE};
use crate::timing::Timestamp;
use crate::worker::{send_response, ResponseSink, WorkerPool};
use parking_lot::Mutex;
use std::io::{self, Read};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const USAGE: &str =
    "Missing parameter. Exiting.\nUsage: fifo-server -q <queue size> -w <number of threads> <port_number>";

/// Runtime parameters, all required on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    /// Port to bind; 0 lets the OS pick one (used by tests).
    pub port: u16,
    /// Maximum number of queued requests.
    pub queue_capacity: usize,
    /// Number of worker threads draining the queue.
    pub workers: usize,
}

impl ServerConfig {
    /// Parse `-q <n> -w <n> <port>` from an argument iterator (program name
    /// already skipped). Both flags are required and must be positive.
    pub fn from_args<I>(args: I) -> Result<ServerConfig, String>
    where
        I: IntoIterator<Item = String>,
    {
        let mut queue_capacity: Option<usize> = None;
        let mut workers: Option<usize> = None;
        let mut port: Option<u16> = None;

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-q" => {
                    let value = args.next().ok_or("option -q requires a value")?;
                    queue_capacity = Some(parse_positive(&value, "queue size")?);
                }
                "-w" => {
                    let value = args.next().ok_or("option -w requires a value")?;
                    workers = Some(parse_positive(&value, "number of threads")?);
                }
                other if port.is_none() => {
                    port = Some(
                        other
                            .parse::<u16>()
                            .map_err(|_| format!("invalid port number: {other}"))?,
                    );
                }
                other => return Err(format!("unexpected argument: {other}")),
            }
        }

        Ok(ServerConfig {
            port: port.ok_or("missing port number")?,
            queue_capacity: queue_capacity.ok_or("missing -q <queue size>")?,
            workers: workers.ok_or("missing -w <number of threads>")?,
        })
    }
}

fn parse_positive(value: &str, what: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(format!("{what} must be greater than 0, got: {value}")),
    }
}

/// Lets a signal handler tear the active connection down: flips the stop flag
/// and shuts the registered socket so the handler's blocking read returns.
#[derive(Clone)]
pub struct ShutdownHandle {
    state: Arc<ShutdownState>,
}

struct ShutdownState {
    requested: AtomicBool,
    conn: Mutex<Option<TcpStream>>,
}

impl ShutdownHandle {
    fn new() -> ShutdownHandle {
        ShutdownHandle {
            state: Arc::new(ShutdownState {
                requested: AtomicBool::new(false),
                conn: Mutex::new(None),
            }),
        }
    }

    pub fn shutdown(&self) {
        self.state.requested.store(true, Ordering::Relaxed);
        if let Some(stream) = self.state.conn.lock().as_ref() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    pub fn is_requested(&self) -> bool {
        self.state.requested.load(Ordering::Relaxed)
    }

    fn register(&self, stream: &TcpStream) {
        *self.state.conn.lock() = stream.try_clone().ok();
    }
}

/// Bound listener plus everything needed to run one connection to completion.
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    reporter: Reporter,
    sink: Option<ReportSink>,
    shutdown: ShutdownHandle,
}

impl Server {
    /// Bind with address reuse and start listening; reporting goes to stdout.
    pub fn bind(config: ServerConfig) -> io::Result<Server> {
        let (reporter, sink) = Reporter::stdout();
        let mut server = Server::bind_with_reporter(config, reporter)?;
        server.sink = Some(sink);
        Ok(server)
    }

    /// Same as [`Server::bind`] with a caller-supplied reporter; the caller
    /// keeps the sink and joins it after `run` returns.
    pub fn bind_with_reporter(config: ServerConfig, reporter: Reporter) -> io::Result<Server> {
        let listener = TcpListener::bind(("0.0.0.0", config.port))?;
        Ok(Server {
            listener,
            config,
            reporter,
            sink: None,
            shutdown: ShutdownHandle::new(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Accept one connection and process it until the peer disconnects or the
    /// shutdown handle fires, then tear everything down in order.
    pub fn run(mut self) -> io::Result<()> {
        println!("INFO: Waiting for incoming connection...");
        let (stream, _peer) = self.listener.accept()?;
        self.shutdown.register(&stream);

        let result = handle_connection(stream, self.config, &self.reporter);

        // Dropping the reporter disconnects the printer; joining flushes it.
        drop(self.reporter);
        if let Some(sink) = self.sink.take() {
            sink.join();
        }
        result
    }
}

/// Producer loop with admission control.
///
/// Reads fixed-size records until end of stream. A zero-byte or failed read is
/// the normal disconnect signal, never an error. Each record is stamped on
/// receipt and either admitted to the queue or answered with an immediate
/// rejection when the queue is full.
pub fn handle_connection(
    stream: TcpStream,
    config: ServerConfig,
    reporter: &Reporter,
) -> io::Result<()> {
    let queue = Arc::new(BoundedQueue::with_capacity(config.queue_capacity));
    let sink: ResponseSink = Arc::new(Mutex::new(Box::new(stream.try_clone()?)));
    let pool = WorkerPool::spawn(config.workers, queue.clone(), sink.clone(), reporter.clone())?;

    let mut reader = stream.try_clone()?;
    let mut buf = [0u8; REQUEST_SIZE];
    // read_exact reports a clean disconnect as UnexpectedEof; both that and
    // any other read failure end the loop the same way.
    while reader.read_exact(&mut buf).is_ok() {
        let request = Request::decode(&buf);
        let receipt = Timestamp::now();

        match queue.enqueue(QueuedRequest::new(request, receipt)) {
            Ok(()) => {}
            Err(bounced) => {
                let rejected_at = Timestamp::now();
                let response = Response {
                    req_id: bounced.request.id,
                    status: Status::Rejected,
                };
                if let Err(err) = send_response(&sink, &response) {
                    reporter.info(format!(
                        "INFO: could not send rejection for R{}: {err}",
                        bounced.request.id
                    ));
                }
                reporter.rejected(&bounced.request, rejected_at);
                reporter.snapshot(&queue.snapshot_ids());
            }
        }
    }

    reporter.info("INFO: Asserting termination flag for worker threads...");
    queue.close();
    pool.join();
    reporter.info("INFO: Client disconnected.");

    let _ = stream.shutdown(Shutdown::Both);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_flags_and_positional_port() {
        let config = ServerConfig::from_args(args(&["-q", "10", "-w", "4", "2222"])).unwrap();
        assert_eq!(
            config,
            ServerConfig {
                port: 2222,
                queue_capacity: 10,
                workers: 4,
            }
        );
    }

    #[test]
    fn flag_order_does_not_matter() {
        let config = ServerConfig::from_args(args(&["2222", "-w", "1", "-q", "3"])).unwrap();
        assert_eq!(config.queue_capacity, 3);
        assert_eq!(config.workers, 1);
        assert_eq!(config.port, 2222);
    }

    #[test]
    fn rejects_missing_arguments() {
        assert!(ServerConfig::from_args(args(&[])).is_err());
        assert!(ServerConfig::from_args(args(&["2222"])).is_err());
        assert!(ServerConfig::from_args(args(&["-q", "10", "2222"])).is_err());
        assert!(ServerConfig::from_args(args(&["-q", "10", "-w", "2"])).is_err());
    }

    #[test]
    fn rejects_non_positive_sizes() {
        assert!(ServerConfig::from_args(args(&["-q", "0", "-w", "2", "2222"])).is_err());
        assert!(ServerConfig::from_args(args(&["-q", "5", "-w", "0", "2222"])).is_err());
        assert!(ServerConfig::from_args(args(&["-q", "-3", "-w", "2", "2222"])).is_err());
    }

    #[test]
    fn rejects_invalid_port() {
        assert!(ServerConfig::from_args(args(&["-q", "5", "-w", "2", "notaport"])).is_err());
        assert!(ServerConfig::from_args(args(&["-q", "5", "-w", "2", "70000"])).is_err());
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(ServerConfig::from_args(args(&["-q", "5", "-w", "2", "2222", "extra"])).is_err());
    }

    #[test]
    fn shutdown_handle_flags_request() {
        let handle = ShutdownHandle::new();
        assert!(!handle.is_requested());
        handle.shutdown();
        assert!(handle.is_requested());
    }
}
