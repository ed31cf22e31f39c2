use std::{
    fmt::Display,
    io::{self, Read},
    net::SocketAddr,
    sync::{
        Arc, Condvar, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, Sender, TryRecvError},
    },
    thread,
    time::Duration,
};

use log::{debug, error, info, warn};
use rouille::{Request, Response};
use thiserror::Error;

use crate::{
    config::HttpConfig,
    http::{api::Api, error::ApiError, signal::SignalWatcher},
};

/// How often the serving loop checks for a shutdown request
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to listen on {addr}: {reason}")]
    Bind { addr: String, reason: String },

    #[error("failed to accept connections: {0}")]
    Accept(#[source] io::Error),

    #[error("failed to watch for shutdown signals: {0}")]
    SignalWatcher(#[source] io::Error),

    #[error("{pending} request(s) still running {timeout:?} after shutdown began")]
    ShutdownTimeout { pending: usize, timeout: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Signal(&'static str),
    Requested,
}

impl Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownReason::Signal(name) => write!(f, "{name}"),
            ShutdownReason::Requested => write!(f, "shutdown requested"),
        }
    }
}

/// Asks a running server to shut down gracefully, like a signal would
#[derive(Debug, Clone)]
pub struct ShutdownHandle(Sender<ShutdownReason>);

impl ShutdownHandle {
    pub(crate) fn new(sender: Sender<ShutdownReason>) -> Self {
        Self(sender)
    }

    pub fn shutdown(&self) {
        self.send(ShutdownReason::Requested);
    }

    pub(crate) fn send(&self, reason: ShutdownReason) {
        // a closed channel means the server has already stopped
        let _ = self.0.send(reason);
    }
}

/// HTTP server that is configured but not yet listening
pub struct HttpServer {
    api: Api,
    pub config: HttpConfig,
    shutdown_tx: Sender<ShutdownReason>,
    shutdown_rx: Receiver<ShutdownReason>,
}

impl HttpServer {
    pub fn new(api: Api, config: HttpConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel();
        Self {
            api,
            config,
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle::new(self.shutdown_tx.clone())
    }

    /// Binds, serves and blocks until the server has shut down
    pub fn run(self) -> Result<(), ServerError> {
        self.bind()?.serve()
    }

    pub fn bind(self) -> Result<ListeningServer, ServerError> {
        let addr = self.config.addr();
        let bind_error = |reason: String| ServerError::Bind {
            addr: addr.clone(),
            reason,
        };

        let server = tiny_http::Server::http(&addr).map_err(|e| bind_error(e.to_string()))?;
        let local_addr = server
            .server_addr()
            .to_ip()
            .ok_or_else(|| bind_error("not an IP socket".to_string()))?;
        info!("HTTP server listening on http://{local_addr}");

        Ok(ListeningServer {
            server,
            local_addr,
            api: Arc::new(self.api),
            in_flight: Arc::new(InFlight::default()),
            shutdown_timeout: self.config.shutdown_timeout(),
            shutdown_tx: self.shutdown_tx,
            shutdown_rx: self.shutdown_rx,
        })
    }
}

/// HTTP server with a bound listener
pub struct ListeningServer {
    server: tiny_http::Server,
    local_addr: SocketAddr,
    api: Arc<Api>,
    in_flight: Arc<InFlight>,
    shutdown_timeout: Duration,
    shutdown_tx: Sender<ShutdownReason>,
    shutdown_rx: Receiver<ShutdownReason>,
}

impl ListeningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves requests until SIGINT, SIGTERM or a [`ShutdownHandle`] asks
    /// to stop, then waits for in-flight requests.
    ///
    /// Requests already queued when shutdown begins are still answered.
    /// Requests still running when the shutdown timeout elapses get no
    /// response: their connection is dropped and the server returns
    /// [`ServerError::ShutdownTimeout`]. A failing listener stops the
    /// server with [`ServerError::Accept`].
    pub fn serve(self) -> Result<(), ServerError> {
        let watcher = SignalWatcher::spawn(ShutdownHandle::new(self.shutdown_tx.clone()))
            .map_err(ServerError::SignalWatcher)?;

        let served = self.accept_until_shutdown(|timeout| self.server.recv_timeout(timeout));
        drop(watcher);

        let reason = match served {
            Ok(reason) => reason,
            Err(e) => {
                error!("HTTP listener failed: {e}");
                self.in_flight.close();
                return Err(e);
            }
        };

        while let Ok(Some(request)) = self.server.try_recv() {
            self.dispatch(request);
        }
        drop(self.server);

        info!(
            "shutting down ({reason}), waiting up to {:?} for {} in-flight request(s)",
            self.shutdown_timeout,
            self.in_flight.count()
        );
        let pending = self.in_flight.wait_idle(self.shutdown_timeout);

        if pending > 0 {
            self.in_flight.close();
            warn!("closing HTTP server with {pending} request(s) still running");
            return Err(ServerError::ShutdownTimeout {
                pending,
                timeout: self.shutdown_timeout,
            });
        }

        info!("HTTP server stopped");
        Ok(())
    }

    fn accept_until_shutdown<F>(&self, mut recv: F) -> Result<ShutdownReason, ServerError>
    where
        F: FnMut(Duration) -> io::Result<Option<tiny_http::Request>>,
    {
        loop {
            match recv(POLL_INTERVAL) {
                Ok(Some(request)) => self.dispatch(request),
                Ok(None) => {}
                Err(e) => return Err(ServerError::Accept(e)),
            }

            match self.shutdown_rx.try_recv() {
                Ok(reason) => return Ok(reason),
                Err(TryRecvError::Empty) => continue,
                // cannot happen while `shutdown_tx` is alive
                Err(TryRecvError::Disconnected) => return Ok(ShutdownReason::Requested),
            }
        }
    }

    /// Handles `request` on its own thread
    fn dispatch(&self, request: tiny_http::Request) {
        let api = Arc::clone(&self.api);
        let in_flight = Arc::clone(&self.in_flight);
        let guard = InFlight::enter(&in_flight);

        let spawned = thread::Builder::new()
            .name("http-request".to_string())
            .spawn(move || {
                let _guard = guard;
                respond(&api, &in_flight, request);
            });

        // the request is dropped with the closure, which answers it with a bare 500
        if let Err(e) = spawned {
            error!("failed to spawn request thread: {e}");
        }
    }
}

fn respond(api: &Api, in_flight: &Arc<InFlight>, mut request: tiny_http::Request) {
    let response = match to_rouille_request(&mut request) {
        Ok(req) => api.handle_request(&req),
        Err(e) => {
            warn!("failed to read request body of {} {}: {e}", request.method(), request.url());
            ApiError::Internal.into_response()
        }
    };

    if in_flight.is_closed() {
        warn!("dropping response to {} {} after shutdown timeout", request.method(), request.url());
        // taking the writer without writing leaves the client with no response
        drop(request.into_writer());
        return;
    }

    if let Err(e) = request.respond(to_tiny_response(response, in_flight)) {
        debug!("failed to write response: {e}");
    }
}

fn to_rouille_request(request: &mut tiny_http::Request) -> io::Result<Request> {
    let mut body = Vec::new();
    request.as_reader().read_to_end(&mut body)?;

    let headers = request
        .headers()
        .iter()
        .map(|h| (h.field.to_string(), h.value.as_str().to_string()))
        .collect();
    let remote_addr = request
        .remote_addr()
        .copied()
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0)));

    Ok(Request::fake_http_from(
        remote_addr,
        request.method().as_str(),
        request.url(),
        headers,
        body,
    ))
}

fn to_tiny_response(
    response: Response,
    in_flight: &Arc<InFlight>,
) -> tiny_http::Response<ClosableBody> {
    let (reader, size) = response.data.into_reader_and_size();
    let body = ClosableBody {
        inner: reader,
        in_flight: Arc::clone(in_flight),
    };
    let mut out = tiny_http::Response::empty(response.status_code).with_data(body, size);

    for (key, value) in response.headers {
        // tiny_http computes the length itself
        if key.eq_ignore_ascii_case("Content-Length") {
            continue;
        }
        match tiny_http::Header::from_bytes(key.as_bytes(), value.as_bytes()) {
            Ok(header) => out.add_header(header),
            Err(()) => warn!("dropping invalid response header {key}"),
        }
    }
    out
}

/// Counts requests that have not been answered yet
#[derive(Debug, Default)]
struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
    closed: AtomicBool,
}

impl InFlight {
    fn enter(this: &Arc<Self>) -> InFlightGuard {
        *this.lock() += 1;
        InFlightGuard(Arc::clone(this))
    }

    fn count(&self) -> usize {
        *self.lock()
    }

    /// Blocks until no request is in flight or `timeout` elapses; returns
    /// the number of requests still running.
    fn wait_idle(&self, timeout: Duration) -> usize {
        let (count, _) = self
            .idle
            .wait_timeout_while(self.lock(), timeout, |count| *count > 0)
            .unwrap_or_else(PoisonError::into_inner);
        *count
    }

    /// Makes every request still running give up on its response
    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    // The counter is only ever incremented or decremented, so it stays
    // meaningful even if a thread panicked while holding the lock.
    fn lock(&self) -> MutexGuard<'_, usize> {
        self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct InFlightGuard(Arc<InFlight>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        *self.0.lock() -= 1;
        self.0.idle.notify_all();
    }
}

/// Response body that stops the write once the server has been closed
struct ClosableBody {
    inner: Box<dyn Read + Send>,
    in_flight: Arc<InFlight>,
}

impl Read for ClosableBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.in_flight.is_closed() {
            return Err(io::Error::other("server closed"));
        }
        self.inner.read(buf)
    }
}
