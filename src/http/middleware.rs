use std::{
    any::Any,
    fmt::Display,
    panic::{self, AssertUnwindSafe},
    sync::atomic::{AtomicU64, Ordering},
    time::Instant,
};

use log::{error, info};
use rouille::{Request, Response};

use crate::http::error::ApiError;

/// Identifies a request in log lines for the lifetime of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "req#{}", self.0)
    }
}

/// Hands out request IDs, starting at 1.
///
/// Owned by the API instance rather than being a global, so independent
/// servers (and tests) get independent sequences.
#[derive(Debug, Default)]
pub struct RequestIds {
    last: AtomicU64,
}

impl RequestIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> RequestId {
        RequestId(self.last.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Logs the start and the outcome of a request
pub fn log_request<F>(id: RequestId, request: &Request, handler: F) -> Response
where
    F: FnOnce() -> Response,
{
    info!("[{id}] {} {}", request.method(), request.url());

    let started = Instant::now();
    let response = handler();

    info!(
        "[{id}] completed with {} in {:?}",
        response.status_code,
        started.elapsed()
    );
    response
}

/// Turns a panic in `handler` into a generic 500 response
pub fn recover_panics<F>(id: RequestId, handler: F) -> Response
where
    F: FnOnce() -> Response,
{
    panic::catch_unwind(AssertUnwindSafe(handler)).unwrap_or_else(|payload| {
        error!("[{id}] recovered from panic: {}", panic_message(&*payload));
        ApiError::Internal.into_response()
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic payload>"
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Arc, thread};

    use super::*;

    #[test]
    fn test_request_ids_start_at_one() {
        let ids = RequestIds::new();

        assert_eq!(ids.next(), RequestId(1));
        assert_eq!(ids.next(), RequestId(2));
    }

    #[test]
    fn test_request_ids_are_unique_across_threads() {
        let ids = Arc::new(RequestIds::new());

        let handles = (0..8)
            .map(|_| {
                let ids = Arc::clone(&ids);
                thread::spawn(move || (0..100).map(|_| ids.next()).collect::<Vec<_>>())
            })
            .collect::<Vec<_>>();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id.0), "duplicate id {id}");
            }
        }
        assert_eq!(seen.len(), 800);
    }

    #[test]
    fn test_independent_counters() {
        let a = RequestIds::new();
        let b = RequestIds::new();
        a.next();

        assert_eq!(b.next(), RequestId(1));
    }

    #[test]
    fn test_recover_panics_returns_500() {
        let response = recover_panics(RequestId(1), || panic!("boom"));

        assert_eq!(response.status_code, 500);
    }

    #[test]
    fn test_recover_panics_passes_response_through() {
        let response = recover_panics(RequestId(1), || Response::text("ok"));

        assert_eq!(response.status_code, 200);
    }

    #[test]
    fn test_log_request_returns_handler_response() {
        let request = Request::fake_http("GET", "/tracks", vec![], vec![]);

        let response = log_request(RequestId(3), &request, Response::empty_404);

        assert_eq!(response.status_code, 404);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*payload), "owned");

        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(&*payload), "<non-string panic payload>");
    }
}
