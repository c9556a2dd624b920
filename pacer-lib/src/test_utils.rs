use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::{Method, Request, Response};

use crate::{ErrorKind, Result, Transport};

/// Helper to build a request
///
/// # Panic
///
/// This panics on invalid URLs, so it should only be used for testing
pub(crate) fn request(method: Method, url: &str) -> Request {
    Request::new(method, url.parse().expect("Expected valid URL"))
}

/// Shorthand for a `GET` request
pub(crate) fn get(url: &str) -> Request {
    request(Method::GET, url)
}

#[derive(Debug, Default)]
struct Counters {
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// A transport that records hand-offs and answers after a fixed latency.
///
/// Requests whose path is listed in `failing` settle with an error. Paths in
/// `panic_on_send` make `send` itself panic, paths in `panic_in_flight` make
/// the returned future panic once the latency has passed.
#[derive(Debug, Default)]
pub(crate) struct MockTransport {
    latency: Duration,
    failing: HashSet<String>,
    panic_on_send: HashSet<String>,
    panic_in_flight: HashSet<String>,
    sent: Mutex<Vec<String>>,
    counters: Arc<Counters>,
}

impl MockTransport {
    pub(crate) fn new(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency,
            ..Self::default()
        })
    }

    pub(crate) fn failing<I: IntoIterator<Item = &'static str>>(
        latency: Duration,
        paths: I,
    ) -> Arc<Self> {
        Arc::new(Self {
            latency,
            failing: paths.into_iter().map(String::from).collect(),
            ..Self::default()
        })
    }

    pub(crate) fn panicking<I, J>(latency: Duration, on_send: I, in_flight: J) -> Arc<Self>
    where
        I: IntoIterator<Item = &'static str>,
        J: IntoIterator<Item = &'static str>,
    {
        Arc::new(Self {
            latency,
            panic_on_send: on_send.into_iter().map(String::from).collect(),
            panic_in_flight: in_flight.into_iter().map(String::from).collect(),
            ..Self::default()
        })
    }

    /// URLs in the order they were handed to the transport
    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// Paths in the order they were handed to the transport
    pub(crate) fn sent_paths(&self) -> Vec<String> {
        self.sent()
            .iter()
            .map(|url| url.parse::<url::Url>().unwrap().path().to_string())
            .collect()
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.counters.in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn peak_in_flight(&self) -> usize {
        self.counters.peak_in_flight.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    fn send(&self, request: Request) -> BoxFuture<'static, Result<Response>> {
        let path = request.url().path().to_string();
        assert!(
            !self.panic_on_send.contains(&path),
            "transport broke while handing off {path}"
        );
        self.sent.lock().unwrap().push(request.url().to_string());

        let counters = Arc::clone(&self.counters);
        let now = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let fail = self.failing.contains(&path);
        let explode = self.panic_in_flight.contains(&path);
        let latency = self.latency;
        Box::pin(async move {
            tokio::time::sleep(latency).await;
            counters.in_flight.fetch_sub(1, Ordering::SeqCst);
            assert!(!explode, "transport broke while {path} was in flight");
            if fail {
                Err(ErrorKind::transport("connection reset by peer"))
            } else {
                Ok(Response::from(http::Response::new(String::new())))
            }
        })
    }
}
