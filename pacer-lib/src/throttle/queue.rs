use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use reqwest::{Request, Response};
use tokio::sync::oneshot;

use crate::{ErrorKind, Result};

/// A request waiting for a free slot, together with the channel its
/// outcome is delivered through.
#[derive(Debug)]
pub(crate) struct PendingRequest {
    request: Request,
    responder: Responder,
    queued_at: Instant,
}

impl PendingRequest {
    /// Wrap `request` and create the handle its submitter awaits
    pub(crate) fn new(request: Request) -> (Self, ResponseHandle) {
        let (tx, rx) = oneshot::channel();
        let pending = Self {
            request,
            responder: Responder(tx),
            queued_at: Instant::now(),
        };
        (pending, ResponseHandle(rx))
    }

    pub(crate) fn into_parts(self) -> (Request, Responder, Instant) {
        (self.request, self.responder, self.queued_at)
    }
}

/// Write end of a [`ResponseHandle`]. Consumed on use, so a result can only
/// be delivered once.
#[derive(Debug)]
pub(crate) struct Responder(oneshot::Sender<Result<Response>>);

impl Responder {
    /// Deliver the transport outcome to whoever submitted the request.
    ///
    /// Returns `false` if the submitter stopped waiting for it.
    pub(crate) fn fulfill(self, outcome: Result<Response>) -> bool {
        self.0.send(outcome).is_ok()
    }
}

/// Resolves to the outcome of a throttled request once the transport has
/// settled.
///
/// Dropping the handle does not cancel the request; it is still dispatched
/// and its outcome discarded.
#[derive(Debug)]
#[must_use = "the outcome of a throttled request is only available through its handle"]
pub struct ResponseHandle(oneshot::Receiver<Result<Response>>);

impl Future for ResponseHandle {
    type Output = Result<Response>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(ErrorKind::DispatchAborted)))
    }
}

/// Requests waiting for dispatch, oldest first.
#[derive(Debug, Default)]
pub(crate) struct PendingQueue(VecDeque<PendingRequest>);

impl PendingQueue {
    pub(crate) fn push(&mut self, pending: PendingRequest) {
        self.0.push_back(pending);
    }

    /// Remove the oldest pending request
    pub(crate) fn pop(&mut self) -> Option<PendingRequest> {
        self.0.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
