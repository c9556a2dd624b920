use futures::{FutureExt, future};
use log::{debug, trace, warn};
use reqwest::Request;
use std::collections::HashSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::time::sleep;

use super::queue::{PendingQueue, PendingRequest, ResponseHandle};
use super::slots::SlotPool;
use super::{Admission, HostKey, ThrottleConfig, ThrottleStats};
use crate::{ErrorKind, Result, Transport};

/// Mutable state of a throttle. Only ever touched while holding the lock,
/// and the lock is never held across an `.await`.
#[derive(Debug)]
struct ThrottleState {
    pending: PendingQueue,
    slots: SlotPool,
    /// Set while a dispatch loop is active; at most one loop per throttle
    running: bool,
    stats: ThrottleStats,
}

/// Paces requests to a set of hosts.
///
/// A throttle owns a FIFO queue of pending requests and a fixed number of
/// dispatch slots. Requests are queued by [`Throttle::submit`]; a dispatch
/// loop then repeatedly claims free slots, hands the oldest queued requests
/// to the transport and, while requests remain, pauses for the sweep
/// interval before the next pass.
///
/// The first pass happens one batch interval after a request is queued, so
/// that a burst of requests is dispatched together instead of the first one
/// starting alone and the rest waiting for a full sweep interval.
pub struct Throttle {
    name: String,
    hosts: HashSet<HostKey>,
    admission: Admission,
    sweep_interval: Duration,
    batch_interval: Duration,
    transport: Arc<dyn Transport>,
    state: Mutex<ThrottleState>,
}

impl Throttle {
    /// Create a throttle from `config`, dispatching through `transport`
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration has no hosts, allows no
    /// concurrent requests or has a sweep interval of zero.
    pub fn new(config: ThrottleConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let admission = config.admission();
        Self::with_admission(config, admission, transport)
    }

    /// Create a throttle with a custom admission rule, ignoring
    /// `config.methods`
    ///
    /// # Errors
    ///
    /// See [`Throttle::new`].
    pub fn with_admission(
        config: ThrottleConfig,
        admission: Admission,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let name = config.display_name();
        if config.hosts.is_empty() {
            return Err(ErrorKind::EmptyHostList { name });
        }
        if config.max_concurrent_requests == 0 {
            return Err(ErrorKind::ZeroConcurrency { name });
        }
        if config.sweep_interval.is_zero() {
            return Err(ErrorKind::ZeroSweepInterval { name });
        }

        Ok(Self {
            name,
            hosts: config.hosts.into_iter().collect(),
            admission,
            sweep_interval: config.sweep_interval,
            batch_interval: config.batch_interval,
            transport,
            state: Mutex::new(ThrottleState {
                pending: PendingQueue::default(),
                slots: SlotPool::new(config.max_concurrent_requests),
                running: false,
                stats: ThrottleStats::default(),
            }),
        })
    }

    /// Name of the throttle as used in logs
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hosts this throttle applies to
    pub fn hosts(&self) -> impl Iterator<Item = &HostKey> {
        self.hosts.iter()
    }

    /// Whether requests to `host` may be subject to this throttle
    #[must_use]
    pub fn applies_to(&self, host: &HostKey) -> bool {
        self.hosts.contains(host)
    }

    /// Whether `request` is subject to this throttle: its host is covered
    /// and the admission rule accepts it
    #[must_use]
    pub fn matches(&self, request: &Request) -> bool {
        HostKey::try_from(request).is_ok_and(|host| self.applies_to(&host))
            && self.admits(request)
    }

    pub(crate) fn admits(&self, request: &Request) -> bool {
        self.admission.admits(request)
    }

    /// Maximum number of requests in flight at the same time
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.lock().slots.capacity()
    }

    /// Number of requests handed to the transport that have not settled
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.lock().slots.occupied()
    }

    /// Number of requests waiting for a free slot
    #[must_use]
    pub fn queued(&self) -> usize {
        self.lock().pending.len()
    }

    /// Whether a dispatch loop is currently active
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Snapshot of the statistics collected so far
    #[must_use]
    pub fn stats(&self) -> ThrottleStats {
        self.lock().stats.clone()
    }

    /// Queue `request` and return a handle resolving to its outcome.
    ///
    /// The request is not checked against [`Throttle::matches`]; callers
    /// that want matching go through [`crate::Throttler`]. A dispatch loop
    /// is armed after the batch interval on every submission; if one is
    /// already running, arming is a no-op.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn submit(self: &Arc<Self>, request: Request) -> ResponseHandle {
        let (pending, handle) = PendingRequest::new(request);
        {
            let mut state = self.lock();
            state.pending.push(pending);
            let queued = state.pending.len();
            state.stats.record_submission(queued);
            trace!("Throttle {} queued request, {} pending", self.name, queued);
        }

        let throttle = Arc::clone(self);
        tokio::spawn(async move {
            sleep(throttle.batch_interval).await;
            throttle.trigger().await;
        });

        handle
    }

    /// Run the dispatch loop until the queue is drained.
    ///
    /// Returns immediately if another loop is already active for this
    /// throttle.
    pub(crate) async fn trigger(self: Arc<Self>) {
        {
            let mut state = self.lock();
            // An empty queue means an earlier sweep already took care of
            // the request that armed this trigger
            if state.running || state.pending.is_empty() {
                return;
            }
            state.running = true;
            state.stats.runs += 1;
        }
        let mut flag = RunningFlag {
            throttle: &self,
            active: true,
        };
        debug!("Throttle {} starting dispatch loop", self.name);

        loop {
            let batch = self.claim_batch();
            let dispatched = batch.len();
            for (slot, pending) in batch {
                self.dispatch(slot, pending);
            }

            // The flag is cleared only after the hand-offs above, so a loop
            // started by a later submission cannot overtake this batch.
            let remaining = self.finish_sweep();
            debug!(
                "Throttle {} dispatched {} request(s), {} still queued",
                self.name, dispatched, remaining
            );
            if remaining == 0 {
                flag.active = false;
                break;
            }
            sleep(self.sweep_interval).await;
        }

        debug!("Throttle {} drained its queue", self.name);
    }

    /// Pair every free slot with the oldest pending request
    fn claim_batch(&self) -> Vec<(usize, PendingRequest)> {
        let mut state = self.lock();
        let mut batch = Vec::new();
        while !state.pending.is_empty() {
            let Some(slot) = state.slots.claim() else {
                break;
            };
            let Some(pending) = state.pending.pop() else {
                state.slots.release(slot);
                break;
            };
            trace!("Throttle {} claimed slot {}", self.name, slot);
            batch.push((slot, pending));
        }
        batch
    }

    /// Record the sweep and stop the loop if nothing is left to dispatch.
    /// Returns the number of requests still queued.
    fn finish_sweep(&self) -> usize {
        let mut state = self.lock();
        state.stats.sweeps += 1;
        let remaining = state.pending.len();
        if remaining == 0 {
            state.running = false;
        }
        remaining
    }

    /// Hand a request to the transport and settle it on a separate task
    fn dispatch(self: &Arc<Self>, slot: usize, pending: PendingRequest) {
        let (request, responder, queued_at) = pending.into_parts();
        let mut guard = SlotGuard::new(Arc::clone(self), slot);

        {
            let mut state = self.lock();
            let in_flight = state.slots.occupied();
            state.stats.record_dispatch(queued_at.elapsed(), in_flight);
        }

        let url = request.url().clone();
        let handoff = AssertUnwindSafe(|| self.transport.send(request));
        let response = match panic::catch_unwind(handoff) {
            Ok(response) => response,
            Err(_) => {
                warn!("Transport panicked while handing off {url}");
                future::ready(Err(ErrorKind::DispatchAborted)).boxed()
            }
        };
        tokio::spawn(async move {
            let outcome = response.await;
            if let Err(e) = &outcome {
                warn!("Throttled request to {url} failed: {e}");
            }
            guard.settle(outcome.is_ok());
            // Free the slot before the caller can observe the outcome
            drop(guard);
            if !responder.fulfill(outcome) {
                trace!("Outcome for {url} discarded, nobody is waiting for it");
            }
        });
    }

    fn lock(&self) -> MutexGuard<'_, ThrottleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Throttle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Throttle")
            .field("name", &self.name)
            .field("hosts", &self.hosts)
            .field("admission", &self.admission)
            .field("sweep_interval", &self.sweep_interval)
            .field("batch_interval", &self.batch_interval)
            .finish_non_exhaustive()
    }
}

/// Clears the running flag if the dispatch loop unwinds or is dropped
/// before it drained the queue, so that the next submission can start a
/// new loop.
struct RunningFlag<'a> {
    throttle: &'a Throttle,
    active: bool,
}

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        if self.active {
            self.throttle.lock().running = false;
        }
    }
}

/// Occupies a slot for as long as its request is in flight.
///
/// The slot is released when the guard is dropped, whether the transport
/// succeeded, failed or the settling task was torn down.
struct SlotGuard {
    throttle: Arc<Throttle>,
    slot: usize,
    success: Option<bool>,
    dispatched_at: Instant,
}

impl SlotGuard {
    fn new(throttle: Arc<Throttle>, slot: usize) -> Self {
        Self {
            throttle,
            slot,
            success: None,
            dispatched_at: Instant::now(),
        }
    }

    const fn settle(&mut self, success: bool) {
        self.success = Some(success);
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let mut state = self.throttle.lock();
        state.slots.release(self.slot);
        state.stats.record_outcome(self.success.unwrap_or(false));
        trace!(
            "Throttle {} released slot {} after {}ms",
            self.throttle.name,
            self.slot,
            self.dispatched_at.elapsed().as_millis()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_SWEEP_INTERVAL;
    use crate::test_utils::{MockTransport, get, request};
    use pretty_assertions::assert_eq;
    use reqwest::Method;

    const LATENCY: Duration = Duration::from_millis(50);

    fn throttle(max_concurrent_requests: usize, transport: &Arc<MockTransport>) -> Arc<Throttle> {
        let config = ThrottleConfig {
            max_concurrent_requests,
            ..ThrottleConfig::for_hosts(["example.com"])
        };
        Arc::new(Throttle::new(config, transport.clone()).unwrap())
    }

    fn submit_all(throttle: &Arc<Throttle>, count: usize) -> Vec<ResponseHandle> {
        (1..=count)
            .map(|i| throttle.submit(get(&format!("https://example.com/{i}"))))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_saturated_throttle_dispatches_in_order() {
        let transport = MockTransport::new(LATENCY);
        let throttle = throttle(2, &transport);
        let handles = submit_all(&throttle, 5);

        // Nothing leaves before the batch interval has passed
        sleep(Duration::from_millis(50)).await;
        assert!(transport.sent().is_empty());
        assert_eq!(throttle.queued(), 5);

        sleep(Duration::from_millis(70)).await;
        assert_eq!(transport.sent_paths(), ["/1", "/2"]);
        assert_eq!(throttle.queued(), 3);

        sleep(DEFAULT_SWEEP_INTERVAL).await;
        assert_eq!(transport.sent_paths(), ["/1", "/2", "/3", "/4"]);

        for handle in handles {
            assert!(handle.await.is_ok());
        }
        assert_eq!(transport.sent_paths(), ["/1", "/2", "/3", "/4", "/5"]);

        let stats = throttle.stats();
        assert_eq!(stats.runs, 1);
        assert_eq!(stats.sweeps, 3);
        assert_eq!(stats.peak_in_flight, 2);
        assert_eq!(stats.succeeded, 5);
        assert_eq!(transport.peak_in_flight(), 2);
        assert_eq!(throttle.in_flight(), 0);
        assert!(!throttle.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsaturated_throttle_dispatches_in_one_sweep() {
        let transport = MockTransport::new(LATENCY);
        let throttle = throttle(10, &transport);
        let handles = submit_all(&throttle, 3);

        sleep(Duration::from_millis(120)).await;
        assert_eq!(transport.sent_paths(), ["/1", "/2", "/3"]);
        assert_eq!(throttle.in_flight(), 3);

        for handle in handles {
            assert!(handle.await.is_ok());
        }
        let stats = throttle.stats();
        assert_eq!(stats.sweeps, 1);
        assert_eq!(stats.peak_in_flight, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_releases_slot() {
        let transport = MockTransport::failing(LATENCY, ["/2"]);
        let throttle = throttle(1, &transport);
        let handles = submit_all(&throttle, 5);

        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await);
        }

        assert!(matches!(outcomes[1], Err(ErrorKind::Transport(_))));
        for (i, outcome) in outcomes.iter().enumerate().filter(|(i, _)| *i != 1) {
            assert!(outcome.is_ok(), "request {} should succeed", i + 1);
        }
        assert_eq!(transport.sent_paths(), ["/1", "/2", "/3", "/4", "/5"]);

        let stats = throttle.stats();
        assert_eq!(stats.succeeded, 4);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.sweeps, 5);
        assert_eq!(transport.peak_in_flight(), 1);
        assert_eq!(throttle.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_triggers_run_one_loop() {
        let transport = MockTransport::new(LATENCY);
        let throttle = throttle(1, &transport);
        let handles = submit_all(&throttle, 3);

        for _ in 0..10 {
            tokio::spawn(Arc::clone(&throttle).trigger());
        }
        for handle in handles {
            assert!(handle.await.is_ok());
        }

        let stats = throttle.stats();
        assert_eq!(stats.runs, 1);
        assert_eq!(stats.sweeps, 3);
        assert_eq!(transport.peak_in_flight(), 1);
        assert_eq!(transport.sent_paths(), ["/1", "/2", "/3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_rearms_after_draining() {
        let transport = MockTransport::new(LATENCY);
        let throttle = throttle(1, &transport);

        assert!(throttle.submit(get("https://example.com/1")).await.is_ok());
        assert!(!throttle.is_running());

        sleep(Duration::from_secs(5)).await;
        assert!(throttle.submit(get("https://example.com/2")).await.is_ok());

        assert_eq!(throttle.stats().runs, 2);
        assert_eq!(transport.sent_paths(), ["/1", "/2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_on_empty_queue_stops() {
        let transport = MockTransport::new(LATENCY);
        let throttle = throttle(1, &transport);

        Arc::clone(&throttle).trigger().await;

        let stats = throttle.stats();
        assert_eq!(stats.runs, 0);
        assert_eq!(stats.sweeps, 0);
        assert_eq!(stats.dispatched, 0);
        assert_eq!(throttle.in_flight(), 0);
        assert!(!throttle.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_drained_in_one_sweep_counts_one_run() {
        let transport = MockTransport::new(LATENCY);
        let throttle = throttle(10, &transport);
        let handles = submit_all(&throttle, 3);

        // Every submission armed its own trigger; only the first finds work
        sleep(Duration::from_secs(2)).await;
        for handle in handles {
            assert!(handle.await.is_ok());
        }

        let stats = throttle.stats();
        assert_eq!(stats.runs, 1);
        assert_eq!(stats.sweeps, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_while_handing_off_aborts_only_that_request() {
        let transport = MockTransport::panicking(LATENCY, ["/1"], []);
        let throttle = throttle(1, &transport);
        let handles = submit_all(&throttle, 3);

        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await);
        }

        assert!(matches!(outcomes[0], Err(ErrorKind::DispatchAborted)));
        assert!(outcomes[1].is_ok());
        assert!(outcomes[2].is_ok());
        assert_eq!(transport.sent_paths(), ["/2", "/3"]);
        assert_eq!(throttle.in_flight(), 0);
        assert!(!throttle.is_running());

        // The throttle keeps serving later submissions
        assert!(throttle.submit(get("https://example.com/4")).await.is_ok());
        let stats = throttle.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.succeeded, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_in_flight_aborts_request_and_frees_slot() {
        let transport = MockTransport::panicking(LATENCY, [], ["/1"]);
        let throttle = throttle(1, &transport);
        let handles = submit_all(&throttle, 2);

        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await);
        }

        assert!(matches!(outcomes[0], Err(ErrorKind::DispatchAborted)));
        assert!(outcomes[1].is_ok());
        assert_eq!(throttle.in_flight(), 0);
        assert!(!throttle.is_running());
        let stats = throttle.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.succeeded, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_is_still_dispatched() {
        let transport = MockTransport::new(LATENCY);
        let throttle = throttle(1, &transport);

        drop(throttle.submit(get("https://example.com/fire-and-forget")));
        sleep(Duration::from_millis(200)).await;

        assert_eq!(transport.sent_paths(), ["/fire-and-forget"]);
        assert_eq!(throttle.stats().succeeded, 1);
        assert_eq!(throttle.in_flight(), 0);
    }

    #[test]
    fn test_matches_host_and_admission() {
        let transport = MockTransport::new(LATENCY);
        let throttle = throttle(1, &transport);

        assert!(throttle.matches(&get("https://EXAMPLE.com/a")));
        assert!(throttle.matches(&request(Method::DELETE, "https://example.com/a")));
        assert!(!throttle.matches(&request(Method::HEAD, "https://example.com/a")));
        assert!(!throttle.matches(&get("https://www.example.com/a")));
    }

    #[test]
    fn test_invalid_configurations() {
        let transport = MockTransport::new(LATENCY);

        let result = Throttle::new(ThrottleConfig::default(), transport.clone());
        assert!(matches!(result, Err(ErrorKind::EmptyHostList { .. })));

        let config = ThrottleConfig {
            max_concurrent_requests: 0,
            ..ThrottleConfig::for_hosts(["example.com"])
        };
        let result = Throttle::new(config, transport.clone());
        assert!(matches!(result, Err(ErrorKind::ZeroConcurrency { name }) if name == "example.com"));

        let config = ThrottleConfig {
            sweep_interval: Duration::ZERO,
            ..ThrottleConfig::for_hosts(["example.com"])
        };
        let result = Throttle::new(config, transport);
        assert!(matches!(result, Err(ErrorKind::ZeroSweepInterval { .. })));
    }
}
