//! Entry point for sending requests through throttles.
//!
//! This module defines two structs, [`Throttler`] and [`ThrottlerBuilder`].
//! `Throttler` decides for every outgoing request whether it is throttled or
//! passed straight through, and returns the transport's outcome either way.
//! `ThrottlerBuilder` builds a `Throttler` on top of a `reqwest` client.
#![allow(clippy::module_name_repetitions)]

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::HeaderMap;
use log::{debug, trace};
use reqwest::{Request, Response};
use typed_builder::TypedBuilder;

use crate::{
    Admission, ErrorKind, Result, Throttle, ThrottleConfig, ThrottleRegistry, ThrottleStats,
    Transport,
};

/// Default user agent, `pacer-<PKG_VERSION>`.
pub const DEFAULT_USER_AGENT: &str = concat!("pacer/", env!("CARGO_PKG_VERSION"));

/// Builder for a [`Throttler`] sending requests with `reqwest`.
///
/// # Examples
///
/// ```
/// use pacer_lib::{ThrottleConfig, ThrottlerBuilder};
///
/// # fn main() -> pacer_lib::Result<()> {
/// let throttler = ThrottlerBuilder::builder()
///     .throttles(vec![ThrottleConfig::for_hosts(["api.github.com"])])
///     .build()
///     .throttler()?;
/// assert_eq!(throttler.throttles().len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(TypedBuilder, Debug, Clone)]
#[builder(field_defaults(default, setter(into)))]
pub struct ThrottlerBuilder {
    /// Throttles in priority order. A request is handled by the first
    /// throttle that matches it.
    throttles: Vec<ThrottleConfig>,
    /// User-agent sent with every request.
    #[builder(default_code = "String::from(DEFAULT_USER_AGENT)")]
    user_agent: String,
    /// Headers sent with every request, throttled or not.
    custom_headers: HeaderMap,
    /// Response timeout per request.
    ///
    /// The timeout starts when the request is handed to the transport, so
    /// time spent waiting in a throttle's queue does not count.
    timeout: Option<Duration>,
}

impl Default for ThrottlerBuilder {
    #[inline]
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ThrottlerBuilder {
    /// Instantiates a [`Throttler`].
    ///
    /// # Errors
    ///
    /// Returns an `Err` if the `reqwest` client cannot be created or a
    /// throttle configuration is invalid.
    pub fn throttler(self) -> Result<Throttler> {
        let mut builder = reqwest::ClientBuilder::new()
            .user_agent(self.user_agent)
            .default_headers(self.custom_headers);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(ErrorKind::BuildClient)?;

        Throttler::with_throttles(client, self.throttles)
    }
}

/// Sends requests through matching throttles, or straight to the transport
/// if no throttle matches.
///
/// Cloning a `Throttler` is cheap; clones share throttles and transport.
#[derive(Clone)]
pub struct Throttler {
    registry: Arc<ThrottleRegistry>,
    transport: Arc<dyn Transport>,
}

impl Throttler {
    /// Create a throttler without any throttles; every request passes
    /// through until throttles are added
    pub fn new<T: Transport>(transport: T) -> Self {
        Self {
            registry: Arc::new(ThrottleRegistry::default()),
            transport: Arc::new(transport),
        }
    }

    /// Create a throttler with the given throttles in priority order
    ///
    /// # Errors
    ///
    /// Returns an `Err` if any of the configurations is invalid.
    pub fn with_throttles<T, I>(transport: T, configs: I) -> Result<Self>
    where
        T: Transport,
        I: IntoIterator<Item = ThrottleConfig>,
    {
        let throttler = Self::new(transport);
        for config in configs {
            throttler.add_throttle(config)?;
        }
        Ok(throttler)
    }

    /// Register a throttle after all existing ones
    ///
    /// # Errors
    ///
    /// Returns an `Err` if the configuration is invalid.
    pub fn add_throttle(&self, config: ThrottleConfig) -> Result<Arc<Throttle>> {
        let throttle = Throttle::new(config, Arc::clone(&self.transport))?;
        Ok(self.register(throttle))
    }

    /// Register a throttle with a custom admission rule after all existing
    /// ones
    ///
    /// # Errors
    ///
    /// Returns an `Err` if the configuration is invalid.
    pub fn add_throttle_with(
        &self,
        config: ThrottleConfig,
        admission: Admission,
    ) -> Result<Arc<Throttle>> {
        let throttle = Throttle::with_admission(config, admission, Arc::clone(&self.transport))?;
        Ok(self.register(throttle))
    }

    fn register(&self, throttle: Throttle) -> Arc<Throttle> {
        let throttle = Arc::new(throttle);
        debug!(
            "Registered throttle {} with {} slot(s)",
            throttle.name(),
            throttle.capacity()
        );
        self.registry.register(Arc::clone(&throttle));
        throttle
    }

    /// The throttle `request` would be queued on, if any
    #[must_use]
    pub fn throttle_for(&self, request: &Request) -> Option<Arc<Throttle>> {
        self.registry.find(request)
    }

    /// Send `request`, queueing it on the first matching throttle.
    ///
    /// Requests that match no throttle are handed to the transport right
    /// away. Either way the transport's outcome is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns whatever error the transport reports for this request, or
    /// [`ErrorKind::DispatchAborted`] if the request was lost while in
    /// flight.
    pub async fn execute(&self, request: Request) -> Result<Response> {
        match self.registry.find(&request) {
            Some(throttle) => {
                trace!("Queueing {} on throttle {}", request.url(), throttle.name());
                throttle.submit(request).await
            }
            None => {
                trace!("Passing {} through", request.url());
                self.transport.send(request).await
            }
        }
    }

    /// All throttles in priority order
    #[must_use]
    pub fn throttles(&self) -> Vec<Arc<Throttle>> {
        self.registry.throttles()
    }

    /// Statistics of every throttle, keyed by throttle name, in priority
    /// order
    #[must_use]
    pub fn stats(&self) -> Vec<(String, ThrottleStats)> {
        self.throttles()
            .iter()
            .map(|throttle| (throttle.name().to_string(), throttle.stats()))
            .collect()
    }
}

impl fmt::Debug for Throttler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Throttler")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
