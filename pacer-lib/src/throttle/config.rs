use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, OneOrMany, serde_as};
use std::time::Duration;

use crate::throttle::{Admission, HostKey};

/// Default number of requests allowed in flight per throttle
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 10;

/// Default pause between two sweeps over a saturated throttle
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(1000);

/// Default delay before the first sweep, used to gather bursts
pub const DEFAULT_BATCH_INTERVAL: Duration = Duration::from_millis(100);

/// Configuration for a single throttle.
///
/// All hosts listed in one configuration share the same queue and the same
/// concurrency limit. In configuration files `hosts` may be a single string
/// or a list:
///
/// ```toml
/// [[throttle]]
/// hosts = ["api.github.com", "raw.githubusercontent.com"]
/// max_concurrent_requests = 4
/// sweep_interval = "2s"
/// batch_interval = "50ms"
/// methods = ["GET"]
/// ```
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThrottleConfig {
    /// Label used in logs and statistics; defaults to the first host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Hosts this throttle applies to
    #[serde_as(as = "OneOrMany<_>")]
    pub hosts: Vec<HostKey>,

    /// Methods subject to the throttle; defaults to
    /// [`DEFAULT_THROTTLED_METHODS`](crate::DEFAULT_THROTTLED_METHODS)
    #[serde_as(as = "Option<Vec<DisplayFromStr>>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub methods: Option<Vec<Method>>,

    /// Maximum number of requests in flight at the same time
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Pause between two sweeps while requests are still queued
    #[serde(default = "default_sweep_interval", with = "humantime_serde")]
    pub sweep_interval: Duration,

    /// Delay before the first sweep after a request is queued
    #[serde(default = "default_batch_interval", with = "humantime_serde")]
    pub batch_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            name: None,
            hosts: Vec::new(),
            methods: None,
            max_concurrent_requests: default_max_concurrent_requests(),
            sweep_interval: default_sweep_interval(),
            batch_interval: default_batch_interval(),
        }
    }
}

const fn default_max_concurrent_requests() -> usize {
    DEFAULT_MAX_CONCURRENT_REQUESTS
}

const fn default_sweep_interval() -> Duration {
    DEFAULT_SWEEP_INTERVAL
}

const fn default_batch_interval() -> Duration {
    DEFAULT_BATCH_INTERVAL
}

impl ThrottleConfig {
    /// Create a configuration with default limits for the given hosts
    ///
    /// # Examples
    ///
    /// ```
    /// use pacer_lib::ThrottleConfig;
    ///
    /// let config = ThrottleConfig::for_hosts(["api.github.com"]);
    /// assert_eq!(config.max_concurrent_requests, 10);
    /// ```
    #[must_use]
    pub fn for_hosts<I, H>(hosts: I) -> Self
    where
        I: IntoIterator<Item = H>,
        H: Into<HostKey>,
    {
        Self {
            hosts: hosts.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Name used for this throttle in logs and statistics
    #[must_use]
    pub fn display_name(&self) -> String {
        match (&self.name, self.hosts.first()) {
            (Some(name), _) => name.clone(),
            (None, Some(host)) => host.to_string(),
            (None, None) => String::from("<no hosts>"),
        }
    }

    /// The admission rule described by this configuration
    #[must_use]
    pub fn admission(&self) -> Admission {
        self.methods
            .clone()
            .map_or_else(Admission::default, Admission::methods)
    }
}
