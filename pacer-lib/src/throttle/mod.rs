//! Per-host admission control and request pacing.
//!
//! # Architecture
//!
//! - [`HostKey`]: Normalized hostname a throttle applies to
//! - [`Admission`]: Decides which requests to a throttled host are throttled
//! - [`Throttle`]: Queue, dispatch slots and dispatch loop for a set of hosts
//! - [`ThrottleRegistry`]: Ordered throttles, matched first-come first-served
//! - [`ThrottleConfig`]: Configuration for a single throttle
//! - [`ThrottleStats`]: Statistics tracking for each throttle
//!
//! A request travels through a throttle as follows: it is appended to the
//! throttle's queue and a dispatch loop is armed after the batch interval.
//! The loop claims free slots in index order, hands the oldest queued
//! requests to the [`Transport`](crate::Transport) and pauses for the sweep
//! interval while requests remain. A slot is freed when its request
//! settles, successfully or not.
#![allow(clippy::module_inception)]

mod admission;
mod config;
mod key;
mod queue;
mod registry;
mod slots;
mod stats;
mod throttle;

pub use admission::{Admission, DEFAULT_THROTTLED_METHODS};
pub use config::{
    DEFAULT_BATCH_INTERVAL, DEFAULT_MAX_CONCURRENT_REQUESTS, DEFAULT_SWEEP_INTERVAL,
    ThrottleConfig,
};
pub use key::HostKey;
pub use queue::ResponseHandle;
pub use registry::ThrottleRegistry;
pub use stats::ThrottleStats;
pub use throttle::Throttle;
