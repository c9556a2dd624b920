//! `pacer` keeps HTTP clients from overwhelming slow or rate-limited hosts.
//!
//! Requests to a throttled host are queued and released in arrival order,
//! with at most a fixed number of them in flight at once. Requests to any
//! other host are sent right away. No request is ever dropped: each caller
//! gets exactly the outcome the transport produced for its request.
//!
//! ```no_run
//! use pacer_lib::{Result, ThrottleConfig, ThrottlerBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!   let throttler = ThrottlerBuilder::builder()
//!       .throttles(vec![ThrottleConfig {
//!           max_concurrent_requests: 2,
//!           ..ThrottleConfig::for_hosts(["api.github.com"])
//!       }])
//!       .build()
//!       .throttler()?;
//!
//!   let request = reqwest::Request::new(
//!       reqwest::Method::GET,
//!       "https://api.github.com/repos/rust-lang/rust".parse().unwrap(),
//!   );
//!   let response = throttler.execute(request).await?;
//!   println!("{}", response.status());
//!   Ok(())
//! }
//! ```
//!
//! Any type implementing [`Transport`] can stand in for `reqwest`, see
//! [`Throttler::new`].
#![warn(clippy::all, clippy::pedantic)]
#![warn(
    absolute_paths_not_starting_with_crate,
    rustdoc::invalid_html_tags,
    missing_copy_implementations,
    missing_debug_implementations,
    semicolon_in_expressions_from_macros,
    unreachable_pub,
    unused_extern_crates,
    variant_size_differences,
    clippy::missing_const_for_fn
)]
#![deny(anonymous_parameters, macro_use_extern_crate)]
#![deny(missing_docs)]

mod throttler;
mod transport;
mod types;

pub mod throttle;

#[cfg(test)]
pub(crate) mod test_utils;

pub use crate::{
    throttle::{
        Admission, DEFAULT_BATCH_INTERVAL, DEFAULT_MAX_CONCURRENT_REQUESTS,
        DEFAULT_SWEEP_INTERVAL, DEFAULT_THROTTLED_METHODS, HostKey, ResponseHandle, Throttle,
        ThrottleConfig, ThrottleRegistry, ThrottleStats,
    },
    throttler::{DEFAULT_USER_AGENT, Throttler, ThrottlerBuilder},
    transport::Transport,
    types::{ErrorKind, Result},
};
