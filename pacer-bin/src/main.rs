//! `pacer` sends HTTP requests through per-host throttles.
//!
//! Requests to a throttled host wait in a queue and are released in arrival
//! order, with at most `max_concurrent_requests` of them in flight. Requests
//! to other hosts are sent right away.
//!
//! Request two URLs while allowing only one request at a time to
//! `api.github.com`:
//!
//! ```sh
//! pacer --host api.github.com --max-concurrent-requests 1 \
//!     https://api.github.com/repos/rust-lang/rust \
//!     https://api.github.com/repos/tokio-rs/tokio
//! ```
//!
//! Read URLs from standard input:
//!
//! ```sh
//! cat urls.txt | pacer --input -
//! ```
//!
//! Throttles for several hosts are configured in `pacer.toml`:
//!
//! ```toml
//! [[throttle]]
//! hosts = ["api.github.com", "raw.githubusercontent.com"]
//! max_concurrent_requests = 4
//! sweep_interval = "2s"
//! ```
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

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Error, Result, bail};
use clap::Parser;
use futures::StreamExt;
use http::HeaderMap;
use log::{error, info};
use pacer_lib::ThrottlerBuilder;
use reqwest::{Request, Url};

mod input;
mod logging;
mod options;
mod response;
mod stats;
mod verbosity;

use crate::logging::init_logging;
use crate::options::{Config, HeaderMapExt, PACER_CONFIG_FILE, PacerOptions};
use crate::response::Outcome;
use crate::stats::format_stats;

/// A C-like enum that can be cast to `i32` and used as process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitCode {
    Success = 0,
    // NOTE: exit code 1 is used for any `Result::Err` bubbled up to `main()`
    // using the `?` operator.
    #[allow(unused)]
    UnexpectedFailure = 1,
    RequestFailure = 2,
    ConfigFile = 3,
}

fn main() -> Result<()> {
    // std::process::exit doesn't guarantee that all destructors will be run,
    // therefore we wrap the main code in another function to ensure that.
    let exit_code = run_main()?;
    std::process::exit(exit_code);
}

/// Merge all provided config options into one.
/// This includes a potential config file, command-line- and environment variables
fn load_config() -> Result<PacerOptions> {
    let mut opts = PacerOptions::parse();
    let merged = merge_config_file(&mut opts);

    // Logging depends on the merged verbosity, but has to be up before a
    // config error is reported
    init_logging(&opts.config.verbose);
    merged?;

    Ok(opts)
}

/// Fold the explicit config file, or the optional default one, into `opts`
fn merge_config_file(opts: &mut PacerOptions) -> Result<()> {
    if let Some(config_file) = &opts.config_file {
        match Config::load_from_file(config_file) {
            Ok(c) => opts.config.merge(c),
            Err(e) => {
                bail!(
                    "Cannot load configuration file `{}`: {e:?}",
                    config_file.display()
                );
            }
        }
    } else {
        // The default config file is optional, but must be valid if present
        let default_config = PathBuf::from(PACER_CONFIG_FILE);
        if default_config.is_file() {
            match Config::load_from_file(&default_config) {
                Ok(c) => opts.config.merge(c),
                Err(e) => {
                    bail!(
                        "Cannot load default configuration file `{}`: {e:?}",
                        default_config.display()
                    );
                }
            }
        }
    }
    Ok(())
}

/// Set up runtime and call the pacer entrypoint
fn run_main() -> Result<i32> {
    use std::process::exit;

    let opts = match load_config() {
        Ok(opts) => opts,
        Err(e) => {
            error!(
                "Error while loading config: {e}\n(pacer {})",
                env!("CARGO_PKG_VERSION")
            );
            exit(ExitCode::ConfigFile as i32);
        }
    };

    let runtime = match opts.config.threads {
        Some(threads) => {
            // We define our own runtime instead of the `tokio::main` attribute
            // since we want to make the number of threads configurable
            tokio::runtime::Builder::new_multi_thread()
                .worker_threads(threads)
                .enable_all()
                .build()?
        }
        None => tokio::runtime::Runtime::new()?,
    };

    match runtime.block_on(run(&opts)) {
        Err(e) if Some(io::ErrorKind::BrokenPipe) == underlying_io_error_kind(&e) => {
            exit(ExitCode::Success as i32);
        }
        res => res,
    }
}

/// Check if the given error can be traced back to an `io::ErrorKind`
fn underlying_io_error_kind(error: &Error) -> Option<io::ErrorKind> {
    for cause in error.chain() {
        if let Some(io_error) = cause.downcast_ref::<io::Error>() {
            return Some(io_error.kind());
        }
    }
    None
}

/// Send all URLs through the configured throttles and report the outcomes
async fn run(opts: &PacerOptions) -> Result<i32> {
    let config = &opts.config;
    let urls = opts.urls()?;
    let method = config.method()?;

    let throttler = ThrottlerBuilder::builder()
        .throttles(config.throttle_configs())
        .user_agent(config.user_agent.clone())
        .custom_headers(HeaderMap::from_header_pairs(&config.header)?)
        .timeout(config.timeout)
        .build()
        .throttler()
        .context("Cannot set up throttles")?;

    for throttle in throttler.throttles() {
        info!(
            "Throttling {} with {} slots",
            throttle.name(),
            throttle.capacity()
        );
    }

    // `buffered` keeps the input order while up to `max_concurrency` URLs are
    // queued or in flight at the same time
    let mut outcomes = futures::stream::iter(urls)
        .map(|raw| {
            let throttler = throttler.clone();
            let method = method.clone();
            async move {
                match Url::parse(&raw) {
                    Ok(url) => Outcome::new(raw, throttler.execute(Request::new(method, url)).await),
                    Err(e) => Outcome::invalid(raw, e),
                }
            }
        })
        .buffered(config.max_concurrency.max(1));

    let mut stdout = io::stdout().lock();
    let mut failed = false;
    while let Some(outcome) = outcomes.next().await {
        failed |= !outcome.is_success();
        writeln!(stdout, "{outcome}")?;
    }

    if config.stats {
        if let Some(report) = format_stats(&throttler.stats(), config.format)? {
            writeln!(stdout, "{report}")?;
        }
    }

    let exit_code = if failed {
        ExitCode::RequestFailure
    } else {
        ExitCode::Success
    };
    Ok(exit_code as i32)
}
