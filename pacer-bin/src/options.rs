use crate::input::UrlList;
use crate::stats::StatsFormat;
use crate::verbosity::Verbosity;
use anyhow::{Context, Error, Result, anyhow};
use clap::builder::PossibleValuesParser;
use clap::{Parser, builder::TypedValueParser};
use const_format::{concatcp, formatcp};
use http::{
    HeaderMap,
    header::{HeaderName, HeaderValue},
};
use pacer_lib::{
    DEFAULT_MAX_CONCURRENT_REQUESTS, DEFAULT_USER_AGENT, HostKey, ThrottleConfig,
};
use reqwest::Method;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::path::Path;
use std::{fs, path::PathBuf, str::FromStr, time::Duration};
use strum::VariantNames;

pub(crate) const PACER_CONFIG_FILE: &str = "pacer.toml";

const DEFAULT_METHOD: &str = "get";
const DEFAULT_MAX_CONCURRENCY: usize = 128;
const DEFAULT_SWEEP_INTERVAL: &str = "1s";
const DEFAULT_BATCH_INTERVAL: &str = "100ms";

// clap requires `&str` type values for defaults whereas serde expects owned
// values
const MAX_CONCURRENCY_STR: &str = concatcp!(DEFAULT_MAX_CONCURRENCY);
const MAX_CONCURRENT_REQUESTS_STR: &str = concatcp!(DEFAULT_MAX_CONCURRENT_REQUESTS);
// We show the default config file in the help text, but keep the argument
// optional so that a missing default file is not an error.
const HELP_MSG_CONFIG_FILE: &str = formatcp!(
    "Configuration file to use\n\n[default: {}]",
    PACER_CONFIG_FILE,
);

// Macro for generating default functions to be used by serde
macro_rules! default_function {
    ( $( $name:ident : $T:ty = $e:expr; )* ) => {
        $(
            #[allow(clippy::missing_const_for_fn)]
            fn $name() -> $T {
                $e
            }
        )*
    };
}

// Generate the functions for serde defaults
default_function! {
    max_concurrency: usize = DEFAULT_MAX_CONCURRENCY;
    max_concurrent_requests: usize = DEFAULT_MAX_CONCURRENT_REQUESTS;
    sweep_interval: Duration = pacer_lib::DEFAULT_SWEEP_INTERVAL;
    batch_interval: Duration = pacer_lib::DEFAULT_BATCH_INTERVAL;
    user_agent: String = DEFAULT_USER_AGENT.to_string();
    method: String = DEFAULT_METHOD.to_string();
    verbosity: Verbosity = Verbosity::default();
}

// Macro for merging configuration values
macro_rules! fold_in {
    ($cli:ident , $toml:ident ; $ty:ident { $(..$ignore:ident,)* $( $key:ident : $default:expr, )* } ) => {
        if (false) {
            #[allow(dead_code, unused, clippy::diverging_sub_expression)]
            let _check_fold_in_exhaustivity = $ty {
                $($key: unreachable!(), )*
                $($ignore: unreachable!(), )*
            };
        };
        $(
            if $cli.$key == $default && $toml.$key != $default {
                $cli.$key = $toml.$key;
            }
        )*
    };
}

/// Parse a single header into a [`HeaderName`] and [`HeaderValue`]
///
/// Headers are expected to be in format `Header-Name: Header-Value`.
/// The header name and value are trimmed of whitespace.
///
/// # Errors
///
/// This fails if the header does not contain a `:` character or
/// if the header name contains non-ASCII characters.
fn parse_single_header(header: &str) -> Result<(HeaderName, HeaderValue)> {
    let parts: Vec<&str> = header.splitn(2, ':').collect();
    match parts.as_slice() {
        [name, value] => {
            let name = name.trim();
            let name = HeaderName::from_str(name)
                .map_err(|e| anyhow!("Unable to convert header name '{name}': {e}"))?;
            let value = HeaderValue::from_str(value.trim())
                .map_err(|e| anyhow!("Unable to read value of header with name '{name}': {e}"))?;
            Ok((name, value))
        }
        _ => Err(anyhow!(
            "Invalid header format. Expected colon-separated string in the format 'HeaderName: HeaderValue'"
        )),
    }
}

/// Parses a single HTTP header into a tuple of (String, String)
#[derive(Clone, Debug)]
struct HeaderParser;

impl TypedValueParser for HeaderParser {
    type Value = (String, String);

    fn parse_ref(
        &self,
        _cmd: &clap::Command,
        _arg: Option<&clap::Arg>,
        value: &std::ffi::OsStr,
    ) -> Result<Self::Value, clap::Error> {
        let invalid_utf8 = || {
            clap::Error::raw(
                clap::error::ErrorKind::InvalidValue,
                "Header value contains invalid UTF-8",
            )
        };
        let header_str = value.to_str().ok_or_else(invalid_utf8)?;

        match parse_single_header(header_str) {
            Ok((name, value)) => {
                let value = value.to_str().map_err(|_| invalid_utf8())?;
                Ok((name.to_string(), value.to_string()))
            }
            Err(e) => Err(clap::Error::raw(
                clap::error::ErrorKind::InvalidValue,
                e.to_string(),
            )),
        }
    }
}

impl clap::builder::ValueParserFactory for HeaderParser {
    type Parser = HeaderParser;
    fn value_parser() -> Self::Parser {
        HeaderParser
    }
}

/// Extension trait for converting a Vec of header pairs to a `HeaderMap`
pub(crate) trait HeaderMapExt {
    /// Convert a collection of header key-value pairs to a `HeaderMap`
    fn from_header_pairs(headers: &[(String, String)]) -> Result<HeaderMap, Error>;
}

impl HeaderMapExt for HeaderMap {
    fn from_header_pairs(headers: &[(String, String)]) -> Result<HeaderMap, Error> {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| anyhow!("Invalid header name '{name}': {e}"))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| anyhow!("Invalid header value '{value}': {e}"))?;
            header_map.insert(header_name, header_value);
        }
        Ok(header_map)
    }
}

/// pacer sends HTTP requests through per-host throttles. Requests to a
/// throttled host are queued and released in arrival order, with a bounded
/// number of them in flight at any time.
///
/// pacer is powered by pacer-lib, which can be embedded into any
/// reqwest-based client.
#[derive(Parser, Debug)]
#[command(version, about, next_display_order = None)]
pub(crate) struct PacerOptions {
    /// URLs to request
    #[arg(
        name = "urls",
        required_unless_present = "input",
        long_help = "URLs to request, in the order given.

Alternatively, use `--input` to read URLs from a file or standard input.

NOTE: Use `--` to separate URLs from options that allow multiple arguments."
    )]
    raw_urls: Vec<String>,

    /// Configuration file to use
    #[arg(short, long = "config")]
    #[arg(help = HELP_MSG_CONFIG_FILE)]
    pub(crate) config_file: Option<PathBuf>,

    #[clap(flatten)]
    pub(crate) config: Config,
}

impl PacerOptions {
    /// All URLs to request, from the command line first and then from
    /// `--input`
    pub(crate) fn urls(&self) -> Result<Vec<String>> {
        let mut urls = self.raw_urls.clone();

        if let Some(input) = &self.config.input {
            let list = UrlList::try_from(input.as_path()).context("Cannot read URLs from --input")?;
            urls.extend(list.urls);
        }

        Ok(urls)
    }
}

// Custom deserializer function for the header field
fn deserialize_headers<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    let map = HashMap::<String, String>::deserialize(deserializer)?;
    Ok(map.into_iter().collect())
}

/// The main configuration for pacer
#[derive(Parser, Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub(crate) struct Config {
    /// Read URLs from the given file or stdin (if path is '-').
    #[arg(
        short,
        long,
        value_name = "PATH",
        long_help = "Read URLs from the given file or stdin (if path is '-').

File Format:
- Each line should contain one URL.
- Lines starting with '#' are treated as comments and ignored.
- Empty lines are also ignored."
    )]
    #[serde(default)]
    pub(crate) input: Option<PathBuf>,

    /// Verbose program output
    #[clap(flatten)]
    #[serde(default = "verbosity")]
    pub(crate) verbose: Verbosity,

    /// Throttle requests to this host (can be given multiple times)
    #[arg(
        long = "host",
        value_name = "HOST",
        action = clap::ArgAction::Append,
        long_help = "Throttle requests to this host (can be given multiple times)

All hosts given on the command line share one throttle, configured with
`--max-concurrent-requests`, `--sweep-interval` and `--batch-interval`.
This throttle takes precedence over the `[[throttle]]` tables of the
configuration file."
    )]
    #[serde(default)]
    pub(crate) host: Vec<String>,

    /// Maximum number of requests in flight per throttle given with `--host`
    #[arg(long, default_value = &MAX_CONCURRENT_REQUESTS_STR)]
    #[serde(default = "max_concurrent_requests")]
    pub(crate) max_concurrent_requests: usize,

    /// Pause between two sweeps while requests are queued, e.g. `500ms`
    #[arg(long, default_value = DEFAULT_SWEEP_INTERVAL, value_parser = humantime::parse_duration)]
    #[serde(default = "sweep_interval", with = "humantime_serde")]
    pub(crate) sweep_interval: Duration,

    /// Delay before the first sweep, used to gather bursts, e.g. `100ms`
    #[arg(long, default_value = DEFAULT_BATCH_INTERVAL, value_parser = humantime::parse_duration)]
    #[serde(default = "batch_interval", with = "humantime_serde")]
    pub(crate) batch_interval: Duration,

    /// Maximum number of URLs pacer works on at the same time, across all
    /// hosts
    #[arg(long, default_value = &MAX_CONCURRENCY_STR)]
    #[serde(default = "max_concurrency")]
    pub(crate) max_concurrency: usize,

    /// Number of threads to utilize.
    /// Defaults to number of cores available to the system
    #[arg(short = 'T', long, verbatim_doc_comment)]
    #[serde(default)]
    pub(crate) threads: Option<usize>,

    /// Request method
    // Using `-X` as a short param similar to curl
    #[arg(short = 'X', long, default_value = DEFAULT_METHOD)]
    #[serde(default = "method")]
    pub(crate) method: String,

    /// User agent
    #[arg(short, long, default_value = DEFAULT_USER_AGENT)]
    #[serde(default = "user_agent")]
    pub(crate) user_agent: String,

    /// Set custom header for requests
    #[arg(
        short = 'H',
        long,
        action = clap::ArgAction::Append,
        value_parser = HeaderParser,
        value_name = "HEADER:VALUE",
        long_help = "Set custom header for requests

You can specify custom headers in the format 'Name: Value'. For example, 'Accept: text/html'.
Multiple headers can be specified by using the flag multiple times.
The specified headers are used for ALL requests."
    )]
    #[serde(default)]
    #[serde(deserialize_with = "deserialize_headers")]
    pub(crate) header: Vec<(String, String)>,

    /// Response timeout per request, from hand-off to response, e.g. `20s`
    #[arg(short, long, value_parser = humantime::parse_duration)]
    #[serde(default, with = "humantime_serde")]
    pub(crate) timeout: Option<Duration>,

    /// Show per-throttle statistics at the end of the run
    #[arg(long)]
    #[serde(default)]
    pub(crate) stats: bool,

    /// Output format of the statistics
    #[arg(
        short,
        long,
        default_value = "compact",
        value_parser = PossibleValuesParser::new(StatsFormat::VARIANTS).map(|s| s.parse::<StatsFormat>().unwrap_or_default()),
    )]
    #[serde(default)]
    pub(crate) format: StatsFormat,

    /// Throttles from the configuration file
    #[arg(skip)]
    #[serde(default)]
    pub(crate) throttle: Vec<ThrottleConfig>,
}

impl Config {
    /// Special handling for merging headers
    ///
    /// Overwrites existing headers in `self` with the values from `other`.
    fn merge_headers(&mut self, other: &[(String, String)]) {
        let self_map = self.header.iter().cloned().collect::<HashMap<_, _>>();
        let other_map = other.iter().cloned().collect::<HashMap<_, _>>();

        // Merge the two maps, with `other` taking precedence
        let merged_map: HashMap<_, _> = self_map.into_iter().chain(other_map).collect();

        self.header = merged_map.into_iter().collect();
    }

    /// Load configuration from a file
    pub(crate) fn load_from_file(path: &Path) -> Result<Config> {
        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents).with_context(|| "Failed to parse configuration file")
    }

    /// Merge the configuration from TOML into the CLI configuration
    pub(crate) fn merge(&mut self, toml: Config) {
        self.merge_headers(&toml.header);

        // Throttle tables are only available in TOML
        self.throttle = toml.throttle;

        // NOTE: if you see an error within this macro call, check to make sure that
        // that the fields provided to fold_in! match all the fields of the Config struct.
        fold_in! {
            // Destination and source configs
            self, toml;

            Config {
                // Keys which are handled outside of fold_in
                ..header,
                ..throttle,

                // Keys with defaults to assign
                input: None,
                verbose: Verbosity::default(),
                host: Vec::<String>::new(),
                max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
                sweep_interval: pacer_lib::DEFAULT_SWEEP_INTERVAL,
                batch_interval: pacer_lib::DEFAULT_BATCH_INTERVAL,
                max_concurrency: DEFAULT_MAX_CONCURRENCY,
                threads: None,
                method: DEFAULT_METHOD,
                user_agent: DEFAULT_USER_AGENT,
                timeout: None,
                stats: false,
                format: StatsFormat::default(),
            }
        }
    }

    /// The request method, parsed case-insensitively
    pub(crate) fn method(&self) -> Result<Method> {
        Method::from_str(&self.method.to_uppercase())
            .with_context(|| format!("Invalid request method `{}`", self.method))
    }

    /// Throttles in priority order: the ad-hoc throttle built from `--host`
    /// first, then the `[[throttle]]` tables of the configuration file
    pub(crate) fn throttle_configs(&self) -> Vec<ThrottleConfig> {
        let mut configs = Vec::with_capacity(self.throttle.len() + 1);

        if !self.host.is_empty() {
            configs.push(ThrottleConfig {
                name: None,
                hosts: self.host.iter().map(|h| HostKey::from(h.as_str())).collect(),
                methods: None,
                max_concurrent_requests: self.max_concurrent_requests,
                sweep_interval: self.sweep_interval,
                batch_interval: self.batch_interval,
            });
        }

        configs.extend(self.throttle.iter().cloned());
        configs
    }
}
