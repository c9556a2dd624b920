use std::error::Error as StdError;
use thiserror::Error;

/// Possible errors when throttling requests with `pacer_lib`
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The `reqwest` transport failed to complete the request
    #[error("Network error while sending request")]
    NetworkRequest(#[source] reqwest::Error),

    /// A custom [`Transport`](crate::Transport) failed to complete the request
    #[error("Transport failed: {0}")]
    Transport(#[source] Box<dyn StdError + Send + Sync>),

    /// The `reqwest` client could not be created
    #[error("Error creating request client: {0}")]
    BuildClient(#[source] reqwest::Error),

    /// The task delivering the result went away before the transport settled
    #[error("Request was dropped before the transport settled")]
    DispatchAborted,

    /// An URL with an invalid host was found
    #[error("URL is missing a host")]
    InvalidUrlHost,

    /// A throttle was configured without any capacity
    #[error("Throttle `{name}` must allow at least one concurrent request")]
    ZeroConcurrency {
        /// Name of the offending throttle
        name: String,
    },

    /// A throttle was configured without any host to apply to
    #[error("Throttle `{name}` must apply to at least one host")]
    EmptyHostList {
        /// Name of the offending throttle
        name: String,
    },

    /// A throttle was configured to sweep its queue without pausing
    #[error("Throttle `{name}` has a sweep interval of zero")]
    ZeroSweepInterval {
        /// Name of the offending throttle
        name: String,
    },
}

impl ErrorKind {
    /// Wrap an arbitrary error raised by a custom transport
    pub fn transport<E>(error: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Self::Transport(error.into())
    }

    /// Returns `true` if the error was produced while sending the request,
    /// as opposed to a configuration problem.
    #[must_use]
    pub const fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            Self::NetworkRequest(_) | Self::Transport(_) | Self::DispatchAborted
        )
    }
}
