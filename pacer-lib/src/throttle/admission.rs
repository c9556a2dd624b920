use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use reqwest::{Method, Request};

/// Methods throttled when no other admission rule is configured.
pub const DEFAULT_THROTTLED_METHODS: [Method; 5] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::PATCH,
];

type Predicate = dyn Fn(&Request) -> bool + Send + Sync;

/// Decides whether a request to a throttled host is subject to the throttle.
///
/// Requests that are not admitted bypass the throttle, even if their host
/// matches. By default only [`DEFAULT_THROTTLED_METHODS`] are admitted, so
/// e.g. `HEAD` and `OPTIONS` requests go straight to the transport.
#[derive(Clone)]
pub enum Admission {
    /// Admit requests using one of the given methods
    Methods(HashSet<Method>),
    /// Admit requests for which the predicate returns `true`
    Custom(Arc<Predicate>),
}

impl Admission {
    /// Admit requests using one of `methods`
    pub fn methods<I>(methods: I) -> Self
    where
        I: IntoIterator<Item = Method>,
    {
        Self::Methods(methods.into_iter().collect())
    }

    /// Admit requests for which `predicate` returns `true`
    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(predicate))
    }

    /// Check whether `request` is subject to the throttle
    #[must_use]
    pub fn admits(&self, request: &Request) -> bool {
        match self {
            Self::Methods(methods) => methods.contains(request.method()),
            Self::Custom(predicate) => predicate(request),
        }
    }
}

impl Default for Admission {
    fn default() -> Self {
        Self::methods(DEFAULT_THROTTLED_METHODS)
    }
}

impl fmt::Debug for Admission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Methods(methods) => {
                let mut methods: Vec<_> = methods.iter().map(Method::as_str).collect();
                methods.sort_unstable();
                f.debug_tuple("Methods").field(&methods).finish()
            }
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
