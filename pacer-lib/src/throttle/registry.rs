use reqwest::Request;
use std::sync::{Arc, PoisonError, RwLock};

use super::{HostKey, Throttle};

/// Ordered collection of throttles.
///
/// When several throttles could apply to a request, the one registered first
/// wins and later ones are not consulted. Throttles can be added while
/// requests are being matched; every lookup sees either all or none of a
/// registration.
#[derive(Debug, Default)]
pub struct ThrottleRegistry {
    throttles: RwLock<Vec<Arc<Throttle>>>,
}

impl ThrottleRegistry {
    /// Create a registry from throttles in priority order
    #[must_use]
    pub fn new(throttles: Vec<Arc<Throttle>>) -> Self {
        Self {
            throttles: RwLock::new(throttles),
        }
    }

    /// Append `throttle` after all throttles registered so far
    pub fn register(&self, throttle: Arc<Throttle>) {
        self.throttles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(throttle);
    }

    /// Find the throttle responsible for `request`, if any.
    ///
    /// Returns `None` for requests without a host, and for requests that
    /// no throttle admits. Those should be passed through untouched.
    #[must_use]
    pub fn find(&self, request: &Request) -> Option<Arc<Throttle>> {
        let host = HostKey::try_from(request).ok()?;
        self.throttles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|throttle| throttle.applies_to(&host) && throttle.admits(request))
            .cloned()
    }

    /// All registered throttles in priority order
    #[must_use]
    pub fn throttles(&self) -> Vec<Arc<Throttle>> {
        self.throttles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of registered throttles
    #[must_use]
    pub fn len(&self) -> usize {
        self.throttles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if no throttle is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
