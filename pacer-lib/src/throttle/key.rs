use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::ErrorKind;
use crate::types::Result;

/// A type-safe representation of a hostname for throttling purposes.
///
/// Hostnames are normalized to lowercase so that `API.GITHUB.COM` and
/// `api.github.com` end up in the same throttle. Ports are not part of the
/// key; `example.com:8080` and `example.com` share a throttle.
///
/// # Examples
///
/// ```
/// use pacer_lib::HostKey;
/// use url::Url;
///
/// let url = Url::parse("https://api.github.com/repos/user/repo").unwrap();
/// let host_key = HostKey::try_from(&url).unwrap();
/// assert_eq!(host_key.as_str(), "api.github.com");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct HostKey(String);

impl HostKey {
    /// Get the hostname as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the hostname as an owned String
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<&Url> for HostKey {
    type Error = ErrorKind;

    fn try_from(url: &Url) -> Result<Self> {
        let host = url.host_str().ok_or(ErrorKind::InvalidUrlHost)?;
        Ok(HostKey::from(host))
    }
}

impl TryFrom<&reqwest::Request> for HostKey {
    type Error = ErrorKind;

    fn try_from(request: &reqwest::Request) -> Result<Self> {
        Self::try_from(request.url())
    }
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for HostKey {
    fn from(host: String) -> Self {
        HostKey(host.to_lowercase())
    }
}

impl From<&str> for HostKey {
    fn from(host: &str) -> Self {
        HostKey(host.to_lowercase())
    }
}

impl From<HostKey> for String {
    fn from(key: HostKey) -> Self {
        key.0
    }
}
