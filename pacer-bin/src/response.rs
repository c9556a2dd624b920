use std::error::Error;
use std::fmt::{self, Display};

use reqwest::{Response, StatusCode};

/// What happened to a single URL, as printed on stdout
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Outcome {
    url: String,
    status: Result<StatusCode, String>,
}

impl Outcome {
    pub(crate) fn new(url: impl Into<String>, result: pacer_lib::Result<Response>) -> Self {
        Self {
            url: url.into(),
            status: result.map(|r| r.status()).map_err(|e| reason(&e)),
        }
    }

    /// The URL could not be turned into a request
    pub(crate) fn invalid(url: impl Into<String>, reason: impl Display) -> Self {
        Self {
            url: url.into(),
            status: Err(format!("Invalid URL: {reason}")),
        }
    }

    /// `true` for responses with a 2xx status
    pub(crate) fn is_success(&self) -> bool {
        self.status.as_ref().is_ok_and(StatusCode::is_success)
    }
}

/// The error message followed by its underlying cause, if any
fn reason(error: &pacer_lib::ErrorKind) -> String {
    let message = error.to_string();
    match error.source().map(ToString::to_string) {
        Some(source) if !message.contains(&source) => format!("{message}: {source}"),
        _ => message,
    }
}

impl Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            Ok(status) => write!(f, "[{}] {}", status.as_u16(), self.url),
            Err(reason) => write!(f, "[ERROR] {} | {reason}", self.url),
        }
    }
}
