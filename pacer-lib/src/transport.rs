//! The seam between the scheduler and whatever actually performs requests.
//!
//! The scheduler never talks to the network itself. Every request that
//! leaves a [`Throttle`](crate::Throttle), and every request that matches no
//! throttle at all, goes through a [`Transport`].

use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Request, Response};

use crate::{ErrorKind, Result};

/// Performs a single request and reports its outcome.
///
/// `send` is called synchronously at the moment a request is handed off,
/// and the returned future is driven to completion on a separate task.
/// Implementations must therefore not block in `send`; all actual work
/// belongs in the returned future.
///
/// A transport may be called any number of times concurrently. Throttles
/// take care of bounding concurrency per host; the transport does not need
/// to.
pub trait Transport: Send + Sync + 'static {
    /// Hand `request` off and return a future resolving to its outcome.
    fn send(&self, request: Request) -> BoxFuture<'static, Result<Response>>;
}

impl Transport for Client {
    fn send(&self, request: Request) -> BoxFuture<'static, Result<Response>> {
        let response = self.execute(request);
        Box::pin(async move { response.await.map_err(ErrorKind::NetworkRequest) })
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, request: Request) -> BoxFuture<'static, Result<Response>> {
        (**self).send(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::get;
    use http::StatusCode;
    use wiremock::matchers::path;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_client_future_outlives_client() {
        let mock_server = MockServer::start().await;
        Mock::given(path("/handed-off"))
            .respond_with(ResponseTemplate::new(StatusCode::ACCEPTED))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = Client::new();
        let response = Transport::send(&client, get(&format!("{}/handed-off", mock_server.uri())));
        drop(client);

        assert_eq!(response.await.unwrap().status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_client_reports_network_errors() {
        let client = Client::new();
        let outcome = Transport::send(&client, get("http://127.0.0.1:1/")).await;

        assert!(matches!(outcome, Err(ErrorKind::NetworkRequest(_))));
    }
}
