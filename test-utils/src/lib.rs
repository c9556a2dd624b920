//! `test-utils` is used for testing in both `pacer-lib` and `pacer-bin`.
//! This crate does not depend on `pacer-lib` or `pacer-bin`, else we would get dependency cycles.
//! Macros are used instead, so that the importer is responsible for providing the dependencies.

/// Create a mock web server, which responds with a predefined status when
/// handling any request
#[macro_export]
macro_rules! mock_server {
    ($status:expr $(, $func:tt ($($arg:expr),*))*) => {{
        let mock_server = wiremock::MockServer::start().await;
        let response_template = wiremock::ResponseTemplate::new(http::StatusCode::from($status));
        let template = response_template$(.$func($($arg),*))*;
        wiremock::Mock::given(wiremock::matchers::any()).respond_with(template).mount(&mock_server).await;
        mock_server
    }};
}

/// Build a `reqwest::Request` from a method name and an URL
///
/// # Panic
///
/// This panics on invalid URLs, so it should only be used for testing
#[macro_export]
macro_rules! request {
    ($method:ident, $url:expr $(,)?) => {
        reqwest::Request::new(
            reqwest::Method::$method,
            reqwest::Url::parse(&$url).expect("Expected valid URL"),
        )
    };
}

/// Gets the "main" binary name (e.g. `pacer`)
#[macro_export]
macro_rules! main_command {
    () => {
        assert_cmd::Command::cargo_bin(env!("CARGO_PKG_NAME")).expect("Couldn't get cargo package name")
    };
}
