//! HTTP client for the workshop REST backend.
//!
//! Every response goes through the same pipeline: bearer token injection,
//! transient-failure retry, envelope normalization, and central handling of
//! 401s and user-facing error notifications. Callers only ever see
//! normalized JSON or a typed [`ApiError`].

use std::{fmt, sync::Arc, time::Duration};

use backon::{ExponentialBuilder, Retryable};
use reqwest::{Client, Method, StatusCode};
use secrecy::ExposeSecret;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use url::Url;
use utils::envelope::{self, EnvelopeError};

use super::{
    config::{ClientConfig, ReferencePolicy},
    credential_store::{CredentialStore, CredentialStoreError},
    notification::{FALLBACK_ERROR_MESSAGE, Notifier, error_message},
    session::{self, AuthRedirect},
};

const MAX_RETRY_DELAY: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized: session expired")]
    Unauthorized,
    #[error("http {status}: {message}")]
    Http {
        status: u16,
        message: String,
        data: Option<Value>,
    },
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("request cancelled")]
    Cancelled,
    #[error("failed to decode response: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("malformed envelope: {0}")]
    Envelope(#[from] EnvelopeError),
    #[error("invalid request path {path}: {source}")]
    InvalidUrl {
        path: String,
        #[source]
        source: url::ParseError,
    },
    #[error("credential store error: {0}")]
    Credentials(#[from] CredentialStoreError),
}

impl ApiError {
    /// Returns true if the error is transient and should be retried.
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout => true,
            Self::Http { status, .. } => *status == 429 || (500..=599).contains(status),
            _ => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized => Some(StatusCode::UNAUTHORIZED.as_u16()),
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Normalized error body, when the backend sent one
    pub fn data(&self) -> Option<&Value> {
        match self {
            Self::Http { data, .. } => data.as_ref(),
            _ => None,
        }
    }
}

/// Per-request knobs
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub query: Vec<(String, String)>,
    pub cancel: Option<CancellationToken>,
    /// Raise a user-facing notification on failure
    pub notify_errors: bool,
    /// Send without a bearer token; a 401 is then an ordinary failure
    /// (bad credentials) instead of an expired session
    pub anonymous: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            query: Vec::new(),
            cancel: None,
            notify_errors: true,
            anonymous: false,
        }
    }
}

impl RequestOptions {
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn cancel_with(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Suppress the error notification, for background polling
    pub fn silent(mut self) -> Self {
        self.notify_errors = false;
        self
    }

    pub fn anonymous(mut self) -> Self {
        self.anonymous = true;
        self
    }
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    config: Arc<ClientConfig>,
    credentials: Arc<dyn CredentialStore>,
    notifier: Arc<dyn Notifier>,
    redirect: Arc<dyn AuthRedirect>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.config.base_url.as_str())
            .field("token_key", &self.config.token_key)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(
        config: ClientConfig,
        credentials: Arc<dyn CredentialStore>,
        notifier: Arc<dyn Notifier>,
        redirect: Arc<dyn AuthRedirect>,
    ) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("workshop-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            config: Arc::new(config),
            credentials,
            notifier,
            redirect,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn credentials(&self) -> &dyn CredentialStore {
        self.credentials.as_ref()
    }

    /// Send a request and return the normalized response body.
    ///
    /// A 2xx with an empty body yields `null`. Failures raise exactly one
    /// notification (unless `options.notify_errors` is off); a 401 ends the
    /// session instead. Neither changes the error returned to the caller.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        options: RequestOptions,
    ) -> Result<Value, ApiError> {
        let url = self
            .config
            .endpoint(path)
            .map_err(|source| ApiError::InvalidUrl {
                path: path.to_string(),
                source,
            })?;

        debug!(%method, %url, "sending request");

        let exchange = self.exchange(&method, &url, body, &options);
        let result = match &options.cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(ApiError::Cancelled),
                    result = exchange => result,
                }
            }
            None => exchange.await,
        };

        if let Err(e) = &result {
            self.report_failure(e, &method, &url, &options);
        }
        result
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        let value = self.request(Method::GET, path, None, options).await?;
        decode(path, value)
    }

    pub async fn post<B, T>(
        &self,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body).map_err(ApiError::Encode)?;
        let value = self.request(Method::POST, path, Some(&body), options).await?;
        decode(path, value)
    }

    pub async fn put<B, T>(
        &self,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body).map_err(ApiError::Encode)?;
        let value = self.request(Method::PUT, path, Some(&body), options).await?;
        decode(path, value)
    }

    pub async fn delete(&self, path: &str, options: RequestOptions) -> Result<(), ApiError> {
        self.request(Method::DELETE, path, None, options).await?;
        Ok(())
    }

    async fn exchange(
        &self,
        method: &Method,
        url: &Url,
        body: Option<&Value>,
        options: &RequestOptions,
    ) -> Result<Value, ApiError> {
        if self.config.max_retries == 0 || !is_idempotent(method) {
            return self.send_once(method, url, body, options).await;
        }

        (|| async move { self.send_once(method, url, body, options).await })
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(self.config.retry_min_delay)
                    .with_max_delay(MAX_RETRY_DELAY)
                    .with_max_times(self.config.max_retries)
                    .with_jitter(),
            )
            .when(ApiError::should_retry)
            .notify(|e, dur| {
                warn!(
                    %url,
                    "API call failed, retrying after {:.2}s: {}",
                    dur.as_secs_f64(),
                    e
                )
            })
            .await
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &Url,
        body: Option<&Value>,
        options: &RequestOptions,
    ) -> Result<Value, ApiError> {
        let mut request = self.http.request(method.clone(), url.clone());

        if !options.query.is_empty() {
            request = request.query(&options.query);
        }
        if !options.anonymous {
            if let Some(token) = self.credentials.load()? {
                request = request.bearer_auth(token.expose_secret());
            }
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let res = request.send().await.map_err(map_reqwest_error)?;
        let status = res.status();
        let bytes = res.bytes().await.map_err(map_reqwest_error)?;

        debug!(%url, status = status.as_u16(), bytes = bytes.len(), "received response");

        if status == StatusCode::UNAUTHORIZED && !options.anonymous {
            return Err(ApiError::Unauthorized);
        }

        if status.is_success() {
            return self.normalize_response(parse_body(&bytes).unwrap_or(Value::Null));
        }

        // Error bodies are only inspected for a message; never fail on them.
        // Plain text (proxy error pages) is kept as data but never shown.
        let json = parse_json(&bytes).map(envelope::normalize_owned);
        let message = error_message(json.as_ref());
        Err(ApiError::Http {
            status: status.as_u16(),
            message,
            data: json.or_else(|| parse_body(&bytes)),
        })
    }

    fn normalize_response(&self, raw: Value) -> Result<Value, ApiError> {
        let references = envelope::count_references(&raw);
        if references == 0 {
            return Ok(envelope::normalize_owned(raw));
        }

        match self.config.reference_policy {
            ReferencePolicy::Resolve => {
                let resolved = envelope::resolve_references(&raw).inspect_err(|e| {
                    error!(error = %e, references, "failed to resolve envelope references");
                })?;
                Ok(envelope::normalize_owned(resolved))
            }
            ReferencePolicy::PassThrough => {
                warn!(
                    references,
                    "response contains unresolved $ref nodes, passing them through"
                );
                Ok(envelope::normalize_owned(raw))
            }
        }
    }

    fn report_failure(
        &self,
        error: &ApiError,
        method: &Method,
        url: &Url,
        options: &RequestOptions,
    ) {
        match error {
            ApiError::Unauthorized => session::end_session(
                self.credentials.as_ref(),
                self.redirect.as_ref(),
                &self.config.login_route,
            ),
            ApiError::Cancelled => {
                debug!(%method, %url, "request cancelled");
            }
            ApiError::Http { message, .. } => {
                error!(%method, %url, error = %error, "request failed");
                if options.notify_errors {
                    self.notifier.notify_error(message);
                }
            }
            ApiError::Transport(_) | ApiError::Timeout => {
                error!(%method, %url, error = %error, "request failed");
                if options.notify_errors {
                    self.notifier.notify_error(FALLBACK_ERROR_MESSAGE);
                }
            }
            _ => {
                error!(%method, %url, error = %error, "request failed");
            }
        }
    }
}

fn is_idempotent(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::PUT | Method::DELETE | Method::OPTIONS
    )
}

fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(u8::is_ascii_whitespace)
}

/// `None` for empty or non-JSON bodies
fn parse_json(bytes: &[u8]) -> Option<Value> {
    if is_blank(bytes) {
        return None;
    }
    serde_json::from_slice(bytes).ok()
}

/// Empty bodies are `None`; anything that is not JSON is kept as a string.
fn parse_body(bytes: &[u8]) -> Option<Value> {
    if is_blank(bytes) {
        return None;
    }
    Some(
        parse_json(bytes)
            .unwrap_or_else(|| Value::String(String::from_utf8_lossy(bytes).into_owned())),
    )
}

fn decode<T: DeserializeOwned>(path: &str, value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|e| {
        error!(path, error = %e, "response did not match the expected shape");
        ApiError::Decode(e)
    })
}

fn map_reqwest_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;
    use serde::Deserialize;
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, header, method, path, query_param},
    };

    use super::*;
    use crate::services::{
        credential_store::MemoryCredentialStore, notification::RecordingNotifier,
        session::RecordingRedirect,
    };

    struct Harness {
        client: ApiClient,
        store: Arc<MemoryCredentialStore>,
        notifier: Arc<RecordingNotifier>,
        redirect: Arc<RecordingRedirect>,
    }

    fn harness(server: &MockServer, config: impl FnOnce(ClientConfig) -> ClientConfig) -> Harness {
        let store = Arc::new(MemoryCredentialStore::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let redirect = Arc::new(RecordingRedirect::default());
        let config = config(
            ClientConfig::new(&server.uri())
                .unwrap()
                .with_max_retries(0)
                .with_retry_min_delay(Duration::from_millis(10)),
        );
        let client = ApiClient::new(config, store.clone(), notifier.clone(), redirect.clone())
            .unwrap();

        Harness {
            client,
            store,
            notifier,
            redirect,
        }
    }

    #[tokio::test]
    async fn test_success_is_normalized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/Orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "$id": "1",
                "$values": [{"$id": "2", "id": 7, "items": {"$id": "3", "$values": []}}]
            })))
            .mount(&server)
            .await;

        let h = harness(&server, |c| c);
        let value = h
            .client
            .request(Method::GET, "api/Orders", None, RequestOptions::default())
            .await
            .unwrap();

        assert_eq!(value, json!([{"id": 7, "items": []}]));
        assert!(h.notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn test_bearer_token_is_attached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/Users/me"))
            .and(header("authorization", "Bearer abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1})))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(&server, |c| c);
        h.store
            .store(SecretString::from("abc123".to_string()))
            .unwrap();

        let value = h
            .client
            .request(Method::GET, "/api/Users/me", None, RequestOptions::default())
            .await
            .unwrap();
        assert_eq!(value, json!({"id": 1}));
    }

    #[tokio::test]
    async fn test_no_token_means_no_authorization_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/Inventory"))
            .respond_with(|req: &wiremock::Request| {
                let status = if req.headers.contains_key("authorization") { 400 } else { 200 };
                ResponseTemplate::new(status).set_body_json(json!([]))
            })
            .mount(&server)
            .await;

        let h = harness(&server, |c| c);
        let value = h
            .client
            .request(Method::GET, "api/Inventory", None, RequestOptions::default())
            .await
            .unwrap();
        assert_eq!(value, json!([]));
    }

    #[tokio::test]
    async fn test_unauthorized_clears_token_and_redirects_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/Orders"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        // Retries are enabled: a 401 must still hit the server only once
        let h = harness(&server, |c| c.with_max_retries(3));
        h.store
            .store(SecretString::from("stale".to_string()))
            .unwrap();

        let err = h
            .client
            .request(Method::GET, "api/Orders", None, RequestOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Unauthorized));
        assert!(h.store.load().unwrap().is_none());
        assert_eq!(h.redirect.routes(), vec!["/login"]);
        assert!(h.notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn test_anonymous_unauthorized_is_a_plain_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/Auth/login"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"message": "Invalid credentials"})),
            )
            .mount(&server)
            .await;

        let h = harness(&server, |c| c);
        h.store
            .store(SecretString::from("kept".to_string()))
            .unwrap();

        let err = h
            .client
            .request(
                Method::POST,
                "api/Auth/login",
                Some(&json!({"email": "a@b.c"})),
                RequestOptions::default().anonymous(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(401));
        assert!(h.store.load().unwrap().is_some());
        assert_eq!(h.redirect.count(), 0);
        assert_eq!(h.notifier.messages(), vec!["Invalid credentials"]);
    }

    #[tokio::test]
    async fn test_error_body_message_is_notified_and_propagated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/TimeSlots/book"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "$id": "1",
                "message": "Time slot is full",
                "slots": {"$id": "2", "$values": [4, 5]}
            })))
            .mount(&server)
            .await;

        let h = harness(&server, |c| c);
        let err = h
            .client
            .request(
                Method::POST,
                "api/TimeSlots/book",
                Some(&json!({"slotId": 3})),
                RequestOptions::default(),
            )
            .await
            .unwrap_err();

        match &err {
            ApiError::Http {
                status,
                message,
                data,
            } => {
                assert_eq!(*status, 409);
                assert_eq!(message, "Time slot is full");
                assert_eq!(
                    data.as_ref().unwrap(),
                    &json!({"id": "1", "message": "Time slot is full", "slots": [4, 5]})
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(h.notifier.messages(), vec!["Time slot is full"]);
    }

    #[tokio::test]
    async fn test_error_without_message_uses_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/Invoices"))
            .respond_with(ResponseTemplate::new(500).set_body_string("<html>oops</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(&server, |c| c);
        let err = h
            .client
            .request(Method::GET, "api/Invoices", None, RequestOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(500));
        assert_eq!(err.data(), Some(&json!("<html>oops</html>")));
        assert_eq!(h.notifier.messages(), vec![FALLBACK_ERROR_MESSAGE]);
    }

    #[tokio::test]
    async fn test_json_string_error_body_is_the_message() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/Orders/3"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!("Order already paid")))
            .mount(&server)
            .await;

        let h = harness(&server, |c| c);
        let err = h
            .client
            .delete("api/Orders/3", RequestOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(400));
        assert_eq!(h.notifier.messages(), vec!["Order already paid"]);
    }

    #[tokio::test]
    async fn test_silent_requests_do_not_notify() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let h = harness(&server, |c| c);
        let err = h
            .client
            .request(
                Method::GET,
                "api/Reviews/pending",
                None,
                RequestOptions::default().silent(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(404));
        assert!(h.notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn test_network_failure_notifies_fallback() {
        // Nothing listens on a port freed right after binding it
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let uri = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let store = Arc::new(MemoryCredentialStore::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let redirect = Arc::new(RecordingRedirect::default());
        let config = ClientConfig::new(&uri).unwrap().with_max_retries(0);
        let client = ApiClient::new(config, store, notifier.clone(), redirect).unwrap();

        let err = client
            .request(Method::GET, "api/Orders", None, RequestOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Transport(_) | ApiError::Timeout));
        assert_eq!(notifier.messages(), vec![FALLBACK_ERROR_MESSAGE]);
    }

    #[tokio::test]
    async fn test_exhausted_retries_notify_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/Inventory"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let h = harness(&server, |c| c.with_max_retries(2));
        let err = h
            .client
            .request(Method::GET, "api/Inventory", None, RequestOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(503));
        assert_eq!(h.notifier.messages(), vec![FALLBACK_ERROR_MESSAGE]);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_for_get() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/Inventory"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/Inventory"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"$values": [1]})))
            .mount(&server)
            .await;

        let h = harness(&server, |c| c.with_max_retries(2));
        let value = h
            .client
            .request(Method::GET, "api/Inventory", None, RequestOptions::default())
            .await
            .unwrap();

        assert_eq!(value, json!([1]));
        assert!(h.notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn test_post_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/Orders"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(&server, |c| c.with_max_retries(3));
        let err = h
            .client
            .request(Method::POST, "api/Orders", Some(&json!({})), RequestOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(503));
        assert_eq!(h.notifier.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_request_is_silent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([]))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let h = harness(&server, |c| c);
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let err = h
            .client
            .request(
                Method::GET,
                "api/Orders",
                None,
                RequestOptions::default().cancel_with(token),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Cancelled));
        assert!(h.notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn test_empty_success_body_is_null() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/Reviews/4"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let h = harness(&server, |c| c);
        h.client
            .delete("api/Reviews/4", RequestOptions::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_query_and_json_body_are_sent() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/Orders/3"))
            .and(query_param("notify", "true"))
            .and(body_json(json!({"status": "Completed"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        #[derive(Deserialize)]
        struct Ack {
            ok: bool,
        }

        let h = harness(&server, |c| c);
        let ack: Ack = h
            .client
            .put(
                "api/Orders/3",
                &json!({"status": "Completed"}),
                RequestOptions::default().query("notify", "true"),
            )
            .await
            .unwrap();
        assert!(ack.ok);
    }

    #[tokio::test]
    async fn test_shape_mismatch_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unexpected": true})))
            .mount(&server)
            .await;

        let h = harness(&server, |c| c);
        let err = h
            .client
            .get::<Vec<i64>>("api/Orders", RequestOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[tokio::test]
    async fn test_reference_policies() {
        let server = MockServer::start().await;
        let body = json!({
            "$id": "1",
            "$values": [
                {"$id": "2", "mechanic": {"$id": "3", "name": "Rui"}},
                {"$id": "4", "mechanic": {"$ref": "3"}}
            ]
        });
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let passthrough = harness(&server, |c| c);
        let value = passthrough
            .client
            .request(Method::GET, "api/Orders", None, RequestOptions::default())
            .await
            .unwrap();
        assert_eq!(value[1]["mechanic"], json!({"ref": "3"}));

        let resolving = harness(&server, |c| c.with_reference_policy(ReferencePolicy::Resolve));
        let value = resolving
            .client
            .request(Method::GET, "api/Orders", None, RequestOptions::default())
            .await
            .unwrap();
        assert_eq!(value[1]["mechanic"], json!({"id": "3", "name": "Rui"}));
    }

    #[tokio::test]
    async fn test_dangling_reference_fails_when_resolving() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"owner": {"$ref": "9"}})))
            .mount(&server)
            .await;

        let h = harness(&server, |c| c.with_reference_policy(ReferencePolicy::Resolve));
        let err = h
            .client
            .request(Method::GET, "api/Orders/1", None, RequestOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ApiError::Envelope(EnvelopeError::UnknownReference(_))
        ));
        assert!(h.notifier.messages().is_empty());
    }

    #[test]
    fn test_should_retry() {
        assert!(ApiError::Timeout.should_retry());
        assert!(ApiError::Transport("reset".into()).should_retry());
        for status in [429, 500, 503] {
            let err = ApiError::Http {
                status,
                message: String::new(),
                data: None,
            };
            assert!(err.should_retry(), "{status} should be retried");
        }
        for status in [400, 404, 409] {
            let err = ApiError::Http {
                status,
                message: String::new(),
                data: None,
            };
            assert!(!err.should_retry(), "{status} should not be retried");
        }
        assert!(!ApiError::Unauthorized.should_retry());
        assert!(!ApiError::Cancelled.should_retry());
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(b""), None);
        assert_eq!(parse_body(b"  \n"), None);
        assert_eq!(parse_body(br#"{"a":1}"#), Some(json!({"a": 1})));
        assert_eq!(parse_body(b"Bad Request"), Some(json!("Bad Request")));
        assert_eq!(parse_json(b"Bad Request"), None);
        assert_eq!(parse_json(br#""Bad Request""#), Some(json!("Bad Request")));
    }
}
