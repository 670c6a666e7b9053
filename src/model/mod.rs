pub mod bedrock;
pub mod envelope;

pub use envelope::ModelRequest;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use envelope::ModelResponse;

/// Why a model call failed, decided once where the transport error is seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Session credentials have expired.
    AuthExpired,
    /// Credentials are missing, invalid or were refused.
    Unauthorized,
    /// Anything else: throttling, validation, network.
    Transient,
}

impl FailureKind {
    pub fn is_auth(self) -> bool {
        matches!(self, FailureKind::AuthExpired | FailureKind::Unauthorized)
    }

    /// Classify from the service error code when there is one, falling back
    /// to the rendered error text for failures that never reached the service
    /// (credential provider errors, for instance).
    pub fn classify(code: Option<&str>, rendered: &str) -> FailureKind {
        match code {
            Some("ExpiredTokenException" | "ExpiredToken" | "InvalidIdentityToken") => {
                return FailureKind::AuthExpired
            }
            Some(
                "UnrecognizedClientException"
                | "UnauthorizedException"
                | "AccessDeniedException"
                | "InvalidSignatureException",
            ) => return FailureKind::Unauthorized,
            _ => {}
        }

        const EXPIRED: &[&str] = &["expired", "ExpiredToken", "InvalidIdentityToken"];
        const REFUSED: &[&str] = &[
            "UnauthorizedException",
            "AccessDeniedException",
            "security token",
            "credentials",
        ];
        if EXPIRED.iter().any(|p| rendered.contains(p)) {
            FailureKind::AuthExpired
        } else if REFUSED.iter().any(|p| rendered.contains(p)) {
            FailureKind::Unauthorized
        } else {
            FailureKind::Transient
        }
    }
}

/// A failed call to the inference endpoint.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct InvokeFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl InvokeFailure {
    pub fn classified(code: Option<&str>, message: String) -> InvokeFailure {
        InvokeFailure {
            kind: FailureKind::classify(code, &message),
            message,
        }
    }
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Failed to build model client: {0}")]
    Connect(String),

    #[error("Credential refresh failed: {0}")]
    Login(String),

    #[error("Failed to serialize model request: {0}")]
    Serialize(serde_json::Error),

    #[error("Failed to invoke model: {0}")]
    Invoke(InvokeFailure),

    #[error("Failed to invoke model: {original} (and credential refresh failed: {refresh})")]
    RefreshFailed {
        original: InvokeFailure,
        refresh: Box<ModelError>,
    },

    #[error("Failed to invoke model after refreshing credentials: {0}")]
    AuthRetryExhausted(InvokeFailure),

    #[error("Failed to parse model response: {0}")]
    Decode(serde_json::Error),

    #[error("empty response from model")]
    EmptyResponse,

    /// A previous call was dropped while refreshing credentials, so the
    /// session no longer owns a connection.
    #[error("model session was interrupted during a credential refresh")]
    SessionUnavailable,
}

/// Where model calls go: credentials profile, region and model id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTarget {
    pub profile: Option<String>,
    pub region: String,
    pub model: String,
}

/// A live handle to the inference endpoint.
#[async_trait]
pub trait ModelConnection: Send + Sync {
    /// Send a serialized request body, returning the raw response body.
    async fn invoke(&self, model_id: &str, body: &[u8]) -> Result<Vec<u8>, InvokeFailure>;
}

/// Builds connections from the credentials currently on disk.
#[async_trait]
pub trait Connector: Send + Sync {
    type Handle: ModelConnection;

    async fn connect(&self, target: &SessionTarget) -> Result<Self::Handle, ModelError>;
}

/// Out-of-band re-authentication (may block on user interaction).
#[async_trait]
pub trait CredentialRefresher: Send + Sync {
    async fn refresh(&self, profile: Option<&str>) -> Result<(), ModelError>;
}

enum SessionState<H> {
    Ready(H),
    /// Left in place if the invoking future is dropped mid-refresh.
    Refreshing,
}

/// Model client that survives one credential expiry per call.
///
/// An auth-classified failure triggers one refresh (login, then a fresh
/// connection for the same profile and region) and exactly one retry. The
/// connection is owned by the `Ready` state and replaced only when the
/// refresh fully succeeds; a failed refresh keeps the previous one.
pub struct ModelInvoker<K: Connector, R> {
    connector: K,
    refresher: R,
    target: SessionTarget,
    state: SessionState<K::Handle>,
}

impl<K: Connector, R: CredentialRefresher> ModelInvoker<K, R> {
    pub async fn connect(
        connector: K,
        refresher: R,
        target: SessionTarget,
    ) -> Result<Self, ModelError> {
        let handle = connector.connect(&target).await?;
        Ok(ModelInvoker {
            connector,
            refresher,
            target,
            state: SessionState::Ready(handle),
        })
    }

    pub fn target(&self) -> &SessionTarget {
        &self.target
    }

    /// Send `request` and return the text of the first content block.
    #[instrument(skip_all, fields(model = %self.target.model))]
    pub async fn invoke(&mut self, request: &ModelRequest) -> Result<String, ModelError> {
        let body = serde_json::to_vec(request).map_err(ModelError::Serialize)?;
        debug!(request_bytes = body.len(), "invoking model");
        let raw = self.send_with_refresh(&body).await?;
        extract_text(&raw)
    }

    fn handle(&self) -> Result<&K::Handle, ModelError> {
        match &self.state {
            SessionState::Ready(handle) => Ok(handle),
            SessionState::Refreshing => Err(ModelError::SessionUnavailable),
        }
    }

    async fn send_with_refresh(&mut self, body: &[u8]) -> Result<Vec<u8>, ModelError> {
        let first = self.handle()?.invoke(&self.target.model, body).await;
        let original = match first {
            Ok(raw) => return Ok(raw),
            Err(failure) if !failure.kind.is_auth() => return Err(ModelError::Invoke(failure)),
            Err(failure) => failure,
        };

        warn!(kind = ?original.kind, error = %original, "model rejected credentials, refreshing");
        if let Err(refresh) = self.refresh().await {
            return Err(ModelError::RefreshFailed {
                original,
                refresh: Box::new(refresh),
            });
        }

        match self.handle()?.invoke(&self.target.model, body).await {
            Ok(raw) => Ok(raw),
            Err(failure) if failure.kind.is_auth() => Err(ModelError::AuthRetryExhausted(failure)),
            Err(failure) => Err(ModelError::Invoke(failure)),
        }
    }

    async fn refresh(&mut self) -> Result<(), ModelError> {
        let stale = match std::mem::replace(&mut self.state, SessionState::Refreshing) {
            SessionState::Ready(handle) => handle,
            SessionState::Refreshing => return Err(ModelError::SessionUnavailable),
        };

        match self.reauthenticate().await {
            Ok(fresh) => {
                self.state = SessionState::Ready(fresh);
                info!("credentials refreshed, connection rebuilt");
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Ready(stale);
                Err(e)
            }
        }
    }

    async fn reauthenticate(&self) -> Result<K::Handle, ModelError> {
        self.refresher
            .refresh(self.target.profile.as_deref())
            .await?;
        self.connector.connect(&self.target).await
    }
}

fn extract_text(raw: &[u8]) -> Result<String, ModelError> {
    let response: ModelResponse = serde_json::from_slice(raw).map_err(ModelError::Decode)?;
    response
        .content
        .into_iter()
        .next()
        .map(|block| block.text)
        .ok_or(ModelError::EmptyResponse)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::time::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    pub(crate) type Script = Arc<Mutex<VecDeque<Result<Vec<u8>, InvokeFailure>>>>;

    pub(crate) fn ok_body(text: &str) -> Result<Vec<u8>, InvokeFailure> {
        Ok(serde_json::to_vec(&serde_json::json!({
            "content": [{ "type": "text", "text": text }]
        }))
        .unwrap())
    }

    fn auth_failure() -> Result<Vec<u8>, InvokeFailure> {
        Err(InvokeFailure::classified(
            Some("ExpiredTokenException"),
            "The security token included in the request is expired".to_string(),
        ))
    }

    fn throttled() -> Result<Vec<u8>, InvokeFailure> {
        Err(InvokeFailure::classified(
            Some("ThrottlingException"),
            "Too many requests".to_string(),
        ))
    }

    /// Every connection pops its next response from one shared script and
    /// records which connection generation served the call.
    #[derive(Clone, Default)]
    pub(crate) struct FakeConnector {
        pub script: Script,
        pub connects: Arc<AtomicUsize>,
        pub calls: Arc<Mutex<Vec<usize>>>,
        pub fail_after: Option<usize>,
    }

    pub(crate) struct FakeHandle {
        generation: usize,
        script: Script,
        calls: Arc<Mutex<Vec<usize>>>,
    }

    #[async_trait]
    impl ModelConnection for FakeHandle {
        async fn invoke(&self, _model_id: &str, _body: &[u8]) -> Result<Vec<u8>, InvokeFailure> {
            self.calls.lock().unwrap().push(self.generation);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .expect("script exhausted: unexpected extra call")
        }
    }

    #[async_trait]
    impl Connector for FakeConnector {
        type Handle = FakeHandle;

        async fn connect(&self, _target: &SessionTarget) -> Result<FakeHandle, ModelError> {
            let generation = self.connects.fetch_add(1, Ordering::SeqCst);
            if self.fail_after.is_some_and(|limit| generation >= limit) {
                return Err(ModelError::Connect("config reload failed".to_string()));
            }
            Ok(FakeHandle {
                generation,
                script: self.script.clone(),
                calls: self.calls.clone(),
            })
        }
    }

    #[derive(Clone, Default)]
    pub(crate) struct FakeRefresher {
        pub refreshes: Arc<AtomicUsize>,
        pub fail: bool,
        pub hang: bool,
    }

    #[async_trait]
    impl CredentialRefresher for FakeRefresher {
        async fn refresh(&self, profile: Option<&str>) -> Result<(), ModelError> {
            assert_eq!(profile, Some("tooling"));
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                std::future::pending::<()>().await;
            }
            if self.fail {
                Err(ModelError::Login("aws sso login exited with 1".to_string()))
            } else {
                Ok(())
            }
        }
    }

    pub(crate) fn target() -> SessionTarget {
        SessionTarget {
            profile: Some("tooling".to_string()),
            region: "us-west-2".to_string(),
            model: "test-model".to_string(),
        }
    }

    fn request() -> ModelRequest {
        ModelRequest::single_turn("summarize".to_string(), None, 64)
    }

    async fn invoker(
        connector: &FakeConnector,
        refresher: &FakeRefresher,
        script: Vec<Result<Vec<u8>, InvokeFailure>>,
    ) -> ModelInvoker<FakeConnector, FakeRefresher> {
        connector.script.lock().unwrap().extend(script);
        ModelInvoker::connect(connector.clone(), refresher.clone(), target())
            .await
            .unwrap()
    }

    #[test]
    fn test_classify_by_code() {
        assert_eq!(FailureKind::classify(Some("ExpiredTokenException"), ""), FailureKind::AuthExpired);
        assert_eq!(FailureKind::classify(Some("AccessDeniedException"), ""), FailureKind::Unauthorized);
        assert_eq!(FailureKind::classify(Some("ThrottlingException"), "slow down"), FailureKind::Transient);
    }

    #[test]
    fn test_classify_by_text_without_code() {
        assert_eq!(
            FailureKind::classify(None, "failed to load credentials: the SSO session has expired"),
            FailureKind::AuthExpired
        );
        assert_eq!(
            FailureKind::classify(None, "dispatch failure: no credentials in the provider chain"),
            FailureKind::Unauthorized
        );
        assert_eq!(
            FailureKind::classify(None, "The security token included in the request is invalid"),
            FailureKind::Unauthorized
        );
        assert_eq!(FailureKind::classify(None, "connection reset"), FailureKind::Transient);
        assert!(!FailureKind::Transient.is_auth());
    }

    #[tokio::test]
    async fn test_success_without_refresh() {
        let connector = FakeConnector::default();
        let refresher = FakeRefresher::default();
        let mut invoker = invoker(&connector, &refresher, vec![ok_body("summary")]).await;

        assert_eq!(invoker.invoke(&request()).await.unwrap(), "summary");
        assert_eq!(refresher.refreshes.load(Ordering::SeqCst), 0);
        assert_eq!(*connector.calls.lock().unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn test_auth_failure_then_success_refreshes_once() {
        let connector = FakeConnector::default();
        let refresher = FakeRefresher::default();
        let mut invoker = invoker(&connector, &refresher, vec![auth_failure(), ok_body("after refresh")]).await;

        assert_eq!(invoker.invoke(&request()).await.unwrap(), "after refresh");
        assert_eq!(refresher.refreshes.load(Ordering::SeqCst), 1);
        // Retry went over the rebuilt connection
        assert_eq!(*connector.calls.lock().unwrap(), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_auth_failure_twice_is_terminal() {
        let connector = FakeConnector::default();
        let refresher = FakeRefresher::default();
        let mut invoker = invoker(&connector, &refresher, vec![auth_failure(), auth_failure(), ok_body("never")]).await;

        let err = invoker.invoke(&request()).await.unwrap_err();
        assert!(matches!(err, ModelError::AuthRetryExhausted(_)));
        assert_eq!(refresher.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(connector.calls.lock().unwrap().len(), 2);
        assert_eq!(connector.script.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_non_auth_failure_on_retry_is_not_retried_again() {
        let connector = FakeConnector::default();
        let refresher = FakeRefresher::default();
        let mut invoker = invoker(&connector, &refresher, vec![auth_failure(), throttled(), ok_body("never")]).await;

        let err = invoker.invoke(&request()).await.unwrap_err();
        assert!(matches!(err, ModelError::Invoke(ref f) if f.kind == FailureKind::Transient));
        assert_eq!(err.to_string(), "Failed to invoke model: Too many requests");
        assert_eq!(refresher.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(*connector.calls.lock().unwrap(), vec![0, 1]);
        assert_eq!(connector.script.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_refresh_leaves_session_unavailable() {
        let connector = FakeConnector::default();
        let refresher = FakeRefresher {
            hang: true,
            ..FakeRefresher::default()
        };
        let mut invoker = invoker(&connector, &refresher, vec![auth_failure(), ok_body("never")]).await;

        let timed_out =
            tokio::time::timeout(Duration::from_millis(50), invoker.invoke(&request())).await;
        assert!(timed_out.is_err());

        let err = invoker.invoke(&request()).await.unwrap_err();
        assert!(matches!(err, ModelError::SessionUnavailable));
        assert_eq!(connector.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_non_auth_failure_not_retried() {
        let connector = FakeConnector::default();
        let refresher = FakeRefresher::default();
        let mut invoker = invoker(&connector, &refresher, vec![throttled(), ok_body("never")]).await;

        let err = invoker.invoke(&request()).await.unwrap_err();
        assert!(matches!(err, ModelError::Invoke(ref f) if f.kind == FailureKind::Transient));
        assert_eq!(refresher.refreshes.load(Ordering::SeqCst), 0);
        assert_eq!(connector.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_failure_reports_both_errors() {
        let connector = FakeConnector::default();
        let refresher = FakeRefresher {
            fail: true,
            ..FakeRefresher::default()
        };
        let mut invoker = invoker(&connector, &refresher, vec![auth_failure()]).await;

        let err = invoker.invoke(&request()).await.unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, ModelError::RefreshFailed { .. }));
        assert!(message.contains("expired"));
        assert!(message.contains("aws sso login exited with 1"));
        assert_eq!(connector.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_reconnect_keeps_previous_connection() {
        let connector = FakeConnector {
            fail_after: Some(1),
            ..FakeConnector::default()
        };
        let refresher = FakeRefresher::default();
        let mut invoker = invoker(&connector, &refresher, vec![auth_failure(), ok_body("still works")]).await;

        let err = invoker.invoke(&request()).await.unwrap_err();
        assert!(matches!(err, ModelError::RefreshFailed { .. }));

        // The session is Ready again on the original connection
        assert_eq!(invoker.invoke(&request()).await.unwrap(), "still works");
        assert_eq!(*connector.calls.lock().unwrap(), vec![0, 0]);
    }

    #[tokio::test]
    async fn test_empty_content_is_an_error() {
        let connector = FakeConnector::default();
        let refresher = FakeRefresher::default();
        let empty = Ok(br#"{"content":[]}"#.to_vec());
        let mut invoker = invoker(&connector, &refresher, vec![empty]).await;

        let err = invoker.invoke(&request()).await.unwrap_err();
        assert!(matches!(err, ModelError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_only_first_block_used() {
        let connector = FakeConnector::default();
        let refresher = FakeRefresher::default();
        let body = Ok(br#"{"content":[{"type":"text","text":"one"},{"type":"text","text":"two"}]}"#.to_vec());
        let mut invoker = invoker(&connector, &refresher, vec![body]).await;

        assert_eq!(invoker.invoke(&request()).await.unwrap(), "one");
    }
}
