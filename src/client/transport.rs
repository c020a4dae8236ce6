//! Authenticated transport
//!
//! Every outbound request gets the stored access token. A request that fails
//! with 401 is renewed at most once: the refresh endpoint is called directly
//! and the original request is resent with the new access token. If renewal
//! fails the stored tokens are cleared and the session is signed out.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, Response};
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::client::error::ClientError;
use crate::client::session::{SessionEvent, SessionState};
use crate::client::storage::TokenStore;
use crate::client::REFRESH_PATH;
use crate::core::models::{RefreshRequest, RefreshResponse};

/// HTTP request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Per-request renewal marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Renewal {
    /// A 401 may trigger one refresh-and-resend
    Eligible,
    /// Already renewed once, a further 401 is final
    Attempted,
    /// Never renewed (credential endpoints)
    Exempt,
}

/// A request to send through [`AuthTransport`]
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    method: Method,
    path: String,
    body: Option<serde_json::Value>,
    renewal: Renewal,
}

impl OutboundRequest {
    /// Request for `path` relative to the API base, eligible for renewal
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            renewal: Renewal::Eligible,
        }
    }

    /// GET request
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// POST request
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// PUT request
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// Attach a JSON body
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, ClientError> {
        let value =
            serde_json::to_value(body).map_err(|e| ClientError::InvalidRequest(e.to_string()))?;
        self.body = Some(value);
        Ok(self)
    }

    /// Opt this request out of renewal
    pub fn exempt(mut self) -> Self {
        self.renewal = Renewal::Exempt;
        self
    }

    /// Current renewal marker
    pub fn renewal(&self) -> Renewal {
        self.renewal
    }

    /// Path relative to the API base
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// HTTP transport for the auth API.
/// Clone is cheap: the client, token store and session channel are shared.
#[derive(Clone)]
pub struct AuthTransport {
    client: Client,
    base_url: String,
    store: Arc<dyn TokenStore>,
    state: Arc<watch::Sender<SessionState>>,
}

impl AuthTransport {
    /// Create a transport for the API at `base_url`
    pub fn new(base_url: impl Into<String>, store: Arc<dyn TokenStore>) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self::with_client(client, base_url, store))
    }

    /// Create a transport over a preconfigured client
    pub fn with_client(
        client: Client,
        base_url: impl Into<String>,
        store: Arc<dyn TokenStore>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let (state, _) = watch::channel(SessionState::default());

        Self {
            client,
            base_url,
            store,
            state: Arc::new(state),
        }
    }

    /// Store the bearer and refresh tokens are read from
    pub fn token_store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    pub(crate) fn session_state(&self) -> &Arc<watch::Sender<SessionState>> {
        &self.state
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request, renewing the access token once on 401
    pub async fn send(&self, mut request: OutboundRequest) -> Result<Response, ClientError> {
        loop {
            let err = match self.dispatch(&request).await {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };

            if !err.is_unauthorized() || request.renewal != Renewal::Eligible {
                return Err(err);
            }
            request.renewal = Renewal::Attempted;

            let Some(refresh_token) = self.store.refresh_token()? else {
                debug!("No refresh token stored for {}", request.path);
                return Err(err);
            };

            match self.refresh_access_token(&refresh_token).await {
                Ok(access_token) => {
                    self.store.set_access_token(access_token)?;
                    debug!("Access token renewed, resending {}", request.path);
                }
                Err(refresh_err) => {
                    warn!("Session renewal failed: {}", refresh_err);
                    self.end_session();
                    return Err(err);
                }
            }
        }
    }

    /// Send a request and decode its JSON response
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: OutboundRequest,
    ) -> Result<T, ClientError> {
        let response = self.send(request).await?;

        response
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }

    /// One round trip with the current access token attached
    async fn dispatch(&self, request: &OutboundRequest) -> Result<Response, ClientError> {
        let mut builder = self
            .client
            .request(request.method.clone(), self.url(&request.path));

        if let Some(token) = self.store.access_token()? {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        Self::check_response(response).await
    }

    /// Call the refresh endpoint directly, bypassing renewal
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<String, ClientError> {
        let response = self
            .client
            .post(self.url(REFRESH_PATH))
            .json(&RefreshRequest {
                refresh_token: Some(refresh_token.to_string()),
            })
            .send()
            .await?;

        let body: RefreshResponse = Self::check_response(response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;

        Ok(body.access_token)
    }

    async fn check_response(response: Response) -> Result<Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ClientError::from_status(status, &body))
    }

    /// Drop stored tokens and force the session to signed out
    pub(crate) fn end_session(&self) {
        if let Err(e) = self.store.clear() {
            warn!("Failed to clear stored tokens: {}", e);
        }
        self.state
            .send_modify(|state| *state = state.apply(SessionEvent::SignedOut));
    }
}

#[cfg(all(test, feature = "server"))]
mod tests {
    use super::*;
    use crate::client::PROFILE_PATH;
    use crate::client::session::Identity;
    use crate::client::storage::{MemoryTokenStore, StoredTokens};
    use axum::{
        Json, Router,
        extract::State,
        http::{HeaderMap, StatusCode, header},
        response::IntoResponse,
        routing::{get, post},
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    const FRESH_TOKEN: &str = "fresh-access";
    const GOOD_REFRESH: &str = "good-refresh";

    #[derive(Default)]
    struct Stub {
        profile_hits: AtomicUsize,
        refresh_hits: AtomicUsize,
        /// Reject every profile call, even with a renewed token
        always_reject: bool,
    }

    fn unauthorized() -> axum::response::Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Token is not valid", "code": "INVALID_ACCESS_TOKEN"})),
        )
            .into_response()
    }

    async fn stub_profile(State(stub): State<Arc<Stub>>, headers: HeaderMap) -> axum::response::Response {
        stub.profile_hits.fetch_add(1, Ordering::SeqCst);
        let bearer = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        if stub.always_reject || bearer != format!("Bearer {FRESH_TOKEN}") {
            return unauthorized();
        }
        Json(json!({"id": Uuid::nil(), "name": "A", "email": "a@x.com", "profileImageUrl": null}))
            .into_response()
    }

    async fn stub_refresh(
        State(stub): State<Arc<Stub>>,
        Json(body): Json<serde_json::Value>,
    ) -> axum::response::Response {
        stub.refresh_hits.fetch_add(1, Ordering::SeqCst);
        if body["refreshToken"] == GOOD_REFRESH {
            Json(json!({"accessToken": FRESH_TOKEN})).into_response()
        } else {
            (
                StatusCode::FORBIDDEN,
                Json(json!({"error": "Invalid refresh token", "code": "INVALID_REFRESH_TOKEN"})),
            )
                .into_response()
        }
    }

    async fn stub_login(State(_): State<Arc<Stub>>) -> axum::response::Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Invalid email or password", "code": "INVALID_CREDENTIALS"})),
        )
            .into_response()
    }

    async fn spawn_stub(stub: Arc<Stub>) -> String {
        let router = Router::new()
            .route(PROFILE_PATH, get(stub_profile))
            .route(REFRESH_PATH, post(stub_refresh))
            .route("/api/auth/login", post(stub_login))
            .with_state(stub);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn transport(base_url: &str, tokens: StoredTokens) -> AuthTransport {
        AuthTransport::new(base_url, Arc::new(MemoryTokenStore::with_tokens(tokens))).unwrap()
    }

    fn signed_in(transport: &AuthTransport) {
        let identity = Identity {
            id: Uuid::nil(),
            name: "A".to_string(),
            email: "a@x.com".to_string(),
            profile_image_url: None,
            created_at: None,
            updated_at: None,
        };
        transport
            .session_state()
            .send_modify(|state| *state = state.apply(SessionEvent::SignedIn(identity)));
    }

    #[test]
    fn test_outbound_request_markers() {
        assert_eq!(OutboundRequest::get("/x").renewal(), Renewal::Eligible);
        assert_eq!(OutboundRequest::post("/x").exempt().renewal(), Renewal::Exempt);
        assert_eq!(OutboundRequest::put("/x").path(), "/x");
    }

    #[tokio::test]
    async fn test_valid_token_needs_no_refresh() {
        let stub = Arc::new(Stub::default());
        let base_url = spawn_stub(stub.clone()).await;
        let transport = transport(&base_url, StoredTokens::new(FRESH_TOKEN, GOOD_REFRESH));

        let response = transport.send(OutboundRequest::get(PROFILE_PATH)).await.unwrap();

        assert!(response.status().is_success());
        assert_eq!(stub.profile_hits.load(Ordering::SeqCst), 1);
        assert_eq!(stub.refresh_hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stale_token_is_renewed_once() {
        let stub = Arc::new(Stub::default());
        let base_url = spawn_stub(stub.clone()).await;
        let transport = transport(&base_url, StoredTokens::new("stale", GOOD_REFRESH));

        let body: serde_json::Value = transport
            .send_json(OutboundRequest::get(PROFILE_PATH))
            .await
            .unwrap();

        assert_eq!(body["name"], "A");
        assert_eq!(stub.profile_hits.load(Ordering::SeqCst), 2);
        assert_eq!(stub.refresh_hits.load(Ordering::SeqCst), 1);
        assert_eq!(
            transport.token_store().load().unwrap(),
            StoredTokens::new(FRESH_TOKEN, GOOD_REFRESH)
        );
    }

    #[tokio::test]
    async fn test_failed_refresh_clears_tokens_and_signs_out() {
        let stub = Arc::new(Stub::default());
        let base_url = spawn_stub(stub.clone()).await;
        let transport = transport(&base_url, StoredTokens::new("stale", "revoked"));
        signed_in(&transport);
        let state = transport.session_state().subscribe();

        let err = transport
            .send(OutboundRequest::get(PROFILE_PATH))
            .await
            .unwrap_err();

        // The original failure is what the caller sees
        assert!(err.is_unauthorized());
        assert_eq!(err.code(), Some("INVALID_ACCESS_TOKEN"));
        assert_eq!(stub.refresh_hits.load(Ordering::SeqCst), 1);
        assert_eq!(stub.profile_hits.load(Ordering::SeqCst), 1);
        assert!(transport.token_store().load().unwrap().is_empty());
        assert_eq!(*state.borrow(), SessionState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_missing_refresh_token_propagates_original_failure() {
        let stub = Arc::new(Stub::default());
        let base_url = spawn_stub(stub.clone()).await;
        let transport = transport(
            &base_url,
            StoredTokens {
                access_token: Some("stale".to_string()),
                refresh_token: None,
            },
        );

        let err = transport
            .send(OutboundRequest::get(PROFILE_PATH))
            .await
            .unwrap_err();

        assert!(err.is_unauthorized());
        assert_eq!(stub.refresh_hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_renewed_request_is_never_retried_twice() {
        let stub = Arc::new(Stub {
            always_reject: true,
            ..Default::default()
        });
        let base_url = spawn_stub(stub.clone()).await;
        let transport = transport(&base_url, StoredTokens::new("stale", GOOD_REFRESH));

        let err = transport
            .send(OutboundRequest::get(PROFILE_PATH))
            .await
            .unwrap_err();

        assert!(err.is_unauthorized());
        assert_eq!(stub.profile_hits.load(Ordering::SeqCst), 2);
        assert_eq!(stub.refresh_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exempt_request_is_not_renewed() {
        let stub = Arc::new(Stub::default());
        let base_url = spawn_stub(stub.clone()).await;
        let transport = transport(&base_url, StoredTokens::new("stale", GOOD_REFRESH));

        let err = transport
            .send(
                OutboundRequest::post("/api/auth/login")
                    .json(&json!({"email": "a@x.com", "password": "nope"}))
                    .unwrap()
                    .exempt(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.code(), Some("INVALID_CREDENTIALS"));
        assert_eq!(stub.refresh_hits.load(Ordering::SeqCst), 0);
        assert_eq!(
            transport.token_store().load().unwrap(),
            StoredTokens::new("stale", GOOD_REFRESH)
        );
    }

    #[tokio::test]
    async fn test_concurrent_requests_renew_independently() {
        let stub = Arc::new(Stub {
            always_reject: true,
            ..Default::default()
        });
        let base_url = spawn_stub(stub.clone()).await;
        let transport = transport(&base_url, StoredTokens::new("stale", GOOD_REFRESH));

        let (a, b) = tokio::join!(
            transport.send(OutboundRequest::get(PROFILE_PATH)),
            transport.send(OutboundRequest::get(PROFILE_PATH))
        );

        assert!(a.is_err() && b.is_err());
        assert_eq!(stub.refresh_hits.load(Ordering::SeqCst), 2);
        assert_eq!(stub.profile_hits.load(Ordering::SeqCst), 4);
    }
}
