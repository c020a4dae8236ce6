//! Client session
//!
//! `SessionState` is a plain value with a pure transition function.
//! `SessionManager` drives it from API calls and publishes every transition
//! on a `watch` channel.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::error::ClientError;
use crate::client::storage::{StoredTokens, TokenStore};
use crate::client::transport::{AuthTransport, OutboundRequest};
use crate::client::{LOGIN_PATH, PROFILE_PATH, REGISTER_PATH};
use crate::core::models::{
    AuthResponse, LoginRequest, RegisterRequest, UpdateProfileRequest, UserProfile, UserSummary,
};

/// Identity snapshot held by an authenticated session
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub profile_image_url: Option<String>,
    /// Only known after a profile fetch
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<UserSummary> for Identity {
    fn from(user: UserSummary) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            profile_image_url: user.profile_image_url,
            created_at: None,
            updated_at: None,
        }
    }
}

impl From<UserProfile> for Identity {
    fn from(user: UserProfile) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            profile_image_url: user.profile_image_url,
            created_at: Some(user.created_at),
            updated_at: Some(user.updated_at),
        }
    }
}

/// Where the client session stands
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SessionState {
    /// No usable tokens
    #[default]
    Unauthenticated,
    /// Stored tokens are being checked against the profile endpoint
    Loading,
    /// Signed in as this identity
    Authenticated(Identity),
}

/// Input to `SessionState::apply`
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Startup found a stored access token and began checking it
    ResumeStarted,
    /// The stored session was accepted
    ResumeSucceeded(Identity),
    /// The stored session was rejected
    ResumeFailed,
    /// Login or registration succeeded
    SignedIn(Identity),
    /// A profile fetch or update returned a newer snapshot
    ProfileUpdated(Identity),
    /// Logout, or a failure nothing could recover from
    SignedOut,
}

impl SessionState {
    /// Next state after `event`. Events that do not apply leave the state unchanged.
    pub fn apply(&self, event: SessionEvent) -> SessionState {
        use SessionEvent::*;

        match (self, event) {
            (_, ResumeStarted) => SessionState::Loading,
            (SessionState::Loading, ResumeSucceeded(identity)) => {
                SessionState::Authenticated(identity)
            }
            (SessionState::Loading, ResumeFailed) => SessionState::Unauthenticated,
            (_, SignedIn(identity)) => SessionState::Authenticated(identity),
            (SessionState::Authenticated(_), ProfileUpdated(identity)) => {
                SessionState::Authenticated(identity)
            }
            (_, SignedOut) => SessionState::Unauthenticated,
            (state, _) => state.clone(),
        }
    }

    /// The signed-in identity, if any
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            SessionState::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, SessionState::Loading)
    }
}

/// Drives the client session against the auth API
#[derive(Clone)]
pub struct SessionManager {
    transport: AuthTransport,
    state: Arc<watch::Sender<SessionState>>,
}

impl SessionManager {
    /// Wrap an existing transport. The manager publishes on the transport's
    /// state channel, so a sign-out forced by a failed renewal is observed here too.
    pub fn new(transport: AuthTransport) -> Self {
        let state = transport.session_state().clone();
        Self { transport, state }
    }

    /// Create a manager for the API at `base_url`
    pub fn connect(
        base_url: impl Into<String>,
        store: Arc<dyn TokenStore>,
    ) -> Result<Self, ClientError> {
        Ok(Self::new(AuthTransport::new(base_url, store)?))
    }

    /// Transport used for every call, including its token store
    pub fn transport(&self) -> &AuthTransport {
        &self.transport
    }

    /// Snapshot of the current state
    pub fn current(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Receiver that sees every later transition
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn transition(&self, event: SessionEvent) {
        self.state.send_modify(|state| *state = state.apply(event));
    }

    fn store(&self) -> &Arc<dyn TokenStore> {
        self.transport.token_store()
    }

    /// Resume a persisted session
    ///
    /// With a stored access token the profile is fetched; any failure clears the
    /// stored tokens.
    pub async fn start(&self) -> SessionState {
        let has_token = match self.store().access_token() {
            Ok(token) => token.is_some(),
            Err(e) => {
                warn!("Failed to read stored tokens: {}", e);
                false
            }
        };

        if !has_token {
            self.transition(SessionEvent::SignedOut);
            return self.current();
        }

        self.transition(SessionEvent::ResumeStarted);

        match self.fetch_profile().await {
            Ok(profile) => {
                debug!("Resumed session for {}", profile.email);
                self.transition(SessionEvent::ResumeSucceeded(profile.into()));
            }
            Err(e) => {
                debug!("Stored session rejected: {}", e);
                if let Err(e) = self.store().clear() {
                    warn!("Failed to clear stored tokens: {}", e);
                }
                self.transition(SessionEvent::ResumeFailed);
            }
        }

        self.current()
    }

    /// Sign in with credentials and store both tokens.
    /// A wrong password is never treated as an expired session.
    pub async fn login(
        &self,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Identity, ClientError> {
        let request = OutboundRequest::post(LOGIN_PATH)
            .json(&LoginRequest {
                email: email.into(),
                password: password.into(),
            })?
            .exempt();

        let response: AuthResponse = self.transport.send_json(request).await?;
        self.establish(response)
    }

    /// Create an account and sign in as it
    pub async fn register(&self, request: RegisterRequest) -> Result<Identity, ClientError> {
        let request = OutboundRequest::post(REGISTER_PATH).json(&request)?.exempt();

        let response: AuthResponse = self.transport.send_json(request).await?;
        self.establish(response)
    }

    fn establish(&self, response: AuthResponse) -> Result<Identity, ClientError> {
        self.store().save(&StoredTokens::new(
            response.access_token,
            response.refresh_token,
        ))?;

        let identity = Identity::from(response.user);
        info!("Signed in as {}", identity.email);
        self.transition(SessionEvent::SignedIn(identity.clone()));

        Ok(identity)
    }

    /// Forget the session. The state is signed out even if clearing storage fails.
    pub fn logout(&self) -> Result<(), ClientError> {
        let cleared = self.store().clear();
        self.transition(SessionEvent::SignedOut);
        cleared.map_err(ClientError::from)
    }

    /// Fetch the current profile and refresh the identity snapshot
    pub async fn profile(&self) -> Result<UserProfile, ClientError> {
        let profile = self.guarded(self.fetch_profile()).await?;

        self.transition(SessionEvent::ProfileUpdated(profile.clone().into()));

        Ok(profile)
    }

    /// Apply a partial profile update. Absent fields keep their value.
    pub async fn update_profile(
        &self,
        changes: UpdateProfileRequest,
    ) -> Result<Identity, ClientError> {
        let request = OutboundRequest::put(PROFILE_PATH).json(&changes)?;
        let summary: UserSummary = self.guarded(self.transport.send_json(request)).await?;

        let mut identity = Identity::from(summary);
        if let Some(current) = self.current().identity().filter(|i| i.id == identity.id) {
            identity.created_at = current.created_at;
        }
        self.transition(SessionEvent::ProfileUpdated(identity.clone()));

        Ok(identity)
    }

    async fn fetch_profile(&self) -> Result<UserProfile, ClientError> {
        self.transport
            .send_json(OutboundRequest::get(PROFILE_PATH))
            .await
    }

    /// An authorization failure that survived renewal ends the session
    async fn guarded<T>(
        &self,
        operation: impl Future<Output = Result<T, ClientError>>,
    ) -> Result<T, ClientError> {
        let result = operation.await;

        if matches!(&result, Err(e) if e.is_unauthorized()) {
            debug!("Authorization lost, signing out");
            self.transport.end_session();
        }

        result
    }
}
