//! Session resolution: who is the current user, and with what credential.

pub mod bridge;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::common::Clock;
use crate::http::{AuthContext, Credential};
use bridge::{IdentityBridge, ResolvedIdentity, UserDescriptor};
use store::{IdentityStore, StoredIdentity};

/// Where the identity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthSource {
    Embedded,
    Fallback,
}

/// Identity resolved for the current run. Replaced wholesale on refresh,
/// never mutated in place.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user: UserDescriptor,
    pub source: AuthSource,
    pub issued_at_millis: u64,
    pub expires_at_millis: Option<u64>,
}

impl Session {
    pub fn is_expired(&self, now_millis: u64) -> bool {
        matches!(self.expires_at_millis, Some(expiry) if now_millis >= expiry)
    }
}

/// Provider state machine. One-directional per attempt; re-resolution
/// re-enters `Resolving` from any terminal state.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    Uninitialized,
    Resolving,
    Authenticated(Session),
    Unauthenticated,
    Error(String),
}

impl AuthState {
    /// Whether a resolution attempt has settled.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AuthState::Uninitialized | AuthState::Resolving)
    }
}

struct Inner {
    state: watch::Sender<AuthState>,
    bridge: Arc<dyn IdentityBridge>,
    fallback: Option<Arc<dyn IdentityBridge>>,
    store: IdentityStore,
    auth: AuthContext,
    resolve_timeout: Duration,
    clock: Arc<dyn Clock>,
}

/// Sole owner and writer of the Session value; everything else reads.
///
/// Resolution is bounded: the embedding host may never answer, so every
/// bridge call runs under the resolve timeout and the provider always
/// lands in a terminal state. An `Error` outcome never blocks the rest of
/// the app; callers keep rendering in a degraded, unauthenticated mode.
#[derive(Clone)]
pub struct SessionProvider {
    inner: Arc<Inner>,
}

impl SessionProvider {
    pub fn new(
        bridge: Arc<dyn IdentityBridge>,
        fallback: Option<Arc<dyn IdentityBridge>>,
        store: IdentityStore,
        auth: AuthContext,
        resolve_timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (state, _) = watch::channel(AuthState::Uninitialized);
        Self {
            inner: Arc::new(Inner {
                state,
                bridge,
                fallback,
                store,
                auth,
                resolve_timeout,
                clock,
            }),
        }
    }

    /// Current state, with expiry applied as a view: an expired session
    /// reads as `Unauthenticated` without waiting for a refresh cycle,
    /// and the credential is dropped so requests stop carrying the
    /// stale bearer.
    pub fn current(&self) -> AuthState {
        let state = self.inner.state.borrow().clone();
        if let AuthState::Authenticated(session) = &state {
            if session.is_expired(self.inner.clock.now_millis()) {
                tracing::debug!(user_id = session.user.id, "session expired");
                self.inner.auth.clear();
                return AuthState::Unauthenticated;
            }
        }
        state
    }

    /// Watch the raw state transitions.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    /// Persisted identity from a previous run. Latency hint only.
    pub fn remembered_identity(&self) -> Option<StoredIdentity> {
        self.inner.store.load()
    }

    /// Runs one resolution attempt and returns the terminal state.
    pub async fn resolve(&self) -> AuthState {
        self.set_state(AuthState::Resolving);

        let attempt = tokio::time::timeout(
            self.inner.resolve_timeout,
            self.inner.bridge.resolve(),
        )
        .await;

        let next = match attempt {
            Ok(Ok(Some(identity))) => self.authenticated(identity, AuthSource::Embedded),
            Ok(Ok(None)) => self.try_fallback(None).await,
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "embedded bridge failed");
                self.try_fallback(Some(err.to_string())).await
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.inner.resolve_timeout.as_millis() as u64,
                    "embedded bridge did not answer in time"
                );
                self.try_fallback(Some("embedded bridge timed out".to_string()))
                    .await
            }
        };

        self.set_state(next.clone());
        next
    }

    /// Drops the credential and the persisted identity.
    pub fn sign_out(&self) {
        self.inner.auth.clear();
        self.inner.store.clear();
        self.set_state(AuthState::Unauthenticated);
    }

    async fn try_fallback(&self, cause: Option<String>) -> AuthState {
        if let Some(fallback) = &self.inner.fallback {
            match tokio::time::timeout(self.inner.resolve_timeout, fallback.resolve()).await {
                Ok(Ok(Some(identity))) => {
                    return self.authenticated(identity, AuthSource::Fallback)
                }
                Ok(Ok(None)) => {}
                Ok(Err(err)) => return AuthState::Error(err.to_string()),
                Err(_) => return AuthState::Error("fallback resolution timed out".to_string()),
            }
        }

        match cause {
            Some(cause) => AuthState::Error(cause),
            None => AuthState::Unauthenticated,
        }
    }

    fn authenticated(&self, identity: ResolvedIdentity, source: AuthSource) -> AuthState {
        let now = self.inner.clock.now_millis();
        let session = Session {
            user: identity.user.clone(),
            source,
            issued_at_millis: now,
            expires_at_millis: identity.expires_at_millis,
        };

        // Credential first: requests issued right after the state flips
        // must already carry it.
        self.inner.auth.set(Credential {
            bearer: identity.bearer,
            user_id: identity.user.id,
        });

        if let Err(err) = self.inner.store.save(&identity.user, source, now) {
            tracing::warn!(error = %err, "failed to persist identity");
        }

        tracing::debug!(user_id = identity.user.id, source = ?source, "session established");
        AuthState::Authenticated(session)
    }

    fn set_state(&self, state: AuthState) {
        self.inner.state.send_replace(state);
    }
}
