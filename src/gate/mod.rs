//! Capability gates in front of protected content.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::common::ApiError;
use crate::http::HttpClient;
use crate::query::QueryClient;
use crate::session::{AuthState, SessionProvider};

/// What a gate requires before rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Authenticated,
    Admin,
}

/// What the surrounding view should do.
#[derive(Debug, Clone, PartialEq)]
pub enum GateOutcome {
    /// Resolution still in flight: show a placeholder, deny nothing yet.
    Loading,
    Render,
    Redirect(String),
    Deny(String),
}

/// Authoritative allow-list lookup, idempotent and cacheable per user.
#[async_trait]
pub trait AdminDirectory: Send + Sync {
    async fn is_admin(&self, user_id: i64) -> Result<bool, ApiError>;
}

#[async_trait]
impl AdminDirectory for HttpClient {
    async fn is_admin(&self, user_id: i64) -> Result<bool, ApiError> {
        HttpClient::is_admin(self, user_id).await
    }
}

pub fn admin_key(user_id: i64) -> String {
    format!("admin:{user_id}")
}

/// Route/component guard over the session provider.
///
/// Admin checks run through the query layer, so repeated mounts share one
/// outstanding lookup and the result is cached per user id.
#[derive(Clone)]
pub struct AccessGate {
    provider: SessionProvider,
    queries: QueryClient,
    directory: Arc<dyn AdminDirectory>,
    fallback_route: String,
    inline_denial: bool,
}

impl AccessGate {
    pub fn new(
        provider: SessionProvider,
        queries: QueryClient,
        directory: Arc<dyn AdminDirectory>,
        fallback_route: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            queries,
            directory,
            fallback_route: fallback_route.into(),
            inline_denial: false,
        }
    }

    /// Report denials inline instead of redirecting.
    pub fn with_inline_denial(mut self) -> Self {
        self.inline_denial = true;
        self
    }

    /// Evaluates against the provider's state as it is right now.
    ///
    /// While the provider is still resolving this returns `Loading` and
    /// performs no allow-list call.
    pub async fn evaluate(&self, capability: Capability) -> GateOutcome {
        match self.provider.current() {
            AuthState::Uninitialized | AuthState::Resolving => GateOutcome::Loading,
            AuthState::Unauthenticated | AuthState::Error(_) => self.blocked("sign-in required"),
            AuthState::Authenticated(session) => match capability {
                Capability::Authenticated => GateOutcome::Render,
                Capability::Admin => self.check_admin(session.user.id).await,
            },
        }
    }

    /// Waits for the provider to settle, then evaluates.
    pub async fn evaluate_when_resolved(&self, capability: Capability) -> GateOutcome {
        let mut rx = self.provider.subscribe();
        loop {
            if rx.borrow_and_update().is_terminal() {
                break;
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
        self.evaluate(capability).await
    }

    async fn check_admin(&self, user_id: i64) -> GateOutcome {
        let directory = self.directory.clone();
        let result = self
            .queries
            .query_as::<bool, _, _>(&admin_key(user_id), move || {
                let directory = directory.clone();
                async move { directory.is_admin(user_id).await.map(Value::Bool) }
            })
            .await;

        match result {
            Ok(outcome) if outcome.value => GateOutcome::Render,
            Ok(_) => self.blocked("admin access required"),
            Err(err) => {
                tracing::warn!(user_id, error = %err, "allow-list check failed");
                self.blocked("could not verify access")
            }
        }
    }

    fn blocked(&self, message: &str) -> GateOutcome {
        if self.inline_denial {
            GateOutcome::Deny(message.to_string())
        } else {
            GateOutcome::Redirect(self.fallback_route.clone())
        }
    }
}
