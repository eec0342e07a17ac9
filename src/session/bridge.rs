use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::common::FallbackAuth;

/// Minimal user descriptor exposed by an identity source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserDescriptor {
    pub id: i64,
    pub name: String,
    pub premium: bool,
    pub locale: String,
}

/// An identity plus the credential derived from it.
#[derive(Debug, Clone)]
pub struct ResolvedIdentity {
    pub user: UserDescriptor,
    pub bearer: String,
    pub expires_at_millis: Option<u64>,
}

/// Seam to the host's identity surface.
///
/// `Ok(None)` means the source answered but holds no identity, which is a
/// normal condition outside the embedding host, never an error. Sources
/// are not trusted to answer promptly; the provider bounds every call
/// with its resolution timeout.
#[async_trait]
pub trait IdentityBridge: Send + Sync {
    async fn resolve(&self) -> Result<Option<ResolvedIdentity>>;
}

/// Identity source for contexts with no embedding host at all.
pub struct AbsentBridge;

#[async_trait]
impl IdentityBridge for AbsentBridge {
    async fn resolve(&self) -> Result<Option<ResolvedIdentity>> {
        Ok(None)
    }
}

/// Fixed identity from configuration; the deterministic fallback source
/// and the CLI's way in.
pub struct StaticIdentity {
    identity: ResolvedIdentity,
}

impl StaticIdentity {
    pub fn new(identity: ResolvedIdentity) -> Self {
        Self { identity }
    }

    pub fn from_config(fallback: &FallbackAuth) -> Self {
        Self {
            identity: ResolvedIdentity {
                user: UserDescriptor {
                    id: fallback.user_id,
                    name: fallback.name.clone(),
                    premium: false,
                    locale: fallback.locale.clone(),
                },
                bearer: fallback.bearer.clone(),
                expires_at_millis: None,
            },
        }
    }
}

#[async_trait]
impl IdentityBridge for StaticIdentity {
    async fn resolve(&self) -> Result<Option<ResolvedIdentity>> {
        Ok(Some(self.identity.clone()))
    }
}
