//! Authentication gate for inbound requests

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::introspect::TokenIntrospector;
use crate::protocol::{DirectiveError, Inbound};

/// Configured ids, each optionally bound to a default room
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    ids: Vec<String>,
    rooms: BTreeMap<String, String>,
}

impl AllowList {
    /// Parse `id` or `id:room` entries
    #[must_use]
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Self {
        let mut list = Self::default();
        for entry in entries {
            let entry = entry.as_ref();
            match entry.split_once(':') {
                Some((id, room)) => {
                    list.rooms.insert(id.to_string(), room.to_lowercase());
                    list.ids.push(id.to_string());
                }
                None => list.ids.push(entry.to_string()),
            }
        }
        list
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|i| i == id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Room bound to `id`
    #[must_use]
    pub fn room_of(&self, id: &str) -> Option<&str> {
        self.rooms.get(id).map(String::as_str)
    }
}

/// Who a request was authenticated as
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// Grant-issuing authorization directive, not verified
    Grant,
    /// Bearer token accepted for an audience
    Token { audience: String },
    /// Skill application id found in the allow-list
    Application { application_id: String },
}

impl Principal {
    /// Client id or application id behind the principal
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Grant => None,
            Self::Token { audience } => Some(audience),
            Self::Application { application_id } => Some(application_id),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    audience: String,
    expires_at: DateTime<Utc>,
}

/// The single most recently accepted token
#[derive(Debug, Default)]
pub struct TokenCache {
    inner: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    /// Audience of `token` if it is the cached, unexpired token
    pub async fn lookup(&self, token: &str, now: DateTime<Utc>) -> Option<String> {
        self.inner
            .read()
            .await
            .as_ref()
            .filter(|c| c.token == token && now < c.expires_at)
            .map(|c| c.audience.clone())
    }

    /// Replace the cached token
    pub async fn store(&self, token: &str, audience: &str, expires_at: DateTime<Utc>) {
        *self.inner.write().await = Some(CachedToken {
            token: token.to_string(),
            audience: audience.to_string(),
            expires_at,
        });
    }
}

/// Bearer token in fixed precedence order
///
/// Endpoint scope, payload scope, system user, session user, legacy payload.
#[must_use]
pub fn extract_token(inbound: &Inbound) -> Option<&str> {
    match inbound {
        Inbound::SmartHomeV3(d) => d.endpoint_token().or_else(|| d.payload_token()),
        Inbound::Skill(s) => s.access_token(),
        Inbound::SmartHomeV2(d) => d.access_token(),
    }
}

/// Verifies tokens and application ids, caching the accepted token
pub struct AuthGate {
    application_ids: AllowList,
    client_ids: AllowList,
    cache: TokenCache,
    introspector: Arc<dyn TokenIntrospector>,
}

impl AuthGate {
    #[must_use]
    pub fn new(
        application_ids: AllowList,
        client_ids: AllowList,
        introspector: Arc<dyn TokenIntrospector>,
    ) -> Self {
        Self {
            application_ids,
            client_ids,
            cache: TokenCache::default(),
            introspector,
        }
    }

    /// Default room bound to an application or client id
    #[must_use]
    pub fn room_of(&self, id: &str) -> Option<&str> {
        self.application_ids
            .room_of(id)
            .or_else(|| self.client_ids.room_of(id))
    }

    #[must_use]
    pub const fn application_ids(&self) -> &AllowList {
        &self.application_ids
    }

    /// Authenticate an inbound request
    ///
    /// # Errors
    ///
    /// [`DirectiveError::InvalidAccessToken`] when a token or application id
    /// is rejected, [`DirectiveError::UnsupportedOperation`] when neither a
    /// token nor a session is present.
    pub async fn authenticate(&self, inbound: &Inbound) -> Result<Principal, DirectiveError> {
        if let Inbound::SmartHomeV3(d) = inbound
            && d.is_accept_grant()
        {
            return Ok(Principal::Grant);
        }

        if let Some(token) = extract_token(inbound) {
            return self.verify_token(token).await;
        }

        let Inbound::Skill(skill) = inbound else {
            tracing::warn!(namespace = ?inbound.namespace(), "request without token");
            return Err(DirectiveError::UnsupportedOperation);
        };
        if skill.session.is_none() {
            tracing::warn!("skill request without session");
            return Err(DirectiveError::UnsupportedOperation);
        }

        match skill.application_id() {
            Some(id) if self.application_ids.contains(id) => Ok(Principal::Application {
                application_id: id.to_string(),
            }),
            Some(id) => {
                tracing::warn!(application_id = id, "application id not authorized");
                Err(DirectiveError::InvalidAccessToken)
            }
            None => {
                tracing::warn!("request not authorized");
                Err(DirectiveError::InvalidAccessToken)
            }
        }
    }

    async fn verify_token(&self, token: &str) -> Result<Principal, DirectiveError> {
        let now = Utc::now();
        if let Some(audience) = self.cache.lookup(token, now).await {
            return Ok(Principal::Token { audience });
        }

        let info = self.introspector.introspect(token).await.map_err(|e| {
            tracing::warn!(error = %e, "token rejected");
            DirectiveError::InvalidAccessToken
        })?;

        if !self.client_ids.is_empty() && !self.client_ids.contains(&info.audience) {
            tracing::warn!(audience = %info.audience, "client id not authorized");
            return Err(DirectiveError::InvalidAccessToken);
        }

        let ttl = chrono::Duration::from_std(info.expires_in).unwrap_or_default();
        self.cache.store(token, &info.audience, now + ttl).await;
        tracing::info!(audience = %info.audience, "accepted new token");
        Ok(Principal::Token {
            audience: info.audience,
        })
    }
}
