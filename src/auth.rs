use axum::{
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, header, request::Parts},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    repository::RepositoryState,
    roles::{EffectiveRoles, ResolverState},
};

/// Claims
///
/// The payload expected inside the bearer JWT issued by the external auth
/// provider. Signed with the shared secret and validated on every
/// authenticated request.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the provider-side user UUID, used to key roles and tiers.
    pub sub: Uuid,
    /// The user's email. Needed before any DB lookup because the admin
    /// allow-list matches on it.
    pub email: String,
    /// Expiration time. Rejected when in the past.
    pub exp: usize,
    /// Issued-at time.
    pub iat: usize,
}

/// AuthUser
///
/// The resolved identity of an authenticated request: who the user is and
/// what their effective role set is right now. Produced by the extractor
/// below, so every handler that takes an `AuthUser` argument is guaranteed a
/// freshly resolved role set — role and subscription changes are picked up on
/// the next request without any session invalidation machinery.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub roles: EffectiveRoles,
}

/// AuthUser Extractor Implementation
///
/// Implements Axum's FromRequestParts trait, making AuthUser usable as a
/// function argument in any protected handler and keeping authentication out
/// of business logic entirely. The flow:
///
/// 1. Dependency resolution: repository, config, and role resolver from state.
/// 2. Local bypass: development-time access via the `x-user-id` header,
///    guarded by `Env::Local` and a profile existence check.
/// 3. Token validation: Bearer extraction and JWT decoding (exp enforced).
/// 4. Profile mirror: the local `profiles` row is created lazily on first
///    authenticated contact — the identity itself is owned by the provider.
/// 5. Role resolution: persisted roles + allow-list override + tier cache.
///
/// Rejection: StatusCode::UNAUTHORIZED (401) on any failure.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
    ResolverState: FromRef<S>,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);
        let resolver = ResolverState::from_ref(state);

        // Local development bypass: a known profile id in the `x-user-id`
        // header stands in for a full sign-in flow. Never active in production.
        if config.env == Env::Local {
            if let Some(user_id_header) = parts.headers.get("x-user-id") {
                if let Ok(id_str) = user_id_header.to_str() {
                    if let Ok(user_id) = Uuid::parse_str(id_str) {
                        // The profile must exist so roles resolve against real rows.
                        if let Some(user) = repo.get_user(user_id).await {
                            let roles = resolver.resolve(&repo, user.id, &user.email).await;
                            return Ok(AuthUser {
                                id: user.id,
                                email: user.email,
                                roles,
                            });
                        }
                    }
                }
            }
        }

        // Bearer token extraction.
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(StatusCode::UNAUTHORIZED)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(StatusCode::UNAUTHORIZED)?;

        let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
        let mut validation = Validation::default();
        validation.validate_exp = true;

        // Expired signature, bad signature, and malformed tokens all collapse
        // to 401; the distinction is not the client's business.
        let token_data = decode::<Claims>(token, &decoding_key, &validation)
            .map_err(|_| StatusCode::UNAUTHORIZED)?;

        let user_id = token_data.claims.sub;
        let email = token_data.claims.email;

        // Lazily mirror the provider identity into `profiles`. If the row
        // exists its email is refreshed; if the upsert itself fails we cannot
        // trust the rest of the persistence layer for this request.
        let user = match repo.get_user(user_id).await {
            Some(user) => user,
            None => repo
                .upsert_user(user_id, &email)
                .await
                .ok_or(StatusCode::UNAUTHORIZED)?,
        };

        let roles = resolver.resolve(&repo, user.id, &user.email).await;

        Ok(AuthUser {
            id: user.id,
            email: user.email,
            roles,
        })
    }
}
