use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// Routes for any signed-in user, regardless of role. The `AuthUser`
/// extractor middleware layered above this module guarantees every handler
/// here receives a validated identity with a freshly resolved effective role
/// set.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /me
        // The authenticated user's profile, including role and tier badges.
        .route("/me", get(handlers::get_me))
        // POST /me/subscription/check
        // On-demand subscription check against the billing provider. Updates
        // the cached entitlement tier the role resolver reads.
        .route(
            "/me/subscription/check",
            post(handlers::check_subscription),
        )
        // POST /me/checkout
        // Hosted checkout session for buying a paid tier.
        .route("/me/checkout", post(handlers::create_checkout_session))
        // POST /me/portal
        // Hosted customer-portal session for managing a subscription.
        .route("/me/portal", post(handlers::create_portal_session))
}
