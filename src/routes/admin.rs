use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, post, put},
};

/// Admin Router Module
///
/// Routes for the management dashboard: user/role administration, content
/// administration across all workflow statuses, and the stats counters.
///
/// Access control: this entire router is nested under `/admin` and wrapped in
/// the admin gate middleware (see `create_router`), which requires an
/// authenticated user whose effective role set passes `allows(&[Admin])`.
/// The role-mutation handlers additionally re-check `is_admin` themselves so
/// a non-admin caller can never cause a persisted change.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin/stats
        // Dashboard counters (posts, published posts, users, subscribers).
        .route("/stats", get(handlers::get_admin_stats))
        // --- User & role administration ---
        // GET /admin/users
        // Every profile with its persisted roles and cached tier.
        .route("/users", get(handlers::get_admin_users))
        // POST /admin/users/{id}/roles
        // Grants a role. Duplicate grants are informational, not errors.
        .route("/users/{id}/roles", post(handlers::grant_role))
        // DELETE /admin/users/{id}/roles/{role}
        // Revokes a role assignment. May leave the user role-less; the
        // resolver then falls back to the implicit `user` baseline.
        .route("/users/{id}/roles/{role}", delete(handlers::revoke_role))
        // --- Content administration ---
        // Articles in every workflow status, plus create/update/delete.
        .route(
            "/posts",
            get(handlers::get_admin_posts).post(handlers::create_post),
        )
        .route(
            "/posts/{id}",
            put(handlers::update_post).delete(handlers::delete_post),
        )
        // Newsletter issues in every status, plus create/update/delete.
        .route(
            "/newsletters",
            get(handlers::get_admin_newsletters).post(handlers::create_newsletter),
        )
        .route(
            "/newsletters/{id}",
            put(handlers::update_newsletter).delete(handlers::delete_newsletter),
        )
}
