use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints accessible to any client, anonymous or signed-in: the public
/// reading surface of the site plus newsletter signup.
///
/// Security mandate: every content read in this module goes through a
/// repository query that filters to published rows (`status = 'golive'` for
/// posts, `'published'` for newsletters), so drafts never leak to anonymous
/// readers.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Unauthenticated liveness check for monitors and load balancers.
        .route("/health", get(|| async { "ok" }))
        // GET /posts?tag=...&search=...
        // Lists published articles with tag filtering and search.
        .route("/posts", get(handlers::get_posts))
        // GET /posts/{slug}
        // One published article, addressed by its URL slug.
        .route("/posts/{slug}", get(handlers::get_post_by_slug))
        // GET /newsletters
        // Lists published newsletter issues.
        .route("/newsletters", get(handlers::get_newsletters))
        // GET /newsletters/{id}
        // One published newsletter issue.
        .route("/newsletters/{id}", get(handlers::get_newsletter_details))
        // POST /newsletter/subscribe
        // Newsletter signup. Idempotent on email.
        .route("/newsletter/subscribe", post(handlers::subscribe_newsletter))
        // GET /sitemap.xml
        // Search-engine sitemap rendered from published content.
        .route("/sitemap.xml", get(handlers::get_sitemap))
}
