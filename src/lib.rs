use axum::{
    Json, Router,
    extract::{FromRef, Request},
    http::{HeaderName, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod auth;
pub mod billing;
pub mod config;
pub mod email;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod roles;
pub mod sitemap;

// Module for routing segregation (Public, Authenticated, Admin).
pub mod routes;
use auth::AuthUser;
use models::ErrorResponse;
use roles::Role;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

// Makes core state types easily accessible to the application entry point.
pub use billing::{BillingState, MockSubscriptionService, StripeClient};
pub use config::AppConfig;
pub use email::{EmailState, MockEmailService, ResendClient};
pub use repository::{PostgresRepository, RepositoryState};
pub use roles::{ResolverState, RoleResolver};

/// ApiDoc
///
/// Auto-generates the OpenAPI documentation for the application from the
/// `#[utoipa::path]` and `#[derive(utoipa::ToSchema)]` annotations. The
/// resulting JSON is served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::get_posts, handlers::get_post_by_slug, handlers::get_newsletters,
        handlers::get_newsletter_details, handlers::subscribe_newsletter, handlers::get_sitemap,
        handlers::get_me, handlers::check_subscription,
        handlers::create_checkout_session, handlers::create_portal_session,
        handlers::get_admin_users, handlers::grant_role, handlers::revoke_role,
        handlers::get_admin_posts, handlers::create_post, handlers::update_post,
        handlers::delete_post, handlers::get_admin_newsletters, handlers::create_newsletter,
        handlers::update_newsletter, handlers::delete_newsletter, handlers::get_admin_stats
    ),
    components(
        schemas(
            models::Post, models::Newsletter, models::User, models::UserWithRoles,
            models::UserProfile, models::AdminDashboardStats, models::SubscriptionStatus,
            models::CreatePostRequest, models::UpdatePostRequest,
            models::CreateNewsletterRequest, models::UpdateNewsletterRequest,
            models::SubscribeRequest, models::SubscribeResponse,
            models::CheckoutRequest, models::BillingSessionResponse,
            models::RoleGrantRequest, models::RoleChangeResponse, models::ErrorResponse,
            roles::Role, roles::Tier,
        )
    ),
    tags(
        (name = "sfru-portal", description = "Security for the Rest of Us API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single, thread-safe, immutable container holding all application
/// services and configuration, constructed once at boot and shared across all
/// requests. There is no other global state: the role resolver, repository,
/// and billing client are all injected through here.
#[derive(Clone)]
pub struct AppState {
    /// Repository layer: abstracts database access via the PgPool connection.
    pub repo: RepositoryState,
    /// Billing layer: the subscription collaborator (Stripe or mock).
    pub billing: BillingState,
    /// Email layer: the transactional mail collaborator (Resend or mock).
    pub email: EmailState,
    /// Role resolver: computes effective role sets per request.
    pub resolver: ResolverState,
    /// Configuration: the loaded, immutable environment configuration.
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

// These let extractors and middleware pull individual services out of the
// shared AppState instead of depending on the whole container.

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for BillingState {
    fn from_ref(app_state: &AppState) -> BillingState {
        app_state.billing.clone()
    }
}

impl FromRef<AppState> for EmailState {
    fn from_ref(app_state: &AppState) -> EmailState {
        app_state.email.clone()
    }
}

impl FromRef<AppState> for ResolverState {
    fn from_ref(app_state: &AppState) -> ResolverState {
        app_state.resolver.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Enforces authentication for the authenticated route tree. `AuthUser`
/// implements `FromRequestParts`, so a failed extraction (bad or missing JWT,
/// unknown user) rejects the request with 401 before the handler runs.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

// The requirement the admin gate checks. An empty slice would allow everyone;
// `allows` admits any caller whose effective set intersects it or holds admin.
const ADMIN_REQUIRED: &[Role] = &[Role::Admin];

/// admin_gate
///
/// The access gate for the admin route tree. Unauthenticated callers are
/// rejected 401 by the extractor; authenticated callers whose effective role
/// set does not satisfy the requirement get a 403 with a JSON error body,
/// which the frontend turns into its access-denied page.
async fn admin_gate(auth_user: AuthUser, request: Request, next: Next) -> Response {
    if auth_user.roles.allows(ADMIN_REQUIRED) {
        return next.run(request).await;
    }

    tracing::warn!(user_id = %auth_user.id, "admin gate denied request");
    (
        StatusCode::FORBIDDEN,
        Json(ErrorResponse {
            error: "You don't have permission to access this area".to_string(),
        }),
    )
        .into_response()
}

/// create_router
///
/// Assembles the application's entire routing structure, applies global and
/// scoped middleware, and registers the application state.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for request correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly
    let base_router = Router::new()
        // Documentation: serve the auto-generated Swagger UI.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Public routes: no middleware applied.
        .merge(public::public_routes())
        // Authenticated routes: any signed-in user.
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        // Admin routes: nested under '/admin', wrapped in the admin gate.
        // Reaching a handler here requires both a valid session and an
        // effective role set that satisfies the admin requirement.
        .nest(
            "/admin",
            admin::admin_routes()
                .route_layer(middleware::from_fn_with_state(state.clone(), admin_gate)),
        )
        // Apply the unified state to all routes.
        .with_state(state);

    // 3. Observability and Correlation Layers (applied outermost)
    base_router
        .layer(
            ServiceBuilder::new()
                // 3a. Request ID generation: a unique UUID per incoming request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 3b. Request tracing: wraps the request/response lifecycle in
                // a span carrying the generated request id.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 3c. Request ID propagation back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS layer.
        .layer(cors)
}

/// trace_span_logger
///
/// Customizes TraceLayer span creation: pulls the `x-request-id` header (if
/// present) into the structured logging metadata alongside method and URI, so
/// every log line for one request is correlated by a unique id.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
