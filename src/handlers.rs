use crate::{
    AppState,
    auth::AuthUser,
    models::{
        self, AdminDashboardStats, BillingSessionResponse, CheckoutRequest,
        CreateNewsletterRequest, CreatePostRequest, ErrorResponse, Newsletter, Post,
        RoleChangeResponse, RoleGrantRequest, SubscribeRequest, SubscribeResponse,
        SubscriptionStatus, UpdateNewsletterRequest, UpdatePostRequest, UserProfile,
        UserWithRoles,
    },
    roles::Role,
    sitemap,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

// --- Filter Structs ---

/// PostFilter
///
/// Accepted query parameters for the public article listing (GET /posts).
#[derive(Deserialize, utoipa::IntoParams)]
pub struct PostFilter {
    /// Optional exact-match filter on the article tag.
    pub tag: Option<String>,
    /// Optional search string matched against title, description, and tag.
    pub search: Option<String>,
}

/// StatusFilter
///
/// Accepted query parameters for the dashboard article listing
/// (GET /admin/posts).
#[derive(Deserialize, utoipa::IntoParams)]
pub struct StatusFilter {
    /// Optional workflow status (`draft`, `review`, `golive`).
    pub status: Option<String>,
}

fn permission_denied() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::FORBIDDEN,
        Json(ErrorResponse {
            error: "You don't have permission to manage roles".to_string(),
        }),
    )
}

// --- Public Handlers ---

/// get_posts
///
/// [Public Route] Lists published articles with tag filtering and search.
///
/// *Security*: the repository applies `status = 'golive'` unconditionally, so
/// drafts and posts pending review never leak to anonymous readers.
#[utoipa::path(
    get,
    path = "/posts",
    params(PostFilter),
    responses((status = 200, description = "Published articles", body = [Post]))
)]
pub async fn get_posts(
    State(state): State<AppState>,
    Query(filter): Query<PostFilter>,
) -> Json<Vec<models::Post>> {
    let posts = state.repo.get_published_posts(filter.tag, filter.search).await;
    Json(posts)
}

/// get_post_by_slug
///
/// [Public Route] Retrieves a single published article by its slug.
/// Unpublished articles answer 404, indistinguishable from missing ones.
#[utoipa::path(
    get,
    path = "/posts/{slug}",
    params(("slug" = String, Path, description = "Article slug")),
    responses(
        (status = 200, description = "Found", body = Post),
        (status = 404, description = "Not Found or Not Published")
    )
)]
pub async fn get_post_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<models::Post>, StatusCode> {
    match state.repo.get_published_post_by_slug(&slug).await {
        Some(post) => Ok(Json(post)),
        None => Err(StatusCode::NOT_FOUND),
    }
}

/// get_newsletters
///
/// [Public Route] Lists published newsletter issues, newest first.
#[utoipa::path(
    get,
    path = "/newsletters",
    responses((status = 200, description = "Published newsletters", body = [Newsletter]))
)]
pub async fn get_newsletters(State(state): State<AppState>) -> Json<Vec<models::Newsletter>> {
    let newsletters = state.repo.get_published_newsletters().await;
    Json(newsletters)
}

/// get_newsletter_details
///
/// [Public Route] Retrieves a single published newsletter issue by id.
#[utoipa::path(
    get,
    path = "/newsletters/{id}",
    params(("id" = Uuid, Path, description = "Newsletter ID")),
    responses(
        (status = 200, description = "Found", body = Newsletter),
        (status = 404, description = "Not Found or Not Published")
    )
)]
pub async fn get_newsletter_details(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<models::Newsletter>, StatusCode> {
    match state.repo.get_published_newsletter(id).await {
        Some(issue) => Ok(Json(issue)),
        None => Err(StatusCode::NOT_FOUND),
    }
}

/// subscribe_newsletter
///
/// [Public Route] Newsletter signup form target.
///
/// *Idempotency*: the subscriber table is keyed on email with
/// `ON CONFLICT DO NOTHING`, so a repeat signup is answered 200 with
/// `already_subscribed` rather than an error.
#[utoipa::path(
    post,
    path = "/newsletter/subscribe",
    request_body = SubscribeRequest,
    responses(
        (status = 200, description = "Subscribed", body = SubscribeResponse),
        (status = 400, description = "Missing email", body = ErrorResponse)
    )
)]
pub async fn subscribe_newsletter(
    State(state): State<AppState>,
    Json(payload): Json<SubscribeRequest>,
) -> Result<Json<SubscribeResponse>, (StatusCode, Json<ErrorResponse>)> {
    let email = match payload.email.as_deref().map(str::trim) {
        Some(email) if !email.is_empty() => email.to_string(),
        _ => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "Missing required field: email".to_string(),
                }),
            ));
        }
    };

    match state.repo.add_subscriber(&email, payload.name.clone()).await {
        Ok(true) => {
            // Welcome email for first-time subscribers only. The row is
            // already persisted, so a provider failure is logged rather than
            // turned into an error the caller would retry into a double-send.
            if let Err(e) = state
                .email
                .send_welcome(&email, payload.name.as_deref())
                .await
            {
                tracing::error!(%email, "welcome email failed: {}", e);
            }
            Ok(Json(SubscribeResponse {
                status: "subscribed".to_string(),
            }))
        }
        Ok(false) => Ok(Json(SubscribeResponse {
            status: "already_subscribed".to_string(),
        })),
        Err(e) => {
            tracing::error!("subscribe error: {:?}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Failed to save subscriber information".to_string(),
                }),
            ))
        }
    }
}

/// get_sitemap
///
/// [Public Route] Renders sitemap.xml from the currently published content.
#[utoipa::path(
    get,
    path = "/sitemap.xml",
    responses((status = 200, description = "Sitemap XML", content_type = "application/xml"))
)]
pub async fn get_sitemap(State(state): State<AppState>) -> impl IntoResponse {
    let posts = state.repo.get_published_posts(None, None).await;
    let newsletters = state.repo.get_published_newsletters().await;
    let xml = sitemap::generate_sitemap(&state.config.site_base_url, &posts, &newsletters);

    ([(header::CONTENT_TYPE, "application/xml")], xml)
}

// --- Authenticated Handlers ---

/// get_me
///
/// [Authenticated Route] The authenticated user's own profile, including the
/// combined role-and-tier labels the dashboard renders as badges. Because the
/// extractor re-resolves roles on every request, this always reflects the
/// latest role mutations and subscription checks.
#[utoipa::path(
    get,
    path = "/me",
    responses((status = 200, description = "Profile", body = UserProfile))
)]
pub async fn get_me(AuthUser { id, email, roles }: AuthUser) -> Json<UserProfile> {
    Json(UserProfile {
        id,
        email,
        roles: roles.labels(),
        tier: roles.tier(),
        // Stable, unique avatar derived from the user id.
        avatar_url: Some(format!(
            "https://api.dicebear.com/7.x/avataaars/svg?seed={}",
            id
        )),
    })
}

/// check_subscription
///
/// [Authenticated Route] Asks the billing provider for the user's current
/// subscription and caches the resulting tier, which the role resolver folds
/// into subsequent requests. This endpoint is the only writer of tier state.
///
/// A billing provider failure answers 502 and leaves the cached tier as-is.
#[utoipa::path(
    post,
    path = "/me/subscription/check",
    responses(
        (status = 200, description = "Current subscription", body = SubscriptionStatus),
        (status = 502, description = "Billing provider unavailable")
    )
)]
pub async fn check_subscription(
    AuthUser { id, email, .. }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<SubscriptionStatus>, StatusCode> {
    let status = state.billing.check(&email).await.map_err(|e| {
        tracing::error!(user_id = %id, "subscription check failed: {}", e);
        StatusCode::BAD_GATEWAY
    })?;

    // The caller still gets the fresh status when the cache write fails, but
    // the resolver will keep serving the previous tier until a later check
    // succeeds, so the discrepancy is worth a log line.
    if !state.repo.set_tier(id, status.tier, status.expires_at).await {
        tracing::error!(user_id = %id, "tier cache write failed; resolver will serve stale tier");
    }

    Ok(Json(status))
}

/// create_checkout_session
///
/// [Authenticated Route] Starts a paid-tier purchase: creates (or finds) the
/// billing customer for the user's email and returns the hosted checkout URL
/// the frontend navigates to. Payment itself happens entirely on the
/// provider's pages; entitlement shows up here via the subscription check.
#[utoipa::path(
    post,
    path = "/me/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Hosted checkout URL", body = BillingSessionResponse),
        (status = 502, description = "Billing provider unavailable")
    )
)]
pub async fn create_checkout_session(
    AuthUser { id, email, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<Json<BillingSessionResponse>, StatusCode> {
    let base = state.config.site_base_url.trim_end_matches('/');
    let success_url = format!("{base}/payment-success?session_id={{CHECKOUT_SESSION_ID}}");
    let cancel_url = format!("{base}/pricing");

    let url = state
        .billing
        .create_checkout(&email, id, payload.tier, &success_url, &cancel_url)
        .await
        .map_err(|e| {
            tracing::error!(user_id = %id, "checkout session failed: {}", e);
            StatusCode::BAD_GATEWAY
        })?;

    Ok(Json(BillingSessionResponse { url }))
}

/// create_portal_session
///
/// [Authenticated Route] Opens the hosted customer portal for managing an
/// existing subscription. A user with no billing customer record gets 404.
#[utoipa::path(
    post,
    path = "/me/portal",
    responses(
        (status = 200, description = "Hosted portal URL", body = BillingSessionResponse),
        (status = 404, description = "No billing customer for this user", body = ErrorResponse),
        (status = 502, description = "Billing provider unavailable")
    )
)]
pub async fn create_portal_session(
    AuthUser { id, email, .. }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<BillingSessionResponse>, (StatusCode, Json<ErrorResponse>)> {
    let base = state.config.site_base_url.trim_end_matches('/');
    let return_url = format!("{base}/account");

    let session = state
        .billing
        .create_portal(&email, &return_url)
        .await
        .map_err(|e| {
            tracing::error!(user_id = %id, "portal session failed: {}", e);
            (
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse {
                    error: "Billing provider unavailable".to_string(),
                }),
            )
        })?;

    match session {
        Some(url) => Ok(Json(BillingSessionResponse { url })),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "No billing customer found for this user".to_string(),
            }),
        )),
    }
}

// --- Admin Handlers ---

/// get_admin_users
///
/// [Admin Route] The role-management table: every profile with its persisted
/// role assignments and cached entitlement tier.
#[utoipa::path(
    get,
    path = "/admin/users",
    responses((status = 200, description = "Users with roles", body = [UserWithRoles]))
)]
pub async fn get_admin_users(State(state): State<AppState>) -> Json<Vec<models::UserWithRoles>> {
    Json(state.repo.list_users_with_roles().await)
}

/// grant_role
///
/// [Admin Route] Assigns a role to a user.
///
/// *RBAC*: the admin gate already protects the route; the explicit
/// `is_admin` check here guarantees a non-admin caller can never cause a
/// persisted change even if this handler is reached some other way.
///
/// *Idempotency*: granting an already-held role is answered 200 with
/// `already_assigned` — an informational outcome, not an error.
#[utoipa::path(
    post,
    path = "/admin/users/{id}/roles",
    params(("id" = Uuid, Path, description = "Target user ID")),
    request_body = RoleGrantRequest,
    responses(
        (status = 200, description = "Granted or already assigned", body = RoleChangeResponse),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse),
        (status = 404, description = "Target user not found")
    )
)]
pub async fn grant_role(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<RoleGrantRequest>,
) -> Result<Json<RoleChangeResponse>, (StatusCode, Json<ErrorResponse>)> {
    if !auth_user.roles.is_admin() {
        return Err(permission_denied());
    }

    if state.repo.get_user(user_id).await.is_none() {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "User not found".to_string(),
            }),
        ));
    }

    match state.repo.add_role(user_id, payload.role).await {
        Ok(true) => Ok(Json(RoleChangeResponse {
            status: "added".to_string(),
            role: payload.role,
        })),
        Ok(false) => Ok(Json(RoleChangeResponse {
            status: "already_assigned".to_string(),
            role: payload.role,
        })),
        Err(e) => {
            tracing::error!(%user_id, "grant_role error: {:?}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Failed to add role".to_string(),
                }),
            ))
        }
    }
}

/// revoke_role
///
/// [Admin Route] Removes a role assignment. Deliberately unconditional: the
/// last role may be removed, in which case the user resolves back to the
/// implicit `user` baseline on their next request.
#[utoipa::path(
    delete,
    path = "/admin/users/{id}/roles/{role}",
    params(
        ("id" = Uuid, Path, description = "Target user ID"),
        ("role" = String, Path, description = "Role name to remove")
    ),
    responses(
        (status = 200, description = "Removed", body = RoleChangeResponse),
        (status = 400, description = "Unknown role name", body = ErrorResponse),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse),
        (status = 404, description = "Assignment not found")
    )
)]
pub async fn revoke_role(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path((user_id, role)): Path<(Uuid, String)>,
) -> Result<Json<RoleChangeResponse>, (StatusCode, Json<ErrorResponse>)> {
    if !auth_user.roles.is_admin() {
        return Err(permission_denied());
    }

    let role: Role = role.parse().map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("{e}"),
            }),
        )
    })?;

    match state.repo.remove_role(user_id, role).await {
        Ok(true) => Ok(Json(RoleChangeResponse {
            status: "removed".to_string(),
            role,
        })),
        Ok(false) => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "Role assignment not found".to_string(),
            }),
        )),
        Err(e) => {
            tracing::error!(%user_id, "revoke_role error: {:?}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Failed to remove role".to_string(),
                }),
            ))
        }
    }
}

/// get_admin_posts
///
/// [Admin Route] Dashboard article listing across every workflow status,
/// optionally filtered to one.
#[utoipa::path(
    get,
    path = "/admin/posts",
    params(StatusFilter),
    responses((status = 200, description = "All articles", body = [Post]))
)]
pub async fn get_admin_posts(
    State(state): State<AppState>,
    Query(filter): Query<StatusFilter>,
) -> Json<Vec<models::Post>> {
    Json(state.repo.get_all_posts(filter.status).await)
}

/// create_post
///
/// [Admin Route] Creates an article from the dashboard editor. New articles
/// default to `draft` unless a status is supplied.
#[utoipa::path(
    post,
    path = "/admin/posts",
    request_body = CreatePostRequest,
    responses(
        (status = 201, description = "Created", body = Post),
        (status = 500, description = "Insert failed")
    )
)]
pub async fn create_post(
    State(state): State<AppState>,
    Json(payload): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<models::Post>), StatusCode> {
    match state.repo.create_post(payload).await {
        Some(post) => Ok((StatusCode::CREATED, Json(post))),
        None => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// update_post
///
/// [Admin Route] Partial update of an article; only supplied fields change.
#[utoipa::path(
    put,
    path = "/admin/posts/{id}",
    params(("id" = Uuid, Path, description = "Article ID")),
    request_body = UpdatePostRequest,
    responses(
        (status = 200, description = "Updated", body = Post),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_post(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePostRequest>,
) -> Result<Json<models::Post>, StatusCode> {
    match state.repo.update_post(id, payload).await {
        Some(post) => Ok(Json(post)),
        None => Err(StatusCode::NOT_FOUND),
    }
}

/// delete_post
///
/// [Admin Route] Deletes an article.
#[utoipa::path(
    delete,
    path = "/admin/posts/{id}",
    params(("id" = Uuid, Path, description = "Article ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_post(State(state): State<AppState>, Path(id): Path<Uuid>) -> StatusCode {
    if state.repo.delete_post(id).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// get_admin_newsletters
///
/// [Admin Route] Dashboard newsletter listing across every status.
#[utoipa::path(
    get,
    path = "/admin/newsletters",
    responses((status = 200, description = "All newsletters", body = [Newsletter]))
)]
pub async fn get_admin_newsletters(
    State(state): State<AppState>,
) -> Json<Vec<models::Newsletter>> {
    Json(state.repo.get_all_newsletters().await)
}

/// create_newsletter
///
/// [Admin Route] Creates a newsletter issue, defaulting to `draft`.
#[utoipa::path(
    post,
    path = "/admin/newsletters",
    request_body = CreateNewsletterRequest,
    responses(
        (status = 201, description = "Created", body = Newsletter),
        (status = 500, description = "Insert failed")
    )
)]
pub async fn create_newsletter(
    State(state): State<AppState>,
    Json(payload): Json<CreateNewsletterRequest>,
) -> Result<(StatusCode, Json<models::Newsletter>), StatusCode> {
    match state.repo.create_newsletter(payload).await {
        Some(issue) => Ok((StatusCode::CREATED, Json(issue))),
        None => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// update_newsletter
///
/// [Admin Route] Partial update of a newsletter issue.
#[utoipa::path(
    put,
    path = "/admin/newsletters/{id}",
    params(("id" = Uuid, Path, description = "Newsletter ID")),
    request_body = UpdateNewsletterRequest,
    responses(
        (status = 200, description = "Updated", body = Newsletter),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_newsletter(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateNewsletterRequest>,
) -> Result<Json<models::Newsletter>, StatusCode> {
    match state.repo.update_newsletter(id, payload).await {
        Some(issue) => Ok(Json(issue)),
        None => Err(StatusCode::NOT_FOUND),
    }
}

/// delete_newsletter
///
/// [Admin Route] Deletes a newsletter issue.
#[utoipa::path(
    delete,
    path = "/admin/newsletters/{id}",
    params(("id" = Uuid, Path, description = "Newsletter ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_newsletter(State(state): State<AppState>, Path(id): Path<Uuid>) -> StatusCode {
    if state.repo.delete_newsletter(id).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// get_admin_stats
///
/// [Admin Route] Dashboard counters.
#[utoipa::path(
    get,
    path = "/admin/stats",
    responses((status = 200, description = "Stats", body = AdminDashboardStats))
)]
pub async fn get_admin_stats(State(state): State<AppState>) -> Json<AdminDashboardStats> {
    Json(state.repo.get_stats().await)
}
