use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::roles::{Role, Tier};

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// The minimal local mirror of an identity owned by the external auth
/// provider, stored in `public.profiles`. Created lazily on a user's first
/// authenticated request; roles and tiers reference it by id.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct User {
    // Primary key, equal to the auth provider's user id.
    pub id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Post
///
/// An article record from `public.posts`. Only rows with `status = 'golive'`
/// are visible to anonymous readers; the dashboard sees every status.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    /// URL path segment, unique across posts.
    pub slug: String,
    pub meta_description: String,
    /// Rich-text body produced by the dashboard editor.
    pub content: String,
    pub header_image: Option<String>,
    pub tag: Option<String>,
    /// One of `draft`, `review`, `golive`.
    pub status: String,
    #[ts(type = "string | null")]
    pub publish_date: Option<DateTime<Utc>>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// Newsletter
///
/// A newsletter issue from `public.newsletters`. Anonymous readers only see
/// rows with `status = 'published'`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Newsletter {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub content: String,
    /// One of `draft`, `published`.
    pub status: String,
    #[ts(type = "string | null")]
    pub publish_date: Option<DateTime<Utc>>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

// --- Request Payloads (Input Schemas) ---

/// CreatePostRequest
///
/// Input payload for creating an article (POST /admin/posts).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreatePostRequest {
    pub title: String,
    pub slug: String,
    pub meta_description: String,
    pub content: String,
    pub header_image: Option<String>,
    pub tag: Option<String>,
    /// Initial workflow status; defaults to `draft` when omitted.
    pub status: Option<String>,
}

/// UpdatePostRequest
///
/// Partial update payload for an article (PUT /admin/posts/{id}). Uses
/// `Option<T>` throughout so only the provided fields are touched.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdatePostRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta_description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_image: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// CreateNewsletterRequest
///
/// Input payload for creating a newsletter issue (POST /admin/newsletters).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateNewsletterRequest {
    pub title: String,
    pub description: String,
    pub content: String,
    pub status: Option<String>,
}

/// UpdateNewsletterRequest
///
/// Partial update payload for a newsletter issue (PUT /admin/newsletters/{id}).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateNewsletterRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// SubscribeRequest
///
/// Input payload for the public newsletter signup (POST /newsletter/subscribe).
/// `email` is optional at the serde level so the handler can answer a clean
/// 400 instead of a generic deserialization rejection.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SubscribeRequest {
    pub email: Option<String>,
    pub name: Option<String>,
}

/// SubscribeResponse
///
/// Outcome of a newsletter signup. Signing up twice is not an error; the
/// `status` field distinguishes `subscribed` from `already_subscribed`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SubscribeResponse {
    pub status: String,
}

/// RoleGrantRequest
///
/// Input payload for assigning a role (POST /admin/users/{id}/roles).
/// Deserialization enforces the closed role set; tiers are not assignable.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RoleGrantRequest {
    pub role: Role,
}

/// RoleChangeResponse
///
/// Outcome of a role mutation. A duplicate grant reports
/// `already_assigned` with a 200, mirroring the dashboard's informational
/// toast rather than an error.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RoleChangeResponse {
    pub status: String,
    pub role: Role,
}

// --- Dashboard & Profile Schemas (Output) ---

/// UserWithRoles
///
/// A row of the role-management table (GET /admin/users): the profile joined
/// with its persisted role assignments and cached entitlement tier.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserWithRoles {
    pub id: Uuid,
    pub email: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    pub roles: Vec<Role>,
    pub tier: Option<Tier>,
}

/// AdminDashboardStats
///
/// Output schema for the dashboard counters (GET /admin/stats).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AdminDashboardStats {
    pub total_posts: i64,
    pub published_posts: i64,
    pub total_users: i64,
    pub total_subscribers: i64,
}

/// UserProfile
///
/// Output schema for the authenticated user's own profile (GET /me). `roles`
/// carries the combined role-and-tier labels the frontend renders as badges.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub roles: Vec<String>,
    pub tier: Option<Tier>,
    pub avatar_url: Option<String>,
}

/// SubscriptionStatus
///
/// Result of a subscription check against the billing provider
/// (POST /me/subscription/check). `tier` is `None` both for unsubscribed
/// users and for active subscriptions on an unrecognized price.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SubscriptionStatus {
    pub subscribed: bool,
    pub tier: Option<Tier>,
    #[ts(type = "string | null")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// CheckoutRequest
///
/// Input payload for starting a paid-tier purchase (POST /me/checkout).
/// Takes the tier rather than a raw billing price id so the closed set is
/// enforced at the boundary.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CheckoutRequest {
    pub tier: Tier,
}

/// BillingSessionResponse
///
/// A hosted billing page the frontend navigates to: a checkout session
/// (POST /me/checkout) or a customer-portal session (POST /me/portal).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct BillingSessionResponse {
    pub url: String,
}

/// ErrorResponse
///
/// Uniform JSON error body for 4xx/5xx responses.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ErrorResponse {
    pub error: String,
}
