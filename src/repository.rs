use crate::models::{
    AdminDashboardStats, CreateNewsletterRequest, CreatePostRequest, Newsletter, Post,
    UpdateNewsletterRequest, UpdatePostRequest, User, UserWithRoles,
};
use crate::roles::{Role, Tier};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, query_builder::QueryBuilder};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Repository Trait
///
/// Defines the abstract contract for all persistence operations, so handlers
/// and the role resolver never depend on a concrete backend (Postgres in
/// production, an in-memory mock in tests).
///
/// Role operations return `Result` because the resolver's degraded-fallback
/// behavior needs to distinguish "no rows" from "the read failed". Content
/// reads follow the convention of logging the error and returning an empty
/// collection, keeping the public site rendering even when a query breaks.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Profiles ---
    async fn get_user(&self, id: Uuid) -> Option<User>;
    /// Creates or refreshes the local mirror of an externally-owned identity.
    async fn upsert_user(&self, id: Uuid, email: &str) -> Option<User>;
    /// All profiles joined with their persisted roles and cached tier.
    async fn list_users_with_roles(&self) -> Vec<UserWithRoles>;

    // --- Role assignments (`user_roles`) ---
    /// Persisted roles for one user. Unknown role strings are skipped.
    async fn fetch_roles(&self, user_id: Uuid) -> Result<Vec<Role>, sqlx::Error>;
    /// Idempotent insert. `Ok(false)` means the assignment already existed.
    async fn add_role(&self, user_id: Uuid, role: Role) -> Result<bool, sqlx::Error>;
    /// Unconditional delete. `Ok(false)` means there was nothing to delete.
    /// May leave the user role-less; resolution then falls back to `user`.
    async fn remove_role(&self, user_id: Uuid, role: Role) -> Result<bool, sqlx::Error>;

    // --- Entitlement tier cache (`subscription_tiers`) ---
    /// The cached tier, unless its `expires_at` has passed.
    async fn get_tier(&self, user_id: Uuid) -> Option<Tier>;
    /// Records the tier reported by the billing provider. `None` clears it.
    async fn set_tier(
        &self,
        user_id: Uuid,
        tier: Option<Tier>,
        expires_at: Option<DateTime<Utc>>,
    ) -> bool;

    // --- Posts ---
    /// Public listing: `status = 'golive'` only, with optional tag and search.
    async fn get_published_posts(&self, tag: Option<String>, search: Option<String>) -> Vec<Post>;
    async fn get_published_post_by_slug(&self, slug: &str) -> Option<Post>;
    /// Dashboard listing: every status, optionally filtered.
    async fn get_all_posts(&self, status: Option<String>) -> Vec<Post>;
    async fn create_post(&self, req: CreatePostRequest) -> Option<Post>;
    async fn update_post(&self, id: Uuid, req: UpdatePostRequest) -> Option<Post>;
    async fn delete_post(&self, id: Uuid) -> bool;

    // --- Newsletters ---
    async fn get_published_newsletters(&self) -> Vec<Newsletter>;
    async fn get_published_newsletter(&self, id: Uuid) -> Option<Newsletter>;
    async fn get_all_newsletters(&self) -> Vec<Newsletter>;
    async fn create_newsletter(&self, req: CreateNewsletterRequest) -> Option<Newsletter>;
    async fn update_newsletter(&self, id: Uuid, req: UpdateNewsletterRequest) -> Option<Newsletter>;
    async fn delete_newsletter(&self, id: Uuid) -> bool;

    // --- Newsletter subscribers ---
    /// Idempotent signup keyed on email. `Ok(false)` means already subscribed.
    async fn add_subscriber(&self, email: &str, name: Option<String>) -> Result<bool, sqlx::Error>;

    async fn get_stats(&self) -> AdminDashboardStats;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by PostgreSQL.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const POST_COLUMNS: &str = "id, title, slug, meta_description, content, header_image, tag, status, publish_date, created_at, updated_at";
const NEWSLETTER_COLUMNS: &str =
    "id, title, description, content, status, publish_date, created_at, updated_at";

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_user(&self, id: Uuid) -> Option<User> {
        sqlx::query_as::<_, User>("SELECT id, email, created_at FROM profiles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("get_user error: {:?}", e);
                None
            })
    }

    async fn upsert_user(&self, id: Uuid, email: &str) -> Option<User> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO profiles (id, email, created_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (id) DO UPDATE SET email = EXCLUDED.email
            RETURNING id, email, created_at
            "#,
        )
        .bind(id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("upsert_user error: {:?}", e);
            None
        })
    }

    /// list_users_with_roles
    ///
    /// Assembles the role-management view from three point queries and an
    /// in-memory fold. The tables are small (one row per assignment) and this
    /// keeps each query trivially indexable.
    async fn list_users_with_roles(&self) -> Vec<UserWithRoles> {
        let users = sqlx::query_as::<_, User>(
            "SELECT id, email, created_at FROM profiles ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("list_users error: {:?}", e);
            vec![]
        });

        let role_rows = sqlx::query("SELECT user_id, role FROM user_roles")
            .fetch_all(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("list_roles error: {:?}", e);
                vec![]
            });

        let mut roles_by_user: HashMap<Uuid, Vec<Role>> = HashMap::new();
        for row in role_rows {
            let user_id: Uuid = row.get("user_id");
            let raw: String = row.get("role");
            match raw.parse::<Role>() {
                Ok(role) => roles_by_user.entry(user_id).or_default().push(role),
                Err(e) => tracing::warn!(%user_id, "skipping unrecognized role row: {}", e),
            }
        }

        let tier_rows = sqlx::query("SELECT user_id, tier FROM subscription_tiers")
            .fetch_all(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("list_tiers error: {:?}", e);
                vec![]
            });

        let mut tier_by_user: HashMap<Uuid, Tier> = HashMap::new();
        for row in tier_rows {
            let user_id: Uuid = row.get("user_id");
            let raw: Option<String> = row.get("tier");
            if let Some(tier) = raw.and_then(|t| t.parse::<Tier>().ok()) {
                tier_by_user.insert(user_id, tier);
            }
        }

        users
            .into_iter()
            .map(|u| UserWithRoles {
                roles: roles_by_user.remove(&u.id).unwrap_or_default(),
                tier: tier_by_user.remove(&u.id),
                id: u.id,
                email: u.email,
                created_at: u.created_at,
            })
            .collect()
    }

    async fn fetch_roles(&self, user_id: Uuid) -> Result<Vec<Role>, sqlx::Error> {
        let rows =
            sqlx::query_scalar::<_, String>("SELECT role FROM user_roles WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;

        // The column is free text at the SQL level; the closed set is enforced
        // here. A row that fails to parse is operator data corruption, not a
        // reason to fail the whole resolution.
        Ok(rows
            .into_iter()
            .filter_map(|raw| match raw.parse::<Role>() {
                Ok(role) => Some(role),
                Err(e) => {
                    tracing::warn!(%user_id, "skipping unrecognized role row: {}", e);
                    None
                }
            })
            .collect())
    }

    /// add_role
    ///
    /// `ON CONFLICT DO NOTHING` against the `(user_id, role)` uniqueness
    /// constraint makes the grant idempotent; duplicate rows cannot exist.
    async fn add_role(&self, user_id: Uuid, role: Role) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("INSERT INTO user_roles (user_id, role) VALUES ($1, $2) ON CONFLICT DO NOTHING")
                .bind(user_id)
                .bind(role.as_str())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_role(&self, user_id: Uuid, role: Role) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND role = $2")
            .bind(user_id)
            .bind(role.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// get_tier
    ///
    /// A cached tier is only effective until its `expires_at`; a lapsed row
    /// reads as no tier, without waiting for the user to re-run the
    /// subscription check.
    async fn get_tier(&self, user_id: Uuid) -> Option<Tier> {
        let raw = sqlx::query_scalar::<_, Option<String>>(
            "SELECT tier FROM subscription_tiers
             WHERE user_id = $1 AND (expires_at IS NULL OR expires_at > NOW())",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("get_tier error: {:?}", e);
            None
        });

        raw.flatten().and_then(|t| t.parse::<Tier>().ok())
    }

    async fn set_tier(
        &self,
        user_id: Uuid,
        tier: Option<Tier>,
        expires_at: Option<DateTime<Utc>>,
    ) -> bool {
        let result = sqlx::query(
            r#"
            INSERT INTO subscription_tiers (user_id, tier, expires_at, checked_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (user_id)
            DO UPDATE SET tier = EXCLUDED.tier, expires_at = EXCLUDED.expires_at, checked_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(tier.map(|t| t.as_str()))
        .bind(expires_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => true,
            Err(e) => {
                tracing::error!("set_tier error: {:?}", e);
                false
            }
        }
    }

    /// get_published_posts
    ///
    /// Implements the public listing with QueryBuilder for safe
    /// parameterization. The `status = 'golive'` restriction is part of the
    /// base query and cannot be filtered away.
    async fn get_published_posts(&self, tag: Option<String>, search: Option<String>) -> Vec<Post> {
        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE status = 'golive'"
        ));

        if let Some(t) = tag {
            builder.push(" AND tag = ");
            builder.push_bind(t);
        }

        if let Some(s) = search {
            // Case-insensitive search across title, description, and tag.
            let pattern = format!("%{}%", s);
            builder.push(" AND (title ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR meta_description ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR tag ILIKE ");
            builder.push_bind(pattern);
            builder.push(")");
        }

        builder.push(" ORDER BY publish_date DESC NULLS LAST, created_at DESC");

        match builder.build_query_as::<Post>().fetch_all(&self.pool).await {
            Ok(posts) => posts,
            Err(e) => {
                tracing::error!("get_published_posts error: {:?}", e);
                vec![]
            }
        }
    }

    async fn get_published_post_by_slug(&self, slug: &str) -> Option<Post> {
        sqlx::query_as::<_, Post>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE slug = $1 AND status = 'golive'"
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("get_published_post_by_slug error: {:?}", e);
            None
        })
    }

    async fn get_all_posts(&self, status: Option<String>) -> Vec<Post> {
        let mut builder: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new(format!("SELECT {POST_COLUMNS} FROM posts"));

        if let Some(s) = status {
            builder.push(" WHERE status = ");
            builder.push_bind(s);
        }

        builder.push(" ORDER BY updated_at DESC");

        match builder.build_query_as::<Post>().fetch_all(&self.pool).await {
            Ok(posts) => posts,
            Err(e) => {
                tracing::error!("get_all_posts error: {:?}", e);
                vec![]
            }
        }
    }

    /// create_post
    ///
    /// New posts default to `draft`. `publish_date` is stamped only when the
    /// post is created directly in `golive`.
    async fn create_post(&self, req: CreatePostRequest) -> Option<Post> {
        let status = req.status.unwrap_or_else(|| "draft".to_string());
        sqlx::query_as::<_, Post>(&format!(
            r#"
            INSERT INTO posts (id, title, slug, meta_description, content, header_image, tag, status, publish_date, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8,
                    CASE WHEN $8 = 'golive' THEN NOW() ELSE NULL END,
                    NOW(), NOW())
            RETURNING {POST_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(req.title)
        .bind(req.slug)
        .bind(req.meta_description)
        .bind(req.content)
        .bind(req.header_image)
        .bind(req.tag)
        .bind(status)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("create_post error: {:?}", e);
            None
        })
    }

    /// update_post
    ///
    /// COALESCE-based partial update. Moving a post into `golive` stamps
    /// `publish_date` the first time only.
    async fn update_post(&self, id: Uuid, req: UpdatePostRequest) -> Option<Post> {
        sqlx::query_as::<_, Post>(&format!(
            r#"
            UPDATE posts
            SET title = COALESCE($2, title),
                slug = COALESCE($3, slug),
                meta_description = COALESCE($4, meta_description),
                content = COALESCE($5, content),
                header_image = COALESCE($6, header_image),
                tag = COALESCE($7, tag),
                status = COALESCE($8, status),
                publish_date = CASE
                    WHEN COALESCE($8, status) = 'golive' THEN COALESCE(publish_date, NOW())
                    ELSE publish_date
                END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {POST_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(req.title)
        .bind(req.slug)
        .bind(req.meta_description)
        .bind(req.content)
        .bind(req.header_image)
        .bind(req.tag)
        .bind(req.status)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("update_post error: {:?}", e);
            None
        })
    }

    async fn delete_post(&self, id: Uuid) -> bool {
        match sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
        {
            Ok(res) => res.rows_affected() > 0,
            Err(e) => {
                tracing::error!("delete_post error: {:?}", e);
                false
            }
        }
    }

    async fn get_published_newsletters(&self) -> Vec<Newsletter> {
        sqlx::query_as::<_, Newsletter>(&format!(
            "SELECT {NEWSLETTER_COLUMNS} FROM newsletters WHERE status = 'published' ORDER BY publish_date DESC NULLS LAST, created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("get_published_newsletters error: {:?}", e);
            vec![]
        })
    }

    async fn get_published_newsletter(&self, id: Uuid) -> Option<Newsletter> {
        sqlx::query_as::<_, Newsletter>(&format!(
            "SELECT {NEWSLETTER_COLUMNS} FROM newsletters WHERE id = $1 AND status = 'published'"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("get_published_newsletter error: {:?}", e);
            None
        })
    }

    async fn get_all_newsletters(&self) -> Vec<Newsletter> {
        sqlx::query_as::<_, Newsletter>(&format!(
            "SELECT {NEWSLETTER_COLUMNS} FROM newsletters ORDER BY updated_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("get_all_newsletters error: {:?}", e);
            vec![]
        })
    }

    async fn create_newsletter(&self, req: CreateNewsletterRequest) -> Option<Newsletter> {
        let status = req.status.unwrap_or_else(|| "draft".to_string());
        sqlx::query_as::<_, Newsletter>(&format!(
            r#"
            INSERT INTO newsletters (id, title, description, content, status, publish_date, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5,
                    CASE WHEN $5 = 'published' THEN NOW() ELSE NULL END,
                    NOW(), NOW())
            RETURNING {NEWSLETTER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(req.title)
        .bind(req.description)
        .bind(req.content)
        .bind(status)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("create_newsletter error: {:?}", e);
            None
        })
    }

    async fn update_newsletter(&self, id: Uuid, req: UpdateNewsletterRequest) -> Option<Newsletter> {
        sqlx::query_as::<_, Newsletter>(&format!(
            r#"
            UPDATE newsletters
            SET title = COALESCE($2, title),
                description = COALESCE($3, description),
                content = COALESCE($4, content),
                status = COALESCE($5, status),
                publish_date = CASE
                    WHEN COALESCE($5, status) = 'published' THEN COALESCE(publish_date, NOW())
                    ELSE publish_date
                END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {NEWSLETTER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(req.title)
        .bind(req.description)
        .bind(req.content)
        .bind(req.status)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("update_newsletter error: {:?}", e);
            None
        })
    }

    async fn delete_newsletter(&self, id: Uuid) -> bool {
        match sqlx::query("DELETE FROM newsletters WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
        {
            Ok(res) => res.rows_affected() > 0,
            Err(e) => {
                tracing::error!("delete_newsletter error: {:?}", e);
                false
            }
        }
    }

    /// add_subscriber
    ///
    /// Signup is keyed on email with `ON CONFLICT DO NOTHING`, so repeat
    /// submissions from the same address are harmless.
    async fn add_subscriber(&self, email: &str, name: Option<String>) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO newsletter_subscribers (email, name, status, source, subscribed_at)
            VALUES ($1, $2, 'active', 'website', NOW())
            ON CONFLICT (email) DO NOTHING
            "#,
        )
        .bind(email)
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_stats(&self) -> AdminDashboardStats {
        let total_posts = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await
            .unwrap_or(0);
        let published_posts =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM posts WHERE status = 'golive'")
                .fetch_one(&self.pool)
                .await
                .unwrap_or(0);
        let total_users = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM profiles")
            .fetch_one(&self.pool)
            .await
            .unwrap_or(0);
        let total_subscribers =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM newsletter_subscribers")
                .fetch_one(&self.pool)
                .await
                .unwrap_or(0);

        AdminDashboardStats {
            total_posts,
            published_posts,
            total_users,
            total_subscribers,
        }
    }
}
