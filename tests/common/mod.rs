//! Shared test scaffolding: an in-memory `Repository`, state assembly, JWT
//! minting, and a helper that serves the full router on an ephemeral port.

// Not every test binary uses every helper.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use sfru_portal::{
    AppState,
    auth::Claims,
    billing::{BillingState, MockSubscriptionService},
    config::{AppConfig, Env},
    email::{EmailState, MockEmailService},
    models::{
        AdminDashboardStats, CreateNewsletterRequest, CreatePostRequest, Newsletter, Post,
        UpdateNewsletterRequest, UpdatePostRequest, User, UserWithRoles,
    },
    repository::{Repository, RepositoryState},
    roles::{AdminAllowList, ResolverState, Role, RoleResolver, Tier},
};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::net::TcpListener;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "test-secret-value-1234567890";

/// In-memory repository with just enough semantics to exercise the handlers:
/// role sets behave like the unique-keyed `user_roles` table, content rows
/// live in Vecs, and two failure switches simulate a broken role store.
#[derive(Default)]
pub struct MockRepo {
    pub users: Mutex<HashMap<Uuid, User>>,
    pub roles: Mutex<HashMap<Uuid, Vec<Role>>>,
    pub tiers: Mutex<HashMap<Uuid, (Tier, Option<DateTime<Utc>>)>>,
    pub posts: Mutex<Vec<Post>>,
    pub newsletters: Mutex<Vec<Newsletter>>,
    pub subscribers: Mutex<Vec<String>>,
    /// When true, `fetch_roles` reports a persistence read failure.
    pub fail_role_reads: bool,
    /// When true, `add_role`/`remove_role` report a persistence write failure.
    pub fail_role_writes: bool,
    /// When true, `set_tier` reports a failed cache write.
    pub fail_tier_writes: bool,
}

impl MockRepo {
    pub fn with_user(self, id: Uuid, email: &str, roles: &[Role]) -> Self {
        self.users.lock().unwrap().insert(
            id,
            User {
                id,
                email: email.to_string(),
                created_at: Utc::now(),
            },
        );
        if !roles.is_empty() {
            self.roles.lock().unwrap().insert(id, roles.to_vec());
        }
        self
    }

    pub fn with_post(self, post: Post) -> Self {
        self.posts.lock().unwrap().push(post);
        self
    }

    pub fn with_newsletter(self, issue: Newsletter) -> Self {
        self.newsletters.lock().unwrap().push(issue);
        self
    }

    fn role_error() -> sqlx::Error {
        sqlx::Error::PoolTimedOut
    }
}

#[async_trait]
impl Repository for MockRepo {
    async fn get_user(&self, id: Uuid) -> Option<User> {
        self.users.lock().unwrap().get(&id).cloned()
    }

    async fn upsert_user(&self, id: Uuid, email: &str) -> Option<User> {
        let user = User {
            id,
            email: email.to_string(),
            created_at: Utc::now(),
        };
        self.users.lock().unwrap().insert(id, user.clone());
        Some(user)
    }

    async fn list_users_with_roles(&self) -> Vec<UserWithRoles> {
        let users = self.users.lock().unwrap();
        let roles = self.roles.lock().unwrap();
        let tiers = self.tiers.lock().unwrap();
        users
            .values()
            .map(|u| UserWithRoles {
                id: u.id,
                email: u.email.clone(),
                created_at: u.created_at,
                roles: roles.get(&u.id).cloned().unwrap_or_default(),
                tier: tiers.get(&u.id).map(|(t, _)| *t),
            })
            .collect()
    }

    async fn fetch_roles(&self, user_id: Uuid) -> Result<Vec<Role>, sqlx::Error> {
        if self.fail_role_reads {
            return Err(Self::role_error());
        }
        Ok(self.roles.lock().unwrap().get(&user_id).cloned().unwrap_or_default())
    }

    async fn add_role(&self, user_id: Uuid, role: Role) -> Result<bool, sqlx::Error> {
        if self.fail_role_writes {
            return Err(Self::role_error());
        }
        let mut roles = self.roles.lock().unwrap();
        let set = roles.entry(user_id).or_default();
        if set.contains(&role) {
            Ok(false)
        } else {
            set.push(role);
            Ok(true)
        }
    }

    async fn remove_role(&self, user_id: Uuid, role: Role) -> Result<bool, sqlx::Error> {
        if self.fail_role_writes {
            return Err(Self::role_error());
        }
        let mut roles = self.roles.lock().unwrap();
        match roles.get_mut(&user_id) {
            Some(set) => {
                let before = set.len();
                set.retain(|r| *r != role);
                Ok(set.len() < before)
            }
            None => Ok(false),
        }
    }

    async fn get_tier(&self, user_id: Uuid) -> Option<Tier> {
        self.tiers
            .lock()
            .unwrap()
            .get(&user_id)
            .filter(|(_, expires_at)| expires_at.is_none_or(|e| e > Utc::now()))
            .map(|(t, _)| *t)
    }

    async fn set_tier(
        &self,
        user_id: Uuid,
        tier: Option<Tier>,
        expires_at: Option<DateTime<Utc>>,
    ) -> bool {
        if self.fail_tier_writes {
            return false;
        }
        let mut tiers = self.tiers.lock().unwrap();
        match tier {
            Some(t) => {
                tiers.insert(user_id, (t, expires_at));
            }
            None => {
                tiers.remove(&user_id);
            }
        }
        true
    }

    async fn get_published_posts(&self, tag: Option<String>, search: Option<String>) -> Vec<Post> {
        self.posts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.status == "golive")
            .filter(|p| tag.as_ref().is_none_or(|t| p.tag.as_deref() == Some(t)))
            .filter(|p| {
                search.as_ref().is_none_or(|s| {
                    let s = s.to_lowercase();
                    p.title.to_lowercase().contains(&s)
                        || p.meta_description.to_lowercase().contains(&s)
                })
            })
            .cloned()
            .collect()
    }

    async fn get_published_post_by_slug(&self, slug: &str) -> Option<Post> {
        self.posts
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.slug == slug && p.status == "golive")
            .cloned()
    }

    async fn get_all_posts(&self, status: Option<String>) -> Vec<Post> {
        self.posts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| status.as_ref().is_none_or(|s| p.status == *s))
            .cloned()
            .collect()
    }

    async fn create_post(&self, req: CreatePostRequest) -> Option<Post> {
        let now = Utc::now();
        let status = req.status.unwrap_or_else(|| "draft".to_string());
        let post = Post {
            id: Uuid::new_v4(),
            title: req.title,
            slug: req.slug,
            meta_description: req.meta_description,
            content: req.content,
            header_image: req.header_image,
            tag: req.tag,
            publish_date: (status == "golive").then_some(now),
            status,
            created_at: now,
            updated_at: now,
        };
        self.posts.lock().unwrap().push(post.clone());
        Some(post)
    }

    async fn update_post(&self, id: Uuid, req: UpdatePostRequest) -> Option<Post> {
        let mut posts = self.posts.lock().unwrap();
        let post = posts.iter_mut().find(|p| p.id == id)?;
        if let Some(title) = req.title {
            post.title = title;
        }
        if let Some(slug) = req.slug {
            post.slug = slug;
        }
        if let Some(meta) = req.meta_description {
            post.meta_description = meta;
        }
        if let Some(content) = req.content {
            post.content = content;
        }
        if let Some(image) = req.header_image {
            post.header_image = Some(image);
        }
        if let Some(tag) = req.tag {
            post.tag = Some(tag);
        }
        if let Some(status) = req.status {
            post.status = status;
            if post.status == "golive" && post.publish_date.is_none() {
                post.publish_date = Some(Utc::now());
            }
        }
        post.updated_at = Utc::now();
        Some(post.clone())
    }

    async fn delete_post(&self, id: Uuid) -> bool {
        let mut posts = self.posts.lock().unwrap();
        let before = posts.len();
        posts.retain(|p| p.id != id);
        posts.len() < before
    }

    async fn get_published_newsletters(&self) -> Vec<Newsletter> {
        self.newsletters
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.status == "published")
            .cloned()
            .collect()
    }

    async fn get_published_newsletter(&self, id: Uuid) -> Option<Newsletter> {
        self.newsletters
            .lock()
            .unwrap()
            .iter()
            .find(|n| n.id == id && n.status == "published")
            .cloned()
    }

    async fn get_all_newsletters(&self) -> Vec<Newsletter> {
        self.newsletters.lock().unwrap().clone()
    }

    async fn create_newsletter(&self, req: CreateNewsletterRequest) -> Option<Newsletter> {
        let now = Utc::now();
        let status = req.status.unwrap_or_else(|| "draft".to_string());
        let issue = Newsletter {
            id: Uuid::new_v4(),
            title: req.title,
            description: req.description,
            content: req.content,
            publish_date: (status == "published").then_some(now),
            status,
            created_at: now,
            updated_at: now,
        };
        self.newsletters.lock().unwrap().push(issue.clone());
        Some(issue)
    }

    async fn update_newsletter(&self, id: Uuid, req: UpdateNewsletterRequest) -> Option<Newsletter> {
        let mut newsletters = self.newsletters.lock().unwrap();
        let issue = newsletters.iter_mut().find(|n| n.id == id)?;
        if let Some(title) = req.title {
            issue.title = title;
        }
        if let Some(description) = req.description {
            issue.description = description;
        }
        if let Some(content) = req.content {
            issue.content = content;
        }
        if let Some(status) = req.status {
            issue.status = status;
        }
        issue.updated_at = Utc::now();
        Some(issue.clone())
    }

    async fn delete_newsletter(&self, id: Uuid) -> bool {
        let mut newsletters = self.newsletters.lock().unwrap();
        let before = newsletters.len();
        newsletters.retain(|n| n.id != id);
        newsletters.len() < before
    }

    async fn add_subscriber(&self, email: &str, _name: Option<String>) -> Result<bool, sqlx::Error> {
        let mut subscribers = self.subscribers.lock().unwrap();
        if subscribers.iter().any(|s| s == email) {
            Ok(false)
        } else {
            subscribers.push(email.to_string());
            Ok(true)
        }
    }

    async fn get_stats(&self) -> AdminDashboardStats {
        AdminDashboardStats {
            total_posts: self.posts.lock().unwrap().len() as i64,
            published_posts: self
                .posts
                .lock()
                .unwrap()
                .iter()
                .filter(|p| p.status == "golive")
                .count() as i64,
            total_users: self.users.lock().unwrap().len() as i64,
            total_subscribers: self.subscribers.lock().unwrap().len() as i64,
        }
    }
}

/// Builds an AppState around the given mocks and admin allow-list.
pub fn build_state(repo: MockRepo, billing: MockSubscriptionService, env: Env) -> AppState {
    build_state_with_admins(repo, billing, env, AdminAllowList::default())
}

pub fn build_state_with_admins(
    repo: MockRepo,
    billing: MockSubscriptionService,
    env: Env,
    admins: AdminAllowList,
) -> AppState {
    build_state_with_email(repo, billing, MockEmailService::default(), env, admins)
}

pub fn build_state_with_email(
    repo: MockRepo,
    billing: MockSubscriptionService,
    email: MockEmailService,
    env: Env,
    admins: AdminAllowList,
) -> AppState {
    let mut config = AppConfig::default();
    config.env = env;
    config.jwt_secret = TEST_JWT_SECRET.to_string();
    config.admins = admins.clone();
    config.site_base_url = "https://example.com".to_string();

    AppState {
        repo: Arc::new(repo) as RepositoryState,
        billing: Arc::new(billing) as BillingState,
        email: Arc::new(email) as EmailState,
        resolver: Arc::new(RoleResolver::new(admins)) as ResolverState,
        config,
    }
}

/// Mints a signed token for `user_id`, expiring `exp_offset` seconds from now.
pub fn create_token(user_id: Uuid, email: &str, exp_offset: i64) -> String {
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;

    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        iat: now as usize,
        exp: (now + exp_offset) as usize,
    };

    let key = EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes());
    encode(&Header::default(), &claims, &key).unwrap()
}

/// Serves the full router on an ephemeral port and returns its base address.
pub async fn spawn_app(state: AppState) -> String {
    let router = sfru_portal::create_router(state);
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("http://127.0.0.1:{}", port)
}

/// A published article fixture.
pub fn golive_post(slug: &str, tag: &str) -> Post {
    Post {
        id: Uuid::new_v4(),
        title: format!("Article: {slug}"),
        slug: slug.to_string(),
        meta_description: "A plain-language security explainer".to_string(),
        content: "<p>body</p>".to_string(),
        header_image: None,
        tag: Some(tag.to_string()),
        status: "golive".to_string(),
        publish_date: Some(Utc::now()),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// A draft article fixture.
pub fn draft_post(slug: &str) -> Post {
    Post {
        status: "draft".to_string(),
        publish_date: None,
        ..golive_post(slug, "drafts")
    }
}
