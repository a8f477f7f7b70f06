use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::repository::RepositoryState;

/// Role
///
/// The closed set of authorization tags a user can hold. Roles describe what a
/// user is allowed to do; they are persisted as rows in `user_roles` and are
/// distinct from the billing [`Tier`], which describes what a user has paid for.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    /// Full access. Subsumes every other role in permission checks.
    Admin,
    /// Can manage all site content (posts, newsletters).
    Editor,
    /// Can write and manage their own articles.
    Author,
    /// Has opted into the newsletter/member areas.
    Subscriber,
    /// The implicit baseline role every signed-in user holds.
    User,
}

impl Role {
    /// All assignable roles, in the order the admin UI presents them.
    pub const ALL: [Role; 5] = [
        Role::Admin,
        Role::Editor,
        Role::Author,
        Role::Subscriber,
        Role::User,
    ];

    /// The lowercase wire/database form of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Editor => "editor",
            Role::Author => "author",
            Role::Subscriber => "subscriber",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "editor" => Ok(Role::Editor),
            "author" => Ok(Role::Author),
            "subscriber" => Ok(Role::Subscriber),
            "user" => Ok(Role::User),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Error returned when a string does not name a member of the closed role set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown role: {}", self.0)
    }
}

impl std::error::Error for UnknownRole {}

/// Tier
///
/// The billing entitlement a user holds, as reported by the subscription
/// collaborator (Stripe). Historically the site stored tiers in `user_roles`
/// alongside authorization roles; they are now a separate tagged type and a
/// separate table so that entitlement checks and permission checks cannot be
/// conflated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Tier {
    Professional,
    Enterprise,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Professional => "professional",
            Tier::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "professional" => Ok(Tier::Professional),
            "enterprise" => Ok(Tier::Enterprise),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// EffectiveRoles
///
/// The per-request computed authorization state for a user: the union of
/// persisted roles, the admin allow-list override, and the implicit `user`
/// baseline, plus the cached entitlement tier. Never persisted; recomputed by
/// the [`RoleResolver`] on every authenticated request, so role and
/// subscription changes take effect on the next round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveRoles {
    roles: BTreeSet<Role>,
    tier: Option<Tier>,
}

impl EffectiveRoles {
    pub fn new(roles: BTreeSet<Role>, tier: Option<Tier>) -> Self {
        Self { roles, tier }
    }

    /// Checks a single role. Holding `admin` satisfies any check.
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role) || self.roles.contains(&Role::Admin)
    }

    /// The access-gate predicate used at route boundaries.
    ///
    /// An empty requirement always allows. A non-empty requirement allows if
    /// the effective set intersects it, or if the set contains `admin`.
    pub fn allows(&self, required: &[Role]) -> bool {
        if required.is_empty() {
            return true;
        }
        if self.roles.contains(&Role::Admin) {
            return true;
        }
        required.iter().any(|role| self.roles.contains(role))
    }

    pub fn is_admin(&self) -> bool {
        self.roles.contains(&Role::Admin)
    }

    pub fn roles(&self) -> &BTreeSet<Role> {
        &self.roles
    }

    pub fn tier(&self) -> Option<Tier> {
        self.tier
    }

    /// The combined role-and-tier labels shown on the user's profile. This is
    /// the view the frontend historically called the "effective role set".
    pub fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self.roles.iter().map(|r| r.to_string()).collect();
        if let Some(tier) = self.tier {
            labels.push(tier.to_string());
        }
        labels
    }
}

/// AdminAllowList
///
/// The designated administrator identities, loaded from configuration at
/// startup. A user matching the list by id or email (case-insensitive) is
/// granted `admin` regardless of what `user_roles` contains.
#[derive(Debug, Clone, Default)]
pub struct AdminAllowList {
    emails: Vec<String>,
    ids: Vec<Uuid>,
}

impl AdminAllowList {
    pub fn new(emails: Vec<String>, ids: Vec<Uuid>) -> Self {
        let emails = emails
            .into_iter()
            .map(|e| e.trim().to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        Self { emails, ids }
    }

    pub fn matches(&self, id: Uuid, email: &str) -> bool {
        self.ids.contains(&id) || self.emails.iter().any(|e| e.eq_ignore_ascii_case(email))
    }

    pub fn is_empty(&self) -> bool {
        self.emails.is_empty() && self.ids.is_empty()
    }
}

/// RoleResolver
///
/// Computes the [`EffectiveRoles`] for a user identity. Constructed once at
/// application boot from the configured admin allow-list and shared through
/// the application state.
pub struct RoleResolver {
    admins: AdminAllowList,
}

/// The shared handle used to inject the resolver into extractors and handlers.
pub type ResolverState = Arc<RoleResolver>;

impl RoleResolver {
    pub fn new(admins: AdminAllowList) -> Self {
        Self { admins }
    }

    pub fn is_allow_listed(&self, id: Uuid, email: &str) -> bool {
        self.admins.matches(id, email)
    }

    /// resolve
    ///
    /// Produces the effective role set for `(user_id, email)`:
    ///
    /// 1. persisted roles are fetched from `user_roles`;
    /// 2. an empty set defaults to `{user}` (every user holds at least one role);
    /// 3. an allow-listed identity always gains `admin`; if the row was missing
    ///    we also try to persist it, but a write failure only logs;
    /// 4. a *read* failure does not propagate: the caller gets `{user}` (or
    ///    `{admin, user}` for allow-listed identities) so the site stays
    ///    usable when the role store is down.
    ///
    /// The entitlement tier is read from its cache table independently.
    pub async fn resolve(&self, repo: &RepositoryState, user_id: Uuid, email: &str) -> EffectiveRoles {
        let allow_listed = self.admins.matches(user_id, email);

        let mut roles: BTreeSet<Role> = match repo.fetch_roles(user_id).await {
            Ok(persisted) => persisted.into_iter().collect(),
            Err(e) => {
                tracing::error!(%user_id, error = ?e, "role fetch failed, using fallback role set");
                let mut fallback = BTreeSet::from([Role::User]);
                if allow_listed {
                    fallback.insert(Role::Admin);
                }
                return EffectiveRoles::new(fallback, repo.get_tier(user_id).await);
            }
        };

        if roles.is_empty() {
            roles.insert(Role::User);
        }

        if allow_listed && roles.insert(Role::Admin) {
            // The row was missing; persist the override best-effort.
            if let Err(e) = repo.add_role(user_id, Role::Admin).await {
                tracing::warn!(%user_id, error = ?e, "could not persist admin role for allow-listed user");
            }
        }

        EffectiveRoles::new(roles, repo.get_tier(user_id).await)
    }
}
