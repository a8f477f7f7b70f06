use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::SubscriptionStatus;
use crate::roles::Tier;

// 1. SubscriptionService Contract
/// SubscriptionService
///
/// Defines the abstract contract for the billing collaborator. The rest of
/// the application asks three questions — what is this email's current
/// subscription, where can it buy one, where can it manage one — and never
/// computes billing state itself. The concrete implementation is Stripe in
/// production and an in-memory mock in tests.
#[async_trait]
pub trait SubscriptionService: Send + Sync {
    /// Looks up the active subscription for `email`, if any.
    async fn check(&self, email: &str) -> Result<SubscriptionStatus, String>;

    /// Creates a hosted checkout session for a paid tier and returns its URL.
    /// The customer record is found by email or created on the spot.
    async fn create_checkout(
        &self,
        email: &str,
        user_id: Uuid,
        tier: Tier,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<String, String>;

    /// Creates a hosted billing-portal session and returns its URL, or
    /// `Ok(None)` when the email has no customer record to manage.
    async fn create_portal(
        &self,
        email: &str,
        return_url: &str,
    ) -> Result<Option<String>, String>;
}

/// BillingState
///
/// The concrete type used to share the billing service across the application state.
pub type BillingState = Arc<dyn SubscriptionService>;

// 2. The Real Implementation (Stripe)
/// StripeClient
///
/// Talks to the Stripe REST API: finds the customer by email, lists their
/// active subscriptions, and maps the price id of the first one to an
/// entitlement [`Tier`]. An active subscription on an unrecognized price is
/// still reported as subscribed, just without a tier.
#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
    api_base: String,
}

const STRIPE_API_BASE: &str = "https://api.stripe.com";

// Price ids configured in the Stripe dashboard for the two paid plans.
const PRICE_PROFESSIONAL: &str = "price_professional";
const PRICE_ENTERPRISE: &str = "price_enterprise";

#[derive(Deserialize)]
struct StripeList<T> {
    data: Vec<T>,
}

#[derive(Deserialize)]
struct StripeCustomer {
    id: String,
}

#[derive(Deserialize)]
struct StripeSubscription {
    current_period_end: i64,
    items: StripeList<StripeSubscriptionItem>,
}

#[derive(Deserialize)]
struct StripeSubscriptionItem {
    price: StripePrice,
}

#[derive(Deserialize)]
struct StripePrice {
    id: String,
}

#[derive(Deserialize)]
struct StripeSession {
    url: String,
}

impl StripeClient {
    pub fn new(secret_key: &str) -> Self {
        Self::with_api_base(secret_key, STRIPE_API_BASE)
    }

    /// Constructor with an overridable API origin, for pointing tests at a
    /// local stub server.
    pub fn with_api_base(secret_key: &str, api_base: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key: secret_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, String> {
        let response = self
            .http
            .get(format!("{}{}", self.api_base, path))
            .basic_auth(&self.secret_key, None::<&str>)
            .query(query)
            .send()
            .await
            .map_err(|e| format!("stripe request failed: {e}"))?;

        if !response.status().is_success() {
            return Err(format!("stripe returned {}", response.status()));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| format!("stripe response decode failed: {e}"))
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, &str)],
    ) -> Result<T, String> {
        let response = self
            .http
            .post(format!("{}{}", self.api_base, path))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(form)
            .send()
            .await
            .map_err(|e| format!("stripe request failed: {e}"))?;

        if !response.status().is_success() {
            return Err(format!("stripe returned {}", response.status()));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| format!("stripe response decode failed: {e}"))
    }

    /// Finds the customer for `email`, if one exists.
    async fn find_customer(&self, email: &str) -> Result<Option<StripeCustomer>, String> {
        let customers: StripeList<StripeCustomer> = self
            .get_json("/v1/customers", &[("email", email), ("limit", "1")])
            .await?;
        Ok(customers.data.into_iter().next())
    }

    fn tier_for_price(price_id: &str) -> Option<Tier> {
        match price_id {
            PRICE_PROFESSIONAL => Some(Tier::Professional),
            PRICE_ENTERPRISE => Some(Tier::Enterprise),
            _ => None,
        }
    }

    fn price_for_tier(tier: Tier) -> &'static str {
        match tier {
            Tier::Professional => PRICE_PROFESSIONAL,
            Tier::Enterprise => PRICE_ENTERPRISE,
        }
    }
}

#[async_trait]
impl SubscriptionService for StripeClient {
    async fn check(&self, email: &str) -> Result<SubscriptionStatus, String> {
        let Some(customer) = self.find_customer(email).await? else {
            return Ok(SubscriptionStatus::default());
        };

        let subscriptions: StripeList<StripeSubscription> = self
            .get_json(
                "/v1/subscriptions",
                &[("customer", customer.id.as_str()), ("status", "active")],
            )
            .await?;

        let Some(subscription) = subscriptions.data.into_iter().next() else {
            return Ok(SubscriptionStatus::default());
        };

        let tier = subscription
            .items
            .data
            .first()
            .and_then(|item| Self::tier_for_price(&item.price.id));

        let expires_at: Option<DateTime<Utc>> = Utc
            .timestamp_opt(subscription.current_period_end, 0)
            .single();

        Ok(SubscriptionStatus {
            subscribed: true,
            tier,
            expires_at,
        })
    }

    async fn create_checkout(
        &self,
        email: &str,
        user_id: Uuid,
        tier: Tier,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<String, String> {
        let customer = match self.find_customer(email).await? {
            Some(customer) => customer,
            None => {
                let user_id = user_id.to_string();
                self.post_form::<StripeCustomer>(
                    "/v1/customers",
                    &[("email", email), ("metadata[user_id]", user_id.as_str())],
                )
                .await?
            }
        };

        let session: StripeSession = self
            .post_form(
                "/v1/checkout/sessions",
                &[
                    ("customer", customer.id.as_str()),
                    ("line_items[0][price]", Self::price_for_tier(tier)),
                    ("line_items[0][quantity]", "1"),
                    ("mode", "subscription"),
                    ("success_url", success_url),
                    ("cancel_url", cancel_url),
                    ("automatic_tax[enabled]", "true"),
                ],
            )
            .await?;

        Ok(session.url)
    }

    async fn create_portal(
        &self,
        email: &str,
        return_url: &str,
    ) -> Result<Option<String>, String> {
        let Some(customer) = self.find_customer(email).await? else {
            return Ok(None);
        };

        let session: StripeSession = self
            .post_form(
                "/v1/billing_portal/sessions",
                &[
                    ("customer", customer.id.as_str()),
                    ("return_url", return_url),
                ],
            )
            .await?;

        Ok(Some(session.url))
    }
}

// 3. The Mock Implementation (For Tests)
/// MockSubscriptionService
///
/// Mock billing collaborator: returns a preset status, or a simulated
/// provider failure, without any network traffic.
#[derive(Clone, Default)]
pub struct MockSubscriptionService {
    pub status: SubscriptionStatus,
    pub should_fail: bool,
}

impl MockSubscriptionService {
    pub fn unsubscribed() -> Self {
        Self::default()
    }

    pub fn subscribed(tier: Tier) -> Self {
        Self {
            status: SubscriptionStatus {
                subscribed: true,
                tier: Some(tier),
                expires_at: None,
            },
            should_fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl SubscriptionService for MockSubscriptionService {
    async fn check(&self, _email: &str) -> Result<SubscriptionStatus, String> {
        if self.should_fail {
            return Err("Mock billing error: simulation requested".to_string());
        }
        Ok(self.status.clone())
    }

    async fn create_checkout(
        &self,
        _email: &str,
        _user_id: Uuid,
        tier: Tier,
        _success_url: &str,
        _cancel_url: &str,
    ) -> Result<String, String> {
        if self.should_fail {
            return Err("Mock billing error: simulation requested".to_string());
        }
        Ok(format!("https://checkout.stripe.test/{}", tier))
    }

    /// A portal session exists only for customers, which the mock equates
    /// with being subscribed.
    async fn create_portal(
        &self,
        _email: &str,
        _return_url: &str,
    ) -> Result<Option<String>, String> {
        if self.should_fail {
            return Err("Mock billing error: simulation requested".to_string());
        }
        if self.status.subscribed {
            Ok(Some("https://portal.stripe.test/session".to_string()))
        } else {
            Ok(None)
        }
    }
}
