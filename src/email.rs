use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Mutex};

// 1. EmailService Contract
/// EmailService
///
/// Defines the abstract contract for transactional email. The only message
/// this system sends is the newsletter welcome email; the concrete
/// implementation is Resend in production and a recording mock in tests.
#[async_trait]
pub trait EmailService: Send + Sync {
    /// Sends the welcome email to a new newsletter subscriber.
    async fn send_welcome(&self, email: &str, name: Option<&str>) -> Result<(), String>;
}

/// EmailState
///
/// The concrete type used to share the email service across the application state.
pub type EmailState = Arc<dyn EmailService>;

// 2. The Real Implementation (Resend)
/// ResendClient
///
/// Sends mail through the Resend REST API with a bearer key.
#[derive(Clone)]
pub struct ResendClient {
    http: reqwest::Client,
    api_key: String,
    api_base: String,
}

const RESEND_API_BASE: &str = "https://api.resend.com";
const WELCOME_FROM: &str = "Security Newsletter <newsletter@securityfortherestofus.com>";
const WELCOME_SUBJECT: &str = "Welcome to Security for the Rest of Us Newsletter";

#[derive(Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: String,
}

impl ResendClient {
    pub fn new(api_key: &str) -> Self {
        Self::with_api_base(api_key, RESEND_API_BASE)
    }

    /// Constructor with an overridable API origin, for pointing tests at a
    /// local stub server.
    pub fn with_api_base(api_key: &str, api_base: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    fn welcome_html(name: Option<&str>) -> String {
        let greeting = name.unwrap_or("Subscriber");
        format!(
            r#"<div style="font-family: sans-serif; max-width: 600px; margin: 0 auto;">
  <h1 style="color: #333; margin-top: 30px;">Welcome, {greeting}!</h1>
  <p style="font-size: 16px; line-height: 1.5; color: #444;">
    Thank you for subscribing to our Security for the Rest of Us newsletter.
  </p>
  <p style="font-size: 16px; line-height: 1.5; color: #444;">
    You'll now receive regular updates with the latest security insights,
    best practices, and tips to keep you and your organization safe online.
  </p>
  <p style="font-size: 16px; line-height: 1.5; color: #444; margin-top: 30px;">
    If you have any questions or feedback, feel free to reply to this email.
  </p>
  <p style="font-size: 16px; line-height: 1.5; color: #444;">
    Best regards,<br>
    The Security for the Rest of Us Team
  </p>
</div>"#
        )
    }
}

#[async_trait]
impl EmailService for ResendClient {
    async fn send_welcome(&self, email: &str, name: Option<&str>) -> Result<(), String> {
        let body = SendEmailRequest {
            from: WELCOME_FROM,
            to: [email],
            subject: WELCOME_SUBJECT,
            html: Self::welcome_html(name),
        };

        let response = self
            .http
            .post(format!("{}/emails", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("resend request failed: {e}"))?;

        if !response.status().is_success() {
            return Err(format!("resend returned {}", response.status()));
        }

        Ok(())
    }
}

// 3. The Mock Implementation (For Tests)
/// MockEmailService
///
/// Records every send so tests can assert on delivered mail, with a switch to
/// simulate provider failure. No network traffic.
#[derive(Clone, Default)]
pub struct MockEmailService {
    pub sent: Arc<Mutex<Vec<(String, Option<String>)>>>,
    pub should_fail: bool,
}

impl MockEmailService {
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn sent_to(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(email, _)| email.clone())
            .collect()
    }
}

#[async_trait]
impl EmailService for MockEmailService {
    async fn send_welcome(&self, email: &str, name: Option<&str>) -> Result<(), String> {
        if self.should_fail {
            return Err("Mock email error: simulation requested".to_string());
        }
        self.sent
            .lock()
            .unwrap()
            .push((email.to_string(), name.map(str::to_string)));
        Ok(())
    }
}
