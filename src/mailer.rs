use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

const RESEND_API: &str = "https://api.resend.com/emails";

/// Typed transactional message, rendered to subject/body on send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Welcome { email: String },
    PasswordReset { email: String, code: String },
}

impl Notification {
    pub fn recipient(&self) -> &str {
        match self {
            Notification::Welcome { email } => email,
            Notification::PasswordReset { email, .. } => email,
        }
    }

    fn subject(&self) -> &'static str {
        match self {
            Notification::Welcome { .. } => "Welcome aboard",
            Notification::PasswordReset { .. } => "Your password recovery code",
        }
    }

    fn text(&self) -> String {
        match self {
            Notification::Welcome { .. } => {
                "Your account has been created. Sign in to set up your profile.".into()
            }
            Notification::PasswordReset { code, .. } => {
                format!("Use this code to reset your password: {code}")
            }
        }
    }
}

/// Outbound email collaborator. Injected as a trait object so tests can
/// substitute a recording fake.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: Notification) -> anyhow::Result<()>;
}

#[derive(Serialize)]
struct ResendPayload<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: String,
}

/// Mailer backed by the Resend HTTP API.
pub struct ResendMailer {
    client: reqwest::Client,
    api_key: String,
    from: String,
}

impl ResendMailer {
    pub fn new(api_key: String, from: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            api_key,
            from,
        })
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, message: Notification) -> anyhow::Result<()> {
        let payload = ResendPayload {
            from: &self.from,
            to: [message.recipient()],
            subject: message.subject(),
            text: message.text(),
        };

        let res = self
            .client
            .post(RESEND_API)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            anyhow::bail!("mail API returned {status}: {body}");
        }

        debug!(
            to = message.recipient(),
            subject = message.subject(),
            "notification sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_text_carries_the_code() {
        let msg = Notification::PasswordReset {
            email: "a@b.co".into(),
            code: "XK42".into(),
        };
        assert!(msg.text().contains("XK42"));
        assert_eq!(msg.recipient(), "a@b.co");
    }

    #[test]
    fn welcome_addresses_the_new_account() {
        let msg = Notification::Welcome {
            email: "new@user.io".into(),
        };
        assert_eq!(msg.recipient(), "new@user.io");
        assert!(!msg.text().is_empty());
    }

    #[test]
    fn payload_serializes_to_resend_shape() {
        let payload = ResendPayload {
            from: "noreply@userhub.local",
            to: ["a@b.co"],
            subject: "Welcome aboard",
            text: "hi".into(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["from"], "noreply@userhub.local");
        assert_eq!(json["to"][0], "a@b.co");
        assert_eq!(json["subject"], "Welcome aboard");
    }
}
