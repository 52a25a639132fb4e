use async_trait::async_trait;
use derive_new::new;
use serde::{Deserialize, Serialize};
use snafu::{Location, ResultExt, Snafu};
use url::Url;

pub const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";

const CONTACT_TEMPLATE: &str = r#"
<p><strong>Name:</strong> {{ name }}</p>
<p><strong>Email:</strong> {{ email }}</p>
<p><strong>Message:</strong></p>
<p>{{ message }}</p>
"#;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum MailError {
    #[snafu(display("{source}"))]
    Render {
        source: tera::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("invalid email endpoint: {source}"))]
    Endpoint {
        source: url::ParseError,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("{source}"))]
    Client {
        source: reqwest::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("{source}"))]
    Request {
        source: reqwest::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// The provider answered with a non-success status.
    #[snafu(display("{message}"))]
    Rejected {
        status: u16,
        message: String,
        #[snafu(implicit)]
        location: Location,
    },
}

/// A contact form submission.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ContactMessage {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub subject: Option<String>,
    pub message: String,
}

/// Where contact form messages are delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailSettings {
    pub from: String,
    pub to: String,
    pub default_subject: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Email {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

impl Email {
    /// Builds the notification for `message`. User-supplied text is HTML-escaped.
    pub fn contact(message: &ContactMessage, settings: &MailSettings) -> Result<Self, MailError> {
        let context = tera::Context::from_serialize(message).context(RenderSnafu)?;
        let html = tera::Tera::one_off(CONTACT_TEMPLATE, &context, true).context(RenderSnafu)?;

        let subject = message
            .subject
            .as_deref()
            .map(str::trim)
            .filter(|subject| !subject.is_empty())
            .unwrap_or(&settings.default_subject)
            .to_owned();

        Ok(Self {
            from: settings.from.clone(),
            to: settings.to.clone(),
            subject,
            html,
        })
    }
}

/// A transactional-email provider.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send `email`, returning the provider's response body.
    async fn send(&self, email: &Email) -> Result<serde_json::Value, MailError>;
}

/// Sends email through the Resend HTTP API.
#[derive(Debug, Clone, new)]
pub struct ResendMailer {
    client: reqwest::Client,
    api_key: String,
    endpoint: Url,
}

impl ResendMailer {
    pub fn connect(api_key: &str, endpoint: Option<Url>) -> Result<Self, MailError> {
        let endpoint = match endpoint {
            Some(endpoint) => endpoint,
            None => Url::parse(RESEND_ENDPOINT).context(EndpointSnafu)?,
        };

        let client = reqwest::Client::builder().build().context(ClientSnafu)?;
        Ok(Self::new(client, api_key.to_owned(), endpoint))
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    #[tracing::instrument(skip_all, fields(to = %email.to, subject = %email.subject))]
    async fn send(&self, email: &Email) -> Result<serde_json::Value, MailError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(email)
            .send()
            .await
            .context(RequestSnafu)?;

        let status = response.status();
        let text = response.text().await.context(RequestSnafu)?;
        let body = serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));

        if !status.is_success() {
            let message = body
                .get("message")
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned)
                .unwrap_or_else(|| body.to_string());

            tracing::warn!(%status, %message, "email provider rejected the message");
            return RejectedSnafu {
                status: status.as_u16(),
                message,
            }
            .fail();
        }

        tracing::info!("sent contact email");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> MailSettings {
        MailSettings {
            from: "onboarding@resend.dev".to_owned(),
            to: "me@example.com".to_owned(),
            default_subject: "New message".to_owned(),
        }
    }

    fn message(subject: Option<&str>) -> ContactMessage {
        ContactMessage {
            name: "Ada".to_owned(),
            email: "ada@example.com".to_owned(),
            subject: subject.map(str::to_owned),
            message: "Hello there".to_owned(),
        }
    }

    #[test]
    fn contact_email_uses_settings() {
        let email = Email::contact(&message(Some("Job offer")), &settings()).unwrap();

        assert_eq!(email.from, "onboarding@resend.dev");
        assert_eq!(email.to, "me@example.com");
        assert_eq!(email.subject, "Job offer");
        assert!(email.html.contains("<strong>Name:</strong> Ada</p>"));
        assert!(email.html.contains("<strong>Email:</strong> ada@example.com</p>"));
        assert!(email.html.contains("<p>Hello there</p>"));
    }

    #[test]
    fn blank_subject_falls_back_to_default() {
        let missing = Email::contact(&message(None), &settings()).unwrap();
        let blank = Email::contact(&message(Some("   ")), &settings()).unwrap();

        assert_eq!(missing.subject, "New message");
        assert_eq!(blank.subject, "New message");
    }

    #[test]
    fn user_text_is_escaped() {
        let mut message = message(None);
        message.message = "<script>alert('hi')</script>".to_owned();

        let email = Email::contact(&message, &settings()).unwrap();
        assert!(!email.html.contains("<script>"));
        assert!(email.html.contains("&lt;script&gt;"));
    }

    #[test]
    fn subject_is_optional_in_json() {
        let message: ContactMessage = serde_json::from_str(
            r#"{"name": "Ada", "email": "ada@example.com", "message": "Hi"}"#,
        )
        .unwrap();
        assert_eq!(message.subject, None);
    }
}
