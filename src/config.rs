use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Deserialize;
use snafu::ResultExt;
use url::Url;

use crate::error::{ApplicationError, ConfigLoadSnafu};
use crate::mail::MailSettings;
use crate::vcard::VCard;

/// Loads the configuration from the environment. Call [dotenvy::dotenv] first to pick up a `.env` file.
pub fn load() -> Result<Config, ApplicationError> {
    envy::from_env::<Config>().context(ConfigLoadSnafu)
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_host_address")]
    pub host_address: SocketAddr,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Browser origin allowed to call the API, any origin when unset.
    #[serde(default)]
    pub cors_origin: Option<String>,

    #[serde(flatten)]
    pub surreal: SurrealConfig,
    #[serde(flatten)]
    pub mail: MailConfig,
    #[serde(flatten)]
    pub card: CardConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SurrealConfig {
    #[serde(rename = "surreal_url", default = "default_surreal_url")]
    pub url: String,
    #[serde(rename = "surreal_ns", default = "default_scope")]
    pub namespace: String,
    #[serde(rename = "surreal_db", default = "default_scope")]
    pub database: String,
    #[serde(rename = "surreal_user", default)]
    pub username: Option<String>,
    #[serde(rename = "surreal_pass", default)]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MailConfig {
    pub resend_api_key: String,
    /// Overrides the provider's public endpoint.
    #[serde(default)]
    pub resend_endpoint: Option<Url>,
    #[serde(default = "default_mail_from")]
    pub mail_from: String,
    pub mail_to: String,
    #[serde(default = "default_mail_subject")]
    pub mail_subject: String,
}

impl MailConfig {
    pub fn settings(&self) -> MailSettings {
        MailSettings {
            from: self.mail_from.clone(),
            to: self.mail_to.clone(),
            default_subject: self.mail_subject.clone(),
        }
    }
}

/// Fields printed on the downloadable contact card. Empty fields are left off the card.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct CardConfig {
    pub card_full_name: String,
    pub card_given_name: String,
    pub card_family_name: String,
    pub card_phone: String,
    pub card_email: String,
    pub card_street: String,
    pub card_locality: String,
    pub card_region: String,
    pub card_country: String,
    pub card_url: String,
    pub card_title: String,
    pub card_org: String,
    pub card_note: String,
}

impl CardConfig {
    pub fn vcard(&self) -> VCard {
        VCard {
            full_name: self.card_full_name.clone(),
            given_name: self.card_given_name.clone(),
            family_name: self.card_family_name.clone(),
            phone: self.card_phone.clone(),
            email: self.card_email.clone(),
            street: self.card_street.clone(),
            locality: self.card_locality.clone(),
            region: self.card_region.clone(),
            country: self.card_country.clone(),
            url: self.card_url.clone(),
            title: self.card_title.clone(),
            org: self.card_org.clone(),
            note: self.card_note.clone(),
        }
    }
}

fn default_host_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_surreal_url() -> String {
    "mem://".to_owned()
}

fn default_scope() -> String {
    "portfolio".to_owned()
}

fn default_mail_from() -> String {
    "onboarding@resend.dev".to_owned()
}

fn default_mail_subject() -> String {
    "New message from the contact form".to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn defaults_fill_optional_values() {
        let config: Config = envy::from_iter(env(&[
            ("RESEND_API_KEY", "re_123"),
            ("MAIL_TO", "me@example.com"),
        ]))
        .unwrap();

        assert_eq!(config.host_address, default_host_address());
        assert_eq!(config.log_dir, PathBuf::from("logs"));
        assert_eq!(config.cors_origin, None);
        assert_eq!(config.surreal.url, "mem://");
        assert_eq!(config.surreal.namespace, "portfolio");
        assert_eq!(config.surreal.username, None);
        assert_eq!(config.mail.resend_endpoint, None);
        assert_eq!(config.mail.mail_from, "onboarding@resend.dev");
        assert_eq!(config.card.card_full_name, "");
    }

    #[test]
    fn read_every_section() {
        let config: Config = envy::from_iter(env(&[
            ("HOST_ADDRESS", "0.0.0.0:3000"),
            ("SURREAL_URL", "ws://localhost:8000"),
            ("SURREAL_NS", "site"),
            ("SURREAL_DB", "stats"),
            ("SURREAL_USER", "root"),
            ("SURREAL_PASS", "secret"),
            ("RESEND_API_KEY", "re_123"),
            ("MAIL_TO", "me@example.com"),
            ("MAIL_SUBJECT", "Hello"),
            ("RESEND_ENDPOINT", "http://localhost:9000/emails"),
            ("CARD_FULL_NAME", "Ada Lovelace"),
            ("CARD_ORG", "Analytical Engines"),
        ]))
        .unwrap();

        assert_eq!(config.host_address.port(), 3000);
        assert_eq!(config.surreal.url, "ws://localhost:8000");
        assert_eq!(config.surreal.database, "stats");
        assert_eq!(config.surreal.password.as_deref(), Some("secret"));
        assert_eq!(config.mail.settings().default_subject, "Hello");
        assert_eq!(
            config.mail.resend_endpoint.map(String::from).as_deref(),
            Some("http://localhost:9000/emails")
        );

        let card = config.card.vcard();
        assert_eq!(card.full_name, "Ada Lovelace");
        assert_eq!(card.org, "Analytical Engines");
    }

    #[test]
    fn mail_settings_are_required() {
        let result = envy::from_iter::<_, Config>(env(&[("HOST_ADDRESS", "0.0.0.0:3000")]));
        assert!(result.is_err());
    }
}
