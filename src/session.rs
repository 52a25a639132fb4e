use std::collections::HashMap;

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::time::Timestamp;

/// Storage key (and cookie name) that holds the session id for the current browsing session.
pub const SESSION_KEY: &str = "visitor_session_id";

/// Environment data a browser reports about itself.
///
/// The fields are only ever combined into a [fingerprint_hash], they are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, new)]
pub struct Fingerprint {
    pub user_agent: String,
    pub language: String,
    pub timezone_offset: i32,
    pub screen_width: u32,
    pub screen_height: u32,
    pub color_depth: u32,
}

impl Fingerprint {
    fn joined(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}",
            self.user_agent,
            self.language,
            self.timezone_offset,
            self.screen_width,
            self.screen_height,
            self.color_depth
        )
    }
}

/// Polynomial rolling hash (`hash * 31 + c`) over the UTF-16 code units of `input`, wrapping at 32 bits.
pub fn fingerprint_hash(input: &str) -> i32 {
    input
        .encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

/// Best-effort identifier of a browsing session. Collisions are possible and harmless.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate(fingerprint: &Fingerprint, now: Timestamp) -> Self {
        let hash = fingerprint_hash(&fingerprint.joined()).unsigned_abs();
        let millis = u64::try_from(now.millis()).unwrap_or_default();

        Self(format!("session_{hash}_{}", to_base36(millis)))
    }

    /// Returns the id cached in `storage`, or generates and caches a new one.
    pub fn resolve(storage: &mut impl SessionStorage, fingerprint: &Fingerprint, now: Timestamp) -> Self {
        if let Some(existing) = storage.get(SESSION_KEY).filter(|id| !id.is_empty()) {
            return Self(existing);
        }

        let id = Self::generate(fingerprint, now);
        tracing::debug!(session_id = %id, "generated a new session id");
        storage.set(SESSION_KEY, id.as_ref());
        id
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    if value == 0 {
        return "0".to_owned();
    }

    let mut digits = Vec::new();
    while value > 0 {
        digits.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }

    digits.iter().rev().map(|&digit| digit as char).collect()
}

/// Key-value storage that lives exactly as long as one browsing session.
pub trait SessionStorage {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&mut self, key: &str, value: &str);
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_owned(), value.to_owned());
    }
}

/// Session storage backed by browser cookies without an expiry, which the browser drops when the session ends.
#[derive(Debug, Clone, Default, new)]
pub struct CookieStorage {
    jar: CookieJar,
}

impl CookieStorage {
    pub fn into_jar(self) -> CookieJar {
        self.jar
    }
}

impl SessionStorage for CookieStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.jar.get(key).map(|cookie| cookie.value().to_owned())
    }

    fn set(&mut self, key: &str, value: &str) {
        let cookie = Cookie::build((key.to_owned(), value.to_owned()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax);

        let jar = std::mem::take(&mut self.jar);
        self.jar = jar.add(cookie);
    }
}
