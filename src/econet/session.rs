//! econet24 session handling
//!
//! The vendor site is a Django application: a login page hands out a
//! `csrftoken` cookie, the credentials are posted together with that token,
//! and the redirect answering the post carries `sessionid` plus a refreshed
//! `csrftoken`. Both cookies must accompany every later request.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use reqwest::header::{COOKIE, LOCATION, REFERER};
use reqwest::{Client, Response};

use crate::error::{BridgeError, Result};

pub(crate) const CSRF_COOKIE: &str = "csrftoken";
pub(crate) const SESSION_COOKIE: &str = "sessionid";
const MAX_LOGIN_PAGE_REDIRECTS: usize = 3;
/// Upper bound for the fallback session lifetime (30 days)
pub(crate) const MAX_SESSION_TTL_SECS: u64 = 30 * 24 * 3600;

/// Vendor account and the device to read
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub uid: String,
}

/// Authenticated vendor session
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub csrf_token: String,
    pub session_id: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Reads the wall clock on every call
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// `Cookie` header value expected by the telemetry endpoints
    pub fn cookie_header(&self, language: &str) -> String {
        format!(
            "language={}; {}={}; {}={}",
            language, CSRF_COOKIE, self.csrf_token, SESSION_COOKIE, self.session_id
        )
    }
}

#[derive(Debug, Clone)]
struct VendorCookie {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

fn collect_cookies(response: &Response) -> HashMap<String, VendorCookie> {
    let now = Utc::now();
    response
        .cookies()
        .map(|c| {
            // Max-Age wins over Expires; an unrepresentable one counts as absent
            let expires_at = match c.max_age() {
                Some(age) => Duration::from_std(age)
                    .ok()
                    .and_then(|age| now.checked_add_signed(age)),
                None => c.expires().map(DateTime::<Utc>::from),
            };
            (
                c.name().to_string(),
                VendorCookie {
                    value: c.value().to_string(),
                    expires_at,
                },
            )
        })
        .collect()
}

/// Owns the cached session and re-authenticates on demand
pub struct SessionManager {
    http_client: Client,
    base_url: String,
    default_ttl: Duration,
    session: Option<Session>,
}

impl SessionManager {
    pub fn new(http_client: Client, base_url: &str, default_ttl_secs: u64) -> Self {
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            default_ttl: Duration::seconds(default_ttl_secs.min(MAX_SESSION_TTL_SECS) as i64),
            session: None,
        }
    }

    pub fn current(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// True when there is no session or its expiry has passed
    pub fn needs_login(&self) -> bool {
        self.session.as_ref().map_or(true, Session::is_expired)
    }

    pub fn invalidate(&mut self) {
        if self.session.take().is_some() {
            tracing::debug!("[Econet] Session invalidated");
        }
    }

    /// Log in and replace the cached session wholesale.
    ///
    /// On failure the previous session is left as it was.
    pub async fn authenticate(&mut self, credentials: &Credentials) -> Result<&Session> {
        let session = self.login(credentials).await?;
        if session.is_expired() {
            tracing::warn!(
                "[Econet] Login returned a session that already expired at {}",
                session.expires_at
            );
        } else {
            tracing::info!(
                "[Econet] Login successful, session expires at {}",
                session.expires_at
            );
        }
        Ok(&*self.session.insert(session))
    }

    /// Return the cached session, logging in first when it is absent or expired
    pub async fn ensure_session(&mut self, credentials: &Credentials) -> Result<&Session> {
        if self.needs_login() {
            return self.authenticate(credentials).await;
        }
        self.session
            .as_ref()
            .ok_or_else(|| BridgeError::Auth("No session".to_string()))
    }

    /// Two-step login handshake. Does not touch the cached session.
    pub async fn login(&self, credentials: &Credentials) -> Result<Session> {
        let csrf_token = self.fetch_csrf_token().await?;

        let url = format!("{}/login/", self.base_url);
        let resp = self
            .http_client
            .post(&url)
            .query(&[("next", "main/")])
            .header(COOKIE, format!("{}={}", CSRF_COOKIE, csrf_token))
            .header(REFERER, format!("{}/", self.base_url))
            .form(&[
                ("username", credentials.username.as_str()),
                ("password", credentials.password.as_str()),
                ("csrfmiddlewaretoken", csrf_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| BridgeError::Network(format!("Login request failed: {}", e)))?;

        let status = resp.status();
        if status.is_server_error() {
            return Err(BridgeError::Network(format!("Login HTTP error: {}", status)));
        }

        let cookies = collect_cookies(&resp);

        let session_cookie = cookies
            .get(SESSION_COOKIE)
            .filter(|c| !c.value.is_empty())
            .ok_or_else(|| {
                BridgeError::Auth(format!("No sessionid cookie in login response ({})", status))
            })?;

        let csrf_cookie = cookies.get(CSRF_COOKIE).filter(|c| !c.value.is_empty());

        let expires_at = [
            csrf_cookie.and_then(|c| c.expires_at),
            session_cookie.expires_at,
        ]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or_else(|| {
            let now = Utc::now();
            now.checked_add_signed(self.default_ttl).unwrap_or(now)
        });

        Ok(Session {
            csrf_token: csrf_cookie.map_or(csrf_token, |c| c.value.clone()),
            session_id: session_cookie.value.clone(),
            expires_at,
        })
    }

    async fn fetch_csrf_token(&self) -> Result<String> {
        let mut url = format!("{}/", self.base_url);

        for _ in 0..=MAX_LOGIN_PAGE_REDIRECTS {
            let resp = self
                .http_client
                .get(&url)
                .send()
                .await
                .map_err(|e| BridgeError::Network(format!("Login page request failed: {}", e)))?;

            if resp.status().is_server_error() {
                return Err(BridgeError::Network(format!(
                    "Login page HTTP error: {}",
                    resp.status()
                )));
            }

            if let Some(cookie) = collect_cookies(&resp).remove(CSRF_COOKIE) {
                return Ok(cookie.value);
            }

            let location = resp
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .filter(|_| resp.status().is_redirection());

            match location {
                Some(location) => {
                    url = resp
                        .url()
                        .join(location)
                        .map_err(|e| BridgeError::Parse(format!("Bad redirect {}: {}", location, e)))?
                        .to_string();
                    tracing::trace!("[Econet] Login page redirected to {}", url);
                }
                None => break,
            }
        }

        Err(BridgeError::Auth(
            "Login page did not set a csrftoken cookie".to_string(),
        ))
    }
}
