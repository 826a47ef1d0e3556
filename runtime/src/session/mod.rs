//! Session management: one browsing identity per crawl worker.
//!
//! A session holds the lightweight HTTP client and its cookie jar. The jar is
//! the source of truth; browser contexts receive a copy through
//! [`Session::export_cookies_for_browser`] whenever they are (re)created.

pub mod credentials;
pub mod login;

use crate::acquisition::http_client::HttpClient;
use crate::config::CrawlConfig;
use crate::error::{CrawlError, Result};
use crate::profile::SiteProfile;
use crate::renderer::BrowserCookie;
use credentials::{CredentialForm, Credentials};
use login::LoginRetry;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// How the session obtained its identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Anonymous,
    CookieSeeded,
    LoggedIn,
}

/// An authenticated (or anonymous) identity on the target site.
pub struct Session {
    http: HttpClient,
    profile: Arc<SiteProfile>,
    kind: SessionKind,
    http_timeout_ms: u64,
    user_agent: String,
}

impl Session {
    /// The HTTP half of the session, for search and listing calls.
    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    pub fn profile(&self) -> &SiteProfile {
        &self.profile
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    /// Convert the jar's cookies for the site into browser cookies.
    ///
    /// Pure: the same jar always yields the same list (sorted by name), and
    /// every entry comes from the jar.
    pub fn export_cookies_for_browser(&self) -> Vec<BrowserCookie> {
        let domain = self.profile.cookie_domain();
        let mut cookies: Vec<BrowserCookie> = self
            .http
            .cookie_pairs(&self.profile.base_url)
            .into_iter()
            .map(|(name, value)| BrowserCookie {
                name,
                value,
                domain: domain.clone(),
                path: "/".to_string(),
            })
            .collect();
        cookies.sort();
        cookies.dedup_by(|a, b| a.name == b.name);
        cookies
    }

    /// A new session with its own client and a copy of this jar.
    ///
    /// Used to give each parallel worker an independent identity without
    /// logging in again.
    pub fn fork(&self) -> Result<Session> {
        let http = HttpClient::new(self.http_timeout_ms, &self.user_agent)?;
        for (name, value) in self.http.cookie_pairs(&self.profile.base_url) {
            http.add_cookie(&name, &value, &self.profile.base_url);
        }
        Ok(Session {
            http,
            profile: Arc::clone(&self.profile),
            kind: self.kind,
            http_timeout_ms: self.http_timeout_ms,
            user_agent: self.user_agent.clone(),
        })
    }

    /// Release the HTTP client and its cookie jar.
    pub fn close(self) {
        info!("closing {:?} session for {}", self.kind, self.profile.base_url);
        drop(self.http);
    }
}

/// Builds sessions for one site profile.
pub struct SessionProvider {
    profile: Arc<SiteProfile>,
    retry: LoginRetry,
    http_timeout_ms: u64,
    user_agent: String,
}

impl SessionProvider {
    pub fn new(profile: Arc<SiteProfile>, config: &CrawlConfig) -> Self {
        Self {
            profile,
            retry: LoginRetry {
                attempts: config.login_attempts.max(1),
                delay: Duration::from_millis(config.login_retry_delay_ms),
            },
            http_timeout_ms: config.http_timeout_ms,
            user_agent: config.user_agent.clone(),
        }
    }

    /// Establish a session from credentials.
    ///
    /// Fails with [`CrawlError::Configuration`] before any network call when
    /// no usable credential form is present, and with
    /// [`CrawlError::Authentication`] when the site rejects the login.
    pub async fn establish(&self, credentials: &Credentials) -> Result<Session> {
        let form = credentials.resolve()?;
        let http = HttpClient::new(self.http_timeout_ms, &self.user_agent)?;

        let kind = match form {
            CredentialForm::Cookies(cookies) => {
                for (name, value) in &cookies {
                    http.add_cookie(name, value, &self.profile.base_url);
                }
                info!("seeded session with {} cookies", cookies.len());
                SessionKind::CookieSeeded
            }
            CredentialForm::Login { username, password } => {
                let login = self.profile.login.as_ref().ok_or_else(|| {
                    CrawlError::Configuration(format!(
                        "profile '{}' has no login flow; supply cookies instead",
                        self.profile.name
                    ))
                })?;
                login::log_in(&http, &self.profile, login, &username, &password, self.retry)
                    .await?;
                SessionKind::LoggedIn
            }
        };

        Ok(self.session(http, kind))
    }

    /// A session with an empty jar, for profiles that need no login.
    pub fn anonymous(&self) -> Result<Session> {
        if self.profile.requires_login() {
            return Err(CrawlError::Configuration(format!(
                "profile '{}' requires credentials",
                self.profile.name
            )));
        }
        let http = HttpClient::new(self.http_timeout_ms, &self.user_agent)?;
        Ok(self.session(http, SessionKind::Anonymous))
    }

    /// Anonymous when the profile allows it and no credentials were given,
    /// otherwise [`SessionProvider::establish`].
    pub async fn establish_or_anonymous(&self, credentials: &Credentials) -> Result<Session> {
        if !self.profile.requires_login() && !credentials.is_present() {
            return self.anonymous();
        }
        self.establish(credentials).await
    }

    fn session(&self, http: HttpClient, kind: SessionKind) -> Session {
        Session {
            http,
            profile: Arc::clone(&self.profile),
            kind,
            http_timeout_ms: self.http_timeout_ms,
            user_agent: self.user_agent.clone(),
        }
    }
}
