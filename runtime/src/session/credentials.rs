//! Credential inputs for establishing a session.
//!
//! ## Sources
//!
//! Credentials are assembled from (in order of priority):
//! 1. A cookie file (`--cookies` or `SITECRAWL_COOKIES_FILE`) holding cookies
//!    of an already logged-in browser
//! 2. `SITECRAWL_USERNAME` / `SITECRAWL_PASSWORD`
//!
//! Cookies win when both are present: they skip the login form entirely.

use crate::error::{CrawlError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Raw credential inputs; either form may be missing.
#[derive(Clone, Default)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
    pub cookies: Option<BTreeMap<String, String>>,
}

/// A usable credential form.
#[derive(Clone)]
pub enum CredentialForm {
    Cookies(BTreeMap<String, String>),
    Login { username: String, password: String },
}

impl Credentials {
    pub fn login(username: &str, password: &str) -> Self {
        Self {
            username: Some(username.to_string()),
            password: Some(password.to_string()),
            cookies: None,
        }
    }

    pub fn cookies(cookies: BTreeMap<String, String>) -> Self {
        Self {
            cookies: Some(cookies),
            ..Self::default()
        }
    }

    /// Read username/password from the environment and cookies from `cookie_file`.
    pub fn from_env(cookie_file: Option<&Path>) -> Result<Self> {
        let cookies = cookie_file.map(load_cookie_file).transpose()?;
        Ok(Self {
            username: std::env::var("SITECRAWL_USERNAME").ok(),
            password: std::env::var("SITECRAWL_PASSWORD").ok(),
            cookies,
        })
    }

    /// Whether any usable form is present.
    pub fn is_present(&self) -> bool {
        self.resolve().is_ok()
    }

    /// Pick the credential form to use. Empty values count as absent.
    pub fn resolve(&self) -> Result<CredentialForm> {
        if let Some(cookies) = self.cookies.as_ref().filter(|c| !c.is_empty()) {
            return Ok(CredentialForm::Cookies(cookies.clone()));
        }
        let username = self.username.as_deref().filter(|u| !u.is_empty());
        let password = self.password.as_deref().filter(|p| !p.is_empty());
        match (username, password) {
            (Some(username), Some(password)) => Ok(CredentialForm::Login {
                username: username.to_string(),
                password: password.to_string(),
            }),
            _ => Err(CrawlError::Configuration(
                "either a cookie set or a username and password are required".to_string(),
            )),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field(
                "cookies",
                &self.cookies.as_ref().map(|c| c.keys().collect::<Vec<_>>()),
            )
            .finish()
    }
}

/// Load cookies from a file: either a JSON object of name → value, or one
/// `name=value` pair per line (`#` starts a comment).
pub fn load_cookie_file(path: &Path) -> Result<BTreeMap<String, String>> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        CrawlError::Configuration(format!("cannot read cookie file {}: {e}", path.display()))
    })?;
    parse_cookies(&raw).map_err(|reason| {
        CrawlError::Configuration(format!("invalid cookie file {}: {reason}", path.display()))
    })
}

fn parse_cookies(raw: &str) -> std::result::Result<BTreeMap<String, String>, String> {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') {
        return serde_json::from_str(trimmed).map_err(|e| e.to_string());
    }

    let mut cookies = BTreeMap::new();
    for (n, line) in trimmed.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (name, value) = line
            .split_once('=')
            .ok_or_else(|| format!("line {} is not name=value", n + 1))?;
        if name.trim().is_empty() {
            return Err(format!("line {} has an empty cookie name", n + 1));
        }
        cookies.insert(name.trim().to_string(), value.trim().to_string());
    }
    Ok(cookies)
}
