// Copyright 2026 Sitecrawl Contributors
// SPDX-License-Identifier: Apache-2.0

//! Site profiles: everything the crawler knows about one target site.
//!
//! A profile bundles the base URL, the three detection selectors with their
//! known anti-bot phrases, the optional login and search endpoints, and the
//! fields to extract. Two profiles are built in:
//!
//! - `directory`: software-directory company pages. Anonymous; every work
//!   item is a page URL.
//! - `network`: professional-network company pages. Requires login; every
//!   work item is a company name resolved to page URLs through site search.

use crate::error::{CrawlError, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Text of the interstitial shown while the anti-bot check is running.
pub const CHALLENGE_RUNNING_TEXT: &str = "Checking if the site connection is secure";

/// Text of the hard denial page served once a browser fingerprint is banned.
pub const ACCESS_DENIED_TEXT: &str = "Access denied\nError code 1020";

/// URL fragment the login flow redirects to when it wants an interactive check.
pub const CHECKPOINT_FRAGMENT: &str = "checkpoint/challenge";

/// Selectors and phrases used to classify a freshly navigated page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionProfile {
    /// Marker present while the anti-bot check runs.
    pub challenge_selector: String,
    /// Marker present on a normally rendered page.
    pub content_selector: String,
    /// Marker present on the denial page.
    pub denial_selector: String,
    /// Exact text of `challenge_selector` that means "challenge".
    pub challenge_text: String,
    /// Exact text of `denial_selector` that means "blocked".
    pub denial_text: String,
    /// Frame hosting the challenge widget.
    pub challenge_frame_selector: String,
    /// Element inside the frame to click.
    pub challenge_click_selector: String,
}

impl DetectionProfile {
    /// Detection selectors for pages fronted by the common CDN challenge.
    pub fn cdn_challenge(content_selector: &str) -> Self {
        Self {
            challenge_selector: "h2[id=challenge-running]".to_string(),
            content_selector: content_selector.to_string(),
            denial_selector: "div.cf-error-title".to_string(),
            challenge_text: CHALLENGE_RUNNING_TEXT.to_string(),
            denial_text: ACCESS_DENIED_TEXT.to_string(),
            challenge_frame_selector: "iframe".to_string(),
            challenge_click_selector: "input".to_string(),
        }
    }

    /// The three competing selectors, in resolution priority order.
    pub fn selectors(&self) -> [&str; 3] {
        [
            self.challenge_selector.as_str(),
            self.content_selector.as_str(),
            self.denial_selector.as_str(),
        ]
    }
}

/// Form-login endpoints and field names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginProfile {
    /// Page carrying the sign-in form, relative to the base URL.
    pub login_path: String,
    /// Endpoint the form is posted to.
    pub submit_path: String,
    /// Final URL that means the credentials were refused.
    pub failed_login_path: String,
    /// URL fragment that means an interactive checkpoint was demanded.
    pub checkpoint_fragment: String,
    /// Selector of the sign-in form element.
    pub form_selector: String,
    /// Field names that receive the username.
    pub username_fields: Vec<String>,
    /// Field name that receives the password.
    pub password_field: String,
}

/// Site search used to resolve a company name into page URLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchProfile {
    pub search_path: String,
    /// Query parameter carrying the company name.
    pub keywords_param: String,
    /// Elements whose text holds embedded JSON payloads.
    pub payload_selector: String,
    /// Substring identifying a payload that lists companies.
    pub payload_marker: String,
    /// Key holding the page URL inside each `included` entry.
    pub url_key: String,
}

/// Where a field's value is read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    Text,
    InnerHtml,
    Attribute(String),
}

/// Post-processing applied to a raw field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldTransform {
    #[default]
    None,
    /// Keep ASCII digits only ("1,001-5,000 employees" → "10015000").
    DigitsOnly,
}

/// One named field and the selector that yields it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub selector: String,
    pub source: FieldSource,
    #[serde(default)]
    pub transform: FieldTransform,
}

impl FieldSpec {
    pub fn new(name: &str, selector: &str, source: FieldSource) -> Self {
        Self {
            name: name.to_string(),
            selector: selector.to_string(),
            source,
            transform: FieldTransform::None,
        }
    }

    pub fn with_transform(mut self, transform: FieldTransform) -> Self {
        self.transform = transform;
        self
    }
}

/// Everything the crawler needs to know about one target site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteProfile {
    pub name: String,
    pub base_url: Url,
    pub detection: DetectionProfile,
    pub login: Option<LoginProfile>,
    pub search: Option<SearchProfile>,
    pub fields: Vec<FieldSpec>,
    /// Header of the first output column.
    pub target_column: String,
    /// Header of the second output column.
    pub link_column: String,
}

impl SiteProfile {
    /// Names accepted by [`SiteProfile::by_name`].
    pub const BUILTIN: [&'static str; 2] = ["directory", "network"];

    /// Software-directory company pages.
    pub fn directory() -> Self {
        Self {
            name: "directory".to_string(),
            base_url: Url::parse("https://www.g2.com/").expect("static URL"),
            detection: DetectionProfile::cdn_challenge("div[itemprop=description]"),
            login: None,
            search: None,
            fields: vec![
                FieldSpec::new("title", "h1.l2.pb-half.inline-block", FieldSource::InnerHtml),
                FieldSpec::new("description", "div[itemprop=description]", FieldSource::Text),
                FieldSpec::new(
                    "logo_url",
                    "a.product-head__logo__img.pjax img.detail-logo",
                    FieldSource::Attribute("src".to_string()),
                ),
            ],
            target_column: "target".to_string(),
            link_column: "link".to_string(),
        }
    }

    /// Professional-network company pages behind a login.
    pub fn network() -> Self {
        Self {
            name: "network".to_string(),
            base_url: Url::parse("https://www.linkedin.com/").expect("static URL"),
            detection: DetectionProfile::cdn_challenge("main"),
            login: Some(LoginProfile {
                login_path: "/".to_string(),
                submit_path: "/uas/login-submit".to_string(),
                failed_login_path: "/uas/login-submit".to_string(),
                checkpoint_fragment: CHECKPOINT_FRAGMENT.to_string(),
                form_selector: "[data-id=\"sign-in-form\"]".to_string(),
                username_fields: vec!["session_key".to_string(), "session_username".to_string()],
                password_field: "session_password".to_string(),
            }),
            search: Some(SearchProfile {
                search_path: "/search/results/COMPANIES/".to_string(),
                keywords_param: "keywords".to_string(),
                payload_selector: "code".to_string(),
                payload_marker: "\"COMPANIES\"".to_string(),
                url_key: "navigationUrl".to_string(),
            }),
            fields: vec![FieldSpec::new(
                "employees_number",
                ".t-normal.t-black--light.link-without-visited-state.link-without-hover-state",
                FieldSource::InnerHtml,
            )
            .with_transform(FieldTransform::DigitsOnly)],
            target_column: "company".to_string(),
            link_column: "link".to_string(),
        }
    }

    /// Look up a built-in profile.
    pub fn by_name(name: &str) -> Result<Self> {
        match name {
            "directory" => Ok(Self::directory()),
            "network" => Ok(Self::network()),
            other => Err(CrawlError::Configuration(format!(
                "unknown site profile '{other}' (expected one of: {})",
                Self::BUILTIN.join(", ")
            ))),
        }
    }

    /// Point the profile at another host, keeping every relative path.
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    /// Whether a username/password or cookie set is mandatory.
    pub fn requires_login(&self) -> bool {
        self.login.is_some()
    }

    /// Resolve a profile-relative path against the base URL.
    pub fn url_for(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| CrawlError::Configuration(format!("invalid path '{path}': {e}")))
    }

    /// Host used as the cookie domain inside the browser.
    pub fn cookie_domain(&self) -> String {
        self.base_url.host_str().unwrap_or_default().to_string()
    }

    /// Output header: target, link, then one column per field.
    pub fn columns(&self) -> Vec<String> {
        let mut cols = vec![self.target_column.clone(), self.link_column.clone()];
        cols.extend(self.fields.iter().map(|f| f.name.clone()));
        cols
    }
}
