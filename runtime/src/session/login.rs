//! Form-based login flow.
//!
//! The sign-in form carries hidden fields whose names and values rotate per
//! page load, so every `<input>` of the form is harvested instead of a fixed
//! list; only the username/password fields are overlaid.

use crate::acquisition::http_client::{HttpClient, HttpResponse};
use crate::error::{CrawlError, Result};
use crate::profile::{LoginProfile, SiteProfile};
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

/// Retry policy for fetching the login form.
#[derive(Debug, Clone, Copy)]
pub struct LoginRetry {
    pub attempts: u32,
    pub delay: Duration,
}

/// Extract `name → value` for every named input inside the sign-in form.
///
/// `None` when the form is absent (the anti-automation layer sometimes serves
/// a page without it).
pub fn parse_sign_in_form(html: &str, form_selector: &str) -> Option<Vec<(String, String)>> {
    let document = Html::parse_document(html);
    let form_sel = Selector::parse(form_selector).ok()?;
    let input_sel = Selector::parse("input").ok()?;

    let form = document.select(&form_sel).next()?;
    let fields = form
        .select(&input_sel)
        .filter_map(|input| {
            let name = input.value().attr("name")?;
            let value = input.value().attr("value").unwrap_or_default();
            Some((name.to_string(), value.to_string()))
        })
        .collect();
    Some(fields)
}

/// Fetch the login page and harvest its form, retrying transient failures.
pub async fn fetch_login_form(
    client: &HttpClient,
    profile: &SiteProfile,
    login: &LoginProfile,
    retry: LoginRetry,
) -> Result<Vec<(String, String)>> {
    let url = profile.url_for(&login.login_path)?;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let outcome = match client.get(&url, &[]).await {
            Ok(resp) => parse_sign_in_form(&resp.body, &login.form_selector).ok_or_else(|| {
                CrawlError::TransientNavigation(format!(
                    "sign-in form {} missing from {} (status {})",
                    login.form_selector, resp.final_url, resp.status
                ))
            }),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(fields) => return Ok(fields),
            Err(e) if attempt < retry.attempts && e.is_transient() => {
                warn!(
                    "login form attempt {attempt}/{} failed: {e}; retrying in {:?}",
                    retry.attempts, retry.delay
                );
                tokio::time::sleep(retry.delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Overlay the username and password onto the harvested fields.
pub fn fill_credentials(
    mut fields: Vec<(String, String)>,
    login: &LoginProfile,
    username: &str,
    password: &str,
) -> Vec<(String, String)> {
    let mut set = |name: &str, value: &str| {
        match fields.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => fields.push((name.to_string(), value.to_string())),
        }
    };
    for name in &login.username_fields {
        set(name.as_str(), username);
    }
    set(login.password_field.as_str(), password);
    fields
}

/// Reason the login was refused, judging by where the submit landed.
pub fn rejection_reason(
    response: &HttpResponse,
    profile: &SiteProfile,
    login: &LoginProfile,
) -> Option<String> {
    let failed = profile.url_for(&login.failed_login_path).ok();
    if same_endpoint(&response.final_url, failed.as_ref()) {
        return Some(format!("credentials refused ({})", response.final_url));
    }
    if response.final_url.as_str().contains(&login.checkpoint_fragment) {
        return Some(format!(
            "interactive checkpoint demanded ({})",
            response.final_url
        ));
    }
    if response.body.contains(&profile.detection.denial_text) {
        return Some("access denied by the anti-bot layer".to_string());
    }
    None
}

fn same_endpoint(a: &Url, b: Option<&Url>) -> bool {
    b.is_some_and(|b| a.origin() == b.origin() && a.path() == b.path())
}

/// Run the full form flow on `client`, leaving the auth cookies in its jar.
pub async fn log_in(
    client: &HttpClient,
    profile: &SiteProfile,
    login: &LoginProfile,
    username: &str,
    password: &str,
    retry: LoginRetry,
) -> Result<()> {
    let fields = fetch_login_form(client, profile, login, retry).await?;
    let form = fill_credentials(fields, login, username, password);

    let submit = profile.url_for(&login.submit_path)?;
    let response = client.post_form(&submit, &form).await?;

    if let Some(reason) = rejection_reason(&response, profile, login) {
        return Err(CrawlError::Authentication(reason));
    }
    info!("logged in to {}", profile.base_url);
    Ok(())
}
