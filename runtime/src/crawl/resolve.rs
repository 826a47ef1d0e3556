//! Company name → page URLs through the site's search endpoint.
//!
//! The search results page embeds its data as JSON inside `<code>` elements.
//! Payloads mentioning the companies vertical carry an `included` array whose
//! entries hold the page URL.

use crate::error::{CrawlError, Result};
use crate::profile::SearchProfile;
use crate::session::Session;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{debug, warn};

/// Page URLs found in a search results page, deduplicated in page order.
pub fn parse_search_results(html: &str, search: &SearchProfile) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse(&search.payload_selector) else {
        warn!("invalid payload selector {}", search.payload_selector);
        return Vec::new();
    };

    let mut links: Vec<String> = Vec::new();
    for element in document.select(&selector) {
        let text: String = element.text().collect();
        if !text.contains(&search.payload_marker) {
            continue;
        }
        let payload: Value = match serde_json::from_str(text.trim()) {
            Ok(v) => v,
            Err(e) => {
                debug!("skipping unparseable search payload: {e}");
                continue;
            }
        };
        let Some(included) = payload.get("included").and_then(Value::as_array) else {
            continue;
        };
        for entry in included {
            if let Some(url) = entry.get(&search.url_key).and_then(Value::as_str) {
                if !links.iter().any(|l| l == url) {
                    links.push(url.to_string());
                }
            }
        }
    }
    links
}

/// Search the site for `name` with the session's cookies.
pub async fn resolve_company_links(session: &Session, name: &str) -> Result<Vec<String>> {
    let profile = session.profile();
    let search = profile.search.as_ref().ok_or_else(|| {
        CrawlError::Configuration(format!("profile '{}' has no search endpoint", profile.name))
    })?;
    let url = profile.url_for(&search.search_path)?;

    let resp = session
        .http()
        .get(&url, &[(search.keywords_param.as_str(), name)])
        .await?;
    if resp.status >= 400 {
        return Err(CrawlError::TransientNavigation(format!(
            "search for '{name}' returned status {}",
            resp.status
        )));
    }

    let links = parse_search_results(&resp.body, search);
    debug!("search for '{name}' resolved {} link(s)", links.len());
    Ok(links)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::SiteProfile;

    fn search() -> SearchProfile {
        SiteProfile::network().search.unwrap()
    }

    #[test]
    fn test_links_from_company_payloads_only() {
        let html = r#"<html><body>
            <code>{"data":{"vertical":"PEOPLE"},"included":[{"navigationUrl":"https://x/in/bob"}]}</code>
            <code>{"data":{"vertical":"COMPANIES"},"included":[
                {"navigationUrl":"https://x/company/acme/"},
                {"entityUrn":"urn:li:fs_miniCompany:1"},
                {"navigationUrl":"https://x/company/acme-labs/"},
                {"navigationUrl":"https://x/company/acme/"}
            ]}</code>
            <code>"COMPANIES" but not json</code>
        </body></html>"#;

        assert_eq!(
            parse_search_results(html, &search()),
            vec![
                "https://x/company/acme/".to_string(),
                "https://x/company/acme-labs/".to_string(),
            ]
        );
    }

    #[test]
    fn test_escaped_payload_is_decoded() {
        let html = "<code>{&quot;v&quot;:&quot;COMPANIES&quot;,&quot;included&quot;:\
                    [{&quot;navigationUrl&quot;:&quot;https://x/company/acme/&quot;}]}</code>";
        assert_eq!(
            parse_search_results(html, &search()),
            vec!["https://x/company/acme/".to_string()]
        );
    }

    #[test]
    fn test_no_payload_means_no_links() {
        assert!(parse_search_results("<html></html>", &search()).is_empty());
    }
}
