//! Async HTTP client wrapping reqwest, with a shared cookie jar.
//!
//! Not a browser, only HTTP requests for login and search calls. The jar is
//! the session's source of truth for cookies; browser contexts receive copies.
//! Retries on 5xx and backs off on 429.

use crate::error::Result;
use reqwest::cookie::{CookieStore, Jar};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Response from an HTTP request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Original requested URL.
    pub url: String,
    /// Final URL after redirects.
    pub final_url: Url,
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

/// HTTP client bound to one cookie jar.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    jar: Arc<Jar>,
    timeout: Duration,
}

impl HttpClient {
    /// Create a client with an empty jar.
    pub fn new(timeout_ms: u64, user_agent: &str) -> Result<Self> {
        Self::with_jar(Arc::new(Jar::default()), timeout_ms, user_agent)
    }

    /// Create a client around an existing jar.
    pub fn with_jar(jar: Arc<Jar>, timeout_ms: u64, user_agent: &str) -> Result<Self> {
        let timeout = Duration::from_millis(timeout_ms);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(user_agent)
            .cookie_provider(Arc::clone(&jar))
            .build()?;
        Ok(Self {
            client,
            jar,
            timeout,
        })
    }

    /// Store a cookie for the host of `url`.
    pub fn add_cookie(&self, name: &str, value: &str, url: &Url) {
        self.jar.add_cookie_str(&format!("{name}={value}; Path=/"), url);
    }

    /// The (name, value) pairs the jar would send to `url`.
    pub fn cookie_pairs(&self, url: &Url) -> Vec<(String, String)> {
        let Some(header) = self.jar.cookies(url) else {
            return Vec::new();
        };
        let Ok(raw) = header.to_str() else {
            return Vec::new();
        };
        raw.split(';')
            .filter_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                if name.is_empty() {
                    return None;
                }
                Some((name.to_string(), value.to_string()))
            })
            .collect()
    }

    /// GET with query parameters, retrying on 5xx and backing off on 429.
    pub async fn get(&self, url: &Url, query: &[(&str, &str)]) -> Result<HttpResponse> {
        let mut retries = 0u32;
        let max_retries = 2;

        loop {
            let resp = self
                .client
                .get(url.clone())
                .query(query)
                .timeout(self.timeout)
                .send()
                .await;

            match resp {
                Ok(r) => {
                    let status = r.status().as_u16();

                    if status >= 500 && retries < max_retries {
                        retries += 1;
                        tokio::time::sleep(Duration::from_millis(500 * 2u64.pow(retries - 1)))
                            .await;
                        continue;
                    }

                    if status == 429 && retries < max_retries {
                        retries += 1;
                        let retry_after = r
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|s| s.parse::<u64>().ok())
                            .unwrap_or(2);
                        tokio::time::sleep(Duration::from_secs(retry_after.min(10))).await;
                        continue;
                    }

                    let final_url = r.url().clone();
                    let body = r.text().await?;
                    return Ok(HttpResponse {
                        url: url.to_string(),
                        final_url,
                        status,
                        body,
                    });
                }
                Err(e) => {
                    if retries < max_retries && (e.is_connect() || e.is_timeout()) {
                        retries += 1;
                        tokio::time::sleep(Duration::from_millis(500 * 2u64.pow(retries - 1)))
                            .await;
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }
    }

    /// POST form data (url-encoded). Redirects are followed; cookies set along
    /// the way land in the jar.
    pub async fn post_form(&self, url: &Url, form_fields: &[(String, String)]) -> Result<HttpResponse> {
        let r = self
            .client
            .post(url.clone())
            .timeout(self.timeout)
            .form(form_fields)
            .send()
            .await?;
        let status = r.status().as_u16();
        let final_url = r.url().clone();
        let body = r.text().await?;

        Ok(HttpResponse {
            url: url.to_string(),
            final_url,
            status,
            body,
        })
    }
}
