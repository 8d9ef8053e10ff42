//! HTTP transport and the handler seam middleware composes around
//!
//! [`HttpHandler`] is the "send" operation. The authorization interceptor takes
//! the next handler as a parameter, so anything implementing this trait (the
//! real [`ReqwestTransport`], a scripted double in tests) can sit underneath it.

use crate::request::{ApiRequest, ApiResponse};
use async_trait::async_trait;
use infotex_core::{
    config_error, network_error, validation_error, ApiConfig, ErrorContext, InfotexError,
    InfotexResult,
};
use reqwest::cookie::{CookieStore, Jar};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Sends one request and yields its response.
///
/// A non-2xx status is an error ([`InfotexError::Http`]), so callers only see
/// `Ok` for responses they can consume.
#[async_trait]
pub trait HttpHandler: Send + Sync {
    async fn handle(&self, request: ApiRequest) -> InfotexResult<ApiResponse>;
}

/// Cookies the jar sends to one URL path, as a `Cookie` header value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieScope {
    pub path: String,
    pub cookies: String,
}

/// reqwest-backed transport rooted at the configured base URL.
///
/// Cookies play the role of the browser's credential store: responses to
/// credentialed requests may set them, and only credentialed requests send
/// them back.
pub struct ReqwestTransport {
    base_url: Url,
    client: reqwest::Client,
    credentialed: reqwest::Client,
    cookies: Arc<Jar>,
    /// Base URL followed by the auth endpoints, the paths cookies are captured for
    cookie_scopes: Vec<Url>,
}

impl ReqwestTransport {
    pub fn new(config: &ApiConfig) -> InfotexResult<Self> {
        Self::with_cookie_jar(config, Arc::new(Jar::default()))
    }

    /// Build a transport sharing an existing cookie jar
    pub fn with_cookie_jar(config: &ApiConfig, cookies: Arc<Jar>) -> InfotexResult<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            config_error!(
                format!("Invalid API base URL '{}': {}", config.base_url, e),
                "http_transport"
            )
        })?;

        let client = create_http_client(config, None)?;
        let credentialed = create_http_client(config, Some(cookies.clone()))?;

        let mut cookie_scopes = vec![base_url.clone()];
        for path in [&config.login_path, &config.refresh_path, &config.logout_path] {
            let url = join_path(&base_url, path)?;
            if !cookie_scopes.contains(&url) {
                cookie_scopes.push(url);
            }
        }

        Ok(Self {
            base_url,
            client,
            credentialed,
            cookies,
            cookie_scopes,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Cookies the jar would send to the base URL and to each auth endpoint.
    ///
    /// A cookie already listed under an earlier scope is not repeated, so a
    /// `Path=/` cookie appears once under the base path.
    pub fn captured_cookies(&self) -> Vec<CookieScope> {
        let mut seen = HashSet::new();
        let mut scopes = Vec::new();

        for url in &self.cookie_scopes {
            let Some(header) = self.cookies.cookies(url) else {
                continue;
            };
            let Ok(header) = header.to_str() else {
                warn!(path = url.path(), "Skipping non-ASCII cookie header");
                continue;
            };

            let fresh: Vec<&str> = split_cookie_header(header)
                .filter(|pair| seen.insert(pair.to_string()))
                .collect();
            if !fresh.is_empty() {
                scopes.push(CookieScope {
                    path: url.path().to_string(),
                    cookies: fresh.join("; "),
                });
            }
        }
        scopes
    }

    /// Seed the jar from previously captured scopes, each cookie bound to its path
    pub fn restore_cookies(&self, scopes: &[CookieScope]) {
        for scope in scopes {
            let mut url = self.base_url.clone();
            url.set_path(&scope.path);
            for pair in split_cookie_header(&scope.cookies) {
                self.cookies
                    .add_cookie_str(&format!("{}; Path={}", pair, scope.path), &url);
            }
            debug!(path = %scope.path, "Restored cookies");
        }
    }

    fn url_for(&self, request: &ApiRequest) -> InfotexResult<Url> {
        let mut url = join_path(&self.base_url, &request.path)?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }
        Ok(url)
    }
}

#[async_trait]
impl HttpHandler for ReqwestTransport {
    async fn handle(&self, request: ApiRequest) -> InfotexResult<ApiResponse> {
        let url = self.url_for(&request)?;
        let client = if request.with_credentials {
            &self.credentialed
        } else {
            &self.client
        };

        debug!(method = %request.method, url = %url, credentials = request.with_credentials, "Sending request");

        let mut builder = client
            .request(request.method.clone(), url.clone())
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            let message = if e.is_timeout() {
                format!("Request to {} timed out", url)
            } else {
                format!("Request to {} failed: {}", url, e)
            };
            network_error!(message, "http_transport", e)
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(handle_response_error(response, request.route()).await);
        }

        let headers = response.headers().clone();
        let body = response.text().await.map_err(|e| {
            network_error!(format!("Failed to read response from {}: {}", url, e), "http_transport", e)
        })?;

        debug!(status = status.as_u16(), url = %url, "Request completed");
        Ok(ApiResponse {
            status: status.as_u16(),
            headers,
            body,
        })
    }
}

/// Append a request path to the base URL, keeping any base path prefix
fn join_path(base_url: &Url, path: &str) -> InfotexResult<Url> {
    let joined = format!(
        "{}/{}",
        base_url.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Url::parse(&joined).map_err(|e| {
        validation_error!(
            format!("Invalid request path '{}': {}", path, e),
            "path",
            "http_transport"
        )
    })
}

fn split_cookie_header(header: &str) -> impl Iterator<Item = &str> {
    header.split(';').map(str::trim).filter(|pair| !pair.is_empty())
}

/// Build a reqwest client with the configured timeout and user agent
fn create_http_client(
    config: &ApiConfig,
    cookies: Option<Arc<Jar>>,
) -> InfotexResult<reqwest::Client> {
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        reqwest::header::USER_AGENT,
        reqwest::header::HeaderValue::from_str(&config.user_agent).map_err(|e| {
            InfotexError::Config {
                message: format!("Invalid user agent: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("http_transport").with_operation("create_client"),
            }
        })?,
    );

    let mut builder = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .default_headers(headers);
    if let Some(jar) = cookies {
        builder = builder.cookie_provider(jar);
    }

    builder.build().map_err(|e| InfotexError::Internal {
        message: format!("Failed to create HTTP client: {}", e),
        source: Some(Box::new(e)),
        context: ErrorContext::new("http_transport").with_operation("create_client"),
    })
}

/// Turn a non-2xx response into an [`InfotexError::Http`]
async fn handle_response_error(response: reqwest::Response, route: &str) -> InfotexError {
    let status = response.status();
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            warn!(status = status.as_u16(), error = %e, "Failed to read error body");
            String::new()
        }
    };

    let message = extract_error_message(&body)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_string());

    debug!(status = status.as_u16(), route = route, message = %message, "Request rejected");

    let body = if body.is_empty() { None } else { Some(body) };
    let mut error = InfotexError::http(status.as_u16(), message, body);
    if let InfotexError::Http { context, .. } = &mut error {
        context.operation = Some(route.to_string());
    }
    error
}

/// Best-effort human readable message from an error body.
///
/// JSON bodies are searched for the usual message fields; short plain-text
/// bodies are used as-is. Anything else yields `None`.
pub fn extract_error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return ["error", "message", "mensaje", "detail"]
            .iter()
            .find_map(|field| match value.get(field) {
                Some(Value::String(text)) if !text.trim().is_empty() => Some(text.clone()),
                Some(Value::Object(inner)) => inner
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                _ => None,
            });
    }

    let looks_like_markup = trimmed.starts_with('<');
    if !looks_like_markup && trimmed.len() <= 200 {
        return Some(trimmed.to_string());
    }
    None
}
