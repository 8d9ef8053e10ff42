//! Request and response values exchanged with the REST backend

use infotex_core::{validation_error, InfotexResult};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Marker carried by a request replayed after a silent refresh
pub const RETRY_HEADER: HeaderName = HeaderName::from_static("x-retry");

/// An outgoing API call, independent of the transport that sends it
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the configured base URL, e.g. `/api/ofertas`
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<Value>,
    /// Whether cookies (the refresh credential) travel with the request
    pub with_credentials: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            with_credentials: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> InfotexResult<Self> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Set a header, replacing any previous value under the same name
    pub fn header(mut self, name: &str, value: &str) -> InfotexResult<Self> {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            validation_error!(format!("Invalid header name '{}': {}", name, e), "headers", "api_request")
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            validation_error!(format!("Invalid value for header '{}': {}", name, e), "headers", "api_request")
        })?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn with_credentials(mut self) -> Self {
        self.with_credentials = true;
        self
    }

    /// Replace the `Authorization` header with `Bearer <token>`
    pub fn set_bearer(&mut self, token: &str) -> InfotexResult<()> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
            validation_error!(
                "Access token contains characters not allowed in a header",
                "access_token",
                "api_request"
            )
        })?;
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);
        Ok(())
    }

    pub fn mark_retry(&mut self) {
        self.headers.insert(RETRY_HEADER, HeaderValue::from_static("1"));
    }

    pub fn is_retry(&self) -> bool {
        self.headers.contains_key(RETRY_HEADER)
    }

    /// Header value as text; `None` when absent or not visible ASCII
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Path without query string or fragment
    pub fn route(&self) -> &str {
        self.path
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
    }
}

/// A successful (2xx) response
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> InfotexResult<T> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Decode the body as JSON, treating an empty body as `null`
    pub fn json_value(&self) -> InfotexResult<Value> {
        if self.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        self.json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_bearer_replaces_existing_authorization() {
        let mut request = ApiRequest::get("/api/ofertas")
            .header("Authorization", "Basic abc")
            .unwrap();
        request.set_bearer("tok").unwrap();

        assert_eq!(request.headers.get_all(AUTHORIZATION).iter().count(), 1);
        assert_eq!(request.header_str("authorization"), Some("Bearer tok"));
    }

    #[test]
    fn test_set_bearer_rejects_header_breaking_tokens() {
        let mut request = ApiRequest::get("/api/ofertas");
        assert!(request.set_bearer("bad\ntoken").is_err());
    }

    #[test]
    fn test_retry_marker() {
        let mut request = ApiRequest::post("/api/postulaciones");
        assert!(!request.is_retry());
        request.mark_retry();
        assert!(request.is_retry());
        assert_eq!(request.header_str("X-Retry"), Some("1"));
    }

    #[test]
    fn test_route_strips_query_and_fragment() {
        assert_eq!(ApiRequest::get("/api/ofertas?page=2").route(), "/api/ofertas");
        assert_eq!(ApiRequest::get("/api/ofertas#top").route(), "/api/ofertas");
        assert_eq!(ApiRequest::get("/api/ofertas").route(), "/api/ofertas");
    }

    #[test]
    fn test_response_json() {
        let response = ApiResponse::new(200, r#"{"ok":true}"#);
        assert_eq!(response.json_value().unwrap(), json!({"ok": true}));
        assert_eq!(ApiResponse::new(204, "").json_value().unwrap(), Value::Null);
        assert!(ApiResponse::new(200, "not json").json_value().is_err());
    }
}
