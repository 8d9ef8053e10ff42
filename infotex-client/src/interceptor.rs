//! Request Authorization Interceptor
//!
//! Every outgoing request passes through [`AuthInterceptor::intercept`], which
//! runs a small per-request state machine:
//!
//! ```text
//! Attach -> Dispatch -> Done
//!              |
//!              | 401, not login/refresh, no X-Retry
//!              v
//!          Recovering --refresh ok--> Retry (original + new token + X-Retry: 1) -> Done
//!              |
//!              +--refresh failed--> original 401 error
//! ```
//!
//! Each request gets at most one recovery attempt. The retry marker stops a
//! refreshed token that the backend still rejects from looping, and the
//! login/refresh endpoints never trigger recovery at all.

use crate::request::{ApiRequest, ApiResponse};
use crate::transport::HttpHandler;
use async_trait::async_trait;
use infotex_core::{ApiConfig, InfotexResult};
use infotex_session::guards::is_at;
use infotex_session::{SessionRefresher, SessionStore};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Attaches the session's credentials and recovers from an expired access token
#[derive(Clone)]
pub struct AuthInterceptor {
    session: SessionStore,
    refresher: Arc<dyn SessionRefresher>,
    exempt_routes: Vec<String>,
}

impl AuthInterceptor {
    /// The login and refresh endpoints from `api` are exempt from recovery
    pub fn new(
        session: SessionStore,
        refresher: Arc<dyn SessionRefresher>,
        api: &ApiConfig,
    ) -> Self {
        Self {
            session,
            refresher,
            exempt_routes: vec![api.login_path.clone(), api.refresh_path.clone()],
        }
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Whether a 401 on this request must propagate without a refresh attempt.
    ///
    /// Matches whole path segments, so `/auth/login-history` is not exempt.
    pub fn is_recovery_exempt(&self, request: &ApiRequest) -> bool {
        let route = request.route();
        let route = if route.starts_with('/') {
            route.to_string()
        } else {
            format!("/{}", route)
        };
        self.exempt_routes
            .iter()
            .any(|exempt| is_at(&route, exempt))
    }

    /// Clone `request` with the current bearer token and credentials enabled
    pub fn attach(&self, request: &ApiRequest) -> InfotexResult<ApiRequest> {
        let mut attached = request.clone();
        if let Some(token) = self.session.access_token() {
            attached.set_bearer(&token)?;
        }
        attached.with_credentials = true;
        Ok(attached)
    }

    /// Send `request` through `next`, refreshing and retrying once on an expired token
    pub async fn intercept(
        &self,
        request: ApiRequest,
        next: &dyn HttpHandler,
    ) -> InfotexResult<ApiResponse> {
        let attached = self.attach(&request)?;

        let error = match next.handle(attached).await {
            Ok(response) => return Ok(response),
            Err(error) => error,
        };

        if !error.is_unauthorized() {
            return Err(error);
        }
        if self.is_recovery_exempt(&request) {
            debug!(route = request.route(), "401 on an exempt endpoint; not refreshing");
            return Err(error);
        }
        if request.is_retry() {
            debug!(route = request.route(), "401 on an already retried request; giving up");
            return Err(error);
        }

        info!(method = %request.method, route = request.route(), "Access token rejected; attempting silent refresh");

        let refreshed = self.refresher.hydrate_from_refresh().await;
        let token = match self.session.access_token() {
            Some(token) if refreshed => token,
            _ => {
                warn!(route = request.route(), "Silent refresh failed; surfacing original error");
                return Err(error);
            }
        };

        let mut retry = request.clone();
        retry.set_bearer(&token)?;
        retry.with_credentials = true;
        retry.mark_retry();

        debug!(method = %retry.method, route = retry.route(), "Retrying with refreshed token");
        next.handle(retry).await
    }
}

/// The interceptor composed with a transport, usable wherever an [`HttpHandler`] is
#[derive(Clone)]
pub struct AuthorizedClient {
    interceptor: AuthInterceptor,
    transport: Arc<dyn HttpHandler>,
}

impl AuthorizedClient {
    pub fn new(interceptor: AuthInterceptor, transport: Arc<dyn HttpHandler>) -> Self {
        Self {
            interceptor,
            transport,
        }
    }

    pub fn interceptor(&self) -> &AuthInterceptor {
        &self.interceptor
    }

    pub fn session(&self) -> &SessionStore {
        self.interceptor.session()
    }
}

#[async_trait]
impl HttpHandler for AuthorizedClient {
    async fn handle(&self, request: ApiRequest) -> InfotexResult<ApiResponse> {
        self.interceptor
            .intercept(request, self.transport.as_ref())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingTransport, StaticRefresher};
    use infotex_core::InfotexError;

    fn interceptor(session: &SessionStore, refresher: Arc<StaticRefresher>) -> AuthInterceptor {
        AuthInterceptor::new(session.clone(), refresher, &ApiConfig::default())
    }

    fn signed_in(token: &str) -> SessionStore {
        let session = SessionStore::in_memory();
        session.persist_login(token, Some(42));
        session
    }

    #[tokio::test]
    async fn test_attach_adds_single_bearer_and_credentials() {
        let session = signed_in("valid");
        let refresher = StaticRefresher::failing(&session);
        let interceptor = interceptor(&session, refresher.clone());
        let transport = RecordingTransport::new();
        transport.respond(200, r#"{"items":[]}"#);

        let response = interceptor
            .intercept(ApiRequest::get("/api/ofertas"), &transport)
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        let sent = transport.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].headers.get_all("authorization").iter().count(), 1);
        assert_eq!(sent[0].header_str("authorization"), Some("Bearer valid"));
        assert!(sent[0].with_credentials);
        assert_eq!(refresher.calls(), 0);
    }

    #[tokio::test]
    async fn test_no_token_sends_no_authorization() {
        let session = SessionStore::in_memory();
        let interceptor = interceptor(&session, StaticRefresher::failing(&session));
        let transport = RecordingTransport::new();
        transport.respond(200, "[]");

        interceptor
            .intercept(ApiRequest::get("/api/carreras"), &transport)
            .await
            .unwrap();

        let sent = transport.requests();
        assert!(sent[0].headers.get("authorization").is_none());
        assert!(sent[0].with_credentials);
    }

    #[tokio::test]
    async fn test_refresh_success_retries_original_once() {
        let session = signed_in("expired");
        let refresher = StaticRefresher::succeeding(&session, "fresh");
        let interceptor = interceptor(&session, refresher.clone());
        let transport = RecordingTransport::new();
        transport.respond(401, r#"{"error":"token expirado"}"#);
        transport.respond(200, r#"{"id":7}"#);

        let original = ApiRequest::post("/api/postulaciones")
            .json(&serde_json::json!({"ofertaId": 3}))
            .unwrap();
        let response = interceptor
            .intercept(original.clone(), &transport)
            .await
            .unwrap();

        assert_eq!(response.body, r#"{"id":7}"#);
        assert_eq!(refresher.calls(), 1);

        let sent = transport.requests();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].header_str("authorization"), Some("Bearer expired"));
        assert!(!sent[0].is_retry());

        let retried = &sent[1];
        assert_eq!(retried.header_str("authorization"), Some("Bearer fresh"));
        assert_eq!(retried.header_str("x-retry"), Some("1"));
        assert_eq!(retried.method, original.method);
        assert_eq!(retried.path, original.path);
        assert_eq!(retried.body, original.body);
        assert!(retried.with_credentials);
        assert_eq!(session.access_token().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_refresh_failure_propagates_original_error() {
        let session = signed_in("expired");
        let refresher = StaticRefresher::failing(&session);
        let interceptor = interceptor(&session, refresher.clone());
        let transport = RecordingTransport::new();
        transport.respond(401, r#"{"error":"token expirado"}"#);

        let error = interceptor
            .intercept(ApiRequest::get("/api/usuarios/42/perfil"), &transport)
            .await
            .unwrap_err();

        match error {
            InfotexError::Http { status, message, .. } => {
                assert_eq!(status, 401);
                assert_eq!(message, "token expirado");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(refresher.calls(), 1);
        assert_eq!(transport.requests().len(), 1);
        assert_eq!(session.access_token().as_deref(), Some("expired"));
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn test_exempt_endpoints_never_recover() {
        for path in ["/auth/login", "/api/auth/refresh"] {
            for retry in [false, true] {
                let session = signed_in("expired");
                let refresher = StaticRefresher::succeeding(&session, "fresh");
                let interceptor = interceptor(&session, refresher.clone());
                let transport = RecordingTransport::new();
                transport.respond(401, "");

                let mut request = ApiRequest::post(path);
                if retry {
                    request.mark_retry();
                }
                let error = interceptor.intercept(request, &transport).await.unwrap_err();

                assert!(error.is_unauthorized());
                assert_eq!(refresher.calls(), 0, "{path} retry={retry}");
                assert_eq!(transport.requests().len(), 1);
            }
        }
    }

    #[tokio::test]
    async fn test_lookalike_routes_still_recover() {
        for path in [
            "/auth/login-history",
            "/api/admin/auth/refresh-tokens",
            "/api/auth/refreshed",
        ] {
            let session = signed_in("expired");
            let refresher = StaticRefresher::succeeding(&session, "fresh");
            let interceptor = interceptor(&session, refresher.clone());
            assert!(
                !interceptor.is_recovery_exempt(&ApiRequest::get(path)),
                "{path}"
            );

            let transport = RecordingTransport::new();
            transport.respond(401, "");
            transport.respond(200, "{}");
            interceptor.intercept(ApiRequest::get(path), &transport).await.unwrap();

            assert_eq!(refresher.calls(), 1, "{path}");
            assert_eq!(transport.requests().len(), 2);
        }
    }

    #[test]
    fn test_exempt_match_ignores_query_and_slash() {
        let session = signed_in("expired");
        let interceptor = interceptor(&session, StaticRefresher::failing(&session));

        assert!(interceptor.is_recovery_exempt(&ApiRequest::post("/auth/login?next=/admin")));
        assert!(interceptor.is_recovery_exempt(&ApiRequest::post("api/auth/refresh")));
        assert!(!interceptor.is_recovery_exempt(&ApiRequest::get("/api/ofertas")));
    }

    #[tokio::test]
    async fn test_retry_marker_blocks_second_recovery() {
        let session = signed_in("expired");
        let refresher = StaticRefresher::succeeding(&session, "fresh");
        let interceptor = interceptor(&session, refresher.clone());
        let transport = RecordingTransport::new();
        transport.respond(401, "");

        let mut request = ApiRequest::get("/api/ofertas");
        request.mark_retry();
        let error = interceptor.intercept(request, &transport).await.unwrap_err();

        assert!(error.is_unauthorized());
        assert_eq!(refresher.calls(), 0);
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_retry_rejected_again_is_final() {
        let session = signed_in("expired");
        let refresher = StaticRefresher::succeeding(&session, "fresh");
        let interceptor = interceptor(&session, refresher.clone());
        let transport = RecordingTransport::new();
        transport.respond(401, r#"{"error":"first"}"#);
        transport.respond(401, r#"{"error":"second"}"#);

        let error = interceptor
            .intercept(ApiRequest::get("/api/ofertas"), &transport)
            .await
            .unwrap_err();

        assert_eq!(error.user_message(), "second");
        assert_eq!(refresher.calls(), 1);
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_non_401_errors_propagate_without_refresh() {
        let session = signed_in("valid");
        let refresher = StaticRefresher::succeeding(&session, "fresh");
        let interceptor = interceptor(&session, refresher.clone());
        let transport = RecordingTransport::new();
        transport.respond(403, r#"{"error":"prohibido"}"#);

        let error = interceptor
            .intercept(ApiRequest::get("/api/admin/resumen"), &transport)
            .await
            .unwrap_err();

        assert_eq!(error.status(), Some(403));
        assert_eq!(refresher.calls(), 0);
    }

    #[tokio::test]
    async fn test_authorized_client_composes_interceptor() {
        let session = signed_in("expired");
        let refresher = StaticRefresher::succeeding(&session, "fresh");
        let transport = Arc::new(RecordingTransport::new());
        transport.respond(401, "");
        transport.respond(200, "ok");

        let client = AuthorizedClient::new(interceptor(&session, refresher), transport.clone());
        let response = client.handle(ApiRequest::get("/api/ofertas")).await.unwrap();

        assert_eq!(response.body, "ok");
        assert_eq!(transport.requests().len(), 2);
    }
}
