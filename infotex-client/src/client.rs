//! ApiClient - the entry point UI code uses to talk to the backend
//!
//! Bundles the session, the reqwest transport, the refresh protocol and the
//! authorization interceptor, wired once from [`InfotexConfig`].

use crate::auth::{AuthApi, LoginOutcome};
use crate::interceptor::{AuthInterceptor, AuthorizedClient};
use crate::refresh::RefreshProtocol;
use crate::request::{ApiRequest, ApiResponse};
use crate::transport::{HttpHandler, ReqwestTransport};
use infotex_core::{InfotexConfig, InfotexError, InfotexResult};
use infotex_session::{GuardContext, SessionRefresher, SessionStore};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Authorized access to the REST backend on behalf of one session
#[derive(Clone)]
pub struct ApiClient {
    session: SessionStore,
    refresher: Arc<dyn SessionRefresher>,
    authorized: AuthorizedClient,
    auth: Arc<AuthApi>,
}

impl ApiClient {
    /// Wire a client around the real HTTP transport
    pub fn new(config: &InfotexConfig, session: SessionStore) -> InfotexResult<Self> {
        let transport = Arc::new(ReqwestTransport::new(&config.api)?);
        Ok(Self::with_transport(config, session, transport))
    }

    /// Wire a client around any transport
    pub fn with_transport(
        config: &InfotexConfig,
        session: SessionStore,
        transport: Arc<dyn HttpHandler>,
    ) -> Self {
        let refresher: Arc<dyn SessionRefresher> = Arc::new(RefreshProtocol::new(
            session.clone(),
            transport.clone(),
            config.api.refresh_path.clone(),
        ));
        let interceptor = AuthInterceptor::new(session.clone(), refresher.clone(), &config.api);
        let authorized = AuthorizedClient::new(interceptor, transport.clone());
        let auth = Arc::new(AuthApi::new(
            session.clone(),
            transport,
            refresher.clone(),
            &config.api,
        ));

        Self {
            session,
            refresher,
            authorized,
            auth,
        }
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn refresher(&self) -> Arc<dyn SessionRefresher> {
        self.refresher.clone()
    }

    /// Context for building route guards over this client's session
    pub fn guard_context(&self, config: &InfotexConfig) -> GuardContext {
        GuardContext::new(
            self.session.clone(),
            self.refresher.clone(),
            config.routes.clone(),
        )
    }

    pub async fn login(&self, email: &str, password: &str) -> InfotexResult<LoginOutcome> {
        self.auth.login(email, password).await
    }

    pub async fn logout(&self) {
        self.auth.logout().await
    }

    pub async fn ensure_authenticated(&self) -> bool {
        self.session
            .ensure_authenticated(self.refresher.as_ref())
            .await
    }

    /// Send an arbitrary request through the interceptor
    pub async fn send(&self, request: ApiRequest) -> InfotexResult<ApiResponse> {
        debug!(method = %request.method, path = %request.path, "Dispatching API call");
        self.authorized.handle(request).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> InfotexResult<T> {
        self.send(ApiRequest::get(path)).await?.json()
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> InfotexResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(ApiRequest::post(path).json(body)?).await?.json()
    }

    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> InfotexResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(ApiRequest::put(path).json(body)?).await?.json()
    }

    /// Delete a resource; any response body is returned as JSON (`null` when empty)
    pub async fn delete(&self, path: &str) -> InfotexResult<Value> {
        self.send(ApiRequest::delete(path)).await?.json_value()
    }

    /// `/api/usuarios/{userId}/{suffix}` for the signed-in user
    pub fn profile_path(&self, suffix: &str) -> InfotexResult<String> {
        let user_id = self
            .session
            .user_id()
            .ok_or_else(|| InfotexError::unauthenticated("api_client"))?;

        let suffix = suffix.trim_matches('/');
        if suffix.is_empty() {
            Ok(format!("/api/usuarios/{}", user_id))
        } else {
            Ok(format!("/api/usuarios/{}/{}", user_id, suffix))
        }
    }
}
