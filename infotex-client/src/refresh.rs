//! Session Refresh Protocol
//!
//! Exchanges the refresh cookie for a new access token. The call goes straight
//! to the transport: routing it through the interceptor would attach the
//! expired token and could recurse into another refresh.

use crate::request::ApiRequest;
use crate::transport::HttpHandler;
use async_trait::async_trait;
use infotex_core::{UserId, UserType};
use infotex_session::{SessionRefresher, SessionStore};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Body returned by the refresh endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    #[serde(default, alias = "access_token", alias = "token")]
    access_token: Option<String>,
    #[serde(default)]
    user_id: Option<UserId>,
    #[serde(default)]
    user_type: Option<String>,
}

/// [`SessionRefresher`] backed by `POST <refresh_path>`
pub struct RefreshProtocol {
    session: SessionStore,
    transport: Arc<dyn HttpHandler>,
    refresh_path: String,
}

impl RefreshProtocol {
    pub fn new(
        session: SessionStore,
        transport: Arc<dyn HttpHandler>,
        refresh_path: impl Into<String>,
    ) -> Self {
        Self {
            session,
            transport,
            refresh_path: refresh_path.into(),
        }
    }
}

#[async_trait]
impl SessionRefresher for RefreshProtocol {
    async fn hydrate_from_refresh(&self) -> bool {
        // Only the cookie authenticates this call; no Authorization header
        let request = ApiRequest::post(self.refresh_path.as_str()).with_credentials();

        let response = match self.transport.handle(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(path = %self.refresh_path, error = %e, "Session refresh request failed");
                return false;
            }
        };

        let body: RefreshResponse = match response.json() {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Session refresh returned an unreadable body");
                return false;
            }
        };

        let Some(token) = body.access_token.filter(|t| !t.is_empty()) else {
            warn!("Session refresh response carried no access token");
            return false;
        };

        let user_type = body.user_type.as_deref().and_then(|raw| {
            raw.parse::<UserType>()
                .map_err(|e| debug!(error = %e, "Ignoring user type from refresh response"))
                .ok()
        });

        self.session.update_access_token(token);
        self.session.update_identity(body.user_id, user_type);
        info!(user_id = ?self.session.user_id(), "Session refreshed");
        true
    }
}
