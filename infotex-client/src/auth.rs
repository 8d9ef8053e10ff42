//! Login and logout against the REST backend

use crate::request::ApiRequest;
use crate::transport::{extract_error_message, HttpHandler};
use infotex_core::{ApiConfig, ErrorContext, InfotexError, InfotexResult, UserId, UserType};
use infotex_session::{SessionRefresher, SessionStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Message used when the backend rejects a login without saying why
pub const DEFAULT_LOGIN_ERROR: &str = "credenciales inválidas";

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    user_id: Option<UserId>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default, alias = "access_token", alias = "token")]
    access_token: Option<String>,
    #[serde(default)]
    user_type: Option<String>,
}

/// Identity established by a successful login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub user_id: Option<UserId>,
    pub user_type: Option<UserType>,
}

/// Credential exchange and session termination
pub struct AuthApi {
    session: SessionStore,
    transport: Arc<dyn HttpHandler>,
    refresher: Arc<dyn SessionRefresher>,
    login_path: String,
    logout_path: String,
}

impl AuthApi {
    pub fn new(
        session: SessionStore,
        transport: Arc<dyn HttpHandler>,
        refresher: Arc<dyn SessionRefresher>,
        api: &ApiConfig,
    ) -> Self {
        Self {
            session,
            transport,
            refresher,
            login_path: api.login_path.clone(),
            logout_path: api.logout_path.clone(),
        }
    }

    /// Exchange email and password for a session.
    ///
    /// The login response sets the refresh cookie. When it does not also carry
    /// an access token, one is obtained right away through the refresh protocol.
    pub async fn login(&self, email: &str, password: &str) -> InfotexResult<LoginOutcome> {
        let request = ApiRequest::post(self.login_path.as_str())
            .json(&LoginRequest { email, password })?
            .with_credentials();

        let body: LoginResponse = match self.transport.handle(request).await {
            Ok(response) => response.json()?,
            Err(InfotexError::Http {
                status: 400 | 401 | 403,
                body,
                ..
            }) => {
                return Err(login_rejected(body.as_deref().and_then(extract_error_message)));
            }
            Err(e) => return Err(e),
        };

        if !body.ok {
            return Err(login_rejected(body.error));
        }

        let user_type = body.user_type.as_deref().and_then(|raw| raw.parse().ok());

        match body.access_token.filter(|t| !t.is_empty()) {
            Some(token) => self.session.persist_login(token, body.user_id),
            None => {
                debug!("Login response carried no access token; hydrating from refresh cookie");
                if !self.refresher.hydrate_from_refresh().await {
                    return Err(InfotexError::Authentication {
                        message: "no se pudo establecer la sesión".to_string(),
                        context: ErrorContext::new("auth_api")
                            .with_operation("login")
                            .with_suggestion("Check that the backend sets the refresh cookie on login"),
                    });
                }
            }
        }
        self.session.update_identity(body.user_id, user_type);

        let outcome = LoginOutcome {
            user_id: self.session.user_id(),
            user_type: self.session.user_type(),
        };
        info!(user_id = ?outcome.user_id, user_type = ?outcome.user_type, "Logged in");
        Ok(outcome)
    }

    /// Forget the local session and tell the backend, best effort
    pub async fn logout(&self) {
        let token = self.session.access_token();
        self.session.logout();

        let mut request = ApiRequest::post(self.logout_path.as_str()).with_credentials();
        if let Some(token) = token {
            if let Err(e) = request.set_bearer(&token) {
                debug!(error = %e, "Sending logout without bearer token");
            }
        }

        match self.transport.handle(request).await {
            Ok(_) => debug!("Server-side session terminated"),
            Err(e) => warn!(error = %e, "Server-side logout failed; local session already cleared"),
        }
    }
}

fn login_rejected(message: Option<String>) -> InfotexError {
    let message = message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LOGIN_ERROR.to_string());
    InfotexError::Authentication {
        message,
        context: ErrorContext::new("auth_api")
            .with_operation("login")
            .with_suggestion("Check the email and password"),
    }
}
