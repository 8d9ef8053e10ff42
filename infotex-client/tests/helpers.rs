//! In-process stand-in for the InfoTex REST backend
//!
//! Implements just enough of the real API for end-to-end session tests: a
//! cookie-setting login, a cookie-authenticated refresh endpoint, one
//! bearer-protected profile route and logout.

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use infotex_core::InfotexConfig;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Mutex};
use tokio::net::TcpListener;

pub const USER_ID: i64 = 42;
pub const PASSWORD: &str = "secreto";
const REFRESH_COOKIE: &str = "refresh_token=r1";

static TRACING: LazyLock<()> = LazyLock::new(|| {
    if std::env::var("TEST_LOG").is_ok() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    } else {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_writer(std::io::sink)
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    }
});

/// Server-side state observed and steered by the tests
#[derive(Default)]
pub struct Backend {
    valid_token: Mutex<Option<String>>,
    issued: AtomicUsize,
    refresh_revoked: AtomicBool,
    pub refresh_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    /// `(authorization, x-retry)` seen by the protected route, in order
    pub profile_requests: Mutex<Vec<(Option<String>, Option<String>)>>,
}

impl Backend {
    /// Invalidate every issued access token, as if they had expired
    pub fn expire_tokens(&self) {
        *self.valid_token.lock().unwrap() = None;
    }

    /// Stop honouring the refresh cookie
    pub fn revoke_refresh(&self) {
        self.refresh_revoked.store(true, Ordering::SeqCst);
    }

    pub fn current_token(&self) -> Option<String> {
        self.valid_token.lock().unwrap().clone()
    }

    fn issue_token(&self) -> String {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let token = format!("token-{}", n);
        *self.valid_token.lock().unwrap() = Some(token.clone());
        token
    }
}

pub struct TestBackend {
    pub address: String,
    pub state: Arc<Backend>,
}

impl TestBackend {
    /// Client configuration pointing at this backend
    pub fn config(&self) -> InfotexConfig {
        let mut config = InfotexConfig::default();
        config.api.base_url = self.address.clone();
        config.api.timeout_seconds = 5;
        config
    }
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn login(Json(body): Json<Value>) -> Response {
    if body["password"] == PASSWORD {
        (
            StatusCode::OK,
            [(header::SET_COOKIE, format!("{}; Path=/api/auth; HttpOnly", REFRESH_COOKIE))],
            Json(json!({"ok": true, "userId": USER_ID})),
        )
            .into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"ok": false, "error": "credenciales inválidas"})),
        )
            .into_response()
    }
}

async fn refresh(State(state): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);

    let has_cookie = header_str(&headers, header::COOKIE)
        .is_some_and(|cookies| cookies.contains(REFRESH_COOKIE));
    let sent_bearer = headers.contains_key(header::AUTHORIZATION);

    if !has_cookie || sent_bearer || state.refresh_revoked.load(Ordering::SeqCst) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "sesión expirada"})),
        )
            .into_response();
    }

    let token = state.issue_token();
    Json(json!({"accessToken": token, "userId": USER_ID, "userType": "empresa"})).into_response()
}

async fn profile(State(state): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    let authorization = header_str(&headers, header::AUTHORIZATION);
    let retry = header_str(&headers, header::HeaderName::from_static("x-retry"));
    state
        .profile_requests
        .lock()
        .unwrap()
        .push((authorization.clone(), retry));

    let expected = state.current_token().map(|t| format!("Bearer {}", t));
    if expected.is_some() && authorization == expected {
        Json(json!({"id": USER_ID, "nombre": "Ana"})).into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "token expirado"})),
        )
            .into_response()
    }
}

async fn logout(State(state): State<Arc<Backend>>) -> StatusCode {
    state.logout_calls.fetch_add(1, Ordering::SeqCst);
    StatusCode::NO_CONTENT
}

/// Start the backend on an ephemeral port
pub async fn spawn_backend() -> TestBackend {
    LazyLock::force(&TRACING);

    let state = Arc::new(Backend::default());
    let app = Router::new()
        .route("/auth/login", post(login))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/logout", post(logout))
        .route("/api/usuarios/{id}/perfil", get(profile))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestBackend {
        address: format!("http://127.0.0.1:{}", port),
        state,
    }
}
