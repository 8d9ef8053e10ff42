//! InfoTex Client - Authorized HTTP access to the InfoTex REST backend
//!
//! Layers, bottom to top:
//!
//! - [`transport`]: the [`HttpHandler`] seam and the reqwest implementation
//! - [`refresh`]: [`RefreshProtocol`], exchanging the refresh cookie for a token
//! - [`interceptor`]: [`AuthInterceptor`], attach-then-recover-once middleware
//! - [`auth`]: login and logout
//! - [`client`]: [`ApiClient`], the facade UI code calls
//!
//! ```no_run
//! use infotex_client::ApiClient;
//! use infotex_core::InfotexConfig;
//! use infotex_session::SessionStore;
//!
//! # async fn run() -> infotex_core::InfotexResult<()> {
//! let config = InfotexConfig::default();
//! let client = ApiClient::new(&config, SessionStore::in_memory())?;
//! client.login("ana@example.com", "secreto").await?;
//! let _perfil: serde_json::Value = client.get_json(&client.profile_path("perfil")?).await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod interceptor;
pub mod refresh;
pub mod request;
pub mod transport;

pub use auth::{AuthApi, LoginOutcome, DEFAULT_LOGIN_ERROR};
pub use client::ApiClient;
pub use interceptor::{AuthInterceptor, AuthorizedClient};
pub use refresh::RefreshProtocol;
pub use request::{ApiRequest, ApiResponse, RETRY_HEADER};
pub use transport::{extract_error_message, CookieScope, HttpHandler, ReqwestTransport};
