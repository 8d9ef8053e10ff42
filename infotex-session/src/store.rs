//! Session Store - the single source of truth for "who is signed in"
//!
//! [`SessionStore`] is a cheap-to-clone handle; every clone observes the same
//! state. It is constructed once at startup and handed explicitly to the HTTP
//! interceptor, the refresh protocol, the route guards and the UI.
//!
//! Only the `auth` slice is persisted, and only its flags: the access token is
//! short-lived and stays in memory. A store rehydrated after a restart can
//! therefore report `is_authenticated() == true` while holding no token; the
//! first request (or [`SessionStore::ensure_authenticated`]) recovers one
//! through the refresh protocol.

use crate::persistence::{StateContainer, StatePersistence};
use crate::refresh::SessionRefresher;
use crate::storage::{DurableStorage, MemoryStorage};
use infotex_core::{UserId, UserType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Durable key holding the serialized auth slice
pub const AUTH_KEY: &str = "auth";

/// Flag pair written by older front-end releases, migrated once into [`AUTH_KEY`]
const LEGACY_LOGGED_IN_KEY: &str = "isLoggedIn";
const LEGACY_USER_ID_KEY: &str = "userId";

/// Authentication slice of the client state
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSlice {
    /// Short-lived bearer credential; never written to durable storage
    #[serde(skip)]
    pub access_token: Option<String>,
    /// Cached "logged in" flag, persisted for synchronous checks after a restart
    #[serde(default)]
    pub logged_in: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_type: Option<UserType>,
}

impl std::fmt::Debug for AuthSlice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSlice")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "<redacted>"),
            )
            .field("logged_in", &self.logged_in)
            .field("user_id", &self.user_id)
            .field("user_type", &self.user_type)
            .finish()
    }
}

/// Client state; each top-level field is a slice the persistence layer may track
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthSlice>,
}

/// Shared handle to the current session
#[derive(Clone)]
pub struct SessionStore {
    state: Arc<StateContainer<ClientState>>,
}

impl SessionStore {
    /// Rehydrate the session from durable storage
    pub fn new(persistence: StatePersistence) -> Self {
        let state = StateContainer::<ClientState>::new(persistence);

        let has_slice = state.read(|s| s.auth.is_some());
        if !has_slice && state.persistence().tracks(AUTH_KEY) {
            if let Some(slice) = migrate_legacy_flags(state.persistence().storage().as_ref()) {
                info!(user_id = ?slice.user_id, "Migrated legacy login flags into auth slice");
                state.update(|s| s.auth = Some(slice));
            }
        }

        let store = Self {
            state: Arc::new(state),
        };
        debug!(
            authenticated = store.is_authenticated(),
            user_id = ?store.user_id(),
            "Session store ready"
        );
        store
    }

    /// Open a store whose `auth` slice is mirrored to `storage`
    pub fn open(storage: Arc<dyn DurableStorage>) -> Self {
        Self::new(StatePersistence::new(storage, vec![AUTH_KEY.to_string()]))
    }

    /// A store backed by fresh in-memory storage
    pub fn in_memory() -> Self {
        Self::open(Arc::new(MemoryStorage::new()))
    }

    pub fn access_token(&self) -> Option<String> {
        self.state
            .read(|s| s.auth.as_ref().and_then(|a| a.access_token.clone()))
    }

    /// Cached flag; true does not guarantee the server still honours the token
    pub fn is_authenticated(&self) -> bool {
        self.state
            .read(|s| s.auth.as_ref().is_some_and(|a| a.logged_in))
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.state.read(|s| s.auth.as_ref().and_then(|a| a.user_id))
    }

    pub fn user_type(&self) -> Option<UserType> {
        self.state.read(|s| s.auth.as_ref().and_then(|a| a.user_type))
    }

    pub fn snapshot(&self) -> AuthSlice {
        self.state.read(|s| s.auth.clone().unwrap_or_default())
    }

    /// Record a successful login.
    ///
    /// `None` keeps the user id already held. A different user id drops the
    /// previous user type, which belonged to someone else.
    pub fn persist_login(&self, token: impl Into<String>, user_id: Option<UserId>) {
        let token = token.into();
        let user_id = self.state.update(|s| {
            let auth = s.auth.get_or_insert_with(AuthSlice::default);
            if let Some(id) = user_id {
                if auth.user_id != Some(id) {
                    auth.user_type = None;
                }
                auth.user_id = Some(id);
            }
            auth.access_token = Some(token);
            auth.logged_in = true;
            auth.user_id
        });
        info!(user_id = ?user_id, "Session established");
    }

    pub fn set_user_type(&self, user_type: UserType) {
        self.state.update(|s| {
            s.auth.get_or_insert_with(AuthSlice::default).user_type = Some(user_type);
        });
    }

    /// Install a freshly refreshed access token, keeping the known identity
    pub fn update_access_token(&self, token: impl Into<String>) {
        let token = token.into();
        self.state.update(|s| {
            let auth = s.auth.get_or_insert_with(AuthSlice::default);
            auth.access_token = Some(token);
            auth.logged_in = true;
        });
        debug!("Access token updated");
    }

    /// Fold identity details returned alongside a refreshed token
    pub fn update_identity(&self, user_id: Option<UserId>, user_type: Option<UserType>) {
        if user_id.is_none() && user_type.is_none() {
            return;
        }
        self.state.update(|s| {
            let auth = s.auth.get_or_insert_with(AuthSlice::default);
            if user_id.is_some() {
                auth.user_id = user_id;
            }
            if user_type.is_some() {
                auth.user_type = user_type;
            }
        });
    }

    /// Forget the session; calling it again is a no-op
    pub fn logout(&self) {
        let had_session = self.state.update(|s| s.auth.take().is_some());
        if had_session {
            info!("Session cleared");
        }
    }

    /// Authoritative check used before blocking a navigation.
    ///
    /// A held token counts as authenticated; otherwise the refresh protocol is
    /// given one chance to recover a token from the refresh credential.
    pub async fn ensure_authenticated(&self, refresher: &dyn SessionRefresher) -> bool {
        if self.access_token().is_some() {
            return true;
        }

        debug!(
            cached_flag = self.is_authenticated(),
            "No access token held; attempting silent refresh"
        );
        refresher.hydrate_from_refresh().await && self.access_token().is_some()
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("auth", &self.snapshot())
            .finish()
    }
}

/// Read the legacy flag pair, returning the equivalent slice and deleting the flags
fn migrate_legacy_flags(storage: &dyn DurableStorage) -> Option<AuthSlice> {
    let logged_in = read_legacy(storage, LEGACY_LOGGED_IN_KEY);
    let user_id = read_legacy(storage, LEGACY_USER_ID_KEY);

    if logged_in.is_none() && user_id.is_none() {
        return None;
    }

    for key in [LEGACY_LOGGED_IN_KEY, LEGACY_USER_ID_KEY] {
        if let Err(e) = storage.remove(key) {
            warn!(key = key, error = %e, "Failed to remove legacy session flag");
        }
    }

    let logged_in = match logged_in {
        Some(Value::Bool(flag)) => flag,
        Some(Value::String(flag)) => flag.eq_ignore_ascii_case("true"),
        _ => false,
    };
    if !logged_in {
        return None;
    }

    let user_id = match user_id {
        Some(Value::Number(id)) => id.as_i64(),
        Some(Value::String(id)) => id.trim().parse().ok(),
        _ => None,
    };

    Some(AuthSlice {
        access_token: None,
        logged_in: true,
        user_id,
        user_type: None,
    })
}

/// Legacy values were written as JSON by some releases and as bare strings by others
fn read_legacy(storage: &dyn DurableStorage, key: &str) -> Option<Value> {
    match storage.get(key) {
        Ok(Some(raw)) => Some(
            serde_json::from_str::<Value>(&raw).unwrap_or_else(|_| Value::String(raw.clone())),
        ),
        Ok(None) => None,
        Err(e) => {
            warn!(key = key, error = %e, "Failed to read legacy session flag");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRefresher;
    use infotex_core::{storage_error, InfotexResult};

    struct ReadOnlyStorage;

    impl DurableStorage for ReadOnlyStorage {
        fn get(&self, _key: &str) -> InfotexResult<Option<String>> {
            Ok(None)
        }

        fn set(&self, _key: &str, _value: &str) -> InfotexResult<()> {
            Err(storage_error!("storage is read-only", "read_only_storage"))
        }

        fn remove(&self, _key: &str) -> InfotexResult<()> {
            Err(storage_error!("storage is read-only", "read_only_storage"))
        }
    }

    #[test]
    fn test_fresh_store_is_unauthenticated() {
        let store = SessionStore::in_memory();
        assert_eq!(store.access_token(), None);
        assert!(!store.is_authenticated());
        assert_eq!(store.user_id(), None);
        assert_eq!(store.user_type(), None);
    }

    #[test]
    fn test_persist_login_sets_fields() {
        let store = SessionStore::in_memory();
        store.persist_login("token-1", Some(42));
        store.set_user_type(UserType::Company);

        assert_eq!(store.access_token().as_deref(), Some("token-1"));
        assert!(store.is_authenticated());
        assert_eq!(store.user_id(), Some(42));
        assert_eq!(store.user_type(), Some(UserType::Company));
    }

    #[test]
    fn test_persist_login_without_id_keeps_identity() {
        let store = SessionStore::in_memory();
        store.persist_login("token-1", Some(42));
        store.set_user_type(UserType::Company);

        store.persist_login("token-2", None);
        assert_eq!(store.access_token().as_deref(), Some("token-2"));
        assert_eq!(store.user_id(), Some(42));
        assert_eq!(store.user_type(), Some(UserType::Company));

        // Same user logging in again keeps the role too
        store.persist_login("token-3", Some(42));
        assert_eq!(store.user_type(), Some(UserType::Company));
    }

    #[test]
    fn test_persist_login_as_other_user_drops_role() {
        let store = SessionStore::in_memory();
        store.persist_login("token-1", Some(42));
        store.set_user_type(UserType::Admin);

        store.persist_login("token-2", Some(7));
        assert_eq!(store.user_id(), Some(7));
        assert_eq!(store.user_type(), None);
    }

    #[test]
    fn test_token_is_never_written_to_storage() {
        let storage = MemoryStorage::new();
        let store = SessionStore::open(Arc::new(storage.clone()));
        store.persist_login("secret-token", Some(7));

        let raw = storage.get(AUTH_KEY).unwrap().unwrap();
        assert!(!raw.contains("secret-token"));
        assert!(raw.contains("\"loggedIn\":true"));
        assert!(raw.contains("\"userId\":7"));
    }

    #[test]
    fn test_login_survives_reload() {
        let storage = MemoryStorage::new();
        let store = SessionStore::open(Arc::new(storage.clone()));
        store.persist_login("token-1", Some(42));
        store.set_user_type(UserType::Candidate);

        // Simulated page reload: a new store over the same durable storage
        let reloaded = SessionStore::open(Arc::new(storage));
        assert!(reloaded.is_authenticated());
        assert_eq!(reloaded.user_id(), Some(42));
        assert_eq!(reloaded.user_type(), Some(UserType::Candidate));
        assert_eq!(reloaded.access_token(), None);
    }

    #[test]
    fn test_logout_is_idempotent() {
        let storage = MemoryStorage::new();
        let store = SessionStore::open(Arc::new(storage.clone()));
        store.persist_login("token-1", Some(42));

        store.logout();
        let once = store.snapshot();
        store.logout();
        let twice = store.snapshot();

        assert_eq!(once, twice);
        assert_eq!(twice, AuthSlice::default());
        assert!(!store.is_authenticated());
        assert_eq!(store.access_token(), None);
        assert_eq!(storage.get(AUTH_KEY).unwrap(), None);
    }

    #[test]
    fn test_update_access_token_keeps_identity() {
        let store = SessionStore::in_memory();
        store.persist_login("expired", Some(3));
        store.set_user_type(UserType::Admin);

        store.update_access_token("fresh");

        assert_eq!(store.access_token().as_deref(), Some("fresh"));
        assert_eq!(store.user_id(), Some(3));
        assert_eq!(store.user_type(), Some(UserType::Admin));
    }

    #[test]
    fn test_update_identity_only_overwrites_known_fields() {
        let store = SessionStore::in_memory();
        store.persist_login("token", Some(3));

        store.update_identity(None, Some(UserType::Company));
        assert_eq!(store.user_id(), Some(3));
        assert_eq!(store.user_type(), Some(UserType::Company));

        store.update_identity(Some(9), None);
        assert_eq!(store.user_id(), Some(9));
        assert_eq!(store.user_type(), Some(UserType::Company));
    }

    #[test]
    fn test_storage_failures_keep_memory_authoritative() {
        let store = SessionStore::open(Arc::new(ReadOnlyStorage));
        store.persist_login("token-1", Some(1));
        assert!(store.is_authenticated());

        store.logout();
        assert!(!store.is_authenticated());
    }

    #[test]
    fn test_legacy_flags_are_migrated_once() {
        let storage = MemoryStorage::new();
        storage.set(LEGACY_LOGGED_IN_KEY, "true").unwrap();
        storage.set(LEGACY_USER_ID_KEY, "15").unwrap();

        let store = SessionStore::open(Arc::new(storage.clone()));

        assert!(store.is_authenticated());
        assert_eq!(store.user_id(), Some(15));
        assert_eq!(storage.get(LEGACY_LOGGED_IN_KEY).unwrap(), None);
        assert_eq!(storage.get(LEGACY_USER_ID_KEY).unwrap(), None);
        assert!(storage.get(AUTH_KEY).unwrap().is_some());
    }

    #[test]
    fn test_legacy_logged_out_flag_is_dropped() {
        let storage = MemoryStorage::new();
        storage.set(LEGACY_LOGGED_IN_KEY, "false").unwrap();

        let store = SessionStore::open(Arc::new(storage.clone()));

        assert!(!store.is_authenticated());
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_ensure_authenticated_with_token_skips_refresh() {
        let store = SessionStore::in_memory();
        store.persist_login("token", Some(1));
        let refresher = ScriptedRefresher::failing(&store);

        assert!(store.ensure_authenticated(&refresher).await);
        assert_eq!(refresher.calls(), 0);
    }

    #[tokio::test]
    async fn test_ensure_authenticated_hydrates_after_reload() {
        let storage = MemoryStorage::new();
        SessionStore::open(Arc::new(storage.clone())).persist_login("old", Some(5));

        let reloaded = SessionStore::open(Arc::new(storage));
        let refresher = ScriptedRefresher::succeeding(&reloaded, "fresh");

        assert!(reloaded.ensure_authenticated(&refresher).await);
        assert_eq!(refresher.calls(), 1);
        assert_eq!(reloaded.access_token().as_deref(), Some("fresh"));
        assert_eq!(reloaded.user_id(), Some(5));
    }

    #[tokio::test]
    async fn test_ensure_authenticated_reports_failed_refresh() {
        let store = SessionStore::in_memory();
        let refresher = ScriptedRefresher::failing(&store);

        assert!(!store.ensure_authenticated(&refresher).await);
        assert_eq!(refresher.calls(), 1);
        assert!(!store.is_authenticated());
    }
}
