//! InfoTex Session - Authentication state and its lifecycle on the client
//!
//! This crate owns everything the client knows about the signed-in user:
//!
//! - [`storage`]: durable key-value backends standing in for browser local storage
//! - [`persistence`]: mirrors designated state slices to durable storage
//! - [`store`]: the [`SessionStore`] handle shared by the HTTP layer, guards and UI
//! - [`refresh`]: the seam through which a session is silently re-hydrated
//! - [`guards`]: route admission decisions evaluated before navigation
//!
//! The HTTP side (token attachment, refresh-and-retry) lives in `infotex-client`,
//! which implements [`SessionRefresher`] on top of the REST backend.

pub mod guards;
pub mod persistence;
pub mod refresh;
pub mod storage;
pub mod store;

pub use guards::{
    AuthenticatedAreaGuard, GuardContext, GuardDecision, GuestOnlyGuard, RoleGuard, RouteGuard,
};
pub use persistence::{StateContainer, StatePersistence};
pub use refresh::SessionRefresher;
pub use storage::{open_storage, DurableStorage, FileStorage, MemoryStorage};
pub use store::{AuthSlice, ClientState, SessionStore, AUTH_KEY};
