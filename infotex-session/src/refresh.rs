//! Silent session re-hydration seam

use async_trait::async_trait;

/// Exchanges the long-lived refresh credential for a new access token.
///
/// Implementations install the new token into the [`crate::SessionStore`]
/// themselves and report the outcome as a plain boolean: network and server
/// failures are logged and turned into `false`, never returned as errors.
/// No de-duplication is expected; two concurrent callers simply perform two
/// independent refreshes.
#[async_trait]
pub trait SessionRefresher: Send + Sync {
    async fn hydrate_from_refresh(&self) -> bool;
}
