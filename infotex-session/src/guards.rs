//! Route Admission Guards
//!
//! Each guard answers one question before a navigation commits: may the user
//! go to `url`, and if not, where should they go instead. Destinations come
//! from [`RoutesConfig`]: a public landing route plus one default destination
//! per [`UserType`].
//!
//! All guards share one tie-break: a user already standing on their computed
//! destination is never redirected again, which keeps a redirect from
//! triggering another redirect to the same place.

use crate::refresh::SessionRefresher;
use crate::store::SessionStore;
use async_trait::async_trait;
use infotex_core::{RoutesConfig, UserType};
use std::sync::Arc;
use tracing::debug;

/// Outcome of a guard check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Redirect(String),
}

impl GuardDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GuardDecision::Allow)
    }
}

/// A predicate evaluated before a navigation commits
#[async_trait]
pub trait RouteGuard: Send + Sync {
    async fn check(&self, url: &str) -> GuardDecision;
}

/// Everything a guard consults: the session, the refresh protocol and the route table
#[derive(Clone)]
pub struct GuardContext {
    session: SessionStore,
    refresher: Arc<dyn SessionRefresher>,
    routes: RoutesConfig,
}

impl GuardContext {
    pub fn new(
        session: SessionStore,
        refresher: Arc<dyn SessionRefresher>,
        routes: RoutesConfig,
    ) -> Self {
        Self {
            session,
            refresher,
            routes,
        }
    }

    pub fn routes(&self) -> &RoutesConfig {
        &self.routes
    }

    async fn ensure_authenticated(&self) -> bool {
        self.session
            .ensure_authenticated(self.refresher.as_ref())
            .await
    }

    /// Default destination for the signed-in user; an unknown type is treated as a candidate
    fn destination(&self) -> &str {
        let user_type = self.session.user_type().unwrap_or(UserType::Candidate);
        self.routes.home_for(user_type)
    }

    fn landing(&self) -> GuardDecision {
        GuardDecision::Redirect(self.routes.landing.clone())
    }
}

/// Whether `url` is `destination` or lies beneath it.
///
/// The match respects path segments: `/empresa/dashboard?tab=1` is at
/// `/empresa/dashboard`, `/empresa/dashboards` is not, and the root `/` only
/// matches itself.
pub fn is_at(url: &str, destination: &str) -> bool {
    let destination = destination.trim_end_matches('/');
    if destination.is_empty() {
        return url == "/" || url.starts_with("/?") || url.starts_with("/#");
    }

    match url.strip_prefix(destination) {
        Some(rest) => {
            rest.is_empty() || rest.starts_with('/') || rest.starts_with('?') || rest.starts_with('#')
        }
        None => false,
    }
}

fn redirect_unless_at(url: &str, destination: &str) -> GuardDecision {
    if is_at(url, destination) {
        GuardDecision::Allow
    } else {
        GuardDecision::Redirect(destination.to_string())
    }
}

/// Guards the area owned by one role (the candidate area by default).
///
/// Unauthenticated users go to landing. Users of another role are sent to
/// their own default destination.
pub struct AuthenticatedAreaGuard {
    context: GuardContext,
    area_role: UserType,
}

impl AuthenticatedAreaGuard {
    pub fn new(context: GuardContext, area_role: UserType) -> Self {
        Self { context, area_role }
    }

    pub fn candidate_area(context: GuardContext) -> Self {
        Self::new(context, UserType::Candidate)
    }
}

#[async_trait]
impl RouteGuard for AuthenticatedAreaGuard {
    async fn check(&self, url: &str) -> GuardDecision {
        if !self.context.ensure_authenticated().await {
            debug!(url = url, "Authenticated area requested without a session");
            return self.context.landing();
        }

        match self.context.session.user_type() {
            Some(user_type) if user_type != self.area_role => {
                let forced = self.context.routes.home_for(user_type);
                debug!(url = url, user_type = %user_type, forced = forced, "Forcing role destination");
                redirect_unless_at(url, forced)
            }
            _ => GuardDecision::Allow,
        }
    }
}

/// Keeps signed-in users away from guest pages such as login and registration
pub struct GuestOnlyGuard {
    context: GuardContext,
}

impl GuestOnlyGuard {
    pub fn new(context: GuardContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl RouteGuard for GuestOnlyGuard {
    async fn check(&self, url: &str) -> GuardDecision {
        if !self.context.session.is_authenticated() {
            return GuardDecision::Allow;
        }
        redirect_unless_at(url, self.context.destination())
    }
}

/// Admits only users of one role (admin-only, company-only, candidate-only)
pub struct RoleGuard {
    context: GuardContext,
    role: UserType,
}

impl RoleGuard {
    pub fn new(context: GuardContext, role: UserType) -> Self {
        Self { context, role }
    }

    pub fn admin_only(context: GuardContext) -> Self {
        Self::new(context, UserType::Admin)
    }

    pub fn company_only(context: GuardContext) -> Self {
        Self::new(context, UserType::Company)
    }

    pub fn candidate_only(context: GuardContext) -> Self {
        Self::new(context, UserType::Candidate)
    }
}

#[async_trait]
impl RouteGuard for RoleGuard {
    async fn check(&self, url: &str) -> GuardDecision {
        if !self.context.ensure_authenticated().await {
            debug!(url = url, role = %self.role, "Role-restricted route requested without a session");
            return self.context.landing();
        }

        if self.context.session.user_type() == Some(self.role) {
            return GuardDecision::Allow;
        }

        redirect_unless_at(url, self.context.destination())
    }
}
