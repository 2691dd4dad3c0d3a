//! Role-gated access decisions.
//!
//! `evaluate` is a pure function of the resolved identity and an optional
//! allow-list. The route layer turns the decision into a response before any
//! protected data is loaded.

use crate::model::Role;
use crate::services::auth::IdentityState;

pub const ADMIN: &[Role] = &[Role::Admin];
pub const SELLER: &[Role] = &[Role::Seller];
pub const BUYER: &[Role] = &[Role::Buyer];
pub const ADMIN_OR_SELLER: &[Role] = &[Role::Admin, Role::Seller];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    Home,
}

impl Route {
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Login => "/login",
            Self::Home => "/",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Loading,
    Redirect(Route),
    Render,
}

/// Decide whether a protected view may render.
///
/// `allowed_roles = None` admits any authenticated identity.
#[must_use]
pub fn evaluate(state: &IdentityState, allowed_roles: Option<&[Role]>) -> GuardDecision {
    match state {
        IdentityState::Resolving => GuardDecision::Loading,
        IdentityState::Anonymous => GuardDecision::Redirect(Route::Login),
        IdentityState::Authenticated(identity) => match allowed_roles {
            Some(roles) if !roles.contains(&identity.role) => GuardDecision::Redirect(Route::Home),
            _ => GuardDecision::Render,
        },
    }
}

#[cfg(test)]
#[path = "guard_test.rs"]
mod tests;
