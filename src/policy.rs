//! Pure mapping from session state to roles, capabilities and guard
//! decisions. No state here: everything is re-derived from the latest
//! [`SessionSnapshot`] on every change, never cached across sessions.

use std::collections::BTreeSet;

use derive_more::Display;
use serde_json::Value as JsonValue;

use crate::session::SessionSnapshot;

/// Claim key Cognito publishes group memberships under.
pub const GROUPS_CLAIM: &str = "cognito:groups";

/// The three authorization groups the marketplace knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Role {
    /// Service clients (includes Google-federated sign-ins).
    #[display("Clientes")]
    Client,
    /// Service providers.
    #[display("Trabajadores")]
    Worker,
    /// Moderators.
    #[display("Admin")]
    Admin,
}

impl Role {
    /// The group name as it appears in the token claim.
    #[must_use]
    pub fn group_name(self) -> &'static str {
        match self {
            Self::Client => "Clientes",
            Self::Worker => "Trabajadores",
            Self::Admin => "Admin",
        }
    }
}

/// Group names extracted from the current session's claims.
pub type RoleClaims = BTreeSet<String>;

/// Extract the group set from the session.
///
/// Empty unless authenticated — stale claims from a prior session can never
/// leak through, because the claims live inside the `Authenticated` phase.
/// A missing or oddly-typed group claim also yields the empty set.
#[must_use]
pub fn role_claims(snapshot: &SessionSnapshot) -> RoleClaims {
    let Some(identity) = snapshot.identity() else {
        return RoleClaims::new();
    };
    groups_from_claims(&identity.raw_claims)
}

fn groups_from_claims(claims: &JsonValue) -> RoleClaims {
    claims
        .get(GROUPS_CLAIM)
        .and_then(JsonValue::as_array)
        .map(|groups| {
            groups
                .iter()
                .filter_map(JsonValue::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Whether the claims include a specific role.
#[must_use]
pub fn has_role(claims: &RoleClaims, role: Role) -> bool {
    claims.contains(role.group_name())
}

/// Whether the claims intersect an allow-list of group names.
#[must_use]
pub fn has_any_role<'a>(
    claims: &RoleClaims,
    allowed: impl IntoIterator<Item = &'a str>,
) -> bool {
    allowed.into_iter().any(|role| claims.contains(role))
}

/// The single role that decides which dashboard a multi-role user lands on.
///
/// Priority is `Clientes > Trabajadores > Admin`. Deliberate: federated
/// sign-ins are provisioned into `Clientes` and must land on the client
/// experience, and holding the `Admin` group never silently outranks an
/// everyday role.
#[must_use]
pub fn primary_role(claims: &RoleClaims) -> Option<Role> {
    [Role::Client, Role::Worker, Role::Admin]
        .into_iter()
        .find(|role| has_role(claims, *role))
}

/// Feature gates derived from the group set.
///
/// Independent booleans: a user in several groups holds all of the
/// corresponding capabilities at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub can_hire_services: bool,
    pub can_create_publication: bool,
    pub can_access_worker_panel: bool,
    pub can_edit_worker_profile: bool,
    pub is_client: bool,
    pub is_worker: bool,
    pub is_admin: bool,
}

#[must_use]
pub fn capabilities(claims: &RoleClaims) -> Capabilities {
    let is_client = has_role(claims, Role::Client);
    let is_worker = has_role(claims, Role::Worker);
    Capabilities {
        can_hire_services: is_client,
        can_create_publication: is_worker,
        can_access_worker_panel: is_worker,
        can_edit_worker_profile: is_worker,
        is_client,
        is_worker,
        is_admin: has_role(claims, Role::Admin),
    }
}

/// Where a denied navigation should send the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum RedirectTarget {
    #[display("/login")]
    Login,
    #[display("/unauthorized")]
    Unauthorized,
}

/// Outcome of evaluating a protected view against the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Redirect(RedirectTarget),
}

impl GuardDecision {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    #[must_use]
    pub fn redirect_to(&self) -> Option<RedirectTarget> {
        match self {
            Self::Allow => None,
            Self::Redirect(target) => Some(*target),
        }
    }
}

/// Decide whether the session may enter a view.
///
/// `allowed_roles = None` means any authenticated user. A user passes a
/// non-empty allow-list if **any** of their groups is listed — the full claim
/// set counts, not just the primary role.
#[must_use]
pub fn evaluate_route_guard(
    snapshot: &SessionSnapshot,
    allowed_roles: Option<&BTreeSet<String>>,
) -> GuardDecision {
    if !snapshot.is_authenticated() {
        return GuardDecision::Redirect(RedirectTarget::Login);
    }
    match allowed_roles {
        Some(allowed) if !allowed.is_empty() => {
            let claims = role_claims(snapshot);
            if has_any_role(&claims, allowed.iter().map(String::as_str)) {
                GuardDecision::Allow
            } else {
                GuardDecision::Redirect(RedirectTarget::Unauthorized)
            }
        }
        _ => GuardDecision::Allow,
    }
}
