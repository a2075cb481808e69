#![doc = include_str!("../README.md")]

pub mod api;
pub mod config;
pub mod error;
pub mod guard;
pub mod manager;
pub mod oidc;
pub mod pkce;
pub mod policy;
pub mod provider;
pub mod session;
pub mod storage;
pub mod token;

// Re-exports for convenient access
pub use api::ApiClient;
pub use config::{AppConfig, OidcConfig};
pub use error::Error;
pub use guard::RouteGuard;
pub use manager::{RedirectParams, SessionManager};
pub use oidc::{OidcClient, TokenEndpointResponse};
pub use policy::{
    Capabilities, GROUPS_CLAIM, GuardDecision, RedirectTarget, Role, RoleClaims, capabilities,
    evaluate_route_guard, has_any_role, has_role, primary_role, role_claims,
};
pub use provider::{AuthorizationRedirect, IdentityProvider, TokenGrant};
pub use session::{Identity, SessionPhase, SessionSnapshot, SessionStatus, SubjectId};
pub use storage::{BoxError, MemoryStorage, PendingLogin, PersistedSession, SessionStorage};
pub use token::{IdTokenClaims, decode_id_token};
