use std::future::Future;

use serde_json::Value as JsonValue;
use url::Url;

use crate::error::Error;
use crate::session::TokenSet;

/// Hosted-login redirect plus the material to park until the callback.
#[non_exhaustive]
pub struct AuthorizationRedirect {
    pub url: Url,
    pub state: String,
    pub code_verifier: String,
    pub nonce: String,
}

/// A validated token grant: credentials plus the decoded ID-token claims.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub(crate) tokens: TokenSet,
    /// Validated ID-token payload; the group claim lives here.
    pub claims: JsonValue,
}

/// The identity-provider operations the session manager depends on.
///
/// [`OidcClient`](crate::OidcClient) is the production implementation; tests
/// substitute a fake so session lifecycle behavior can be driven without a
/// network.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Build the login redirect with fresh state/PKCE/nonce material.
    fn begin_authorization(&self) -> AuthorizationRedirect;

    /// Exchange an authorization code (PKCE) for a validated grant.
    fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        expected_nonce: &str,
    ) -> impl Future<Output = Result<TokenGrant, Error>> + Send;

    /// Obtain a new grant without user interaction (refresh-token grant).
    fn refresh(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<TokenGrant, Error>> + Send;

    /// Fetch the userinfo document for an access token.
    fn fetch_user_info(
        &self,
        access_token: &str,
    ) -> impl Future<Output = Result<JsonValue, Error>> + Send;

    /// Hosted logout URL, when one can be constructed from configuration.
    fn logout_url(&self) -> Option<Url>;
}
