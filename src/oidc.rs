use serde::Deserialize;
use serde_json::Value as JsonValue;
use time::{Duration, OffsetDateTime};
use url::Url;

use crate::config::OidcConfig;
use crate::error::Error;
use crate::pkce::{self, PkceChallenge};
use crate::provider::{AuthorizationRedirect, IdentityProvider, TokenGrant};
use crate::session::TokenSet;
use crate::token;

/// Raw response from the provider token endpoint.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct TokenEndpointResponse {
    pub access_token: String,
    pub token_type: String,
    pub id_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;

/// OIDC client for the EasyHome identity provider.
///
/// Speaks the Cognito-style hosted endpoints: authorization-code login with
/// PKCE, refresh-token grant for silent renewal, userinfo, and the hosted
/// logout page.
pub struct OidcClient {
    config: OidcConfig,
    http: reqwest::Client,
}

impl OidcClient {
    #[must_use]
    pub fn new(config: OidcConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// The issuer value expected in ID tokens: the authority without a
    /// trailing slash.
    fn expected_issuer(&self) -> &str {
        self.config.authority.as_str().trim_end_matches('/')
    }

    /// Turn a token-endpoint response into a validated grant.
    fn into_grant(
        &self,
        response: TokenEndpointResponse,
        expected_nonce: Option<&str>,
    ) -> Result<TokenGrant, Error> {
        let claims = token::decode_id_token(
            &response.id_token,
            self.expected_issuer(),
            &self.config.client_id,
            expected_nonce,
        )?;

        let lifetime = response.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        let tokens = TokenSet {
            access_token: response.access_token,
            id_token: response.id_token,
            refresh_token: response.refresh_token,
            expires_at: OffsetDateTime::now_utc()
                + Duration::seconds(i64::try_from(lifetime).unwrap_or(i64::MAX)),
        };

        Ok(TokenGrant {
            tokens,
            claims: claims.into_json(),
        })
    }

    async fn post_token_request(
        &self,
        params: &[(&str, &str)],
        operation: &'static str,
    ) -> Result<TokenEndpointResponse, Error> {
        let response = self
            .http
            .post(self.config.token_url.clone())
            .form(params)
            .send()
            .await?;

        let response = ensure_success(response, operation).await?;
        response
            .json::<TokenEndpointResponse>()
            .await
            .map_err(Into::into)
    }
}

impl IdentityProvider for OidcClient {
    /// Build the hosted-login redirect with fresh state, PKCE and nonce.
    fn begin_authorization(&self) -> AuthorizationRedirect {
        let state = pkce::generate_state();
        let nonce = pkce::generate_nonce();
        let challenge = PkceChallenge::generate();
        let scope = self.config.scopes.join(" ");

        let mut url = self.config.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", self.config.redirect_uri.as_str())
            .append_pair("state", &state)
            .append_pair("nonce", &nonce)
            .append_pair("code_challenge", challenge.challenge())
            .append_pair("code_challenge_method", "S256")
            .append_pair("scope", &scope);

        AuthorizationRedirect {
            url,
            state,
            code_verifier: challenge.verifier().to_string(),
            nonce,
        }
    }

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        expected_nonce: &str,
    ) -> Result<TokenGrant, Error> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("code_verifier", code_verifier),
        ];
        let response = self.post_token_request(&params, "token exchange").await?;
        self.into_grant(response, Some(expected_nonce))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, Error> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
        ];
        // Providers do not echo the nonce on refresh grants.
        let response = self.post_token_request(&params, "token refresh").await?;
        self.into_grant(response, None)
    }

    async fn fetch_user_info(&self, access_token: &str) -> Result<JsonValue, Error> {
        let response = self
            .http
            .get(self.config.userinfo_url.clone())
            .bearer_auth(access_token)
            .send()
            .await?;

        let response = ensure_success(response, "userinfo request").await?;
        response.json::<JsonValue>().await.map_err(Into::into)
    }

    /// Hosted logout URL: `{logout}?client_id=…&logout_uri=…`.
    ///
    /// `None` when no post-logout redirect is configured — the caller clears
    /// local state regardless.
    fn logout_url(&self) -> Option<Url> {
        let landing = self.config.post_logout_redirect.as_ref()?;
        format!(
            "{}?client_id={}&logout_uri={}",
            self.config.logout_url,
            self.config.client_id,
            urlencoding::encode(landing.as_str()),
        )
        .parse()
        .ok()
    }
}

/// Checks HTTP response status; returns the response on success or an error
/// with the body as detail.
async fn ensure_success(
    response: reqwest::Response,
    operation: &'static str,
) -> Result<reqwest::Response, Error> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let detail = response.text().await.unwrap_or_default();
    Err(Error::Oidc {
        operation,
        status: Some(status),
        detail,
    })
}

#[cfg(test)]
mod tests {
    use httpmock::Method::{GET, POST};
    use httpmock::MockServer;
    use serde_json::json;

    use super::*;
    use crate::token::encode_unsigned;

    fn client_for(server: &MockServer) -> OidcClient {
        let authority: Url = server.base_url().parse().unwrap();
        let config = OidcConfig::new(
            authority,
            "test-client",
            "https://app.easyhome.example/callback".parse().unwrap(),
        );
        OidcClient::new(config)
    }

    fn id_token(server: &MockServer, nonce: &str) -> String {
        encode_unsigned(&json!({
            "iss": server.base_url(),
            "aud": "test-client",
            "exp": OffsetDateTime::now_utc().unix_timestamp() + 3600,
            "sub": "user-1",
            "nonce": nonce,
            "cognito:groups": ["Clientes", "Trabajadores"],
        }))
    }

    #[test]
    fn authorization_redirect_carries_protocol_params() {
        let config = OidcConfig::new(
            "https://auth.easyhome.example".parse().unwrap(),
            "test-client",
            "https://app.easyhome.example/callback".parse().unwrap(),
        );
        let redirect = OidcClient::new(config).begin_authorization();
        let query = redirect.url.query().unwrap();

        assert!(query.contains("response_type=code"));
        assert!(query.contains("client_id=test-client"));
        assert!(query.contains("code_challenge_method=S256"));
        assert!(query.contains(&format!("state={}", redirect.state)));
        assert!(query.contains(&format!("nonce={}", redirect.nonce)));
        assert!(query.contains("scope=email+openid+phone"));
        assert!(!redirect.code_verifier.is_empty());
    }

    #[tokio::test]
    async fn exchange_code_returns_validated_grant() {
        let server = MockServer::start_async().await;
        let token = id_token(&server, "nonce-1");
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/oauth2/token")
                    .body_includes("grant_type=authorization_code")
                    .body_includes("code_verifier=verif");
                then.status(200).json_body(json!({
                    "access_token": "at",
                    "token_type": "Bearer",
                    "id_token": token,
                    "expires_in": 300,
                    "refresh_token": "rt",
                }));
            })
            .await;

        let grant = client_for(&server)
            .exchange_code("the-code", "verif", "nonce-1")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(grant.claims["sub"], "user-1");
        assert_eq!(grant.tokens.refresh_token.as_deref(), Some("rt"));
        assert!(!grant.tokens.is_expired());
    }

    #[tokio::test]
    async fn exchange_code_rejects_nonce_mismatch() {
        let server = MockServer::start_async().await;
        let token = id_token(&server, "other-nonce");
        server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth2/token");
                then.status(200).json_body(json!({
                    "access_token": "at",
                    "token_type": "Bearer",
                    "id_token": token,
                }));
            })
            .await;

        let err = client_for(&server)
            .exchange_code("the-code", "verif", "nonce-1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Token(_)));
    }

    #[tokio::test]
    async fn token_endpoint_error_surfaces_status_and_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth2/token");
                then.status(400).body("invalid_grant");
            })
            .await;

        let err = client_for(&server)
            .exchange_code("bad-code", "verif", "n")
            .await
            .unwrap_err();
        match err {
            Error::Oidc { operation, status, detail } => {
                assert_eq!(operation, "token exchange");
                assert_eq!(status, Some(400));
                assert_eq!(detail, "invalid_grant");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn refresh_uses_refresh_grant_and_skips_nonce() {
        let server = MockServer::start_async().await;
        let token = id_token(&server, "ignored");
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/oauth2/token")
                    .body_includes("grant_type=refresh_token")
                    .body_includes("refresh_token=rt");
                then.status(200).json_body(json!({
                    "access_token": "at2",
                    "token_type": "Bearer",
                    "id_token": token,
                }));
            })
            .await;

        let grant = client_for(&server).refresh("rt").await.unwrap();
        mock.assert_async().await;
        assert_eq!(grant.tokens.access_token, "at2");
        // No refresh token in the response: caller keeps the old one.
        assert!(grant.tokens.refresh_token.is_none());
    }

    #[tokio::test]
    async fn userinfo_sends_bearer_token() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/oauth2/userInfo")
                    .header("authorization", "Bearer at");
                then.status(200)
                    .json_body(json!({ "sub": "user-1", "email": "u@example.com" }));
            })
            .await;

        let info = client_for(&server).fetch_user_info("at").await.unwrap();
        mock.assert_async().await;
        assert_eq!(info["email"], "u@example.com");
    }

    #[test]
    fn logout_url_requires_configured_landing_page() {
        let config = OidcConfig::new(
            "https://auth.easyhome.example".parse().unwrap(),
            "test-client",
            "https://app.easyhome.example/callback".parse().unwrap(),
        );
        assert!(OidcClient::new(config.clone()).logout_url().is_none());

        let url = OidcClient::new(
            config.with_post_logout_redirect("https://app.easyhome.example/".parse().unwrap()),
        )
        .logout_url()
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://auth.easyhome.example/logout?client_id=test-client\
             &logout_uri=https%3A%2F%2Fapp.easyhome.example%2F"
        );
    }
}
