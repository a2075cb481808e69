use url::Url;

use crate::error::Error;

/// Identity-provider configuration for the EasyHome frontend core.
///
/// Required fields are constructor parameters — no runtime "missing field"
/// errors. Endpoint URLs default to the Cognito hosted-UI layout under the
/// authority and can be overridden individually.
///
/// ```rust,ignore
/// use easyhome_auth::OidcConfig;
///
/// let config = OidcConfig::new(
///     "https://auth.easyhome.example".parse()?,
///     "478qnp7vk39jamq13sl8k4sp7t",
///     "https://app.easyhome.example/callback".parse()?,
/// );
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct OidcConfig {
    pub(crate) authority: Url,
    pub(crate) client_id: String,
    pub(crate) redirect_uri: Url,
    pub(crate) authorize_url: Url,
    pub(crate) token_url: Url,
    pub(crate) userinfo_url: Url,
    pub(crate) logout_url: Url,
    pub(crate) post_logout_redirect: Option<Url>,
    pub(crate) scopes: Vec<String>,
}

fn join(authority: &Url, path: &str) -> Url {
    // A pathed authority (Cognito user-pool issuers) needs the trailing
    // slash, or Url::join would replace its last segment.
    let mut base = authority.clone();
    if !base.path().ends_with('/') {
        base.set_path(&format!("{}/", base.path()));
    }
    base.join(path)
        .expect("relative path joined onto an absolute authority URL")
}

impl OidcConfig {
    /// Create a configuration with the Cognito-style endpoint defaults and
    /// the scopes the identity pool issues group claims for.
    #[must_use]
    pub fn new(authority: Url, client_id: impl Into<String>, redirect_uri: Url) -> Self {
        Self {
            authorize_url: join(&authority, "oauth2/authorize"),
            token_url: join(&authority, "oauth2/token"),
            userinfo_url: join(&authority, "oauth2/userInfo"),
            logout_url: join(&authority, "logout"),
            authority,
            client_id: client_id.into(),
            redirect_uri,
            post_logout_redirect: None,
            scopes: vec!["email".into(), "openid".into(), "phone".into()],
        }
    }

    /// Override the authorization endpoint.
    #[must_use]
    pub fn with_authorize_url(mut self, url: Url) -> Self {
        self.authorize_url = url;
        self
    }

    /// Override the token endpoint.
    #[must_use]
    pub fn with_token_url(mut self, url: Url) -> Self {
        self.token_url = url;
        self
    }

    /// Override the userinfo endpoint.
    #[must_use]
    pub fn with_userinfo_url(mut self, url: Url) -> Self {
        self.userinfo_url = url;
        self
    }

    /// Override the hosted logout endpoint.
    #[must_use]
    pub fn with_logout_url(mut self, url: Url) -> Self {
        self.logout_url = url;
        self
    }

    /// Where the provider should send the browser after logout.
    #[must_use]
    pub fn with_post_logout_redirect(mut self, url: Url) -> Self {
        self.post_logout_redirect = Some(url);
        self
    }

    /// Override the requested scopes (default: `email openid phone`).
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    #[must_use]
    pub fn authority(&self) -> &Url {
        &self.authority
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }
}

/// Full application configuration, resolved once at process start.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct AppConfig {
    pub oidc: OidcConfig,
    pub api_base_url: Url,
}

impl AppConfig {
    /// Read configuration from the environment.
    ///
    /// # Required env vars
    /// - `EASYHOME_AUTHORITY_URL`: OIDC authority (Cognito hosted domain)
    /// - `EASYHOME_CLIENT_ID`: OAuth2 client ID
    /// - `EASYHOME_REDIRECT_URI`: callback URI registered with the provider
    /// - `EASYHOME_API_BASE_URL`: marketplace REST API base
    ///
    /// # Optional env vars
    /// - `EASYHOME_AUTHORIZE_URL`, `EASYHOME_TOKEN_URL`,
    ///   `EASYHOME_USERINFO_URL`, `EASYHOME_LOGOUT_URL`: endpoint overrides
    /// - `EASYHOME_LOGOUT_REDIRECT_URI`: post-logout landing page
    /// - `EASYHOME_SCOPES`: space-separated scope override
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if required vars are missing or URLs are
    /// invalid.
    pub fn from_env() -> Result<Self, Error> {
        let authority = require_url("EASYHOME_AUTHORITY_URL")?;
        let client_id = std::env::var("EASYHOME_CLIENT_ID")
            .map_err(|_| Error::Config("EASYHOME_CLIENT_ID is required".into()))?;
        let redirect_uri = require_url("EASYHOME_REDIRECT_URI")?;
        let api_base_url = require_url("EASYHOME_API_BASE_URL")?;

        let mut oidc = OidcConfig::new(authority, client_id, redirect_uri);

        if let Some(url) = optional_url("EASYHOME_AUTHORIZE_URL")? {
            oidc = oidc.with_authorize_url(url);
        }
        if let Some(url) = optional_url("EASYHOME_TOKEN_URL")? {
            oidc = oidc.with_token_url(url);
        }
        if let Some(url) = optional_url("EASYHOME_USERINFO_URL")? {
            oidc = oidc.with_userinfo_url(url);
        }
        if let Some(url) = optional_url("EASYHOME_LOGOUT_URL")? {
            oidc = oidc.with_logout_url(url);
        }
        if let Some(url) = optional_url("EASYHOME_LOGOUT_REDIRECT_URI")? {
            oidc = oidc.with_post_logout_redirect(url);
        }
        if let Ok(scopes) = std::env::var("EASYHOME_SCOPES") {
            oidc = oidc.with_scopes(
                scopes.split_whitespace().map(str::to_string).collect(),
            );
        }

        Ok(Self { oidc, api_base_url })
    }
}

fn require_url(var: &str) -> Result<Url, Error> {
    let raw = std::env::var(var).map_err(|_| Error::Config(format!("{var} is required")))?;
    raw.parse().map_err(|e| Error::Config(format!("{var}: {e}")))
}

fn optional_url(var: &str) -> Result<Option<Url>, Error> {
    match std::env::var(var) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{var}: {e}"))),
        Err(_) => Ok(None),
    }
}
