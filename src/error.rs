/// Errors surfaced by the EasyHome auth core.
///
/// Session lifecycle operations (`initialize`, `refresh_silently`) never
/// return these directly; they resolve to a session state change and record
/// the detail there. The variants below are for operations that do have a
/// caller to answer to: configuration, sign-in URL construction, and the
/// API client.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Transport-level failure talking to the identity provider or the API.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The identity provider answered, but not with what we asked for.
    #[error("OIDC {operation} failed{}: {detail}", status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Oidc {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
    },

    /// ID-token decoding or claim validation failed.
    #[error("Token error: {0}")]
    Token(String),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Session storage operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// API returned 401: the session is likely stale. Not auto-retried.
    #[error("Not authenticated (session may have expired)")]
    Unauthorized,

    /// API returned 403: authenticated but not allowed. Distinct from 401.
    #[error("Authenticated but not permitted to perform this action")]
    Forbidden,

    /// Any other non-success API response.
    #[error("API error ({status}): {detail}")]
    Api { status: u16, detail: String },
}
