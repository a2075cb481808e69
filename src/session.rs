use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use time::OffsetDateTime;

/// Identity-provider subject identifier (the `sub` claim).
///
/// Immutable, unique per account. Consumers store this as the sole link to
/// provider identity.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into,
)]
#[serde(transparent)]
pub struct SubjectId(pub String);

/// The authenticated user as seen by policy and UI layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Provider subject (`sub` claim).
    pub subject: SubjectId,
    /// Email, when the `email` scope yielded one.
    pub email: Option<String>,
    /// Preferred display name (`name`, falling back to `username`).
    pub display_name: Option<String>,
    /// Merged ID-token + userinfo claims. Role derivation reads the group
    /// claim from here; consumers may forward it to the backend sync endpoint.
    pub raw_claims: JsonValue,
}

/// Credential bundle owned exclusively by the session manager.
///
/// Never handed to UI layers; the only way out is
/// [`SessionManager::attach_credential`](crate::SessionManager::attach_credential).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TokenSet {
    pub(crate) access_token: String,
    pub(crate) id_token: String,
    pub(crate) refresh_token: Option<String>,
    pub(crate) expires_at: OffsetDateTime,
}

impl TokenSet {
    pub(crate) fn is_expired(&self) -> bool {
        self.expires_at <= OffsetDateTime::now_utc()
    }
}

/// Coarse session status, for matching without borrowing the identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SessionStatus {
    #[display("uninitialized")]
    Uninitialized,
    #[display("loading")]
    Loading,
    #[display("authenticated")]
    Authenticated,
    #[display("anonymous")]
    Anonymous,
    #[display("error")]
    Error,
}

/// The session lifecycle as a closed state machine.
///
/// Carrying the identity inside `Authenticated` and the detail inside
/// `Error` makes the invariants structural: an identity cannot coexist with
/// an error status, and exactly one status holds at a time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// Created at application start; nothing resolved yet.
    #[default]
    Uninitialized,
    /// A redirect resolution or silent refresh is in flight.
    Loading,
    /// Signed in; the identity is available.
    Authenticated(Identity),
    /// No session: never signed in, signed out, or restore found nothing.
    Anonymous,
    /// The last resolution attempt failed. Retry via `initialize`.
    Error(String),
}

impl SessionPhase {
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        match self {
            Self::Uninitialized => SessionStatus::Uninitialized,
            Self::Loading => SessionStatus::Loading,
            Self::Authenticated(_) => SessionStatus::Authenticated,
            Self::Anonymous => SessionStatus::Anonymous,
            Self::Error(_) => SessionStatus::Error,
        }
    }

    /// The identity, present iff authenticated.
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }

    /// Human-readable failure detail, present iff errored.
    #[must_use]
    pub fn error_detail(&self) -> Option<&str> {
        match self {
            Self::Error(detail) => Some(detail),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

/// Point-in-time view of the session, published on every transition.
///
/// The epoch increases monotonically on sign-out and on each applied
/// transition; async completions from a previous epoch are discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub epoch: u64,
}

impl SessionSnapshot {
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.phase.status()
    }

    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        self.phase.identity()
    }

    #[must_use]
    pub fn error_detail(&self) -> Option<&str> {
        self.phase.error_detail()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.phase.is_authenticated()
    }
}

#[cfg(test)]
pub(crate) fn test_identity(subject: &str, groups: &[&str]) -> Identity {
    Identity {
        subject: SubjectId(subject.to_string()),
        email: Some(format!("{subject}@easyhome.example")),
        display_name: None,
        raw_claims: serde_json::json!({ "sub": subject, "cognito:groups": groups }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_present_iff_authenticated() {
        let phases = [
            SessionPhase::Uninitialized,
            SessionPhase::Loading,
            SessionPhase::Authenticated(test_identity("u1", &["Clientes"])),
            SessionPhase::Anonymous,
            SessionPhase::Error("network".into()),
        ];
        for phase in phases {
            assert_eq!(
                phase.identity().is_some(),
                phase.status() == SessionStatus::Authenticated,
            );
            assert_eq!(
                phase.error_detail().is_some(),
                phase.status() == SessionStatus::Error,
            );
        }
    }

    #[test]
    fn error_is_distinguishable_from_loading_and_anonymous() {
        let error = SessionPhase::Error("idp unreachable".into());
        assert_ne!(error.status(), SessionStatus::Loading);
        assert_ne!(error.status(), SessionStatus::Anonymous);
        assert_eq!(error.error_detail(), Some("idp unreachable"));
    }

    #[test]
    fn token_set_expiry() {
        let live = TokenSet {
            access_token: "a".into(),
            id_token: "i".into(),
            refresh_token: None,
            expires_at: OffsetDateTime::now_utc() + time::Duration::hours(1),
        };
        let stale = TokenSet {
            expires_at: OffsetDateTime::now_utc() - time::Duration::seconds(1),
            ..live.clone()
        };
        assert!(!live.is_expired());
        assert!(stale.is_expired());
    }
}
