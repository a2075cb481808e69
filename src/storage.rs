use std::future::Future;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::session::{Identity, TokenSet};

/// Opaque error from a storage backend.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Session data persisted across full-page navigations.
///
/// `sign_in` and `sign_out` tear down the process in a browser host; this is
/// what `initialize` restores on the way back up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedSession {
    pub identity: Identity,
    pub(crate) tokens: TokenSet,
}

/// PKCE material parked between `sign_in` and the redirect callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingLogin {
    pub state: String,
    pub code_verifier: String,
    pub nonce: String,
}

/// Host-provided secure storage for session material.
///
/// The browser host backs this with platform storage; tests and native hosts
/// use [`MemoryStorage`]. Failures are surfaced as opaque errors — the
/// session manager degrades to an anonymous session rather than crashing.
pub trait SessionStorage: Send + Sync + 'static {
    /// Load the persisted session, if any.
    fn load(&self)
    -> impl Future<Output = Result<Option<PersistedSession>, BoxError>> + Send;

    /// Persist the session, replacing any previous one.
    fn store(
        &self,
        session: &PersistedSession,
    ) -> impl Future<Output = Result<(), BoxError>> + Send;

    /// Remove the persisted session. Must succeed when nothing is stored.
    fn clear(&self) -> impl Future<Output = Result<(), BoxError>> + Send;

    /// Park login material for the upcoming redirect callback.
    fn store_pending_login(
        &self,
        pending: &PendingLogin,
    ) -> impl Future<Output = Result<(), BoxError>> + Send;

    /// Take (and remove) the parked login material. One-shot: a second call
    /// returns `None`, so a replayed callback cannot reuse the verifier.
    fn take_pending_login(
        &self,
    ) -> impl Future<Output = Result<Option<PendingLogin>, BoxError>> + Send;
}

/// In-memory [`SessionStorage`], for tests and single-process hosts.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    session: Mutex<Option<PersistedSession>>,
    pending: Mutex<Option<PendingLogin>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemoryStorage {
    async fn load(&self) -> Result<Option<PersistedSession>, BoxError> {
        Ok(self.session.lock().expect("storage lock").clone())
    }

    async fn store(&self, session: &PersistedSession) -> Result<(), BoxError> {
        *self.session.lock().expect("storage lock") = Some(session.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), BoxError> {
        *self.session.lock().expect("storage lock") = None;
        Ok(())
    }

    async fn store_pending_login(&self, pending: &PendingLogin) -> Result<(), BoxError> {
        *self.pending.lock().expect("storage lock") = Some(pending.clone());
        Ok(())
    }

    async fn take_pending_login(&self) -> Result<Option<PendingLogin>, BoxError> {
        Ok(self.pending.lock().expect("storage lock").take())
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::session::test_identity;

    fn persisted() -> PersistedSession {
        PersistedSession {
            identity: test_identity("u1", &["Clientes"]),
            tokens: TokenSet {
                access_token: "at".into(),
                id_token: "it".into(),
                refresh_token: Some("rt".into()),
                expires_at: OffsetDateTime::now_utc() + time::Duration::hours(1),
            },
        }
    }

    #[tokio::test]
    async fn store_load_clear_roundtrip() {
        let storage = MemoryStorage::new();
        assert!(storage.load().await.unwrap().is_none());

        storage.store(&persisted()).await.unwrap();
        let loaded = storage.load().await.unwrap().unwrap();
        assert_eq!(loaded.identity.subject.0, "u1");

        storage.clear().await.unwrap();
        assert!(storage.load().await.unwrap().is_none());
        storage.clear().await.unwrap();
    }

    #[tokio::test]
    async fn pending_login_is_one_shot() {
        let storage = MemoryStorage::new();
        let pending = PendingLogin {
            state: "s".into(),
            code_verifier: "v".into(),
            nonce: "n".into(),
        };
        storage.store_pending_login(&pending).await.unwrap();
        assert_eq!(storage.take_pending_login().await.unwrap(), Some(pending));
        assert_eq!(storage.take_pending_login().await.unwrap(), None);
    }
}
