use std::sync::Mutex;

use serde_json::Value as JsonValue;
use tokio::sync::watch;
use url::Url;

use crate::error::Error;
use crate::provider::{IdentityProvider, TokenGrant};
use crate::session::{Identity, SessionPhase, SessionSnapshot, SessionStatus, SubjectId, TokenSet};
use crate::storage::{PendingLogin, PersistedSession, SessionStorage};

/// Query parameters of an authorization-code callback.
///
/// Parsed from the URL the identity provider redirected back to. `None` from
/// [`from_url`](Self::from_url) means the URL is not a callback and
/// `initialize` should restore from storage instead.
#[derive(Debug, Clone, Default)]
pub struct RedirectParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl RedirectParams {
    #[must_use]
    pub fn from_url(url: &Url) -> Option<Self> {
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            let value = value.into_owned();
            match key.as_ref() {
                "code" => params.code = Some(value),
                "state" => params.state = Some(value),
                "error" => params.error = Some(value),
                "error_description" => params.error_description = Some(value),
                _ => {}
            }
        }
        (params.code.is_some() || params.error.is_some()).then_some(params)
    }
}

struct Inner {
    phase: SessionPhase,
    tokens: Option<TokenSet>,
    epoch: u64,
}

/// Owner of the process-wide authentication session.
///
/// Single writer: every transition goes through this type. Reads happen via
/// [`snapshot`](Self::snapshot) or the reactive [`subscribe`](Self::subscribe)
/// channel. Async completions carry the epoch of the attempt that started
/// them and are discarded if the session moved on (sign-out always wins over
/// a stale refresh).
pub struct SessionManager<P, S> {
    provider: P,
    storage: S,
    inner: Mutex<Inner>,
    tx: watch::Sender<SessionSnapshot>,
    init_gate: tokio::sync::Mutex<()>,
}

impl<P: IdentityProvider, S: SessionStorage> SessionManager<P, S> {
    #[must_use]
    pub fn new(provider: P, storage: S) -> Self {
        let initial = SessionSnapshot {
            phase: SessionPhase::Uninitialized,
            epoch: 0,
        };
        let (tx, _rx) = watch::channel(initial);
        Self {
            provider,
            storage,
            inner: Mutex::new(Inner {
                phase: SessionPhase::Uninitialized,
                tokens: None,
                epoch: 0,
            }),
            tx,
            init_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Current point-in-time view of the session.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.lock().expect("session lock");
        SessionSnapshot {
            phase: inner.phase.clone(),
            epoch: inner.epoch,
        }
    }

    /// Watch the session for transitions. Policy outputs should be
    /// re-derived from each received snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    /// Resolve the session once at startup.
    ///
    /// With `redirect` present this completes a hosted-login round trip:
    /// state check against the parked pending login, PKCE code exchange,
    /// ID-token validation, userinfo merge. Without it, an unexpired
    /// persisted session is restored; otherwise the session is anonymous.
    ///
    /// Failures resolve to the `Error` phase with a detail message — never an
    /// `Err` — and a later `initialize` call retries. Concurrent calls are
    /// deduplicated: one resolution runs, every caller observes its result.
    pub async fn initialize(&self, redirect: Option<RedirectParams>) -> SessionSnapshot {
        let _gate = self.init_gate.lock().await;

        let current = self.snapshot();
        if !matches!(
            current.status(),
            SessionStatus::Uninitialized | SessionStatus::Error
        ) {
            return current;
        }

        let epoch = self.transition(SessionPhase::Loading, None);

        let outcome = match redirect {
            Some(params) => self.resolve_redirect(params).await,
            None => self.restore().await,
        };

        match outcome {
            Ok((phase, tokens)) => {
                self.apply_if_current(epoch, phase, tokens);
            }
            Err(detail) => {
                self.apply_if_current(epoch, SessionPhase::Error(detail), None);
            }
        }
        self.snapshot()
    }

    /// Begin a hosted login: park the state/PKCE/nonce material and return
    /// the URL the host must navigate to. The application resumes via
    /// `initialize` after the provider redirects back.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the pending login cannot be parked —
    /// without it the callback could not be validated.
    pub async fn sign_in(&self) -> Result<Url, Error> {
        let redirect = self.provider.begin_authorization();
        let pending = PendingLogin {
            state: redirect.state,
            code_verifier: redirect.code_verifier,
            nonce: redirect.nonce,
        };
        self.storage
            .store_pending_login(&pending)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        tracing::info!("redirecting to hosted login");
        Ok(redirect.url)
    }

    /// Clear the session unconditionally, then hand back the provider logout
    /// URL if one can be constructed (`None` on config gaps — local state is
    /// cleared either way).
    pub async fn sign_out(&self) -> Option<Url> {
        self.transition(SessionPhase::Anonymous, None);
        if let Err(e) = self.storage.clear().await {
            tracing::warn!(error = %e, "failed to clear persisted session on sign-out");
        }
        tracing::info!("signed out");
        self.provider.logout_url()
    }

    /// Renew the access token without user interaction.
    ///
    /// Success re-enters `Authenticated` with fresh tokens and identity.
    /// Failure lands `Error`: silent refresh cannot self-heal, so the caller
    /// escalates to [`sign_in`](Self::sign_in). A completion that lost the
    /// race against `sign_out` is discarded.
    pub async fn refresh_silently(&self) -> SessionSnapshot {
        let refresh_token = {
            let inner = self.inner.lock().expect("session lock");
            match (&inner.phase, &inner.tokens) {
                (SessionPhase::Authenticated(_), Some(tokens)) => {
                    tokens.refresh_token.clone()
                }
                // Nothing to refresh.
                _ => {
                    return SessionSnapshot {
                        phase: inner.phase.clone(),
                        epoch: inner.epoch,
                    };
                }
            }
        };

        let Some(refresh_token) = refresh_token else {
            // No refresh credential: the session cannot self-heal.
            self.transition(
                SessionPhase::Error("no refresh token available".into()),
                None,
            );
            return self.snapshot();
        };

        let epoch = self.transition(SessionPhase::Loading, None);

        match self.resolve_grant(self.provider.refresh(&refresh_token).await).await {
            Ok((identity, mut tokens)) => {
                // Providers may omit the refresh token on renewal.
                tokens.refresh_token = tokens.refresh_token.or(Some(refresh_token));
                let persisted = PersistedSession {
                    identity: identity.clone(),
                    tokens: tokens.clone(),
                };
                if self.apply_if_current(epoch, SessionPhase::Authenticated(identity), Some(tokens))
                {
                    if let Err(e) = self.storage.store(&persisted).await {
                        tracing::warn!(error = %e, "failed to persist refreshed session");
                    }
                    tracing::info!("silent refresh succeeded");
                }
            }
            Err(detail) => {
                if self.apply_if_current(epoch, SessionPhase::Error(detail), None) {
                    tracing::warn!("silent refresh failed");
                }
            }
        }
        self.snapshot()
    }

    /// Attach the bearer credential to an outgoing request, iff the session
    /// is authenticated with an unexpired token. Otherwise the request is
    /// returned unmodified and the server answers 401 — the designed
    /// outcome, not retried here.
    #[must_use]
    pub fn attach_credential(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let inner = self.inner.lock().expect("session lock");
        match (&inner.phase, &inner.tokens) {
            (SessionPhase::Authenticated(_), Some(tokens)) if !tokens.is_expired() => {
                request.bearer_auth(&tokens.access_token)
            }
            _ => request,
        }
    }

    // ── Lifecycle internals ────────────────────────────────────────────

    async fn resolve_redirect(
        &self,
        params: RedirectParams,
    ) -> Result<(SessionPhase, Option<TokenSet>), String> {
        if let Some(error) = &params.error {
            let desc = params.error_description.as_deref().unwrap_or("unknown error");
            tracing::warn!(error = %error, description = %desc, "provider returned login error");
            return Err(format!("{error}: {desc}"));
        }

        let code = params.code.ok_or("missing authorization code")?;
        let received_state = params.state.ok_or("missing state parameter")?;

        let pending = self
            .storage
            .take_pending_login()
            .await
            .map_err(|e| e.to_string())?
            .ok_or("no pending login for this callback")?;

        if received_state != pending.state {
            tracing::warn!("login state mismatch");
            return Err("state mismatch".into());
        }

        let grant = self
            .provider
            .exchange_code(&code, &pending.code_verifier, &pending.nonce)
            .await;
        let (identity, tokens) = self.resolve_grant(grant).await?;

        let persisted = PersistedSession {
            identity: identity.clone(),
            tokens: tokens.clone(),
        };
        if let Err(e) = self.storage.store(&persisted).await {
            tracing::warn!(error = %e, "failed to persist session after login");
        }

        tracing::info!(subject = %identity.subject, "login successful");
        Ok((SessionPhase::Authenticated(identity), Some(tokens)))
    }

    async fn restore(&self) -> Result<(SessionPhase, Option<TokenSet>), String> {
        match self.storage.load().await {
            Ok(Some(persisted)) if !persisted.tokens.is_expired() => {
                tracing::info!(subject = %persisted.identity.subject, "restored persisted session");
                Ok((
                    SessionPhase::Authenticated(persisted.identity),
                    Some(persisted.tokens),
                ))
            }
            Ok(Some(_)) => {
                if let Err(e) = self.storage.clear().await {
                    tracing::warn!(error = %e, "failed to drop expired persisted session");
                }
                Ok((SessionPhase::Anonymous, None))
            }
            Ok(None) => Ok((SessionPhase::Anonymous, None)),
            Err(e) => {
                tracing::warn!(error = %e, "session storage unavailable");
                Ok((SessionPhase::Anonymous, None))
            }
        }
    }

    /// Turn a provider grant into an identity, merging userinfo over the
    /// ID-token claims.
    async fn resolve_grant(
        &self,
        grant: Result<TokenGrant, Error>,
    ) -> Result<(Identity, TokenSet), String> {
        let grant = grant.map_err(|e| {
            tracing::error!(error = %e, "token grant failed");
            e.to_string()
        })?;

        let userinfo = self
            .provider
            .fetch_user_info(&grant.tokens.access_token)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "userinfo request failed");
                e.to_string()
            })?;

        let identity = build_identity(grant.claims, userinfo)?;
        Ok((identity, grant.tokens))
    }

    /// Unconditional transition: bump the epoch, set the phase, publish.
    fn transition(&self, phase: SessionPhase, tokens: Option<TokenSet>) -> u64 {
        let mut inner = self.inner.lock().expect("session lock");
        inner.epoch += 1;
        inner.phase = phase;
        inner.tokens = tokens;
        let snapshot = SessionSnapshot {
            phase: inner.phase.clone(),
            epoch: inner.epoch,
        };
        self.tx.send_replace(snapshot);
        inner.epoch
    }

    /// Apply an async completion only if the session has not moved on since
    /// the attempt started. Returns whether it was applied.
    fn apply_if_current(
        &self,
        attempt_epoch: u64,
        phase: SessionPhase,
        tokens: Option<TokenSet>,
    ) -> bool {
        let mut inner = self.inner.lock().expect("session lock");
        if inner.epoch != attempt_epoch {
            tracing::debug!(
                attempt_epoch,
                current_epoch = inner.epoch,
                "discarding stale session transition"
            );
            return false;
        }
        inner.epoch += 1;
        inner.phase = phase;
        inner.tokens = tokens;
        let snapshot = SessionSnapshot {
            phase: inner.phase.clone(),
            epoch: inner.epoch,
        };
        self.tx.send_replace(snapshot);
        true
    }
}

fn build_identity(claims: JsonValue, userinfo: JsonValue) -> Result<Identity, String> {
    let mut merged = claims;
    if let (Some(target), Some(extra)) = (merged.as_object_mut(), userinfo.as_object()) {
        for (key, value) in extra {
            target.insert(key.clone(), value.clone());
        }
    }

    let subject = merged
        .get("sub")
        .and_then(JsonValue::as_str)
        .ok_or("missing claim: sub")?
        .to_string();
    let email = merged
        .get("email")
        .and_then(JsonValue::as_str)
        .map(str::to_string);
    let display_name = ["name", "username", "cognito:username"]
        .iter()
        .find_map(|key| merged.get(*key).and_then(JsonValue::as_str))
        .map(str::to_string);

    Ok(Identity {
        subject: SubjectId(subject),
        email,
        display_name,
        raw_claims: merged,
    })
}
