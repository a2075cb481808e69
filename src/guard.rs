use std::collections::BTreeSet;

use tokio::sync::watch;

use crate::policy::{self, GuardDecision};
use crate::session::SessionSnapshot;

/// Guard for one protected view.
///
/// Each view declares its allow-list statically; the guard is the sole
/// consumer. Stateless beyond that declaration: every evaluation reads the
/// session snapshot passed in, and [`next_decision`](Self::next_decision)
/// re-evaluates whenever the session changes.
///
/// ```rust,ignore
/// let worker_panel = RouteGuard::allowing(["Trabajadores", "Admin"]);
/// match worker_panel.evaluate(&manager.snapshot()) {
///     GuardDecision::Allow => render(),
///     GuardDecision::Redirect(target) => navigate(target.to_string()),
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct RouteGuard {
    allowed_roles: Option<BTreeSet<String>>,
}

impl RouteGuard {
    /// Any authenticated user may enter.
    #[must_use]
    pub fn any_authenticated() -> Self {
        Self { allowed_roles: None }
    }

    /// Only users holding at least one of the given groups may enter.
    #[must_use]
    pub fn allowing<I, T>(roles: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            allowed_roles: Some(roles.into_iter().map(Into::into).collect()),
        }
    }

    #[must_use]
    pub fn allowed_roles(&self) -> Option<&BTreeSet<String>> {
        self.allowed_roles.as_ref()
    }

    /// Decide allow vs redirect for the given session state. Denial is a
    /// first-class result, not an error.
    #[must_use]
    pub fn evaluate(&self, snapshot: &SessionSnapshot) -> GuardDecision {
        policy::evaluate_route_guard(snapshot, self.allowed_roles.as_ref())
    }

    /// Wait for the next session transition and re-evaluate.
    ///
    /// `None` when the session manager has been dropped.
    pub async fn next_decision(
        &self,
        rx: &mut watch::Receiver<SessionSnapshot>,
    ) -> Option<GuardDecision> {
        rx.changed().await.ok()?;
        let snapshot = rx.borrow_and_update().clone();
        Some(self.evaluate(&snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::RedirectTarget;
    use crate::session::{SessionPhase, test_identity};

    fn snapshot(phase: SessionPhase) -> SessionSnapshot {
        SessionSnapshot { phase, epoch: 1 }
    }

    #[test]
    fn unrestricted_guard_only_requires_authentication() {
        let guard = RouteGuard::any_authenticated();
        assert!(
            guard
                .evaluate(&snapshot(SessionPhase::Authenticated(test_identity("u", &[]))))
                .is_allowed()
        );
        assert_eq!(
            guard.evaluate(&snapshot(SessionPhase::Anonymous)),
            GuardDecision::Redirect(RedirectTarget::Login)
        );
    }

    #[test]
    fn loading_and_error_sessions_are_not_authenticated() {
        let guard = RouteGuard::any_authenticated();
        for phase in [SessionPhase::Loading, SessionPhase::Error("x".into())] {
            assert_eq!(
                guard.evaluate(&snapshot(phase)),
                GuardDecision::Redirect(RedirectTarget::Login)
            );
        }
    }

    #[test]
    fn restricted_guard_checks_full_claim_set() {
        let guard = RouteGuard::allowing(["Trabajadores"]);
        let multi_role = snapshot(SessionPhase::Authenticated(test_identity(
            "u",
            &["Clientes", "Trabajadores"],
        )));
        assert!(guard.evaluate(&multi_role).is_allowed());

        let client_only =
            snapshot(SessionPhase::Authenticated(test_identity("u", &["Clientes"])));
        assert_eq!(
            guard.evaluate(&client_only),
            GuardDecision::Redirect(RedirectTarget::Unauthorized)
        );
    }

    #[tokio::test]
    async fn next_decision_follows_session_transitions() {
        let guard = RouteGuard::allowing(["Admin"]);
        let (tx, mut rx) = watch::channel(snapshot(SessionPhase::Anonymous));

        tx.send_replace(snapshot(SessionPhase::Authenticated(test_identity(
            "u",
            &["Admin"],
        ))));
        assert_eq!(guard.next_decision(&mut rx).await, Some(GuardDecision::Allow));

        tx.send_replace(snapshot(SessionPhase::Anonymous));
        assert_eq!(
            guard.next_decision(&mut rx).await,
            Some(GuardDecision::Redirect(RedirectTarget::Login))
        );

        drop(tx);
        assert_eq!(guard.next_decision(&mut rx).await, None);
    }
}
