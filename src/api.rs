use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::Error;
use crate::manager::SessionManager;
use crate::provider::IdentityProvider;
use crate::storage::SessionStorage;

/// HTTP client convention for the marketplace REST API.
///
/// Every call runs through the session manager's credential attachment, and
/// the two authorization failures stay distinguishable: 401 means the
/// session is likely stale (surface it, do not auto-retry), 403 means
/// authenticated but forbidden. No retries, no caching.
pub struct ApiClient<P, S> {
    base_url: Url,
    http: reqwest::Client,
    session: Arc<SessionManager<P, S>>,
}

impl<P: IdentityProvider, S: SessionStorage> ApiClient<P, S> {
    #[must_use]
    pub fn new(base_url: Url, session: Arc<SessionManager<P, S>>) -> Self {
        Self {
            base_url,
            http: reqwest::Client::new(),
            session,
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// GET a JSON resource or collection.
    ///
    /// # Errors
    ///
    /// [`Error::Unauthorized`] on 401, [`Error::Forbidden`] on 403,
    /// [`Error::Api`] on other non-success statuses, [`Error::Http`] on
    /// transport failure.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let response = self.dispatch(self.http.get(self.endpoint(path)?)).await?;
        response.json::<T>().await.map_err(Into::into)
    }

    /// POST a JSON body, expecting a JSON response.
    ///
    /// # Errors
    ///
    /// Same taxonomy as [`get_json`](Self::get_json).
    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, Error> {
        let response = self
            .dispatch(self.http.post(self.endpoint(path)?).json(body))
            .await?;
        response.json::<T>().await.map_err(Into::into)
    }

    /// DELETE a resource, ignoring any response body.
    ///
    /// # Errors
    ///
    /// Same taxonomy as [`get_json`](Self::get_json).
    pub async fn delete(&self, path: &str) -> Result<(), Error> {
        self.dispatch(self.http.delete(self.endpoint(path)?)).await?;
        Ok(())
    }

    fn endpoint(&self, path: &str) -> Result<Url, Error> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| Error::Config(format!("invalid API path '{path}': {e}")))
    }

    async fn dispatch(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, Error> {
        let response = self.session.attach_credential(request).send().await?;
        match response.status().as_u16() {
            200..=299 => Ok(response),
            401 => Err(Error::Unauthorized),
            403 => Err(Error::Forbidden),
            status => {
                let detail = response.text().await.unwrap_or_default();
                Err(Error::Api { status, detail })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use httpmock::Method::{GET, POST};
    use httpmock::MockServer;
    use serde_json::{Value as JsonValue, json};
    use time::OffsetDateTime;

    use super::*;
    use crate::provider::{AuthorizationRedirect, TokenGrant};
    use crate::session::{TokenSet, test_identity};
    use crate::storage::{MemoryStorage, PersistedSession};

    /// Provider stub for API tests: the session is seeded through storage,
    /// so no provider operation should ever run.
    struct StubProvider;

    impl IdentityProvider for StubProvider {
        fn begin_authorization(&self) -> AuthorizationRedirect {
            unreachable!("not used in api tests")
        }

        async fn exchange_code(&self, _: &str, _: &str, _: &str) -> Result<TokenGrant, Error> {
            unreachable!("not used in api tests")
        }

        async fn refresh(&self, _: &str) -> Result<TokenGrant, Error> {
            unreachable!("not used in api tests")
        }

        async fn fetch_user_info(&self, _: &str) -> Result<JsonValue, Error> {
            unreachable!("not used in api tests")
        }

        fn logout_url(&self) -> Option<Url> {
            None
        }
    }

    async fn authenticated_client(server: &MockServer) -> ApiClient<StubProvider, MemoryStorage> {
        let storage = MemoryStorage::new();
        storage
            .store(&PersistedSession {
                identity: test_identity("user-1", &["Clientes"]),
                tokens: TokenSet {
                    access_token: "access-1".into(),
                    id_token: "id-1".into(),
                    refresh_token: None,
                    expires_at: OffsetDateTime::now_utc() + time::Duration::hours(1),
                },
            })
            .await
            .unwrap();
        let manager = Arc::new(SessionManager::new(StubProvider, storage));
        manager.initialize(None).await;
        ApiClient::new(server.base_url().parse().unwrap(), manager)
    }

    #[tokio::test]
    async fn get_json_attaches_bearer_credential() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/categorias")
                    .header("authorization", "Bearer access-1");
                then.status(200)
                    .json_body(json!([{ "id": 1, "nombre": "Plomería" }]));
            })
            .await;

        let client = authenticated_client(&server).await;
        let categories: Vec<JsonValue> = client.get_json("/categorias").await.unwrap();

        mock.assert_async().await;
        assert_eq!(categories[0]["nombre"], "Plomería");
    }

    #[tokio::test]
    async fn status_401_maps_to_unauthorized() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/publicaciones");
                then.status(401);
            })
            .await;

        let client = authenticated_client(&server).await;
        let err = client
            .get_json::<JsonValue>("/publicaciones")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized));
    }

    #[tokio::test]
    async fn status_403_maps_to_forbidden_distinct_from_401() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/admin/reportes");
                then.status(403);
            })
            .await;

        let client = authenticated_client(&server).await;
        let err = client
            .get_json::<JsonValue>("/admin/reportes")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden));
        assert_ne!(err.to_string(), Error::Unauthorized.to_string());
    }

    #[tokio::test]
    async fn other_failures_carry_status_and_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/resenas");
                then.status(422).body("rating out of range");
            })
            .await;

        let client = authenticated_client(&server).await;
        let err = client
            .post_json::<_, JsonValue>("/resenas", &json!({ "rating": 17 }))
            .await
            .unwrap_err();
        match err {
            Error::Api { status, detail } => {
                assert_eq!(status, 422);
                assert_eq!(detail, "rating out of range");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn post_json_round_trips_body() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/usuarios/sync")
                    .json_body(json!({ "cognito_groups": ["Clientes"] }));
                then.status(200).json_body(json!({ "ok": true }));
            })
            .await;

        let client = authenticated_client(&server).await;
        let response: JsonValue = client
            .post_json("/usuarios/sync", &json!({ "cognito_groups": ["Clientes"] }))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response["ok"], true);
    }
}
