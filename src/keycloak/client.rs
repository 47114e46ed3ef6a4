//! Authenticated client for the Keycloak admin REST API
//!
//! Every resource-specific call is a path builder over four primitives:
//! `create`, `update`, `get`/`list` and `delete`. They share one status
//! policy so that the same action can be replayed safely:
//!
//! | verb   | success                  | absent        |
//! |--------|--------------------------|---------------|
//! | create | 201, 204, 409            |               |
//! | update | 2xx                      |               |
//! | get    | 200                      | 404 -> `None` |
//! | list   | 2xx                      |               |
//! | delete | 2xx, 404                 |               |

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::crd::TokenResponse;
use crate::error::{OperatorError, Result};

const TOKEN_PATH: &str = "auth/realms/master/protocol/openid-connect/token";
const ADMIN_CLIENT_ID: &str = "admin-cli";

/// Transport settings for [`KeycloakClient`].
#[derive(Debug, Clone)]
pub struct KeycloakClientConfig {
    /// Timeout applied to every request
    pub request_timeout: Duration,
    /// Accept self-signed serving certificates
    pub accept_invalid_certs: bool,
}

impl Default for KeycloakClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            accept_invalid_certs: true,
        }
    }
}

/// Client bound to one Keycloak endpoint and, after [`login`](Self::login), one bearer token.
///
/// The token is never refreshed. An expired token surfaces as a failed
/// request and the caller builds a new client on its next pass.
#[derive(Debug, Clone)]
pub struct KeycloakClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl KeycloakClient {
    /// Create an unauthenticated client for `base_url`
    pub fn new(base_url: impl Into<String>, config: &KeycloakClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| OperatorError::Configuration(format!("invalid HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.base_url
    }

    fn admin_url(&self, path: &str) -> String {
        format!("{}/auth/admin/{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(self.token.as_deref().unwrap_or_default())
    }

    async fn send(&self, builder: RequestBuilder, verb: &str, kind: &str) -> Result<Response> {
        self.authorized(builder).send().await.map_err(|e| {
            error!(verb, kind, error = %e, "Admin API request failed");
            OperatorError::Http(format!("error performing {} {} request: {}", verb, kind, e))
        })
    }

    /// Request a token with the password grant of the `admin-cli` client.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let url = format!("{}/{}", self.base_url, TOKEN_PATH);
        let form = [
            ("username", username),
            ("password", password),
            ("client_id", ADMIN_CLIENT_ID),
            ("grant_type", "password"),
        ];

        let response = self.http.post(&url).form(&form).send().await.map_err(|e| {
            error!(error = %e, "Token request failed");
            OperatorError::Http(format!("error performing token request: {}", e))
        })?;
        let body = response.bytes().await?;
        let token: TokenResponse = serde_json::from_slice(&body).map_err(|e| {
            OperatorError::Serialization(format!("error parsing token response: {}", e))
        })?;

        if !token.error.is_empty() {
            error!(error = %token.error, "Token request rejected");
            return Err(OperatorError::Authentication(token.error_description));
        }

        self.token = Some(token.access_token);
        Ok(())
    }

    /// Unauthenticated liveness check. Anything but 200 is a failure.
    pub async fn ping(&self) -> Result<()> {
        let url = format!("{}/auth/", self.base_url);
        let response = self.http.get(&url).send().await.map_err(|e| {
            error!(error = %e, "Ping request failed");
            OperatorError::Http(format!("error performing ping request: {}", e))
        })?;

        let status = response.status();
        debug!(status = status.as_u16(), "Ping response");
        if status != StatusCode::OK {
            return Err(status_error("ping", "keycloak", status));
        }
        Ok(())
    }

    /// POST `obj` to `path`. Returns the id from the `Location` header, empty if absent.
    pub async fn create<B: Serialize + ?Sized>(
        &self,
        obj: &B,
        path: &str,
        kind: &str,
    ) -> Result<String> {
        let body = encode(obj, kind)?;
        let request = self
            .http
            .post(self.admin_url(path))
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        let response = self.send(request, "create", kind).await?;

        let status = response.status();
        if status == StatusCode::CONFLICT {
            info!(kind, path, "Object already exists");
        } else if status != StatusCode::CREATED && status != StatusCode::NO_CONTENT {
            return Err(status_error("create", kind, status));
        }

        Ok(location_id(&response))
    }

    /// PUT `obj` to `path`.
    pub async fn update<B: Serialize + ?Sized>(&self, obj: &B, path: &str, kind: &str) -> Result<()> {
        let body = encode(obj, kind)?;
        let request = self
            .http
            .put(self.admin_url(path))
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        let response = self.send(request, "update", kind).await?;

        let status = response.status();
        if !status.is_success() {
            error!(kind, status = status.as_u16(), "Update rejected");
            return Err(status_error("update", kind, status));
        }
        Ok(())
    }

    /// GET `path` and hand the body to `decode`. A 404 is `Ok(None)`.
    pub async fn get_with<T, F>(&self, path: &str, kind: &str, decode: F) -> Result<Option<T>>
    where
        F: FnOnce(&[u8]) -> Result<T> + Send,
    {
        let request = self.http.get(self.admin_url(path));
        let response = self.send(request, "get", kind).await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(kind, path, "Object does not exist");
            return Ok(None);
        }
        if status != StatusCode::OK {
            return Err(status_error("get", kind, status));
        }

        let body = response.bytes().await?;
        decode(&body).map(Some).map_err(|e| {
            error!(kind, error = %e, "Failed to decode response");
            e
        })
    }

    /// GET `path` as JSON.
    pub async fn get<T: DeserializeOwned>(&self, path: &str, kind: &str) -> Result<Option<T>> {
        self.get_with(path, kind, |body| Ok(serde_json::from_slice(body)?))
            .await
    }

    /// GET a collection. Decode failures are logged and yield an empty collection.
    pub async fn list<T: DeserializeOwned + Default>(&self, path: &str, kind: &str) -> Result<T> {
        let request = self.http.get(self.admin_url(path));
        let response = self.send(request, "list", kind).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error("list", kind, status));
        }

        let body = response.bytes().await?;
        match serde_json::from_slice(&body) {
            Ok(items) => Ok(items),
            Err(e) => {
                error!(kind, error = %e, "Failed to decode list response");
                Ok(T::default())
            }
        }
    }

    /// DELETE `path`. A 404 counts as deleted.
    pub async fn delete(&self, path: &str, kind: &str) -> Result<()> {
        self.send_delete(path, kind, None).await
    }

    /// DELETE `path` with a JSON body identifying what to remove.
    pub async fn delete_with_body<B: Serialize + ?Sized>(
        &self,
        path: &str,
        kind: &str,
        obj: &B,
    ) -> Result<()> {
        let body = encode(obj, kind)?;
        self.send_delete(path, kind, Some(body)).await
    }

    async fn send_delete(&self, path: &str, kind: &str, body: Option<Vec<u8>>) -> Result<()> {
        let mut request = self.http.delete(self.admin_url(path));
        if let Some(body) = body {
            request = request.header(CONTENT_TYPE, "application/json").body(body);
        }
        let response = self.send(request, "delete", kind).await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(kind, path, "Object already deleted");
            return Ok(());
        }
        if !status.is_success() {
            return Err(status_error("delete", kind, status));
        }
        Ok(())
    }
}

fn encode<B: Serialize + ?Sized>(obj: &B, kind: &str) -> Result<Vec<u8>> {
    serde_json::to_vec(obj).map_err(|e| {
        error!(kind, error = %e, "Failed to serialize request body");
        OperatorError::Serialization(format!("{}: {}", kind, e))
    })
}

fn location_id(response: &Response) -> String {
    response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|location| location.rsplit('/').next())
        .unwrap_or_default()
        .to_string()
}

fn status_error(verb: &'static str, kind: &str, status: StatusCode) -> OperatorError {
    OperatorError::Status {
        verb,
        kind: kind.to_string(),
        status: status.as_u16(),
        reason: status.canonical_reason().unwrap_or_default().to_string(),
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{authenticated_client, TEST_TOKEN};
    use super::*;
    use crate::crd::KeycloakApiClient;
    use std::collections::BTreeMap;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_create_returns_location_id() {
        let server = MockServer::start().await;
        let client = authenticated_client(&server).await;

        Mock::given(method("POST"))
            .and(path("/auth/admin/realms/basic/clients"))
            .and(header("authorization", format!("Bearer {}", TEST_TOKEN).as_str()))
            .respond_with(ResponseTemplate::new(201).insert_header(
                "Location",
                format!("{}/auth/admin/realms/basic/clients/0f1d", server.uri()).as_str(),
            ))
            .mount(&server)
            .await;

        let id = client
            .create(&KeycloakApiClient::default(), "realms/basic/clients", "client")
            .await
            .unwrap();
        assert_eq!(id, "0f1d");
    }

    #[tokio::test]
    async fn test_create_conflict_is_success() {
        let server = MockServer::start().await;
        let client = authenticated_client(&server).await;

        Mock::given(method("POST"))
            .and(path("/auth/admin/realms"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;

        let id = client
            .create(&serde_json::json!({"realm": "basic"}), "realms", "realm")
            .await
            .unwrap();
        assert_eq!(id, "");
    }

    #[tokio::test]
    async fn test_create_conflict_keeps_location_id() {
        let server = MockServer::start().await;
        let client = authenticated_client(&server).await;

        Mock::given(method("POST"))
            .and(path("/auth/admin/realms/basic/users"))
            .respond_with(
                ResponseTemplate::new(409).insert_header("Location", "/realms/basic/users/u-1"),
            )
            .mount(&server)
            .await;

        let id = client
            .create(&serde_json::json!({"username": "alice"}), "realms/basic/users", "user")
            .await
            .unwrap();
        assert_eq!(id, "u-1");
    }

    #[tokio::test]
    async fn test_create_other_status_names_kind() {
        let server = MockServer::start().await;
        let client = authenticated_client(&server).await;

        Mock::given(method("POST"))
            .and(path("/auth/admin/realms/basic/users"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let err = client
            .create(&serde_json::json!({}), "realms/basic/users", "user")
            .await
            .unwrap_err();
        match err {
            OperatorError::Status { verb, kind, status, .. } => {
                assert_eq!(verb, "create");
                assert_eq!(kind, "user");
                assert_eq!(status, 400);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_create_serialization_failure_is_surfaced() {
        let server = MockServer::start().await;
        let client = authenticated_client(&server).await;

        // JSON object keys must be strings
        let mut bad = BTreeMap::new();
        bad.insert((1, 2), "x");

        let err = client.create(&bad, "realms", "realm").await.unwrap_err();
        assert!(matches!(err, OperatorError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_get_not_found_is_none() {
        let server = MockServer::start().await;
        let client = authenticated_client(&server).await;

        Mock::given(method("GET"))
            .and(path("/auth/admin/realms/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let realm: Option<serde_json::Value> = client.get("realms/missing", "realm").await.unwrap();
        assert!(realm.is_none());
    }

    #[tokio::test]
    async fn test_get_decode_error_is_surfaced() {
        let server = MockServer::start().await;
        let client = authenticated_client(&server).await;

        Mock::given(method("GET"))
            .and(path("/auth/admin/realms/basic/clients/c1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = client
            .get::<KeycloakApiClient>("realms/basic/clients/c1", "client")
            .await
            .unwrap_err();
        assert!(matches!(err, OperatorError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_get_server_error() {
        let server = MockServer::start().await;
        let client = authenticated_client(&server).await;

        Mock::given(method("GET"))
            .and(path("/auth/admin/realms/basic"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = client
            .get::<serde_json::Value>("realms/basic", "realm")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_list_decode_error_is_best_effort() {
        let server = MockServer::start().await;
        let client = authenticated_client(&server).await;

        Mock::given(method("GET"))
            .and(path("/auth/admin/realms/basic/users"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"oops\": true}"))
            .mount(&server)
            .await;

        let users: Vec<serde_json::Value> =
            client.list("realms/basic/users", "users").await.unwrap();
        assert!(users.is_empty());
    }

    #[tokio::test]
    async fn test_update_requires_success_status() {
        let server = MockServer::start().await;
        let client = authenticated_client(&server).await;

        Mock::given(method("PUT"))
            .and(path("/auth/admin/realms/basic"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/auth/admin/realms/other"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let body = serde_json::json!({"realm": "basic"});
        client.update(&body, "realms/basic", "realm").await.unwrap();
        assert!(client.update(&body, "realms/other", "realm").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_not_found_is_success() {
        let server = MockServer::start().await;
        let client = authenticated_client(&server).await;

        Mock::given(method("DELETE"))
            .and(path("/auth/admin/realms/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        client.delete("realms/gone", "realm").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_with_body() {
        let server = MockServer::start().await;
        let client = authenticated_client(&server).await;

        Mock::given(method("DELETE"))
            .and(path("/auth/admin/realms/basic/users/u1/role-mappings/realm"))
            .and(body_string_contains("offline_access"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client
            .delete_with_body(
                "realms/basic/users/u1/role-mappings/realm",
                "user realm role",
                &serde_json::json!([{"name": "offline_access"}]),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_failure_status() {
        let server = MockServer::start().await;
        let client = authenticated_client(&server).await;

        Mock::given(method("DELETE"))
            .and(path("/auth/admin/realms/basic"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        assert!(client.delete("realms/basic", "realm").await.is_err());
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/{}", TOKEN_PATH)))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Invalid user credentials"
            })))
            .mount(&server)
            .await;

        let mut client =
            KeycloakClient::new(server.uri(), &KeycloakClientConfig::default()).unwrap();
        let err = client.login("admin", "wrong").await.unwrap_err();
        match err {
            OperatorError::Authentication(msg) => assert_eq!(msg, "Invalid user credentials"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_ping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = KeycloakClient::new(server.uri(), &KeycloakClientConfig::default()).unwrap();
        client.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_ping_requires_exactly_ok() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = KeycloakClient::new(server.uri(), &KeycloakClientConfig::default()).unwrap();
        assert!(client.ping().await.is_err());
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let client =
            KeycloakClient::new("https://keycloak.sso.svc:8443/", &KeycloakClientConfig::default())
                .unwrap();
        assert_eq!(client.endpoint(), "https://keycloak.sso.svc:8443");
        assert_eq!(
            client.admin_url("realms"),
            "https://keycloak.sso.svc:8443/auth/admin/realms"
        );
    }
}
