//! User, federated identity and role mapping endpoints

use url::form_urlencoded::byte_serialize;

use super::KeycloakClient;
use crate::crd::{FederatedIdentity, KeycloakApiUser, KeycloakUserRole, PasswordReset};
use crate::error::{OperatorError, Result};

fn encode_query(value: &str) -> String {
    byte_serialize(value.as_bytes()).collect()
}

fn user_id(user: &KeycloakApiUser) -> Result<&str> {
    user.id
        .as_deref()
        .ok_or_else(|| OperatorError::InvalidState(format!("user {} has no id", user.username)))
}

impl KeycloakClient {
    pub async fn create_user(&self, user: &KeycloakApiUser, realm: &str) -> Result<String> {
        self.create(user, &format!("realms/{}/users", realm), "user")
            .await
    }

    pub async fn get_user(&self, id: &str, realm: &str) -> Result<Option<KeycloakApiUser>> {
        self.get(&format!("realms/{}/users/{}", realm, id), "user")
            .await
    }

    /// First user whose searchable fields match `email`.
    pub async fn find_user_by_email(
        &self,
        email: &str,
        realm: &str,
    ) -> Result<Option<KeycloakApiUser>> {
        let users: Option<Vec<KeycloakApiUser>> = self
            .get(
                &format!(
                    "realms/{}/users?first=0&max=1&search={}",
                    realm,
                    encode_query(email)
                ),
                "user",
            )
            .await?;
        Ok(users.and_then(|u| u.into_iter().next()))
    }

    /// User with exactly this username. The search endpoint matches substrings.
    pub async fn find_user_by_username(
        &self,
        username: &str,
        realm: &str,
    ) -> Result<Option<KeycloakApiUser>> {
        let users: Option<Vec<KeycloakApiUser>> = self
            .get(
                &format!(
                    "realms/{}/users?username={}&max=-1",
                    realm,
                    encode_query(username)
                ),
                "user",
            )
            .await?;
        Ok(users.and_then(|u| u.into_iter().find(|user| user.username == username)))
    }

    pub async fn update_user(&self, user: &KeycloakApiUser, realm: &str) -> Result<()> {
        let id = user_id(user)?;
        self.update(user, &format!("realms/{}/users/{}", realm, id), "user")
            .await
    }

    pub async fn update_password(
        &self,
        user: &KeycloakApiUser,
        realm: &str,
        new_password: &str,
    ) -> Result<()> {
        let id = user_id(user)?;
        let reset = PasswordReset {
            r#type: "password".to_string(),
            value: new_password.to_string(),
            temporary: false,
        };
        self.update(
            &reset,
            &format!("realms/{}/users/{}/reset-password", realm, id),
            "password reset",
        )
        .await
    }

    pub async fn delete_user(&self, id: &str, realm: &str) -> Result<()> {
        self.delete(&format!("realms/{}/users/{}", realm, id), "user")
            .await
    }

    pub async fn list_users(&self, realm: &str) -> Result<Vec<KeycloakApiUser>> {
        self.list(&format!("realms/{}/users", realm), "users").await
    }

    pub async fn create_federated_identity(
        &self,
        identity: &FederatedIdentity,
        user_id: &str,
        realm: &str,
    ) -> Result<String> {
        self.create(
            identity,
            &format!(
                "realms/{}/users/{}/federated-identity/{}",
                realm, user_id, identity.identity_provider
            ),
            "federated-identity",
        )
        .await
    }

    pub async fn remove_federated_identity(
        &self,
        identity: &FederatedIdentity,
        user_id: &str,
        realm: &str,
    ) -> Result<()> {
        self.delete_with_body(
            &format!(
                "realms/{}/users/{}/federated-identity/{}",
                realm, user_id, identity.identity_provider
            ),
            "federated-identity",
            identity,
        )
        .await
    }

    pub async fn get_user_federated_identities(
        &self,
        user_id: &str,
        realm: &str,
    ) -> Result<Vec<FederatedIdentity>> {
        let identities: Option<Vec<FederatedIdentity>> = self
            .get(
                &format!("realms/{}/users/{}/federated-identity", realm, user_id),
                "federated-identity",
            )
            .await?;
        Ok(identities.unwrap_or_default())
    }

    pub async fn create_user_client_role(
        &self,
        role: &KeycloakUserRole,
        realm: &str,
        client_id: &str,
        user_id: &str,
    ) -> Result<String> {
        self.create(
            &[role],
            &format!(
                "realms/{}/users/{}/role-mappings/clients/{}",
                realm, user_id, client_id
            ),
            "user client role",
        )
        .await
    }

    pub async fn list_user_client_roles(
        &self,
        realm: &str,
        client_id: &str,
        user_id: &str,
    ) -> Result<Vec<KeycloakUserRole>> {
        self.list(
            &format!(
                "realms/{}/users/{}/role-mappings/clients/{}",
                realm, user_id, client_id
            ),
            "user client roles",
        )
        .await
    }

    pub async fn list_available_user_client_roles(
        &self,
        realm: &str,
        client_id: &str,
        user_id: &str,
    ) -> Result<Vec<KeycloakUserRole>> {
        self.list(
            &format!(
                "realms/{}/users/{}/role-mappings/clients/{}/available",
                realm, user_id, client_id
            ),
            "user client roles",
        )
        .await
    }

    pub async fn delete_user_client_role(
        &self,
        role: &KeycloakUserRole,
        realm: &str,
        client_id: &str,
        user_id: &str,
    ) -> Result<()> {
        self.delete_with_body(
            &format!(
                "realms/{}/users/{}/role-mappings/clients/{}",
                realm, user_id, client_id
            ),
            "user client role",
            &[role],
        )
        .await
    }

    pub async fn create_user_realm_role(
        &self,
        role: &KeycloakUserRole,
        realm: &str,
        user_id: &str,
    ) -> Result<String> {
        self.create(
            &[role],
            &format!("realms/{}/users/{}/role-mappings/realm", realm, user_id),
            "user realm role",
        )
        .await
    }

    pub async fn list_user_realm_roles(
        &self,
        realm: &str,
        user_id: &str,
    ) -> Result<Vec<KeycloakUserRole>> {
        self.list(
            &format!("realms/{}/users/{}/role-mappings/realm", realm, user_id),
            "user realm roles",
        )
        .await
    }

    pub async fn list_available_user_realm_roles(
        &self,
        realm: &str,
        user_id: &str,
    ) -> Result<Vec<KeycloakUserRole>> {
        self.list(
            &format!(
                "realms/{}/users/{}/role-mappings/realm/available",
                realm, user_id
            ),
            "user realm roles",
        )
        .await
    }

    pub async fn delete_user_realm_role(
        &self,
        role: &KeycloakUserRole,
        realm: &str,
        user_id: &str,
    ) -> Result<()> {
        self.delete_with_body(
            &format!("realms/{}/users/{}/role-mappings/realm", realm, user_id),
            "user realm role",
            &[role],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use crate::crd::{KeycloakApiUser, KeycloakUserRole};
    use crate::keycloak::client::testing::authenticated_client;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_find_user_by_username_requires_exact_match() {
        let server = MockServer::start().await;
        let client = authenticated_client(&server).await;
        Mock::given(method("GET"))
            .and(path("/auth/admin/realms/basic/users"))
            .and(query_param("username", "al"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "u1", "username": "alice"},
                {"id": "u2", "username": "al"}
            ])))
            .mount(&server)
            .await;

        let user = client.find_user_by_username("al", "basic").await.unwrap();
        assert_eq!(user.and_then(|u| u.id).as_deref(), Some("u2"));
    }

    #[tokio::test]
    async fn test_find_user_by_email_encodes_query() {
        let server = MockServer::start().await;
        let client = authenticated_client(&server).await;
        Mock::given(method("GET"))
            .and(path("/auth/admin/realms/basic/users"))
            .and(query_param("search", "alice+test@example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "u1", "username": "alice", "email": "alice+test@example.com"}
            ])))
            .mount(&server)
            .await;

        let user = client
            .find_user_by_email("alice+test@example.com", "basic")
            .await
            .unwrap();
        assert_eq!(user.map(|u| u.username).as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_update_password() {
        let server = MockServer::start().await;
        let client = authenticated_client(&server).await;
        Mock::given(method("PUT"))
            .and(path("/auth/admin/realms/basic/users/u1/reset-password"))
            .and(body_json(serde_json::json!({
                "type": "password",
                "value": "n3w",
                "temporary": false
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let user = KeycloakApiUser {
            id: Some("u1".to_string()),
            username: "alice".to_string(),
            ..Default::default()
        };
        client.update_password(&user, "basic", "n3w").await.unwrap();
    }

    #[tokio::test]
    async fn test_realm_role_mapping_round_trip() {
        let server = MockServer::start().await;
        let client = authenticated_client(&server).await;
        let mapping_path = "/auth/admin/realms/basic/users/u1/role-mappings/realm";

        Mock::given(method("POST"))
            .and(path(mapping_path))
            .and(body_json(serde_json::json!([{"name": "offline_access", "composite": false, "clientRole": false}])))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(mapping_path))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let role = KeycloakUserRole {
            name: "offline_access".to_string(),
            ..Default::default()
        };
        client.create_user_realm_role(&role, "basic", "u1").await.unwrap();
        client.delete_user_realm_role(&role, "basic", "u1").await.unwrap();
    }

    #[tokio::test]
    async fn test_federated_identities_absent_is_empty() {
        let server = MockServer::start().await;
        let client = authenticated_client(&server).await;
        Mock::given(method("GET"))
            .and(path("/auth/admin/realms/basic/users/u1/federated-identity"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let identities = client
            .get_user_federated_identities("u1", "basic")
            .await
            .unwrap();
        assert!(identities.is_empty());
    }
}
