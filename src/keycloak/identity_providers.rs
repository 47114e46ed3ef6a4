//! Identity provider endpoints

use super::KeycloakClient;
use crate::crd::KeycloakIdentityProvider;
use crate::error::Result;

impl KeycloakClient {
    pub async fn create_identity_provider(
        &self,
        provider: &KeycloakIdentityProvider,
        realm: &str,
    ) -> Result<String> {
        self.create(
            provider,
            &format!("realms/{}/identity-provider/instances", realm),
            "identity provider",
        )
        .await
    }

    pub async fn get_identity_provider(
        &self,
        alias: &str,
        realm: &str,
    ) -> Result<Option<KeycloakIdentityProvider>> {
        self.get(
            &format!("realms/{}/identity-provider/instances/{}", realm, alias),
            "identity provider",
        )
        .await
    }

    pub async fn update_identity_provider(
        &self,
        provider: &KeycloakIdentityProvider,
        realm: &str,
    ) -> Result<()> {
        self.update(
            provider,
            &format!(
                "realms/{}/identity-provider/instances/{}",
                realm, provider.alias
            ),
            "identity provider",
        )
        .await
    }

    pub async fn delete_identity_provider(&self, alias: &str, realm: &str) -> Result<()> {
        self.delete(
            &format!("realms/{}/identity-provider/instances/{}", realm, alias),
            "identity provider",
        )
        .await
    }

    pub async fn list_identity_providers(
        &self,
        realm: &str,
    ) -> Result<Vec<KeycloakIdentityProvider>> {
        self.list(
            &format!("realms/{}/identity-provider/instances", realm),
            "identity providers",
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use crate::crd::KeycloakIdentityProvider;
    use crate::keycloak::client::testing::authenticated_client;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_update_uses_alias_in_path() {
        let server = MockServer::start().await;
        let client = authenticated_client(&server).await;
        Mock::given(method("PUT"))
            .and(path("/auth/admin/realms/basic/identity-provider/instances/github"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let provider = KeycloakIdentityProvider {
            alias: "github".to_string(),
            provider_id: "github".to_string(),
            ..Default::default()
        };
        client
            .update_identity_provider(&provider, "basic")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_get_identity_provider() {
        let server = MockServer::start().await;
        let client = authenticated_client(&server).await;
        Mock::given(method("GET"))
            .and(path("/auth/admin/realms/basic/identity-provider/instances/github"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "alias": "github",
                "providerId": "github",
                "config": {"clientId": "abc"}
            })))
            .mount(&server)
            .await;

        let provider = client
            .get_identity_provider("github", "basic")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(provider.config["clientId"], "abc");
    }
}
