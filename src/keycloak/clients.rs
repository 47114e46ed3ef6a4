//! Client endpoints

use serde::Deserialize;

use super::KeycloakClient;
use crate::crd::KeycloakApiClient;
use crate::error::{OperatorError, Result};

#[derive(Debug, Deserialize)]
struct ClientSecret {
    #[serde(default)]
    value: String,
}

impl KeycloakClient {
    pub async fn create_client(&self, client: &KeycloakApiClient, realm: &str) -> Result<String> {
        self.create(client, &format!("realms/{}/clients", realm), "client")
            .await
    }

    /// Fetch a client by its internal id.
    pub async fn get_client(&self, id: &str, realm: &str) -> Result<Option<KeycloakApiClient>> {
        self.get(&format!("realms/{}/clients/{}", realm, id), "client")
            .await
    }

    pub async fn get_client_secret(&self, id: &str, realm: &str) -> Result<Option<String>> {
        let secret: Option<ClientSecret> = self
            .get(
                &format!("realms/{}/clients/{}/client-secret", realm, id),
                "client-secret",
            )
            .await?;
        Ok(secret.map(|s| s.value))
    }

    /// Raw `keycloak.json` adapter configuration of a client.
    pub async fn get_client_install(&self, id: &str, realm: &str) -> Result<Option<Vec<u8>>> {
        self.get_with(
            &format!(
                "realms/{}/clients/{}/installation/providers/keycloak-oidc-keycloak-json",
                realm, id
            ),
            "client-installation",
            |body| Ok(body.to_vec()),
        )
        .await
    }

    pub async fn update_client(&self, client: &KeycloakApiClient, realm: &str) -> Result<()> {
        let id = client.id.as_deref().ok_or_else(|| {
            OperatorError::InvalidState(format!("client {} has no id", client.client_id))
        })?;
        self.update(client, &format!("realms/{}/clients/{}", realm, id), "client")
            .await
    }

    pub async fn delete_client(&self, id: &str, realm: &str) -> Result<()> {
        self.delete(&format!("realms/{}/clients/{}", realm, id), "client")
            .await
    }

    pub async fn list_clients(&self, realm: &str) -> Result<Vec<KeycloakApiClient>> {
        self.list(&format!("realms/{}/clients", realm), "clients")
            .await
    }
}
