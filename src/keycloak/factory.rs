//! Logged-in clients for a `Keycloak` resource

use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use tracing::debug;

use super::{KeycloakClient, KeycloakClientConfig};
use crate::cluster::{ClusterClient, ObjectKey};
use crate::crd::Keycloak;
use crate::error::{OperatorError, Result};
use crate::model::{secret_value, ADMIN_PASSWORD_PROPERTY, ADMIN_USERNAME_PROPERTY};

/// Builds one authenticated [`KeycloakClient`] per reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct KeycloakClientFactory {
    config: KeycloakClientConfig,
}

impl KeycloakClientFactory {
    pub fn new(config: KeycloakClientConfig) -> Self {
        Self { config }
    }

    /// Endpoint and admin credential secret name for `kc`.
    fn target(kc: &Keycloak) -> Result<(String, String)> {
        let default_secret = format!("credential-{}", kc.name_any());

        if kc.spec.external.enabled {
            let url = kc
                .spec
                .external
                .url
                .clone()
                .filter(|u| !u.is_empty())
                .ok_or_else(|| {
                    OperatorError::Configuration(format!(
                        "external Keycloak {} has no url",
                        kc.name_any()
                    ))
                })?;
            return Ok((url, default_secret));
        }

        let status = kc.status.clone().unwrap_or_default();
        if status.internal_url.is_empty() {
            return Err(OperatorError::InvalidState(format!(
                "Keycloak {} has no internal URL yet",
                kc.name_any()
            )));
        }
        let secret = if status.credential_secret.is_empty() {
            default_secret
        } else {
            status.credential_secret
        };
        Ok((status.internal_url, secret))
    }

    pub async fn authenticated_client<C: ClusterClient>(
        &self,
        cluster: &C,
        kc: &Keycloak,
    ) -> Result<KeycloakClient> {
        let (endpoint, secret_name) = Self::target(kc)?;
        let secret: Secret = cluster
            .get(&ObjectKey::new(secret_name, kc.namespace_or_default()))
            .await
            .map_err(|e| {
                OperatorError::Configuration(format!("failed to get the admin credentials: {}", e))
            })?;

        let username = secret_value(&secret, ADMIN_USERNAME_PROPERTY).unwrap_or_default();
        let password = secret_value(&secret, ADMIN_PASSWORD_PROPERTY).unwrap_or_default();

        let mut client = KeycloakClient::new(endpoint, &self.config)?;
        client.login(&username, &password).await?;
        debug!(endpoint = %client.endpoint(), "Authenticated against Keycloak");
        Ok(client)
    }
}
