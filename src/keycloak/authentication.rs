//! Authentication flow executions and authenticator configs

use std::collections::BTreeMap;

use tracing::info;

use super::KeycloakClient;
use crate::crd::{AuthenticationExecutionInfo, AuthenticatorConfig, RedirectorIdentityProviderOverride};
use crate::error::{OperatorError, Result};

/// Provider id of the execution that redirects the browser flow to an identity provider.
pub const IDENTITY_PROVIDER_REDIRECTOR: &str = "identity-provider-redirector";

impl KeycloakClient {
    pub async fn list_authentication_executions_for_flow(
        &self,
        flow_alias: &str,
        realm: &str,
    ) -> Result<Vec<AuthenticationExecutionInfo>> {
        self.list(
            &format!("realms/{}/authentication/flows/{}/executions", realm, flow_alias),
            "authentication executions",
        )
        .await
    }

    pub async fn create_authenticator_config(
        &self,
        config: &AuthenticatorConfig,
        realm: &str,
        execution_id: &str,
    ) -> Result<String> {
        self.create(
            config,
            &format!(
                "realms/{}/authentication/executions/{}/config",
                realm, execution_id
            ),
            "authenticator config",
        )
        .await
    }

    pub async fn get_authenticator_config(
        &self,
        id: &str,
        realm: &str,
    ) -> Result<Option<AuthenticatorConfig>> {
        self.get(
            &format!("realms/{}/authentication/config/{}", realm, id),
            "authenticator config",
        )
        .await
    }

    pub async fn update_authenticator_config(
        &self,
        config: &AuthenticatorConfig,
        realm: &str,
    ) -> Result<()> {
        let id = config.id.as_deref().ok_or_else(|| {
            OperatorError::InvalidState(format!("authenticator config {} has no id", config.alias))
        })?;
        self.update(
            config,
            &format!("realms/{}/authentication/config/{}", realm, id),
            "authenticator config",
        )
        .await
    }

    pub async fn delete_authenticator_config(&self, id: &str, realm: &str) -> Result<()> {
        self.delete(
            &format!("realms/{}/authentication/config/{}", realm, id),
            "authenticator config",
        )
        .await
    }

    /// Point the flow's identity provider redirector at `redirect.identity_provider`.
    pub async fn configure_browser_redirector(
        &self,
        realm: &str,
        redirect: &RedirectorIdentityProviderOverride,
    ) -> Result<()> {
        let executions = self
            .list_authentication_executions_for_flow(&redirect.for_flow, realm)
            .await?;

        let execution = executions
            .iter()
            .find(|e| e.provider_id.as_deref() == Some(IDENTITY_PROVIDER_REDIRECTOR))
            .ok_or_else(|| {
                OperatorError::InvalidState(format!(
                    "flow {} in realm {} has no {} execution",
                    redirect.for_flow, realm, IDENTITY_PROVIDER_REDIRECTOR
                ))
            })?;

        let mut config = BTreeMap::new();
        config.insert(
            "defaultProvider".to_string(),
            redirect.identity_provider.clone(),
        );
        let authenticator = AuthenticatorConfig {
            id: None,
            alias: redirect.identity_provider.clone(),
            config,
        };

        self.create_authenticator_config(&authenticator, realm, &execution.id)
            .await?;
        info!(
            realm,
            flow = %redirect.for_flow,
            identity_provider = %redirect.identity_provider,
            "Configured browser redirector"
        );
        Ok(())
    }
}
