//! Keycloak admin REST API
//!
//! [`KeycloakClient`] carries the HTTP primitives and one file of thin path
//! builders per resource family. [`KeycloakApi`] is the narrow surface the
//! realm reconciliation uses, so tests can swap in a fake.

mod authentication;
pub(crate) mod client;
mod clients;
mod factory;
mod identity_providers;
mod realms;
mod users;

pub use authentication::IDENTITY_PROVIDER_REDIRECTOR;
pub use client::{KeycloakClient, KeycloakClientConfig};
pub use factory::KeycloakClientFactory;

use async_trait::async_trait;

use crate::crd::{KeycloakApiRealm, RedirectorIdentityProviderOverride};
use crate::error::Result;

/// Admin API operations driven by realm actions.
#[async_trait]
pub trait KeycloakApi: Send + Sync {
    fn endpoint(&self) -> &str;

    async fn ping(&self) -> Result<()>;

    /// `None` when the realm does not exist.
    async fn get_realm(&self, realm: &str) -> Result<Option<KeycloakApiRealm>>;

    async fn create_realm(&self, realm: &KeycloakApiRealm) -> Result<String>;

    async fn update_realm(&self, realm: &KeycloakApiRealm) -> Result<()>;

    async fn delete_realm(&self, realm: &str) -> Result<()>;

    async fn update_realm_groups(&self, realm: &KeycloakApiRealm) -> Result<()>;

    async fn configure_browser_redirector(
        &self,
        realm: &str,
        redirect: &RedirectorIdentityProviderOverride,
    ) -> Result<()>;
}

#[async_trait]
impl KeycloakApi for KeycloakClient {
    fn endpoint(&self) -> &str {
        KeycloakClient::endpoint(self)
    }

    async fn ping(&self) -> Result<()> {
        KeycloakClient::ping(self).await
    }

    async fn get_realm(&self, realm: &str) -> Result<Option<KeycloakApiRealm>> {
        KeycloakClient::get_realm(self, realm).await
    }

    async fn create_realm(&self, realm: &KeycloakApiRealm) -> Result<String> {
        KeycloakClient::create_realm(self, realm).await
    }

    async fn update_realm(&self, realm: &KeycloakApiRealm) -> Result<()> {
        KeycloakClient::update_realm(self, realm).await
    }

    async fn delete_realm(&self, realm: &str) -> Result<()> {
        KeycloakClient::delete_realm(self, realm).await
    }

    async fn update_realm_groups(&self, realm: &KeycloakApiRealm) -> Result<()> {
        KeycloakClient::update_realm_groups(self, realm).await
    }

    async fn configure_browser_redirector(
        &self,
        realm: &str,
        redirect: &RedirectorIdentityProviderOverride,
    ) -> Result<()> {
        KeycloakClient::configure_browser_redirector(self, realm, redirect).await
    }
}
