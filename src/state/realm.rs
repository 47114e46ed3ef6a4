//! Current state of one realm inside one Keycloak

use std::collections::HashMap;

use k8s_openapi::api::core::v1::Secret;

use crate::cluster::ClusterClient;
use crate::crd::{Keycloak, KeycloakApiRealm, KeycloakRealm};
use crate::error::Result;
use crate::keycloak::KeycloakApi;
use crate::model;

#[derive(Debug, Clone, Default)]
pub struct RealmState {
    /// The realm as Keycloak reports it, `None` when it does not exist
    pub realm: Option<KeycloakApiRealm>,
    /// Credential secret per declared username
    pub realm_user_secrets: HashMap<String, Option<Secret>>,
}

impl RealmState {
    pub async fn read<C: ClusterClient>(
        keycloak_api: &dyn KeycloakApi,
        cluster: &C,
        cr: &KeycloakRealm,
        keycloak: &Keycloak,
    ) -> Result<Self> {
        let realm = keycloak_api.get_realm(cr.realm_name()).await?;

        let mut realm_user_secrets = HashMap::new();
        for user in &cr.spec.realm.users {
            let key = model::realm_user_secret_selector(cr, user, keycloak);
            let secret = match cluster.get::<Secret>(&key).await {
                Ok(secret) => Some(secret),
                Err(e) if e.is_absent() => None,
                Err(e) => return Err(e),
            };
            realm_user_secrets.insert(user.username.clone(), secret);
        }

        Ok(Self {
            realm,
            realm_user_secrets,
        })
    }

    /// A credential secret already exists for `username`.
    pub fn has_user_secret(&self, username: &str) -> bool {
        matches!(self.realm_user_secrets.get(username), Some(Some(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::testing::FakeClusterClient;
    use crate::crd::{KeycloakApiUser, KeycloakRealmSpec};
    use crate::keycloak::testing::FakeKeycloak;
    use crate::model::fixtures::keycloak;
    use crate::model::realm_credential_secret;

    fn realm_cr(users: &[&str]) -> KeycloakRealm {
        let mut cr = KeycloakRealm::new(
            "basic",
            KeycloakRealmSpec {
                unmanaged: false,
                instance_selector: Default::default(),
                realm: KeycloakApiRealm {
                    realm: "basic".to_string(),
                    users: users
                        .iter()
                        .map(|u| KeycloakApiUser {
                            username: u.to_string(),
                            ..Default::default()
                        })
                        .collect(),
                    ..Default::default()
                },
                realm_overrides: vec![],
            },
        );
        cr.metadata.namespace = Some("apps".to_string());
        cr
    }

    #[tokio::test]
    async fn test_read_missing_realm_and_secrets() {
        let cr = realm_cr(&["alice", "bob"]);
        let kc = keycloak("sso", "ns");
        let cluster = FakeClusterClient::new();
        cluster.insert(&realm_credential_secret(&cr, &cr.spec.realm.users[0], &kc));

        let state = RealmState::read(&FakeKeycloak::new(), &cluster, &cr, &kc)
            .await
            .unwrap();
        assert!(state.realm.is_none());
        assert!(state.has_user_secret("alice"));
        assert!(!state.has_user_secret("bob"));
        assert_eq!(state.realm_user_secrets.len(), 2);
    }

    #[tokio::test]
    async fn test_read_existing_realm() {
        let cr = realm_cr(&[]);
        let api = FakeKeycloak::new().with_realm(cr.spec.realm.clone());

        let state = RealmState::read(&api, &FakeClusterClient::new(), &cr, &keycloak("sso", "ns"))
            .await
            .unwrap();
        assert_eq!(state.realm.map(|r| r.realm).as_deref(), Some("basic"));
    }

    #[tokio::test]
    async fn test_read_propagates_api_errors() {
        let cr = realm_cr(&[]);
        let result = RealmState::read(
            &FakeKeycloak::unreachable(),
            &FakeClusterClient::new(),
            &cr,
            &keycloak("sso", "ns"),
        )
        .await;
        assert!(result.is_err());
    }
}
