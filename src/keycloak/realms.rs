//! Realm and realm group endpoints

use tracing::{info, warn};

use super::KeycloakClient;
use crate::crd::{KeycloakApiRealm, KeycloakRealmGroup};
use crate::error::Result;
use crate::reconcilers::{plan_group_sync, GroupOp};

impl KeycloakClient {
    pub async fn create_realm(&self, realm: &KeycloakApiRealm) -> Result<String> {
        self.create(realm, "realms", "realm").await
    }

    pub async fn get_realm(&self, realm: &str) -> Result<Option<KeycloakApiRealm>> {
        self.get(&format!("realms/{}", realm), "realm").await
    }

    pub async fn update_realm(&self, realm: &KeycloakApiRealm) -> Result<()> {
        self.update(realm, &format!("realms/{}", realm.realm), "realm")
            .await
    }

    pub async fn delete_realm(&self, realm: &str) -> Result<()> {
        self.delete(&format!("realms/{}", realm), "realm").await
    }

    pub async fn list_realms(&self) -> Result<Vec<KeycloakApiRealm>> {
        self.list("realms", "realms").await
    }

    pub async fn list_realm_groups(&self, realm: &str) -> Result<Vec<KeycloakRealmGroup>> {
        self.list(&format!("realms/{}/groups", realm), "groups")
            .await
    }

    /// Create or update the realm's declared groups and their direct subgroups.
    ///
    /// Groups that exist in Keycloak but are not declared are kept.
    pub async fn update_realm_groups(&self, realm: &KeycloakApiRealm) -> Result<()> {
        let desired = realm.groups.as_deref().unwrap_or_default();
        let existing = self.list_realm_groups(&realm.realm).await?;
        let groups_path = format!("realms/{}/groups", realm.realm);

        for op in plan_group_sync(desired, &existing) {
            match op {
                GroupOp::Create(group) => {
                    let id = self.create(&group, &groups_path, "group").await?;
                    info!(realm = %realm.realm, group = %group.name, "Created group");
                    if id.is_empty() {
                        if !group.sub_groups.is_empty() {
                            warn!(group = %group.name, "No id returned for group, skipping subgroups");
                        }
                        continue;
                    }
                    for child in &group.sub_groups {
                        self.create(child, &format!("{}/{}/children", groups_path, id), "group")
                            .await?;
                    }
                }
                GroupOp::Update { id, group } => {
                    self.update(&group, &format!("{}/{}", groups_path, id), "group")
                        .await?;
                }
                GroupOp::CreateChild { parent_id, group } => {
                    self.create(
                        &group,
                        &format!("{}/{}/children", groups_path, parent_id),
                        "group",
                    )
                    .await?;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::keycloak::client::testing::authenticated_client;
    use crate::crd::{KeycloakApiRealm, KeycloakRealmGroup};
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn group(name: &str, children: &[&str]) -> KeycloakRealmGroup {
        KeycloakRealmGroup {
            name: name.to_string(),
            sub_groups: children
                .iter()
                .map(|c| KeycloakRealmGroup {
                    name: c.to_string(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_get_missing_realm() {
        let server = MockServer::start().await;
        let client = authenticated_client(&server).await;
        Mock::given(method("GET"))
            .and(path("/auth/admin/realms/basic"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(client.get_realm("basic").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_realm() {
        let server = MockServer::start().await;
        let client = authenticated_client(&server).await;
        Mock::given(method("GET"))
            .and(path("/auth/admin/realms/basic"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "basic",
                "realm": "basic",
                "enabled": true
            })))
            .mount(&server)
            .await;

        let realm = client.get_realm("basic").await.unwrap().unwrap();
        assert_eq!(realm.realm, "basic");
        assert_eq!(realm.enabled, Some(true));
    }

    #[tokio::test]
    async fn test_update_realm_groups_is_additive() {
        let server = MockServer::start().await;
        let client = authenticated_client(&server).await;

        Mock::given(method("GET"))
            .and(path("/auth/admin/realms/basic/groups"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "id-a", "name": "A", "subGroups": []},
                {"id": "id-c", "name": "C", "subGroups": []}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/auth/admin/realms/basic/groups/id-a"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/admin/realms/basic/groups/id-a/children"))
            .and(body_string_contains("a1"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/admin/realms/basic/groups"))
            .and(body_string_contains("\"B\""))
            .respond_with(
                ResponseTemplate::new(201).insert_header("Location", "/realms/basic/groups/id-b"),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/admin/realms/basic/groups/id-b/children"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let realm = KeycloakApiRealm {
            realm: "basic".to_string(),
            groups: Some(vec![group("A", &["a1"]), group("B", &["b1"])]),
            ..Default::default()
        };
        client.update_realm_groups(&realm).await.unwrap();
    }
}
