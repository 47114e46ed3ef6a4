//! Keycloak admin REST API representations
//!
//! The realm-level types are embedded in the `KeycloakRealm` CRD and sent as-is
//! to the admin API, so field names follow the admin API's JSON.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Realm representation
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakApiRealm {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub realm: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<KeycloakApiUser>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clients: Vec<KeycloakApiClient>,
    /// `None` leaves groups unmanaged; `Some` triggers the additive group sync
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<KeycloakRealmGroup>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identity_providers: Vec<KeycloakIdentityProvider>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_federation_providers: Option<Vec<UserFederationProvider>>,
}

/// Group with one level of managed subgroups
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakRealmGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub realm_roles: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub client_roles: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_groups: Vec<KeycloakRealmGroup>,
}

/// User federation (LDAP, Kerberos) provider
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserFederationProvider {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub provider_name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_sync_period: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_sync_period: Option<i32>,
}

/// User representation
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakApiUser {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub realm_roles: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub client_roles: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_actions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub federated_identities: Vec<FederatedIdentity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub credentials: Vec<KeycloakCredential>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl KeycloakApiUser {
    /// First declared password credential.
    pub fn password(&self) -> Option<&str> {
        self.credentials
            .iter()
            .find(|c| c.r#type == "password" && !c.value.is_empty())
            .map(|c| c.value.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakCredential {
    pub r#type: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub temporary: bool,
}

/// Link between a user and an identity provider account
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FederatedIdentity {
    pub identity_provider: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
}

/// Client representation
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakApiClient {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_client: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redirect_uris: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub web_origins: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard_flow_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_access_grants_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_accounts_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

/// Identity provider (brokering) representation
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakIdentityProvider {
    pub alias: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub provider_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_email: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_token: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_broker_login_flow_alias: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, String>,
}

/// Role as returned by the role-mapping endpoints
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakUserRole {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub composite: bool,
    #[serde(default)]
    pub client_role: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
}

/// Authenticator configuration attached to a flow execution
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub alias: String,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

/// One execution of an authentication flow
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationExecutionInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub provider_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub requirement: Option<String>,
    #[serde(default)]
    pub authentication_config: Option<String>,
    #[serde(default)]
    pub level: i32,
    #[serde(default)]
    pub index: i32,
}

/// Body of `PUT users/{id}/reset-password`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PasswordReset {
    pub r#type: String,
    pub value: String,
    pub temporary: bool,
}

/// OpenID Connect token endpoint response
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_expires_in: i64,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub error_description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_realm_parsing_keeps_group_tree() {
        let json = r#"{
            "realm": "basic",
            "groups": [
                {"name": "admins", "subGroups": [{"name": "ops"}]}
            ]
        }"#;
        let realm: KeycloakApiRealm = serde_json::from_str(json).unwrap();
        let groups = realm.groups.unwrap();
        assert_eq!(groups[0].name, "admins");
        assert_eq!(groups[0].sub_groups[0].name, "ops");
        assert!(realm.user_federation_providers.is_none());
    }

    #[test]
    fn test_realm_serialization_omits_empty_fields() {
        let realm = KeycloakApiRealm {
            realm: "basic".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(&realm).unwrap();
        assert_eq!(json, serde_json::json!({"realm": "basic"}));
    }

    #[test]
    fn test_user_password_picks_password_credential() {
        let user = KeycloakApiUser {
            username: "alice".to_string(),
            credentials: vec![
                KeycloakCredential {
                    r#type: "otp".to_string(),
                    value: "123".to_string(),
                    temporary: false,
                },
                KeycloakCredential {
                    r#type: "password".to_string(),
                    value: "s3cret".to_string(),
                    temporary: false,
                },
            ],
            ..Default::default()
        };
        assert_eq!(user.password(), Some("s3cret"));
    }

    #[test]
    fn test_token_response_error_fields() {
        let json = r#"{"error":"invalid_grant","error_description":"Invalid user credentials"}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.error, "invalid_grant");
        assert!(token.access_token.is_empty());
    }
}
