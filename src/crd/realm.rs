//! KeycloakRealm Custom Resource Definition
//!
//! Declares one realm, its users, groups, clients and identity providers, and
//! which Keycloak instances it should be applied to.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::api::KeycloakApiRealm;
use super::keycloak::StatusPhase;

/// KeycloakRealm is the Schema for the keycloakrealms API
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "keycloak.org",
    version = "v1alpha1",
    kind = "KeycloakRealm",
    namespaced,
    status = "KeycloakRealmStatus",
    shortname = "kcr",
    printcolumn = r#"{"name":"Realm","type":"string","jsonPath":".spec.realm.realm"}"#,
    printcolumn = r#"{"name":"Ready","type":"boolean","jsonPath":".status.ready"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakRealmSpec {
    /// Do not reconcile the realm, only read it
    #[serde(default)]
    pub unmanaged: bool,

    /// Labels selecting the Keycloak instances this realm is applied to
    #[serde(default)]
    pub instance_selector: InstanceSelector,

    /// Realm representation sent to the admin API
    pub realm: KeycloakApiRealm,

    /// Browser flow redirector overrides
    #[serde(default)]
    pub realm_overrides: Vec<RedirectorIdentityProviderOverride>,
}

/// Label selector for Keycloak instances
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSelector {
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
}

impl InstanceSelector {
    /// Render as a Kubernetes label selector string.
    pub fn to_label_selector(&self) -> String {
        self.match_labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Redirect a browser flow straight to an identity provider
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RedirectorIdentityProviderOverride {
    /// Alias of the identity provider to redirect to
    pub identity_provider: String,
    /// Authentication flow alias, usually `browser`
    #[serde(default = "default_flow")]
    pub for_flow: String,
}

/// Status of the KeycloakRealm
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakRealmStatus {
    #[serde(default)]
    pub phase: StatusPhase,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub ready: bool,
    #[serde(default, rename = "loginURL")]
    pub login_url: String,
    #[serde(default)]
    pub conditions: Vec<RealmCondition>,
    #[serde(default)]
    pub observed_generation: Option<i64>,
    #[serde(default)]
    pub last_updated: Option<String>,
}

/// Condition of the realm
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RealmCondition {
    pub r#type: String,
    pub status: String,
    #[serde(default)]
    pub last_transition_time: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl KeycloakRealm {
    /// Name of the realm inside Keycloak.
    pub fn realm_name(&self) -> &str {
        &self.spec.realm.realm
    }

    /// The resource carries a deletion timestamp.
    pub fn is_tombstoned(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}

fn default_flow() -> String {
    "browser".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_realm_spec_parsing() {
        let json = r#"{
            "instanceSelector": {"matchLabels": {"app": "sso"}},
            "realm": {"realm": "basic", "enabled": true},
            "realmOverrides": [{"identityProvider": "github"}]
        }"#;
        let spec: KeycloakRealmSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.realm.realm, "basic");
        assert_eq!(spec.realm_overrides[0].for_flow, "browser");
        assert_eq!(spec.instance_selector.to_label_selector(), "app=sso");
    }

    #[test]
    fn test_selector_joins_labels_in_order() {
        let mut match_labels = BTreeMap::new();
        match_labels.insert("tier".to_string(), "auth".to_string());
        match_labels.insert("app".to_string(), "sso".to_string());
        let selector = InstanceSelector { match_labels };
        assert_eq!(selector.to_label_selector(), "app=sso,tier=auth");
    }
}
