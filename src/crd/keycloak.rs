//! Keycloak Custom Resource Definition
//!
//! Declares one Keycloak installation: the StatefulSet, its services, secrets,
//! optional monitoring objects and external access.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Keycloak is the Schema for the keycloaks API
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "keycloak.org",
    version = "v1alpha1",
    kind = "Keycloak",
    namespaced,
    status = "KeycloakStatus",
    shortname = "kc",
    printcolumn = r#"{"name":"Instances","type":"integer","jsonPath":".spec.instances"}"#,
    printcolumn = r#"{"name":"Ready","type":"boolean","jsonPath":".status.ready"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakSpec {
    /// Number of Keycloak replicas
    #[serde(default = "default_instances")]
    pub instances: i32,

    /// Do not manage workload resources, only talk to the admin API
    #[serde(default)]
    pub unmanaged: bool,

    /// An externally hosted Keycloak that the operator only configures
    #[serde(default)]
    pub external: KeycloakExternal,

    /// Route or Ingress exposure
    #[serde(default)]
    pub external_access: KeycloakExternalAccess,

    /// Use a database outside the cluster
    #[serde(default)]
    pub external_database: KeycloakExternalDatabase,

    /// PodDisruptionBudget settings
    #[serde(default)]
    pub pod_disruption_budget: PodDisruptionBudgetConfig,

    /// Profile name, e.g. `RHSSO`
    #[serde(default)]
    pub profile: Option<String>,

    /// Container level overrides for the Keycloak StatefulSet
    #[serde(default)]
    pub keycloak_deployment_spec: KeycloakDeploymentSpec,

    /// Extension jar URLs fetched by the init container
    #[serde(default)]
    pub extensions: Vec<String>,
}

impl Default for KeycloakSpec {
    fn default() -> Self {
        Self {
            instances: default_instances(),
            unmanaged: false,
            external: KeycloakExternal::default(),
            external_access: KeycloakExternalAccess::default(),
            external_database: KeycloakExternalDatabase::default(),
            pod_disruption_budget: PodDisruptionBudgetConfig::default(),
            profile: None,
            keycloak_deployment_spec: KeycloakDeploymentSpec::default(),
            extensions: Vec::new(),
        }
    }
}

/// Externally hosted Keycloak
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakExternal {
    #[serde(default)]
    pub enabled: bool,
    /// Base URL of the external instance
    #[serde(default)]
    pub url: Option<String>,
}

/// External access configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakExternalAccess {
    #[serde(default)]
    pub enabled: bool,
    /// Hostname for the Ingress or Route
    #[serde(default)]
    pub host: Option<String>,
    /// Route TLS termination (reencrypt, passthrough, edge)
    #[serde(default)]
    pub tls_termination: Option<String>,
    /// Annotations copied onto the Ingress
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// External database configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakExternalDatabase {
    #[serde(default)]
    pub enabled: bool,
    /// Database host, used when the secret does not carry one
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<i32>,
    #[serde(default)]
    pub database: Option<String>,
}

/// PodDisruptionBudget configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct PodDisruptionBudgetConfig {
    #[serde(default)]
    pub enabled: bool,
}

/// Keycloak container overrides
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakDeploymentSpec {
    /// Keycloak image, defaults to the profile image
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub image_pull_policy: Option<String>,
    #[serde(default)]
    pub resources: ResourceRequirements,
    /// Extra environment variables, merged after the managed ones
    #[serde(default)]
    pub env: Vec<EnvVar>,
}

/// Resource requirements for containers
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirements {
    #[serde(default)]
    pub limits: ResourceList,
    #[serde(default)]
    pub requests: ResourceList,
}

/// Resource quantities
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct ResourceList {
    /// CPU limit/request (e.g., "500m", "2")
    #[serde(default)]
    pub cpu: Option<String>,
    /// Memory limit/request (e.g., "512Mi", "2Gi")
    #[serde(default)]
    pub memory: Option<String>,
}

/// Plain environment variable
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EnvVar {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
}

/// Status of the Keycloak
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakStatus {
    #[serde(default)]
    pub phase: StatusPhase,
    #[serde(default)]
    pub message: String,
    /// All managed resources exist and the workload is ready
    #[serde(default)]
    pub ready: bool,
    /// `kind -> [names]` of every secondary resource found on the cluster
    #[serde(default)]
    pub secondary_resources: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub version: String,
    /// In-cluster URL of the admin API
    #[serde(default, rename = "internalURL")]
    pub internal_url: String,
    #[serde(default, rename = "externalURL")]
    pub external_url: String,
    /// Name of the admin credential secret
    #[serde(default)]
    pub credential_secret: String,
    #[serde(default)]
    pub conditions: Vec<KeycloakCondition>,
    #[serde(default)]
    pub observed_generation: Option<i64>,
    #[serde(default)]
    pub last_updated: Option<String>,
}

/// Reconciliation phase
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub enum StatusPhase {
    /// Nothing reconciled yet, or resources still converging
    #[default]
    Initialising,
    /// Reconciled and ready
    Reconciling,
    /// The last pass failed
    Failing,
}

/// Condition of the Keycloak
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakCondition {
    pub r#type: String,
    pub status: String,
    #[serde(default)]
    pub last_transition_time: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl Keycloak {
    /// Record a secondary resource in the status audit trail.
    pub fn update_status_secondary_resources(&mut self, kind: &str, name: &str) {
        let status = self.status.get_or_insert_with(KeycloakStatus::default);
        let names = status
            .secondary_resources
            .entry(kind.to_string())
            .or_default();
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }

    pub fn namespace_or_default(&self) -> String {
        self.metadata
            .namespace
            .clone()
            .unwrap_or_else(|| "default".to_string())
    }
}

fn default_instances() -> i32 {
    1
}
