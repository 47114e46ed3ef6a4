//! Kubernetes resource builders
//!
//! Every managed object has three functions: `x(cr)` builds the desired object
//! from scratch, `x_reconciled(cr, current)` produces the update for an object
//! that already exists, and `x_selector(cr)` returns the key used to read it.
//! All of them are deterministic except the random credentials generated for
//! brand new secrets.

mod access;
mod monitoring;
mod postgresql;
mod secrets;
mod workload;

pub use access::{
    keycloak_ingress, keycloak_ingress_reconciled, keycloak_ingress_selector, keycloak_route,
    keycloak_route_reconciled, keycloak_route_selector,
};
pub use monitoring::{
    grafana_dashboard, grafana_dashboard_reconciled, grafana_dashboard_selector, prometheus_rule,
    prometheus_rule_reconciled, prometheus_rule_selector, service_monitor,
    service_monitor_reconciled, service_monitor_selector,
};
pub use postgresql::{
    postgresql_deployment, postgresql_deployment_reconciled, postgresql_deployment_selector,
    postgresql_persistent_volume_claim, postgresql_persistent_volume_claim_reconciled,
    postgresql_persistent_volume_claim_selector, postgresql_service,
    postgresql_service_reconciled, postgresql_service_selector, POSTGRESQL_IMAGE,
    POSTGRESQL_PERSISTENT_VOLUME_NAME,
};
pub use secrets::{
    database_secret, database_secret_reconciled, database_secret_selector,
    external_database_host, external_database_name, external_database_port, keycloak_admin_secret,
    keycloak_admin_secret_reconciled, keycloak_admin_secret_selector, realm_credential_secret,
    realm_user_secret_name, realm_user_secret_selector, secret_value,
};
pub use workload::{
    keycloak_deployment, keycloak_deployment_reconciled, keycloak_deployment_selector,
    keycloak_discovery_service, keycloak_discovery_service_reconciled,
    keycloak_discovery_service_selector, keycloak_probes, keycloak_probes_reconciled,
    keycloak_probes_selector, keycloak_service, keycloak_service_reconciled,
    keycloak_service_selector, pod_disruption_budget, pod_disruption_budget_reconciled,
    pod_disruption_budget_selector,
};

use std::collections::BTreeMap;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use rand::RngCore;

use crate::crd::Keycloak;

pub const APPLICATION_NAME: &str = "keycloak";
pub const KEYCLOAK_DEPLOYMENT_NAME: &str = "keycloak";
pub const KEYCLOAK_DEPLOYMENT_COMPONENT: &str = "keycloak";
pub const KEYCLOAK_DISCOVERY_SERVICE_NAME: &str = "keycloak-discovery";
pub const KEYCLOAK_PROBES_NAME: &str = "keycloak-probes";
pub const SERVING_CERT_SECRET_NAME: &str = "sso-x509-https-secret";
pub const KEYCLOAK_HTTPS_PORT: i32 = 8443;
pub const KEYCLOAK_HTTP_PORT: i32 = 8080;
pub const KEYCLOAK_MANAGEMENT_PORT: i32 = 9990;

pub const ADMIN_USERNAME_PROPERTY: &str = "ADMIN_USERNAME";
pub const ADMIN_PASSWORD_PROPERTY: &str = "ADMIN_PASSWORD";
pub const ADMIN_USERNAME: &str = "admin";

pub const DATABASE_SECRET_NAME: &str = "keycloak-db-secret";
pub const DATABASE_USERNAME_PROPERTY: &str = "POSTGRES_USERNAME";
pub const DATABASE_PASSWORD_PROPERTY: &str = "POSTGRES_PASSWORD";
pub const DATABASE_NAME_PROPERTY: &str = "POSTGRES_DATABASE";
pub const DATABASE_EXTERNAL_ADDRESS_PROPERTY: &str = "POSTGRES_EXTERNAL_ADDRESS";
pub const DATABASE_EXTERNAL_PORT_PROPERTY: &str = "POSTGRES_EXTERNAL_PORT";
pub const POSTGRESQL_SERVICE_NAME: &str = "keycloak-postgresql";
pub const POSTGRESQL_USERNAME: &str = "keycloak";
pub const POSTGRESQL_DATABASE: &str = "root";
pub const POSTGRESQL_DEFAULT_PORT: i32 = 5432;

pub const INGRESS_DEFAULT_HOST: &str = "keycloak.local";

pub const DEFAULT_KEYCLOAK_IMAGE: &str = "quay.io/keycloak/keycloak:9.0.2";
pub const DEFAULT_KEYCLOAK_INIT_CONTAINER: &str = "quay.io/keycloak/keycloak-init-container:master";
pub const RHSSO_IMAGE: &str = "registry.redhat.io/rh-sso-7/sso74-openshift-rhel8:7.4";
pub const RHSSO_INIT_CONTAINER: &str =
    "registry.redhat.io/rh-sso-7-tech-preview/sso74-init-container-rhel8:7.4";

pub const RHSSO_PROFILE: &str = "RHSSO";
pub const PROFILE_ENV_VAR: &str = "PROFILE";

const PASSWORD_BYTES: usize = 10;
const DATABASE_PASSWORD_BYTES: usize = 32;

/// Active profiles, from the `PROFILE` environment variable or the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileManager {
    profiles: Vec<String>,
}

impl ProfileManager {
    /// Create a new profile manager from a comma-separated list
    pub fn new(profiles: &str) -> Self {
        Self {
            profiles: profiles
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(&std::env::var(PROFILE_ENV_VAR).unwrap_or_default())
    }

    pub fn profiles(&self) -> &[String] {
        &self.profiles
    }

    /// The operator or this particular Keycloak runs the RH-SSO flavour.
    pub fn is_rhsso(&self, cr: &Keycloak) -> bool {
        self.profiles.iter().any(|p| p == RHSSO_PROFILE)
            || cr.spec.profile.as_deref() == Some(RHSSO_PROFILE)
    }

    pub fn keycloak_image(&self, cr: &Keycloak) -> String {
        if self.is_rhsso(cr) {
            return RHSSO_IMAGE.to_string();
        }
        cr.spec
            .keycloak_deployment_spec
            .image
            .clone()
            .filter(|i| !i.is_empty())
            .unwrap_or_else(|| DEFAULT_KEYCLOAK_IMAGE.to_string())
    }

    pub fn init_container_image(&self, cr: &Keycloak) -> String {
        if self.is_rhsso(cr) {
            RHSSO_INIT_CONTAINER.to_string()
        } else {
            DEFAULT_KEYCLOAK_INIT_CONTAINER.to_string()
        }
    }
}

/// URL-safe base64 of `len` random bytes.
pub fn generate_random_string(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE.encode(bytes)
}

/// Lowercase DNS-1123 form of `name`: `_` becomes `-`, other invalid characters are dropped.
pub fn sanitize_resource_name(name: &str) -> String {
    name.chars()
        .filter_map(|c| match c {
            '0'..='9' | 'a'..='z' | '-' | '.' => Some(c),
            'A'..='Z' => Some(c.to_ascii_lowercase()),
            '_' => Some('-'),
            _ => None,
        })
        .collect()
}

/// Replica count for the StatefulSet. A new workload always gets at least one replica.
pub fn sanitize_replicas(instances: i32, is_create: bool) -> i32 {
    if is_create && instances < 1 {
        1
    } else {
        instances
    }
}

pub(crate) fn namespace_of(cr: &Keycloak) -> String {
    cr.namespace_or_default()
}

pub(crate) fn app_labels() -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("app".to_string(), APPLICATION_NAME.to_string());
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        "keycloak-operator".to_string(),
    );
    labels
}

pub(crate) fn pod_selector() -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("app".to_string(), APPLICATION_NAME.to_string());
    labels.insert(
        "component".to_string(),
        KEYCLOAK_DEPLOYMENT_COMPONENT.to_string(),
    );
    labels
}

pub(crate) fn owner_reference(cr: &Keycloak) -> OwnerReference {
    OwnerReference {
        api_version: Keycloak::api_version(&()).to_string(),
        kind: Keycloak::kind(&()).to_string(),
        name: cr.name_any(),
        uid: cr.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::crd::{Keycloak, KeycloakSpec};

    pub fn keycloak(name: &str, namespace: &str) -> Keycloak {
        let mut kc = Keycloak::new(name, KeycloakSpec::default());
        kc.metadata.namespace = Some(namespace.to_string());
        kc.metadata.uid = Some("0b7f1c2e".to_string());
        kc
    }
}
