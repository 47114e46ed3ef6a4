//! Embedded PostgreSQL used when no external database is configured

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, EnvVarSource, ExecAction, PersistentVolumeClaim,
    PersistentVolumeClaimSpec, PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec, Probe,
    SecretKeySelector, Service, ServicePort, ServiceSpec, TCPSocketAction, Volume, VolumeMount,
    VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::{
    app_labels, namespace_of, owner_reference, APPLICATION_NAME, DATABASE_NAME_PROPERTY,
    DATABASE_PASSWORD_PROPERTY, DATABASE_SECRET_NAME, DATABASE_USERNAME_PROPERTY,
    POSTGRESQL_DEFAULT_PORT, POSTGRESQL_SERVICE_NAME,
};
use crate::cluster::ObjectKey;
use crate::crd::Keycloak;

pub const POSTGRESQL_IMAGE: &str = "registry.access.redhat.com/rhscl/postgresql-10-rhel7:1";
pub const POSTGRESQL_PERSISTENT_VOLUME_NAME: &str = "keycloak-postgresql-claim";
pub const POSTGRESQL_VOLUME_CAPACITY: &str = "1Gi";
const POSTGRESQL_COMPONENT: &str = "database";
const POSTGRESQL_DATA_PATH: &str = "/var/lib/pgsql/data";

fn database_selector() -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("app".to_string(), APPLICATION_NAME.to_string());
    labels.insert("component".to_string(), POSTGRESQL_COMPONENT.to_string());
    labels
}

fn database_labels() -> BTreeMap<String, String> {
    let mut labels = app_labels();
    labels.extend(database_selector());
    labels
}

fn pvc_spec() -> PersistentVolumeClaimSpec {
    let mut requests = BTreeMap::new();
    requests.insert(
        "storage".to_string(),
        Quantity(POSTGRESQL_VOLUME_CAPACITY.to_string()),
    );
    PersistentVolumeClaimSpec {
        access_modes: Some(vec!["ReadWriteOnce".to_string()]),
        resources: Some(VolumeResourceRequirements {
            requests: Some(requests),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Storage for the embedded database
pub fn postgresql_persistent_volume_claim(cr: &Keycloak) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(POSTGRESQL_PERSISTENT_VOLUME_NAME.to_string()),
            namespace: Some(namespace_of(cr)),
            labels: Some(database_labels()),
            owner_references: Some(vec![owner_reference(cr)]),
            ..Default::default()
        },
        spec: Some(pvc_spec()),
        ..Default::default()
    }
}

/// Claims are immutable once bound apart from the requested size, so only
/// the labels are refreshed and a missing spec is filled in.
pub fn postgresql_persistent_volume_claim_reconciled(
    _cr: &Keycloak,
    current: &PersistentVolumeClaim,
) -> PersistentVolumeClaim {
    let mut reconciled = current.clone();
    reconciled
        .metadata
        .labels
        .get_or_insert_with(BTreeMap::new)
        .extend(database_labels());
    if reconciled.spec.is_none() {
        reconciled.spec = Some(pvc_spec());
    }
    reconciled
}

pub fn postgresql_persistent_volume_claim_selector(cr: &Keycloak) -> ObjectKey {
    ObjectKey::new(POSTGRESQL_PERSISTENT_VOLUME_NAME, namespace_of(cr))
}

fn secret_env(name: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: DATABASE_SECRET_NAME.to_string(),
                key: key.to_string(),
                optional: None,
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn database_pod_template() -> PodTemplateSpec {
    let container = Container {
        name: POSTGRESQL_SERVICE_NAME.to_string(),
        image: Some(POSTGRESQL_IMAGE.to_string()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        ports: Some(vec![ContainerPort {
            container_port: POSTGRESQL_DEFAULT_PORT,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        env: Some(vec![
            secret_env("POSTGRESQL_USER", DATABASE_USERNAME_PROPERTY),
            secret_env("POSTGRESQL_PASSWORD", DATABASE_PASSWORD_PROPERTY),
            secret_env("POSTGRESQL_DATABASE", DATABASE_NAME_PROPERTY),
        ]),
        liveness_probe: Some(Probe {
            tcp_socket: Some(TCPSocketAction {
                port: IntOrString::Int(POSTGRESQL_DEFAULT_PORT),
                ..Default::default()
            }),
            initial_delay_seconds: Some(30),
            timeout_seconds: Some(1),
            ..Default::default()
        }),
        readiness_probe: Some(Probe {
            exec: Some(ExecAction {
                command: Some(vec![
                    "/bin/sh".to_string(),
                    "-c".to_string(),
                    "psql -h 127.0.0.1 -U $POSTGRESQL_USER -q -d $POSTGRESQL_DATABASE -c 'SELECT 1'"
                        .to_string(),
                ]),
            }),
            initial_delay_seconds: Some(5),
            timeout_seconds: Some(1),
            ..Default::default()
        }),
        volume_mounts: Some(vec![VolumeMount {
            name: POSTGRESQL_PERSISTENT_VOLUME_NAME.to_string(),
            mount_path: POSTGRESQL_DATA_PATH.to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    };

    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(database_labels()),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            containers: vec![container],
            volumes: Some(vec![Volume {
                name: POSTGRESQL_PERSISTENT_VOLUME_NAME.to_string(),
                persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                    claim_name: POSTGRESQL_PERSISTENT_VOLUME_NAME.to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
    }
}

/// Single replica database. `Recreate` keeps two pods from mounting the
/// ReadWriteOnce claim at the same time.
pub fn postgresql_deployment(cr: &Keycloak) -> Deployment {
    Deployment {
        metadata: ObjectMeta {
            name: Some(POSTGRESQL_SERVICE_NAME.to_string()),
            namespace: Some(namespace_of(cr)),
            labels: Some(database_labels()),
            owner_references: Some(vec![owner_reference(cr)]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(database_selector()),
                ..Default::default()
            },
            strategy: Some(DeploymentStrategy {
                type_: Some("Recreate".to_string()),
                ..Default::default()
            }),
            template: database_pod_template(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn postgresql_deployment_reconciled(cr: &Keycloak, current: &Deployment) -> Deployment {
    let mut reconciled = current.clone();
    match reconciled.spec.as_mut() {
        Some(spec) => {
            spec.replicas = Some(1);
            spec.template = database_pod_template();
        }
        None => reconciled.spec = postgresql_deployment(cr).spec,
    }
    reconciled
}

pub fn postgresql_deployment_selector(cr: &Keycloak) -> ObjectKey {
    ObjectKey::new(POSTGRESQL_SERVICE_NAME, namespace_of(cr))
}

fn database_ports() -> Vec<ServicePort> {
    vec![ServicePort {
        port: POSTGRESQL_DEFAULT_PORT,
        target_port: Some(IntOrString::Int(POSTGRESQL_DEFAULT_PORT)),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }]
}

/// The host the Keycloak pods connect to, `keycloak-postgresql.<namespace>`.
pub fn postgresql_service(cr: &Keycloak) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(POSTGRESQL_SERVICE_NAME.to_string()),
            namespace: Some(namespace_of(cr)),
            labels: Some(database_labels()),
            owner_references: Some(vec![owner_reference(cr)]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(database_selector()),
            ports: Some(database_ports()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn postgresql_service_reconciled(_cr: &Keycloak, current: &Service) -> Service {
    let mut reconciled = current.clone();
    let spec = reconciled.spec.get_or_insert_with(ServiceSpec::default);
    spec.selector = Some(database_selector());
    spec.ports = Some(database_ports());
    reconciled
}

pub fn postgresql_service_selector(cr: &Keycloak) -> ObjectKey {
    ObjectKey::new(POSTGRESQL_SERVICE_NAME, namespace_of(cr))
}
