//! Probes, services, the Keycloak StatefulSet and its PodDisruptionBudget

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource, EnvVar,
    EnvVarSource, ExecAction, PodSpec, PodTemplateSpec, Probe, ResourceRequirements, Secret,
    SecretKeySelector, SecretVolumeSource, Service, ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::api::policy::v1::{PodDisruptionBudget, PodDisruptionBudgetSpec};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use super::{
    app_labels, external_database_host, external_database_name, external_database_port,
    namespace_of, owner_reference, pod_selector, sanitize_replicas, ProfileManager,
    ADMIN_PASSWORD_PROPERTY, ADMIN_USERNAME_PROPERTY, DATABASE_PASSWORD_PROPERTY,
    DATABASE_SECRET_NAME, DATABASE_USERNAME_PROPERTY, KEYCLOAK_DEPLOYMENT_NAME,
    KEYCLOAK_DISCOVERY_SERVICE_NAME, KEYCLOAK_HTTPS_PORT, KEYCLOAK_HTTP_PORT,
    KEYCLOAK_MANAGEMENT_PORT, KEYCLOAK_PROBES_NAME, POSTGRESQL_SERVICE_NAME,
    SERVING_CERT_SECRET_NAME,
};
use crate::cluster::ObjectKey;
use crate::crd::Keycloak;

const LIVENESS_PROBE_SCRIPT: &str = "liveness_probe.sh";
const READINESS_PROBE_SCRIPT: &str = "readiness_probe.sh";
const EXTENSIONS_VOLUME: &str = "keycloak-extensions";
const EXTENSIONS_PATH: &str = "/opt/jboss/keycloak/providers";
const EXTENSIONS_INIT_PATH: &str = "/opt/extensions";
const EXTENSIONS_ENV_VAR: &str = "KEYCLOAK_EXTENSIONS";

const LIVENESS_SCRIPT: &str = r#"#!/bin/bash
set -e
curl -s --max-time 10 --fail http://$(hostname -i):8080/auth > /dev/null
"#;

const READINESS_SCRIPT: &str = r#"#!/bin/bash
set -e
DATASOURCE_POOL_TYPE="data-source"
DATASOURCE_POOL_NAME="KeycloakDS"
PASSWORD_FILE="/tmp/management-password"
PASSWORD=`cat $PASSWORD_FILE 2>/dev/null || true`
USERNAME="admin"
if [ -z "$PASSWORD" ]; then
    PASSWORD=$(cat /dev/urandom | tr -dc 'a-zA-Z0-9' | fold -w 32 | head -n 1)
    echo $PASSWORD > $PASSWORD_FILE
    /opt/jboss/keycloak/bin/add-user.sh -u $USERNAME -p $PASSWORD > /dev/null
fi
curl -s --max-time 10 --fail http://localhost:9990/management --user $USERNAME:$PASSWORD --digest \
    -H 'Content-Type: application/json' \
    -d '{"operation": "test-connection-in-pool", "address": ["subsystem","datasources","'$DATASOURCE_POOL_TYPE'","'$DATASOURCE_POOL_NAME'"], "json.pretty":1}'
curl -s --max-time 10 --fail http://$(hostname -i):8080/auth > /dev/null
"#;

fn probes_data() -> BTreeMap<String, String> {
    let mut data = BTreeMap::new();
    data.insert(
        LIVENESS_PROBE_SCRIPT.to_string(),
        LIVENESS_SCRIPT.to_string(),
    );
    data.insert(
        READINESS_PROBE_SCRIPT.to_string(),
        READINESS_SCRIPT.to_string(),
    );
    data
}

/// Liveness and readiness scripts mounted into the Keycloak pods
pub fn keycloak_probes(cr: &Keycloak) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(KEYCLOAK_PROBES_NAME.to_string()),
            namespace: Some(namespace_of(cr)),
            labels: Some(app_labels()),
            owner_references: Some(vec![owner_reference(cr)]),
            ..Default::default()
        },
        data: Some(probes_data()),
        ..Default::default()
    }
}

pub fn keycloak_probes_reconciled(_cr: &Keycloak, current: &ConfigMap) -> ConfigMap {
    let mut reconciled = current.clone();
    reconciled.data = Some(probes_data());
    reconciled
}

pub fn keycloak_probes_selector(cr: &Keycloak) -> ObjectKey {
    ObjectKey::new(KEYCLOAK_PROBES_NAME, namespace_of(cr))
}

fn service_ports() -> Vec<ServicePort> {
    vec![ServicePort {
        name: Some(KEYCLOAK_DEPLOYMENT_NAME.to_string()),
        port: KEYCLOAK_HTTPS_PORT,
        target_port: Some(IntOrString::Int(KEYCLOAK_HTTPS_PORT)),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }]
}

/// Client-facing HTTPS service
pub fn keycloak_service(cr: &Keycloak) -> Service {
    let mut annotations = BTreeMap::new();
    annotations.insert(
        "service.alpha.openshift.io/serving-cert-secret-name".to_string(),
        SERVING_CERT_SECRET_NAME.to_string(),
    );

    Service {
        metadata: ObjectMeta {
            name: Some(KEYCLOAK_DEPLOYMENT_NAME.to_string()),
            namespace: Some(namespace_of(cr)),
            labels: Some(app_labels()),
            annotations: Some(annotations),
            owner_references: Some(vec![owner_reference(cr)]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(pod_selector()),
            ports: Some(service_ports()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Keep the allocated cluster IP, replace ports and selector.
pub fn keycloak_service_reconciled(_cr: &Keycloak, current: &Service) -> Service {
    let mut reconciled = current.clone();
    let spec = reconciled.spec.get_or_insert_with(ServiceSpec::default);
    spec.selector = Some(pod_selector());
    spec.ports = Some(service_ports());
    reconciled
}

pub fn keycloak_service_selector(cr: &Keycloak) -> ObjectKey {
    ObjectKey::new(KEYCLOAK_DEPLOYMENT_NAME, namespace_of(cr))
}

fn discovery_ports() -> Vec<ServicePort> {
    vec![ServicePort {
        name: Some("http".to_string()),
        port: KEYCLOAK_HTTP_PORT,
        target_port: Some(IntOrString::Int(KEYCLOAK_HTTP_PORT)),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }]
}

/// Headless service used by JGroups DNS_PING
pub fn keycloak_discovery_service(cr: &Keycloak) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(KEYCLOAK_DISCOVERY_SERVICE_NAME.to_string()),
            namespace: Some(namespace_of(cr)),
            labels: Some(app_labels()),
            owner_references: Some(vec![owner_reference(cr)]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".to_string()),
            selector: Some(pod_selector()),
            ports: Some(discovery_ports()),
            publish_not_ready_addresses: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn keycloak_discovery_service_reconciled(_cr: &Keycloak, current: &Service) -> Service {
    let mut reconciled = current.clone();
    let spec = reconciled.spec.get_or_insert_with(ServiceSpec::default);
    spec.selector = Some(pod_selector());
    spec.ports = Some(discovery_ports());
    spec.publish_not_ready_addresses = Some(true);
    reconciled
}

pub fn keycloak_discovery_service_selector(cr: &Keycloak) -> ObjectKey {
    ObjectKey::new(KEYCLOAK_DISCOVERY_SERVICE_NAME, namespace_of(cr))
}

fn plain_env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

fn secret_env(name: &str, secret: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret.to_string(),
                key: key.to_string(),
                optional: None,
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Managed environment, then the user's variables. A user variable with a
/// managed name replaces the managed value.
fn keycloak_env(cr: &Keycloak, db_secret: Option<&Secret>) -> Vec<EnvVar> {
    let namespace = namespace_of(cr);
    let default_db_addr = format!("{}.{}", POSTGRESQL_SERVICE_NAME, namespace);
    let db_addr = if cr.spec.external_database.enabled {
        external_database_host(db_secret).unwrap_or(default_db_addr)
    } else {
        default_db_addr
    };
    let admin_secret = format!("credential-{}", cr.name_any());

    let mut env = vec![
        plain_env("DB_VENDOR", "POSTGRES"),
        plain_env("DB_SCHEMA", "public"),
        plain_env("DB_ADDR", db_addr),
        plain_env("DB_PORT", external_database_port(db_secret).to_string()),
        plain_env("DB_DATABASE", external_database_name(db_secret)),
        secret_env("DB_USER", DATABASE_SECRET_NAME, DATABASE_USERNAME_PROPERTY),
        secret_env("DB_PASSWORD", DATABASE_SECRET_NAME, DATABASE_PASSWORD_PROPERTY),
        plain_env("NAMESPACE", namespace.clone()),
        plain_env("JGROUPS_DISCOVERY_PROTOCOL", "dns.DNS_PING"),
        plain_env(
            "JGROUPS_DISCOVERY_PROPERTIES",
            format!("dns_query={}.{}", KEYCLOAK_DISCOVERY_SERVICE_NAME, namespace),
        ),
        plain_env("CACHE_OWNERS_COUNT", "2"),
        plain_env("CACHE_OWNERS_AUTH_SESSIONS_COUNT", "2"),
        secret_env("KEYCLOAK_USER", &admin_secret, ADMIN_USERNAME_PROPERTY),
        secret_env("KEYCLOAK_PASSWORD", &admin_secret, ADMIN_PASSWORD_PROPERTY),
        plain_env(
            "X509_CA_BUNDLE",
            "/var/run/secrets/kubernetes.io/serviceaccount/*.crt",
        ),
        plain_env("PROXY_ADDRESS_FORWARDING", "true"),
    ];

    for extra in &cr.spec.keycloak_deployment_spec.env {
        let var = EnvVar {
            name: extra.name.clone(),
            value: extra.value.clone(),
            ..Default::default()
        };
        match env.iter_mut().find(|e| e.name == extra.name) {
            Some(existing) => *existing = var,
            None => env.push(var),
        }
    }
    env
}

fn container_ports() -> Vec<ContainerPort> {
    vec![
        ContainerPort {
            name: Some("https".to_string()),
            container_port: KEYCLOAK_HTTPS_PORT,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        },
        ContainerPort {
            name: Some("management".to_string()),
            container_port: KEYCLOAK_MANAGEMENT_PORT,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        },
        ContainerPort {
            name: Some("http".to_string()),
            container_port: KEYCLOAK_HTTP_PORT,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        },
    ]
}

fn exec_probe(script: &str, initial_delay: i32) -> Probe {
    Probe {
        exec: Some(ExecAction {
            command: Some(vec![
                "/bin/sh".to_string(),
                "-c".to_string(),
                format!("/probes/{}", script),
            ]),
        }),
        initial_delay_seconds: Some(initial_delay),
        timeout_seconds: Some(5),
        period_seconds: Some(10),
        failure_threshold: Some(10),
        ..Default::default()
    }
}

fn build_resource_requirements(cr: &Keycloak) -> ResourceRequirements {
    let spec = &cr.spec.keycloak_deployment_spec.resources;
    let mut limits = BTreeMap::new();
    let mut requests = BTreeMap::new();

    if let Some(cpu) = &spec.limits.cpu {
        limits.insert("cpu".to_string(), Quantity(cpu.clone()));
    }
    if let Some(memory) = &spec.limits.memory {
        limits.insert("memory".to_string(), Quantity(memory.clone()));
    }
    if let Some(cpu) = &spec.requests.cpu {
        requests.insert("cpu".to_string(), Quantity(cpu.clone()));
    }
    if let Some(memory) = &spec.requests.memory {
        requests.insert("memory".to_string(), Quantity(memory.clone()));
    }

    ResourceRequirements {
        limits: (!limits.is_empty()).then_some(limits),
        requests: (!requests.is_empty()).then_some(requests),
        ..Default::default()
    }
}

fn volume_mounts() -> Vec<VolumeMount> {
    vec![
        VolumeMount {
            name: SERVING_CERT_SECRET_NAME.to_string(),
            mount_path: "/etc/x509/https".to_string(),
            ..Default::default()
        },
        VolumeMount {
            name: EXTENSIONS_VOLUME.to_string(),
            mount_path: EXTENSIONS_PATH.to_string(),
            ..Default::default()
        },
        VolumeMount {
            name: KEYCLOAK_PROBES_NAME.to_string(),
            mount_path: "/probes".to_string(),
            ..Default::default()
        },
    ]
}

fn volumes() -> Vec<Volume> {
    vec![
        Volume {
            name: SERVING_CERT_SECRET_NAME.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(SERVING_CERT_SECRET_NAME.to_string()),
                optional: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        },
        Volume {
            name: EXTENSIONS_VOLUME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        },
        Volume {
            name: KEYCLOAK_PROBES_NAME.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: KEYCLOAK_PROBES_NAME.to_string(),
                default_mode: Some(0o555),
                ..Default::default()
            }),
            ..Default::default()
        },
    ]
}

fn extensions_init_containers(cr: &Keycloak, profiles: &ProfileManager) -> Option<Vec<Container>> {
    if cr.spec.extensions.is_empty() {
        return None;
    }
    Some(vec![Container {
        name: "extensions-init".to_string(),
        image: Some(profiles.init_container_image(cr)),
        env: Some(vec![plain_env(
            EXTENSIONS_ENV_VAR,
            cr.spec.extensions.join(","),
        )]),
        volume_mounts: Some(vec![VolumeMount {
            name: EXTENSIONS_VOLUME.to_string(),
            mount_path: EXTENSIONS_INIT_PATH.to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    }])
}

fn pod_template(
    cr: &Keycloak,
    db_secret: Option<&Secret>,
    profiles: &ProfileManager,
) -> PodTemplateSpec {
    let spec = &cr.spec.keycloak_deployment_spec;
    let container = Container {
        name: KEYCLOAK_DEPLOYMENT_NAME.to_string(),
        image: Some(profiles.keycloak_image(cr)),
        image_pull_policy: spec.image_pull_policy.clone(),
        ports: Some(container_ports()),
        env: Some(keycloak_env(cr, db_secret)),
        resources: Some(build_resource_requirements(cr)),
        volume_mounts: Some(volume_mounts()),
        liveness_probe: Some(exec_probe(LIVENESS_PROBE_SCRIPT, 30)),
        readiness_probe: Some(exec_probe(READINESS_PROBE_SCRIPT, 40)),
        ..Default::default()
    };

    let mut labels = pod_selector();
    labels.extend(app_labels());

    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(labels),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            containers: vec![container],
            init_containers: extensions_init_containers(cr, profiles),
            volumes: Some(volumes()),
            ..Default::default()
        }),
    }
}

/// The Keycloak StatefulSet. The database secret, when present, supplies the
/// connection details injected into the container environment.
pub fn keycloak_deployment(
    cr: &Keycloak,
    db_secret: Option<&Secret>,
    profiles: &ProfileManager,
) -> StatefulSet {
    let mut labels = app_labels();
    labels.extend(pod_selector());

    StatefulSet {
        metadata: ObjectMeta {
            name: Some(KEYCLOAK_DEPLOYMENT_NAME.to_string()),
            namespace: Some(namespace_of(cr)),
            labels: Some(labels),
            owner_references: Some(vec![owner_reference(cr)]),
            ..Default::default()
        },
        spec: Some(StatefulSetSpec {
            replicas: Some(sanitize_replicas(cr.spec.instances, true)),
            service_name: KEYCLOAK_DISCOVERY_SERVICE_NAME.to_string(),
            selector: LabelSelector {
                match_labels: Some(pod_selector()),
                ..Default::default()
            },
            template: pod_template(cr, db_secret, profiles),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Keep the immutable selector and service name, replace replicas and the pod template.
pub fn keycloak_deployment_reconciled(
    cr: &Keycloak,
    current: &StatefulSet,
    db_secret: Option<&Secret>,
    profiles: &ProfileManager,
) -> StatefulSet {
    let mut reconciled = current.clone();
    let template = pod_template(cr, db_secret, profiles);
    match reconciled.spec.as_mut() {
        Some(spec) => {
            spec.replicas = Some(sanitize_replicas(cr.spec.instances, false));
            spec.template = template;
        }
        None => {
            reconciled.spec = keycloak_deployment(cr, db_secret, profiles).spec;
        }
    }
    reconciled
}

pub fn keycloak_deployment_selector(cr: &Keycloak) -> ObjectKey {
    ObjectKey::new(KEYCLOAK_DEPLOYMENT_NAME, namespace_of(cr))
}

fn pdb_spec() -> PodDisruptionBudgetSpec {
    PodDisruptionBudgetSpec {
        max_unavailable: Some(IntOrString::Int(1)),
        selector: Some(LabelSelector {
            match_labels: Some(pod_selector()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn pod_disruption_budget(cr: &Keycloak) -> PodDisruptionBudget {
    PodDisruptionBudget {
        metadata: ObjectMeta {
            name: Some(KEYCLOAK_DEPLOYMENT_NAME.to_string()),
            namespace: Some(namespace_of(cr)),
            labels: Some(app_labels()),
            owner_references: Some(vec![owner_reference(cr)]),
            ..Default::default()
        },
        spec: Some(pdb_spec()),
        ..Default::default()
    }
}

pub fn pod_disruption_budget_reconciled(
    _cr: &Keycloak,
    current: &PodDisruptionBudget,
) -> PodDisruptionBudget {
    let mut reconciled = current.clone();
    reconciled.spec = Some(pdb_spec());
    reconciled
}

pub fn pod_disruption_budget_selector(cr: &Keycloak) -> ObjectKey {
    ObjectKey::new(KEYCLOAK_DEPLOYMENT_NAME, namespace_of(cr))
}
