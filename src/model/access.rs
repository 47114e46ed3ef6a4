//! External access: Ingress on plain Kubernetes, Route on OpenShift

use std::collections::BTreeMap;

use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::{
    app_labels, namespace_of, owner_reference, APPLICATION_NAME, INGRESS_DEFAULT_HOST,
    KEYCLOAK_DEPLOYMENT_NAME, KEYCLOAK_HTTPS_PORT,
};
use crate::cluster::ObjectKey;
use crate::crd::{Keycloak, Route, RoutePort, RouteSpec, RouteTargetReference, RouteTls};

const DEFAULT_TLS_TERMINATION: &str = "reencrypt";

fn ingress_host(cr: &Keycloak) -> String {
    cr.spec
        .external_access
        .host
        .clone()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| INGRESS_DEFAULT_HOST.to_string())
}

fn ingress_annotations(cr: &Keycloak) -> BTreeMap<String, String> {
    let mut annotations = BTreeMap::new();
    annotations.insert(
        "nginx.ingress.kubernetes.io/backend-protocol".to_string(),
        "HTTPS".to_string(),
    );
    annotations.extend(cr.spec.external_access.annotations.clone());
    annotations
}

fn ingress_rule(host: String) -> IngressRule {
    IngressRule {
        host: Some(host),
        http: Some(HTTPIngressRuleValue {
            paths: vec![HTTPIngressPath {
                path: Some("/".to_string()),
                path_type: "Prefix".to_string(),
                backend: IngressBackend {
                    service: Some(IngressServiceBackend {
                        name: KEYCLOAK_DEPLOYMENT_NAME.to_string(),
                        port: Some(ServiceBackendPort {
                            number: Some(KEYCLOAK_HTTPS_PORT),
                            name: None,
                        }),
                    }),
                    resource: None,
                },
            }],
        }),
    }
}

pub fn keycloak_ingress(cr: &Keycloak) -> Ingress {
    let host = ingress_host(cr);

    Ingress {
        metadata: ObjectMeta {
            name: Some(APPLICATION_NAME.to_string()),
            namespace: Some(namespace_of(cr)),
            labels: Some(app_labels()),
            annotations: Some(ingress_annotations(cr)),
            owner_references: Some(vec![owner_reference(cr)]),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            rules: Some(vec![ingress_rule(host.clone())]),
            tls: Some(vec![IngressTLS {
                hosts: Some(vec![host.clone()]),
                secret_name: Some(format!("{}-tls", host)),
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Keep the current host and TLS settings, refresh annotations and the backend.
pub fn keycloak_ingress_reconciled(cr: &Keycloak, current: &Ingress) -> Ingress {
    let mut reconciled = current.clone();
    let current_spec = current.spec.clone().unwrap_or_default();
    let host = current_spec
        .rules
        .as_ref()
        .and_then(|rules| rules.first())
        .and_then(|rule| rule.host.clone())
        .unwrap_or_else(|| ingress_host(cr));

    reconciled.metadata.annotations = Some(ingress_annotations(cr));
    reconciled.spec = Some(IngressSpec {
        rules: Some(vec![ingress_rule(host)]),
        tls: current_spec.tls,
        ..Default::default()
    });
    reconciled
}

pub fn keycloak_ingress_selector(cr: &Keycloak) -> ObjectKey {
    ObjectKey::new(APPLICATION_NAME, namespace_of(cr))
}

fn route_spec(cr: &Keycloak, host: Option<String>) -> RouteSpec {
    let termination = cr
        .spec
        .external_access
        .tls_termination
        .clone()
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_TLS_TERMINATION.to_string());

    RouteSpec {
        host,
        to: RouteTargetReference {
            kind: "Service".to_string(),
            name: KEYCLOAK_DEPLOYMENT_NAME.to_string(),
        },
        port: Some(RoutePort {
            target_port: KEYCLOAK_DEPLOYMENT_NAME.to_string(),
        }),
        tls: Some(RouteTls { termination }),
    }
}

pub fn keycloak_route(cr: &Keycloak) -> Route {
    let host = cr
        .spec
        .external_access
        .host
        .clone()
        .filter(|h| !h.is_empty());

    let mut route = Route::new(APPLICATION_NAME, route_spec(cr, host));
    route.metadata.namespace = Some(namespace_of(cr));
    route.metadata.labels = Some(app_labels());
    route.metadata.owner_references = Some(vec![owner_reference(cr)]);
    route
}

/// Keep the host the router assigned, refresh target and TLS.
pub fn keycloak_route_reconciled(cr: &Keycloak, current: &Route) -> Route {
    let mut reconciled = current.clone();
    reconciled.spec = route_spec(cr, current.spec.host.clone());
    reconciled
}

pub fn keycloak_route_selector(cr: &Keycloak) -> ObjectKey {
    ObjectKey::new(APPLICATION_NAME, namespace_of(cr))
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::keycloak;
    use super::*;

    #[test]
    fn test_ingress_default_host() {
        let ingress = keycloak_ingress(&keycloak("sso", "ns"));
        let spec = ingress.spec.unwrap();
        let rules = spec.rules.unwrap();
        assert_eq!(rules[0].host.as_deref(), Some(INGRESS_DEFAULT_HOST));
        assert_eq!(
            spec.tls.unwrap()[0].secret_name.as_deref(),
            Some("keycloak.local-tls")
        );
    }

    #[test]
    fn test_ingress_user_annotations() {
        let mut kc = keycloak("sso", "ns");
        kc.spec
            .external_access
            .annotations
            .insert("cert-manager.io/cluster-issuer".to_string(), "le".to_string());
        let annotations = keycloak_ingress(&kc).metadata.annotations.unwrap();
        assert_eq!(annotations["cert-manager.io/cluster-issuer"], "le");
        assert_eq!(annotations["nginx.ingress.kubernetes.io/backend-protocol"], "HTTPS");
    }

    #[test]
    fn test_ingress_reconcile_keeps_host() {
        let mut kc = keycloak("sso", "ns");
        kc.spec.external_access.host = Some("old.example.com".to_string());
        let current = keycloak_ingress(&kc);

        kc.spec.external_access.host = Some("new.example.com".to_string());
        let reconciled = keycloak_ingress_reconciled(&kc, &current);
        let rules = reconciled.spec.unwrap().rules.unwrap();
        assert_eq!(rules[0].host.as_deref(), Some("old.example.com"));
    }

    #[test]
    fn test_route_build_and_reconcile() {
        let kc = keycloak("sso", "ns");
        let route = keycloak_route(&kc);
        assert_eq!(route.metadata.namespace.as_deref(), Some("ns"));
        assert_eq!(route.spec.to.name, "keycloak");
        assert_eq!(
            route.spec.tls.as_ref().map(|t| t.termination.as_str()),
            Some(DEFAULT_TLS_TERMINATION)
        );

        let mut current = route.clone();
        current.spec.host = Some("keycloak-ns.apps.example.com".to_string());
        let reconciled = keycloak_route_reconciled(&kc, &current);
        assert_eq!(
            reconciled.spec.host.as_deref(),
            Some("keycloak-ns.apps.example.com")
        );
    }
}
