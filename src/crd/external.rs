//! Third-party resource kinds managed alongside Keycloak
//!
//! Only the fields the operator writes or reads are modelled. Unknown fields
//! from the live objects are dropped on read, which is fine because updates
//! always start from the reconciled builder output.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// OpenShift Route
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "route.openshift.io",
    version = "v1",
    kind = "Route",
    namespaced,
    status = "RouteStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub to: RouteTargetReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<RoutePort>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<RouteTls>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
pub struct RouteTargetReference {
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoutePort {
    pub target_port: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
pub struct RouteTls {
    pub termination: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct RouteStatus {
    #[serde(default)]
    pub ingress: Vec<RouteIngress>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct RouteIngress {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub router_name: String,
    #[serde(default)]
    pub conditions: Vec<RouteIngressCondition>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct RouteIngressCondition {
    pub r#type: String,
    pub status: String,
}

impl Route {
    /// Some router has admitted the route.
    pub fn is_admitted(&self) -> bool {
        self.status
            .as_ref()
            .map(|s| {
                s.ingress.iter().any(|ingress| {
                    ingress
                        .conditions
                        .iter()
                        .any(|c| c.r#type == "Admitted" && c.status == "True")
                })
            })
            .unwrap_or(false)
    }
}

/// Prometheus operator ServiceMonitor
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "monitoring.coreos.com",
    version = "v1",
    kind = "ServiceMonitor",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMonitorSpec {
    pub selector: MonitorLabelSelector,
    #[serde(default)]
    pub endpoints: Vec<ServiceMonitorEndpoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonitorLabelSelector {
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMonitorEndpoint {
    pub port: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
}

/// Prometheus operator PrometheusRule
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "monitoring.coreos.com",
    version = "v1",
    kind = "PrometheusRule",
    namespaced
)]
pub struct PrometheusRuleSpec {
    #[serde(default)]
    pub groups: Vec<RuleGroup>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
pub struct RuleGroup {
    pub name: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
pub struct Rule {
    pub alert: String,
    pub expr: String,
    #[serde(default, rename = "for", skip_serializing_if = "Option::is_none")]
    pub for_duration: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// Grafana operator dashboard
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "integreatly.org",
    version = "v1alpha1",
    kind = "GrafanaDashboard",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct GrafanaDashboardSpec {
    /// Dashboard model as a JSON document
    pub json: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_admitted() {
        let mut route = Route::new("keycloak", RouteSpec::default());
        assert!(!route.is_admitted());

        route.status = Some(RouteStatus {
            ingress: vec![RouteIngress {
                host: "sso.example.com".to_string(),
                router_name: "default".to_string(),
                conditions: vec![RouteIngressCondition {
                    r#type: "Admitted".to_string(),
                    status: "True".to_string(),
                }],
            }],
        });
        assert!(route.is_admitted());
    }

    #[test]
    fn test_route_not_admitted_when_false() {
        let mut route = Route::new("keycloak", RouteSpec::default());
        route.status = Some(RouteStatus {
            ingress: vec![RouteIngress {
                conditions: vec![RouteIngressCondition {
                    r#type: "Admitted".to_string(),
                    status: "False".to_string(),
                }],
                ..Default::default()
            }],
        });
        assert!(!route.is_admitted());
    }

    #[test]
    fn test_rule_for_field_name() {
        let rule = Rule {
            alert: "KeycloakDown".to_string(),
            expr: "up == 0".to_string(),
            for_duration: Some("5m".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["for"], "5m");
    }
}
