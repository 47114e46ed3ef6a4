//! ServiceMonitor, PrometheusRule and GrafanaDashboard for a Keycloak installation

use std::collections::BTreeMap;

use super::{app_labels, namespace_of, owner_reference, APPLICATION_NAME};
use crate::cluster::ObjectKey;
use crate::crd::{
    GrafanaDashboard, GrafanaDashboardSpec, Keycloak, MonitorLabelSelector, PrometheusRule,
    PrometheusRuleSpec, Rule, RuleGroup, ServiceMonitor, ServiceMonitorEndpoint,
    ServiceMonitorSpec,
};

const DASHBOARD_JSON: &str = r#"{
  "title": "Keycloak",
  "uid": "keycloak",
  "schemaVersion": 16,
  "panels": [
    {
      "type": "graph",
      "title": "Memory usage",
      "targets": [{"expr": "sum(jvm_memory_bytes_used{namespace=\"$namespace\"}) by (area)"}]
    },
    {
      "type": "graph",
      "title": "Logins per minute",
      "targets": [{"expr": "sum(rate(keycloak_logins{namespace=\"$namespace\"}[1m])) by (realm)"}]
    },
    {
      "type": "graph",
      "title": "Failed logins per minute",
      "targets": [{"expr": "sum(rate(keycloak_failed_login_attempts{namespace=\"$namespace\"}[1m])) by (realm)"}]
    }
  ]
}"#;

fn monitoring_labels() -> BTreeMap<String, String> {
    let mut labels = app_labels();
    labels.insert("monitoring-key".to_string(), "middleware".to_string());
    labels
}

fn service_monitor_spec() -> ServiceMonitorSpec {
    let mut match_labels = BTreeMap::new();
    match_labels.insert("app".to_string(), APPLICATION_NAME.to_string());

    ServiceMonitorSpec {
        selector: MonitorLabelSelector { match_labels },
        endpoints: vec![ServiceMonitorEndpoint {
            port: APPLICATION_NAME.to_string(),
            path: Some("/auth/realms/master/metrics".to_string()),
            scheme: Some("https".to_string()),
            interval: Some("30s".to_string()),
        }],
    }
}

pub fn service_monitor(cr: &Keycloak) -> ServiceMonitor {
    let mut monitor = ServiceMonitor::new(APPLICATION_NAME, service_monitor_spec());
    monitor.metadata.namespace = Some(namespace_of(cr));
    monitor.metadata.labels = Some(monitoring_labels());
    monitor.metadata.owner_references = Some(vec![owner_reference(cr)]);
    monitor
}

pub fn service_monitor_reconciled(_cr: &Keycloak, current: &ServiceMonitor) -> ServiceMonitor {
    let mut reconciled = current.clone();
    reconciled.spec = service_monitor_spec();
    reconciled
}

pub fn service_monitor_selector(cr: &Keycloak) -> ObjectKey {
    ObjectKey::new(APPLICATION_NAME, namespace_of(cr))
}

fn alert(name: &str, expr: String, duration: &str, severity: &str, message: &str) -> Rule {
    let mut labels = BTreeMap::new();
    labels.insert("severity".to_string(), severity.to_string());
    let mut annotations = BTreeMap::new();
    annotations.insert("message".to_string(), message.to_string());

    Rule {
        alert: name.to_string(),
        expr,
        for_duration: Some(duration.to_string()),
        labels,
        annotations,
    }
}

fn prometheus_rule_spec(namespace: &str) -> PrometheusRuleSpec {
    PrometheusRuleSpec {
        groups: vec![RuleGroup {
            name: "general.rules".to_string(),
            rules: vec![
                alert(
                    "KeycloakJavaHeapThresholdExceeded",
                    format!(
                        "100 * jvm_memory_bytes_used{{area=\"heap\",namespace=\"{ns}\"}} / jvm_memory_bytes_max{{area=\"heap\",namespace=\"{ns}\"}} > 90",
                        ns = namespace
                    ),
                    "1m",
                    "critical",
                    "Heap memory usage is above 90% of the maximum",
                ),
                alert(
                    "KeycloakInstanceNotAvailable",
                    format!(
                        "(1 - absent(kube_pod_status_ready{{namespace=\"{}\", condition=\"true\"}} * on (pod) group_left (label_component) kube_pod_labels{{label_component=\"keycloak\"}})) == 0",
                        namespace
                    ),
                    "1m",
                    "critical",
                    "No Keycloak instance is ready",
                ),
                alert(
                    "KeycloakAPIRequestDuration99PercThresholdExceeded",
                    format!(
                        "histogram_quantile(0.99, sum(rate(keycloak_request_duration_bucket{{namespace=\"{}\"}}[5m])) by (le)) / 1000 > 2",
                        namespace
                    ),
                    "10m",
                    "warning",
                    "99th percentile of request duration is above 2 seconds",
                ),
            ],
        }],
    }
}

pub fn prometheus_rule(cr: &Keycloak) -> PrometheusRule {
    let namespace = namespace_of(cr);
    let mut rule = PrometheusRule::new(APPLICATION_NAME, prometheus_rule_spec(&namespace));
    rule.metadata.namespace = Some(namespace);
    rule.metadata.labels = Some(monitoring_labels());
    rule.metadata.owner_references = Some(vec![owner_reference(cr)]);
    rule
}

pub fn prometheus_rule_reconciled(cr: &Keycloak, current: &PrometheusRule) -> PrometheusRule {
    let mut reconciled = current.clone();
    reconciled.spec = prometheus_rule_spec(&namespace_of(cr));
    reconciled
}

pub fn prometheus_rule_selector(cr: &Keycloak) -> ObjectKey {
    ObjectKey::new(APPLICATION_NAME, namespace_of(cr))
}

fn grafana_dashboard_spec() -> GrafanaDashboardSpec {
    GrafanaDashboardSpec {
        json: DASHBOARD_JSON.to_string(),
        name: Some("keycloak.json".to_string()),
    }
}

pub fn grafana_dashboard(cr: &Keycloak) -> GrafanaDashboard {
    let mut dashboard = GrafanaDashboard::new(APPLICATION_NAME, grafana_dashboard_spec());
    dashboard.metadata.namespace = Some(namespace_of(cr));
    dashboard.metadata.labels = Some(monitoring_labels());
    dashboard.metadata.owner_references = Some(vec![owner_reference(cr)]);
    dashboard
}

pub fn grafana_dashboard_reconciled(
    _cr: &Keycloak,
    current: &GrafanaDashboard,
) -> GrafanaDashboard {
    let mut reconciled = current.clone();
    reconciled.spec = grafana_dashboard_spec();
    reconciled
}

pub fn grafana_dashboard_selector(cr: &Keycloak) -> ObjectKey {
    ObjectKey::new(APPLICATION_NAME, namespace_of(cr))
}
