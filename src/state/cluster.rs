//! Current state of every object managed for one `Keycloak`

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kube::ResourceExt;
use tracing::debug;

use crate::capabilities::{
    CapabilityKey, CapabilityStore, GRAFANA_DASHBOARD_KIND, PROMETHEUS_RULE_KIND,
    SERVICE_MONITOR_KIND,
};
use crate::cluster::{ClusterClient, ManagedResource, ObjectKey};
use crate::crd::{GrafanaDashboard, Keycloak, PrometheusRule, Route, ServiceMonitor};
use crate::error::Result;
use crate::model;

/// Snapshot read once per pass. `None` means absent or not served by the cluster.
#[derive(Debug, Clone, Default)]
pub struct ClusterState {
    pub keycloak_admin_secret: Option<Secret>,
    pub prometheus_rule: Option<PrometheusRule>,
    pub service_monitor: Option<ServiceMonitor>,
    pub grafana_dashboard: Option<GrafanaDashboard>,
    pub database_secret: Option<Secret>,
    pub postgresql_persistent_volume_claim: Option<PersistentVolumeClaim>,
    pub postgresql_deployment: Option<Deployment>,
    pub postgresql_service: Option<Service>,
    pub keycloak_probes: Option<ConfigMap>,
    pub keycloak_service: Option<Service>,
    pub keycloak_discovery_service: Option<Service>,
    pub keycloak_deployment: Option<StatefulSet>,
    pub pod_disruption_budget: Option<PodDisruptionBudget>,
    pub keycloak_route: Option<Route>,
    pub keycloak_ingress: Option<Ingress>,
}

/// Fetch one object. Absence is not an error, anything else aborts the read.
async fn fetch<C, K>(cluster: &C, key: ObjectKey) -> Result<Option<K>>
where
    C: ClusterClient,
    K: ManagedResource,
{
    match cluster.get::<K>(&key).await {
        Ok(obj) => Ok(Some(obj)),
        Err(e) if e.is_absent() => {
            debug!(kind = %K::kind(&()), object = %key, reason = %e, "Object absent");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Record a present object in the resource's status.
fn track<K: ManagedResource>(cr: &mut Keycloak, obj: &Option<K>) {
    if let Some(obj) = obj {
        cr.update_status_secondary_resources(&K::kind(&()), &obj.name_any());
    }
}

impl ClusterState {
    /// Read every managed kind once.
    ///
    /// Monitoring kinds are only read when their capability flag is set, the
    /// embedded database only when no external database is configured, and
    /// exactly one of Route or Ingress depending on the route flag.
    pub async fn read<C: ClusterClient>(
        cluster: &C,
        capabilities: &dyn CapabilityStore,
        cr: &mut Keycloak,
    ) -> Result<Self> {
        let mut state = ClusterState::default();
        let monitoring = |kind: &str| capabilities.get(&CapabilityKey::monitoring(kind));

        state.keycloak_admin_secret =
            fetch(cluster, model::keycloak_admin_secret_selector(cr)).await?;
        track(cr, &state.keycloak_admin_secret);

        if monitoring(PROMETHEUS_RULE_KIND) {
            state.prometheus_rule = fetch(cluster, model::prometheus_rule_selector(cr)).await?;
            track(cr, &state.prometheus_rule);
        }
        if monitoring(SERVICE_MONITOR_KIND) {
            state.service_monitor = fetch(cluster, model::service_monitor_selector(cr)).await?;
            track(cr, &state.service_monitor);
        }
        if monitoring(GRAFANA_DASHBOARD_KIND) {
            state.grafana_dashboard =
                fetch(cluster, model::grafana_dashboard_selector(cr)).await?;
            track(cr, &state.grafana_dashboard);
        }

        state.database_secret = fetch(cluster, model::database_secret_selector(cr)).await?;
        track(cr, &state.database_secret);

        if !cr.spec.external_database.enabled {
            state.postgresql_persistent_volume_claim =
                fetch(cluster, model::postgresql_persistent_volume_claim_selector(cr)).await?;
            track(cr, &state.postgresql_persistent_volume_claim);

            state.postgresql_deployment =
                fetch(cluster, model::postgresql_deployment_selector(cr)).await?;
            track(cr, &state.postgresql_deployment);

            state.postgresql_service =
                fetch(cluster, model::postgresql_service_selector(cr)).await?;
            track(cr, &state.postgresql_service);
        }

        state.keycloak_probes = fetch(cluster, model::keycloak_probes_selector(cr)).await?;
        track(cr, &state.keycloak_probes);

        state.keycloak_service = fetch(cluster, model::keycloak_service_selector(cr)).await?;
        track(cr, &state.keycloak_service);

        state.keycloak_discovery_service =
            fetch(cluster, model::keycloak_discovery_service_selector(cr)).await?;
        track(cr, &state.keycloak_discovery_service);

        state.keycloak_deployment =
            fetch(cluster, model::keycloak_deployment_selector(cr)).await?;
        track(cr, &state.keycloak_deployment);

        state.pod_disruption_budget =
            fetch(cluster, model::pod_disruption_budget_selector(cr)).await?;
        if cr.spec.pod_disruption_budget.enabled {
            track(cr, &state.pod_disruption_budget);
        }

        if capabilities.route_supported() {
            state.keycloak_route = fetch(cluster, model::keycloak_route_selector(cr)).await?;
            track(cr, &state.keycloak_route);
        } else {
            state.keycloak_ingress = fetch(cluster, model::keycloak_ingress_selector(cr)).await?;
            track(cr, &state.keycloak_ingress);
        }

        Ok(state)
    }

    /// The workload has all desired replicas ready and, on OpenShift, the route is admitted.
    pub fn is_resources_ready(&self, cr: &Keycloak, capabilities: &dyn CapabilityStore) -> bool {
        if cr.spec.unmanaged {
            return true;
        }

        let deployment_ready = self
            .keycloak_deployment
            .as_ref()
            .is_some_and(is_stateful_set_ready);

        let route_ready = if cr.spec.external_access.enabled && capabilities.route_supported() {
            self.keycloak_route.as_ref().is_some_and(Route::is_admitted)
        } else {
            true
        };

        deployment_ready && route_ready
    }
}

fn is_stateful_set_ready(sts: &StatefulSet) -> bool {
    let desired = sts.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    let ready = sts
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0);
    ready == desired
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::CapabilityCache;
    use crate::cluster::testing::FakeClusterClient;
    use crate::crd::{RouteIngress, RouteIngressCondition, RouteStatus};
    use crate::model::fixtures::keycloak;
    use crate::model::{
        keycloak_admin_secret, keycloak_deployment, keycloak_route, pod_disruption_budget,
        postgresql_service, service_monitor, ProfileManager,
    };
    use k8s_openapi::api::apps::v1::StatefulSetStatus;

    fn ready_deployment(kc: &Keycloak, ready: i32) -> StatefulSet {
        let mut sts = keycloak_deployment(kc, None, &ProfileManager::default());
        sts.status = Some(StatefulSetStatus {
            ready_replicas: Some(ready),
            replicas: ready,
            ..Default::default()
        });
        sts
    }

    fn admitted(mut route: Route) -> Route {
        route.status = Some(RouteStatus {
            ingress: vec![RouteIngress {
                host: "keycloak.apps.example.com".to_string(),
                router_name: "default".to_string(),
                conditions: vec![RouteIngressCondition {
                    r#type: "Admitted".to_string(),
                    status: "True".to_string(),
                }],
            }],
        });
        route
    }

    #[tokio::test]
    async fn test_read_empty_cluster() {
        let cluster = FakeClusterClient::new();
        let caps = CapabilityCache::new();
        let mut kc = keycloak("sso", "ns");

        let state = ClusterState::read(&cluster, &caps, &mut kc).await.unwrap();
        assert!(state.keycloak_admin_secret.is_none());
        assert!(state.keycloak_deployment.is_none());
        assert!(kc.status.is_none());
    }

    #[tokio::test]
    async fn test_read_records_present_objects() {
        let mut kc = keycloak("sso", "ns");
        let cluster = FakeClusterClient::new();
        cluster.insert(&keycloak_admin_secret(&kc));
        cluster.insert(&pod_disruption_budget(&kc));

        let state = ClusterState::read(&cluster, &CapabilityCache::new(), &mut kc)
            .await
            .unwrap();
        assert!(state.keycloak_admin_secret.is_some());
        assert!(state.pod_disruption_budget.is_some());

        let resources = kc.status.unwrap().secondary_resources;
        assert_eq!(resources["Secret"], vec!["credential-sso".to_string()]);
        assert!(!resources.contains_key("PodDisruptionBudget"));
    }

    #[tokio::test]
    async fn test_read_records_pdb_when_enabled() {
        let mut kc = keycloak("sso", "ns");
        kc.spec.pod_disruption_budget.enabled = true;
        let cluster = FakeClusterClient::new();
        cluster.insert(&pod_disruption_budget(&kc));

        ClusterState::read(&cluster, &CapabilityCache::new(), &mut kc)
            .await
            .unwrap();
        assert!(kc.status.unwrap().secondary_resources.contains_key("PodDisruptionBudget"));
    }

    #[tokio::test]
    async fn test_read_embedded_database_only_without_external() {
        let mut kc = keycloak("sso", "ns");
        let cluster = FakeClusterClient::new();
        cluster.insert(&postgresql_service(&kc));

        let state = ClusterState::read(&cluster, &CapabilityCache::new(), &mut kc)
            .await
            .unwrap();
        assert!(state.postgresql_service.is_some());
        assert!(state.postgresql_deployment.is_none());
        assert!(cluster
            .calls()
            .iter()
            .any(|c| c.starts_with("get PersistentVolumeClaim")));

        let mut external = keycloak("sso", "ns");
        external.spec.external_database.enabled = true;
        let cluster = FakeClusterClient::new();
        let state = ClusterState::read(&cluster, &CapabilityCache::new(), &mut external)
            .await
            .unwrap();
        assert!(state.postgresql_service.is_none());
        assert!(!cluster
            .calls()
            .iter()
            .any(|c| c.starts_with("get PersistentVolumeClaim") || c.starts_with("get Deployment")));
    }

    #[tokio::test]
    async fn test_read_skips_monitoring_without_flags() {
        let mut kc = keycloak("sso", "ns");
        let cluster = FakeClusterClient::new();
        cluster.insert(&service_monitor(&kc));

        let state = ClusterState::read(&cluster, &CapabilityCache::new(), &mut kc)
            .await
            .unwrap();
        assert!(state.service_monitor.is_none());
        assert!(!cluster.calls().iter().any(|c| c.contains("ServiceMonitor")));
    }

    #[tokio::test]
    async fn test_read_tolerates_unregistered_kind() {
        let mut kc = keycloak("sso", "ns");
        let caps = CapabilityCache::new();
        caps.set(CapabilityKey::monitoring(SERVICE_MONITOR_KIND), true);
        let cluster = FakeClusterClient::new().without_kind("ServiceMonitor");

        let state = ClusterState::read(&cluster, &caps, &mut kc).await.unwrap();
        assert!(state.service_monitor.is_none());
    }

    #[tokio::test]
    async fn test_read_fails_fast_on_other_errors() {
        let mut kc = keycloak("sso", "ns");
        let cluster = FakeClusterClient::new().failing_kind("Service");

        let err = ClusterState::read(&cluster, &CapabilityCache::new(), &mut kc)
            .await
            .unwrap_err();
        assert!(!err.is_absent());
        assert!(!cluster.calls().iter().any(|c| c.contains("StatefulSet")));
    }

    #[tokio::test]
    async fn test_read_route_or_ingress() {
        let mut kc = keycloak("sso", "ns");
        let cluster = FakeClusterClient::new();
        let caps = CapabilityCache::new();

        ClusterState::read(&cluster, &caps, &mut kc).await.unwrap();
        assert!(cluster.calls().iter().any(|c| c.starts_with("get Ingress")));
        assert!(!cluster.calls().iter().any(|c| c.starts_with("get Route")));

        let cluster = FakeClusterClient::new();
        cluster.insert(&keycloak_route(&kc));
        caps.set(CapabilityKey::route(), true);
        let state = ClusterState::read(&cluster, &caps, &mut kc).await.unwrap();
        assert!(state.keycloak_route.is_some());
        assert!(!cluster.calls().iter().any(|c| c.starts_with("get Ingress")));
    }

    #[test]
    fn test_unmanaged_is_always_ready() {
        let mut kc = keycloak("sso", "ns");
        kc.spec.unmanaged = true;
        assert!(ClusterState::default().is_resources_ready(&kc, &CapabilityCache::new()));
    }

    #[test]
    fn test_ready_requires_all_replicas() {
        let mut kc = keycloak("sso", "ns");
        kc.spec.instances = 2;
        let caps = CapabilityCache::new();

        let mut state = ClusterState {
            keycloak_deployment: Some(ready_deployment(&kc, 1)),
            ..Default::default()
        };
        assert!(!state.is_resources_ready(&kc, &caps));

        state.keycloak_deployment = Some(ready_deployment(&kc, 2));
        assert!(state.is_resources_ready(&kc, &caps));
    }

    #[test]
    fn test_ready_checks_route_on_openshift() {
        let mut kc = keycloak("sso", "ns");
        kc.spec.instances = 1;
        kc.spec.external_access.enabled = true;
        let caps = CapabilityCache::new();
        caps.set(CapabilityKey::route(), true);

        let mut state = ClusterState {
            keycloak_deployment: Some(ready_deployment(&kc, 1)),
            keycloak_route: Some(keycloak_route(&kc)),
            ..Default::default()
        };
        assert!(!state.is_resources_ready(&kc, &caps));

        state.keycloak_route = Some(admitted(keycloak_route(&kc)));
        assert!(state.is_resources_ready(&kc, &caps));

        // plain Kubernetes ignores the route entirely
        let plain = CapabilityCache::new();
        state.keycloak_route = None;
        assert!(state.is_resources_ready(&kc, &plain));
    }
}
