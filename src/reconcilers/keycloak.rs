//! Planner for one `Keycloak` installation

use std::sync::Arc;

use crate::action::{ClusterAction, DesiredState};
use crate::capabilities::{
    CapabilityKey, CapabilityStore, GRAFANA_DASHBOARD_KIND, PROMETHEUS_RULE_KIND,
    SERVICE_MONITOR_KIND,
};
use crate::crd::Keycloak;
use crate::model::{self, ProfileManager};
use crate::state::ClusterState;

/// Create the object when the snapshot has none, otherwise update the live one.
fn create_or_update<K, B, R>(
    current: Option<&K>,
    build: B,
    reconcile: R,
    what: &str,
) -> Option<ClusterAction>
where
    K: Into<crate::action::ManagedObject> + Clone,
    B: FnOnce() -> K,
    R: FnOnce(&K) -> K,
{
    Some(match current {
        None => ClusterAction::create(build(), format!("create {}", what)),
        Some(current) => ClusterAction::update(reconcile(current), format!("update {}", what))
            .with_previous(current.clone()),
    })
}

/// Maps a [`ClusterState`] and a `Keycloak` to the ordered list of cluster writes.
pub struct KeycloakReconciler {
    capabilities: Arc<dyn CapabilityStore>,
    profiles: ProfileManager,
}

impl KeycloakReconciler {
    pub fn new(capabilities: Arc<dyn CapabilityStore>, profiles: ProfileManager) -> Self {
        Self {
            capabilities,
            profiles,
        }
    }

    fn monitoring_enabled(&self, kind: &str) -> bool {
        self.capabilities.get(&CapabilityKey::monitoring(kind))
    }

    pub fn reconcile(&self, current: &ClusterState, cr: &Keycloak) -> DesiredState {
        let mut desired = DesiredState::new();

        desired.add_action(self.admin_secret(current, cr));
        desired.add_action(self.prometheus_rule(current, cr));
        desired.add_action(self.service_monitor(current, cr));
        desired.add_action(self.grafana_dashboard(current, cr));
        desired.add_action(self.database_secret(current, cr));
        if !cr.spec.external_database.enabled {
            desired.add_action(self.postgresql_claim(current, cr));
            desired.add_action(self.postgresql_deployment(current, cr));
            desired.add_action(self.postgresql_service(current, cr));
        }
        desired.add_action(self.probes(current, cr));
        desired.add_action(self.service(current, cr));
        desired.add_action(self.discovery_service(current, cr));
        desired.add_action(self.deployment(current, cr));
        desired.add_action(self.pod_disruption_budget(current, cr));
        self.external_access(&mut desired, current, cr);

        desired
    }

    fn admin_secret(&self, current: &ClusterState, cr: &Keycloak) -> Option<ClusterAction> {
        create_or_update(
            current.keycloak_admin_secret.as_ref(),
            || model::keycloak_admin_secret(cr),
            |s| model::keycloak_admin_secret_reconciled(cr, s),
            "Keycloak admin secret",
        )
    }

    fn prometheus_rule(&self, current: &ClusterState, cr: &Keycloak) -> Option<ClusterAction> {
        if !self.monitoring_enabled(PROMETHEUS_RULE_KIND) {
            return None;
        }
        create_or_update(
            current.prometheus_rule.as_ref(),
            || model::prometheus_rule(cr),
            |r| model::prometheus_rule_reconciled(cr, r),
            "Keycloak prometheus rule",
        )
    }

    fn service_monitor(&self, current: &ClusterState, cr: &Keycloak) -> Option<ClusterAction> {
        if !self.monitoring_enabled(SERVICE_MONITOR_KIND) {
            return None;
        }
        create_or_update(
            current.service_monitor.as_ref(),
            || model::service_monitor(cr),
            |m| model::service_monitor_reconciled(cr, m),
            "Keycloak service monitor",
        )
    }

    fn grafana_dashboard(&self, current: &ClusterState, cr: &Keycloak) -> Option<ClusterAction> {
        if !self.monitoring_enabled(GRAFANA_DASHBOARD_KIND) {
            return None;
        }
        create_or_update(
            current.grafana_dashboard.as_ref(),
            || model::grafana_dashboard(cr),
            |d| model::grafana_dashboard_reconciled(cr, d),
            "Keycloak grafana dashboard",
        )
    }

    fn database_secret(&self, current: &ClusterState, cr: &Keycloak) -> Option<ClusterAction> {
        create_or_update(
            current.database_secret.as_ref(),
            || model::database_secret(cr),
            |s| model::database_secret_reconciled(cr, s),
            "Keycloak database secret",
        )
    }

    fn postgresql_claim(&self, current: &ClusterState, cr: &Keycloak) -> Option<ClusterAction> {
        create_or_update(
            current.postgresql_persistent_volume_claim.as_ref(),
            || model::postgresql_persistent_volume_claim(cr),
            |c| model::postgresql_persistent_volume_claim_reconciled(cr, c),
            "PostgreSQL persistent volume claim",
        )
    }

    fn postgresql_deployment(
        &self,
        current: &ClusterState,
        cr: &Keycloak,
    ) -> Option<ClusterAction> {
        create_or_update(
            current.postgresql_deployment.as_ref(),
            || model::postgresql_deployment(cr),
            |d| model::postgresql_deployment_reconciled(cr, d),
            "PostgreSQL deployment",
        )
    }

    fn postgresql_service(&self, current: &ClusterState, cr: &Keycloak) -> Option<ClusterAction> {
        create_or_update(
            current.postgresql_service.as_ref(),
            || model::postgresql_service(cr),
            |s| model::postgresql_service_reconciled(cr, s),
            "PostgreSQL service",
        )
    }

    fn probes(&self, current: &ClusterState, cr: &Keycloak) -> Option<ClusterAction> {
        create_or_update(
            current.keycloak_probes.as_ref(),
            || model::keycloak_probes(cr),
            |p| model::keycloak_probes_reconciled(cr, p),
            "Keycloak probes",
        )
    }

    fn service(&self, current: &ClusterState, cr: &Keycloak) -> Option<ClusterAction> {
        create_or_update(
            current.keycloak_service.as_ref(),
            || model::keycloak_service(cr),
            |s| model::keycloak_service_reconciled(cr, s),
            "Keycloak service",
        )
    }

    fn discovery_service(&self, current: &ClusterState, cr: &Keycloak) -> Option<ClusterAction> {
        create_or_update(
            current.keycloak_discovery_service.as_ref(),
            || model::keycloak_discovery_service(cr),
            |s| model::keycloak_discovery_service_reconciled(cr, s),
            "Keycloak discovery service",
        )
    }

    fn deployment(&self, current: &ClusterState, cr: &Keycloak) -> Option<ClusterAction> {
        let db_secret = current.database_secret.as_ref();
        create_or_update(
            current.keycloak_deployment.as_ref(),
            || model::keycloak_deployment(cr, db_secret, &self.profiles),
            |d| model::keycloak_deployment_reconciled(cr, d, db_secret, &self.profiles),
            "Keycloak deployment",
        )
    }

    fn pod_disruption_budget(
        &self,
        current: &ClusterState,
        cr: &Keycloak,
    ) -> Option<ClusterAction> {
        if !cr.spec.pod_disruption_budget.enabled {
            return None;
        }
        create_or_update(
            current.pod_disruption_budget.as_ref(),
            || model::pod_disruption_budget(cr),
            |p| model::pod_disruption_budget_reconciled(cr, p),
            "Keycloak pod disruption budget",
        )
    }

    fn external_access(&self, desired: &mut DesiredState, current: &ClusterState, cr: &Keycloak) {
        if !cr.spec.external_access.enabled {
            return;
        }
        if self.capabilities.route_supported() {
            desired.add_action(create_or_update(
                current.keycloak_route.as_ref(),
                || model::keycloak_route(cr),
                |r| model::keycloak_route_reconciled(cr, r),
                "Keycloak route",
            ));
        } else {
            desired.add_action(create_or_update(
                current.keycloak_ingress.as_ref(),
                || model::keycloak_ingress(cr),
                |i| model::keycloak_ingress_reconciled(cr, i),
                "Keycloak ingress",
            ));
        }
    }
}
