//! Planned actions and their executor
//!
//! Planners return a [`DesiredState`], an ordered list of [`ClusterAction`]s.
//! Nothing in this list has happened yet; [`ActionRunner`] applies it.

use std::fmt;

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kube::{Resource, ResourceExt};
use tracing::{debug, error, info};

use crate::cluster::ClusterClient;
use crate::crd::{GrafanaDashboard, KeycloakRealm, PrometheusRule, Route, ServiceMonitor};
use crate::error::{OperatorError, Result};
use crate::keycloak::KeycloakApi;

/// Every object kind the operator writes to the cluster.
#[derive(Debug, Clone)]
#[allow(clippy::large_enum_variant)]
pub enum ManagedObject {
    Secret(Secret),
    ConfigMap(ConfigMap),
    Service(Service),
    PersistentVolumeClaim(PersistentVolumeClaim),
    Deployment(Deployment),
    StatefulSet(StatefulSet),
    PodDisruptionBudget(PodDisruptionBudget),
    Ingress(Ingress),
    Route(Route),
    ServiceMonitor(ServiceMonitor),
    PrometheusRule(PrometheusRule),
    GrafanaDashboard(GrafanaDashboard),
}

/// Run `$body` with `$obj` bound to the typed object inside a [`ManagedObject`].
macro_rules! with_object {
    ($managed:expr, $obj:ident => $body:expr) => {
        match $managed {
            ManagedObject::Secret($obj) => $body,
            ManagedObject::ConfigMap($obj) => $body,
            ManagedObject::Service($obj) => $body,
            ManagedObject::PersistentVolumeClaim($obj) => $body,
            ManagedObject::Deployment($obj) => $body,
            ManagedObject::StatefulSet($obj) => $body,
            ManagedObject::PodDisruptionBudget($obj) => $body,
            ManagedObject::Ingress($obj) => $body,
            ManagedObject::Route($obj) => $body,
            ManagedObject::ServiceMonitor($obj) => $body,
            ManagedObject::PrometheusRule($obj) => $body,
            ManagedObject::GrafanaDashboard($obj) => $body,
        }
    };
}

impl ManagedObject {
    pub fn kind(&self) -> String {
        fn kind_of<K: Resource<DynamicType = ()>>(_: &K) -> String {
            K::kind(&()).to_string()
        }
        with_object!(self, obj => kind_of(obj))
    }

    pub fn name(&self) -> String {
        with_object!(self, obj => obj.name_any())
    }

    pub fn resource_version(&self) -> Option<String> {
        with_object!(self, obj => obj.resource_version())
    }

    async fn create<C: ClusterClient>(&self, cluster: &C) -> Result<()> {
        with_object!(self, obj => cluster.create(obj).await)
    }

    async fn update<C: ClusterClient>(&self, cluster: &C) -> Result<()> {
        with_object!(self, obj => cluster.update(obj).await)
    }

    async fn delete<C: ClusterClient>(&self, cluster: &C) -> Result<()> {
        with_object!(self, obj => cluster.delete(obj).await)
    }
}

macro_rules! managed_from {
    ($($kind:ident),* $(,)?) => {
        $(
            impl From<$kind> for ManagedObject {
                fn from(obj: $kind) -> Self {
                    ManagedObject::$kind(obj)
                }
            }
        )*
    };
}

managed_from!(
    Secret,
    ConfigMap,
    Service,
    PersistentVolumeClaim,
    Deployment,
    StatefulSet,
    PodDisruptionBudget,
    Ingress,
    Route,
    ServiceMonitor,
    PrometheusRule,
    GrafanaDashboard,
);

/// One step of a plan. Cluster variants go through [`ClusterClient`], the
/// rest through the Keycloak admin API.
///
/// `Update` carries the object as it was in the snapshot when the planner
/// had one, next to the reconciled object that will be written.
#[derive(Debug, Clone)]
pub enum ClusterAction {
    Create {
        object: ManagedObject,
        msg: String,
    },
    Update {
        object: ManagedObject,
        previous: Option<Box<ManagedObject>>,
        msg: String,
    },
    Delete { object: ManagedObject, msg: String },
    Ping { msg: String },
    CreateRealm { realm: Box<KeycloakRealm>, msg: String },
    DeleteRealm { realm: Box<KeycloakRealm>, msg: String },
    ConfigureRealm { realm: Box<KeycloakRealm>, msg: String },
    UpdateRealmGroups { realm: Box<KeycloakRealm>, msg: String },
    UpdateRealm { realm: Box<KeycloakRealm>, msg: String },
}

impl ClusterAction {
    pub fn create(object: impl Into<ManagedObject>, msg: impl Into<String>) -> Self {
        ClusterAction::Create {
            object: object.into(),
            msg: msg.into(),
        }
    }

    pub fn update(object: impl Into<ManagedObject>, msg: impl Into<String>) -> Self {
        ClusterAction::Update {
            object: object.into(),
            previous: None,
            msg: msg.into(),
        }
    }

    /// Attach the snapshot object an `Update` replaces. Other variants are unchanged.
    pub fn with_previous(mut self, current: impl Into<ManagedObject>) -> Self {
        if let ClusterAction::Update { previous, .. } = &mut self {
            *previous = Some(Box::new(current.into()));
        }
        self
    }

    /// Snapshot object an `Update` was planned against.
    pub fn previous(&self) -> Option<&ManagedObject> {
        match self {
            ClusterAction::Update { previous, .. } => previous.as_deref(),
            _ => None,
        }
    }

    pub fn delete(object: impl Into<ManagedObject>, msg: impl Into<String>) -> Self {
        ClusterAction::Delete {
            object: object.into(),
            msg: msg.into(),
        }
    }

    /// Human readable description attached by the planner.
    pub fn msg(&self) -> &str {
        match self {
            ClusterAction::Create { msg, .. }
            | ClusterAction::Update { msg, .. }
            | ClusterAction::Delete { msg, .. }
            | ClusterAction::Ping { msg }
            | ClusterAction::CreateRealm { msg, .. }
            | ClusterAction::DeleteRealm { msg, .. }
            | ClusterAction::ConfigureRealm { msg, .. }
            | ClusterAction::UpdateRealmGroups { msg, .. }
            | ClusterAction::UpdateRealm { msg, .. } => msg,
        }
    }

    pub fn needs_keycloak(&self) -> bool {
        !matches!(
            self,
            ClusterAction::Create { .. }
                | ClusterAction::Update { .. }
                | ClusterAction::Delete { .. }
        )
    }
}

/// Short form used in logs and test assertions, e.g. `Create Secret credential-sso`.
impl fmt::Display for ClusterAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterAction::Create { object, .. } => {
                write!(f, "Create {} {}", object.kind(), object.name())
            }
            ClusterAction::Update { object, .. } => {
                write!(f, "Update {} {}", object.kind(), object.name())
            }
            ClusterAction::Delete { object, .. } => {
                write!(f, "Delete {} {}", object.kind(), object.name())
            }
            ClusterAction::Ping { .. } => write!(f, "Ping"),
            ClusterAction::CreateRealm { realm, .. } => {
                write!(f, "CreateRealm {}", realm.realm_name())
            }
            ClusterAction::DeleteRealm { realm, .. } => {
                write!(f, "DeleteRealm {}", realm.realm_name())
            }
            ClusterAction::ConfigureRealm { realm, .. } => {
                write!(f, "ConfigureRealm {}", realm.realm_name())
            }
            ClusterAction::UpdateRealmGroups { realm, .. } => {
                write!(f, "UpdateRealmGroups {}", realm.realm_name())
            }
            ClusterAction::UpdateRealm { realm, .. } => {
                write!(f, "UpdateRealm {}", realm.realm_name())
            }
        }
    }
}

/// Ordered plan produced by one planner run.
#[derive(Debug, Clone, Default)]
pub struct DesiredState {
    actions: Vec<ClusterAction>,
}

impl DesiredState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step. `None` means the planner decided to skip it.
    pub fn add_action(&mut self, action: Option<ClusterAction>) -> &mut Self {
        if let Some(action) = action {
            self.actions.push(action);
        }
        self
    }

    pub fn actions(&self) -> &[ClusterAction] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// `Display` form of every step, in order.
    pub fn summary(&self) -> Vec<String> {
        self.actions.iter().map(ToString::to_string).collect()
    }
}

/// Applies a [`DesiredState`] strictly in order, stopping at the first failure.
pub struct ActionRunner<'a, C: ClusterClient> {
    cluster: &'a C,
    keycloak: Option<&'a dyn KeycloakApi>,
}

impl<'a, C: ClusterClient> ActionRunner<'a, C> {
    pub fn new(cluster: &'a C) -> Self {
        Self {
            cluster,
            keycloak: None,
        }
    }

    /// Attach the admin API client realm actions need.
    pub fn with_keycloak(mut self, keycloak: &'a dyn KeycloakApi) -> Self {
        self.keycloak = Some(keycloak);
        self
    }

    pub async fn run(&self, desired: &DesiredState) -> Result<()> {
        for action in desired.actions() {
            if let Err(e) = self.apply(action).await {
                error!(action = %action, error = %e, "Action failed");
                return Err(e);
            }
            info!(action = %action, "{}", action.msg());
        }
        debug!(steps = desired.len(), "Plan applied");
        Ok(())
    }

    fn keycloak(&self, action: &ClusterAction) -> Result<&'a dyn KeycloakApi> {
        self.keycloak.ok_or_else(|| {
            OperatorError::Reconciliation(format!(
                "{} needs a Keycloak client but none is attached",
                action
            ))
        })
    }

    async fn apply(&self, action: &ClusterAction) -> Result<()> {
        match action {
            ClusterAction::Create { object, .. } => object.create(self.cluster).await,
            ClusterAction::Update {
                object, previous, ..
            } => {
                if let Some(previous) = previous {
                    debug!(
                        action = %action,
                        resource_version = ?previous.resource_version(),
                        "Replacing snapshot object"
                    );
                }
                object.update(self.cluster).await
            }
            ClusterAction::Delete { object, .. } => object.delete(self.cluster).await,
            ClusterAction::Ping { .. } => self.keycloak(action)?.ping().await,
            ClusterAction::CreateRealm { realm, .. } => {
                let id = self.keycloak(action)?.create_realm(&realm.spec.realm).await?;
                debug!(realm = %realm.realm_name(), id = %id, "Realm created");
                Ok(())
            }
            ClusterAction::DeleteRealm { realm, .. } => {
                self.keycloak(action)?.delete_realm(realm.realm_name()).await
            }
            ClusterAction::ConfigureRealm { realm, .. } => {
                let api = self.keycloak(action)?;
                for redirect in &realm.spec.realm_overrides {
                    api.configure_browser_redirector(realm.realm_name(), redirect)
                        .await?;
                }
                Ok(())
            }
            ClusterAction::UpdateRealmGroups { realm, .. } => {
                self.keycloak(action)?
                    .update_realm_groups(&realm.spec.realm)
                    .await
            }
            ClusterAction::UpdateRealm { realm, .. } => {
                self.keycloak(action)?.update_realm(&realm.spec.realm).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::testing::FakeClusterClient;
    use crate::cluster::ObjectKey;
    use crate::crd::{KeycloakApiRealm, KeycloakRealmSpec, RedirectorIdentityProviderOverride};
    use crate::keycloak::testing::FakeKeycloak;

    fn config_map(name: &str, value: &str) -> ConfigMap {
        let mut cm = ConfigMap::default();
        cm.metadata.name = Some(name.to_string());
        cm.metadata.namespace = Some("sso".to_string());
        cm.data = Some([("k".to_string(), value.to_string())].into());
        cm
    }

    fn realm(name: &str) -> Box<KeycloakRealm> {
        let mut cr = KeycloakRealm::new(
            name,
            KeycloakRealmSpec {
                unmanaged: false,
                instance_selector: Default::default(),
                realm: KeycloakApiRealm {
                    realm: name.to_string(),
                    ..Default::default()
                },
                realm_overrides: vec![RedirectorIdentityProviderOverride {
                    identity_provider: "github".to_string(),
                    for_flow: "browser".to_string(),
                }],
            },
        );
        cr.metadata.namespace = Some("sso".to_string());
        Box::new(cr)
    }

    #[test]
    fn test_add_action_skips_none() {
        let mut desired = DesiredState::new();
        desired
            .add_action(None)
            .add_action(Some(ClusterAction::Ping { msg: "ping".into() }));
        assert_eq!(desired.len(), 1);
        assert_eq!(desired.summary(), vec!["Ping"]);
    }

    #[test]
    fn test_display_names_kind_and_object() {
        let action = ClusterAction::create(config_map("keycloak-probes", "a"), "create probes");
        assert_eq!(action.to_string(), "Create ConfigMap keycloak-probes");
        assert_eq!(action.msg(), "create probes");
        assert!(!action.needs_keycloak());
    }

    #[test]
    fn test_update_keeps_snapshot_object() {
        let mut live = config_map("keycloak-probes", "old");
        live.metadata.resource_version = Some("12".to_string());
        let action = ClusterAction::update(config_map("keycloak-probes", "new"), "update probes")
            .with_previous(live);

        let previous = action.previous().unwrap();
        assert_eq!(previous.resource_version().as_deref(), Some("12"));
        assert_eq!(action.to_string(), "Update ConfigMap keycloak-probes");

        let create = ClusterAction::create(config_map("a", "1"), "create a")
            .with_previous(config_map("a", "0"));
        assert!(create.previous().is_none());
    }

    #[tokio::test]
    async fn test_runner_applies_cluster_actions_in_order() {
        let cluster = FakeClusterClient::new();
        let mut desired = DesiredState::new();
        desired
            .add_action(Some(ClusterAction::create(config_map("a", "1"), "create a")))
            .add_action(Some(ClusterAction::update(config_map("a", "2"), "update a")))
            .add_action(Some(ClusterAction::create(config_map("b", "1"), "create b")))
            .add_action(Some(ClusterAction::delete(config_map("b", "1"), "delete b")));

        ActionRunner::new(&cluster).run(&desired).await.unwrap();

        assert_eq!(
            cluster.calls(),
            vec![
                "create ConfigMap a",
                "update ConfigMap a",
                "create ConfigMap b",
                "delete ConfigMap b"
            ]
        );
        let stored: ConfigMap = cluster.stored(&ObjectKey::new("a", "sso")).unwrap();
        assert_eq!(stored.data.unwrap()["k"], "2");
        assert!(cluster
            .stored::<ConfigMap>(&ObjectKey::new("b", "sso"))
            .is_none());
    }

    #[tokio::test]
    async fn test_runner_stops_at_first_failure() {
        let cluster = FakeClusterClient::new();
        let mut desired = DesiredState::new();
        desired
            .add_action(Some(ClusterAction::update(config_map("missing", "1"), "update")))
            .add_action(Some(ClusterAction::create(config_map("never", "1"), "create")));

        let err = ActionRunner::new(&cluster).run(&desired).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(cluster.calls(), vec!["update ConfigMap missing"]);
    }

    #[tokio::test]
    async fn test_runner_dispatches_realm_actions() {
        let cluster = FakeClusterClient::new();
        let api = FakeKeycloak::new();
        let cr = realm("basic");
        let mut desired = DesiredState::new();
        desired
            .add_action(Some(ClusterAction::Ping { msg: "ping".into() }))
            .add_action(Some(ClusterAction::CreateRealm {
                realm: cr.clone(),
                msg: "create".into(),
            }))
            .add_action(Some(ClusterAction::ConfigureRealm {
                realm: cr.clone(),
                msg: "configure".into(),
            }))
            .add_action(Some(ClusterAction::UpdateRealmGroups {
                realm: cr.clone(),
                msg: "groups".into(),
            }))
            .add_action(Some(ClusterAction::UpdateRealm {
                realm: cr.clone(),
                msg: "update".into(),
            }))
            .add_action(Some(ClusterAction::DeleteRealm {
                realm: cr,
                msg: "delete".into(),
            }));

        ActionRunner::new(&cluster)
            .with_keycloak(&api)
            .run(&desired)
            .await
            .unwrap();

        assert_eq!(
            api.calls(),
            vec![
                "ping",
                "create_realm basic",
                "configure_browser_redirector basic github",
                "update_realm_groups basic",
                "update_realm basic",
                "delete_realm basic",
            ]
        );
        assert!(cluster.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_keycloak_stops_after_ping() {
        let cluster = FakeClusterClient::new();
        let api = FakeKeycloak::unreachable();
        let mut desired = DesiredState::new();
        desired
            .add_action(Some(ClusterAction::Ping { msg: "ping".into() }))
            .add_action(Some(ClusterAction::CreateRealm {
                realm: realm("basic"),
                msg: "create".into(),
            }));

        let result = ActionRunner::new(&cluster)
            .with_keycloak(&api)
            .run(&desired)
            .await;
        assert!(result.is_err());
        assert_eq!(api.calls(), vec!["ping"]);
    }

    #[tokio::test]
    async fn test_realm_action_without_client_fails() {
        let cluster = FakeClusterClient::new();
        let mut desired = DesiredState::new();
        desired.add_action(Some(ClusterAction::Ping { msg: "ping".into() }));

        let err = ActionRunner::new(&cluster).run(&desired).await.unwrap_err();
        assert!(matches!(err, OperatorError::Reconciliation(_)));
    }
}
