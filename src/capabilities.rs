//! Capability flags
//!
//! Records whether optional resource kinds (monitoring CRDs, OpenShift routes)
//! are served by the cluster. A flag is written by the discovery probe and read
//! by every reconciliation pass. An unknown flag reads as `false`.

use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

use kube::discovery::Discovery;
use kube::Client;
use tracing::{debug, info};

use crate::error::Result;

/// Subsystem name used by the Keycloak controller for its monitoring flags.
pub const KEYCLOAK_SUBSYSTEM: &str = "keycloak-controller";
/// Subsystem name for cluster-wide flavour flags.
pub const CLUSTER_SUBSYSTEM: &str = "cluster";

pub const SERVICE_MONITOR_KIND: &str = "ServiceMonitor";
pub const PROMETHEUS_RULE_KIND: &str = "PrometheusRule";
pub const GRAFANA_DASHBOARD_KIND: &str = "GrafanaDashboard";
pub const ROUTE_KIND: &str = "Route";

const MONITORING_GROUP: &str = "monitoring.coreos.com";
const GRAFANA_GROUP: &str = "integreatly.org";
const ROUTE_GROUP: &str = "route.openshift.io";

/// Composite key `subsystem + kind`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CapabilityKey {
    subsystem: String,
    kind: String,
}

impl CapabilityKey {
    pub fn new(subsystem: &str, kind: &str) -> Self {
        Self {
            subsystem: subsystem.to_string(),
            kind: kind.to_string(),
        }
    }

    /// Monitoring kind watched by the Keycloak controller.
    pub fn monitoring(kind: &str) -> Self {
        Self::new(KEYCLOAK_SUBSYSTEM, kind)
    }

    /// The cluster serves `route.openshift.io/Route`.
    pub fn route() -> Self {
        Self::new(CLUSTER_SUBSYSTEM, ROUTE_KIND)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }
}

impl fmt::Display for CapabilityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-watch-{}", self.subsystem, self.kind)
    }
}

/// Keyed boolean flag store shared by reconciliation passes.
pub trait CapabilityStore: Send + Sync {
    /// Raw lookup; `None` means the probe never ran for this key.
    fn lookup(&self, key: &CapabilityKey) -> Option<bool>;

    fn set(&self, key: CapabilityKey, value: bool);

    /// Fail-safe read: unknown is unsupported.
    fn get(&self, key: &CapabilityKey) -> bool {
        self.lookup(key).unwrap_or(false)
    }

    fn route_supported(&self) -> bool {
        self.get(&CapabilityKey::route())
    }
}

/// In-memory capability store.
#[derive(Debug, Default)]
pub struct CapabilityCache {
    flags: RwLock<HashMap<CapabilityKey, bool>>,
}

impl CapabilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn clear(&self) {
        self.flags
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl CapabilityStore for CapabilityCache {
    fn lookup(&self, key: &CapabilityKey) -> Option<bool> {
        self.flags
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
    }

    fn set(&self, key: CapabilityKey, value: bool) {
        self.flags
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value);
    }
}

/// Kinds probed on every discovery run, with the API group that serves them.
fn probed_kinds() -> [(CapabilityKey, &'static str); 4] {
    [
        (CapabilityKey::monitoring(PROMETHEUS_RULE_KIND), MONITORING_GROUP),
        (CapabilityKey::monitoring(SERVICE_MONITOR_KIND), MONITORING_GROUP),
        (CapabilityKey::monitoring(GRAFANA_DASHBOARD_KIND), GRAFANA_GROUP),
        (CapabilityKey::route(), ROUTE_GROUP),
    ]
}

/// Walk API discovery and record which optional kinds are served.
pub async fn probe_capabilities(client: Client, store: &dyn CapabilityStore) -> Result<()> {
    let discovery = Discovery::new(client).run().await?;

    for (key, group) in probed_kinds() {
        let served = discovery
            .get(group)
            .and_then(|g| g.recommended_kind(key.kind()))
            .is_some();
        debug!(capability = %key, served, "Probed capability");
        store.set(key, served);
    }

    info!("Capability probe complete");
    Ok(())
}
