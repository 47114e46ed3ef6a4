//! Keycloak Controller
//!
//! Reconciles Keycloak custom resources into the StatefulSet, services,
//! secrets, monitoring objects and external access that run one Keycloak
//! installation.

use crate::action::{ActionRunner, DesiredState};
use crate::capabilities::CapabilityStore;
use crate::cluster::{ClusterClient, KubeClusterClient};
use crate::conditions::pass_conditions;
use crate::controllers::{error_policy_backoff, watched_api};
use crate::crd::{Keycloak, KeycloakStatus, StatusPhase};
use crate::error::{OperatorError, Result};
use crate::model::{self, ProfileManager};
use crate::reconcilers::KeycloakReconciler;
use crate::state::ClusterState;
use chrono::Utc;
use futures::StreamExt;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher::Config;
use kube::{Client, ResourceExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const READY_REQUEUE: Duration = Duration::from_secs(60);
const CONVERGING_REQUEUE: Duration = Duration::from_secs(10);

/// Context for the Keycloak controller
pub struct KeycloakController {
    client: Client,
    cluster: KubeClusterClient,
    capabilities: Arc<dyn CapabilityStore>,
    reconciler: KeycloakReconciler,
    namespace: String,
}

/// What one pass found, for the status write.
struct PassOutcome {
    ready: bool,
    external_url: String,
}

impl KeycloakController {
    pub fn new(
        client: Client,
        capabilities: Arc<dyn CapabilityStore>,
        profiles: ProfileManager,
        namespace: &str,
    ) -> Self {
        Self {
            cluster: KubeClusterClient::new(client.clone()),
            reconciler: KeycloakReconciler::new(capabilities.clone(), profiles),
            client,
            capabilities,
            namespace: namespace.to_string(),
        }
    }

    /// Run the Keycloak controller
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let keycloaks: Api<Keycloak> = watched_api(self.client.clone(), &self.namespace);

        info!("Starting Keycloak controller");

        Controller::new(keycloaks, Config::default())
            .shutdown_on_signal()
            .run(
                |kc, ctx| async move { ctx.reconcile(kc).await },
                |kc, error, ctx| {
                    error!(error = %error, "Reconciliation error");
                    error_policy_backoff(kc, error, ctx)
                },
                Arc::clone(&self),
            )
            .for_each(|result| async move {
                match result {
                    Ok((obj, _action)) => info!(keycloak = %obj.name, "Reconciled Keycloak"),
                    Err(e) => error!("Reconciliation failed: {:?}", e),
                }
            })
            .await;

        Ok(())
    }

    /// Reconcile a Keycloak
    async fn reconcile(&self, kc: Arc<Keycloak>) -> Result<Action> {
        let mut cr = (*kc).clone();
        info!(
            namespace = %cr.namespace_or_default(),
            name = %cr.name_any(),
            "Reconciling Keycloak"
        );

        match self.converge(&mut cr).await {
            Ok(outcome) => {
                let status = keycloak_status(&cr, outcome.ready, None, outcome.external_url);
                self.patch_status(&cr, status).await?;
                if outcome.ready {
                    Ok(Action::requeue(READY_REQUEUE))
                } else {
                    Ok(Action::requeue(CONVERGING_REQUEUE))
                }
            }
            Err(e) => {
                warn!(name = %cr.name_any(), error = %e, "Keycloak pass failed");
                let status = keycloak_status(&cr, false, Some(&e.to_string()), String::new());
                if let Err(status_err) = self.patch_status(&cr, status).await {
                    error!(error = %status_err, "Failed to write failure status");
                }
                Err(e)
            }
        }
    }

    /// Read, plan and apply. External installations are only reported on, and
    /// unmanaged ones are read and planned but never written to.
    async fn converge(&self, cr: &mut Keycloak) -> Result<PassOutcome> {
        if cr.spec.external.enabled {
            return Ok(PassOutcome {
                ready: true,
                external_url: cr.spec.external.url.clone().unwrap_or_default(),
            });
        }

        let state = ClusterState::read(&self.cluster, self.capabilities.as_ref(), cr).await?;
        let desired = self.reconciler.reconcile(&state, cr);
        apply_plan(&self.cluster, cr, &desired).await?;

        Ok(PassOutcome {
            ready: state.is_resources_ready(cr, self.capabilities.as_ref()),
            external_url: external_url(&state),
        })
    }

    async fn patch_status(&self, cr: &Keycloak, status: KeycloakStatus) -> Result<()> {
        let keycloaks: Api<Keycloak> =
            Api::namespaced(self.client.clone(), &cr.namespace_or_default());
        let patch = serde_json::json!({ "status": status });
        keycloaks
            .patch_status(&cr.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| OperatorError::KubeApi(e.to_string()))?;
        Ok(())
    }
}

/// Run the plan unless the installation is unmanaged. Returns whether it ran.
async fn apply_plan<C: ClusterClient>(
    cluster: &C,
    cr: &Keycloak,
    desired: &DesiredState,
) -> Result<bool> {
    if cr.spec.unmanaged {
        debug!(
            name = %cr.name_any(),
            steps = desired.len(),
            "Keycloak is unmanaged, plan not applied"
        );
        return Ok(false);
    }
    ActionRunner::new(cluster).run(desired).await?;
    Ok(true)
}

/// Public URL from whichever external access object the snapshot holds.
fn external_url(state: &ClusterState) -> String {
    let route_host = state
        .keycloak_route
        .as_ref()
        .and_then(|r| r.spec.host.clone());
    let ingress_host = state.keycloak_ingress.as_ref().and_then(|i| {
        i.spec
            .as_ref()?
            .rules
            .as_ref()?
            .first()?
            .host
            .clone()
    });
    route_host
        .or(ingress_host)
        .filter(|h| !h.is_empty())
        .map(|h| format!("https://{}", h))
        .unwrap_or_default()
}

/// Status for one pass. Secondary resources recorded by the reader are kept.
fn keycloak_status(
    cr: &Keycloak,
    ready: bool,
    error: Option<&str>,
    external_url: String,
) -> KeycloakStatus {
    let previous = cr.status.clone().unwrap_or_default();
    let (phase, message) = match error {
        Some(message) => (StatusPhase::Failing, message.to_string()),
        None if ready => (StatusPhase::Reconciling, String::new()),
        None => (
            StatusPhase::Initialising,
            "waiting for resources to become ready".to_string(),
        ),
    };

    let internal_url = if cr.spec.external.enabled {
        cr.spec.external.url.clone().unwrap_or_default()
    } else {
        format!(
            "https://{}.{}.svc:{}",
            model::KEYCLOAK_DEPLOYMENT_NAME,
            cr.namespace_or_default(),
            model::KEYCLOAK_HTTPS_PORT
        )
    };

    KeycloakStatus {
        phase,
        message,
        ready: ready && error.is_none(),
        secondary_resources: previous.secondary_resources,
        version: previous.version,
        internal_url,
        external_url: if external_url.is_empty() {
            previous.external_url
        } else {
            external_url
        },
        credential_secret: format!("credential-{}", cr.name_any()),
        conditions: pass_conditions(previous.conditions, ready, error)
            .into_iter()
            .map(|c| c.into_keycloak_condition())
            .collect(),
        observed_generation: cr.metadata.generation,
        last_updated: Some(Utc::now().to_rfc3339()),
    }
}
