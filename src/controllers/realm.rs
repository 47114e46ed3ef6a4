//! KeycloakRealm Controller
//!
//! Reconciles KeycloakRealm custom resources into every Keycloak instance
//! their selector matches, through the Keycloak admin API.

use crate::action::ActionRunner;
use crate::cluster::{ClusterClient, KubeClusterClient};
use crate::conditions::{pass_conditions, REALM_FINALIZER};
use crate::controllers::{error_policy_backoff, watched_api};
use crate::crd::{Keycloak, KeycloakRealm, KeycloakRealmStatus, StatusPhase};
use crate::error::{OperatorError, Result};
use crate::keycloak::KeycloakClientFactory;
use crate::reconcilers::KeycloakRealmReconciler;
use crate::state::RealmState;
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
const WAITING_REQUEUE: Duration = Duration::from_secs(10);

/// Context for the realm controller
pub struct KeycloakRealmController {
    client: Client,
    cluster: KubeClusterClient,
    factory: KeycloakClientFactory,
    namespace: String,
}

/// Result of applying one realm to the matching instances.
#[derive(Debug, PartialEq)]
enum PassOutcome {
    /// Applied everywhere. Carries the login URL of the last instance.
    Applied { login_url: String },
    /// Some instance is not ready yet or none matched.
    Waiting(String),
}

impl KeycloakRealmController {
    pub fn new(client: Client, factory: KeycloakClientFactory, namespace: &str) -> Self {
        Self {
            cluster: KubeClusterClient::new(client.clone()),
            client,
            factory,
            namespace: namespace.to_string(),
        }
    }

    /// Run the realm controller
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let realms: Api<KeycloakRealm> = watched_api(self.client.clone(), &self.namespace);

        info!("Starting KeycloakRealm controller");

        Controller::new(realms, Config::default())
            .shutdown_on_signal()
            .run(
                |realm, ctx| async move { ctx.reconcile(realm).await },
                |realm, error, ctx| {
                    error!(error = %error, "Reconciliation error");
                    error_policy_backoff(realm, error, ctx)
                },
                Arc::clone(&self),
            )
            .for_each(|result| async move {
                match result {
                    Ok((obj, _action)) => info!(realm = %obj.name, "Reconciled KeycloakRealm"),
                    Err(e) => error!("Reconciliation failed: {:?}", e),
                }
            })
            .await;

        Ok(())
    }

    /// Reconcile a KeycloakRealm
    async fn reconcile(&self, realm: Arc<KeycloakRealm>) -> Result<Action> {
        let namespace = realm.namespace().unwrap_or_else(|| "default".to_string());
        info!(namespace = %namespace, name = %realm.name_any(), "Reconciling KeycloakRealm");

        if realm.spec.unmanaged {
            if realm.is_tombstoned() {
                if releases_stale_finalizer(&realm) {
                    self.remove_finalizer(&realm, &namespace).await?;
                }
                return Ok(Action::await_change());
            }
            debug!(name = %realm.name_any(), "Realm is unmanaged, skipping");
            let outcome = PassOutcome::Waiting("realm is unmanaged".to_string());
            self.patch_status(&realm, realm_status(&realm, &outcome, None))
                .await?;
            return Ok(Action::await_change());
        }

        if !realm.is_tombstoned() {
            self.ensure_finalizer(&realm, &namespace).await?;
        }

        match self.converge(&realm, &namespace).await {
            Ok(PassOutcome::Applied { .. }) if realm.is_tombstoned() => {
                self.remove_finalizer(&realm, &namespace).await?;
                Ok(Action::await_change())
            }
            Ok(outcome) => {
                self.patch_status(&realm, realm_status(&realm, &outcome, None))
                    .await?;
                match outcome {
                    PassOutcome::Applied { .. } => Ok(Action::requeue(READY_REQUEUE)),
                    PassOutcome::Waiting(_) => Ok(Action::requeue(WAITING_REQUEUE)),
                }
            }
            Err(e) => {
                warn!(name = %realm.name_any(), error = %e, "Realm pass failed");
                let failed = PassOutcome::Waiting(String::new());
                if let Err(status_err) = self
                    .patch_status(&realm, realm_status(&realm, &failed, Some(&e.to_string())))
                    .await
                {
                    error!(error = %status_err, "Failed to write failure status");
                }
                Err(e)
            }
        }
    }

    /// Apply the realm to every selected Keycloak, in listing order.
    async fn converge(&self, realm: &KeycloakRealm, namespace: &str) -> Result<PassOutcome> {
        let selector = realm.spec.instance_selector.to_label_selector();
        let keycloaks: Vec<Keycloak> = self.cluster.list(namespace, &selector).await?;

        if keycloaks.is_empty() {
            if realm.is_tombstoned() {
                return Ok(PassOutcome::Applied {
                    login_url: String::new(),
                });
            }
            return Ok(PassOutcome::Waiting(format!(
                "no Keycloak instance matches selector '{}'",
                selector
            )));
        }

        let mut login_url = String::new();
        for keycloak in keycloaks {
            match instance_step(realm, &keycloak) {
                InstanceStep::Apply => {}
                InstanceStep::Skip => {
                    info!(
                        keycloak = %keycloak.name_any(),
                        "Keycloak is being deleted, skipping realm removal"
                    );
                    continue;
                }
                InstanceStep::Wait(reason) => return Ok(PassOutcome::Waiting(reason)),
            }

            let api = self.factory.authenticated_client(&self.cluster, &keycloak).await?;
            let state = RealmState::read(&api, &self.cluster, realm, &keycloak).await?;
            let desired = KeycloakRealmReconciler::new(keycloak.clone()).reconcile(&state, realm);
            ActionRunner::new(&self.cluster)
                .with_keycloak(&api)
                .run(&desired)
                .await?;

            login_url = login_url_for(api.endpoint(), realm.realm_name());
        }

        Ok(PassOutcome::Applied { login_url })
    }

    async fn ensure_finalizer(&self, realm: &KeycloakRealm, namespace: &str) -> Result<()> {
        if has_finalizer(realm) {
            return Ok(());
        }

        let mut updated = realm.finalizers().to_vec();
        updated.push(REALM_FINALIZER.to_string());
        self.patch_finalizers(realm, namespace, updated).await
    }

    async fn remove_finalizer(&self, realm: &KeycloakRealm, namespace: &str) -> Result<()> {
        let remaining: Vec<String> = realm
            .finalizers()
            .iter()
            .filter(|f| f.as_str() != REALM_FINALIZER)
            .cloned()
            .collect();
        self.patch_finalizers(realm, namespace, remaining).await?;
        info!(namespace = %namespace, name = %realm.name_any(), "Finalizer removed");
        Ok(())
    }

    async fn patch_finalizers(
        &self,
        realm: &KeycloakRealm,
        namespace: &str,
        finalizers: Vec<String>,
    ) -> Result<()> {
        let realms: Api<KeycloakRealm> = Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({
            "metadata": {
                "finalizers": finalizers
            }
        });
        realms
            .patch(&realm.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| OperatorError::KubeApi(e.to_string()))?;
        Ok(())
    }

    async fn patch_status(&self, realm: &KeycloakRealm, status: KeycloakRealmStatus) -> Result<()> {
        let namespace = realm.namespace().unwrap_or_else(|| "default".to_string());
        let realms: Api<KeycloakRealm> = Api::namespaced(self.client.clone(), &namespace);
        let patch = serde_json::json!({ "status": status });
        realms
            .patch_status(&realm.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| OperatorError::KubeApi(e.to_string()))?;
        Ok(())
    }
}

fn has_finalizer(realm: &KeycloakRealm) -> bool {
    realm.finalizers().iter().any(|f| f == REALM_FINALIZER)
}

/// A realm switched to unmanaged after the finalizer was added is deleted
/// without touching Keycloak.
fn releases_stale_finalizer(realm: &KeycloakRealm) -> bool {
    realm.is_tombstoned() && has_finalizer(realm)
}

/// What a pass does with one matched Keycloak.
#[derive(Debug, PartialEq)]
enum InstanceStep {
    Apply,
    /// The instance is going away together with its realms.
    Skip,
    /// Not usable yet. The pass requeues and, for a deleted realm, keeps the finalizer.
    Wait(String),
}

fn instance_step(realm: &KeycloakRealm, keycloak: &Keycloak) -> InstanceStep {
    match unusable_reason(keycloak) {
        None => InstanceStep::Apply,
        Some(_) if realm.is_tombstoned() && keycloak.metadata.deletion_timestamp.is_some() => {
            InstanceStep::Skip
        }
        Some(reason) => InstanceStep::Wait(reason),
    }
}

/// Why a Keycloak cannot take realm changes right now.
fn unusable_reason(keycloak: &Keycloak) -> Option<String> {
    if keycloak.spec.external.enabled {
        return None;
    }
    let ready = keycloak.status.as_ref().is_some_and(|s| s.ready);
    if ready {
        None
    } else {
        Some(format!("Keycloak {} is not ready", keycloak.name_any()))
    }
}

fn login_url_for(endpoint: &str, realm: &str) -> String {
    format!("{}/auth/realms/{}/account", endpoint.trim_end_matches('/'), realm)
}

fn realm_status(
    realm: &KeycloakRealm,
    outcome: &PassOutcome,
    error: Option<&str>,
) -> KeycloakRealmStatus {
    let previous = realm.status.clone().unwrap_or_default();
    let ready = matches!(outcome, PassOutcome::Applied { .. });

    let (phase, message, login_url) = match (error, outcome) {
        (Some(message), _) => (StatusPhase::Failing, message.to_string(), previous.login_url),
        (None, PassOutcome::Applied { login_url }) => {
            (StatusPhase::Reconciling, String::new(), login_url.clone())
        }
        (None, PassOutcome::Waiting(reason)) => {
            (StatusPhase::Initialising, reason.clone(), previous.login_url)
        }
    };

    KeycloakRealmStatus {
        phase,
        message,
        ready: ready && error.is_none(),
        login_url,
        conditions: pass_conditions(previous.conditions, ready, error)
            .into_iter()
            .map(|c| c.into_realm_condition())
            .collect(),
        observed_generation: realm.metadata.generation,
        last_updated: Some(Utc::now().to_rfc3339()),
    }
}
