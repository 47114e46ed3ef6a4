//! Controllers for the Keycloak Kubernetes Operator
//!
//! Each controller watches its custom resource and runs one reconciliation
//! pass per event: read a snapshot, plan, apply the plan, write status.

mod keycloak;
mod realm;

pub use keycloak::KeycloakController;
pub use realm::KeycloakRealmController;

use std::sync::Arc;

use kube::api::Api;
use kube::runtime::controller::Action;
use kube::Client;
use tracing::warn;

use crate::cluster::ManagedResource;
use crate::error::OperatorError;

/// Requeue a failed pass after the delay the error suggests.
pub(crate) fn error_policy_backoff<K, C>(
    _obj: Arc<K>,
    error: &OperatorError,
    _ctx: Arc<C>,
) -> Action {
    let delay = error.requeue_delay();
    warn!(error = %error, delay_secs = delay.as_secs(), "Requeueing after failure");
    Action::requeue(delay)
}

/// All namespaces when `namespace` is empty.
pub(crate) fn watched_api<K: ManagedResource>(client: Client, namespace: &str) -> Api<K> {
    if namespace.is_empty() {
        Api::all(client)
    } else {
        Api::namespaced(client, namespace)
    }
}
