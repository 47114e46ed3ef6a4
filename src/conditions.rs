//! Kubernetes-standard status condition helpers
//!
//! Provides constants and builder functions for the conditions written to
//! `Keycloak` and `KeycloakRealm` status, following the Kubernetes API
//! conventions.

use chrono::Utc;

use crate::crd::{KeycloakCondition, RealmCondition};

// Condition status values
pub const CONDITION_TRUE: &str = "True";
pub const CONDITION_FALSE: &str = "False";
pub const CONDITION_UNKNOWN: &str = "Unknown";

// Condition types shared by both kinds
pub const CONDITION_READY: &str = "Ready";
pub const CONDITION_RECONCILED: &str = "Reconciled";

// Finalizer names
pub const REALM_FINALIZER: &str = "keycloak.org/realm-cleanup";

/// Build a condition with the current timestamp.
pub fn build_condition(
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) -> ConditionFields {
    ConditionFields {
        condition_type: condition_type.to_string(),
        status: status.to_string(),
        last_transition_time: Some(Utc::now().to_rfc3339()),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
    }
}

/// Generic condition fields that can be converted into any CRD-specific condition type.
#[derive(Debug, Clone)]
pub struct ConditionFields {
    pub condition_type: String,
    pub status: String,
    pub last_transition_time: Option<String>,
    pub reason: Option<String>,
    pub message: Option<String>,
}

impl ConditionFields {
    pub fn into_keycloak_condition(self) -> KeycloakCondition {
        KeycloakCondition {
            r#type: self.condition_type,
            status: self.status,
            last_transition_time: self.last_transition_time,
            reason: self.reason,
            message: self.message,
        }
    }

    pub fn into_realm_condition(self) -> RealmCondition {
        RealmCondition {
            r#type: self.condition_type,
            status: self.status,
            last_transition_time: self.last_transition_time,
            reason: self.reason,
            message: self.message,
        }
    }
}

impl From<KeycloakCondition> for ConditionFields {
    fn from(c: KeycloakCondition) -> Self {
        Self {
            condition_type: c.r#type,
            status: c.status,
            last_transition_time: c.last_transition_time,
            reason: c.reason,
            message: c.message,
        }
    }
}

impl From<RealmCondition> for ConditionFields {
    fn from(c: RealmCondition) -> Self {
        Self {
            condition_type: c.r#type,
            status: c.status,
            last_transition_time: c.last_transition_time,
            reason: c.reason,
            message: c.message,
        }
    }
}

/// Set or update a condition in a list, preserving lastTransitionTime when status hasn't changed.
pub fn set_condition(conditions: &mut Vec<ConditionFields>, new: ConditionFields) {
    if let Some(existing) = conditions
        .iter_mut()
        .find(|c| c.condition_type == new.condition_type)
    {
        if existing.status != new.status {
            *existing = new;
        } else {
            existing.reason = new.reason;
            existing.message = new.message;
        }
    } else {
        conditions.push(new);
    }
}

/// Ready and Reconciled conditions for one pass, merged into `previous`.
///
/// `error` is the failure of the pass, if any. A failed pass is never ready.
pub fn pass_conditions<T: Into<ConditionFields>>(
    previous: Vec<T>,
    ready: bool,
    error: Option<&str>,
) -> Vec<ConditionFields> {
    let mut conditions: Vec<ConditionFields> = previous.into_iter().map(Into::into).collect();

    let reconciled = match error {
        Some(message) => build_condition(
            CONDITION_RECONCILED,
            CONDITION_FALSE,
            "ReconcileFailed",
            message,
        ),
        None => build_condition(
            CONDITION_RECONCILED,
            CONDITION_TRUE,
            "ReconcileSucceeded",
            "all actions applied",
        ),
    };
    set_condition(&mut conditions, reconciled);

    let readiness = if error.is_some() {
        build_condition(CONDITION_READY, CONDITION_UNKNOWN, "ReconcileFailed", "last pass failed")
    } else if ready {
        build_condition(CONDITION_READY, CONDITION_TRUE, "ResourcesReady", "all resources ready")
    } else {
        build_condition(
            CONDITION_READY,
            CONDITION_FALSE,
            "ResourcesNotReady",
            "waiting for resources to become ready",
        )
    };
    set_condition(&mut conditions, readiness);

    conditions
}
