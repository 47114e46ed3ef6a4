//! Planner for one `KeycloakRealm` inside one `Keycloak`

use kube::ResourceExt;

use crate::action::{ClusterAction, DesiredState};
use crate::crd::{Keycloak, KeycloakApiUser, KeycloakRealm};
use crate::model;
use crate::state::RealmState;

pub struct KeycloakRealmReconciler {
    keycloak: Keycloak,
}

impl KeycloakRealmReconciler {
    pub fn new(keycloak: Keycloak) -> Self {
        Self { keycloak }
    }

    pub fn reconcile(&self, state: &RealmState, cr: &KeycloakRealm) -> DesiredState {
        let mut desired = DesiredState::new();

        if cr.is_tombstoned() {
            desired.add_action(Some(ClusterAction::DeleteRealm {
                realm: Box::new(cr.clone()),
                msg: format!("removing realm {}", qualified(cr)),
            }));
            return desired;
        }

        // Nothing else is attempted when Keycloak does not answer.
        desired.add_action(Some(ClusterAction::Ping {
            msg: "check if keycloak is available".to_string(),
        }));
        desired.add_action(create_realm(state, cr));
        for user in &cr.spec.realm.users {
            desired.add_action(self.user_secret(state, cr, user));
        }
        desired.add_action(browser_redirector(state, cr));

        if cr.spec.realm.groups.is_some() {
            desired.add_action(Some(ClusterAction::UpdateRealmGroups {
                realm: Box::new(cr.clone()),
                msg: format!("update realm groups {}", qualified(cr)),
            }));
        }
        if cr.spec.realm.user_federation_providers.is_some() {
            desired.add_action(Some(ClusterAction::UpdateRealm {
                realm: Box::new(cr.clone()),
                msg: format!("update realm {}", qualified(cr)),
            }));
        }

        desired
    }

    fn user_secret(
        &self,
        state: &RealmState,
        cr: &KeycloakRealm,
        user: &KeycloakApiUser,
    ) -> Option<ClusterAction> {
        if state.has_user_secret(&user.username) {
            return None;
        }
        Some(ClusterAction::create(
            model::realm_credential_secret(cr, user, &self.keycloak),
            format!(
                "create credential secret for user {} in realm {}",
                user.username,
                qualified(cr)
            ),
        ))
    }
}

fn qualified(cr: &KeycloakRealm) -> String {
    format!(
        "{}/{}",
        cr.namespace().unwrap_or_default(),
        cr.realm_name()
    )
}

fn create_realm(state: &RealmState, cr: &KeycloakRealm) -> Option<ClusterAction> {
    if state.realm.is_some() {
        return None;
    }
    Some(ClusterAction::CreateRealm {
        realm: Box::new(cr.clone()),
        msg: format!("create realm {}", qualified(cr)),
    })
}

/// Only configured on a brand new realm.
fn browser_redirector(state: &RealmState, cr: &KeycloakRealm) -> Option<ClusterAction> {
    if cr.spec.realm_overrides.is_empty() || state.realm.is_some() {
        return None;
    }
    Some(ClusterAction::ConfigureRealm {
        realm: Box::new(cr.clone()),
        msg: "configure browser redirector".to_string(),
    })
}
