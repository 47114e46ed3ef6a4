//! Action planners
//!
//! Planners are pure: they look at a state snapshot and a custom resource and
//! return the ordered steps that would converge one onto the other.

mod groups;
mod keycloak;
mod realm;

pub use groups::{plan_group_sync, GroupOp};
pub use keycloak::KeycloakReconciler;
pub use realm::KeycloakRealmReconciler;
