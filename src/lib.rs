//! Keycloak Kubernetes Operator
//!
//! A Kubernetes operator that deploys Keycloak and configures realms inside it.
//!
//! ## Custom Resources
//!
//! - `Keycloak`: Deploys Keycloak as a StatefulSet with its services, secrets,
//!   monitoring objects and external access
//! - `KeycloakRealm`: Creates and manages a realm, its users and groups in every
//!   matching Keycloak
//!
//! Every pass reads a snapshot (`state`), plans an ordered list of actions
//! (`reconcilers`) and applies it (`action`).
//!
//! ## Example
//!
//! ```yaml
//! apiVersion: keycloak.org/v1alpha1
//! kind: Keycloak
//! metadata:
//!   name: sso
//!   labels:
//!     app: sso
//! spec:
//!   instances: 2
//!   externalAccess:
//!     enabled: true
//! ```

pub mod action;
pub mod capabilities;
pub mod cluster;
pub mod conditions;
pub mod controllers;
pub mod crd;
pub mod error;
pub mod keycloak;
pub mod model;
pub mod reconcilers;
pub mod state;

pub use capabilities::{probe_capabilities, CapabilityCache, CapabilityKey, CapabilityStore};
pub use controllers::{KeycloakController, KeycloakRealmController};
pub use crd::{Keycloak, KeycloakRealm, KeycloakRealmSpec, KeycloakSpec};
pub use error::{OperatorError, Result};
