//! Custom Resource Definitions for the Keycloak Kubernetes Operator
//!
//! Defines the CRDs that the operator manages:
//! - Keycloak: A Keycloak installation
//! - KeycloakRealm: A realm configured inside one or more installations
//!
//! plus the admin API representations embedded in them and the third-party
//! kinds (Route, ServiceMonitor, PrometheusRule, GrafanaDashboard) the operator
//! creates when the cluster serves them.

pub mod api;
mod external;
mod keycloak;
mod realm;

pub use api::{
    AuthenticationExecutionInfo, AuthenticatorConfig, FederatedIdentity, KeycloakApiClient,
    KeycloakApiRealm, KeycloakApiUser, KeycloakCredential, KeycloakIdentityProvider,
    KeycloakRealmGroup, KeycloakUserRole, PasswordReset, TokenResponse, UserFederationProvider,
};
pub use external::{
    GrafanaDashboard, GrafanaDashboardSpec, MonitorLabelSelector, PrometheusRule,
    PrometheusRuleSpec, Route, RouteIngress, RouteIngressCondition, RoutePort, RouteSpec,
    RouteStatus, RouteTargetReference, RouteTls, Rule, RuleGroup, ServiceMonitor,
    ServiceMonitorEndpoint, ServiceMonitorSpec,
};
pub use keycloak::{
    EnvVar, Keycloak, KeycloakCondition, KeycloakDeploymentSpec, KeycloakExternal,
    KeycloakExternalAccess, KeycloakExternalDatabase, KeycloakSpec, KeycloakStatus,
    PodDisruptionBudgetConfig, ResourceList, ResourceRequirements, StatusPhase,
};
pub use realm::{
    InstanceSelector, KeycloakRealm, KeycloakRealmSpec, KeycloakRealmStatus, RealmCondition,
    RedirectorIdentityProviderOverride,
};
