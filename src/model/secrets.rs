//! Admin, database and realm user credential secrets
//!
//! Reconciling a secret only fills in missing or empty values. Existing
//! credentials are never regenerated.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::ResourceExt;

use super::{
    app_labels, generate_random_string, namespace_of, owner_reference, sanitize_resource_name,
    ADMIN_PASSWORD_PROPERTY, ADMIN_USERNAME, ADMIN_USERNAME_PROPERTY, DATABASE_EXTERNAL_ADDRESS_PROPERTY,
    DATABASE_EXTERNAL_PORT_PROPERTY, DATABASE_NAME_PROPERTY, DATABASE_PASSWORD_BYTES,
    DATABASE_PASSWORD_PROPERTY, DATABASE_SECRET_NAME, DATABASE_USERNAME_PROPERTY, PASSWORD_BYTES,
    POSTGRESQL_DATABASE, POSTGRESQL_DEFAULT_PORT, POSTGRESQL_USERNAME,
};
use crate::cluster::ObjectKey;
use crate::crd::{Keycloak, KeycloakApiUser, KeycloakRealm};

/// Read one key of a secret as UTF-8. Missing and empty values are `None`.
pub fn secret_value(secret: &Secret, key: &str) -> Option<String> {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .map(|v| String::from_utf8_lossy(&v.0).into_owned())
        .or_else(|| {
            secret
                .string_data
                .as_ref()
                .and_then(|data| data.get(key))
                .cloned()
        })
        .filter(|v| !v.is_empty())
}

fn bytes(value: impl Into<String>) -> ByteString {
    ByteString(value.into().into_bytes())
}

/// Insert `value()` under `key` unless the secret already holds a non-empty value.
fn fill_missing(secret: &mut Secret, key: &str, value: impl FnOnce() -> String) {
    if secret_value(secret, key).is_some() {
        return;
    }
    secret
        .data
        .get_or_insert_with(BTreeMap::new)
        .insert(key.to_string(), bytes(value()));
}

fn admin_secret_name(cr: &Keycloak) -> String {
    format!("credential-{}", cr.name_any())
}

/// Admin console credentials
pub fn keycloak_admin_secret(cr: &Keycloak) -> Secret {
    let mut data = BTreeMap::new();
    data.insert(ADMIN_USERNAME_PROPERTY.to_string(), bytes(ADMIN_USERNAME));
    data.insert(
        ADMIN_PASSWORD_PROPERTY.to_string(),
        bytes(generate_random_string(PASSWORD_BYTES)),
    );

    Secret {
        metadata: ObjectMeta {
            name: Some(admin_secret_name(cr)),
            namespace: Some(namespace_of(cr)),
            labels: Some(app_labels()),
            owner_references: Some(vec![owner_reference(cr)]),
            ..Default::default()
        },
        data: Some(data),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}

pub fn keycloak_admin_secret_reconciled(_cr: &Keycloak, current: &Secret) -> Secret {
    let mut reconciled = current.clone();
    fill_missing(&mut reconciled, ADMIN_USERNAME_PROPERTY, || {
        ADMIN_USERNAME.to_string()
    });
    fill_missing(&mut reconciled, ADMIN_PASSWORD_PROPERTY, || {
        generate_random_string(PASSWORD_BYTES)
    });
    reconciled
}

pub fn keycloak_admin_secret_selector(cr: &Keycloak) -> ObjectKey {
    ObjectKey::new(admin_secret_name(cr), namespace_of(cr))
}

/// Database connection secret.
///
/// For the embedded database the operator owns the credentials. For an
/// external database the connection details come from `spec.externalDatabase`
/// and the credentials are filled in by whoever owns the database.
pub fn database_secret(cr: &Keycloak) -> Secret {
    let mut data = BTreeMap::new();
    let external = &cr.spec.external_database;

    if external.enabled {
        if let Some(host) = external.host.as_ref().filter(|h| !h.is_empty()) {
            data.insert(
                DATABASE_EXTERNAL_ADDRESS_PROPERTY.to_string(),
                bytes(host.clone()),
            );
        }
        data.insert(
            DATABASE_EXTERNAL_PORT_PROPERTY.to_string(),
            bytes(external.port.unwrap_or(POSTGRESQL_DEFAULT_PORT).to_string()),
        );
        data.insert(
            DATABASE_NAME_PROPERTY.to_string(),
            bytes(
                external
                    .database
                    .clone()
                    .unwrap_or_else(|| POSTGRESQL_DATABASE.to_string()),
            ),
        );
    } else {
        data.insert(
            DATABASE_USERNAME_PROPERTY.to_string(),
            bytes(POSTGRESQL_USERNAME),
        );
        data.insert(
            DATABASE_PASSWORD_PROPERTY.to_string(),
            bytes(generate_random_string(DATABASE_PASSWORD_BYTES)),
        );
        data.insert(
            DATABASE_NAME_PROPERTY.to_string(),
            bytes(POSTGRESQL_DATABASE),
        );
    }

    Secret {
        metadata: ObjectMeta {
            name: Some(DATABASE_SECRET_NAME.to_string()),
            namespace: Some(namespace_of(cr)),
            labels: Some(app_labels()),
            owner_references: Some(vec![owner_reference(cr)]),
            ..Default::default()
        },
        data: Some(data),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}

pub fn database_secret_reconciled(cr: &Keycloak, current: &Secret) -> Secret {
    let mut reconciled = current.clone();
    let external = &cr.spec.external_database;

    if external.enabled {
        let data = reconciled.data.get_or_insert_with(BTreeMap::new);
        if let Some(host) = external.host.as_ref().filter(|h| !h.is_empty()) {
            data.insert(
                DATABASE_EXTERNAL_ADDRESS_PROPERTY.to_string(),
                bytes(host.clone()),
            );
        }
        if let Some(port) = external.port {
            data.insert(
                DATABASE_EXTERNAL_PORT_PROPERTY.to_string(),
                bytes(port.to_string()),
            );
        }
        if let Some(database) = external.database.as_ref() {
            data.insert(DATABASE_NAME_PROPERTY.to_string(), bytes(database.clone()));
        }
    } else {
        fill_missing(&mut reconciled, DATABASE_USERNAME_PROPERTY, || {
            POSTGRESQL_USERNAME.to_string()
        });
        fill_missing(&mut reconciled, DATABASE_PASSWORD_PROPERTY, || {
            generate_random_string(DATABASE_PASSWORD_BYTES)
        });
        fill_missing(&mut reconciled, DATABASE_NAME_PROPERTY, || {
            POSTGRESQL_DATABASE.to_string()
        });
    }
    reconciled
}

pub fn database_secret_selector(cr: &Keycloak) -> ObjectKey {
    ObjectKey::new(DATABASE_SECRET_NAME, namespace_of(cr))
}

/// Database host recorded in the secret, if any.
pub fn external_database_host(secret: Option<&Secret>) -> Option<String> {
    secret.and_then(|s| secret_value(s, DATABASE_EXTERNAL_ADDRESS_PROPERTY))
}

pub fn external_database_name(secret: Option<&Secret>) -> String {
    secret
        .and_then(|s| secret_value(s, DATABASE_NAME_PROPERTY))
        .unwrap_or_else(|| POSTGRESQL_DATABASE.to_string())
}

/// Database port recorded in the secret. Unparsable values fall back to the default port.
pub fn external_database_port(secret: Option<&Secret>) -> i32 {
    secret
        .and_then(|s| secret_value(s, DATABASE_EXTERNAL_PORT_PROPERTY))
        .and_then(|p| p.trim().parse().ok())
        .unwrap_or(POSTGRESQL_DEFAULT_PORT)
}

/// Name of the credential secret for one realm user.
pub fn realm_user_secret_name(keycloak_namespace: &str, realm: &str, username: &str) -> String {
    sanitize_resource_name(&format!(
        "credential-{}-{}-{}",
        realm, username, keycloak_namespace
    ))
}

/// Credential secret handed to a declared realm user.
pub fn realm_credential_secret(
    cr: &KeycloakRealm,
    user: &KeycloakApiUser,
    keycloak: &Keycloak,
) -> Secret {
    let password = user
        .password()
        .map(str::to_string)
        .unwrap_or_else(|| generate_random_string(PASSWORD_BYTES));

    let mut labels = app_labels();
    labels.insert(
        "keycloak.org/realm".to_string(),
        sanitize_resource_name(cr.realm_name()),
    );

    let mut data = BTreeMap::new();
    data.insert("username".to_string(), bytes(user.username.clone()));
    data.insert("password".to_string(), bytes(password));

    Secret {
        metadata: ObjectMeta {
            name: Some(realm_user_secret_name(
                &namespace_of(keycloak),
                cr.realm_name(),
                &user.username,
            )),
            namespace: Some(cr.namespace().unwrap_or_else(|| "default".to_string())),
            labels: Some(labels),
            ..Default::default()
        },
        data: Some(data),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}

pub fn realm_user_secret_selector(
    cr: &KeycloakRealm,
    user: &KeycloakApiUser,
    keycloak: &Keycloak,
) -> ObjectKey {
    ObjectKey::new(
        realm_user_secret_name(&namespace_of(keycloak), cr.realm_name(), &user.username),
        cr.namespace().unwrap_or_else(|| "default".to_string()),
    )
}
