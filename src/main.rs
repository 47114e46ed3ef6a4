//! Keycloak Kubernetes Operator
//!
//! This operator manages Keycloak installations and their realms on Kubernetes.
//!
//! ## Usage
//!
//! ```bash
//! # Run the operator (requires kubeconfig)
//! keycloak-operator
//!
//! # Run with custom log level
//! RUST_LOG=debug keycloak-operator
//! ```

use clap::Parser;
use keycloak_operator::keycloak::{KeycloakClientConfig, KeycloakClientFactory};
use keycloak_operator::model::ProfileManager;
use keycloak_operator::{
    probe_capabilities, CapabilityCache, CapabilityStore, KeycloakController,
    KeycloakRealmController,
};
use kube::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Keycloak Kubernetes Operator
#[derive(Parser, Debug)]
#[command(name = "keycloak-operator")]
#[command(version, about = "Kubernetes Operator for Keycloak")]
struct Args {
    /// Namespace to watch (empty for all namespaces)
    #[arg(long, default_value = "")]
    namespace: String,

    /// Seconds between capability discovery runs
    #[arg(long, default_value_t = 60)]
    capability_probe_interval_secs: u64,

    /// Timeout for Keycloak admin API requests, in seconds
    #[arg(long, default_value_t = 10)]
    request_timeout_secs: u64,

    /// Accept self-signed certificates from the Keycloak admin API
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    insecure_skip_tls_verify: bool,

    /// Comma-separated list of active profiles, e.g. RHSSO
    #[arg(long, env = "PROFILE", default_value = "")]
    profile: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let args = Args::parse();

    info!("Starting Keycloak Kubernetes Operator");
    info!(
        "Watching namespace: {}",
        if args.namespace.is_empty() {
            "all"
        } else {
            &args.namespace
        }
    );

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    // Controllers must not plan against unknown capabilities, so probe once up front
    let capabilities: Arc<dyn CapabilityStore> = Arc::new(CapabilityCache::new());
    if let Err(e) = probe_capabilities(client.clone(), capabilities.as_ref()).await {
        warn!("Initial capability probe failed: {}", e);
    }

    let probe_handle = {
        let client = client.clone();
        let capabilities = Arc::clone(&capabilities);
        let interval = Duration::from_secs(args.capability_probe_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = probe_capabilities(client.clone(), capabilities.as_ref()).await {
                    warn!("Capability probe failed: {}", e);
                }
            }
        })
    };

    let profiles = ProfileManager::new(&args.profile);
    if !profiles.profiles().is_empty() {
        info!("Active profiles: {:?}", profiles.profiles());
    }

    let factory = KeycloakClientFactory::new(KeycloakClientConfig {
        request_timeout: Duration::from_secs(args.request_timeout_secs),
        accept_invalid_certs: args.insecure_skip_tls_verify,
    });

    // Create controllers
    let keycloak_controller = Arc::new(KeycloakController::new(
        client.clone(),
        Arc::clone(&capabilities),
        profiles,
        &args.namespace,
    ));
    let realm_controller = Arc::new(KeycloakRealmController::new(
        client.clone(),
        factory,
        &args.namespace,
    ));

    // Run controllers concurrently
    let keycloak_handle = {
        let controller = Arc::clone(&keycloak_controller);
        tokio::spawn(async move {
            if let Err(e) = controller.run().await {
                error!("Keycloak controller error: {}", e);
            }
        })
    };

    let realm_handle = {
        let controller = Arc::clone(&realm_controller);
        tokio::spawn(async move {
            if let Err(e) = controller.run().await {
                error!("KeycloakRealm controller error: {}", e);
            }
        })
    };

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = keycloak_handle => {
            if let Err(e) = result {
                error!("Keycloak controller task failed: {}", e);
            }
        }
        result = realm_handle => {
            if let Err(e) = result {
                error!("KeycloakRealm controller task failed: {}", e);
            }
        }
    }

    probe_handle.abort();
    info!("Keycloak Operator shutting down");
    Ok(())
}
