//! Asset Provisioner
//!
//! Watches PersistentVolumeClaims of the configured storage classes, creates
//! a directory for each eligible claim and publishes it as a hostPath or NFS
//! PersistentVolume. Released volumes with reclaim policy Delete get their
//! directory removed together with the volume record.

use clap::Parser;
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use kube::Api;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use asset_provisioner::adapters::{connect, load_class_registry};
use asset_provisioner::controller;
use asset_provisioner::{
    ClassRegistry, DeprovisionHandler, Error, KubeVolumeStore, ProvisionHandler,
    ProvisionerConfig, ReconcileMetrics, Result, VolumeStoreRef,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Asset Provisioner - directory and NFS backed PersistentVolumes
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Storage classes served by this provisioner (comma separated)
    #[arg(
        long,
        env = "STORAGE_CLASSES",
        value_delimiter = ',',
        required_unless_present = "classes_file"
    )]
    storage_classes: Vec<String>,

    /// YAML file with storage class records, used instead of reading
    /// StorageClass objects from the cluster
    #[arg(long, env = "CLASSES_FILE")]
    classes_file: Option<PathBuf>,

    /// Where the storage assets are mounted inside this process
    #[arg(long, env = "STORAGE_ASSET_ROOT")]
    storage_asset_root: PathBuf,

    /// Path to a kubeconfig file; in-cluster configuration otherwise
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Permission bits of new asset directories, in octal
    #[arg(long, env = "ASSET_DIR_MODE", default_value = "755")]
    asset_dir_mode: String,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    info!("Starting Asset Provisioner");
    info!("  Version: {}", asset_provisioner::VERSION);
    info!("  Asset root: {}", args.storage_asset_root.display());

    let dir_mode = u32::from_str_radix(&args.asset_dir_mode, 8).map_err(|e| {
        Error::Configuration(format!("Invalid asset directory mode {}: {}", args.asset_dir_mode, e))
    })?;
    let config = ProvisionerConfig {
        asset_root: args.storage_asset_root.clone(),
        dir_mode,
    };

    let client = connect(args.kubeconfig.as_deref()).await?;

    // Resolve served storage classes once; they are not watched afterwards
    let registry = match &args.classes_file {
        Some(path) => ClassRegistry::from_file(path).await?,
        None => load_class_registry(client.clone(), &args.storage_classes).await?,
    };
    if registry.is_empty() {
        return Err(Error::Configuration("no storage classes to serve".into()));
    }
    info!(
        "Serving storage classes: {}",
        registry.names().collect::<Vec<_>>().join(", ")
    );
    let registry = Arc::new(registry);

    let metrics = Arc::new(ReconcileMetrics::new(prometheus::default_registry())?);
    let ready = Arc::new(AtomicBool::new(false));

    // Start health server
    let health_addr = args.health_addr.clone();
    let health_ready = ready.clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(&health_addr, health_ready).await {
            error!("Health server error: {}", e);
        }
    });

    // Start metrics server
    let metrics_addr = args.metrics_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr).await {
            error!("Metrics server error: {}", e);
        }
    });

    let volumes: VolumeStoreRef = Arc::new(KubeVolumeStore::new(client.clone()));
    let claims_api: Api<PersistentVolumeClaim> = Api::all(client.clone());
    let volumes_api: Api<PersistentVolume> = Api::all(client);

    ready.store(true, Ordering::SeqCst);

    tokio::join!(
        controller::run(claims_api, metrics.clone(), |claims| {
            ProvisionHandler::new(registry.clone(), config.clone(), claims, volumes.clone())
        }),
        controller::run(volumes_api, metrics.clone(), |cache| {
            DeprovisionHandler::new(registry.clone(), config.clone(), cache, volumes.clone())
        }),
    );

    info!("Provisioner shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "kube=info", "tower=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Health Server
// =============================================================================

fn respond(status: hyper::StatusCode, body: &'static str) -> hyper::Response<hyper::Body> {
    let mut response = hyper::Response::new(hyper::Body::from(body));
    *response.status_mut() = status;
    response
}

async fn run_health_server(addr: &str, ready: Arc<AtomicBool>) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let ready = ready.clone();
        async move {
            Ok::<_, std::convert::Infallible>(service_fn(move |req: Request<Body>| {
                let ready = ready.load(Ordering::SeqCst);
                async move {
                    let response = match req.uri().path() {
                        "/healthz" | "/livez" => respond(StatusCode::OK, "ok"),
                        "/readyz" if ready => respond(StatusCode::OK, "ok"),
                        "/readyz" => respond(StatusCode::SERVICE_UNAVAILABLE, "starting"),
                        _ => respond(StatusCode::NOT_FOUND, "not found"),
                    };
                    Ok::<_, std::convert::Infallible>(response)
                }
            }))
        }
    });

    let addr: SocketAddr = addr.parse().map_err(|e| {
        Error::Configuration(format!("Invalid health server address: {}", e))
    })?;

    info!("Health server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Health server error: {}", e)))?;

    Ok(())
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(addr: &str) -> Result<()> {
    use hyper::header::{HeaderValue, CONTENT_TYPE};
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};
    use prometheus::{Encoder, TextEncoder};

    let make_svc = make_service_fn(|_conn| async {
        Ok::<_, std::convert::Infallible>(service_fn(|req: Request<Body>| async move {
            let response = match req.uri().path() {
                "/metrics" => {
                    let encoder = TextEncoder::new();
                    let metric_families = prometheus::gather();
                    let mut buffer = Vec::new();
                    match encoder.encode(&metric_families, &mut buffer) {
                        Ok(()) => {
                            let mut response = Response::new(Body::from(buffer));
                            response.headers_mut().insert(
                                CONTENT_TYPE,
                                HeaderValue::from_static(prometheus::TEXT_FORMAT),
                            );
                            response
                        }
                        Err(e) => {
                            error!("Metrics encoding failed: {}", e);
                            respond(StatusCode::INTERNAL_SERVER_ERROR, "encoding failed")
                        }
                    }
                }
                _ => respond(StatusCode::NOT_FOUND, "not found"),
            };
            Ok::<_, std::convert::Infallible>(response)
        }))
    });

    let addr: SocketAddr = addr.parse().map_err(|e| {
        Error::Configuration(format!("Invalid metrics server address: {}", e))
    })?;

    info!("Metrics server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))?;

    Ok(())
}
