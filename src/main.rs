//! Provisioning Controller
//!
//! Standalone host for the provisioning controllers: serves the host contract
//! over REST, keeps the inventory fresh and exposes health and metrics.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                         REST API (host contract)                      │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌────────────────────┐  │
//! │  │  VM Controller  │   │    Approval     │   │   Poll Dispatcher  │  │
//! │  │  (actions)      │   │    Controller   │   │   (tables)         │  │
//! │  └────────┬────────┘   └─────────────────┘   └────────────────────┘  │
//! │           │                                                           │
//! │  ┌────────┴────────┐   ┌─────────────────┐   ┌────────────────────┐  │
//! │  │  Client Pool    │   │   Balancers     │   │  Inventory Store   │  │
//! │  │  (per endpoint) │   │   (host/store)  │   │  (+ refresher)     │  │
//! │  └────────┬────────┘   └─────────────────┘   └────────────────────┘  │
//! ├───────────┴──────────────────────────────────────────────────────────┤
//! │                  Hypervisor management endpoints                      │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use provisioning_controller::{
    ApiServer, ApiServerConfig, ApprovalController, ApprovalServices, BalancerDocument,
    ClientPool, DirectoryInventorySource, EndpointId, EngineMetrics, Error, HttpScriptSource,
    InventoryRefresher, InventoryStore, LogNotifier, PlacementBalancers, PlaintextCipher,
    PoolConfig, RefresherConfig, Result, SimulatedClientFactory, SimulatedHypervisor,
    SimulatorConfig, VmController, VmControllerConfig, VmServices,
};
use provisioning_controller::inventory::AddressBook;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Provisioning Controller - poll-driven VM provisioning with capacity balancing
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// REST API bind address
    #[arg(long, env = "API_ADDR", default_value = "0.0.0.0:8090")]
    api_addr: String,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Balancer configuration (YAML)
    #[arg(long, env = "BALANCER_CONFIG", default_value = "config/balancers.yaml")]
    balancer_config: String,

    /// Glob of inventory documents (YAML)
    #[arg(long, env = "INVENTORY_GLOB", default_value = "config/inventory/*.yaml")]
    inventory_glob: String,

    /// Inventory refresh interval in seconds
    #[arg(long, env = "REFRESH_INTERVAL", default_value = "300")]
    refresh_interval_secs: u64,

    /// Simulated management endpoints to register
    #[arg(long, env = "SIMULATED_ENDPOINTS", value_delimiter = ',', default_value = "vc-1")]
    simulated_endpoints: Vec<String>,

    /// Maximum clients per management endpoint
    #[arg(long, env = "POOL_MAX_CLIENTS", default_value = "4")]
    pool_max_clients: usize,

    /// Seconds to wait for a pooled client
    #[arg(long, env = "POOL_BORROW_TIMEOUT", default_value = "30")]
    pool_borrow_timeout_secs: u64,

    /// Guest DNS domain when an instance sets none
    #[arg(long, env = "DEFAULT_DOMAIN", default_value = "localdomain")]
    default_domain: String,

    /// VM name pattern when an instance sets none
    #[arg(long, env = "INSTANCE_NAME_PATTERN", default_value = "^[a-z][a-z0-9-]{0,62}$")]
    instance_name_pattern: String,

    /// Polls an instance may wait for unavailable resources
    #[arg(long, env = "RETRY_BUDGET", default_value = "10")]
    retry_budget: u32,

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

    init_logging(&args);

    info!("Starting Provisioning Controller");
    info!("  Version: {}", provisioning_controller::VERSION);
    info!("  REST API: {}", args.api_addr);
    info!("  Balancers: {}", args.balancer_config);
    info!("  Inventory: {}", args.inventory_glob);

    // Placement
    let document = BalancerDocument::load(&args.balancer_config)?;
    let balancers = Arc::new(PlacementBalancers::from_document(&document)?);

    // Inventory
    let inventory = InventoryStore::new();
    let refresher = InventoryRefresher::new(
        inventory.clone(),
        Arc::new(DirectoryInventorySource::new(args.inventory_glob.clone())),
        RefresherConfig {
            interval: Duration::from_secs(args.refresh_interval_secs),
            ..Default::default()
        },
    );
    if let Err(e) = refresher.refresh_once().await {
        warn!(error = %e, "Initial inventory load failed, starting empty");
    }
    let cancel = CancellationToken::new();
    let refresher_handle = refresher.spawn(cancel.clone());

    // Remote side
    let factory = SimulatedClientFactory::new();
    for endpoint in &args.simulated_endpoints {
        factory.register(
            EndpointId::new(endpoint.as_str()),
            SimulatedHypervisor::new(SimulatorConfig::default()),
        );
        info!(endpoint = %endpoint, "Registered simulated endpoint");
    }
    let pool = ClientPool::new(
        Arc::new(factory),
        PoolConfig {
            max_clients_per_endpoint: args.pool_max_clients,
            borrow_timeout: Duration::from_secs(args.pool_borrow_timeout_secs),
            ..Default::default()
        },
    );

    // Metrics
    let registry = prometheus::Registry::new();
    let metrics = EngineMetrics::new();
    metrics.register(&registry)?;

    // Controllers
    let notifier = Arc::new(LogNotifier::new());
    let vm_services = Arc::new(VmServices {
        pool: pool.clone(),
        inventory: inventory.clone(),
        balancers,
        addresses: AddressBook::new(),
        cipher: Arc::new(PlaintextCipher),
        notifier: notifier.clone(),
        scripts: Arc::new(HttpScriptSource::new()?),
        config: VmControllerConfig {
            default_domain_name: args.default_domain.clone(),
            instance_name_pattern: args.instance_name_pattern.clone(),
            retry_budget: args.retry_budget,
            ..Default::default()
        },
    });
    let vm = Arc::new(VmController::new(vm_services, metrics.clone())?);
    let approval = Arc::new(ApprovalController::new(
        Arc::new(ApprovalServices { notifier }),
        metrics.clone(),
    )?);

    // Start health server
    let health_addr = args.health_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(&health_addr).await {
            error!("Health server error: {}", e);
        }
    });

    // Start metrics server
    let metrics_addr = args.metrics_addr.clone();
    let scrape = MetricsScrape {
        registry,
        metrics,
        pool,
    };
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr, scrape).await {
            error!("Metrics server error: {}", e);
        }
    });

    // Create and run API server
    let api_config = ApiServerConfig {
        rest_addr: args
            .api_addr
            .parse()
            .map_err(|e| Error::Configuration(format!("Invalid REST API address: {}", e)))?,
    };
    let api_server = Arc::new(
        ApiServer::new(api_config)
            .with_controller(vm)
            .with_controller(approval)
            .with_inventory(inventory),
    );

    let signal_server = api_server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            signal_server.shutdown();
        }
    });

    api_server.run().await?;

    cancel.cancel();
    let _ = refresher_handle.await;
    info!("Controller shutdown complete");
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
    for directive in ["hyper=warn", "tower=warn", "reqwest=warn", "axum=info"] {
        if let Ok(d) = directive.parse() {
            filter = filter.add_directive(d);
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

async fn run_health_server(addr: &str) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};

    let make_svc = make_service_fn(|_conn| async {
        Ok::<_, std::convert::Infallible>(service_fn(|req: Request<Body>| async move {
            let (status, body) = match req.uri().path() {
                "/healthz" | "/livez" | "/readyz" => (StatusCode::OK, "ok"),
                _ => (StatusCode::NOT_FOUND, "not found"),
            };
            let mut response = Response::new(Body::from(body));
            *response.status_mut() = status;
            Ok::<_, std::convert::Infallible>(response)
        }))
    });

    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Internal(format!("Invalid health server address: {}", e)))?;

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

/// What a scrape reads
#[derive(Clone)]
struct MetricsScrape {
    registry: prometheus::Registry,
    metrics: EngineMetrics,
    pool: Arc<ClientPool>,
}

impl MetricsScrape {
    fn render(&self) -> std::result::Result<(Vec<u8>, String), prometheus::Error> {
        use prometheus::{Encoder, TextEncoder};

        self.metrics.observe_pool(&self.pool.stats());
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok((buffer, encoder.format_type().to_string()))
    }
}

async fn run_metrics_server(addr: &str, scrape: MetricsScrape) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{header, Body, Request, Response, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let scrape = scrape.clone();
        async move {
            Ok::<_, std::convert::Infallible>(service_fn(move |req: Request<Body>| {
                let scrape = scrape.clone();
                async move {
                    let response = match req.uri().path() {
                        "/metrics" => match scrape.render() {
                            Ok((buffer, content_type)) => {
                                let mut response = Response::new(Body::from(buffer));
                                if let Ok(value) = header::HeaderValue::from_str(&content_type) {
                                    response.headers_mut().insert(header::CONTENT_TYPE, value);
                                }
                                response
                            }
                            Err(e) => {
                                let mut response = Response::new(Body::from(e.to_string()));
                                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                                response
                            }
                        },
                        _ => {
                            let mut response = Response::new(Body::from("not found"));
                            *response.status_mut() = StatusCode::NOT_FOUND;
                            response
                        }
                    };
                    Ok::<_, std::convert::Infallible>(response)
                }
            }))
        }
    });

    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Internal(format!("Invalid metrics server address: {}", e)))?;

    info!("Metrics server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))?;

    Ok(())
}
