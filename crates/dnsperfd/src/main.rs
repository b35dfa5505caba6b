// # dnsperfd - DNS Latency Monitor Daemon
//
// The dnsperfd daemon is a thin integration layer. It is responsible for:
// 1. Parsing the command line and environment
// 2. Initializing logging and the runtime
// 3. Registering resolver and store backends
// 4. Recovering statistics and running the round scheduler until a signal
//
// All measurement and statistics logic lives in dnsperf-core.
//
// ## Usage
//
// ```bash
// dnsperfd <INTERVAL> [DOMAINS_FILE]
// ```
//
// - `INTERVAL`: seconds to sleep between rounds
// - `DOMAINS_FILE`: newline-delimited domain list; the built-in list is used
//   when omitted or missing
//
// ## Environment
//
// - `DNSPERF_STORE_TYPE`: durable store (sqlite, memory)
// - `DNSPERF_DB_NAME`: SQLite database path (for sqlite store)
// - `DNSPERF_RESOLVER`: resolver (system, google, cloudflare, quad9)
// - `DNSPERF_RESOLVER_TIMEOUT_SECS`: per-query timeout
// - `DNSPERF_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export DNSPERF_DB_NAME=/var/lib/dnsperf/dnsperf.db
// export DNSPERF_RESOLVER=cloudflare
// dnsperfd 10 /etc/dnsperf/domains.txt
// ```

use anyhow::Result;
use clap::Parser;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use dnsperf_core::config::{self, MonitorConfig, PublicResolver, ResolverConfig, SchedulerConfig, StoreConfig};
use dnsperf_core::{
    BackendRegistry, LatencyProbe, LifecycleController, RoundScheduler, SchedulerEvent, StatsAggregator,
};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
/// - 3: Durable store unusable at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DnsperfExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
    /// Store unreachable, schema creation or summary load failed
    StoreError = 3,
}

impl From<DnsperfExitCode> for ExitCode {
    fn from(code: DnsperfExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

impl From<&dnsperf_core::Error> for DnsperfExitCode {
    fn from(e: &dnsperf_core::Error) -> Self {
        match e {
            dnsperf_core::Error::Store(_) => DnsperfExitCode::StoreError,
            dnsperf_core::Error::Config(_) => DnsperfExitCode::ConfigError,
            _ => DnsperfExitCode::RuntimeError,
        }
    }
}

/// Measure uncached DNS resolution latency for a set of domains
#[derive(Parser, Debug)]
#[command(name = "dnsperfd")]
#[command(version)]
#[command(about = "Measure uncached DNS resolution latency for a set of domains", long_about = None)]
struct Args {
    /// Seconds to sleep between probe rounds
    interval: u64,

    /// Newline-delimited domain list (built-in list when omitted or missing)
    domains_file: Option<PathBuf>,
}

/// Environment configuration
#[derive(Debug, Clone, PartialEq, Eq)]
struct Config {
    store_type: String,
    db_name: String,
    resolver: String,
    resolver_timeout_secs: Option<u64>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let resolver_timeout_secs = match lookup("DNSPERF_RESOLVER_TIMEOUT_SECS") {
            Some(raw) => Some(raw.trim().parse().map_err(|_| {
                anyhow::anyhow!(
                    "DNSPERF_RESOLVER_TIMEOUT_SECS must be a whole number of seconds. Got: {}",
                    raw
                )
            })?),
            None => None,
        };

        Ok(Self {
            store_type: lookup("DNSPERF_STORE_TYPE").unwrap_or_else(|| "sqlite".to_string()),
            db_name: lookup("DNSPERF_DB_NAME").unwrap_or_else(|| "dnsperf.db".to_string()),
            resolver: lookup("DNSPERF_RESOLVER").unwrap_or_else(|| "system".to_string()),
            resolver_timeout_secs,
            log_level: lookup("DNSPERF_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        match self.store_type.as_str() {
            "sqlite" | "memory" => {}
            _ => anyhow::bail!(
                "DNSPERF_STORE_TYPE '{}' is not supported. \
                Supported types: sqlite, memory",
                self.store_type
            ),
        }

        if self.store_type == "sqlite" {
            if self.db_name.is_empty() {
                anyhow::bail!("DNSPERF_DB_NAME cannot be empty when DNSPERF_STORE_TYPE=sqlite");
            }

            if let Some(parent) = std::path::Path::new(&self.db_name).parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                anyhow::bail!(
                    "DNSPERF_DB_NAME parent directory does not exist: {}. \
                        Create it first: mkdir -p {}",
                    parent.display(),
                    parent.display()
                );
            }
        }

        if self.resolver != "system" {
            self.resolver.parse::<PublicResolver>().map_err(|_| {
                anyhow::anyhow!(
                    "DNSPERF_RESOLVER '{}' is not supported. \
                    Supported resolvers: system, google, cloudflare, quad9",
                    self.resolver
                )
            })?;
        }

        if let Some(timeout) = self.resolver_timeout_secs
            && !(1..=60).contains(&timeout)
        {
            anyhow::bail!(
                "DNSPERF_RESOLVER_TIMEOUT_SECS must be between 1 and 60 seconds. Got: {}",
                timeout
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "DNSPERF_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    fn resolver_config(&self) -> Result<ResolverConfig> {
        let timeout_secs = self.resolver_timeout_secs;
        if self.resolver == "system" {
            return Ok(ResolverConfig::System { timeout_secs });
        }

        Ok(ResolverConfig::Public {
            provider: self.resolver.parse()?,
            timeout_secs,
        })
    }

    fn store_config(&self) -> StoreConfig {
        match self.store_type.as_str() {
            "memory" => StoreConfig::Memory,
            _ => StoreConfig::Sqlite {
                path: self.db_name.clone(),
            },
        }
    }

    /// Assemble the monitor configuration
    fn monitor_config(&self, args: &Args) -> Result<MonitorConfig> {
        let domains = config::load_domains(args.domains_file.as_deref())?;

        let monitor = MonitorConfig {
            domains,
            scheduler: SchedulerConfig::with_interval_secs(args.interval),
            resolver: self.resolver_config()?,
            store: self.store_config(),
        };
        monitor.validate()?;

        Ok(monitor)
    }
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                DnsperfExitCode::ConfigError.into()
            } else {
                // --help / --version
                DnsperfExitCode::CleanShutdown.into()
            };
        }
    };

    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return DnsperfExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return DnsperfExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DnsperfExitCode::ConfigError.into();
    }

    let monitor = match config.monitor_config(&args) {
        Ok(monitor) => monitor,
        Err(e) => {
            error!("Configuration error: {}", e);
            return DnsperfExitCode::ConfigError.into();
        }
    };

    info!("Starting dnsperfd daemon");
    info!(
        "Configuration loaded: {} domain(s), {}s interval, {} store",
        monitor.domains.len(),
        monitor.scheduler.interval_secs,
        monitor.store.type_name()
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DnsperfExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        match run_daemon(monitor).await {
            Ok(()) => DnsperfExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {}", e);
                DnsperfExitCode::from(&e)
            }
        }
    });

    result.into()
}

/// Build the backend registry with every compiled-in backend
fn registry() -> BackendRegistry {
    let registry = BackendRegistry::with_builtins();

    #[cfg(feature = "hickory")]
    {
        debug!("Registering hickory resolver");
        dnsperf_resolver_hickory::register(&registry);
    }

    #[cfg(feature = "sqlite")]
    {
        debug!("Registering SQLite store");
        dnsperf_store_sqlite::register(&registry);
    }

    debug!(
        resolvers = ?registry.list_resolvers(),
        stores = ?registry.list_stores(),
        "Backends registered"
    );
    registry
}

/// Run the daemon
async fn run_daemon(config: MonitorConfig) -> dnsperf_core::Result<()> {
    let registry = registry();

    let factory = registry.resolver_factory(&config.resolver)?;
    let store = registry.create_store(&config.store)?;

    let aggregator = Arc::new(StatsAggregator::recover(store, &config.domains).await?);
    if aggregator.domains().is_empty() {
        warn!("No domain could be registered; rounds will be empty");
    }

    let lifecycle = Arc::new(LifecycleController::new());
    let probe = LatencyProbe::new(factory, config.resolver.clone());

    let (scheduler, events) = RoundScheduler::new(
        probe,
        Arc::clone(&aggregator),
        Arc::clone(&lifecycle),
        &config.scheduler,
    )?;

    let reporter = tokio::spawn(report_events(events));
    let signals = tokio::spawn(stop_on_signal(Arc::clone(&lifecycle)));

    let result = scheduler.run().await;

    signals.abort();
    // The scheduler owned the only sender; the reporter drains and exits
    drop(scheduler);
    if let Err(e) = reporter.await {
        warn!("Event reporter ended abnormally: {}", e);
    }

    info!("Shutting down daemon");
    result
}

/// Log per-domain statistics as samples are recorded
async fn report_events(mut events: tokio::sync::mpsc::Receiver<SchedulerEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            SchedulerEvent::SampleRecorded {
                domain,
                latency_usec,
                record_count,
                mean_latency,
                std_dev,
                ..
            } => info!(
                domain = %domain,
                latency_usec,
                record_count,
                mean_latency,
                std_dev,
                "Latency recorded"
            ),
            other => debug!(event = ?other, "Scheduler event"),
        }
    }
}

/// Request a stop on SIGTERM or SIGINT
async fn stop_on_signal(lifecycle: Arc<LifecycleController>) {
    loop {
        match wait_for_shutdown().await {
            Ok(signal) => {
                info!("Received shutdown signal: {}", signal);
                if !lifecycle.stop() {
                    info!("Already stopping, waiting for the current round to finish");
                }
            }
            Err(e) => {
                error!("Signal handling unavailable: {}", e);
                return;
            }
        }
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let signal = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(signal)
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
