use chrono::Utc;
use std::path::{Path, PathBuf};
use vm2dhcp::cli::{Cli, Commands, ConfigAction};
use vm2dhcp::config::Config;
use vm2dhcp::daemon::{self, Daemon, EventStreamConsumer};
use vm2dhcp::error::{Result, Vm2DhcpError};
use vm2dhcp::registry::{LeaseRegistry, MemoryRegistry};
use vm2dhcp::source::FeedSource;
use vm2dhcp::telemetry::{self, Endpoints};

type FeedConsumer = EventStreamConsumer<FeedSource, MemoryRegistry>;

fn main() {
    let cli = Cli::parse_args();

    init_logging(&cli.log_level);

    let result = match cli.command {
        Commands::Run { feed } => cmd_run(cli.config, &feed),
        Commands::Replay { feed } => cmd_replay(cli.config, &feed),
        Commands::Config { action } => cmd_config(cli.config, action),
    };

    if let Err(e) = result {
        tracing::error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = match level {
        "CRITICAL" | "ERROR" => "error",
        "WARNING" => "warn",
        "DEBUG" => "debug",
        _ => "info",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("vm2dhcp={}", level)));

    fmt().with_env_filter(filter).with_target(false).init();
}

fn cmd_run(config_path: Option<PathBuf>, feed: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let poll_interval = config.platform.poll_interval()?;
    let consumer = build_consumer(&config, feed)?;

    let runtime = tokio::runtime::Runtime::new().map_err(|e| Vm2DhcpError::Io {
        source: e,
        context: "Failed to create tokio runtime".to_string(),
    })?;

    runtime.block_on(async {
        if config.metrics.enabled {
            telemetry::init_exporter(config.metrics.port)?;
        }
        consumer.endpoints().publish_info();

        tracing::info!(
            "Monitoring VMs on networks {:?} from {}",
            config.platform.networks,
            feed.display()
        );
        let mut daemon = Daemon::new(consumer, poll_interval);
        daemon.run().await
    })
}

fn cmd_replay(config_path: Option<PathBuf>, feed: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let mut consumer = build_consumer(&config, feed)?;

    let runtime = tokio::runtime::Runtime::new().map_err(|e| Vm2DhcpError::Io {
        source: e,
        context: "Failed to create tokio runtime".to_string(),
    })?;
    let watermark = runtime.block_on(daemon::replay(&mut consumer, Utc::now()));

    let stats = consumer.stats();
    tracing::info!(
        "Replayed {} event(s) up to {}: {} reconciled, {} rejected, {} ignored",
        stats.events_read,
        watermark.last_read(),
        stats.reconciled,
        stats.rejected,
        stats.ignored
    );

    let hosts = consumer.reconciler().registry().hosts();
    let json = serde_json::to_string_pretty(&hosts).map_err(|e| Vm2DhcpError::Json {
        source: e,
        context: "Failed to serialize reservations".to_string(),
    })?;
    println!("{}", json);

    Ok(())
}

fn build_consumer(config: &Config, feed: &Path) -> Result<FeedConsumer> {
    let registry = MemoryRegistry::new(format!(
        "{}:{}",
        config.registry.address, config.registry.port
    ));
    let endpoints = Endpoints::new(config.platform.address.clone(), registry.endpoint());
    let source = FeedSource::open(feed)?.with_endpoints(endpoints);
    EventStreamConsumer::from_config(config, source, registry)
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            let json = serde_json::to_string_pretty(&config).map_err(|e| Vm2DhcpError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;
            println!("{}", json);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Platform: {}", config.platform.address);
            println!(
                "  Registry: {}:{}",
                config.registry.address, config.registry.port
            );
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| Vm2DhcpError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults and V2D_* environment. Run 'vm2dhcp config init' to create one."
        );
        return Config::from_env();
    }

    Config::load(&path)
}
