//! SwiftKV server entry point: parses flags, wires up the storage engine,
//! janitor and listener, and accepts connections until ctrl-c.

use std::sync::Arc;

use swiftkv::commands::CommandHandler;
use swiftkv::connection::{handle_connection, ConnectionStats};
use swiftkv::storage::{Janitor, JanitorConfig, StorageEngine, DEFAULT_SHARD_COUNT};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Server configuration.
struct Config {
    /// Host to bind to.
    host: String,
    /// Port to listen on.
    port: u16,
    /// Default TTL in seconds applied to SET and refreshed by INCR;
    /// 0 disables.
    default_ttl_secs: i64,
    /// Number of storage shards; must be a power of two.
    shards: usize,
    /// Milliseconds between janitor sweeps.
    sweep_interval_ms: u64,
    /// Entries the janitor examines per shard per sweep.
    scan_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: swiftkv::DEFAULT_HOST.to_string(),
            port: swiftkv::DEFAULT_PORT,
            default_ttl_secs: 0,
            shards: DEFAULT_SHARD_COUNT,
            sweep_interval_ms: 100,
            scan_limit: 100,
        }
    }
}

impl Config {
    /// Parses configuration from command-line arguments.
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    config.host = take_value(&args, i, "--host");
                    i += 2;
                }
                "--port" | "-p" => {
                    config.port = parse_value(&args, i, "--port");
                    i += 2;
                }
                "--ttl" | "-t" => {
                    config.default_ttl_secs = parse_value(&args, i, "--ttl");
                    i += 2;
                }
                "--shards" => {
                    config.shards = parse_value(&args, i, "--shards");
                    i += 2;
                }
                "--sweep-interval-ms" => {
                    config.sweep_interval_ms = parse_value(&args, i, "--sweep-interval-ms");
                    i += 2;
                }
                "--scan-limit" => {
                    config.scan_limit = parse_value(&args, i, "--scan-limit");
                    i += 2;
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("SwiftKV version {}", swiftkv::VERSION);
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        if !config.shards.is_power_of_two() {
            eprintln!("Error: --shards must be a power of two");
            std::process::exit(1);
        }
        if config.default_ttl_secs < 0 {
            eprintln!("Error: --ttl must be zero or positive");
            std::process::exit(1);
        }

        config
    }

    /// Returns the bind address as a string.
    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn take_value(args: &[String], i: usize, flag: &str) -> String {
    match args.get(i + 1) {
        Some(value) => value.clone(),
        None => {
            eprintln!("Error: {flag} requires a value");
            std::process::exit(1);
        }
    }
}

fn parse_value<T: std::str::FromStr>(args: &[String], i: usize, flag: &str) -> T {
    take_value(args, i, flag).parse().unwrap_or_else(|_| {
        eprintln!("Error: invalid value for {flag}");
        std::process::exit(1);
    })
}

fn print_help() {
    println!(
        r#"
SwiftKV - A Pipelined In-Memory Key-Value Server

USAGE:
    swiftkv [OPTIONS]

OPTIONS:
    -h, --host <HOST>            Host to bind to (default: 0.0.0.0)
    -p, --port <PORT>            Port to listen on (default: 6379)
    -t, --ttl <SECONDS>          Default TTL applied to SET/INCR, 0 disables (default: 0)
        --shards <N>             Storage shard count, power of two (default: 64)
        --sweep-interval-ms <MS> Janitor sweep period (default: 100)
        --scan-limit <N>         Janitor scan budget per shard per sweep (default: 100)
    -v, --version                Print version information
        --help                   Print this help message

CONNECTING:
    Use redis-cli or any RESP client:
    $ redis-cli -p 6379
    127.0.0.1:6379> SET greeting hello
    OK
    127.0.0.1:6379> GET greeting
    "hello"
"#
    );
}

fn print_banner(config: &Config) {
    println!(
        r#"
SwiftKV v{} - Pipelined In-Memory Key-Value Server
──────────────────────────────────────────────────
Listening on {} ({} shards, default TTL {}s)
Use ctrl-c to shut down.
"#,
        swiftkv::VERSION,
        config.bind_address(),
        config.shards,
        config.default_ttl_secs,
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args();

    let _subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    print_banner(&config);

    let storage = Arc::new(StorageEngine::with_shard_count(config.shards));
    info!(shards = config.shards, "storage engine initialized");

    let _janitor = Janitor::start(
        Arc::clone(&storage),
        JanitorConfig {
            period: std::time::Duration::from_millis(config.sweep_interval_ms),
            scan_limit: config.scan_limit,
        },
    );
    info!(
        period_ms = config.sweep_interval_ms,
        scan_limit = config.scan_limit,
        "janitor started"
    );

    let stats = Arc::new(ConnectionStats::new());

    let listener = TcpListener::bind(config.bind_address()).await?;
    info!(address = %config.bind_address(), "listening");

    let shutdown = async {
        signal::ctrl_c().await.ok();
        info!("shutdown signal received, stopping server");
    };

    tokio::select! {
        _ = accept_loop(listener, storage, stats, config.default_ttl_secs) => {}
        _ = shutdown => {}
    }

    info!("server shutdown complete");
    Ok(())
}

/// Accepts connections forever, spawning one handler task per client.
async fn accept_loop(
    listener: TcpListener,
    storage: Arc<StorageEngine>,
    stats: Arc<ConnectionStats>,
    default_ttl_secs: i64,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let commands = CommandHandler::new(Arc::clone(&storage), default_ttl_secs);
                let stats = Arc::clone(&stats);
                tokio::spawn(handle_connection(stream, addr, commands, stats));
            }
            Err(e) => {
                error!(error = %e, "failed to accept connection");
            }
        }
    }
}
