use std::env;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use tracing::{error, info};

use contracts::EngineConfig;
use kernel_api::{serve, EngineApi, EngineError, ObserverHandle};

const CONFIG_FILE: &str = "engine.json";
const DEFAULT_MODEL_ID: &str = "external-reasoner";
const SERVE_TICK_INTERVAL: Duration = Duration::from_secs(2);

const EXIT_USAGE: i32 = 1;
const EXIT_STORAGE: i32 = 2;
const EXIT_REASONER: i32 = 3;

fn print_usage() {
    println!("kernel-cli <command>");
    println!("commands:");
    println!("  init           create a fresh world database");
    println!("  run <n>        advance n ticks");
    println!("  status         print the current world state");
    println!("  serve [addr]   run the engine with the observer api attached");
    println!("    default addr: 127.0.0.1:8080");
    println!("config: read from {CONFIG_FILE} when present, defaults otherwise");
}

/// Reads the engine config from `engine.json` beside the binary's working
/// directory; every field has a serde default.
fn load_config() -> Result<EngineConfig, String> {
    let path = Path::new(CONFIG_FILE);
    if !path.exists() {
        return Ok(EngineConfig::default());
    }
    let raw = std::fs::read_to_string(path).map_err(|err| format!("read {CONFIG_FILE}: {err}"))?;
    serde_json::from_str(&raw).map_err(|err| format!("parse {CONFIG_FILE}: {err}"))
}

fn parse_socket_addr(value: Option<&String>) -> Result<SocketAddr, String> {
    let raw = value.map(String::as_str).unwrap_or("127.0.0.1:8080");
    raw.parse::<SocketAddr>()
        .map_err(|_| format!("invalid addr: {raw}"))
}

fn exit_code_for(err: &EngineError) -> i32 {
    match err {
        EngineError::Storage(_) => EXIT_STORAGE,
        EngineError::Reasoner(_) => EXIT_REASONER,
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str);

    let config = match load_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(EXIT_USAGE);
        }
    };

    match command {
        Some("init") => match EngineApi::init(config, DEFAULT_MODEL_ID) {
            Ok(engine) => {
                println!("{}", engine.world_status());
            }
            Err(err) => {
                eprintln!("error: {err}");
                std::process::exit(exit_code_for(&err));
            }
        },
        Some("run") => {
            let ticks = match args.get(2).and_then(|raw| raw.parse::<u64>().ok()) {
                Some(ticks) if ticks > 0 => ticks,
                _ => {
                    eprintln!("error: run requires a positive tick count");
                    print_usage();
                    std::process::exit(EXIT_USAGE);
                }
            };
            let mut engine = match EngineApi::open(config) {
                Ok(engine) => engine,
                Err(err) => {
                    eprintln!("error: {err}");
                    std::process::exit(exit_code_for(&err));
                }
            };
            match engine.run_ticks(ticks).await {
                Ok(committed) => {
                    println!("committed={committed} {}", engine.world_status());
                }
                Err(err) => {
                    eprintln!("error: {err}");
                    std::process::exit(exit_code_for(&err));
                }
            }
        }
        Some("status") => match EngineApi::open(config) {
            Ok(engine) => {
                println!("{}", engine.world_status());
            }
            Err(err) => {
                eprintln!("error: {err}");
                std::process::exit(exit_code_for(&err));
            }
        },
        Some("serve") => {
            let addr = match parse_socket_addr(args.get(2)) {
                Ok(addr) => addr,
                Err(err) => {
                    eprintln!("error: {err}");
                    print_usage();
                    std::process::exit(EXIT_USAGE);
                }
            };
            let mut engine = match EngineApi::open(config.clone()) {
                Ok(engine) => engine,
                Err(err) => {
                    eprintln!("error: {err}");
                    std::process::exit(exit_code_for(&err));
                }
            };

            let (command_tx, mut command_rx) = tokio::sync::mpsc::unbounded_channel();
            let handle = ObserverHandle::new(&config, command_tx);
            info!(%addr, "observer api listening");
            let server = tokio::spawn(async move {
                if let Err(err) = serve(addr, handle).await {
                    error!(error = %err, "observer server stopped");
                }
            });

            loop {
                while let Ok(command) = command_rx.try_recv() {
                    engine.enqueue_observer_command(command);
                }
                if let Err(err) = engine.tick_once().await {
                    error!(error = %err, "tick failed");
                    server.abort();
                    std::process::exit(exit_code_for(&err));
                }
                tokio::time::sleep(SERVE_TICK_INTERVAL).await;
            }
        }
        _ => {
            print_usage();
        }
    }
}
