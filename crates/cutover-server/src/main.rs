use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, Command};
use cutover_core::{spawn_ticker, CutoverConfig, MigrationSystem};
use cutover_server::{init_logging, notifier_from_config, routes, ApiState, Credentials};
use cutover_store::{MemoryRecordStore, MemoryStateStore};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

fn cli() -> Command {
    let config_arg = Arg::new("config")
        .long("config")
        .short('c')
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Path to the TOML configuration file");

    Command::new("cutover")
        .version(cutover_core::VERSION)
        .about("Live data-migration consistency controller")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("serve")
                .about("Serve the operator API")
                .arg(config_arg.clone())
                .arg(
                    Arg::new("tick")
                        .long("tick")
                        .action(ArgAction::SetTrue)
                        .help("Also run the migration cycle on an in-process timer"),
                )
                .arg(
                    Arg::new("log-json")
                        .long("log-json")
                        .action(ArgAction::SetTrue)
                        .help("Emit logs as JSON"),
                ),
        )
        .subcommand(
            Command::new("check-config")
                .about("Validate a configuration file and print the effective settings")
                .arg(config_arg),
        )
}

fn load_config(path: &Path) -> anyhow::Result<CutoverConfig> {
    CutoverConfig::load(path).with_context(|| format!("loading {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();

    match matches.subcommand() {
        Some(("serve", args)) => {
            let path = args
                .get_one::<PathBuf>("config")
                .context("--config is required")?;
            let mut config = load_config(path)?;
            if args.get_flag("log-json") {
                config.logging.json = true;
            }
            serve(config, args.get_flag("tick")).await
        }
        Some(("check-config", args)) => {
            let path = args
                .get_one::<PathBuf>("config")
                .context("--config is required")?;
            let mut config = load_config(path)?;
            // Never print secrets
            config.server.admin_token = config.server.admin_token.map(|_| "***".to_string());
            config.server.schedule_secret =
                config.server.schedule_secret.map(|_| "***".to_string());
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        _ => Ok(()),
    }
}

async fn serve(config: CutoverConfig, tick: bool) -> anyhow::Result<()> {
    init_logging(&config.logging);

    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", config.server.bind))?;
    let notifier = notifier_from_config(&config).context("building notification channel")?;
    let credentials = Credentials::from_settings(&config.server);
    let tick_interval = config.tick_interval();

    // Concrete store backends plug in here; the binary ships in-memory ones
    let system = MigrationSystem::new(
        config,
        Arc::new(MemoryRecordStore::new("legacy")),
        Arc::new(MemoryRecordStore::new("target")),
        Arc::new(MemoryStateStore::new()),
        notifier,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ticker = tick.then(|| {
        spawn_ticker(
            Arc::clone(&system.cycle),
            tick_interval,
            shutdown_rx.clone(),
        )
    });

    let mut server_shutdown = shutdown_rx;
    let (bound, server) = warp::serve(routes(ApiState::new(system, credentials)))
        .try_bind_with_graceful_shutdown(addr, async move {
            while server_shutdown.changed().await.is_ok() {
                if *server_shutdown.borrow() {
                    break;
                }
            }
        })
        .with_context(|| format!("binding {addr}"))?;
    info!(%bound, ticker = tick, "operator API listening");
    let server = tokio::spawn(server);

    tokio::signal::ctrl_c()
        .await
        .context("waiting for ctrl-c")?;
    info!("shutdown requested");
    let _ = shutdown_tx.send(true);

    server.await.context("server task")?;
    if let Some(ticker) = ticker {
        ticker.await.context("ticker task")?;
    }
    info!("stopped");
    Ok(())
}
