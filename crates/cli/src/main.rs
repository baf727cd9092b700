mod config_commands;
mod console_commands;
mod echo;
mod session_commands;

use std::{path::PathBuf, sync::Arc};

use {
    clap::{Parser, Subcommand},
    parley_channels::{ConsoleConnector, console},
    parley_config::{ParleyConfig, validate},
    parley_gateway::{WebhookRoute, start_gateway},
    parley_sessions::session_store_from_config,
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "parley", about = "Parley: chat bot webhook dispatcher")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery of `parley.{toml,yaml,json}`).
    #[arg(long, global = true, env = "PARLEY_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,
    /// Port to listen on (overrides config value).
    #[arg(long, global = true)]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve webhooks for every enabled channel (default).
    Serve,
    /// Chat with the echo bot in this terminal.
    Console,
    /// Session management.
    Sessions {
        #[command(subcommand)]
        action: session_commands::SessionAction,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

fn load_config(explicit: Option<&PathBuf>) -> anyhow::Result<ParleyConfig> {
    match explicit {
        Some(path) => parley_config::load_config(path),
        None => parley_config::discover_and_load(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

async fn serve(cli: &Cli, config: ParleyConfig) -> anyhow::Result<()> {
    let report = validate::validate(cli.config.as_deref());
    if report.has_errors() {
        config_commands::print_diagnostics(&report, false);
        anyhow::bail!("configuration has errors; run `parley config check`");
    }

    let bind = cli.bind.clone().unwrap_or(config.server.bind.clone());
    let port = cli.port.unwrap_or(config.server.port);
    let store = session_store_from_config(&config.session);

    let mut bots = Vec::new();
    let mut routes = Vec::new();
    for (name, channel) in &config.channels {
        if !channel.enabled {
            continue;
        }
        match name.as_str() {
            console::PLATFORM => {
                let bot = echo::build_bot(
                    ConsoleConnector::new(),
                    channel,
                    config.initial_state.clone(),
                    Arc::clone(&store),
                );
                routes.push(WebhookRoute::new(
                    name.clone(),
                    channel.webhook_path(name),
                    bot.request_handler()?,
                ));
                bots.push(bot);
            },
            other => warn!(channel = other, "no connector for channel, skipping"),
        }
    }
    if routes.is_empty() {
        warn!("no enabled channels; serving /health only");
    }

    start_gateway(&bind, port, routes, shutdown_signal()).await?;

    for bot in &bots {
        bot.shutdown().await;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "parley starting");

    match &cli.command {
        None | Some(Commands::Serve) => {
            let config = load_config(cli.config.as_ref())?;
            serve(&cli, config).await
        },
        Some(Commands::Console) => {
            let config = load_config(cli.config.as_ref())?;
            let store = session_store_from_config(&config.session);
            console_commands::run(&config, store).await
        },
        Some(Commands::Sessions { action }) => {
            let config = load_config(cli.config.as_ref())?;
            let store = session_store_from_config(&config.session);
            session_commands::handle_sessions(action.clone(), store.as_ref()).await
        },
        Some(Commands::Config { action }) => {
            config_commands::handle_config(action.clone(), cli.config.as_deref())
        },
    }
}
