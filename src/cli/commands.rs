use crate::channel::Input;
use crate::config::ServerConfig;
use crate::datastore::{Datastore, MemoryDatastore};
use crate::dispatcher::Dispatcher;
use crate::handlers::{standard_registry, LoginHandler};
use crate::listener::{ReplyListener, ResultListener};
use crate::pipeline::ShutdownMode;
use crate::router::CommandRouter;
use crate::server::{Server, ServerHandle, TcpInput};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Command-line interface for the dispatch server
#[derive(Parser, Debug)]
#[command(name = "brrtd")]
#[command(about = "BRRT request dispatch server", long_about = None)]
pub struct Cli {
    /// Human readable debug logging
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the TCP server until SIGINT/SIGTERM
    Serve {
        /// YAML configuration file
        #[arg(short, long, env = "BRRTD_CONFIG")]
        config: Option<PathBuf>,

        /// Listen address, e.g. 127.0.0.1:8080
        #[arg(short, long)]
        bind: Option<String>,

        /// Dispatch worker threads
        #[arg(short, long)]
        workers: Option<usize>,

        /// Acceptor threads
        #[arg(short, long)]
        acceptors: Option<usize>,

        /// Shutdown mode on exit
        #[arg(long, value_enum)]
        shutdown: Option<ShutdownMode>,

        /// Login user to seed, as NAME:PASSWORD (repeatable)
        #[arg(short, long = "user", value_name = "NAME:PASSWORD")]
        users: Vec<String>,
    },

    /// Print the command key each path resolves to
    Routes {
        /// Request paths to resolve
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

pub fn run_cli(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve {
            config,
            bind,
            workers,
            acceptors,
            shutdown,
            users,
        } => {
            let mut server_config = ServerConfig::load(config.as_deref())
                .with_context(|| match &config {
                    Some(path) => format!("Failed to load config from {}", path.display()),
                    None => "Failed to load config".to_string(),
                })?;
            if let Some(bind) = bind {
                server_config.bind = bind;
            }
            if let Some(workers) = workers {
                server_config.pipeline.workers = workers;
            }
            if let Some(acceptors) = acceptors {
                server_config.acceptors = acceptors;
            }
            if let Some(shutdown) = shutdown {
                server_config.shutdown = shutdown;
            }
            server_config.validate().context("Invalid command-line override")?;

            let users = users
                .iter()
                .map(|u| parse_user(u))
                .collect::<Result<Vec<_>>>()?;
            serve(&server_config, &users)
        }
        Commands::Routes { paths } => {
            let store = Arc::new(MemoryDatastore::new());
            let router = CommandRouter::new(standard_registry(store)?);
            for path in &paths {
                let key = router.identify_command(Some(path.as_str()));
                let handler = router.get_event(Some(path.as_str()));
                println!("{path} -> {key} ({})", handler.name());
            }
            Ok(())
        }
    }
}

fn parse_user(value: &str) -> Result<(String, String)> {
    match value.split_once(':') {
        Some((user, password)) if !user.is_empty() => Ok((user.to_string(), password.to_string())),
        _ => Err(anyhow!("Invalid --user `{value}`, expected NAME:PASSWORD")),
    }
}

/// Start the datastore, seed `users` and build the dispatcher over the
/// standard handlers.
pub(super) fn seeded_dispatcher(
    config: &ServerConfig,
    users: &[(String, String)],
) -> Result<(Arc<dyn Datastore>, Arc<Dispatcher>)> {
    let store: Arc<dyn Datastore> = Arc::new(MemoryDatastore::new());
    store.start()?;
    LoginHandler::ensure_schema(store.as_ref())?;
    for (user, password) in users {
        LoginHandler::register_user(store.as_ref(), user, password)
            .with_context(|| format!("Failed to register user {user}"))?;
    }

    let registry = standard_registry(Arc::clone(&store))?;
    let listener: Arc<dyn ResultListener> = Arc::new(ReplyListener::new());
    let dispatcher = Arc::new(Dispatcher::new(registry, &config.pipeline, Some(listener))?);
    Ok((store, dispatcher))
}

fn serve(config: &ServerConfig, users: &[(String, String)]) -> Result<()> {
    let (store, dispatcher) = seeded_dispatcher(config, users)?;

    let input = TcpInput::bind(config.bind.as_str())
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    info!(addr = %input.local_addr(), "Listening");
    let input: Arc<dyn Input> = Arc::new(input);

    let handle = Server::new(input, dispatcher, config.acceptors)
        .start()
        .context("Failed to start acceptors")?;

    wait_for_shutdown(handle, config.shutdown)?;
    store.stop(true);
    Ok(())
}

#[cfg(unix)]
fn wait_for_shutdown(handle: ServerHandle, mode: ShutdownMode) -> Result<()> {
    use signal_hook::consts::signal::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals =
        Signals::new([SIGTERM, SIGINT]).context("Failed to install signal handlers")?;
    if let Some(signal) = signals.forever().next() {
        info!(signal, "Shutdown signal received");
    }
    handle.stop(mode);
    Ok(())
}

#[cfg(not(unix))]
fn wait_for_shutdown(handle: ServerHandle, _mode: ShutdownMode) -> Result<()> {
    handle
        .join()
        .map_err(|_| anyhow!("Acceptor thread panicked"))
}
