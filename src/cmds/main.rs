use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Error};
use structopt::StructOpt;
use tracing_subscriber::filter::LevelFilter;

use buf_registry_core::catalogue::Catalogue;
use buf_registry_core::identity::InMemoryIdentityStore;
use buf_registry_core::rpc::{router, AppState};
use buf_registry_core::RegistryConfig;

fn parse_level(s: &str) -> Result<LevelFilter, Error> {
    s.parse::<LevelFilter>().map_err(|_| anyhow::anyhow!("failed to parse level '{}'", s))
}

#[derive(StructOpt)]
struct Opts {
    /// Path to the registry's TOML configuration file.
    #[structopt(short, long, parse(from_os_str))]
    config: PathBuf,
    #[structopt(
        short = "L",
        long = "log-level",
        default_value = "info",
        parse(try_from_str = parse_level)
    )]
    log_level: LevelFilter,
    /// Output log messages as json.
    #[structopt(long)]
    json: bool,
}

fn init_tracing(level: LevelFilter, json: bool) -> Result<(), Error> {
    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env();
    env_filter = env_filter.add_directive(level.into());
    let subscriber = tracing_subscriber::FmtSubscriber::builder().with_env_filter(env_filter);

    if json {
        tracing::subscriber::set_global_default(subscriber.json().finish())
            .context("failed to set default subscriber")
    } else {
        tracing::subscriber::set_global_default(subscriber.finish())
            .context("failed to set default subscriber")
    }
}

async fn real_main() -> Result<(), Error> {
    let args = Opts::from_args();
    init_tracing(args.log_level, args.json)?;

    let contents = std::fs::read_to_string(&args.config)
        .with_context(|| format!("failed to read config file {}", args.config.display()))?;
    let config = RegistryConfig::from_toml_str(&contents).context("failed to parse config")?;

    buf_registry_core::catalogue::ensure_data_dir(std::path::Path::new(&config.data_dir))?;
    let resolver = config.credential_resolver().context("failed to build credential resolver")?;

    let mut builder = Catalogue::builder(&config.data_dir);
    if let Some(secs) = config.fetch_debounce_secs {
        builder = builder.with_debounce(Duration::from_secs(secs));
    }
    for module in &config.modules {
        builder.add_module(module, &resolver)?;
    }
    let catalogue = Arc::new(builder.build());

    let identity = Arc::new(InMemoryIdentityStore::new());
    identity.register_from_catalogue(&catalogue);

    let state = AppState::new(catalogue, identity, config.bearer_tokens.clone(), config.own_host.clone());
    let shutdown = state.shutdown.clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "buf-registryd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .context("server error")
}

/// Graceful-shutdown operation (spec.md §5): stop accepting connections and
/// wait for outstanding handlers once either signal arrives. Cancels
/// `shutdown` first, so every in-flight request's `RequestContext` observes
/// cancellation and abandons its fetch/tree-walk rather than the drain
/// simply waiting on work that would otherwise run to completion.
async fn shutdown_signal(shutdown: tokio_util::sync::CancellationToken) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("shutdown signal received, cancelling in-flight requests and draining handlers");
    shutdown.cancel();
}

#[tokio::main]
async fn main() {
    match real_main().await {
        Ok(()) => {}
        Err(e) => {
            tracing::error!("{:#}", e);
            std::process::exit(1);
        }
    }
}
