use tokio::net::TcpListener;
use tokio::signal;

use auraserver::config::Config;
use auraserver::rooms::reaper;
use auraserver::state::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "auraserver=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env();
    print_banner(&config);

    let state = AppState::new();

    let reaper_handle = reaper::spawn(
        state.registry.clone(),
        config.reaper_interval,
        config.room_idle_timeout,
    );

    let app = auraserver::routes::router(state);

    let listener = match TcpListener::bind(("0.0.0.0", config.port)).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("failed to bind port {}: {e}", config.port);
            std::process::exit(1);
        }
    };

    let actual_port = listener
        .local_addr()
        .map(|addr| addr.port())
        .unwrap_or(config.port);
    eprintln!("  \x1b[32m→ listening on 0.0.0.0:{actual_port}\x1b[0m");
    eprintln!();

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("server error: {e}");
    }

    reaper_handle.abort();
    tracing::info!("signaling server stopped");
}

fn print_banner(config: &Config) {
    let version = env!("CARGO_PKG_VERSION");

    eprintln!();
    eprintln!("  \x1b[1;36maura\x1b[0m \x1b[2mv{version}\x1b[0m");
    eprintln!();
    eprintln!("  \x1b[2mport\x1b[0m         {}", config.port);
    eprintln!(
        "  \x1b[2mroom idle\x1b[0m    {}s",
        config.room_idle_timeout.as_secs()
    );
    eprintln!(
        "  \x1b[2mreaper\x1b[0m       every {}s",
        config.reaper_interval.as_secs()
    );
    eprintln!();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
