#[cfg(feature = "ssr")]
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        tracing::error!("{}", e);
        eprintln!("inkpost: {}", e);
        std::process::exit(1);
    }
}

#[cfg(feature = "ssr")]
async fn run() -> Result<(), Box<dyn std::error::Error>> {
    use axum::Router;
    use inkpost::app::*;
    use inkpost::core::config::{Config, Environment};
    use inkpost::core::db::{self, DbConfig, SessionRepository};
    use inkpost::core::server::{ApiContext, api_router};
    use leptos::prelude::*;
    use leptos_axum::{LeptosRoutes, generate_route_list};
    use std::net::SocketAddr;
    use std::time::{Duration, Instant};
    use tower_http::compression::{CompressionLayer, CompressionLevel};
    use tower_http::services::ServeDir;
    use tracing_subscriber::EnvFilter;

    let started_at = Instant::now();

    // Load .env file (if exists)
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;

    let default_filter = match config.environment {
        Environment::Development => "debug,sqlx=warn,hyper=info",
        _ => "info",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    // Log config status (without revealing secrets)
    tracing::info!(
        "Config loaded: environment={}, database={}, cloudinary={}, smtp={}",
        config.environment,
        config.has_database(),
        config.has_cloudinary(),
        config.has_smtp()
    );

    let pool = db::create_pool_with_migrations(&DbConfig::from_config(&config)?).await?;

    // Hourly sweep of expired refresh sessions
    let sessions = SessionRepository::new(pool.clone());
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60 * 60));
        loop {
            interval.tick().await;
            match sessions.cleanup_expired().await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Removed {} expired sessions", n),
                Err(e) => tracing::warn!("Session cleanup failed: {}", e),
            }
        }
    });

    let server_addr: SocketAddr = config.server_addr.parse()?;
    let (api, limiter) = api_router(ApiContext {
        config,
        pool,
        started_at,
    })?;

    if let Some(limiter) = limiter {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                limiter.purge_expired(Instant::now());
            }
        });
    }

    // Load configuration from Cargo.toml [package.metadata.leptos]
    // Can be overridden via LEPTOS_SITE_ADDR env var for Docker/K8s
    let conf = get_configuration(None)?;
    let leptos_options = conf.leptos_options;
    let routes = generate_route_list(App);

    // Serves .br and .gz variants when present
    let pkg_service = ServeDir::new(format!("{}/pkg", leptos_options.site_root))
        .precompressed_br()
        .precompressed_gzip();

    let leptos_router = Router::new()
        .nest_service("/pkg", pkg_service)
        .leptos_routes(&leptos_options, routes, {
            let leptos_options = leptos_options.clone();
            move || shell(leptos_options.clone())
        })
        .fallback(leptos_axum::file_and_error_handler(shell))
        .with_state(leptos_options);

    let app = Router::new()
        .merge(api)
        .merge(leptos_router)
        .layer(
            CompressionLayer::new()
                .br(true)
                .gzip(true)
                .quality(CompressionLevel::Default),
        );

    tracing::info!("listening on http://{}", server_addr);

    let listener = tokio::net::TcpListener::bind(server_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[cfg(not(feature = "ssr"))]
pub fn main() {
    // no client-side main function
    // see lib.rs for hydration function instead
}
