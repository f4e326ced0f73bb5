use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use pages_core::PagesConfig;
use pages_gateway::{ContentPipeline, DnsVerifier, DomainRegistry, ForgejoHostApi};
use pages_kv::{Cache, KvPool};
use tracing::info;

mod app;
mod dns;

#[derive(Parser, Debug)]
#[command(name = "bovine-pages", version, about = "bovine-pages static site hosting gateway")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level, used when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Address to bind the HTTP listener to.
    #[arg(long, default_value = "0.0.0.0:8080")]
    listen: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "bovine-pages starting");

    let config_path = cli.config.as_ref().and_then(|p| p.to_str());
    let config = Arc::new(PagesConfig::load(config_path)?);
    info!(pages_domain = %config.pages_domain, forgejo_host = %config.forgejo_host, "configuration loaded");

    let kv_pool = Arc::new(KvPool::new(
        config.redis_host.clone(),
        config.redis_port,
        config.redis_password.clone(),
        config.redis_pool_size,
        config.redis_max_connections,
        Duration::from_secs(config.redis_conn_wait_timeout),
    ));

    let cache = Arc::new(Cache::new(if config.redis_host.is_empty() {
        None
    } else {
        Some(kv_pool.clone())
    }));
    let _janitor = cache.spawn_janitor(Duration::from_secs(config.cache_ttl));

    let dns_verifier: Arc<dyn DnsVerifier> = if config.enable_custom_domain_dns_verification {
        match dns::ResolverDnsVerifier::new() {
            Ok(resolver) => Arc::new(resolver),
            Err(e) => {
                tracing::error!(error = %e, "failed to build DNS resolver, DNS verification will always fail");
                Arc::new(dns::NoopDnsVerifier)
            }
        }
    } else {
        Arc::new(dns::NoopDnsVerifier)
    };

    let registry = Arc::new(DomainRegistry::new(
        kv_pool,
        dns_verifier,
        config.enable_custom_domain_dns_verification,
        config.traefik_redis_router_enabled,
        config.traefik_redis_cert_resolver.clone(),
        config.traefik_redis_root_key.clone(),
        config.traefik_redis_router_ttl,
    ));

    let host_api = Arc::new(ForgejoHostApi::new(config.forgejo_host.clone(), config.forgejo_token.clone()));

    let error_pages_repo = config
        .error_pages_repo
        .split_once('/')
        .map(|(owner, repo)| (owner.to_string(), repo.to_string()));

    let pipeline = Arc::new(ContentPipeline::new(
        cache,
        host_api.clone(),
        error_pages_repo,
        Duration::from_secs(config.cache_ttl),
    ));

    let state = Arc::new(app::AppState::new(config.clone(), registry, pipeline, host_api));
    let router = app::router(state);

    let listener = tokio::net::TcpListener::bind(&cli.listen).await?;
    info!(addr = %cli.listen, "bovine-pages is ready — serving traffic");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("bovine-pages stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received, draining connections");
}
