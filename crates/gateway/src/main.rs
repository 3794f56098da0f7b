use std::sync::Arc;

use anyhow::Context;
use axum::http::{header, HeaderName, HeaderValue, Method};
use clap::Parser;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

use vitrine_domain::config::{Config, ConfigSeverity};
use vitrine_gateway::api;
use vitrine_gateway::cli::{Cli, Command, ConfigCommand};
use vitrine_gateway::runtime::greeting::GreetingFilter;
use vitrine_gateway::security::admission::Admission;
use vitrine_gateway::state::AppState;
use vitrine_mcp_client::{HttpToolClient, ToolDispatcher};
use vitrine_providers::{LlmProvider, OpenAiCompatProvider};
use vitrine_sessions::SessionRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Default to serve when no subcommand is given.
        None | Some(Command::Serve) => {
            init_tracing();
            let config = vitrine_gateway::cli::load_config(&cli.config)?;
            run_server(Arc::new(config)).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let config = vitrine_gateway::cli::load_config(&cli.config)?;
            if !vitrine_gateway::cli::validate(&config, &cli.config) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let config = vitrine_gateway::cli::load_config(&cli.config)?;
            vitrine_gateway::cli::show(&config);
            Ok(())
        }
        Some(Command::Version) => {
            println!("vitrine {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Initialize structured JSON tracing (only for the `serve` command).
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,vitrine_gateway=debug")),
        )
        .json()
        .init();
}

/// Read an environment variable named by a config field, treating empty
/// values as unset. Secret values never land in the config struct.
fn secret_from_env(env_var: &str) -> Option<String> {
    std::env::var(env_var).ok().filter(|v| !v.is_empty())
}

/// Start the gateway server with the given configuration.
async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("Vitrine starting");

    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Secrets (read once; never stored in config) ─────────────────
    let app_secret = secret_from_env(&config.shop.app_secret_env).map(Arc::new);
    if app_secret.is_none() {
        tracing::warn!(
            env_var = %config.shop.app_secret_env,
            "app-proxy secret not set — proxied routes will answer 500"
        );
    }

    let internal_key = secret_from_env(&config.shop.internal_key_env);

    // ── LLM transport ────────────────────────────────────────────────
    let llm: Option<Arc<dyn LlmProvider>> = match secret_from_env(&config.llm.api_key_env) {
        Some(api_key) => {
            let provider = OpenAiCompatProvider::from_config(&config.llm, api_key)
                .context("initializing LLM provider")?;
            tracing::info!(model = %config.llm.model, "LLM transport ready");
            Some(Arc::new(provider))
        }
        None => {
            tracing::warn!(
                env_var = %config.llm.api_key_env,
                "LLM API key not set — chat turns will answer with an error event"
            );
            None
        }
    };

    // ── Archive store + session registry ───────────────────────────
    let archive = vitrine_archive::create_store(&config.archive)
        .context("initializing archive client")?;
    match config.archive.base_url {
        Some(ref url) => tracing::info!(url = %url, "archive client ready"),
        None => tracing::info!("no archive configured — sessions are memory-only"),
    }
    let sessions = Arc::new(SessionRegistry::new(&config.sessions, archive));

    // ── Tool-protocol client ────────────────────────────────────────
    let tools: Arc<dyn ToolDispatcher> = Arc::new(
        HttpToolClient::new(
            &config.shop.domain,
            config.shop.search_context.clone(),
            internal_key,
        )
        .context("initializing tool client")?,
    );
    tracing::info!(shop = %config.shop.domain, "tool client ready");

    // ── Admission + greeting filter ─────────────────────────────────
    let admission = Arc::new(Admission::new(&config.admission));
    let greeting = Arc::new(GreetingFilter::from_config(&config.shop));

    let state = AppState {
        config: config.clone(),
        sessions: sessions.clone(),
        admission,
        tools,
        llm,
        greeting,
        app_secret,
    };

    // ── Periodic idle-session eviction ──────────────────────────────
    {
        let sessions = sessions.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                interval.tick().await;
                sessions.prune_idle();
            }
        });
    }

    // ── CORS layer ──────────────────────────────────────────────────
    let cors_layer = build_cors_layer(&config.server.allowed_origin);

    // ── Concurrency limit (backpressure protection) ─────────────────
    let max_concurrent = std::env::var("VITRINE_MAX_CONCURRENT_REQUESTS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(256);
    tracing::info!(max_concurrent, "concurrency limit set");

    // ── Optional per-IP rate limit (token bucket) ───────────────────
    let governor_layer = config.server.rate_limit.as_ref().map(|rl| {
        use tower_governor::governor::GovernorConfigBuilder;
        use tower_governor::GovernorLayer;

        let gov_config = GovernorConfigBuilder::default()
            .per_second(rl.requests_per_second)
            .burst_size(rl.burst_size)
            .finish()
            .expect("rate_limit: requests_per_second and burst_size must be > 0");

        tracing::info!(
            requests_per_second = rl.requests_per_second,
            burst_size = rl.burst_size,
            "per-IP rate limiting enabled"
        );

        GovernorLayer {
            config: std::sync::Arc::new(gov_config),
        }
    });

    // ── Router ──────────────────────────────────────────────────────
    let router = api::router()
        .layer(cors_layer)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_concurrent));
    let app = if let Some(gov) = governor_layer {
        router.layer(gov).with_state(state)
    } else {
        router.with_state(state)
    };

    // ── Bind ────────────────────────────────────────────────────────
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    tracing::info!(addr = %addr, "Vitrine listening");

    axum::serve(listener, app)
        .await
        .context("axum server error")?;

    Ok(())
}

/// Build a [`CorsLayer`] for the configured origin.
///
/// `"*"` (the default) is fully permissive and intended for development;
/// anything else is matched exactly.
fn build_cors_layer(allowed_origin: &str) -> CorsLayer {
    let signature_header = HeaderName::from_static("x-shopify-hmac-sha256");
    let methods = [Method::GET, Method::POST, Method::OPTIONS];
    let headers = [header::CONTENT_TYPE, signature_header];

    if allowed_origin == "*" {
        tracing::warn!("CORS configured with wildcard \"*\" — all origins allowed");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(methods)
            .allow_headers(headers);
    }

    match allowed_origin.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin(AllowOrigin::exact(origin))
            .allow_methods(methods)
            .allow_headers(headers),
        Err(_) => {
            tracing::error!(origin = %allowed_origin, "invalid CORS origin, denying all");
            CorsLayer::new()
                .allow_methods(methods)
                .allow_headers(headers)
        }
    }
}
