use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod auth;
mod config;
mod domain;
mod enrichment;
mod errors;
mod jobs;
mod llm;
mod messaging;
mod orchestrator;
mod quota;
mod scoring;
mod scraping;
mod store;
mod cli;

use enrichment::{NullExternalProvider, WaterfallEnricher};
use llm::LlmClient;
use messaging::Messenger;
use orchestrator::Orchestrator;
use quota::QuotaGate;
use scraping::TieredScraper;
use store::postgres::PgStore;

/// Shared application state passed to HTTP handlers and middleware.
pub struct AppState {
    pub db: PgStore,
    pub config: config::Config,
    pub quota: QuotaGate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "leadforge=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = config::Config::load()?;
    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => run_server(cfg, port).await,
        Some(cli::Commands::Migrate) => {
            let db = PgStore::connect(&cfg.database_url).await?;
            db.migrate().await?;
            tracing::info!("migrations applied");
            Ok(())
        }
        Some(cli::Commands::Worker { count }) => run_workers_only(cfg, count).await,
        Some(cli::Commands::SeedPlans) => {
            for plan in cfg.plans.all() {
                tracing::info!(
                    plan = %plan.name,
                    max_leads_per_day = plan.max_leads_per_day,
                    can_export = plan.can_export,
                    can_use_ai = plan.can_use_ai,
                    "plan configured"
                );
            }
            Ok(())
        }
        Some(cli::Commands::IssueKey { org, user, name }) => {
            let db = PgStore::connect(&cfg.database_url).await?;
            db.migrate().await?;
            let generated = auth::api_key::generate();
            db.create_api_key(
                org,
                user,
                &name,
                &generated.key_prefix,
                &generated.key_hash,
                1000,
                None,
            )
            .await?;
            println!("{}", generated.token);
            Ok(())
        }
        None => {
            let port = cfg.api_port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

fn build_pipeline(cfg: &config::Config, db: PgStore) -> (QuotaGate, Arc<Orchestrator>) {
    let quota = QuotaGate::new(db.pool().clone(), cfg.plans.clone());

    let webdriver_url = std::env::var("WEBDRIVER_URL").ok();
    let scraper = Arc::new(TieredScraper::new(Duration::from_secs(20), webdriver_url));

    let enrich_llm = LlmClient::new(cfg.groq_api_key.clone(), cfg.llm_model.clone());
    let enricher = Arc::new(WaterfallEnricher::new(
        Box::new(NullExternalProvider),
        enrich_llm,
    ));

    let message_llm = LlmClient::new(cfg.groq_api_key.clone(), cfg.llm_model.clone());
    let messenger = Arc::new(Messenger::new(cfg.sender_org.clone(), message_llm));

    let orchestrator_quota = QuotaGate::new(db.pool().clone(), cfg.plans.clone());
    let orchestrator = Arc::new(Orchestrator::new(
        db,
        orchestrator_quota,
        scraper,
        enricher,
        messenger,
    ));

    (quota, orchestrator)
}

async fn run_server(cfg: config::Config, port: u16) -> anyhow::Result<()> {
    tracing::info!("connecting to database...");
    let db = PgStore::connect(&cfg.database_url).await?;

    tracing::info!("running migrations...");
    db.migrate().await?;

    let worker_count = cfg.job_worker_count;
    let poll_interval = Duration::from_millis(cfg.job_poll_interval_ms);
    let allowed_origins = cfg.allowed_origins.clone();

    let (quota, orchestrator) = build_pipeline(&cfg, db.clone());

    let state = Arc::new(AppState {
        db: db.clone(),
        config: cfg,
        quota,
    });

    orchestrator.spawn_workers(worker_count, poll_interval);
    jobs::cleanup::spawn(db.pool().clone());

    let cors = build_cors_layer(allowed_origins);

    let app = axum::Router::new()
        .nest("/api/v2", api::api_router(state.clone()))
        .with_state(state.clone())
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("leadforge listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// `leadforge worker` runs the pipeline poll loop without binding an
/// HTTP listener — useful for scaling workers independently of the API
/// tier (spec.md §5).
async fn run_workers_only(cfg: config::Config, count: Option<usize>) -> anyhow::Result<()> {
    let db = PgStore::connect(&cfg.database_url).await?;
    db.migrate().await?;

    let worker_count = count.unwrap_or(cfg.job_worker_count);
    let poll_interval = Duration::from_millis(cfg.job_poll_interval_ms);

    let (_quota, orchestrator) = build_pipeline(&cfg, db.clone());
    orchestrator.spawn_workers(worker_count, poll_interval);
    jobs::cleanup::spawn(db.pool().clone());

    tracing::info!(worker_count, "leadforge worker pool running");
    std::future::pending::<()>().await;
    Ok(())
}

fn build_cors_layer(allowed_origins: Vec<String>) -> CorsLayer {
    use axum::http::{HeaderName, Method};
    use tower_http::cors::AllowOrigin;

    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin, _| {
            let origin_str = origin.to_str().unwrap_or("");
            allowed_origins.iter().any(|o| o == origin_str)
        }))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([
            HeaderName::from_static("content-type"),
            HeaderName::from_static("authorization"),
        ])
        .allow_credentials(true)
}
