use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpServer};
use anyhow::Context;
use tracing::{error, info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use urbifix::openapi::ApiDoc;
use urbifix::repo::{inmem::InMemRepo, pg::PgRepo, Repo};
use urbifix::storage::FsAttachmentStore;
use urbifix::{config, AppConfig, AppState, SecurityHeaders};

async fn build_repo(cfg: &AppConfig) -> anyhow::Result<Arc<dyn Repo>> {
    if let Some(url) = &cfg.database_url {
        let repo = PgRepo::connect(url).await.context("connecting to Postgres")?;
        repo.migrate().await.context("running migrations")?;
        info!("Using Postgres repository backend");
        return Ok(Arc::new(repo));
    }
    match &cfg.data_dir {
        Some(dir) => {
            tokio::fs::create_dir_all(dir).await.context("creating data directory")?;
            info!("Using in-memory repository backend with snapshots in '{}'", dir.display());
            Ok(Arc::new(InMemRepo::with_snapshot_dir(dir)))
        }
        None => {
            info!("Using in-memory repository backend (no persistence)");
            Ok(Arc::new(InMemRepo::new()))
        }
    }
}

fn cors(frontend_url: &str) -> Cors {
    Cors::default()
        // local dev frontends
        .allowed_origin("http://localhost:3000")
        .allowed_origin("http://127.0.0.1:3000")
        .allowed_origin("http://localhost:5173")
        .allowed_origin(frontend_url)
        .allow_any_header()
        .allowed_methods(["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
        .supports_credentials()
        .max_age(3600)
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env automatically only in debug builds.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let cfg = AppConfig::from_env();
    if let Err(e) = cfg.validate() {
        error!("invalid configuration: {e}");
        eprintln!("{e}. Please copy .env.example to .env and configure it");
        std::process::exit(1);
    }

    info!("Bootstrapping Urbi-Fix API");
    info!("Frontend URL: {}", cfg.frontend_url);

    let repo = build_repo(&cfg).await?;
    let attachments = Arc::new(FsAttachmentStore::new(cfg.upload_dir.join("chat")).await?);
    let state = AppState::new(repo, attachments, cfg.clone());
    let openapi = ApiDoc::openapi();

    let port = cfg.port;
    let security = SecurityHeaders::from_config(&cfg);
    let frontend_url = cfg.frontend_url.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(security.clone())
            .wrap(cors(&frontend_url))
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
            .configure(config)
    })
    .bind(("0.0.0.0", port))?;

    info!("Listening on http://0.0.0.0:{port}");
    server.run().await?;
    Ok(())
}
