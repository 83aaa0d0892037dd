use actix_cors::Cors;
use actix_files::Files;
use actix_web::middleware::{Compress, Logger};
use actix_web::{http::header, web, App, HttpServer};
use actix_web_prometheus::PrometheusMetricsBuilder;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod config;
pub mod document;
pub mod error;
pub mod render;
pub mod state;
pub mod storage;
pub mod template;

pub use crate::config::AppConfig;
pub use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::document::handlers::create_pdf,
        crate::document::handlers::list_files,
        crate::document::handlers::serve_file,
        crate::document::handlers::health,
        crate::document::handlers::index,
    ),
    components(
        schemas(
            document::models::TemplatePayload,
            document::models::HealthResponse,
            document::models::ServiceIndex,
        )
    ),
    tags(
        (name = "PDF Generation", description = "Fill a named template and return the PDF."),
        (name = "Files", description = "Generated PDF listing and download."),
        (name = "Service", description = "Health and index endpoints.")
    ),
    servers(
        (url = "http://127.0.0.1:8080", description = "Local server")
    )
)]
pub struct ApiDoc;

/// Registers every route plus the state they share. Static files are mounted
/// last so they never shadow an API route.
pub fn configure_app(cfg: &mut web::ServiceConfig, state: web::Data<AppState>) {
    let payload_limit = state.config.max_payload_bytes;
    let static_root = state.config.static_root.clone();

    cfg.app_data(state)
        .app_data(web::PayloadConfig::new(payload_limit))
        .configure(document::config)
        .service(
            SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-doc/openapi.json", ApiDoc::openapi()),
        );

    if static_root.is_dir() {
        cfg.service(Files::new("/", static_root));
    }
}

fn build_cors(origins: &[String]) -> Cors {
    let cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE])
        .max_age(3600);

    if origins.is_empty() {
        return cors.allow_any_origin();
    }
    origins
        .iter()
        .fold(cors, |cors, origin| cors.allowed_origin(origin))
}

pub async fn run() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    log::info!(
        "Renderer: {}, templates: {} (fallback {}), output: {}",
        config.renderer,
        config.templates_root.display(),
        config.fallback_templates_root().display(),
        config.output_root.display()
    );

    let prometheus = PrometheusMetricsBuilder::new("pdf_template_server")
        .endpoint("/metrics")
        .build()
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    let bind_addr = (config.host.clone(), config.port);
    let cors_origins = config.cors_origins.clone();
    let app_state = web::Data::new(AppState::new(config));

    log::info!("Starting server at http://{}:{}", bind_addr.0, bind_addr.1);

    HttpServer::new(move || {
        let app_state = app_state.clone();
        App::new()
            .wrap(Compress::default())
            .wrap(prometheus.clone())
            .wrap(build_cors(&cors_origins))
            .wrap(Logger::default())
            .configure(|cfg| configure_app(cfg, app_state))
    })
    .keep_alive(actix_web::http::KeepAlive::Os)
    .bind(bind_addr)?
    .run()
    .await
}
